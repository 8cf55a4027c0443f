//! Border drawing along the alpha edge of an image
//!
//! The outline is derived purely from the alpha channel: the opaque region is
//! grown by a square max filter, the difference between grown and original
//! alpha isolates the outward ring, and a solid color layer masked by that
//! ring is composited underneath the original image.
//!
//! Pixels outside the canvas are treated as fully transparent. Since dilation
//! only ever takes maxima of non-negative values, this padding never adds
//! opacity, so an image that is opaque everywhere gets no outline at all.

use crate::error::{BgRemovalError, Result};
use crate::utils::BorderColor;
use image::{GrayImage, Luma, Rgba, RgbaImage};
use std::collections::VecDeque;
use tracing::{debug, instrument};

/// Border thickness used when the caller does not supply one
pub const DEFAULT_BORDER_THICKNESS: u32 = 5;

/// Smallest dilation radius; keeps a one pixel ring for thickness 0
const MIN_RADIUS: u32 = 1;

/// Validated border parameters for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderOptions {
    pub color: BorderColor,
    pub thickness: u32,
}

impl Default for BorderOptions {
    fn default() -> Self {
        Self {
            color: BorderColor::RED,
            thickness: DEFAULT_BORDER_THICKNESS,
        }
    }
}

impl BorderOptions {
    #[must_use]
    pub fn new(color: BorderColor, thickness: u32) -> Self {
        Self { color, thickness }
    }

    /// Build options from raw form values, applying defaults for absent or
    /// blank fields
    ///
    /// Negative thickness is accepted and treated as zero.
    ///
    /// # Errors
    /// - `InvalidColor` if the color is not parseable
    /// - `InvalidParameter` if the thickness is not an integer
    pub fn from_form(color: Option<&str>, thickness: Option<&str>) -> Result<Self> {
        let color = match color.map(str::trim).filter(|c| !c.is_empty()) {
            Some(raw) => BorderColor::parse(raw)?,
            None => BorderColor::RED,
        };

        let thickness = match thickness.map(str::trim).filter(|t| !t.is_empty()) {
            Some(raw) => {
                let value: i64 = raw.parse().map_err(|_| {
                    BgRemovalError::invalid_parameter(format!(
                        "border thickness '{raw}' is not an integer"
                    ))
                })?;
                u32::try_from(value.max(0)).unwrap_or(u32::MAX)
            },
            None => DEFAULT_BORDER_THICKNESS,
        };

        Ok(Self { color, thickness })
    }

    /// Dilation radius actually applied for an image of the given size
    ///
    /// Radii beyond the longest side cannot reach any further pixels, so they
    /// are clamped there.
    #[must_use]
    pub fn effective_radius(&self, width: u32, height: u32) -> u32 {
        self.thickness
            .max(MIN_RADIUS)
            .min(width.max(height).max(MIN_RADIUS))
    }

    /// Kernel side length of the square max filter, `2 * radius + 1`
    #[must_use]
    pub fn kernel_size(&self, width: u32, height: u32) -> u32 {
        2 * self.effective_radius(width, height) + 1
    }
}

/// Draws solid outlines around the opaque region of RGBA images
pub struct BorderCompositor;

impl BorderCompositor {
    /// Draw a border of `options.color` around the opaque region of `image`
    ///
    /// The returned image has the same dimensions. Deep interior pixels and
    /// pixels outside the dilated region keep their original values; pixels
    /// in the ring are the original composited over the border color.
    #[must_use]
    #[instrument(
        skip(image),
        fields(
            dimensions = %format!("{}x{}", image.width(), image.height()),
            color = %options.color,
            thickness = options.thickness
        )
    )]
    pub fn draw_border(image: &RgbaImage, options: &BorderOptions) -> RgbaImage {
        let (width, height) = image.dimensions();
        let radius = options.effective_radius(width, height);

        let alpha = Self::alpha_channel(image);
        let edge = Self::edge_mask(&alpha, radius);
        let border_layer = Self::border_layer(&edge, options.color);

        let mut ring_pixels = 0usize;
        let result = RgbaImage::from_fn(width, height, |x, y| {
            let source = *image.get_pixel(x, y);
            let backdrop = *border_layer.get_pixel(x, y);
            if backdrop[3] == 0 {
                source
            } else {
                ring_pixels += 1;
                alpha_over(source, backdrop)
            }
        });

        debug!(radius, ring_pixels, "Border composited");
        result
    }

    /// Extract the alpha channel as a single-channel image
    #[must_use]
    pub fn alpha_channel(image: &RgbaImage) -> GrayImage {
        let (width, height) = image.dimensions();
        let data = image.pixels().map(|p| p[3]).collect();
        GrayImage::from_raw(width, height, data)
            .unwrap_or_else(|| GrayImage::new(width, height))
    }

    /// Square max filter with window side `2 * radius + 1`
    ///
    /// Separable: a horizontal pass followed by a vertical pass, each a
    /// sliding-window maximum over the in-bounds part of the window.
    #[must_use]
    pub fn max_filter(alpha: &GrayImage, radius: u32) -> GrayImage {
        let (width, height) = alpha.dimensions();
        if width == 0 || height == 0 || radius == 0 {
            return alpha.clone();
        }
        // A window wider than the image covers the whole line already
        let radius = radius.min(width.max(height)) as usize;
        let (w, h) = (width as usize, height as usize);

        let mut horizontal = vec![0u8; w * h];
        for (src, dst) in alpha
            .as_raw()
            .chunks_exact(w)
            .zip(horizontal.chunks_exact_mut(w))
        {
            sliding_max(src, radius, dst);
        }

        let mut output = vec![0u8; w * h];
        let mut column = vec![0u8; h];
        let mut filtered = vec![0u8; h];
        for x in 0..w {
            for (y, value) in column.iter_mut().enumerate() {
                *value = horizontal.get(y * w + x).copied().unwrap_or(0);
            }
            sliding_max(&column, radius, &mut filtered);
            for (y, value) in filtered.iter().enumerate() {
                if let Some(slot) = output.get_mut(y * w + x) {
                    *slot = *value;
                }
            }
        }

        GrayImage::from_raw(width, height, output).unwrap_or_else(|| alpha.clone())
    }

    /// Ring of pixels whose alpha rises under dilation: `|dilated - alpha|`
    #[must_use]
    pub fn edge_mask(alpha: &GrayImage, radius: u32) -> GrayImage {
        let dilated = Self::max_filter(alpha, radius);
        let (width, height) = alpha.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            let grown = dilated.get_pixel(x, y)[0];
            let original = alpha.get_pixel(x, y)[0];
            Luma([grown.abs_diff(original)])
        })
    }

    /// Transparent canvas with `color` pasted through `edge` as the mask
    ///
    /// Pasting onto a transparent canvas blends every band toward the fill by
    /// the mask value, so the layer is `(r, g, b, 255) * edge / 255`.
    #[must_use]
    pub fn border_layer(edge: &GrayImage, color: BorderColor) -> RgbaImage {
        let [r, g, b] = color.to_rgb();
        let (width, height) = edge.dimensions();
        RgbaImage::from_fn(width, height, |x, y| match edge.get_pixel(x, y)[0] {
            0 => Rgba([0, 0, 0, 0]),
            coverage => Rgba([
                scale_by_coverage(r, coverage),
                scale_by_coverage(g, coverage),
                scale_by_coverage(b, coverage),
                coverage,
            ]),
        })
    }
}

/// Draw a `thickness` pixel outline of `color` around the opaque region
#[must_use]
pub fn draw_border(image: &RgbaImage, color: BorderColor, thickness: u32) -> RgbaImage {
    BorderCompositor::draw_border(image, &BorderOptions::new(color, thickness))
}

/// Sliding maximum over `[i - radius, i + radius]` clipped to the line
///
/// Monotonic deque of indices with decreasing values, so each element is
/// pushed and popped at most once.
#[allow(clippy::indexing_slicing)] // Indices come from the deque, all < line.len()
fn sliding_max(line: &[u8], radius: usize, out: &mut [u8]) {
    let len = line.len();
    let mut window: VecDeque<usize> =
        VecDeque::with_capacity(radius.saturating_mul(2).saturating_add(1).min(len));
    let mut next = 0;

    for (i, slot) in out.iter_mut().enumerate().take(len) {
        let upper = i.saturating_add(radius).min(len - 1);
        while next <= upper {
            while window.back().is_some_and(|&j| line[j] <= line[next]) {
                window.pop_back();
            }
            window.push_back(next);
            next += 1;
        }

        let lower = i.saturating_sub(radius);
        while window.front().is_some_and(|&j| j < lower) {
            window.pop_front();
        }

        *slot = window.front().map_or(0, |&j| line[j]);
    }
}

/// `value * coverage / 255`, rounded to nearest
fn scale_by_coverage(value: u8, coverage: u8) -> u8 {
    let tmp = u32::from(value) * u32::from(coverage) + 128;
    ((tmp + (tmp >> 8)) >> 8) as u8
}

/// Porter-Duff source-over on straight (non-premultiplied) alpha
fn alpha_over(source: Rgba<u8>, backdrop: Rgba<u8>) -> Rgba<u8> {
    let source_alpha = f32::from(source[3]) / 255.0;
    let backdrop_alpha = f32::from(backdrop[3]) / 255.0;
    let out_alpha = source_alpha + backdrop_alpha * (1.0 - source_alpha);

    if out_alpha <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |s: u8, b: u8| -> u8 {
        let value = (f32::from(s) * source_alpha
            + f32::from(b) * backdrop_alpha * (1.0 - source_alpha))
            / out_alpha;
        value.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend(source[0], backdrop[0]),
        blend(source[1], backdrop[1]),
        blend(source[2], backdrop[2]),
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
