//! Foreground color estimation for soft mask edges
//!
//! Semi-transparent pixels along a segmentation edge are a mix of foreground
//! and background color. Attaching the mask as alpha without correcting the
//! color leaves a halo of the old background around the subject. Blur-fusion
//! estimation recovers an approximate foreground color from local averages of
//! the foreground and background, first at a coarse radius and then at a fine
//! one.

use crate::error::{BgRemovalError, Result};
use image::{GrayImage, RgbImage};
use ndarray::{Array2, Axis};
use tracing::instrument;

const COARSE_RADIUS: usize = 90;
const FINE_RADIUS: usize = 6;
const EPSILON: f32 = 1e-5;

/// Estimate foreground colors for `image` under the soft mask `alpha`
///
/// Returns an RGB image of the same size whose colors are suitable for
/// attaching `alpha` directly.
///
/// # Errors
/// - `Processing` if the image and mask dimensions differ
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn estimate_foreground(image: &RgbImage, alpha: &GrayImage) -> Result<RgbImage> {
    if image.dimensions() != alpha.dimensions() {
        return Err(BgRemovalError::processing(format!(
            "Mask size {}x{} does not match image size {}x{}",
            alpha.width(),
            alpha.height(),
            image.width(),
            image.height()
        )));
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Ok(image.clone());
    }

    let shape = (height as usize, width as usize);
    let alpha = Array2::from_shape_fn(shape, |(y, x)| {
        f32::from(alpha.get_pixel(x as u32, y as u32)[0]) / 255.0
    });
    let alpha_coarse = box_blur(&alpha, COARSE_RADIUS);
    let alpha_fine = box_blur(&alpha, FINE_RADIUS);

    let mut output = RgbImage::new(width, height);
    for channel in 0..3 {
        let source = Array2::from_shape_fn(shape, |(y, x)| {
            f32::from(image.get_pixel(x as u32, y as u32)[channel]) / 255.0
        });

        let (coarse_fg, coarse_bg) =
            blur_fusion_pass(&source, &source, &source, &alpha, &alpha_coarse, COARSE_RADIUS);
        let (refined, _) =
            blur_fusion_pass(&source, &coarse_fg, &coarse_bg, &alpha, &alpha_fine, FINE_RADIUS);

        for ((y, x), value) in refined.indexed_iter() {
            output.get_pixel_mut(x as u32, y as u32)[channel] =
                (value * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }

    Ok(output)
}

/// One blur-fusion step; returns the foreground estimate and blurred background
fn blur_fusion_pass(
    source: &Array2<f32>,
    foreground: &Array2<f32>,
    background: &Array2<f32>,
    alpha: &Array2<f32>,
    blurred_alpha: &Array2<f32>,
    radius: usize,
) -> (Array2<f32>, Array2<f32>) {
    let blurred_fg = box_blur(&(foreground * alpha), radius) / &blurred_alpha.mapv(|a| a + EPSILON);
    let blurred_bg =
        box_blur(&(background * &alpha.mapv(|a| 1.0 - a)), radius) / &blurred_alpha.mapv(|a| 1.0 - a + EPSILON);

    let mut estimate = blurred_fg.clone();
    ndarray::Zip::from(&mut estimate)
        .and(source)
        .and(alpha)
        .and(&blurred_fg)
        .and(&blurred_bg)
        .for_each(|out, &i, &a, &f, &b| {
            *out = (f + a * (i - a * f - (1.0 - a) * b)).clamp(0.0, 1.0);
        });

    (estimate, blurred_bg)
}

/// Normalized box filter with a `size x size` window
///
/// The window is anchored at `size / 2` and clipped at the borders, averaging
/// only the samples that fall inside the plane.
fn box_blur(plane: &Array2<f32>, size: usize) -> Array2<f32> {
    let mut horizontal = plane.clone();
    for mut row in horizontal.axis_iter_mut(Axis(0)) {
        let blurred = blur_line(&row.to_vec(), size);
        row.iter_mut().zip(blurred).for_each(|(dst, src)| *dst = src);
    }

    let mut output = horizontal.clone();
    for mut column in output.axis_iter_mut(Axis(1)) {
        let blurred = blur_line(&column.to_vec(), size);
        column.iter_mut().zip(blurred).for_each(|(dst, src)| *dst = src);
    }
    output
}

fn blur_line(line: &[f32], size: usize) -> Vec<f32> {
    let len = line.len();
    let mut prefix = Vec::with_capacity(len + 1);
    prefix.push(0.0f64);
    let mut running = 0.0f64;
    for &value in line {
        running += f64::from(value);
        prefix.push(running);
    }

    let before = size / 2;
    let after = size.saturating_sub(1) - before;
    (0..len)
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after).min(len - 1);
            let sum = prefix.get(hi + 1).copied().unwrap_or(running)
                - prefix.get(lo).copied().unwrap_or(0.0);
            (sum / (hi - lo + 1) as f64) as f32
        })
        .collect()
}
