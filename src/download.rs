//! Model download into a local cache directory
//!
//! The server needs one `.onnx` file. When it is not present locally it is
//! fetched once at startup, streamed to a `.part` file, verified against an
//! optional SHA-256 and then renamed into place.

use crate::config::ServerConfig;
use crate::error::{BgRemovalError, Result};
use crate::tracing_config::spans;
use futures_util::stream::TryStreamExt;
use reqwest::{Client, Url};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::Instrument;

const DEFAULT_MODEL_FILE: &str = "model.onnx";

/// Model downloader backed by a cache directory
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache_dir: PathBuf,
}

impl ModelDownloader {
    /// Create a downloader that stores models under `cache_dir`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache_dir })
    }

    /// Platform cache directory for downloaded models
    #[must_use]
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bgremove-server")
            .join("models")
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Local path a model downloaded from `url` is stored at
    ///
    /// # Errors
    /// - `InvalidConfig` for unsupported URLs
    pub fn model_path_for_url(&self, url: &str) -> Result<PathBuf> {
        let parsed = validate_model_url(url)?;
        let file_name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map_or_else(|| DEFAULT_MODEL_FILE.to_string(), sanitize_file_name);
        Ok(self.cache_dir.join(file_name))
    }

    /// Return the cached model for `url`, downloading it if needed
    ///
    /// A cached file that fails verification is downloaded again.
    ///
    /// # Errors
    /// - Network errors during download
    /// - File system errors
    /// - Checksum mismatch on the fresh download
    pub async fn ensure_model(&self, url: &str, expected_sha256: Option<&str>) -> Result<PathBuf> {
        let target = self.model_path_for_url(url)?;

        if target.is_file() {
            if self.verify_file_integrity(&target, expected_sha256)? {
                log::info!("Using cached model {}", target.display());
                return Ok(target);
            }
            log::warn!("Cached model {} failed verification, downloading again", target.display());
        }

        let partial = target.with_extension("onnx.part");
        self.download_file(url, &partial)
            .instrument(spans::download(url, &target))
            .await?;

        if !self.verify_file_integrity(&partial, expected_sha256)? {
            let _ = fs::remove_file(&partial);
            return Err(BgRemovalError::model(format!(
                "Downloaded model from {url} does not match the expected SHA-256"
            )));
        }

        fs::rename(&partial, &target)
            .map_err(|e| BgRemovalError::file_io_error("move downloaded model", &target, &e))?;
        log::info!("Model saved to {}", target.display());
        Ok(target)
    }

    /// Stream `url` into `local_path`
    async fn download_file(&self, url: &str, local_path: &Path) -> Result<()> {
        log::info!("Downloading model: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BgRemovalError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(BgRemovalError::network_error(
                format!("HTTP error for {url}"),
                response.status(),
            ));
        }

        let total_size = response.content_length();

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut last_logged = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| BgRemovalError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;

            // Log roughly every 50 MB
            if downloaded - last_logged >= 50 * 1024 * 1024 {
                last_logged = downloaded;
                match total_size {
                    Some(total) => log::info!(
                        "Downloaded {:.1} / {:.1} MB",
                        downloaded as f64 / 1_048_576.0,
                        total as f64 / 1_048_576.0
                    ),
                    None => log::info!("Downloaded {:.1} MB", downloaded as f64 / 1_048_576.0),
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush file", local_path, &e))?;

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(())
    }

    /// Verify a file against an expected SHA-256 hex digest
    ///
    /// Returns `true` when no hash is expected.
    ///
    /// # Errors
    /// - File cannot be read
    pub fn verify_file_integrity(&self, file_path: &Path, expected_hash: Option<&str>) -> Result<bool> {
        let Some(expected) = expected_hash else {
            return Ok(true);
        };

        let contents = fs::read(file_path).map_err(|e| {
            BgRemovalError::file_io_error("read file for verification", file_path, &e)
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&contents);
        let actual_hash = format!("{:x}", hasher.finalize());

        if actual_hash.eq_ignore_ascii_case(expected.trim()) {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {}, got {}",
                file_path.display(),
                expected,
                actual_hash
            );
            Ok(false)
        }
    }
}

/// Validate that a URL can be used as a model download source
///
/// # Errors
/// - `InvalidConfig` if the URL is empty, unparsable or not HTTP(S)
pub fn validate_model_url(url: &str) -> Result<Url> {
    if url.trim().is_empty() {
        return Err(BgRemovalError::invalid_config("Model URL cannot be empty"));
    }

    let parsed = Url::parse(url)
        .map_err(|e| BgRemovalError::invalid_config(format!("Invalid model URL {url}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(BgRemovalError::invalid_config(format!(
            "Unsupported URL scheme '{}' in {url}; expected http or https",
            parsed.scheme()
        )));
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(BgRemovalError::invalid_config(format!(
            "Model URL {url} has no host"
        )));
    }

    Ok(parsed)
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Resolve the model file to load, downloading it when necessary
///
/// An existing `--model` path wins. Otherwise the model is fetched from
/// `--model-url`, into the directory of `--model` when one was given and into
/// the cache directory when not.
///
/// # Errors
/// - `Model` if no local file exists and no URL is configured
/// - Download and verification failures
pub async fn resolve_model_path(config: &ServerConfig) -> Result<PathBuf> {
    if let Some(path) = &config.model {
        if path.is_file() {
            return Ok(path.clone());
        }
        if config.model_url.is_none() {
            return Err(BgRemovalError::model(format!(
                "Model file not found: {}",
                path.display()
            )));
        }
    }

    let url = config
        .model_url
        .as_deref()
        .ok_or_else(|| BgRemovalError::invalid_config("No model path or model URL configured"))?;

    let cache_dir = config
        .cache_dir
        .clone()
        .unwrap_or_else(ModelDownloader::default_cache_dir);
    let downloader = ModelDownloader::new(cache_dir)?;
    let downloaded = downloader
        .ensure_model(url, config.model_sha256.as_deref())
        .await?;

    match &config.model {
        Some(path) if path != &downloaded => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .map_err(|e| BgRemovalError::file_io_error("create directory", parent, &e))?;
            }
            fs::copy(&downloaded, path)
                .map_err(|e| BgRemovalError::file_io_error("copy model", path, &e))?;
            Ok(path.clone())
        },
        _ => Ok(downloaded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_validate_model_url() {
        assert!(validate_model_url("https://huggingface.co/a/b/resolve/main/model.onnx").is_ok());
        assert!(validate_model_url("http://localhost:8000/model.onnx").is_ok());
        assert!(validate_model_url("").is_err());
        assert!(validate_model_url("ftp://example.com/model.onnx").is_err());
        assert!(validate_model_url("not a url").is_err());
    }

    #[test]
    fn test_model_path_for_url() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = ModelDownloader::new(dir.path().to_path_buf()).unwrap();

        let path = downloader
            .model_path_for_url("https://example.com/models/BiRefNet-general.onnx?download=1")
            .unwrap();
        assert_eq!(path, dir.path().join("BiRefNet-general.onnx"));

        let fallback = downloader.model_path_for_url("https://example.com/").unwrap();
        assert_eq!(fallback, dir.path().join(DEFAULT_MODEL_FILE));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("model v2.onnx"), "model_v2.onnx");
        assert_eq!(sanitize_file_name("fp16-model_x.onnx"), "fp16-model_x.onnx");
    }

    #[test]
    fn test_verify_file_integrity() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = ModelDownloader::new(dir.path().to_path_buf()).unwrap();
        let file = dir.path().join("hello.bin");
        fs::write(&file, b"hello").unwrap();

        assert!(downloader.verify_file_integrity(&file, None).unwrap());
        assert!(downloader.verify_file_integrity(&file, Some(HELLO_SHA256)).unwrap());
        assert!(downloader
            .verify_file_integrity(&file, Some(&HELLO_SHA256.to_uppercase()))
            .unwrap());
        assert!(!downloader.verify_file_integrity(&file, Some(&"0".repeat(64))).unwrap());
        assert!(downloader
            .verify_file_integrity(&dir.path().join("missing"), Some(HELLO_SHA256))
            .is_err());
    }

    #[tokio::test]
    async fn test_ensure_model_uses_verified_cache() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = ModelDownloader::new(dir.path().to_path_buf()).unwrap();
        let cached = dir.path().join("model.onnx");
        fs::write(&cached, b"hello").unwrap();

        // Unroutable URL: the call must succeed without touching the network
        let path = downloader
            .ensure_model("http://127.0.0.1:9/model.onnx", Some(HELLO_SHA256))
            .await
            .unwrap();
        assert_eq!(path, cached);
    }

    #[tokio::test]
    async fn test_resolve_existing_local_model() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = ServerConfig {
            model: Some(file.path().to_path_buf()),
            ..ServerConfig::default()
        };
        assert_eq!(resolve_model_path(&config).await.unwrap(), file.path());
    }

    #[tokio::test]
    async fn test_resolve_missing_model_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            model: Some(dir.path().join("absent.onnx")),
            ..ServerConfig::default()
        };
        let err = resolve_model_path(&config).await.unwrap_err();
        assert!(matches!(err, BgRemovalError::Model(_)));
    }
}
