//! Server and inference configuration

use crate::error::{BgRemovalError, Result};
use crate::models::DEFAULT_INPUT_SIZE;
use crate::tracing_config::TracingFormat;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

/// Default request body limit (20 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 20 * 1024 * 1024;

/// Execution provider options for ONNX Runtime
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    #[value(name = "coreml")]
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference backend selection
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum BackendType {
    /// ONNX Runtime
    #[default]
    Onnx,
    /// Pure Rust Tract
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Settings handed to an inference backend at initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Enable debug mode (additional logging and validation)
    pub debug: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
            debug: false,
        }
    }
}

impl InferenceConfig {
    #[must_use]
    pub fn builder() -> InferenceConfigBuilder {
        InferenceConfigBuilder::default()
    }
}

/// Builder for `InferenceConfig`
#[derive(Debug, Default)]
pub struct InferenceConfigBuilder {
    config: InferenceConfig,
}

impl InferenceConfigBuilder {
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both intra and inter threads (inter gets half, minimum 1)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn build(self) -> InferenceConfig {
        self.config
    }
}

/// Post-processing switches for background removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalOptions {
    /// Apply a sigmoid to the raw model output (BiRefNet emits logits)
    pub apply_sigmoid: bool,
    /// Run blur-fusion foreground color estimation before attaching alpha
    pub refine_foreground: bool,
}

impl Default for RemovalOptions {
    fn default() -> Self {
        Self {
            apply_sigmoid: true,
            refine_foreground: true,
        }
    }
}

/// Command line and environment configuration for the HTTP server
#[derive(Parser, Debug, Clone)]
#[command(name = "bgremove-server")]
#[command(about = "HTTP service for background removal and alpha-edge borders")]
#[command(version)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "BGREMOVE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "BGREMOVE_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Path to the segmentation model (.onnx)
    #[arg(short, long, env = "BGREMOVE_MODEL", value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// URL to download the model from when no local file is available
    #[arg(long, env = "BGREMOVE_MODEL_URL", value_name = "URL")]
    pub model_url: Option<String>,

    /// Expected SHA-256 of the downloaded model (hex)
    #[arg(long, env = "BGREMOVE_MODEL_SHA256", value_name = "HEX")]
    pub model_sha256: Option<String>,

    /// Directory for downloaded models
    #[arg(long, env = "BGREMOVE_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Inference backend
    #[arg(short, long, env = "BGREMOVE_BACKEND", value_enum, default_value_t = BackendType::Onnx)]
    pub backend: BackendType,

    /// ONNX Runtime execution provider
    #[arg(long, env = "BGREMOVE_EXECUTION_PROVIDER", value_enum, default_value_t = ExecutionProvider::Auto)]
    pub execution_provider: ExecutionProvider,

    /// Intra-op threads (0 = auto)
    #[arg(long, env = "BGREMOVE_INTRA_THREADS", default_value_t = 0)]
    pub intra_threads: usize,

    /// Inter-op threads (0 = auto)
    #[arg(long, env = "BGREMOVE_INTER_THREADS", default_value_t = 0)]
    pub inter_threads: usize,

    /// Square model input resolution
    #[arg(long, env = "BGREMOVE_INPUT_SIZE", default_value_t = DEFAULT_INPUT_SIZE)]
    pub input_size: u32,

    /// Treat model output as probabilities instead of logits
    #[arg(long, env = "BGREMOVE_NO_SIGMOID")]
    pub no_sigmoid: bool,

    /// Skip foreground color refinement
    #[arg(long, env = "BGREMOVE_NO_REFINE")]
    pub no_refine: bool,

    /// Maximum accepted request body in bytes
    #[arg(long, env = "BGREMOVE_MAX_BODY_SIZE", default_value_t = DEFAULT_MAX_BODY_SIZE)]
    pub max_body_size: usize,

    /// Enable verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, env = "BGREMOVE_LOG_FORMAT", value_enum, default_value_t = TracingFormat::Console)]
    pub log_format: TracingFormat,

    /// Print available execution providers and exit
    #[arg(long)]
    pub show_providers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            model: None,
            model_url: None,
            model_sha256: None,
            cache_dir: None,
            backend: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
            input_size: DEFAULT_INPUT_SIZE,
            no_sigmoid: false,
            no_refine: false,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            verbose: 0,
            log_format: TracingFormat::default(),
            show_providers: false,
        }
    }
}

impl ServerConfig {
    /// Validate ranges and combinations
    ///
    /// # Errors
    /// - `InvalidConfig` for a zero input size or body limit, a malformed
    ///   checksum, or an unparsable bind address
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 || self.input_size > 4096 {
            return Err(BgRemovalError::invalid_config(format!(
                "input size {} must be between 1 and 4096",
                self.input_size
            )));
        }

        if self.max_body_size == 0 {
            return Err(BgRemovalError::invalid_config(
                "max body size must be greater than zero",
            ));
        }

        if let Some(hash) = &self.model_sha256 {
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(BgRemovalError::invalid_config(
                    "model SHA-256 must be 64 hex characters",
                ));
            }
        }

        if self.model.is_none() && self.model_url.is_none() {
            return Err(BgRemovalError::invalid_config(
                "either --model or --model-url must be provided",
            ));
        }

        self.socket_addr()?;
        Ok(())
    }

    /// Bind address built from host and port
    ///
    /// The host may be an IP address or a name such as `localhost`; the
    /// first resolved address is used.
    ///
    /// # Errors
    /// - `InvalidConfig` if the host is blank, contains whitespace or does
    ///   not resolve
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let host = self.host.trim();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(BgRemovalError::invalid_config(format!(
                "invalid bind host '{}'",
                self.host
            )));
        }

        (host, self.port)
            .to_socket_addrs()
            .map_err(|e| BgRemovalError::invalid_config(format!("cannot resolve host '{host}': {e}")))?
            .next()
            .ok_or_else(|| BgRemovalError::invalid_config(format!("host '{host}' has no addresses")))
    }

    #[must_use]
    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig::builder()
            .execution_provider(self.execution_provider)
            .intra_threads(self.intra_threads)
            .inter_threads(self.inter_threads)
            .debug(self.verbose > 0)
            .build()
    }

    #[must_use]
    pub fn removal_options(&self) -> RemovalOptions {
        RemovalOptions {
            apply_sigmoid: !self.no_sigmoid,
            refine_foreground: !self.no_refine,
        }
    }
}
