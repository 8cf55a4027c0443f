//! Background removal HTTP server
//!
//! Loads the segmentation model once, then serves `/remove-bg`,
//! `/add-border` and `/health`.

use anyhow::Context;
use bgremove_server::{
    download::resolve_model_path,
    models::{ModelManager, PreprocessingConfig},
    processor::{BackgroundRemovalProcessor, DefaultBackendFactory, ModelHandle},
    server::{serve, AppState},
    tracing_config::TracingConfig,
    ServerConfig,
};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = ServerConfig::parse();

    TracingConfig::new()
        .with_verbosity(config.verbose)
        .with_format(config.log_format)
        .with_rust_log()
        .init()?;

    if config.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    config.validate()?;
    let addr = config.socket_addr()?;

    let model_path = resolve_model_path(&config)
        .await
        .context("failed to locate the segmentation model")?;
    info!(path = %model_path.display(), backend = %config.backend, "Loading segmentation model");

    let model_manager = ModelManager::from_file(
        &model_path,
        PreprocessingConfig::with_input_size(config.input_size),
    )?;
    let backend_type = config.backend;
    let inference_config = config.inference_config();
    let model = tokio::task::spawn_blocking(move || {
        ModelHandle::from_factory(
            &DefaultBackendFactory,
            backend_type,
            model_manager,
            &inference_config,
        )
    })
    .await
    .context("model loading task panicked")??;

    let processor = BackgroundRemovalProcessor::new(Arc::new(model), config.removal_options());
    let state = AppState::new(processor).with_max_body_size(config.max_body_size);

    serve(addr, state).await
}

fn show_provider_diagnostics() {
    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    #[cfg(feature = "onnx")]
    print_providers("onnx", &bgremove_server::backends::OnnxBackend::list_providers());

    #[cfg(feature = "tract")]
    print_providers("tract", &bgremove_server::backends::TractBackend::list_providers());
}

#[cfg(any(feature = "onnx", feature = "tract"))]
fn print_providers(backend: &str, providers: &[(String, bool, String)]) {
    println!("\n{backend} backend:");
    for (name, available, description) in providers {
        let status = if *available { "available" } else { "unavailable" };
        println!("  {name}: {status} - {description}");
    }
}
