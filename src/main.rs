use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use img_enhance_rs::{web, Config, EnhancePipeline, ImageStore, Model};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    config.validate()?;

    let store = ImageStore::new(&config.upload_dir, &config.generated_dir);
    store.create_dirs()?;
    tracing::info!("Uploads: {}", store.upload_dir().display());
    tracing::info!("Generated: {}", store.generated_dir().display());

    // Loaded once, before any traffic; shared read-only afterwards.
    let model = Model::new(&config.model_path, config.device_id, config.intra_threads)
        .with_context(|| format!("Failed to load model: {}", config.model_path.display()))?;

    let pipeline = Arc::new(EnhancePipeline::new(Arc::new(model), store));
    web::serve(pipeline, &config).await?;

    Ok(())
}
