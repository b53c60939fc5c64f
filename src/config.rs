//! Config handling

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use sea_orm::DatabaseConnection;
use tracing::{info, log::LevelFilter};

use crate::cli::{ImageBackend, PipelineOptions};
use crate::pipeline::{Coordinator, PipelineConfig};
use crate::upstream::fal::{DEFAULT_FAL_MODEL, FalImages};
use crate::upstream::openai::{DEFAULT_OPENAI_IMAGE_MODEL, OpenAiImages, OpenAiText};
use crate::upstream::{ImageGenerator, TextGenerator, http_client};

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("sqlx", LevelFilter::Warn)
            .with_module_level("sea_orm", LevelFilter::Warn)
            .with_module_level("sea_orm_migration", LevelFilter::Warn)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// The OpenAI text client used for planning and captions.
pub fn text_generator(
    options: &PipelineOptions,
    client: reqwest::Client,
) -> anyhow::Result<Arc<dyn TextGenerator>> {
    let api_key = options
        .openai_api_key
        .as_deref()
        .ok_or_else(|| anyhow!("OPENAI_API_KEY is required for scene planning"))?;
    let text = OpenAiText::new(
        client,
        &options.openai_base_url,
        api_key,
        &options.text_model,
        Duration::from_secs(options.upstream_timeout_secs),
    )
    .context("invalid OpenAI base URL")?;
    Ok(Arc::new(text))
}

/// The image client for the configured backend.
pub fn image_generator(
    options: &PipelineOptions,
    client: reqwest::Client,
) -> anyhow::Result<Arc<dyn ImageGenerator>> {
    let timeout = Duration::from_secs(options.upstream_timeout_secs);
    match options.image_backend {
        ImageBackend::Fal => {
            let api_key = options
                .fal_key
                .as_deref()
                .ok_or_else(|| anyhow!("FAL_KEY is required for the fal image backend"))?;
            let model = options.image_model.as_deref().unwrap_or(DEFAULT_FAL_MODEL);
            info!("Rendering panels with fal model {model}");
            let images = FalImages::new(client, &options.fal_base_url, api_key, model, timeout)
                .context("invalid fal base URL")?;
            Ok(Arc::new(images))
        }
        ImageBackend::Openai => {
            let api_key = options
                .openai_api_key
                .as_deref()
                .ok_or_else(|| anyhow!("OPENAI_API_KEY is required for the openai image backend"))?;
            let model = options
                .image_model
                .as_deref()
                .unwrap_or(DEFAULT_OPENAI_IMAGE_MODEL);
            info!("Rendering panels with OpenAI model {model}");
            let images = OpenAiImages::new(
                client,
                &options.openai_base_url,
                api_key,
                model,
                options.panel_dir.clone(),
                timeout,
            )
            .context("invalid OpenAI base URL")?;
            Ok(Arc::new(images))
        }
    }
}

/// Validates the options and builds a coordinator over `db`.
pub fn build_coordinator(
    options: &PipelineOptions,
    db: DatabaseConnection,
) -> anyhow::Result<Coordinator> {
    if options.panel_count == 0 {
        return Err(anyhow!("panel count must be at least 1"));
    }
    if options.comic_cost < 0 {
        return Err(anyhow!("comic cost can't be negative"));
    }
    let client = http_client(Duration::from_secs(options.upstream_timeout_secs))
        .context("failed to build HTTP client")?;
    let text = text_generator(options, client.clone())?;
    let images = image_generator(options, client)?;
    let store = Arc::new(db);
    Ok(Coordinator::new(
        text,
        images,
        store.clone(),
        store,
        PipelineConfig::from(options),
    ))
}
