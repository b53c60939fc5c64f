//! CLI parser
use clap::{Args, Parser, ValueEnum};
use std::num::NonZeroU16;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_COMIC_COST, DEFAULT_MAX_IDEA_CHARS, DEFAULT_OWNER_HEADER, DEFAULT_PANEL_COUNT,
    DEFAULT_UPSTREAM_TIMEOUT_SECS,
};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "COMICGEN_DEBUG")]
    /// Enable debug logging. Env: COMICGEN_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "COMICGEN_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: COMICGEN_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "COMICGEN_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: COMICGEN_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, default_value = DEFAULT_OWNER_HEADER, env = "COMICGEN_OWNER_HEADER")]
    /// Request header carrying the authenticated owner id, set by the identity proxy.
    /// Env: COMICGEN_OWNER_HEADER
    pub owner_header: String,

    #[clap(flatten)]
    /// Pipeline, storage and upstream settings
    pub pipeline: PipelineOptions,
}

/// Which image backend renders panels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ImageBackend {
    /// fal.ai hosted diffusion models
    #[default]
    Fal,
    /// OpenAI Images API
    Openai,
}

/// Options shared by the server and the one-shot generator binary.
#[derive(Args, Debug, Clone)]
pub struct PipelineOptions {
    #[clap(long, default_value = "comicgen.sqlite", env = "COMICGEN_DATABASE_PATH")]
    /// Path to the database file, eg `/data/comicgen.sqlite`.
    /// Env: COMICGEN_DATABASE_PATH
    pub database_path: String,

    #[clap(long, default_value = "./panels", env = "COMICGEN_PANEL_DIR")]
    /// Where panels returned as raw image data are written.
    /// Env: COMICGEN_PANEL_DIR
    pub panel_dir: PathBuf,

    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    /// OpenAI API key, used for scene planning and the `openai` image backend
    pub openai_api_key: Option<String>,

    #[clap(long, default_value = "https://api.openai.com", env = "COMICGEN_OPENAI_BASE_URL")]
    /// Base URL of the OpenAI API
    pub openai_base_url: String,

    #[clap(long, default_value = "gpt-4.1", env = "COMICGEN_TEXT_MODEL")]
    /// Text model used for scene planning and captions
    pub text_model: String,

    #[clap(long, value_enum, default_value_t = ImageBackend::Fal, env = "COMICGEN_IMAGE_BACKEND")]
    /// Image backend
    pub image_backend: ImageBackend,

    #[clap(long, env = "COMICGEN_IMAGE_MODEL")]
    /// Image model, defaults to `fal-ai/flux/schnell` or `gpt-image-1` depending on the backend
    pub image_model: Option<String>,

    #[clap(long, env = "FAL_KEY", hide_env_values = true)]
    /// fal.ai API key
    pub fal_key: Option<String>,

    #[clap(long, default_value = "https://fal.run", env = "COMICGEN_FAL_BASE_URL")]
    /// Base URL of the fal.ai synchronous API
    pub fal_base_url: String,

    #[clap(long, default_value_t = DEFAULT_PANEL_COUNT, env = "COMICGEN_PANEL_COUNT")]
    /// Number of panels per comic
    pub panel_count: usize,

    #[clap(long, default_value_t = true, action = clap::ArgAction::Set, env = "COMICGEN_CAPTIONS")]
    /// Ask the text model for short captions after planning
    pub captions: bool,

    #[clap(long, default_value_t = true, action = clap::ArgAction::Set, env = "COMICGEN_AUDIT_ATTEMPTS")]
    /// Record every attempt's prompt before rendering, even if it later fails
    pub audit_attempts: bool,

    #[clap(long, default_value_t = DEFAULT_UPSTREAM_TIMEOUT_SECS, env = "COMICGEN_UPSTREAM_TIMEOUT")]
    /// Per-call timeout for upstream services, in seconds
    pub upstream_timeout_secs: u64,

    #[clap(long, default_value_t = DEFAULT_COMIC_COST, env = "COMICGEN_COMIC_COST")]
    /// Credits charged per generated comic
    pub comic_cost: i64,

    #[clap(long, default_value_t = DEFAULT_MAX_IDEA_CHARS, env = "COMICGEN_MAX_IDEA_CHARS")]
    /// Longest accepted story idea, in characters
    pub max_idea_chars: usize,
}
