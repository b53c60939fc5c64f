//! The panel-generation pipeline.
//!
//! [Coordinator::run] takes one idea through the [ScenePlanner], fans the
//! scenes out to the [PanelRenderer], keeps whatever panels succeeded in scene
//! order, persists them and charges the owner once. A comic with some panels
//! missing is still a comic; only an empty one is a failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

pub mod credits;
mod error;
pub mod planner;
pub mod renderer;

pub use credits::{Charge, CreditBalance, CreditMeter, daily_allowance_for};
pub use error::{
    MalformedPlanError, PipelineError, PlanError, RenderError, RenderFailure, UpdateError,
    UpstreamError,
};
pub use planner::{ScenePlan, ScenePlanner, SceneSpec};
pub use renderer::{PanelRenderer, PanelResult};

use crate::cli::PipelineOptions;
use crate::constants::{
    DEFAULT_COMIC_COST, DEFAULT_MAX_IDEA_CHARS, DEFAULT_PANEL_COUNT, DEFAULT_UPSTREAM_TIMEOUT_SECS,
};
use crate::db::store::{ComicAssets, ComicStore, CreditStore};
use crate::owner::OwnerId;
use crate::upstream::{ImageGenerator, TextGenerator};

/// Knobs for a [Coordinator].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Scenes per comic
    pub panel_count: usize,
    /// Ask for short captions after planning
    pub captions: bool,
    /// Write a `Created` row before rendering
    pub audit_attempts: bool,
    /// Credits per comic
    pub comic_cost: i64,
    /// Longest accepted idea, in characters
    pub max_idea_chars: usize,
    /// Per upstream call
    pub upstream_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            panel_count: DEFAULT_PANEL_COUNT,
            captions: true,
            audit_attempts: true,
            comic_cost: DEFAULT_COMIC_COST,
            max_idea_chars: DEFAULT_MAX_IDEA_CHARS,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        }
    }
}

impl From<&PipelineOptions> for PipelineConfig {
    fn from(options: &PipelineOptions) -> Self {
        Self {
            panel_count: options.panel_count,
            captions: options.captions,
            audit_attempts: options.audit_attempts,
            comic_cost: options.comic_cost,
            max_idea_chars: options.max_idea_chars,
            upstream_timeout: Duration::from_secs(options.upstream_timeout_secs),
        }
    }
}

/// One rendered panel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Panel {
    /// Which scene it shows
    pub scene_index: u32,
    /// Where the image lives
    pub image_url: String,
    /// Caption to print under it
    pub caption: String,
}

/// What a successful run hands back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComicStrip {
    /// Stored record, absent if persisting failed
    pub record_id: Option<i32>,
    /// Title from the planner
    pub title: Option<String>,
    /// The idea, trimmed
    pub prompt: String,
    /// Surviving panels, ascending scene order
    pub panels: Vec<Panel>,
    /// Scenes that failed to render, ascending
    pub dropped_scenes: Vec<u32>,
    /// How the run was paid for
    pub charge: Charge,
}

impl ComicStrip {
    /// Panel URLs in order.
    pub fn ordered_image_urls(&self) -> Vec<&str> {
        self.panels.iter().map(|panel| panel.image_url.as_str()).collect()
    }

    /// Captions in order, one per URL.
    pub fn ordered_captions(&self) -> Vec<&str> {
        self.panels.iter().map(|panel| panel.caption.as_str()).collect()
    }
}

/// Runs the whole pipeline for one request at a time per owner.
pub struct Coordinator {
    planner: ScenePlanner,
    renderer: PanelRenderer,
    comics: Arc<dyn ComicStore>,
    meter: CreditMeter,
    config: PipelineConfig,
}

impl Coordinator {
    /// Wires the upstream generators and stores together.
    pub fn new(
        text: Arc<dyn TextGenerator>,
        images: Arc<dyn ImageGenerator>,
        comics: Arc<dyn ComicStore>,
        credit_store: Arc<dyn CreditStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            planner: ScenePlanner::new(
                text,
                config.panel_count,
                config.captions,
                config.upstream_timeout,
            ),
            renderer: PanelRenderer::new(images, config.upstream_timeout),
            meter: CreditMeter::new(comics.clone(), credit_store, config.comic_cost),
            comics,
            config,
        }
    }

    /// The credit meter, for balance pages and top-ups
    pub fn meter(&self) -> &CreditMeter {
        &self.meter
    }

    /// The comic store, for history pages
    pub fn comics(&self) -> &dyn ComicStore {
        self.comics.as_ref()
    }

    /// Current settings
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Turns an idea into a stored, paid-for comic strip.
    ///
    /// Runs for the same owner queue behind each other: the owner lock is held
    /// from the credit check through planning and rendering until the charge.
    #[instrument(skip_all, fields(owner = %owner))]
    pub async fn run(&self, idea: &str, owner: &OwnerId) -> Result<ComicStrip, PipelineError> {
        let idea = idea.trim();
        if idea.is_empty() {
            return Err(PipelineError::EmptyIdea);
        }
        if idea.chars().count() > self.config.max_idea_chars {
            return Err(PipelineError::IdeaTooLong {
                max: self.config.max_idea_chars,
            });
        }

        let _run = self.meter.lock_owner(owner).await;
        let before = self.meter.balance(owner, Utc::now().date_naive()).await?;
        if !before.has_credit() {
            info!("{owner} has no credits left");
            return Err(PipelineError::InsufficientCredits);
        }

        let stub_id = if self.config.audit_attempts {
            match self
                .comics
                .insert_stub(owner, idea, Utc::now().naive_utc())
                .await
            {
                Ok(id) => Some(id),
                Err(err) => {
                    warn!("Could not record attempt, will store the comic in one write: {err}");
                    None
                }
            }
        } else {
            None
        };

        let plan = self.planner.plan(idea).await.map_err(|err| {
            warn!("Planning failed (attempt {stub_id:?}): {err}");
            PipelineError::PlanningFailed(err)
        })?;

        let results = self.renderer.render_all(&plan.scenes).await;
        let (panels, dropped_scenes) = assemble(&plan, results);
        if panels.is_empty() {
            error!("All {} panels failed (attempt {stub_id:?})", plan.scenes.len());
            return Err(PipelineError::AllPanelsFailed {
                attempted: plan.scenes.len(),
            });
        }

        let assets = ComicAssets {
            title: plan.title.clone(),
            image_urls: panels.iter().map(|panel| panel.image_url.clone()).collect(),
            captions: panels.iter().map(|panel| panel.caption.clone()).collect(),
            dropped_scenes: dropped_scenes.clone(),
            created_at: Utc::now().naive_utc(),
        };
        let stored = match stub_id {
            Some(id) => self.comics.attach_assets(id, &assets).await.map(|()| id),
            None => self.comics.insert_complete(owner, idea, &assets).await,
        };
        let record_id = match stored {
            Ok(id) => Some(id),
            Err(err) => {
                error!("Failed to store comic for {owner}: {err}");
                None
            }
        };

        let charge = self.meter.charge(owner, &before).await;
        info!(
            "Comic {record_id:?} done: {} panels, dropped {dropped_scenes:?}, charge {charge:?}",
            panels.len()
        );

        Ok(ComicStrip {
            record_id,
            title: plan.title,
            prompt: idea.to_string(),
            panels,
            dropped_scenes,
            charge,
        })
    }
}

/// Keeps successful panels in scene order and lists the dropped scenes.
fn assemble(plan: &ScenePlan, results: Vec<PanelResult>) -> (Vec<Panel>, Vec<u32>) {
    let mut panels = Vec::with_capacity(results.len());
    let mut dropped = Vec::new();
    for result in results {
        match result.outcome {
            Ok(image_url) => {
                let caption = plan
                    .scenes
                    .iter()
                    .find(|scene| scene.index == result.scene_index)
                    .map(|scene| scene.caption_or_description().to_string())
                    .unwrap_or_default();
                panels.push(Panel {
                    scene_index: result.scene_index,
                    image_url,
                    caption,
                });
            }
            Err(err) => {
                warn!("Dropping panel: {err}");
                dropped.push(result.scene_index);
            }
        }
    }
    panels.sort_by_key(|panel| panel.scene_index);
    dropped.sort_unstable();
    (panels, dropped)
}
