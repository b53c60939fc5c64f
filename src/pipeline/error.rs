//! Error taxonomy for planning, rendering, persistence and the pipeline as a whole.

use thiserror::Error;

pub use crate::upstream::UpstreamError;

/// The planner's answer could not be turned into the expected scene mapping.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed scene plan: {reason}")]
pub struct MalformedPlanError {
    /// What was wrong with the answer
    pub reason: String,
}

impl MalformedPlanError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Why the planner could not produce a plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The text service could not be reached or refused the request
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// The text service answered with something we cannot use
    #[error(transparent)]
    Malformed(#[from] MalformedPlanError),
}

/// Why a single panel failed.
#[derive(Debug, Error)]
pub enum RenderFailure {
    /// The image service call failed or timed out
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// The image service answered with no images
    #[error("no images returned")]
    NoImages,
    /// The render task died before reporting back
    #[error("render task aborted")]
    Aborted,
}

/// A panel that could not be rendered, tagged with its scene.
#[derive(Debug, Error)]
#[error("scene {scene_index} failed to render: {kind}")]
pub struct RenderError {
    /// 1-based scene number
    pub scene_index: u32,
    /// What went wrong
    #[source]
    pub kind: RenderFailure,
}

/// A storage read or write failed.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The database refused the operation
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    /// Tried to update a comic that does not exist
    #[error("comic {0} does not exist")]
    MissingRecord(i32),
    /// Assets can only be attached once
    #[error("comic {0} already has assets attached")]
    AlreadyAttached(i32),
    /// A stored row could not be read back
    #[error("comic {id} has unreadable stored data: {reason}")]
    Corrupt {
        /// db id
        id: i32,
        /// what was wrong
        reason: String,
    },
    /// Could not serialise panel data for storage
    #[error("failed to encode comic data: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Fatal outcomes of a pipeline run. Partial success is not an error.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Nothing to draw
    #[error("please describe your comic idea")]
    EmptyIdea,
    /// Idea exceeds the configured maximum
    #[error("your idea is longer than {max} characters")]
    IdeaTooLong {
        /// configured limit
        max: usize,
    },
    /// Daily allowance and purchased balance are both spent
    #[error("you do not have enough credits to generate a comic")]
    InsufficientCredits,
    /// The planner failed; nothing was rendered
    #[error("could not plan the comic: {0}")]
    PlanningFailed(#[source] PlanError),
    /// Every panel failed; nothing was stored or charged
    #[error("all {attempted} panels failed to render")]
    AllPanelsFailed {
        /// how many panels were attempted
        attempted: usize,
    },
    /// Reading credits failed before any work started
    #[error("could not read credits: {0}")]
    Store(#[from] UpdateError),
}
