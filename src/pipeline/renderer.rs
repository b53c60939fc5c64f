//! Panel rendering: one image request per scene, all in flight at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::error::{RenderError, RenderFailure, UpstreamError};
use super::planner::SceneSpec;
use crate::constants::STYLE_DIRECTIVE;
use crate::upstream::ImageGenerator;

/// What happened to one scene.
#[derive(Debug)]
pub struct PanelResult {
    /// 1-based scene number
    pub scene_index: u32,
    /// Image URL, or why there isn't one
    pub outcome: Result<String, RenderError>,
}

/// Turns scenes into images with an [ImageGenerator].
pub struct PanelRenderer {
    images: Arc<dyn ImageGenerator>,
    call_timeout: Duration,
}

impl PanelRenderer {
    /// `call_timeout` bounds each image request on its own.
    pub fn new(images: Arc<dyn ImageGenerator>, call_timeout: Duration) -> Self {
        Self {
            images,
            call_timeout,
        }
    }

    /// Renders a single scene. Only the first returned image is used.
    pub async fn render(&self, scene: &SceneSpec) -> Result<String, RenderError> {
        render_scene(self.images.clone(), self.call_timeout, scene.index, &scene.description).await
    }

    /// Renders every scene concurrently.
    ///
    /// Returns one result per input scene, in input order, however the
    /// requests finish. Dropping the future aborts the renders still running.
    pub async fn render_all(&self, scenes: &[SceneSpec]) -> Vec<PanelResult> {
        let mut set = JoinSet::new();
        for (slot, scene) in scenes.iter().enumerate() {
            let images = self.images.clone();
            let call_timeout = self.call_timeout;
            let scene_index = scene.index;
            let description = scene.description.clone();
            set.spawn(async move {
                let outcome = render_scene(images, call_timeout, scene_index, &description).await;
                (slot, outcome)
            });
        }

        let mut slots: Vec<Option<Result<String, RenderError>>> =
            scenes.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((slot, outcome)) => slots[slot] = Some(outcome),
                Err(err) => warn!("Render task did not complete: {err}"),
            }
        }

        scenes
            .iter()
            .zip(slots)
            .map(|(scene, outcome)| PanelResult {
                scene_index: scene.index,
                outcome: outcome.unwrap_or(Err(RenderError {
                    scene_index: scene.index,
                    kind: RenderFailure::Aborted,
                })),
            })
            .collect()
    }
}

async fn render_scene(
    images: Arc<dyn ImageGenerator>,
    call_timeout: Duration,
    scene_index: u32,
    description: &str,
) -> Result<String, RenderError> {
    let prompt = format!("{STYLE_DIRECTIVE}{description}");
    let fail = |kind| RenderError { scene_index, kind };

    let urls = tokio::time::timeout(call_timeout, images.generate(&prompt))
        .await
        .unwrap_or(Err(UpstreamError::Timeout {
            service: "image generation",
            after: call_timeout,
        }))
        .map_err(|err| fail(RenderFailure::Upstream(err)))?;

    match urls.into_iter().next() {
        Some(url) => {
            debug!("Scene {scene_index} rendered to {url}");
            Ok(url)
        }
        None => Err(fail(RenderFailure::NoImages)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeImages, scenes};

    #[tokio::test]
    async fn results_keep_scene_order_and_isolate_failures() {
        let images = Arc::new(FakeImages::failing(&["scene 2 description", "scene 5 description"]));
        let renderer = PanelRenderer::new(images.clone(), Duration::from_secs(5));

        let results = renderer.render_all(&scenes(6)).await;
        assert_eq!(images.calls(), 6);
        let indices: Vec<u32> = results.iter().map(|result| result.scene_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5, 6]);

        let failed: Vec<u32> = results
            .iter()
            .filter(|result| result.outcome.is_err())
            .map(|result| result.scene_index)
            .collect();
        assert_eq!(failed, vec![2, 5]);
        assert_eq!(
            results[0].outcome.as_deref().ok(),
            Some("https://img.test/scene-1-description.png")
        );
    }

    #[tokio::test]
    async fn prompts_carry_the_style_directive() {
        let images = Arc::new(FakeImages::default());
        let renderer = PanelRenderer::new(images.clone(), Duration::from_secs(5));
        renderer.render(&scenes(1)[0]).await.expect("render");
        let prompts = images.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with(STYLE_DIRECTIVE));
        assert!(prompts[0].ends_with("scene 1 description"));
    }

    #[tokio::test]
    async fn empty_answers_and_timeouts_fail_the_panel() {
        let images = Arc::new(FakeImages::empty_for(&["scene 1 description"]));
        let renderer = PanelRenderer::new(images, Duration::from_secs(5));
        let err = renderer.render(&scenes(1)[0]).await.expect_err("no images");
        assert_eq!(err.scene_index, 1);
        assert!(matches!(err.kind, RenderFailure::NoImages));

        let slow = Arc::new(FakeImages::default().with_delay(Duration::from_millis(200)));
        let renderer = PanelRenderer::new(slow, Duration::from_millis(10));
        let err = renderer.render(&scenes(1)[0]).await.expect_err("timed out");
        assert!(matches!(
            err.kind,
            RenderFailure::Upstream(UpstreamError::Timeout { .. })
        ));
    }
}
