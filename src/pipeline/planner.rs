//! Scene planning: one story idea in, N ordered scene descriptions out.
//!
//! The text model is asked for a flat JSON object keyed `"Scene 1"`..`"Scene N"`
//! (with `"Scene 0"` reserved for a title). Its answer is treated as untrusted
//! input and validated into a [ScenePlan], or rejected with a
//! [MalformedPlanError]. Captions come from a second, optional call whose
//! failure only costs us the short captions.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::{MalformedPlanError, PlanError, UpstreamError};
use crate::constants::{CAPTION_MAX_OUTPUT_TOKENS, PLAN_MAX_OUTPUT_TOKENS, PLAN_TEMPERATURE};
use crate::upstream::TextGenerator;

/// One planned panel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SceneSpec {
    /// 1-based position in the strip
    pub index: u32,
    /// What the panel should show
    pub description: String,
    /// Short caption, when the caption call succeeded
    pub caption: Option<String>,
}

impl SceneSpec {
    /// The caption to print under the panel, falling back to the full description.
    pub fn caption_or_description(&self) -> &str {
        self.caption.as_deref().unwrap_or(&self.description)
    }
}

/// The full plan for a strip, scenes in ascending index order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScenePlan {
    /// Title, if the model gave one
    pub title: Option<String>,
    /// Exactly the configured number of scenes
    pub scenes: Vec<SceneSpec>,
}

/// A validated label→text answer, entries ordered by label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabeledText {
    /// The value under label 0, if present
    pub title: Option<String>,
    /// Values for labels `1..=expected`, in label order
    pub entries: Vec<String>,
}

/// Builds plans from ideas using a [TextGenerator].
pub struct ScenePlanner {
    text: Arc<dyn TextGenerator>,
    panel_count: usize,
    captions: bool,
    call_timeout: Duration,
}

impl ScenePlanner {
    /// `panel_count` is the exact number of scenes every plan must have.
    pub fn new(
        text: Arc<dyn TextGenerator>,
        panel_count: usize,
        captions: bool,
        call_timeout: Duration,
    ) -> Self {
        Self {
            text,
            panel_count,
            captions,
            call_timeout,
        }
    }

    /// Number of scenes each plan has
    pub fn panel_count(&self) -> usize {
        self.panel_count
    }

    /// Asks for the scenes, validates them, then tries to add captions.
    pub async fn plan(&self, idea: &str) -> Result<ScenePlan, PlanError> {
        let raw = self
            .complete(
                &scene_instructions(idea, self.panel_count),
                PLAN_MAX_OUTPUT_TOKENS,
            )
            .await?;
        let labeled = parse_labeled_text(&raw, self.panel_count)?;
        debug!(
            "Planned {} scenes (title: {:?})",
            labeled.entries.len(),
            labeled.title
        );

        let mut scenes: Vec<SceneSpec> = (1u32..)
            .zip(labeled.entries)
            .map(|(index, description)| SceneSpec {
                index,
                description,
                caption: None,
            })
            .collect();

        if self.captions {
            match self.captions_for(&scenes).await {
                Ok(captions) => {
                    for (scene, caption) in scenes.iter_mut().zip(captions) {
                        scene.caption = Some(caption);
                    }
                }
                Err(err) => {
                    warn!("Caption request failed, using scene descriptions instead: {err}");
                }
            }
        }

        Ok(ScenePlan {
            title: labeled.title,
            scenes,
        })
    }

    async fn captions_for(&self, scenes: &[SceneSpec]) -> Result<Vec<String>, PlanError> {
        let raw = self
            .complete(&caption_instructions(scenes), CAPTION_MAX_OUTPUT_TOKENS)
            .await?;
        Ok(parse_labeled_text(&raw, scenes.len())?.entries)
    }

    async fn complete(&self, instruction: &str, max_output_tokens: u32) -> Result<String, UpstreamError> {
        tokio::time::timeout(
            self.call_timeout,
            self.text
                .complete(instruction, max_output_tokens, PLAN_TEMPERATURE),
        )
        .await
        .unwrap_or(Err(UpstreamError::Timeout {
            service: "text generation",
            after: self.call_timeout,
        }))
    }
}

/// The planning instruction for `panel_count` scenes.
pub fn scene_instructions(idea: &str, panel_count: usize) -> String {
    format!(
        r#"Based on the following prompt, generate {panel_count} prompts for images that would describe a comic sequence in a progressive manner.
Each prompt should depict one scene of the story, following on from the previous one.

Return a JSON object:
- keys "Scene 1" to "Scene {panel_count}", each value describing that scene in one or two sentences
- key "Scene 0" holding a short title for the comic
No other keys. Return only the JSON object.

The prompt: {idea}"#
    )
}

/// The caption instruction for an already planned strip.
pub fn caption_instructions(scenes: &[SceneSpec]) -> String {
    let mut s = String::from("Here are the scenes of a comic strip, in order:\n");
    for scene in scenes {
        s.push_str(&format!("Scene {}: {}\n", scene.index, scene.description));
    }
    s.push_str(&format!(
        r#"
Write one short caption (at most 15 words) for each scene.
Return a JSON object with keys "Scene 1" to "Scene {}" mapping each scene to its caption. Return only the JSON object."#,
        scenes.len()
    ));
    s
}

/// Models like to wrap JSON in a Markdown fence even when told not to.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // anything after the closing fence is chatter
    let inner = match inner.rfind("```") {
        Some(end) => &inner[..end],
        None => inner,
    };
    let inner = inner.trim_start();
    // drop an info string like `json`, on its own line or glued to the body
    let inner = match inner.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &inner[4..],
        _ => match inner.find('\n') {
            Some(newline) if !inner[..newline].trim_start().starts_with('{') => {
                &inner[newline + 1..]
            }
            _ => inner,
        },
    };
    inner.trim()
}

/// Accepts `Scene 3`, `scene 3`, `Scene3` and `3`.
fn parse_label(key: &str) -> Option<u32> {
    let key = key.trim();
    let number = match key.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("scene") => &key[5..],
        _ => key,
    };
    number.trim().parse().ok()
}

/// Parses a flat `{label: text}` object with exactly `expected` numbered entries.
///
/// Entries come back ordered by numeric label, whatever order the keys had in
/// the answer. Label 0 is the optional title.
pub fn parse_labeled_text(raw: &str, expected: usize) -> Result<LabeledText, MalformedPlanError> {
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body)
        .map_err(|err| MalformedPlanError::new(format!("answer is not JSON: {err}")))?;
    let Value::Object(map) = value else {
        return Err(MalformedPlanError::new("answer is not a JSON object"));
    };

    let mut title = None;
    let mut title_seen = false;
    let mut entries: BTreeMap<u32, String> = BTreeMap::new();
    for (key, value) in map {
        let label = parse_label(&key)
            .ok_or_else(|| MalformedPlanError::new(format!("unexpected key {key:?}")))?;
        let Value::String(text) = value else {
            return Err(MalformedPlanError::new(format!(
                "value for {key:?} is not a string"
            )));
        };
        let text = text.trim().to_string();
        if label == 0 {
            if title_seen {
                return Err(MalformedPlanError::new("the title appears more than once"));
            }
            title_seen = true;
            if !text.is_empty() {
                title = Some(text);
            }
            continue;
        }
        if text.is_empty() {
            return Err(MalformedPlanError::new(format!("scene {label} is empty")));
        }
        if entries.insert(label, text).is_some() {
            return Err(MalformedPlanError::new(format!(
                "scene {label} appears more than once"
            )));
        }
    }

    if entries.len() != expected {
        return Err(MalformedPlanError::new(format!(
            "expected {expected} scenes, got {}",
            entries.len()
        )));
    }
    // with the count right, any gap shows up as a label past the end
    if let Some((&label, _)) = entries.iter().find(|(label, _)| **label as usize > expected) {
        return Err(MalformedPlanError::new(format!(
            "scene {label} is out of range 1..={expected}"
        )));
    }

    Ok(LabeledText {
        title,
        entries: entries.into_values().collect(),
    })
}
