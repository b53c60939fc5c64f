//! Fakes and fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::{DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

use crate::constants::STYLE_DIRECTIVE;
use crate::db::store::{ComicAssets, ComicRecord, ComicStore};
use crate::owner::OwnerId;
use crate::pipeline::{SceneSpec, UpdateError, UpstreamError};
use crate::upstream::{ImageGenerator, TextGenerator};

pub(crate) async fn setup_db() -> DatabaseConnection {
    let db = crate::db::connect_test_db()
        .await
        .expect("connect test db");
    crate::db::migrations::Migrator::up(&db, None)
        .await
        .expect("run migrations");
    db
}

/// A planner answer with `count` scenes plus a title.
pub(crate) fn plan_json(count: u32) -> String {
    let mut map = serde_json::Map::new();
    for index in (1..=count).rev() {
        map.insert(
            format!("Scene {index}"),
            serde_json::Value::String(format!("scene {index} description")),
        );
    }
    map.insert(
        "Scene 0".to_string(),
        serde_json::Value::String("Robot Painter".to_string()),
    );
    serde_json::Value::Object(map).to_string()
}

pub(crate) fn scenes(count: u32) -> Vec<SceneSpec> {
    (1..=count)
        .map(|index| SceneSpec {
            index,
            description: format!("scene {index} description"),
            caption: None,
        })
        .collect()
}

/// Answers text calls from a script, in order.
#[derive(Default)]
pub(crate) struct ScriptedText {
    answers: Mutex<VecDeque<Result<String, UpstreamError>>>,
    instructions: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedText {
    pub(crate) fn new(answers: Vec<Result<String, UpstreamError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn instructions(&self) -> Vec<String> {
        self.instructions.lock().expect("instructions lock").clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedText {
    async fn complete(
        &self,
        instruction: &str,
        _max_output_tokens: u32,
        _temperature: f32,
    ) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.instructions
            .lock()
            .expect("instructions lock")
            .push(instruction.to_string());
        self.answers
            .lock()
            .expect("answers lock")
            .pop_front()
            .unwrap_or(Err(UpstreamError::InvalidResponse {
                service: "scripted text",
                message: "script exhausted".to_string(),
            }))
    }
}

/// Renders `https://img.test/<slugged description>.png`, failing on chosen scenes.
#[derive(Default)]
pub(crate) struct FakeImages {
    fail_on: Vec<String>,
    empty_on: Vec<String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeImages {
    pub(crate) fn failing(descriptions: &[&str]) -> Self {
        Self {
            fail_on: descriptions.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    pub(crate) fn empty_for(descriptions: &[&str]) -> Self {
        Self {
            empty_on: descriptions.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate(&self, prompt: &str) -> Result<Vec<String>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let description = prompt.strip_prefix(STYLE_DIRECTIVE).unwrap_or(prompt);
        if self.fail_on.iter().any(|d| d == description) {
            return Err(UpstreamError::Status {
                service: "fake images",
                status: 500,
                body: "render failed".to_string(),
            });
        }
        if self.empty_on.iter().any(|d| d == description) {
            return Ok(vec![]);
        }
        Ok(vec![format!(
            "https://img.test/{}.png",
            description.replace(' ', "-")
        )])
    }
}

/// Reads go to the real database, every write fails.
pub(crate) struct ReadOnlyComics(pub(crate) DatabaseConnection);

fn refused() -> UpdateError {
    UpdateError::Database(DbErr::Custom("database is read-only".to_string()))
}

#[async_trait]
impl ComicStore for ReadOnlyComics {
    async fn insert_stub(
        &self,
        _owner: &OwnerId,
        _prompt: &str,
        _requested_at: NaiveDateTime,
    ) -> Result<i32, UpdateError> {
        Err(refused())
    }

    async fn attach_assets(&self, _id: i32, _assets: &ComicAssets) -> Result<(), UpdateError> {
        Err(refused())
    }

    async fn insert_complete(
        &self,
        _owner: &OwnerId,
        _prompt: &str,
        _assets: &ComicAssets,
    ) -> Result<i32, UpdateError> {
        Err(refused())
    }

    async fn list_by_owner(
        &self,
        owner: &OwnerId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ComicRecord>, UpdateError> {
        self.0.list_by_owner(owner, offset, limit).await
    }

    async fn count_by_owner_and_date(
        &self,
        owner: &OwnerId,
        date: NaiveDate,
    ) -> Result<u64, UpdateError> {
        self.0.count_by_owner_and_date(owner, date).await
    }
}
