//! Store traits the pipeline persists through, implemented on the sea-orm connection.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::entities::{
    comics::{self, ComicStatus},
    credit_balances,
};
use crate::owner::OwnerId;
use crate::pipeline::UpdateError;

/// What a finished comic stores: panels in order, one caption per panel.
#[derive(Clone, Debug, PartialEq)]
pub struct ComicAssets {
    /// Title from the planner, if any
    pub title: Option<String>,
    /// Panel URLs in ascending scene order
    pub image_urls: Vec<String>,
    /// Captions, index-aligned with `image_urls`
    pub captions: Vec<String>,
    /// Scene numbers that failed to render
    pub dropped_scenes: Vec<u32>,
    /// When the panels were attached (UTC)
    pub created_at: NaiveDateTime,
}

/// A finished comic as read back from storage.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComicRecord {
    /// db id
    pub id: i32,
    /// Owner the comic belongs to
    pub owner_id: String,
    /// The submitted idea
    pub prompt: String,
    /// Title from the planner, if any
    pub title: Option<String>,
    /// Panel URLs in order
    pub image_urls: Vec<String>,
    /// Captions, index-aligned with `image_urls`
    pub captions: Vec<String>,
    /// Scene numbers that failed to render
    pub dropped_scenes: Vec<u32>,
    /// When the panels were attached (UTC)
    pub created_at: NaiveDateTime,
}

impl ComicRecord {
    /// Panels zipped with their captions.
    pub fn panels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.image_urls
            .iter()
            .zip(self.captions.iter())
            .map(|(url, caption)| (url.as_str(), caption.as_str()))
    }
}

fn decode<T: DeserializeOwned>(id: i32, field: &str, raw: Option<&str>) -> Result<T, UpdateError> {
    let raw = raw.ok_or_else(|| UpdateError::Corrupt {
        id,
        reason: format!("{field} is missing"),
    })?;
    serde_json::from_str(raw).map_err(|err| UpdateError::Corrupt {
        id,
        reason: format!("{field}: {err}"),
    })
}

impl TryFrom<comics::Model> for ComicRecord {
    type Error = UpdateError;

    fn try_from(model: comics::Model) -> Result<Self, Self::Error> {
        if model.status != ComicStatus::AssetsAttached {
            return Err(UpdateError::Corrupt {
                id: model.id,
                reason: format!("status is {}", model.status),
            });
        }
        let created_at = model.created_at.ok_or_else(|| UpdateError::Corrupt {
            id: model.id,
            reason: "created_at is missing".to_string(),
        })?;
        let image_urls: Vec<String> = decode(model.id, "image_urls", model.image_urls.as_deref())?;
        let captions: Vec<String> = decode(model.id, "captions", model.captions.as_deref())?;
        if image_urls.len() != captions.len() {
            return Err(UpdateError::Corrupt {
                id: model.id,
                reason: format!(
                    "{} panels but {} captions",
                    image_urls.len(),
                    captions.len()
                ),
            });
        }
        let dropped_scenes = match model.dropped_scenes.as_deref() {
            Some(raw) => decode(model.id, "dropped_scenes", Some(raw))?,
            None => Vec::new(),
        };
        Ok(Self {
            id: model.id,
            owner_id: model.owner_id,
            prompt: model.prompt,
            title: model.title,
            image_urls,
            captions,
            dropped_scenes,
            created_at,
        })
    }
}

/// Durable home of comic records.
#[async_trait]
pub trait ComicStore: Send + Sync {
    /// Records an attempt (prompt + owner) before rendering; returns its id.
    async fn insert_stub(
        &self,
        owner: &OwnerId,
        prompt: &str,
        requested_at: NaiveDateTime,
    ) -> Result<i32, UpdateError>;

    /// Attaches rendered panels to a stub. Allowed once per record.
    async fn attach_assets(&self, id: i32, assets: &ComicAssets) -> Result<(), UpdateError>;

    /// Writes a finished comic in one go; returns its id.
    async fn insert_complete(
        &self,
        owner: &OwnerId,
        prompt: &str,
        assets: &ComicAssets,
    ) -> Result<i32, UpdateError>;

    /// Finished comics, newest first.
    async fn list_by_owner(
        &self,
        owner: &OwnerId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ComicRecord>, UpdateError>;

    /// The owner's most recent finished comic.
    async fn latest_for_owner(&self, owner: &OwnerId) -> Result<Option<ComicRecord>, UpdateError> {
        Ok(self.list_by_owner(owner, 0, 1).await?.into_iter().next())
    }

    /// Finished comics the owner created on `date` (UTC).
    async fn count_by_owner_and_date(
        &self,
        owner: &OwnerId,
        date: NaiveDate,
    ) -> Result<u64, UpdateError>;
}

/// Durable home of purchased credit balances.
#[async_trait]
pub trait CreditStore: Send + Sync {
    /// Current purchased balance, 0 if none.
    async fn purchased_balance(&self, owner: &OwnerId) -> Result<i64, UpdateError>;

    /// Overwrites the purchased balance.
    async fn set_purchased_balance(&self, owner: &OwnerId, value: i64) -> Result<(), UpdateError>;

    /// Atomically subtracts `amount` (saturating at 0); returns what is left.
    async fn debit_purchased(&self, owner: &OwnerId, amount: i64) -> Result<i64, UpdateError>;

    /// Adds purchased credits; returns the new balance.
    async fn top_up(&self, owner: &OwnerId, amount: i64) -> Result<i64, UpdateError>;
}

#[async_trait]
impl ComicStore for DatabaseConnection {
    async fn insert_stub(
        &self,
        owner: &OwnerId,
        prompt: &str,
        requested_at: NaiveDateTime,
    ) -> Result<i32, UpdateError> {
        comics::insert_stub(self, owner.as_str(), prompt, requested_at).await
    }

    async fn attach_assets(&self, id: i32, assets: &ComicAssets) -> Result<(), UpdateError> {
        comics::attach_assets(self, id, assets).await
    }

    async fn insert_complete(
        &self,
        owner: &OwnerId,
        prompt: &str,
        assets: &ComicAssets,
    ) -> Result<i32, UpdateError> {
        comics::insert_complete(self, owner.as_str(), prompt, assets).await
    }

    async fn list_by_owner(
        &self,
        owner: &OwnerId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ComicRecord>, UpdateError> {
        comics::list_by_owner(self, owner.as_str(), offset, limit)
            .await?
            .into_iter()
            .map(ComicRecord::try_from)
            .collect()
    }

    async fn count_by_owner_and_date(
        &self,
        owner: &OwnerId,
        date: NaiveDate,
    ) -> Result<u64, UpdateError> {
        Ok(comics::count_by_owner_on(self, owner.as_str(), date).await?)
    }
}

#[async_trait]
impl CreditStore for DatabaseConnection {
    async fn purchased_balance(&self, owner: &OwnerId) -> Result<i64, UpdateError> {
        Ok(credit_balances::purchased(self, owner.as_str()).await?)
    }

    async fn set_purchased_balance(&self, owner: &OwnerId, value: i64) -> Result<(), UpdateError> {
        Ok(credit_balances::set_purchased(self, owner.as_str(), value).await?)
    }

    async fn debit_purchased(&self, owner: &OwnerId, amount: i64) -> Result<i64, UpdateError> {
        credit_balances::debit(self, owner.as_str(), amount).await
    }

    async fn top_up(&self, owner: &OwnerId, amount: i64) -> Result<i64, UpdateError> {
        Ok(credit_balances::top_up(self, owner.as_str(), amount).await?)
    }
}
