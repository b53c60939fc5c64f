//! Comic records.
//!
//! A row starts life as [ComicStatus::Created] holding only the owner and the
//! prompt, so failed attempts stay auditable. Attaching the rendered panels moves
//! it to [ComicStatus::AssetsAttached]; that is the only transition, and it
//! happens once.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sea_orm::{
    ActiveValue::Set, IntoActiveModel, PaginatorTrait, QueryOrder, QuerySelect, Select,
    TransactionTrait, entity::prelude::*,
};

use crate::db::store::ComicAssets;
use crate::pipeline::UpdateError;

/// Where a comic row is in its two-phase write
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(1))")]
pub enum ComicStatus {
    /// Prompt recorded, nothing rendered yet (or rendering failed)
    #[sea_orm(string_value = "c")]
    Created,
    /// Panels and captions attached
    #[sea_orm(string_value = "a")]
    AssetsAttached,
}

impl fmt::Display for ComicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComicStatus::Created => write!(f, "created"),
            ComicStatus::AssetsAttached => write!(f, "assets_attached"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "comics")]
/// One comic generation attempt
pub struct Model {
    #[sea_orm(primary_key)]
    /// db id
    pub id: i32,
    /// owner the comic belongs to
    pub owner_id: String,
    /// the idea as the user typed it
    #[sea_orm(column_type = "Text")]
    pub prompt: String,
    /// optional title from the planner
    pub title: Option<String>,
    /// write phase
    pub status: ComicStatus,
    /// JSON array of panel URLs, in panel order
    #[sea_orm(column_type = "Text", nullable)]
    pub image_urls: Option<String>,
    /// JSON array of captions, same length as `image_urls`
    #[sea_orm(column_type = "Text", nullable)]
    pub captions: Option<String>,
    /// JSON array of scene numbers that failed to render
    #[sea_orm(column_type = "Text", nullable)]
    pub dropped_scenes: Option<String>,
    /// when the attempt started
    pub requested_at: DateTime,
    /// when the panels were attached
    pub created_at: Option<DateTime>,
}

/// comics have no relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, UpdateError> {
    serde_json::to_string(value).map_err(UpdateError::from)
}

/// Records an attempt before anything is rendered.
pub(crate) async fn insert_stub(
    db: &DatabaseConnection,
    owner: &str,
    prompt: &str,
    requested_at: NaiveDateTime,
) -> Result<i32, UpdateError> {
    let active = ActiveModel {
        owner_id: Set(owner.to_string()),
        prompt: Set(prompt.to_string()),
        status: Set(ComicStatus::Created),
        requested_at: Set(requested_at),
        ..Default::default()
    };
    Ok(active.insert(db).await?.id)
}

/// Moves a `Created` row to `AssetsAttached`.
pub(crate) async fn attach_assets(
    db: &DatabaseConnection,
    id: i32,
    assets: &ComicAssets,
) -> Result<(), UpdateError> {
    let db_txn = db.begin().await?;
    let Some(model) = Entity::find_by_id(id).one(&db_txn).await? else {
        return Err(UpdateError::MissingRecord(id));
    };
    if model.status == ComicStatus::AssetsAttached {
        return Err(UpdateError::AlreadyAttached(id));
    }

    let mut am = model.into_active_model();
    am.title = Set(assets.title.clone());
    am.status = Set(ComicStatus::AssetsAttached);
    am.image_urls = Set(Some(encode(&assets.image_urls)?));
    am.captions = Set(Some(encode(&assets.captions)?));
    am.dropped_scenes = Set(Some(encode(&assets.dropped_scenes)?));
    am.created_at = Set(Some(assets.created_at));
    am.update(&db_txn).await?;
    db_txn.commit().await?;
    Ok(())
}

/// Single write of a finished comic, used when no stub row exists.
pub(crate) async fn insert_complete(
    db: &DatabaseConnection,
    owner: &str,
    prompt: &str,
    assets: &ComicAssets,
) -> Result<i32, UpdateError> {
    let active = ActiveModel {
        owner_id: Set(owner.to_string()),
        prompt: Set(prompt.to_string()),
        title: Set(assets.title.clone()),
        status: Set(ComicStatus::AssetsAttached),
        image_urls: Set(Some(encode(&assets.image_urls)?)),
        captions: Set(Some(encode(&assets.captions)?)),
        dropped_scenes: Set(Some(encode(&assets.dropped_scenes)?)),
        requested_at: Set(assets.created_at),
        created_at: Set(Some(assets.created_at)),
        ..Default::default()
    };
    Ok(active.insert(db).await?.id)
}

fn finished_for(owner: &str) -> Select<Entity> {
    Entity::find()
        .filter(Column::OwnerId.eq(owner))
        .filter(Column::Status.eq(ComicStatus::AssetsAttached))
}

/// Finished comics for an owner, newest first.
pub(crate) async fn list_by_owner(
    db: &DatabaseConnection,
    owner: &str,
    offset: u64,
    limit: u64,
) -> Result<Vec<Model>, DbErr> {
    finished_for(owner)
        .order_by_desc(Column::CreatedAt)
        .order_by_desc(Column::Id)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await
}

/// Number of finished comics an owner created on `date` (UTC).
pub(crate) async fn count_by_owner_on(
    db: &DatabaseConnection,
    owner: &str,
    date: NaiveDate,
) -> Result<u64, DbErr> {
    let start = date.and_time(NaiveTime::MIN);
    let query = finished_for(owner).filter(Column::CreatedAt.gte(start));
    let query = match date.succ_opt() {
        Some(next) => query.filter(Column::CreatedAt.lt(next.and_time(NaiveTime::MIN))),
        None => query,
    };
    query.count(db).await
}
