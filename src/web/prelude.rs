pub(crate) use crate::error::ComicError;
pub(crate) use crate::web::AppState;
pub(crate) use askama::Template;
pub(crate) use askama_web::WebTemplate;
pub(crate) use axum::Json;
pub(crate) use axum::extract::{Form, State};
pub(crate) use axum::response::IntoResponse;
pub(crate) use chrono::Utc;
pub(crate) use serde::{Deserialize, Serialize};
pub(crate) use tracing::{info, warn};
