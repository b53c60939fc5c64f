use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use tracing::debug;

use super::AppState;
use crate::error::ComicError;
use crate::owner::OwnerId;

/// The signed-in owner, as asserted by the identity proxy in front of us.
#[derive(Debug, Clone)]
pub(crate) struct Owner(pub(crate) OwnerId);

impl Owner {
    /// `None` when the header is absent, an error when it is present but unusable.
    fn from_headers(headers: &HeaderMap, header: &str) -> Result<Option<Self>, ComicError> {
        let Some(value) = headers.get(header) else {
            return Ok(None);
        };
        let value = value.to_str().map_err(|_| {
            debug!("Owner header is not valid ASCII");
            ComicError::Unauthorized
        })?;
        let owner = OwnerId::new(value).map_err(|err| {
            debug!("Rejecting owner header: {err}");
            ComicError::Unauthorized
        })?;
        Ok(Some(Self(owner)))
    }
}

impl FromRequestParts<AppState> for Owner {
    type Rejection = ComicError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers, &state.owner_header)?.ok_or(ComicError::Unauthorized)
    }
}

impl OptionalFromRequestParts<AppState> for Owner {
    type Rejection = ComicError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Self::from_headers(&parts.headers, &state.owner_header)
    }
}
