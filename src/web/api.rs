//! JSON endpoints for scripted clients.

use axum::extract::rejection::JsonRejection;
use axum::response::Response;
use tracing::instrument;

use super::middleware::Owner;
use super::prelude::*;
use crate::pipeline::ComicStrip;

#[derive(Deserialize)]
pub(crate) struct ComicRequest {
    idea: String,
}

#[derive(Serialize)]
pub(crate) struct CreditsResponse {
    daily_allowance: i64,
    purchased_balance: i64,
    remaining: i64,
    comic_cost: i64,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

/// [ComicError] rendered as `{"message": ...}`.
pub(crate) struct ApiError(ComicError);

impl<E: Into<ComicError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0.log();
        let body = ErrorBody {
            message: self.0.message(),
        };
        (self.0.status(), Json(body)).into_response()
    }
}

/// handles the /api/comics POST
#[instrument(skip_all)]
pub(crate) async fn create_comic_api(
    State(state): State<AppState>,
    owner: Result<Owner, ComicError>,
    request: Result<Json<ComicRequest>, JsonRejection>,
) -> Result<Json<ComicStrip>, ApiError> {
    let owner = owner?;
    let Json(request) =
        request.map_err(|rejection| ComicError::BadRequest(rejection.body_text()))?;
    let strip = state.coordinator.run(&request.idea, &owner.0).await?;
    Ok(Json(strip))
}

/// handles the /api/credits GET
pub(crate) async fn credits_api(
    State(state): State<AppState>,
    owner: Result<Owner, ComicError>,
) -> Result<Json<CreditsResponse>, ApiError> {
    let owner = owner?;
    let meter = state.coordinator.meter();
    let balance = meter.balance(&owner.0, Utc::now().date_naive()).await?;
    Ok(Json(CreditsResponse {
        daily_allowance: balance.daily_allowance,
        purchased_balance: balance.purchased_balance,
        remaining: balance.remaining(),
        comic_cost: meter.cost(),
    }))
}
