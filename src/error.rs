//! Error handling

use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{error, info, warn};

use crate::pipeline::{PipelineError, UpdateError};

/// Errors the web layer hands back to clients.
#[derive(Debug)]
pub enum ComicError {
    /// When you didn't do the right thing
    BadRequest(String),
    /// No owner on the request
    Unauthorized,
    /// Out of credits
    PaymentRequired(String),
    /// An upstream model let us down
    BadGateway(String),
    /// When DB operations fail
    DatabaseError(UpdateError),
    /// When a requested resource is not found
    NotFound(String),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl ComicError {
    /// Status code for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ComicError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ComicError::Unauthorized => StatusCode::UNAUTHORIZED,
            ComicError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            ComicError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ComicError::NotFound(_) => StatusCode::NOT_FOUND,
            ComicError::DatabaseError(_) | ComicError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The one line we show the user. Internal details stay in the logs.
    pub fn message(&self) -> String {
        match self {
            ComicError::BadRequest(message)
            | ComicError::PaymentRequired(message)
            | ComicError::BadGateway(message) => message.clone(),
            ComicError::Unauthorized => "Unauthorized: please sign in.".to_string(),
            ComicError::NotFound(_) => "Not Found".to_string(),
            ComicError::DatabaseError(_) => "Database error".to_string(),
            ComicError::InternalServerError(_) => "Internal server error".to_string(),
        }
    }

    /// Logs at a level matching how bad it is.
    pub fn log(&self) {
        match self {
            ComicError::BadRequest(message) => info!("Bad request: {message}"),
            ComicError::Unauthorized => info!("Unauthorized request received"),
            ComicError::PaymentRequired(message) => info!("Payment required: {message}"),
            ComicError::BadGateway(message) => warn!("Upstream failure: {message}"),
            ComicError::NotFound(url) => info!("404 {url}"),
            ComicError::DatabaseError(err) => error!("Database error: {err}"),
            ComicError::InternalServerError(message) => {
                error!("Internal server error: {message}")
            }
        }
    }
}

impl From<PipelineError> for ComicError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::EmptyIdea | PipelineError::IdeaTooLong { .. } => {
                ComicError::BadRequest(err.to_string())
            }
            PipelineError::InsufficientCredits => ComicError::PaymentRequired(err.to_string()),
            PipelineError::PlanningFailed(ref cause) => {
                warn!("Planning failed: {cause}");
                ComicError::BadGateway(
                    "We couldn't come up with scenes for that idea, please try again.".to_string(),
                )
            }
            PipelineError::AllPanelsFailed { .. } => ComicError::BadGateway(
                "None of the panels could be drawn, please try again.".to_string(),
            ),
            PipelineError::Store(err) => ComicError::DatabaseError(err),
        }
    }
}

impl From<UpdateError> for ComicError {
    fn from(err: UpdateError) -> Self {
        ComicError::DatabaseError(err)
    }
}

impl From<sea_orm::DbErr> for ComicError {
    fn from(err: sea_orm::DbErr) -> Self {
        ComicError::DatabaseError(UpdateError::Database(err))
    }
}

impl From<std::io::Error> for ComicError {
    fn from(err: std::io::Error) -> Self {
        ComicError::InternalServerError(err.to_string())
    }
}

impl From<axum::http::Error> for ComicError {
    fn from(err: axum::http::Error) -> Self {
        ComicError::InternalServerError(err.to_string())
    }
}

impl IntoResponse for ComicError {
    fn into_response(self) -> axum::response::Response {
        self.log();
        (self.status(), self.message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{MalformedPlanError, PlanError};

    #[test]
    fn pipeline_errors_map_to_status_codes() {
        let cases = [
            (PipelineError::EmptyIdea, StatusCode::BAD_REQUEST),
            (
                PipelineError::IdeaTooLong { max: 2000 },
                StatusCode::BAD_REQUEST,
            ),
            (
                PipelineError::InsufficientCredits,
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                PipelineError::PlanningFailed(PlanError::Malformed(MalformedPlanError::new(
                    "not json",
                ))),
                StatusCode::BAD_GATEWAY,
            ),
            (
                PipelineError::AllPanelsFailed { attempted: 6 },
                StatusCode::BAD_GATEWAY,
            ),
            (
                PipelineError::Store(UpdateError::MissingRecord(1)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ComicError::from(err).status(), status);
        }
    }

    #[test]
    fn internal_details_stay_out_of_messages() {
        let err = ComicError::from(PipelineError::PlanningFailed(PlanError::Malformed(
            MalformedPlanError::new("secret upstream detail"),
        )));
        assert!(!err.message().contains("secret"));
        assert_eq!(ComicError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}
