use rand::RngExt;
use rand::distr::Alphanumeric;
use tower_sessions::Session;

use crate::error::ComicError;

const CSRF_TOKEN_KEY: &str = "csrf_token";

fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// The session's token, minting one on first use.
pub(crate) async fn csrf_token(session: &Session) -> Result<String, ComicError> {
    let existing = session
        .get::<String>(CSRF_TOKEN_KEY)
        .await
        .map_err(|err| ComicError::InternalServerError(err.to_string()))?;
    let token = match existing {
        Some(token) => token,
        None => {
            let token = generate_token();
            session
                .insert(CSRF_TOKEN_KEY, token.clone())
                .await
                .map_err(|err| ComicError::InternalServerError(err.to_string()))?;
            token
        }
    };
    Ok(token)
}

/// Whether `token` matches the one handed out to this session.
pub(crate) async fn csrf_matches(session: &Session, token: &str) -> Result<bool, ComicError> {
    let stored = session
        .get::<String>(CSRF_TOKEN_KEY)
        .await
        .map_err(|err| ComicError::InternalServerError(err.to_string()))?;
    Ok(matches!(stored, Some(expected) if expected == token))
}
