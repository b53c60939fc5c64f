//! The thin axum surface over the pipeline.

use std::num::NonZeroU16;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::{error, info};

use crate::constants::{PANEL_URL_PREFIX, SESSION_INACTIVITY_MINUTES};
use crate::pipeline::Coordinator;

mod api;
mod csrf;
mod flash;
mod images;
mod middleware;
mod prelude;
mod views;

#[derive(Clone)]
pub(crate) struct AppState {
    coordinator: Arc<Coordinator>,
    owner_header: Arc<str>,
    panel_dir: Arc<PathBuf>,
}

impl AppState {
    /// `owner_header` names the request header the identity proxy sets.
    pub fn new(coordinator: Coordinator, owner_header: &str, panel_dir: PathBuf) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            owner_header: Arc::from(owner_header.trim().to_ascii_lowercase()),
            panel_dir: Arc::new(panel_dir),
        }
    }
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(views::home_handler))
        .route("/comics", post(views::create_comic_handler))
        .route("/comics/latest", get(views::latest_comic_handler))
        .route("/history", get(views::history_handler))
        .route("/credits", get(views::credits_handler))
        .route("/api/comics", post(api::create_comic_api))
        .route("/api/credits", get(api::credits_api))
        .route(
            &format!("{PANEL_URL_PREFIX}/{{file}}"),
            get(images::panel_handler),
        )
        .route("/static/styles.css", get(styles_handler))
}

fn session_layer() -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            SESSION_INACTIVITY_MINUTES,
        )))
}

/// The full application, ready to serve.
pub(crate) fn app(state: AppState) -> Router {
    create_router()
        .layer(session_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

/// Binds the listener and serves until shutdown.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    owner_header: &str,
    panel_dir: PathBuf,
    coordinator: Coordinator,
) -> Result<(), anyhow::Error> {
    tokio::fs::create_dir_all(&panel_dir).await?;
    let app = app(AppState::new(coordinator, owner_header, panel_dir));

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use sea_orm::DatabaseConnection;
    use tower::ServiceExt;

    use crate::constants::{DEFAULT_OWNER_HEADER, TEST_OWNER};
    use crate::db::store::{ComicAssets, ComicStore, CreditStore};
    use crate::owner::OwnerId;
    use crate::pipeline::PipelineConfig;
    use crate::testing::{FakeImages, ScriptedText, plan_json, setup_db};

    const CAPTIONS: &str = r#"{"Scene 1":"c1","Scene 2":"c2","Scene 3":"c3","Scene 4":"c4","Scene 5":"c5","Scene 6":"c6"}"#;

    fn state_with(db: &DatabaseConnection, text: ScriptedText, panel_dir: PathBuf) -> AppState {
        let store = Arc::new(db.clone());
        let coordinator = Coordinator::new(
            Arc::new(text),
            Arc::new(FakeImages::default()),
            store.clone(),
            store,
            PipelineConfig::default(),
        );
        AppState::new(coordinator, DEFAULT_OWNER_HEADER, panel_dir)
    }

    async fn setup_state() -> (AppState, DatabaseConnection) {
        let db = setup_db().await;
        let text = ScriptedText::new(vec![Ok(plan_json(6)), Ok(CAPTIONS.to_string())]);
        (state_with(&db, text, std::env::temp_dir()), db)
    }

    fn owner() -> OwnerId {
        OwnerId::new(TEST_OWNER).expect("owner")
    }

    async fn store_comic(db: &DatabaseConnection, prompt: &str) {
        let assets = ComicAssets {
            title: Some(format!("Title of {prompt}")),
            image_urls: vec!["https://img.test/1.png".to_string()],
            captions: vec![format!("caption of {prompt}")],
            dropped_scenes: vec![],
            created_at: chrono::Utc::now().naive_utc(),
        };
        db.insert_complete(&owner(), prompt, &assets)
            .await
            .expect("insert comic");
    }

    async fn read_body(response: axum::response::Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    fn get(uri: &str, signed_in: bool) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if signed_in {
            builder = builder.header(DEFAULT_OWNER_HEADER, TEST_OWNER);
        }
        builder.body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn home_shows_credits_for_signed_in_owner() {
        let (state, _db) = setup_state().await;
        let response = app(state).oneshot(get("/", true)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_body(response).await;
        assert!(body.contains("csrf_token"));
        assert!(body.contains("60"));
    }

    #[tokio::test]
    async fn anonymous_callers_are_rejected() {
        let (state, _db) = setup_state().await;
        let app = app(state);
        for uri in ["/history", "/credits", "/comics/latest", "/api/credits"] {
            let response = app.clone().oneshot(get(uri, false)).await.expect("response");
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
        // the form page still renders, just without a balance
        let response = app.oneshot(get("/", false)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn form_submit_without_session_token_is_bounced() {
        let (state, db) = setup_state().await;
        let request = Request::builder()
            .method("POST")
            .uri("/comics")
            .header(DEFAULT_OWNER_HEADER, TEST_OWNER)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("idea=a+robot+learns+to+paint&csrf_token=nope"))
            .expect("request");
        let response = app(state).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).expect("location"),
            "/"
        );
        assert!(
            db.latest_for_owner(&owner())
                .await
                .expect("read")
                .is_none()
        );
    }

    #[tokio::test]
    async fn api_generates_a_comic() {
        let (state, db) = setup_state().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/comics")
            .header(DEFAULT_OWNER_HEADER, TEST_OWNER)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"idea": "a robot learns to paint"}"#))
            .expect("request");
        let response = app(state).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value =
            serde_json::from_str(&read_body(response).await).expect("json body");
        assert_eq!(body["title"], "Robot Painter");
        assert_eq!(body["panels"].as_array().expect("panels").len(), 6);
        assert_eq!(body["panels"][2]["caption"], "c3");
        assert_eq!(body["charge"]["source"], "daily");

        let stored = db
            .latest_for_owner(&owner())
            .await
            .expect("read")
            .expect("stored");
        assert_eq!(body["record_id"], stored.id);
    }

    #[tokio::test]
    async fn api_rejects_malformed_bodies_with_a_json_message() {
        let (state, _db) = setup_state().await;
        let app = app(state);
        for (content_type, body) in [
            ("application/json", r#"{"idea": "#),
            ("application/json", r#"{"prompt": "a robot"}"#),
            ("text/plain", r#"{"idea": "a robot"}"#),
        ] {
            let request = Request::builder()
                .method("POST")
                .uri("/api/comics")
                .header(DEFAULT_OWNER_HEADER, TEST_OWNER)
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .expect("request");
            let response = app.clone().oneshot(request).await.expect("response");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            let json: serde_json::Value =
                serde_json::from_str(&read_body(response).await).expect("json body");
            assert!(json["message"].is_string(), "{body}");
        }
    }

    #[tokio::test]
    async fn api_errors_are_json_with_status() {
        let db = setup_db().await;
        let text = ScriptedText::new(vec![Ok("I'd rather not.".to_string())]);
        let app = app(state_with(&db, text, std::env::temp_dir()));

        let request = Request::builder()
            .method("POST")
            .uri("/api/comics")
            .header(DEFAULT_OWNER_HEADER, TEST_OWNER)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"idea": "   "}"#))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value =
            serde_json::from_str(&read_body(response).await).expect("json body");
        assert!(body["message"].is_string());

        let request = Request::builder()
            .method("POST")
            .uri("/api/comics")
            .header(DEFAULT_OWNER_HEADER, TEST_OWNER)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"idea": "a robot"}"#))
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn api_reports_no_credits_as_payment_required() {
        let (state, db) = setup_state().await;
        for i in 0..10 {
            store_comic(&db, &format!("comic {i}")).await;
        }
        let request = Request::builder()
            .method("POST")
            .uri("/api/comics")
            .header(DEFAULT_OWNER_HEADER, TEST_OWNER)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"idea": "one more"}"#))
            .expect("request");
        let response = app(state).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn credits_reflect_todays_comics_and_top_ups() {
        let (state, db) = setup_state().await;
        store_comic(&db, "first").await;
        db.top_up(&owner(), 12).await.expect("top up");

        let response = app(state)
            .oneshot(get("/api/credits", true))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_str(&read_body(response).await).expect("json body");
        assert_eq!(body["daily_allowance"], 54);
        assert_eq!(body["purchased_balance"], 12);
        assert_eq!(body["remaining"], 66);
        assert_eq!(body["comic_cost"], 6);
    }

    #[tokio::test]
    async fn latest_and_history_show_stored_comics() {
        let (state, db) = setup_state().await;
        let app = app(state);

        let response = app
            .clone()
            .oneshot(get("/comics/latest", true))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        for i in 0..12 {
            store_comic(&db, &format!("comic number {i}")).await;
        }
        let response = app
            .clone()
            .oneshot(get("/comics/latest", true))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(read_body(response).await.contains("caption of comic number 11"));

        let first_page = read_body(
            app.clone()
                .oneshot(get("/history", true))
                .await
                .expect("response"),
        )
        .await;
        assert!(first_page.contains("comic number 11"));
        assert!(!first_page.contains("comic number 1<"));
        assert!(first_page.contains("page=2"));

        let second_page = read_body(
            app.oneshot(get("/history?page=2", true))
                .await
                .expect("response"),
        )
        .await;
        assert!(second_page.contains("comic number 0"));
        assert!(!second_page.contains("page=3"));
    }

    #[tokio::test]
    async fn panels_are_served_from_the_panel_dir() {
        let db = setup_db().await;
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("abc123.png"), b"\x89PNG fake").expect("write panel");
        let state = state_with(&db, ScriptedText::default(), dir.path().to_path_buf());
        let app = app(state);

        let response = app
            .clone()
            .oneshot(get("/panels/abc123.png", false))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("type"),
            "image/png"
        );
        let etag = response
            .headers()
            .get(header::ETAG)
            .expect("etag")
            .clone();

        let request = Request::builder()
            .uri("/panels/abc123.png")
            .header(header::IF_NONE_MATCH, etag)
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

        let response = app
            .oneshot(get("/panels/missing.png", false))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stylesheet_is_served() {
        let (state, _db) = setup_state().await;
        let response = app(state)
            .oneshot(get("/static/styles.css", false))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("type"),
            "text/css"
        );
    }
}
