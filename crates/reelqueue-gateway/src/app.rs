use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use reelqueue_core::ReelqueueConfig;
use reelqueue_scheduler::TimeSource;
use reelqueue_store::QueueStore;
use reelqueue_youtube::GoogleAuthorizer;

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: ReelqueueConfig,
    pub store: Arc<dyn QueueStore>,
    pub authorizer: Arc<GoogleAuthorizer>,
    pub time: Arc<TimeSource>,
    pub uploads_dir: PathBuf,
}

impl AppState {
    pub fn new(
        config: ReelqueueConfig,
        store: Arc<dyn QueueStore>,
        authorizer: Arc<GoogleAuthorizer>,
        time: Arc<TimeSource>,
    ) -> Self {
        let uploads_dir = PathBuf::from(&config.storage.uploads_dir);
        Self {
            config,
            store,
            authorizer,
            time,
            uploads_dir,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let upload_limit = usize::try_from(state.config.gateway.max_upload_mb.saturating_mul(1024 * 1024))
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(crate::http::ui::ui_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route("/api/session", post(crate::http::session::create_session))
        .route(
            "/api/upload",
            post(crate::http::upload::upload_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/status", get(crate::http::queue::status_handler))
        .route(
            "/api/settings",
            get(crate::http::queue::get_settings).post(crate::http::queue::update_settings),
        )
        .route("/api/clear/{status}", delete(crate::http::queue::clear_handler))
        .route("/api/video/{id}", delete(crate::http::queue::delete_handler))
        .route("/auth/start", post(crate::http::auth::start_auth))
        .route("/auth/callback", get(crate::http::auth::auth_callback))
        .route("/auth/check", get(crate::http::auth::check_setup))
        .route("/auth/reset", post(crate::http::auth::reset_setup))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
