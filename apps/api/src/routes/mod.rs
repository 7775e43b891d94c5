pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::documents::handlers;
use crate::state::AppState;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/documents",
            post(handlers::handle_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/v1/documents/:id",
            get(handlers::handle_get_document).delete(handlers::handle_delete_document),
        )
        .route("/api/v1/documents/:id/preview", get(handlers::handle_preview))
        .route(
            "/api/v1/documents/:id/questionnaire",
            post(handlers::handle_start_questionnaire),
        )
        .route(
            "/api/v1/documents/:id/questionnaire/answer",
            post(handlers::handle_submit_answer),
        )
        .route("/api/v1/documents/:id/converse", post(handlers::handle_converse))
        .route("/api/v1/documents/:id/finalize", post(handlers::handle_finalize))
        .route("/api/v1/documents/:id/download", get(handlers::handle_download))
        .with_state(state)
}
