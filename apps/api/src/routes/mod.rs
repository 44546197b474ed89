pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::access::handlers as access;
use crate::payments::handlers as payments;
use crate::resume::handlers::{self as resume, MAX_UPLOAD_BYTES};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Access
        .route("/api/access", get(access::handle_access_status))
        .route("/api/access/issue", post(payments::handle_issue))
        // Stripe
        .route("/api/stripe/checkout", post(payments::handle_checkout))
        .route("/api/checkout", post(payments::handle_checkout))
        .route("/api/verify-session", post(payments::handle_verify_session))
        .route("/api/stripe/verify", get(payments::handle_verify))
        .route("/api/stripe/webhook", post(payments::handle_webhook))
        // Resume
        .route(
            "/api/resume/score",
            post(resume::handle_score).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/resume/upload",
            post(resume::handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/resume/optimize", post(resume::handle_optimize))
        .with_state(state)
}
