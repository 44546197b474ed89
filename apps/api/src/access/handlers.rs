use axum::Json;
use serde::Serialize;

use crate::access::extractor::PaidAccess;

#[derive(Serialize)]
pub struct AccessStatus {
    pub unlocked: bool,
    pub subject_id: String,
    pub email: Option<String>,
    pub expires_at: i64,
}

/// GET /api/access
/// Lets the frontend ask whether the current browser is unlocked.
pub async fn handle_access_status(PaidAccess(payload): PaidAccess) -> Json<AccessStatus> {
    Json(AccessStatus {
        unlocked: true,
        subject_id: payload.subject_id,
        email: payload.email,
        expires_at: payload.expires_at,
    })
}
