use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    response::Redirect,
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::access::cookie::access_cookie;
use crate::config::Config;
use crate::errors::AppError;
use crate::payments::issue::issue_access;
use crate::payments::webhook::{verify_signature, WebhookEvent, DEFAULT_TOLERANCE_SECS};
use crate::payments::CheckoutRequest;
use crate::state::AppState;

const STRIPE_SIGNATURE: &str = "stripe-signature";

#[derive(Deserialize, Default)]
pub struct CheckoutBody {
    pub email: Option<String>,
    #[serde(alias = "blobUrl")]
    pub blob_url: Option<String>,
    /// Career-level tier (ENTRY, MID, SENIOR, EXEC, CSUITE). Absent means the default price.
    #[serde(alias = "priceKey")]
    pub price_key: Option<String>,
    #[serde(default, alias = "includeInterviewPrep")]
    pub include_interview_prep: bool,
    #[serde(alias = "uploadId")]
    pub upload_id: Option<String>,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub url: String,
    pub checkout_url: String,
}

#[derive(Deserialize)]
pub struct SessionIdBody {
    #[serde(alias = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Deserialize)]
pub struct VerifyQuery {
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct VerifySessionResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

fn with_access_cookie(state: &AppState, token: &str) -> CookieJar {
    CookieJar::new().add(access_cookie(
        &state.config.access_cookie_name,
        token,
        state.config.access_token_ttl_secs,
        state.config.cookie_secure,
    ))
}

fn app_url(state: &AppState, query: &str) -> String {
    format!(
        "{}/app{query}",
        state.config.public_base_url.trim_end_matches('/')
    )
}

/// Resolves the line items for a checkout: the tier price (or the default
/// price when no tier is named), then the interview-prep add-on if asked for.
fn checkout_prices(
    config: &Config,
    price_key: Option<&str>,
    include_interview_prep: bool,
) -> Result<Vec<String>, AppError> {
    let base_price = match price_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => {
            let tier = key.to_ascii_uppercase();
            config.tier_prices.get(&tier).cloned().ok_or_else(|| {
                AppError::Validation(format!("Invalid price tier or missing price for {tier}"))
            })?
        }
        None => config
            .stripe_price_id
            .clone()
            .ok_or_else(|| AppError::Configuration("STRIPE_PRICE_ID is not set".to_string()))?,
    };

    let mut prices = vec![base_price];
    if include_interview_prep {
        let interview = config.interview_price_id.clone().ok_or_else(|| {
            AppError::Validation("Interview prep selected but price not configured".to_string())
        })?;
        prices.push(interview);
    }
    Ok(prices)
}

/// POST /api/stripe/checkout
pub async fn handle_checkout(
    State(state): State<AppState>,
    body: Option<Json<CheckoutBody>>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let price_ids = checkout_prices(
        &state.config,
        body.price_key.as_deref(),
        body.include_interview_prep,
    )?;

    let base = state.config.public_base_url.trim_end_matches('/');
    let non_empty = |v: Option<String>| v.filter(|v| !v.is_empty());
    let mut metadata = Vec::new();
    if let Some(blob_url) = non_empty(body.blob_url) {
        metadata.push(("blobUrl".to_string(), blob_url));
    }
    if let Some(upload_id) = non_empty(body.upload_id) {
        metadata.push(("upload_id".to_string(), upload_id));
    }
    if let Some(tier) = non_empty(body.price_key) {
        metadata.push(("tier".to_string(), tier.trim().to_ascii_uppercase()));
    }
    if let Some(email) = non_empty(body.email.clone()) {
        metadata.push(("email".to_string(), email));
    }
    if body.include_interview_prep {
        metadata.push(("interview_prep".to_string(), "true".to_string()));
    }

    let session = state
        .payments
        .create_checkout(&CheckoutRequest {
            price_ids,
            success_url: format!("{base}/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{base}/app?canceled=1"),
            customer_email: body.email,
            metadata,
        })
        .await?;

    let url = session
        .url
        .ok_or_else(|| AppError::Payment(format!("checkout session {} has no url", session.id)))?;
    Ok(Json(CheckoutResponse {
        checkout_url: url.clone(),
        url,
    }))
}

/// Reads `session_id` from a JSON, multipart or urlencoded body.
async fn read_session_id(req: Request) -> Result<String, AppError> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let session_id = if content_type.starts_with("application/json") {
        Json::<SessionIdBody>::from_request(req, &())
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?
            .0
            .session_id
    } else if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        let mut found = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?
        {
            if matches!(field.name(), Some("session_id" | "sessionId")) {
                found = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::Validation(e.body_text()))?,
                );
                break;
            }
        }
        found
    } else {
        Form::<SessionIdBody>::from_request(req, &())
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?
            .0
            .session_id
    };

    session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("Missing session_id".to_string()))
}

/// POST /api/access/issue
/// Accepts `session_id` as JSON, a form post or multipart.
pub async fn handle_issue(
    State(state): State<AppState>,
    req: Request,
) -> Result<(CookieJar, Redirect), AppError> {
    let session_id = read_session_id(req).await?;
    let issued = issue_access(&state, &session_id).await?;
    Ok((
        with_access_cookie(&state, &issued.token),
        Redirect::to(&app_url(&state, "")),
    ))
}

/// POST /api/verify-session
/// JSON counterpart of the verify redirect, for clients that poll after checkout.
/// Unpaid and unknown sessions answer `{"status":"unpaid"}`.
pub async fn handle_verify_session(
    State(state): State<AppState>,
    req: Request,
) -> Result<(CookieJar, Json<VerifySessionResponse>), AppError> {
    let session_id = read_session_id(req).await?;
    match issue_access(&state, &session_id).await {
        Ok(issued) => Ok((
            with_access_cookie(&state, &issued.token),
            Json(VerifySessionResponse {
                status: "paid",
                email: issued.email,
            }),
        )),
        Err(AppError::PaymentNotConfirmed) => Ok((
            CookieJar::new(),
            Json(VerifySessionResponse {
                status: "unpaid",
                email: None,
            }),
        )),
        Err(e) => Err(e),
    }
}

/// GET /api/stripe/verify?session_id=
/// Checkout success target. Always redirects back to the app.
pub async fn handle_verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> (CookieJar, Redirect) {
    let Some(session_id) = query.session_id.filter(|s| !s.is_empty()) else {
        return (
            CookieJar::new(),
            Redirect::to(&app_url(&state, "?error=missing_session")),
        );
    };

    match issue_access(&state, &session_id).await {
        Ok(issued) => (
            with_access_cookie(&state, &issued.token),
            Redirect::to(&app_url(&state, "?unlocked=1")),
        ),
        Err(AppError::PaymentNotConfirmed) => (
            CookieJar::new(),
            Redirect::to(&app_url(&state, "?error=not_paid")),
        ),
        Err(e) => {
            warn!("checkout verification failed: {e}");
            (
                CookieJar::new(),
                Redirect::to(&app_url(&state, "?error=verify_failed")),
            )
        }
    }
}

/// POST /api/stripe/webhook
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, AppError> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::Configuration("STRIPE_WEBHOOK_SECRET is not set".to_string()))?;

    let signature = headers
        .get(STRIPE_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("Missing Stripe-Signature header".to_string()))?;

    verify_signature(
        &body,
        signature,
        secret,
        state.clock.now(),
        DEFAULT_TOLERANCE_SECS,
    )?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {e}")))?;

    if event.event_type == "checkout.session.completed" {
        let object = &event.data.object;
        info!(
            event_id = %event.id,
            session_id = object["id"].as_str().unwrap_or_default(),
            payment_status = object["payment_status"].as_str().unwrap_or_default(),
            "checkout session completed"
        );
    }

    Ok("ok")
}
