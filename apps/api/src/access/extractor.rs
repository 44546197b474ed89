use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;

use crate::access::codec::{AccessTokenPayload, TokenError};
use crate::errors::AppError;
use crate::state::AppState;

/// Proof of payment for the current request.
///
/// Any handler taking `PaidAccess` answers 401 `PAYMENT_REQUIRED` unless a
/// valid token was presented. Scope decisions must come from the payload
/// here, never from request parameters.
pub struct PaidAccess(pub AccessTokenPayload);

#[async_trait]
impl FromRequestParts<AppState> for PaidAccess {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // A missing secret is a server fault even when no token was sent.
        if !state.tokens.is_configured() {
            return Err(TokenError::Configuration.into());
        }

        let token = presented_token(&parts.headers, &state.config.access_cookie_name)
            .ok_or(AppError::PaymentRequired)?;

        let payload = state.tokens.verify(&token)?;
        Ok(PaidAccess(payload))
    }
}

/// `Authorization: Bearer` wins over the cookie.
fn presented_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}
