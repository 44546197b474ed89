//! Payment gateway seam. The rest of the service only ever sees
//! `SessionStatus`; nothing outside `stripe.rs` speaks the Stripe API.

use async_trait::async_trait;
use thiserror::Error;

pub mod handlers;
pub mod issue;
pub mod stripe;
pub mod webhook;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("checkout session not found")]
    UnknownSession,

    #[error("invalid checkout session id")]
    InvalidSessionId,
}

/// Parameters for a one-time payment checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// One line item of quantity 1 per price, in order.
    pub price_ids: Vec<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub metadata: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// What access issuance needs to know about a checkout session.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub session_id: String,
    pub email: Option<String>,
    pub payment_confirmed: bool,
}

/// Carried in `AppState` as `Arc<dyn PaymentGateway>`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(&self, request: &CheckoutRequest)
        -> Result<CheckoutSession, PaymentError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, PaymentError>;
}

/// Session ids end up in a URL path, so only `[A-Za-z0-9_]` is accepted.
pub fn validate_session_id(session_id: &str) -> Result<&str, PaymentError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 255
        && session_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(session_id)
    } else {
        Err(PaymentError::InvalidSessionId)
    }
}

#[cfg(test)]
pub use fake::FakeGateway;

#[cfg(test)]
mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory gateway: sessions are registered up front, checkouts are recorded.
    #[derive(Default)]
    pub struct FakeGateway {
        sessions: Mutex<HashMap<String, SessionStatus>>,
        pub checkouts: Mutex<Vec<CheckoutRequest>>,
    }

    impl FakeGateway {
        pub fn with_session(self, session_id: &str, email: Option<&str>, paid: bool) -> Self {
            self.sessions.lock().unwrap().insert(
                session_id.to_string(),
                SessionStatus {
                    session_id: session_id.to_string(),
                    email: email.map(str::to_string),
                    payment_confirmed: paid,
                },
            );
            self
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_checkout(
            &self,
            request: &CheckoutRequest,
        ) -> Result<CheckoutSession, PaymentError> {
            let mut checkouts = self.checkouts.lock().unwrap();
            checkouts.push(request.clone());
            let id = format!("cs_test_{}", checkouts.len());
            Ok(CheckoutSession {
                url: Some(format!("https://checkout.stripe.test/{id}")),
                id,
            })
        }

        async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, PaymentError> {
            validate_session_id(session_id)?;
            self.sessions
                .lock()
                .unwrap()
                .get(session_id)
                .cloned()
                .ok_or(PaymentError::UnknownSession)
        }
    }
}
