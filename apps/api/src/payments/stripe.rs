//! Stripe client. The single point of entry for all Stripe API calls.
//!
//! Only two endpoints are used: create a Checkout Session and retrieve one.
//! Requests are form-encoded with bearer auth, as the Stripe REST API expects.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    validate_session_id, CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway,
    SessionStatus,
};

const STRIPE_API_URL: &str = "https://api.stripe.com/v1";
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    customer_email: Option<String>,
    customer_details: Option<CustomerDetails>,
}

#[derive(Debug, Deserialize)]
struct CustomerDetails {
    email: Option<String>,
}

impl StripeSession {
    fn into_status(self) -> SessionStatus {
        let payment_confirmed = self.payment_status.as_deref() == Some("paid");
        let email = self
            .customer_details
            .and_then(|d| d.email)
            .or(self.customer_email)
            .filter(|e| !e.is_empty());
        SessionStatus {
            session_id: self.id,
            email,
            payment_confirmed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
}

/// Wraps the Stripe REST API with retry logic.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Result<Self, PaymentError> {
        Self::with_base_url(secret_key, STRIPE_API_URL.to_string())
    }

    pub fn with_base_url(secret_key: String, base_url: String) -> Result<Self, PaymentError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
            secret_key,
            base_url,
        })
    }

    /// Sends a request built by `build`, retrying on 429 (rate limit) and 5xx
    /// errors with exponential backoff.
    async fn send<T, F>(&self, build: F) -> Result<T, PaymentError>
    where
        T: serde::de::DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut last_error: Option<PaymentError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 500ms, 1s
                let delay = std::time::Duration::from_millis(500 * (1 << (attempt - 1)));
                warn!(
                    "Stripe call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match build().bearer_auth(&self.secret_key).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(PaymentError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Stripe API returned {}", status);
                last_error = Some(PaymentError::Api {
                    status: status.as_u16(),
                    message: error_message(body),
                });
                continue;
            }

            if status == StatusCode::NOT_FOUND {
                return Err(PaymentError::UnknownSession);
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(PaymentError::Api {
                    status: status.as_u16(),
                    message: error_message(body),
                });
            }

            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        Err(last_error.unwrap_or(PaymentError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
    }
}

/// Pulls `error.message` out of a Stripe error body, falling back to the raw body.
fn error_message(body: String) -> String {
    serde_json::from_str::<StripeErrorEnvelope>(&body)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or(body)
}

/// Flattens a checkout request into Stripe's bracketed form encoding.
fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![("mode".to_string(), "payment".to_string())];
    for (i, price_id) in request.price_ids.iter().enumerate() {
        form.push((format!("line_items[{i}][price]"), price_id.clone()));
        form.push((format!("line_items[{i}][quantity]"), "1".to_string()));
    }
    form.push(("success_url".to_string(), request.success_url.clone()));
    form.push(("cancel_url".to_string(), request.cancel_url.clone()));
    if let Some(email) = request.customer_email.as_deref().filter(|e| !e.is_empty()) {
        form.push(("customer_email".to_string(), email.to_string()));
    }
    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
    form
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let form = checkout_form(request);
        // One key across retries so a retried POST cannot open a second session.
        let idempotency_key = Uuid::new_v4().to_string();

        let session: StripeSession = self
            .send(|| {
                self.request(Method::POST, "/checkout/sessions")
                    .header("Idempotency-Key", &idempotency_key)
                    .form(&form)
            })
            .await?;

        debug!(session_id = %session.id, "checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, PaymentError> {
        let session_id = validate_session_id(session_id)?;
        let path = format!("/checkout/sessions/{session_id}");

        let session: StripeSession = self.send(|| self.request(Method::GET, &path)).await?;

        let status = session.into_status();
        debug!(
            session_id = %status.session_id,
            payment_confirmed = status.payment_confirmed,
            "checkout session retrieved"
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(json: &str) -> SessionStatus {
        serde_json::from_str::<StripeSession>(json)
            .unwrap()
            .into_status()
    }

    #[test]
    fn test_paid_session_is_confirmed() {
        let status = session(
            r#"{"id":"cs_1","url":null,"payment_status":"paid","status":"complete",
                "customer_email":null,"customer_details":{"email":"a@b.com"}}"#,
        );
        assert!(status.payment_confirmed);
        assert_eq!(status.session_id, "cs_1");
        assert_eq!(status.email.as_deref(), Some("a@b.com"));
    }

    #[test]
    fn test_unpaid_session_is_not_confirmed() {
        let status = session(
            r#"{"id":"cs_2","payment_status":"unpaid","status":"complete","customer_email":"x@y.com"}"#,
        );
        assert!(!status.payment_confirmed);
        assert_eq!(status.email.as_deref(), Some("x@y.com"));
    }

    #[test]
    fn test_missing_email_stays_absent() {
        let status = session(r#"{"id":"cs_3","payment_status":"paid","customer_email":""}"#);
        assert!(status.payment_confirmed);
        assert_eq!(status.email, None);
    }

    #[test]
    fn test_checkout_form_encoding() {
        let form = checkout_form(&CheckoutRequest {
            price_ids: vec!["price_1".to_string(), "price_interview".to_string()],
            success_url: "https://app/success?session_id={CHECKOUT_SESSION_ID}".to_string(),
            cancel_url: "https://app/app?canceled=1".to_string(),
            customer_email: Some("a@b.com".to_string()),
            metadata: vec![("blobUrl".to_string(), "https://blob/x.pdf".to_string())],
        });
        let get = |k: &str| {
            form.iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price]"), Some("price_1"));
        assert_eq!(get("line_items[0][quantity]"), Some("1"));
        assert_eq!(get("line_items[1][price]"), Some("price_interview"));
        assert_eq!(get("line_items[1][quantity]"), Some("1"));
        assert_eq!(get("line_items[2][price]"), None);
        assert_eq!(get("customer_email"), Some("a@b.com"));
        assert_eq!(get("metadata[blobUrl]"), Some("https://blob/x.pdf"));
    }

    #[test]
    fn test_checkout_form_skips_empty_email() {
        let form = checkout_form(&CheckoutRequest {
            price_ids: vec!["price_1".to_string()],
            success_url: "s".to_string(),
            cancel_url: "c".to_string(),
            customer_email: Some(String::new()),
            metadata: vec![],
        });
        assert!(form.iter().all(|(k, _)| k != "customer_email"));
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error":{"message":"No such checkout.session: cs_x","type":"invalid_request_error"}}"#;
        assert_eq!(
            error_message(body.to_string()),
            "No such checkout.session: cs_x"
        );
        assert_eq!(error_message("plain".to_string()), "plain");
    }

    #[tokio::test]
    async fn test_retrieve_rejects_unsafe_session_id_before_any_request() {
        let client =
            StripeClient::with_base_url("sk_test".to_string(), "http://127.0.0.1:9".to_string())
                .unwrap();
        let err = client.retrieve_session("../customers").await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSessionId));
    }
}
