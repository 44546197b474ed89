use std::time::Duration;

use tracing::info;

use crate::access::codec::{AccessGrant, TokenError};
use crate::errors::AppError;
use crate::state::AppState;

/// A freshly minted token and the customer it was minted for.
#[derive(Debug)]
pub struct IssuedAccess {
    pub token: String,
    pub email: Option<String>,
}

/// Exchanges a checkout session for an access token.
///
/// The gateway is always asked again; a session id alone proves nothing.
/// Only a confirmed payment is minted.
pub async fn issue_access(state: &AppState, session_id: &str) -> Result<IssuedAccess, AppError> {
    if !state.tokens.is_configured() {
        return Err(TokenError::Configuration.into());
    }

    let session = state.payments.retrieve_session(session_id).await?;
    if !session.payment_confirmed {
        info!(session_id = %session.session_id, "checkout session not paid");
        return Err(AppError::PaymentNotConfirmed);
    }

    let token = state.tokens.mint(
        AccessGrant {
            subject_id: session.session_id.clone(),
            email: session.email.clone(),
        },
        Duration::from_secs(state.config.access_token_ttl_secs),
    )?;

    info!(session_id = %session.session_id, "access issued");
    Ok(IssuedAccess {
        token,
        email: session.email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::payments::FakeGateway;
    use crate::state::TestHarness;

    fn harness(gateway: FakeGateway) -> TestHarness {
        TestHarness::new(Config::for_tests(), gateway)
    }

    #[tokio::test]
    async fn test_paid_session_mints_verifiable_token() {
        let h = harness(FakeGateway::default().with_session("cs_paid", Some("a@b.com"), true));
        let issued = issue_access(&h.state, "cs_paid").await.unwrap();
        assert_eq!(issued.email.as_deref(), Some("a@b.com"));

        let payload = h.state.tokens.verify(&issued.token).unwrap();
        assert_eq!(payload.subject_id, "cs_paid");
        assert_eq!(payload.email.as_deref(), Some("a@b.com"));
        assert_eq!(payload.expires_at, h.clock_now() + 60);
    }

    #[tokio::test]
    async fn test_unpaid_session_is_refused() {
        let h = harness(FakeGateway::default().with_session("cs_open", None, false));
        let err = issue_access(&h.state, "cs_open").await.unwrap_err();
        assert!(matches!(err, AppError::PaymentNotConfirmed));
    }

    #[tokio::test]
    async fn test_unknown_session_is_refused() {
        let h = harness(FakeGateway::default());
        let err = issue_access(&h.state, "cs_nope").await.unwrap_err();
        assert!(matches!(err, AppError::PaymentNotConfirmed));
    }

    #[tokio::test]
    async fn test_malformed_session_id_is_a_validation_error() {
        let h = harness(FakeGateway::default());
        let err = issue_access(&h.state, "cs/../x").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_secret_fails_before_gateway() {
        let mut config = Config::for_tests();
        config.access_token_secret = None;
        let h = TestHarness::new(
            config,
            FakeGateway::default().with_session("cs_paid", None, true),
        );
        let err = issue_access(&h.state, "cs_paid").await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
