use std::sync::Arc;

use crate::access::clock::Clock;
use crate::access::codec::AccessTokenCodec;
use crate::config::Config;
use crate::payments::PaymentGateway;
use crate::storage::BlobStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Built once from `ACCESS_TOKEN_SECRET`; unconfigured when the secret is absent.
    pub tokens: AccessTokenCodec,
    /// Pluggable payment gateway. Default: StripeClient.
    pub payments: Arc<dyn PaymentGateway>,
    pub blobs: Arc<dyn BlobStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        config: Config,
        payments: Arc<dyn PaymentGateway>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tokens =
            AccessTokenCodec::with_clock(config.access_token_secret.as_deref(), clock.clone());
        Self {
            config,
            tokens,
            payments,
            blobs,
            clock,
        }
    }
}

#[cfg(test)]
pub use harness::TestHarness;
