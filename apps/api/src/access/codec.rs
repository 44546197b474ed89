//! Access tokens: stateless, signed, expiring proof that the bearer
//! completed a paid checkout.
//!
//! Wire format:
//!
//! ```text
//! token     := body "." signature
//! body      := base64url_nopad(json {"sid", "email", "exp"})
//! signature := base64url_nopad(HMAC-SHA256(secret, body))
//! ```
//!
//! `exp` is unix seconds. Tokens are never refreshed from themselves: extending
//! access means confirming the payment with the gateway again and minting anew.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::{
    alphabet,
    engine::{
        general_purpose::URL_SAFE_NO_PAD, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig,
    },
    Engine,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::access::clock::Clock;

type HmacSha256 = Hmac<Sha256>;

/// Bodies decode with or without `=` padding. Signatures must be canonical no-pad.
const BODY_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// `exp` values above this are millisecond timestamps (year 5138+ in seconds).
const MAX_EXPIRES_AT: i64 = 100_000_000_000;

/// What the payment side hands over once a checkout is confirmed.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub subject_id: String,
    pub email: Option<String>,
}

/// Decoded contents of a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenPayload {
    #[serde(rename = "sid", alias = "subjectId")]
    pub subject_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "exp", alias = "expiresAt")]
    pub expires_at: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("access token secret is not configured")]
    Configuration,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Deliberately carries no detail: bad shape, bad signature, bad body
    /// and expiry all look the same to callers.
    #[error("invalid or expired access token")]
    Rejected,
}

/// Internal reason a token was rejected. Only ever logged at debug level.
#[derive(Debug, Error)]
enum Rejection {
    #[error("token is not two dot-separated parts")]
    Shape,
    #[error("signature is not canonical base64url")]
    SignatureEncoding,
    #[error("signature mismatch")]
    Signature,
    #[error("body is not base64url")]
    BodyEncoding,
    #[error("body is not a valid payload: {0}")]
    Payload(String),
    #[error("token expired at {0}")]
    Expired(i64),
}

/// HMAC key material. Never printed.
#[derive(Clone)]
struct SigningSecret(Arc<[u8]>);

impl SigningSecret {
    fn new(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        Some(Self(Arc::from(raw.as_bytes())))
    }

    fn keyed_mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.0).map_err(|_| TokenError::Configuration)
    }
}

/// Mints and verifies access tokens. Cheap to clone; holds only the
/// read-only secret and the clock.
#[derive(Clone)]
pub struct AccessTokenCodec {
    secret: Option<SigningSecret>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for AccessTokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenCodec")
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

impl AccessTokenCodec {
    /// A blank or missing secret leaves the codec unconfigured: every mint
    /// and verify then fails with `TokenError::Configuration`.
    pub fn with_clock(secret: Option<&str>, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.and_then(SigningSecret::new),
            clock,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Signs a token for `grant` that expires `ttl` from now.
    ///
    /// Expiry has whole-second resolution: `ttl` is truncated to seconds, so
    /// anything under one second (including zero) is `InvalidArgument`.
    pub fn mint(&self, grant: AccessGrant, ttl: Duration) -> Result<String, TokenError> {
        let secret = self.secret()?;

        if grant.subject_id.is_empty() {
            return Err(TokenError::InvalidArgument("subject id must not be empty"));
        }
        let ttl_secs = i64::try_from(ttl.as_secs())
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(TokenError::InvalidArgument("ttl must be at least one second"))?;
        let expires_at = self
            .clock
            .now()
            .checked_add(ttl_secs)
            .filter(|exp| *exp <= MAX_EXPIRES_AT)
            .ok_or(TokenError::InvalidArgument("ttl is too large"))?;

        let payload = AccessTokenPayload {
            subject_id: grant.subject_id,
            email: grant.email,
            expires_at,
        };
        let json = serde_json::to_vec(&payload)
            .map_err(|_| TokenError::InvalidArgument("payload is not serializable"))?;
        let body = URL_SAFE_NO_PAD.encode(json);

        let mut mac = secret.keyed_mac()?;
        mac.update(body.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        debug!(expires_at, "access token minted");
        Ok(format!("{body}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<AccessTokenPayload, TokenError> {
        let mac = self.secret()?.keyed_mac()?;
        self.check(mac, token).map_err(|reason| {
            debug!(%reason, "access token rejected");
            TokenError::Rejected
        })
    }

    fn check(&self, mut mac: HmacSha256, token: &str) -> Result<AccessTokenPayload, Rejection> {
        let mut parts = token.split('.');
        let (body, signature) = match (parts.next(), parts.next(), parts.next()) {
            (Some(body), Some(sig), None) if !body.is_empty() && !sig.is_empty() => (body, sig),
            _ => return Err(Rejection::Shape),
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| Rejection::SignatureEncoding)?;
        mac.update(body.as_bytes());
        // verify_slice is constant-time (subtle::ConstantTimeEq underneath).
        mac.verify_slice(&signature)
            .map_err(|_| Rejection::Signature)?;

        let json = BODY_B64
            .decode(body)
            .map_err(|_| Rejection::BodyEncoding)?;
        let payload: AccessTokenPayload =
            serde_json::from_slice(&json).map_err(|e| Rejection::Payload(e.to_string()))?;

        if payload.subject_id.is_empty() {
            return Err(Rejection::Payload("empty sid".to_string()));
        }
        if payload.expires_at > MAX_EXPIRES_AT {
            return Err(Rejection::Payload("exp is not in seconds".to_string()));
        }
        if payload.expires_at <= self.clock.now() {
            return Err(Rejection::Expired(payload.expires_at));
        }

        Ok(payload)
    }

    fn secret(&self) -> Result<&SigningSecret, TokenError> {
        self.secret.as_ref().ok_or(TokenError::Configuration)
    }
}
