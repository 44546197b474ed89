use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
///
/// `ACCESS_TOKEN_SECRET` is not required: without it the free scoring endpoint
/// still works and every paid route answers 500 instead of minting with a
/// default key.
/// Career-level tiers a checkout may name instead of the default price.
pub const PRICE_TIERS: [&str; 5] = ["ENTRY", "MID", "SENIOR", "EXEC", "CSUITE"];

#[derive(Clone)]
pub struct Config {
    pub access_token_secret: Option<String>,
    pub access_token_ttl_secs: u64,
    pub access_cookie_name: String,
    pub cookie_secure: bool,
    pub stripe_secret_key: String,
    pub stripe_price_id: Option<String>,
    /// Tier name (upper-case) to price id, for the tiers that are configured.
    pub tier_prices: BTreeMap<String, String>,
    pub interview_price_id: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub public_base_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub s3_public_url: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // STRIPE_PRICE_{TIER} first, legacy PRICE_{TIER} second.
        let price_for = |name: &str| {
            optional(&format!("STRIPE_PRICE_{name}")).or_else(|| optional(&format!("PRICE_{name}")))
        };
        let tier_prices = PRICE_TIERS
            .into_iter()
            .filter_map(|tier| price_for(tier).map(|price| (tier.to_string(), price)))
            .collect();

        let s3_endpoint = require("S3_ENDPOINT")?;
        let s3_bucket = require("S3_BUCKET")?;
        let s3_public_url = optional("S3_PUBLIC_URL")
            .unwrap_or_else(|| format!("{}/{}", s3_endpoint.trim_end_matches('/'), s3_bucket));

        Ok(Config {
            access_token_secret: optional("ACCESS_TOKEN_SECRET"),
            access_token_ttl_secs: optional("ACCESS_TOKEN_TTL_SECS")
                .map(|v| v.parse::<u64>())
                .transpose()
                .context("ACCESS_TOKEN_TTL_SECS must be a positive integer")?
                .filter(|secs| *secs > 0)
                .unwrap_or(60 * 60 * 24),
            access_cookie_name: optional("ACCESS_COOKIE_NAME")
                .unwrap_or_else(|| "rsl_access".to_string()),
            cookie_secure: optional("COOKIE_SECURE")
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
            stripe_secret_key: require("STRIPE_SECRET_KEY")?,
            stripe_price_id: optional("STRIPE_PRICE_ID"),
            tier_prices,
            interview_price_id: price_for("INTERVIEW"),
            stripe_webhook_secret: optional("STRIPE_WEBHOOK_SECRET"),
            public_base_url: optional("PUBLIC_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            s3_bucket,
            s3_endpoint,
            s3_public_url: s3_public_url.trim_end_matches('/').to_string(),
            aws_access_key_id: require("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require("AWS_SECRET_ACCESS_KEY")?,
            port: optional("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "<redacted>";
        f.debug_struct("Config")
            .field(
                "access_token_secret",
                &self.access_token_secret.as_ref().map(|_| REDACTED),
            )
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("access_cookie_name", &self.access_cookie_name)
            .field("cookie_secure", &self.cookie_secure)
            .field("stripe_secret_key", &REDACTED)
            .field("stripe_price_id", &self.stripe_price_id)
            .field("tier_prices", &self.tier_prices)
            .field("interview_price_id", &self.interview_price_id)
            .field(
                "stripe_webhook_secret",
                &self.stripe_webhook_secret.as_ref().map(|_| REDACTED),
            )
            .field("public_base_url", &self.public_base_url)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_public_url", &self.s3_public_url)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &REDACTED)
            .field("port", &self.port)
            .field("rust_log", &self.rust_log)
            .finish()
    }
}

#[cfg(test)]
impl Config {
    /// Config for router tests; never touches the process environment.
    pub fn for_tests() -> Self {
        Config {
            access_token_secret: Some("test-secret".to_string()),
            access_token_ttl_secs: 60,
            access_cookie_name: "rsl_access".to_string(),
            cookie_secure: true,
            stripe_secret_key: "sk_test_123".to_string(),
            stripe_price_id: Some("price_123".to_string()),
            tier_prices: BTreeMap::from([
                ("ENTRY".to_string(), "price_entry".to_string()),
                ("EXEC".to_string(), "price_exec".to_string()),
            ]),
            interview_price_id: None,
            stripe_webhook_secret: Some("whsec_test".to_string()),
            public_base_url: "https://app.example.com".to_string(),
            s3_bucket: "resumes".to_string(),
            s3_endpoint: "http://localhost:9000".to_string(),
            s3_public_url: "http://localhost:9000/resumes".to_string(),
            aws_access_key_id: "minio".to_string(),
            aws_secret_access_key: "minio-secret".to_string(),
            port: 8080,
            rust_log: "info".to_string(),
        }
    }
}
