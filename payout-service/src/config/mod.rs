//! Configuration module for payout-service.

use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Stripe's hard ceiling on `limit` for list endpoints.
pub const MAX_LIST_LIMIT: u8 = 100;

#[derive(Debug, Clone)]
pub struct PayoutConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub stripe: StripeConfig,
    pub reconciliation: ReconciliationSettings,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Platform secret key. `None` leaves the service running with every
    /// reconciliation request failing as a configuration error.
    pub secret_key: Option<Secret<String>>,
    pub api_base_url: String,
    pub api_version: Option<String>,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripeMode {
    Test,
    Live,
    Unknown,
}

impl StripeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Live => "live",
            Self::Unknown => "unknown",
        }
    }
}

impl StripeConfig {
    pub fn is_configured(&self) -> bool {
        self.secret_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().trim().is_empty())
    }

    /// Test or live mode, read from the key prefix.
    pub fn mode(&self) -> StripeMode {
        let Some(key) = self.secret_key.as_ref() else {
            return StripeMode::Unknown;
        };
        let key = key.expose_secret();
        if key.starts_with("sk_test_") || key.starts_with("rk_test_") {
            StripeMode::Test
        } else if key.starts_with("sk_live_") || key.starts_with("rk_live_") {
            StripeMode::Live
        } else {
            StripeMode::Unknown
        }
    }

    /// First characters of the key, safe to log.
    pub fn masked_key(&self) -> Option<String> {
        self.secret_key.as_ref().map(|key| {
            let prefix: String = key.expose_secret().chars().take(10).collect();
            format!("{}...", prefix)
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationSettings {
    /// Currency reported when the provider returns nothing to sum.
    pub default_currency: String,
    /// Page size for the payout-total query.
    pub payout_limit: u8,
    /// Page size for the payout listing.
    pub listing_limit: u8,
    /// Echo the provider's raw payload in success responses.
    pub include_raw_payload: bool,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            default_currency: "brl".to_string(),
            payout_limit: MAX_LIST_LIMIT,
            listing_limit: 10,
            include_raw_payload: true,
        }
    }
}

impl PayoutConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_source(common, |key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup (environment, test maps).
    pub fn from_source<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_key = lookup("STRIPE_SECRET_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(Secret::new);

        let retry = RetryConfig {
            max_retries: parse_var(&lookup, "STRIPE_MAX_NETWORK_RETRIES", 2u32)?,
            initial_backoff: Duration::from_millis(parse_var(
                &lookup,
                "STRIPE_RETRY_INITIAL_BACKOFF_MS",
                500u64,
            )?),
            max_backoff: Duration::from_millis(parse_var(
                &lookup,
                "STRIPE_RETRY_MAX_BACKOFF_MS",
                5_000u64,
            )?),
            ..RetryConfig::default()
        };

        let stripe = StripeConfig {
            secret_key,
            api_base_url: lookup("STRIPE_API_BASE_URL")
                .unwrap_or_else(|| "https://api.stripe.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_version: lookup("STRIPE_API_VERSION").filter(|v| !v.is_empty()),
            timeout: Duration::from_secs(parse_var(&lookup, "STRIPE_TIMEOUT_SECS", 15u64)?),
            retry,
        };

        let reconciliation = ReconciliationSettings {
            default_currency: lookup("RECONCILIATION_DEFAULT_CURRENCY")
                .unwrap_or_else(|| "brl".to_string())
                .to_lowercase(),
            payout_limit: clamp_limit(parse_var(
                &lookup,
                "RECONCILIATION_PAYOUT_LIMIT",
                u32::from(MAX_LIST_LIMIT),
            )?),
            listing_limit: clamp_limit(parse_var(&lookup, "RECONCILIATION_LISTING_LIMIT", 10u32)?),
            include_raw_payload: parse_var(&lookup, "RECONCILIATION_INCLUDE_RAW_PAYLOAD", true)?,
        };

        Ok(Self {
            common,
            service_name: lookup("SERVICE_NAME").unwrap_or_else(|| "payout-service".to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            otlp_endpoint: lookup("OTLP_ENDPOINT").filter(|v| !v.is_empty()),
            stripe,
            reconciliation,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}

fn clamp_limit(limit: u32) -> u8 {
    // Clamped into 1..=100, so the narrowing cannot fail.
    u8::try_from(limit.clamp(1, u32::from(MAX_LIST_LIMIT))).unwrap_or(MAX_LIST_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<PayoutConfig, AppError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PayoutConfig::from_source(core_config::Config::default(), |key| map.get(key).cloned())
    }

    #[test]
    fn defaults_use_bounded_retrying_client() {
        let config = load(&[]).unwrap();

        assert_eq!(config.service_name, "payout-service");
        assert_eq!(config.stripe.api_base_url, "https://api.stripe.com");
        assert_eq!(config.stripe.timeout, Duration::from_secs(15));
        assert_eq!(config.stripe.retry.max_retries, 2);
        assert_eq!(config.reconciliation.payout_limit, 100);
        assert_eq!(config.reconciliation.listing_limit, 10);
        assert_eq!(config.reconciliation.default_currency, "brl");
        assert!(config.reconciliation.include_raw_payload);
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn missing_or_blank_secret_is_not_configured() {
        assert!(!load(&[]).unwrap().stripe.is_configured());
        assert!(!load(&[("STRIPE_SECRET_KEY", "  ")]).unwrap().stripe.is_configured());
        assert!(load(&[("STRIPE_SECRET_KEY", "sk_test_abc")])
            .unwrap()
            .stripe
            .is_configured());
    }

    #[test]
    fn mode_follows_key_prefix() {
        let mode = |key: &str| load(&[("STRIPE_SECRET_KEY", key)]).unwrap().stripe.mode();

        assert_eq!(mode("sk_test_123"), StripeMode::Test);
        assert_eq!(mode("rk_live_123"), StripeMode::Live);
        assert_eq!(mode("whatever"), StripeMode::Unknown);
        assert_eq!(load(&[]).unwrap().stripe.mode(), StripeMode::Unknown);
    }

    #[test]
    fn masked_key_never_reveals_the_whole_secret() {
        let config = load(&[("STRIPE_SECRET_KEY", "sk_test_51Habcdefghijkl")]).unwrap();
        assert_eq!(config.stripe.masked_key().as_deref(), Some("sk_test_51..."));
    }

    #[test]
    fn limits_are_clamped_to_stripe_bounds() {
        let config = load(&[
            ("RECONCILIATION_PAYOUT_LIMIT", "250"),
            ("RECONCILIATION_LISTING_LIMIT", "0"),
        ])
        .unwrap();
        assert_eq!(config.reconciliation.payout_limit, 100);
        assert_eq!(config.reconciliation.listing_limit, 1);

        let config = load(&[
            ("RECONCILIATION_PAYOUT_LIMIT", "300"),
            ("RECONCILIATION_LISTING_LIMIT", "25"),
        ])
        .unwrap();
        assert_eq!(config.reconciliation.payout_limit, 100);
        assert_eq!(config.reconciliation.listing_limit, 25);
    }

    #[test]
    fn negative_limit_is_a_configuration_error() {
        let err = load(&[("RECONCILIATION_LISTING_LIMIT", "-5")]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn invalid_numbers_are_configuration_errors() {
        let err = load(&[("STRIPE_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = load(&[("STRIPE_API_BASE_URL", "http://localhost:12111/")]).unwrap();
        assert_eq!(config.stripe.api_base_url, "http://localhost:12111");
    }
}
