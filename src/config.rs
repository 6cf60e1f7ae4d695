//! Runtime configuration.
//!
//! Values come from command-line flags with environment-variable fallbacks
//! and are validated once at startup into a [`GatewayConfig`] that is handed
//! to the gateway client constructor.

use crate::error::{MarketError, Result};
use clap::Args;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.chapa.co/v1";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CURRENCY: &str = "ETB";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Settings for the Chapa payment gateway client.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub secret_key: String,
    pub base_url: String,
    /// Externally reachable base of this service, used for the webhook and
    /// return URLs handed to the gateway.
    pub public_base_url: String,
    pub currency: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(secret_key: impl Into<String>) -> Result<Self> {
        let secret_key = secret_key.into();
        if secret_key.trim().is_empty() {
            return Err(MarketError::Config(
                "CHAPA_SECRET_KEY must be set to a non-empty value".to_string(),
            ));
        }
        Ok(Self {
            secret_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_public_base_url(mut self, public_base_url: impl Into<String>) -> Self {
        self.public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn callback_url(&self) -> String {
        format!("{}/payments/webhook", self.public_base_url)
    }

    pub fn return_url(&self) -> String {
        format!("{}/payments/return", self.public_base_url)
    }
}

/// Gateway flags shared by the commands that talk to the payment provider.
#[derive(Args, Debug, Clone)]
pub struct GatewayArgs {
    /// Chapa secret key (required)
    #[arg(long, env = "CHAPA_SECRET_KEY", hide_env_values = true)]
    pub chapa_secret_key: Option<String>,

    /// Chapa API base URL
    #[arg(long, env = "CHAPA_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub chapa_base_url: String,

    /// Public base URL used to build the webhook and return URLs
    #[arg(long, env = "PUBLIC_BASE_URL", default_value = DEFAULT_PUBLIC_BASE_URL)]
    pub public_base_url: String,

    /// Currency for checkouts
    #[arg(long, env = "CHAPA_CURRENCY", default_value = DEFAULT_CURRENCY)]
    pub currency: String,

    /// Gateway request timeout in seconds
    #[arg(long, env = "CHAPA_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub gateway_timeout_secs: u64,
}

impl TryFrom<GatewayArgs> for GatewayConfig {
    type Error = MarketError;

    fn try_from(args: GatewayArgs) -> Result<Self> {
        let secret_key = args
            .chapa_secret_key
            .ok_or_else(|| MarketError::Config("CHAPA_SECRET_KEY is not set".to_string()))?;
        if args.gateway_timeout_secs == 0 {
            return Err(MarketError::Config(
                "CHAPA_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        let mut config = GatewayConfig::new(secret_key)?
            .with_base_url(args.chapa_base_url)
            .with_public_base_url(args.public_base_url)
            .with_timeout(Duration::from_secs(args.gateway_timeout_secs));
        config.currency = args.currency;
        Ok(config)
    }
}
