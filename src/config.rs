use serde::Deserialize;

use crate::gateway::DEFAULT_API_BASE;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    #[serde(default)]
    pub razorpay_key_id: Option<String>,
    #[serde(default)]
    pub razorpay_key_secret: Option<String>,
    #[serde(default = "default_razorpay_api_base")]
    pub razorpay_api_base: String,
}

fn default_razorpay_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;
        config.try_deserialize()
    }

    /// Key id and secret, when both are set and non-empty.
    pub fn gateway_credentials(&self) -> Option<(&str, &str)> {
        let id = self.razorpay_key_id.as_deref().filter(|s| !s.is_empty())?;
        let secret = self.razorpay_key_secret.as_deref().filter(|s| !s.is_empty())?;
        Some((id, secret))
    }

    /// The secret alone is enough to verify checkout callbacks.
    pub fn signing_secret(&self) -> Option<&str> {
        self.razorpay_key_secret.as_deref().filter(|s| !s.is_empty())
    }
}
