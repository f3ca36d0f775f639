use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    /// Externally reachable base URL, used to build return/callback URLs
    /// handed to the gateway.
    pub public_base_url: String,
    pub gateway: GatewayConfig,
    pub webhook_secret: String,
}

/// Settings for the outbound payment gateway client. Grouped here so every
/// call site shares one injected configuration instead of ad hoc constants.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub site_id: String,
    #[serde(skip, default = "default_gateway_timeout")]
    pub request_timeout: Duration,
}

fn default_gateway_timeout() -> Duration {
    Duration::from_secs(15)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let timeout_secs: u64 = env::var("GATEWAY_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()?;

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            gateway: GatewayConfig {
                base_url: env::var("GATEWAY_BASE_URL")?,
                api_key: env::var("GATEWAY_API_KEY")?,
                site_id: env::var("GATEWAY_SITE_ID")?,
                request_timeout: Duration::from_secs(timeout_secs),
            },
            webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_bounded() {
        let timeout = default_gateway_timeout();
        assert!(timeout > Duration::from_secs(0));
        assert!(timeout <= Duration::from_secs(60));
    }
}
