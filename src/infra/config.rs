use std::net::SocketAddr;

use axum::http::HeaderValue;
use env_helpers::get_env_default;
use secrecy::SecretString;

use crate::infra::error::InfraError;

pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cors_origin: HeaderValue,
    pub stripe_secret_key: SecretString,
    pub stripe_webhook_secret: SecretString,
    /// Max age, in seconds, of a webhook signature timestamp.
    pub webhook_tolerance_secs: i64,
    /// An unfinished claim older than this is treated as abandoned and may be taken over.
    pub webhook_stale_claim_secs: i64,
    /// Destination of the structured JSON log.
    pub log_file: String,
}

fn required(var: &'static str) -> Result<String, InfraError> {
    std::env::var(var).map_err(|_| InfraError::ConfigMissing { var })
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let stripe_secret_key = SecretString::new(required("STRIPE_SECRET_KEY")?.into());
        let stripe_webhook_secret = SecretString::new(required("STRIPE_WEBHOOK_SECRET")?.into());

        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", String::from("127.0.0.1:3001"))
            .parse()
            .map_err(|e| anyhow::anyhow!("BIND_ADDR must be a socket address: {e}"))?;
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .map_err(|e| anyhow::anyhow!("CORS_ORIGIN must be a valid header value: {e}"))?;

        let webhook_tolerance_secs: i64 = get_env_default("WEBHOOK_TOLERANCE_SECS", 300);
        let webhook_stale_claim_secs: i64 = get_env_default("WEBHOOK_STALE_CLAIM_SECS", 120);
        let log_file: String = get_env_default("LOG_FILE", String::from("app.log"));

        Ok(Self {
            database_url,
            bind_addr,
            cors_origin,
            stripe_secret_key,
            stripe_webhook_secret,
            webhook_tolerance_secs,
            webhook_stale_claim_secs,
            log_file,
        })
    }
}
