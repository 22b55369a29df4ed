use anyhow::{Context, Result};

use crate::gateway::razorpay;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub razorpay: RazorpayConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
}

impl RazorpayConfig {
    /// Missing credentials are a startup warning, not a startup failure;
    /// gateway-backed endpoints fail with a typed error instead.
    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.is_empty()
    }
}

pub fn load() -> Result<Config> {
    let database = DatabaseConfig {
        url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
    };

    let port = match std::env::var("PORT") {
        Ok(port) => port.parse().context("PORT must be a valid port number")?,
        Err(_) => 3000,
    };

    let razorpay = RazorpayConfig {
        key_id: std::env::var("RAZORPAY_KEY_ID").unwrap_or_default(),
        key_secret: std::env::var("RAZORPAY_KEY_SECRET").unwrap_or_default(),
        base_url: std::env::var("RAZORPAY_BASE_URL")
            .unwrap_or_else(|_| razorpay::DEFAULT_BASE_URL.to_string()),
    };

    Ok(Config {
        database,
        server: ServerConfig { port },
        razorpay,
    })
}
