use anyhow::Result;

use crate::core::{
    config::Config,
    db::{self, DbPool},
};
use crate::gateway::razorpay::RazorpayClient;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub gateway: RazorpayClient,
}

impl AppState {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let db_pool = db::create_pool(&config.database.url).await?;
        let gateway = RazorpayClient::new(reqwest::Client::new(), &config.razorpay);
        Ok(Self { db_pool, gateway })
    }
}
