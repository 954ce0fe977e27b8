use std::sync::Arc;
use std::time::Duration;

use reqwest::Client as ReqwestClient;

use crate::config::AppConfig;

/// Shared application state: the immutable configuration and the outbound
/// HTTP client. Built once in `main` and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub http_client: ReqwestClient,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        // Outer bound only; each service applies its own shorter per-request
        // timeout on top.
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build Reqwest client: {}", e))?;

        Ok(AppState {
            config: Arc::new(config),
            http_client,
        })
    }
}
