//! reqwest-backed client for the appliance management API

use super::types::{
    DeviceIdentity, DeviceInfo, Envelope, SitePage, TopologyCategory, TopologyNode, TrafficPage,
    TrafficQuery, TrafficRecord,
};
use super::WafApi;
use crate::error::ApiError;
use crate::models::Site;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const DEVICE_NAME_PATH: &str = "/api/v1/device/name/";
const DEVICE_INFO_PATH: &str = "/api/v1/device/info/";
const SITE_LIST_PATH: &str = "/api/v1/website/site/";
const TRAFFIC_PATH: &str = "/api/v1/logs/traffic/";

/// Connection settings for [`ApiClient`]
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Management address, e.g. `https://10.0.0.5:8443`
    pub base_url: String,
    /// Bearer token
    pub token: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Skip certificate validation (appliances ship self-signed certs)
    pub accept_invalid_certs: bool,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout: Duration::from_secs(30),
            accept_invalid_certs: true,
        }
    }
}

/// Authenticated JSON client for the appliance
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
    /// Last cache-busting value handed out, in epoch milliseconds
    last_ts: AtomicI64,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .default_headers(headers)
            .build()
            .map_err(ApiError::Client)?;

        info!(
            base_url = %base_url,
            timeout_secs = config.timeout.as_secs(),
            accept_invalid_certs = config.accept_invalid_certs,
            "Appliance API client configured"
        );

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
            last_ts: AtomicI64::new(0),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Next `_ts` value: wall-clock milliseconds, strictly increasing
    fn cache_buster(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut prev = self.last_ts.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last_ts
                .compare_exchange(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Make a GET request and unwrap the `{code, message, data}` envelope
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        bust_cache: bool,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);

        let mut query: Vec<(&str, String)> = params.to_vec();
        if bust_cache {
            query.push(("_ts", self.cache_buster().to_string()));
        }

        debug!(path = %path, params = ?query, "GET");

        let mut request = self.client.get(&url).bearer_auth(&self.token);
        if !query.is_empty() {
            request = request.query(&query);
        }

        let response = request
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| ApiError::Transport {
            path: path.to_string(),
            source,
        })?;

        if !status.is_success() {
            return Err(ApiError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope = serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })?;

        if !envelope.is_success() {
            return Err(ApiError::Rejected {
                path: path.to_string(),
                code: envelope.code,
                message: envelope.message.unwrap_or_default(),
            });
        }

        serde_json::from_value(envelope.data).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

#[async_trait]
impl WafApi for ApiClient {
    async fn ping(&self) -> Result<(), ApiError> {
        let _: serde_json::Value = self.get(DEVICE_NAME_PATH, &[], false).await?;
        Ok(())
    }

    async fn device_identity(&self) -> Result<DeviceIdentity, ApiError> {
        self.get(DEVICE_NAME_PATH, &[], true).await
    }

    async fn device_info(&self) -> Result<DeviceInfo, ApiError> {
        self.get(DEVICE_INFO_PATH, &[], false).await
    }

    async fn list_sites(&self, page_size: u32) -> Result<Vec<Site>, ApiError> {
        let params = [("page", "1".to_string()), ("per_page", page_size.to_string())];
        let page: SitePage = self.get(SITE_LIST_PATH, &params, true).await?;
        Ok(page.result.into_iter().map(Site::from).collect())
    }

    async fn query_traffic(&self, query: &TrafficQuery) -> Result<Vec<TrafficRecord>, ApiError> {
        let page: TrafficPage = self.get(TRAFFIC_PATH, &query.params(), true).await?;
        Ok(page.result)
    }

    async fn topology(&self, category: TopologyCategory) -> Result<Vec<TopologyNode>, ApiError> {
        let path = format!("/api/v1/website/tree/{}/", category.as_str());
        self.get(&path, &[], false).await
    }
}
