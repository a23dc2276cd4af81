//! Appliance management API
//!
//! The pipeline only talks to the appliance through the [`WafApi`]
//! trait; [`ApiClient`] is the HTTP implementation.

mod client;
mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{ApiClient, ApiConfig};
pub use types::{
    parse_api_time, DeviceIdentity, DeviceInfo, Envelope, SitePage, SiteRecord, TopologyCategory,
    TopologyNode, TrafficPage, TrafficQuery, TrafficRecord, API_TIME_FORMAT,
};

use crate::error::ApiError;
use crate::models::Site;
use async_trait::async_trait;

/// Calls the collection pipeline makes against the appliance
#[async_trait]
pub trait WafApi: Send + Sync {
    /// Lightweight identity call used as the connectivity check
    async fn ping(&self) -> Result<(), ApiError>;

    /// Primary device identity (`data.id` is the primary device id)
    async fn device_identity(&self) -> Result<DeviceIdentity, ApiError>;

    /// Device information, including the serial number
    async fn device_info(&self) -> Result<DeviceInfo, ApiError>;

    /// All configured sites in a single page
    async fn list_sites(&self, page_size: u32) -> Result<Vec<Site>, ApiError>;

    /// Raw traffic buckets for one site and device
    async fn query_traffic(&self, query: &TrafficQuery) -> Result<Vec<TrafficRecord>, ApiError>;

    /// Topology tree for one site category
    async fn topology(&self, category: TopologyCategory) -> Result<Vec<TopologyNode>, ApiError>;
}
