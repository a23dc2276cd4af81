//! Low-level discovery documents for downstream auto-provisioning

use super::PRIMARY_ID_PLACEHOLDER;
use crate::api::WafApi;
use crate::error::{ApiError, CollectError};
use crate::models::{DeviceDiscoveryRecord, DiscoveryRecord};
use serde::Serialize;
use tracing::{debug, warn};

/// Appliances report no cluster role through the API
const DEVICE_TYPE_STANDALONE: &str = "standalone";

/// `{"data": [...]}`, with an `error` member when discovery failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LldDocument<T> {
    pub data: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> LldDocument<T> {
    pub fn ok(data: Vec<T>) -> Self {
        Self { data, error: None }
    }

    /// Empty document carrying the failure; consumers expect this shape
    /// rather than a non-zero exit
    pub fn failed(error: impl ToString) -> Self {
        Self {
            data: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"data":[],"error":"{}"}}"#, e))
    }
}

/// Discovery records for every configured site.
///
/// Unlike a collection run, an empty site list is not an error here.
pub async fn discover_sites(
    api: &dyn WafApi,
    page_size: u32,
) -> Result<Vec<DiscoveryRecord>, CollectError> {
    let primary_id = match api.device_identity().await {
        Ok(identity) => identity.id.filter(|id| !id.is_empty()),
        Err(e) => {
            warn!(error = %e, "Failed to fetch primary device id");
            None
        }
    }
    .unwrap_or_else(|| PRIMARY_ID_PLACEHOLDER.to_string());

    let sites = api
        .list_sites(page_size)
        .await
        .map_err(CollectError::SiteListing)?;
    debug!(sites = sites.len(), "Discovered sites");

    Ok(sites
        .iter()
        .map(|site| DiscoveryRecord::from_site(site, &primary_id))
        .collect())
}

/// Discovery record for the appliance itself
pub async fn discover_devices(api: &dyn WafApi) -> Result<Vec<DeviceDiscoveryRecord>, ApiError> {
    let info = api.device_info().await?;
    Ok(vec![DeviceDiscoveryRecord {
        device_id: info.serial.unwrap_or_default(),
        device_version: info.version.unwrap_or_default(),
        device_type: DEVICE_TYPE_STANDALONE.to_string(),
    }])
}
