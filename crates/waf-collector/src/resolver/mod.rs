//! Device identifier resolution
//!
//! The traffic endpoint only returns data when queried with the "right"
//! device identifier, and which one that is depends on how the site is
//! deployed. Resolution walks a fixed chain of strategies and stops at
//! the first identifier that yields at least one non-sentinel record.
//!
//! The chain is deterministic: identical inputs and API responses always
//! produce the same identifier, and every probe is a single query.

use crate::api::{TopologyCategory, TopologyNode, TrafficQuery, TrafficRecord, WafApi};
use crate::models::Site;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};


/// Candidate values that mean "use the appliance's own id"
const PLACEHOLDER_IDS: [&str; 3] = ["", "0", "auto"];

/// Cluster ids that are never real device identifiers
const RESERVED_CLUSTER_IDS: [&str; 3] = ["", "0", "1"];

/// One step of the resolution chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Placeholder candidate: trust the primary device id without probing
    PrimaryForPlaceholder,
    /// Probe the candidate as given
    Candidate,
    /// Probe the site's structId from the cached site list
    StructId,
    /// Probe the primary device id
    PrimaryDevice,
    /// Probe cluster ids from each topology category
    Topology,
    /// Probe the device serial number
    Serial,
}

/// Strategies in evaluation order
pub const STRATEGY_CHAIN: [Strategy; 6] = [
    Strategy::PrimaryForPlaceholder,
    Strategy::Candidate,
    Strategy::StructId,
    Strategy::PrimaryDevice,
    Strategy::Topology,
    Strategy::Serial,
];

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::PrimaryForPlaceholder => "primary-for-placeholder",
            Strategy::Candidate => "candidate",
            Strategy::StructId => "struct-id",
            Strategy::PrimaryDevice => "primary-device",
            Strategy::Topology => "topology",
            Strategy::Serial => "serial",
        };
        f.write_str(name)
    }
}

/// Result of resolving one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub device_id: String,
    /// Strategy that produced the id; `None` when the chain was exhausted
    /// and the original candidate is returned unchanged
    pub strategy: Option<Strategy>,
}

impl Resolution {
    pub fn is_fallback(&self) -> bool {
        self.strategy.is_none()
    }
}

/// Resolves working device identifiers for sites.
///
/// Owns the in-run cache of the primary device id; construct one per run.
pub struct DeviceIdResolver {
    api: Arc<dyn WafApi>,
    primary_device_id: Option<String>,
}

impl DeviceIdResolver {
    pub fn new(api: Arc<dyn WafApi>) -> Self {
        Self {
            api,
            primary_device_id: None,
        }
    }

    /// Primary device id, fetched once per run. Failures are not cached.
    pub async fn primary_device_id(&mut self) -> Option<String> {
        if let Some(id) = &self.primary_device_id {
            return Some(id.clone());
        }

        match self.api.device_identity().await {
            Ok(identity) => match identity.id.filter(|id| !id.is_empty()) {
                Some(id) => {
                    info!(device_id = %id, "Resolved primary device id");
                    self.primary_device_id = Some(id.clone());
                    Some(id)
                }
                None => {
                    warn!("Device identity response carried no id");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to fetch primary device id");
                None
            }
        }
    }

    /// Working device id for `site_id`, trying `candidate` first
    pub async fn resolve(&mut self, site_id: &str, candidate: &str, sites: &[Site]) -> Resolution {
        for strategy in STRATEGY_CHAIN {
            if let Some(device_id) = self.attempt(strategy, site_id, candidate, sites).await {
                if strategy != Strategy::Candidate {
                    info!(
                        site_id = %site_id,
                        candidate = %candidate,
                        device_id = %device_id,
                        strategy = %strategy,
                        "Resolved alternate device id"
                    );
                }
                return Resolution {
                    device_id,
                    strategy: Some(strategy),
                };
            }

            if strategy == Strategy::Candidate {
                debug!(
                    site_id = %site_id,
                    candidate = %candidate,
                    "Candidate device id returned no data, trying alternatives"
                );
            }
        }

        warn!(
            site_id = %site_id,
            candidate = %candidate,
            "No device id returned data, keeping candidate"
        );
        Resolution {
            device_id: candidate.to_string(),
            strategy: None,
        }
    }

    /// Run one strategy of the chain
    pub async fn attempt(
        &mut self,
        strategy: Strategy,
        site_id: &str,
        candidate: &str,
        sites: &[Site],
    ) -> Option<String> {
        match strategy {
            Strategy::PrimaryForPlaceholder => {
                if PLACEHOLDER_IDS.contains(&candidate) {
                    self.primary_device_id().await
                } else {
                    None
                }
            }
            Strategy::Candidate => self.probe_id(site_id, candidate).await,
            Strategy::StructId => {
                let alternate = sites
                    .iter()
                    .find(|s| s.id == site_id)
                    .and_then(Site::alternate_id)
                    .filter(|id| *id != candidate)?
                    .to_string();
                self.probe_id(site_id, &alternate).await
            }
            Strategy::PrimaryDevice => {
                let primary = self
                    .primary_device_id()
                    .await
                    .filter(|id| id != candidate)?;
                self.probe_id(site_id, &primary).await
            }
            Strategy::Topology => self.probe_topology(site_id, candidate).await,
            Strategy::Serial => {
                let serial = match self.api.device_info().await {
                    Ok(info) => info.serial.filter(|s| !s.is_empty() && s != candidate)?,
                    Err(e) => {
                        debug!(error = %e, "Device info unavailable");
                        return None;
                    }
                };
                debug!(site_id = %site_id, serial = %serial, "Trying device serial number");
                self.probe_id(site_id, &serial).await
            }
        }
    }

    /// Whether a minute-granularity query with `device_id` yields any
    /// non-sentinel record. Errors count as "no data".
    pub async fn probe(&self, site_id: &str, device_id: &str) -> bool {
        let query = TrafficQuery::probe(site_id, device_id);
        match self.api.query_traffic(&query).await {
            Ok(records) => records.iter().any(TrafficRecord::is_valid),
            Err(e) => {
                debug!(
                    site_id = %site_id,
                    device_id = %device_id,
                    error = %e,
                    "Probe failed"
                );
                false
            }
        }
    }

    async fn probe_id(&self, site_id: &str, device_id: &str) -> Option<String> {
        if self.probe(site_id, device_id).await {
            Some(device_id.to_string())
        } else {
            None
        }
    }

    async fn probe_topology(&self, site_id: &str, candidate: &str) -> Option<String> {
        for category in TopologyCategory::ALL {
            let roots = match self.api.topology(category).await {
                Ok(roots) => roots,
                Err(e) => {
                    debug!(category = category.as_str(), error = %e, "Topology unavailable");
                    continue;
                }
            };

            for cluster_id in TopologyNode::cluster_ids(&roots) {
                if RESERVED_CLUSTER_IDS.contains(&cluster_id) || cluster_id == candidate {
                    continue;
                }
                if self.probe(site_id, cluster_id).await {
                    return Some(cluster_id.to_string());
                }
            }
        }
        None
    }
}
