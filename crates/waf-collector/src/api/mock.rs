//! Scripted in-memory appliance for unit tests

use super::{TopologyCategory, TopologyNode, TrafficQuery, TrafficRecord, WafApi};
use super::{DeviceIdentity, DeviceInfo};
use crate::error::ApiError;
use crate::models::Site;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// A call observed by [`MockApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Ping,
    DeviceIdentity,
    DeviceInfo,
    ListSites,
    Traffic {
        app_id: String,
        device_id: String,
        data_type: String,
        windowed: bool,
    },
    Topology(TopologyCategory),
}

pub(crate) struct MockApi {
    reachable: bool,
    primary_id: Option<String>,
    serial: Option<String>,
    sites: Option<Vec<Site>>,
    traffic: HashMap<(String, String), Vec<TrafficRecord>>,
    failing_traffic: HashSet<String>,
    topology: HashMap<TopologyCategory, Vec<TopologyNode>>,
    calls: Mutex<Vec<Call>>,
}

fn rejected(path: &str) -> ApiError {
    ApiError::Rejected {
        path: path.to_string(),
        code: "FAILED".to_string(),
        message: "scripted failure".to_string(),
    }
}

impl MockApi {
    pub(crate) fn new() -> Self {
        Self {
            reachable: true,
            primary_id: None,
            serial: None,
            sites: Some(Vec::new()),
            traffic: HashMap::new(),
            failing_traffic: HashSet::new(),
            topology: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub(crate) fn with_primary(mut self, id: &str) -> Self {
        self.primary_id = Some(id.to_string());
        self
    }

    pub(crate) fn with_serial(mut self, serial: &str) -> Self {
        self.serial = Some(serial.to_string());
        self
    }

    pub(crate) fn with_sites(mut self, sites: Vec<Site>) -> Self {
        self.sites = Some(sites);
        self
    }

    pub(crate) fn with_failing_site_listing(mut self) -> Self {
        self.sites = None;
        self
    }

    /// Records returned for any traffic query on `(app_id, device_id)`
    pub(crate) fn with_traffic(
        mut self,
        app_id: &str,
        device_id: &str,
        records: Vec<TrafficRecord>,
    ) -> Self {
        self.traffic
            .insert((app_id.to_string(), device_id.to_string()), records);
        self
    }

    pub(crate) fn with_failing_traffic(mut self, app_id: &str) -> Self {
        self.failing_traffic.insert(app_id.to_string());
        self
    }

    pub(crate) fn with_topology(mut self, category: TopologyCategory, roots: Vec<TopologyNode>) -> Self {
        self.topology.insert(category, roots);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn traffic_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Traffic { .. }))
            .collect()
    }

    /// Device ids probed or queried for `app_id`, in call order
    pub(crate) fn devices_tried(&self, app_id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Traffic {
                    app_id: a,
                    device_id,
                    ..
                } if a == app_id => Some(device_id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl WafApi for MockApi {
    async fn ping(&self) -> Result<(), ApiError> {
        self.record(Call::Ping);
        if self.reachable {
            Ok(())
        } else {
            Err(rejected("/api/v1/device/name/"))
        }
    }

    async fn device_identity(&self) -> Result<DeviceIdentity, ApiError> {
        self.record(Call::DeviceIdentity);
        match &self.primary_id {
            Some(id) if self.reachable => Ok(DeviceIdentity {
                id: Some(id.clone()),
                name: Some("waf".to_string()),
            }),
            _ => Err(rejected("/api/v1/device/name/")),
        }
    }

    async fn device_info(&self) -> Result<DeviceInfo, ApiError> {
        self.record(Call::DeviceInfo);
        match &self.serial {
            Some(serial) => Ok(DeviceInfo {
                serial: Some(serial.clone()),
                version: Some("5.0.1".to_string()),
            }),
            None => Err(rejected("/api/v1/device/info/")),
        }
    }

    async fn list_sites(&self, _page_size: u32) -> Result<Vec<Site>, ApiError> {
        self.record(Call::ListSites);
        self.sites
            .clone()
            .ok_or_else(|| rejected("/api/v1/website/site/"))
    }

    async fn query_traffic(&self, query: &TrafficQuery) -> Result<Vec<TrafficRecord>, ApiError> {
        self.record(Call::Traffic {
            app_id: query.app_id.clone(),
            device_id: query.device_id.clone(),
            data_type: query.data_type.clone(),
            windowed: query.window.is_some(),
        });
        if self.failing_traffic.contains(&query.app_id) {
            return Err(rejected("/api/v1/logs/traffic/"));
        }
        Ok(self
            .traffic
            .get(&(query.app_id.clone(), query.device_id.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn topology(&self, category: TopologyCategory) -> Result<Vec<TopologyNode>, ApiError> {
        self.record(Call::Topology(category));
        self.topology
            .get(&category)
            .cloned()
            .ok_or_else(|| rejected("/api/v1/website/tree/"))
    }
}

/// Traffic record with real data in `conn_cur_avg`
pub(crate) fn valid_record(timestamp: &str, conn_cur_avg: f64) -> TrafficRecord {
    serde_json::from_value(json!({
        "timestamp": timestamp,
        "bytes_in_rate_avg": 100.0,
        "bytes_in_rate_max": "-",
        "conn_cur_avg": conn_cur_avg,
    }))
    .unwrap()
}

/// Traffic record where every field is the sentinel
pub(crate) fn sentinel_record(timestamp: &str) -> TrafficRecord {
    serde_json::from_value(json!({
        "timestamp": timestamp,
        "bytes_in_rate_avg": "-",
        "conn_cur_avg": "-",
    }))
    .unwrap()
}

/// Single root with one area holding the given cluster ids
pub(crate) fn tree(cluster_ids: &[&str]) -> Vec<TopologyNode> {
    let clusters = cluster_ids
        .iter()
        .map(|id| TopologyNode {
            id: Some(id.to_string()),
            ..Default::default()
        })
        .collect();
    vec![TopologyNode {
        id: Some("root".to_string()),
        children: vec![TopologyNode {
            id: Some("area".to_string()),
            children: clusters,
            ..Default::default()
        }],
        ..Default::default()
    }]
}
