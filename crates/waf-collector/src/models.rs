//! Core data models for the WAF collection pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal the appliance returns for "no data in this field"
pub const SENTINEL: &str = "-";

/// Prefix shared by every item key we push
pub const KEY_PREFIX: &str = "waf";

/// A protected web application configured on the appliance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Alternate device identifier candidate; empty or `"0"` means none
    pub struct_id: String,
    /// Deployment type as reported by the listing (e.g. `reverse`)
    #[serde(default)]
    pub site_type: Option<String>,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
}

impl Site {
    /// Minimal constructor used by the listing decoder and tests
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        enabled: bool,
        struct_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled,
            struct_id: struct_id.into(),
            site_type: None,
            ip: String::new(),
            ports: Vec::new(),
            domains: Vec::new(),
        }
    }

    /// The structId if it names a real alternate identifier
    pub fn alternate_id(&self) -> Option<&str> {
        if self.struct_id.is_empty() || self.struct_id == "0" {
            None
        } else {
            Some(&self.struct_id)
        }
    }
}

/// Requested metric bucket size
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Granularity {
    #[default]
    Minutes,
    Hours,
    Days,
    /// Passed through to the API verbatim; windows use the minute defaults
    Unknown(String),
}

impl Granularity {
    pub fn parse(value: &str) -> Self {
        match value {
            "mins" => Granularity::Minutes,
            "hours" => Granularity::Hours,
            "days" => Granularity::Days,
            other => Granularity::Unknown(other.to_string()),
        }
    }

    /// Value of the `type` query parameter
    pub fn as_str(&self) -> &str {
        match self {
            Granularity::Minutes => "mins",
            Granularity::Hours => "hours",
            Granularity::Days => "days",
            Granularity::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Granularity::Unknown(_))
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ten per-site traffic metrics, in emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficMetric {
    BytesInRateAvg,
    BytesInRateMax,
    BytesOutRateAvg,
    BytesOutRateMax,
    ConnCurAvg,
    ConnCurMax,
    ConnRateAvg,
    HttpReqCntAvg,
    HttpReqCntMax,
    HttpReqRateAvg,
}

impl TrafficMetric {
    pub const ALL: [TrafficMetric; 10] = [
        TrafficMetric::BytesInRateAvg,
        TrafficMetric::BytesInRateMax,
        TrafficMetric::BytesOutRateAvg,
        TrafficMetric::BytesOutRateMax,
        TrafficMetric::ConnCurAvg,
        TrafficMetric::ConnCurMax,
        TrafficMetric::ConnRateAvg,
        TrafficMetric::HttpReqCntAvg,
        TrafficMetric::HttpReqCntMax,
        TrafficMetric::HttpReqRateAvg,
    ];

    /// Field name in the raw traffic record; also the item key segment
    pub fn field(&self) -> &'static str {
        match self {
            TrafficMetric::BytesInRateAvg => "bytes_in_rate_avg",
            TrafficMetric::BytesInRateMax => "bytes_in_rate_max",
            TrafficMetric::BytesOutRateAvg => "bytes_out_rate_avg",
            TrafficMetric::BytesOutRateMax => "bytes_out_rate_max",
            TrafficMetric::ConnCurAvg => "conn_cur_avg",
            TrafficMetric::ConnCurMax => "conn_cur_max",
            TrafficMetric::ConnRateAvg => "conn_rate_avg",
            TrafficMetric::HttpReqCntAvg => "http_req_cnt_avg",
            TrafficMetric::HttpReqCntMax => "http_req_cnt_max",
            TrafficMetric::HttpReqRateAvg => "http_req_rate_avg",
        }
    }

    /// Item key for this metric on the given site
    pub fn key(&self, site_name: &str) -> String {
        site_key(self.field(), site_name)
    }
}

/// `waf.site.<name>[<site>]`
pub fn site_key(metric: &str, site_name: &str) -> String {
    format!("{}.site.{}[{}]", KEY_PREFIX, metric, site_name)
}

/// One traffic bucket for a site, after sentinel normalisation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Unix seconds
    pub timestamp: i64,
    pub bytes_in_rate_avg: f64,
    pub bytes_in_rate_max: f64,
    pub bytes_out_rate_avg: f64,
    pub bytes_out_rate_max: f64,
    pub conn_cur_avg: f64,
    pub conn_cur_max: f64,
    pub conn_rate_avg: f64,
    pub http_req_cnt_avg: f64,
    pub http_req_cnt_max: f64,
    pub http_req_rate_avg: f64,
}

impl MetricSample {
    /// All-zero sample used for continuity when a site has no data
    pub fn zero(timestamp: i64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    pub fn get(&self, metric: TrafficMetric) -> f64 {
        match metric {
            TrafficMetric::BytesInRateAvg => self.bytes_in_rate_avg,
            TrafficMetric::BytesInRateMax => self.bytes_in_rate_max,
            TrafficMetric::BytesOutRateAvg => self.bytes_out_rate_avg,
            TrafficMetric::BytesOutRateMax => self.bytes_out_rate_max,
            TrafficMetric::ConnCurAvg => self.conn_cur_avg,
            TrafficMetric::ConnCurMax => self.conn_cur_max,
            TrafficMetric::ConnRateAvg => self.conn_rate_avg,
            TrafficMetric::HttpReqCntAvg => self.http_req_cnt_avg,
            TrafficMetric::HttpReqCntMax => self.http_req_cnt_max,
            TrafficMetric::HttpReqRateAvg => self.http_req_rate_avg,
        }
    }

    pub fn set(&mut self, metric: TrafficMetric, value: f64) {
        let slot = match metric {
            TrafficMetric::BytesInRateAvg => &mut self.bytes_in_rate_avg,
            TrafficMetric::BytesInRateMax => &mut self.bytes_in_rate_max,
            TrafficMetric::BytesOutRateAvg => &mut self.bytes_out_rate_avg,
            TrafficMetric::BytesOutRateMax => &mut self.bytes_out_rate_max,
            TrafficMetric::ConnCurAvg => &mut self.conn_cur_avg,
            TrafficMetric::ConnCurMax => &mut self.conn_cur_max,
            TrafficMetric::ConnRateAvg => &mut self.conn_rate_avg,
            TrafficMetric::HttpReqCntAvg => &mut self.http_req_cnt_avg,
            TrafficMetric::HttpReqCntMax => &mut self.http_req_cnt_max,
            TrafficMetric::HttpReqRateAvg => &mut self.http_req_rate_avg,
        };
        *slot = value;
    }
}

/// Value carried by a [`MetricPoint`]
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{}", v),
            MetricValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

/// Flattened wire unit, one line of the push protocol
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub host: String,
    pub key: String,
    pub value: MetricValue,
    /// Unix seconds
    pub clock: i64,
}

impl MetricPoint {
    pub fn new(
        host: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<MetricValue>,
        clock: i64,
    ) -> Self {
        Self {
            host: host.into(),
            key: key.into(),
            value: value.into(),
            clock,
        }
    }
}

/// Low-level discovery macros for one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    #[serde(rename = "{#SITE_ID}")]
    pub site_id: String,
    #[serde(rename = "{#SITE_NAME}")]
    pub site_name: String,
    #[serde(rename = "{#SITE_TYPE}")]
    pub site_type: String,
    #[serde(rename = "{#SITE_IP}")]
    pub site_ip: String,
    #[serde(rename = "{#SITE_PORT}")]
    pub site_port: String,
    #[serde(rename = "{#SITE_DOMAIN}")]
    pub site_domain: String,
    #[serde(rename = "{#SITE_ENABLE}")]
    pub site_enable: String,
    #[serde(rename = "{#STRUCT_ID}")]
    pub struct_id: String,
    #[serde(rename = "{#DEVICE_ID}")]
    pub device_id: String,
    #[serde(rename = "{#STRUCT_PK}")]
    pub struct_pk: String,
}

impl DiscoveryRecord {
    /// Build the record for `site`, substituting `primary_device_id`
    /// when the site carries no alternate identifier
    pub fn from_site(site: &Site, primary_device_id: &str) -> Self {
        let device_id = site.alternate_id().unwrap_or(primary_device_id).to_string();

        Self {
            site_id: site.id.clone(),
            site_name: site.name.clone(),
            site_type: site.site_type.clone().unwrap_or_else(|| "WAF".to_string()),
            site_ip: site.ip.clone(),
            site_port: site.ports.join(","),
            site_domain: site.domains.join(","),
            site_enable: if site.enabled { "1" } else { "0" }.to_string(),
            struct_id: device_id.clone(),
            device_id,
            struct_pk: site.struct_id.clone(),
        }
    }
}

/// Device-level discovery macros (standalone appliances only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDiscoveryRecord {
    #[serde(rename = "{#DEVICE_ID}")]
    pub device_id: String,
    #[serde(rename = "{#DEVICE_VERSION}")]
    pub device_version: String,
    #[serde(rename = "{#DEVICE_TYPE}")]
    pub device_type: String,
}
