//! Wire types for the appliance management API

use crate::models::{MetricSample, Site, TrafficMetric, SENTINEL};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Layout of timestamps exchanged with the traffic endpoint (local time)
pub const API_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `{code, message, data}` wrapper around every response
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.code == "SUCCESS"
    }
}

/// `data` of `GET /api/v1/device/name/`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceIdentity {
    #[serde(default, deserialize_with = "string_or_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub name: Option<String>,
}

/// `data` of `GET /api/v1/device/info/`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, deserialize_with = "string_or_none")]
    pub serial: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub version: Option<String>,
}

/// `data` of the paginated site listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SitePage {
    #[serde(default)]
    pub result: Vec<SiteRecord>,
}

/// One entry of the site listing as the appliance sends it
#[derive(Debug, Clone, Deserialize)]
pub struct SiteRecord {
    #[serde(rename = "_pk", default, deserialize_with = "string_or_none")]
    pub pk: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "bool_or_false")]
    pub enable: bool,
    #[serde(default, deserialize_with = "string_or_none")]
    pub struct_pk: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "string_or_none")]
    pub site_type: Option<String>,
    #[serde(default)]
    pub ip_set: Value,
    #[serde(default)]
    pub port: Value,
    #[serde(default)]
    pub domain: Value,
}

impl From<SiteRecord> for Site {
    fn from(record: SiteRecord) -> Self {
        let mut site = Site::new(
            record.pk.unwrap_or_default(),
            record.name.unwrap_or_default(),
            record.enable,
            record.struct_pk.unwrap_or_default(),
        );
        site.site_type = record.site_type.filter(|t| !t.is_empty());
        site.ip = string_list(&record.ip_set).join(",");
        site.ports = string_list(&record.port);
        site.domains = string_list(&record.domain);
        site
    }
}

/// `data` of the traffic-log query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrafficPage {
    #[serde(default)]
    pub result: Vec<TrafficRecord>,
}

/// Raw traffic bucket: field name to JSON value, `"-"` meaning no data
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct TrafficRecord(pub Map<String, Value>);

impl TrafficRecord {
    /// A record is valid iff some non-timestamp field is not the sentinel
    pub fn is_valid(&self) -> bool {
        self.0
            .iter()
            .any(|(key, value)| key != "timestamp" && value.as_str() != Some(SENTINEL))
    }

    /// Numeric value of `metric`; sentinel, absent or non-numeric reads as 0
    pub fn metric(&self, metric: TrafficMetric) -> f64 {
        match self.0.get(metric.field()) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) if s != SENTINEL => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Bucket time as Unix seconds, falling back to `now` when missing
    /// or unparseable
    pub fn timestamp(&self, now: i64) -> i64 {
        self.0
            .get("timestamp")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .and_then(parse_api_time)
            .map(|t| t.timestamp())
            .unwrap_or(now)
    }

    pub fn to_sample(&self, now: i64) -> MetricSample {
        let mut sample = MetricSample::zero(self.timestamp(now));
        for metric in TrafficMetric::ALL {
            sample.set(metric, self.metric(metric));
        }
        sample
    }
}

/// Parse an API timestamp as appliance-local time
pub fn parse_api_time(value: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(value, API_TIME_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}

/// Site topology categories, walked in this order when probing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyCategory {
    Reverse,
    Transparent,
    Traction,
    Sniffer,
    Bridge,
}

impl TopologyCategory {
    pub const ALL: [TopologyCategory; 5] = [
        TopologyCategory::Reverse,
        TopologyCategory::Transparent,
        TopologyCategory::Traction,
        TopologyCategory::Sniffer,
        TopologyCategory::Bridge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyCategory::Reverse => "reverse",
            TopologyCategory::Transparent => "transparent",
            TopologyCategory::Traction => "traction",
            TopologyCategory::Sniffer => "sniffer",
            TopologyCategory::Bridge => "bridge",
        }
    }
}

/// Node of a topology tree (root, area, cluster, ...)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TopologyNode {
    #[serde(rename = "_pk", default, deserialize_with = "string_or_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub struct_type: Option<String>,
    #[serde(default, deserialize_with = "list_or_empty")]
    pub children: Vec<TopologyNode>,
}

impl TopologyNode {
    /// Identifiers of the third level (root -> area -> cluster), in order
    pub fn cluster_ids(roots: &[TopologyNode]) -> Vec<&str> {
        roots
            .iter()
            .flat_map(|root| root.children.iter())
            .flat_map(|area| area.children.iter())
            .filter_map(|cluster| cluster.id.as_deref())
            .collect()
    }
}

/// Parameters of a traffic-log query
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficQuery {
    pub data_type: String,
    pub app_id: String,
    pub device_id: String,
    pub window: Option<(DateTime<Local>, DateTime<Local>)>,
}

impl TrafficQuery {
    /// Minute-granularity query without a time range, used to probe ids
    pub fn probe(app_id: &str, device_id: &str) -> Self {
        Self {
            data_type: "mins".to_string(),
            app_id: app_id.to_string(),
            device_id: device_id.to_string(),
            window: None,
        }
    }

    /// Query parameters, excluding the cache buster
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("type", self.data_type.clone()),
            ("app_id", self.app_id.clone()),
            ("device_id", self.device_id.clone()),
        ];
        if let Some((start, end)) = &self.window {
            params.push(("timestamp__ge", start.format(API_TIME_FORMAT).to_string()));
            params.push(("timestamp__lt", end.format(API_TIME_FORMAT).to_string()));
        }
        params
    }
}

/// Accept a JSON string; anything else reads as absent
fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// `true` only for a JSON `true`; null or any other shape reads as false
fn bool_or_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

/// Accept a list; `null` reads as empty
fn list_or_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Flatten a string, number, or list of either into strings
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.is_empty() => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items.iter().flat_map(string_list).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> TrafficRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_record_validity() {
        let empty = record(json!({
            "timestamp": "2024-05-01 10:00:00",
            "bytes_in_rate_avg": "-",
            "conn_cur_avg": "-"
        }));
        assert!(!empty.is_valid());

        let valid = record(json!({
            "timestamp": "2024-05-01 10:00:00",
            "bytes_in_rate_avg": "-",
            "conn_cur_avg": 3
        }));
        assert!(valid.is_valid());

        // A timestamp alone carries no data
        assert!(!record(json!({"timestamp": "2024-05-01 10:00:00"})).is_valid());
    }

    #[test]
    fn test_record_to_sample() {
        let rec = record(json!({
            "timestamp": "2024-05-01 10:00:00",
            "bytes_in_rate_avg": 1024.5,
            "bytes_in_rate_max": "-",
            "conn_cur_max": "7",
            "http_req_rate_avg": 2
        }));
        let sample = rec.to_sample(0);

        let expected = parse_api_time("2024-05-01 10:00:00").unwrap().timestamp();
        assert_eq!(sample.timestamp, expected);
        assert_eq!(sample.bytes_in_rate_avg, 1024.5);
        assert_eq!(sample.bytes_in_rate_max, 0.0);
        assert_eq!(sample.conn_cur_max, 7.0);
        assert_eq!(sample.http_req_rate_avg, 2.0);
        assert_eq!(sample.conn_rate_avg, 0.0);
    }

    #[test]
    fn test_record_timestamp_fallback() {
        let rec = record(json!({"timestamp": "yesterday", "conn_cur_avg": 1}));
        assert_eq!(rec.timestamp(42), 42);

        let rec = record(json!({"conn_cur_avg": 1}));
        assert_eq!(rec.timestamp(42), 42);
    }

    #[test]
    fn test_site_record_conversion() {
        let raw: SiteRecord = serde_json::from_value(json!({
            "_pk": "site-1",
            "name": "shop",
            "enable": true,
            "struct_pk": "0",
            "type": "reverse",
            "ip_set": "10.0.0.1",
            "port": [443, "8443"],
            "domain": ["shop.example.com", "www.shop.example.com"]
        }))
        .unwrap();
        let site = Site::from(raw);

        assert_eq!(site.id, "site-1");
        assert!(site.enabled);
        assert_eq!(site.alternate_id(), None);
        assert_eq!(site.site_type.as_deref(), Some("reverse"));
        assert_eq!(site.ip, "10.0.0.1");
        assert_eq!(site.ports, vec!["443", "8443"]);
        assert_eq!(site.domains.len(), 2);
    }

    #[test]
    fn test_topology_cluster_ids_three_levels() {
        let roots: Vec<TopologyNode> = serde_json::from_value(json!([
            {
                "_pk": "root",
                "children": [
                    {
                        "_pk": "area-1",
                        "children": [
                            {"_pk": "cluster-a", "children": [{"_pk": "too-deep"}]},
                            {"_pk": 17},
                            {"_pk": "cluster-b"}
                        ]
                    }
                ]
            }
        ]))
        .unwrap();

        assert_eq!(TopologyNode::cluster_ids(&roots), vec!["cluster-a", "cluster-b"]);
    }

    #[test]
    fn test_non_finite_strings_read_as_zero() {
        let rec = record(json!({
            "timestamp": "2024-05-01 10:00:00",
            "conn_cur_avg": "NaN",
            "conn_cur_max": "inf",
            "conn_rate_avg": "-infinity",
            "http_req_rate_avg": " 12.5 "
        }));
        let sample = rec.to_sample(0);

        assert_eq!(sample.conn_cur_avg, 0.0);
        assert_eq!(sample.conn_cur_max, 0.0);
        assert_eq!(sample.conn_rate_avg, 0.0);
        assert_eq!(sample.http_req_rate_avg, 12.5);
    }

    #[test]
    fn test_site_record_null_enable() {
        let raw: SiteRecord = serde_json::from_value(json!({
            "_pk": "site-1",
            "name": "shop",
            "enable": null,
            "struct_pk": "0"
        }))
        .unwrap();
        assert!(!Site::from(raw).enabled);

        let raw: SiteRecord =
            serde_json::from_value(json!({"_pk": "site-2", "name": "blog"})).unwrap();
        assert!(!raw.enable);
    }

    #[test]
    fn test_topology_null_children_is_a_leaf() {
        let roots: Vec<TopologyNode> = serde_json::from_value(json!([
            {
                "_pk": "root",
                "children": [
                    {
                        "_pk": "area",
                        "children": [
                            {"_pk": "cluster-a", "children": null},
                            {"_pk": "cluster-b"}
                        ]
                    },
                    {"_pk": "empty-area", "children": null}
                ]
            }
        ]))
        .unwrap();

        assert_eq!(TopologyNode::cluster_ids(&roots), vec!["cluster-a", "cluster-b"]);
    }

    #[test]
    fn test_traffic_query_params() {
        let probe = TrafficQuery::probe("site-1", "dev-1");
        let params = probe.params();
        assert_eq!(params.len(), 3);
        assert!(params.contains(&("type", "mins".to_string())));

        let start = parse_api_time("2024-05-01 10:00:00").unwrap();
        let end = parse_api_time("2024-05-01 10:05:00").unwrap();
        let query = TrafficQuery {
            window: Some((start, end)),
            ..probe
        };
        let params = query.params();
        assert!(params.contains(&("timestamp__ge", "2024-05-01 10:00:00".to_string())));
        assert!(params.contains(&("timestamp__lt", "2024-05-01 10:05:00".to_string())));
    }
}
