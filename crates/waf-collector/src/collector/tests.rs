//! Collection pass tests against the scripted appliance

use super::*;
use crate::api::mock::{tree, valid_record, Call, MockApi};
use crate::api::TopologyCategory;
use crate::api::parse_api_time;
use crate::models::MetricValue;
use chrono::{Duration, TimeZone};

fn now() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap()
}

fn three_sites() -> Vec<Site> {
    vec![
        Site::new("site-1", "shop", true, "0"),
        Site::new("site-2", "blog", true, ""),
        Site::new("site-3", "legacy", false, "c-3"),
    ]
}

fn collector(api: &Arc<MockApi>, poll_state: Option<PollState>) -> MetricsCollector {
    MetricsCollector::new(
        api.clone(),
        CollectorConfig::new("web-01", Granularity::Minutes),
        poll_state,
    )
}

fn points_for<'a>(points: &'a [MetricPoint], site_name: &str) -> Vec<&'a MetricPoint> {
    let suffix = format!("[{}]", site_name);
    points
        .iter()
        .filter(|p| p.key.ends_with(&suffix) && !p.key.starts_with("waf.site.status"))
        .collect()
}

#[tokio::test]
async fn test_end_to_end_point_count() {
    let api = Arc::new(
        MockApi::new()
            .with_primary("dev-1")
            .with_sites(three_sites())
            .with_traffic("site-1", "dev-1", vec![valid_record("2024-05-01 10:01:00", 4.0)]),
    );
    let mut collector = collector(&api, None);

    let points = collector.collect(now()).await.unwrap();

    // 2 liveness + 1 discovery + 3 status + 2x10 enabled + 1x10 disabled
    assert_eq!(points.len(), 36);
    assert!(points.iter().all(|p| p.host == "web-01"));

    assert_eq!(points[0].key, "waf.collector.status");
    assert_eq!(points[0].value, MetricValue::Int(1));
    assert_eq!(points[1].key, "waf.collector.timestamp");
    assert_eq!(points[1].value, MetricValue::Int(now().timestamp()));
    assert_eq!(points[2].key, "waf.sites.discovery");

    let stats = collector.stats();
    assert_eq!(stats.sites, 3);
    assert_eq!(stats.enabled_sites, 2);
    assert_eq!(stats.zero_filled, 1);
    // site-2 has no structId and takes the primary id without probing
    assert_eq!(stats.resolver_fallbacks, 0);
    assert_eq!(collector.sites().len(), 3);
}

#[tokio::test]
async fn test_samples_keep_their_own_clock() {
    let api = Arc::new(
        MockApi::new()
            .with_primary("dev-1")
            .with_sites(vec![Site::new("site-1", "shop", true, "0")])
            .with_traffic(
                "site-1",
                "dev-1",
                vec![
                    valid_record("2024-05-01 10:03:00", 3.0),
                    valid_record("2024-05-01 10:01:00", 1.0),
                ],
            ),
    );
    let mut collector = collector(&api, None);

    let points = collector.collect(now()).await.unwrap();
    let shop = points_for(&points, "shop");

    assert_eq!(shop.len(), 20);
    let first = parse_api_time("2024-05-01 10:01:00").unwrap().timestamp();
    let second = parse_api_time("2024-05-01 10:03:00").unwrap().timestamp();
    assert!(shop[..10].iter().all(|p| p.clock == first));
    assert!(shop[10..].iter().all(|p| p.clock == second));

    let conn = points
        .iter()
        .find(|p| p.key == "waf.site.conn_cur_avg[shop]")
        .unwrap();
    assert_eq!(conn.value, MetricValue::Float(1.0));
    assert_eq!(collector.stats().samples, 2);
}

#[tokio::test]
async fn test_disabled_site_emits_zeros_without_api_calls() {
    let api = Arc::new(
        MockApi::new()
            .with_primary("dev-1")
            .with_sites(vec![Site::new("site-3", "legacy", false, "c-3")]),
    );
    let mut collector = collector(&api, None);

    let points = collector.collect(now()).await.unwrap();
    let legacy = points_for(&points, "legacy");

    assert_eq!(legacy.len(), 10);
    assert!(legacy
        .iter()
        .all(|p| p.value == MetricValue::Float(0.0) && p.clock == now().timestamp()));
    assert!(api.devices_tried("site-3").is_empty());
    assert!(api.traffic_calls().is_empty());

    let status = points
        .iter()
        .find(|p| p.key == "waf.site.status[legacy]")
        .unwrap();
    assert_eq!(status.value, MetricValue::Int(0));
}

#[tokio::test]
async fn test_unreachable_appliance_aborts() {
    let api = Arc::new(MockApi::new().unreachable().with_sites(three_sites()));
    let mut collector = collector(&api, None);

    let err = collector.collect(now()).await.unwrap_err();

    assert!(matches!(err, CollectError::Connectivity(_)));
    assert_eq!(api.calls(), vec![Call::Ping]);
}

#[tokio::test]
async fn test_site_listing_failure_aborts() {
    let api = Arc::new(MockApi::new().with_primary("dev-1").with_failing_site_listing());
    let mut collector = collector(&api, None);

    let err = collector.collect(now()).await.unwrap_err();
    assert!(matches!(err, CollectError::SiteListing(_)));
}

#[tokio::test]
async fn test_empty_site_list_aborts() {
    let api = Arc::new(MockApi::new().with_primary("dev-1"));
    let mut collector = collector(&api, None);

    let err = collector.collect(now()).await.unwrap_err();
    assert!(matches!(err, CollectError::NoSites));
}

#[tokio::test]
async fn test_missing_primary_uses_placeholder() {
    let api = Arc::new(
        MockApi::new().with_sites(vec![Site::new("site-1", "shop", false, "0")]),
    );
    let mut collector = collector(&api, None);

    let points = collector.collect(now()).await.unwrap();

    let MetricValue::Text(payload) = &points[2].value else {
        panic!("discovery payload must be text");
    };
    let records: serde_json::Value = serde_json::from_str(payload).unwrap();
    assert_eq!(records[0]["{#DEVICE_ID}"], PRIMARY_ID_PLACEHOLDER);
    assert_eq!(records[0]["{#SITE_NAME}"], "shop");
}

#[tokio::test]
async fn test_site_failure_is_isolated() {
    let api = Arc::new(
        MockApi::new()
            .with_primary("dev-1")
            .with_sites(vec![
                Site::new("site-1", "shop", true, "0"),
                Site::new("site-2", "blog", true, "0"),
            ])
            .with_failing_traffic("site-1")
            .with_traffic("site-2", "dev-1", vec![valid_record("2024-05-01 10:02:00", 2.0)]),
    );
    let mut collector = collector(&api, None);

    let points = collector.collect(now()).await.unwrap();

    let shop = points_for(&points, "shop");
    assert_eq!(shop.len(), 10);
    assert!(shop.iter().all(|p| p.clock == now().timestamp()));

    let blog = points_for(&points, "blog");
    let expected = parse_api_time("2024-05-01 10:02:00").unwrap().timestamp();
    assert!(blog.iter().all(|p| p.clock == expected));
    assert_eq!(collector.stats().fetch_failures, 1);
}

#[tokio::test]
async fn test_empty_struct_id_uses_primary_without_probing() {
    let api = Arc::new(
        MockApi::new()
            .with_primary("dev-1")
            .with_serial("SN-1")
            .with_sites(vec![Site::new("site-1", "shop", true, "")])
            .with_topology(TopologyCategory::Reverse, tree(&["cluster-x"])),
    );
    let mut collector = collector(&api, None);

    collector.collect(now()).await.unwrap();

    assert_eq!(api.devices_tried("site-1"), vec!["dev-1"]);
    assert_eq!(
        api.traffic_calls(),
        vec![Call::Traffic {
            app_id: "site-1".to_string(),
            device_id: "dev-1".to_string(),
            data_type: "mins".to_string(),
            windowed: true,
        }]
    );
    assert!(!api
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Topology(_) | Call::DeviceInfo)));
    assert_eq!(collector.stats().resolver_fallbacks, 0);
    assert_eq!(collector.stats().zero_filled, 1);
}

#[tokio::test]
async fn test_fetch_uses_granularity_and_window() {
    let api = Arc::new(
        MockApi::new()
            .with_primary("dev-1")
            .with_sites(vec![Site::new("site-1", "shop", true, "0")])
            .with_traffic("site-1", "dev-1", vec![valid_record("2024-05-01 10:00:00", 1.0)]),
    );
    let state = PollState {
        last_run_time: now() - Duration::hours(3),
        granularity: Granularity::Hours,
        target_identity: "web-01".to_string(),
    };
    let mut collector = MetricsCollector::new(
        api.clone(),
        CollectorConfig::new("web-01", Granularity::Hours),
        Some(state),
    );

    collector.collect(now()).await.unwrap();

    let calls = api.traffic_calls();
    // The probe is unwindowed minutes, the fetch uses the configured type
    assert_eq!(
        calls.last(),
        Some(&Call::Traffic {
            app_id: "site-1".to_string(),
            device_id: "dev-1".to_string(),
            data_type: "hours".to_string(),
            windowed: true,
        })
    );
    assert!(matches!(
        &calls[0],
        Call::Traffic { data_type, windowed: false, .. } if data_type == "mins"
    ));
}

#[test]
fn test_samples_from_records_drops_invalid_and_sorts() {
    let records = vec![
        valid_record("2024-05-01 10:02:00", 2.0),
        crate::api::mock::sentinel_record("2024-05-01 10:01:00"),
        valid_record("2024-05-01 10:00:00", 1.0),
    ];

    let samples = samples_from_records(&records, 0);

    assert_eq!(samples.len(), 2);
    assert!(samples[0].timestamp < samples[1].timestamp);
    assert_eq!(samples[0].conn_cur_avg, 1.0);
}
