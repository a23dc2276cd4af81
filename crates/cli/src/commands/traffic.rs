//! Raw traffic queries

use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};
use serde::Serialize;
use tabled::Tabled;
use waf_collector::api::{TrafficQuery, TrafficRecord};
use waf_collector::collector::samples_from_records;
use waf_collector::{DeviceIdResolver, Granularity, MetricSample};

use super::{parse_duration, Session};
use crate::output::{
    format_number, format_rate, print_info, print_table, print_warning, OutputFormat,
};

/// Row for the traffic table
#[derive(Tabled, Serialize)]
struct TrafficRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "In avg")]
    bytes_in_avg: String,
    #[tabled(rename = "In max")]
    bytes_in_max: String,
    #[tabled(rename = "Out avg")]
    bytes_out_avg: String,
    #[tabled(rename = "Out max")]
    bytes_out_max: String,
    #[tabled(rename = "Conns")]
    conn_cur_avg: String,
    #[tabled(rename = "Conn/s")]
    conn_rate_avg: String,
    #[tabled(rename = "Req/s")]
    http_req_rate_avg: String,
}

impl From<&MetricSample> for TrafficRow {
    fn from(sample: &MetricSample) -> Self {
        Self {
            time: format_clock(sample.timestamp),
            bytes_in_avg: format_rate(sample.bytes_in_rate_avg),
            bytes_in_max: format_rate(sample.bytes_in_rate_max),
            bytes_out_avg: format_rate(sample.bytes_out_rate_avg),
            bytes_out_max: format_rate(sample.bytes_out_rate_max),
            conn_cur_avg: format_number(sample.conn_cur_avg),
            conn_rate_avg: format_number(sample.conn_rate_avg),
            http_req_rate_avg: format_number(sample.http_req_rate_avg),
        }
    }
}

/// Query one site's traffic over the last `since` and print valid samples
pub async fn show_traffic(
    session: &Session,
    site_id: &str,
    device_id: Option<String>,
    data_type: &str,
    since: &str,
    format: OutputFormat,
) -> Result<()> {
    let granularity = Granularity::parse(data_type);
    if !granularity.is_known() {
        print_warning(&format!("Unknown data type {:?}, sending it as-is", data_type));
    }
    let lookback = parse_duration(since)?;
    let api = session.api()?;

    let device_id = match device_id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => match DeviceIdResolver::new(api.clone()).primary_device_id().await {
            Some(id) => id,
            None => bail!("could not determine the primary device id; pass --device-id"),
        },
    };

    let now = Local::now();
    let query = TrafficQuery {
        data_type: granularity.as_str().to_string(),
        app_id: site_id.to_string(),
        device_id: device_id.clone(),
        window: Some((now - lookback, now)),
    };
    let records = api
        .query_traffic(&query)
        .await
        .with_context(|| format!("Traffic query for site {} failed", site_id))?;

    let samples = samples_from_records(&records, now.timestamp());
    if let OutputFormat::Table = format {
        print_info(&format!(
            "site {} via device {}: {} records, {} with data",
            site_id,
            device_id,
            records.len(),
            valid_records(&records)
        ));
        if !records.is_empty() && valid_records(&records) == 0 {
            print_warning("Every field is \"-\"; this device id yields no data for the site");
        }
    }

    let rows: Vec<TrafficRow> = samples.iter().map(TrafficRow::from).collect();
    print_table(&rows, format);
    Ok(())
}

/// Count of records carrying at least one real value
pub fn valid_records(records: &[TrafficRecord]) -> usize {
    records.iter().filter(|r| r.is_valid()).count()
}

fn format_clock(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_records() {
        let records: Vec<TrafficRecord> = serde_json::from_value(json!([
            {"timestamp": "2024-05-01 10:00:00", "conn_cur_avg": "-"},
            {"timestamp": "2024-05-01 10:01:00", "conn_cur_avg": 4},
        ]))
        .unwrap();
        assert_eq!(valid_records(&records), 1);
    }

    #[test]
    fn test_row_formatting() {
        let mut sample = MetricSample::zero(0);
        sample.bytes_in_rate_avg = 2048.0;
        sample.conn_cur_avg = 3.0;
        let row = TrafficRow::from(&sample);
        assert_eq!(row.bytes_in_avg, "2.00KiB/s");
        assert_eq!(row.conn_cur_avg, "3");
    }
}
