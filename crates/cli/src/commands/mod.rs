//! wafctl subcommands

pub mod collect;
pub mod discover;
pub mod resolve;
pub mod state;
pub mod traffic;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Duration;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use waf_collector::{ApiClient, ApiConfig, WafApi};

/// Appliance connection details shared by every subcommand
#[derive(Debug, Clone)]
pub struct Session {
    pub host: Option<String>,
    pub token: Option<String>,
    pub verify_certs: bool,
    pub timeout: StdDuration,
}

impl Session {
    /// Build an API client, failing when the host or token is unset
    pub fn api(&self) -> Result<Arc<dyn WafApi>> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| anyhow!("no WAF host configured (use --host or WAF_HOST)"))?;
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow!("no API token configured (use --token or WAF_TOKEN)"))?;

        let mut config = ApiConfig::new(host, token);
        config.timeout = self.timeout;
        config.accept_invalid_certs = !self.verify_certs;

        let client = ApiClient::new(&config).context("Failed to create API client")?;
        Ok(Arc::new(client))
    }
}

/// Parse a look-back such as `30m`, `1h`, `2d` or `1w`
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(split);

    let amount: i64 = amount
        .parse()
        .with_context(|| format!("invalid duration {:?}", value))?;
    let duration = match unit {
        "s" => Duration::seconds(amount),
        "m" => Duration::minutes(amount),
        "h" | "" => Duration::hours(amount),
        "d" => Duration::days(amount),
        "w" => Duration::weeks(amount),
        other => bail!("unknown duration unit {:?} in {:?}", other, value),
    };
    if duration <= Duration::zero() {
        bail!("duration must be positive: {:?}", value);
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_duration("1h").unwrap(), Duration::hours(1));
        assert_eq!(parse_duration("2d").unwrap(), Duration::days(2));
        assert_eq!(parse_duration("6").unwrap(), Duration::hours(6));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("5y").is_err());
        assert!(parse_duration("0m").is_err());
    }

    #[test]
    fn test_session_requires_host_and_token() {
        let session = Session {
            host: None,
            token: Some("t".to_string()),
            verify_certs: false,
            timeout: StdDuration::from_secs(5),
        };
        let err = session.api().err().unwrap();
        assert!(err.to_string().contains("host"));

        let session = Session {
            host: Some("https://10.0.0.5".to_string()),
            token: None,
            ..session
        };
        let err = session.api().err().unwrap();
        assert!(err.to_string().contains("token"));
    }
}
