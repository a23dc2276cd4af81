//! Incremental poll window tracking
//!
//! The only durable state of the collector is the time of the last run
//! whose batch was confirmed delivered. Each run queries from that point
//! up to now, bounded by a per-granularity ceiling so a long outage does
//! not turn into an unbounded backfill.

use crate::error::StateError;
use crate::models::Granularity;
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Naive layouts accepted after RFC 3339, in order. All are local time.
const LEGACY_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

const STATE_FILE_PREFIX: &str = "waf_sender_last_run_";

/// On-disk layout of the state file
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    last_run_time: String,
    #[serde(default)]
    data_type: String,
    #[serde(default)]
    zabbix_host: String,
}

/// Persisted poll state for one target identity
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    pub last_run_time: DateTime<Local>,
    pub granularity: Granularity,
    pub target_identity: String,
}

/// Parse a stored timestamp, trying RFC 3339 first and then the legacy
/// local-time layouts
pub fn parse_state_time(value: &str) -> Option<DateTime<Local>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Local));
    }
    LEGACY_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
    })
}

/// Longest look-back allowed when resuming from persisted state
pub fn max_lookback(granularity: &Granularity) -> Duration {
    match granularity {
        Granularity::Minutes => Duration::hours(24),
        Granularity::Hours => Duration::days(7),
        Granularity::Days => Duration::days(30),
        Granularity::Unknown(_) => Duration::hours(24),
    }
}

/// Look-back used on a cold start
pub fn initial_window(granularity: &Granularity) -> Duration {
    match granularity {
        Granularity::Minutes => Duration::minutes(5),
        Granularity::Hours => Duration::hours(2),
        Granularity::Days => Duration::days(2),
        Granularity::Unknown(_) => Duration::minutes(5),
    }
}

/// Time range `[start, end)` to query, with `end = now`.
///
/// A `last_run_time` in the future (clock step) yields an empty window
/// rather than an inverted one.
pub fn compute_window(
    granularity: &Granularity,
    state: Option<&PollState>,
    now: DateTime<Local>,
) -> (DateTime<Local>, DateTime<Local>) {
    let start = match state {
        Some(state) => {
            let floor = now - max_lookback(granularity);
            if state.last_run_time < floor {
                debug!(
                    last_run_time = %state.last_run_time,
                    clipped_to = %floor,
                    "Clipping look-back window"
                );
                floor
            } else {
                state.last_run_time.min(now)
            }
        }
        None => now - initial_window(granularity),
    };
    (start, now)
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`
pub fn sanitize_identity(identity: &str) -> String {
    identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Reads and writes poll state under a state directory
#[derive(Debug, Clone)]
pub struct PollWindowTracker {
    state_dir: PathBuf,
}

impl PollWindowTracker {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn state_path(&self, identity: &str) -> PathBuf {
        self.state_dir.join(format!(
            "{}{}.json",
            STATE_FILE_PREFIX,
            sanitize_identity(identity)
        ))
    }

    /// Persisted state for `identity`, or `None` on a cold start.
    ///
    /// A missing, unreadable or unparseable file is a cold start, never an
    /// error.
    pub fn load_state(&self, identity: &str) -> Option<PollState> {
        let path = self.state_path(identity);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No poll state, cold start");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read poll state");
                return None;
            }
        };

        let file: StateFile = match serde_json::from_slice(&data) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt poll state, ignoring");
                return None;
            }
        };

        let Some(last_run_time) = parse_state_time(&file.last_run_time) else {
            warn!(
                path = %path.display(),
                value = %file.last_run_time,
                "Unrecognised last_run_time, ignoring"
            );
            return None;
        };

        debug!(path = %path.display(), last_run_time = %last_run_time, "Loaded poll state");
        Some(PollState {
            last_run_time,
            granularity: Granularity::parse(&file.data_type),
            target_identity: file.zabbix_host,
        })
    }

    /// Persist `run_start` as the last delivered run for `identity`.
    ///
    /// The file is replaced atomically so readers never see a partial
    /// write. No lock is taken against concurrent writers.
    pub fn save_state(
        &self,
        identity: &str,
        run_start: DateTime<Local>,
        granularity: &Granularity,
    ) -> Result<PathBuf, StateError> {
        let path = self.state_path(identity);
        let io_err = |source| StateError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.state_dir).map_err(io_err)?;

        let file = StateFile {
            last_run_time: run_start.to_rfc3339(),
            data_type: granularity.as_str().to_string(),
            zabbix_host: identity.to_string(),
        };
        let json = serde_json::to_vec_pretty(&file)?;

        let mut temp = NamedTempFile::new_in(&self.state_dir).map_err(io_err)?;
        temp.write_all(&json).map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(&path).map_err(|e| io_err(e.error))?;

        info!(
            path = %path.display(),
            last_run_time = %file.last_run_time,
            "Saved poll state"
        );
        Ok(path)
    }
}
