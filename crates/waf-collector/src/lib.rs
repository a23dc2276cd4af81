//! Collection pipeline for WAF appliance traffic metrics
//!
//! This crate provides the core functionality for:
//! - Talking to the appliance management API
//! - Resolving which device id yields data for a site
//! - Incremental, persisted poll windows
//! - Encoding metric points for the sender line protocol
//! - Delivery through an external sender and run observability

pub mod api;
pub mod collector;
pub mod error;
pub mod models;
pub mod observability;
pub mod protocol;
pub mod resolver;
pub mod runner;
pub mod sink;
pub mod window;

pub use api::{ApiClient, ApiConfig, WafApi};
pub use collector::{CollectStats, CollectorConfig, MetricsCollector};
pub use error::{ApiError, CollectError, RunError, SinkError, StateError};
pub use models::*;
pub use observability::{CollectorMetrics, StructuredLogger};
pub use resolver::{DeviceIdResolver, Resolution, Strategy};
pub use runner::{RunSummary, Runner};
pub use sink::{DeliveryReport, Sink, ZabbixSender};
pub use window::{PollState, PollWindowTracker};
