//! Low-level discovery output
//!
//! Always prints a `{"data": [...]}` document and never fails: a broken
//! appliance yields an empty list with an `error` member so the
//! consuming discovery rule keeps its previous items.

use clap::ValueEnum;
use serde::Serialize;
use waf_collector::collector::{discover_devices, discover_sites, LldDocument};

use super::Session;

/// What to discover
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DiscoverTarget {
    #[default]
    Sites,
    Devices,
}

/// Print the discovery document for `target`
pub async fn discover(session: &Session, target: DiscoverTarget, page_size: u32) {
    let api = match session.api() {
        Ok(api) => api,
        Err(e) => {
            println!("{}", LldDocument::<()>::failed(format!("{:#}", e)).to_json());
            return;
        }
    };

    let json = match target {
        DiscoverTarget::Sites => document(discover_sites(api.as_ref(), page_size).await).to_json(),
        DiscoverTarget::Devices => document(discover_devices(api.as_ref()).await).to_json(),
    };
    println!("{}", json);
}

/// Wrap any discovery result in the document shape
pub fn document<T: Serialize, E: ToString>(result: Result<Vec<T>, E>) -> LldDocument<T> {
    match result {
        Ok(records) => LldDocument::ok(records),
        Err(e) => LldDocument::failed(e),
    }
}
