//! dynapi controller: keeps the set of served custom APIs in line with registered schemas.
//!
//! Each cycle lists every schema, installs the ones whose API path is missing from the
//! [`ApiSurfaceManager`], then removes installed paths that no schema claims anymore.

#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::{anyhow, Result};
use dynapi_core::Schema;

mod controller;
mod surface;

pub use controller::{ControllerHandle, SyncReport, ThirdPartyController};
pub use surface::{ApiSurfaceManager, InstalledApis};

/// Cycle period used when none is configured.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Shortest period a spawned controller will run with.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Mount prefix shared by every installed custom API.
pub const API_ROOT: &str = "/custom";

/// Path an API for schema `name` is served under. Does not validate.
pub fn schema_path(name: &str) -> String {
    format!("{}/{}", API_ROOT, name)
}

/// Installation path for `schema`; schemas whose name is not a usable path segment are rejected.
pub fn api_path(schema: &Schema) -> Result<String> {
    dynapi_schema::validate_name(schema.name()).map_err(|e| anyhow!("deriving api path: {}", e))?;
    Ok(schema_path(schema.name()))
}
