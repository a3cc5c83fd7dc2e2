//! dockfleet common - pieces shared by the kernel and the host agents
//!
//! - `host`: the snapshot an agent publishes and the view readers get back
//! - `directory`: the fleet directory over an external key-value store
//! - `runtime`: the container-runtime seam the kernel's pool is built on
//! - `provision`: the entry-point script RPC (wire format + client)
//! - `clock`: wall-clock source, swappable in tests

pub mod clock;
pub mod directory;
pub mod host;
pub mod provision;
pub mod runtime;

pub use clock::{Clock, SystemClock};
pub use directory::{DirectoryError, DirectoryStore, FleetDirectory, StoreError};
pub use host::{HostInfo, HostRecord, HostView};
pub use provision::{ProvisionError, Provisioner, ScriptRequest, ScriptResponse};
pub use runtime::{LogOptions, RuntimeConnector, RuntimeError, RuntimeHandle};

/// Bytes in one gigabyte, as used for every memory/disk figure in the fleet.
pub const GB: u64 = 1024 * 1024 * 1024;
