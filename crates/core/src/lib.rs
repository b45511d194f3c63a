//! tabflow - tab memory and lifecycle manager
//!
//! Watches per-tab memory usage and idle time, hibernates tabs that are both
//! heavy and idle by swapping them for a lightweight placeholder, and restores
//! them on demand from a durable record.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ LifecycleController                           │  sweeps, transitions, snapshot
//! │  ┌──────────┐ ┌───────────────┐ ┌──────────┐  │
//! │  │ Registry │ │ MemorySampler │ │  policy  │  │
//! │  └──────────┘ └───────┬───────┘ └──────────┘  │
//! │               ┌───────▼────────┐              │
//! │               │ PermissionGate │              │
//! │               └────────────────┘              │
//! └───────────────────────┬───────────────────────┘
//!                         │ host traits
//!   inventory · navigator · inspection channel · key-value store · grants
//! ```
//!
//! Everything outside the box is reached through the async traits in [`host`],
//! so the same controller runs against a real browser (see `tabflow-runtime`)
//! or an in-process fake in tests.

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod gate;
pub mod host;
pub mod pattern;
pub mod placeholder;
pub mod policy;
pub mod registry;
pub mod sampler;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::HibernateConfig;
pub use controller::LifecycleController;
pub use error::{Error, Result};
pub use gate::{OriginGrants, PermissionGate};
pub use host::{GrantService, Host, HostError, InspectionChannel, KeyValueStore, Navigator, ResourceInventory};
pub use policy::{ResourceFlags, should_hibernate};
pub use registry::{AccessLog, Registry};
pub use sampler::{ChannelState, MemorySampler};
pub use scheduler::spawn_sweeper;
pub use store::{JsonFileStore, MemoryStore};
pub use tabflow_protocol::{
	AccessRecord, HibernationRecord, MIB, MemorySample, Metric, ResourceDetails, ResourceId, ResourceState, ResourceStats, ResourceStatus,
	RestoreOutcome, SweepReport,
};
