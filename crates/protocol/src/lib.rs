//! Shared data types for tabflow.
//!
//! This crate holds the serde-serializable shapes that cross crate and process
//! boundaries: resource identifiers, memory samples, hibernation records (as
//! they are stored in the key-value store), and the newline-delimited JSON
//! control protocol spoken between the `tabflow` CLI and its daemon.
//!
//! Types in this crate are pure data. Behavior lives in `tabflow-core`.

pub mod control;
pub mod types;

pub use control::*;
pub use types::*;
