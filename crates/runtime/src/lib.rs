//! Chrome DevTools Protocol host for tabflow.
//!
//! [`CdpHost`] implements the inventory, navigator and inspection channel
//! traits over a single browser-level WebSocket, so a
//! [`tabflow::LifecycleController`] can manage the tabs of any Chromium-based
//! browser started with `--remote-debugging-port`.

pub mod browser;
pub mod connection;
pub mod discovery;
pub mod error;

pub use browser::CdpHost;
pub use connection::{CdpConnection, CdpEvent};
pub use discovery::resolve_ws_url;
pub use error::{Error, Result};
