//! Net transport tuning, carried in a [`engine_common::VersionedArc`] so
//! hosts can hot-swap timeouts without tearing down live connections.

use smart_default::SmartDefault;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, SmartDefault)]
pub struct NetConfig {
    /// Maximum UDP payload before a message is split into `DataMore`/`DataTail` fragments.
    #[default = 1024]
    pub max_packet_size: usize,
    /// How long without any heard packet before a connection times out.
    #[default(Duration::from_secs(10))]
    pub timeout: Duration,
    /// Send a heartbeat after this much idle send time.
    #[default(Duration::from_secs(2))]
    pub heartbeat_interval: Duration,
    /// Maximum simultaneously connected clients (server side only).
    #[default = 64]
    pub max_clients: u32,
    /// Width of the rolling telemetry window, in steps.
    #[default = 120]
    pub telemetry_window: usize,
}
