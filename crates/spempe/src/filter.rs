//! Per-recipient sync filtering and tuning.

use smart_default::SmartDefault;
use std::time::Duration;

/// What to do about one synced object for one recipient this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    /// Send a full-state update this cycle.
    FullSync,
    /// Send nothing this cycle; costs nothing either way.
    Skip,
    /// Send a one-time deactivate RPC, then skip until a future `FullSync`.
    Deactivate,
    /// Test-only: like `FullSync`, but scheduled `u32` steps further out in
    /// the dummy's state buffer than the configured delay would place it.
    /// Only honored when [`SyncConfig::allow_delay_override`] is set;
    /// production filters must never rely on this variant.
    FullSyncWithDelay(u32),
}

#[derive(Clone, Debug, PartialEq, SmartDefault)]
pub struct SyncConfig {
    /// Ring length of scheduled states held per dummy.
    #[default = 3]
    pub buffering_length: usize,
    /// Maximum steps between forced full-state pulses for a diff-synced object.
    #[default = 30]
    pub pacemaker_interval: i64,
    /// Approximate one-way network latency used to derive `delay_in_steps`
    /// when the caller does not supply one directly.
    #[default(Duration::from_millis(100))]
    pub assumed_one_way_latency: Duration,
    /// Server tick duration, used with `assumed_one_way_latency` to derive
    /// `delay_in_steps`.
    #[default(Duration::from_millis(16))]
    pub tick_duration: Duration,
    /// Gates [`FilterResult::FullSyncWithDelay`]; disabled in production.
    #[default = false]
    pub allow_delay_override: bool,
}

impl SyncConfig {
    pub fn delay_in_steps(&self) -> usize {
        let latency_nanos = self.assumed_one_way_latency.as_nanos();
        let tick_nanos = self.tick_duration.as_nanos().max(1);
        ((latency_nanos / tick_nanos) as usize).max(1)
    }
}
