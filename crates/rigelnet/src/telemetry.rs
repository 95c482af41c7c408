//! Upload/download byte telemetry. Local in-process (loopback) traffic is
//! never counted, matching `RN_Telemetry`'s documented exclusion.

use std::collections::VecDeque;
use std::ops::{Add, AddAssign};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Telemetry {
    pub upload_byte_count: u64,
    pub download_byte_count: u64,
}

impl Add for Telemetry {
    type Output = Telemetry;
    fn add(self, rhs: Telemetry) -> Telemetry {
        Telemetry {
            upload_byte_count: self.upload_byte_count + rhs.upload_byte_count,
            download_byte_count: self.download_byte_count + rhs.download_byte_count,
        }
    }
}

impl AddAssign for Telemetry {
    fn add_assign(&mut self, rhs: Telemetry) {
        *self = *self + rhs;
    }
}

/// A rolling window of per-step telemetry samples, covering the last `K` steps.
pub struct TelemetryWindow {
    window: VecDeque<Telemetry>,
    capacity: usize,
}

impl TelemetryWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: Telemetry) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);
    }

    pub fn total(&self) -> Telemetry {
        self.window.iter().fold(Telemetry::default(), |a, b| a + *b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolls_off_oldest_sample() {
        let mut w = TelemetryWindow::new(2);
        w.push(Telemetry {
            upload_byte_count: 10,
            download_byte_count: 0,
        });
        w.push(Telemetry {
            upload_byte_count: 20,
            download_byte_count: 0,
        });
        w.push(Telemetry {
            upload_byte_count: 30,
            download_byte_count: 0,
        });
        assert_eq!(w.total().upload_byte_count, 50);
    }
}
