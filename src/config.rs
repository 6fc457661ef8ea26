// Everything the library needs to know about the serial link lives here. The
// defaults correspond to the RAK7200 factory settings: 115200 baud, 8N1, no flow
// control.

use core::time::Duration;
use serialport::{DataBits, FlowControl, Parity, SerialPortBuilder, StopBits};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Bounded retry applied to the channel query while the radio initializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Connection and protocol settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub port: String,
    pub baud_rate: u32,
    /// How long the line stream may stay idle before a command is considered
    /// unanswered.
    pub timeout: Duration,
    /// Idle window after the `OK` marker during which trailing body lines are
    /// still collected.
    pub settle: Duration,
    pub channel_retry: RetryPolicy,
}

impl Settings {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_secs(2),
            settle: Duration::from_millis(200),
            channel_retry: RetryPolicy::default(),
        }
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A `serialport` builder configured for this device. The port's own read
    /// timeout is kept short; command timeouts are enforced by the line reader.
    pub fn serial_config(&self) -> SerialPortBuilder {
        serialport::new(self.port.as_str(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .flow_control(FlowControl::None)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(10))
    }
}
