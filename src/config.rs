//! [`CommunicatorConfig`]: serial settings and read timing for a communicator.

use crate::esk::LineBreak;
use std::time::Duration;

/// Baud rate assumed for timing when none is configured.
const FALLBACK_BAUD_RATE: u32 = 9600;

/// Serial line settings plus the timing knobs of the read loop.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunicatorConfig {
    pub device: Option<String>,
    pub baud_rate: Option<u32>,
    default_timeout: u64,
    pub line_break: LineBreak,
    pub rtscts: bool,
    pub dsrdtr: bool,
    /// Scales the idle wait after each burst of bytes: `factor / baud` seconds.
    pub quiescence_factor: f64,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            device: None,
            baud_rate: None,
            default_timeout: Self::DEFAULT_TIMEOUT,
            line_break: LineBreak::default(),
            rtscts: false,
            dsrdtr: false,
            quiescence_factor: 100.0,
        }
    }
}

impl CommunicatorConfig {
    /// Timeout in seconds used when neither the command nor the script sets one.
    pub const DEFAULT_TIMEOUT: u64 = 10;

    pub fn new(device: Option<&str>, baud_rate: Option<u32>) -> Self {
        Self {
            device: device.map(str::to_string),
            baud_rate,
            ..Self::default()
        }
    }

    pub fn with_default_timeout(mut self, seconds: i64) -> Self {
        self.set_default_timeout(seconds);
        self
    }

    pub fn with_line_break(mut self, line_break: LineBreak) -> Self {
        self.line_break = line_break;
        self
    }

    pub fn with_rtscts(mut self, enabled: bool) -> Self {
        self.rtscts = enabled;
        self
    }

    pub fn with_dsrdtr(mut self, enabled: bool) -> Self {
        self.dsrdtr = enabled;
        self
    }

    pub fn with_quiescence_factor(mut self, factor: f64) -> Self {
        self.quiescence_factor = factor;
        self
    }

    pub fn default_timeout(&self) -> u64 {
        self.default_timeout
    }

    /// Non-positive values restore [`Self::DEFAULT_TIMEOUT`].
    pub fn set_default_timeout(&mut self, seconds: i64) {
        self.default_timeout = if seconds > 0 {
            seconds as u64
        } else {
            Self::DEFAULT_TIMEOUT
        };
    }

    /// Whether a device can be opened with these settings.
    pub fn is_complete(&self) -> bool {
        self.device.is_some() && self.baud_rate.is_some()
    }

    /// How long the read loop waits for more bytes before deciding the
    /// device has finished its response.
    pub fn quiescence_window(&self) -> Duration {
        let baud = self.baud_rate.filter(|b| *b > 0).unwrap_or(FALLBACK_BAUD_RATE);
        Duration::try_from_secs_f64((self.quiescence_factor / f64::from(baud)).max(0.0))
            .unwrap_or(Duration::MAX)
    }
}
