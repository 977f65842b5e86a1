//! [`Communicator`]: the request/response primitive on top of a [`Transport`].

use crate::config::CommunicatorConfig;
use crate::error::{AtError, Result};
use crate::esk::LineBreak;
use crate::transport::{SerialTransport, Transport};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Pause between polls of the transport's input buffer.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Upper bound on how long a single command may wait for its reply.
const MAX_WAIT: Duration = Duration::from_secs(86400 * 365 * 30);

/// Sends one command at a time and collects the lines that come back.
///
/// AT devices give no reliable end-of-response marker, so [`exec`](Self::exec)
/// keeps reading for as long as bytes keep arriving: after each burst it
/// waits one quiescence window (see
/// [`CommunicatorConfig::quiescence_window`]) and stops when nothing new
/// showed up, or when the command's timeout runs out.
pub struct Communicator {
    config: CommunicatorConfig,
    transport: Box<dyn Transport>,
}

impl Communicator {
    /// A communicator for a physical serial port.
    pub fn new(config: CommunicatorConfig) -> Self {
        Self::with_transport(config, Box::new(SerialTransport::new()))
    }

    pub fn with_transport(config: CommunicatorConfig, transport: Box<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &CommunicatorConfig {
        &self.config
    }

    /// Changes take effect on the next [`open`](Self::open), except
    /// timeout and line break, which apply to the next command.
    pub fn config_mut(&mut self) -> &mut CommunicatorConfig {
        &mut self.config
    }

    pub fn device(&self) -> Option<&str> {
        self.config.device.as_deref()
    }

    pub fn set_device(&mut self, device: impl Into<String>) {
        self.config.device = Some(device.into());
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.config.baud_rate
    }

    pub fn set_baud_rate(&mut self, baud_rate: u32) {
        self.config.baud_rate = Some(baud_rate);
    }

    pub fn default_timeout(&self) -> u64 {
        self.config.default_timeout()
    }

    pub fn set_default_timeout(&mut self, seconds: i64) {
        self.config.set_default_timeout(seconds);
    }

    pub fn line_break(&self) -> LineBreak {
        self.config.line_break
    }

    pub fn set_line_break(&mut self, line_break: LineBreak) {
        self.config.line_break = line_break;
    }

    /// Open the device and discard anything already waiting in its input.
    pub fn open(&mut self) -> Result<()> {
        self.transport.open(&self.config)?;
        self.transport.clear_input()
    }

    /// Close the device; closing a closed device is a transport error.
    pub fn close(&mut self) -> Result<()> {
        if !self.transport.is_open() {
            return Err(AtError::Transport(format!(
                "{} is already closed",
                self.device().unwrap_or("device")
            )));
        }
        self.transport.close()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Send `command` followed by the configured line break and read the reply.
    ///
    /// `timeout` is in seconds and falls back to the default timeout. Returns
    /// the response lines without terminators, blank lines included, and the
    /// milliseconds elapsed from the write to the end of the read.
    pub async fn exec(&mut self, command: &str, timeout: Option<u64>) -> Result<(Vec<String>, i64)> {
        if !self.transport.is_open() {
            return Err(AtError::Transport("serial port device is closed".into()));
        }
        self.transport.clear_input()?;

        let timeout = Duration::from_secs(timeout.unwrap_or_else(|| self.config.default_timeout()))
            .min(MAX_WAIT);
        let payload = format!("{command}{}", self.config.line_break.as_str());
        let window = self.config.quiescence_window();

        let start = Instant::now();
        let deadline = start.checked_add(timeout).unwrap_or(start);
        debug!("Writing {:?}", payload);
        self.transport
            .write(payload.as_bytes(), deadline.duration_since(start))
            .await?;

        let mut data = Vec::new();
        while Instant::now() < deadline {
            let available = self.transport.bytes_available()?;
            if available == 0 {
                sleep(POLL_INTERVAL).await;
                continue;
            }
            data.extend(self.transport.read(available).await?);
            if !self.more_data_within(window, deadline).await? {
                break;
            }
        }
        let elapsed = start.elapsed().as_millis() as i64;

        let lines = split_lines(&String::from_utf8_lossy(&data));
        debug!("Read {:?} in {} ms", lines, elapsed);
        self.transport.clear_input()?;
        Ok((lines, elapsed))
    }

    /// Wait up to `window`, but never past `deadline`, for bytes to arrive.
    async fn more_data_within(&mut self, window: Duration, deadline: Instant) -> Result<bool> {
        let quiet_until = Instant::now()
            .checked_add(window)
            .map_or(deadline, |until| until.min(deadline));
        loop {
            sleep(POLL_INTERVAL).await;
            if self.transport.bytes_available()? > 0 {
                return Ok(true);
            }
            if Instant::now() >= quiet_until {
                return Ok(false);
            }
        }
    }
}

/// Split on `\r\n`, `\n` or a lone `\r`. A trailing terminator does not
/// produce an empty last line.
fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                chars.next_if_eq(&'\n');
                lines.push(std::mem::take(&mut current));
            }
            '\n' => lines.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
