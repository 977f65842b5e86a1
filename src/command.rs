//! [`AtCommand`]: one request to the device and the rules for judging its reply.

use crate::response::AtResponse;

/// A single AT command.
///
/// The command text may reference session variables as `${name}`; they are
/// substituted when the session hands the command out. The expected response
/// is a regular expression searched for in every response line.
#[derive(Debug, Clone, PartialEq)]
pub struct AtCommand {
    pub command: String,
    pub expected_response: Option<String>,
    timeout: Option<u64>,
    delay: u64,
    pub collectables: Option<Vec<String>>,
    pub doppelganger: Option<Box<AtCommand>>,
    pub response: Option<AtResponse>,
}

impl AtCommand {
    /// Minimum per-command timeout in seconds.
    pub const MIN_TIMEOUT: u64 = 1;

    /// Create a command with no timeout override, no delay and nothing to collect.
    pub fn new(command: impl Into<String>, expected_response: Option<&str>) -> Self {
        Self {
            command: command.into(),
            expected_response: expected_response.map(str::to_string),
            timeout: None,
            delay: 0,
            collectables: None,
            doppelganger: None,
            response: None,
        }
    }

    pub fn with_timeout(mut self, seconds: i64) -> Self {
        self.set_timeout(seconds);
        self
    }

    pub fn with_delay(mut self, millis: i64) -> Self {
        self.set_delay(millis);
        self
    }

    pub fn with_collectables(mut self, collectables: Option<Vec<String>>) -> Self {
        self.collectables = collectables;
        self
    }

    pub fn with_doppelganger(mut self, doppelganger: AtCommand) -> Self {
        self.doppelganger = Some(Box::new(doppelganger));
        self
    }

    /// Seconds to wait for the response; `None` means the communicator default.
    pub fn timeout(&self) -> Option<u64> {
        self.timeout
    }

    /// Values below one second are raised to one second.
    pub fn set_timeout(&mut self, seconds: i64) {
        self.timeout = Some(seconds.max(Self::MIN_TIMEOUT as i64) as u64);
    }

    /// Milliseconds to wait before sending.
    pub fn delay(&self) -> u64 {
        self.delay
    }

    /// Negative values clamp to zero.
    pub fn set_delay(&mut self, millis: i64) {
        self.delay = millis.max(0) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let cmd = AtCommand::new("AT+CSQ", Some("OK"))
            .with_timeout(5)
            .with_delay(1000)
            .with_collectables(Some(vec!["AT+CSQ=?{dbm},".to_string()]));
        assert_eq!(cmd.command, "AT+CSQ");
        assert_eq!(cmd.expected_response.as_deref(), Some("OK"));
        assert_eq!(cmd.timeout(), Some(5));
        assert_eq!(cmd.delay(), 1000);
        assert_eq!(cmd.collectables.as_ref().map(Vec::len), Some(1));
        assert!(cmd.doppelganger.is_none());
        assert!(cmd.response.is_none());
    }

    #[test]
    fn test_timeout_floor() {
        assert_eq!(AtCommand::new("AT", None).with_timeout(0).timeout(), Some(1));
        assert_eq!(AtCommand::new("AT", None).with_timeout(-3).timeout(), Some(1));
        assert_eq!(AtCommand::new("AT", None).timeout(), None);
    }

    #[test]
    fn test_delay_floor() {
        assert_eq!(AtCommand::new("AT", None).with_delay(-50).delay(), 0);
    }

    #[test]
    fn test_doppelganger() {
        let cmd = AtCommand::new("AT+CPIN?", Some("READY"))
            .with_doppelganger(AtCommand::new("AT+CPIN=${SIM_PIN}", Some("OK")));
        let dganger = cmd.doppelganger.as_deref().unwrap();
        assert_eq!(dganger.command, "AT+CPIN=${SIM_PIN}");
        assert!(dganger.doppelganger.is_none());
    }
}
