//! [`Session`]: the command sequence, its cursor and the variable store.

use crate::collectable::Collectable;
use crate::command::AtCommand;
use crate::response::AtResponse;
use crate::value::Value;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Upper bound on substitution rounds, so a value that references its own
/// key cannot loop forever.
const MAX_SUBSTITUTIONS: usize = 1024;

/// An ordered list of commands plus the state needed to walk it.
///
/// The cursor advances once per validated response. When a command fails
/// and has a doppelganger, the doppelganger is inserted at the cursor so it
/// is the next command handed out.
#[derive(Debug, Default)]
pub struct Session {
    commands: Vec<AtCommand>,
    storage: HashMap<String, Value>,
    cursor: usize,
    last_command_failed: bool,
}

impl Session {
    pub fn new(commands: Vec<AtCommand>) -> Self {
        Self {
            commands,
            ..Self::default()
        }
    }

    /// Whether the most recently validated response missed its expected pattern.
    pub fn last_command_failed(&self) -> bool {
        self.last_command_failed
    }

    /// Drop commands, variables and execution state.
    pub fn reset(&mut self) {
        self.storage.clear();
        self.clear_commands();
    }

    /// Drop commands and execution state; variables survive.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
        self.reset_execution();
    }

    /// Rewind the cursor and clear the failure flag.
    pub fn reset_execution(&mut self) {
        self.cursor = 0;
        self.last_command_failed = false;
    }

    pub fn add_command(&mut self, command: AtCommand) -> bool {
        self.commands.push(command);
        true
    }

    /// Build and append a command. Returns `false` for an empty command text.
    ///
    /// `None` collectables leave the command with nothing to collect.
    pub fn add_new_command(
        &mut self,
        command: &str,
        expected_response: Option<&str>,
        timeout: Option<i64>,
        delay: i64,
        collectables: Option<Vec<String>>,
        doppelganger: Option<AtCommand>,
    ) -> bool {
        if command.is_empty() {
            return false;
        }
        let mut new_command = AtCommand::new(command, expected_response)
            .with_delay(delay)
            .with_collectables(collectables);
        if let Some(seconds) = timeout {
            new_command.set_timeout(seconds);
        }
        if let Some(dganger) = doppelganger {
            new_command = new_command.with_doppelganger(dganger);
        }
        self.commands.push(new_command);
        true
    }

    pub fn rem_command(&mut self, index: usize) -> bool {
        if index >= self.commands.len() {
            return false;
        }
        self.commands.remove(index);
        true
    }

    pub fn get_command(&self, index: usize) -> Option<&AtCommand> {
        self.commands.get(index)
    }

    pub fn commands(&self) -> &[AtCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Whether a command remains at the cursor.
    pub fn has_next(&self) -> bool {
        self.cursor < self.commands.len()
    }

    /// The command at the cursor, with `${name}` references replaced by
    /// session values. Returns `None` past the end of the sequence.
    ///
    /// Substitution is written back into the stored command, so the
    /// response refers to the text that was actually sent.
    pub fn get_next_command(&mut self) -> Option<&AtCommand> {
        let text = self.commands.get(self.cursor)?.command.clone();
        let prepared = self.replace_session_keys(&text);
        let command = &mut self.commands[self.cursor];
        if prepared != text {
            debug!("Prepared '{}' as '{}'", text, prepared);
            command.command = prepared;
        }
        Some(command)
    }

    /// Judge `lines` as the response to the command at the cursor.
    ///
    /// The cursor always advances by one. On a miss the command's
    /// doppelganger, if any, is inserted so it runs next. On a hit every
    /// collectable is evaluated against the full response and stored both in
    /// the returned response and in the session.
    ///
    /// Validating with no command at the cursor yields an empty response
    /// and changes nothing.
    pub fn validate_response(&mut self, lines: Vec<String>, execution_time: i64) -> AtResponse {
        let Some(current) = self.commands.get(self.cursor) else {
            warn!("Response received with no pending command");
            return AtResponse::new(None, lines, "", execution_time);
        };
        let index = self.cursor;
        self.cursor += 1;

        let mut matched = None;
        self.last_command_failed = false;
        if let Some(expected) = current.expected_response.as_deref() {
            matched = match Regex::new(expected) {
                Ok(re) => lines.iter().find(|line| re.is_match(line)).cloned(),
                Err(e) => {
                    warn!("Invalid expected response '{}': {}", expected, e);
                    None
                }
            };
            self.last_command_failed = matched.is_none();
        }

        let mut response = AtResponse::new(matched, lines, &current.command, execution_time);

        if self.last_command_failed {
            debug!(
                "'{}' failed; full response: {:?}",
                current.command, response.full_response
            );
            if let Some(dganger) = current.doppelganger.as_deref() {
                debug!("Queueing doppelganger '{}'", dganger.command);
                let dganger = dganger.clone();
                self.commands.insert(self.cursor, dganger);
            }
        } else if let Some(specs) = current.collectables.clone() {
            for spec in &specs {
                let Some(collectable) = Collectable::parse(spec) else {
                    warn!("Ignoring collectable without a ?{{name}} marker: '{}'", spec);
                    continue;
                };
                if let Some(value) = collectable
                    .extract(&response.full_response, |text| self.replace_session_keys(text))
                {
                    self.storage.insert(collectable.name.to_string(), value.clone());
                    response.add_collectable(collectable.name, value);
                }
            }
        }

        self.commands[index].response = Some(response.clone());
        response
    }

    /// Replace every `${name}` in `haystack` with its session value, or with
    /// an empty string when the key is unknown.
    pub fn replace_session_keys(&self, haystack: &str) -> String {
        let mut text = haystack.to_string();
        for _ in 0..MAX_SUBSTITUTIONS {
            let Some((token, key)) = first_session_key(&text) else {
                return text;
            };
            let value = self
                .storage
                .get(key)
                .map(Value::to_string)
                .unwrap_or_default();
            text = text.replace(token, &value);
        }
        warn!("Gave up substituting session keys in '{}'", haystack);
        text
    }

    pub fn set_session_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.storage.insert(key.into(), value.into());
    }

    pub fn get_session_value(&self, key: &str) -> Option<&Value> {
        self.storage.get(key)
    }
}

/// The leftmost `${name}` token in `text` and the name inside it.
fn first_session_key(text: &str) -> Option<(&str, &str)> {
    let start = text.find("${")?;
    let end = start + 2 + text[start + 2..].find('}')?;
    Some((&text[start..=end], &text[start + 2..end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_expected_response_never_fails() {
        let mut session = Session::new(vec![AtCommand::new("ATZ", None)]);
        session.get_next_command().unwrap();
        let resp = session.validate_response(lines(&["ERROR"]), 12);
        assert!(!session.last_command_failed());
        assert_eq!(resp.response, None);
        assert!(!session.has_next());
    }

    #[test]
    fn test_match_sets_response_line() {
        let mut session = Session::new(vec![AtCommand::new("AT+CPIN?", Some("READY"))]);
        session.get_next_command().unwrap();
        let resp = session.validate_response(lines(&["+CPIN: READY", "OK"]), 40);
        assert!(!session.last_command_failed());
        assert_eq!(resp.response.as_deref(), Some("+CPIN: READY"));
        assert_eq!(resp.execution_time(), 40);
        let stored = session.get_command(0).unwrap().response.as_ref().unwrap();
        assert_eq!(stored, &resp);
    }

    #[test]
    fn test_failure_queues_doppelganger() {
        let dganger = AtCommand::new("AT+CPIN=${SIM_PIN}", Some("OK"));
        let mut session = Session::new(vec![
            AtCommand::new("AT+CPIN?", Some("READY")).with_doppelganger(dganger),
            AtCommand::new("AT+CSQ", Some("OK")),
        ]);
        session.set_session_value("SIM_PIN", Value::Int(7782));

        assert_eq!(session.get_next_command().unwrap().command, "AT+CPIN?");
        session.validate_response(lines(&["+CPIN: SIM PIN", "OK"]), 10);
        assert!(session.last_command_failed());
        assert_eq!(session.len(), 3);

        assert_eq!(session.get_next_command().unwrap().command, "AT+CPIN=7782");
        session.validate_response(lines(&["OK"]), 10);
        assert!(!session.last_command_failed());

        assert_eq!(session.get_next_command().unwrap().command, "AT+CSQ");
    }

    #[test]
    fn test_failure_without_doppelganger_moves_on() {
        let mut session = Session::new(vec![
            AtCommand::new("AT", Some("OK")),
            AtCommand::new("ATI", None),
        ]);
        session.get_next_command();
        session.validate_response(lines(&["ERROR"]), 0);
        assert!(session.last_command_failed());
        assert_eq!(session.get_next_command().unwrap().command, "ATI");
        session.validate_response(Vec::new(), 0);
        assert!(!session.last_command_failed());
    }

    #[test]
    fn test_collectables() {
        let cmd = AtCommand::new("AT+CSQ", Some("OK")).with_collectables(Some(vec![
            "AT+CSQ=?{rssi::[0-9]{1,2}},".to_string(),
            "AT+CSQ=${rssi},?{ber::[0-9]{1,2}}".to_string(),
        ]));
        let mut session = Session::new(vec![cmd]);
        session.get_next_command();
        let resp = session.validate_response(lines(&["AT+CSQ=31,2", "OK"]), 0);
        assert_eq!(session.get_session_value("rssi"), Some(&Value::Int(31)));
        assert_eq!(session.get_session_value("ber"), Some(&Value::Int(2)));
        assert_eq!(resp.get_collectable("rssi"), Some(&Value::Int(31)));
        assert_eq!(resp.get_collectable("ber"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_later_collectable_overwrites_key() {
        let cmd = AtCommand::new("AT+CSQ", None).with_collectables(Some(vec![
            "+CSQ: ?{rssi},".to_string(),
            "+CSQ: 32,?{rssi}".to_string(),
        ]));
        let mut session = Session::new(vec![cmd]);
        session.get_next_command();
        let resp = session.validate_response(lines(&["+CSQ: 32,99"]), 0);
        assert_eq!(resp.get_collectable("rssi"), Some(&Value::Int(99)));
        assert_eq!(session.get_session_value("rssi"), Some(&Value::Int(99)));
    }

    #[test]
    fn test_failed_command_collects_nothing() {
        let cmd = AtCommand::new("AT+CSQ", Some("OK"))
            .with_collectables(Some(vec!["+CSQ: ?{rssi},".to_string()]));
        let mut session = Session::new(vec![cmd]);
        session.get_next_command();
        session.validate_response(lines(&["+CSQ: 32,99", "ERROR"]), 0);
        assert_eq!(session.get_session_value("rssi"), None);
    }

    #[test]
    fn test_replace_session_keys() {
        let mut session = Session::default();
        session.set_session_value("APN", "apn.foo.bar");
        session.set_session_value("CID", Value::Int(1));
        let text = r#"AT+CGDCONT=${CID},"IP","${APN}"${MISSING}"#;
        let replaced = session.replace_session_keys(text);
        assert_eq!(replaced, r#"AT+CGDCONT=1,"IP","apn.foo.bar""#);
        assert_eq!(session.replace_session_keys(&replaced), replaced);
    }

    #[test]
    fn test_replace_self_reference_terminates() {
        let mut session = Session::default();
        session.set_session_value("loop", "${loop}x");
        let replaced = session.replace_session_keys("${loop}");
        assert!(replaced.starts_with("${loop}"));
    }

    #[test]
    fn test_unterminated_key_left_alone() {
        let mut session = Session::default();
        session.set_session_value("PIN", "0123");
        assert_eq!(session.replace_session_keys("AT+CPIN=${PIN"), "AT+CPIN=${PIN");
        assert_eq!(session.replace_session_keys("${PIN} ${"), "0123 ${");
    }

    #[test]
    fn test_reset_and_clear() {
        let mut session = Session::default();
        assert!(session.add_new_command("AT", Some("OK"), Some(0), -1, None, None));
        assert!(!session.add_new_command("", None, None, 0, None, None));
        assert_eq!(session.get_command(0).unwrap().timeout(), Some(1));
        assert_eq!(session.get_command(0).unwrap().delay(), 0);
        session.set_session_value("PIN", "1522");

        session.clear_commands();
        assert!(session.is_empty());
        assert!(session.get_session_value("PIN").is_some());

        session.add_command(AtCommand::new("AT", None));
        session.reset();
        assert!(session.is_empty());
        assert!(session.get_session_value("PIN").is_none());
        assert!(session.get_next_command().is_none());
    }

    #[test]
    fn test_rem_command() {
        let mut session = Session::new(vec![AtCommand::new("AT", None), AtCommand::new("ATI", None)]);
        assert!(!session.rem_command(2));
        assert!(session.rem_command(0));
        assert_eq!(session.get_command(0).unwrap().command, "ATI");
    }
}
