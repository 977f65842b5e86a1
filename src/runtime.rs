//! [`Runtime`]: runs a parsed script against a device.

use crate::command::AtCommand;
use crate::communicator::Communicator;
use crate::config::CommunicatorConfig;
use crate::error::{AtError, Result};
use crate::esk::{Esk, ScheduledEsk};
use crate::parser::{self, Line, Script};
use crate::response::AtResponse;
use crate::session::Session;
use crate::transport::VirtualTransport;
use crate::value::Value;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub type OutputHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Orchestrates a [`Session`] and a [`Communicator`].
///
/// Each step runs the ESKs scheduled at the current position, then sends the
/// next command and validates its reply. The runtime keeps its own position,
/// separate from the session cursor: a step that queued a doppelganger does
/// not advance it, so ESKs stay attached to the command they precede.
///
/// With abort-on-failure set, a command that misses its expected response
/// and has no doppelganger, or a failing ESK, ends the run with
/// [`AtError::Runtime`].
pub struct Runtime {
    session: Session,
    communicator: Communicator,
    esks: Vec<ScheduledEsk>,
    aof: bool,
    current_command: usize,
    output_handler: OutputHandler,
}

impl Runtime {
    /// Create a runtime for a serial device that is not configured yet.
    /// `PRINT` output goes to stdout.
    pub fn new(abort_on_failure: bool) -> Self {
        Self::with_output_handler(abort_on_failure, |data| {
            let mut stdout = io::stdout();
            let _ = stdout.write_all(data);
            let _ = stdout.flush();
        })
    }

    /// Create a runtime that passes `PRINT` output to `handler`.
    pub fn with_output_handler<F>(abort_on_failure: bool, handler: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        Self {
            session: Session::default(),
            communicator: Communicator::new(CommunicatorConfig::default()),
            esks: Vec::new(),
            aof: abort_on_failure,
            current_command: 0,
            output_handler: Arc::new(handler),
        }
    }

    pub fn aof(&self) -> bool {
        self.aof
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn communicator(&self) -> &Communicator {
        &self.communicator
    }

    /// Switch to a serial device, closing the current one first.
    pub fn configure_communicator(&mut self, config: CommunicatorConfig) -> Result<()> {
        self.replace_communicator(Communicator::new(config))
    }

    /// Switch to a simulated device, closing the current one first.
    pub fn configure_virtual_communicator(
        &mut self,
        config: CommunicatorConfig,
        transport: VirtualTransport,
    ) -> Result<()> {
        self.replace_communicator(Communicator::with_transport(config, Box::new(transport)))
    }

    fn replace_communicator(&mut self, communicator: Communicator) -> Result<()> {
        if self.communicator.is_open() {
            self.communicator.close()?;
        }
        self.communicator = communicator;
        Ok(())
    }

    /// Start a fresh session with `commands`. Variables are dropped too.
    pub fn init_session(&mut self, commands: Vec<AtCommand>) {
        self.session.reset();
        for command in commands {
            self.session.add_command(command);
        }
        self.current_command = 0;
    }

    /// Replace the scheduled ESKs.
    pub fn set_esks(&mut self, esks: Vec<ScheduledEsk>) {
        self.esks = esks;
    }

    pub fn load_script(&mut self, script: Script) {
        self.init_session(script.commands);
        self.set_esks(script.esks);
    }

    /// Parse `path` and load it, replacing the current commands and ESKs.
    pub fn parse_script(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let script = parser::parse_file(path)?;
        debug!(
            "Loaded {} commands and {} ESKs",
            script.commands.len(),
            script.esks.len()
        );
        self.load_script(script);
        Ok(())
    }

    pub fn add_command(&mut self, command: AtCommand) -> bool {
        self.session.add_command(command)
    }

    pub fn get_session_value(&self, key: &str) -> Option<&Value> {
        self.session.get_session_value(key)
    }

    /// Open the device unless it is already open.
    pub fn open(&mut self) -> Result<()> {
        self.require_device()?;
        if self.communicator.is_open() {
            return Ok(());
        }
        self.communicator.open()?;
        info!("Opened {}", self.communicator.device().unwrap_or_default());
        Ok(())
    }

    /// Close the device unless it is already closed.
    pub fn close(&mut self) -> Result<()> {
        self.require_device()?;
        if !self.communicator.is_open() {
            return Ok(());
        }
        self.communicator.close()?;
        info!("Closed {}", self.communicator.device().unwrap_or_default());
        Ok(())
    }

    fn require_device(&self) -> Result<()> {
        match self.communicator.device() {
            Some(_) => Ok(()),
            None => Err(AtError::Uninitialized("communicator is not initialized".into())),
        }
    }

    /// Open the device, execute every remaining step and close the device.
    ///
    /// Returns the responses in execution order, doppelganger retries
    /// included. The first unrecovered error ends the run; the device is
    /// still closed.
    pub async fn run(&mut self) -> Result<Vec<AtResponse>> {
        self.open()?;
        let mut responses = Vec::new();
        let outcome = loop {
            match self.exec_next().await {
                Ok(Some(response)) => responses.push(response),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        let closed = self.close();
        outcome?;
        closed?;
        Ok(responses)
    }

    /// Execute one step: the ESKs due now, then the next command.
    ///
    /// Returns `None` once no command is left. The device is neither opened
    /// nor closed here, apart from what `DEVICE`/`BAUDRATE`-style ESKs do.
    /// When an ESK aborts the step, the due ESKs after it stay scheduled.
    pub async fn exec_next(&mut self) -> Result<Option<AtResponse>> {
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.esks)
            .into_iter()
            .partition(|scheduled| scheduled.index == self.current_command);
        self.esks = later;
        let mut due = due.into_iter();
        while let Some(ScheduledEsk { esk, .. }) = due.next() {
            if let Err(e) = self.process_esk(&esk).await {
                if self.aof {
                    self.esks = due.chain(std::mem::take(&mut self.esks)).collect();
                    return Err(AtError::Runtime(format!("ESK '{esk}' failed: {e}")));
                }
                warn!("ESK '{}' failed: {}", esk, e);
            }
        }

        let Some(command) = self.session.get_next_command().cloned() else {
            return Ok(None);
        };
        let has_doppelganger = command.doppelganger.is_some();
        let response = self.send(command).await?;
        let failed = self.session.last_command_failed();
        if failed && !has_doppelganger && self.aof {
            return Err(bad_response(&response));
        }
        if !failed || !has_doppelganger {
            self.current_command += 1;
        }
        Ok(Some(response))
    }

    /// Parse `line` and execute it on its own, outside the loaded script.
    ///
    /// A command replaces the session's command list and returns its
    /// response; an ESK returns `None`. A failing ESK is always an error
    /// here, whatever abort-on-failure says.
    pub async fn exec(&mut self, line: &str) -> Result<Option<AtResponse>> {
        let parsed = parser::parse_line(line).map_err(|reason| AtError::syntax(1, reason, line))?;
        match parsed {
            Line::Esk(esk) => {
                self.process_esk(&esk)
                    .await
                    .map_err(|e| AtError::Runtime(format!("ESK '{esk}' failed: {e}")))?;
                Ok(None)
            }
            Line::Command(command) => {
                self.require_device()?;
                self.session.clear_commands();
                self.session.add_command(command);
                let Some(command) = self.session.get_next_command().cloned() else {
                    return Ok(None);
                };
                let has_doppelganger = command.doppelganger.is_some();
                let response = self.send(command).await?;
                if self.session.last_command_failed() && !has_doppelganger && self.aof {
                    return Err(bad_response(&response));
                }
                Ok(Some(response))
            }
        }
    }

    /// Wait out the command's delay, send it and validate the reply.
    async fn send(&mut self, command: AtCommand) -> Result<AtResponse> {
        if command.delay() > 0 {
            sleep(Duration::from_millis(command.delay())).await;
        }
        let (lines, elapsed) = self
            .communicator
            .exec(&command.command, command.timeout())
            .await?;
        Ok(self.session.validate_response(lines, elapsed))
    }

    async fn process_esk(&mut self, esk: &Esk) -> Result<()> {
        debug!("Processing ESK '{}'", esk);
        match esk {
            Esk::Device(device) => {
                self.communicator.set_device(device.as_str());
                self.reopen()
            }
            Esk::BaudRate(baud_rate) => {
                self.communicator.set_baud_rate(*baud_rate);
                self.reopen()
            }
            Esk::RtsCts(enabled) => {
                self.communicator.config_mut().rtscts = *enabled;
                self.reopen()
            }
            Esk::DsrDtr(enabled) => {
                self.communicator.config_mut().dsrdtr = *enabled;
                self.reopen()
            }
            Esk::Timeout(seconds) => {
                self.communicator.set_default_timeout(*seconds);
                Ok(())
            }
            Esk::Break(line_break) => {
                self.communicator.set_line_break(*line_break);
                Ok(())
            }
            Esk::Aof(enabled) => {
                self.aof = *enabled;
                Ok(())
            }
            Esk::Set { key, value } => {
                self.session.set_session_value(key.as_str(), value.as_str());
                Ok(())
            }
            Esk::GetEnv(key) => {
                let value = std::env::var(key)
                    .map_err(|e| AtError::Runtime(format!("{key}: {e}")))?;
                self.session.set_session_value(key.as_str(), value);
                Ok(())
            }
            Esk::Print(text) => {
                let mut out = self.session.replace_session_keys(text);
                out.push('\n');
                (self.output_handler)(out.as_bytes());
                Ok(())
            }
            Esk::Exec(command_line) => {
                let command_line = self.session.replace_session_keys(command_line);
                run_shell(&command_line).await
            }
            Esk::Write { path, content } => {
                let content = self.session.replace_session_keys(content);
                tokio::fs::write(path, content)
                    .await
                    .map_err(|e| AtError::Runtime(format!("could not write {path}: {e}")))?;
                info!("Wrote {}", path);
                Ok(())
            }
        }
    }

    /// Close the device if open, then open it again when both device and
    /// baud rate are known.
    fn reopen(&mut self) -> Result<()> {
        if self.communicator.is_open() {
            self.communicator.close()?;
        }
        if self.communicator.config().is_complete() {
            self.communicator.open()?;
            info!(
                "Reopened {} at {} baud",
                self.communicator.device().unwrap_or_default(),
                self.communicator.baud_rate().unwrap_or_default()
            );
        }
        Ok(())
    }
}

fn bad_response(response: &AtResponse) -> AtError {
    AtError::Runtime(format!(
        "Command '{}' got a bad response: {:?} (and has no doppelganger)",
        response.command, response.full_response
    ))
}

async fn run_shell(command_line: &str) -> Result<()> {
    let mut shell = if cfg!(windows) {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.arg("/C");
        cmd
    } else {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c");
        cmd
    };
    let status = shell
        .arg(command_line)
        .status()
        .await
        .map_err(|e| AtError::Runtime(format!("could not run '{command_line}': {e}")))?;
    info!("'{}' exited with {}", command_line, status);
    if status.success() {
        Ok(())
    } else {
        Err(AtError::Runtime(format!("'{command_line}' exited with {status}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::sync::Mutex;

    /// Answers each write with the next canned reply.
    #[derive(Default)]
    struct Modem {
        replies: VecDeque<String>,
        pending: Vec<u8>,
        sent: Vec<String>,
    }

    fn modem(replies: &[&str]) -> (VirtualTransport, Rc<RefCell<Modem>>) {
        let state = Rc::new(RefCell::new(Modem {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            ..Modem::default()
        }));
        let (r, w, a) = (state.clone(), state.clone(), state.clone());
        let transport = VirtualTransport::new(
            move |n| {
                let mut m = r.borrow_mut();
                let n = n.min(m.pending.len());
                let chunk: Vec<u8> = m.pending.drain(..n).collect();
                chunk
            },
            move |data| {
                let mut m = w.borrow_mut();
                m.sent.push(String::from_utf8_lossy(data).into_owned());
                if let Some(reply) = m.replies.pop_front() {
                    m.pending.extend_from_slice(reply.as_bytes());
                }
                Ok(())
            },
            move || a.borrow().pending.len(),
        );
        (transport, state)
    }

    fn runtime(aof: bool, replies: &[&str]) -> (Runtime, Rc<RefCell<Modem>>) {
        let (transport, state) = modem(replies);
        let mut rt = Runtime::new(aof);
        rt.configure_virtual_communicator(
            CommunicatorConfig::new(Some("virtual"), Some(115200)).with_default_timeout(1),
            transport,
        )
        .unwrap();
        (rt, state)
    }

    fn captured(aof: bool) -> (Runtime, Arc<Mutex<Vec<u8>>>) {
        let out = Arc::new(Mutex::new(Vec::new()));
        let sink = out.clone();
        let rt = Runtime::with_output_handler(aof, move |data| {
            sink.lock().unwrap().extend_from_slice(data);
        });
        (rt, out)
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_ok() {
        let (mut rt, state) = runtime(true, &["OK\r\n"]);
        rt.load_script(parser::parse_str("AT;;OK").unwrap());
        rt.open().unwrap();
        let response = rt.exec_next().await.unwrap().unwrap();
        assert_eq!(response.response.as_deref(), Some("OK"));
        assert!(!rt.session().last_command_failed());
        assert!(rt.exec_next().await.unwrap().is_none());
        assert_eq!(state.borrow().sent, vec!["AT\r\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_doppelganger_recovers_sim_pin() {
        let (mut rt, state) = runtime(true, &["CPIN:SIM PIN\r\nOK\r\n", "OK\r\n"]);
        rt.load_script(
            parser::parse_str("SET SIM_PIN=7782\nAT+CPIN?;;READY;;10;;0;;;;AT+CPIN=${SIM_PIN};;OK")
                .unwrap(),
        );
        let responses = rt.run().await.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].response, None);
        assert_eq!(responses[1].response.as_deref(), Some("OK"));
        assert_eq!(responses[1].command, "AT+CPIN=7782");
        assert!(!rt.session().last_command_failed());
        assert_eq!(state.borrow().sent, vec!["AT+CPIN?\r\n", "AT+CPIN=7782\r\n"]);
        assert!(!rt.communicator().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_on_failure() {
        let (mut rt, _) = runtime(true, &["ERROR\r\n", "OK\r\n"]);
        rt.load_script(parser::parse_str("AT;;OK\nATI;;OK").unwrap());
        let err = rt.run().await.unwrap_err();
        assert!(matches!(err, AtError::Runtime(_)), "got: {err}");
        assert!(err.to_string().contains("ERROR"), "got: {err}");
        assert!(!rt.communicator().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tolerated_failure_keeps_esk_schedule() {
        let (mut rt, state) = runtime(false, &["ERROR\r\n", "OK\r\n"]);
        rt.load_script(parser::parse_str("AT;;OK\nBREAK LF\nATI;;OK").unwrap());
        let responses = rt.run().await.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].response, None);
        assert_eq!(state.borrow().sent, vec!["AT\r\n", "ATI\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_none() {
        let (mut rt, state) = runtime(true, &["OK\r\n"]);
        rt.load_script(parser::parse_str("BREAK NONE\nAT;;OK").unwrap());
        rt.run().await.unwrap();
        assert_eq!(state.borrow().sent, vec!["AT"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collectables_feed_later_commands() {
        let (mut rt, state) = runtime(true, &["+CSQ: 31,2\r\nOK\r\n", "OK\r\n"]);
        rt.load_script(
            parser::parse_str(
                "AT+CSQ;;OK;;;;;;[\"+CSQ: ?{rssi::[0-9]{1,2}},\"]\nAT+RSSI=${rssi};;OK",
            )
            .unwrap(),
        );
        let responses = rt.run().await.unwrap();
        assert_eq!(responses[0].get_collectable("rssi"), Some(&Value::Int(31)));
        assert_eq!(rt.get_session_value("rssi"), Some(&Value::Int(31)));
        assert_eq!(state.borrow().sent[1], "AT+RSSI=31\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_executes_trailing_esks() {
        let (mut rt, _) = runtime(true, &["OK\r\n"]);
        rt.load_script(parser::parse_str("AT;;OK\nAOF false").unwrap());
        rt.run().await.unwrap();
        assert!(!rt.aof());
    }

    #[tokio::test]
    async fn test_run_requires_device() {
        let mut rt = Runtime::new(true);
        rt.load_script(parser::parse_str("AT;;OK").unwrap());
        assert!(matches!(rt.run().await, Err(AtError::Uninitialized(_))));
        assert!(matches!(rt.open(), Err(AtError::Uninitialized(_))));
        assert!(matches!(rt.close(), Err(AtError::Uninitialized(_))));
        assert!(matches!(rt.exec("AT").await, Err(AtError::Uninitialized(_))));
    }

    #[tokio::test]
    async fn test_open_close_idempotent() {
        let (mut rt, _) = runtime(true, &[]);
        rt.open().unwrap();
        rt.open().unwrap();
        assert!(rt.communicator().is_open());
        rt.close().unwrap();
        rt.close().unwrap();
        assert!(!rt.communicator().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exec_ad_hoc() {
        let (mut rt, _) = runtime(true, &["OK\r\n", "ERROR\r\n"]);
        rt.open().unwrap();
        let response = rt.exec("AT;;OK").await.unwrap().unwrap();
        assert_eq!(response.response.as_deref(), Some("OK"));
        assert!(rt.exec("AT+CSQ;;OK").await.is_err());

        assert!(rt.exec("AOF false").await.unwrap().is_none());
        assert!(!rt.aof());
        assert!(matches!(rt.exec("BAUDRATE fast").await, Err(AtError::Syntax { .. })));
        assert!(matches!(
            rt.exec("GETENV ATSCRIPT_SURELY_UNSET_VARIABLE").await,
            Err(AtError::Runtime(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_esk_keeps_virtual_device() {
        let (mut rt, state) = runtime(true, &["OK\r\n"]);
        rt.load_script(parser::parse_str("DEVICE /dev/ttyVIRT1\nAT;;OK").unwrap());
        rt.run().await.unwrap();
        assert_eq!(rt.communicator().device(), Some("/dev/ttyVIRT1"));
        assert_eq!(state.borrow().sent, vec!["AT\r\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeouts_do_not_overflow() {
        let (mut rt, _) = runtime(true, &["OK\r\n"]);
        rt.load_script(parser::parse_str("AT;;OK;;0;;9223372036854775807").unwrap());
        let responses = rt.run().await.unwrap();
        assert_eq!(responses[0].response.as_deref(), Some("OK"));

        let (mut rt, _) = runtime(true, &["OK\r\n"]);
        rt.load_script(parser::parse_str("TIMEOUT 9223372036854775807\nAT;;OK").unwrap());
        let responses = rt.run().await.unwrap();
        assert_eq!(responses[0].response.as_deref(), Some("OK"));
    }

    /// A device that only opens at 115200 baud and counts opens and closes.
    fn picky_runtime(aof: bool) -> (Runtime, Rc<RefCell<Modem>>, Rc<Cell<(u32, u32)>>) {
        let (transport, state) = modem(&["OK\r\n"]);
        let counts = Rc::new(Cell::new((0, 0)));
        let (opens, closes) = (counts.clone(), counts.clone());
        let transport = transport
            .on_open(move |config| {
                if config.baud_rate != Some(115200) {
                    return Err(format!("cannot open at {:?} baud", config.baud_rate));
                }
                let (o, c) = opens.get();
                opens.set((o + 1, c));
                Ok(())
            })
            .on_close(move || {
                let (o, c) = closes.get();
                closes.set((o, c + 1));
            });
        let mut rt = Runtime::new(aof);
        rt.configure_virtual_communicator(
            CommunicatorConfig::new(Some("virtual"), Some(115200)).with_default_timeout(1),
            transport,
        )
        .unwrap();
        (rt, state, counts)
    }

    #[tokio::test]
    async fn test_reconfigure_closes_open_device() {
        let (mut rt, _, counts) = picky_runtime(true);
        rt.open().unwrap();
        let (replacement, _) = modem(&[]);
        rt.configure_virtual_communicator(CommunicatorConfig::new(Some("other"), Some(9600)), replacement)
            .unwrap();
        assert_eq!(counts.get(), (1, 1));
        assert!(!rt.communicator().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_esk_closes_then_reopens() {
        let (mut rt, state, counts) = picky_runtime(true);
        rt.load_script(parser::parse_str("DEVICE /dev/ttyVIRT1\nAT;;OK").unwrap());
        rt.open().unwrap();
        rt.exec_next().await.unwrap();
        assert_eq!(counts.get(), (2, 1));
        assert!(rt.communicator().is_open());
        assert_eq!(state.borrow().sent, vec!["AT\r\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reopen_aborts() {
        let (mut rt, state, counts) = picky_runtime(true);
        rt.load_script(parser::parse_str("BAUDRATE 9600\nBREAK LF\nAT;;OK").unwrap());
        rt.open().unwrap();
        let err = rt.exec_next().await.unwrap_err();
        assert!(matches!(err, AtError::Runtime(_)), "got: {err}");
        assert!(err.to_string().contains("BAUDRATE"), "got: {err}");
        assert_eq!(counts.get(), (1, 1));
        assert!(!rt.communicator().is_open());
        assert!(state.borrow().sent.is_empty());
        assert_eq!(rt.esks.len(), 1);
        assert_eq!(rt.esks[0].esk.keyword(), "BREAK");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reopen_tolerated_without_aof() {
        let (mut rt, state, counts) = picky_runtime(false);
        rt.load_script(parser::parse_str("BAUDRATE 9600\nBAUDRATE 115200\nAT;;OK").unwrap());
        rt.open().unwrap();
        let response = rt.exec_next().await.unwrap().unwrap();
        assert_eq!(response.response.as_deref(), Some("OK"));
        assert_eq!(counts.get(), (2, 1));
        assert_eq!(rt.communicator().baud_rate(), Some(115200));
        assert_eq!(state.borrow().sent, vec!["AT\r\n"]);
    }

    #[tokio::test]
    async fn test_print_substitutes() {
        let (mut rt, out) = captured(true);
        rt.load_script(parser::parse_str("SET APN=apn.foo.bar\nPRINT APN is ${APN}").unwrap());
        assert!(rt.exec_next().await.unwrap().is_none());
        assert_eq!(&*out.lock().unwrap(), b"APN is apn.foo.bar\n");
        assert_eq!(rt.get_session_value("APN"), Some(&Value::from("apn.foo.bar")));
    }

    #[tokio::test]
    async fn test_getenv() {
        let (mut rt, _) = captured(true);
        rt.exec("GETENV PATH").await.unwrap();
        assert!(rt.get_session_value("PATH").is_some());

        rt.load_script(parser::parse_str("GETENV ATSCRIPT_SURELY_UNSET_VARIABLE").unwrap());
        assert!(matches!(rt.exec_next().await, Err(AtError::Runtime(_))));

        let (mut rt, _) = captured(false);
        rt.load_script(parser::parse_str("GETENV ATSCRIPT_SURELY_UNSET_VARIABLE\nPRINT ok").unwrap());
        assert!(rt.exec_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_esk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("csq.json");
        let (mut rt, _) = captured(true);
        rt.exec("SET CSQ=31").await.unwrap();
        rt.exec(&format!("WRITE {} {{\"csq\":${{CSQ}}}}", path.display()))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"csq\":31}");

        let missing = dir.path().join("no/such/dir.txt");
        let err = rt.exec(&format!("WRITE {} x", missing.display())).await;
        assert!(matches!(err, Err(AtError::Runtime(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_esk_exit_status() {
        let (mut rt, _) = captured(true);
        rt.exec("EXEC true").await.unwrap();
        assert!(matches!(rt.exec("EXEC exit 3").await, Err(AtError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_timeout_and_aof_esks() {
        let (mut rt, _) = runtime(true, &[]);
        rt.exec("TIMEOUT 3").await.unwrap();
        assert_eq!(rt.communicator().default_timeout(), 3);
        rt.exec("AOF False").await.unwrap();
        assert!(!rt.aof());
    }
}
