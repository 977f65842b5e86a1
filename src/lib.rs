//! # atscript
//!
//! A scripting engine for devices that speak AT commands: modems, GSM/LTE
//! modules and other RF hardware on a serial line.
//!
//! A script is a list of commands, each with the response it expects. The
//! engine sends one command at a time, reads until the device goes quiet,
//! and checks the reply. Values can be pulled out of a response into named
//! variables and substituted into later commands. A command can carry a
//! fallback (its *doppelganger*) that runs right after it when its response
//! does not match.
//!
//! ## Quick start
//!
//! ```no_run
//! use atscript::{CommunicatorConfig, Runtime, parse_str};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let script = r#"
//! SET SIM_PIN=7782
//! AT;;OK
//! AT+CPIN?;;READY;;0;;5;;;;AT+CPIN=${SIM_PIN};;OK
//! AT+CSQ;;OK;;;;;;["+CSQ: ?{rssi::[0-9]{1,2}},"]
//! PRINT signal: ${rssi}
//! "#;
//!
//!     let mut runtime = Runtime::new(true);
//!     runtime.configure_communicator(CommunicatorConfig::new(Some("/dev/ttyUSB0"), Some(115200)))?;
//!     runtime.load_script(parse_str(script)?);
//!     for response in runtime.run().await? {
//!         println!("{} ({} ms) >> {:?}", response.command, response.execution_time(), response.response);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Script syntax
//!
//! A command line has up to seven `;;`-separated fields; all but the first
//! may be left empty or omitted:
//!
//! ```text
//! COMMAND;;EXPECTED;;DELAY_MS;;TIMEOUT_S;;COLLECTABLES;;DOPPELGANGER;;DOPPELGANGER_EXPECTED
//! ```
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `COMMAND` | Text sent to the device, `${name}` substituted |
//! | `EXPECTED` | Regex searched for in every response line |
//! | `DELAY_MS` | Pause before sending |
//! | `TIMEOUT_S` | Read budget, at least one second |
//! | `COLLECTABLES` | `["prefix?{name}suffix", 'other?{key::regex}']` |
//! | `DOPPELGANGER` | Command run next when `EXPECTED` does not match |
//! | `DOPPELGANGER_EXPECTED` | Expected response of the doppelganger |
//!
//! Lines starting with `#` are comments. Lines starting with a keyword are
//! environment setup keywords (ESKs), see [`esk`]. They run just before the
//! command that follows them in the script.
//!
//! ## Testing without hardware
//!
//! [`VirtualTransport`] replaces the serial port with three callbacks, so a
//! test can script a device's replies:
//!
//! ```
//! use atscript::{CommunicatorConfig, Runtime, VirtualTransport, parse_str};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> atscript::Result<()> {
//! let pending = Rc::new(RefCell::new(Vec::<u8>::new()));
//! let (rx, tx, avail) = (pending.clone(), pending.clone(), pending.clone());
//! let modem = VirtualTransport::new(
//!     move |n| {
//!         let mut buf = rx.borrow_mut();
//!         let n = n.min(buf.len());
//!         let chunk: Vec<u8> = buf.drain(..n).collect();
//!         chunk
//!     },
//!     move |_cmd| {
//!         tx.borrow_mut().extend_from_slice(b"OK\r\n");
//!         Ok(())
//!     },
//!     move || avail.borrow().len(),
//! );
//!
//! let mut runtime = Runtime::new(true);
//! runtime.configure_virtual_communicator(CommunicatorConfig::new(Some("modem"), Some(9600)), modem)?;
//! runtime.load_script(parse_str("AT;;OK")?);
//! let responses = runtime.run().await?;
//! assert_eq!(responses[0].response.as_deref(), Some("OK"));
//! # Ok(())
//! # }
//! ```

pub mod collectable;
pub mod command;
pub mod communicator;
pub mod config;
pub mod error;
pub mod esk;
pub mod parser;
pub mod response;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod value;

pub use command::AtCommand;
pub use communicator::Communicator;
pub use config::CommunicatorConfig;
pub use error::{AtError, Result};
pub use esk::{Esk, LineBreak, ScheduledEsk};
pub use parser::{Script, parse_file, parse_str};
pub use response::AtResponse;
pub use runtime::Runtime;
pub use session::Session;
pub use transport::{SerialTransport, Transport, VirtualTransport};
pub use value::Value;
