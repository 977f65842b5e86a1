//! Error kinds surfaced by the parser, the communicator and the runtime.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AtError>;

/// Every failure the engine can report.
///
/// Only [`AtError::Runtime`] is gated by the abort-on-failure flag; the other
/// kinds always reach the caller.
#[derive(Debug, Error)]
pub enum AtError {
    /// Opening, closing, writing to or reading from the device failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The script file could not be read.
    #[error("could not read script {}: {source}", path.display())]
    ScriptNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A script line matches neither the ESK nor the command grammar.
    #[error("syntax error at line {line}: {reason} ({text})")]
    Syntax {
        line: usize,
        reason: String,
        text: String,
    },

    /// An operation needed a device that has not been configured yet.
    #[error("uninitialized: {0}")]
    Uninitialized(String),

    /// A command got an unexpected response and nothing could recover it,
    /// or a setup keyword failed while abort-on-failure was set.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl AtError {
    pub(crate) fn syntax(line: usize, reason: impl Into<String>, text: impl Into<String>) -> Self {
        AtError::Syntax {
            line,
            reason: reason.into(),
            text: text.into(),
        }
    }
}
