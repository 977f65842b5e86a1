//! [`AtResponse`]: what a device sent back for one command.

use crate::value::Value;
use std::collections::HashMap;

/// The outcome of executing one [`AtCommand`](crate::AtCommand).
#[derive(Debug, Clone, PartialEq)]
pub struct AtResponse {
    /// The first line matching the expected pattern, if any.
    pub response: Option<String>,
    /// Every line received, in order, without line terminators.
    pub full_response: Vec<String>,
    /// The command text that was sent, after variable substitution.
    pub command: String,
    execution_time: u64,
    collectables: HashMap<String, Value>,
}

impl AtResponse {
    pub fn new(
        response: Option<String>,
        full_response: Vec<String>,
        command: impl Into<String>,
        execution_time: i64,
    ) -> Self {
        Self {
            response,
            full_response,
            command: command.into(),
            execution_time: execution_time.max(0) as u64,
            collectables: HashMap::new(),
        }
    }

    /// Elapsed milliseconds between write and the end of the read.
    pub fn execution_time(&self) -> u64 {
        self.execution_time
    }

    /// Negative values clamp to zero.
    pub fn set_execution_time(&mut self, millis: i64) {
        self.execution_time = millis.max(0) as u64;
    }

    /// Store a collected value; a later write to the same key wins.
    pub fn add_collectable(&mut self, key: impl Into<String>, value: Value) {
        self.collectables.insert(key.into(), value);
    }

    pub fn get_collectable(&self, key: &str) -> Option<&Value> {
        self.collectables.get(key)
    }

    pub fn collectables(&self) -> &HashMap<String, Value> {
        &self.collectables
    }
}
