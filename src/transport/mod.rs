//! The [`Transport`] trait and its implementations.
//!
//! A transport is a raw byte pipe to the device. Framing, timing and line
//! splitting live in [`Communicator`](crate::Communicator); a transport only
//! has to move bytes and report how many are waiting.

mod serial;
mod virtual_device;

pub use serial::SerialTransport;
pub use virtual_device::VirtualTransport;

use crate::config::CommunicatorConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A byte stream to an AT device.
///
/// To add a new backend, implement this trait and hand a boxed instance to
/// [`Communicator::with_transport`](crate::Communicator::with_transport).
#[async_trait(?Send)]
pub trait Transport {
    /// Open the device described by `config`.
    fn open(&mut self, config: &CommunicatorConfig) -> Result<()>;

    /// Close the device. Closing a device that is not open is an error.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Write all of `data`, failing if that takes longer than `timeout`.
    async fn write(&mut self, data: &[u8], timeout: Duration) -> Result<()>;

    /// Read up to `max` bytes that are already buffered.
    async fn read(&mut self, max: usize) -> Result<Vec<u8>>;

    /// Number of bytes that can be read without waiting.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Discard anything received but not yet read.
    fn clear_input(&mut self) -> Result<()>;
}
