use super::Transport;
use crate::config::CommunicatorConfig;
use crate::error::{AtError, Result};
use async_trait::async_trait;
use serialport::{ClearBuffer, FlowControl, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info};

/// A physical serial port.
#[derive(Default)]
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| AtError::Transport("serial port is not open".into()))
    }
}

fn transport_err(context: &str, err: impl std::fmt::Display) -> AtError {
    AtError::Transport(format!("{context}: {err}"))
}

#[async_trait(?Send)]
impl Transport for SerialTransport {
    fn open(&mut self, config: &CommunicatorConfig) -> Result<()> {
        let (Some(device), Some(baud_rate)) = (config.device.as_deref(), config.baud_rate) else {
            return Err(AtError::Transport(
                "device and baud rate must be set before opening".into(),
            ));
        };
        if self.port.is_some() {
            self.close()?;
        }
        let flow_control = if config.rtscts {
            FlowControl::Hardware
        } else {
            FlowControl::None
        };
        let mut port = serialport::new(device, baud_rate)
            .flow_control(flow_control)
            .timeout(Duration::from_secs(config.default_timeout()))
            .open()
            .map_err(|e| transport_err(&format!("could not open {device}"), e))?;
        if config.dsrdtr {
            port.write_data_terminal_ready(true)
                .map_err(|e| transport_err("could not assert DTR", e))?;
        }
        port.clear(ClearBuffer::Input)
            .map_err(|e| transport_err("could not flush input", e))?;
        info!("Opened {} at {} baud", device, baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.port.take() {
            Some(port) => {
                debug!("Closing {}", port.name().unwrap_or_default());
                Ok(())
            }
            None => Err(AtError::Transport("serial port is not open".into())),
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    async fn write(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        let mut port = self
            .port
            .take()
            .ok_or_else(|| AtError::Transport("serial port is not open".into()))?;
        let data = data.to_vec();
        // Blocking I/O runs off the async thread; the port comes back either way.
        let (port, result) = tokio::task::spawn_blocking(move || {
            let result = port
                .set_timeout(timeout)
                .map_err(std::io::Error::from)
                .and_then(|()| port.write_all(&data))
                .and_then(|()| port.flush());
            (port, result)
        })
        .await
        .map_err(|e| transport_err("write task failed", e))?;
        self.port = Some(port);
        result.map_err(|e| transport_err("write failed", e))
    }

    async fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let port = self.port()?;
        let mut buf = vec![0u8; max];
        let n = port
            .read(&mut buf)
            .map_err(|e| transport_err("read failed", e))?;
        buf.truncate(n);
        Ok(buf)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let n = self
            .port()?
            .bytes_to_read()
            .map_err(|e| transport_err("could not query input buffer", e))?;
        Ok(n as usize)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port()?
            .clear(ClearBuffer::Input)
            .map_err(|e| transport_err("could not flush input", e))
    }
}
