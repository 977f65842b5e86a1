use super::Transport;
use crate::config::CommunicatorConfig;
use crate::error::{AtError, Result};
use async_trait::async_trait;
use std::time::Duration;

type ReadFn = Box<dyn FnMut(usize) -> Vec<u8>>;
type WriteFn = Box<dyn FnMut(&[u8]) -> std::result::Result<(), String>>;
type AvailableFn = Box<dyn FnMut() -> usize>;
type OpenFn = Box<dyn FnMut(&CommunicatorConfig) -> std::result::Result<(), String>>;
type CloseFn = Box<dyn FnMut()>;

/// A simulated device driven by caller-supplied callbacks.
///
/// `read` is asked for up to `n` bytes, `write` receives every byte sent
/// (an `Err` becomes a transport error) and `bytes_available` reports how
/// much `read` would return. Each test owns its callbacks and their state.
/// [`on_open`](Self::on_open) and [`on_close`](Self::on_close) observe the
/// device lifecycle; an `Err` from the open hook fails the open.
///
/// ```
/// use atscript::VirtualTransport;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let pending = Rc::new(RefCell::new(Vec::<u8>::new()));
/// let (rx, tx, avail) = (pending.clone(), pending.clone(), pending.clone());
/// let modem = VirtualTransport::new(
///     move |n| {
///         let mut buf = rx.borrow_mut();
///         let n = n.min(buf.len());
///         let chunk: Vec<u8> = buf.drain(..n).collect();
///         chunk
///     },
///     move |_cmd| {
///         tx.borrow_mut().extend_from_slice(b"OK\r\n");
///         Ok(())
///     },
///     move || avail.borrow().len(),
/// );
/// # drop(modem);
/// ```
pub struct VirtualTransport {
    read: ReadFn,
    write: WriteFn,
    bytes_available: AvailableFn,
    on_open: Option<OpenFn>,
    on_close: Option<CloseFn>,
    open: bool,
}

impl VirtualTransport {
    pub fn new(
        read: impl FnMut(usize) -> Vec<u8> + 'static,
        write: impl FnMut(&[u8]) -> std::result::Result<(), String> + 'static,
        bytes_available: impl FnMut() -> usize + 'static,
    ) -> Self {
        Self {
            read: Box::new(read),
            write: Box::new(write),
            bytes_available: Box::new(bytes_available),
            on_open: None,
            on_close: None,
            open: false,
        }
    }

    pub fn on_open(
        mut self,
        hook: impl FnMut(&CommunicatorConfig) -> std::result::Result<(), String> + 'static,
    ) -> Self {
        self.on_open = Some(Box::new(hook));
        self
    }

    pub fn on_close(mut self, hook: impl FnMut() + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }
}

#[async_trait(?Send)]
impl Transport for VirtualTransport {
    fn open(&mut self, config: &CommunicatorConfig) -> Result<()> {
        if !config.is_complete() {
            return Err(AtError::Transport(format!(
                "could not open virtual device {}",
                config.device.as_deref().unwrap_or("<unset>")
            )));
        }
        if let Some(hook) = self.on_open.as_mut() {
            hook(config).map_err(AtError::Transport)?;
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Err(AtError::Transport("virtual device is not open".into()));
        }
        self.open = false;
        if let Some(hook) = self.on_close.as_mut() {
            hook();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<()> {
        (self.write)(data).map_err(AtError::Transport)
    }

    async fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let mut data = (self.read)(max);
        data.truncate(max);
        Ok(data)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok((self.bytes_available)())
    }

    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }
}
