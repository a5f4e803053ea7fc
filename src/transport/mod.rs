use std::io::{Read, Write};
use std::time::Duration;

pub mod mock;
#[cfg(feature = "serial")]
pub mod serial;

/// Read timeout applied when the caller does not choose one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors raised by the connection layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[cfg(feature = "serial")]
    #[error("Failed to open serial port: {0}")]
    Open(#[from] serialport::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Transport is closed")]
    Closed,
}

/// Byte stream to a device whose read timeout can be adjusted between reads.
///
/// A read that waits longer than the current timeout must fail with
/// [`std::io::ErrorKind::TimedOut`] (or `WouldBlock`) instead of blocking.
pub trait Transport: Read + Write {
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()>;

    fn read_timeout(&self) -> Duration;

    /// Discards bytes received but not yet read.
    fn clear_input(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    /// Human readable name of the connection, e.g. the serial port path.
    fn name(&self) -> Option<String> {
        None
    }

    fn baud_rate(&self) -> Option<u32> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        (**self).set_read_timeout(timeout)
    }

    fn read_timeout(&self) -> Duration {
        (**self).read_timeout()
    }

    fn clear_input(&mut self) -> std::io::Result<()> {
        (**self).clear_input()
    }

    fn name(&self) -> Option<String> {
        (**self).name()
    }

    fn baud_rate(&self) -> Option<u32> {
        (**self).baud_rate()
    }
}
