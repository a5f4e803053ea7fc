use std::io::{Read, Write};
use std::time::Duration;

use serde::Deserialize;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits};

use super::{DEFAULT_TIMEOUT, Transport, TransportError};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Serial link parameters. The port is always opened 8N1 without flow control.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SerialConfig {
    pub path: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    /// Time given to the device after the port opens before the first command.
    #[serde(default = "default_settle_delay")]
    pub settle_delay: Duration,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_settle_delay() -> Duration {
    DEFAULT_SETTLE_DELAY
}

impl SerialConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

pub struct SerialTransport {
    inner: Box<dyn serialport::SerialPort>,
    path: String,
    baud_rate: u32,
}

impl SerialTransport {
    pub fn open(path: &str) -> Result<Self, TransportError> {
        Self::open_with(&SerialConfig::new(path))
    }

    pub fn open_with(config: &SerialConfig) -> Result<Self, TransportError> {
        let port = serialport::new(&config.path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.timeout)
            .open()?;
        tracing::debug!(
            path = %config.path,
            baud_rate = config.baud_rate,
            "opened serial port"
        );

        if !config.settle_delay.is_zero() {
            std::thread::sleep(config.settle_delay);
        }

        Ok(Self {
            inner: port,
            path: config.path.clone(),
            baud_rate: config.baud_rate,
        })
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Transport for SerialTransport {
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.inner.set_timeout(timeout)?;
        Ok(())
    }

    fn read_timeout(&self) -> Duration {
        self.inner.timeout()
    }

    fn clear_input(&mut self) -> std::io::Result<()> {
        self.inner.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn name(&self) -> Option<String> {
        Some(self.path.clone())
    }

    fn baud_rate(&self) -> Option<u32> {
        Some(self.baud_rate)
    }
}
