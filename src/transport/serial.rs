//! Serial/USB port access.
//!
//! The logger shows up as a USB serial adapter, e.g. `/dev/ttyUSB0`, and
//! talks 115200 baud, 8N1, without flow control.

use std::io;

use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};

use crate::error::{Error, Result};
use crate::transport::{Port, Transport};

/// Default baud rate of the RGM-3800.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Configuration for the serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }
}

impl Port for SerialStream {
    fn discard_buffers(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::All).map_err(io::Error::from)
    }
}

/// Opens the serial port and starts the background reader.
///
/// Data the device sent before the port was opened is discarded.
pub fn open(config: &SerialConfig) -> Result<Transport> {
    tracing::info!("opening serial port: {}", config.port);

    let stream = tokio_serial::new(&config.port, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()
        .map_err(Error::Serial)?;

    stream.clear(ClearBuffer::All).map_err(Error::Serial)?;

    Ok(Transport::new(stream))
}

/// Lists available serial ports.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
