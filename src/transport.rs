//! Serial transport layer.
//!
//! The transport owns the one physical connection to the device. It is a
//! non-reentrant resource: all access is funneled through the link
//! dispatcher, which is the only component holding a `Transport`.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use crate::error::{Result, VescError};

/// Raw byte access to the device link.
///
/// The trait is the seam between the dispatcher and the hardware: production
/// code uses [`SerialLink`], tests substitute an in-memory device. Reads
/// must return within the configured byte timeout rather than blocking
/// indefinitely.
pub trait Transport: Read + Write + Send {
    /// Drop any unread input so a new exchange starts from a clean line.
    ///
    /// Stale bytes left behind by a timed-out or corrupt exchange would
    /// otherwise be misread as the next response.
    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Serial connection parameters.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Port identifier, e.g. `/dev/ttyACM0`
    pub port: String,
    /// Baud rate in bps
    pub baud_rate: u32,
    /// Byte timeout for reads
    pub timeout: Duration,
}

/// The physical serial link to the VESC.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink").finish_non_exhaustive()
    }
}

impl SerialLink {
    /// Open the configured serial endpoint.
    ///
    /// Failure (device absent, permissions) maps to
    /// [`VescError::Unavailable`] and is non-fatal: callers run without a
    /// link and report unavailability upward.
    pub fn open(config: &LinkConfig) -> Result<Self> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.timeout)
            .open()
            .map_err(|e| VescError::Unavailable(format!("{}: {}", config.port, e)))?;
        Ok(SerialLink { port })
    }

    /// List serial ports visible on this host.
    pub fn available_ports() -> Result<Vec<serialport::SerialPortInfo>> {
        Ok(serialport::available_ports()?)
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialLink {
    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_endpoint_is_unavailable() {
        let config = LinkConfig {
            port: "/dev/does-not-exist-pivesc".into(),
            baud_rate: 115_200,
            timeout: Duration::from_millis(100),
        };
        let err = SerialLink::open(&config).unwrap_err();
        assert!(matches!(err, VescError::Unavailable(_)));
    }
}
