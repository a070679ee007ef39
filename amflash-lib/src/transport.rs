//! Byte transport underneath the command channel.
//!
//! The channel only needs two blocking primitives: write everything, and read
//! exactly N bytes. [`SerialTransport`] provides them on top of a
//! `serialport` handle; tests substitute an in-memory device.

use crate::Result;
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Byte emitted once by the interface firmware when it is ready for commands.
pub const READY_MARKER: u8 = 0x99;

/// Blocking bidirectional byte channel.
pub trait Transport {
    /// Write all of `data` and flush it to the device.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Block until exactly `buf.len()` bytes have been received.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_all(data)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact(buf)
    }
}

/// Discard incoming bytes until [`READY_MARKER`] shows up.
///
/// Returns how many bytes were skipped before the marker (boot noise from
/// the interface, usually zero).
pub fn wait_for_ready<T: Transport + ?Sized>(transport: &mut T) -> Result<usize> {
    let mut skipped = 0usize;
    loop {
        let mut byte = [0u8; 1];
        transport.read_exact(&mut byte)?;
        if byte[0] == READY_MARKER {
            if skipped > 0 {
                tracing::debug!("skipped {} bytes before ready marker", skipped);
            }
            return Ok(skipped);
        }
        tracing::trace!("discarding pre-ready byte 0x{:02X}", byte[0]);
        skipped += 1;
    }
}

/// [`Transport`] over a serial port.
///
/// The port is opened with a short read timeout that is only used for
/// polling: reads keep waiting until the requested bytes arrive, so a silent
/// device blocks the caller indefinitely.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub const DEFAULT_BAUD: u32 = 115_200;
    const POLL_TIMEOUT: Duration = Duration::from_millis(500);

    pub fn open(port_name: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud)
            .timeout(Self::POLL_TIMEOUT)
            .open()?;
        tracing::info!("opened serial port {} at {} baud", port_name, baud);
        Ok(Self::from_port(port))
    }

    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut offset = 0;
        while offset < buf.len() {
            match self.port.read(&mut buf[offset..]) {
                Ok(0) => {}
                Ok(n) => offset += n,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    tracing::trace!("still waiting for {} bytes", buf.len() - offset);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
