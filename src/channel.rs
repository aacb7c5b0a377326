//! Line oriented transport used by the ISP session.

use std::time::{Duration, Instant};

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::serial::{Read, Write};

/// Longest reply line buffered before it is handed back unterminated
pub const MAX_REPLY_LEN: usize = 36000;

/// Duplex line transport
pub trait Channel {
    type Error: core::fmt::Debug;

    /// Write a command to the device
    fn write(&mut self, data: &str) -> Result<(), Self::Error>;

    /// Read a single reply line (without line ending), `None` on timeout
    fn read_line(&mut self, timeout_ms: u32) -> Result<Option<String>, Self::Error>;
}

/// [`Channel`] over an embedded-hal serial port, polling for reply bytes
/// with a delay between attempts
pub struct SerialChannel<P, D> {
    port: P,
    delay: D,
    poll_delay_ms: u32,
    max_line: usize,
    line: Vec<u8>,
}

impl<P, D, E> SerialChannel<P, D>
where
    P: Write<u8, Error = E> + Read<u8, Error = E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    pub fn new(port: P, delay: D, poll_delay_ms: u32) -> Self {
        Self { port, delay, poll_delay_ms, max_line: MAX_REPLY_LEN, line: Vec::new() }
    }

    /// Limit the length of a buffered reply line
    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line.max(1);
        self
    }

    /// Access the underlying port
    pub fn port(&mut self) -> &mut P {
        &mut self.port
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.line)
            .trim_end_matches('\r')
            .to_string();
        self.line.clear();
        line
    }
}

impl<P, D, E> Channel for SerialChannel<P, D>
where
    P: Write<u8, Error = E> + Read<u8, Error = E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    type Error = E;

    fn write(&mut self, data: &str) -> Result<(), E> {
        // Drop any partial reply left over from a previous command
        self.line.clear();

        for b in data.bytes() {
            block!(self.port.write(b))?;
        }
        block!(self.port.flush())?;

        Ok(())
    }

    fn read_line(&mut self, timeout_ms: u32) -> Result<Option<String>, E> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        let mut t = 0;

        loop {
            match self.port.read() {
                Err(nb::Error::WouldBlock) => {
                    // Wait for delay period
                    self.delay.delay_ms(self.poll_delay_ms);
                    t += self.poll_delay_ms.max(1);
                }
                Err(nb::Error::Other(e)) => return Err(e),
                Ok(b'\n') => return Ok(Some(self.take_line())),
                Ok(v) => {
                    self.line.push(v);

                    if self.line.len() >= self.max_line {
                        warn!("Reply exceeded {} bytes without a line ending", self.max_line);
                        return Ok(Some(self.take_line()));
                    }
                }
            }

            if t >= timeout_ms || Instant::now() >= deadline {
                trace!("Line read timeout ({} bytes pending)", self.line.len());
                return Ok(None);
            }
        }
    }
}
