use std::path::Path;
use std::time::Duration;

use linux_embedded_hal::{Delay, Serial};
use serial_core::{
    BaudRate, CharSize, Error as SerialError, FlowControl, Parity, SerialDevice as _,
    SerialPortSettings as _, StopBits,
};

use crate::{Options, SerialChannel, Session};

/// Default ISP baud rate
pub const DEFAULT_BAUD: usize = 19200;

/// Linux serial port channel
pub type LinuxChannel = SerialChannel<Serial, Delay>;

impl Session<LinuxChannel> {
    /// Create a new linux serial port session
    pub fn linux<P: AsRef<Path>>(
        port: P,
        baud: usize,
        options: Options,
    ) -> Result<Self, SerialError> {
        // Open port
        let mut port = Serial::open(port.as_ref())?;

        // Apply settings
        let mut settings = port.0.read_settings()?;

        settings.set_char_size(CharSize::Bits8);
        settings.set_stop_bits(StopBits::Stop1);
        settings.set_baud_rate(BaudRate::from_speed(baud))?;
        settings.set_flow_control(FlowControl::FlowNone);
        settings.set_parity(Parity::ParityNone);

        port.0.write_settings(&settings)?;

        // The driver read timeout paces polling, so the channel adds no delay of its own
        let poll = Duration::from_millis(options.poll_delay_ms.max(1) as u64);
        port.0.set_timeout(poll)?;

        debug!("Opened serial port at {} baud", baud);

        let channel = SerialChannel::new(port, Delay {}, 0);

        // Return instance
        Ok(Self::new(channel, options))
    }
}
