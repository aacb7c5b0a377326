//! S-Record ISP loader.
//!
//! Flashes Motorola S-Record images to a microcontroller running a simple
//! single-character command bootloader (enter / exit ISP, erase, config,
//! program, read) over a serial line.

#[macro_use]
extern crate log;

#[macro_use(block)]
extern crate nb;

#[cfg(feature = "structopt")]
extern crate structopt;

pub mod channel;
pub mod flasher;
pub mod protocol;
pub mod session;
pub mod srec;

#[cfg(feature = "linux")]
pub mod linux;

#[cfg(test)]
mod mock;

pub use channel::{Channel, SerialChannel};
pub use protocol::{Command, Opcode, Response};
pub use session::{Mode, Session};
pub use srec::{RecordType, Relocation, SRecord, SrecError};

/// Failed device reply
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Reply {
    /// Device replied `ERR`
    Rejected,
    /// No reply within the attempt budget
    Timeout,
}

impl core::fmt::Display for Reply {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Reply::Rejected => write!(f, "rejected by device"),
            Reply::Timeout => write!(f, "no response"),
        }
    }
}

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Error<SerialError> {
    #[error("serial error: {0:?}")]
    Serial(SerialError),

    #[error("device rejected '{0}' command")]
    Rejected(Opcode),

    #[error("no response to '{0}' command")]
    ResponseTimeout(Opcode),

    #[error("'{0}' command issued outside an ISP session")]
    NotActive(Opcode),

    #[error("programming line {line} at 0x{address:04X} failed: {reply}")]
    Program { line: usize, address: u32, reply: Reply },

    #[error("aborted after failing to enter ISP mode")]
    Aborted,
}

impl<SerialError> From<SerialError> for Error<SerialError> {
    fn from(e: SerialError) -> Self {
        Self::Serial(e)
    }
}

impl<E> Error<E> {
    /// Device level failure reason, if this was a rejected or unanswered command
    pub fn reply(&self) -> Option<Reply> {
        match self {
            Error::Rejected(_) => Some(Reply::Rejected),
            Error::ResponseTimeout(_) => Some(Reply::Timeout),
            Error::Program { reply, .. } => Some(*reply),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "structopt", derive(structopt::StructOpt))]
pub struct Options {
    /// Timeout for each reply line read
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1000"))]
    pub response_timeout_ms: u32,

    /// Period to poll for reply bytes
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1"))]
    pub poll_delay_ms: u32,

    /// Reply lines to read before a command times out
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "10"))]
    pub reply_attempts: u32,

    /// Skip the remaining steps of a workflow if entering ISP mode fails
    #[cfg_attr(feature = "structopt", structopt(long))]
    pub strict: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            response_timeout_ms: 1000,
            poll_delay_ms: 1,
            reply_attempts: protocol::DEFAULT_REPLY_ATTEMPTS,
            strict: false,
        }
    }
}
