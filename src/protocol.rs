//! ISP wire protocol.
//!
//! Commands are a single opcode character followed by hex encoded parameters,
//! replies are lines starting with `OK` (optionally followed by a payload) or `ERR`.

use core::fmt;

use crate::srec::SRecord;

/// Reply marker for a successful command
pub const REPLY_OK: &str = "OK";

/// Reply marker for a failed command
pub const REPLY_ERR: &str = "ERR";

/// Number of reply lines polled for before a command times out
pub const DEFAULT_REPLY_ATTEMPTS: u32 = 10;

/// Config bits written by the auto workflow
pub const DEFAULT_CONFIG_BITS: u8 = 0x00;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Opcode {
    /// Enter ISP mode
    EnterIsp = b'S' as isize,

    /// Exit ISP mode
    ExitIsp = b'C' as isize,

    /// Fetch the chip ID
    ChipId = b'I' as isize,

    /// Write the config register
    Config = b'F' as isize,

    /// Erase flash memory
    Erase = b'E' as isize,

    /// Program memory starting at an address
    Program = b'P' as isize,

    /// Read memory between two addresses
    Read = b'R' as isize,
}

impl Opcode {
    pub fn as_char(&self) -> char {
        *self as u8 as char
    }

    /// Whether the command may only be issued from within an ISP session
    pub fn requires_session(&self) -> bool {
        !matches!(self, Opcode::EnterIsp | Opcode::ExitIsp)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A single command line
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub opcode: Opcode,
    pub params: String,
}

impl Command {
    fn bare(opcode: Opcode) -> Self {
        Self { opcode, params: String::new() }
    }

    pub fn enter() -> Self {
        Self::bare(Opcode::EnterIsp)
    }

    pub fn exit() -> Self {
        Self::bare(Opcode::ExitIsp)
    }

    pub fn chip_id() -> Self {
        Self::bare(Opcode::ChipId)
    }

    pub fn erase() -> Self {
        Self::bare(Opcode::Erase)
    }

    pub fn config(bits: u8) -> Self {
        Self { opcode: Opcode::Config, params: format!("{:02X}", bits) }
    }

    /// `P` with address, length and data as hex fields
    pub fn program(address: &str, length: &str, data: &str) -> Self {
        Self {
            opcode: Opcode::Program,
            params: format!("{} {} {}", address, length, data),
        }
    }

    /// Build a program command from an S1 record.
    ///
    /// The length field is the record byte count less the two address bytes
    /// and the checksum byte; the checksum itself is not sent.
    pub fn program_record(record: &SRecord) -> Self {
        Self::program(
            &format!("{:04X}", record.address),
            &format!("{:02X}", record.data_length()),
            &hex::encode_upper(&record.payload),
        )
    }

    pub fn read(start: u16, end: u16) -> Self {
        Self {
            opcode: Opcode::Read,
            params: format!("{:04X} {:04X}", start, end),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.opcode, self.params)
    }
}

/// Classified device reply
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    /// `OK` with whatever followed the marker
    Ok(String),
    /// `ERR`
    Err,
    /// No recognisable reply within the attempt budget
    Timeout,
}

impl Response {
    /// Classify a reply line, `None` for lines that are neither `OK` nor `ERR`
    pub fn classify(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');

        if let Some(rest) = line.strip_prefix(REPLY_OK) {
            Some(Response::Ok(rest.trim_start().to_string()))
        } else if line.starts_with(REPLY_ERR) {
            Some(Response::Err)
        } else {
            None
        }
    }

    /// Classify a chip ID reply, where the ID itself stands in for `OK`
    pub fn classify_id(line: &str) -> Option<Self> {
        let line = line.trim();

        if line.starts_with(REPLY_ERR) {
            Some(Response::Err)
        } else if line.is_empty() {
            None
        } else {
            Some(Response::Ok(line.to_string()))
        }
    }
}
