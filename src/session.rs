//! ISP session state machine.
//!
//! Every command is written once, then up to `reply_attempts` reply lines are
//! read looking for an `OK` or `ERR`. Commands are never resent.

use crate::channel::Channel;
use crate::protocol::{Command, Opcode, Response};
use crate::srec::SRecord;
use crate::{Error, Options};

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Mode {
    /// Device assumed to be running its application
    Idle,
    /// Device assumed to be in ISP mode
    Active,
}

pub struct Session<C> {
    mode: Mode,
    options: Options,
    channel: C,
}

impl<C> Session<C>
where
    C: Channel,
{
    /// Create a new session over the provided channel
    pub fn new(channel: C, options: Options) -> Self {
        Self { mode: Mode::Idle, options, channel }
    }

    /// Fetch the session mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn channel(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    /// Send a command and await its classified reply
    pub fn transact(&mut self, command: &Command) -> Result<Response, Error<C::Error>> {
        self.transact_with(command, Response::classify)
    }

    fn transact_with(
        &mut self,
        command: &Command,
        classify: fn(&str) -> Option<Response>,
    ) -> Result<Response, Error<C::Error>> {
        if command.opcode.requires_session() && self.mode != Mode::Active {
            error!("Command '{}' requires ISP mode", command.opcode);
            return Err(Error::NotActive(command.opcode));
        }

        debug!("Sending '{}'", command);
        self.channel.write(&command.to_string())?;

        for attempt in 0..self.options.reply_attempts {
            let line = match self.channel.read_line(self.options.response_timeout_ms)? {
                Some(l) => l,
                None => {
                    trace!("No reply to '{}' (attempt {})", command.opcode, attempt + 1);
                    continue;
                }
            };

            match classify(&line) {
                Some(r) => {
                    debug!("Received '{}'", line);
                    return Ok(r);
                }
                None => debug!("Ignoring unexpected line '{}'", line),
            }
        }

        Ok(Response::Timeout)
    }

    fn expect_ok(&mut self, command: &Command) -> Result<String, Error<C::Error>> {
        let r = self.transact(command)?;
        check(command.opcode, r)
    }

    /// Enter ISP mode.
    ///
    /// Once the command has been written the device is assumed to be in ISP
    /// mode whatever the reply, so a following `exit` is always permitted.
    pub fn enter(&mut self) -> Result<(), Error<C::Error>> {
        let r = self.transact(&Command::enter())?;
        self.mode = Mode::Active;

        check(Opcode::EnterIsp, r).map(|_| ())
    }

    /// Exit ISP mode
    pub fn exit(&mut self) -> Result<(), Error<C::Error>> {
        let r = self.transact(&Command::exit())?;
        self.mode = Mode::Idle;

        check(Opcode::ExitIsp, r).map(|_| ())
    }

    /// Erase the flash memory
    pub fn erase(&mut self) -> Result<(), Error<C::Error>> {
        self.expect_ok(&Command::erase()).map(|_| ())
    }

    /// Write the config register
    pub fn configure(&mut self, bits: u8) -> Result<(), Error<C::Error>> {
        self.expect_ok(&Command::config(bits)).map(|_| ())
    }

    /// Program memory with hex encoded address, length and data fields
    pub fn program(
        &mut self,
        address: &str,
        length: &str,
        data: &str,
    ) -> Result<(), Error<C::Error>> {
        self.expect_ok(&Command::program(address, length, data)).map(|_| ())
    }

    /// Program the contents of an S1 record
    pub fn program_record(&mut self, record: &SRecord) -> Result<(), Error<C::Error>> {
        self.expect_ok(&Command::program_record(record)).map(|_| ())
    }

    /// Read memory between two addresses, returning the reply payload
    pub fn read_range(&mut self, start: u16, end: u16) -> Result<String, Error<C::Error>> {
        self.expect_ok(&Command::read(start, end))
    }

    /// Fetch the chip ID
    pub fn chip_id(&mut self) -> Result<String, Error<C::Error>> {
        let c = Command::chip_id();
        let r = self.transact_with(&c, Response::classify_id)?;
        check(c.opcode, r)
    }
}

fn check<E>(opcode: Opcode, response: Response) -> Result<String, Error<E>> {
    match response {
        Response::Ok(payload) => Ok(payload),
        Response::Err => {
            error!("Device rejected '{}' command", opcode);
            Err(Error::Rejected(opcode))
        }
        Response::Timeout => {
            warn!("No response to '{}' command", opcode);
            Err(Error::ResponseTimeout(opcode))
        }
    }
}
