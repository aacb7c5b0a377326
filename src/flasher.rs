//! Flashing workflows.
//!
//! Each workflow enters ISP mode, runs its steps and then exits ISP mode,
//! whether or not the steps succeeded.

use crate::channel::Channel;
use crate::protocol::DEFAULT_CONFIG_BITS;
use crate::session::Session;
use crate::srec::{RecordType, Relocation, SRecord, SrecError};
use crate::{Error, Reply};

/// Outcome of a single workflow
#[derive(Clone, PartialEq, Debug)]
pub struct Report<T, E> {
    pub enter: Result<(), Error<E>>,
    pub outcome: Result<T, Error<E>>,
    pub exit: Result<(), Error<E>>,
}

impl<T, E> Report<T, E> {
    /// Whether every step, including entering and exiting ISP mode, succeeded
    pub fn is_ok(&self) -> bool {
        self.enter.is_ok() && self.outcome.is_ok() && self.exit.is_ok()
    }

    /// Result of the workflow steps.
    ///
    /// Enter and exit failures are only reported, they do not fail the workflow.
    pub fn into_result(self) -> Result<T, Error<E>> {
        self.outcome
    }
}

/// Per-line status reported while writing an image
#[derive(Clone, PartialEq, Debug)]
pub enum LineStatus {
    /// Record programmed
    Programmed { address: u32, length: u8 },
    /// Record of a type with no programming action
    NoAction(RecordType),
    /// Line skipped as malformed, bad checksum or out of range
    Invalid(SrecError),
    /// Programming failed, the write stops here
    Failed(Reply),
}

#[derive(Clone, PartialEq, Debug)]
pub struct Event {
    /// Line number within the image, starting at 1
    pub line: usize,
    pub status: LineStatus,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct WriteSummary {
    /// Non-blank lines processed
    pub lines: usize,
    /// S1 records programmed
    pub programmed: usize,
    /// Data bytes programmed
    pub bytes: usize,
    /// Records with no programming action
    pub skipped: usize,
    /// Lines rejected by the decoder
    pub invalid: Vec<(usize, SrecError)>,
}

/// Outcome of the auto workflow, one report per stage
#[derive(Clone, PartialEq, Debug)]
pub struct AutoReport<E> {
    pub erase: Report<(), E>,
    pub configure: Report<(), E>,
    pub write: Report<WriteSummary, E>,
}

impl<E> AutoReport<E> {
    pub fn is_ok(&self) -> bool {
        self.erase.is_ok() && self.configure.is_ok() && self.write.is_ok()
    }
}

/// Run a set of steps within an ISP session, always exiting afterwards
fn run<C, T, F>(session: &mut Session<C>, name: &str, steps: F) -> Report<T, C::Error>
where
    C: Channel,
    F: FnOnce(&mut Session<C>) -> Result<T, Error<C::Error>>,
{
    info!("Entering ISP mode");
    let enter = session.enter();

    let abort = match &enter {
        Ok(_) => false,
        Err(Error::Serial(e)) => {
            error!("Serial error entering ISP mode: {:?}", e);
            true
        }
        Err(e) => {
            warn!("Failed to enter ISP mode: {}", e);
            session.options().strict
        }
    };

    let outcome = if abort {
        Err(Error::Aborted)
    } else {
        info!("Running {}", name);
        steps(session)
    };

    match &outcome {
        Ok(_) => info!("{} complete", name),
        Err(e) => error!("{} failed: {}", name, e),
    }

    info!("Exiting ISP mode");
    let exit = session.exit();
    if let Err(e) = &exit {
        warn!("Failed to exit ISP mode: {}", e);
    }

    Report { enter, outcome, exit }
}

/// Erase the flash memory
pub fn erase<C: Channel>(session: &mut Session<C>) -> Report<(), C::Error> {
    run(session, "erase", |s| s.erase())
}

/// Write the config register
pub fn configure<C: Channel>(session: &mut Session<C>, bits: u8) -> Report<(), C::Error> {
    info!("Configuring chip with 0x{:02X}", bits);
    run(session, "configure", |s| s.configure(bits))
}

/// Read memory between two addresses
pub fn read_range<C: Channel>(
    session: &mut Session<C>,
    start: u16,
    end: u16,
) -> Report<String, C::Error> {
    info!("Reading chip from 0x{:04X} to 0x{:04X}", start, end);
    run(session, "read", |s| {
        let data = s.read_range(start, end)?;
        debug!("Read {} characters", data.len());
        Ok(data)
    })
}

/// Fetch the chip ID
pub fn chip_id<C: Channel>(session: &mut Session<C>) -> Report<String, C::Error> {
    run(session, "chip id", |s| s.chip_id())
}

/// Write an S-Record image.
///
/// Malformed lines and lines with bad checksums are reported and skipped.
/// Only S1 records are programmed; the first failed program command stops
/// the write.
pub fn write<C: Channel>(
    session: &mut Session<C>,
    image: &str,
    relocation: &Relocation,
    progress: &mut dyn FnMut(&Event),
) -> Report<WriteSummary, C::Error> {
    run(session, "write", |s| write_records(s, image, relocation, progress))
}

/// Erase, configure with the default config bits, then write an image
pub fn auto<C: Channel>(
    session: &mut Session<C>,
    image: &str,
    relocation: &Relocation,
    progress: &mut dyn FnMut(&Event),
) -> AutoReport<C::Error> {
    let erase = erase(session);
    let configure = configure(session, DEFAULT_CONFIG_BITS);
    let write = write(session, image, relocation, progress);

    AutoReport { erase, configure, write }
}

fn write_records<C: Channel>(
    session: &mut Session<C>,
    image: &str,
    relocation: &Relocation,
    progress: &mut dyn FnMut(&Event),
) -> Result<WriteSummary, Error<C::Error>> {
    let mut summary = WriteSummary::default();

    for (i, text) in image.lines().enumerate() {
        let line = i + 1;
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        summary.lines += 1;

        let record = match SRecord::parse(text).and_then(|r| r.validate().map(|_| r)) {
            Ok(r) => r,
            Err(e) => {
                reject(&mut summary, progress, line, e);
                continue;
            }
        };

        if record.kind != RecordType::Data16 {
            info!("{}: {} No Action", line, text);
            summary.skipped += 1;
            progress(&Event { line, status: LineStatus::NoAction(record.kind) });
            continue;
        }

        let record = match relocation.apply(&record) {
            Ok(r) => r,
            Err(e) => {
                reject(&mut summary, progress, line, e);
                continue;
            }
        };

        match session.program_record(&record) {
            Ok(()) => {
                debug!("{}: {}", line, hex::encode_upper(&record.payload));

                summary.programmed += 1;
                summary.bytes += record.payload.len();
                progress(&Event {
                    line,
                    status: LineStatus::Programmed {
                        address: record.address,
                        length: record.data_length(),
                    },
                });
            }
            Err(e) => {
                let reply = match e.reply() {
                    Some(r) => r,
                    None => return Err(e),
                };

                error!("Can not program flash at line {}: {}", line, e);
                progress(&Event { line, status: LineStatus::Failed(reply) });

                return Err(Error::Program { line, address: record.address, reply });
            }
        }
    }

    Ok(summary)
}

fn reject(
    summary: &mut WriteSummary,
    progress: &mut dyn FnMut(&Event),
    line: usize,
    e: SrecError,
) {
    warn!("{}: {}, skipping line", line, e);

    progress(&Event { line, status: LineStatus::Invalid(e.clone()) });
    summary.invalid.push((line, e));
}
