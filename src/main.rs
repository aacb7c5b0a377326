#[macro_use]
extern crate log;

extern crate structopt;
use structopt::StructOpt;

extern crate simplelog;
use simplelog::{Config, LevelFilter, SimpleLogger};

use anyhow::{anyhow, Context};
use indicatif::{ProgressBar, ProgressStyle};

use srec_isp_loader::flasher::{self, Event, LineStatus, Report, WriteSummary};
use srec_isp_loader::linux::{LinuxChannel, DEFAULT_BAUD};
use srec_isp_loader::{Options, Relocation, Session};

#[derive(Clone, Debug, StructOpt)]
pub struct Args {
    #[structopt(subcommand)]
    action: Action,

    /// Serial port to connect to
    #[structopt(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial port baud rate
    #[structopt(long, default_value = "19200")]
    baud: usize,

    #[structopt(flatten)]
    options: Options,

    /// Offset added to record addresses before programming
    #[structopt(long, default_value = "0", allow_hyphen_values = true)]
    address_offset: i64,

    /// Offset added to each data byte before programming
    #[structopt(long, default_value = "0")]
    data_offset: u8,

    /// Log level for console output
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, Debug, StructOpt)]
pub enum Action {
    /// Erase the chip
    Erase,

    /// Program config bits (hex)
    Config {
        #[structopt(parse(try_from_str = parse_hex_u8))]
        bits: u8,
    },

    /// Write an S-Record file to flash
    Write { file: String },

    /// Erase, configure, then write an S-Record file to flash
    Auto { file: String },

    /// Read flash between two addresses (hex, e.g. C000 FFFF)
    Read {
        #[structopt(parse(try_from_str = parse_hex_u16))]
        start: u16,
        #[structopt(parse(try_from_str = parse_hex_u16))]
        end: u16,
    },

    /// Read the chip ID
    Id,

    /// Verify that an S-Record file is in flash (not supported)
    Verify { file: String },
}

fn parse_hex_u8(s: &str) -> Result<u8, std::num::ParseIntError> {
    u8::from_str_radix(s.trim_start_matches("0x"), 16)
}

fn parse_hex_u16(s: &str) -> Result<u16, std::num::ParseIntError> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16)
}

fn main() -> anyhow::Result<()> {
    // Parse out arguments
    let o = Args::from_args();

    // Configure logger
    let _ = SimpleLogger::init(o.log_level, Config::default());

    if o.baud != DEFAULT_BAUD {
        warn!("Using non-default baud rate {}", o.baud);
    }

    let relocation = Relocation::new(o.address_offset, o.data_offset);

    info!("Connecting to serial port");

    let mut s = Session::linux(&o.port, o.baud, o.options.clone())
        .map_err(|e| anyhow!("Error connecting to serial port {}: {:?}", o.port, e))?;

    match &o.action {
        Action::Erase => {
            info!("Erasing chip");
            check(flasher::erase(&mut s))?;
        }
        Action::Config { bits } => {
            check(flasher::configure(&mut s, *bits))?;
        }
        Action::Read { start, end } => {
            let data = check(flasher::read_range(&mut s, *start, *end))?;
            println!("{}", data);
        }
        Action::Id => {
            let id = check(flasher::chip_id(&mut s))?;
            info!("Chip ID: {}", id);
        }
        Action::Write { file } => {
            let image = load_image(file)?;

            info!("Writing {}", file);
            let summary = write(&mut s, &image, &relocation)?;
            report_summary(&summary);
        }
        Action::Auto { file } => {
            let image = load_image(file)?;

            info!("Auto programming {}", file);
            let pb = progress_bar(&image);
            let r = flasher::auto(&mut s, &image, &relocation, &mut |e: &Event| tick(&pb, e));
            pb.finish_and_clear();

            check(r.erase)?;
            check(r.configure)?;
            let summary = check(r.write)?;
            report_summary(&summary);
        }
        Action::Verify { file } => {
            return Err(anyhow!("Verify is not supported (file: {})", file));
        }
    }

    info!("Done");

    Ok(())
}

fn load_image(file: &str) -> anyhow::Result<String> {
    let image = std::fs::read_to_string(file)
        .with_context(|| format!("Error reading image file {}", file))?;

    info!(
        "Loaded {} ({}, {} lines)",
        file,
        bytefmt::format(image.len() as u64),
        image.lines().count()
    );

    Ok(image)
}

fn write(
    s: &mut Session<LinuxChannel>,
    image: &str,
    relocation: &Relocation,
) -> anyhow::Result<WriteSummary> {
    let pb = progress_bar(image);
    let r = flasher::write(s, image, relocation, &mut |e: &Event| tick(&pb, e));
    pb.finish_and_clear();

    check(r)
}

fn progress_bar(image: &str) -> ProgressBar {
    let pb = ProgressBar::new(image.lines().count() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} lines {msg}")
            .progress_chars("=> "),
    );
    pb
}

fn tick(pb: &ProgressBar, e: &Event) {
    match &e.status {
        LineStatus::Programmed { address, .. } => pb.set_message(&format!("0x{:04X}", address)),
        LineStatus::Invalid(err) => pb.println(format!("{}: {}", e.line, err)),
        LineStatus::Failed(reply) => pb.println(format!("{}: {}", e.line, reply)),
        LineStatus::NoAction(_) => (),
    }
    pb.set_position(e.line as u64);
}

/// Report enter / exit failures and convert the workflow result
fn check<T>(r: Report<T, std::io::ErrorKind>) -> anyhow::Result<T> {
    if let Err(e) = &r.enter {
        warn!("Enter ISP: {}", e);
    }
    if let Err(e) = &r.exit {
        warn!("Exit ISP: {}", e);
    }

    r.into_result().map_err(|e| anyhow!("{}", e))
}

fn report_summary(summary: &WriteSummary) {
    info!(
        "Programmed {} records ({}), {} skipped, {} invalid",
        summary.programmed,
        bytefmt::format(summary.bytes as u64),
        summary.skipped,
        summary.invalid.len()
    );

    for (line, e) in &summary.invalid {
        warn!("Line {}: {}", line, e);
    }
}
