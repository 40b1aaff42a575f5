use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use quadmag_lib::QuadMag;
use quadmag_lib::command::{ContinuousParams, ImuConfig, MagConfig, MagMask, Tmrc};
use quadmag_lib::convert::Gains;
use quadmag_lib::device::{BAUD_RATE, IO_TIMEOUT, SessionMode, SessionRequest};
use quadmag_lib::measurement::csv_header;
use quadmag_lib::session::{SessionStatus, SessionSummary};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about = "Operator tools for the quad-magnetometer acquisition board")]
struct Cli {
    /// Serial port the board is attached to
    #[arg(short, long, default_value = "/dev/ttyACM0")]
    port: String,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Args)]
struct ConfigArgs {
    /// Magnetometer cycle count
    #[arg(long, default_value_t = 200)]
    cycle_count: u16,

    /// TMRC sample-rate index (0 = 600 Hz .. 13 = 0.075 Hz)
    #[arg(long, default_value_t = 0)]
    tmrc: u8,

    /// Also configure the IMU (default settings)
    #[arg(long)]
    imu: bool,

    /// Magnetometers to disable, e.g. "13" for sensors 1 and 3
    #[arg(long, default_value = "")]
    disable: String,

    /// Proceed to measurement even if a config echo disagrees
    #[arg(long)]
    ignore_mismatch: bool,
}

impl ConfigArgs {
    fn mag_config(&self) -> Result<MagConfig> {
        Ok(MagConfig {
            cycle_count: self.cycle_count,
            tmrc: Tmrc::from_index(self.tmrc)?,
        })
    }

    fn mask(&self) -> Result<MagMask> {
        let mut mask = MagMask::all_enabled();
        for ch in self.disable.chars() {
            let sensor = ch
                .to_digit(10)
                .with_context(|| format!("invalid magnetometer number {ch:?}"))?;
            mask = mask.disable(sensor as u8)?;
        }
        Ok(mask)
    }
}

#[derive(Subcommand)]
enum CliCommand {
    /// Take a single measurement
    Single {
        #[command(flatten)]
        config: ConfigArgs,

        /// CSV file to write; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Stream measurements for a fixed duration
    Continuous {
        #[command(flatten)]
        config: ConfigArgs,

        /// Run length in minutes
        #[arg(short, long)]
        minutes: f64,

        /// Sample rate in Hz (forced to 1 when --averaged)
        #[arg(short, long, default_value_t = 1)]
        rate: u8,

        /// Average on the board: one record per second
        #[arg(long)]
        averaged: bool,

        /// CSV file to write
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Read back both sensor configurations
    GetConfig,
    /// Flush whatever buffered frame the board holds
    SendAvailable,
    /// Stop all sensors and enter low-power mode
    Stop,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.tracing_level_filter())
        .init();

    let port = serialport::new(&cli.port, BAUD_RATE)
        .timeout(IO_TIMEOUT)
        .open()
        .with_context(|| format!("opening serial port {}", cli.port))?;
    info!(port = %cli.port, baud = BAUD_RATE, "serial port opened");
    let mut device = QuadMag::new(port);

    match cli.command {
        CliCommand::Single { config, output } => {
            let request = SessionRequest {
                mag_config: Some(config.mag_config()?),
                imu_config: config.imu.then(ImuConfig::default),
                mask: config.mask()?,
                mode: SessionMode::Single,
                proceed_on_mismatch: config.ignore_mismatch,
            };
            let summary = device.run(&request)?;
            report(&summary);
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    write_log(&mut BufWriter::new(file), &request, &summary)?;
                    info!(path = %path.display(), "measurement written");
                }
                None => write_log(&mut std::io::stdout().lock(), &request, &summary)?,
            }
        }
        CliCommand::Continuous {
            config,
            minutes,
            rate,
            averaged,
            output,
        } => {
            if minutes <= 0.0 {
                bail!("run length must be positive");
            }
            let params = ContinuousParams {
                averaged,
                sample_rate_hz: rate,
                duration_minutes: minutes,
            };
            let request = SessionRequest {
                mag_config: Some(config.mag_config()?),
                imu_config: config.imu.then(ImuConfig::default),
                mask: config.mask()?,
                mode: SessionMode::Continuous(params),
                proceed_on_mismatch: config.ignore_mismatch,
            };
            info!(
                minutes,
                rate = params.effective_rate_hz(),
                expected = params.expected_records(),
                "starting continuous run"
            );
            let summary = device.run(&request)?;
            report(&summary);
            let file =
                File::create(&output).with_context(|| format!("creating {}", output.display()))?;
            write_log(&mut BufWriter::new(file), &request, &summary)?;
            info!(path = %output.display(), records = summary.records.len(), "run written");
        }
        CliCommand::GetConfig => {
            let mag = device.mag_config()?;
            let imu = device.imu_config()?;
            println!("magnetometer config: {}", hex::encode(mag));
            println!("imu config:          {}", hex::encode(imu));
            let gains = Gains::from_echoes(&mag, Some(&imu));
            println!(
                "gains: mag {:.4} nT/LSB, acc {:.1} LSB/g, gyr {:.1} LSB/dps",
                gains.mag_nt_per_lsb,
                gains.acc_lsb_per_g.unwrap_or_default(),
                gains.gyr_lsb_per_dps.unwrap_or_default()
            );
        }
        CliCommand::SendAvailable => match device.send_available()? {
            Some(record) => println!("{}", record.csv_row(1)),
            None => println!("no buffered data available"),
        },
        CliCommand::Stop => {
            device.stop_all()?;
            println!("all operations stopped");
        }
    }

    Ok(())
}

fn report(summary: &SessionSummary) {
    for mismatch in &summary.config_mismatches {
        warn!(%mismatch, "config echo disagreed");
    }
    match summary.status {
        SessionStatus::Complete => info!(%summary, "session finished"),
        _ => warn!(%summary, "session did not complete"),
    }
}

/// Write the log file: the gain-relevant config values first so the file is
/// self-describing for later unit conversion, then the column header, then
/// one row per record.
fn write_log<W: Write>(out: &mut W, request: &SessionRequest, summary: &SessionSummary) -> Result<()> {
    match (&request.mag_config, &request.imu_config) {
        (Some(mag), Some(imu)) => {
            writeln!(out, "cycle_count,acc_range_index,gyr_range_index")?;
            writeln!(
                out,
                "{},{},{}",
                mag.cycle_count,
                u8::from(imu.acc_range),
                u8::from(imu.gyr_range)
            )?;
        }
        (Some(mag), None) => {
            writeln!(out, "cycle_count")?;
            writeln!(out, "{}", mag.cycle_count)?;
        }
        _ => {}
    }
    if let Some(first) = summary.records.first() {
        writeln!(out, "{}", csv_header(first.flag))?;
    }
    for (index, record) in summary.records.iter().enumerate() {
        writeln!(out, "{}", record.csv_row(index as u64 + 1))?;
    }
    Ok(())
}
