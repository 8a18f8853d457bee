#![allow(clippy::missing_errors_doc)]

//! Shared rendering for the REPL and the one-shot CLI.
//!
//! Front-ends build a [`StatusSnapshot`] from their orchestrator and hand it
//! to [`StatusFormatter`]; channel readings and the calibration table are
//! rendered by free functions so every surface prints identical lines.

use core::fmt;
use core::time::Duration;

use crate::acquisition::AcquisitionError;
use crate::decoder::{CALIBRATION_TABLE, ChannelReading, SATURATION_TEMPERATURE};
use crate::device::DeviceProfile;
use crate::orchestrator::{CycleError, CycleReport};

/// Outcome of the most recent acquisition cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Never,
    Complete { decoded: u8, missing: u8, attempts: u8 },
    DeviceAbsent,
    BusFault,
    InvalidProfile,
}

impl CycleOutcome {
    #[must_use]
    pub fn from_result(result: &Result<CycleReport, CycleError>) -> Self {
        match result {
            Ok(report) => CycleOutcome::Complete {
                decoded: saturate(report.decoded_count()),
                missing: saturate(report.missing_channels().count()),
                attempts: report.attempts,
            },
            Err(CycleError::Acquisition(AcquisitionError::DeviceAbsent)) => {
                CycleOutcome::DeviceAbsent
            }
            Err(CycleError::Acquisition(AcquisitionError::InvalidProfile(_))) => {
                CycleOutcome::InvalidProfile
            }
            Err(CycleError::Open(_) | CycleError::Acquisition(AcquisitionError::Bus(_))) => {
                CycleOutcome::BusFault
            }
        }
    }
}

fn saturate(count: usize) -> u8 {
    u8::try_from(count).unwrap_or(u8::MAX)
}

/// Snapshot of reusable status information surfaced by the REPL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub profile: DeviceProfile,
    pub retry_budget: u8,
    pub last_cycle: CycleOutcome,
    pub last_duration: Option<Duration>,
    pub telemetry_events: usize,
}

/// Helper that renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the configuration line (e.g. `config address=0xe3 channels=12 retries=1`).
    pub fn write_config_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "config address={:#x} channels={} retries={}",
            self.snapshot.profile.read_address,
            self.snapshot.profile.channel_count,
            self.snapshot.retry_budget
        )
    }

    /// Writes the cycle line (e.g. `cycle last=complete decoded=11 missing=1 attempts=1 took=+11ms events=14`).
    pub fn write_cycle_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("cycle last=")?;
        match self.snapshot.last_cycle {
            CycleOutcome::Never => writer.write_str("never")?,
            CycleOutcome::Complete {
                decoded,
                missing,
                attempts,
            } => write!(
                writer,
                "complete decoded={decoded} missing={missing} attempts={attempts}"
            )?,
            CycleOutcome::DeviceAbsent => writer.write_str("device-absent")?,
            CycleOutcome::BusFault => writer.write_str("bus-fault")?,
            CycleOutcome::InvalidProfile => writer.write_str("invalid-profile")?,
        }

        if let Some(duration) = self.snapshot.last_duration {
            writer.write_str(" took=")?;
            write_duration(writer, duration)?;
        }
        write!(writer, " events={}", self.snapshot.telemetry_events)
    }
}

/// Writes one channel line (e.g. `Thermistor 3:\t41.2 C`).
pub fn write_reading<W: fmt::Write>(writer: &mut W, reading: &ChannelReading) -> fmt::Result {
    match reading.outcome {
        Ok(celsius) => write!(writer, "Thermistor {}:\t{} C", reading.index, celsius),
        Err(missing) => write!(writer, "Thermistor {}:\t{}", reading.index, missing),
    }
}

/// Writes the raw sample bytes (e.g. `results: [2 119 255 255]`).
pub fn write_samples<W: fmt::Write>(writer: &mut W, samples: &[u8]) -> fmt::Result {
    writer.write_str("results: [")?;
    for (position, byte) in samples.iter().enumerate() {
        if position > 0 {
            writer.write_char(' ')?;
        }
        write!(writer, "{byte}")?;
    }
    writer.write_char(']')
}

/// Writes one line per calibration region followed by the saturation rule.
pub fn write_calibration_table<W: fmt::Write>(writer: &mut W) -> fmt::Result {
    let mut upper: Option<u16> = None;
    for (index, region) in CALIBRATION_TABLE.iter().enumerate() {
        match upper {
            None => write!(writer, "region {index}: code >= {}", region.breakpoint)?,
            Some(upper) => write!(writer, "region {index}: code {}..={upper}", region.breakpoint)?,
        }
        writeln!(
            writer,
            " ref={} C slope={} C/code",
            region.reference, region.slope
        )?;
        upper = Some(region.breakpoint - 1);
    }
    write!(
        writer,
        "below {}: {} C",
        CALIBRATION_TABLE[CALIBRATION_TABLE.len() - 1].breakpoint,
        SATURATION_TEMPERATURE
    )
}

fn write_duration<W: fmt::Write>(writer: &mut W, value: Duration) -> fmt::Result {
    if value >= Duration::from_secs(1) {
        let millis = value.as_millis();
        let seconds = millis / 1_000;
        let tenths = (millis % 1_000) / 100;
        write!(writer, "+{seconds}.{tenths}s")
    } else if value >= Duration::from_millis(1) {
        write!(writer, "+{}ms", value.as_millis())
    } else {
        write!(writer, "+{}us", value.as_micros())
    }
}
