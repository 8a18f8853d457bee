use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{info, warn};
use thermistor_core::decoder::{ChannelReading, decode};
use thermistor_core::orchestrator::{
    AcquisitionOrchestrator, CycleError, CycleReport, OrchestratorConfig,
};
use thermistor_core::repl::catalog;
use thermistor_core::repl::grammar::{self, AcquireCommand, Command, DecodeCommand, FixtureKind};
use thermistor_core::repl::status::{
    CycleOutcome, StatusFormatter, StatusSnapshot, write_calibration_table, write_reading,
    write_samples,
};

use crate::simulator::{HostTimebase, SimulatedOpener};

/// Telemetry entries echoed by `status`.
const STATUS_TELEMETRY_TAIL: usize = 5;

/// Message printed when the probe is not acknowledged.
pub const NO_ACK_MESSAGE: &str = "No ACK from thermistors";

/// Default location of the transcript recorded for `fixture`.
pub fn transcript_path(fixture: FixtureKind) -> PathBuf {
    PathBuf::from(format!("transcripts/emulator-{}.log", fixture.name()))
}

pub struct Session {
    orchestrator: AcquisitionOrchestrator<SimulatedOpener, HostTimebase>,
    transcript: Option<TranscriptLogger>,
    started_at: Instant,
    last_cycle: CycleOutcome,
    last_duration: Option<Duration>,
}

impl Session {
    pub fn new(fixture: FixtureKind, channels: u8) -> Self {
        let defaults = OrchestratorConfig::default();
        let config = OrchestratorConfig {
            profile: defaults.profile.with_channel_count(channels),
            ..defaults
        };

        Self {
            orchestrator: AcquisitionOrchestrator::new(
                SimulatedOpener::new(fixture),
                HostTimebase,
                config,
            ),
            transcript: None,
            started_at: Instant::now(),
            last_cycle: CycleOutcome::Never,
            last_duration: None,
        }
    }

    /// Like [`Session::new`], mirroring every exchange into `path`.
    pub fn with_transcript(fixture: FixtureKind, channels: u8, path: &Path) -> io::Result<Self> {
        let mut session = Self::new(fixture, channels);
        session.transcript = Some(TranscriptLogger::new(path, fixture)?);
        Ok(session)
    }

    pub fn fixture(&self) -> FixtureKind {
        self.orchestrator.opener().fixture()
    }

    /// Runs one acquisition cycle with the current configuration.
    pub fn acquire(&mut self) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let result = self.orchestrator.run_cycle();
        self.last_duration = Some(started.elapsed());
        self.last_cycle = CycleOutcome::from_result(&result);

        match &result {
            Ok(report) => info!(
                "cycle finished: {} decoded, {} missing",
                report.decoded_count(),
                report.missing_channels().count()
            ),
            Err(error) => warn!("cycle failed: {error}"),
        }
        result
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.record(elapsed, TranscriptRole::Host, &[trimmed.to_string()])?;

        let lines = match grammar::parse(trimmed) {
            Ok(Command::Acquire(command)) => self.handle_acquire(command),
            Ok(Command::Decode(command)) => decode_lines(&command),
            Ok(Command::Fixture(fixture)) => {
                self.orchestrator.opener_mut().set_fixture(fixture);
                vec![format!("OK fixture {fixture}")]
            }
            Ok(Command::Table) => table_lines(),
            Ok(Command::Status) => self.status_lines(),
            Ok(Command::Help(help)) => help_lines(help.topic),
            Err(err) => vec![format!("ERR syntax {err}")],
        };

        let bus = self.orchestrator.opener_mut().drain_trace();
        self.record(elapsed, TranscriptRole::Bus, &bus)?;
        self.record(elapsed, TranscriptRole::Emulator, &lines)?;
        Ok(lines)
    }

    fn handle_acquire(&mut self, command: AcquireCommand) -> Vec<String> {
        let saved = *self.orchestrator.config();
        {
            let config = self.orchestrator.config_mut();
            if let Some(channels) = command.channels {
                config.profile = saved.profile.with_channel_count(channels);
            }
            if let Some(retries) = command.retries {
                config.retry_budget = retries;
            }
        }

        let result = self.acquire();
        *self.orchestrator.config_mut() = saved;

        match result {
            Ok(report) => cycle_lines(&report),
            Err(error) => vec![describe_cycle_error(&error)],
        }
    }

    fn status_lines(&self) -> Vec<String> {
        let config = self.orchestrator.config();
        let telemetry = self.orchestrator.telemetry();
        let snapshot = StatusSnapshot {
            profile: config.profile,
            retry_budget: config.retry_budget,
            last_cycle: self.last_cycle,
            last_duration: self.last_duration,
            telemetry_events: telemetry.len(),
        };
        let formatter = StatusFormatter::new(&snapshot);

        let mut lines = vec![format!("fixture {}", self.fixture())];
        let mut line = String::new();
        if formatter.write_config_line(&mut line).is_ok() {
            lines.push(line);
        }
        let mut line = String::new();
        if formatter.write_cycle_line(&mut line).is_ok() {
            lines.push(line);
        }

        let skip = telemetry.len().saturating_sub(STATUS_TELEMETRY_TAIL);
        for record in telemetry.oldest_first().skip(skip) {
            lines.push(format!(
                "  +{}ms #{} {}",
                telemetry.offset_of(record).as_millis(),
                record.id,
                record.event
            ));
        }
        lines
    }

    fn record(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        lines: &[String],
    ) -> io::Result<()> {
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(elapsed, role, line)?;
            }
        }
        Ok(())
    }
}

/// Per-channel lines followed by the raw sample dump.
pub fn cycle_lines(report: &CycleReport) -> Vec<String> {
    let mut lines: Vec<String> = report.readings.iter().map(render_reading).collect();
    let mut samples = String::new();
    if write_samples(&mut samples, &report.samples).is_ok() {
        lines.push(samples);
    }
    lines
}

pub fn describe_cycle_error(error: &CycleError) -> String {
    if error.is_device_absent() {
        NO_ACK_MESSAGE.to_string()
    } else {
        format!("ERR {error}")
    }
}

fn render_reading(reading: &ChannelReading) -> String {
    let mut line = String::new();
    // Writing into a String cannot fail.
    let _ = write_reading(&mut line, reading);
    line
}

fn decode_lines(command: &DecodeCommand) -> Vec<String> {
    command
        .words
        .iter()
        .zip(0_u8..)
        .map(|(word, index)| {
            render_reading(&ChannelReading {
                index,
                outcome: decode(word.to_be_bytes()),
            })
        })
        .collect()
}

fn table_lines() -> Vec<String> {
    let mut text = String::new();
    let _ = write_calibration_table(&mut text);
    text.lines().map(str::to_string).collect()
}

fn help_lines(topic: Option<&str>) -> Vec<String> {
    match topic {
        Some(target) => match catalog::find(target) {
            Some(spec) => vec![format!("{}  - {}", spec.usage, spec.summary)],
            None => vec![
                format!("No help available for `{target}`."),
                format!("Available topics: {}", help_topic_list()),
            ],
        },
        None => {
            let mut lines = vec!["Available commands:".to_string()];
            for spec in catalog::commands() {
                lines.push(format!("  {:<44}- {}", spec.usage, spec.summary));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
            lines
        }
    }
}

fn help_topic_list() -> String {
    catalog::commands()
        .iter()
        .map(|spec| spec.name)
        .collect::<Vec<_>>()
        .join(", ")
}

struct TranscriptLogger {
    writer: BufWriter<fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, fixture: FixtureKind) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(fixture)?;
        Ok(logger)
    }

    fn write_header(&mut self, fixture: FixtureKind) -> io::Result<()> {
        writeln!(
            self.writer,
            "# Thermistor emulator transcript (fixture {fixture})"
        )?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Bus,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Bus => "BUS |",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
