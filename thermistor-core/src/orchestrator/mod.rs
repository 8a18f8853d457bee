//! End-to-end acquisition cycles.
//!
//! The orchestrator opens the data and auxiliary sessions, runs the
//! [`AdcAcquisitionController`] over the data session, decodes every channel,
//! and releases both sessions on every exit path. Retrying a cycle after a
//! transport fault is an orchestration decision and lives here, never in the
//! sequencer or the controller.

use core::fmt;

use heapless::Vec;

use crate::acquisition::{AcquisitionError, AdcAcquisitionController, SampleBuffer};
use crate::bus::{BusError, BusSession, ChannelConfig, SessionOpener, Timebase};
use crate::decoder::{ChannelReading, decode_channels};
use crate::device::{DeviceProfile, MAX_CHANNELS, MAX11608_PROFILE};
use crate::logging::{log_error, log_info, log_warn};
use crate::telemetry::{TELEMETRY_RING_CAPACITY, TelemetryEventKind, TelemetryRecorder};

/// Attempts per cycle when no override is configured (no retry).
pub const DEFAULT_RETRY_BUDGET: u8 = 1;
/// Upper bound accepted for the retry budget.
pub const MAX_RETRY_BUDGET: u8 = 5;

/// Per-channel results of one cycle.
pub type ReadingBuffer = Vec<ChannelReading, MAX_CHANNELS>;

/// Runtime configuration for the orchestrator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OrchestratorConfig {
    pub data_channel: ChannelConfig,
    pub aux_channel: ChannelConfig,
    pub profile: DeviceProfile,
    /// Total attempts allowed for a cycle that fails on a transport fault.
    pub retry_budget: u8,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            data_channel: ChannelConfig::data_default(),
            aux_channel: ChannelConfig::aux_default(),
            profile: MAX11608_PROFILE,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

/// Decoded output of a successful cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub readings: ReadingBuffer,
    pub samples: SampleBuffer,
    pub select_echo: u8,
    pub attempts: u8,
}

impl CycleReport {
    /// Indices of channels that reported no thermistor.
    pub fn missing_channels(&self) -> impl Iterator<Item = u8> + '_ {
        self.readings
            .iter()
            .filter(|reading| reading.is_missing())
            .map(|reading| reading.index)
    }

    /// Number of channels that decoded to a temperature.
    #[must_use]
    pub fn decoded_count(&self) -> usize {
        self.readings
            .iter()
            .filter(|reading| !reading.is_missing())
            .count()
    }
}

/// Failure of a whole acquisition cycle.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleError {
    /// A session could not be opened.
    Open(BusError),
    /// The controller aborted the cycle.
    Acquisition(AcquisitionError),
}

impl CycleError {
    /// Returns `true` when the cycle failed because the ADC never acknowledged.
    #[must_use]
    pub const fn is_device_absent(&self) -> bool {
        matches!(
            self,
            CycleError::Acquisition(AcquisitionError::DeviceAbsent)
        )
    }

    /// Transport faults may be retried; a missing device or a bad profile may not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            CycleError::Open(_) | CycleError::Acquisition(AcquisitionError::Bus(_))
        )
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Open(error) => write!(f, "open failed: {error}"),
            CycleError::Acquisition(error) => write!(f, "{error}"),
        }
    }
}

/// Owns the transport opener, the timebase, and the telemetry ring.
pub struct AcquisitionOrchestrator<O, T, const TELEMETRY: usize = TELEMETRY_RING_CAPACITY>
where
    O: SessionOpener,
    T: Timebase,
{
    opener: O,
    timebase: T,
    config: OrchestratorConfig,
    telemetry: TelemetryRecorder<T::Instant, TELEMETRY>,
}

impl<O, T, const TELEMETRY: usize> AcquisitionOrchestrator<O, T, TELEMETRY>
where
    O: SessionOpener,
    T: Timebase,
{
    #[must_use]
    pub fn new(opener: O, timebase: T, config: OrchestratorConfig) -> Self {
        Self {
            opener,
            timebase,
            config,
            telemetry: TelemetryRecorder::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut OrchestratorConfig {
        &mut self.config
    }

    #[must_use]
    pub fn opener(&self) -> &O {
        &self.opener
    }

    pub fn opener_mut(&mut self) -> &mut O {
        &mut self.opener
    }

    #[must_use]
    pub fn timebase(&self) -> &T {
        &self.timebase
    }

    #[must_use]
    pub fn telemetry(&self) -> &TelemetryRecorder<T::Instant, TELEMETRY> {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut TelemetryRecorder<T::Instant, TELEMETRY> {
        &mut self.telemetry
    }

    /// Runs one acquisition cycle, retrying transport faults within the budget.
    ///
    /// # Errors
    ///
    /// The last attempt's [`CycleError`]. Both sessions are closed before it
    /// is returned.
    pub fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let budget = self.config.retry_budget.clamp(1, MAX_RETRY_BUDGET);
        let mut attempt = 1;

        loop {
            match self.attempt() {
                Ok(mut report) => {
                    report.attempts = attempt;
                    self.record(TelemetryEventKind::CycleComplete);
                    log_info!(
                        "cycle complete: {} decoded, attempt {}",
                        report.decoded_count(),
                        attempt
                    );
                    return Ok(report);
                }
                Err(error) if error.is_retryable() && attempt < budget => {
                    attempt += 1;
                    self.record(TelemetryEventKind::CycleRetry(attempt));
                    log_warn!("transport fault, retrying (attempt {})", attempt);
                }
                Err(error) => {
                    self.record(TelemetryEventKind::CycleAborted);
                    log_error!("cycle aborted after {} attempt(s)", attempt);
                    return Err(error);
                }
            }
        }
    }

    fn attempt(&mut self) -> Result<CycleReport, CycleError> {
        let data_channel = self.config.data_channel;
        let aux_channel = self.config.aux_channel;

        let mut data = self.opener.open(&data_channel).map_err(CycleError::Open)?;
        self.record(TelemetryEventKind::SessionOpened(data_channel.interface));

        let mut aux = match self.opener.open(&aux_channel) {
            Ok(session) => session,
            Err(error) => {
                self.release(&mut data, data_channel);
                return Err(CycleError::Open(error));
            }
        };
        self.record(TelemetryEventKind::SessionOpened(aux_channel.interface));

        let result = self.acquire(&mut data);

        self.release(&mut data, data_channel);
        self.release(&mut aux, aux_channel);
        result
    }

    fn acquire(&mut self, data: &mut O::Session) -> Result<CycleReport, CycleError> {
        let mut controller = AdcAcquisitionController::new(self.config.profile, data)
            .map_err(|error| CycleError::Acquisition(error.into()))?;

        let telemetry = &mut self.telemetry;
        let outcome = controller.run(&mut self.timebase, |state, timebase| {
            telemetry.record(TelemetryEventKind::StateEntered(state), timebase.now());
        });

        let report = match outcome {
            Ok(report) => report,
            Err(error) => {
                if matches!(error, AcquisitionError::Bus(_)) {
                    self.record(TelemetryEventKind::BusFault);
                }
                return Err(CycleError::Acquisition(error));
            }
        };

        let readings: ReadingBuffer = decode_channels(&report.samples).collect();
        for reading in readings.iter().filter(|reading| reading.is_missing()) {
            log_info!("channel {} has no thermistor", reading.index);
            self.record(TelemetryEventKind::ChannelMissing(reading.index));
        }

        Ok(CycleReport {
            readings,
            samples: report.samples,
            select_echo: report.select_echo,
            attempts: 1,
        })
    }

    fn release(&mut self, session: &mut O::Session, channel: ChannelConfig) {
        if session.is_open() {
            session.close();
        }
        self.record(TelemetryEventKind::SessionClosed(channel.interface));
    }

    fn record(&mut self, event: TelemetryEventKind) {
        let now = self.timebase.now();
        self.telemetry.record(event, now);
    }
}
