//! Single-cycle acquisition state machine for the ADC bank.
//!
//! The controller walks a fixed linear sequence: assert the presence pin and
//! probe, select the channel, read back the selection, configure, trigger a
//! conversion, wait for it, and read every channel in one frame. The only
//! branch is the probe acknowledgement. Any transport failure aborts the
//! cycle; the caller owns the sessions and closes them on every exit path.

use core::fmt;

use heapless::Vec;

use crate::bus::{AckPolicy, BusError, BusSession, Timebase};
use crate::device::{DeviceProfile, MAX_SAMPLE_BYTES, ProfileError};
use crate::logging::{log_debug, log_warn};
use crate::sequencer::{I2cSequencer, Presence};

/// Raw concatenated big-endian samples in channel order.
pub type SampleBuffer = Vec<u8, MAX_SAMPLE_BYTES>;

/// Phases of one acquisition cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionState {
    Idle,
    ProbeAck,
    SelectChannel,
    VerifySelect,
    Configure,
    TriggerConversion,
    WaitConversion,
    ReadResults,
    Done,
    Aborted,
}

impl AcquisitionState {
    /// Returns `true` when the state represents a terminal outcome.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, AcquisitionState::Done | AcquisitionState::Aborted)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::ProbeAck => "probe-ack",
            AcquisitionState::SelectChannel => "select-channel",
            AcquisitionState::VerifySelect => "verify-select",
            AcquisitionState::Configure => "configure",
            AcquisitionState::TriggerConversion => "trigger-conversion",
            AcquisitionState::WaitConversion => "wait-conversion",
            AcquisitionState::ReadResults => "read-results",
            AcquisitionState::Done => "done",
            AcquisitionState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reasons an acquisition cycle produced no samples.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionError {
    /// A transport primitive failed mid-cycle.
    Bus(BusError),
    /// The ADC did not acknowledge its read address.
    DeviceAbsent,
    /// The injected profile cannot fit the sample buffer.
    InvalidProfile(ProfileError),
}

impl From<BusError> for AcquisitionError {
    fn from(error: BusError) -> Self {
        AcquisitionError::Bus(error)
    }
}

impl From<ProfileError> for AcquisitionError {
    fn from(error: ProfileError) -> Self {
        AcquisitionError::InvalidProfile(error)
    }
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionError::Bus(error) => write!(f, "{error}"),
            AcquisitionError::DeviceAbsent => f.write_str("no acknowledgement from ADC"),
            AcquisitionError::InvalidProfile(error) => write!(f, "invalid profile: {error}"),
        }
    }
}

/// Bytes gathered by a completed cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcquisitionReport {
    pub samples: SampleBuffer,
    /// Byte read right after the probe acknowledged; discarded by the protocol.
    pub probe_echo: u8,
    /// Byte read back after channel selection. Reported, never validated.
    pub select_echo: u8,
}

/// Drives one acquisition cycle over a borrowed data session.
pub struct AdcAcquisitionController<'s, S: BusSession> {
    profile: DeviceProfile,
    sequencer: I2cSequencer<'s, S>,
    state: AcquisitionState,
    presence: Option<Presence>,
    samples: SampleBuffer,
    probe_echo: u8,
    select_echo: u8,
}

impl<'s, S: BusSession> AdcAcquisitionController<'s, S> {
    /// Creates a controller in [`AcquisitionState::Idle`].
    ///
    /// # Errors
    ///
    /// Rejects a profile that fails [`DeviceProfile::validate`] before any
    /// bus traffic.
    pub fn new(profile: DeviceProfile, session: &'s mut S) -> Result<Self, ProfileError> {
        profile.validate()?;
        Ok(Self {
            profile,
            sequencer: I2cSequencer::new(session),
            state: AcquisitionState::Idle,
            presence: None,
            samples: Vec::new(),
            probe_echo: 0,
            select_echo: 0,
        })
    }

    #[must_use]
    pub const fn state(&self) -> AcquisitionState {
        self.state
    }

    #[must_use]
    pub const fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Runs the entry action of the next state and transitions into it.
    ///
    /// Terminal states are sticky. A transport failure moves the controller
    /// to [`AcquisitionState::Aborted`] after a best-effort stop.
    ///
    /// # Errors
    ///
    /// [`AcquisitionError::Bus`] when the entry action of the next state fails.
    pub fn step<T: Timebase>(
        &mut self,
        timebase: &mut T,
    ) -> Result<AcquisitionState, AcquisitionError> {
        let Some(next) = self.next_state() else {
            return Ok(self.state);
        };

        match self.enter(next, timebase) {
            Ok(()) => {
                log_debug!("acquisition {:?} -> {:?}", self.state, next);
                self.state = next;
                Ok(next)
            }
            Err(error) => {
                log_warn!("acquisition failed entering {:?}", next);
                let _ = self.sequencer.end_transaction();
                self.state = AcquisitionState::Aborted;
                Err(error)
            }
        }
    }

    /// Steps until a terminal state, reporting every state entered along with
    /// the timebase so observers can timestamp transitions.
    ///
    /// # Errors
    ///
    /// [`AcquisitionError::DeviceAbsent`] when the probe is not acknowledged,
    /// [`AcquisitionError::Bus`] for any transport failure.
    pub fn run<T, F>(
        &mut self,
        timebase: &mut T,
        mut observer: F,
    ) -> Result<AcquisitionReport, AcquisitionError>
    where
        T: Timebase,
        F: FnMut(AcquisitionState, &T),
    {
        loop {
            let state = match self.step(timebase) {
                Ok(state) => state,
                Err(error) => {
                    observer(self.state, timebase);
                    return Err(error);
                }
            };
            observer(state, timebase);

            match state {
                AcquisitionState::Done => {
                    return Ok(AcquisitionReport {
                        samples: core::mem::take(&mut self.samples),
                        probe_echo: self.probe_echo,
                        select_echo: self.select_echo,
                    });
                }
                AcquisitionState::Aborted => return Err(AcquisitionError::DeviceAbsent),
                _ => {}
            }
        }
    }

    fn next_state(&self) -> Option<AcquisitionState> {
        let next = match self.state {
            AcquisitionState::Idle => AcquisitionState::ProbeAck,
            AcquisitionState::ProbeAck => match self.presence {
                Some(Presence::Present) => AcquisitionState::SelectChannel,
                _ => AcquisitionState::Aborted,
            },
            AcquisitionState::SelectChannel => AcquisitionState::VerifySelect,
            AcquisitionState::VerifySelect => AcquisitionState::Configure,
            AcquisitionState::Configure => AcquisitionState::TriggerConversion,
            AcquisitionState::TriggerConversion => AcquisitionState::WaitConversion,
            AcquisitionState::WaitConversion => AcquisitionState::ReadResults,
            AcquisitionState::ReadResults => AcquisitionState::Done,
            AcquisitionState::Done | AcquisitionState::Aborted => return None,
        };
        Some(next)
    }

    fn enter<T: Timebase>(
        &mut self,
        state: AcquisitionState,
        timebase: &mut T,
    ) -> Result<(), AcquisitionError> {
        let profile = self.profile;
        match state {
            AcquisitionState::Idle => {}
            AcquisitionState::ProbeAck => {
                self.sequencer.pin_high(profile.presence_pin)?;
                timebase.sleep(profile.power_settle);
                self.presence = Some(self.sequencer.probe_device(profile.read_address)?);
            }
            AcquisitionState::SelectChannel => {
                let mut echo = [0_u8; 1];
                self.sequencer.read_frame(&mut echo, AckPolicy::SendNacks)?;
                self.probe_echo = echo[0];
                self.sequencer.end_transaction()?;

                self.sequencer.write_frame(&profile.channel_select_frame())?;
                self.sequencer.end_transaction()?;
            }
            AcquisitionState::VerifySelect => {
                let mut echo = [0_u8; 1];
                self.sequencer.write_frame(&[profile.read_address])?;
                self.sequencer.read_frame(&mut echo, AckPolicy::SendNacks)?;
                self.sequencer.end_transaction()?;
                self.select_echo = echo[0];
                log_debug!("channel select echo {:#x}", echo[0]);
            }
            AcquisitionState::Configure => {
                self.sequencer.set_ack_policy(AckPolicy::SendAcks);
                self.sequencer.write_frame(&profile.configuration_frame())?;
            }
            AcquisitionState::TriggerConversion => {
                self.sequencer.write_frame(&profile.conversion_frame())?;
            }
            AcquisitionState::WaitConversion => {
                timebase.sleep(profile.conversion_settle);
            }
            AcquisitionState::ReadResults => {
                self.samples.clear();
                self.samples
                    .resize(profile.result_len(), 0)
                    .map_err(|_| ProfileError::TooManyChannels {
                        requested: profile.channel_count,
                    })?;
                self.sequencer
                    .read_frame(&mut self.samples, AckPolicy::SendAcks)?;
            }
            AcquisitionState::Done | AcquisitionState::Aborted => {
                self.sequencer.end_transaction()?;
            }
        }
        Ok(())
    }
}
