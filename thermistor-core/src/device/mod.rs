//! Device profile for the thermistor ADC bank.
//!
//! Bus addresses, command bytes, and settle delays are fixed by the part and
//! the board wiring. They live in one immutable [`DeviceProfile`] that is
//! injected into the sequencer and controller instead of being scattered as
//! literals through the protocol code.

use core::fmt;
use core::time::Duration;

use crate::bus::GpioPin;

/// Largest channel count a single acquisition buffer is sized for.
pub const MAX_CHANNELS: usize = 16;
/// Bytes returned per channel (big-endian word).
pub const SAMPLE_WIDTH: usize = 2;
/// Capacity of the raw sample buffer.
pub const MAX_SAMPLE_BYTES: usize = MAX_CHANNELS * SAMPLE_WIDTH;

/// Delay after driving the presence pin before the ADC answers on the bus.
pub const POWER_SETTLE: Duration = Duration::from_millis(1);
/// Delay after the conversion trigger before results are valid.
pub const CONVERSION_SETTLE: Duration = Duration::from_millis(10);
/// Thermistors wired to the deployed bank.
pub const DEFAULT_CHANNEL_COUNT: u8 = 12;

/// Wire constants and timing for one ADC bank.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceProfile {
    pub read_address: u8,
    pub write_address: u8,
    pub read_register: u8,
    pub write_register: u8,
    pub channel_select: u8,
    pub configuration: [u8; 2],
    pub channel_count: u8,
    pub power_settle: Duration,
    pub conversion_settle: Duration,
    pub presence_pin: GpioPin,
}

/// Reason a [`DeviceProfile`] cannot drive an acquisition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProfileError {
    NoChannels,
    TooManyChannels { requested: u8 },
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::NoChannels => f.write_str("channel count must be at least 1"),
            ProfileError::TooManyChannels { requested } => {
                write!(f, "channel count {requested} exceeds {MAX_CHANNELS}")
            }
        }
    }
}

impl DeviceProfile {
    /// Returns a copy of the profile with a different channel count.
    #[must_use]
    pub const fn with_channel_count(mut self, channel_count: u8) -> Self {
        self.channel_count = channel_count;
        self
    }

    /// Checks the profile against the static buffer limits.
    ///
    /// # Errors
    ///
    /// [`ProfileError::NoChannels`] for a zero channel count and
    /// [`ProfileError::TooManyChannels`] above [`MAX_CHANNELS`].
    pub const fn validate(&self) -> Result<(), ProfileError> {
        if self.channel_count == 0 {
            return Err(ProfileError::NoChannels);
        }
        if self.channel_count as usize > MAX_CHANNELS {
            return Err(ProfileError::TooManyChannels {
                requested: self.channel_count,
            });
        }
        Ok(())
    }

    /// Write-address followed by the channel-select payload.
    #[must_use]
    pub const fn channel_select_frame(&self) -> [u8; 2] {
        [self.write_address, self.channel_select]
    }

    /// Write-register command followed by the setup and configuration bytes.
    #[must_use]
    pub const fn configuration_frame(&self) -> [u8; 3] {
        [
            self.write_register,
            self.configuration[0],
            self.configuration[1],
        ]
    }

    /// Read-register command; on this part it also starts a conversion.
    #[must_use]
    pub const fn conversion_frame(&self) -> [u8; 1] {
        [self.read_register]
    }

    /// Number of bytes returned by the batch read.
    #[must_use]
    pub const fn result_len(&self) -> usize {
        self.channel_count as usize * SAMPLE_WIDTH
    }
}

/// Profile for the deployed MAX11608-family bank.
pub const MAX11608_PROFILE: DeviceProfile = DeviceProfile {
    read_address: 0xE3,
    write_address: 0xE2,
    read_register: 0x6B,
    write_register: 0x6A,
    channel_select: 0x08,
    configuration: [0xD2, 0x0F],
    channel_count: DEFAULT_CHANNEL_COUNT,
    power_settle: POWER_SETTLE,
    conversion_settle: CONVERSION_SETTLE,
    presence_pin: GpioPin::L0,
};
