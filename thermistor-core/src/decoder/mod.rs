//! Piecewise-linear thermistor calibration.
//!
//! Raw samples are big-endian words. `0xFFFF` marks a channel without a
//! thermistor; anything else is masked to the ADC's 10-bit code and mapped
//! through seven linear regions anchored at descending breakpoints. Region
//! selection compares the integer code, never the interpolated value.

use core::fmt;

use crate::device::SAMPLE_WIDTH;

/// Raw word reported by a channel with no thermistor installed.
pub const NO_SENSOR_SENTINEL: u16 = 0xFFFF;
/// Resolution mask applied before interpolation.
pub const ADC_CODE_MASK: u16 = 0x03FF;
/// Reported for codes below the lowest breakpoint.
pub const SATURATION_TEMPERATURE: f32 = 105.0;
/// Number of calibration regions.
pub const REGION_COUNT: usize = 7;

/// One linear segment of the calibration curve.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationRegion {
    /// Lowest code belonging to the region (`x1`).
    pub breakpoint: u16,
    /// Temperature at the breakpoint (`y1`).
    pub reference: f32,
    /// Degrees per code step.
    pub slope: f32,
}

impl CalibrationRegion {
    #[must_use]
    pub const fn new(breakpoint: u16, reference: f32, slope: f32) -> Self {
        Self {
            breakpoint,
            reference,
            slope,
        }
    }

    /// Linear interpolation anchored at the breakpoint.
    #[must_use]
    pub fn interpolate(&self, code: u16) -> f32 {
        self.slope * (f32::from(code) - f32::from(self.breakpoint)) + self.reference
    }
}

/// Calibration table ordered from the highest breakpoint to the lowest.
pub const CALIBRATION_TABLE: [CalibrationRegion; REGION_COUNT] = [
    CalibrationRegion::new(631, 18.0, -0.073_47),
    CalibrationRegion::new(382, 38.0, -0.078_35),
    CalibrationRegion::new(248, 53.0, -0.108_95),
    CalibrationRegion::new(161, 67.0, -0.156_63),
    CalibrationRegion::new(111, 80.0, -0.252_63),
    CalibrationRegion::new(74, 94.0, -0.371_43),
    CalibrationRegion::new(54, 105.0, -0.526_32),
];

/// Decoded temperature in degrees Celsius.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Celsius(pub f32);

impl Celsius {
    #[must_use]
    pub const fn degrees(self) -> f32 {
        self.0
    }
}

impl fmt::Display for Celsius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The channel reported the no-thermistor sentinel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NoSensor;

impl fmt::Display for NoSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no thermistor installed")
    }
}

/// Selects the calibration region for a masked code.
///
/// Region 0 is open-ended above its breakpoint. Every other region spans
/// `breakpoint ..= previous breakpoint - 1`. Returns `None` below the lowest
/// breakpoint.
#[must_use]
pub fn region_for(code: u16) -> Option<usize> {
    if code >= CALIBRATION_TABLE[0].breakpoint {
        return Some(0);
    }

    CALIBRATION_TABLE
        .windows(2)
        .position(|pair| pair[1].breakpoint <= code && code < pair[0].breakpoint)
        .map(|index| index + 1)
}

/// Decodes one big-endian sample.
///
/// # Errors
///
/// [`NoSensor`] when the word is [`NO_SENSOR_SENTINEL`]; the check runs before
/// masking.
pub fn decode(raw: [u8; SAMPLE_WIDTH]) -> Result<Celsius, NoSensor> {
    let word = u16::from_be_bytes(raw);
    if word == NO_SENSOR_SENTINEL {
        return Err(NoSensor);
    }

    let code = word & ADC_CODE_MASK;
    let temperature = match region_for(code) {
        Some(index) => CALIBRATION_TABLE[index].interpolate(code),
        None => SATURATION_TEMPERATURE,
    };
    Ok(Celsius(temperature))
}

/// Outcome for one channel of a batch.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelReading {
    pub index: u8,
    pub outcome: Result<Celsius, NoSensor>,
}

impl ChannelReading {
    #[must_use]
    pub fn temperature(&self) -> Option<Celsius> {
        self.outcome.ok()
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.outcome.is_err()
    }
}

/// Decodes every whole sample in channel order. A trailing odd byte is ignored.
pub fn decode_channels(buffer: &[u8]) -> impl Iterator<Item = ChannelReading> + '_ {
    buffer
        .chunks_exact(SAMPLE_WIDTH)
        .zip(0_u8..)
        .map(|(chunk, index)| ChannelReading {
            index,
            outcome: decode([chunk[0], chunk[1]]),
        })
}
