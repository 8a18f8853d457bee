//! Capability set consumed from the external bus transport.
//!
//! The transport (USB framing, clocking, pin multiplexing) is owned outside
//! this crate. Everything the acquisition logic needs from it is captured by
//! [`BusSession`], while [`SessionOpener`] stands in for the device-open call
//! and [`Timebase`] supplies the blocking settle delays. Host tooling and
//! tests provide concrete implementations.

use core::fmt;
use core::time::Duration;

use heapless::String;

/// Longest transport error message retained by [`BusError`].
pub const MAX_ERROR_MESSAGE: usize = 64;

/// Acknowledgement bit observed after an address or data byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ack {
    Ack,
    Nack,
}

impl Ack {
    /// Interprets the raw bus bit; only a low bit counts as an acknowledgement.
    #[must_use]
    pub const fn from_raw(bit: u8) -> Self {
        if bit == 0 { Ack::Ack } else { Ack::Nack }
    }

    #[must_use]
    pub const fn is_ack(self) -> bool {
        matches!(self, Ack::Ack)
    }
}

/// Acknowledgement the session emits after each byte it receives.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckPolicy {
    /// Acknowledge every byte; used for intermediate bytes of a multi-byte read.
    SendAcks,
    /// Refuse every byte; signals the final byte of a read.
    SendNacks,
}

/// General purpose pins exposed by the bridge, in transport index order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpioPin {
    L0,
    L1,
    L2,
    L3,
    H0,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    H7,
}

impl GpioPin {
    /// Deterministic index understood by the transport.
    #[must_use]
    pub const fn as_index(self) -> u8 {
        match self {
            GpioPin::L0 => 0,
            GpioPin::L1 => 1,
            GpioPin::L2 => 2,
            GpioPin::L3 => 3,
            GpioPin::H0 => 4,
            GpioPin::H1 => 5,
            GpioPin::H2 => 6,
            GpioPin::H3 => 7,
            GpioPin::H4 => 8,
            GpioPin::H5 => 9,
            GpioPin::H6 => 10,
            GpioPin::H7 => 11,
        }
    }

    /// Attempts to construct a [`GpioPin`] from a raw transport index.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(GpioPin::L0),
            1 => Some(GpioPin::L1),
            2 => Some(GpioPin::L2),
            3 => Some(GpioPin::L3),
            4 => Some(GpioPin::H0),
            5 => Some(GpioPin::H1),
            6 => Some(GpioPin::H2),
            7 => Some(GpioPin::H3),
            8 => Some(GpioPin::H4),
            9 => Some(GpioPin::H5),
            10 => Some(GpioPin::H6),
            11 => Some(GpioPin::H7),
            _ => None,
        }
    }
}

impl fmt::Display for GpioPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.as_index();
        if index < 4 {
            write!(f, "GPIOL{index}")
        } else {
            write!(f, "GPIOH{}", index - 4)
        }
    }
}

/// Failure reported by any transport primitive.
///
/// The message is whatever the transport reported, truncated to
/// [`MAX_ERROR_MESSAGE`] bytes on a character boundary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BusError {
    message: String<MAX_ERROR_MESSAGE>,
}

impl BusError {
    #[must_use]
    pub fn new(message: &str) -> Self {
        let mut stored = String::new();
        for ch in message.chars() {
            if stored.push(ch).is_err() {
                break;
            }
        }
        Self { message: stored }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus error: {}", self.message)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BusError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "bus error: {=str}", self.message.as_str());
    }
}

/// Stateful handle to one opened master-bus channel.
///
/// Implementations block until the transport completes. A session is not
/// safe for concurrent use; callers that need two independent lines hold two
/// sessions.
pub trait BusSession {
    /// Issues a start condition, or a repeated start while mid-transaction.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    fn start(&mut self) -> Result<(), BusError>;

    /// Issues a stop condition.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    fn stop(&mut self) -> Result<(), BusError>;

    /// Clocks out every byte as one unbroken sequence.
    ///
    /// # Errors
    ///
    /// Returns the transport failure; the acknowledgement is not a failure.
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError>;

    /// Clocks in exactly `buffer.len()` bytes.
    ///
    /// # Errors
    ///
    /// Returns the transport failure; `buffer` contents are then unspecified.
    fn read(&mut self, buffer: &mut [u8]) -> Result<(), BusError>;

    /// Returns the acknowledgement bit observed after the last written byte.
    fn ack(&self) -> Ack;

    /// Acknowledge every subsequently received byte.
    fn send_acks(&mut self);

    /// Refuse every subsequently received byte.
    fn send_nacks(&mut self);

    /// Drives the given pin high.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    fn pin_high(&mut self, pin: GpioPin) -> Result<(), BusError>;

    /// Releases the underlying transport. Called exactly once per session.
    fn close(&mut self);

    /// Returns `true` until [`close`](Self::close) has been called.
    fn is_open(&self) -> bool;
}

/// Serial protocol the bridge channel is opened in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusMode {
    I2c,
}

/// Standard bridge clock rates.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frequency {
    OneHundredKhz,
    FourHundredKhz,
    OneMhz,
    TwoMhz,
    FiveMhz,
    SixMhz,
    TenMhz,
    TwelveMhz,
    FifteenMhz,
    ThirtyMhz,
    SixtyMhz,
}

impl Frequency {
    #[must_use]
    pub const fn as_hz(self) -> u32 {
        match self {
            Frequency::OneHundredKhz => 100_000,
            Frequency::FourHundredKhz => 400_000,
            Frequency::OneMhz => 1_000_000,
            Frequency::TwoMhz => 2_000_000,
            Frequency::FiveMhz => 5_000_000,
            Frequency::SixMhz => 6_000_000,
            Frequency::TenMhz => 10_000_000,
            Frequency::TwelveMhz => 12_000_000,
            Frequency::FifteenMhz => 15_000_000,
            Frequency::ThirtyMhz => 30_000_000,
            Frequency::SixtyMhz => 60_000_000,
        }
    }
}

/// Order in which bits are clocked on the wire.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// Physical interface on a multi-channel bridge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Interface {
    Any,
    A,
    B,
    C,
    D,
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Interface::Any => "any",
            Interface::A => "A",
            Interface::B => "B",
            Interface::C => "C",
            Interface::D => "D",
        };
        f.write_str(label)
    }
}

/// USB vendor id of the dual-channel bridge.
pub const BRIDGE_VENDOR_ID: u16 = 0x0403;
/// USB product id of the dual-channel bridge.
pub const BRIDGE_PRODUCT_ID: u16 = 0x6011;

/// Parameters handed to the transport when a session is opened.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub mode: BusMode,
    pub frequency: Frequency,
    pub bit_order: BitOrder,
    pub interface: Interface,
}

impl ChannelConfig {
    /// I2C at 100 kHz, MSB first, on the requested interface.
    #[must_use]
    pub const fn i2c(interface: Interface) -> Self {
        Self {
            vendor_id: BRIDGE_VENDOR_ID,
            product_id: BRIDGE_PRODUCT_ID,
            mode: BusMode::I2c,
            frequency: Frequency::OneHundredKhz,
            bit_order: BitOrder::MsbFirst,
            interface,
        }
    }

    /// Channel carrying the ADC traffic.
    #[must_use]
    pub const fn data_default() -> Self {
        Self::i2c(Interface::A)
    }

    /// Channel held open for the auxiliary line.
    #[must_use]
    pub const fn aux_default() -> Self {
        Self::i2c(Interface::B)
    }
}

/// Opens sessions on the external transport.
pub trait SessionOpener {
    type Session: BusSession;

    /// Opens one channel described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when no matching device exists or it is busy.
    fn open(&mut self, config: &ChannelConfig) -> Result<Self::Session, BusError>;
}

/// Trait implemented by monotonic instants used for telemetry tracking.
pub trait TimebaseInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Monotonic clock plus the blocking sleep used for settle delays.
pub trait Timebase {
    type Instant: TimebaseInstant;

    fn now(&self) -> Self::Instant;

    /// Blocks the calling thread for at least `duration`.
    fn sleep(&mut self, duration: Duration);
}
