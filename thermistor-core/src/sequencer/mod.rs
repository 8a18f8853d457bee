//! Address-phase and data-phase framing on top of a [`BusSession`].
//!
//! The sequencer owns no retry policy. Every primitive failure is surfaced as
//! a [`BusError`] and the caller decides whether the cycle is lost.

use crate::bus::{AckPolicy, BusError, BusSession, GpioPin};
use crate::logging::log_debug;

/// Result of addressing a device.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Presence {
    Present,
    Absent,
}

/// Whether a start condition is currently outstanding.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Framing {
    Idle,
    Open,
}

/// Composes session primitives into framed transactions.
pub struct I2cSequencer<'s, S: BusSession> {
    session: &'s mut S,
    framing: Framing,
}

impl<'s, S: BusSession> I2cSequencer<'s, S> {
    #[must_use]
    pub fn new(session: &'s mut S) -> Self {
        Self {
            session,
            framing: Framing::Idle,
        }
    }

    #[must_use]
    pub const fn framing(&self) -> Framing {
        self.framing
    }

    /// Addresses the device and samples the acknowledgement.
    ///
    /// On [`Presence::Present`] the transaction is left open so the caller can
    /// continue reading; on [`Presence::Absent`] the bus is stopped.
    ///
    /// # Errors
    ///
    /// A missing acknowledgement is [`Presence::Absent`], not an error. Only
    /// transport failures are returned.
    pub fn probe_device(&mut self, address: u8) -> Result<Presence, BusError> {
        self.start()?;
        self.session.write(&[address])?;

        if self.session.ack().is_ack() {
            log_debug!("probe {:#x}: ack", address);
            Ok(Presence::Present)
        } else {
            log_debug!("probe {:#x}: nack", address);
            self.end_transaction()?;
            Ok(Presence::Absent)
        }
    }

    /// Starts (or repeat-starts) and writes `bytes` without stopping.
    ///
    /// # Errors
    ///
    /// Returns the failing start or write.
    pub fn write_frame(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.start()?;
        self.session.write(bytes)
    }

    /// Sets the acknowledgement policy and reads `buffer.len()` bytes.
    ///
    /// # Errors
    ///
    /// Returns the transport failure from the read.
    pub fn read_frame(&mut self, buffer: &mut [u8], policy: AckPolicy) -> Result<(), BusError> {
        self.set_ack_policy(policy);
        self.session.read(buffer)
    }

    pub fn set_ack_policy(&mut self, policy: AckPolicy) {
        match policy {
            AckPolicy::SendAcks => self.session.send_acks(),
            AckPolicy::SendNacks => self.session.send_nacks(),
        }
    }

    /// Issues a stop if a transaction is open; otherwise does nothing.
    ///
    /// # Errors
    ///
    /// Returns the failing stop. Framing is reset to idle either way.
    pub fn end_transaction(&mut self) -> Result<(), BusError> {
        if self.framing == Framing::Open {
            self.framing = Framing::Idle;
            self.session.stop()?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the transport failure.
    pub fn pin_high(&mut self, pin: GpioPin) -> Result<(), BusError> {
        self.session.pin_high(pin)
    }

    fn start(&mut self) -> Result<(), BusError> {
        if self.framing == Framing::Open {
            log_debug!("repeated start");
        }
        self.session.start()?;
        self.framing = Framing::Open;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Ack;
    use heapless::Vec;

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    enum Op {
        Start,
        Stop,
        Write(u8, usize),
        Read(usize),
        SendAcks,
        SendNacks,
        PinHigh(GpioPin),
    }

    struct RecordingSession {
        ops: Vec<Op, 32>,
        ack: Ack,
        fail_writes: bool,
    }

    impl RecordingSession {
        fn new(ack: Ack) -> Self {
            Self {
                ops: Vec::new(),
                ack,
                fail_writes: false,
            }
        }

        fn push(&mut self, op: Op) {
            self.ops.push(op).expect("op log full");
        }
    }

    impl BusSession for RecordingSession {
        fn start(&mut self) -> Result<(), BusError> {
            self.push(Op::Start);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), BusError> {
            self.push(Op::Stop);
            Ok(())
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
            if self.fail_writes {
                return Err(BusError::new("write failed"));
            }
            self.push(Op::Write(bytes[0], bytes.len()));
            Ok(())
        }

        fn read(&mut self, buffer: &mut [u8]) -> Result<(), BusError> {
            buffer.fill(0xA5);
            self.push(Op::Read(buffer.len()));
            Ok(())
        }

        fn ack(&self) -> Ack {
            self.ack
        }

        fn send_acks(&mut self) {
            self.push(Op::SendAcks);
        }

        fn send_nacks(&mut self) {
            self.push(Op::SendNacks);
        }

        fn pin_high(&mut self, pin: GpioPin) -> Result<(), BusError> {
            self.push(Op::PinHigh(pin));
            Ok(())
        }

        fn close(&mut self) {}

        fn is_open(&self) -> bool {
            true
        }
    }

    #[test]
    fn probe_leaves_transaction_open_when_acknowledged() {
        let mut session = RecordingSession::new(Ack::Ack);
        let mut sequencer = I2cSequencer::new(&mut session);

        assert_eq!(sequencer.probe_device(0xE3), Ok(Presence::Present));
        assert_eq!(sequencer.framing(), Framing::Open);
        assert_eq!(session.ops.as_slice(), &[Op::Start, Op::Write(0xE3, 1)]);
    }

    #[test]
    fn probe_stops_bus_when_not_acknowledged() {
        let mut session = RecordingSession::new(Ack::Nack);
        let mut sequencer = I2cSequencer::new(&mut session);

        assert_eq!(sequencer.probe_device(0xE3), Ok(Presence::Absent));
        assert_eq!(sequencer.framing(), Framing::Idle);
        assert_eq!(
            session.ops.as_slice(),
            &[Op::Start, Op::Write(0xE3, 1), Op::Stop]
        );
    }

    #[test]
    fn end_transaction_is_a_no_op_while_idle() {
        let mut session = RecordingSession::new(Ack::Ack);
        let mut sequencer = I2cSequencer::new(&mut session);

        sequencer.end_transaction().expect("idle stop");
        sequencer.write_frame(&[0x6A, 0xD2, 0x0F]).expect("write");
        sequencer.write_frame(&[0x6B]).expect("repeated start");
        sequencer.end_transaction().expect("stop");
        sequencer.end_transaction().expect("second stop");

        assert_eq!(
            session.ops.as_slice(),
            &[
                Op::Start,
                Op::Write(0x6A, 3),
                Op::Start,
                Op::Write(0x6B, 1),
                Op::Stop,
            ]
        );
    }

    #[test]
    fn read_frame_applies_policy_before_reading() {
        let mut session = RecordingSession::new(Ack::Ack);
        let mut sequencer = I2cSequencer::new(&mut session);
        let mut buffer = [0_u8; 4];

        sequencer
            .read_frame(&mut buffer, AckPolicy::SendNacks)
            .expect("read");
        assert_eq!(buffer, [0xA5; 4]);
        assert_eq!(session.ops.as_slice(), &[Op::SendNacks, Op::Read(4)]);
    }

    #[test]
    fn write_failures_surface_as_bus_errors() {
        let mut session = RecordingSession::new(Ack::Ack);
        session.fail_writes = true;
        let mut sequencer = I2cSequencer::new(&mut session);

        let error = sequencer.write_frame(&[0xE2, 0x08]).unwrap_err();
        assert_eq!(error.message(), "write failed");
    }

    #[test]
    fn pin_and_policy_pass_through_without_framing() {
        let mut session = RecordingSession::new(Ack::Ack);
        let mut sequencer = I2cSequencer::new(&mut session);

        sequencer.pin_high(GpioPin::L0).expect("pin");
        sequencer.set_ack_policy(AckPolicy::SendAcks);
        assert_eq!(sequencer.framing(), Framing::Idle);
        assert_eq!(
            session.ops.as_slice(),
            &[Op::PinHigh(GpioPin::L0), Op::SendAcks]
        );
    }
}
