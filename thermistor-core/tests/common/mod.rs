#![allow(dead_code)]

use core::time::Duration;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use thermistor_core::bus::{
    Ack, BusError, BusSession, ChannelConfig, GpioPin, Interface, SessionOpener, Timebase,
    TimebaseInstant,
};

/// One primitive observed on the wire, tagged by the interface it hit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Start,
    Stop,
    Write(Vec<u8>),
    Read(usize),
    SendAcks,
    SendNacks,
    PinHigh(GpioPin),
    Close,
    /// A settle delay taken by a wired [`MockTimebase`].
    Sleep(Duration),
}

#[derive(Default)]
pub struct Wire {
    pub calls: Vec<(Interface, Call)>,
    pub ack: Option<Ack>,
    reads: VecDeque<Vec<u8>>,
    fail_write: Option<(u8, u32)>,
    fail_open: Option<Interface>,
}

/// Bus state shared between the test body and every session it hands out.
#[derive(Clone, Default)]
pub struct SharedWire(Rc<RefCell<Wire>>);

impl SharedWire {
    pub fn acknowledging() -> Self {
        let wire = Self::default();
        wire.0.borrow_mut().ack = Some(Ack::Ack);
        wire
    }

    pub fn silent() -> Self {
        let wire = Self::default();
        wire.0.borrow_mut().ack = Some(Ack::Nack);
        wire
    }

    /// Queues the bytes returned by the next read, in order.
    pub fn queue_read(&self, bytes: &[u8]) {
        self.0.borrow_mut().reads.push_back(bytes.to_vec());
    }

    /// Queues the probe echo, the select echo, and one sample frame.
    pub fn queue_cycle(&self, words: &[u16]) {
        self.queue_read(&[0x00]);
        self.queue_read(&[0x08]);
        let samples: Vec<u8> = words.iter().flat_map(|word| word.to_be_bytes()).collect();
        self.queue_read(&samples);
    }

    /// Fails the next `times` writes whose first byte is `first`.
    pub fn fail_writes_starting_with(&self, first: u8, times: u32) {
        self.0.borrow_mut().fail_write = Some((first, times));
    }

    pub fn fail_open(&self, interface: Interface) {
        self.0.borrow_mut().fail_open = Some(interface);
    }

    pub fn calls(&self) -> Vec<(Interface, Call)> {
        self.0.borrow().calls.clone()
    }

    pub fn calls_on(&self, interface: Interface) -> Vec<Call> {
        self.0
            .borrow()
            .calls
            .iter()
            .filter(|(on, _)| *on == interface)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn count(&self, interface: Interface, call: &Call) -> usize {
        self.calls_on(interface)
            .iter()
            .filter(|seen| *seen == call)
            .count()
    }

    pub fn session(&self, interface: Interface) -> ScriptedSession {
        ScriptedSession {
            interface,
            wire: self.clone(),
            open: true,
        }
    }

    fn push(&self, interface: Interface, call: Call) {
        self.0.borrow_mut().calls.push((interface, call));
    }
}

pub struct ScriptedSession {
    interface: Interface,
    wire: SharedWire,
    open: bool,
}

impl BusSession for ScriptedSession {
    fn start(&mut self) -> Result<(), BusError> {
        self.wire.push(self.interface, Call::Start);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BusError> {
        self.wire.push(self.interface, Call::Stop);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        {
            let mut wire = self.wire.0.borrow_mut();
            if let Some((first, remaining)) = wire.fail_write.as_mut() {
                if bytes.first() == Some(&*first) && *remaining > 0 {
                    *remaining -= 1;
                    return Err(BusError::new("write timed out"));
                }
            }
        }
        self.wire.push(self.interface, Call::Write(bytes.to_vec()));
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), BusError> {
        let scripted = self.wire.0.borrow_mut().reads.pop_front().unwrap_or_default();
        buffer.fill(0);
        for (slot, byte) in buffer.iter_mut().zip(scripted) {
            *slot = byte;
        }
        self.wire.push(self.interface, Call::Read(buffer.len()));
        Ok(())
    }

    fn ack(&self) -> Ack {
        self.wire.0.borrow().ack.unwrap_or(Ack::Nack)
    }

    fn send_acks(&mut self) {
        self.wire.push(self.interface, Call::SendAcks);
    }

    fn send_nacks(&mut self) {
        self.wire.push(self.interface, Call::SendNacks);
    }

    fn pin_high(&mut self, pin: GpioPin) -> Result<(), BusError> {
        self.wire.push(self.interface, Call::PinHigh(pin));
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.wire.push(self.interface, Call::Close);
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

pub struct ScriptedOpener {
    pub wire: SharedWire,
}

impl SessionOpener for ScriptedOpener {
    type Session = ScriptedSession;

    fn open(&mut self, config: &ChannelConfig) -> Result<Self::Session, BusError> {
        if self.wire.0.borrow().fail_open == Some(config.interface) {
            return Err(BusError::new("device busy"));
        }
        Ok(self.wire.session(config.interface))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MockInstant(u64);

impl MockInstant {
    pub const fn micros(value: u64) -> Self {
        Self(value)
    }
}

impl TimebaseInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Virtual clock: sleeping advances time instantly and is logged.
///
/// A wired timebase also records each sleep on the wire so delays can be
/// asserted in order with the bus primitives around them.
#[derive(Default)]
pub struct MockTimebase {
    now_us: u64,
    pub sleeps: Vec<Duration>,
    wire: Option<(SharedWire, Interface)>,
}

impl MockTimebase {
    pub fn wired(wire: &SharedWire, interface: Interface) -> Self {
        Self {
            wire: Some((wire.clone(), interface)),
            ..Self::default()
        }
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps.iter().sum()
    }
}

impl Timebase for MockTimebase {
    type Instant = MockInstant;

    fn now(&self) -> Self::Instant {
        MockInstant(self.now_us)
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
        if let Some((wire, interface)) = &self.wire {
            wire.push(*interface, Call::Sleep(duration));
        }
        self.now_us += u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    }
}
