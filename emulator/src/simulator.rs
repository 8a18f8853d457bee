//! Simulated ADC bank wired behind the bus capability traits.
//!
//! One [`SimulatedAdc`] is shared by every session the [`SimulatedOpener`]
//! hands out, the way both interfaces of the bridge reach the same board.
//! The model answers its read address only once the presence pin is high
//! and only returns samples after a configured conversion was triggered.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};
use thermistor_core::bus::{
    Ack, BRIDGE_PRODUCT_ID, BRIDGE_VENDOR_ID, BusError, BusSession, ChannelConfig, GpioPin,
    Interface, SessionOpener, Timebase, TimebaseInstant,
};
use thermistor_core::decoder::NO_SENSOR_SENTINEL;
use thermistor_core::device::{DeviceProfile, MAX_CHANNELS, MAX11608_PROFILE};
use thermistor_core::repl::grammar::FixtureKind;

/// Raw words reported by a fully populated bank, one per channel.
const POPULATED_WORDS: [u16; MAX_CHANNELS] = [
    0x0277, 0x0230, 0x01E0, 0x0190, 0x017E, 0x0150, 0x0120, 0x0100, 0x00F8, 0x00C0, 0x00A1,
    0x0080, 0x006F, 0x0060, 0x004A, 0x0036,
];

/// Channels that read the no-sensor sentinel in the partial fixture.
pub const PARTIAL_MISSING: [usize; 2] = [4, 9];

/// What the last addressed frame selected for subsequent reads.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ReadTarget {
    Nothing,
    SelectEcho,
    Results,
}

pub struct SimulatedAdc {
    fixture: FixtureKind,
    profile: DeviceProfile,
    powered: bool,
    awaiting_address: bool,
    target: ReadTarget,
    selected: u8,
    configured: bool,
    converted: bool,
    last_ack: Ack,
    trace: Vec<String>,
}

impl SimulatedAdc {
    pub fn new(fixture: FixtureKind) -> Self {
        Self {
            fixture,
            profile: MAX11608_PROFILE,
            powered: false,
            awaiting_address: false,
            target: ReadTarget::Nothing,
            selected: 0,
            configured: false,
            converted: false,
            last_ack: Ack::Nack,
            trace: Vec::new(),
        }
    }

    pub fn fixture(&self) -> FixtureKind {
        self.fixture
    }

    pub fn set_fixture(&mut self, fixture: FixtureKind) {
        self.fixture = fixture;
        self.power_down();
    }

    /// Raw word the bank reports for `channel` under the current fixture.
    pub fn sample_word(&self, channel: usize) -> u16 {
        if self.fixture == FixtureKind::Partial && PARTIAL_MISSING.contains(&channel) {
            NO_SENSOR_SENTINEL
        } else {
            POPULATED_WORDS[channel % MAX_CHANNELS]
        }
    }

    fn power_down(&mut self) {
        self.powered = false;
        self.awaiting_address = false;
        self.target = ReadTarget::Nothing;
        self.selected = 0;
        self.configured = false;
        self.converted = false;
        self.last_ack = Ack::Nack;
    }

    fn note(&mut self, interface: Interface, line: &str) {
        trace!("{interface}: {line}");
        self.trace.push(format!("{interface} {line}"));
    }

    fn start(&mut self, interface: Interface) {
        self.awaiting_address = true;
        self.note(interface, "start");
    }

    fn stop(&mut self, interface: Interface) {
        self.awaiting_address = false;
        self.target = ReadTarget::Nothing;
        self.note(interface, "stop");
    }

    fn write(&mut self, interface: Interface, bytes: &[u8]) -> Result<(), BusError> {
        self.note(interface, &format!("write {}", hex(bytes)));
        let Some((&first, rest)) = bytes.split_first() else {
            return Ok(());
        };

        if !self.awaiting_address {
            self.last_ack = Ack::Ack;
            return Ok(());
        }
        self.awaiting_address = false;

        if self.fixture == FixtureKind::Faulty && first == self.profile.write_register {
            self.note(interface, "write timed out");
            return Err(BusError::new("simulated write timeout"));
        }

        let responsive = self.powered && self.fixture != FixtureKind::Absent;
        let known = [
            self.profile.read_address,
            self.profile.write_address,
            self.profile.write_register,
            self.profile.read_register,
        ]
        .contains(&first);
        if !responsive || !known {
            self.last_ack = Ack::Nack;
            self.target = ReadTarget::Nothing;
            self.note(interface, "nack");
            return Ok(());
        }

        self.last_ack = Ack::Ack;
        self.target = ReadTarget::Nothing;
        if first == self.profile.read_address {
            self.target = ReadTarget::SelectEcho;
        } else if first == self.profile.write_address {
            if let Some(&channel) = rest.first() {
                self.selected = channel;
            }
        } else if first == self.profile.write_register {
            self.configured = rest == self.profile.configuration;
        } else if self.configured {
            self.converted = true;
            self.target = ReadTarget::Results;
        }
        Ok(())
    }

    fn read(&mut self, interface: Interface, buffer: &mut [u8]) {
        match self.target {
            ReadTarget::Nothing => buffer.fill(0xFF),
            ReadTarget::SelectEcho => buffer.fill(self.selected),
            ReadTarget::Results if self.converted => {
                for (channel, chunk) in buffer.chunks_mut(2).enumerate() {
                    let word = self.sample_word(channel).to_be_bytes();
                    chunk.copy_from_slice(&word[..chunk.len()]);
                }
            }
            ReadTarget::Results => buffer.fill(0xFF),
        }
        self.note(interface, &format!("read {} -> {}", buffer.len(), hex(buffer)));
    }

    fn pin_high(&mut self, interface: Interface, pin: GpioPin) {
        if pin == self.profile.presence_pin {
            self.powered = true;
        }
        self.note(interface, &format!("pin-high {pin}"));
    }

    /// Returns and clears the bus operations recorded since the last call.
    pub fn drain_trace(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct SimulatedSession {
    interface: Interface,
    adc: Rc<RefCell<SimulatedAdc>>,
    open: bool,
}

impl SimulatedSession {
    fn ensure_open(&self) -> Result<(), BusError> {
        if self.open {
            Ok(())
        } else {
            Err(BusError::new("session already closed"))
        }
    }
}

impl BusSession for SimulatedSession {
    fn start(&mut self) -> Result<(), BusError> {
        self.ensure_open()?;
        self.adc.borrow_mut().start(self.interface);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BusError> {
        self.ensure_open()?;
        self.adc.borrow_mut().stop(self.interface);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.ensure_open()?;
        self.adc.borrow_mut().write(self.interface, bytes)
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), BusError> {
        self.ensure_open()?;
        self.adc.borrow_mut().read(self.interface, buffer);
        Ok(())
    }

    fn ack(&self) -> Ack {
        self.adc.borrow().last_ack
    }

    fn send_acks(&mut self) {
        self.adc
            .borrow_mut()
            .note(self.interface, "send-acks");
    }

    fn send_nacks(&mut self) {
        self.adc
            .borrow_mut()
            .note(self.interface, "send-nacks");
    }

    fn pin_high(&mut self, pin: GpioPin) -> Result<(), BusError> {
        self.ensure_open()?;
        self.adc.borrow_mut().pin_high(self.interface, pin);
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let mut adc = self.adc.borrow_mut();
        if self.interface == Interface::A {
            adc.power_down();
        }
        adc.note(self.interface, "close");
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Opens sessions on the simulated bridge.
pub struct SimulatedOpener {
    adc: Rc<RefCell<SimulatedAdc>>,
}

impl SimulatedOpener {
    pub fn new(fixture: FixtureKind) -> Self {
        Self {
            adc: Rc::new(RefCell::new(SimulatedAdc::new(fixture))),
        }
    }

    pub fn fixture(&self) -> FixtureKind {
        self.adc.borrow().fixture()
    }

    pub fn set_fixture(&mut self, fixture: FixtureKind) {
        debug!("fixture -> {fixture}");
        self.adc.borrow_mut().set_fixture(fixture);
    }

    pub fn drain_trace(&mut self) -> Vec<String> {
        self.adc.borrow_mut().drain_trace()
    }
}

impl SessionOpener for SimulatedOpener {
    type Session = SimulatedSession;

    fn open(&mut self, config: &ChannelConfig) -> Result<Self::Session, BusError> {
        if config.vendor_id != BRIDGE_VENDOR_ID || config.product_id != BRIDGE_PRODUCT_ID {
            return Err(BusError::new("no bridge with that vendor/product id"));
        }

        debug!(
            "open interface {} at {} Hz",
            config.interface,
            config.frequency.as_hz()
        );
        self.adc
            .borrow_mut()
            .note(config.interface, "open");
        Ok(SimulatedSession {
            interface: config.interface,
            adc: Rc::clone(&self.adc),
            open: true,
        })
    }
}

/// Host monotonic instant.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HostInstant(Instant);

impl TimebaseInstant for HostInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

/// Wall-clock timebase that blocks the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostTimebase;

impl Timebase for HostTimebase {
    type Instant = HostInstant;

    fn now(&self) -> Self::Instant {
        HostInstant(Instant::now())
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermistor_core::orchestrator::{AcquisitionOrchestrator, OrchestratorConfig};

    fn run(fixture: FixtureKind) -> AcquisitionOrchestrator<SimulatedOpener, HostTimebase> {
        AcquisitionOrchestrator::new(
            SimulatedOpener::new(fixture),
            HostTimebase,
            OrchestratorConfig::default(),
        )
    }

    #[test]
    fn populated_bank_reports_every_channel() {
        let mut orchestrator = run(FixtureKind::Populated);
        let report = orchestrator.run_cycle().expect("populated bank");

        assert_eq!(report.decoded_count(), 12);
        assert_eq!(report.select_echo, 0x08);
        assert_eq!(&report.samples[..2], &[0x02, 0x77]);
    }

    #[test]
    fn partial_bank_reports_missing_channels() {
        let mut orchestrator = run(FixtureKind::Partial);
        let report = orchestrator.run_cycle().expect("partial bank");

        let missing: Vec<u8> = report.missing_channels().collect();
        assert_eq!(missing, vec![4, 9]);
        assert_eq!(report.decoded_count(), 10);
    }

    #[test]
    fn absent_bank_never_acknowledges() {
        let mut orchestrator = run(FixtureKind::Absent);
        let error = orchestrator.run_cycle().expect_err("absent bank");
        assert!(error.is_device_absent());
    }

    #[test]
    fn faulty_bank_fails_configuration() {
        let mut orchestrator = run(FixtureKind::Faulty);
        let error = orchestrator.run_cycle().expect_err("faulty bank");
        assert!(error.is_retryable());
    }

    #[test]
    fn probe_without_presence_pin_is_not_acknowledged() {
        let mut opener = SimulatedOpener::new(FixtureKind::Populated);
        let mut session = opener
            .open(&ChannelConfig::data_default())
            .expect("open data");

        session.start().expect("start");
        session.write(&[0xE3]).expect("write");
        assert_eq!(session.ack(), Ack::Nack);

        session.pin_high(GpioPin::L0).expect("pin");
        session.start().expect("start");
        session.write(&[0xE3]).expect("write");
        assert_eq!(session.ack(), Ack::Ack);
    }

    #[test]
    fn closed_sessions_reject_traffic() {
        let mut opener = SimulatedOpener::new(FixtureKind::Populated);
        let mut session = opener
            .open(&ChannelConfig::aux_default())
            .expect("open aux");
        session.close();
        assert!(!session.is_open());
        assert!(session.start().is_err());
        assert_eq!(
            opener.drain_trace(),
            vec!["B open".to_string(), "B close".to_string()]
        );
    }
}
