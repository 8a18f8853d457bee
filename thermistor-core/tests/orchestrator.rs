mod common;

use common::{Call, MockTimebase, ScriptedOpener, SharedWire};
use thermistor_core::acquisition::{AcquisitionError, AcquisitionState};
use thermistor_core::bus::{GpioPin, Interface};
use thermistor_core::decoder::{Celsius, NoSensor};
use thermistor_core::orchestrator::{AcquisitionOrchestrator, CycleError, OrchestratorConfig};
use thermistor_core::telemetry::TelemetryEventKind;

type TestOrchestrator = AcquisitionOrchestrator<ScriptedOpener, MockTimebase>;

fn build_orchestrator(wire: &SharedWire, retry_budget: u8) -> TestOrchestrator {
    let config = OrchestratorConfig {
        retry_budget,
        ..OrchestratorConfig::default()
    };
    AcquisitionOrchestrator::new(
        ScriptedOpener { wire: wire.clone() },
        MockTimebase::default(),
        config,
    )
}

fn events(orchestrator: &TestOrchestrator) -> Vec<TelemetryEventKind> {
    orchestrator
        .telemetry()
        .oldest_first()
        .map(|record| record.event)
        .collect()
}

fn bank_with_missing_channel(missing: usize) -> [u16; 12] {
    let mut words = [0x0100; 12];
    words[0] = 0x0277;
    words[missing] = 0xFFFF;
    words
}

#[test]
fn populated_bank_decodes_every_channel() {
    let wire = SharedWire::acknowledging();
    wire.queue_cycle(&bank_with_missing_channel(7));
    let mut orchestrator = build_orchestrator(&wire, 1);

    let report = orchestrator.run_cycle().expect("cycle should complete");

    assert_eq!(report.attempts, 1);
    assert_eq!(report.readings.len(), 12);
    assert_eq!(report.decoded_count(), 11);
    assert_eq!(report.missing_channels().collect::<Vec<_>>(), vec![7]);
    assert_eq!(report.readings[0].temperature(), Some(Celsius(18.0)));
    assert_eq!(report.readings[7].outcome, Err(NoSensor));

    let region_two = report.readings[1]
        .temperature()
        .expect("channel 1 populated")
        .degrees();
    assert!((region_two - 52.1284).abs() < 1e-3, "got {region_two}");
    assert_eq!(report.samples.len(), 24);
}

#[test]
fn both_sessions_close_once_after_success() {
    let wire = SharedWire::acknowledging();
    wire.queue_cycle(&[0x0100; 12]);
    let mut orchestrator = build_orchestrator(&wire, 1);

    orchestrator.run_cycle().expect("cycle should complete");

    assert_eq!(wire.count(Interface::A, &Call::Close), 1);
    assert_eq!(wire.count(Interface::B, &Call::Close), 1);
    assert_eq!(
        wire.calls_on(Interface::B),
        vec![Call::Close],
        "the auxiliary session carries no traffic"
    );
    let calls = wire.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        &[(Interface::A, Call::Close), (Interface::B, Call::Close)],
        "data closes before aux"
    );
}

#[test]
fn absent_device_is_not_retried() {
    let wire = SharedWire::silent();
    let mut orchestrator = build_orchestrator(&wire, 3);

    let error = orchestrator.run_cycle().expect_err("silent bus");

    assert!(error.is_device_absent());
    assert_eq!(error, CycleError::Acquisition(AcquisitionError::DeviceAbsent));
    assert_eq!(wire.count(Interface::A, &Call::PinHigh(GpioPin::L0)), 1);
    assert_eq!(wire.count(Interface::A, &Call::Close), 1);
    assert_eq!(wire.count(Interface::B, &Call::Close), 1);
    assert_eq!(events(&orchestrator).last(), Some(&TelemetryEventKind::CycleAborted));
}

#[test]
fn transport_fault_is_retried_within_budget() {
    let wire = SharedWire::acknowledging();
    wire.queue_read(&[0x00]);
    wire.queue_read(&[0x08]);
    wire.queue_cycle(&[0x0100; 12]);
    wire.fail_writes_starting_with(0x6A, 1);
    let mut orchestrator = build_orchestrator(&wire, 2);

    let report = orchestrator.run_cycle().expect("second attempt succeeds");

    assert_eq!(report.attempts, 2);
    assert_eq!(report.decoded_count(), 12);
    assert_eq!(wire.count(Interface::A, &Call::Close), 2);
    assert_eq!(wire.count(Interface::B, &Call::Close), 2);

    let trail = events(&orchestrator);
    assert!(trail.contains(&TelemetryEventKind::BusFault));
    assert!(trail.contains(&TelemetryEventKind::CycleRetry(2)));
    assert_eq!(trail.last(), Some(&TelemetryEventKind::CycleComplete));
}

#[test]
fn transport_fault_without_budget_aborts() {
    let wire = SharedWire::acknowledging();
    wire.queue_cycle(&[0x0100; 12]);
    wire.fail_writes_starting_with(0x6B, 1);
    let mut orchestrator = build_orchestrator(&wire, 1);

    let error = orchestrator.run_cycle().expect_err("no retry budget");

    assert!(error.is_retryable());
    assert!(matches!(
        error,
        CycleError::Acquisition(AcquisitionError::Bus(_))
    ));
    assert_eq!(wire.count(Interface::A, &Call::Close), 1);
    assert_eq!(wire.count(Interface::B, &Call::Close), 1);
    assert!(!wire.calls_on(Interface::A).contains(&Call::Read(24)));
}

#[test]
fn aux_open_failure_still_closes_data_session() {
    let wire = SharedWire::acknowledging();
    wire.fail_open(Interface::B);
    let mut orchestrator = build_orchestrator(&wire, 1);

    let error = orchestrator.run_cycle().expect_err("aux cannot open");

    assert!(matches!(error, CycleError::Open(ref bus) if bus.message() == "device busy"));
    assert_eq!(wire.calls_on(Interface::A), vec![Call::Close]);
    assert!(wire.calls_on(Interface::B).is_empty());
}

#[test]
fn data_open_failure_touches_nothing() {
    let wire = SharedWire::acknowledging();
    wire.fail_open(Interface::A);
    let mut orchestrator = build_orchestrator(&wire, 1);

    let error = orchestrator.run_cycle().expect_err("data cannot open");

    assert!(matches!(error, CycleError::Open(_)));
    assert!(wire.calls().is_empty());
    assert_eq!(events(&orchestrator), vec![TelemetryEventKind::CycleAborted]);
}

#[test]
fn telemetry_traces_sessions_states_and_missing_channels() {
    let wire = SharedWire::acknowledging();
    wire.queue_cycle(&bank_with_missing_channel(3));
    let mut orchestrator = build_orchestrator(&wire, 1);

    orchestrator.run_cycle().expect("cycle should complete");

    assert_eq!(
        events(&orchestrator),
        vec![
            TelemetryEventKind::SessionOpened(Interface::A),
            TelemetryEventKind::SessionOpened(Interface::B),
            TelemetryEventKind::StateEntered(AcquisitionState::ProbeAck),
            TelemetryEventKind::StateEntered(AcquisitionState::SelectChannel),
            TelemetryEventKind::StateEntered(AcquisitionState::VerifySelect),
            TelemetryEventKind::StateEntered(AcquisitionState::Configure),
            TelemetryEventKind::StateEntered(AcquisitionState::TriggerConversion),
            TelemetryEventKind::StateEntered(AcquisitionState::WaitConversion),
            TelemetryEventKind::StateEntered(AcquisitionState::ReadResults),
            TelemetryEventKind::StateEntered(AcquisitionState::Done),
            TelemetryEventKind::ChannelMissing(3),
            TelemetryEventKind::SessionClosed(Interface::A),
            TelemetryEventKind::SessionClosed(Interface::B),
            TelemetryEventKind::CycleComplete,
        ]
    );

    let telemetry = orchestrator.telemetry();
    let last = telemetry.latest().expect("events recorded");
    assert_eq!(
        telemetry.offset_of(last),
        core::time::Duration::from_millis(11),
        "relative clock spans both settle delays"
    );
}
