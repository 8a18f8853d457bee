#![no_std]

// Shared logic for the thermistor acquisition tooling.
//
// This crate stays portable across host tooling and embedded bridges by
// avoiding the Rust standard library. The transport itself lives outside the
// crate and is consumed through the capability traits in `bus`.

pub mod logging;

pub mod acquisition;
pub mod bus;
pub mod decoder;
pub mod device;
pub mod orchestrator;
pub mod repl;
pub mod sequencer;
pub mod telemetry;
