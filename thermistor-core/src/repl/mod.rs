//! REPL tooling shared between the emulator and embedded front-ends.
//!
//! The command grammar lives in [`grammar`] and parses with `winnow` without
//! allocating, so it stays compatible with `no_std`.

pub mod catalog;
pub mod grammar;
pub mod status;
