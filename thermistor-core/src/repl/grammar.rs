#![allow(clippy::module_name_repetitions)]

//! Parser for the acquisition REPL.
//!
//! The keyword is looked up in the [`catalog`](super::catalog) and each
//! command's arguments are parsed with `winnow` combinators over the line.
//! Range checks run after parsing so out-of-range values report the field
//! that was wrong rather than a generic syntax failure.

use super::catalog::{self, CommandSpec, CommandTag};
use core::fmt;

use heapless::Vec as HeaplessVec;
use winnow::ascii::{Caseless, alpha1, digit1, hex_digit1, space0, space1};
use winnow::combinator::{alt, empty, eof, opt, preceded, repeat, terminated};
use winnow::error::{ContextError, ErrMode, ModalResult};
use winnow::prelude::*;
use winnow::token::literal;

use crate::device::MAX_CHANNELS;
use crate::orchestrator::MAX_RETRY_BUDGET;

/// Largest `channels=` value accepted by `acquire`.
#[allow(clippy::cast_possible_truncation)]
pub const MAX_CHANNEL_ARG: u32 = MAX_CHANNELS as u32;

/// Raw words accepted by a single `decode` line.
pub type WordBuffer = HeaplessVec<u16, MAX_CHANNELS>;

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Acquire(AcquireCommand),
    Decode(DecodeCommand),
    Fixture(FixtureKind),
    Table,
    Status,
    Help(HelpCommand<'a>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcquireCommand {
    pub channels: Option<u8>,
    pub retries: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeCommand {
    pub words: WordBuffer,
}

/// Simulated ADC behaviours selectable from the REPL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixtureKind {
    Populated,
    Partial,
    Absent,
    Faulty,
}

impl FixtureKind {
    pub const ALL: [FixtureKind; 4] = [
        FixtureKind::Populated,
        FixtureKind::Partial,
        FixtureKind::Absent,
        FixtureKind::Faulty,
    ];

    /// Matches a fixture name case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            FixtureKind::Populated => "populated",
            FixtureKind::Partial => "partial",
            FixtureKind::Absent => "absent",
            FixtureKind::Faulty => "faulty",
        }
    }
}

impl fmt::Display for FixtureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

/// Grammar errors emitted by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarError<'a> {
    Empty,
    UnknownCommand(&'a str),
    InvalidArguments {
        command: &'static str,
        usage: &'static str,
    },
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    TooManyWords {
        count: usize,
    },
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::Empty => f.write_str("empty command"),
            GrammarError::UnknownCommand(word) => {
                write!(f, "unknown command `{word}`; try `help`")
            }
            GrammarError::InvalidArguments { command, usage } => {
                write!(f, "invalid arguments for `{command}`; usage: {usage}")
            }
            GrammarError::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{field}={value} is outside {min}..={max}"),
            GrammarError::TooManyWords { count } => {
                write!(f, "{count} words given, at most {MAX_CHANNELS} accepted")
            }
        }
    }
}

/// Parse a REPL command from the provided line.
///
/// # Errors
///
/// Returns a [`GrammarError`] describing the first problem with the line.
pub fn parse(line: &str) -> Result<Command<'_>, GrammarError<'_>> {
    let mut input = line.trim();
    if input.is_empty() {
        return Err(GrammarError::Empty);
    }

    let unknown = || GrammarError::UnknownCommand(first_word(line));
    let name = keyword(&mut input).map_err(|_| unknown())?;
    let spec = catalog::find(name).ok_or_else(unknown)?;

    match spec.tag {
        CommandTag::Acquire => {
            let raw = arguments(spec, &mut input, acquire_args)?;
            Ok(Command::Acquire(AcquireCommand {
                channels: checked(raw.channels, "channels", 1, MAX_CHANNEL_ARG)?,
                retries: checked(raw.retries, "retries", 1, u32::from(MAX_RETRY_BUDGET))?,
            }))
        }
        CommandTag::Decode => {
            let (words, count) = arguments(spec, &mut input, decode_args)?;
            if count > MAX_CHANNELS {
                return Err(GrammarError::TooManyWords { count });
            }
            Ok(Command::Decode(DecodeCommand { words }))
        }
        CommandTag::Fixture => arguments(spec, &mut input, fixture_args).map(Command::Fixture),
        CommandTag::Table => arguments(spec, &mut input, empty).map(|()| Command::Table),
        CommandTag::Status => arguments(spec, &mut input, empty).map(|()| Command::Status),
        CommandTag::Help => {
            arguments(spec, &mut input, help_args).map(|topic| Command::Help(HelpCommand { topic }))
        }
    }
}

fn arguments<'a, O>(
    spec: &'static CommandSpec,
    input: &mut &'a str,
    parser: impl Parser<&'a str, O, ErrMode<ContextError>>,
) -> Result<O, GrammarError<'a>> {
    terminated(parser, (space0, eof))
        .parse_next(input)
        .map_err(|_| GrammarError::InvalidArguments {
            command: spec.name,
            usage: spec.usage,
        })
}

fn checked<'a>(
    value: Option<u32>,
    field: &'static str,
    min: u32,
    max: u32,
) -> Result<Option<u8>, GrammarError<'a>> {
    match value {
        None => Ok(None),
        Some(value) if (min..=max).contains(&value) => Ok(u8::try_from(value).ok()),
        Some(value) => Err(GrammarError::OutOfRange {
            field,
            value,
            min,
            max,
        }),
    }
}

fn keyword<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    alpha1.parse_next(input)
}

fn first_word(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or_default()
}

#[derive(Default)]
struct RawAcquire {
    channels: Option<u32>,
    retries: Option<u32>,
}

enum AcquireOption {
    Channels(u32),
    Retries(u32),
}

fn acquire_args(input: &mut &str) -> ModalResult<RawAcquire> {
    let mut raw = RawAcquire::default();
    while let Some(option) = opt(preceded(space1, acquire_option)).parse_next(input)? {
        match option {
            AcquireOption::Channels(value) => raw.channels = Some(value),
            AcquireOption::Retries(value) => raw.retries = Some(value),
        }
    }
    Ok(raw)
}

fn acquire_option(input: &mut &str) -> ModalResult<AcquireOption> {
    alt((
        preceded((literal(Caseless("channels")), '='), decimal).map(AcquireOption::Channels),
        preceded((literal(Caseless("retries")), '='), decimal).map(AcquireOption::Retries),
    ))
    .parse_next(input)
}

fn decimal(input: &mut &str) -> ModalResult<u32> {
    digit1.parse_to().parse_next(input)
}

fn decode_args(input: &mut &str) -> ModalResult<(WordBuffer, usize)> {
    repeat(1.., preceded(space1, hex_word))
        .fold(
            || (WordBuffer::new(), 0_usize),
            |(mut words, count), word| {
                // Overflow is reported from the count once parsing succeeds.
                let _ = words.push(word);
                (words, count + 1)
            },
        )
        .parse_next(input)
}

fn hex_word(input: &mut &str) -> ModalResult<u16> {
    preceded(
        opt(literal(Caseless("0x"))),
        hex_digit1.verify_map(|digits: &str| u16::from_str_radix(digits, 16).ok()),
    )
    .parse_next(input)
}

fn fixture_args(input: &mut &str) -> ModalResult<FixtureKind> {
    preceded(
        space1,
        alt((
            literal(Caseless("populated")).value(FixtureKind::Populated),
            literal(Caseless("partial")).value(FixtureKind::Partial),
            literal(Caseless("absent")).value(FixtureKind::Absent),
            literal(Caseless("faulty")).value(FixtureKind::Faulty),
        )),
    )
    .parse_next(input)
}

fn help_args<'a>(input: &mut &'a str) -> ModalResult<Option<&'a str>> {
    opt(preceded(space1, alpha1)).parse_next(input)
}
