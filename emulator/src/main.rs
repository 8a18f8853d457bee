mod session;
mod simulator;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use session::Session;
use thermistor_core::device::{DEFAULT_CHANNEL_COUNT, MAX_CHANNELS};
use thermistor_core::repl::grammar::FixtureKind;

const USAGE: &str = "Usage: thermistor-emulator [--fixture <populated|partial|absent|faulty>] \
                     [--channels <1-16>] [--once] [--transcript <path> | --transcript-default]";

/// Exit status when the ADC never acknowledged.
const EXIT_DEVICE_ABSENT: i32 = 1;
/// Exit status for command-line mistakes.
const EXIT_USAGE: i32 = 2;
/// Exit status when the transport failed.
const EXIT_BUS_FAULT: i32 = 3;

struct Options {
    fixture: FixtureKind,
    channels: u8,
    once: bool,
    transcript: Option<PathBuf>,
}

fn main() -> io::Result<()> {
    env_logger::init();

    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(EXIT_USAGE);
    });

    if options.once {
        run_once(&options)
    } else {
        run_shell(&options)
    }
}

fn run_once(options: &Options) -> io::Result<()> {
    let mut session = Session::new(options.fixture, options.channels);
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    match session.acquire() {
        Ok(report) => {
            for line in session::cycle_lines(&report) {
                writeln!(writer, "{line}")?;
            }
            Ok(())
        }
        Err(error) if error.is_device_absent() => {
            writeln!(writer, "{}", session::NO_ACK_MESSAGE)?;
            writer.flush()?;
            process::exit(EXIT_DEVICE_ABSENT);
        }
        Err(error) => {
            eprintln!("{error}");
            process::exit(EXIT_BUS_FAULT);
        }
    }
}

fn run_shell(options: &Options) -> io::Result<()> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = match &options.transcript {
        Some(path) => Session::with_transcript(options.fixture, options.channels, path)?,
        None => Session::new(options.fixture, options.channels),
    };
    let mut line = String::new();

    writeln!(
        writer,
        "Thermistor ADC Emulator ready (fixture {}). Type `help` for commands or `exit` to quit.",
        session.fixture()
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        fixture: FixtureKind::Populated,
        channels: DEFAULT_CHANNEL_COUNT,
        once: false,
        transcript: None,
    };
    let mut default_transcript = false;

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };

        match flag.as_str() {
            "--once" => options.once = true,
            "--fixture" => {
                let value = flag_value(&flag, inline, &mut args)?;
                options.fixture = FixtureKind::from_name(&value)
                    .ok_or_else(|| format!("Unknown fixture `{value}`"))?;
            }
            "--channels" => {
                let value = flag_value(&flag, inline, &mut args)?;
                options.channels = parse_channels(&value)?;
            }
            "--transcript" => {
                options.transcript = Some(PathBuf::from(flag_value(&flag, inline, &mut args)?));
            }
            "--transcript-default" => default_transcript = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                process::exit(0);
            }
            other => return Err(format!("Unexpected argument `{other}`")),
        }
    }

    if default_transcript && options.transcript.is_none() {
        options.transcript = Some(session::transcript_path(options.fixture));
    }
    Ok(options)
}

fn flag_value(
    flag: &str,
    inline: Option<String>,
    args: &mut impl Iterator<Item = String>,
) -> Result<String, String> {
    inline
        .or_else(|| args.next())
        .ok_or_else(|| format!("Expected value after {flag}"))
}

fn parse_channels(value: &str) -> Result<u8, String> {
    value
        .parse::<u8>()
        .ok()
        .filter(|count| (1..=MAX_CHANNELS).contains(&usize::from(*count)))
        .ok_or_else(|| format!("--channels expects 1-{MAX_CHANNELS}, got `{value}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        parse_options(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn defaults_start_the_shell_on_a_populated_bank() {
        let options = parse(&[]).expect("defaults");
        assert_eq!(options.fixture, FixtureKind::Populated);
        assert_eq!(options.channels, DEFAULT_CHANNEL_COUNT);
        assert!(!options.once);
        assert!(options.transcript.is_none());
    }

    #[test]
    fn flags_accept_inline_and_separate_values() {
        let options = parse(&["--fixture=partial", "--channels", "8", "--once"]).expect("flags");
        assert_eq!(options.fixture, FixtureKind::Partial);
        assert_eq!(options.channels, 8);
        assert!(options.once);
    }

    #[test]
    fn default_transcript_follows_the_chosen_fixture() {
        let options = parse(&["--transcript-default", "--fixture", "absent"]).expect("flags");
        assert_eq!(
            options.transcript,
            Some(PathBuf::from("transcripts/emulator-absent.log"))
        );
    }

    #[test]
    fn invalid_flags_are_usage_errors() {
        assert!(parse(&["--fixture", "broken"]).is_err());
        assert!(parse(&["--channels=0"]).is_err());
        assert!(parse(&["--channels=17"]).is_err());
        assert!(parse(&["--channels"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }
}
