//! Command catalog shared by the parser and the `help` command.
//!
//! Keeping names, usage strings, and summaries in one table keeps the help
//! output and the grammar's error messages in sync.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Acquire,
    Decode,
    Fixture,
    Table,
    Status,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub usage: &'static str,
    pub summary: &'static str,
}

const COMMANDS: [CommandSpec; 6] = [
    CommandSpec {
        name: "acquire",
        tag: CommandTag::Acquire,
        usage: "acquire [channels=<1-16>] [retries=<1-5>]",
        summary: "run one acquisition cycle and print every channel",
    },
    CommandSpec {
        name: "decode",
        tag: CommandTag::Decode,
        usage: "decode <hex word>...",
        summary: "decode raw 16-bit samples without touching the bus",
    },
    CommandSpec {
        name: "fixture",
        tag: CommandTag::Fixture,
        usage: "fixture <populated|partial|absent|faulty>",
        summary: "swap the simulated ADC behind the bus",
    },
    CommandSpec {
        name: "table",
        tag: CommandTag::Table,
        usage: "table",
        summary: "print the calibration regions",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        usage: "status",
        summary: "show configuration and the last cycle outcome",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        usage: "help [command]",
        summary: "list commands or show usage for one",
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Looks up a command by its tag.
#[must_use]
pub fn command(tag: CommandTag) -> &'static CommandSpec {
    match tag {
        CommandTag::Acquire => &COMMANDS[0],
        CommandTag::Decode => &COMMANDS[1],
        CommandTag::Fixture => &COMMANDS[2],
        CommandTag::Table => &COMMANDS[3],
        CommandTag::Status => &COMMANDS[4],
        CommandTag::Help => &COMMANDS[5],
    }
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}
