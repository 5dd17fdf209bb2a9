use clap::{Arg, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

// `MEDISAFE_LOG_LEVEL` accepts either a repeat count or a level name, so
// `-vv` and `MEDISAFE_LOG_LEVEL=info` configure the same thing.
fn level_parser() -> ValueParser {
    ValueParser::from(|value: &str| -> std::result::Result<u8, String> {
        if let Ok(count) = value.parse::<u8>() {
            return if count <= 5 {
                Ok(count)
            } else {
                Err("invalid log level".to_string())
            };
        }

        match value.to_ascii_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Log verbosity: -v warn, -vv info, -vvv debug, -vvvv trace (default: error)")
            .env("MEDISAFE_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(level_parser()),
    )
}
