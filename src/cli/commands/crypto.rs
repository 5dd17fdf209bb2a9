use clap::{Arg, Command};

pub const ARG_ENCRYPTION_KEY: &str = "encryption-key";

pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_ENCRYPTION_KEY)
            .long("encryption-key")
            .help("Base64 encoded 32 byte key used to seal clinical record fields")
            .env("MEDISAFE_ENCRYPTION_KEY")
            .hide_env_values(true)
            .required(true),
    )
}
