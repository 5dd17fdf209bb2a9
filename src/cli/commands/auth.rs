use clap::{Arg, Command};

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL allowed for browser requests")
                .env("MEDISAFE_FRONTEND_BASE_URL")
                .default_value("https://medisafe.dev"),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session cookie TTL in seconds")
                .env("MEDISAFE_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("totp-issuer")
                .long("totp-issuer")
                .help("Issuer name shown in authenticator apps")
                .env("MEDISAFE_TOTP_ISSUER")
                .default_value("MediSafe"),
        )
}
