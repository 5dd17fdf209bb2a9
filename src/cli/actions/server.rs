use crate::{api, api::handlers::auth::AuthConfig, crypto::FieldCipher};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub totp_issuer: String,
    pub encryption_key: SecretString,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the encryption key is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    info!(
        port = args.port,
        frontend_base_url = %args.frontend_base_url,
        session_ttl_seconds = args.session_ttl_seconds,
        totp_issuer = %args.totp_issuer,
        "starting server"
    );

    let cipher = FieldCipher::from_base64(args.encryption_key.expose_secret())
        .context("invalid MEDISAFE_ENCRYPTION_KEY")?;

    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds);

    api::new(args.port, args.dsn, auth_config, args.totp_issuer, cipher).await
}
