//! First-run bootstrap: config directory, token file and credentials.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::fs;
use tokio::io::AsyncBufRead;
use tracing::info;

use lmc_auth::CredentialStore;
use lmc_core::Credentials;

use crate::input::LineInput;
use crate::terminal_output::Console;

/// Create the config directory (0755) if it does not exist.
pub async fn ensure_config_dir(dir: &Path) -> Result<()> {
    if fs::try_exists(dir).await.unwrap_or(false) {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o755);
    builder
        .create(dir)
        .await
        .with_context(|| format!("Configuration folder {} could not be created", dir.display()))?;
    info!(dir = %dir.display(), "Created configuration folder");
    Ok(())
}

/// Make sure the token file exists and return the operator's credentials,
/// prompting for them (and saving them) when none are stored yet.
pub async fn bootstrap<R>(
    store: &CredentialStore,
    input: &mut LineInput<R>,
    console: &Console,
) -> Result<Credentials>
where
    R: AsyncBufRead + Unpin,
{
    store
        .ensure_token_file()
        .await
        .with_context(|| format!("Could not create token file {}", store.token_path().display()))?;

    if let Some(credentials) = store.read_credentials().await? {
        return Ok(credentials);
    }

    let credentials = prompt_credentials(input, console, "Please provide your credentials").await?;
    store
        .write_credentials(&credentials)
        .await
        .context("Cannot save credentials")?;
    Ok(credentials)
}

pub async fn prompt_credentials<R>(
    input: &mut LineInput<R>,
    console: &Console,
    heading: &str,
) -> Result<Credentials>
where
    R: AsyncBufRead + Unpin,
{
    console.info(heading);
    let username = input.ask(console, "Enter username: ").await?;
    if username.is_empty() {
        bail!("Username must not be empty");
    }
    if username.contains(':') {
        bail!("Username must not contain ':'");
    }
    let password = input.ask(console, "Enter password: ").await?;
    Ok(Credentials::new(username, password))
}
