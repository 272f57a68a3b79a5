//! Durable token and credential files.
//!
//! The token file holds the current raw token and is overwritten wholesale on
//! every refresh. The credentials file holds `username:password`. Both are
//! created owner-only on Unix.

use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use lmc_core::{Credentials, LmcError};

#[derive(Debug, Clone)]
pub struct CredentialStore {
    token_path: PathBuf,
    credentials_path: PathBuf,
}

impl CredentialStore {
    pub fn new(token_path: impl Into<PathBuf>, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            token_path: token_path.into(),
            credentials_path: credentials_path.into(),
        }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    /// Read the saved token. A missing or blank file means no session.
    pub async fn read_token(&self) -> Result<Option<String>, LmcError> {
        Ok(read_optional(&self.token_path)
            .await?
            .map(|raw| raw.trim().to_string())
            .filter(|t| !t.is_empty()))
    }

    /// Replace the token file contents: truncate, write, flush to disk.
    pub async fn write_token(&self, token: &str) -> Result<(), LmcError> {
        write_private(&self.token_path, token.as_bytes()).await?;
        debug!(path = %self.token_path.display(), "Token saved");
        Ok(())
    }

    /// Create an empty token file if none exists yet.
    pub async fn ensure_token_file(&self) -> Result<(), LmcError> {
        if fs::try_exists(&self.token_path).await.map_err(io_error(&self.token_path))? {
            return Ok(());
        }
        write_private(&self.token_path, b"").await
    }

    /// Read `username:password`. Returns `None` when the file is missing or malformed.
    pub async fn read_credentials(&self) -> Result<Option<Credentials>, LmcError> {
        let Some(raw) = read_optional(&self.credentials_path).await? else {
            return Ok(None);
        };
        Ok(parse_credentials(&raw))
    }

    pub async fn write_credentials(&self, credentials: &Credentials) -> Result<(), LmcError> {
        let line = format!(
            "{}:{}",
            credentials.username.trim(),
            credentials.password.trim()
        );
        write_private(&self.credentials_path, line.as_bytes()).await?;
        debug!(path = %self.credentials_path.display(), "Credentials saved");
        Ok(())
    }
}

/// Parse a `username:password` line; the username is everything before the first colon.
pub fn parse_credentials(raw: &str) -> Option<Credentials> {
    let line = raw.trim_end_matches(['\r', '\n']);
    let (username, password) = line.split_once(':')?;
    if username.trim().is_empty() {
        return None;
    }
    Some(Credentials::new(username.trim(), password.trim()))
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> LmcError + '_ {
    move |e| LmcError::Storage(format!("{}: {e}", path.display()))
}

async fn read_optional(path: &Path) -> Result<Option<String>, LmcError> {
    match fs::read_to_string(path).await {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path)(e)),
    }
}

async fn write_private(path: &Path, contents: &[u8]) -> Result<(), LmcError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(io_error(path))?;
    file.write_all(contents).await.map_err(io_error(path))?;
    file.flush().await.map_err(io_error(path))?;
    file.sync_all().await.map_err(io_error(path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(io_error(path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> CredentialStore {
        CredentialStore::new(dir.join("auth.token"), dir.join("credentials"))
    }

    #[tokio::test]
    async fn test_missing_token_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_in(dir.path()).read_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_token_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.write_token("a-much-longer-first-token").await.unwrap();
        store.write_token("second").await.unwrap();
        assert_eq!(store.read_token().await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_ensure_token_file_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.ensure_token_file().await.unwrap();
        assert_eq!(store.read_token().await.unwrap(), None);

        store.write_token("kept").await.unwrap();
        store.ensure_token_file().await.unwrap();
        assert_eq!(store.read_token().await.unwrap().as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_credentials_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert_eq!(store.read_credentials().await.unwrap(), None);

        store
            .write_credentials(&Credentials::new(" alice ", "p@ss:word\n"))
            .await
            .unwrap();
        let raw = std::fs::read_to_string(store.credentials_path()).unwrap();
        assert_eq!(raw, "alice:p@ss:word");
        assert_eq!(
            store.read_credentials().await.unwrap(),
            Some(Credentials::new("alice", "p@ss:word"))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_credentials_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store
            .write_credentials(&Credentials::new("alice", "pw"))
            .await
            .unwrap();
        let mode = std::fs::metadata(store.credentials_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_parse_credentials_rejects_malformed() {
        assert_eq!(parse_credentials("no-colon-here"), None);
        assert_eq!(parse_credentials(":password"), None);
        assert_eq!(
            parse_credentials("bob:\n"),
            Some(Credentials::new("bob", ""))
        );
    }
}
