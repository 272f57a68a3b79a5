//! Interactive command loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::AsyncBufRead;
use tokio::sync::watch;
use tracing::{debug, error};
use uuid::Uuid;

use lmc_auth::{Authenticator, CredentialStore};
use lmc_core::{ConnectionState, Job, JobKind, Probe, RemoteApi};
use lmc_dispatch::{Disposition, JobSubmitter};
use lmc_journal::{JobLog, JobLogEntry};

use crate::input::LineInput;
use crate::parse::{is_url, parse_item};
use crate::setup::prompt_credentials;
use crate::terminal_output::{render_table, Column, Console};

const PROMPT: &str = "cmd> ";

const HELP: &str = "\
Commands:
  <url> [words] [#tag ...] [[type]]   add a link, e.g. http://rust-lang.org language #rust
  ua            create a remote user
  auth          log in again
  credentials   re-enter and save your credentials
  ping          check whether the server is reachable
  status        connection state and pending jobs
  pending       list jobs waiting for delivery
  help          show this help
  exit          quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddLink(Vec<String>),
    AddUser,
    Auth,
    Credentials,
    Ping,
    Status,
    Pending,
    Help,
    Exit,
    Unknown(String),
}

impl Command {
    /// `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let first = *words.first()?;
        let command = match first {
            "ua" => Command::AddUser,
            "auth" => Command::Auth,
            "credentials" => Command::Credentials,
            "ping" => Command::Ping,
            "status" => Command::Status,
            "pending" => Command::Pending,
            "help" | "?" => Command::Help,
            "exit" | "quit" => Command::Exit,
            url if is_url(url) => Command::AddLink(words.iter().map(|w| w.to_string()).collect()),
            other => Command::Unknown(other.to_string()),
        };
        Some(command)
    }
}

/// Everything the command loop talks to.
pub struct Session {
    pub console: Console,
    pub auth: Arc<Authenticator>,
    pub api: Arc<dyn RemoteApi>,
    pub probe: Arc<dyn Probe>,
    pub submitter: JobSubmitter,
    pub log: Arc<dyn JobLog>,
    pub state: watch::Receiver<ConnectionState>,
    pub store: CredentialStore,
}

impl Session {
    /// Read and run commands until `exit` or end of input.
    pub async fn run<R>(&self, input: &mut LineInput<R>)
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            self.console.prompt(PROMPT);
            let line = match input.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.console.line("");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Console input failed");
                    break;
                }
            };
            let Some(command) = Command::parse(&line) else {
                continue;
            };
            debug!(?command, "Command");
            if command == Command::Exit {
                break;
            }
            self.execute(command, input).await;
        }
    }

    async fn execute<R>(&self, command: Command, input: &mut LineInput<R>)
    where
        R: AsyncBufRead + Unpin,
    {
        match command {
            Command::AddLink(words) => self.add_link(&words).await,
            Command::AddUser => self.add_user(input).await,
            Command::Auth => match self.auth.authenticate().await {
                Ok(token) => self.console.success(&format!(
                    "Authorised OK as {} until {}",
                    token.subject,
                    format_unix(token.expires_at)
                )),
                Err(e) => self.console.error(&e.to_string()),
            },
            Command::Credentials => self.change_credentials(input).await,
            Command::Ping => {
                if self.probe.ping().await {
                    self.console.success("Server is available");
                } else {
                    self.console.error("Server is not available");
                }
            }
            Command::Status => self.status().await,
            Command::Pending => self.pending(),
            Command::Help => self.console.line(HELP),
            Command::Exit => {}
            Command::Unknown(word) => self
                .console
                .warn(&format!("Unknown command '{word}', type 'help' for the list")),
        }
    }

    async fn add_link(&self, words: &[String]) {
        let kind = match parse_item(words).and_then(|item| item.into_job_kind()) {
            Ok(kind) => kind,
            Err(e) => return self.console.error(&e.to_string()),
        };
        let JobKind::Link(link) = &kind;
        let label = link.to_string();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            kind,
        };

        match self.submitter.submit(job).await {
            Ok(Disposition::Dispatched) => self.console.success(&format!("Link scheduled: {label}")),
            Ok(Disposition::Journaled) => self
                .console
                .warn(&format!("Server unreachable, link saved for later: {label}")),
            Err(e) => self.console.error(&format!("Link not saved: {e}")),
        }
    }

    async fn add_user<R>(&self, input: &mut LineInput<R>)
    where
        R: AsyncBufRead + Unpin,
    {
        let user = match prompt_credentials(input, &self.console, "Please provide new user details").await {
            Ok(user) => user,
            Err(e) => return self.console.error(&format!("{e:#}")),
        };
        let result = self
            .auth
            .with_auth(|token| {
                let user = &user;
                async move { self.api.create_user(&token, user).await }
            })
            .await;
        match result {
            Ok(()) => self.console.success(&format!("User created: {}", user.username)),
            Err(e) => self.console.error(&e.to_string()),
        }
    }

    async fn change_credentials<R>(&self, input: &mut LineInput<R>)
    where
        R: AsyncBufRead + Unpin,
    {
        let credentials = match prompt_credentials(input, &self.console, "Please provide your credentials").await {
            Ok(credentials) => credentials,
            Err(e) => return self.console.error(&format!("{e:#}")),
        };
        if let Err(e) = self.store.write_credentials(&credentials).await {
            return self.console.error(&format!("Credentials not saved: {e}"));
        }
        self.auth.set_credentials(credentials).await;
        self.console.success("Credentials saved");
    }

    async fn status(&self) {
        let state = *self.state.borrow();
        let line = format!("Connection: {state}");
        match state {
            ConnectionState::Healthy => self.console.success(&line),
            ConnectionState::Degraded => self.console.warn(&line),
        }
        match self.log.count() {
            Ok(pending) => self.console.info(&format!("Pending jobs: {pending}")),
            Err(e) => self.console.error(&format!("Cannot read journal: {e}")),
        }
        self.console.info(&format!("User: {}", self.auth.username().await));
    }

    fn pending(&self) {
        match self.log.read_all_ordered() {
            Ok(entries) if entries.is_empty() => self.console.info("No pending jobs"),
            Ok(entries) => self.console.line(&pending_table(&entries)),
            Err(e) => self.console.error(&format!("Cannot read journal: {e}")),
        }
    }
}

pub fn pending_table(entries: &[JobLogEntry]) -> String {
    let columns = [
        Column::left("Id"),
        Column::left("Added"),
        Column::left("Link").max_width(60),
    ];
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            let added = DateTime::<Utc>::from_timestamp_millis(entry.added_at)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            let link = match Job::from_payload(&entry.payload) {
                Ok(Job { kind: JobKind::Link(link), .. }) => link.to_string(),
                Err(_) => "<unreadable>".to_string(),
            };
            vec![entry.id.clone(), added, link]
        })
        .collect();
    render_table(&columns, &rows)
}

fn format_unix(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmc_core::Link;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("   "), None);
        assert_eq!(Command::parse("ping"), Some(Command::Ping));
        assert_eq!(Command::parse("  status  "), Some(Command::Status));
        assert_eq!(Command::parse("exit"), Some(Command::Exit));
        assert_eq!(Command::parse("ua"), Some(Command::AddUser));
        assert_eq!(Command::parse("pending"), Some(Command::Pending));
        assert_eq!(Command::parse("frobnicate now"), Some(Command::Unknown("frobnicate".into())));
    }

    #[test]
    fn test_url_line_is_add_link() {
        assert_eq!(
            Command::parse("https://docs.rs  crates #rust"),
            Some(Command::AddLink(vec![
                "https://docs.rs".into(),
                "crates".into(),
                "#rust".into()
            ]))
        );
        // Only a leading URL makes it a link command.
        assert_eq!(
            Command::parse("see http://a.io"),
            Some(Command::Unknown("see".into()))
        );
    }

    #[test]
    fn test_pending_table_lists_entries() {
        let mut link = Link::new("http://google.com");
        link.tags.push("search".into());
        let entries = vec![
            JobLogEntry {
                id: "j1".into(),
                added_at: 0,
                payload: Job::link("j1", link).to_payload().unwrap(),
            },
            JobLogEntry {
                id: "broken".into(),
                added_at: 1_000,
                payload: b"{".to_vec(),
            },
        ];

        let table = pending_table(&entries);
        assert!(table.contains("http://google.com #search"));
        assert!(table.contains("1970-01-01 00:00:01"));
        assert!(table.contains("<unreadable>"));
    }

    #[test]
    fn test_format_unix() {
        assert_eq!(format_unix(10), "1970-01-01T00:00:10+00:00");
    }
}
