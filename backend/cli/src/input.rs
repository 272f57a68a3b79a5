//! Line-oriented operator input.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::terminal_output::Console;

pub struct LineInput<R> {
    lines: Lines<R>,
}

impl LineInput<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines() }
    }

    /// Next raw line, `None` at end of input.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.lines.next_line().await.context("Failed to read from console")
    }

    /// Print `prompt` and read one trimmed answer. End of input is an error.
    pub async fn ask(&mut self, console: &Console, prompt: &str) -> Result<String> {
        console.prompt(prompt);
        match self.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => bail!("Input closed while waiting for an answer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ask_trims_answers() {
        let mut input = LineInput::new(&b"  alice \nsecret\n"[..]);
        let console = Console::plain();
        assert_eq!(input.ask(&console, "user: ").await.unwrap(), "alice");
        assert_eq!(input.ask(&console, "pass: ").await.unwrap(), "secret");
        assert!(input.ask(&console, "more: ").await.is_err());
    }

    #[tokio::test]
    async fn test_next_line_none_at_eof() {
        let mut input = LineInput::new(&b"ping"[..]);
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("ping"));
        assert_eq!(input.next_line().await.unwrap(), None);
    }
}
