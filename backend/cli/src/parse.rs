//! Free-text link entry.
//!
//! `http://example.com some words #tag [link]`: words starting with
//! `http://`/`https://` are the URL, `#x` adds tag `x`, `[type]` sets the
//! item type, and everything else is joined into the description.

use thiserror::Error;

use lmc_core::{JobKind, Link};

const DEFAULT_ITEM_TYPE: &str = "link";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no http:// or https:// URL given")]
    MissingUrl,

    #[error("unsupported item type [{0}], only links can be added")]
    UnsupportedType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    pub item_type: String,
    pub link: Link,
}

impl ParsedItem {
    pub fn into_job_kind(self) -> Result<JobKind, ParseError> {
        match self.item_type.as_str() {
            DEFAULT_ITEM_TYPE => Ok(JobKind::Link(self.link)),
            other => Err(ParseError::UnsupportedType(other.to_string())),
        }
    }
}

pub fn is_url(word: &str) -> bool {
    word.starts_with("http://") || word.starts_with("https://")
}

/// The last URL wins if several are given.
pub fn parse_item<S: AsRef<str>>(words: &[S]) -> Result<ParsedItem, ParseError> {
    let mut url = None;
    let mut tags = Vec::new();
    let mut description: Vec<&str> = Vec::new();
    let mut item_type = DEFAULT_ITEM_TYPE.to_string();

    for word in words {
        let word: &str = word.as_ref();
        if is_url(word) {
            url = Some(word.to_string());
        } else if let Some(tag) = word.strip_prefix('#') {
            if !tag.is_empty() {
                tags.push(tag.to_string());
            }
        } else if let Some(kind) = word.strip_prefix('[').and_then(|w| w.strip_suffix(']')) {
            if !kind.is_empty() {
                item_type = kind.to_lowercase();
            }
        } else {
            description.push(word);
        }
    }

    let url = url.ok_or(ParseError::MissingUrl)?;
    Ok(ParsedItem {
        item_type,
        link: Link {
            url,
            description: description.join(" "),
            tags,
        },
    })
}
