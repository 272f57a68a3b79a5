//! Log Redaction Layer
//!
//! Scrubs session tokens and passwords from strings prior to logging.

use regex::Regex;
use std::sync::LazyLock;

static AUTH_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(x-auth-token\s*[:=]\s*)[^\s,;]+").unwrap());
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"eyJ[a-zA-Z0-9_\-+/=]{4,}(\.[a-zA-Z0-9_\-+/=]*)+").unwrap());
static PASSWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)("?password"?\s*[:=]\s*"?)[^",\s}]+"#).unwrap());

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = AUTH_HEADER_RE.replace_all(input, "${1}[REDACTED_TOKEN]");
    let redacted = TOKEN_RE.replace_all(&redacted, "[REDACTED_TOKEN]");
    let redacted = PASSWORD_RE.replace_all(&redacted, "${1}[REDACTED]");
    redacted.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_tokens() {
        let raw = "login ok, token eyJzdWIiOiJ1MSIsImV4cCI6MTB9.sig stored";
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("eyJzdWIiOiJ1MSIsImV4cCI6MTB9"));
        assert!(clean.contains("[REDACTED_TOKEN]"));
    }

    #[test]
    fn test_redacts_auth_header() {
        let clean = redact_sensitive_data("X-AUTH-TOKEN: abc.def.ghi");
        assert_eq!(clean, "X-AUTH-TOKEN: [REDACTED_TOKEN]");
    }

    #[test]
    fn test_redacts_password_field() {
        let clean = redact_sensitive_data(r#"{"username":"alice","password":"hunter2"}"#);
        assert!(!clean.contains("hunter2"));
        assert!(clean.contains("alice"));
    }

    #[test]
    fn test_plain_text_untouched() {
        let raw = "job 42 delivered to https://example.com";
        assert_eq!(redact_sensitive_data(raw), raw);
    }
}
