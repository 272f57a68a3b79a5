//! Session token parsing.
//!
//! A token is `payload.signature` or `header.payload.signature`, where the
//! payload segment is base64-encoded JSON carrying `sub` and `exp` (unix seconds).

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

use lmc_core::LmcError;

const PADDING_INDIFFERENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, PADDING_INDIFFERENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, PADDING_INDIFFERENT);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: expected 2 or 3 '.'-separated segments, found {0}")]
    SegmentCount(usize),

    #[error("token payload is not valid base64: {0}")]
    Base64(String),

    #[error("token payload is not valid JSON: {0}")]
    Json(String),

    #[error("token payload has no subject")]
    MissingSubject,
}

impl From<TokenError> for LmcError {
    fn from(e: TokenError) -> Self {
        LmcError::Token(e.to_string())
    }
}

/// A raw token plus the fields decoded from its payload.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub raw: String,
    pub subject: String,
    /// Expiry as unix seconds.
    pub expires_at: i64,
}

impl SessionToken {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("subject", &self.subject)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: i64,
}

/// Decode a token's payload into its subject and expiry. Never panics.
pub fn parse_token(token: &str) -> Result<SessionToken, TokenError> {
    let token = token.trim();
    let segments: Vec<&str> = token.split('.').collect();
    let payload = match segments.as_slice() {
        [payload, _signature] => payload,
        [_header, payload, _signature] => payload,
        other => return Err(TokenError::SegmentCount(other.len())),
    };
    if payload.is_empty() {
        return Err(TokenError::Base64("empty payload segment".into()));
    }

    let bytes = STANDARD_LENIENT
        .decode(payload)
        .or_else(|_| URL_SAFE_LENIENT.decode(payload))
        .map_err(|e| TokenError::Base64(e.to_string()))?;

    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Json(e.to_string()))?;

    let subject = claims
        .sub
        .filter(|s| !s.is_empty())
        .ok_or(TokenError::MissingSubject)?;

    Ok(SessionToken {
        raw: token.to_string(),
        subject,
        expires_at: claims.exp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn test_parses_payload_and_signature() {
        let token = parse_token("eyJzdWIiOiJ1MSIsImV4cCI6MTB9.sig").unwrap();
        assert_eq!(token.subject, "u1");
        assert_eq!(token.expires_at, 10);
        assert_eq!(token.raw, "eyJzdWIiOiJ1MSIsImV4cCI6MTB9.sig");
    }

    #[test]
    fn test_parses_three_segment_token() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"user-42","exp":1900000000}"#);
        let token = parse_token(&format!("eyJhbGciOiJIUzI1NiJ9.{payload}.c2ln")).unwrap();
        assert_eq!(token.subject, "user-42");
        assert_eq!(token.expires_at, 1_900_000_000);
    }

    #[test]
    fn test_no_separator_is_error() {
        assert_eq!(parse_token("not-a-token"), Err(TokenError::SegmentCount(1)));
    }

    #[test]
    fn test_too_many_segments() {
        assert_eq!(parse_token("a.b.c.d"), Err(TokenError::SegmentCount(4)));
    }

    #[test]
    fn test_bad_base64() {
        assert!(matches!(parse_token("!!!.sig"), Err(TokenError::Base64(_))));
        assert!(matches!(parse_token(".sig"), Err(TokenError::Base64(_))));
    }

    #[test]
    fn test_bad_json() {
        let payload = URL_SAFE_NO_PAD.encode(b"not json");
        assert!(matches!(parse_token(&format!("{payload}.sig")), Err(TokenError::Json(_))));
    }

    #[test]
    fn test_missing_subject() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp":10}"#);
        assert_eq!(parse_token(&format!("{payload}.sig")), Err(TokenError::MissingSubject));
    }

    #[test]
    fn test_expiry_check() {
        let token = parse_token("eyJzdWIiOiJ1MSIsImV4cCI6MTB9.sig").unwrap();
        assert!(token.is_expired_at(10));
        assert!(!token.is_expired_at(9));
        assert!(token.is_expired());
    }

    #[test]
    fn test_debug_hides_raw_token() {
        let token = parse_token("eyJzdWIiOiJ1MSIsImV4cCI6MTB9.sig").unwrap();
        assert!(!format!("{token:?}").contains("eyJ"));
    }
}
