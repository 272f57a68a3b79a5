//! Remote links service client.
//!
//! `HttpApi` speaks the service's JSON-over-HTTP protocol and maps every
//! response onto the `LmcError` taxonomy so callers can classify failures.

pub mod client;

pub use client::{HttpApi, AUTH_TOKEN_HEADER};
