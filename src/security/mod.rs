// src/security/mod.rs
//! Security-related functionality for the keyring core
//!
//! Zeroizing buffer aliases and log redaction helpers.

pub mod secret;

// Secret buffer alias re-export
pub use secret::{SecretString, SecretVec};

// Redaction helpers to avoid accidental secret prints
pub mod redaction;
pub use redaction::{payload_preview, redact_body, redact_hex_bytes};
