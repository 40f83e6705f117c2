#![allow(clippy::len_zero)]
#![allow(clippy::doc_lazy_continuation)]
// src/lib.rs

pub mod core;
pub mod security;

// Custody: software, HD and hardware keyrings
pub mod keyring;

// Request queue and confirmation protocol
pub mod confirmation;

// Ledger signing sessions
pub mod hardware;

pub use crate::confirmation::{
    ConfirmationProtocol, ConfirmationSurface, RequestQueue, RequestState, SecureRequest,
    SecureResponse, SecureSigner,
};
pub use crate::core::{init_logging, SignerConfig, SignerError};
pub use crate::keyring::{Keyring, KeyringKind, KeyringSnapshot, PublicKey};
