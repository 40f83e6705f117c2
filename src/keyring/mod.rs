//! Keyrings
//!
//! One trait, one concrete type per custody model:
//! - `SoftwareKeyring`: imported keypairs held in memory
//! - `HdKeyring`: mnemonic seed plus ordered derivation paths
//! - `HardwareKeyring`: device descriptors only, signing goes through the device queue

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::errors::SignerError;
use crate::security::SecretString;

pub mod derivation;
pub mod factory;
pub mod hardware;
pub mod hd;
pub mod keypair;
pub mod snapshot;
pub mod software;
pub mod wire;

pub use derivation::{derive_keypair, indexed_path, DerivationPath};
pub use factory::{
    restore_keyring, HardwareKeyringFactory, HdKeyringFactory, HdKeyringInit, KeyringFactory,
    SoftwareKeyringFactory,
};
pub use hardware::HardwareKeyring;
pub use hd::{DerivedKey, HdKeyring};
pub use keypair::{KeyPair, PublicKey};
pub use snapshot::{HardwareKeyringSnapshot, HdKeyringSnapshot, KeyringSnapshot, SoftwareKeyringSnapshot};
pub use software::SoftwareKeyring;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyringKind {
    Software,
    Hd,
    Hardware,
}

impl KeyringKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyringKind::Software => "software",
            KeyringKind::Hd => "hd",
            KeyringKind::Hardware => "hardware",
        }
    }
}

impl fmt::Display for KeyringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device-held key: where it lives on the device, no secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDescriptor {
    pub public_key: PublicKey,
    pub derivation_path: String,
}

/// Capability contract shared by every keyring variant.
///
/// Signatures come back base58 encoded. Lookups by a public key the keyring
/// does not hold fail with [`SignerError::KeyNotFound`].
#[async_trait]
pub trait Keyring: Send + Sync {
    fn kind(&self) -> KeyringKind;

    /// Held public keys in insertion order.
    fn public_keys(&self) -> Vec<PublicKey>;

    fn contains(&self, public_key: &PublicKey) -> bool {
        self.public_keys().contains(public_key)
    }

    /// Sign the message section of a transaction.
    async fn sign_transaction(
        &self,
        tx_message: &[u8],
        public_key: &PublicKey,
    ) -> Result<String, SignerError>;

    async fn sign_message(&self, message: &[u8], public_key: &PublicKey)
        -> Result<String, SignerError>;

    /// Base58 of the 64-byte `seed || public key` layout, `None` when absent.
    fn export_secret_key(&self, public_key: &PublicKey) -> Option<SecretString>;

    /// Import a hex secret key, returning its public key.
    fn import_secret_key(&mut self, secret_key: &str) -> Result<PublicKey, SignerError>;

    /// No-op when the key is absent.
    fn delete_public_key(&mut self, public_key: &PublicKey);

    fn to_snapshot(&self) -> KeyringSnapshot;

    /// Hardware keyrings need request preparation before signing.
    fn as_hardware(&self) -> Option<&HardwareKeyring> {
        None
    }
}

pub(crate) fn key_not_found(public_key: &PublicKey) -> SignerError {
    SignerError::KeyNotFound(public_key.to_string())
}
