//! Software keyring: imported keypairs held in memory.

use async_trait::async_trait;
use std::fmt;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::core::errors::SignerError;
use crate::keyring::keypair::{KeyPair, PublicKey};
use crate::keyring::snapshot::{KeyringSnapshot, SoftwareKeyringSnapshot};
use crate::keyring::{key_not_found, Keyring, KeyringKind};
use crate::security::secret::{secret_from_hex, secret_to_hex};
use crate::security::redaction::{redact_body, redact_hex_bytes};
use crate::security::SecretString;

#[derive(Default)]
pub struct SoftwareKeyring {
    keypairs: Vec<KeyPair>,
}

impl SoftwareKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from keypairs, dropping duplicates by public key.
    pub fn from_keypairs(keypairs: impl IntoIterator<Item = KeyPair>) -> Self {
        let mut keyring = Self::new();
        for kp in keypairs {
            keyring.insert(kp);
        }
        keyring
    }

    /// Add a keypair unless its public key is already present.
    pub fn insert(&mut self, keypair: KeyPair) -> PublicKey {
        let public_key = keypair.public_key();
        if self.position(&public_key).is_none() {
            self.keypairs.push(keypair);
        } else {
            debug!(%public_key, "key already imported");
        }
        public_key
    }

    fn position(&self, public_key: &PublicKey) -> Option<usize> {
        self.keypairs.iter().position(|kp| kp.public_key() == *public_key)
    }

    fn keypair(&self, public_key: &PublicKey) -> Result<&KeyPair, SignerError> {
        self.position(public_key)
            .map(|i| &self.keypairs[i])
            .ok_or_else(|| key_not_found(public_key))
    }
}

#[async_trait]
impl Keyring for SoftwareKeyring {
    fn kind(&self) -> KeyringKind {
        KeyringKind::Software
    }

    fn public_keys(&self) -> Vec<PublicKey> {
        self.keypairs.iter().map(KeyPair::public_key).collect()
    }

    async fn sign_transaction(
        &self,
        tx_message: &[u8],
        public_key: &PublicKey,
    ) -> Result<String, SignerError> {
        let kp = self.keypair(public_key)?;
        Ok(kp.sign_base58(tx_message))
    }

    async fn sign_message(
        &self,
        message: &[u8],
        public_key: &PublicKey,
    ) -> Result<String, SignerError> {
        // No signing-domain check: messages are signed exactly like transactions.
        debug!(%public_key, "sign_message delegating to sign_transaction");
        self.sign_transaction(message, public_key).await
    }

    fn export_secret_key(&self, public_key: &PublicKey) -> Option<SecretString> {
        let i = self.position(public_key)?;
        let bytes = self.keypairs[i].secret_bytes();
        Some(Zeroizing::new(bs58::encode(bytes.as_slice()).into_string()))
    }

    fn import_secret_key(&mut self, secret_key: &str) -> Result<PublicKey, SignerError> {
        let bytes = secret_from_hex(secret_key).map_err(|e| {
            warn!(secret = %redact_body(secret_key), "secret key is not hex");
            e
        })?;
        let kp = KeyPair::from_secret_bytes(&bytes).map_err(|e| {
            warn!(secret = %redact_hex_bytes(&bytes), error = %e, "rejected secret key");
            e
        })?;
        let public_key = self.insert(kp);
        info!(%public_key, "imported secret key");
        Ok(public_key)
    }

    fn delete_public_key(&mut self, public_key: &PublicKey) {
        if let Some(i) = self.position(public_key) {
            self.keypairs.remove(i);
            info!(%public_key, "deleted key");
        }
    }

    fn to_snapshot(&self) -> KeyringSnapshot {
        let secret_keys = self
            .keypairs
            .iter()
            .map(|kp| {
                let hex = secret_to_hex(kp.secret_bytes().as_slice());
                hex.as_str().to_owned()
            })
            .collect();
        KeyringSnapshot::Software(SoftwareKeyringSnapshot { secret_keys })
    }
}

impl fmt::Debug for SoftwareKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareKeyring")
            .field("public_keys", &self.public_keys())
            .finish()
    }
}
