//! HD keyring: one BIP-39 seed, an ordered list of derivation paths, and the
//! keypairs materialized from them. `derivation_paths[i]` always belongs to
//! `keypairs[i]`.

use async_trait::async_trait;
use std::fmt;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::core::errors::SignerError;
use crate::keyring::derivation::{derive_keypair, highest_indices, DerivationPath};
use crate::keyring::keypair::{KeyPair, PublicKey};
use crate::keyring::snapshot::{HdKeyringSnapshot, KeyringSnapshot};
use crate::keyring::{key_not_found, Keyring, KeyringKind};
use crate::security::secret::secret_to_hex;
use crate::security::{SecretString, SecretVec};

/// Result of [`HdKeyring::derive_next_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub public_key: PublicKey,
    pub derivation_path: String,
}

pub struct HdKeyring {
    mnemonic: SecretString,
    seed: SecretVec,
    derivation_paths: Vec<String>,
    keypairs: Vec<KeyPair>,
    account_index: Option<u32>,
    wallet_index: Option<u32>,
}

impl HdKeyring {
    /// Materialize every path. Repeated paths keep their first occurrence.
    pub(crate) fn new(
        mnemonic: SecretString,
        seed: SecretVec,
        derivation_paths: &[String],
        account_index: Option<u32>,
        wallet_index: Option<u32>,
    ) -> Result<Self, SignerError> {
        let mut keyring = Self {
            mnemonic,
            seed,
            derivation_paths: Vec::with_capacity(derivation_paths.len()),
            keypairs: Vec::with_capacity(derivation_paths.len()),
            account_index,
            wallet_index,
        };
        for path in derivation_paths {
            keyring.add_derivation_path(path)?;
        }
        Ok(keyring)
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn derivation_paths(&self) -> &[String] {
        &self.derivation_paths
    }

    pub fn account_index(&self) -> Option<u32> {
        self.account_index
    }

    pub fn wallet_index(&self) -> Option<u32> {
        self.wallet_index
    }

    /// Fill whichever index is still undefined from the paths in use.
    /// Defined values, zero included, are kept.
    fn ensure_indices(&mut self) -> (u32, u32) {
        if self.account_index.is_none() || self.wallet_index.is_none() {
            let (account, wallet) =
                highest_indices(self.derivation_paths.iter().map(String::as_str));
            if self.account_index.is_none() {
                self.account_index = Some(account);
            }
            if self.wallet_index.is_none() {
                self.wallet_index = Some(wallet);
            }
            debug!(account, wallet, "reconstructed derivation indices");
        }
        (
            self.account_index.unwrap_or_default(),
            self.wallet_index.unwrap_or_default(),
        )
    }

    /// First unused path after the current wallet index, with its offset.
    pub fn next_derivation_path(&mut self) -> (String, u32) {
        let (account, wallet) = self.ensure_indices();
        let mut offset = 1u32;
        loop {
            let path = DerivationPath::indexed(account, wallet.saturating_add(offset)).to_string();
            if !self.derivation_paths.contains(&path) {
                return (path, offset);
            }
            offset += 1;
        }
    }

    /// Derive the next unused key and commit the advanced wallet index.
    pub fn derive_next_key(&mut self) -> Result<DerivedKey, SignerError> {
        let (derivation_path, offset) = self.next_derivation_path();
        let public_key = self.add_derivation_path(&derivation_path)?;
        let wallet = self.wallet_index.unwrap_or_default();
        self.wallet_index = Some(wallet.saturating_add(offset));
        info!(%public_key, path = %derivation_path, "derived next key");
        Ok(DerivedKey {
            public_key,
            derivation_path,
        })
    }

    /// Derive and append `path`, stored in canonical `m/44'/..` form. An
    /// existing path, in any accepted notation, is left alone and its public
    /// key returned.
    pub fn add_derivation_path(&mut self, path: &str) -> Result<PublicKey, SignerError> {
        let parsed: DerivationPath = path.parse()?;
        let canonical = parsed.to_string();
        if let Some(i) = self.derivation_paths.iter().position(|p| *p == canonical) {
            return Ok(self.keypairs[i].public_key());
        }
        let keypair = derive_keypair(&self.seed, &parsed)?;
        let public_key = keypair.public_key();
        self.derivation_paths.push(canonical);
        self.keypairs.push(keypair);
        Ok(public_key)
    }

    /// Path that produced `public_key`.
    pub fn derivation_path_of(&self, public_key: &PublicKey) -> Option<&str> {
        self.position(public_key)
            .map(|i| self.derivation_paths[i].as_str())
    }

    fn position(&self, public_key: &PublicKey) -> Option<usize> {
        self.keypairs.iter().position(|kp| kp.public_key() == *public_key)
    }
}

#[async_trait]
impl Keyring for HdKeyring {
    fn kind(&self) -> KeyringKind {
        KeyringKind::Hd
    }

    fn public_keys(&self) -> Vec<PublicKey> {
        self.keypairs.iter().map(KeyPair::public_key).collect()
    }

    async fn sign_transaction(
        &self,
        tx_message: &[u8],
        public_key: &PublicKey,
    ) -> Result<String, SignerError> {
        let i = self.position(public_key).ok_or_else(|| key_not_found(public_key))?;
        Ok(self.keypairs[i].sign_base58(tx_message))
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

    fn import_secret_key(&mut self, _secret_key: &str) -> Result<PublicKey, SignerError> {
        Err(SignerError::Unsupported {
            keyring: "hd",
            operation: "importing secret keys",
        })
    }

    fn delete_public_key(&mut self, public_key: &PublicKey) {
        if let Some(i) = self.position(public_key) {
            self.keypairs.remove(i);
            let path = self.derivation_paths.remove(i);
            info!(%public_key, %path, "deleted key");
        }
    }

    fn to_snapshot(&self) -> KeyringSnapshot {
        KeyringSnapshot::Hd(HdKeyringSnapshot {
            mnemonic: self.mnemonic.as_str().to_owned(),
            seed: secret_to_hex(&self.seed).as_str().to_owned(),
            derivation_paths: self.derivation_paths.clone(),
            account_index: self.account_index,
            wallet_index: self.wallet_index,
        })
    }
}

impl fmt::Debug for HdKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdKeyring")
            .field("mnemonic", &"[REDACTED]")
            .field("derivation_paths", &self.derivation_paths)
            .field("account_index", &self.account_index)
            .field("wallet_index", &self.wallet_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON_SEED_HEX: &str = "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc19a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4";

    fn keyring(paths: &[&str], account: Option<u32>, wallet: Option<u32>) -> HdKeyring {
        let seed = Zeroizing::new(hex::decode(ABANDON_SEED_HEX).unwrap());
        let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        HdKeyring::new(Zeroizing::new("test".into()), seed, &paths, account, wallet).unwrap()
    }

    #[test]
    fn test_reconstructs_only_missing_indices() {
        let mut kr = keyring(&["m/44'/501'/2'/4'"], Some(0), None);
        let (path, offset) = kr.next_derivation_path();
        assert_eq!(kr.account_index(), Some(0));
        assert_eq!(kr.wallet_index(), Some(4));
        assert_eq!(path, "m/44'/501'/0'/5'");
        assert_eq!(offset, 1);
    }

    #[test]
    fn test_next_path_skips_existing() {
        let mut kr = keyring(
            &["m/44'/501'/0'/0'", "m/44'/501'/0'/1'", "m/44'/501'/0'/2'"],
            Some(0),
            Some(0),
        );
        let (path, offset) = kr.next_derivation_path();
        assert_eq!(path, "m/44'/501'/0'/3'");
        assert_eq!(offset, 3);

        let derived = kr.derive_next_key().unwrap();
        assert_eq!(derived.derivation_path, "m/44'/501'/0'/3'");
        assert_eq!(kr.wallet_index(), Some(3));
    }

    #[test]
    fn test_duplicate_input_paths_collapse() {
        let kr = keyring(&["m/44'/501'/0'/0'", "m/44'/501'/0'/0'"], None, None);
        assert_eq!(kr.derivation_paths().len(), 1);
        assert_eq!(kr.public_keys().len(), 1);
    }

    #[test]
    fn test_invalid_path_fails_construction() {
        let seed = Zeroizing::new(hex::decode(ABANDON_SEED_HEX).unwrap());
        let err = HdKeyring::new(
            Zeroizing::new("test".into()),
            seed,
            &["m/44'/501'/0'/0".to_string()],
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SignerError::InvalidDerivationPath(_)));
    }

    #[test]
    fn test_import_unsupported() {
        let mut kr = keyring(&[], None, None);
        let err = kr.import_secret_key("00").unwrap_err();
        assert!(matches!(err, SignerError::Unsupported { .. }));
    }

    #[test]
    fn test_delete_keeps_alignment() {
        let mut kr = keyring(
            &["m/44'/501'/0'/0'", "m/44'/501'/0'/1'", "m/44'/501'/0'/2'"],
            None,
            None,
        );
        let keys = kr.public_keys();
        kr.delete_public_key(&keys[1]);
        assert_eq!(kr.derivation_paths(), &["m/44'/501'/0'/0'", "m/44'/501'/0'/2'"]);
        assert_eq!(kr.derivation_path_of(&keys[2]), Some("m/44'/501'/0'/2'"));
        assert!(kr.export_secret_key(&keys[1]).is_none());
    }
}
