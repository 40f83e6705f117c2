//! Keyring constructors: from raw input and from snapshots.

use bip39::Mnemonic;
use tracing::info;
use zeroize::{Zeroize, Zeroizing};

use crate::confirmation::queue::RequestQueue;
use crate::core::errors::SignerError;
use crate::keyring::hardware::HardwareKeyring;
use crate::keyring::hd::HdKeyring;
use crate::keyring::snapshot::{
    HardwareKeyringSnapshot, HdKeyringSnapshot, KeyringSnapshot, SoftwareKeyringSnapshot,
};
use crate::keyring::software::SoftwareKeyring;
use crate::keyring::{Keyring, WalletDescriptor};
use crate::security::secret::secret_from_hex;
use crate::security::SecretString;

pub trait KeyringFactory {
    type Input;
    type Snapshot;
    type Output: Keyring;

    fn init(&self, input: Self::Input) -> Result<Self::Output, SignerError>;

    fn from_snapshot(&self, snapshot: &Self::Snapshot) -> Result<Self::Output, SignerError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareKeyringFactory;

impl KeyringFactory for SoftwareKeyringFactory {
    /// Hex secret keys.
    type Input = Vec<SecretString>;
    type Snapshot = SoftwareKeyringSnapshot;
    type Output = SoftwareKeyring;

    fn init(&self, input: Self::Input) -> Result<SoftwareKeyring, SignerError> {
        let mut keyring = SoftwareKeyring::new();
        for secret in &input {
            keyring.import_secret_key(secret)?;
        }
        Ok(keyring)
    }

    fn from_snapshot(
        &self,
        snapshot: &SoftwareKeyringSnapshot,
    ) -> Result<SoftwareKeyring, SignerError> {
        let mut keyring = SoftwareKeyring::new();
        for secret in &snapshot.secret_keys {
            keyring.import_secret_key(secret)?;
        }
        Ok(keyring)
    }
}

/// Raw input for a new HD keyring.
pub struct HdKeyringInit {
    pub mnemonic: SecretString,
    pub derivation_paths: Vec<String>,
    pub account_index: Option<u32>,
    pub wallet_index: Option<u32>,
}

impl HdKeyringInit {
    /// Fresh keyring at `m/44'/501'/0'/0'` with both indices at zero.
    pub fn new(mnemonic: SecretString) -> Self {
        Self {
            mnemonic,
            derivation_paths: vec![crate::keyring::indexed_path(0, 0)],
            account_index: Some(0),
            wallet_index: Some(0),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HdKeyringFactory;

impl KeyringFactory for HdKeyringFactory {
    type Input = HdKeyringInit;
    type Snapshot = HdKeyringSnapshot;
    type Output = HdKeyring;

    /// Rejects an invalid mnemonic before anything is derived.
    fn init(&self, input: HdKeyringInit) -> Result<HdKeyring, SignerError> {
        let mnemonic = Mnemonic::parse(input.mnemonic.as_str())
            .map_err(|e| SignerError::InvalidMnemonic(e.to_string()))?;
        let mut seed = mnemonic.to_seed("");
        let secret_seed = Zeroizing::new(seed.to_vec());
        seed.zeroize();

        let keyring = HdKeyring::new(
            input.mnemonic,
            secret_seed,
            &input.derivation_paths,
            input.account_index,
            input.wallet_index,
        )?;
        info!(keys = keyring.derivation_paths().len(), "initialized hd keyring");
        Ok(keyring)
    }

    /// Trusts the stored seed; the mnemonic is carried along for export.
    fn from_snapshot(&self, snapshot: &HdKeyringSnapshot) -> Result<HdKeyring, SignerError> {
        let seed = secret_from_hex(&snapshot.seed)?;
        HdKeyring::new(
            Zeroizing::new(snapshot.mnemonic.clone()),
            seed,
            &snapshot.derivation_paths,
            snapshot.account_index,
            snapshot.wallet_index,
        )
    }
}

/// Hardware keyrings share the device queue their signatures go through.
#[derive(Debug, Clone)]
pub struct HardwareKeyringFactory {
    device_queue: RequestQueue,
}

impl HardwareKeyringFactory {
    pub fn new(device_queue: RequestQueue) -> Self {
        Self { device_queue }
    }
}

impl KeyringFactory for HardwareKeyringFactory {
    type Input = Vec<WalletDescriptor>;
    type Snapshot = HardwareKeyringSnapshot;
    type Output = HardwareKeyring;

    fn init(&self, input: Vec<WalletDescriptor>) -> Result<HardwareKeyring, SignerError> {
        Ok(HardwareKeyring::new(input, self.device_queue.clone()))
    }

    fn from_snapshot(
        &self,
        snapshot: &HardwareKeyringSnapshot,
    ) -> Result<HardwareKeyring, SignerError> {
        self.init(snapshot.wallet_descriptors.clone())
    }
}

/// Rebuild whichever keyring `snapshot` came from.
pub fn restore_keyring(
    snapshot: &KeyringSnapshot,
    device_queue: &RequestQueue,
) -> Result<Box<dyn Keyring>, SignerError> {
    let keyring: Box<dyn Keyring> = match snapshot {
        KeyringSnapshot::Software(s) => Box::new(SoftwareKeyringFactory.from_snapshot(s)?),
        KeyringSnapshot::Hd(s) => Box::new(HdKeyringFactory.from_snapshot(s)?),
        KeyringSnapshot::Hardware(s) => {
            Box::new(HardwareKeyringFactory::new(device_queue.clone()).from_snapshot(s)?)
        }
    };
    info!(kind = %keyring.kind(), keys = keyring.public_keys().len(), "restored keyring");
    Ok(keyring)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_invalid_mnemonic_fails_fast() {
        let err = HdKeyringFactory
            .init(HdKeyringInit::new(Zeroizing::new("abandon abandon".into())))
            .unwrap_err();
        assert!(matches!(err, SignerError::InvalidMnemonic(_)));
    }

    #[test]
    fn test_new_hd_starts_at_first_path() {
        let kr = HdKeyringFactory
            .init(HdKeyringInit::new(Zeroizing::new(MNEMONIC.into())))
            .unwrap();
        assert_eq!(kr.derivation_paths(), &["m/44'/501'/0'/0'"]);
        assert_eq!(
            kr.public_keys()[0].to_string(),
            "HAgk14JpMQLgt6rVgv7cBQFJWFto5Dqxi472uT3DKpqk"
        );
    }

    #[test]
    fn test_software_init_rejects_garbage() {
        let err = SoftwareKeyringFactory
            .init(vec![Zeroizing::new("not hex".into())])
            .unwrap_err();
        assert!(matches!(err, SignerError::InvalidSecretKey(_)));
    }
}
