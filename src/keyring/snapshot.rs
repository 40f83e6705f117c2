//! Serialized keyring state (JSON, camelCase).
//!
//! Secret-bearing snapshots wipe themselves on drop; persisting them is the
//! embedding host's job.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::keyring::WalletDescriptor;

#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareKeyringSnapshot {
    /// Hex of each 64-byte `seed || public key`.
    pub secret_keys: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct HdKeyringSnapshot {
    pub mnemonic: String,
    /// Hex of the 64-byte BIP-39 seed.
    pub seed: String,
    pub derivation_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareKeyringSnapshot {
    pub wallet_descriptors: Vec<WalletDescriptor>,
}

/// Any keyring's snapshot. Untagged: the field names tell the variants apart.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyringSnapshot {
    Hd(HdKeyringSnapshot),
    Software(SoftwareKeyringSnapshot),
    Hardware(HardwareKeyringSnapshot),
}

impl KeyringSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl fmt::Debug for SoftwareKeyringSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareKeyringSnapshot")
            .field("secret_keys", &format_args!("[{} redacted]", self.secret_keys.len()))
            .finish()
    }
}

impl fmt::Debug for HdKeyringSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdKeyringSnapshot")
            .field("mnemonic", &"[REDACTED]")
            .field("seed", &"[REDACTED]")
            .field("derivation_paths", &self.derivation_paths)
            .field("account_index", &self.account_index)
            .field("wallet_index", &self.wallet_index)
            .finish()
    }
}

impl fmt::Debug for KeyringSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyringSnapshot::Hd(s) => s.fmt(f),
            KeyringSnapshot::Software(s) => s.fmt(f),
            KeyringSnapshot::Hardware(s) => s.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_dispatch() {
        let hd = KeyringSnapshot::from_json(
            r#"{"mnemonic":"m","seed":"00","derivationPaths":[],"accountIndex":0}"#,
        )
        .unwrap();
        match hd {
            KeyringSnapshot::Hd(ref s) => {
                assert_eq!(s.account_index, Some(0));
                assert_eq!(s.wallet_index, None);
            }
            other => panic!("unexpected {:?}", other),
        }

        let sw = KeyringSnapshot::from_json(r#"{"secretKeys":["aa"]}"#).unwrap();
        assert!(matches!(sw, KeyringSnapshot::Software(_)));

        let hw = KeyringSnapshot::from_json(r#"{"walletDescriptors":[]}"#).unwrap();
        assert!(matches!(hw, KeyringSnapshot::Hardware(_)));

        assert!(KeyringSnapshot::from_json(r#"{"other":1}"#).is_err());
    }

    #[test]
    fn test_absent_indices_not_serialized() {
        let snap = KeyringSnapshot::Hd(HdKeyringSnapshot {
            mnemonic: "m".into(),
            seed: "00".into(),
            derivation_paths: vec![],
            account_index: None,
            wallet_index: Some(3),
        });
        let json = snap.to_json().unwrap();
        assert!(!json.contains("accountIndex"));
        assert!(json.contains("\"walletIndex\":3"));
    }

    #[test]
    fn test_debug_redacts() {
        let snap = SoftwareKeyringSnapshot { secret_keys: vec!["deadbeef".into()] };
        let dbg = format!("{:?}", snap);
        assert!(!dbg.contains("deadbeef"));
    }
}
