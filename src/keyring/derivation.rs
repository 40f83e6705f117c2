//! SLIP-0010 Ed25519 hierarchical derivation
//!
//! Path format: m/44'/501'/account'/wallet'
//!
//! Ed25519 only defines hardened children, so every path component must carry
//! the `'` (or `h`) marker.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use zeroize::Zeroizing;

use crate::core::errors::SignerError;
use crate::keyring::keypair::KeyPair;

type HmacSha512 = Hmac<Sha512>;

pub const PURPOSE: u32 = 44;
/// Solana coin type
pub const SOLANA_COIN_TYPE: u32 = 501;

const HARDENED_OFFSET: u32 = 0x8000_0000;
const MIN_SEED_LEN: usize = 16;

/// A fully hardened derivation path, stored without the hardened bit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationPath {
    components: Vec<u32>,
}

impl DerivationPath {
    /// `m/44'/501'/{account}'/{wallet}'`
    pub fn indexed(account_index: u32, wallet_index: u32) -> Self {
        Self {
            components: vec![PURPOSE, SOLANA_COIN_TYPE, account_index, wallet_index],
        }
    }

    pub fn components(&self) -> &[u32] {
        &self.components
    }

    /// Third component, when present.
    pub fn account_index(&self) -> Option<u32> {
        self.components.get(2).copied()
    }

    /// Fourth component, when present.
    pub fn wallet_index(&self) -> Option<u32> {
        self.components.get(3).copied()
    }

    /// Path text without the `m/` root, the form hardware apps expect.
    pub fn without_root(&self) -> String {
        let text = self.to_string();
        strip_root(&text).to_string()
    }

    /// Also accepts the root-less form carried by device requests.
    pub fn parse_lenient(path: &str) -> Result<Self, SignerError> {
        let trimmed = path.trim();
        if trimmed.starts_with("m/") {
            trimmed.parse()
        } else {
            format!("m/{}", trimmed).parse()
        }
    }

    /// Components with the hardened bit set, as serialized on the wire.
    pub fn hardened_components(&self) -> impl Iterator<Item = u32> + '_ {
        self.components.iter().map(|c| c | HARDENED_OFFSET)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for c in &self.components {
            write!(f, "/{}'", c)?;
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("m/")
            .ok_or_else(|| SignerError::InvalidDerivationPath(format!("{} (missing m/ root)", s)))?;

        let mut components = Vec::new();
        for part in body.split('/') {
            let digits = part
                .strip_suffix('\'')
                .or_else(|| part.strip_suffix('h'))
                .ok_or_else(|| {
                    SignerError::InvalidDerivationPath(format!(
                        "{} (component '{}' is not hardened)",
                        s, part
                    ))
                })?;
            let index: u32 = digits.parse().map_err(|_| {
                SignerError::InvalidDerivationPath(format!("{} (bad component '{}')", s, part))
            })?;
            if index >= HARDENED_OFFSET {
                return Err(SignerError::InvalidDerivationPath(format!(
                    "{} (component {} out of range)",
                    s, index
                )));
            }
            components.push(index);
        }

        Ok(Self { components })
    }
}

/// `m/44'/501'/{account}'/{wallet}'` as text.
pub fn indexed_path(account_index: u32, wallet_index: u32) -> String {
    DerivationPath::indexed(account_index, wallet_index).to_string()
}

/// Drop a leading `m/`; other text passes through untouched.
pub fn strip_root(path: &str) -> &str {
    path.strip_prefix("m/").unwrap_or(path)
}

/// SLIP-0010 node: private key plus chain code.
struct ExtendedKey {
    key: Zeroizing<[u8; 32]>,
    chain_code: Zeroizing<[u8; 32]>,
}

impl ExtendedKey {
    fn master(seed: &[u8]) -> Result<Self, SignerError> {
        if seed.len() < MIN_SEED_LEN {
            return Err(SignerError::InvalidSecretKey(format!(
                "seed length must be at least {} bytes",
                MIN_SEED_LEN
            )));
        }
        // HMAC-SHA512("ed25519 seed", seed)
        Self::from_hmac(b"ed25519 seed", &[seed])
    }

    fn derive_hardened(&self, index: u32) -> Result<Self, SignerError> {
        // 0x00 || key || ser32(index | 2^31)
        let index_bytes = (index | HARDENED_OFFSET).to_be_bytes();
        Self::from_hmac(self.chain_code.as_slice(), &[&[0u8][..], self.key.as_slice(), &index_bytes[..]])
    }

    fn from_hmac(key: &[u8], parts: &[&[u8]]) -> Result<Self, SignerError> {
        let mut mac = HmacSha512::new_from_slice(key)
            .map_err(|e| SignerError::Internal(format!("HMAC initialization failed: {}", e)))?;
        for part in parts {
            mac.update(part);
        }
        let mut digest = Zeroizing::new([0u8; 64]);
        digest.copy_from_slice(&mac.finalize().into_bytes());

        let mut node = Self {
            key: Zeroizing::new([0u8; 32]),
            chain_code: Zeroizing::new([0u8; 32]),
        };
        node.key.copy_from_slice(&digest[..32]);
        node.chain_code.copy_from_slice(&digest[32..]);
        Ok(node)
    }
}

/// Derive the keypair at `path` from a BIP-39 seed.
pub fn derive_keypair(seed: &[u8], path: &DerivationPath) -> Result<KeyPair, SignerError> {
    let mut node = ExtendedKey::master(seed)?;
    for &index in path.components() {
        node = node.derive_hardened(index)?;
    }
    Ok(KeyPair::from_seed(&node.key))
}

/// Highest `(account, wallet)` pair in use: the largest account index, then the
/// largest wallet index within that account. Missing components count as 0.
pub fn highest_indices<'a>(paths: impl IntoIterator<Item = &'a str>) -> (u32, u32) {
    let mut highest = (0u32, 0u32);
    for raw in paths {
        let path = match raw.parse::<DerivationPath>() {
            Ok(p) => p,
            Err(e) => {
                warn!(path = raw, error = %e, "skipping unparseable derivation path");
                continue;
            }
        };
        let pair = (
            path.account_index().unwrap_or(0),
            path.wallet_index().unwrap_or(0),
        );
        if pair > highest {
            highest = pair;
        }
    }
    highest
}
