//! Ed25519 key material
//!
//! `PublicKey` is the base58 identifier used across the request pipeline;
//! `KeyPair` owns the signing key and zeroizes it on drop.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::core::errors::SignerError;

/// 32-byte public key, displayed and serialized as base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PublicKey::LEN]);

impl PublicKey {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Check a base58 signature produced by one of the keyrings.
    pub fn verify(&self, message: &[u8], signature_b58: &str) -> Result<bool, SignerError> {
        let raw = bs58::decode(signature_b58).into_vec()?;
        let bytes: [u8; 64] = raw.as_slice().try_into().map_err(|_| {
            SignerError::ProtocolFraming(format!("signature must be 64 bytes, got {}", raw.len()))
        })?;
        let verifying = VerifyingKey::from_bytes(&self.0)
            .map_err(|e| SignerError::ProtocolFraming(format!("invalid public key: {}", e)))?;
        let signature = ed25519_dalek::Signature::from_bytes(&bytes);
        Ok(verifying.verify(message, &signature).is_ok())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

impl FromStr for PublicKey {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = bs58::decode(s.trim()).into_vec()?;
        let bytes: [u8; Self::LEN] = raw.as_slice().try_into().map_err(|_| {
            SignerError::ProtocolFraming(format!(
                "public key must be {} bytes, got {}",
                Self::LEN,
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Ed25519 keypair. The secret half never leaves except through
/// [`KeyPair::secret_bytes`], which hands out a zeroizing copy.
pub struct KeyPair {
    signing: SigningKey,
    public: PublicKey,
}

impl KeyPair {
    /// Length of the `seed || public key` export layout.
    pub const SECRET_LEN: usize = 64;

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_signing(SigningKey::from_bytes(seed))
    }

    /// Accepts the 64-byte `seed || public key` layout (the embedded public key
    /// must match) or a bare 32-byte seed.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, SignerError> {
        match bytes.len() {
            Self::SECRET_LEN => {
                let mut buf = Zeroizing::new([0u8; Self::SECRET_LEN]);
                buf.copy_from_slice(bytes);
                let signing = SigningKey::from_keypair_bytes(&buf).map_err(|_| {
                    SignerError::InvalidSecretKey("public key does not match secret".to_string())
                })?;
                Ok(Self::from_signing(signing))
            }
            32 => {
                let mut seed = Zeroizing::new([0u8; 32]);
                seed.copy_from_slice(bytes);
                Ok(Self::from_seed(&seed))
            }
            n => Err(SignerError::InvalidSecretKey(format!(
                "expected 32 or 64 bytes, got {}",
                n
            ))),
        }
    }

    pub fn generate() -> Self {
        Self::from_signing(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    fn from_signing(signing: SigningKey) -> Self {
        let public = PublicKey(signing.verifying_key().to_bytes());
        Self { signing, public }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// `seed || public key`, zeroed when the returned buffer drops.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; Self::SECRET_LEN]> {
        Zeroizing::new(self.signing.to_keypair_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// Detached signature, base58 encoded.
    pub fn sign_base58(&self, message: &[u8]) -> String {
        bs58::encode(self.sign(message)).into_string()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
