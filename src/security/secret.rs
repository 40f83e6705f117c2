//! Small helpers and aliases for secret buffers that must be zeroized on drop.
use zeroize::Zeroizing;

use crate::core::errors::SignerError;

/// Common alias for secret byte buffers which will be zeroed when dropped.
pub type SecretVec = Zeroizing<Vec<u8>>;

/// Secret text (mnemonics, exported keys, passwords) zeroed when dropped.
pub type SecretString = Zeroizing<String>;

/// Convert a Vec<u8> into a `SecretVec` which will be zeroized on drop.
pub fn vec_to_secret(v: Vec<u8>) -> SecretVec {
    Zeroizing::new(v)
}

/// Decode hex straight into a zeroizing buffer.
pub fn secret_from_hex(s: &str) -> Result<SecretVec, SignerError> {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    Ok(vec_to_secret(hex::decode(trimmed)?))
}

/// Hex-encode secret bytes into a zeroizing string.
pub fn secret_to_hex(bytes: &[u8]) -> SecretString {
    Zeroizing::new(hex::encode(bytes))
}
