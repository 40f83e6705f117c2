//! Solana wire layouts the signing paths depend on.

use crate::core::errors::SignerError;

/// Leading tag byte of an offchain message frame.
pub const OFFCHAIN_TAG: u8 = 0xff;
/// Signing domain following the tag.
pub const OFFCHAIN_SIGNING_DOMAIN: &[u8] = b"solana offchain";
pub const OFFCHAIN_VERSION: u8 = 0;
pub const OFFCHAIN_FORMAT: u8 = 0;
/// Largest message the 16-bit length field can describe.
pub const OFFCHAIN_MAX_LEN: usize = u16::MAX as usize;

const SIGNATURE_LEN: usize = 64;

/// `0xFF || "solana offchain" || version || format || LE16(len) || message`
pub fn offchain_message_frame(message: &[u8]) -> Result<Vec<u8>, SignerError> {
    let len = u16::try_from(message.len()).map_err(|_| {
        SignerError::ProtocolFraming(format!(
            "offchain message is {} bytes, limit is {}",
            message.len(),
            OFFCHAIN_MAX_LEN
        ))
    })?;

    let mut frame = Vec::with_capacity(1 + OFFCHAIN_SIGNING_DOMAIN.len() + 4 + message.len());
    frame.push(OFFCHAIN_TAG);
    frame.extend_from_slice(OFFCHAIN_SIGNING_DOMAIN);
    frame.push(OFFCHAIN_VERSION);
    frame.push(OFFCHAIN_FORMAT);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(message);
    Ok(frame)
}

/// Check a frame built by [`offchain_message_frame`] and return the message.
pub fn offchain_frame_message(frame: &[u8]) -> Result<&[u8], SignerError> {
    let header_len = 1 + OFFCHAIN_SIGNING_DOMAIN.len() + 4;
    if frame.len() < header_len
        || frame[0] != OFFCHAIN_TAG
        || &frame[1..1 + OFFCHAIN_SIGNING_DOMAIN.len()] != OFFCHAIN_SIGNING_DOMAIN
    {
        return Err(SignerError::ProtocolFraming(
            "not an offchain message frame".to_string(),
        ));
    }
    let (version, format) = (frame[header_len - 4], frame[header_len - 3]);
    if version != OFFCHAIN_VERSION || format != OFFCHAIN_FORMAT {
        return Err(SignerError::ProtocolFraming(format!(
            "unsupported offchain version {} format {}",
            version, format
        )));
    }
    let len_at = header_len - 2;
    let declared = usize::from(u16::from_le_bytes([frame[len_at], frame[len_at + 1]]));
    let message = &frame[header_len..];
    if message.len() != declared {
        return Err(SignerError::ProtocolFraming(format!(
            "offchain frame declares {} bytes, carries {}",
            declared,
            message.len()
        )));
    }
    Ok(message)
}

/// Decode a compact-u16 ("shortvec") length. Returns the value and bytes consumed.
pub fn decode_compact_u16(bytes: &[u8]) -> Result<(u16, usize), SignerError> {
    let mut value: u32 = 0;
    for i in 0..3 {
        let byte = *bytes.get(i).ok_or_else(|| {
            SignerError::ProtocolFraming("truncated compact-u16 length".to_string())
        })?;
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            if i > 0 && byte == 0 {
                return Err(SignerError::ProtocolFraming(
                    "non-canonical compact-u16 length".to_string(),
                ));
            }
            let value = u16::try_from(value).map_err(|_| {
                SignerError::ProtocolFraming("compact-u16 length overflow".to_string())
            })?;
            return Ok((value, i + 1));
        }
    }
    Err(SignerError::ProtocolFraming(
        "compact-u16 length longer than 3 bytes".to_string(),
    ))
}

/// Message section of a serialized transaction: everything after the
/// signature count and the signatures themselves.
pub fn transaction_message(tx: &[u8]) -> Result<&[u8], SignerError> {
    let (count, consumed) = decode_compact_u16(tx)?;
    let start = consumed + usize::from(count) * SIGNATURE_LEN;
    if tx.len() <= start {
        return Err(SignerError::ProtocolFraming(format!(
            "transaction of {} bytes holds no message after {} signatures",
            tx.len(),
            count
        )));
    }
    Ok(&tx[start..])
}
