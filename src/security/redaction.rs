// Simple helpers to avoid accidental printing of secrets in logs/tests.
use std::env;

fn secrets_allowed() -> bool {
    env::var("DEV_PRINT_SECRETS").ok().as_deref() == Some("1")
}

/// Redact a text body unless DEV_PRINT_SECRETS=1 is set in the environment.
/// By default this returns a short placeholder containing only the length.
pub fn redact_body(s: &str) -> String {
    if secrets_allowed() {
        return s.to_string();
    }
    format!("<redacted len={}>", s.len())
}

/// Redact hex-serializable bytes unless DEV_PRINT_SECRETS=1 is set.
pub fn redact_hex_bytes(bytes: &[u8]) -> String {
    if secrets_allowed() {
        return format!("0x{}", hex::encode(bytes));
    }
    format!("<redacted hex len={}>", bytes.len())
}

/// Short form of a payload for debug logs: length plus the first bytes.
/// Never used for secret material.
pub fn payload_preview(bytes: &[u8]) -> String {
    const PREVIEW: usize = 8;
    let head = &bytes[..bytes.len().min(PREVIEW)];
    if bytes.len() > PREVIEW {
        format!("{}.. ({} bytes)", hex::encode(head), bytes.len())
    } else {
        format!("{} ({} bytes)", hex::encode(head), bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_redacted_by_default() {
        env::remove_var("DEV_PRINT_SECRETS");
        assert_eq!(redact_body("seed words"), "<redacted len=10>");
        assert_eq!(redact_hex_bytes(&[1, 2, 3]), "<redacted hex len=3>");
    }

    #[test]
    fn test_payload_preview() {
        assert_eq!(payload_preview(&[0xff, 0x00]), "ff00 (2 bytes)");
        assert_eq!(payload_preview(&[0u8; 20]), "0000000000000000.. (20 bytes)");
    }
}
