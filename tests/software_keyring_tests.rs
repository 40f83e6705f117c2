// Software keyring: import/export formats, snapshots and signing.

use secure_keyring::keyring::{
    restore_keyring, KeyPair, Keyring, KeyringFactory, KeyringKind, KeyringSnapshot,
    SoftwareKeyring, SoftwareKeyringFactory,
};
use secure_keyring::{RequestQueue, SignerError};
use zeroize::Zeroizing;

const SEED_SEVEN_PUBKEY: &str = "GmaDrppBC7P5ARKV8g3djiwP89vz1jLK23V2GBjuAEGB";

fn seven_hex() -> String {
    format!(
        "{}{}",
        "07".repeat(32),
        "ea4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c"
    )
}

#[test]
fn test_import_hex_keypair() {
    let mut keyring = SoftwareKeyring::new();
    let pk = keyring.import_secret_key(&seven_hex()).unwrap();
    assert_eq!(pk.to_string(), SEED_SEVEN_PUBKEY);
    assert_eq!(keyring.public_keys(), vec![pk]);
}

#[test]
fn test_import_is_idempotent() {
    let mut keyring = SoftwareKeyring::new();
    let a = keyring.import_secret_key(&seven_hex()).unwrap();
    let b = keyring.import_secret_key(&seven_hex()).unwrap();
    assert_eq!(a, b);
    assert_eq!(keyring.public_keys().len(), 1);
}

#[test]
fn test_import_rejects_mismatched_public_half() {
    let mut bad = "07".repeat(32);
    bad.push_str(&"00".repeat(32));
    let err = SoftwareKeyring::new().import_secret_key(&bad).unwrap_err();
    assert!(matches!(err, SignerError::InvalidSecretKey(_)));
}

#[test]
fn test_import_rejects_garbage() {
    let mut keyring = SoftwareKeyring::new();
    assert!(keyring.import_secret_key("not hex").is_err());
    assert!(keyring.import_secret_key("0102").is_err());
    assert!(keyring.public_keys().is_empty());
}

#[test]
fn test_export_is_base58_keypair() {
    let keyring = SoftwareKeyring::from_keypairs([KeyPair::from_seed(&[7u8; 32])]);
    let pk = keyring.public_keys()[0];
    let exported = keyring.export_secret_key(&pk).unwrap();
    let bytes = bs58::decode(exported.as_str()).into_vec().unwrap();
    assert_eq!(hex::encode(bytes), seven_hex());
}

#[test]
fn test_export_unknown_key() {
    let keyring = SoftwareKeyring::new();
    let pk = KeyPair::from_seed(&[1u8; 32]).public_key();
    assert!(keyring.export_secret_key(&pk).is_none());
}

#[test]
fn test_factory_and_snapshot() {
    let keyring = SoftwareKeyringFactory
        .init(vec![Zeroizing::new(seven_hex())])
        .unwrap();

    let snapshot = keyring.to_snapshot();
    let json = snapshot.to_json().unwrap();
    assert!(json.contains("secretKeys"));
    assert!(json.contains(&seven_hex()));

    let restored = restore_keyring(
        &KeyringSnapshot::from_json(&json).unwrap(),
        &RequestQueue::new("device"),
    )
    .unwrap();
    assert_eq!(restored.kind(), KeyringKind::Software);
    assert_eq!(restored.public_keys(), keyring.public_keys());
}

#[test]
fn test_delete_then_snapshot_is_empty() {
    let mut keyring = SoftwareKeyring::from_keypairs([KeyPair::from_seed(&[7u8; 32])]);
    let pk = keyring.public_keys()[0];
    keyring.delete_public_key(&pk);
    // Deleting twice is a no-op.
    keyring.delete_public_key(&pk);

    match keyring.to_snapshot() {
        KeyringSnapshot::Software(s) => assert!(s.secret_keys.is_empty()),
        other => panic!("unexpected snapshot {:?}", other),
    }
}

#[tokio::test]
async fn test_sign_message_signs_raw_bytes() {
    let keyring = SoftwareKeyring::from_keypairs([KeyPair::from_seed(&[7u8; 32])]);
    let pk = keyring.public_keys()[0];

    let message_sig = keyring.sign_message(b"hello", &pk).await.unwrap();
    let tx_sig = keyring.sign_transaction(b"hello", &pk).await.unwrap();
    assert_eq!(message_sig, tx_sig);
    assert!(pk.verify(b"hello", &message_sig).unwrap());
}
