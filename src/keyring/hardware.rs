//! Hardware keyring: descriptors of device-held keys. No secret material is
//! resident; every signature is a round trip through the device queue.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::confirmation::queue::{PendingResponse, RequestQueue};
use crate::confirmation::request::{
    LedgerSignMessageRequest, LedgerSignTransactionRequest, SecureRequest, SignMessageRequest,
    SignTransactionRequest,
};
use crate::core::errors::SignerError;
use crate::keyring::derivation::strip_root;
use crate::keyring::keypair::PublicKey;
use crate::keyring::snapshot::{HardwareKeyringSnapshot, KeyringSnapshot};
use crate::keyring::wire::{offchain_message_frame, transaction_message};
use crate::keyring::{key_not_found, Keyring, KeyringKind, WalletDescriptor};
use crate::security::redaction::payload_preview;
use crate::security::SecretString;

#[derive(Debug)]
pub struct HardwareKeyring {
    descriptors: Vec<WalletDescriptor>,
    device_queue: RequestQueue,
}

impl HardwareKeyring {
    /// Descriptors repeating a public key keep their first occurrence.
    pub fn new(descriptors: Vec<WalletDescriptor>, device_queue: RequestQueue) -> Self {
        let mut keyring = Self {
            descriptors: Vec::with_capacity(descriptors.len()),
            device_queue,
        };
        for d in descriptors {
            keyring.add_wallet_descriptor(d);
        }
        keyring
    }

    pub fn wallet_descriptors(&self) -> &[WalletDescriptor] {
        &self.descriptors
    }

    pub fn device_queue(&self) -> &RequestQueue {
        &self.device_queue
    }

    /// Returns false when the public key is already known.
    pub fn add_wallet_descriptor(&mut self, descriptor: WalletDescriptor) -> bool {
        if self.descriptors.iter().any(|d| d.public_key == descriptor.public_key) {
            return false;
        }
        self.descriptors.push(descriptor);
        true
    }

    fn descriptor(&self, public_key: &PublicKey) -> Result<&WalletDescriptor, SignerError> {
        self.descriptors
            .iter()
            .find(|d| d.public_key == *public_key)
            .ok_or_else(|| key_not_found(public_key))
    }

    /// Strip signatures off the base58 transaction and address the device path.
    pub fn prepare_sign_transaction(
        &self,
        request: &SignTransactionRequest,
    ) -> Result<LedgerSignTransactionRequest, SignerError> {
        let descriptor = self.descriptor(&request.public_key)?;
        let tx = bs58::decode(&request.tx).into_vec()?;
        let message = transaction_message(&tx)?;
        self.transaction_for(descriptor, message)
    }

    /// Frame the base58 message as an offchain message for the device.
    pub fn prepare_sign_message(
        &self,
        request: &SignMessageRequest,
    ) -> Result<LedgerSignMessageRequest, SignerError> {
        let descriptor = self.descriptor(&request.public_key)?;
        let message = bs58::decode(&request.message).into_vec()?;
        self.message_for(descriptor, &message)
    }

    fn transaction_for(
        &self,
        descriptor: &WalletDescriptor,
        message: &[u8],
    ) -> Result<LedgerSignTransactionRequest, SignerError> {
        debug!(public_key = %descriptor.public_key, message = %payload_preview(message), "prepared transaction for device");
        Ok(LedgerSignTransactionRequest {
            tx_message: bs58::encode(message).into_string(),
            derivation_path: strip_root(&descriptor.derivation_path).to_string(),
        })
    }

    fn message_for(
        &self,
        descriptor: &WalletDescriptor,
        message: &[u8],
    ) -> Result<LedgerSignMessageRequest, SignerError> {
        let frame = offchain_message_frame(message)?;
        debug!(public_key = %descriptor.public_key, frame = %payload_preview(&frame), "prepared offchain message for device");
        Ok(LedgerSignMessageRequest {
            message: bs58::encode(frame).into_string(),
            derivation_path: strip_root(&descriptor.derivation_path).to_string(),
        })
    }

    pub async fn sign_prepared_transaction(
        &self,
        request: LedgerSignTransactionRequest,
    ) -> Result<String, SignerError> {
        self.round_trip(SecureRequest::LedgerSvmSignTx(request)).await
    }

    pub async fn sign_prepared_message(
        &self,
        request: LedgerSignMessageRequest,
    ) -> Result<String, SignerError> {
        self.round_trip(SecureRequest::LedgerSvmSignMessage(request)).await
    }

    /// Put a prepared `LEDGER_SVM_*` request on the device queue.
    pub fn enqueue_device_request(&self, request: SecureRequest) -> PendingResponse {
        let pending = self.device_queue.enqueue(request);
        info!(id = %pending.id(), "waiting for device");
        pending
    }

    async fn round_trip(&self, request: SecureRequest) -> Result<String, SignerError> {
        self.enqueue_device_request(request)
            .response()
            .await?
            .into_signature()
    }
}

#[async_trait]
impl Keyring for HardwareKeyring {
    fn kind(&self) -> KeyringKind {
        KeyringKind::Hardware
    }

    fn public_keys(&self) -> Vec<PublicKey> {
        self.descriptors.iter().map(|d| d.public_key).collect()
    }

    /// `tx_message` is already the message section.
    async fn sign_transaction(
        &self,
        tx_message: &[u8],
        public_key: &PublicKey,
    ) -> Result<String, SignerError> {
        let descriptor = self.descriptor(public_key)?;
        let prepared = self.transaction_for(descriptor, tx_message)?;
        self.sign_prepared_transaction(prepared).await
    }

    async fn sign_message(
        &self,
        message: &[u8],
        public_key: &PublicKey,
    ) -> Result<String, SignerError> {
        let descriptor = self.descriptor(public_key)?;
        let prepared = self.message_for(descriptor, message)?;
        self.sign_prepared_message(prepared).await
    }

    fn export_secret_key(&self, _public_key: &PublicKey) -> Option<SecretString> {
        None
    }

    fn import_secret_key(&mut self, _secret_key: &str) -> Result<PublicKey, SignerError> {
        Err(SignerError::Unsupported {
            keyring: "hardware",
            operation: "importing secret keys",
        })
    }

    fn delete_public_key(&mut self, public_key: &PublicKey) {
        let before = self.descriptors.len();
        self.descriptors.retain(|d| d.public_key != *public_key);
        if self.descriptors.len() != before {
            info!(%public_key, "deleted wallet descriptor");
        }
    }

    fn to_snapshot(&self) -> KeyringSnapshot {
        KeyringSnapshot::Hardware(HardwareKeyringSnapshot {
            wallet_descriptors: self.descriptors.clone(),
        })
    }

    fn as_hardware(&self) -> Option<&HardwareKeyring> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirmation::request::SecureResponse;
    use crate::keyring::keypair::KeyPair;
    use std::sync::Arc;

    fn keyring() -> (HardwareKeyring, PublicKey) {
        let pk = KeyPair::from_seed(&[7u8; 32]).public_key();
        let kr = HardwareKeyring::new(
            vec![WalletDescriptor {
                public_key: pk,
                derivation_path: "m/44'/501'/0'/0'".into(),
            }],
            RequestQueue::new("device"),
        );
        (kr, pk)
    }

    #[test]
    fn test_prepare_transaction_strips_signatures_and_root() {
        let (kr, pk) = keyring();
        let mut tx = vec![1u8];
        tx.extend_from_slice(&[9u8; 64]);
        tx.extend_from_slice(b"msg");
        let prepared = kr
            .prepare_sign_transaction(&SignTransactionRequest {
                public_key: pk,
                tx: bs58::encode(&tx).into_string(),
            })
            .unwrap();
        assert_eq!(bs58::decode(&prepared.tx_message).into_vec().unwrap(), b"msg");
        assert_eq!(prepared.derivation_path, "44'/501'/0'/0'");
    }

    #[test]
    fn test_prepare_unknown_key() {
        let (kr, _) = keyring();
        let other = KeyPair::from_seed(&[8u8; 32]).public_key();
        let err = kr
            .prepare_sign_message(&SignMessageRequest {
                public_key: other,
                message: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, SignerError::KeyNotFound(_)));
    }

    #[test]
    fn test_no_secrets() {
        let (mut kr, pk) = keyring();
        assert!(kr.export_secret_key(&pk).is_none());
        assert!(kr.import_secret_key("00").is_err());
        kr.delete_public_key(&pk);
        assert!(kr.public_keys().is_empty());
    }

    #[tokio::test]
    async fn test_sign_goes_through_device_queue() {
        let (kr, pk) = keyring();
        let kr = Arc::new(kr);
        let queue = kr.device_queue().clone();

        let signer = {
            let kr = Arc::clone(&kr);
            tokio::spawn(async move { kr.sign_message(b"hi", &pk).await })
        };

        let mut current = queue.subscribe();
        let request = loop {
            if let Some(r) = current.borrow_and_update().clone() {
                break r;
            }
            current.changed().await.unwrap();
        };
        match request.request() {
            SecureRequest::LedgerSvmSignMessage(m) => {
                let frame = bs58::decode(&m.message).into_vec().unwrap();
                assert_eq!(frame[0], 0xff);
                assert_eq!(&frame[frame.len() - 2..], b"hi");
            }
            other => panic!("unexpected {:?}", other),
        }
        request.respond(SecureResponse::signature("sig")).await.unwrap();
        assert_eq!(signer.await.unwrap().unwrap(), "sig");
    }
}
