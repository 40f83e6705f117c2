//! Typed request/response bodies carried by the request queue.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::errors::SignerError;
use crate::keyring::PublicKey;
use crate::security::SecretString;

/// `SECURE_SVM_SIGN_TX`: a serialized transaction, base58.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionRequest {
    pub public_key: PublicKey,
    pub tx: String,
}

/// `SECURE_SVM_SIGN_MESSAGE`: raw message bytes, base58.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignMessageRequest {
    pub public_key: PublicKey,
    pub message: String,
}

/// `LEDGER_SVM_SIGN_TX`: transaction message section, base58, plus the
/// root-less derivation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSignTransactionRequest {
    pub tx_message: String,
    pub derivation_path: String,
}

/// `LEDGER_SVM_SIGN_MESSAGE`: framed offchain message, base58.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSignMessageRequest {
    pub message: String,
    pub derivation_path: String,
}

/// `SECURE_USER_UNLOCK_KEYRING`
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockKeyringRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretString>,
}

impl fmt::Debug for UnlockKeyringRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockKeyringRequest")
            .field("uuid", &self.uuid)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", content = "request")]
pub enum SecureRequest {
    #[serde(rename = "SECURE_SVM_SIGN_TX")]
    SvmSignTx(SignTransactionRequest),
    #[serde(rename = "SECURE_SVM_SIGN_MESSAGE")]
    SvmSignMessage(SignMessageRequest),
    #[serde(rename = "LEDGER_SVM_SIGN_TX")]
    LedgerSvmSignTx(LedgerSignTransactionRequest),
    #[serde(rename = "LEDGER_SVM_SIGN_MESSAGE")]
    LedgerSvmSignMessage(LedgerSignMessageRequest),
    #[serde(rename = "SECURE_USER_UNLOCK_KEYRING")]
    UserUnlockKeyring(UnlockKeyringRequest),
}

impl SecureRequest {
    /// Request-kind tag shown to confirmation surfaces.
    pub fn name(&self) -> &'static str {
        match self {
            SecureRequest::SvmSignTx(_) => "SECURE_SVM_SIGN_TX",
            SecureRequest::SvmSignMessage(_) => "SECURE_SVM_SIGN_MESSAGE",
            SecureRequest::LedgerSvmSignTx(_) => "LEDGER_SVM_SIGN_TX",
            SecureRequest::LedgerSvmSignMessage(_) => "LEDGER_SVM_SIGN_MESSAGE",
            SecureRequest::UserUnlockKeyring(_) => "SECURE_USER_UNLOCK_KEYRING",
        }
    }

    /// Kind-specific body as JSON, for surfaces that live across a channel.
    /// Unlock passwords are left out.
    pub fn payload(&self) -> Result<serde_json::Value, SignerError> {
        let value = match self {
            SecureRequest::SvmSignTx(r) => serde_json::to_value(r)?,
            SecureRequest::SvmSignMessage(r) => serde_json::to_value(r)?,
            SecureRequest::LedgerSvmSignTx(r) => serde_json::to_value(r)?,
            SecureRequest::LedgerSvmSignMessage(r) => serde_json::to_value(r)?,
            SecureRequest::UserUnlockKeyring(r) => serde_json::json!({ "uuid": r.uuid }),
        };
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecureResponse {
    Signature { signature: String },
    Unlocked { unlocked: bool },
}

impl SecureResponse {
    pub fn signature(signature: impl Into<String>) -> Self {
        SecureResponse::Signature {
            signature: signature.into(),
        }
    }

    pub fn into_signature(self) -> Result<String, SignerError> {
        match self {
            SecureResponse::Signature { signature } => Ok(signature),
            other => Err(SignerError::Internal(format!(
                "expected a signature, got {:?}",
                other
            ))),
        }
    }
}
