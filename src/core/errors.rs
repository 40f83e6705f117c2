use thiserror::Error;
use uuid::Uuid;

use crate::confirmation::RequestState;
use crate::hardware::SignStep;

/// Error type for keyring, request pipeline and hardware signing operations.
#[derive(Debug, Clone, Error)]
pub enum SignerError {
    /// Requested public key is not held by the keyring.
    #[error("unable to find {0}")]
    KeyNotFound(String),
    /// Mnemonic failed BIP-39 validation.
    #[error("Invalid seed words: {0}")]
    InvalidMnemonic(String),
    /// Secret key bytes are malformed or inconsistent.
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),
    /// Derivation path could not be parsed or is not hardened.
    #[error("Invalid derivation path: {0}")]
    InvalidDerivationPath(String),
    /// The keyring variant does not offer this capability.
    #[error("{keyring} keyring does not support {operation}")]
    Unsupported {
        keyring: &'static str,
        operation: &'static str,
    },
    /// Explicit rejection, either on the confirmation surface or on the device.
    #[error("Request declined: {0}")]
    Denied(String),
    /// Confirmation surface torn down before the request resolved.
    #[error("Request declined: {0}")]
    Cancelled(String),
    /// Transport or device fault, tagged with the step it happened at.
    #[error("{step}: {error}")]
    Device { step: SignStep, error: DeviceError },
    /// Malformed external payload, rejected before any device interaction.
    #[error("Malformed payload: {0}")]
    ProtocolFraming(String),
    /// Request pipeline misuse.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignerError {
    /// Denials and cancellations both show up as a declined request.
    pub fn is_declined(&self) -> bool {
        matches!(self, SignerError::Denied(_) | SignerError::Cancelled(_))
    }

    /// 判断是否为可重试error
    pub fn is_retryable(&self) -> bool {
        match self {
            SignerError::Device { error, .. } => error.is_transient(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SignerError {
    fn from(err: serde_json::Error) -> Self {
        SignerError::ProtocolFraming(err.to_string())
    }
}

impl From<bs58::decode::Error> for SignerError {
    fn from(err: bs58::decode::Error) -> Self {
        SignerError::ProtocolFraming(format!("bad base58: {}", err))
    }
}

impl From<hex::FromHexError> for SignerError {
    fn from(err: hex::FromHexError) -> Self {
        SignerError::InvalidSecretKey(format!("bad hex: {}", err))
    }
}

/// Coarse classification of a device-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    /// The transport could not be opened or dropped mid-exchange.
    TransportUnavailable,
    /// Device is locked and waiting for the PIN.
    Locked,
    /// The Solana app is not open on the device.
    AppNotOpen,
    /// The app refuses the payload until blind signing is enabled.
    BlindSigningDisabled,
    /// The user declined on the device.
    Rejected,
    /// Any other device-reported fault.
    Fault,
}

/// Failure reported by the hardware SDK collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    /// APDU status word when the device produced one.
    pub status: Option<u16>,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(DeviceErrorKind::TransportUnavailable, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Transport-open failures may be retried with backoff.
    pub fn is_transient(&self) -> bool {
        self.kind == DeviceErrorKind::TransportUnavailable
    }

    /// The device holder said no; never retried.
    pub fn is_rejection(&self) -> bool {
        self.kind == DeviceErrorKind::Rejected
    }

    /// Locked / app closed / blind signing off: the user can fix it on the device.
    pub fn awaits_user(&self) -> bool {
        matches!(
            self.kind,
            DeviceErrorKind::Locked
                | DeviceErrorKind::AppNotOpen
                | DeviceErrorKind::BlindSigningDisabled
        )
    }
}

/// Misuse of the request queue protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("unknown request {0}")]
    UnknownRequest(Uuid),
    #[error("request {0} already resolved")]
    AlreadyResolved(Uuid),
    #[error("request {id} cannot {action} while {state}")]
    InvalidTransition {
        id: Uuid,
        action: &'static str,
        state: RequestState,
    },
    #[error("request {0} dropped before it resolved")]
    Dropped(Uuid),
}
