//! 硬件签名会话
//!
//! One session per signing attempt: open the transport (retrying transient
//! failures with backoff), ask the device to sign, poll while the device waits
//! on the user, and close the transport on every exit path. A cancellation
//! token is raced against each await; whichever finishes first wins.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::confirmation::request::SecureRequest;
use crate::confirmation::SURFACE_CLOSED;
use crate::core::config::HardwareConfig;
use crate::core::errors::{DeviceError, DeviceErrorKind, SignerError};
use crate::hardware::ledger::device::{LedgerConnector, LedgerSolanaApp};
use crate::hardware::{SignKind, SignStep};
use crate::keyring::wire::offchain_frame_message;
use crate::keyring::DerivationPath;
use crate::security::redaction::payload_preview;

/// Device-ready work for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOperation {
    SignTransaction {
        path: DerivationPath,
        message: Vec<u8>,
    },
    SignOffchainMessage {
        path: DerivationPath,
        frame: Vec<u8>,
    },
}

impl DeviceOperation {
    /// Decode a `LEDGER_SVM_*` request. Malformed payloads are rejected here,
    /// before the device is touched.
    pub fn from_request(request: &SecureRequest) -> Result<Self, SignerError> {
        match request {
            SecureRequest::LedgerSvmSignTx(r) => Ok(DeviceOperation::SignTransaction {
                path: DerivationPath::parse_lenient(&r.derivation_path)?,
                message: bs58::decode(&r.tx_message).into_vec()?,
            }),
            SecureRequest::LedgerSvmSignMessage(r) => {
                let frame = bs58::decode(&r.message).into_vec()?;
                offchain_frame_message(&frame)?;
                Ok(DeviceOperation::SignOffchainMessage {
                    path: DerivationPath::parse_lenient(&r.derivation_path)?,
                    frame,
                })
            }
            other => Err(SignerError::ProtocolFraming(format!(
                "{} is not a device request",
                other.name()
            ))),
        }
    }

    pub fn kind(&self) -> SignKind {
        match self {
            DeviceOperation::SignTransaction { .. } => SignKind::Transaction,
            DeviceOperation::SignOffchainMessage { .. } => SignKind::Message,
        }
    }

    fn path(&self) -> &DerivationPath {
        match self {
            DeviceOperation::SignTransaction { path, .. } => path,
            DeviceOperation::SignOffchainMessage { path, .. } => path,
        }
    }
}

/// Cancels a running session from outside and waits for it to let go of
/// the transport.
#[derive(Clone)]
pub struct SessionCanceller {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
    released: watch::Receiver<bool>,
}

impl SessionCanceller {
    /// The first reason given wins.
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the session has finished or been dropped.
    pub async fn released(&self) {
        let mut rx = self.released.clone();
        let _ = rx.wait_for(|released| *released).await;
    }
}

pub struct HardwareSignSession<C: ?Sized> {
    connector: Arc<C>,
    device_id: String,
    config: HardwareConfig,
    progress: Arc<watch::Sender<SignStep>>,
    cancel: CancellationToken,
    cancel_reason: Arc<Mutex<Option<String>>>,
    released: watch::Sender<bool>,
}

impl<C: LedgerConnector + ?Sized> HardwareSignSession<C> {
    pub fn new(connector: Arc<C>, device_id: impl Into<String>, config: HardwareConfig) -> Self {
        let (progress, _) = watch::channel(SignStep::Connect);
        let (released, _) = watch::channel(false);
        Self {
            connector,
            device_id: device_id.into(),
            config,
            progress: Arc::new(progress),
            cancel: CancellationToken::new(),
            cancel_reason: Arc::new(Mutex::new(None)),
            released,
        }
    }

    /// Report progress on a channel shared with a longer-lived surface.
    pub fn with_progress(mut self, progress: Arc<watch::Sender<SignStep>>) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> watch::Receiver<SignStep> {
        self.progress.subscribe()
    }

    pub fn canceller(&self) -> SessionCanceller {
        SessionCanceller {
            token: self.cancel.clone(),
            reason: Arc::clone(&self.cancel_reason),
            released: self.released.subscribe(),
        }
    }

    /// Before-response hook: cancel the session if it is still running, then
    /// hold the request's resolution until the transport is closed.
    pub fn cleanup_hook(
        &self,
        reason: &'static str,
    ) -> impl FnOnce() -> BoxFuture<'static, ()> + Send + 'static {
        let canceller = self.canceller();
        move || {
            Box::pin(async move {
                canceller.cancel(reason);
                canceller.released().await;
            })
        }
    }

    /// Drive `operation` to a raw signature.
    pub async fn run(self, operation: DeviceOperation) -> Result<Vec<u8>, SignerError> {
        let outcome = self.drive(&operation).await;
        self.released.send_replace(true);
        outcome
    }

    async fn drive(&self, operation: &DeviceOperation) -> Result<Vec<u8>, SignerError> {
        self.report(SignStep::Connect);

        let mut app = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(self.cancelled()),
            opened = self.open_with_retry() => opened?,
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled()),
            signed = self.sign_on_device(app.as_mut(), operation) => signed,
        };

        app.close().await;
        debug!(device_id = %self.device_id, "Ledger transport closed");
        outcome
    }

    async fn open_with_retry(&self) -> Result<Box<dyn LedgerSolanaApp>, SignerError> {
        let attempts = self.config.open_attempts.max(1);
        let mut failures = 0u32;
        loop {
            match self.connector.open_transport(&self.device_id).await {
                Ok(app) => {
                    info!(device_id = %self.device_id, "Ledger connected");
                    return Ok(app);
                }
                Err(e) if e.is_rejection() => return Err(SignerError::Denied(e.message)),
                Err(e) if e.awaits_user() => {
                    self.wait_on_user(&e).await;
                }
                Err(e) if e.is_transient() && failures + 1 < attempts => {
                    let delay = self.config.open_backoff(failures);
                    failures += 1;
                    warn!(
                        device_id = %self.device_id,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transport open failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(SignerError::Device {
                        step: SignStep::Connect,
                        error: e,
                    })
                }
            }
        }
    }

    async fn sign_on_device(
        &self,
        app: &mut dyn LedgerSolanaApp,
        operation: &DeviceOperation,
    ) -> Result<Vec<u8>, SignerError> {
        let mut step = SignStep::Approve;
        self.report(step);
        loop {
            let attempt = match operation {
                DeviceOperation::SignTransaction { path, message } => {
                    debug!(%path, message = %payload_preview(message), "device sign transaction");
                    app.sign_transaction(path, message).await
                }
                DeviceOperation::SignOffchainMessage { path, frame } => {
                    debug!(%path, frame = %payload_preview(frame), "device sign offchain message");
                    app.sign_offchain_message(path, frame).await
                }
            };
            match attempt {
                Ok(signature) => {
                    info!(path = %operation.path(), "device signed");
                    return Ok(signature);
                }
                Err(e) if e.is_rejection() => {
                    info!(path = %operation.path(), "rejected on device");
                    return Err(SignerError::Denied(e.message));
                }
                Err(e) if e.awaits_user() => {
                    step = self.wait_on_user(&e).await;
                }
                Err(e) => return Err(SignerError::Device { step, error: e }),
            }
        }
    }

    /// Show what the user has to do on the device, then give them a moment.
    async fn wait_on_user(&self, error: &DeviceError) -> SignStep {
        let step = match error.kind {
            DeviceErrorKind::Locked => SignStep::Unlock,
            DeviceErrorKind::AppNotOpen => SignStep::OpenApp,
            _ => SignStep::EnableBlindSigning,
        };
        self.report(step);
        debug!(%step, error = %error, "waiting for user action on device");
        tokio::time::sleep(self.config.device_poll_interval()).await;
        step
    }

    fn report(&self, step: SignStep) {
        let changed = self.progress.send_if_modified(|current| {
            if *current == step {
                false
            } else {
                *current = step;
                true
            }
        });
        if changed {
            debug!(device_id = %self.device_id, %step, "sign step");
        }
    }

    fn cancelled(&self) -> SignerError {
        let reason = self
            .cancel_reason
            .lock()
            .clone()
            .unwrap_or_else(|| SURFACE_CLOSED.to_string());
        info!(device_id = %self.device_id, %reason, "signing session cancelled");
        SignerError::Cancelled(reason)
    }
}
