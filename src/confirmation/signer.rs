//! Request-routing boundary: every signature goes through the confirmation
//! queue first, then to whichever keyring holds the public key.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::confirmation::protocol::SURFACE_CLOSED;
use crate::confirmation::queue::{PendingResponse, QueuedRequest, RequestQueue, RequestState};
use crate::confirmation::request::{
    SecureRequest, SecureResponse, SignMessageRequest, SignTransactionRequest,
};
use crate::core::errors::{QueueError, SignerError};
use crate::keyring::wire::transaction_message;
use crate::keyring::{Keyring, PublicKey};

pub struct SecureSigner {
    queue: RequestQueue,
    // Held only for lookups, never across a signing await.
    keyrings: RwLock<Vec<Arc<dyn Keyring>>>,
}

impl SecureSigner {
    pub fn new(queue: RequestQueue) -> Self {
        Self {
            queue,
            keyrings: RwLock::new(Vec::new()),
        }
    }

    /// Confirmation queue requests wait on.
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub async fn add_keyring(&self, keyring: Box<dyn Keyring>) {
        info!(kind = %keyring.kind(), keys = keyring.public_keys().len(), "keyring registered");
        self.keyrings.write().await.push(Arc::from(keyring));
    }

    pub async fn public_keys(&self) -> Vec<PublicKey> {
        self.keyrings
            .read()
            .await
            .iter()
            .flat_map(|k| k.public_keys())
            .collect()
    }

    /// `tx` is a full serialized transaction.
    pub async fn sign_transaction(
        &self,
        public_key: PublicKey,
        tx: &[u8],
    ) -> Result<String, SignerError> {
        let request = SecureRequest::SvmSignTx(SignTransactionRequest {
            public_key,
            tx: bs58::encode(tx).into_string(),
        });
        self.submit(request).await?.into_signature()
    }

    pub async fn sign_message(
        &self,
        public_key: PublicKey,
        message: &[u8],
    ) -> Result<String, SignerError> {
        let request = SecureRequest::SvmSignMessage(SignMessageRequest {
            public_key,
            message: bs58::encode(message).into_string(),
        });
        self.submit(request).await?.into_signature()
    }

    /// Enqueue, wait for the surface's decision, execute once approved, and
    /// return whatever the request resolved with.
    pub async fn submit(&self, request: SecureRequest) -> Result<SecureResponse, SignerError> {
        let pending = self.queue.enqueue(request);
        let queued = Arc::clone(pending.request());

        if queued.wait_for_decision().await == RequestState::Approved {
            self.execute_approved(&queued).await;
        }
        pending.response().await
    }

    async fn execute_approved(&self, queued: &QueuedRequest) {
        let outcome = self.execute(queued).await;
        let resolved = match outcome {
            Ok(response) => queued.respond(response).await,
            Err(e) => queued.error(e).await,
        };
        match resolved {
            Ok(()) => {}
            Err(QueueError::AlreadyResolved(id)) => {
                debug!(%id, "request settled while signing, result discarded")
            }
            Err(e) => debug!(id = %queued.id(), error = %e, "could not resolve request"),
        }
    }

    /// Keyring holding `public_key`, cloned out so the registry lock is released.
    async fn find_keyring(&self, public_key: &PublicKey) -> Result<Arc<dyn Keyring>, SignerError> {
        self.keyrings
            .read()
            .await
            .iter()
            .find(|k| k.contains(public_key))
            .cloned()
            .ok_or_else(|| SignerError::KeyNotFound(public_key.to_string()))
    }

    async fn execute(&self, queued: &QueuedRequest) -> Result<SecureResponse, SignerError> {
        let signature = match queued.request() {
            SecureRequest::SvmSignTx(r) => {
                let keyring = self.find_keyring(&r.public_key).await?;
                match keyring.as_hardware() {
                    Some(hw) => {
                        let prepared = hw.prepare_sign_transaction(r)?;
                        let device = hw.enqueue_device_request(SecureRequest::LedgerSvmSignTx(prepared));
                        await_device(queued, device).await?
                    }
                    None => {
                        let tx = bs58::decode(&r.tx).into_vec()?;
                        let message = transaction_message(&tx)?;
                        keyring.sign_transaction(message, &r.public_key).await?
                    }
                }
            }
            SecureRequest::SvmSignMessage(r) => {
                let keyring = self.find_keyring(&r.public_key).await?;
                match keyring.as_hardware() {
                    Some(hw) => {
                        let prepared = hw.prepare_sign_message(r)?;
                        let device =
                            hw.enqueue_device_request(SecureRequest::LedgerSvmSignMessage(prepared));
                        await_device(queued, device).await?
                    }
                    None => {
                        let message = bs58::decode(&r.message).into_vec()?;
                        keyring.sign_message(&message, &r.public_key).await?
                    }
                }
            }
            other => {
                return Err(SignerError::ProtocolFraming(format!(
                    "{} is not handled by the signer",
                    other.name()
                )))
            }
        };
        Ok(SecureResponse::Signature { signature })
    }
}

/// Wait for a device sub-request. Settling the outer request first cancels it.
async fn await_device(outer: &QueuedRequest, device: PendingResponse) -> Result<String, SignerError> {
    let inner = Arc::clone(device.request());
    let linked = outer.add_before_response_handler(move || async move {
        if !inner.state().is_settled() {
            if let Err(e) = inner.cancel(SURFACE_CLOSED).await {
                debug!(id = %inner.id(), error = %e, "device request settled first");
            }
        }
    });
    if linked.is_err() {
        if let Err(e) = device.request().cancel(SURFACE_CLOSED).await {
            debug!(id = %device.id(), error = %e, "device request settled first");
        }
    }
    device.response().await?.into_signature()
}
