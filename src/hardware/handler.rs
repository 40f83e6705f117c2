//! Device-side confirmation surface: the Ledger prompt is the approval.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::confirmation::queue::QueuedRequest;
use crate::confirmation::request::SecureResponse;
use crate::confirmation::{ConfirmationSurface, SURFACE_CLOSED, USER_CANCELLED};
use crate::core::config::HardwareConfig;
use crate::hardware::ledger::device::LedgerConnector;
use crate::hardware::session::{DeviceOperation, HardwareSignSession};
use crate::hardware::SignStep;

/// Turns `LEDGER_SVM_*` requests into signing sessions against one selected
/// device and resolves them with the base58 signature.
pub struct LedgerSignHandler<C: ?Sized> {
    connector: Arc<C>,
    device_id: String,
    config: HardwareConfig,
    progress: Arc<watch::Sender<SignStep>>,
    active: Mutex<Option<Arc<QueuedRequest>>>,
}

impl<C: LedgerConnector + ?Sized + 'static> LedgerSignHandler<C> {
    pub fn new(connector: Arc<C>, device_id: impl Into<String>, config: HardwareConfig) -> Self {
        let (progress, _) = watch::channel(SignStep::Connect);
        Self {
            connector,
            device_id: device_id.into(),
            config,
            progress: Arc::new(progress),
            active: Mutex::new(None),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Step of the session in flight, for status text.
    pub fn progress(&self) -> watch::Receiver<SignStep> {
        self.progress.subscribe()
    }

    pub async fn handle(&self, request: Arc<QueuedRequest>) {
        let id = request.id();
        let operation = match DeviceOperation::from_request(request.request()) {
            Ok(operation) => operation,
            Err(e) => {
                warn!(%id, error = %e, "rejecting device request");
                if let Err(qe) = request.error(e).await {
                    debug!(%id, error = %qe, "request already resolved");
                }
                return;
            }
        };

        let session = HardwareSignSession::new(
            Arc::clone(&self.connector),
            self.device_id.clone(),
            self.config.clone(),
        )
        .with_progress(Arc::clone(&self.progress));

        if request
            .add_before_response_handler(session.cleanup_hook(SURFACE_CLOSED))
            .is_err()
        {
            debug!(%id, "request resolved before the device session started");
            return;
        }
        *self.active.lock() = Some(Arc::clone(&request));

        info!(
            %id,
            device_id = %self.device_id,
            status = SignStep::Connect.status_message(operation.kind()),
            "starting device session"
        );
        let outcome = session.run(operation).await;

        {
            let mut active = self.active.lock();
            if active.as_ref().map(|r| r.id()) == Some(id) {
                *active = None;
            }
        }

        let resolved = match outcome {
            Ok(signature) => {
                let signature = bs58::encode(signature).into_string();
                request.respond(SecureResponse::Signature { signature }).await
            }
            Err(e) => request.error(e).await,
        };
        if let Err(qe) = resolved {
            debug!(%id, error = %qe, "request resolved elsewhere first");
        }
    }

    /// The user pressed cancel on the surface.
    pub async fn cancel_by_user(&self) {
        self.cancel_active(USER_CANCELLED).await;
    }

    /// The surface is going away.
    pub async fn close(&self) {
        self.cancel_active(SURFACE_CLOSED).await;
    }

    async fn cancel_active(&self, reason: &str) {
        let active = self.active.lock().take();
        if let Some(request) = active {
            if let Err(qe) = request.cancel(reason).await {
                debug!(id = %request.id(), error = %qe, "request already resolved");
            }
        }
    }
}

#[async_trait]
impl<C: LedgerConnector + ?Sized + 'static> ConfirmationSurface for LedgerSignHandler<C> {
    async fn submit(&self, request: Arc<QueuedRequest>) {
        self.handle(request).await;
    }
}
