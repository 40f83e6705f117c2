//! Binding between a request queue and a confirmation surface.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::confirmation::queue::{QueuedRequest, RequestQueue};

/// Cancel reason used when a surface goes away mid-request.
pub const SURFACE_CLOSED: &str = "Plugin Closed";
/// Cancel reason for an explicit user cancel.
pub const USER_CANCELLED: &str = "Cancelled by User";

/// Whatever shows a request to the user (or stands in for them).
///
/// `submit` presents the request; the surface answers through the request
/// handle (`approve`, `deny`, `cancel`, or `respond` when the surface itself
/// is the approval, as with hardware prompts).
#[async_trait]
pub trait ConfirmationSurface: Send + Sync + 'static {
    async fn submit(&self, request: Arc<QueuedRequest>);
}

pub struct ConfirmationProtocol;

impl ConfirmationProtocol {
    /// Feed each request that becomes current on `queue` to `surface`, once.
    /// The task ends when every handle to the queue is gone.
    pub fn spawn<S>(queue: &RequestQueue, surface: Arc<S>) -> JoinHandle<()>
    where
        S: ConfirmationSurface + ?Sized,
    {
        let mut current = queue.subscribe();
        let label = queue.label().to_string();
        tokio::spawn(async move {
            let mut last_submitted: Option<Uuid> = None;
            loop {
                let head = current.borrow_and_update().clone();
                if let Some(request) = head {
                    let fresh = last_submitted != Some(request.id());
                    if fresh && !request.state().is_settled() {
                        last_submitted = Some(request.id());
                        debug!(queue = %label, id = %request.id(), name = request.name(), "submitting to surface");
                        surface.submit(request).await;
                        continue;
                    }
                }
                if current.changed().await.is_err() {
                    debug!(queue = %label, "queue dropped, confirmation task exiting");
                    break;
                }
            }
        })
    }
}

/// What a [`ChannelSurface`] emits for each submitted request.
#[derive(Debug, Clone, Serialize)]
pub struct SurfaceEvent {
    pub id: Uuid,
    pub name: &'static str,
    pub payload: serde_json::Value,
}

/// Forwards requests over a channel to a surface living elsewhere (another
/// task, a UI bridge). Approvals come back through [`RequestQueue`] by id.
/// Dropping the receiver closes the surface: later submissions are cancelled.
pub struct ChannelSurface {
    events: mpsc::UnboundedSender<SurfaceEvent>,
}

impl ChannelSurface {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }
}

#[async_trait]
impl ConfirmationSurface for ChannelSurface {
    async fn submit(&self, request: Arc<QueuedRequest>) {
        let payload = match request.request().payload() {
            Ok(payload) => payload,
            Err(e) => {
                if let Err(qe) = request.error(e).await {
                    debug!(id = %request.id(), error = %qe, "could not fail request");
                }
                return;
            }
        };
        let event = SurfaceEvent {
            id: request.id(),
            name: request.name(),
            payload,
        };
        if self.events.send(event).is_err() {
            warn!(id = %request.id(), "confirmation surface closed");
            if let Err(qe) = request.cancel(SURFACE_CLOSED).await {
                debug!(id = %request.id(), error = %qe, "request resolved before cancel");
            }
        }
    }
}
