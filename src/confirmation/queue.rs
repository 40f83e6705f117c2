//! Secure request queue.
//!
//! Every request gets a UUID correlation id and a one-shot reply channel. The
//! head of the queue is published on a watch channel so a confirmation surface
//! can present it; whoever resolves it (surface, signer, device handler) goes
//! through the transitions below, and the terminal outcome is sent exactly once.
//!
//! ```text
//! Pending -approve-> Approved -respond/error-> Resolved
//! Pending -deny----> Denied ------------------> Resolved
//! Pending|Approved -cancel-> Cancelled -------> Resolved
//! Pending -respond/error-> Resolved             (device surfaces)
//! ```

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::confirmation::request::{SecureRequest, SecureResponse};
use crate::core::errors::{QueueError, SignerError};

/// Cleanup callback run before a request's outcome is delivered.
pub type BeforeResponseHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

type Outcome = Result<SecureResponse, SignerError>;

/// Ids of recently resolved requests remembered per queue, so a late resolve
/// by id reports `AlreadyResolved` rather than `UnknownRequest`.
const RESOLVED_HISTORY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Pending,
    Approved,
    Denied,
    Cancelled,
    Resolved,
}

impl RequestState {
    /// The terminal outcome has been decided.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            RequestState::Denied | RequestState::Cancelled | RequestState::Resolved
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestState::Pending => "pending",
            RequestState::Approved => "approved",
            RequestState::Denied => "denied",
            RequestState::Cancelled => "cancelled",
            RequestState::Resolved => "resolved",
        };
        f.write_str(s)
    }
}

struct Resolution {
    hooks: Vec<BeforeResponseHook>,
    responder: Option<oneshot::Sender<Outcome>>,
}

/// One request waiting in a [`RequestQueue`].
pub struct QueuedRequest {
    id: Uuid,
    request: SecureRequest,
    state: watch::Sender<RequestState>,
    // Transitions are decided under this lock.
    resolution: Mutex<Resolution>,
    queue: Weak<QueueShared>,
}

impl QueuedRequest {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.request.name()
    }

    pub fn request(&self) -> &SecureRequest {
        &self.request
    }

    pub fn state(&self) -> RequestState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RequestState> {
        self.state.subscribe()
    }

    /// Wait until the request leaves `Pending`.
    pub async fn wait_for_decision(&self) -> RequestState {
        let mut rx = self.state.subscribe();
        let decided = rx
            .wait_for(|s| *s != RequestState::Pending)
            .await
            .map(|s| *s);
        decided.unwrap_or(RequestState::Resolved)
    }

    /// Register cleanup that runs, in registration order, on every terminal path
    /// before the outcome is delivered.
    pub fn add_before_response_handler<F, Fut>(&self, hook: F) -> Result<(), QueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut resolution = self.resolution.lock();
        if resolution.responder.is_none() {
            return Err(QueueError::AlreadyResolved(self.id));
        }
        resolution.hooks.push(Box::new(move || Box::pin(hook())));
        Ok(())
    }

    /// Only the head of the queue can be approved.
    pub fn approve(&self) -> Result<(), QueueError> {
        let _resolution = self.resolution.lock();
        match self.state() {
            RequestState::Pending if !self.is_current() => {
                warn!(id = %self.id, name = self.name(), "approve for a request that is not current");
                Err(self.invalid("approve", RequestState::Pending))
            }
            RequestState::Pending => {
                self.state.send_replace(RequestState::Approved);
                info!(id = %self.id, name = self.name(), "request approved");
                Ok(())
            }
            state if state.is_settled() => {
                warn!(id = %self.id, %state, "approve after resolution");
                Err(QueueError::AlreadyResolved(self.id))
            }
            state => Err(self.invalid("approve", state)),
        }
    }

    pub async fn deny(&self, reason: impl Into<String>) -> Result<(), QueueError> {
        let (hooks, responder) =
            self.claim("deny", RequestState::Denied, |s| s == RequestState::Pending)?;
        let outcome = Err(SignerError::Denied(reason.into()));
        self.finish(hooks, responder, outcome).await;
        Ok(())
    }

    pub async fn cancel(&self, reason: impl Into<String>) -> Result<(), QueueError> {
        let (hooks, responder) = self.claim("cancel", RequestState::Cancelled, |_| true)?;
        let outcome = Err(SignerError::Cancelled(reason.into()));
        self.finish(hooks, responder, outcome).await;
        Ok(())
    }

    pub async fn respond(&self, response: SecureResponse) -> Result<(), QueueError> {
        let (hooks, responder) = self.claim("respond", RequestState::Resolved, |_| true)?;
        self.finish(hooks, responder, Ok(response)).await;
        Ok(())
    }

    pub async fn error(&self, err: SignerError) -> Result<(), QueueError> {
        let (hooks, responder) = self.claim("error", RequestState::Resolved, |_| true)?;
        self.finish(hooks, responder, Err(err)).await;
        Ok(())
    }

    /// Decide the terminal transition and take the hooks and reply channel.
    fn claim(
        &self,
        action: &'static str,
        next: RequestState,
        allowed: impl Fn(RequestState) -> bool,
    ) -> Result<(Vec<BeforeResponseHook>, oneshot::Sender<Outcome>), QueueError> {
        let mut resolution = self.resolution.lock();
        let state = self.state();
        let responder = match resolution.responder.take() {
            Some(responder) if !state.is_settled() => responder,
            other => {
                resolution.responder = other;
                error!(id = %self.id, name = self.name(), action, %state, "request already resolved");
                return Err(QueueError::AlreadyResolved(self.id));
            }
        };
        if !allowed(state) {
            resolution.responder = Some(responder);
            return Err(self.invalid(action, state));
        }
        self.state.send_replace(next);
        let hooks = std::mem::take(&mut resolution.hooks);
        Ok((hooks, responder))
    }

    async fn finish(
        &self,
        hooks: Vec<BeforeResponseHook>,
        responder: oneshot::Sender<Outcome>,
        outcome: Outcome,
    ) {
        let _dequeue = Dequeue(self);
        if !hooks.is_empty() {
            debug!(id = %self.id, count = hooks.len(), "running before-response hooks");
        }
        for hook in hooks {
            hook().await;
        }
        self.state.send_replace(RequestState::Resolved);
        match &outcome {
            Ok(_) => info!(id = %self.id, name = self.name(), "request resolved"),
            Err(e) => info!(id = %self.id, name = self.name(), error = %e, "request resolved with error"),
        }
        if responder.send(outcome).is_err() {
            debug!(id = %self.id, "requester dropped before resolution");
        }
    }

    fn is_current(&self) -> bool {
        self.queue
            .upgrade()
            .map(|queue| queue.is_current(self.id))
            .unwrap_or(true)
    }

    fn invalid(&self, action: &'static str, state: RequestState) -> QueueError {
        QueueError::InvalidTransition {
            id: self.id,
            action,
            state,
        }
    }
}

impl fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Drops the request from its queue even if resolution is abandoned midway.
struct Dequeue<'a>(&'a QueuedRequest);

impl Drop for Dequeue<'_> {
    fn drop(&mut self) {
        if let Some(queue) = self.0.queue.upgrade() {
            queue.remove(self.0.id);
        }
    }
}

/// Handle returned by [`RequestQueue::enqueue`].
pub struct PendingResponse {
    request: Arc<QueuedRequest>,
    receiver: oneshot::Receiver<Outcome>,
}

impl PendingResponse {
    /// Correlation id.
    pub fn id(&self) -> Uuid {
        self.request.id
    }

    pub fn request(&self) -> &Arc<QueuedRequest> {
        &self.request
    }

    /// Wait for the terminal outcome.
    pub async fn response(self) -> Result<SecureResponse, SignerError> {
        let id = self.request.id;
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(QueueError::Dropped(id).into()),
        }
    }
}

struct QueueShared {
    label: String,
    requests: Mutex<VecDeque<Arc<QueuedRequest>>>,
    resolved: Mutex<VecDeque<Uuid>>,
    current: watch::Sender<Option<Arc<QueuedRequest>>>,
}

impl QueueShared {
    fn is_current(&self, id: Uuid) -> bool {
        self.requests.lock().front().map(|r| r.id == id).unwrap_or(false)
    }

    fn was_resolved(&self, id: Uuid) -> bool {
        self.resolved.lock().contains(&id)
    }

    fn remove(&self, id: Uuid) {
        {
            let mut resolved = self.resolved.lock();
            if resolved.len() == RESOLVED_HISTORY {
                resolved.pop_front();
            }
            resolved.push_back(id);
        }
        let mut requests = self.requests.lock();
        let was_current = requests.front().map(|r| r.id == id).unwrap_or(false);
        requests.retain(|r| r.id != id);
        if was_current {
            let next = requests.front().cloned();
            if let Some(next) = &next {
                debug!(queue = %self.label, id = %next.id, name = next.name(), "request is now current");
            }
            self.current.send_replace(next);
        }
    }
}

/// FIFO of secure requests; the head is the one being confirmed.
/// Cloning shares the queue.
#[derive(Clone)]
pub struct RequestQueue {
    shared: Arc<QueueShared>,
}

impl RequestQueue {
    pub fn new(label: impl Into<String>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            shared: Arc::new(QueueShared {
                label: label.into(),
                requests: Mutex::new(VecDeque::new()),
                resolved: Mutex::new(VecDeque::with_capacity(RESOLVED_HISTORY)),
                current,
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn enqueue(&self, request: SecureRequest) -> PendingResponse {
        let (responder, receiver) = oneshot::channel();
        let (state, _) = watch::channel(RequestState::Pending);
        let queued = Arc::new(QueuedRequest {
            id: Uuid::new_v4(),
            request,
            state,
            resolution: Mutex::new(Resolution {
                hooks: Vec::new(),
                responder: Some(responder),
            }),
            queue: Arc::downgrade(&self.shared),
        });

        let mut requests = self.shared.requests.lock();
        requests.push_back(Arc::clone(&queued));
        info!(
            queue = %self.shared.label,
            id = %queued.id,
            name = queued.name(),
            position = requests.len(),
            "request enqueued"
        );
        if requests.len() == 1 {
            self.shared.current.send_replace(Some(Arc::clone(&queued)));
        }
        drop(requests);

        PendingResponse {
            request: queued,
            receiver,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<QueuedRequest>> {
        self.shared
            .requests
            .lock()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// The request currently up for confirmation.
    pub fn current(&self) -> Option<Arc<QueuedRequest>> {
        self.shared.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<QueuedRequest>>> {
        self.shared.current.subscribe()
    }

    pub fn len(&self) -> usize {
        self.shared.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.shared.requests.lock().iter().map(|r| r.id).collect()
    }

    fn lookup(&self, id: Uuid, action: &'static str) -> Result<Arc<QueuedRequest>, QueueError> {
        if let Some(request) = self.get(id) {
            return Ok(request);
        }
        if self.shared.was_resolved(id) {
            error!(queue = %self.shared.label, %id, action, "request already resolved");
            return Err(QueueError::AlreadyResolved(id));
        }
        Err(QueueError::UnknownRequest(id))
    }

    pub fn approve(&self, id: Uuid) -> Result<(), QueueError> {
        self.lookup(id, "approve")?.approve()
    }

    pub async fn deny(&self, id: Uuid, reason: impl Into<String>) -> Result<(), QueueError> {
        self.lookup(id, "deny")?.deny(reason).await
    }

    pub async fn cancel(&self, id: Uuid, reason: impl Into<String>) -> Result<(), QueueError> {
        self.lookup(id, "cancel")?.cancel(reason).await
    }

    pub async fn respond(&self, id: Uuid, response: SecureResponse) -> Result<(), QueueError> {
        self.lookup(id, "respond")?.respond(response).await
    }

    pub async fn error(&self, id: Uuid, err: SignerError) -> Result<(), QueueError> {
        self.lookup(id, "error")?.error(err).await
    }
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("label", &self.shared.label)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirmation::request::UnlockKeyringRequest;

    fn unlock() -> SecureRequest {
        SecureRequest::UserUnlockKeyring(UnlockKeyringRequest::default())
    }

    #[tokio::test]
    async fn test_fifo_current() {
        let queue = RequestQueue::new("test");
        let first = queue.enqueue(unlock());
        let second = queue.enqueue(unlock());
        assert_eq!(queue.current().unwrap().id(), first.id());
        assert_eq!(queue.ids(), vec![first.id(), second.id()]);

        queue
            .respond(first.id(), SecureResponse::Unlocked { unlocked: true })
            .await
            .unwrap();
        assert_eq!(queue.current().unwrap().id(), second.id());
        assert_eq!(queue.len(), 1);
        assert_eq!(
            first.response().await.unwrap(),
            SecureResponse::Unlocked { unlocked: true }
        );
    }

    #[tokio::test]
    async fn test_transition_errors() {
        let queue = RequestQueue::new("test");
        let pending = queue.enqueue(unlock());
        let req = Arc::clone(pending.request());

        req.approve().unwrap();
        assert!(matches!(req.approve(), Err(QueueError::InvalidTransition { .. })));
        assert!(matches!(
            req.deny("no").await,
            Err(QueueError::InvalidTransition { action: "deny", .. })
        ));

        req.cancel("closed").await.unwrap();
        assert_eq!(req.state(), RequestState::Resolved);
        assert!(matches!(req.cancel("again").await, Err(QueueError::AlreadyResolved(_))));
        assert!(matches!(req.approve(), Err(QueueError::AlreadyResolved(_))));

        let err = pending.response().await.unwrap_err();
        assert!(matches!(err, SignerError::Cancelled(ref r) if r == "closed"));
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let queue = RequestQueue::new("test");
        let id = Uuid::new_v4();
        assert_eq!(queue.approve(id), Err(QueueError::UnknownRequest(id)));
    }

    #[tokio::test]
    async fn test_resolved_history_is_bounded() {
        let queue = RequestQueue::new("test");
        let first = queue.enqueue(unlock()).id();
        queue.deny(first, "no").await.unwrap();
        for _ in 0..RESOLVED_HISTORY {
            let id = queue.enqueue(unlock()).id();
            queue.deny(id, "no").await.unwrap();
        }
        assert_eq!(queue.shared.resolved.lock().len(), RESOLVED_HISTORY);
        assert_eq!(
            queue.respond(first, SecureResponse::Unlocked { unlocked: true }).await,
            Err(QueueError::UnknownRequest(first))
        );
    }

    #[tokio::test]
    async fn test_approve_only_current() {
        let queue = RequestQueue::new("test");
        let first = queue.enqueue(unlock());
        let second = queue.enqueue(unlock());

        assert!(matches!(
            queue.approve(second.id()),
            Err(QueueError::InvalidTransition { action: "approve", state: RequestState::Pending, .. })
        ));
        assert_eq!(second.request().state(), RequestState::Pending);

        queue.approve(first.id()).unwrap();
        queue.deny(second.id(), "not yet current").await.unwrap();
        assert!(second.response().await.is_err());
    }

    #[tokio::test]
    async fn test_hook_after_resolution_rejected() {
        let queue = RequestQueue::new("test");
        let pending = queue.enqueue(unlock());
        let req = Arc::clone(pending.request());
        req.deny("no").await.unwrap();
        assert!(req.add_before_response_handler(|| async {}).is_err());
    }
}
