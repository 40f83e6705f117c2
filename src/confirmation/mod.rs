//! Secure request pipeline
//!
//! Requests are queued, shown to a confirmation surface, and resolved exactly
//! once through their correlation id.

pub mod protocol;
pub mod queue;
pub mod request;
pub mod signer;

pub use protocol::{
    ChannelSurface, ConfirmationProtocol, ConfirmationSurface, SurfaceEvent, SURFACE_CLOSED,
    USER_CANCELLED,
};
pub use queue::{BeforeResponseHook, PendingResponse, QueuedRequest, RequestQueue, RequestState};
pub use request::{
    LedgerSignMessageRequest, LedgerSignTransactionRequest, SecureRequest, SecureResponse,
    SignMessageRequest, SignTransactionRequest, UnlockKeyringRequest,
};
pub use signer::SecureSigner;
