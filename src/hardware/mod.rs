//! 硬件wallet集成模块
//!
//! 此模块提供与硬件wallet (Ledger) 的集成: the device signing session, the
//! confirmation surface that drives it, and the Ledger Solana app client.

use std::fmt;

pub mod handler;
pub mod ledger;
pub mod session;

pub use handler::LedgerSignHandler;
pub use ledger::{LedgerConnector, LedgerSolanaApp, MockLedger};
pub use session::{DeviceOperation, HardwareSignSession, SessionCanceller};

/// Coarse progress of a signing session. Advisory UI hints only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignStep {
    #[default]
    Connect,
    Unlock,
    OpenApp,
    Approve,
    EnableBlindSigning,
}

/// What the device is being asked to sign; picks the approval wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignKind {
    Transaction,
    Message,
}

impl SignStep {
    /// Position in the step list shown to the user.
    /// User-facing instruction for this step.
    pub fn status_message(&self, kind: SignKind) -> &'static str {
        match (self, kind) {
            (SignStep::Connect, _) => "Connect your Ledger device",
            (SignStep::Unlock, _) => "Unlock your Ledger device",
            (SignStep::OpenApp, _) => "Open the Solana App on your Ledger device.",
            (SignStep::Approve, SignKind::Transaction) => {
                "Approve Transaction on your Ledger device."
            }
            (SignStep::Approve, SignKind::Message) => "Approve Signature on your Ledger device.",
            (SignStep::EnableBlindSigning, _) => "Enable Blind Signature",
        }
    }
}

impl fmt::Display for SignStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignStep::Connect => "connect",
            SignStep::Unlock => "unlock",
            SignStep::OpenApp => "open app",
            SignStep::Approve => "approve on device",
            SignStep::EnableBlindSigning => "enable blind signing",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_text() {
        assert_eq!(SignStep::OpenApp.to_string(), "open app");
        assert_eq!(
            SignStep::Approve.status_message(SignKind::Message),
            "Approve Signature on your Ledger device."
        );
        assert_eq!(
            SignStep::Approve.status_message(SignKind::Transaction),
            "Approve Transaction on your Ledger device."
        );
    }
}
