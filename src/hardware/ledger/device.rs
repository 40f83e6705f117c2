//! Ledger 设备管理
//!
//! Device-level seam used by signing sessions: open a transport to a named
//! device and get back a handle to its Solana app.

use async_trait::async_trait;
use tracing::info;

use crate::core::errors::DeviceError;
use crate::hardware::ledger::apdu::ApduExchange;
use crate::hardware::ledger::solana_app::SolanaApp;
use crate::keyring::DerivationPath;

/// Open Solana app session on a device. Exclusively owned by one signing
/// session; `close` is called on every exit path.
#[async_trait]
pub trait LedgerSolanaApp: Send {
    /// Returns the 64-byte signature over `message`.
    async fn sign_transaction(
        &mut self,
        path: &DerivationPath,
        message: &[u8],
    ) -> Result<Vec<u8>, DeviceError>;

    /// Returns the 64-byte signature over an offchain message frame.
    async fn sign_offchain_message(
        &mut self,
        path: &DerivationPath,
        frame: &[u8],
    ) -> Result<Vec<u8>, DeviceError>;

    async fn close(&mut self);
}

/// `openTransport(deviceId)`
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    async fn open_transport(&self, device_id: &str)
        -> Result<Box<dyn LedgerSolanaApp>, DeviceError>;
}

/// Opens raw APDU links (HID, BLE, a speculos socket).
#[async_trait]
pub trait ApduTransportOpener: Send + Sync {
    type Exchange: ApduExchange + 'static;

    async fn open(&self, device_id: &str) -> Result<Self::Exchange, DeviceError>;
}

/// Connector speaking the Solana app protocol over any APDU transport.
pub struct ApduConnector<O> {
    opener: O,
}

impl<O: ApduTransportOpener> ApduConnector<O> {
    pub fn new(opener: O) -> Self {
        Self { opener }
    }
}

#[async_trait]
impl<O: ApduTransportOpener> LedgerConnector for ApduConnector<O> {
    async fn open_transport(
        &self,
        device_id: &str,
    ) -> Result<Box<dyn LedgerSolanaApp>, DeviceError> {
        let exchange = self.opener.open(device_id).await?;
        info!(device_id, "Ledger transport opened");
        Ok(Box::new(SolanaApp::new(exchange)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::HardwareConfig;
    use crate::hardware::ledger::apdu::{ApduCommand, ApduResponse, SW_BLIND_SIGNING_DISABLED, SW_OK};
    use crate::hardware::session::{DeviceOperation, HardwareSignSession};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Speculos-style scripted device shared across opened links.
    #[derive(Clone, Default)]
    struct Scripted {
        replies: Arc<Mutex<VecDeque<ApduResponse>>>,
        opened: Arc<Mutex<Vec<String>>>,
        closes: Arc<Mutex<usize>>,
    }

    struct Link(Scripted);

    #[async_trait]
    impl ApduExchange for Link {
        async fn exchange(&mut self, _command: &ApduCommand) -> Result<ApduResponse, DeviceError> {
            self.0
                .replies
                .lock()
                .pop_front()
                .ok_or_else(|| DeviceError::transport("link dropped"))
        }

        async fn close(&mut self) {
            *self.0.closes.lock() += 1;
        }
    }

    #[async_trait]
    impl ApduTransportOpener for Scripted {
        type Exchange = Link;

        async fn open(&self, device_id: &str) -> Result<Link, DeviceError> {
            self.opened.lock().push(device_id.to_string());
            Ok(Link(self.clone()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_apdu_connector_blind_signing_then_sign() {
        let device = Scripted::default();
        {
            let mut replies = device.replies.lock();
            replies.push_back(ApduResponse::new(vec![], SW_BLIND_SIGNING_DISABLED));
            replies.push_back(ApduResponse::new(vec![3u8; 64], SW_OK));
        }

        let connector = Arc::new(ApduConnector::new(device.clone()));
        let session = HardwareSignSession::new(connector, "hid-1", HardwareConfig::default());
        let signature = session
            .run(DeviceOperation::SignTransaction {
                path: DerivationPath::indexed(0, 0),
                message: b"msg".to_vec(),
            })
            .await
            .unwrap();

        assert_eq!(signature, vec![3u8; 64]);
        assert_eq!(*device.opened.lock(), vec!["hid-1".to_string()]);
        assert_eq!(*device.closes.lock(), 1);
    }
}
