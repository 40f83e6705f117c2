//! Scriptable stand-in for a Ledger device.
//!
//! Signs for real with the keypair it is built from, so signatures verify.
//! Failures are queued up front and consumed in order.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::errors::DeviceError;
use crate::hardware::ledger::device::{LedgerConnector, LedgerSolanaApp};
use crate::keyring::{DerivationPath, KeyPair, PublicKey};

struct MockShared {
    keypair: KeyPair,
    open_failures: Mutex<VecDeque<DeviceError>>,
    sign_failures: Mutex<VecDeque<DeviceError>>,
    hang: AtomicBool,
    open_attempts: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    sign_calls: AtomicUsize,
    last_request: Mutex<Option<(DerivationPath, Vec<u8>)>>,
}

#[derive(Clone)]
pub struct MockLedger {
    shared: Arc<MockShared>,
}

impl MockLedger {
    pub fn new(keypair: KeyPair) -> Self {
        Self {
            shared: Arc::new(MockShared {
                keypair,
                open_failures: Mutex::new(VecDeque::new()),
                sign_failures: Mutex::new(VecDeque::new()),
                hang: AtomicBool::new(false),
                open_attempts: AtomicUsize::new(0),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                sign_calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }),
        }
    }

    /// Next `open_transport` fails with `err`.
    pub fn fail_open(self, err: DeviceError) -> Self {
        self.shared.open_failures.lock().push_back(err);
        self
    }

    /// Next signing call fails with `err`.
    pub fn fail_sign(self, err: DeviceError) -> Self {
        self.shared.sign_failures.lock().push_back(err);
        self
    }

    /// Signing calls never complete (user walked away from the device).
    pub fn hang_on_sign(self) -> Self {
        self.shared.hang.store(true, Ordering::SeqCst);
        self
    }

    pub fn public_key(&self) -> PublicKey {
        self.shared.keypair.public_key()
    }

    pub fn open_attempts(&self) -> usize {
        self.shared.open_attempts.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Transports opened and not yet closed.
    pub fn open_links(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }

    pub fn sign_calls(&self) -> usize {
        self.shared.sign_calls.load(Ordering::SeqCst)
    }

    /// Path and bytes of the last signing call.
    pub fn last_request(&self) -> Option<(DerivationPath, Vec<u8>)> {
        self.shared.last_request.lock().clone()
    }
}

#[async_trait]
impl LedgerConnector for MockLedger {
    async fn open_transport(
        &self,
        _device_id: &str,
    ) -> Result<Box<dyn LedgerSolanaApp>, DeviceError> {
        self.shared.open_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.shared.open_failures.lock().pop_front() {
            return Err(err);
        }
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockApp {
            shared: Arc::clone(&self.shared),
            closed: false,
        }))
    }
}

struct MockApp {
    shared: Arc<MockShared>,
    closed: bool,
}

impl MockApp {
    async fn sign(&mut self, path: &DerivationPath, bytes: &[u8]) -> Result<Vec<u8>, DeviceError> {
        self.shared.sign_calls.fetch_add(1, Ordering::SeqCst);
        *self.shared.last_request.lock() = Some((path.clone(), bytes.to_vec()));
        let scripted = self.shared.sign_failures.lock().pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }
        if self.shared.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(self.shared.keypair.sign(bytes).to_vec())
    }
}

#[async_trait]
impl LedgerSolanaApp for MockApp {
    async fn sign_transaction(
        &mut self,
        path: &DerivationPath,
        message: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        self.sign(path, message).await
    }

    async fn sign_offchain_message(
        &mut self,
        path: &DerivationPath,
        frame: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        self.sign(path, frame).await
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
