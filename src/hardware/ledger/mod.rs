//! Ledger 硬件wallet集成
//!
//! 此模块实现与 Ledger 硬件wallet的通信，支持：
//! - Solana App (transaction and offchain message signing)
//! - 设备连接抽象 (transport opened per signing session)

pub mod apdu;
pub mod device;
pub mod mock;
pub mod solana_app;

pub use apdu::{ApduCommand, ApduExchange, ApduResponse};
pub use device::{ApduConnector, ApduTransportOpener, LedgerConnector, LedgerSolanaApp};
pub use mock::MockLedger;
pub use solana_app::SolanaApp;
