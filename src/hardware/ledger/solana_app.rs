//! Ledger Solana App 集成
//!
//! 实现与 Ledger Solana 应用的交互: payloads are
//! `[signer count = 1][path len][u32 BE components..] || message`, split into
//! 255-byte chunks flagged with P2 MORE/EXTEND.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::errors::{DeviceError, DeviceErrorKind};
use crate::hardware::ledger::apdu::{
    ApduCommand, ApduExchange, SolanaInstruction, MAX_CHUNK_LEN, P1_CONFIRM, P2_EXTEND, P2_MORE,
};
use crate::hardware::ledger::device::LedgerSolanaApp;
use crate::keyring::DerivationPath;

const SIGNATURE_LEN: usize = 64;

/// Ledger Solana App
pub struct SolanaApp<E> {
    transport: E,
}

impl<E: ApduExchange> SolanaApp<E> {
    pub fn new(transport: E) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> E {
        self.transport
    }

    async fn sign(
        &mut self,
        ins: SolanaInstruction,
        path: &DerivationPath,
        message: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        let payload = signing_payload(path, message)?;
        info!(
            "Ledger sign, INS={:02X}, path: {}, payload: {} bytes",
            ins as u8,
            path,
            payload.len()
        );

        let signature = self.send_chunked(ins, &payload).await?;
        if signature.len() != SIGNATURE_LEN {
            return Err(DeviceError::new(
                DeviceErrorKind::Fault,
                format!("unexpected signature length {}", signature.len()),
            ));
        }
        Ok(signature)
    }

    async fn send_chunked(
        &mut self,
        ins: SolanaInstruction,
        payload: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        let chunks: Vec<&[u8]> = payload.chunks(MAX_CHUNK_LEN).collect();
        let mut last = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let mut p2 = 0;
            if i > 0 {
                p2 |= P2_EXTEND;
            }
            if i + 1 < chunks.len() {
                p2 |= P2_MORE;
            }
            let command = ApduCommand::new(ins, P1_CONFIRM, p2, chunk.to_vec());
            debug!(chunk = i, of = chunks.len(), "sending chunk");
            last = self.transport.exchange(&command).await?.into_result()?;
        }
        Ok(last)
    }
}

/// Serialized signer path followed by the message.
pub fn signing_payload(path: &DerivationPath, message: &[u8]) -> Result<Vec<u8>, DeviceError> {
    let depth = u8::try_from(path.components().len()).map_err(|_| {
        DeviceError::new(DeviceErrorKind::Fault, "derivation path too deep")
    })?;
    let mut payload = Vec::with_capacity(2 + 4 * usize::from(depth) + message.len());
    payload.push(1);
    payload.push(depth);
    for component in path.hardened_components() {
        payload.extend_from_slice(&component.to_be_bytes());
    }
    payload.extend_from_slice(message);
    Ok(payload)
}

#[async_trait]
impl<E: ApduExchange> LedgerSolanaApp for SolanaApp<E> {
    async fn sign_transaction(
        &mut self,
        path: &DerivationPath,
        message: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        self.sign(SolanaInstruction::SignMessage, path, message).await
    }

    async fn sign_offchain_message(
        &mut self,
        path: &DerivationPath,
        frame: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        self.sign(SolanaInstruction::SignOffchainMessage, path, frame)
            .await
    }

    async fn close(&mut self) {
        self.transport.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::ledger::apdu::ApduResponse;
    use std::collections::VecDeque;

    /// Records commands and replays canned responses.
    #[derive(Default)]
    struct Recorder {
        sent: Vec<ApduCommand>,
        replies: VecDeque<ApduResponse>,
        closed: bool,
    }

    #[async_trait]
    impl ApduExchange for Recorder {
        async fn exchange(&mut self, command: &ApduCommand) -> Result<ApduResponse, DeviceError> {
            self.sent.push(command.clone());
            Ok(self
                .replies
                .pop_front()
                .unwrap_or_else(|| ApduResponse::new(vec![], 0x9000)))
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }

    fn path() -> DerivationPath {
        DerivationPath::indexed(0, 0)
    }

    #[test]
    fn test_payload_layout() {
        let payload = signing_payload(&path(), b"m").unwrap();
        assert_eq!(payload[0], 1);
        assert_eq!(payload[1], 4);
        assert_eq!(&payload[2..6], &[0x80, 0x00, 0x00, 0x2c]);
        assert_eq!(&payload[6..10], &[0x80, 0x00, 0x01, 0xf5]);
        assert_eq!(payload.len(), 2 + 16 + 1);
        assert_eq!(payload[18], b'm');
    }

    #[tokio::test]
    async fn test_single_chunk() {
        let mut rec = Recorder::default();
        rec.replies.push_back(ApduResponse::new(vec![7u8; 64], 0x9000));
        let mut app = SolanaApp::new(rec);

        let sig = app.sign_transaction(&path(), b"hello").await.unwrap();
        assert_eq!(sig, vec![7u8; 64]);
        app.close().await;

        let rec = app.into_inner();
        assert!(rec.closed);
        assert_eq!(rec.sent.len(), 1);
        assert_eq!(rec.sent[0].ins, 0x06);
        assert_eq!(rec.sent[0].p1, P1_CONFIRM);
        assert_eq!(rec.sent[0].p2, 0);
    }

    #[tokio::test]
    async fn test_chunk_flags() {
        let mut rec = Recorder::default();
        rec.replies.push_back(ApduResponse::new(vec![], 0x9000));
        rec.replies.push_back(ApduResponse::new(vec![], 0x9000));
        rec.replies.push_back(ApduResponse::new(vec![1u8; 64], 0x9000));
        let mut app = SolanaApp::new(rec);

        // 18 bytes of header + 600 bytes of frame = 3 chunks
        app.sign_offchain_message(&path(), &[0u8; 600]).await.unwrap();
        let rec = app.into_inner();
        let p2s: Vec<u8> = rec.sent.iter().map(|c| c.p2).collect();
        assert_eq!(p2s, vec![P2_MORE, P2_EXTEND | P2_MORE, P2_EXTEND]);
        assert!(rec.sent.iter().all(|c| c.ins == 0x07));
        assert_eq!(rec.sent[0].data.len(), 255);
        assert_eq!(rec.sent[2].data.len(), 618 - 510);
    }

    #[tokio::test]
    async fn test_rejection_status() {
        let mut rec = Recorder::default();
        rec.replies.push_back(ApduResponse::new(vec![], 0x6985));
        let mut app = SolanaApp::new(rec);
        let err = app.sign_transaction(&path(), b"x").await.unwrap_err();
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn test_short_signature() {
        let mut rec = Recorder::default();
        rec.replies.push_back(ApduResponse::new(vec![1u8; 10], 0x9000));
        let mut app = SolanaApp::new(rec);
        let err = app.sign_transaction(&path(), b"x").await.unwrap_err();
        assert_eq!(err.kind, DeviceErrorKind::Fault);
    }
}
