//! APDU (Application Protocol Data Unit) 命令处理
//!
//! Command/response framing for the Ledger Solana app, plus status word
//! classification into [`DeviceError`].

use async_trait::async_trait;
use tracing::debug;

use crate::core::errors::{DeviceError, DeviceErrorKind};

/// 标准 CLA (所有 Ledger apps 都使用 0xE0)
pub const CLA: u8 = 0xE0;

/// P1: 需要设备确认
pub const P1_CONFIRM: u8 = 0x01;
/// P2: this chunk continues a previous one
pub const P2_EXTEND: u8 = 0x01;
/// P2: more chunks follow
pub const P2_MORE: u8 = 0x02;

/// Largest data field a short APDU carries.
pub const MAX_CHUNK_LEN: usize = 255;

pub const SW_OK: u16 = 0x9000;
pub const SW_USER_REJECTED: u16 = 0x6985;
pub const SW_LOCKED: u16 = 0x5515;
pub const SW_BLIND_SIGNING_DISABLED: u16 = 0x6808;
const SW_APP_NOT_OPEN: [u16; 4] = [0x6e00, 0x6e01, 0x6d00, 0x6511];

/// Solana app 指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SolanaInstruction {
    /// Sign a transaction message
    SignMessage = 0x06,
    /// Sign an offchain message frame
    SignOffchainMessage = 0x07,
}

/// APDU 命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    /// At most [`MAX_CHUNK_LEN`] bytes.
    pub data: Vec<u8>,
}

impl ApduCommand {
    pub fn new(ins: SolanaInstruction, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        debug_assert!(data.len() <= MAX_CHUNK_LEN);
        Self {
            cla: CLA,
            ins: ins as u8,
            p1,
            p2,
            data,
        }
    }

    /// 序列化为字节数组
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.data.len());
        bytes.push(self.cla);
        bytes.push(self.ins);
        bytes.push(self.p1);
        bytes.push(self.p2);
        bytes.push(self.data.len() as u8);
        bytes.extend_from_slice(&self.data);

        debug!(
            "APDU 命令: CLA={:02X} INS={:02X} P1={:02X} P2={:02X} Len={}",
            self.cla,
            self.ins,
            self.p1,
            self.p2,
            self.data.len()
        );
        bytes
    }
}

/// APDU 响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl ApduResponse {
    pub fn new(data: Vec<u8>, status: u16) -> Self {
        let [sw1, sw2] = status.to_be_bytes();
        Self { data, sw1, sw2 }
    }

    /// from字节数组解析
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DeviceError> {
        if bytes.len() < 2 {
            return Err(DeviceError::transport("APDU response shorter than status word"));
        }
        let len = bytes.len();
        let response = Self {
            data: bytes[..len - 2].to_vec(),
            sw1: bytes[len - 2],
            sw2: bytes[len - 1],
        };
        debug!(
            "APDU 响应: SW={:04X} DataLen={}",
            response.status_code(),
            response.data.len()
        );
        Ok(response)
    }

    pub fn is_success(&self) -> bool {
        self.status_code() == SW_OK
    }

    pub fn status_code(&self) -> u16 {
        u16::from_be_bytes([self.sw1, self.sw2])
    }

    pub fn error_description(&self) -> String {
        match self.status_code() {
            SW_OK => "success".to_string(),
            SW_USER_REJECTED => "Transaction rejected on device".to_string(),
            SW_LOCKED => "Device is locked".to_string(),
            SW_BLIND_SIGNING_DISABLED => "Blind signing is disabled in the Solana app".to_string(),
            0x6e00 | 0x6e01 | 0x6d00 | 0x6511 => "Solana app is not open".to_string(),
            0x6a80 => "Invalid data".to_string(),
            0x6700 => "Wrong data length".to_string(),
            0x6b00 => "Invalid parameters".to_string(),
            other => format!("Unknown status: {:04X}", other),
        }
    }

    /// Data on success, a classified [`DeviceError`] otherwise.
    pub fn into_result(self) -> Result<Vec<u8>, DeviceError> {
        if self.is_success() {
            return Ok(self.data);
        }
        let status = self.status_code();
        Err(DeviceError::new(classify_status(status), self.error_description()).with_status(status))
    }
}

/// Map a non-success status word onto the device error kinds.
pub fn classify_status(status: u16) -> DeviceErrorKind {
    match status {
        SW_USER_REJECTED => DeviceErrorKind::Rejected,
        SW_LOCKED => DeviceErrorKind::Locked,
        SW_BLIND_SIGNING_DISABLED => DeviceErrorKind::BlindSigningDisabled,
        s if SW_APP_NOT_OPEN.contains(&s) => DeviceErrorKind::AppNotOpen,
        _ => DeviceErrorKind::Fault,
    }
}

/// One open link to a device: raw APDU in, raw APDU out. The byte pushing
/// (HID, BLE) lives behind this trait.
#[async_trait]
pub trait ApduExchange: Send {
    async fn exchange(&mut self, command: &ApduCommand) -> Result<ApduResponse, DeviceError>;

    async fn close(&mut self) {}
}
