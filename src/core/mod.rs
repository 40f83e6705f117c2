pub mod config;
pub mod errors;
pub mod logging;

pub use config::{HardwareConfig, LoggingConfig, SignerConfig};
pub use errors::{DeviceError, DeviceErrorKind, QueueError, SignerError};
pub use logging::init_logging;
