#![cfg_attr(not(any(test, feature = "simulator")), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod fan;
pub mod hal;
pub mod protocol;
pub mod rf;
pub mod utils;

// 重新导出核心类型
pub use config::EngineConfig;
pub use error::{Error, LinkError};
pub use fan::{FanCall, FanController, FanStatus, PendingCommand, ProtocolState};
pub use hal::{Hardware, PreferenceStore, RadioConfig, RadioEvent, Transceiver};
pub use protocol::{Command, DeviceIdentity, DeviceType, Frame, PairingRecord, Payload};
pub use rf::{LinkHealth, Transport, TransportState};
pub use utils::{calculate_checksum, preference_key};
