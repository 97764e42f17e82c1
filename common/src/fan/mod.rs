//! 遥控器侧应用协议：配对发现、周期查询、风速与定时命令。

mod controller;
mod state;

pub use controller::{clamp_voltage, ControllerError, FanController};
pub use state::{FanCall, FanStatus, PendingCommand, ProtocolState};
