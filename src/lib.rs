//! 风机遥控链路：协议引擎、传输层与模拟硬件。
//!
//! 实际实现位于 `common`，此处统一导出，供集成测试和外部使用。

pub use common::*;
