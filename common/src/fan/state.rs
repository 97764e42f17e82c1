use core::fmt;

/// 应用层协议状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolState {
    Startup,
    StartDiscovery,
    DiscoveryWaitLinkRequest,
    DiscoveryWaitJoinResponse,
    DiscoveryJoinComplete,
    Idle,
    WaitQueryResponse,
    WaitSetSpeedResponse,
    WaitSetSpeedConfirm,
}

impl ProtocolState {
    pub fn name(self) -> &'static str {
        match self {
            ProtocolState::Startup => "Startup",
            ProtocolState::StartDiscovery => "StartDiscovery",
            ProtocolState::DiscoveryWaitLinkRequest => "DiscoveryWaitLinkRequest",
            ProtocolState::DiscoveryWaitJoinResponse => "DiscoveryWaitJoinResponse",
            ProtocolState::DiscoveryJoinComplete => "DiscoveryJoinComplete",
            ProtocolState::Idle => "Idle",
            ProtocolState::WaitQueryResponse => "WaitQueryResponse",
            ProtocolState::WaitSetSpeedResponse => "WaitSetSpeedResponse",
            ProtocolState::WaitSetSpeedConfirm => "WaitSetSpeedConfirm",
        }
    }

    /// 是否处于配对流程中
    pub fn is_discovery(self) -> bool {
        matches!(
            self,
            ProtocolState::StartDiscovery
                | ProtocolState::DiscoveryWaitLinkRequest
                | ProtocolState::DiscoveryWaitJoinResponse
                | ProtocolState::DiscoveryJoinComplete
        )
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 对外发布的风机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FanStatus {
    pub on: bool,
    pub speed: u8,
    /// 电压百分比，始终在 [0, 100]
    pub voltage: u8,
    /// 剩余定时（分钟）
    pub timer: u8,
}

/// 非 Idle 时收到的风速请求，只保留最新一条
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingCommand {
    pub speed: u8,
    pub timer: u8,
}

/// 宿主发起的控制请求，未给出的字段沿用当前状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FanCall {
    pub state: Option<bool>,
    pub speed: Option<u8>,
}

impl FanCall {
    pub fn turn_on() -> Self {
        Self {
            state: Some(true),
            speed: None,
        }
    }

    pub fn turn_off() -> Self {
        Self {
            state: Some(false),
            speed: None,
        }
    }

    pub fn with_speed(mut self, speed: u8) -> Self {
        self.speed = Some(speed);
        self
    }
}
