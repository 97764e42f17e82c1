pub mod frame;
pub mod pairing;

pub use frame::{Frame, Payload, RawFrame};
pub use pairing::PairingRecord;

// 协议常量
pub const FRAME_SIZE: usize = 16;
pub const PAYLOAD_SIZE: usize = 9;
/// 本引擎不做多跳路由，TTL 原样填入
pub const FAN_TTL: u8 = 0xFA;
/// 配对阶段使用的公开链路地址
pub const NETWORK_LINK_ID: u32 = 0x8981_6EA9;

/// 设备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DeviceType {
    Broadcast = 0x00,
    MainUnit = 0x01,
    RemoteControl = 0x03,
    LinkTarget = 0x04,        // 发现广播的接收类型
    TimerRemoteControl = 0x16,
    Co2Sensor = 0x18,
}

impl DeviceType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Broadcast),
            0x01 => Some(Self::MainUnit),
            0x03 => Some(Self::RemoteControl),
            0x04 => Some(Self::LinkTarget),
            0x16 => Some(Self::TimerRemoteControl),
            0x18 => Some(Self::Co2Sensor),
            _ => None,
        }
    }

    pub fn name(value: u8) -> &'static str {
        match Self::from_u8(value) {
            Some(Self::Broadcast) => "Broadcast",
            Some(Self::MainUnit) => "Main Unit",
            Some(Self::RemoteControl) => "Remote Control",
            Some(Self::LinkTarget) => "Link Target",
            Some(Self::TimerRemoteControl) => "Timer Remote",
            Some(Self::Co2Sensor) => "CO2 Sensor",
            None => "Unknown",
        }
    }
}

/// 帧命令字
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    SetVoltage = 0x01,
    SetSpeed = 0x02,
    SetTimer = 0x03,
    NetworkJoinRequest = 0x04,
    SetSpeedReply = 0x05,
    NetworkJoinOpen = 0x06,
    FanSettings = 0x07,
    LinkSuccess = 0x0B,       // 链路建立确认
    NetworkJoinAck = 0x0C,
    QueryNetwork = 0x0D,
    QueryDevice = 0x10,
    SetVoltageReply = 0x1D,
}

impl Command {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::SetVoltage),
            0x02 => Some(Self::SetSpeed),
            0x03 => Some(Self::SetTimer),
            0x04 => Some(Self::NetworkJoinRequest),
            0x05 => Some(Self::SetSpeedReply),
            0x06 => Some(Self::NetworkJoinOpen),
            0x07 => Some(Self::FanSettings),
            0x0B => Some(Self::LinkSuccess),
            0x0C => Some(Self::NetworkJoinAck),
            0x0D => Some(Self::QueryNetwork),
            0x10 => Some(Self::QueryDevice),
            0x1D => Some(Self::SetVoltageReply),
            _ => None,
        }
    }

    /// 类型化负载的字节长度；没有类型化负载的命令返回 `None`
    pub fn payload_len(self) -> Option<usize> {
        match self {
            Self::SetSpeed => Some(1),
            Self::SetTimer => Some(2),
            Self::NetworkJoinRequest | Self::NetworkJoinOpen | Self::NetworkJoinAck => Some(4),
            Self::FanSettings => Some(3),
            _ => None,
        }
    }
}

/// 设备身份：类型 + 编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceIdentity {
    pub device_type: u8,
    pub device_id: u8,
}

impl DeviceIdentity {
    /// 0x00 为广播，0xFF 无效
    pub const MIN_ID: u8 = 0x01;
    pub const MAX_ID: u8 = 0xFE;

    pub const fn new(device_type: u8, device_id: u8) -> Self {
        Self { device_type, device_id }
    }

    pub fn is_broadcast(&self) -> bool {
        self.device_id == 0x00
    }

    pub fn has_valid_id(&self) -> bool {
        (Self::MIN_ID..=Self::MAX_ID).contains(&self.device_id)
    }
}

/// 把随机字节映射到 [1, 254]，边界值被钳位而不是重新抽取
pub fn device_id_from_random(random: u8) -> u8 {
    random.clamp(DeviceIdentity::MIN_ID, DeviceIdentity::MAX_ID)
}

/// 风速档位名称，仅用于日志
pub fn speed_name(speed: u8) -> &'static str {
    match speed {
        0 => "Auto",
        1 => "Low",
        2 => "Medium",
        3 => "High",
        4 => "Max",
        _ => "Unknown",
    }
}
