use heapless::Vec;
use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::protocol::{Command, DeviceIdentity, FAN_TTL, FRAME_SIZE, PAYLOAD_SIZE};

/// 线上帧布局，16 字节，无填充
#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawFrame {
    pub rx_type: u8,         // 0x00
    pub rx_id: u8,           // 0x01
    pub tx_type: u8,         // 0x02
    pub tx_id: u8,           // 0x03
    pub ttl: u8,             // 0x04
    pub command: u8,         // 0x05
    pub parameter_count: u8, // 0x06
    pub parameters: [u8; PAYLOAD_SIZE], // 0x07 - 0x0F
}

/// 按命令解释后的负载
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    SetSpeed { speed: u8 },
    SetTimer { speed: u8, timer: u8 },
    NetworkJoinOpen { network_id: u32 },
    NetworkJoinRequest { network_id: u32 },
    NetworkJoinAck { network_id: u32 },
    FanSettings { speed: u8, voltage: u8, timer: u8 },
    /// 确认帧、未知命令或长度不符的负载
    Raw(Vec<u8, PAYLOAD_SIZE>),
}

impl Payload {
    pub fn empty() -> Self {
        Payload::Raw(Vec::new())
    }

    /// 从原始字节构造，超出 9 字节的部分被截断
    pub fn raw(bytes: &[u8]) -> Self {
        let len = bytes.len().min(PAYLOAD_SIZE);
        let mut raw = Vec::new();
        // 长度已截断，不会溢出
        let _ = raw.extend_from_slice(&bytes[..len]);
        Payload::Raw(raw)
    }

    /// 写入负载区并返回参数个数
    fn write_into(&self, parameters: &mut [u8; PAYLOAD_SIZE]) -> u8 {
        match self {
            Payload::SetSpeed { speed } => {
                parameters[0] = *speed;
                1
            }
            Payload::SetTimer { speed, timer } => {
                parameters[0] = *speed;
                parameters[1] = *timer;
                2
            }
            Payload::NetworkJoinOpen { network_id }
            | Payload::NetworkJoinRequest { network_id }
            | Payload::NetworkJoinAck { network_id } => {
                parameters[..4].copy_from_slice(&network_id.to_le_bytes());
                4
            }
            Payload::FanSettings { speed, voltage, timer } => {
                parameters[0] = *speed;
                parameters[1] = *voltage;
                parameters[2] = *timer;
                3
            }
            Payload::Raw(bytes) => {
                parameters[..bytes.len()].copy_from_slice(bytes);
                bytes.len() as u8
            }
        }
    }

    fn read_from(command: u8, parameter_count: u8, parameters: &[u8; PAYLOAD_SIZE]) -> Self {
        let typed_len = Command::from_u8(command).and_then(Command::payload_len);
        if typed_len != Some(parameter_count as usize) {
            return Payload::raw(&parameters[..(parameter_count as usize).min(PAYLOAD_SIZE)]);
        }

        let network_id = || u32::from_le_bytes([parameters[0], parameters[1], parameters[2], parameters[3]]);
        match Command::from_u8(command) {
            Some(Command::SetSpeed) => Payload::SetSpeed { speed: parameters[0] },
            Some(Command::SetTimer) => Payload::SetTimer {
                speed: parameters[0],
                timer: parameters[1],
            },
            Some(Command::NetworkJoinOpen) => Payload::NetworkJoinOpen { network_id: network_id() },
            Some(Command::NetworkJoinRequest) => Payload::NetworkJoinRequest { network_id: network_id() },
            Some(Command::NetworkJoinAck) => Payload::NetworkJoinAck { network_id: network_id() },
            Some(Command::FanSettings) => Payload::FanSettings {
                speed: parameters[0],
                voltage: parameters[1],
                timer: parameters[2],
            },
            _ => Payload::raw(&parameters[..parameter_count as usize]),
        }
    }
}

/// 解码后的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub rx: DeviceIdentity,
    pub tx: DeviceIdentity,
    pub ttl: u8,
    pub command: u8,
    pub payload: Payload,
}

impl Frame {
    pub fn new(rx: DeviceIdentity, tx: DeviceIdentity, command: Command, payload: Payload) -> Self {
        Self {
            rx,
            tx,
            ttl: FAN_TTL,
            command: command as u8,
            payload,
        }
    }

    pub fn kind(&self) -> Option<Command> {
        Command::from_u8(self.command)
    }

    pub fn is_addressed_to(&self, identity: DeviceIdentity) -> bool {
        self.rx == identity
    }

    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut raw = RawFrame {
            rx_type: self.rx.device_type,
            rx_id: self.rx.device_id,
            tx_type: self.tx.device_type,
            tx_id: self.tx.device_id,
            ttl: self.ttl,
            command: self.command,
            ..RawFrame::default()
        };
        raw.parameter_count = self.payload.write_into(&mut raw.parameters);

        let mut bytes = [0u8; FRAME_SIZE];
        bytes.copy_from_slice(raw.as_bytes());
        bytes
    }

    /// 解码不会失败，未知命令以原始字节保留
    pub fn decode(bytes: &[u8; FRAME_SIZE]) -> Self {
        let raw = RawFrame::read_from(&bytes[..]).unwrap_or_default();
        Self {
            rx: DeviceIdentity::new(raw.rx_type, raw.rx_id),
            tx: DeviceIdentity::new(raw.tx_type, raw.tx_id),
            ttl: raw.ttl,
            command: raw.command,
            payload: Payload::read_from(raw.command, raw.parameter_count, &raw.parameters),
        }
    }
}
