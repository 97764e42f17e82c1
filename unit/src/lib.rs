//! 模拟的风机主机，实现每一步交互的对端，用于联调和集成测试。

use common::hal::{PostTxMode, RadioConfig, RadioEvent, Transceiver};
use common::protocol::{Command, DeviceIdentity, DeviceType, Frame, Payload, NETWORK_LINK_ID};
use log::{debug, info, trace, warn};

/// 各档位对应的电压百分比，0 档为自动
const VOLTAGE_TABLE: [u8; 5] = [30, 30, 50, 70, 100];

/// 主机支持的最高档位
pub const UNIT_SPEED_COUNT: u8 = (VOLTAGE_TABLE.len() - 1) as u8;

/// 主机每次发送重复的帧数
const UNIT_TX_FRAMES: u8 = 4;

/// 主机当前的运行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitSettings {
    pub speed: u8,
    pub voltage: u8,
    pub timer: u8,
}

pub struct MainUnit<R: Transceiver> {
    radio: R,
    identity: DeviceIdentity,
    network_id: u32,
    pairing_open: bool,
    candidate: Option<DeviceIdentity>,
    paired: Option<DeviceIdentity>,
    settings: UnitSettings,
    /// 报告电压时使用的覆盖值，用于模拟损坏数据
    reported_voltage: Option<u8>,
    silent: bool,
    frames_sent: u32,
}

impl<R: Transceiver> MainUnit<R> {
    /// 主机监听自己的网络地址；需要配对时调用 [`open_pairing`](Self::open_pairing)
    pub fn new(mut radio: R, device_id: u8, network_id: u32) -> Result<Self, R::Error> {
        let config = RadioConfig {
            rx_address: network_id,
            ..RadioConfig::protocol_default()
        };
        radio.update_config(&config)?;
        radio.write_tx_address(network_id)?;

        Ok(Self {
            radio,
            identity: DeviceIdentity::new(DeviceType::MainUnit as u8, device_id),
            network_id,
            pairing_open: false,
            candidate: None,
            paired: None,
            settings: UnitSettings {
                speed: 1,
                voltage: VOLTAGE_TABLE[1],
                timer: 0,
            },
            reported_voltage: None,
            silent: false,
            frames_sent: 0,
        })
    }

    /// 切到公开链路地址，接受下一个遥控器的配对
    pub fn open_pairing(&mut self) -> Result<(), R::Error> {
        info!("Main unit {:#x}: pairing open", self.identity.device_id);
        self.pairing_open = true;
        self.candidate = None;
        self.radio.set_network_address(NETWORK_LINK_ID)
    }

    /// 已配对的遥控器身份，用于重启后恢复
    pub fn set_paired(&mut self, remote: DeviceIdentity) {
        self.paired = Some(remote);
    }

    /// 静默时丢弃所有收到的帧，模拟主机断电
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    pub fn set_reported_voltage(&mut self, voltage: Option<u8>) {
        self.reported_voltage = voltage;
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn network_id(&self) -> u32 {
        self.network_id
    }

    pub fn is_pairing_open(&self) -> bool {
        self.pairing_open
    }

    pub fn paired_remote(&self) -> Option<DeviceIdentity> {
        self.paired
    }

    pub fn settings(&self) -> UnitSettings {
        self.settings
    }

    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn handle_event(&mut self, event: RadioEvent) -> Result<(), R::Error> {
        match event {
            RadioEvent::TxReady => Ok(()),
            RadioEvent::RxComplete(bytes) => {
                if self.silent {
                    trace!("Main unit silent, frame dropped");
                    return Ok(());
                }
                let frame = Frame::decode(&bytes);
                self.handle_frame(&frame)
            }
        }
    }

    fn handle_frame(&mut self, frame: &Frame) -> Result<(), R::Error> {
        match (frame.kind(), &frame.payload) {
            (Some(Command::NetworkJoinAck), Payload::NetworkJoinAck { network_id })
                if self.pairing_open
                    && *network_id == NETWORK_LINK_ID
                    && frame.rx.device_type == DeviceType::LinkTarget as u8 =>
            {
                info!(
                    "Main unit: discovery from remote {:#x}/{:#x}",
                    frame.tx.device_type,
                    frame.tx.device_id
                );
                self.candidate = Some(frame.tx);
                self.send(Frame::new(
                    frame.tx,
                    self.identity,
                    Command::NetworkJoinOpen,
                    Payload::NetworkJoinOpen {
                        network_id: self.network_id,
                    },
                ))?;
                self.radio.set_network_address(self.network_id)
            }

            (Some(Command::NetworkJoinRequest), Payload::NetworkJoinRequest { network_id })
                if *network_id == self.network_id
                    && frame.rx == self.identity
                    && Some(frame.tx) == self.candidate =>
            {
                debug!("Main unit: join request from {:#x}", frame.tx.device_id);
                self.send(Frame::new(frame.tx, self.identity, Command::LinkSuccess, Payload::empty()))
            }

            (Some(Command::LinkSuccess), _) if frame.rx == self.identity && Some(frame.tx) == self.candidate => {
                info!("Main unit: paired with remote {:#x}", frame.tx.device_id);
                self.paired = self.candidate.take();
                self.pairing_open = false;
                self.send(Frame::new(self.identity, self.identity, Command::QueryNetwork, Payload::empty()))
            }

            (Some(Command::QueryDevice), _) if frame.rx == self.identity && Some(frame.tx) == self.paired => {
                debug!("Main unit: status query");
                self.send_settings()
            }

            (Some(Command::SetSpeed), Payload::SetSpeed { speed }) if self.accepts_command(frame) => {
                self.apply(*speed, 0);
                self.send_settings()
            }

            (Some(Command::SetTimer), Payload::SetTimer { speed, timer }) if self.accepts_command(frame) => {
                self.apply(*speed, *timer);
                self.send_settings()
            }

            (Some(Command::SetSpeedReply), _) => {
                trace!("Main unit: speed change acknowledged");
                Ok(())
            }

            _ => {
                debug!(
                    "Main unit: ignoring cmd {:#x} from {:#x}/{:#x}",
                    frame.command,
                    frame.tx.device_type,
                    frame.tx.device_id
                );
                Ok(())
            }
        }
    }

    /// 命令按类型广播，发送方类型随命令形态变化，只核对编号
    fn accepts_command(&self, frame: &Frame) -> bool {
        frame.rx == DeviceIdentity::new(self.identity.device_type, 0x00)
            && self.paired.map(|remote| remote.device_id) == Some(frame.tx.device_id)
    }

    fn apply(&mut self, speed: u8, timer: u8) {
        let index = (speed as usize).min(VOLTAGE_TABLE.len() - 1);
        self.settings = UnitSettings {
            speed,
            voltage: VOLTAGE_TABLE[index],
            timer,
        };
        info!("Main unit: speed {} voltage {}% timer {} min", speed, self.settings.voltage, timer);
    }

    fn send_settings(&mut self) -> Result<(), R::Error> {
        let remote = match self.paired {
            Some(remote) => remote,
            None => {
                warn!("Main unit: no paired remote to report to");
                return Ok(());
            }
        };
        let settings = self.settings;
        self.send(Frame::new(
            remote,
            self.identity,
            Command::FanSettings,
            Payload::FanSettings {
                speed: settings.speed,
                voltage: self.reported_voltage.unwrap_or(settings.voltage),
                timer: settings.timer,
            },
        ))
    }

    fn send(&mut self, frame: Frame) -> Result<(), R::Error> {
        self.radio.write_tx_payload(&frame.encode())?;
        self.radio.start_tx(UNIT_TX_FRAMES, PostTxMode::Receive)?;
        self.frames_sent += 1;
        Ok(())
    }
}

#[cfg(feature = "simulator")]
impl MainUnit<common::hal::simulator::SimRadio> {
    /// 处理所有待处理的驱动通知，返回处理的数量
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.radio.poll_event() {
            if let Err(e) = self.handle_event(event) {
                warn!("Main unit radio error: {:?}", e);
            }
            handled += 1;
        }
        handled
    }
}
