use rand_core::RngCore;

use crate::config::EngineConfig;
use crate::error::{Error, LinkError};
use crate::fan::state::{FanCall, FanStatus, PendingCommand, ProtocolState};
use crate::hal::{Hardware, RadioConfig, RadioEvent, Transceiver};
use crate::protocol::{
    device_id_from_random, speed_name, Command, DeviceIdentity, DeviceType, Frame, PairingRecord, Payload,
    NETWORK_LINK_ID,
};
use crate::rf::{LinkHealth, TimeoutAction, Transport, TransportFailure, TransportState};
use crate::utils::preference_key;

/// 控制器可能返回的错误，驱动错误类型由硬件决定
pub type ControllerError<H> = Error<<<H as Hardware>::Radio as Transceiver>::Error>;

/// 风速变更后回给主机的确认负载
const SET_SPEED_REPLY: [u8; 3] = [0x54, 0x03, 0x20];

/// 电压百分比上限
const MAX_VOLTAGE: u8 = 100;

/// 把收到的电压钳位到 [0, 100]
pub fn clamp_voltage(voltage: u8) -> u8 {
    if voltage > MAX_VOLTAGE {
        warn!("{}: voltage {} out of range, clamped to {}", LinkError::MalformedValue.name(), voltage, MAX_VOLTAGE);
        MAX_VOLTAGE
    } else {
        voltage
    }
}

/// 遥控器侧协议引擎。
///
/// 宿主每个周期调用一次 [`tick`](Self::tick)，并把驱动通知交给
/// [`handle_event`](Self::handle_event)。两者都不阻塞。
pub struct FanController<H: Hardware> {
    hardware: H,
    config: EngineConfig,
    transport: Transport,
    health: LinkHealth,
    state: ProtocolState,
    pairing: PairingRecord,
    status: FanStatus,
    status_updated: bool,
    pending: Option<PendingCommand>,
    last_query_ms: u32,
    boot_ms: u32,
    store_key: u32,
    last_frame: Option<Frame>,
}

impl<H: Hardware> FanController<H> {
    /// 加载配对记录并把无线电配置为协议参数，监听链路地址
    pub fn new(mut hardware: H, config: EngineConfig) -> Result<Self, ControllerError<H>> {
        let now = hardware.get_timestamp_ms();
        let store_key = preference_key(config.preference_name);

        let mut pairing = PairingRecord::empty();
        if pairing.load(hardware.get_store(), store_key) {
            debug!("Loaded pairing record for network {:#x}", pairing.network_id);
        } else {
            debug!("No stored pairing record under key {:#x}", store_key);
        }

        let radio = hardware.get_radio();
        radio.update_config(&RadioConfig::protocol_default()).map_err(Error::Radio)?;
        radio.write_tx_address(NETWORK_LINK_ID).map_err(Error::Radio)?;

        Ok(Self {
            hardware,
            transport: Transport::new(&config),
            health: LinkHealth::new(&config, now),
            config,
            state: ProtocolState::Startup,
            pairing,
            status: FanStatus::default(),
            status_updated: false,
            pending: None,
            last_query_ms: now,
            boot_ms: now,
            store_key,
            last_frame: None,
        })
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn status(&self) -> FanStatus {
        self.status
    }

    /// 状态变化后只返回一次，供按变化发布的宿主使用
    pub fn take_status_update(&mut self) -> Option<FanStatus> {
        if self.status_updated {
            self.status_updated = false;
            Some(self.status)
        } else {
            None
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    pub fn health(&self) -> &LinkHealth {
        &self.health
    }

    pub fn pairing(&self) -> &PairingRecord {
        &self.pairing
    }

    pub fn pending(&self) -> Option<PendingCommand> {
        self.pending
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 最近一次交给传输层的帧
    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    pub fn log_config(&self) {
        info!("Fan link configuration:");
        info!("  Polling interval: {} ms", self.config.poll_interval_ms);
        info!("  Speed count: {}", self.config.speed_count);
        info!("  Preference key: {:#x}", self.store_key);
        info!("  Network ID: {:#x}", self.pairing.network_id);
        info!("  My device: type {:#x} id {:#x}", self.pairing.my_type, self.pairing.my_id);
        info!("  Main unit: type {:#x} id {:#x}", self.pairing.peer_type, self.pairing.peer_id);
        info!("  Link healthy: {}", self.health.is_healthy());
    }

    /// 调度入口：推进传输层，再按协议状态执行定时动作
    pub fn tick(&mut self) {
        let now = self.hardware.get_timestamp_ms();

        if let Some(failure) = self.transport.tick(self.hardware.get_radio(), now) {
            // 失败后的状态动作留到下一周期
            self.on_transport_failure(failure, now);
            return;
        }

        match self.state {
            ProtocolState::Startup => {
                if now.wrapping_sub(self.boot_ms) >= self.config.startup_delay_ms {
                    self.finish_startup();
                }
            }

            ProtocolState::StartDiscovery => {
                let device_id = self.create_device_id();
                if let Err(e) = self.discovery_start(device_id) {
                    warn!("Discovery start failed: {}", e.describe());
                }
            }

            ProtocolState::Idle => {
                if let Some(command) = self.pending.take() {
                    debug!("Applying queued speed {} timer {}", command.speed, command.timer);
                    if let Err(e) = self.send_speed_command(command.speed, command.timer) {
                        warn!("Queued speed command failed ({}), keeping it queued", e.describe());
                        self.pending = Some(command);
                    }
                } else if now.wrapping_sub(self.last_query_ms) >= self.config.poll_interval_ms {
                    debug!("Poll interval elapsed ({} ms)", now.wrapping_sub(self.last_query_ms));
                    if let Err(e) = self.query_device() {
                        warn!("Status query failed: {}", e.describe());
                    }
                }
            }

            ProtocolState::WaitSetSpeedConfirm => {
                if self.transport.is_idle() {
                    self.set_state(ProtocolState::Idle);
                }
            }

            _ => {}
        }
    }

    /// 处理一条驱动通知。
    ///
    /// 与当前状态不符的帧返回 `UnexpectedFrame`，状态不变。
    pub fn handle_event(&mut self, event: RadioEvent) -> Result<(), ControllerError<H>> {
        match event {
            RadioEvent::TxReady => {
                let now = self.hardware.get_timestamp_ms();
                self.transport.on_tx_ready(now);
                Ok(())
            }
            RadioEvent::RxComplete(bytes) => {
                let frame = Frame::decode(&bytes);
                trace!(
                    "Frame received: cmd {:#x} from {:#x}/{:#x} to {:#x}/{:#x} ttl {}",
                    frame.command,
                    frame.tx.device_type,
                    frame.tx.device_id,
                    frame.rx.device_type,
                    frame.rx.device_id,
                    frame.ttl
                );
                self.handle_frame(&frame)
            }
        }
    }

    /// 宿主控制入口，未给出的字段沿用当前状态
    pub fn control(&mut self, call: FanCall) {
        let on = call.state.unwrap_or(self.status.on);
        let speed = call.speed.unwrap_or(self.status.speed);
        debug!("Control call: on {} speed {}", on, speed);

        if self.state == ProtocolState::Idle {
            self.last_query_ms = self.hardware.get_timestamp_ms();
        }
        self.request_speed(if on { speed } else { 0 }, 0);
    }

    /// Idle 时立即发送，否则覆盖待发命令
    pub fn request_speed(&mut self, speed: u8, timer: u8) {
        let speed = self.clamp_speed(speed);

        if self.state == ProtocolState::Idle {
            if let Err(e) = self.send_speed_command(speed, timer) {
                warn!("Speed command failed ({}), queueing", e.describe());
                self.pending = Some(PendingCommand { speed, timer });
            }
        } else {
            debug!("Engine busy (state {}), queueing speed {} timer {}", self.state, speed, timer);
            self.pending = Some(PendingCommand { speed, timer });
        }
    }

    /// 写入手动配置的配对记录。启动完成后调用时立即切换到该网络并进入 Idle。
    pub fn set_pairing(&mut self, record: PairingRecord) -> Result<(), ControllerError<H>> {
        if !record.is_valid() {
            return Err(Error::Link(LinkError::MalformedValue));
        }
        if !record.save(self.hardware.get_store(), self.store_key) {
            error!("Failed to persist pairing record");
            return Err(Error::Storage);
        }
        self.pairing = record;
        info!("Pairing record set: network {:#x}", record.network_id);

        if self.state != ProtocolState::Startup {
            self.transport.complete();
            self.set_network_address(record.network_id)?;
            self.set_state(ProtocolState::Idle);
        }
        Ok(())
    }

    fn finish_startup(&mut self) {
        if !self.pairing.is_valid() {
            info!("No valid pairing record, starting discovery");
            self.set_state(ProtocolState::StartDiscovery);
            return;
        }

        info!(
            "Paired with main unit {:#x}/{:#x} on network {:#x}",
            self.pairing.peer_type,
            self.pairing.peer_id,
            self.pairing.network_id
        );
        let result = self
            .set_network_address(self.pairing.network_id)
            .and_then(|_| self.query_device());
        if let Err(e) = result {
            // 下一次轮询再试
            warn!("Initial status query failed: {}", e.describe());
            self.set_state(ProtocolState::Idle);
        }
    }

    fn create_device_id(&mut self) -> u8 {
        device_id_from_random(self.hardware.get_rng().next_u32() as u8)
    }

    fn discovery_start(&mut self, device_id: u8) -> Result<(), ControllerError<H>> {
        info!("Starting discovery with device id {:#x}", device_id);

        // 上一次未完成的配对不保留
        self.pairing = PairingRecord {
            my_type: DeviceType::RemoteControl as u8,
            my_id: device_id,
            ..PairingRecord::empty()
        };

        let frame = Frame::new(
            DeviceIdentity::new(DeviceType::LinkTarget as u8, 0x00),
            self.pairing.my_identity(),
            Command::NetworkJoinAck,
            Payload::NetworkJoinAck {
                network_id: NETWORK_LINK_ID,
            },
        );

        self.set_network_address(NETWORK_LINK_ID)?;
        self.transmit(frame, Some(self.config.tx_retries), Some(TimeoutAction::RestartDiscovery))?;
        self.set_state(ProtocolState::DiscoveryWaitLinkRequest);
        Ok(())
    }

    fn query_device(&mut self) -> Result<(), ControllerError<H>> {
        debug!(
            "Querying main unit {:#x}/{:#x}",
            self.pairing.peer_type,
            self.pairing.peer_id
        );
        self.last_query_ms = self.hardware.get_timestamp_ms();

        let frame = Frame::new(
            self.pairing.peer_identity(),
            self.pairing.my_identity(),
            Command::QueryDevice,
            Payload::empty(),
        );
        self.transmit(frame, Some(self.config.tx_retries), Some(TimeoutAction::ReturnToIdle))?;
        self.set_state(ProtocolState::WaitQueryResponse);
        Ok(())
    }

    fn send_speed_command(&mut self, speed: u8, timer: u8) -> Result<(), ControllerError<H>> {
        let speed = self.clamp_speed(speed);
        info!("Setting fan speed {} ({}) timer {} min", speed, speed_name(speed), timer);

        // 命令广播给主机类型，主机只按类型匹配
        let rx = DeviceIdentity::new(self.pairing.peer_type, 0x00);
        let (tx_type, command, payload) = if timer == 0 && speed == 0 {
            // 自动模式：模仿定时遥控器的“关闭”命令，发送方类型留空
            (DeviceType::Broadcast, Command::SetTimer, Payload::SetTimer { speed: 0, timer: 0 })
        } else if timer == 0 {
            (DeviceType::Co2Sensor, Command::SetSpeed, Payload::SetSpeed { speed })
        } else {
            (DeviceType::TimerRemoteControl, Command::SetTimer, Payload::SetTimer { speed, timer })
        };

        let frame = Frame::new(rx, DeviceIdentity::new(tx_type as u8, self.pairing.my_id), command, payload);
        self.transmit(frame, Some(self.config.tx_retries), Some(TimeoutAction::ReturnToIdle))?;
        self.pending = None;
        self.set_state(ProtocolState::WaitSetSpeedResponse);
        Ok(())
    }

    fn handle_frame(&mut self, frame: &Frame) -> Result<(), ControllerError<H>> {
        match self.state {
            ProtocolState::DiscoveryWaitLinkRequest => match (frame.kind(), &frame.payload) {
                (Some(Command::NetworkJoinOpen), Payload::NetworkJoinOpen { network_id }) if *network_id != 0 => {
                    self.on_join_open(frame, *network_id)
                }
                _ => self.unexpected(frame),
            },

            ProtocolState::DiscoveryWaitJoinResponse => {
                if frame.kind() == Some(Command::LinkSuccess)
                    && frame.rx == self.pairing.my_identity()
                    && frame.tx == self.pairing.peer_identity()
                {
                    self.on_link_success(frame)
                } else {
                    warn!(
                        "Unexpected join response: cmd {:#x} rx {:#x}/{:#x} tx {:#x}/{:#x}",
                        frame.command,
                        frame.rx.device_type,
                        frame.rx.device_id,
                        frame.tx.device_type,
                        frame.tx.device_id
                    );
                    Err(Error::Link(LinkError::UnexpectedFrame))
                }
            }

            ProtocolState::DiscoveryJoinComplete => {
                let peer = self.pairing.peer_identity();
                if frame.kind() == Some(Command::QueryNetwork) && frame.rx == peer && frame.tx == peer {
                    self.on_network_confirmed()
                } else {
                    self.unexpected(frame)
                }
            }

            ProtocolState::WaitQueryResponse => {
                if !frame.is_addressed_to(self.pairing.my_identity()) {
                    return self.unexpected(frame);
                }
                match frame.payload {
                    Payload::FanSettings { speed, voltage, timer } => {
                        self.transport.complete();
                        self.update_status(speed, voltage, timer);
                        self.record_success();
                        self.set_state(ProtocolState::Idle);
                        Ok(())
                    }
                    _ => self.unexpected(frame),
                }
            }

            ProtocolState::WaitSetSpeedResponse => {
                if !frame.is_addressed_to(self.pairing.my_identity()) {
                    return self.unexpected(frame);
                }
                match (frame.kind(), &frame.payload) {
                    (_, Payload::FanSettings { speed, voltage, timer }) => {
                        self.on_speed_confirmed(*speed, *voltage, *timer)
                    }
                    (Some(Command::SetSpeedReply), _) | (Some(Command::SetVoltageReply), _) => {
                        trace!("Acknowledgement {:#x} ignored", frame.command);
                        Ok(())
                    }
                    _ => self.unexpected(frame),
                }
            }

            _ => self.unexpected(frame),
        }
    }

    fn on_join_open(&mut self, frame: &Frame, network_id: u32) -> Result<(), ControllerError<H>> {
        info!(
            "Join offer from {:#x}/{:#x} ({}) for network {:#x}",
            frame.tx.device_type,
            frame.tx.device_id,
            DeviceType::name(frame.tx.device_type),
            network_id
        );
        self.transport.complete();

        self.pairing.network_id = network_id;
        self.pairing.peer_type = frame.tx.device_type;
        self.pairing.peer_id = frame.tx.device_id;

        let request = Frame::new(
            DeviceIdentity::new(DeviceType::MainUnit as u8, frame.tx.device_id),
            self.pairing.my_identity(),
            Command::NetworkJoinRequest,
            Payload::NetworkJoinRequest { network_id },
        );

        let result = self
            .set_network_address(network_id)
            .and_then(|_| self.transmit(request, Some(self.config.tx_retries), Some(TimeoutAction::AbandonJoin)));
        match result {
            Ok(()) => {
                self.set_state(ProtocolState::DiscoveryWaitJoinResponse);
                Ok(())
            }
            Err(e) => {
                self.set_state(ProtocolState::StartDiscovery);
                Err(e)
            }
        }
    }

    fn on_link_success(&mut self, frame: &Frame) -> Result<(), ControllerError<H>> {
        debug!("Link established with {:#x}/{:#x}", frame.tx.device_type, frame.tx.device_id);
        self.transport.complete();

        let reply = Frame::new(
            DeviceIdentity::new(DeviceType::MainUnit as u8, frame.tx.device_id),
            self.pairing.my_identity(),
            Command::LinkSuccess,
            Payload::empty(),
        );
        match self.transmit(reply, Some(self.config.tx_retries), Some(TimeoutAction::AbandonJoin)) {
            Ok(()) => {
                self.set_state(ProtocolState::DiscoveryJoinComplete);
                Ok(())
            }
            Err(e) => {
                self.set_state(ProtocolState::StartDiscovery);
                Err(e)
            }
        }
    }

    fn on_network_confirmed(&mut self) -> Result<(), ControllerError<H>> {
        self.transport.complete();

        if !self.pairing.is_valid() {
            error!("Pairing incomplete after network confirmation, restarting discovery");
            self.set_state(ProtocolState::StartDiscovery);
            return Err(Error::Link(LinkError::MalformedValue));
        }

        info!("Pairing complete: network {:#x}", self.pairing.network_id);
        self.record_success();
        self.set_state(ProtocolState::Idle);

        if !self.pairing.save(self.hardware.get_store(), self.store_key) {
            error!("Failed to persist pairing record");
            return Err(Error::Storage);
        }
        Ok(())
    }

    fn on_speed_confirmed(&mut self, speed: u8, voltage: u8, timer: u8) -> Result<(), ControllerError<H>> {
        // 兼容现场设备的怪癖：此路径上连续两次 complete，原因未明，待实机确认
        self.transport.complete();
        self.transport.complete();

        self.update_status(speed, voltage, timer);
        self.record_success();

        let ack = Frame::new(
            self.pairing.peer_identity(),
            self.pairing.my_identity(),
            Command::SetSpeedReply,
            Payload::raw(&SET_SPEED_REPLY),
        );
        let result = self.transmit(ack, None, None);
        self.set_state(ProtocolState::WaitSetSpeedConfirm);
        result
    }

    fn on_transport_failure(&mut self, failure: TransportFailure, now: u32) {
        warn!("Transmission failed in state {}: {}", self.state, failure.reason.name());
        self.health.record(false, now);

        let action = match failure.action {
            Some(action) => action,
            None => return,
        };
        if action.marks_failure() {
            self.health.record(false, now);
        }
        match action {
            TimeoutAction::RestartDiscovery | TimeoutAction::AbandonJoin => {
                self.set_state(ProtocolState::StartDiscovery)
            }
            TimeoutAction::ReturnToIdle => self.set_state(ProtocolState::Idle),
        }
    }

    fn transmit(
        &mut self,
        frame: Frame,
        retries: Option<u8>,
        on_timeout: Option<TimeoutAction>,
    ) -> Result<(), ControllerError<H>> {
        let now = self.hardware.get_timestamp_ms();
        self.transport
            .start_transmit(self.hardware.get_radio(), &frame.encode(), retries, on_timeout, now)?;
        trace!("Queued frame cmd {:#x}", frame.command);
        self.last_frame = Some(frame);
        Ok(())
    }

    fn set_network_address(&mut self, address: u32) -> Result<(), ControllerError<H>> {
        debug!("Switching radio to network {:#x}", address);
        self.hardware
            .get_radio()
            .set_network_address(address)
            .map_err(Error::Radio)
    }

    fn update_status(&mut self, speed: u8, voltage: u8, timer: u8) {
        self.status = FanStatus {
            on: speed > 0,
            speed,
            voltage: clamp_voltage(voltage),
            timer,
        };
        self.status_updated = true;
        info!(
            "Fan status: speed {} ({}) voltage {}% timer {} min",
            speed,
            speed_name(speed),
            self.status.voltage,
            timer
        );
    }

    fn record_success(&mut self) {
        let now = self.hardware.get_timestamp_ms();
        self.health.record(true, now);
    }

    fn clamp_speed(&self, speed: u8) -> u8 {
        if speed > self.config.speed_count {
            warn!("Speed {} exceeds maximum {}, clamping", speed, self.config.speed_count);
            self.config.speed_count
        } else {
            speed
        }
    }

    fn unexpected(&self, frame: &Frame) -> Result<(), ControllerError<H>> {
        debug!(
            "Ignoring frame cmd {:#x} from {:#x}/{:#x} in state {}",
            frame.command,
            frame.tx.device_type,
            frame.tx.device_id,
            self.state
        );
        Err(Error::Link(LinkError::UnexpectedFrame))
    }

    fn set_state(&mut self, state: ProtocolState) {
        if self.state != state {
            debug!("State transition: {} -> {}", self.state, state);
            self.state = state;
        }
    }
}
