//! 射频传输状态机：等待空口空闲、发送、等待回复、重试与超时。
//!
//! 状态流转 `Idle -> WaitAirwayFree -> TxBusy -> RxWait -> {WaitAirwayFree | Idle}`。
//! 空口等待和回复等待各有独立上限；重试从空口等待重新开始，因为上一次发送可能已经碰撞。
//! 传输层从不直接回调应用层，超时以 [`TransportFailure`] 的形式由 [`Transport::tick`] 返回。

use core::fmt;

use crate::config::EngineConfig;
use crate::error::{Error, LinkError};
use crate::hal::{PostTxMode, Transceiver};
use crate::protocol::FRAME_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportState {
    Idle,
    WaitAirwayFree,
    TxBusy,
    RxWait,
}

impl TransportState {
    pub fn name(self) -> &'static str {
        match self {
            TransportState::Idle => "Idle",
            TransportState::WaitAirwayFree => "WaitAirwayFree",
            TransportState::TxBusy => "TxBusy",
            TransportState::RxWait => "RxWait",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 发送超时后应用层要执行的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeoutAction {
    /// 发现广播无人响应：记一次失败并回到 StartDiscovery
    RestartDiscovery,
    /// 入网请求或链路确认无响应：回到 StartDiscovery，不额外记失败
    AbandonJoin,
    /// 正常运行中：记一次失败并回到 Idle，等待下一次轮询或命令
    ReturnToIdle,
}

impl TimeoutAction {
    /// 该动作是否在传输层之外再向健康统计记一次失败
    pub fn marks_failure(self) -> bool {
        !matches!(self, TimeoutAction::AbandonJoin)
    }
}

/// 一次发送以失败告终
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportFailure {
    /// `ChannelTimeout` 或 `ReplyTimeout`
    pub reason: LinkError,
    pub action: Option<TimeoutAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retries {
    /// 不等待回复，也没有回复超时
    Disabled,
    Remaining(u8),
}

pub struct Transport {
    state: TransportState,
    retries: Retries,
    on_timeout: Option<TimeoutAction>,
    airway_wait_start: u32,
    msg_send_time: u32,
    airway_timeout_ms: u32,
    reply_timeout_ms: u32,
    tx_frames: u8,
}

impl Transport {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: TransportState::Idle,
            retries: Retries::Disabled,
            on_timeout: None,
            airway_wait_start: 0,
            msg_send_time: 0,
            airway_timeout_ms: config.airway_timeout_ms,
            reply_timeout_ms: config.reply_timeout_ms,
            tx_frames: config.tx_frames,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == TransportState::Idle
    }

    /// 剩余重试次数；不等待回复时为 `None`
    pub fn remaining_retries(&self) -> Option<u8> {
        match self.retries {
            Retries::Disabled => None,
            Retries::Remaining(n) => Some(n),
        }
    }

    /// 把帧装入驱动发送缓冲区并开始等待空口。
    ///
    /// `retries` 为 `None` 表示发送后不等待回复。非 `Idle` 时返回 `Busy` 且不改变任何状态。
    pub fn start_transmit<R: Transceiver>(
        &mut self,
        radio: &mut R,
        frame: &[u8; FRAME_SIZE],
        retries: Option<u8>,
        on_timeout: Option<TimeoutAction>,
        now: u32,
    ) -> Result<(), Error<R::Error>> {
        if self.state != TransportState::Idle {
            warn!("TX still ongoing (transport state {})", self.state);
            return Err(Error::Link(LinkError::Busy));
        }

        debug!("Loading {}-byte payload into TX buffer", FRAME_SIZE);
        radio.write_tx_payload(frame).map_err(Error::Radio)?;

        self.on_timeout = on_timeout;
        self.retries = match retries {
            Some(n) => Retries::Remaining(n),
            None => Retries::Disabled,
        };
        self.airway_wait_start = now;
        self.set_state(TransportState::WaitAirwayFree);
        Ok(())
    }

    /// 强制回到 Idle 并关闭重试，应用层处理完回复后调用
    pub fn complete(&mut self) {
        debug!("RF operation complete - resetting retry counter and returning to idle");
        self.retries = Retries::Disabled;
        self.on_timeout = None;
        self.set_state(TransportState::Idle);
    }

    /// 驱动通知：物理发送已完成
    pub fn on_tx_ready(&mut self, now: u32) {
        if self.state != TransportState::TxBusy {
            trace!("Tx ready ignored in transport state {}", self.state);
            return;
        }

        match self.retries {
            Retries::Remaining(_) => {
                self.msg_send_time = now;
                self.set_state(TransportState::RxWait);
            }
            Retries::Disabled => self.set_state(TransportState::Idle),
        }
    }

    /// 每个调度周期调用一次，返回本周期内结束的失败发送
    pub fn tick<R: Transceiver>(&mut self, radio: &mut R, now: u32) -> Option<TransportFailure> {
        match self.state {
            TransportState::Idle | TransportState::TxBusy => None,

            TransportState::WaitAirwayFree => {
                if now.wrapping_sub(self.airway_wait_start) > self.airway_timeout_ms {
                    warn!("Airway busy timeout after {} ms - aborting transmission", self.airway_timeout_ms);
                    return Some(self.fail(LinkError::ChannelTimeout));
                }

                if !radio.channel_busy() {
                    match radio.start_tx(self.tx_frames, PostTxMode::Receive) {
                        Ok(()) => {
                            debug!("Airway clear - started transmission of {} frames", self.tx_frames);
                            self.msg_send_time = now;
                            self.set_state(TransportState::TxBusy);
                        }
                        Err(_) => {
                            warn!("Failed to start transmission, retrying on next tick");
                        }
                    }
                }
                None
            }

            TransportState::RxWait => {
                let remaining = match self.retries {
                    Retries::Remaining(n) => n,
                    Retries::Disabled => return None,
                };
                if now.wrapping_sub(self.msg_send_time) <= self.reply_timeout_ms {
                    return None;
                }

                debug!("RF receive timeout after {} ms", self.reply_timeout_ms);
                if remaining > 0 {
                    self.retries = Retries::Remaining(remaining - 1);
                    debug!("No response received, retrying transmission ({} attempts remaining)", remaining - 1);
                    self.airway_wait_start = now;
                    self.set_state(TransportState::WaitAirwayFree);
                    None
                } else {
                    warn!("All retry attempts exhausted - no response received");
                    Some(self.fail(LinkError::ReplyTimeout))
                }
            }
        }
    }

    fn fail(&mut self, reason: LinkError) -> TransportFailure {
        self.retries = Retries::Disabled;
        self.set_state(TransportState::Idle);
        TransportFailure {
            reason,
            action: self.on_timeout.take(),
        }
    }

    fn set_state(&mut self, state: TransportState) {
        if self.state != state {
            trace!("RF state transition: {} -> {}", self.state, state);
            self.state = state;
        }
    }
}
