#[cfg(feature = "simulator")]
pub mod simulator;

use rand_core::RngCore;

use crate::protocol::{FRAME_SIZE, NETWORK_LINK_ID};

/// 接收功率模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxPower {
    Normal,
    Reduced,
}

/// 发送完成后无线电进入的模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PostTxMode {
    Idle,
    Receive,
}

/// 收发器配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioConfig {
    pub band: bool,
    pub channel: u16,
    pub crc_enable: bool,
    pub crc_bits: u8,
    pub tx_power: i8,
    pub rx_power: RxPower,
    pub rx_address: u32,
    pub rx_address_width: u8,
    pub rx_payload_width: u8,
    pub tx_address_width: u8,
    pub tx_payload_width: u8,
    pub xtal_frequency: u32,
    pub clk_out_enable: bool,
}

impl RadioConfig {
    /// 本协议固定的射频参数，接收地址为配对链路地址
    pub fn protocol_default() -> Self {
        Self {
            band: true,
            channel: 118,
            crc_enable: true,
            crc_bits: 16,
            tx_power: 10,
            rx_power: RxPower::Normal,
            rx_address: NETWORK_LINK_ID,
            rx_address_width: 4,
            rx_payload_width: FRAME_SIZE as u8,
            tx_address_width: 4,
            tx_payload_width: FRAME_SIZE as u8,
            xtal_frequency: 16_000_000,
            clk_out_enable: false,
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self::protocol_default()
    }
}

/// 驱动的异步通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioEvent {
    /// 物理发送完成
    TxReady,
    /// 收到一帧（CRC 已由驱动校验）
    RxComplete([u8; FRAME_SIZE]),
}

/// 收发器驱动接口
pub trait Transceiver {
    type Error: core::fmt::Debug;

    fn config(&self) -> RadioConfig;

    fn update_config(&mut self, config: &RadioConfig) -> Result<(), Self::Error>;

    fn write_tx_address(&mut self, address: u32) -> Result<(), Self::Error>;

    fn write_tx_payload(&mut self, payload: &[u8; FRAME_SIZE]) -> Result<(), Self::Error>;

    /// 空口是否被占用
    fn channel_busy(&mut self) -> bool;

    /// 把发送缓冲区中的帧重复发送 `repeat` 次
    fn start_tx(&mut self, repeat: u8, mode: PostTxMode) -> Result<(), Self::Error>;

    /// 同时切换收发地址
    fn set_network_address(&mut self, address: u32) -> Result<(), Self::Error> {
        let mut config = self.config();
        config.rx_address = address;
        self.update_config(&config)?;
        self.write_tx_address(address)
    }
}

/// 以键区分的持久化存储
pub trait PreferenceStore {
    /// 读取 `buf.len()` 字节；不存在或长度不符时返回 false
    fn load(&mut self, key: u32, buf: &mut [u8]) -> bool;

    fn save(&mut self, key: u32, data: &[u8]) -> bool;
}

/// 硬件抽象层接口
pub trait Hardware {
    type Radio: Transceiver;
    type Store: PreferenceStore;
    type Rng: RngCore;

    /// 获取无线电接口
    fn get_radio(&mut self) -> &mut Self::Radio;

    fn get_store(&mut self) -> &mut Self::Store;

    fn get_rng(&mut self) -> &mut Self::Rng;

    /// 单调毫秒计数，允许回绕
    fn get_timestamp_ms(&self) -> u32;
}
