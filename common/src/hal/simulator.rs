use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, Sender};
use embedded_hal::blocking::delay::DelayMs;
use heapless::FnvIndexMap;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::hal::{Hardware, PostTxMode, PreferenceStore, RadioConfig, RadioEvent, Transceiver};
use crate::protocol::FRAME_SIZE;
use crate::utils::{calculate_checksum, verify_checksum};

/// 模拟器错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorError {
    RadioError,
    ConfigError,
}

/// 空口上传输的一帧，附带发送端计算的 CRC
#[derive(Debug, Clone, Copy)]
struct AirFrame {
    payload: [u8; FRAME_SIZE],
    crc: u16,
}

struct Station {
    id: usize,
    rx_address: u32,
    sender: Sender<AirFrame>,
}

struct AirInner {
    stations: Mutex<Vec<Station>>,
    next_id: AtomicUsize,
    busy: AtomicBool,
    drop_next: AtomicU32,
    corrupt_next: AtomicU32,
}

/// 共享空口，按接收地址把帧投递给各个站点
#[derive(Clone)]
pub struct SimAir {
    inner: Arc<AirInner>,
}

impl SimAir {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AirInner {
                stations: Mutex::new(Vec::new()),
                next_id: AtomicUsize::new(0),
                busy: AtomicBool::new(false),
                drop_next: AtomicU32::new(0),
                corrupt_next: AtomicU32::new(0),
            }),
        }
    }

    /// 接入一个新站点，接收地址为默认配置中的链路地址
    pub fn station(&self) -> SimRadio {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let config = RadioConfig::protocol_default();
        let (sender, inbox) = unbounded();

        if let Ok(mut stations) = self.inner.stations.lock() {
            stations.push(Station {
                id,
                rx_address: config.rx_address,
                sender,
            });
        }

        SimRadio {
            id,
            air: self.clone(),
            config,
            tx_address: config.rx_address,
            tx_payload: [0; FRAME_SIZE],
            inbox,
            tx_ready: false,
            tx_count: 0,
            failed_writes: 0,
        }
    }

    /// 模拟其他设备占用空口
    pub fn set_busy(&self, busy: bool) {
        self.inner.busy.store(busy, Ordering::SeqCst);
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    /// 丢弃接下来 `count` 次发送
    pub fn drop_next(&self, count: u32) {
        self.inner.drop_next.store(count, Ordering::SeqCst);
    }

    /// 破坏接下来 `count` 次发送的内容，接收端会因 CRC 错误丢弃
    pub fn corrupt_next(&self, count: u32) {
        self.inner.corrupt_next.store(count, Ordering::SeqCst);
    }

    fn set_rx_address(&self, id: usize, address: u32) {
        if let Ok(mut stations) = self.inner.stations.lock() {
            if let Some(station) = stations.iter_mut().find(|s| s.id == id) {
                station.rx_address = address;
            }
        }
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// 投递一帧，返回收到该帧的站点数
    fn transmit(&self, source: usize, address: u32, payload: &[u8; FRAME_SIZE]) -> usize {
        if Self::take_one(&self.inner.drop_next) {
            return 0;
        }

        let mut frame = AirFrame {
            payload: *payload,
            crc: calculate_checksum(payload),
        };
        if Self::take_one(&self.inner.corrupt_next) {
            frame.payload[FRAME_SIZE - 1] ^= 0xFF;
        }

        let mut delivered = 0;
        if let Ok(stations) = self.inner.stations.lock() {
            for station in stations.iter() {
                // 忽略自己发送的帧
                if station.id != source && station.rx_address == address && station.sender.send(frame).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }
}

impl Default for SimAir {
    fn default() -> Self {
        Self::new()
    }
}

/// 模拟收发器
pub struct SimRadio {
    id: usize,
    air: SimAir,
    config: RadioConfig,
    tx_address: u32,
    tx_payload: [u8; FRAME_SIZE],
    inbox: Receiver<AirFrame>,
    tx_ready: bool,
    tx_count: u32,
    /// 之后若干次写发送缓冲区返回错误
    failed_writes: u32,
}

impl SimRadio {
    /// 取出下一条驱动通知，发送完成优先于接收
    pub fn poll_event(&mut self) -> Option<RadioEvent> {
        if self.tx_ready {
            self.tx_ready = false;
            return Some(RadioEvent::TxReady);
        }

        while let Ok(frame) = self.inbox.try_recv() {
            if verify_checksum(&frame.payload, frame.crc) {
                return Some(RadioEvent::RxComplete(frame.payload));
            }
            debug!("Station {} dropped frame with CRC error", self.id);
        }
        None
    }

    /// 已执行的 `start_tx` 次数
    pub fn tx_count(&self) -> u32 {
        self.tx_count
    }

    pub fn tx_address(&self) -> u32 {
        self.tx_address
    }

    /// 让之后 `count` 次 `write_tx_payload` 失败
    pub fn fail_next_writes(&mut self, count: u32) {
        self.failed_writes = count;
    }

    pub fn tx_payload(&self) -> &[u8; FRAME_SIZE] {
        &self.tx_payload
    }

    /// 直接发送一帧，不经过空口检测，用于测试中扮演对端
    pub fn send_frame(&mut self, address: u32, payload: &[u8; FRAME_SIZE]) -> usize {
        self.tx_address = address;
        self.tx_payload = *payload;
        self.tx_count += 1;
        self.air.transmit(self.id, address, payload)
    }
}

impl Transceiver for SimRadio {
    type Error = SimulatorError;

    fn config(&self) -> RadioConfig {
        self.config
    }

    fn update_config(&mut self, config: &RadioConfig) -> Result<(), Self::Error> {
        // nRF905 信道号为 9 位
        if config.channel > 0x1FF || config.rx_payload_width as usize != FRAME_SIZE {
            return Err(SimulatorError::ConfigError);
        }

        self.config = *config;
        self.air.set_rx_address(self.id, config.rx_address);
        Ok(())
    }

    fn write_tx_address(&mut self, address: u32) -> Result<(), Self::Error> {
        self.tx_address = address;
        Ok(())
    }

    fn write_tx_payload(&mut self, payload: &[u8; FRAME_SIZE]) -> Result<(), Self::Error> {
        if self.failed_writes > 0 {
            self.failed_writes -= 1;
            return Err(SimulatorError::RadioError);
        }
        self.tx_payload = *payload;
        Ok(())
    }

    fn channel_busy(&mut self) -> bool {
        self.air.is_busy()
    }

    fn start_tx(&mut self, repeat: u8, _mode: PostTxMode) -> Result<(), Self::Error> {
        if repeat == 0 {
            return Err(SimulatorError::RadioError);
        }

        // 重复帧在空口上合并为一次投递
        self.tx_count += 1;
        self.air.transmit(self.id, self.tx_address, &self.tx_payload);
        self.tx_ready = true;
        Ok(())
    }
}

/// 模拟的键值偏好存储，克隆后共享同一份数据，可跨“重启”保留
#[derive(Clone, Default)]
pub struct SimPreferences {
    records: Arc<Mutex<FnvIndexMap<u32, heapless::Vec<u8, 32>, 8>>>,
    writes: Arc<AtomicU32>,
}

impl SimPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// 成功写入的次数
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: u32) -> Option<Vec<u8>> {
        let records = self.records.lock().ok()?;
        records.get(&key).map(|data| data.to_vec())
    }
}

impl PreferenceStore for SimPreferences {
    fn load(&mut self, key: u32, buf: &mut [u8]) -> bool {
        let records = match self.records.lock() {
            Ok(records) => records,
            Err(_) => return false,
        };
        match records.get(&key) {
            Some(data) if data.len() == buf.len() => {
                buf.copy_from_slice(data);
                true
            }
            _ => false,
        }
    }

    fn save(&mut self, key: u32, data: &[u8]) -> bool {
        let value = match heapless::Vec::from_slice(data) {
            Ok(value) => value,
            Err(_) => return false,
        };
        let mut records = match self.records.lock() {
            Ok(records) => records,
            Err(_) => return false,
        };
        if records.insert(key, value).is_err() {
            return false;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// 毫秒时钟：手动推进（测试用）或跟随系统时间
#[derive(Clone)]
pub struct SimClock {
    manual: Option<Arc<AtomicU32>>,
    start: Instant,
}

impl SimClock {
    pub fn manual() -> Self {
        Self {
            manual: Some(Arc::new(AtomicU32::new(0))),
            start: Instant::now(),
        }
    }

    pub fn system() -> Self {
        Self {
            manual: None,
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u32 {
        match &self.manual {
            Some(now) => now.load(Ordering::SeqCst),
            // 截断即回绕
            None => self.start.elapsed().as_millis() as u32,
        }
    }

    /// 推进手动时钟，对系统时钟无效
    pub fn advance(&self, ms: u32) {
        if let Some(now) = &self.manual {
            now.fetch_add(ms, Ordering::SeqCst);
        }
    }

    pub fn set(&self, ms: u32) {
        if let Some(now) = &self.manual {
            now.store(ms, Ordering::SeqCst);
        }
    }

    pub fn is_manual(&self) -> bool {
        self.manual.is_some()
    }
}

/// 模拟器硬件实现
pub struct SimHardware {
    radio: SimRadio,
    store: SimPreferences,
    rng: SmallRng,
    clock: SimClock,
}

impl SimHardware {
    pub fn new(air: &SimAir, clock: SimClock, store: SimPreferences, seed: u64) -> Self {
        Self {
            radio: air.station(),
            store,
            rng: SmallRng::seed_from_u64(seed),
            clock,
        }
    }

    pub fn radio(&self) -> &SimRadio {
        &self.radio
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn store(&self) -> &SimPreferences {
        &self.store
    }
}

impl Hardware for SimHardware {
    type Radio = SimRadio;
    type Store = SimPreferences;
    type Rng = SmallRng;

    fn get_radio(&mut self) -> &mut Self::Radio {
        &mut self.radio
    }

    fn get_store(&mut self) -> &mut Self::Store {
        &mut self.store
    }

    fn get_rng(&mut self) -> &mut Self::Rng {
        &mut self.rng
    }

    fn get_timestamp_ms(&self) -> u32 {
        self.clock.now_ms()
    }
}

impl DelayMs<u32> for SimHardware {
    fn delay_ms(&mut self, ms: u32) {
        if self.clock.is_manual() {
            self.clock.advance(ms);
        } else {
            thread::sleep(Duration::from_millis(ms as u64));
        }
    }
}
