/// 引擎配置，默认值与现场设备一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// 上电后等待多久再检查配对记录
    pub startup_delay_ms: u32,
    /// 周期性状态查询间隔
    pub poll_interval_ms: u32,
    /// 风速档位数
    pub speed_count: u8,
    /// 等待回复超时后的重发次数
    pub tx_retries: u8,
    /// 每次发送重复的帧数
    pub tx_frames: u8,
    pub reply_timeout_ms: u32,
    pub airway_timeout_ms: u32,
    pub health_failure_threshold: u32,
    pub health_stale_after_ms: u32,
    /// 偏好存储键名，键值为其 CRC-32
    pub preference_name: &'static str,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: 15_000,
            poll_interval_ms: 30_000,
            speed_count: 4,
            tx_retries: 10,
            tx_frames: 4,
            reply_timeout_ms: 1_000,
            airway_timeout_ms: 5_000,
            health_failure_threshold: 3,
            health_stale_after_ms: 300_000,
            preference_name: "fanlink-pairing",
        }
    }
}

impl EngineConfig {
    pub fn with_startup_delay(mut self, ms: u32) -> Self {
        self.startup_delay_ms = ms;
        self
    }

    pub fn with_poll_interval(mut self, ms: u32) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_speed_count(mut self, count: u8) -> Self {
        self.speed_count = count;
        self
    }

    pub fn with_tx_retries(mut self, retries: u8) -> Self {
        self.tx_retries = retries;
        self
    }

    pub fn with_reply_timeout(mut self, ms: u32) -> Self {
        self.reply_timeout_ms = ms;
        self
    }

    pub fn with_preference_name(mut self, name: &'static str) -> Self {
        self.preference_name = name;
        self
    }
}
