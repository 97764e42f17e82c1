use crate::config::EngineConfig;

/// 由发送结果推导出的链路健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkHealth {
    healthy: bool,
    consecutive_failures: u32,
    last_success_ms: u32,
    failure_threshold: u32,
    stale_after_ms: u32,
}

impl LinkHealth {
    /// 初始视为健康，`now` 作为最近一次成功时间
    pub fn new(config: &EngineConfig, now: u32) -> Self {
        Self {
            healthy: true,
            consecutive_failures: 0,
            last_success_ms: now,
            failure_threshold: config.health_failure_threshold,
            stale_after_ms: config.health_stale_after_ms,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_success_ms(&self) -> u32 {
        self.last_success_ms
    }

    /// 记录一次结果，健康状态发生翻转时返回 true
    pub fn record(&mut self, success: bool, now: u32) -> bool {
        if success {
            self.consecutive_failures = 0;
            self.last_success_ms = now;

            if !self.healthy {
                info!("RF communication restored - link healthy");
                self.healthy = true;
                return true;
            }
            return false;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let since_success = now.wrapping_sub(self.last_success_ms);
        let unhealthy = self.consecutive_failures >= self.failure_threshold || since_success > self.stale_after_ms;

        if unhealthy && self.healthy {
            warn!(
                "RF communication failed ({} failures, last success {} ms ago) - link unhealthy",
                self.consecutive_failures,
                since_success
            );
            self.healthy = false;
            return true;
        }
        false
    }
}
