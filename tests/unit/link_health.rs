#[cfg(test)]
mod link_health_tests {
    use common::{EngineConfig, LinkHealth};

    #[test]
    fn test_successes_never_flip_healthy_link() {
        let mut health = LinkHealth::new(&EngineConfig::default(), 0);

        for now in (0..10).map(|i| i * 30_000) {
            assert!(!health.record(true, now));
        }
        assert!(health.is_healthy());
        assert_eq!(health.last_success_ms(), 270_000);
    }

    #[test]
    fn test_interleaved_success_resets_failure_count() {
        let mut health = LinkHealth::new(&EngineConfig::default(), 0);

        health.record(false, 1_000);
        health.record(false, 2_000);
        health.record(true, 3_000);
        health.record(false, 4_000);
        health.record(false, 5_000);
        assert!(health.is_healthy());
        assert_eq!(health.consecutive_failures(), 2);

        assert!(health.record(false, 6_000));
        assert!(!health.is_healthy());
    }

    #[test]
    fn test_stale_window_counts_from_last_success() {
        let mut health = LinkHealth::new(&EngineConfig::default(), 0);
        health.record(true, 100_000);

        // 距最近一次成功 300000 ms 以内，单次失败不翻转
        assert!(!health.record(false, 400_000));
        assert!(health.is_healthy());

        assert!(health.record(false, 400_001));
        assert!(!health.is_healthy());
    }

    #[test]
    fn test_threshold_follows_config() {
        let config = EngineConfig {
            health_failure_threshold: 1,
            ..EngineConfig::default()
        };
        let mut health = LinkHealth::new(&config, 0);

        assert!(health.record(false, 10));
        assert!(!health.is_healthy());
    }

    #[test]
    fn test_stale_check_survives_clock_wraparound() {
        let start = u32::MAX - 1_000;
        let mut health = LinkHealth::new(&EngineConfig::default(), start);

        // 回绕后只过去 2001 ms
        assert!(!health.record(false, 1_000));
        assert!(health.is_healthy());
    }
}
