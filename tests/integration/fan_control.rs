#[cfg(test)]
mod fan_control_tests {
    use common::hal::simulator::{SimAir, SimClock, SimHardware, SimPreferences, SimRadio};
    use common::hal::Hardware;
    use common::utils::preference_key;
    use common::{EngineConfig, FanCall, FanController, FanStatus, PairingRecord, ProtocolState};
    use unit::{MainUnit, UnitSettings};

    const UNIT_ID: u8 = 0x22;
    const REMOTE_ID: u8 = 0x5A;
    const NETWORK: u32 = 0x0BAD_CAFE;
    const STEP_MS: u32 = 5;

    struct Link {
        air: SimAir,
        clock: SimClock,
        ctrl: FanController<SimHardware>,
        unit: MainUnit<SimRadio>,
    }

    impl Link {
        /// 已配对并完成首次状态查询
        fn paired(config: EngineConfig) -> Self {
            let air = SimAir::new();
            let clock = SimClock::manual();
            let mut prefs = SimPreferences::new();
            let record = PairingRecord {
                network_id: NETWORK,
                my_type: 0x03,
                my_id: REMOTE_ID,
                peer_type: 0x01,
                peer_id: UNIT_ID,
            };
            assert!(record.save(&mut prefs, preference_key(config.preference_name)));

            let mut unit = MainUnit::new(air.station(), UNIT_ID, NETWORK).unwrap();
            unit.set_paired(record.my_identity());

            let hardware = SimHardware::new(&air, clock.clone(), prefs, 9);
            let mut link = Self {
                air,
                clock,
                ctrl: FanController::new(hardware, config).unwrap(),
                unit,
            };
            link.run(config.startup_delay_ms + 100);
            assert_eq!(link.ctrl.state(), ProtocolState::Idle);
            assert_eq!(link.ctrl.take_status_update().map(|s| s.speed), Some(1));
            link
        }

        fn pump(&mut self) {
            while let Some(event) = self.ctrl.hardware_mut().get_radio().poll_event() {
                let _ = self.ctrl.handle_event(event);
            }
        }

        fn step(&mut self) {
            self.ctrl.tick();
            self.pump();
            self.unit.poll();
            self.pump();
            self.clock.advance(STEP_MS);
        }

        fn run(&mut self, ms: u32) {
            for _ in 0..ms / STEP_MS {
                self.step();
            }
        }
    }

    #[test]
    fn test_speed_command_round_trip() {
        let mut link = Link::paired(EngineConfig::default());

        link.ctrl.request_speed(3, 0);
        link.run(100);

        assert_eq!(
            link.unit.settings(),
            UnitSettings {
                speed: 3,
                voltage: 70,
                timer: 0,
            }
        );
        assert_eq!(
            link.ctrl.take_status_update(),
            Some(FanStatus {
                on: true,
                speed: 3,
                voltage: 70,
                timer: 0,
            })
        );
        assert_eq!(link.ctrl.state(), ProtocolState::Idle);
        assert!(link.ctrl.is_healthy());
    }

    #[test]
    fn test_timed_command_and_auto() {
        let mut link = Link::paired(EngineConfig::default());

        link.ctrl.request_speed(2, 45);
        link.run(100);
        assert_eq!(link.unit.settings().timer, 45);
        assert_eq!(link.ctrl.status().timer, 45);

        link.ctrl.control(FanCall::turn_off());
        link.run(100);
        assert_eq!(link.unit.settings().speed, 0);
        assert!(!link.ctrl.status().on);
        assert_eq!(link.ctrl.status().voltage, 30);
    }

    #[test]
    fn test_commands_while_busy_apply_latest_once() {
        let mut link = Link::paired(EngineConfig::default());

        link.ctrl.request_speed(1, 0);
        link.ctrl.request_speed(2, 0);
        link.ctrl.request_speed(4, 0);
        let sent_before = link.unit.frames_sent();
        link.run(200);

        assert_eq!(link.unit.settings().speed, 4);
        // 一次立即发送加一次排队命令，各得到一条状态回复
        assert_eq!(link.unit.frames_sent() - sent_before, 2);
        assert_eq!(link.ctrl.pending(), None);
    }

    #[test]
    fn test_silent_unit_marks_link_unhealthy_then_recovers() {
        let config = EngineConfig::default().with_tx_retries(0);
        let mut link = Link::paired(config);

        link.unit.set_silent(true);
        link.run(100_000);
        assert!(!link.ctrl.is_healthy());
        assert!(link.ctrl.health().consecutive_failures() >= 3);
        assert_eq!(link.ctrl.state(), ProtocolState::Idle);

        link.unit.set_silent(false);
        link.run(31_000);
        assert!(link.ctrl.is_healthy());
        assert_eq!(link.ctrl.health().consecutive_failures(), 0);
    }

    #[test]
    fn test_busy_airway_gives_up_after_channel_timeout() {
        let mut link = Link::paired(EngineConfig::default());

        link.air.set_busy(true);
        link.ctrl.request_speed(2, 0);
        link.run(5_100);

        assert_eq!(link.ctrl.state(), ProtocolState::Idle);
        // 空口超时与命令超时各记一次
        assert_eq!(link.ctrl.health().consecutive_failures(), 2);
        assert!(link.ctrl.is_healthy());
        assert_eq!(link.unit.settings().speed, 1);

        link.air.set_busy(false);
        link.ctrl.request_speed(2, 0);
        link.run(100);
        assert_eq!(link.unit.settings().speed, 2);
        assert_eq!(link.ctrl.health().consecutive_failures(), 0);
    }

    #[test]
    fn test_lost_command_is_retried() {
        let mut link = Link::paired(EngineConfig::default());

        link.air.corrupt_next(1);
        link.ctrl.request_speed(3, 0);
        link.run(500);
        assert_eq!(link.unit.settings().speed, 1);

        link.run(1_000);
        assert_eq!(link.unit.settings().speed, 3);
        assert_eq!(link.ctrl.status().speed, 3);
        assert_eq!(link.ctrl.health().consecutive_failures(), 0);
    }

    #[test]
    fn test_out_of_range_voltage_is_clamped() {
        let mut link = Link::paired(EngineConfig::default());

        link.unit.set_reported_voltage(Some(180));
        link.ctrl.request_speed(4, 0);
        link.run(100);
        assert_eq!(link.ctrl.status().voltage, 100);
    }

    #[test]
    fn test_periodic_poll_refreshes_status() {
        let mut link = Link::paired(EngineConfig::default());
        let sent_before = link.unit.frames_sent();

        link.run(30_000);
        assert_eq!(link.unit.frames_sent() - sent_before, 1);
        assert_eq!(link.ctrl.take_status_update().map(|s| s.voltage), Some(30));
    }
}
