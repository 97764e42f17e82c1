#[cfg(test)]
mod pairing_tests {
    use common::hal::simulator::{SimAir, SimClock, SimHardware, SimPreferences, SimRadio};
    use common::hal::{Hardware, Transceiver};
    use common::protocol::{Command, DeviceIdentity, Frame, Payload, NETWORK_LINK_ID};
    use common::utils::preference_key;
    use common::{EngineConfig, FanController, PairingRecord, ProtocolState, RadioEvent};
    use unit::MainUnit;

    const UNIT_ID: u8 = 0x22;
    const NETWORK: u32 = 0x1234_5678;
    const STEP_MS: u32 = 5;

    struct Link {
        clock: SimClock,
        prefs: SimPreferences,
        ctrl: FanController<SimHardware>,
        unit: Option<MainUnit<SimRadio>>,
    }

    impl Link {
        fn new(air: &SimAir, clock: &SimClock, prefs: &SimPreferences, config: EngineConfig) -> Self {
            let hardware = SimHardware::new(air, clock.clone(), prefs.clone(), 42);
            Self {
                clock: clock.clone(),
                prefs: prefs.clone(),
                ctrl: FanController::new(hardware, config).unwrap(),
                unit: None,
            }
        }

        fn pump(&mut self) {
            while let Some(event) = self.ctrl.hardware_mut().get_radio().poll_event() {
                let _ = self.ctrl.handle_event(event);
            }
        }

        fn step(&mut self) {
            self.ctrl.tick();
            self.pump();
            if let Some(unit) = self.unit.as_mut() {
                unit.poll();
            }
            self.pump();
            self.clock.advance(STEP_MS);
        }

        fn run(&mut self, ms: u32) {
            for _ in 0..ms / STEP_MS {
                self.step();
            }
        }

        fn run_until(&mut self, limit_ms: u32, done: impl Fn(&Self) -> bool) -> bool {
            for _ in 0..limit_ms / STEP_MS {
                if done(self) {
                    return true;
                }
                self.step();
            }
            done(self)
        }
    }

    fn key() -> u32 {
        preference_key(EngineConfig::default().preference_name)
    }

    #[test]
    fn test_full_pairing_persists_record() {
        let air = SimAir::new();
        let clock = SimClock::manual();
        let prefs = SimPreferences::new();

        let mut unit = MainUnit::new(air.station(), UNIT_ID, NETWORK).unwrap();
        unit.open_pairing().unwrap();

        let mut link = Link::new(&air, &clock, &prefs, EngineConfig::default());
        link.unit = Some(unit);

        assert!(link.run_until(20_000, |l| l.ctrl.state() == ProtocolState::Idle));
        assert!(link.clock.now_ms() >= 15_000);

        let record = *link.ctrl.pairing();
        assert!(record.is_valid());
        assert_eq!(record.network_id, NETWORK);
        assert_eq!(record.peer_identity(), DeviceIdentity::new(0x01, UNIT_ID));
        assert_eq!(record.my_type, 0x03);

        assert_eq!(link.prefs.write_count(), 1);
        assert_eq!(link.prefs.get(key()), Some(record.to_bytes().to_vec()));

        let unit = link.unit.as_ref().unwrap();
        assert_eq!(unit.paired_remote(), Some(record.my_identity()));
        assert!(!unit.is_pairing_open());
        assert_eq!(link.ctrl.hardware().radio().config().rx_address, NETWORK);
    }

    #[test]
    fn test_reboot_with_stored_record_skips_discovery() {
        let air = SimAir::new();
        let clock = SimClock::manual();
        let prefs = SimPreferences::new();

        let mut unit = MainUnit::new(air.station(), UNIT_ID, NETWORK).unwrap();
        unit.open_pairing().unwrap();
        let mut link = Link::new(&air, &clock, &prefs, EngineConfig::default());
        link.unit = Some(unit);
        assert!(link.run_until(20_000, |l| l.ctrl.state() == ProtocolState::Idle));
        let record = *link.ctrl.pairing();

        // 重启：新的控制器实例，共用同一份偏好存储
        let unit = link.unit.take();
        drop(link);
        let mut link = Link::new(&air, &clock, &prefs, EngineConfig::default());
        link.unit = unit;
        assert_eq!(link.ctrl.pairing(), &record);

        let mut saw_discovery = false;
        for _ in 0..(16_000 / STEP_MS) {
            link.step();
            saw_discovery |= link.ctrl.state().is_discovery();
        }
        assert!(!saw_discovery);
        assert_eq!(link.ctrl.state(), ProtocolState::Idle);
        assert_eq!(link.ctrl.status().speed, 1);
        assert_eq!(link.ctrl.status().voltage, 30);
        assert_eq!(prefs.write_count(), 1);
    }

    #[test]
    fn test_partial_pairing_persists_nothing() {
        let air = SimAir::new();
        let clock = SimClock::manual();
        let prefs = SimPreferences::new();
        let mut peer = air.station();

        let config = EngineConfig::default().with_tx_retries(1);
        let mut link = Link::new(&air, &clock, &prefs, config);
        assert!(link.run_until(20_000, |l| l.ctrl.state() == ProtocolState::DiscoveryWaitLinkRequest));
        link.step();

        // 对端只发出入网邀请，之后不再响应
        let discovery = loop {
            match peer.poll_event() {
                Some(RadioEvent::RxComplete(bytes)) => break Frame::decode(&bytes),
                Some(RadioEvent::TxReady) => continue,
                None => panic!("discovery frame not received"),
            }
        };
        assert_eq!(discovery.kind(), Some(Command::NetworkJoinAck));
        let offer = Frame::new(
            discovery.tx,
            DeviceIdentity::new(0x01, UNIT_ID),
            Command::NetworkJoinOpen,
            Payload::NetworkJoinOpen { network_id: NETWORK },
        );
        peer.send_frame(NETWORK_LINK_ID, &offer.encode());
        link.pump();
        assert_eq!(link.ctrl.state(), ProtocolState::DiscoveryWaitJoinResponse);

        assert!(link.run_until(10_000, |l| l.ctrl.state().is_discovery()
            && l.ctrl.state() != ProtocolState::DiscoveryWaitJoinResponse));
        link.run(5_000);

        assert_eq!(prefs.write_count(), 0);
        assert_eq!(prefs.get(key()), None);
        assert!(!link.ctrl.pairing().is_valid());
        assert!(link.ctrl.state().is_discovery());
    }

    #[test]
    fn test_manual_pairing_record_is_persisted() {
        let air = SimAir::new();
        let clock = SimClock::manual();
        let prefs = SimPreferences::new();
        let mut link = Link::new(&air, &clock, &prefs, EngineConfig::default());

        let record = PairingRecord {
            network_id: NETWORK,
            my_type: 0x03,
            my_id: 0x5A,
            peer_type: 0x01,
            peer_id: UNIT_ID,
        };
        link.ctrl.set_pairing(record).unwrap();
        assert_eq!(prefs.get(key()), Some(record.to_bytes().to_vec()));

        let mut unit = MainUnit::new(air.station(), UNIT_ID, NETWORK).unwrap();
        unit.set_paired(record.my_identity());
        link.unit = Some(unit);

        assert!(link.run_until(20_000, |l| l.ctrl.state() == ProtocolState::Idle));
        assert_eq!(link.ctrl.status().voltage, 30);
        assert_eq!(prefs.write_count(), 1);
    }
}
