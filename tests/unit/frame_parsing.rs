#[cfg(test)]
mod frame_parsing_tests {
    use common::protocol::{
        device_id_from_random, Command, DeviceIdentity, DeviceType, Frame, Payload, RawFrame, FRAME_SIZE,
        NETWORK_LINK_ID,
    };
    use common::utils::preference_key;
    use zerocopy::FromBytes;

    #[test]
    fn test_fan_settings_frame_from_air() {
        // 主机回复：发给 03/5A，风速 2，电压 50%，无定时
        let bytes: [u8; FRAME_SIZE] = [0x03, 0x5A, 0x01, 0x22, 0xFA, 0x07, 0x03, 0x02, 0x32, 0x00, 0, 0, 0, 0, 0, 0];

        let frame = Frame::decode(&bytes);
        assert_eq!(frame.rx, DeviceIdentity::new(0x03, 0x5A));
        assert_eq!(frame.tx, DeviceIdentity::new(0x01, 0x22));
        assert_eq!(frame.ttl, 0xFA);
        assert_eq!(frame.kind(), Some(Command::FanSettings));
        assert_eq!(
            frame.payload,
            Payload::FanSettings {
                speed: 2,
                voltage: 50,
                timer: 0,
            }
        );
    }

    #[test]
    fn test_discovery_frame_layout() {
        let frame = Frame::new(
            DeviceIdentity::new(DeviceType::LinkTarget as u8, 0x00),
            DeviceIdentity::new(DeviceType::RemoteControl as u8, 0x41),
            Command::NetworkJoinAck,
            Payload::NetworkJoinAck {
                network_id: NETWORK_LINK_ID,
            },
        );

        let bytes = frame.encode();
        let raw = RawFrame::read_from(&bytes[..]).unwrap();
        assert_eq!(raw.rx_type, 0x04);
        assert_eq!(raw.tx_id, 0x41);
        assert_eq!(raw.command, 0x0C);
        assert_eq!(raw.parameter_count, 4);
        // 网络号小端序
        assert_eq!(&raw.parameters[..4], &[0xA9, 0x6E, 0x81, 0x89]);
        assert_eq!(&raw.parameters[4..], &[0; 5]);
    }

    #[test]
    fn test_link_success_has_no_parameters() {
        let frame = Frame::new(
            DeviceIdentity::new(0x01, 0x22),
            DeviceIdentity::new(0x03, 0x5A),
            Command::LinkSuccess,
            Payload::empty(),
        );

        let bytes = frame.encode();
        assert_eq!(bytes[5], 0x0B);
        assert_eq!(bytes[6], 0);
        assert_eq!(Frame::decode(&bytes).payload, Payload::empty());
    }

    #[test]
    fn test_short_fan_settings_is_not_typed() {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[5] = Command::FanSettings as u8;
        bytes[6] = 2;
        bytes[7] = 3;
        bytes[8] = 200;

        let frame = Frame::decode(&bytes);
        assert_eq!(frame.kind(), Some(Command::FanSettings));
        assert_eq!(frame.payload, Payload::raw(&[3, 200]));
    }

    #[test]
    fn test_oversized_parameter_count_is_truncated() {
        let mut bytes = [0xEEu8; FRAME_SIZE];
        bytes[5] = 0x7F;
        bytes[6] = 0xFF;

        match Frame::decode(&bytes).payload {
            Payload::Raw(raw) => assert_eq!(raw.len(), 9),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_device_id_range() {
        for random in 0..=u8::MAX {
            let id = device_id_from_random(random);
            assert!((1..=0xFE).contains(&id), "id {:#x} from {:#x}", id, random);
        }
        assert_eq!(device_id_from_random(0x00), 0x01);
        assert_eq!(device_id_from_random(0xFF), 0xFE);
        assert_eq!(device_id_from_random(0x80), 0x80);
    }

    #[test]
    fn test_identity_helpers() {
        assert!(DeviceIdentity::new(0x01, 0x00).is_broadcast());
        assert!(!DeviceIdentity::new(0x01, 0xFF).has_valid_id());
        assert_eq!(DeviceType::name(0x18), "CO2 Sensor");
        assert_eq!(DeviceType::name(0x42), "Unknown");
    }

    #[test]
    fn test_preference_key_is_stable() {
        assert_eq!(preference_key("123456789"), 0xCBF4_3926);
        assert_ne!(preference_key("fanlink-pairing"), preference_key("fanlink-pairing-2"));
    }
}
