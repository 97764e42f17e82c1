use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::hal::PreferenceStore;
use crate::protocol::DeviceIdentity;

/// 持久化的配对记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PairingRecord {
    pub network_id: u32,
    pub my_type: u8,
    pub my_id: u8,
    pub peer_type: u8,
    pub peer_id: u8,
}

/// 存储布局，固定 8 字节
#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned)]
struct StoredRecord {
    network_id: U32<LittleEndian>,
    my_type: u8,
    my_id: u8,
    peer_type: u8,
    peer_id: u8,
}

impl PairingRecord {
    pub const SIZE: usize = core::mem::size_of::<StoredRecord>();

    pub const fn empty() -> Self {
        Self {
            network_id: 0,
            my_type: 0,
            my_id: 0,
            peer_type: 0,
            peer_id: 0,
        }
    }

    /// 五个字段都非零才算有效
    pub fn is_valid(&self) -> bool {
        self.network_id != 0 && self.my_type != 0 && self.my_id != 0 && self.peer_type != 0 && self.peer_id != 0
    }

    pub fn my_identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.my_type, self.my_id)
    }

    pub fn peer_identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.peer_type, self.peer_id)
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let stored = StoredRecord {
            network_id: U32::new(self.network_id),
            my_type: self.my_type,
            my_id: self.my_id,
            peer_type: self.peer_type,
            peer_id: self.peer_id,
        };
        let mut bytes = [0u8; Self::SIZE];
        bytes.copy_from_slice(stored.as_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let stored = StoredRecord::read_from(bytes)?;
        Some(Self {
            network_id: stored.network_id.get(),
            my_type: stored.my_type,
            my_id: stored.my_id,
            peer_type: stored.peer_type,
            peer_id: stored.peer_id,
        })
    }

    /// 从偏好存储加载；记录不存在或长度不符时返回 false，`self` 保持不变
    pub fn load<S: PreferenceStore>(&mut self, store: &mut S, key: u32) -> bool {
        let mut bytes = [0u8; Self::SIZE];
        if !store.load(key, &mut bytes) {
            return false;
        }
        match Self::from_bytes(&bytes) {
            Some(record) => {
                *self = record;
                true
            }
            None => false,
        }
    }

    pub fn save<S: PreferenceStore>(&self, store: &mut S, key: u32) -> bool {
        store.save(key, &self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_requires_every_field() {
        let record = PairingRecord {
            network_id: 0x1234_5678,
            my_type: 0x03,
            my_id: 0x5A,
            peer_type: 0x01,
            peer_id: 0x22,
        };
        assert!(record.is_valid());
        assert!(!PairingRecord::empty().is_valid());

        let mut partial = record;
        partial.peer_id = 0;
        assert!(!partial.is_valid());
        partial = record;
        partial.network_id = 0;
        assert!(!partial.is_valid());
    }

    #[test]
    fn test_stored_layout() {
        let record = PairingRecord {
            network_id: 0xA1B2_C3D4,
            my_type: 0x03,
            my_id: 0x10,
            peer_type: 0x01,
            peer_id: 0x22,
        };
        assert_eq!(PairingRecord::SIZE, 8);
        assert_eq!(record.to_bytes(), [0xD4, 0xC3, 0xB2, 0xA1, 0x03, 0x10, 0x01, 0x22]);
        assert_eq!(PairingRecord::from_bytes(&record.to_bytes()), Some(record));
        assert_eq!(PairingRecord::from_bytes(&[0u8; 3]), None);
    }
}
