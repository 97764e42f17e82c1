use crc::{Crc, CRC_16_IBM_3740, CRC_32_ISO_HDLC};

/// 与 nRF905 硬件一致的 CRC-16 (CCITT, 初值 0xFFFF)
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// 计算帧的 CRC-16 校验和
pub fn calculate_checksum(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

pub fn verify_checksum(data: &[u8], checksum: u16) -> bool {
    calculate_checksum(data) == checksum
}

/// 偏好存储键：组件名的 CRC-32，跨版本稳定
pub fn preference_key(name: &str) -> u32 {
    CRC32.checksum(name.as_bytes())
}
