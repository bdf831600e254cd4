//! CRC-64 as used by OpenIGTLink (ECMA-182 polynomial, MSB first,
//! zero initial value, no final xor).

const POLY: u64 = 0x42F0_E1EB_A9EA_3693;

const TABLE: [u64; 256] = build_table();

const fn build_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u64) << 56;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & (1 << 63) != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the CRC-64 of `data`.
pub fn crc64(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |crc, &byte| {
        TABLE[(((crc >> 56) ^ u64::from(byte)) & 0xff) as usize] ^ (crc << 8)
    })
}
