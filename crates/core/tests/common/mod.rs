#![allow(dead_code)]

/// 32 KiB LoROM image of zeros with `code` at offset 0 and the reset vector at `$8000`.
pub fn lorom_with_code(code: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; 0x8000];
    bytes[..code.len()].copy_from_slice(code);
    set_vector(&mut bytes, 0xFFFC, 0x8000);
    bytes
}

/// Write a 16-bit vector at bank-0 address `slot` of a LoROM image.
pub fn set_vector(bytes: &mut [u8], slot: u16, target: u16) {
    let at = slot as usize - 0x8000;
    bytes[at..at + 2].copy_from_slice(&target.to_le_bytes());
}

/// Fill in a well-formed internal header at `offset`.
pub fn write_header(bytes: &mut [u8], offset: usize, title: &str, map_mode: u8, rom_size: u8) {
    let mut padded = [b' '; 21];
    padded[..title.len()].copy_from_slice(title.as_bytes());
    bytes[offset..offset + 21].copy_from_slice(&padded);
    bytes[offset + 0x15] = map_mode;
    bytes[offset + 0x17] = rom_size;
    let checksum: u16 = 0x1234;
    bytes[offset + 0x1C..offset + 0x1E].copy_from_slice(&(!checksum).to_le_bytes());
    bytes[offset + 0x1E..offset + 0x20].copy_from_slice(&checksum.to_le_bytes());
}

/// Deterministic pseudo-random bytes (xorshift32).
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

/// 32 records of 16 bytes: a varying id column followed by fixed columns.
pub fn record_table() -> Vec<u8> {
    let mut bytes = Vec::with_capacity(512);
    for record in 0..32u8 {
        bytes.push(record);
        bytes.extend((1..16u8).map(|col| 0x40 + col));
    }
    bytes
}
