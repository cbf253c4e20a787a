/*++

Licensed under the Apache-2.0 license.

File Name:

    memory.rs

Abstract:

    File contains a sparse, byte addressed model of DMA visible memory.

--*/

use std::collections::BTreeMap;

/// Sparse memory. Bytes never written read as zero; words are little-endian.
#[derive(Debug, Default, Clone)]
pub struct Memory {
    bytes: BTreeMap<u64, u8>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_u8(&self, addr: u64) -> u8 {
        self.bytes.get(&addr).copied().unwrap_or(0)
    }

    pub fn write_u8(&mut self, addr: u64, val: u8) {
        self.bytes.insert(addr, val);
    }

    pub fn read_u32(&self, addr: u64) -> u32 {
        let mut word = [0u8; 4];
        for (i, byte) in word.iter_mut().enumerate() {
            *byte = self.read_u8(addr + i as u64);
        }
        u32::from_le_bytes(word)
    }

    pub fn write_u32(&mut self, addr: u64, val: u32) {
        self.write(addr, &val.to_le_bytes());
    }

    /// Read `len` bytes starting at `addr`
    pub fn read(&self, addr: u64, len: usize) -> Vec<u8> {
        (0..len as u64).map(|i| self.read_u8(addr + i)).collect()
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.write_u8(addr + i as u64, *byte);
        }
    }

    /// Fill `len` bytes starting at `addr` with `val`
    pub fn fill(&mut self, addr: u64, len: usize, val: u8) {
        for i in 0..len as u64 {
            self.write_u8(addr + i, val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_access_is_little_endian() {
        let mut mem = Memory::new();
        mem.write_u32(0x1000, 0x1122_3344);
        assert_eq!(mem.read(0x1000, 4), vec![0x44, 0x33, 0x22, 0x11]);
        assert_eq!(mem.read_u32(0x1000), 0x1122_3344);
    }

    #[test]
    fn test_unwritten_reads_zero() {
        let mut mem = Memory::new();
        mem.write(0x2001, &[0xAA]);
        assert_eq!(mem.read_u32(0x2000), 0x0000_AA00);
        assert_eq!(mem.read_u32(0x3000), 0);
    }

    #[test]
    fn test_fill() {
        let mut mem = Memory::new();
        mem.fill(0x10, 5, 0x5A);
        assert_eq!(mem.read(0x0F, 7), vec![0, 0x5A, 0x5A, 0x5A, 0x5A, 0x5A, 0]);
    }
}
