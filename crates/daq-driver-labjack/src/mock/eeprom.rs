//! Simulated 24C-series I2C EEPROM.

use crate::i2c::EEPROM_PAGE_SIZE;

/// A byte-addressed EEPROM with page-wrapping writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EepromChip {
    memory: Vec<u8>,
    pointer: usize,
    page_size: usize,
}

impl EepromChip {
    /// Erased chip (all `0xFF`) of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            memory: vec![0xFF; size.max(1)],
            pointer: 0,
            page_size: EEPROM_PAGE_SIZE,
        }
    }

    /// Run one bus transaction: the first TX byte sets the pointer, the
    /// remaining TX bytes are written, then `rx_len` bytes are read.
    pub fn transact(&mut self, tx: &[u8], rx_len: usize) -> Vec<u8> {
        if let Some((&pointer, data)) = tx.split_first() {
            self.pointer = usize::from(pointer) % self.memory.len();
            if !data.is_empty() {
                let page_start = self.pointer - self.pointer % self.page_size;
                let mut offset = self.pointer % self.page_size;
                for &byte in data {
                    // Writes past the page end wrap to its start.
                    let addr = (page_start + offset) % self.memory.len();
                    self.memory[addr] = byte;
                    offset = (offset + 1) % self.page_size;
                }
            }
        }

        let mut rx = Vec::with_capacity(rx_len);
        for _ in 0..rx_len {
            rx.push(self.memory[self.pointer]);
            self.pointer = (self.pointer + 1) % self.memory.len();
        }
        rx
    }

    /// Whole memory.
    pub fn contents(&self) -> &[u8] {
        &self.memory
    }
}

impl Default for EepromChip {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let mut chip = EepromChip::default();
        chip.transact(&[0, 1, 2, 3, 4], 0);
        assert_eq!(chip.transact(&[0], 4), vec![1, 2, 3, 4]);
        assert_eq!(chip.transact(&[4], 1), vec![0xFF]);
    }

    #[test]
    fn test_page_wrap() {
        let mut chip = EepromChip::default();
        chip.transact(&[14, 0xAA, 0xBB, 0xCC], 0);
        assert_eq!(chip.contents()[14], 0xAA);
        assert_eq!(chip.contents()[15], 0xBB);
        assert_eq!(chip.contents()[0], 0xCC);
        assert_eq!(chip.contents()[16], 0xFF);
    }

    #[test]
    fn test_sequential_read_wraps_memory() {
        let mut chip = EepromChip::new(4);
        assert_eq!(chip.transact(&[3], 2), vec![0xFF, 0xFF]);
    }
}
