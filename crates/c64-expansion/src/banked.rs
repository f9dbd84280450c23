//! Banked ROM/RAM buffers.
//!
//! A `BankedImage` is one flat buffer split into equal banks. Drivers own
//! their images from attach until detach; nothing else holds a reference.
//! Reads past the end yield `None` (open bus at the decoder), writes past
//! the end are dropped.

/// 8 KiB, the size of one ROML or ROMH window.
pub const BANK_8K: usize = 0x2000;

/// 16 KiB, one ROML+ROMH pair.
pub const BANK_16K: usize = 0x4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankedImage {
    data: Vec<u8>,
    bank_size: usize,
}

impl BankedImage {
    /// Zero-filled image of `banks` banks.
    #[must_use]
    pub fn new(bank_size: usize, banks: usize) -> Self {
        Self::filled(bank_size, banks, 0)
    }

    /// Image of `banks` banks filled with `fill` (0xFF for erased ROM).
    #[must_use]
    pub fn filled(bank_size: usize, banks: usize, fill: u8) -> Self {
        Self {
            data: vec![fill; bank_size * banks],
            bank_size,
        }
    }

    /// Wrap raw bytes, padding the last bank with 0xFF.
    #[must_use]
    pub fn from_bytes(bank_size: usize, mut data: Vec<u8>) -> Self {
        let rem = data.len() % bank_size;
        if rem != 0 {
            data.resize(data.len() + bank_size - rem, 0xff);
        }
        Self { data, bank_size }
    }

    #[must_use]
    pub fn bank_size(&self) -> usize {
        self.bank_size
    }

    #[must_use]
    pub fn bank_count(&self) -> usize {
        self.data.len() / self.bank_size
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Byte at `offset` within `bank`.
    #[must_use]
    pub fn read(&self, bank: usize, offset: usize) -> Option<u8> {
        if offset >= self.bank_size {
            return None;
        }
        self.data.get(bank * self.bank_size + offset).copied()
    }

    pub fn write(&mut self, bank: usize, offset: usize, value: u8) {
        if offset >= self.bank_size {
            return;
        }
        if let Some(byte) = self.data.get_mut(bank * self.bank_size + offset) {
            *byte = value;
        }
    }

    /// Byte at a flat offset, ignoring bank boundaries.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    pub fn set(&mut self, index: usize, value: u8) {
        if let Some(byte) = self.data.get_mut(index) {
            *byte = value;
        }
    }

    #[must_use]
    pub fn bank(&self, bank: usize) -> Option<&[u8]> {
        let start = bank * self.bank_size;
        self.data.get(start..start + self.bank_size)
    }

    /// Copy `bytes` into `bank` starting at `offset`. Returns false (and
    /// copies nothing) if the bank does not exist or the data overflows it.
    pub fn load(&mut self, bank: usize, offset: usize, bytes: &[u8]) -> bool {
        if bank >= self.bank_count() || offset + bytes.len() > self.bank_size {
            return false;
        }
        let start = bank * self.bank_size + offset;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        true
    }

    /// Grow to at least `banks` banks, padding with `fill`.
    pub fn ensure_banks(&mut self, banks: usize, fill: u8) {
        if self.bank_count() < banks {
            self.data.resize(banks * self.bank_size, fill);
        }
    }

    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }

    /// Replace the contents with `bytes`, which must match the current
    /// length exactly.
    pub fn replace(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() != self.data.len() {
            return false;
        }
        self.data.copy_from_slice(bytes);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_within_bank() {
        let mut img = BankedImage::new(BANK_8K, 4);
        img.write(2, 0x10, 0x42);
        assert_eq!(img.read(2, 0x10), Some(0x42));
        assert_eq!(img.get(2 * BANK_8K + 0x10), Some(0x42));
    }

    #[test]
    fn out_of_range_is_open() {
        let mut img = BankedImage::new(BANK_8K, 2);
        assert_eq!(img.read(2, 0), None);
        assert_eq!(img.read(0, BANK_8K), None);
        img.write(5, 0, 1);
        assert!(img.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn from_bytes_pads_last_bank() {
        let img = BankedImage::from_bytes(BANK_8K, vec![1; BANK_8K + 10]);
        assert_eq!(img.bank_count(), 2);
        assert_eq!(img.read(1, 9), Some(1));
        assert_eq!(img.read(1, 10), Some(0xff));
    }

    #[test]
    fn load_rejects_overflow() {
        let mut img = BankedImage::new(BANK_8K, 1);
        assert!(!img.load(0, 0x1000, &[0; 0x1001]));
        assert!(!img.load(1, 0, &[0; 4]));
        assert!(img.load(0, 0x1000, &[7; 0x1000]));
        assert_eq!(img.read(0, 0x1fff), Some(7));
    }
}
