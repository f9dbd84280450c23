//! Flash command state machine for the Am29F040 and MX29F800CB.
//!
//! Reads return array data until a command sequence is written. Commands
//! are unlocked by `$AA` at the first magic address, then `$55` at the
//! second:
//!
//! | Third cycle  | Command                                          |
//! |--------------|--------------------------------------------------|
//! | `$A0`        | program the next byte written (bits only clear)  |
//! | `$80`        | erase: unlock again, then `$30` sector/`$10` chip|
//! | `$90`        | autoselect: ID codes until `$F0`                 |
//! | `$F0`        | back to read                                     |
//!
//! | Chip        | Size | Magic 1 | Magic 2 | Manufacturer | Device |
//! |-------------|------|---------|---------|--------------|--------|
//! | Am29F040    | 512K | `$555`  | `$2AA`  | `$01`        | `$A4`  |
//! | MX29F800CB  | 1M   | `$AAA`  | `$555`  | `$C2`        | `$58`  |
//!
//! Program and erase complete at once; there is no busy/toggle phase.

use crate::banked::{BANK_8K, BankedImage};

/// Erase sector size.
pub const SECTOR_SIZE: usize = 0x1_0000;

/// Which part is soldered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashModel {
    /// AMD Am29F040, 512K (EasyFlash).
    Am29F040,
    /// Macronix MX29F800CB in byte mode, 1M (Megabyter).
    Mx29F800Cb,
}

impl FlashModel {
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::Am29F040 => 0x8_0000,
            Self::Mx29F800Cb => 0x10_0000,
        }
    }

    #[must_use]
    pub fn manufacturer_id(self) -> u8 {
        match self {
            Self::Am29F040 => 0x01,
            Self::Mx29F800Cb => 0xc2,
        }
    }

    #[must_use]
    pub fn device_id(self) -> u8 {
        match self {
            Self::Am29F040 => 0xa4,
            Self::Mx29F800Cb => 0x58,
        }
    }

    /// First and second unlock addresses.
    fn magic(self) -> (usize, usize) {
        match self {
            Self::Am29F040 => (0x555, 0x2aa),
            Self::Mx29F800Cb => (0xaaa, 0x555),
        }
    }

    fn command_mask(self) -> usize {
        match self {
            Self::Am29F040 => 0x7ff,
            Self::Mx29F800Cb => 0xfff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashState {
    #[default]
    Read,
    Unlock1,
    Unlock2,
    Program,
    EraseSetup,
    EraseUnlock1,
    EraseUnlock2,
    Autoselect,
}

impl FlashState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Read => 0,
            Self::Unlock1 => 1,
            Self::Unlock2 => 2,
            Self::Program => 3,
            Self::EraseSetup => 4,
            Self::EraseUnlock1 => 5,
            Self::EraseUnlock2 => 6,
            Self::Autoselect => 7,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Unlock1,
            2 => Self::Unlock2,
            3 => Self::Program,
            4 => Self::EraseSetup,
            5 => Self::EraseUnlock1,
            6 => Self::EraseUnlock2,
            7 => Self::Autoselect,
            _ => Self::Read,
        }
    }
}

/// One flash chip, addressed by flat offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashChip {
    model: FlashModel,
    image: BankedImage,
    state: FlashState,
    /// State to return to after a failed unlock sequence.
    base: FlashState,
    dirty: bool,
}

impl FlashChip {
    /// Wrap `image`, padding it to the full chip with erased bytes.
    #[must_use]
    pub fn new(model: FlashModel, mut image: BankedImage) -> Self {
        image.ensure_banks(model.size() / image.bank_size(), 0xff);
        Self {
            model,
            image,
            state: FlashState::Read,
            base: FlashState::Read,
            dirty: false,
        }
    }

    /// A fully erased chip.
    #[must_use]
    pub fn erased(model: FlashModel) -> Self {
        Self::new(model, BankedImage::filled(BANK_8K, model.size() / BANK_8K, 0xff))
    }

    #[must_use]
    pub fn model(&self) -> FlashModel {
        self.model
    }

    #[must_use]
    pub fn image(&self) -> &BankedImage {
        &self.image
    }

    #[must_use]
    pub fn state(&self) -> FlashState {
        self.state
    }

    /// Set once any byte has been programmed or erased.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn reset(&mut self) {
        self.state = FlashState::Read;
        self.base = FlashState::Read;
    }

    #[must_use]
    pub fn read(&self, offset: usize) -> Option<u8> {
        if self.state == FlashState::Autoselect {
            return Some(match offset & 0xff {
                0 => self.model.manufacturer_id(),
                1 => self.model.device_id(),
                _ => 0,
            });
        }
        self.image.get(offset % self.model.size())
    }

    pub fn write(&mut self, offset: usize, value: u8) {
        let (m1, m2) = self.model.magic();
        let cmd = offset & self.model.command_mask();
        let size = self.model.size();
        self.state = match (self.state, value) {
            (FlashState::Read | FlashState::Autoselect, 0xaa) if cmd == m1 => {
                self.base = self.state;
                FlashState::Unlock1
            }
            (FlashState::Autoselect, 0xf0) => FlashState::Read,
            (FlashState::Autoselect, _) => FlashState::Autoselect,
            (FlashState::Unlock1, 0x55) if cmd == m2 => FlashState::Unlock2,
            (FlashState::Unlock2, 0xa0) if cmd == m1 => FlashState::Program,
            (FlashState::Unlock2, 0x80) if cmd == m1 => FlashState::EraseSetup,
            (FlashState::Unlock2, 0x90) if cmd == m1 => FlashState::Autoselect,
            (FlashState::Unlock2, 0xf0) => FlashState::Read,
            (FlashState::Program, _) => {
                self.program(offset % size, value);
                FlashState::Read
            }
            (FlashState::EraseSetup, 0xaa) if cmd == m1 => FlashState::EraseUnlock1,
            (FlashState::EraseUnlock1, 0x55) if cmd == m2 => FlashState::EraseUnlock2,
            (FlashState::EraseUnlock2, 0x30) => {
                self.erase_sector(offset % size);
                FlashState::Read
            }
            (FlashState::EraseUnlock2, 0x10) if cmd == m1 => {
                self.image.fill(0xff);
                self.dirty = true;
                log::debug!("flash: chip erase");
                FlashState::Read
            }
            (FlashState::Read, _) => FlashState::Read,
            _ => self.base,
        };
    }

    fn program(&mut self, offset: usize, value: u8) {
        if let Some(old) = self.image.get(offset) {
            self.image.set(offset, old & value);
            self.dirty = true;
        }
    }

    fn erase_sector(&mut self, offset: usize) {
        let start = offset / SECTOR_SIZE * SECTOR_SIZE;
        for i in start..start + SECTOR_SIZE {
            self.image.set(i, 0xff);
        }
        self.dirty = true;
        log::debug!("flash: erased sector at ${start:05X}");
    }

    /// Restore the command state from a snapshot byte.
    pub fn restore_state(&mut self, state: u8, base: u8) {
        self.state = FlashState::from_u8(state);
        self.base = FlashState::from_u8(base);
    }

    /// Command state as two snapshot bytes.
    #[must_use]
    pub fn saved_state(&self) -> (u8, u8) {
        (self.state.to_u8(), self.base.to_u8())
    }

    pub fn image_mut(&mut self) -> &mut BankedImage {
        &mut self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unlock(chip: &mut FlashChip, command: u8) {
        chip.write(0x555, 0xaa);
        chip.write(0x2aa, 0x55);
        chip.write(0x555, command);
    }

    fn erased() -> FlashChip {
        FlashChip::erased(FlashModel::Am29F040)
    }

    #[test]
    fn program_only_clears_bits() {
        let mut chip = erased();
        unlock(&mut chip, 0xa0);
        chip.write(0x2_0010, 0xf0);
        assert_eq!(chip.read(0x2_0010), Some(0xf0));
        unlock(&mut chip, 0xa0);
        chip.write(0x2_0010, 0x3c);
        assert_eq!(chip.read(0x2_0010), Some(0x30));
        assert!(chip.is_dirty());
    }

    #[test]
    fn plain_writes_do_nothing() {
        let mut chip = erased();
        chip.write(0x100, 0x00);
        assert_eq!(chip.read(0x100), Some(0xff));
        assert!(!chip.is_dirty());
    }

    #[test]
    fn autoselect_returns_ids_until_reset() {
        let mut chip = erased();
        unlock(&mut chip, 0x90);
        assert_eq!(chip.read(0), Some(0x01));
        assert_eq!(chip.read(0x2001), Some(0xa4));
        chip.write(0, 0xf0);
        assert_eq!(chip.read(0), Some(0xff));
    }

    #[test]
    fn sector_erase_clears_64k() {
        let mut chip = FlashChip::new(FlashModel::Am29F040, BankedImage::new(BANK_8K, 64));
        unlock(&mut chip, 0x80);
        chip.write(0x555, 0xaa);
        chip.write(0x2aa, 0x55);
        chip.write(0x1_2345, 0x30);
        assert_eq!(chip.read(0x1_0000), Some(0xff));
        assert_eq!(chip.read(0x1_ffff), Some(0xff));
        assert_eq!(chip.read(0x0_ffff), Some(0x00));
        assert_eq!(chip.read(0x2_0000), Some(0x00));
    }

    #[test]
    fn chip_erase_clears_everything() {
        let mut chip = FlashChip::new(FlashModel::Am29F040, BankedImage::new(BANK_8K, 64));
        unlock(&mut chip, 0x80);
        chip.write(0x555, 0xaa);
        chip.write(0x2aa, 0x55);
        chip.write(0x555, 0x10);
        assert!(chip.image().as_bytes().iter().all(|&b| b == 0xff));
    }

    #[test]
    fn broken_sequence_returns_to_read() {
        let mut chip = erased();
        chip.write(0x555, 0xaa);
        chip.write(0x123, 0x55);
        assert_eq!(chip.state(), FlashState::Read);
    }

    #[test]
    fn short_image_is_padded() {
        let chip = FlashChip::new(FlashModel::Am29F040, BankedImage::new(BANK_8K, 2));
        assert_eq!(chip.image().len(), 0x8_0000);
        assert_eq!(chip.read(0x4000), Some(0xff));
    }

    #[test]
    fn mx29f800_unlocks_at_its_own_addresses() {
        let mut chip = FlashChip::erased(FlashModel::Mx29F800Cb);
        assert_eq!(chip.image().len(), 0x10_0000);
        unlock(&mut chip, 0xa0);
        chip.write(0x10, 0x00);
        assert_eq!(chip.read(0x10), Some(0xff));

        chip.write(0xaaa, 0xaa);
        chip.write(0x555, 0x55);
        chip.write(0xaaa, 0x90);
        assert_eq!(chip.read(0x8_0000), Some(0xc2));
        assert_eq!(chip.read(0x8_0001), Some(0x58));
        chip.write(0, 0xf0);

        chip.write(0xaaa, 0xaa);
        chip.write(0x555, 0x55);
        chip.write(0xaaa, 0xa0);
        chip.write(0xf_fffe, 0x12);
        assert_eq!(chip.read(0xf_fffe), Some(0x12));
    }
}
