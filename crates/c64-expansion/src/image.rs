//! Turning attach sources into ROM banks.
//!
//! Binary images are linear: 8K devices take consecutive ROML banks,
//! 16K devices take ROML/ROMH pairs. CRT images place each CHIP packet by
//! its load address:
//!
//! | Load address | Size  | Goes to                      |
//! |--------------|-------|------------------------------|
//! | $8000        | <= 8K | ROML bank                    |
//! | $8000        | 16K   | ROML bank + ROMH same bank   |
//! | $A000, $E000 | <= 8K | ROMH bank                    |
//! | $F000        | 4K    | upper half of ROMH bank      |

use std::path::Path;

use format_crt::CrtImage;

use crate::banked::{BANK_8K, BankedImage};
use crate::cartridge_type::CartridgeType;
use crate::error::{AttachError, SnapshotError};
use crate::snapshot::{ModuleReader, SnapshotModule};

/// Skip a two-byte load address when the rest has a size `valid` accepts.
#[must_use]
pub fn strip_load_address(data: &[u8], valid: impl Fn(usize) -> bool) -> &[u8] {
    if !valid(data.len()) && data.len() >= 2 && valid(data.len() - 2) {
        &data[2..]
    } else {
        data
    }
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, AttachError> {
    std::fs::read(path).map_err(|source| AttachError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// How a binary image is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryLayout {
    /// Consecutive 8K ROML banks.
    Roml,
    /// Consecutive 16K blocks: low half ROML, high half ROMH.
    Pairs,
    /// 8K ROMH only (Ultimax-style freezers).
    Romh,
}

/// ROML and ROMH banks for one cartridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartRom {
    pub roml: BankedImage,
    pub romh: BankedImage,
}

impl CartRom {
    /// Blank (0xFF) ROM of `banks` banks per window.
    #[must_use]
    pub fn blank(banks: usize) -> Self {
        Self {
            roml: BankedImage::filled(BANK_8K, banks, 0xff),
            romh: BankedImage::filled(BANK_8K, banks, 0xff),
        }
    }

    /// Load a binary image of `cart_type`. The image (after any load
    /// address) must be a whole number of units no larger than
    /// `max_banks` units; a trailing partial 8K unit is accepted for
    /// `Roml` and padded.
    pub fn from_binary(
        cart_type: CartridgeType,
        data: &[u8],
        layout: BinaryLayout,
        max_banks: usize,
    ) -> Result<Self, AttachError> {
        let unit = match layout {
            BinaryLayout::Roml | BinaryLayout::Romh => BANK_8K,
            BinaryLayout::Pairs => 2 * BANK_8K,
        };
        let valid = |len: usize| len > 0 && len <= unit * max_banks && len % 0x1000 == 0;
        let data = strip_load_address(data, valid);
        if !valid(data.len()) {
            return Err(AttachError::UnsupportedSize {
                cart_type,
                size: data.len(),
            });
        }

        let banks = data.len().div_ceil(unit);
        let mut rom = Self::blank(banks);
        for (bank, chunk) in data.chunks(unit).enumerate() {
            match layout {
                BinaryLayout::Roml => {
                    rom.roml.load(bank, 0, chunk);
                }
                BinaryLayout::Romh => {
                    rom.romh.load(bank, 0, chunk);
                }
                BinaryLayout::Pairs => {
                    let (lo, hi) = chunk.split_at(chunk.len().min(BANK_8K));
                    rom.roml.load(bank, 0, lo);
                    rom.romh.load(bank, 0, hi);
                }
            }
        }
        Ok(rom)
    }

    /// Place CRT CHIP packets. Banks beyond `max_banks` are an error.
    pub fn from_crt(
        cart_type: CartridgeType,
        crt: &CrtImage,
        max_banks: usize,
    ) -> Result<Self, AttachError> {
        let banks = crt.bank_count().max(1);
        if banks > max_banks {
            return Err(AttachError::BankOutOfRange {
                cart_type,
                bank: banks - 1,
                max: max_banks,
            });
        }
        let mut rom = Self::blank(banks);
        for chip in &crt.chips {
            let bank = chip.bank as usize;
            let data = &chip.data;
            let placed = match (chip.load_address, data.len()) {
                (0x8000, len) if len <= BANK_8K => rom.roml.load(bank, 0, data),
                (0x8000, len) if len <= 2 * BANK_8K => {
                    let (lo, hi) = data.split_at(BANK_8K);
                    rom.roml.load(bank, 0, lo) && rom.romh.load(bank, 0, hi)
                }
                (0xa000 | 0xe000, len) if len <= BANK_8K => rom.romh.load(bank, 0, data),
                (0xf000, len) if len <= 0x1000 => rom.romh.load(bank, 0x1000, data),
                _ => false,
            };
            if !placed {
                return Err(AttachError::UnexpectedChip {
                    cart_type,
                    load_address: chip.load_address,
                    size: data.len(),
                });
            }
        }
        Ok(rom)
    }

    #[must_use]
    pub fn banks(&self) -> usize {
        self.roml.bank_count()
    }

    #[must_use]
    pub fn roml(&self, bank: usize, addr: u16) -> Option<u8> {
        self.roml.read(bank, (addr & 0x1fff) as usize)
    }

    #[must_use]
    pub fn romh(&self, bank: usize, addr: u16) -> Option<u8> {
        self.romh.read(bank, (addr & 0x1fff) as usize)
    }

    /// Pad both windows to `banks` banks.
    pub fn ensure_banks(&mut self, banks: usize) {
        self.roml.ensure_banks(banks, 0xff);
        self.romh.ensure_banks(banks, 0xff);
    }

    pub fn write_snapshot(&self, module: &mut SnapshotModule) {
        module.write_image(&self.roml);
        module.write_image(&self.romh);
    }

    /// Both windows from the snapshot, whatever their size.
    pub fn read_snapshot(r: &mut ModuleReader<'_>) -> Result<Self, SnapshotError> {
        let roml = r.read_image()?;
        let romh = r.read_image()?;
        if roml.bank_size() != BANK_8K || romh.bank_size() != BANK_8K {
            return Err(r.rejected("ROM bank size is not 8K"));
        }
        Ok(Self { roml, romh })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use format_crt::{ChipPacket, ChipType};

    fn chip(bank: u16, load_address: u16, fill: u8, len: usize) -> ChipPacket {
        ChipPacket {
            chip_type: ChipType::Rom,
            bank,
            load_address,
            data: vec![fill; len],
        }
    }

    #[test]
    fn load_address_is_skipped() {
        let mut data = vec![0x00, 0x80];
        data.extend(vec![0xa9; BANK_8K]);
        let rom = CartRom::from_binary(CartridgeType::Generic8k, &data, BinaryLayout::Roml, 1)
            .expect("8K + load address");
        assert_eq!(rom.roml(0, 0x8000), Some(0xa9));
    }

    #[test]
    fn oversize_binary_rejected() {
        let data = vec![0; 3 * BANK_8K];
        assert!(matches!(
            CartRom::from_binary(CartridgeType::Generic16k, &data, BinaryLayout::Pairs, 1),
            Err(AttachError::UnsupportedSize { .. })
        ));
    }

    #[test]
    fn pairs_split_into_roml_and_romh() {
        let mut data = vec![1; BANK_8K];
        data.extend(vec![2; BANK_8K]);
        let rom = CartRom::from_binary(CartridgeType::Generic16k, &data, BinaryLayout::Pairs, 1)
            .expect("16K");
        assert_eq!(rom.roml(0, 0x8000), Some(1));
        assert_eq!(rom.romh(0, 0xa000), Some(2));
    }

    #[test]
    fn crt_chips_land_by_load_address() {
        let mut crt = CrtImage::new(0, "t");
        crt.chips.push(chip(0, 0x8000, 0x11, BANK_8K));
        crt.chips.push(chip(0, 0xe000, 0x22, BANK_8K));
        crt.chips.push(chip(1, 0x8000, 0x33, 2 * BANK_8K));
        crt.chips.push(chip(2, 0xf000, 0x44, 0x1000));
        let rom = CartRom::from_crt(CartridgeType::Ultimax, &crt, 4).expect("placed");
        assert_eq!(rom.roml(0, 0), Some(0x11));
        assert_eq!(rom.romh(0, 0), Some(0x22));
        assert_eq!(rom.roml(1, 0x1fff), Some(0x33));
        assert_eq!(rom.romh(1, 0), Some(0x33));
        assert_eq!(rom.romh(2, 0x0fff), Some(0xff));
        assert_eq!(rom.romh(2, 0x1000), Some(0x44));
    }

    #[test]
    fn crt_bank_beyond_hardware_rejected() {
        let mut crt = CrtImage::new(5, "t");
        crt.chips.push(chip(4, 0x8000, 0, BANK_8K));
        assert!(matches!(
            CartRom::from_crt(CartridgeType::Ocean, &crt, 4),
            Err(AttachError::BankOutOfRange { bank: 4, max: 4, .. })
        ));
    }

    #[test]
    fn crt_unexpected_address_rejected() {
        let mut crt = CrtImage::new(5, "t");
        crt.chips.push(chip(0, 0x4000, 0, BANK_8K));
        assert!(matches!(
            CartRom::from_crt(CartridgeType::Ocean, &crt, 4),
            Err(AttachError::UnexpectedChip {
                load_address: 0x4000,
                ..
            })
        ));
    }
}
