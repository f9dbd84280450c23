//! Megabyter: 1M of MX29F800CB flash in 128 8K banks, always at ROML.
//!
//! Two write-only registers in $DE00-$DEFF, decoded on A1 alone:
//!
//! - A1 clear: bank (bits 0-6).
//! - A1 set: bits 0-1 mode (8K, 16K, off, Ultimax), bit 7 LED.
//!
//! Like EasyFlash, the flash takes command sequences only in Ultimax.

use std::path::PathBuf;

use format_crt::{ChipPacket, ChipType, CrtImage};

use crate::banked::{BANK_8K, BankedImage};
use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::config::MegabyterConfig;
use crate::decoder::WriteTarget;
use crate::error::{AttachError, SnapshotError};
use crate::flash::{FlashChip, FlashModel};
use crate::image::strip_load_address;
use crate::snapshot::SnapshotModule;

use super::{Driver, open_module, rom_write, write_back};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 0;

pub const MEGABYTER_BANKS: usize = 128;

const MODES: [Mode; 4] = [Mode::Game8k, Mode::Game16k, Mode::Ram, Mode::Ultimax];

/// Which file format a write-back produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageFormat {
    Binary,
    Crt,
}

pub struct Megabyter {
    flash: FlashChip,
    bank: u8,
    mode: u8,
    write_back: bool,
    optimize_crt: bool,
    image: Option<(PathBuf, ImageFormat)>,
}

impl Megabyter {
    pub fn from_binary(
        data: &[u8],
        config: &MegabyterConfig,
        path: Option<PathBuf>,
    ) -> Result<Self, AttachError> {
        let size = FlashModel::Mx29F800Cb.size();
        let data = strip_load_address(data, |len| len == size);
        if data.len() != size {
            return Err(AttachError::UnsupportedSize {
                cart_type: CartridgeType::Megabyter,
                size: data.len(),
            });
        }
        let image = BankedImage::from_bytes(BANK_8K, data.to_vec());
        Ok(Self::with_image(image, config, path.map(|p| (p, ImageFormat::Binary))))
    }

    /// Only 8K chips at $8000 are accepted.
    pub fn from_crt(
        crt: &CrtImage,
        config: &MegabyterConfig,
        path: Option<PathBuf>,
    ) -> Result<Self, AttachError> {
        let mut image = BankedImage::filled(BANK_8K, MEGABYTER_BANKS, 0xff);
        for chip in &crt.chips {
            let bank = chip.bank as usize;
            if bank >= MEGABYTER_BANKS {
                return Err(AttachError::BankOutOfRange {
                    cart_type: CartridgeType::Megabyter,
                    bank,
                    max: MEGABYTER_BANKS,
                });
            }
            if chip.load_address != 0x8000 || chip.data.len() != BANK_8K {
                return Err(AttachError::UnexpectedChip {
                    cart_type: CartridgeType::Megabyter,
                    load_address: chip.load_address,
                    size: chip.data.len(),
                });
            }
            image.load(bank, 0, &chip.data);
        }
        Ok(Self::with_image(image, config, path.map(|p| (p, ImageFormat::Crt))))
    }

    /// Erased flash, for a snapshot to fill.
    #[must_use]
    pub fn blank(config: &MegabyterConfig) -> Self {
        let image = BankedImage::filled(BANK_8K, MEGABYTER_BANKS, 0xff);
        Self::with_image(image, config, None)
    }

    fn with_image(
        image: BankedImage,
        config: &MegabyterConfig,
        image_file: Option<(PathBuf, ImageFormat)>,
    ) -> Self {
        Self {
            flash: FlashChip::new(FlashModel::Mx29F800Cb, image),
            bank: 0,
            mode: 0,
            write_back: config.write_back,
            optimize_crt: config.optimize_crt,
            image: image_file,
        }
    }

    pub fn backing_path(&self) -> Option<PathBuf> {
        self.image
            .as_ref()
            .filter(|_| self.write_back)
            .map(|(path, _)| path.clone())
    }

    #[must_use]
    pub fn led(&self) -> bool {
        self.mode & 0x80 != 0
    }

    fn offset(&self, addr: u16) -> usize {
        self.bank as usize * BANK_8K + (addr & 0x1fff) as usize
    }

    fn apply(&self, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        let mode = MODES[usize::from(self.mode & 3)];
        bus.set_mode(mode, u16::from(self.bank), flags);
    }

    /// The flash as a CRT. With `optimize`, fully erased banks are left out.
    #[must_use]
    pub fn to_crt(&self, optimize: bool) -> CrtImage {
        let mut crt = CrtImage::new(
            CartridgeType::Megabyter.crt_id().unwrap_or(0),
            CartridgeType::Megabyter.name(),
        );
        crt.exrom = 0;
        crt.game = 1;
        for bank in 0..MEGABYTER_BANKS {
            let Some(data) = self.flash.image().bank(bank) else {
                continue;
            };
            if optimize && data.iter().all(|&b| b == 0xff) {
                continue;
            }
            crt.chips.push(ChipPacket {
                chip_type: ChipType::Flash,
                bank: bank as u16,
                load_address: 0x8000,
                data: data.to_vec(),
            });
        }
        crt
    }
}

impl Driver for Megabyter {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Megabyter
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.bank = 0;
        self.mode = 0;
        self.flash.reset();
        self.apply(bus, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.flash.read(self.offset(addr))
    }

    fn peek_io1(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        Some(if addr & 0x02 != 0 { self.mode } else { self.bank })
    }

    fn read_io1(&mut self, _addr: u16, _bus: &mut PortBus<'_>) -> Option<u8> {
        None
    }

    fn write_roml(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        if bus.config().mode() == Mode::Ultimax {
            let offset = self.offset(addr);
            self.flash.write(offset, value);
        }
        rom_write(bus.config())
    }

    fn write_io1(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        if addr & 0x02 != 0 {
            self.mode = value & 0x83;
        } else {
            self.bank = value & 0x7f;
        }
        self.apply(bus, ConfigFlags::READ);
    }

    fn detach(&mut self) {
        if !self.write_back || !self.flash.is_dirty() {
            return;
        }
        let Some((path, format)) = &self.image else {
            return;
        };
        match format {
            ImageFormat::Binary => {
                write_back(CartridgeType::Megabyter, path, self.flash.image().as_bytes());
            }
            ImageFormat::Crt => match self.to_crt(self.optimize_crt).to_bytes() {
                Ok(bytes) => write_back(CartridgeType::Megabyter, path, &bytes),
                Err(e) => log::warn!("Megabyter: cannot encode CRT for write-back: {e}"),
            },
        }
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Megabyter.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.bank);
        m.write_u8(self.mode);
        let (state, base) = self.flash.saved_state();
        m.write_u8(state);
        m.write_u8(base);
        m.write_image(self.flash.image());
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let bank = r.read_u8()? & 0x7f;
        let mode = r.read_u8()? & 0x83;
        let state = r.read_u8()?;
        let base = r.read_u8()?;
        let image = r.read_image_like(self.flash.image())?;
        *self.flash.image_mut() = image;
        self.flash.restore_state(state, base);
        self.bank = bank;
        self.mode = mode;
        self.apply(bus, ConfigFlags::READ);
        Ok(())
    }
}
