//! EasyFlash: two 512K flash chips, 256 bytes of RAM, two registers.
//!
//! - `$DE00`: bank (bits 0-5), shared by ROML and ROMH.
//! - `$DE02`: bit 0 GAME, bit 1 EXROM, bit 2 GAME from register (else
//!   from the boot jumper), bit 7 LED.
//! - `$DF00-$DFFF`: RAM.
//!
//! The chips take program/erase command sequences while the cartridge is
//! in Ultimax, where writes to $8000 and $E000 reach them.

use std::path::PathBuf;

use format_crt::{ChipPacket, ChipType, CrtImage};

use crate::banked::BANK_8K;
use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::config::ExpansionConfig;
use crate::decoder::WriteTarget;
use crate::error::{AttachError, SnapshotError};
use crate::flash::{FlashChip, FlashModel};
use crate::image::{BinaryLayout, CartRom};
use crate::snapshot::SnapshotModule;

use super::{Driver, open_module, rom_write, write_back};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

/// Banks per chip.
pub const EASYFLASH_BANKS: usize = 64;

pub struct EasyFlash {
    roml: FlashChip,
    romh: FlashChip,
    ram: [u8; 256],
    bank: u8,
    control: u8,
    jumper: bool,
    write_back: bool,
    path: Option<PathBuf>,
    name: String,
}

impl EasyFlash {
    pub fn from_binary(
        data: &[u8],
        config: &ExpansionConfig,
        path: Option<PathBuf>,
    ) -> Result<Self, AttachError> {
        let rom = CartRom::from_binary(
            CartridgeType::EasyFlash,
            data,
            BinaryLayout::Pairs,
            EASYFLASH_BANKS,
        )?;
        Ok(Self::with_rom(rom, config, path, "EasyFlash"))
    }

    pub fn from_crt(
        crt: &CrtImage,
        config: &ExpansionConfig,
        path: Option<PathBuf>,
    ) -> Result<Self, AttachError> {
        let rom = CartRom::from_crt(CartridgeType::EasyFlash, crt, EASYFLASH_BANKS)?;
        Ok(Self::with_rom(rom, config, path, &crt.name))
    }

    /// Erased chips, for a snapshot to fill.
    pub fn blank(config: &ExpansionConfig, path: Option<PathBuf>) -> Self {
        Self::with_rom(CartRom::blank(1), config, path, "EasyFlash")
    }

    fn with_rom(rom: CartRom, config: &ExpansionConfig, path: Option<PathBuf>, name: &str) -> Self {
        Self {
            roml: FlashChip::new(FlashModel::Am29F040, rom.roml),
            romh: FlashChip::new(FlashModel::Am29F040, rom.romh),
            ram: [0; 256],
            bank: 0,
            control: 0,
            jumper: config.easyflash.jumper,
            write_back: config.easyflash.write_back,
            path,
            name: name.to_string(),
        }
    }

    pub fn backing_path(&self) -> Option<PathBuf> {
        self.path.clone().filter(|_| self.write_back)
    }

    fn mode(&self) -> Mode {
        let game = if self.control & 0x04 != 0 {
            self.control & 0x01 != 0
        } else {
            !self.jumper
        };
        let exrom = self.control & 0x02 != 0;
        Mode::from_lines(game, exrom)
    }

    fn apply(&self, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        bus.set_mode(self.mode(), u16::from(self.bank), flags);
    }

    fn offset(&self, addr: u16) -> usize {
        self.bank as usize * BANK_8K + (addr & 0x1fff) as usize
    }

    /// The flash contents as a CRT, skipping fully erased banks.
    #[must_use]
    pub fn to_crt(&self) -> CrtImage {
        let mut crt = CrtImage::new(
            CartridgeType::EasyFlash.crt_id().unwrap_or(32),
            &self.name,
        );
        crt.exrom = 1;
        crt.game = 0;
        for bank in 0..EASYFLASH_BANKS {
            for (chip, load_address) in [(&self.roml, 0x8000), (&self.romh, 0xa000)] {
                let Some(data) = chip.image().bank(bank) else {
                    continue;
                };
                if data.iter().all(|&b| b == 0xff) {
                    continue;
                }
                crt.chips.push(ChipPacket {
                    chip_type: ChipType::Flash,
                    bank: bank as u16,
                    load_address,
                    data: data.to_vec(),
                });
            }
        }
        crt
    }
}

impl Driver for EasyFlash {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::EasyFlash
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.bank = 0;
        self.control = 0;
        self.roml.reset();
        self.romh.reset();
        self.apply(bus, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.roml.read(self.offset(addr))
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.romh.read(self.offset(addr))
    }

    fn peek_io2(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        Some(self.ram[(addr & 0xff) as usize])
    }

    fn write_roml(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        if bus.config().mode() == Mode::Ultimax {
            let offset = self.offset(addr);
            self.roml.write(offset, value);
        }
        rom_write(bus.config())
    }

    fn write_romh(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        if bus.config().mode() == Mode::Ultimax {
            let offset = self.offset(addr);
            self.romh.write(offset, value);
        }
        rom_write(bus.config())
    }

    fn write_io1(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        if addr & 0x02 == 0 {
            self.bank = value & 0x3f;
        } else {
            self.control = value & 0x87;
        }
        self.apply(bus, ConfigFlags::WRITE);
    }

    fn write_io2(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) {
        self.ram[(addr & 0xff) as usize] = value;
    }

    fn detach(&mut self) {
        if !self.write_back || !(self.roml.is_dirty() || self.romh.is_dirty()) {
            return;
        }
        let Some(path) = &self.path else {
            return;
        };
        match self.to_crt().to_bytes() {
            Ok(bytes) => write_back(CartridgeType::EasyFlash, path, &bytes),
            Err(e) => log::warn!("EasyFlash: cannot encode CRT for write-back: {e}"),
        }
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::EasyFlash.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.bank);
        m.write_u8(self.control);
        m.write_bool(self.jumper);
        m.write_bytes(&self.ram);
        for chip in [&self.roml, &self.romh] {
            let (state, base) = chip.saved_state();
            m.write_u8(state);
            m.write_u8(base);
            m.write_image(chip.image());
        }
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let bank = r.read_u8()? & 0x3f;
        let control = r.read_u8()?;
        let jumper = r.read_bool()?;
        let mut ram = [0; 256];
        r.read_into(&mut ram)?;
        let mut chips = Vec::with_capacity(2);
        for chip in [&self.roml, &self.romh] {
            let state = r.read_u8()?;
            let base = r.read_u8()?;
            let image = r.read_image_like(chip.image())?;
            chips.push((state, base, image));
        }
        let targets = [&mut self.roml, &mut self.romh];
        for (chip, (state, base, image)) in targets.into_iter().zip(chips) {
            *chip.image_mut() = image;
            chip.restore_state(state, base);
        }
        self.bank = bank;
        self.control = control;
        self.jumper = jumper;
        self.ram = ram;
        self.apply(bus, ConfigFlags::READ);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carts::rig::Rig;

    fn cart() -> EasyFlash {
        let mut data = vec![0x11; BANK_8K];
        data.extend(vec![0x22; BANK_8K]);
        EasyFlash::from_binary(&data, &ExpansionConfig::default(), None).expect("16K")
    }

    #[test]
    fn boots_in_ultimax_without_jumper() {
        let mut ef = cart();
        let mut rig = Rig::new();
        rig.init(&mut ef);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert_eq!(ef.peek_romh(0xe000, &rig.config), Some(0x22));
    }

    #[test]
    fn jumper_boots_with_cartridge_off() {
        let mut config = ExpansionConfig::default();
        config.easyflash.jumper = true;
        let mut ef = EasyFlash::blank(&config, None);
        let mut rig = Rig::new();
        rig.init(&mut ef);
        assert_eq!(rig.config.mode(), Mode::Ram);
    }

    #[test]
    fn control_register_selects_mode() {
        let mut ef = cart();
        let mut rig = Rig::new();
        rig.init(&mut ef);
        rig.write_io1(&mut ef, 0xde02, 0x07);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        rig.write_io1(&mut ef, 0xde02, 0x06);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        rig.write_io1(&mut ef, 0xde02, 0x04);
        assert_eq!(rig.config.mode(), Mode::Ram);
        rig.write_io1(&mut ef, 0xde00, 0x45);
        assert_eq!(rig.config.bank(), 5);
    }

    #[test]
    fn ram_at_df00() {
        let mut ef = cart();
        let mut rig = Rig::new();
        rig.write_io2(&mut ef, 0xdf42, 0x99);
        assert_eq!(rig.read_io2(&mut ef, 0xdf42), Some(0x99));
    }

    #[test]
    fn programming_in_ultimax_reaches_flash() {
        let mut ef = EasyFlash::blank(&ExpansionConfig::default(), None);
        let mut rig = Rig::new();
        rig.init(&mut ef);
        rig.write_io1(&mut ef, 0xde00, 3);
        let mut bus = rig.bus(&ef);
        for (addr, value) in [(0x8555u16, 0xaa), (0x82aa, 0x55), (0x8555, 0xa0), (0x8010, 0x42)] {
            assert_eq!(ef.write_roml(addr, value, &mut bus), WriteTarget::Device);
        }
        assert_eq!(ef.peek_roml(0x8010, &rig.config), Some(0x42));
        let crt = ef.to_crt();
        assert_eq!(crt.chips.len(), 1);
        assert_eq!(crt.chips[0].bank, 3);
    }

    #[test]
    fn write_back_on_detach() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("ef.crt");
        let mut config = ExpansionConfig::default();
        config.easyflash.write_back = true;
        let mut ef = EasyFlash::blank(&config, Some(path.clone()));
        let mut rig = Rig::new();
        rig.init(&mut ef);
        let mut bus = rig.bus(&ef);
        for (addr, value) in [(0xe555u16, 0xaa), (0xe2aa, 0x55), (0xe555, 0xa0), (0xe000, 0x00)] {
            ef.write_romh(addr, value, &mut bus);
        }
        ef.detach();
        let bytes = std::fs::read(&path).expect("written back");
        let crt = format_crt::parse(&bytes).expect("valid CRT");
        assert_eq!(crt.hardware_type, 32);
        assert_eq!(crt.chips[0].load_address, 0xa000);
        assert_eq!(crt.chips[0].data[0], 0x00);
    }

    #[test]
    fn snapshot_keeps_programmed_flash() {
        let mut ef = EasyFlash::blank(&ExpansionConfig::default(), None);
        let mut rig = Rig::new();
        rig.init(&mut ef);
        rig.write_io1(&mut ef, 0xde00, 3);
        let mut bus = rig.bus(&ef);
        for (addr, value) in [(0x8555u16, 0xaa), (0x82aa, 0x55), (0x8555, 0xa0), (0x8010, 0x42)] {
            ef.write_roml(addr, value, &mut bus);
        }
        rig.write_io2(&mut ef, 0xdf07, 0x77);
        let mut restored = EasyFlash::blank(&ExpansionConfig::default(), None);
        rig.round_trip(&ef, &mut restored);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert_eq!(rig.config.bank(), 3);
        assert_eq!(restored.peek_roml(0x8010, &rig.config), Some(0x42));
        assert_eq!(restored.peek_roml(0x8011, &rig.config), Some(0xff));
        assert_eq!(restored.peek_io2(0xdf07, &rig.config), Some(0x77));
        assert_eq!(restored.roml.state(), crate::flash::FlashState::Read);
    }
}
