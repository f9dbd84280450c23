//! Super Snapshot V5.
//!
//! 64K of ROM in four 16K banks and 32K of RAM in four 8K banks. The
//! register at $DE00 is write-only:
//!
//! | Bit | Meaning                               |
//! |-----|---------------------------------------|
//! | 0   | GAME (0 = asserted)                   |
//! | 1   | EXROM (0 = asserted)                  |
//! | 3   | RAM replaces ROML                     |
//! | 4-5 | ROM and RAM bank                      |
//!
//! Any register write releases a freeze. $DE00-$DEFF reads back the
//! last-but-one page of whichever 8K is at $8000.

use format_crt::CrtImage;

use crate::banked::{BANK_8K, BankedImage};
use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::decoder::WriteTarget;
use crate::error::{AttachError, SnapshotError};
use crate::image::{BinaryLayout, CartRom};
use crate::snapshot::SnapshotModule;

use super::{Capabilities, Driver, open_module, rom_write};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

const BANKS: usize = 4;

pub struct SuperSnapshotV5 {
    rom: CartRom,
    ram: BankedImage,
    register: u8,
}

impl SuperSnapshotV5 {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        let rom = CartRom::from_binary(
            CartridgeType::SuperSnapshotV5,
            data,
            BinaryLayout::Pairs,
            BANKS,
        )?;
        Ok(Self::with_rom(rom))
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self::with_rom(CartRom::from_crt(
            CartridgeType::SuperSnapshotV5,
            crt,
            BANKS,
        )?))
    }

    fn with_rom(mut rom: CartRom) -> Self {
        rom.ensure_banks(BANKS);
        Self {
            rom,
            ram: BankedImage::new(BANK_8K, BANKS),
            register: 0,
        }
    }

    fn bank(&self) -> usize {
        ((self.register >> 4) & 3) as usize
    }

    fn ram_enabled(&self) -> bool {
        self.register & 0x08 != 0
    }

    fn mode(&self) -> Mode {
        Mode::from_lines(self.register & 0x01 == 0, self.register & 0x02 == 0)
    }

    fn apply(&self, bus: &mut PortBus<'_>, mut flags: ConfigFlags) {
        if self.ram_enabled() {
            flags |= ConfigFlags::EXPORT_RAM;
        }
        bus.set_mode(self.mode(), self.bank() as u16, flags);
    }
}

impl Driver for SuperSnapshotV5 {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::SuperSnapshotV5
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FREEZER
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.register = 0;
        self.apply(bus, ConfigFlags::READ);
    }

    fn powerup(&mut self, bus: &mut PortBus<'_>) {
        self.ram.fill(0);
        self.config_init(bus);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        if self.ram_enabled() {
            self.ram.read(self.bank(), (addr & 0x1fff) as usize)
        } else {
            self.rom.roml(self.bank(), addr)
        }
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.romh(self.bank(), addr)
    }

    fn peek_io1(&self, addr: u16, config: &BusConfiguration) -> Option<u8> {
        self.peek_roml(0x1e00 | (addr & 0xff), config)
    }

    fn write_roml(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        if !self.ram_enabled() {
            return rom_write(bus.config());
        }
        self.ram.write(self.bank(), (addr & 0x1fff) as usize, value);
        if bus.config().mode() == Mode::Ultimax {
            WriteTarget::Device
        } else {
            WriteTarget::Both
        }
    }

    fn write_io1(&mut self, _addr: u16, value: u8, bus: &mut PortBus<'_>) {
        self.register = value;
        self.apply(bus, ConfigFlags::WRITE | ConfigFlags::RELEASE_FREEZE);
    }

    fn freeze_allowed(&self) -> bool {
        true
    }

    fn freeze(&mut self, bus: &mut PortBus<'_>) {
        self.register = 0x02;
        self.apply(bus, ConfigFlags::READ);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::SuperSnapshotV5.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.register);
        m.write_image(&self.ram);
        self.rom.write_snapshot(&mut m);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let register = r.read_u8()?;
        let ram = r.read_image_like(&self.ram)?;
        let mut rom = CartRom::read_snapshot(&mut r)?;
        rom.ensure_banks(BANKS);
        self.register = register;
        self.ram = ram;
        self.rom = rom;
        self.apply(bus, ConfigFlags::READ);
        Ok(())
    }
}
