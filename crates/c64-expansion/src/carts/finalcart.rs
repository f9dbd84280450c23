//! The Final Cartridge family.

use format_crt::CrtImage;

use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::error::{AttachError, SnapshotError};
use crate::image::{BinaryLayout, CartRom};
use crate::snapshot::SnapshotModule;

use super::{Capabilities, Driver, open_module};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

/// Final Cartridge (I).
///
/// 16K ROM. Any access to $DE00-$DEFF switches it off, any access to
/// $DF00-$DFFF back to 16K; both release a freeze. The I/O windows
/// mirror the last two pages of ROML.
pub struct FinalI {
    rom: CartRom,
    mode: Mode,
}

impl FinalI {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        Ok(Self {
            rom: CartRom::from_binary(CartridgeType::FinalI, data, BinaryLayout::Pairs, 1)?,
            mode: Mode::Game16k,
        })
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self {
            rom: CartRom::from_crt(CartridgeType::FinalI, crt, 1)?,
            mode: Mode::Game16k,
        })
    }

    fn set(&mut self, mode: Mode, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        self.mode = mode;
        bus.set_mode(mode, 0, flags);
    }
}

impl Driver for FinalI {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::FinalI
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FREEZER
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.set(Mode::Game16k, bus, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(0, addr)
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.romh(0, addr)
    }

    fn peek_io1(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(0, 0x1e00 | (addr & 0xff))
    }

    fn peek_io2(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(0, 0x1f00 | (addr & 0xff))
    }

    fn read_io1(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.set(Mode::Ram, bus, ConfigFlags::RELEASE_FREEZE);
        self.peek_io1(addr, bus.config())
    }

    fn read_io2(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.set(Mode::Game16k, bus, ConfigFlags::RELEASE_FREEZE);
        self.peek_io2(addr, bus.config())
    }

    fn write_io1(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.set(
            Mode::Ram,
            bus,
            ConfigFlags::WRITE | ConfigFlags::RELEASE_FREEZE,
        );
    }

    fn write_io2(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.set(
            Mode::Game16k,
            bus,
            ConfigFlags::WRITE | ConfigFlags::RELEASE_FREEZE,
        );
    }

    fn freeze_allowed(&self) -> bool {
        true
    }

    fn freeze(&mut self, bus: &mut PortBus<'_>) {
        self.set(Mode::Ultimax, bus, ConfigFlags::READ);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::FinalI.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.mode.bits());
        self.rom.write_snapshot(&mut m);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let mode = Mode::from_bits(r.read_u8()?);
        self.rom = CartRom::read_snapshot(&mut r)?;
        self.set(mode, bus, ConfigFlags::READ);
        Ok(())
    }
}

const FC3_BANKS: usize = 4;

/// Final Cartridge III.
///
/// Four 16K banks and a control register at $DFFF:
///
/// | Bit | Meaning                                  |
/// |-----|------------------------------------------|
/// | 0-1 | bank                                     |
/// | 4   | EXROM (0 = asserted)                     |
/// | 5   | GAME (0 = asserted)                      |
/// | 6   | NMI line (0 = pull NMI, 1 = release)     |
/// | 7   | hide the register until reset            |
///
/// Both I/O windows mirror the last two pages of the current ROML bank,
/// so the register itself reads back ROM.
pub struct FinalIII {
    rom: CartRom,
    register: u8,
    hidden: bool,
}

impl FinalIII {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        let rom = CartRom::from_binary(
            CartridgeType::FinalIII,
            data,
            BinaryLayout::Pairs,
            FC3_BANKS,
        )?;
        Ok(Self::with_rom(rom))
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self::with_rom(CartRom::from_crt(
            CartridgeType::FinalIII,
            crt,
            FC3_BANKS,
        )?))
    }

    fn with_rom(mut rom: CartRom) -> Self {
        rom.ensure_banks(FC3_BANKS);
        Self {
            rom,
            register: 0x40,
            hidden: false,
        }
    }

    fn bank(&self) -> usize {
        (self.register & 3) as usize
    }

    fn mode(&self) -> Mode {
        let game = self.register & 0x20 == 0;
        let exrom = self.register & 0x10 == 0;
        Mode::from_lines(game, exrom)
    }
}

impl Driver for FinalIII {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::FinalIII
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FREEZER
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.register = 0x40;
        self.hidden = false;
        bus.set_mode(Mode::Game16k, 0, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(self.bank(), addr)
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.romh(self.bank(), addr)
    }

    fn peek_io1(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(self.bank(), 0x1e00 | (addr & 0xff))
    }

    fn peek_io2(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(self.bank(), 0x1f00 | (addr & 0xff))
    }

    fn write_io2(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        if self.hidden || addr != 0xdfff {
            return;
        }
        self.register = value;
        self.hidden = value & 0x80 != 0;
        bus.set_mode(self.mode(), self.bank() as u16, ConfigFlags::WRITE);
        if value & 0x40 == 0 {
            bus.trigger_nmi();
        } else {
            bus.release_freeze();
        }
        log::debug!(
            "{}: control ${value:02X} -> {} bank {}",
            CartridgeType::FinalIII,
            self.mode().name(),
            self.bank()
        );
    }

    fn freeze_allowed(&self) -> bool {
        true
    }

    fn freeze(&mut self, bus: &mut PortBus<'_>) {
        self.register = (self.register & 0xc0) | 0x10;
        bus.set_mode(Mode::Ultimax, 0, ConfigFlags::READ);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::FinalIII.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.register);
        m.write_bool(self.hidden);
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
        let hidden = r.read_bool()?;
        let mut rom = CartRom::read_snapshot(&mut r)?;
        rom.ensure_banks(FC3_BANKS);
        self.register = register;
        self.hidden = hidden;
        self.rom = rom;
        bus.set_mode(self.mode(), self.bank() as u16, ConfigFlags::READ);
        Ok(())
    }
}
