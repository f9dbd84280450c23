//! Bank-switched game and utility cartridges.
//!
//! | Type             | Register          | Bank bits                 | Mode             |
//! |------------------|-------------------|---------------------------|------------------|
//! | Ocean            | $DE00 write       | 0-5                       | 16K              |
//! | Fun Play         | $DE00 write       | 2-5 and 0                 | 16K              |
//! | Super Games      | $DF00 write       | 0-1                       | bit 2: 8K / 16K  |
//! | Magic Desk       | $DE00 write       | 0-6                       | bit 7 off        |
//! | Comal-80         | $DE00 write       | 0-1                       | 16K, $E0 off     |
//! | RGCD             | $DE00 write       | 0-2                       | bit 3 off        |
//! | Dinamic          | $DE00 read        | address bits 0-3          | 8K               |
//! | C64 Game System  | $DE00 write       | address bits 0-5          | 8K               |
//! | Structured BASIC | $DE00 access      | address bits 0-1          | 8K or off        |
//! | Ross             | $DE00/$DF00 read  | $DE00 selects bank 1      | 16K, $DF00 off   |
//!
//! Ocean and Fun Play images are runs of 8K banks; in 16K mode ROMH shows
//! the same bank as ROML. A 256K Ocean image carries banks 16-31 as $A000
//! CHIPs, which still land in the one linear bank list.

use format_crt::CrtImage;

use crate::banked::{BANK_8K, BankedImage};
use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::error::{AttachError, SnapshotError};
use crate::image::{BinaryLayout, CartRom};
use crate::snapshot::{ModuleReader, SnapshotModule};

use super::{Driver, open_module};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

/// Consecutive 8K banks from a binary image.
fn linear_from_binary(
    cart_type: CartridgeType,
    data: &[u8],
    max_banks: usize,
) -> Result<BankedImage, AttachError> {
    Ok(CartRom::from_binary(cart_type, data, BinaryLayout::Roml, max_banks)?.roml)
}

/// 8K CHIPs placed by bank number, whatever their load address.
fn linear_from_crt(
    cart_type: CartridgeType,
    crt: &CrtImage,
    max_banks: usize,
) -> Result<BankedImage, AttachError> {
    let banks = crt.bank_count().max(1);
    if banks > max_banks {
        return Err(AttachError::BankOutOfRange {
            cart_type,
            bank: banks - 1,
            max: max_banks,
        });
    }
    let mut rom = BankedImage::filled(BANK_8K, banks, 0xff);
    for chip in &crt.chips {
        let placed = matches!(chip.load_address, 0x8000 | 0xa000)
            && rom.load(chip.bank as usize, 0, &chip.data);
        if !placed {
            return Err(AttachError::UnexpectedChip {
                cart_type,
                load_address: chip.load_address,
                size: chip.data.len(),
            });
        }
    }
    Ok(rom)
}

fn read_linear(r: &mut ModuleReader<'_>) -> Result<BankedImage, SnapshotError> {
    let rom = r.read_image()?;
    if rom.bank_size() != BANK_8K {
        return Err(r.rejected("ROM bank size is not 8K"));
    }
    Ok(rom)
}

fn linear_read(rom: &BankedImage, bank: u8, addr: u16) -> Option<u8> {
    rom.read(bank as usize, (addr & 0x1fff) as usize)
}

// --- Ocean ---------------------------------------------------------------

pub struct Ocean {
    rom: BankedImage,
    bank: u8,
}

impl Ocean {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        Ok(Self {
            rom: linear_from_binary(CartridgeType::Ocean, data, 64)?,
            bank: 0,
        })
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self {
            rom: linear_from_crt(CartridgeType::Ocean, crt, 64)?,
            bank: 0,
        })
    }
}

impl Driver for Ocean {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Ocean
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.bank = 0;
        bus.set_mode(Mode::Game16k, 0, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        linear_read(&self.rom, self.bank, addr)
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        linear_read(&self.rom, self.bank, addr)
    }

    fn write_io1(&mut self, _addr: u16, value: u8, bus: &mut PortBus<'_>) {
        self.bank = value & 0x3f;
        bus.set_mode(Mode::Game16k, u16::from(self.bank), ConfigFlags::WRITE);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Ocean.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.bank);
        m.write_image(&self.rom);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let bank = r.read_u8()? & 0x3f;
        self.rom = read_linear(&mut r)?;
        self.bank = bank;
        bus.set_mode(Mode::Game16k, u16::from(self.bank), ConfigFlags::READ);
        Ok(())
    }
}

// --- Fun Play / Power Play -------------------------------------------------

pub struct FunPlay {
    rom: BankedImage,
    bank: u8,
}

impl FunPlay {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        Ok(Self {
            rom: linear_from_binary(CartridgeType::FunPlay, data, 16)?,
            bank: 0,
        })
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self {
            rom: linear_from_crt(CartridgeType::FunPlay, crt, 16)?,
            bank: 0,
        })
    }

    /// The bank number is scrambled across the register bits.
    fn decode_bank(value: u8) -> u8 {
        ((value >> 2) | (value & 1)) & 0x0f
    }
}

impl Driver for FunPlay {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::FunPlay
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.bank = 0;
        bus.set_mode(Mode::Game16k, 0, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        linear_read(&self.rom, self.bank, addr)
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        linear_read(&self.rom, self.bank, addr)
    }

    fn write_io1(&mut self, _addr: u16, value: u8, bus: &mut PortBus<'_>) {
        self.bank = Self::decode_bank(value);
        bus.set_mode(Mode::Game16k, u16::from(self.bank), ConfigFlags::WRITE);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::FunPlay.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.bank);
        m.write_image(&self.rom);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let bank = r.read_u8()? & 0x0f;
        self.rom = read_linear(&mut r)?;
        self.bank = bank;
        bus.set_mode(Mode::Game16k, u16::from(self.bank), ConfigFlags::READ);
        Ok(())
    }
}

// --- Super Games -------------------------------------------------------------

pub struct SuperGames {
    rom: CartRom,
    register: u8,
}

impl SuperGames {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        Ok(Self {
            rom: CartRom::from_binary(CartridgeType::SuperGames, data, BinaryLayout::Pairs, 4)?,
            register: 0x04,
        })
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self {
            rom: CartRom::from_crt(CartridgeType::SuperGames, crt, 4)?,
            register: 0x04,
        })
    }

    fn bank(&self) -> usize {
        (self.register & 3) as usize
    }

    fn mode(&self) -> Mode {
        if self.register == 0x0c {
            Mode::Ram
        } else if self.register & 0x04 != 0 {
            Mode::Game8k
        } else {
            Mode::Game16k
        }
    }

    fn apply(&self, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        bus.set_mode(self.mode(), self.bank() as u16, flags);
    }
}

impl Driver for SuperGames {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::SuperGames
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.register = 0x04;
        self.apply(bus, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(self.bank(), addr)
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.romh(self.bank(), addr)
    }

    fn write_io2(&mut self, _addr: u16, value: u8, bus: &mut PortBus<'_>) {
        self.register = value;
        self.apply(bus, ConfigFlags::WRITE);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::SuperGames.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.register);
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
        self.rom = CartRom::read_snapshot(&mut r)?;
        self.register = register;
        self.apply(bus, ConfigFlags::READ);
        Ok(())
    }
}

// --- Magic Desk ----------------------------------------------------------------

/// Magic Desk, and its 16K variant whose banks are ROML/ROMH pairs.
pub struct MagicDesk {
    cart_type: CartridgeType,
    rom: CartRom,
    bank: u8,
    disabled: bool,
}

impl MagicDesk {
    pub fn from_binary(cart_type: CartridgeType, data: &[u8]) -> Result<Self, AttachError> {
        let rom = if cart_type == CartridgeType::MagicDesk16 {
            CartRom::from_binary(cart_type, data, BinaryLayout::Pairs, 128)?
        } else {
            let roml = linear_from_binary(cart_type, data, 128)?;
            let banks = roml.bank_count();
            CartRom {
                roml,
                romh: BankedImage::filled(BANK_8K, banks, 0xff),
            }
        };
        Ok(Self::with_rom(cart_type, rom))
    }

    pub fn from_crt(cart_type: CartridgeType, crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self::with_rom(
            cart_type,
            CartRom::from_crt(cart_type, crt, 128)?,
        ))
    }

    fn with_rom(cart_type: CartridgeType, rom: CartRom) -> Self {
        Self {
            cart_type,
            rom,
            bank: 0,
            disabled: false,
        }
    }

    fn mode(&self) -> Mode {
        match (self.disabled, self.cart_type) {
            (true, _) => Mode::Ram,
            (false, CartridgeType::MagicDesk16) => Mode::Game16k,
            _ => Mode::Game8k,
        }
    }
}

impl Driver for MagicDesk {
    fn cart_type(&self) -> CartridgeType {
        self.cart_type
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.bank = 0;
        self.disabled = false;
        bus.set_mode(self.mode(), 0, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(self.bank as usize, addr)
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.romh(self.bank as usize, addr)
    }

    fn peek_io1(&self, _addr: u16, _config: &BusConfiguration) -> Option<u8> {
        Some(self.bank | if self.disabled { 0x80 } else { 0 })
    }

    fn write_io1(&mut self, _addr: u16, value: u8, bus: &mut PortBus<'_>) {
        self.bank = value & 0x7f;
        self.disabled = value & 0x80 != 0;
        bus.set_mode(self.mode(), u16::from(self.bank), ConfigFlags::WRITE);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(self.cart_type.snapshot_name(), SNAP_MAJOR, SNAP_MINOR);
        m.write_u8(self.bank);
        m.write_bool(self.disabled);
        self.rom.write_snapshot(&mut m);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let bank = r.read_u8()? & 0x7f;
        let disabled = r.read_bool()?;
        self.rom = CartRom::read_snapshot(&mut r)?;
        self.bank = bank;
        self.disabled = disabled;
        bus.set_mode(self.mode(), u16::from(self.bank), ConfigFlags::READ);
        Ok(())
    }
}

// --- Comal-80 ----------------------------------------------------------------

pub struct Comal80 {
    rom: CartRom,
    register: u8,
}

impl Comal80 {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        Ok(Self {
            rom: CartRom::from_binary(CartridgeType::Comal80, data, BinaryLayout::Pairs, 4)?,
            register: 0,
        })
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self {
            rom: CartRom::from_crt(CartridgeType::Comal80, crt, 4)?,
            register: 0,
        })
    }

    fn bank(&self) -> usize {
        (self.register & 3) as usize
    }

    fn mode(&self) -> Mode {
        if self.register & 0xe0 == 0xe0 {
            Mode::Ram
        } else {
            Mode::Game16k
        }
    }
}

impl Driver for Comal80 {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Comal80
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.register = 0;
        bus.set_mode(Mode::Game16k, 0, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(self.bank(), addr)
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.romh(self.bank(), addr)
    }

    fn write_io1(&mut self, _addr: u16, value: u8, bus: &mut PortBus<'_>) {
        self.register = value;
        bus.set_mode(self.mode(), self.bank() as u16, ConfigFlags::WRITE);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Comal80.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.register);
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
        self.rom = CartRom::read_snapshot(&mut r)?;
        self.register = register;
        bus.set_mode(self.mode(), self.bank() as u16, ConfigFlags::READ);
        Ok(())
    }
}

// --- RGCD --------------------------------------------------------------------

pub struct Rgcd {
    rom: BankedImage,
    bank: u8,
    /// Latched by bit 3 until the next reset.
    disabled: bool,
}

impl Rgcd {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        Ok(Self {
            rom: linear_from_binary(CartridgeType::Rgcd, data, 8)?,
            bank: 0,
            disabled: false,
        })
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self {
            rom: linear_from_crt(CartridgeType::Rgcd, crt, 8)?,
            bank: 0,
            disabled: false,
        })
    }

    fn mode(&self) -> Mode {
        if self.disabled {
            Mode::Ram
        } else {
            Mode::Game8k
        }
    }
}

impl Driver for Rgcd {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Rgcd
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.bank = 0;
        self.disabled = false;
        bus.set_mode(Mode::Game8k, 0, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        linear_read(&self.rom, self.bank, addr)
    }

    fn write_io1(&mut self, _addr: u16, value: u8, bus: &mut PortBus<'_>) {
        if self.disabled {
            return;
        }
        self.bank = value & 0x07;
        self.disabled = value & 0x08 != 0;
        bus.set_mode(self.mode(), u16::from(self.bank), ConfigFlags::WRITE);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Rgcd.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.bank);
        m.write_bool(self.disabled);
        m.write_image(&self.rom);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let bank = r.read_u8()? & 0x07;
        let disabled = r.read_bool()?;
        self.rom = read_linear(&mut r)?;
        self.bank = bank;
        self.disabled = disabled;
        bus.set_mode(self.mode(), u16::from(self.bank), ConfigFlags::READ);
        Ok(())
    }
}

// --- Dinamic -------------------------------------------------------------------

pub struct Dinamic {
    rom: BankedImage,
    bank: u8,
}

impl Dinamic {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        Ok(Self {
            rom: linear_from_binary(CartridgeType::Dinamic, data, 16)?,
            bank: 0,
        })
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self {
            rom: linear_from_crt(CartridgeType::Dinamic, crt, 16)?,
            bank: 0,
        })
    }
}

impl Driver for Dinamic {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Dinamic
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.bank = 0;
        bus.set_mode(Mode::Game8k, 0, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        linear_read(&self.rom, self.bank, addr)
    }

    /// The bank comes from the address lines of a read; the data bus floats.
    fn read_io1(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.bank = (addr & 0x0f) as u8;
        bus.set_mode(Mode::Game8k, u16::from(self.bank), ConfigFlags::READ);
        None
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Dinamic.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.bank);
        m.write_image(&self.rom);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let bank = r.read_u8()? & 0x0f;
        self.rom = read_linear(&mut r)?;
        self.bank = bank;
        bus.set_mode(Mode::Game8k, u16::from(self.bank), ConfigFlags::READ);
        Ok(())
    }
}

// --- C64 Game System -------------------------------------------------------------

pub struct Gs {
    rom: BankedImage,
    bank: u8,
}

impl Gs {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        Ok(Self {
            rom: linear_from_binary(CartridgeType::Gs, data, 64)?,
            bank: 0,
        })
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self {
            rom: linear_from_crt(CartridgeType::Gs, crt, 64)?,
            bank: 0,
        })
    }
}

impl Driver for Gs {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Gs
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.bank = 0;
        bus.set_mode(Mode::Game8k, 0, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        linear_read(&self.rom, self.bank, addr)
    }

    /// Reading $DE00 returns to bank 0.
    fn read_io1(&mut self, _addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.bank = 0;
        bus.set_mode(Mode::Game8k, 0, ConfigFlags::READ);
        None
    }

    fn write_io1(&mut self, addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.bank = (addr & 0x3f) as u8;
        bus.set_mode(Mode::Game8k, u16::from(self.bank), ConfigFlags::WRITE);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(CartridgeType::Gs.snapshot_name(), SNAP_MAJOR, SNAP_MINOR);
        m.write_u8(self.bank);
        m.write_image(&self.rom);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let bank = r.read_u8()? & 0x3f;
        self.rom = read_linear(&mut r)?;
        self.bank = bank;
        bus.set_mode(Mode::Game8k, u16::from(self.bank), ConfigFlags::READ);
        Ok(())
    }
}

// --- Structured BASIC --------------------------------------------------------------

pub struct StructuredBasic {
    rom: BankedImage,
    bank: u8,
    enabled: bool,
}

impl StructuredBasic {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        Ok(Self::with_rom(linear_from_binary(
            CartridgeType::StructuredBasic,
            data,
            2,
        )?))
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self::with_rom(linear_from_crt(
            CartridgeType::StructuredBasic,
            crt,
            2,
        )?))
    }

    fn with_rom(rom: BankedImage) -> Self {
        Self {
            rom,
            bank: 0,
            enabled: true,
        }
    }

    /// Any access to $DE00-$DEFF switches on the low address bits.
    fn access(&mut self, addr: u16, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        match addr & 3 {
            0 | 1 => {
                self.bank = 0;
                self.enabled = true;
            }
            2 => {
                self.bank = 1;
                self.enabled = true;
            }
            _ => self.enabled = false,
        }
        self.apply(bus, flags);
    }

    fn apply(&self, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        let mode = if self.enabled { Mode::Game8k } else { Mode::Ram };
        bus.set_mode(mode, u16::from(self.bank), flags);
    }
}

impl Driver for StructuredBasic {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::StructuredBasic
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.bank = 0;
        self.enabled = true;
        self.apply(bus, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        linear_read(&self.rom, self.bank, addr)
    }

    fn read_io1(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.access(addr, bus, ConfigFlags::READ);
        None
    }

    fn write_io1(&mut self, addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.access(addr, bus, ConfigFlags::WRITE);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::StructuredBasic.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.bank);
        m.write_bool(self.enabled);
        m.write_image(&self.rom);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let bank = r.read_u8()? & 1;
        let enabled = r.read_bool()?;
        self.rom = read_linear(&mut r)?;
        self.bank = bank;
        self.enabled = enabled;
        self.apply(bus, ConfigFlags::READ);
        Ok(())
    }
}

// --- Ross ----------------------------------------------------------------------

pub struct Ross {
    rom: CartRom,
    bank: u8,
    enabled: bool,
}

impl Ross {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        Ok(Self::with_rom(CartRom::from_binary(
            CartridgeType::Ross,
            data,
            BinaryLayout::Pairs,
            2,
        )?))
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self::with_rom(CartRom::from_crt(CartridgeType::Ross, crt, 2)?))
    }

    fn with_rom(rom: CartRom) -> Self {
        Self {
            rom,
            bank: 0,
            enabled: true,
        }
    }

    fn apply(&self, bus: &mut PortBus<'_>) {
        let mode = if self.enabled { Mode::Game16k } else { Mode::Ram };
        bus.set_mode(mode, u16::from(self.bank), ConfigFlags::READ);
    }
}

impl Driver for Ross {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Ross
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.bank = 0;
        self.enabled = true;
        self.apply(bus);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(self.bank as usize, addr)
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.romh(self.bank as usize, addr)
    }

    /// A 32K board switches to its second half; a 16K board ignores it.
    fn read_io1(&mut self, _addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        if self.rom.banks() > 1 {
            self.bank = 1;
            self.apply(bus);
        }
        None
    }

    fn read_io2(&mut self, _addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.enabled = false;
        self.apply(bus);
        None
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Ross.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.bank);
        m.write_bool(self.enabled);
        self.rom.write_snapshot(&mut m);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let bank = r.read_u8()? & 1;
        let enabled = r.read_bool()?;
        self.rom = CartRom::read_snapshot(&mut r)?;
        self.bank = bank;
        self.enabled = enabled;
        self.apply(bus);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carts::rig::Rig;

    /// `banks` 8K banks, each filled with its own number.
    fn numbered(banks: usize) -> Vec<u8> {
        (0..banks).flat_map(|b| vec![b as u8; BANK_8K]).collect()
    }

    #[test]
    fn ocean_selects_bank_and_mirrors_romh() {
        let mut cart = Ocean::from_binary(&numbered(16)).expect("128K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        rig.write_io1(&mut cart, 0xde00, 0xc5);
        assert_eq!(rig.config.bank(), 5);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(5));
        assert_eq!(cart.peek_romh(0xa000, &rig.config), Some(5));
        assert_eq!(rig.host.flushes, 1);
    }

    #[test]
    fn ocean_a000_chips_join_the_bank_list() {
        let mut crt = CrtImage::new(5, "ocean");
        for bank in 0..4u16 {
            crt.chips.push(format_crt::ChipPacket {
                chip_type: format_crt::ChipType::Rom,
                bank,
                load_address: if bank < 2 { 0x8000 } else { 0xa000 },
                data: vec![bank as u8 + 0x10; BANK_8K],
            });
        }
        let cart = Ocean::from_crt(&crt).expect("placed");
        assert_eq!(linear_read(&cart.rom, 3, 0x8000), Some(0x13));
    }

    #[test]
    fn fun_play_bank_scramble() {
        assert_eq!(FunPlay::decode_bank(0x00), 0);
        assert_eq!(FunPlay::decode_bank(0x08), 2);
        assert_eq!(FunPlay::decode_bank(0x01), 1);
        assert_eq!(FunPlay::decode_bank(0x39), 0x0f);
    }

    #[test]
    fn super_games_register() {
        let mut cart = SuperGames::from_binary(&numbered(8)).expect("64K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        rig.write_io2(&mut cart, 0xdf00, 0x02);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(4));
        assert_eq!(cart.peek_romh(0xa000, &rig.config), Some(5));
        rig.write_io2(&mut cart, 0xdf00, 0x0c);
        assert_eq!(rig.config.mode(), Mode::Ram);
    }

    #[test]
    fn magic_desk_bit7_disables() {
        let mut cart =
            MagicDesk::from_binary(CartridgeType::MagicDesk, &numbered(8)).expect("64K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde00, 3);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        assert_eq!(cart.peek_roml(0x9000, &rig.config), Some(3));
        rig.write_io1(&mut cart, 0xde00, 0x80);
        assert_eq!(rig.config.mode(), Mode::Ram);
    }

    #[test]
    fn magic_desk_16_uses_pairs() {
        let mut cart =
            MagicDesk::from_binary(CartridgeType::MagicDesk16, &numbered(4)).expect("64K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde00, 1);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(2));
        assert_eq!(cart.peek_romh(0xa000, &rig.config), Some(3));
    }

    #[test]
    fn comal_off_pattern() {
        let mut cart = Comal80::from_binary(&numbered(8)).expect("64K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde00, 0x42);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        assert_eq!(rig.config.bank(), 2);
        rig.write_io1(&mut cart, 0xde00, 0xe0);
        assert_eq!(rig.config.mode(), Mode::Ram);
    }

    #[test]
    fn rgcd_disable_latches_until_reset() {
        let mut cart = Rgcd::from_binary(&numbered(8)).expect("64K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde00, 0x08);
        assert_eq!(rig.config.mode(), Mode::Ram);
        rig.write_io1(&mut cart, 0xde00, 0x02);
        assert_eq!(rig.config.mode(), Mode::Ram);
        let mut bus = rig.bus(&cart);
        cart.config_reset(&mut bus);
        assert_eq!(rig.config.mode(), Mode::Game8k);
    }

    #[test]
    fn dinamic_switches_on_read_address() {
        let mut cart = Dinamic::from_binary(&numbered(16)).expect("128K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        assert_eq!(rig.read_io1(&mut cart, 0xde0b), None);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(11));
    }

    #[test]
    fn gs_write_address_selects_and_read_resets() {
        let mut cart = Gs::from_binary(&numbered(64)).expect("512K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde2a, 0);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(0x2a));
        rig.read_io1(&mut cart, 0xde00);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(0));
    }

    #[test]
    fn structured_basic_address_lines() {
        let mut cart = StructuredBasic::from_binary(&numbered(2)).expect("16K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.read_io1(&mut cart, 0xde02);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(1));
        rig.write_io1(&mut cart, 0xde03, 0);
        assert_eq!(rig.config.mode(), Mode::Ram);
        rig.read_io1(&mut cart, 0xde01);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(0));
    }

    #[test]
    fn ross_bank_and_off() {
        let mut cart = Ross::from_binary(&numbered(4)).expect("32K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.read_io1(&mut cart, 0xde00);
        assert_eq!(cart.peek_romh(0xa000, &rig.config), Some(3));
        rig.read_io2(&mut cart, 0xdf00);
        assert_eq!(rig.config.mode(), Mode::Ram);
    }

    #[test]
    fn snapshot_keeps_bank() {
        let mut cart = Ocean::from_binary(&numbered(8)).expect("64K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde00, 6);
        let mut restored = Ocean::from_crt(&CrtImage::new(5, "blank")).expect("blank");
        rig.round_trip(&cart, &mut restored);
        assert_eq!(rig.config.bank(), 6);
        assert_eq!(restored.peek_roml(0x8000, &rig.config), Some(6));
    }

    #[test]
    fn truncated_snapshot_leaves_ocean_untouched() {
        let mut saved = Ocean::from_binary(&numbered(4)).expect("32K");
        let mut rig = Rig::new();
        rig.write_io1(&mut saved, 0xde00, 2);
        let mut module = saved.snapshot_write();
        module.data.truncate(12);

        let mut cart = Ocean::from_binary(&numbered(8)).expect("64K");
        rig.write_io1(&mut cart, 0xde00, 5);
        let mut bus = rig.bus(&cart);
        assert!(matches!(
            cart.snapshot_read(&module, &mut bus),
            Err(SnapshotError::Truncated(_))
        ));
        assert_eq!(cart.bank, 5);
        assert_eq!(rig.config.bank(), 5);
        assert_eq!(linear_read(&cart.rom, 7, 0x8000), Some(7));
    }
}
