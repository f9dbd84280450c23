//! IDE64: ATA interface with its own ROM and 32K of RAM.
//!
//! I/O map, all in IO1:
//!
//! - `$DE20-$DE2F`: ATA registers; $DE2E is the control block.
//! - `$DE30/$DE31`: low/high half of the 16-bit data latch. Reading the
//!   data register leaves the high byte here; writing it sends the byte
//!   written plus the latched high byte.
//! - `$DE32`: identification and current mode (read).
//! - `$DE32-$DE35`: ROM bank 0-3 (write, 64K ROM).
//! - `$DE60-$DEFF`: ROM bytes $1E60-$1EFF of the current bank.
//! - `$DE60-$DE67`: ROM bank 0-7 (write, 128K ROM).
//! - `$DEFB`: bit 0 switches the cartridge off until reset.
//! - `$DEFC-$DEFF`: mode 16K, 8K, Ultimax, off.
//!
//! In Ultimax the RAM fills $1000-$7FFF and $C000-$CFFF and the ROM bank
//! shows at $8000, $A000 and $E000. The VIC always sees 8K mode.

use format_crt::CrtImage;

use crate::ata::AtaDrive;
use crate::banked::BANK_8K;
use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::config::Ide64Config;
use crate::decoder::{BusRead, WriteTarget};
use crate::error::{AttachError, SnapshotError};
use crate::image::{BinaryLayout, CartRom};
use crate::snapshot::SnapshotModule;

use super::{Driver, open_module};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

const MAX_BANKS: usize = 8;
const RAM_SIZE: usize = 0x8000;

pub struct Ide64 {
    rom: CartRom,
    ram: Box<[u8; RAM_SIZE]>,
    drive: AtaDrive,
    bank: u8,
    mode: Mode,
    killed: bool,
    latch_in: u16,
    latch_out: u16,
}

impl Ide64 {
    pub fn from_binary(data: &[u8], config: &Ide64Config) -> Result<Self, AttachError> {
        let rom = CartRom::from_binary(CartridgeType::Ide64, data, BinaryLayout::Pairs, MAX_BANKS)?;
        Self::with_rom(rom, config)
    }

    pub fn from_crt(crt: &CrtImage, config: &Ide64Config) -> Result<Self, AttachError> {
        let rom = CartRom::from_crt(CartridgeType::Ide64, crt, MAX_BANKS)?;
        Self::with_rom(rom, config)
    }

    /// Erased ROM, for a snapshot to fill.
    pub fn blank(config: &Ide64Config) -> Result<Self, AttachError> {
        Self::with_rom(CartRom::blank(4), config)
    }

    fn with_rom(mut rom: CartRom, config: &Ide64Config) -> Result<Self, AttachError> {
        let banks = if rom.banks() > 4 { MAX_BANKS } else { 4 };
        rom.ensure_banks(banks);
        let drive = match &config.disk_image {
            Some(path) => AtaDrive::open(path, config.geometry, config.read_only).map_err(
                |source| AttachError::CompanionResource {
                    cart_type: CartridgeType::Ide64,
                    path: path.clone(),
                    source,
                },
            )?,
            None => AtaDrive::absent(),
        };
        Ok(Self {
            rom,
            ram: Box::new([0; RAM_SIZE]),
            drive,
            bank: 0,
            mode: Mode::Game8k,
            killed: false,
            latch_in: 0,
            latch_out: 0,
        })
    }

    #[must_use]
    pub fn drive(&self) -> &AtaDrive {
        &self.drive
    }

    /// Later boards decode eight banks from the ROM window.
    fn banked_through_window(&self) -> bool {
        self.rom.banks() > 4
    }

    fn apply(&self, bus: &mut PortBus<'_>) {
        bus.apply_configuration(
            Mode::Game8k,
            self.mode,
            u16::from(self.bank),
            ConfigFlags::READ | ConfigFlags::PHI2_RAM,
        );
    }

    fn identification(&self) -> u8 {
        let version = if self.banked_through_window() {
            0x20
        } else {
            0x10
        };
        let cfg = self.mode.bits();
        version | (self.bank << 2) | (((cfg & 1) ^ 1) << 1) | (cfg >> 1)
    }

    fn ram_index(addr: u16) -> usize {
        usize::from(addr & 0x7fff)
    }

    fn peek_rom_window(&self, addr: u16) -> Option<u8> {
        if self.killed {
            return None;
        }
        self.rom.roml(usize::from(self.bank), 0x1e00 | (addr & 0xff))
    }
}

impl Driver for Ide64 {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Ide64
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.bank = 0;
        self.mode = Mode::Game8k;
        self.killed = false;
        self.latch_in = 0;
        self.latch_out = 0;
        self.drive.reset();
        self.apply(bus);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(usize::from(self.bank), addr)
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.romh(usize::from(self.bank), addr)
    }

    fn peek_ultimax(&self, addr: u16, _config: &BusConfiguration) -> BusRead {
        match addr {
            0xa000..=0xbfff => BusRead::driven(self.rom.romh(usize::from(self.bank), addr)),
            _ => BusRead::Data(self.ram[Self::ram_index(addr)]),
        }
    }

    fn peek_io1(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        match addr & 0xff {
            0x20..=0x2f => Some(self.drive.peek((addr & 0x0f) as u8) as u8),
            0x30 => Some(self.latch_in as u8),
            0x31 => Some((self.latch_in >> 8) as u8),
            0x32 => Some(self.identification()),
            0x60..=0xff => self.peek_rom_window(addr),
            _ => None,
        }
    }

    fn read_io1(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        match addr & 0xff {
            0x20..=0x2f => {
                let word = self.drive.read((addr & 0x0f) as u8);
                self.latch_in = word;
                Some(word as u8)
            }
            _ => self.peek_io1(addr, bus.config()),
        }
    }

    fn write_ultimax(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) -> WriteTarget {
        if !(0xa000..=0xbfff).contains(&addr) {
            self.ram[Self::ram_index(addr)] = value;
        }
        WriteTarget::Device
    }

    fn write_io1(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        let reg = addr & 0xff;
        match reg {
            0x20..=0x2f => {
                let word = (self.latch_out & 0xff00) | u16::from(value);
                self.drive.write((addr & 0x0f) as u8, word);
            }
            0x30 => self.latch_out = (self.latch_out & 0xff00) | u16::from(value),
            0x31 => self.latch_out = (self.latch_out & 0x00ff) | (u16::from(value) << 8),
            0x32..=0x35 if !self.banked_through_window() => {
                let bank = ((reg ^ 2) & 3) as u8;
                if bank != self.bank {
                    self.bank = bank;
                    self.apply(bus);
                }
            }
            _ if self.killed => {}
            0x60..=0x67 if self.banked_through_window() => {
                let bank = (reg & 7) as u8;
                if bank != self.bank {
                    self.bank = bank;
                    self.apply(bus);
                }
            }
            0xfb => {
                if value & 1 != 0 {
                    log::info!("IDE64: switched off until reset");
                    self.killed = true;
                    self.mode = Mode::Ram;
                    self.apply(bus);
                }
            }
            0xfc..=0xff => {
                let mode = Mode::from_bits(((reg ^ 1) & 3) as u8);
                if mode != self.mode {
                    self.mode = mode;
                    self.apply(bus);
                }
            }
            _ => {}
        }
    }

    fn detach(&mut self) {
        self.drive.flush();
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Ide64.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.bank);
        m.write_u8(self.mode.bits());
        m.write_bool(self.killed);
        m.write_u16(self.latch_in);
        m.write_u16(self.latch_out);
        m.write_bytes(&self.ram[..]);
        self.rom.write_snapshot(&mut m);
        self.drive.write_snapshot(&mut m);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let bank = r.read_u8()?;
        let mode = Mode::from_bits(r.read_u8()? & 3);
        let killed = r.read_bool()?;
        let latch_in = r.read_u16()?;
        let latch_out = r.read_u16()?;
        let mut ram = Box::new([0; RAM_SIZE]);
        r.read_into(&mut ram[..])?;
        let rom = CartRom::read_snapshot(&mut r)?;
        if usize::from(bank) >= rom.banks() {
            return Err(r.rejected("bank beyond ROM"));
        }
        self.drive.read_snapshot(&mut r)?;
        self.bank = bank;
        self.mode = mode;
        self.killed = killed;
        self.latch_in = latch_in;
        self.latch_out = latch_out;
        self.ram = ram;
        self.rom = rom;
        self.apply(bus);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::ata::{CMD_READ_SECTORS, SECTOR_SIZE};
    use crate::carts::rig::Rig;

    /// 64K ROM whose bytes name their bank.
    fn rom(banks: usize) -> Vec<u8> {
        (0..banks * 2 * BANK_8K)
            .map(|i| (i / (2 * BANK_8K)) as u8)
            .collect()
    }

    fn ide64() -> Ide64 {
        Ide64::from_binary(&rom(4), &Ide64Config::default()).expect("64K ROM")
    }

    #[test]
    fn boots_in_8k_with_vic_in_8k() {
        let mut cart = ide64();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        assert_eq!(rig.config.mode_phi1(), Mode::Game8k);
        assert!(rig.config.phi2_ram());
        assert_eq!(rig.read_io1(&mut cart, 0xde32), Some(0x12));
    }

    #[test]
    fn mode_and_bank_registers() {
        let mut cart = ide64();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xdefc, 0);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        rig.write_io1(&mut cart, 0xdefe, 0);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        rig.write_io1(&mut cart, 0xde35, 0);
        assert_eq!(rig.config.bank(), 3);
        assert_eq!(cart.peek_romh(0xe000, &rig.config), Some(3));
        rig.write_io1(&mut cart, 0xdeff, 0);
        assert_eq!(rig.config.mode(), Mode::Ram);
        assert_eq!(rig.read_io1(&mut cart, 0xde32), Some(0x1c | 0x03));
    }

    #[test]
    fn rom_bytes_through_io_window() {
        let mut image = rom(4);
        image[2 * 2 * BANK_8K + 0x1e80] = 0xa5;
        let mut cart = Ide64::from_binary(&image, &Ide64Config::default()).expect("64K");
        let mut rig = Rig::new();
        rig.write_io1(&mut cart, 0xde34, 0);
        assert_eq!(rig.read_io1(&mut cart, 0xde80), Some(0xa5));
        assert_eq!(rig.read_io1(&mut cart, 0xde60), Some(2));
    }

    #[test]
    fn kill_switch_turns_off_until_reset() {
        let mut cart = ide64();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xdefb, 0x01);
        assert_eq!(rig.config.mode(), Mode::Ram);
        assert_eq!(rig.read_io1(&mut cart, 0xde80), None);
        rig.write_io1(&mut cart, 0xdefd, 0);
        assert_eq!(rig.config.mode(), Mode::Ram);
        rig.init(&mut cart);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        assert_eq!(rig.read_io1(&mut cart, 0xde80), Some(0));
    }

    #[test]
    fn larger_rom_banks_through_window() {
        let mut cart = Ide64::from_binary(&rom(8), &Ide64Config::default()).expect("128K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde66, 0);
        assert_eq!(rig.config.bank(), 6);
        rig.write_io1(&mut cart, 0xde33, 0);
        assert_eq!(rig.config.bank(), 6);
        assert_eq!(rig.read_io1(&mut cart, 0xde32).map(|id| id & 0xf0), Some(0x30));
    }

    #[test]
    fn ultimax_ram() {
        let mut cart = ide64();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xdefe, 0);
        let mut bus = rig.bus(&cart);
        assert_eq!(cart.write_ultimax(0x1234, 0x77, &mut bus), WriteTarget::Device);
        assert_eq!(cart.write_ultimax(0xc010, 0x88, &mut bus), WriteTarget::Device);
        assert_eq!(cart.peek_ultimax(0x1234, &rig.config), BusRead::Data(0x77));
        assert_eq!(cart.peek_ultimax(0xc010, &rig.config), BusRead::Data(0x88));
        assert_eq!(cart.ram[0x4010], 0x88);
        assert_eq!(cart.peek_ultimax(0xa000, &rig.config), BusRead::Data(0));
    }

    #[test]
    fn reads_a_sector_through_the_latch() {
        let mut disk = tempfile::NamedTempFile::new().expect("temp file");
        let mut image = vec![0; 4 * SECTOR_SIZE];
        image[SECTOR_SIZE] = 0x34;
        image[SECTOR_SIZE + 1] = 0x12;
        disk.write_all(&image).expect("disk image");
        let mut cart = Ide64::from_binary(
            &rom(4),
            &Ide64Config {
                disk_image: Some(disk.path().to_path_buf()),
                ..Ide64Config::default()
            },
        )
        .expect("attach");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde22, 1);
        rig.write_io1(&mut cart, 0xde23, 1);
        rig.write_io1(&mut cart, 0xde26, 0x40);
        rig.write_io1(&mut cart, 0xde27, CMD_READ_SECTORS);
        assert_eq!(rig.read_io1(&mut cart, 0xde27).map(|s| s & 0x08), Some(0x08));
        assert_eq!(rig.read_io1(&mut cart, 0xde20), Some(0x34));
        assert_eq!(rig.read_io1(&mut cart, 0xde31), Some(0x12));
    }

    #[test]
    fn no_drive_floats() {
        let mut cart = ide64();
        let mut rig = Rig::new();
        assert_eq!(rig.read_io1(&mut cart, 0xde27), Some(0xff));
        assert!(!cart.drive().present());
    }

    #[test]
    fn missing_disk_fails_attach() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = Ide64::blank(&Ide64Config {
            disk_image: Some(dir.path().join("absent.hdd")),
            ..Ide64Config::default()
        });
        assert!(matches!(result, Err(AttachError::CompanionResource { .. })));
    }

    #[test]
    fn snapshot_round_trip() {
        let mut cart = ide64();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde33, 0);
        rig.write_io1(&mut cart, 0xdefc, 0);
        cart.ram[5] = 0x5a;
        let mut restored = Ide64::blank(&Ide64Config::default()).expect("blank");
        rig.round_trip(&cart, &mut restored);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        assert_eq!(rig.config.bank(), 1);
        assert_eq!(restored.ram[5], 0x5a);
        assert_eq!(restored.peek_roml(0x8000, &rig.config), Some(1));
    }
}
