//! Universal Cartridge 1, 1.5 and 2.
//!
//! Banked 16K ROM plus SRAM. The UC-1 has one register written anywhere
//! in $DE00-$DEFF; the UC-1.5 and UC-2 split it into a bank register at
//! $DE02 and a control register at $DE03.
//!
//! | Bit | Control                                           |
//! |-----|---------------------------------------------------|
//! | 0-2 | bank (UC-1 only)                                  |
//! | 3   | hide the registers until reset                    |
//! | 4   | SRAM writable                                     |
//! | 5   | SRAM instead of ROM                               |
//! | 6-7 | `$00` 16K, `$40` 8K, `$80` Ultimax, `$C0` off     |
//!
//! With the SRAM writable the CPU sees an Ultimax map while the VIC-II
//! keeps the selected mode. Addresses the cartridge does not decode then
//! fall through to host RAM, and writes to $4000-$7FFF also land in the
//! SRAM.

use format_crt::CrtImage;

use crate::banked::BANK_8K;
use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::decoder::{BusRead, WriteTarget};
use crate::error::{AttachError, SnapshotError};
use crate::image::{BinaryLayout, CartRom, strip_load_address};
use crate::snapshot::SnapshotModule;

use super::{Capabilities, Driver, open_module, rom_write};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 2;

const IO_DISABLE: u8 = 0x08;
const RAM_WRITE: u8 = 0x10;
const RAM_SELECT: u8 = 0x20;

const MODE_16K: u8 = 0x00;
const MODE_8K: u8 = 0x40;
const MODE_ULTIMAX: u8 = 0x80;
const MODE_OFF: u8 = 0xc0;

/// Universal Cartridge. `cart_type` picks the register layout and sizes.
pub struct Universal {
    cart_type: CartridgeType,
    rom: CartRom,
    ram: Vec<u8>,
    bank_mask: u8,
    /// Bank register (UC-1.5/UC-2 $DE02).
    bank: u8,
    /// Control register (UC-1 $DE00, UC-1.5/UC-2 $DE03).
    control: u8,
}

impl Universal {
    fn max_banks(cart_type: CartridgeType) -> usize {
        if cart_type == CartridgeType::Uc1 { 8 } else { 32 }
    }

    fn ram_size(cart_type: CartridgeType) -> usize {
        if cart_type == CartridgeType::Uc1 {
            0x8000
        } else {
            0x8_0000
        }
    }

    pub fn from_binary(cart_type: CartridgeType, data: &[u8]) -> Result<Self, AttachError> {
        let max = Self::max_banks(cart_type) * 2 * BANK_8K;
        let valid = |len: usize| [max / 4, max / 2, max].contains(&len);
        let data = strip_load_address(data, valid);
        if !valid(data.len()) {
            return Err(AttachError::UnsupportedSize {
                cart_type,
                size: data.len(),
            });
        }
        let rom = CartRom::from_binary(cart_type, data, BinaryLayout::Pairs, max / (2 * BANK_8K))?;
        Ok(Self::with_rom(cart_type, rom))
    }

    pub fn from_crt(cart_type: CartridgeType, crt: &CrtImage) -> Result<Self, AttachError> {
        let rom = CartRom::from_crt(cart_type, crt, Self::max_banks(cart_type))?;
        Ok(Self::with_rom(cart_type, rom))
    }

    fn with_rom(cart_type: CartridgeType, mut rom: CartRom) -> Self {
        let banks = rom.banks().next_power_of_two().max(2);
        rom.ensure_banks(banks);
        Self {
            cart_type,
            rom,
            ram: vec![0xff; Self::ram_size(cart_type)],
            bank_mask: (banks - 1) as u8,
            bank: 0,
            control: 0,
        }
    }

    fn cmode(&self) -> u8 {
        self.control & 0xc0
    }

    fn current_bank(&self) -> usize {
        let bank = if self.cart_type == CartridgeType::Uc1 {
            self.control
        } else {
            self.bank
        };
        usize::from(bank & self.bank_mask)
    }

    fn ram_base(&self) -> usize {
        if self.cart_type == CartridgeType::Uc1 {
            (self.current_bank() & 1) << 14
        } else {
            usize::from(self.bank) << 14
        }
    }

    /// CPU writes reach the SRAM; the CPU map is a fake Ultimax.
    fn writes_ram(&self) -> bool {
        self.control & RAM_WRITE != 0 && self.cmode() != MODE_OFF
    }

    fn reads_ram(&self) -> bool {
        self.control & RAM_SELECT != 0
    }

    fn io_enabled(&self) -> bool {
        self.control & IO_DISABLE == 0
    }

    fn read_low(&self, addr: u16) -> Option<u8> {
        if self.reads_ram() {
            self.ram.get(self.ram_base() + usize::from(addr & 0x1fff)).copied()
        } else {
            self.rom.roml(self.current_bank(), addr)
        }
    }

    fn read_high(&self, addr: u16) -> Option<u8> {
        if self.reads_ram() {
            self.ram
                .get(self.ram_base() + 0x2000 + usize::from(addr & 0x1fff))
                .copied()
        } else {
            self.rom.romh(self.current_bank(), addr)
        }
    }

    fn write_low(&mut self, addr: u16, value: u8) {
        let i = self.ram_base() + usize::from(addr & 0x1fff);
        if let Some(byte) = self.ram.get_mut(i) {
            *byte = value;
        }
    }

    fn write_high(&mut self, addr: u16, value: u8) {
        let i = self.ram_base() + 0x2000 + usize::from(addr & 0x1fff);
        if let Some(byte) = self.ram.get_mut(i) {
            *byte = value;
        }
    }

    fn apply(&self, bus: &mut PortBus<'_>) {
        let mode = match self.cmode() {
            MODE_8K => Mode::Game8k,
            MODE_16K => Mode::Game16k,
            MODE_ULTIMAX => Mode::Ultimax,
            _ => Mode::Ram,
        };
        let mut flags = if self.writes_ram() {
            ConfigFlags::WRITE | ConfigFlags::EXPORT_RAM
        } else {
            ConfigFlags::READ
        };
        if self.reads_ram() {
            flags |= ConfigFlags::EXPORT_RAM;
        }
        let cpu_mode = if self.writes_ram() { Mode::Ultimax } else { mode };
        let bank = self.current_bank() as u16;
        bus.apply_configuration(mode, cpu_mode, bank, flags);
        log::trace!(
            "{}: bank {bank}, control ${:02X}, cpu {}",
            self.cart_type,
            self.control,
            cpu_mode.name()
        );
    }

    fn reset_registers(&mut self, bus: &mut PortBus<'_>) {
        self.bank = 0;
        self.control = 0;
        self.apply(bus);
    }
}

impl Driver for Universal {
    fn cart_type(&self) -> CartridgeType {
        self.cart_type
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ULTIMAX_PASSTHROUGH
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.reset_registers(bus);
    }

    fn powerup(&mut self, bus: &mut PortBus<'_>) {
        self.ram.fill(0xff);
        self.reset_registers(bus);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.read_low(addr)
    }

    /// $E000 belongs to the cartridge only in a real Ultimax map.
    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        if addr >= 0xe000 && self.cmode() != MODE_ULTIMAX {
            return None;
        }
        self.read_high(addr)
    }

    fn peek_io1(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        Some(match self.cart_type {
            CartridgeType::Uc1 => self.control,
            CartridgeType::Uc2 if self.io_enabled() => match addr & 3 {
                2 => self.bank,
                3 => self.control,
                _ => 0xff,
            },
            _ => 0xff,
        })
    }

    fn peek_ultimax(&self, addr: u16, _config: &BusConfiguration) -> BusRead {
        match addr {
            0xa000..=0xbfff => match self.cmode() {
                MODE_16K => BusRead::driven(self.read_high(addr)),
                MODE_8K => BusRead::Host,
                _ => BusRead::OpenBus,
            },
            _ if self.writes_ram() => BusRead::Host,
            _ => BusRead::OpenBus,
        }
    }

    /// Only the UC-2 drives its registers onto the bus.
    fn read_io1(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        if self.cart_type == CartridgeType::Uc2 && self.io_enabled() && addr & 2 != 0 {
            return self.peek_io1(addr, bus.config());
        }
        None
    }

    fn write_roml(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        if self.writes_ram() {
            self.write_low(addr, value);
            return WriteTarget::Device;
        }
        rom_write(bus.config())
    }

    fn write_romh(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        if addr >= 0xe000 && self.cmode() != MODE_ULTIMAX {
            return WriteTarget::Host;
        }
        if self.writes_ram() {
            self.write_high(addr, value);
            return WriteTarget::Device;
        }
        rom_write(bus.config())
    }

    fn write_io1(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        if !self.io_enabled() {
            return;
        }
        match (self.cart_type, addr & 3) {
            (CartridgeType::Uc1, _) => self.control = value,
            (_, 2) => self.bank = value & 0x1f,
            (_, 3) => self.control = value,
            _ => return,
        }
        self.apply(bus);
    }

    fn write_ultimax(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) -> WriteTarget {
        if !self.writes_ram() {
            return WriteTarget::Device;
        }
        match addr {
            0x6000..=0x7fff => {
                self.write_high(addr, value);
                WriteTarget::Both
            }
            0x4000..=0x5fff => {
                self.write_low(addr, value);
                WriteTarget::Both
            }
            0xa000..=0xbfff => {
                self.write_high(addr, value);
                WriteTarget::Device
            }
            _ => WriteTarget::Host,
        }
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(self.cart_type.snapshot_name(), SNAP_MAJOR, SNAP_MINOR);
        m.write_u8(self.bank);
        m.write_u8(self.control);
        m.write_u8(self.bank_mask);
        self.rom.write_snapshot(&mut m);
        m.write_bytes(&self.ram);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let bank = r.read_u8()? & 0x1f;
        let control = r.read_u8()?;
        let bank_mask = r.read_u8()?;
        let rom = CartRom::read_snapshot(&mut r)?;
        if usize::from(bank_mask) >= rom.banks() {
            return Err(r.rejected("bank mask exceeds ROM"));
        }
        let mut ram = vec![0; self.ram.len()];
        r.read_into(&mut ram)?;
        self.bank = bank;
        self.control = control;
        self.bank_mask = bank_mask;
        self.rom = rom;
        self.ram = ram;
        self.apply(bus);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carts::rig::Rig;

    /// 16K blocks whose low half holds `2n` and high half `2n + 1`.
    fn numbered(blocks: usize) -> Vec<u8> {
        (0..blocks * 2)
            .flat_map(|i| vec![i as u8; BANK_8K])
            .collect()
    }

    fn uc1() -> Universal {
        Universal::from_binary(CartridgeType::Uc1, &numbered(8)).expect("128K")
    }

    fn uc2() -> Universal {
        Universal::from_binary(CartridgeType::Uc2, &numbered(8)).expect("128K")
    }

    #[test]
    fn uc1_boots_16k_bank_0() {
        let mut cart = uc1();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(0));
        assert_eq!(cart.peek_romh(0xa000, &rig.config), Some(1));
    }

    #[test]
    fn uc1_register_selects_bank_and_mode() {
        let mut cart = uc1();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde80, MODE_8K | 3);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        assert_eq!(rig.config.bank(), 3);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(6));
        assert_eq!(rig.read_io1(&mut cart, 0xde00), None);
        assert_eq!(cart.peek_io1(0xde00, &rig.config), Some(MODE_8K | 3));
        rig.write_io1(&mut cart, 0xde00, MODE_OFF);
        assert_eq!(rig.config.mode(), Mode::Ram);
    }

    #[test]
    fn uc1_smaller_rom_masks_bank() {
        let mut cart = Universal::from_binary(CartridgeType::Uc1, &numbered(2)).expect("32K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde00, 3);
        assert_eq!(rig.config.bank(), 1);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(2));
    }

    #[test]
    fn wrong_size_is_rejected() {
        assert!(matches!(
            Universal::from_binary(CartridgeType::Uc1, &numbered(3)),
            Err(AttachError::UnsupportedSize { .. })
        ));
    }

    #[test]
    fn io_disable_hides_register_until_reset() {
        let mut cart = uc1();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde00, IO_DISABLE | 2);
        rig.write_io1(&mut cart, 0xde00, 5);
        assert_eq!(rig.config.bank(), 2);
        let mut bus = rig.bus(&cart);
        cart.config_reset(&mut bus);
        rig.write_io1(&mut cart, 0xde00, 5);
        assert_eq!(rig.config.bank(), 5);
    }

    #[test]
    fn writable_sram_gives_cpu_fake_ultimax() {
        let mut cart = uc1();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde00, MODE_16K | RAM_WRITE | RAM_SELECT);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert_eq!(rig.config.mode_phi1(), Mode::Game16k);

        let mut bus = rig.bus(&cart);
        assert_eq!(cart.write_roml(0x8010, 0x42, &mut bus), WriteTarget::Device);
        assert_eq!(cart.write_ultimax(0x6020, 0x43, &mut bus), WriteTarget::Both);
        assert_eq!(cart.write_ultimax(0x4030, 0x44, &mut bus), WriteTarget::Both);
        assert_eq!(cart.write_ultimax(0x2000, 0x45, &mut bus), WriteTarget::Host);
        assert_eq!(cart.peek_roml(0x8010, &rig.config), Some(0x42));
        assert_eq!(cart.peek_roml(0x8030, &rig.config), Some(0x44));
        assert_eq!(
            cart.peek_ultimax(0xa020, &rig.config),
            BusRead::Data(0x43)
        );
        assert_eq!(cart.peek_ultimax(0x1000, &rig.config), BusRead::Host);
        assert_eq!(cart.peek_romh(0xe000, &rig.config), None);
    }

    #[test]
    fn uc1_ram_follows_bank_bit_0() {
        let mut cart = uc1();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde00, RAM_WRITE | RAM_SELECT | 1);
        let mut bus = rig.bus(&cart);
        cart.write_roml(0x8000, 0x11, &mut bus);
        rig.write_io1(&mut cart, 0xde00, RAM_SELECT | 2);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(0xff));
        rig.write_io1(&mut cart, 0xde00, RAM_SELECT | 3);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(0x11));
    }

    #[test]
    fn uc2_split_registers_are_readable() {
        let mut cart = uc2();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde02, 5);
        rig.write_io1(&mut cart, 0xde03, MODE_ULTIMAX);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert_eq!(rig.config.bank(), 5);
        assert_eq!(cart.peek_romh(0xe000, &rig.config), Some(11));
        assert_eq!(rig.read_io1(&mut cart, 0xde02), Some(5));
        assert_eq!(rig.read_io1(&mut cart, 0xde03), Some(MODE_ULTIMAX));
        assert_eq!(rig.read_io1(&mut cart, 0xde00), None);
    }

    #[test]
    fn uc15_registers_read_back_ff() {
        let mut cart = Universal::from_binary(CartridgeType::Uc15, &numbered(8)).expect("128K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde02, 1);
        assert_eq!(rig.config.bank(), 1);
        assert_eq!(rig.read_io1(&mut cart, 0xde02), None);
        assert_eq!(cart.peek_io1(0xde02, &rig.config), Some(0xff));
    }

    #[test]
    fn uc2_ram_bank_is_register_a() {
        let mut cart = uc2();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde02, 0x1f);
        rig.write_io1(&mut cart, 0xde03, RAM_WRITE | RAM_SELECT);
        let mut bus = rig.bus(&cart);
        cart.write_roml(0x9fff, 0x77, &mut bus);
        assert_eq!(cart.ram[0x1f << 14 | 0x1fff], 0x77);
    }

    #[test]
    fn powerup_clears_sram() {
        let mut cart = uc1();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde00, RAM_WRITE | RAM_SELECT);
        let mut bus = rig.bus(&cart);
        cart.write_roml(0x8000, 0x00, &mut bus);
        cart.powerup(&mut bus);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        assert!(cart.ram.iter().all(|&b| b == 0xff));
    }

    #[test]
    fn snapshot_round_trip() {
        let mut cart = uc2();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde02, 3);
        rig.write_io1(&mut cart, 0xde03, MODE_16K | RAM_WRITE);
        let mut bus = rig.bus(&cart);
        cart.write_ultimax(0x4001, 0x5a, &mut bus);
        let mut restored =
            Universal::from_binary(CartridgeType::Uc2, &vec![0; 0x2_0000]).expect("128K");
        rig.round_trip(&cart, &mut restored);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert_eq!(rig.config.mode_phi1(), Mode::Game16k);
        assert_eq!(restored.peek_roml(0x8000, &rig.config), Some(6));
        assert_eq!(restored.ram[3 << 14 | 1], 0x5a);
    }

    #[test]
    fn truncated_snapshot_leaves_state_untouched() {
        let mut cart = uc1();
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde00, MODE_8K | 4);
        let mut module = cart.snapshot_write();
        module.data.truncate(40);
        let mut bus = rig.bus(&cart);
        assert!(cart.snapshot_read(&module, &mut bus).is_err());
        assert_eq!(cart.control, MODE_8K | 4);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(8));
    }
}
