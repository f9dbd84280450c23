//! Action Replay V5/V6 and its Atomic Power clone.
//!
//! 32K of ROM in four 8K banks, 8K of RAM. One write-only register at
//! $DE00:
//!
//! | Bit | Meaning                                     |
//! |-----|---------------------------------------------|
//! | 0   | GAME (1 = asserted)                         |
//! | 1   | EXROM (1 = inactive)                        |
//! | 2   | disable the cartridge until reset           |
//! | 3-4 | ROM bank                                    |
//! | 5   | RAM replaces ROM at $8000 and $DF00         |
//! | 6   | release the freeze                          |
//!
//! $DF00-$DFFF shows the last page of the selected 8K, ROM or RAM. The
//! same bank appears at $A000 and $E000.
//!
//! Atomic Power decodes one more combination: `$22` with bit 2 clear
//! puts RAM at $A000 in Ultimax.

use format_crt::CrtImage;

use crate::banked::BANK_8K;
use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::decoder::{BusRead, WriteTarget};
use crate::error::{AttachError, SnapshotError};
use crate::image::{BinaryLayout, CartRom};
use crate::snapshot::SnapshotModule;

use super::{Capabilities, Driver, open_module};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

const BANKS: usize = 4;

pub struct ActionReplay {
    cart_type: CartridgeType,
    rom: CartRom,
    ram: Vec<u8>,
    register: u8,
    active: bool,
    export_ram: bool,
    ram_at_a000: bool,
}

impl ActionReplay {
    pub fn from_binary(cart_type: CartridgeType, data: &[u8]) -> Result<Self, AttachError> {
        let rom = CartRom::from_binary(cart_type, data, BinaryLayout::Roml, BANKS)?;
        Ok(Self::with_rom(cart_type, rom))
    }

    pub fn from_crt(cart_type: CartridgeType, crt: &CrtImage) -> Result<Self, AttachError> {
        let rom = CartRom::from_crt(cart_type, crt, BANKS)?;
        Ok(Self::with_rom(cart_type, rom))
    }

    fn with_rom(cart_type: CartridgeType, mut rom: CartRom) -> Self {
        rom.ensure_banks(BANKS);
        Self {
            cart_type,
            rom,
            ram: vec![0; BANK_8K],
            register: 0,
            active: true,
            export_ram: false,
            ram_at_a000: false,
        }
    }

    fn bank(&self) -> usize {
        ((self.register >> 3) & 3) as usize
    }

    fn is_atomic_power(&self) -> bool {
        self.cart_type == CartridgeType::AtomicPower
    }

    fn decode(&mut self, register: u8) {
        self.register = register;
        self.export_ram = register & 0x20 != 0;
        self.ram_at_a000 = self.is_atomic_power() && register & 0xe7 == 0x22;
    }

    fn apply(&self, bus: &mut PortBus<'_>, mut flags: ConfigFlags) {
        let mode = if self.ram_at_a000 {
            Mode::Ultimax
        } else {
            Mode::from_bits(self.register & 3)
        };
        if self.export_ram {
            flags |= ConfigFlags::EXPORT_RAM;
        }
        bus.set_mode(mode, self.bank() as u16, flags);
    }

    fn latch(&mut self, value: u8, bus: &mut PortBus<'_>) {
        self.decode(value);
        let mut flags = ConfigFlags::WRITE;
        if value & 0x40 != 0 {
            flags |= ConfigFlags::RELEASE_FREEZE;
        }
        self.apply(bus, flags);

        if value & 0x04 != 0 {
            self.active = false;
            log::debug!("{}: disabled until reset", self.cart_type);
        }
    }
}

impl Driver for ActionReplay {
    fn cart_type(&self) -> CartridgeType {
        self.cart_type
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FREEZER
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.active = true;
        self.decode(0);
        self.apply(bus, ConfigFlags::READ);
    }

    fn powerup(&mut self, bus: &mut PortBus<'_>) {
        self.ram.fill(0);
        self.config_init(bus);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        if self.export_ram {
            Some(self.ram[(addr & 0x1fff) as usize])
        } else {
            self.rom.roml(self.bank(), addr)
        }
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(self.bank(), addr)
    }

    fn peek_io2(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        if !self.active {
            return None;
        }
        let offset = 0x1f00 | (addr & 0xff);
        if self.export_ram {
            Some(self.ram[offset as usize])
        } else {
            self.rom.roml(self.bank(), offset)
        }
    }

    fn peek_ultimax(&self, addr: u16, _config: &BusConfiguration) -> BusRead {
        if self.ram_at_a000 && (0xa000..0xc000).contains(&addr) {
            BusRead::Data(self.ram[(addr & 0x1fff) as usize])
        } else {
            BusRead::OpenBus
        }
    }

    fn write_roml(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        if !self.export_ram {
            return super::rom_write(bus.config());
        }
        self.ram[(addr & 0x1fff) as usize] = value;
        if bus.config().mode() == Mode::Ultimax {
            WriteTarget::Device
        } else {
            WriteTarget::Both
        }
    }

    fn write_ultimax(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) -> WriteTarget {
        if self.ram_at_a000 && (0xa000..0xc000).contains(&addr) {
            self.ram[(addr & 0x1fff) as usize] = value;
        }
        WriteTarget::Device
    }

    fn write_io1(&mut self, _addr: u16, value: u8, bus: &mut PortBus<'_>) {
        if self.active {
            self.latch(value, bus);
        }
    }

    fn write_io2(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) {
        if self.active && self.export_ram {
            self.ram[(0x1f00 | (addr & 0xff)) as usize] = value;
        }
    }

    fn freeze_allowed(&self) -> bool {
        true
    }

    fn freeze(&mut self, bus: &mut PortBus<'_>) {
        self.active = true;
        self.decode(Mode::Ultimax.bits());
        self.apply(bus, ConfigFlags::READ);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(self.cart_type.snapshot_name(), SNAP_MAJOR, SNAP_MINOR);
        m.write_u8(self.register);
        m.write_bool(self.active);
        m.write_bytes(&self.ram);
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
        let active = r.read_bool()?;
        let mut ram = vec![0; self.ram.len()];
        r.read_into(&mut ram)?;
        let mut rom = CartRom::read_snapshot(&mut r)?;
        rom.ensure_banks(BANKS);
        self.ram = ram;
        self.rom = rom;

        self.decode(register);
        self.active = active;
        self.apply(bus, ConfigFlags::READ);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carts::rig::Rig;
    use crate::freeze::FreezeState;

    fn cart(cart_type: CartridgeType) -> ActionReplay {
        let data: Vec<u8> = (0..BANKS).flat_map(|b| vec![0x10 + b as u8; BANK_8K]).collect();
        ActionReplay::from_binary(cart_type, &data).expect("32K")
    }

    #[test]
    fn register_selects_mode_and_bank() {
        let mut ar = cart(CartridgeType::ActionReplay);
        let mut rig = Rig::new();
        rig.init(&mut ar);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        rig.write_io1(&mut ar, 0xde00, 0x19);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        assert_eq!(ar.peek_roml(0x8000, &rig.config), Some(0x13));
        assert_eq!(ar.peek_romh(0xa000, &rig.config), Some(0x13));
        assert_eq!(rig.read_io2(&mut ar, 0xdf00), Some(0x13));
    }

    #[test]
    fn export_ram_replaces_roml_and_io2() {
        let mut ar = cart(CartridgeType::ActionReplay);
        let mut rig = Rig::new();
        rig.init(&mut ar);
        rig.write_io1(&mut ar, 0xde00, 0x20);
        assert!(rig.config.export_ram());
        let mut bus = rig.bus(&ar);
        assert_eq!(ar.write_roml(0x9f05, 0x5a, &mut bus), WriteTarget::Both);
        assert_eq!(ar.peek_roml(0x9f05, &rig.config), Some(0x5a));
        assert_eq!(rig.read_io2(&mut ar, 0xdf05), Some(0x5a));
    }

    #[test]
    fn disable_bit_ignores_further_writes() {
        let mut ar = cart(CartridgeType::ActionReplay);
        let mut rig = Rig::new();
        rig.init(&mut ar);
        rig.write_io1(&mut ar, 0xde00, 0x06);
        assert_eq!(rig.config.mode(), Mode::Ram);
        rig.write_io1(&mut ar, 0xde00, 0x01);
        assert_eq!(rig.config.mode(), Mode::Ram);
        assert_eq!(rig.read_io2(&mut ar, 0xdf00), None);
        rig.init(&mut ar);
        assert_eq!(rig.config.mode(), Mode::Game8k);
    }

    #[test]
    fn freeze_and_release() {
        let mut ar = cart(CartridgeType::ActionReplay);
        let mut rig = Rig::new();
        rig.init(&mut ar);
        rig.write_io1(&mut ar, 0xde00, 0x18);
        rig.freeze(&mut ar);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert_eq!(ar.peek_romh(0xe000, &rig.config), Some(0x10));
        rig.write_io1(&mut ar, 0xde00, 0x40);
        assert!(!rig.host.nmi);
        assert_eq!(rig.freeze, FreezeState::Idle);
        assert_eq!(rig.config.mode(), Mode::Game8k);
    }

    #[test]
    fn atomic_power_ram_at_a000() {
        let mut ap = cart(CartridgeType::AtomicPower);
        let mut rig = Rig::new();
        rig.init(&mut ap);
        rig.write_io1(&mut ap, 0xde00, 0x22);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        let mut bus = rig.bus(&ap);
        ap.write_ultimax(0xa010, 0x77, &mut bus);
        assert_eq!(ap.peek_ultimax(0xa010, &rig.config), BusRead::Data(0x77));
        assert_eq!(ap.peek_ultimax(0x2000, &rig.config), BusRead::OpenBus);

        let mut ar = cart(CartridgeType::ActionReplay);
        rig.init(&mut ar);
        rig.write_io1(&mut ar, 0xde00, 0x22);
        assert_eq!(rig.config.mode(), Mode::Ram);
    }

    #[test]
    fn snapshot_restores_register_and_ram() {
        let mut ar = cart(CartridgeType::ActionReplay);
        let mut rig = Rig::new();
        rig.init(&mut ar);
        rig.write_io1(&mut ar, 0xde00, 0x29);
        rig.write_io2(&mut ar, 0xdf10, 0x42);
        let mut restored = cart(CartridgeType::ActionReplay);
        rig.round_trip(&ar, &mut restored);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        assert_eq!(rig.config.bank(), 1);
        assert_eq!(restored.peek_io2(0xdf10, &rig.config), Some(0x42));
    }
}
