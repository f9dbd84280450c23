//! KCS Power Cartridge.
//!
//! 16K of ROM and 128 bytes of RAM at $DF00-$DF7F. Any $DE00 access
//! switches mode: reads pick 8K (A1 clear) or off (A1 set), writes pick
//! 16K. $DF80-$DFFF reads back the EXROM line in bit 7.

use format_crt::CrtImage;

use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::error::{AttachError, SnapshotError};
use crate::image::{BinaryLayout, CartRom};
use crate::snapshot::SnapshotModule;

use super::{Capabilities, Driver, open_module};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

pub struct KcsPower {
    rom: CartRom,
    ram: [u8; 128],
    mode: Mode,
}

impl KcsPower {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        let rom = CartRom::from_binary(CartridgeType::KcsPower, data, BinaryLayout::Pairs, 1)?;
        Ok(Self::with_rom(rom))
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self::with_rom(CartRom::from_crt(CartridgeType::KcsPower, crt, 1)?))
    }

    fn with_rom(rom: CartRom) -> Self {
        Self {
            rom,
            ram: [0; 128],
            mode: Mode::Game16k,
        }
    }

    fn set(&mut self, mode: Mode, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        self.mode = mode;
        bus.set_mode(mode, 0, flags);
    }
}

impl Driver for KcsPower {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::KcsPower
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

    fn peek_io2(&self, addr: u16, config: &BusConfiguration) -> Option<u8> {
        if addr & 0x80 == 0 {
            Some(self.ram[(addr & 0x7f) as usize])
        } else {
            Some(u8::from(!config.exrom()) << 7)
        }
    }

    fn read_io1(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        let mode = if addr & 0x02 != 0 {
            Mode::Ram
        } else {
            Mode::Game8k
        };
        self.set(mode, bus, ConfigFlags::RELEASE_FREEZE);
        self.peek_io1(addr, bus.config())
    }

    fn write_io1(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.set(
            Mode::Game16k,
            bus,
            ConfigFlags::WRITE | ConfigFlags::RELEASE_FREEZE,
        );
    }

    fn write_io2(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) {
        if addr & 0x80 == 0 {
            self.ram[(addr & 0x7f) as usize] = value;
        }
    }

    fn freeze_allowed(&self) -> bool {
        true
    }

    fn freeze(&mut self, bus: &mut PortBus<'_>) {
        self.set(Mode::Ultimax, bus, ConfigFlags::READ);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::KcsPower.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.mode.bits());
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
        let mode = Mode::from_bits(r.read_u8()?);
        let mut ram = [0; 128];
        r.read_into(&mut ram)?;
        self.rom = CartRom::read_snapshot(&mut r)?;
        self.ram = ram;
        self.set(mode, bus, ConfigFlags::READ);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banked::BANK_8K;
    use crate::carts::rig::Rig;
    use crate::freeze::FreezeState;

    fn cart() -> KcsPower {
        let mut data = vec![0x4b; BANK_8K];
        data[0x1e07] = 0x99;
        data.extend(vec![0x53; BANK_8K]);
        KcsPower::from_binary(&data).expect("16K")
    }

    #[test]
    fn io1_accesses_switch_mode() {
        let mut kcs = cart();
        let mut rig = Rig::new();
        rig.init(&mut kcs);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        assert_eq!(rig.read_io1(&mut kcs, 0xde07), Some(0x4b));
        assert_eq!(rig.config.mode(), Mode::Ram);
        assert_eq!(rig.read_io1(&mut kcs, 0xde05), Some(0x4b));
        assert_eq!(rig.config.mode(), Mode::Game8k);
        rig.write_io1(&mut kcs, 0xde00, 0);
        assert_eq!(rig.config.mode(), Mode::Game16k);
    }

    #[test]
    fn io1_mirrors_rom() {
        let mut kcs = cart();
        let mut rig = Rig::new();
        assert_eq!(kcs.peek_io1(0xde07, &rig.config), Some(0x99));
        assert_eq!(rig.read_io1(&mut kcs, 0xde07), Some(0x99));
        assert_eq!(kcs.peek_io1(0xde07, &rig.config), Some(0x99));
    }

    #[test]
    fn ram_and_status_in_io2() {
        let mut kcs = cart();
        let mut rig = Rig::new();
        rig.init(&mut kcs);
        rig.write_io2(&mut kcs, 0xdf12, 0xab);
        assert_eq!(rig.read_io2(&mut kcs, 0xdf12), Some(0xab));
        assert_eq!(rig.read_io2(&mut kcs, 0xdf92), Some(0x00));
        rig.freeze(&mut kcs);
        assert_eq!(rig.read_io2(&mut kcs, 0xdf80), Some(0x80));
    }

    #[test]
    fn freeze_until_io1_access() {
        let mut kcs = cart();
        let mut rig = Rig::new();
        rig.init(&mut kcs);
        rig.freeze(&mut kcs);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert!(rig.host.nmi);
        rig.read_io1(&mut kcs, 0xde00);
        assert_eq!(rig.freeze, FreezeState::Idle);
        assert!(!rig.host.nmi);
        assert_eq!(rig.config.mode(), Mode::Game8k);
    }

    #[test]
    fn snapshot_keeps_ram_and_frozen_mode() {
        let mut kcs = cart();
        let mut rig = Rig::new();
        rig.init(&mut kcs);
        rig.write_io2(&mut kcs, 0xdf12, 0xab);
        rig.freeze(&mut kcs);
        let mut restored = KcsPower::from_binary(&vec![0; 2 * BANK_8K]).expect("16K");
        rig.round_trip(&kcs, &mut restored);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert_eq!(restored.peek_io2(0xdf12, &rig.config), Some(0xab));
        assert_eq!(restored.peek_io1(0xde07, &rig.config), Some(0x99));
        assert_eq!(restored.peek_romh(0xe000, &rig.config), Some(0x53));
    }
}
