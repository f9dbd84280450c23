//! Cartridges whose ROM reads have side effects.

use format_crt::CrtImage;

use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::error::{AttachError, SnapshotError};
use crate::image::{BinaryLayout, CartRom, strip_load_address};
use crate::snapshot::SnapshotModule;

use super::{Driver, open_module};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

/// Zaxxon / Super Zaxxon.
///
/// A 4K ROM mirrored across $8000-$9FFF, and two 8K ROMH banks. Reading
/// ROML latches A12 as the ROMH bank.
pub struct Zaxxon {
    rom: CartRom,
    romh_bank: u8,
}

impl Zaxxon {
    /// 4K + 2x8K, or with the ROML part padded to 8K.
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        let data = strip_load_address(data, |len| matches!(len, 0x5000 | 0x6000));
        let lo_len = match data.len() {
            0x5000 => 0x1000,
            0x6000 => 0x2000,
            size => {
                return Err(AttachError::UnsupportedSize {
                    cart_type: CartridgeType::Zaxxon,
                    size,
                });
            }
        };
        let mut rom = CartRom::blank(2);
        let (lo, hi) = data.split_at(lo_len);
        rom.roml.load(0, 0, &lo[..0x1000]);
        for (bank, chunk) in hi.chunks(0x2000).enumerate() {
            rom.romh.load(bank, 0, chunk);
        }
        Ok(Self { rom, romh_bank: 0 })
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        let mut rom = CartRom::from_crt(CartridgeType::Zaxxon, crt, 2)?;
        rom.ensure_banks(2);
        Ok(Self { rom, romh_bank: 0 })
    }
}

impl Driver for Zaxxon {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Zaxxon
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.romh_bank = 0;
        bus.set_mode(Mode::Game16k, 0, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(0, addr & 0x0fff)
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.romh(self.romh_bank as usize, addr)
    }

    fn read_roml(&mut self, addr: u16, _bus: &mut PortBus<'_>) -> Option<u8> {
        self.romh_bank = u8::from(addr & 0x1000 != 0);
        self.rom.roml(0, addr & 0x0fff)
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Zaxxon.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.romh_bank);
        self.rom.write_snapshot(&mut m);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let romh_bank = r.read_u8()? & 1;
        self.rom = CartRom::read_snapshot(&mut r)?;
        self.romh_bank = romh_bank;
        bus.set_mode(Mode::Game16k, 0, ConfigFlags::READ);
        Ok(())
    }
}

/// Ticks a full charge keeps the Epyx ROM visible.
pub const EPYX_CAPACITOR_TICKS: u32 = 512;

/// Epyx FastLoad.
///
/// A capacitor holds EXROM asserted. Reading ROML or $DF00-$DFFF charges
/// it; left alone it drains and the cartridge drops out of the map until
/// the next access.
pub struct EpyxFastload {
    rom: CartRom,
    capacitor: u32,
}

impl EpyxFastload {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        Ok(Self {
            rom: CartRom::from_binary(CartridgeType::EpyxFastload, data, BinaryLayout::Roml, 1)?,
            capacitor: EPYX_CAPACITOR_TICKS,
        })
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self {
            rom: CartRom::from_crt(CartridgeType::EpyxFastload, crt, 1)?,
            capacitor: EPYX_CAPACITOR_TICKS,
        })
    }

    fn charge(&mut self, bus: &mut PortBus<'_>) {
        if self.capacitor == 0 {
            bus.set_mode(Mode::Game8k, 0, ConfigFlags::READ);
        }
        self.capacitor = EPYX_CAPACITOR_TICKS;
    }

    #[must_use]
    pub fn capacitor(&self) -> u32 {
        self.capacitor
    }
}

impl Driver for EpyxFastload {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::EpyxFastload
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.capacitor = EPYX_CAPACITOR_TICKS;
        bus.set_mode(Mode::Game8k, 0, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(0, addr)
    }

    fn peek_io2(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(0, 0x1f00 | (addr & 0xff))
    }

    fn read_roml(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.charge(bus);
        self.rom.roml(0, addr)
    }

    fn read_io2(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.charge(bus);
        self.peek_io2(addr, bus.config())
    }

    fn tick(&mut self, bus: &mut PortBus<'_>) {
        if self.capacitor > 0 {
            self.capacitor -= 1;
            if self.capacitor == 0 {
                bus.set_mode(Mode::Ram, 0, ConfigFlags::READ);
            }
        }
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::EpyxFastload.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u32(self.capacitor);
        self.rom.write_snapshot(&mut m);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let capacitor = r.read_u32()?.min(EPYX_CAPACITOR_TICKS);
        self.rom = CartRom::read_snapshot(&mut r)?;
        self.capacitor = capacitor;
        let mode = if self.capacitor == 0 {
            Mode::Ram
        } else {
            Mode::Game8k
        };
        bus.set_mode(mode, 0, ConfigFlags::READ);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banked::BANK_8K;
    use crate::carts::rig::Rig;

    #[test]
    fn zaxxon_a12_selects_romh_bank() {
        let mut data = vec![0x10; 0x1000];
        data.extend(vec![0x20; BANK_8K]);
        data.extend(vec![0x21; BANK_8K]);
        let mut cart = Zaxxon::from_binary(&data).expect("20K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        let mut bus = rig.bus(&cart);
        assert_eq!(cart.read_roml(0x9000, &mut bus), Some(0x10));
        assert_eq!(cart.peek_romh(0xa000, &rig.config), Some(0x21));
        let mut bus = rig.bus(&cart);
        cart.read_roml(0x8123, &mut bus);
        assert_eq!(cart.peek_romh(0xa000, &rig.config), Some(0x20));
    }

    #[test]
    fn epyx_drains_and_recharges() {
        let mut cart = EpyxFastload::from_binary(&vec![0xea; BANK_8K]).expect("8K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        for _ in 0..EPYX_CAPACITOR_TICKS - 1 {
            let mut bus = rig.bus(&cart);
            cart.tick(&mut bus);
        }
        assert_eq!(rig.config.mode(), Mode::Game8k);
        let mut bus = rig.bus(&cart);
        cart.tick(&mut bus);
        assert_eq!(rig.config.mode(), Mode::Ram);

        assert_eq!(rig.read_io2(&mut cart, 0xdf00), Some(0xea));
        assert_eq!(rig.config.mode(), Mode::Game8k);
        assert_eq!(cart.capacitor(), EPYX_CAPACITOR_TICKS);
    }

    #[test]
    fn zaxxon_snapshot_keeps_latched_bank() {
        let mut data = vec![0x10; 0x1000];
        data.extend(vec![0x20; BANK_8K]);
        data.extend(vec![0x21; BANK_8K]);
        let mut cart = Zaxxon::from_binary(&data).expect("20K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        let mut bus = rig.bus(&cart);
        cart.read_roml(0x9000, &mut bus);
        let mut restored = Zaxxon::from_binary(&vec![0; 0x5000]).expect("20K");
        rig.round_trip(&cart, &mut restored);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        assert_eq!(restored.peek_romh(0xa000, &rig.config), Some(0x21));
        assert_eq!(restored.peek_roml(0x9000, &rig.config), Some(0x10));
    }

    #[test]
    fn epyx_snapshot_keeps_capacitor() {
        let mut cart = EpyxFastload::from_binary(&vec![0xea; BANK_8K]).expect("8K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        for _ in 0..100 {
            let mut bus = rig.bus(&cart);
            cart.tick(&mut bus);
        }
        let mut restored = EpyxFastload::from_binary(&vec![0; BANK_8K]).expect("8K");
        rig.round_trip(&cart, &mut restored);
        assert_eq!(restored.capacitor(), EPYX_CAPACITOR_TICKS - 100);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        assert_eq!(restored.peek_roml(0x8000, &rig.config), Some(0xea));
    }

    #[test]
    fn epyx_snapshot_of_drained_cart_stays_off() {
        let mut cart = EpyxFastload::from_binary(&vec![0xea; BANK_8K]).expect("8K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        for _ in 0..EPYX_CAPACITOR_TICKS {
            let mut bus = rig.bus(&cart);
            cart.tick(&mut bus);
        }
        let mut restored = EpyxFastload::from_binary(&vec![0xea; BANK_8K]).expect("8K");
        rig.round_trip(&cart, &mut restored);
        assert_eq!(restored.capacitor(), 0);
        assert_eq!(rig.config.mode(), Mode::Ram);
    }
}
