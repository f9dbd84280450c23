//! RamCart.
//!
//! 64K or 128K of RAM paged through $DF00-$DFFF. Two registers at $DE00
//! and $DE01 (mirrored through the page) pick the page:
//!
//! - $DE00: page number, low eight bits.
//! - $DE01: bit 0 is page bit 8 on the 128K model; bit 7 set hides the
//!   cartridge.
//!
//! While not hidden the cartridge sits in 8K mode with the current page
//! also visible at $8000-$80FF, which is how its loader boots. The rest
//! of $8000-$9FFF shows host RAM. A read-only switch blocks writes to
//! the window.

use std::path::PathBuf;

use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::config::RamCartConfig;
use crate::decoder::WriteTarget;
use crate::error::{AttachError, SnapshotError};
use crate::snapshot::SnapshotModule;

use super::{Capabilities, Driver, load_companion, open_module, write_back};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

pub struct RamCart {
    ram: Vec<u8>,
    registers: [u8; 2],
    read_only: bool,
    write_back: bool,
    path: Option<PathBuf>,
}

impl RamCart {
    pub fn new(config: &RamCartConfig) -> Result<Self, AttachError> {
        let mut cart = Self::sized(config, config.image.clone())?;
        if let Some(path) = &config.image {
            load_companion(CartridgeType::RamCart, path, &mut cart.ram)?;
        }
        Ok(cart)
    }

    /// RAM contents from a raw 64K or 128K image.
    pub fn from_binary(
        data: &[u8],
        config: &RamCartConfig,
        path: Option<PathBuf>,
    ) -> Result<Self, AttachError> {
        let size_kb = match data.len() {
            0x10000 => 64,
            0x20000 => 128,
            size => {
                return Err(AttachError::UnsupportedSize {
                    cart_type: CartridgeType::RamCart,
                    size,
                });
            }
        };
        let sized = RamCartConfig {
            size_kb,
            ..config.clone()
        };
        let mut cart = Self::sized(&sized, path)?;
        cart.ram.copy_from_slice(data);
        Ok(cart)
    }

    fn sized(config: &RamCartConfig, path: Option<PathBuf>) -> Result<Self, AttachError> {
        if !matches!(config.size_kb, 64 | 128) {
            return Err(AttachError::UnsupportedSize {
                cart_type: CartridgeType::RamCart,
                size: config.size_kb as usize * 1024,
            });
        }
        Ok(Self {
            ram: vec![0; config.size_kb as usize * 1024],
            registers: [0; 2],
            read_only: config.read_only,
            write_back: config.write_back,
            path,
        })
    }

    #[must_use]
    pub fn backing_path(&self) -> Option<PathBuf> {
        self.path.clone().filter(|_| self.write_back)
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn hidden(&self) -> bool {
        self.registers[1] & 0x80 != 0
    }

    fn window(&self, addr: u16) -> usize {
        let page = usize::from(self.registers[0]) | (usize::from(self.registers[1] & 1) << 8);
        (page * 0x100 + usize::from(addr & 0xff)) % self.ram.len()
    }

    fn apply(&self, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        if self.hidden() {
            bus.pass_through(flags);
        } else {
            bus.set_mode(Mode::Game8k, 0, flags);
        }
    }
}

impl Driver for RamCart {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::RamCart
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ROM_PASSTHROUGH
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.registers = [0; 2];
        self.apply(bus, ConfigFlags::READ);
    }

    fn powerup(&mut self, bus: &mut PortBus<'_>) {
        if self.path.is_none() {
            self.ram.fill(0);
        }
        self.config_init(bus);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        (addr & 0x1f00 == 0).then(|| self.ram[self.window(addr)])
    }

    fn peek_io1(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        Some(self.registers[usize::from(addr & 1)])
    }

    fn peek_io2(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        Some(self.ram[self.window(addr)])
    }

    fn write_roml(&mut self, _addr: u16, _value: u8, _bus: &mut PortBus<'_>) -> WriteTarget {
        WriteTarget::Host
    }

    fn write_io1(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        if addr & 1 == 0 {
            self.registers[0] = value;
        } else {
            let page_high = if self.ram.len() > 0x10000 { 0x81 } else { 0x80 };
            self.registers[1] = value & page_high;
        }
        self.apply(bus, ConfigFlags::WRITE);
    }

    fn write_io2(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) {
        if !self.read_only {
            let i = self.window(addr);
            self.ram[i] = value;
        }
    }

    fn detach(&mut self) {
        if let Some(path) = self.backing_path() {
            write_back(CartridgeType::RamCart, &path, &self.ram);
        }
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::RamCart.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_bytes(&self.registers);
        m.write_bool(self.read_only);
        m.write_block(&self.ram);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let mut registers = [0; 2];
        r.read_into(&mut registers)?;
        let read_only = r.read_bool()?;
        let ram = r.read_block()?;
        if !matches!(ram.len(), 0x10000 | 0x20000) {
            return Err(r.rejected("RAM size is not 64K or 128K"));
        }
        self.registers = registers;
        self.read_only = read_only;
        self.ram = ram;
        self.apply(bus, ConfigFlags::READ);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::carts::rig::Rig;

    fn ramcart(size_kb: u32) -> RamCart {
        RamCart::new(&RamCartConfig {
            size_kb,
            ..RamCartConfig::default()
        })
        .expect("valid size")
    }

    #[test]
    fn boots_in_8k_with_page_at_8000() {
        let mut cart = ramcart(128);
        let mut rig = Rig::new();
        rig.init(&mut cart);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        rig.write_io2(&mut cart, 0xdf20, 0x4c);
        assert_eq!(cart.peek_roml(0x8020, &rig.config), Some(0x4c));
        assert_eq!(cart.peek_roml(0x8120, &rig.config), None);
        assert!(cart.capabilities().contains(Capabilities::ROM_PASSTHROUGH));
    }

    #[test]
    fn page_registers() {
        let mut cart = ramcart(128);
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io1(&mut cart, 0xde00, 0x12);
        rig.write_io1(&mut cart, 0xde01, 0xff);
        assert_eq!(rig.read_io1(&mut cart, 0xde01), Some(0x81));
        assert_eq!(rig.config.owner(), None);
        rig.write_io1(&mut cart, 0xde03, 0x01);
        rig.write_io2(&mut cart, 0xdf05, 0x77);
        assert_eq!(cart.ram[0x11205], 0x77);
        assert_eq!(rig.config.mode(), Mode::Game8k);
    }

    #[test]
    fn small_model_ignores_page_bit_8() {
        let mut cart = ramcart(64);
        let mut rig = Rig::new();
        rig.write_io1(&mut cart, 0xde01, 0x01);
        assert_eq!(cart.peek_io1(0xde01, &rig.config), Some(0));
    }

    #[test]
    fn read_only_switch_blocks_window_writes() {
        let mut cart = RamCart::new(&RamCartConfig {
            read_only: true,
            ..RamCartConfig::default()
        })
        .expect("128K");
        let mut rig = Rig::new();
        rig.write_io2(&mut cart, 0xdf00, 0x99);
        assert_eq!(rig.read_io2(&mut cart, 0xdf00), Some(0));
        cart.set_read_only(false);
        rig.write_io2(&mut cart, 0xdf00, 0x99);
        assert_eq!(rig.read_io2(&mut cart, 0xdf00), Some(0x99));
    }

    #[test]
    fn binary_size_picks_model() {
        assert!(RamCart::from_binary(&[0; 0x8000], &RamCartConfig::default(), None).is_err());
        let cart = RamCart::from_binary(&[1; 0x10000], &RamCartConfig::default(), None)
            .expect("64K image");
        assert_eq!(cart.ram.len(), 0x10000);
        assert_eq!(cart.backing_path(), None);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut cart = ramcart(64);
        let mut rig = Rig::new();
        rig.write_io1(&mut cart, 0xde00, 0x40);
        rig.write_io2(&mut cart, 0xdf01, 0xee);
        let mut restored = ramcart(128);
        rig.round_trip(&cart, &mut restored);
        assert_eq!(restored.ram.len(), 0x10000);
        assert_eq!(rig.read_io2(&mut restored, 0xdf01), Some(0xee));
        assert_eq!(rig.config.mode(), Mode::Game8k);
    }

    #[test]
    fn truncated_snapshot_leaves_state_untouched() {
        let mut saved = RamCart::new(&RamCartConfig {
            read_only: true,
            ..RamCartConfig::default()
        })
        .expect("128K");
        let mut rig = Rig::new();
        rig.write_io1(&mut saved, 0xde00, 0x33);
        let mut module = saved.snapshot_write();
        module.data.truncate(10);

        let mut cart = ramcart(128);
        rig.write_io1(&mut cart, 0xde00, 0x07);
        rig.write_io2(&mut cart, 0xdf00, 0x5a);
        let mut bus = rig.bus(&cart);
        assert!(matches!(
            cart.snapshot_read(&module, &mut bus),
            Err(SnapshotError::Truncated(_))
        ));
        assert_eq!(cart.registers, [0x07, 0]);
        assert!(!cart.read_only);
        assert_eq!(rig.read_io2(&mut cart, 0xdf00), Some(0x5a));
    }

    #[test]
    fn powerup_clears_ram_without_image() {
        let mut cart = ramcart(64);
        let mut rig = Rig::new();
        rig.write_io1(&mut cart, 0xde00, 0x02);
        rig.write_io2(&mut cart, 0xdf10, 0x66);
        let mut bus = rig.bus(&cart);
        cart.powerup(&mut bus);
        assert_eq!(cart.registers, [0; 2]);
        assert!(cart.ram.iter().all(|&b| b == 0));
    }
}
