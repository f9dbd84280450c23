//! ISEPIC.
//!
//! 2K of RAM seen through a 256-byte window at $DF00. Any $DE00 access
//! selects the page from address lines A0-A2, wired in a scrambled order.
//! With the switch on, the freeze button maps the cartridge in Ultimax:
//! the current page appears at $FF00-$FFFF (so the NMI vector comes from
//! the RAM) and everything else falls through to the host. Turning the
//! switch off drops the mapping again.

use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::config::IsepicConfig;
use crate::decoder::WriteTarget;
use crate::error::{AttachError, SnapshotError};
use crate::snapshot::SnapshotModule;

use super::{Capabilities, Driver, open_module};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

const RAM_SIZE: usize = 0x800;

pub struct Isepic {
    ram: Vec<u8>,
    page: u8,
    switch_on: bool,
    mapped: bool,
}

impl Isepic {
    #[must_use]
    pub fn new(config: &IsepicConfig) -> Self {
        Self {
            ram: vec![0; RAM_SIZE],
            page: 0,
            switch_on: config.switch_on,
            mapped: false,
        }
    }

    /// Preload the RAM from a 2K image.
    pub fn from_binary(data: &[u8], config: &IsepicConfig) -> Result<Self, AttachError> {
        if data.len() != RAM_SIZE {
            return Err(AttachError::UnsupportedSize {
                cart_type: CartridgeType::Isepic,
                size: data.len(),
            });
        }
        let mut isepic = Self::new(config);
        isepic.ram.copy_from_slice(data);
        Ok(isepic)
    }

    #[must_use]
    pub fn switch_on(&self) -> bool {
        self.switch_on
    }

    #[must_use]
    pub fn page(&self) -> u8 {
        self.page
    }

    fn select_page(&mut self, addr: u16) {
        let a = addr as u8;
        self.page = ((a & 0x04) >> 2) | (a & 0x02) | ((a & 0x01) << 2);
    }

    fn window(&self, addr: u16) -> usize {
        usize::from(self.page) * 0x100 + usize::from(addr & 0xff)
    }
}

impl Driver for Isepic {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Isepic
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ULTIMAX_PASSTHROUGH | Capabilities::FREEZER | Capabilities::SWITCH
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.mapped = false;
        bus.pass_through(ConfigFlags::READ);
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        if addr & 0x1f00 == 0x1f00 {
            Some(self.ram[self.window(addr)])
        } else {
            None
        }
    }

    fn peek_io2(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.switch_on.then(|| self.ram[self.window(addr)])
    }

    fn read_io1(&mut self, addr: u16, _bus: &mut PortBus<'_>) -> Option<u8> {
        self.select_page(addr);
        None
    }

    fn write_roml(&mut self, _addr: u16, _value: u8, _bus: &mut PortBus<'_>) -> WriteTarget {
        WriteTarget::Host
    }

    fn write_romh(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) -> WriteTarget {
        if addr & 0x1f00 == 0x1f00 {
            let i = self.window(addr);
            self.ram[i] = value;
            WriteTarget::Device
        } else {
            WriteTarget::Host
        }
    }

    fn write_io1(&mut self, addr: u16, _value: u8, _bus: &mut PortBus<'_>) {
        self.select_page(addr);
    }

    fn write_io2(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) {
        if self.switch_on {
            let i = self.window(addr);
            self.ram[i] = value;
        }
    }

    fn freeze_allowed(&self) -> bool {
        self.switch_on
    }

    fn freeze(&mut self, bus: &mut PortBus<'_>) {
        self.mapped = true;
        bus.set_mode(Mode::Ultimax, 0, ConfigFlags::READ);
    }

    fn set_switch(&mut self, on: bool, bus: &mut PortBus<'_>) -> bool {
        self.switch_on = on;
        if !on {
            self.mapped = false;
            bus.pass_through(ConfigFlags::RELEASE_FREEZE);
        }
        log::debug!("ISEPIC: switch {}", if on { "on" } else { "off" });
        true
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Isepic.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_bool(self.switch_on);
        m.write_u8(self.page);
        m.write_bool(self.mapped);
        m.write_bytes(&self.ram);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let switch_on = r.read_bool()?;
        let page = r.read_u8()? & 7;
        let mapped = r.read_bool()?;
        let mut ram = vec![0; self.ram.len()];
        r.read_into(&mut ram)?;
        self.switch_on = switch_on;
        self.page = page;
        self.mapped = mapped;
        self.ram = ram;
        if self.mapped {
            bus.set_mode(Mode::Ultimax, 0, ConfigFlags::READ);
        } else {
            bus.pass_through(ConfigFlags::READ);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carts::rig::Rig;
    use crate::decoder::BusRead;
    use crate::freeze::FreezeState;

    fn isepic(switch_on: bool) -> Isepic {
        Isepic::new(&IsepicConfig { switch_on })
    }

    #[test]
    fn page_select_scrambles_address_lines() {
        let mut cart = isepic(true);
        let mut rig = Rig::new();
        rig.read_io1(&mut cart, 0xde01);
        assert_eq!(cart.page(), 4);
        rig.write_io1(&mut cart, 0xde04, 0);
        assert_eq!(cart.page(), 1);
        rig.read_io1(&mut cart, 0xde0a);
        assert_eq!(cart.page(), 2);
    }

    #[test]
    fn window_follows_switch() {
        let mut cart = isepic(false);
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.write_io2(&mut cart, 0xdf10, 0x55);
        assert_eq!(rig.read_io2(&mut cart, 0xdf10), None);
        assert!(!cart.freeze_allowed());

        let mut bus = rig.bus(&cart);
        assert!(cart.set_switch(true, &mut bus));
        rig.write_io1(&mut cart, 0xde01, 0);
        rig.write_io2(&mut cart, 0xdf10, 0x55);
        assert_eq!(rig.read_io2(&mut cart, 0xdf10), Some(0x55));
        rig.write_io1(&mut cart, 0xde00, 0);
        assert_eq!(rig.read_io2(&mut cart, 0xdf10), Some(0x00));
    }

    #[test]
    fn freeze_shows_page_at_ff00_only() {
        let mut cart = isepic(true);
        let mut rig = Rig::new();
        rig.init(&mut cart);
        assert_eq!(rig.config.owner(), None);
        rig.write_io1(&mut cart, 0xde02, 0);
        rig.write_io2(&mut cart, 0xdffa, 0x34);
        rig.freeze(&mut cart);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert_eq!(cart.peek_romh(0xfffa, &rig.config), Some(0x34));
        assert_eq!(cart.peek_romh(0xe000, &rig.config), None);
        assert_eq!(cart.peek_ultimax(0xc000, &rig.config), BusRead::Host);
        let mut bus = rig.bus(&cart);
        assert_eq!(cart.write_romh(0xe000, 1, &mut bus), WriteTarget::Host);
        assert_eq!(cart.write_romh(0xff00, 1, &mut bus), WriteTarget::Device);
    }

    #[test]
    fn switch_off_unmaps_and_releases() {
        let mut cart = isepic(true);
        let mut rig = Rig::new();
        rig.init(&mut cart);
        rig.freeze(&mut cart);
        let mut bus = rig.bus(&cart);
        cart.set_switch(false, &mut bus);
        assert_eq!(rig.config.owner(), None);
        assert_eq!(rig.freeze, FreezeState::Idle);
        assert!(!rig.host.nmi);
    }

    #[test]
    fn binary_must_be_2k() {
        assert!(matches!(
            Isepic::from_binary(&[0; 100], &IsepicConfig::default()),
            Err(AttachError::UnsupportedSize { size: 100, .. })
        ));
        let cart = Isepic::from_binary(&[0xaa; RAM_SIZE], &IsepicConfig::default())
            .expect("2K image");
        assert_eq!(cart.ram[0x7ff], 0xaa);
    }

    #[test]
    fn snapshot_keeps_mapping() {
        let mut cart = isepic(true);
        let mut rig = Rig::new();
        rig.write_io1(&mut cart, 0xde04, 0);
        rig.freeze(&mut cart);
        let mut restored = isepic(false);
        rig.round_trip(&cart, &mut restored);
        assert!(restored.switch_on());
        assert_eq!(restored.page(), 1);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
    }
}
