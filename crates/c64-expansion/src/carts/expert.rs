//! Expert Cartridge.
//!
//! 8K of battery-backed RAM and a three-position switch:
//!
//! - Off: not there at all.
//! - Prg: the RAM sits at $8000 in 8K mode so software can be loaded.
//! - On: invisible until a reset or the freeze button, then Ultimax with
//!   the RAM at both $8000 and $E000. Any $DE00 access hides it again.
//!
//! In Ultimax everything outside the RAM falls through to the host.

use format_crt::CrtImage;

use crate::banked::BANK_8K;
use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::config::{ExpertConfig, ExpertMode};
use crate::decoder::WriteTarget;
use crate::error::{AttachError, SnapshotError};
use crate::image::{BinaryLayout, CartRom};
use crate::snapshot::SnapshotModule;

use super::{Capabilities, Driver, open_module};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

pub struct Expert {
    ram: Vec<u8>,
    mode: ExpertMode,
    active: bool,
}

impl Expert {
    #[must_use]
    pub fn new(config: &ExpertConfig) -> Self {
        Self {
            ram: vec![0; BANK_8K],
            mode: config.mode,
            active: false,
        }
    }

    /// Preload the RAM from an 8K image.
    pub fn from_binary(data: &[u8], config: &ExpertConfig) -> Result<Self, AttachError> {
        let rom = CartRom::from_binary(CartridgeType::Expert, data, BinaryLayout::Roml, 1)?;
        Ok(Self::preloaded(&rom, config))
    }

    pub fn from_crt(crt: &CrtImage, config: &ExpertConfig) -> Result<Self, AttachError> {
        let rom = CartRom::from_crt(CartridgeType::Expert, crt, 1)?;
        Ok(Self::preloaded(&rom, config))
    }

    fn preloaded(rom: &CartRom, config: &ExpertConfig) -> Self {
        let mut expert = Self::new(config);
        if let Some(bank) = rom.roml.bank(0) {
            expert.ram.copy_from_slice(bank);
        }
        expert
    }

    #[must_use]
    pub fn mode(&self) -> ExpertMode {
        self.mode
    }

    fn apply(&mut self, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        match (self.mode, self.active) {
            (ExpertMode::Prg, _) => {
                bus.set_mode(Mode::Game8k, 0, flags | ConfigFlags::EXPORT_RAM);
            }
            (ExpertMode::On, true) => bus.set_mode(Mode::Ultimax, 0, flags),
            _ => bus.pass_through(flags),
        }
    }

    fn hide(&mut self, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        if self.mode == ExpertMode::On && self.active {
            self.active = false;
            self.apply(bus, flags | ConfigFlags::RELEASE_FREEZE);
        }
    }
}

impl Driver for Expert {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Expert
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ULTIMAX_PASSTHROUGH | Capabilities::FREEZER
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.active = false;
        self.apply(bus, ConfigFlags::READ);
    }

    fn config_reset(&mut self, bus: &mut PortBus<'_>) {
        self.active = self.mode == ExpertMode::On;
        self.apply(bus, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        Some(self.ram[(addr & 0x1fff) as usize])
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        Some(self.ram[(addr & 0x1fff) as usize])
    }

    fn read_io1(&mut self, _addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.hide(bus, ConfigFlags::READ);
        None
    }

    fn write_roml(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        self.ram[(addr & 0x1fff) as usize] = value;
        if bus.config().mode() == Mode::Ultimax {
            WriteTarget::Device
        } else {
            WriteTarget::Both
        }
    }

    fn write_romh(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) -> WriteTarget {
        self.ram[(addr & 0x1fff) as usize] = value;
        WriteTarget::Device
    }

    fn write_io1(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.hide(bus, ConfigFlags::WRITE);
    }

    fn freeze_allowed(&self) -> bool {
        self.mode == ExpertMode::On
    }

    fn freeze(&mut self, bus: &mut PortBus<'_>) {
        if self.mode == ExpertMode::On {
            self.active = true;
            self.apply(bus, ConfigFlags::READ);
        }
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Expert.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(match self.mode {
            ExpertMode::Off => 0,
            ExpertMode::Prg => 1,
            ExpertMode::On => 2,
        });
        m.write_bool(self.active);
        m.write_bytes(&self.ram);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let mode = match r.read_u8()? {
            0 => ExpertMode::Off,
            1 => ExpertMode::Prg,
            2 => ExpertMode::On,
            _ => return Err(r.rejected("unknown switch position")),
        };
        let active = r.read_bool()?;
        let mut ram = vec![0; self.ram.len()];
        r.read_into(&mut ram)?;
        self.mode = mode;
        self.active = active;
        self.ram = ram;
        self.apply(bus, ConfigFlags::READ);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carts::rig::Rig;
    use crate::decoder::BusRead;
    use crate::freeze::FreezeState;

    fn expert(mode: ExpertMode) -> Expert {
        Expert::new(&ExpertConfig { mode })
    }

    #[test]
    fn prg_mode_exports_ram_at_8000() {
        let mut ex = expert(ExpertMode::Prg);
        let mut rig = Rig::new();
        rig.init(&mut ex);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        assert!(rig.config.export_ram());
        let mut bus = rig.bus(&ex);
        assert_eq!(ex.write_roml(0x8100, 0x33, &mut bus), WriteTarget::Both);
        assert_eq!(ex.peek_roml(0x8100, &rig.config), Some(0x33));
    }

    #[test]
    fn on_mode_invisible_until_reset() {
        let mut ex = expert(ExpertMode::On);
        let mut rig = Rig::new();
        rig.init(&mut ex);
        assert_eq!(rig.config.owner(), None);
        let mut bus = rig.bus(&ex);
        ex.config_reset(&mut bus);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert_eq!(ex.peek_ultimax(0x2000, &rig.config), BusRead::Host);

        rig.read_io1(&mut ex, 0xde00);
        assert_eq!(rig.config.owner(), None);
        assert_eq!(rig.config.mode(), Mode::Ram);
    }

    #[test]
    fn freeze_maps_ram_at_e000() {
        let mut ex = expert(ExpertMode::On);
        let mut rig = Rig::new();
        rig.init(&mut ex);
        assert!(ex.freeze_allowed());
        rig.freeze(&mut ex);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        let mut bus = rig.bus(&ex);
        assert_eq!(ex.write_romh(0xfffa, 0x12, &mut bus), WriteTarget::Device);
        assert_eq!(ex.peek_roml(0x9ffa, &rig.config), Some(0x12));
        rig.write_io1(&mut ex, 0xde00, 0);
        assert_eq!(rig.freeze, FreezeState::Idle);
        assert!(!rig.host.nmi);
    }

    #[test]
    fn off_mode_never_freezes() {
        let mut ex = expert(ExpertMode::Off);
        let mut rig = Rig::new();
        rig.init(&mut ex);
        assert!(!ex.freeze_allowed());
        assert_eq!(rig.config.owner(), None);
    }

    #[test]
    fn snapshot_keeps_switch_and_ram() {
        let mut ex = expert(ExpertMode::On);
        let mut rig = Rig::new();
        rig.freeze(&mut ex);
        let mut bus = rig.bus(&ex);
        ex.write_roml(0x8000, 0x4c, &mut bus);
        let mut restored = expert(ExpertMode::Off);
        rig.round_trip(&ex, &mut restored);
        assert_eq!(restored.mode(), ExpertMode::On);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert_eq!(restored.peek_romh(0xe000, &rig.config), Some(0x4c));
    }
}
