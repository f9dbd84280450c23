//! Freezers with no registers: the freeze button, a few address
//! decoders, and a ROM.

use format_crt::CrtImage;

use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::error::{AttachError, SnapshotError};
use crate::image::{BinaryLayout, CartRom};
use crate::snapshot::SnapshotModule;

use super::{Capabilities, Driver, open_module};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

/// Game Killer.
///
/// An 8K ROM that only appears at $E000 in Ultimax. The cartridge stays
/// invisible until the freeze button is pressed; an I/O write hides it
/// again. The second such write blows a latch that keeps it out of the
/// way (and the button dead) until reset.
pub struct GameKiller {
    rom: CartRom,
    writes: u8,
    frozen: bool,
}

impl GameKiller {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        Ok(Self::with_rom(CartRom::from_binary(
            CartridgeType::GameKiller,
            data,
            BinaryLayout::Romh,
            1,
        )?))
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self::with_rom(CartRom::from_crt(
            CartridgeType::GameKiller,
            crt,
            1,
        )?))
    }

    fn with_rom(rom: CartRom) -> Self {
        Self {
            rom,
            writes: 0,
            frozen: false,
        }
    }

    fn disabled(&self) -> bool {
        self.writes > 1
    }

    fn io_write(&mut self, bus: &mut PortBus<'_>) {
        self.writes = self.writes.saturating_add(1);
        self.frozen = false;
        bus.set_mode(
            Mode::Ram,
            0,
            ConfigFlags::WRITE | ConfigFlags::RELEASE_FREEZE,
        );
        if self.disabled() {
            log::debug!("{}: disabled until reset", CartridgeType::GameKiller);
        }
    }
}

impl Driver for GameKiller {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::GameKiller
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FREEZER
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.writes = 0;
        self.frozen = false;
        bus.set_mode(Mode::Ram, 0, ConfigFlags::READ);
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.romh(0, addr)
    }

    fn write_io1(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.io_write(bus);
    }

    fn write_io2(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.io_write(bus);
    }

    fn freeze_allowed(&self) -> bool {
        !self.disabled()
    }

    fn freeze(&mut self, bus: &mut PortBus<'_>) {
        if self.disabled() {
            return;
        }
        self.frozen = true;
        bus.set_mode(Mode::Ultimax, 0, ConfigFlags::READ);
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::GameKiller.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.writes);
        m.write_bool(self.frozen);
        self.rom.write_snapshot(&mut m);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let writes = r.read_u8()?;
        let frozen = r.read_bool()?;
        self.rom = CartRom::read_snapshot(&mut r)?;
        self.writes = writes;
        self.frozen = frozen;
        let mode = if self.frozen { Mode::Ultimax } else { Mode::Ram };
        bus.set_mode(mode, 0, ConfigFlags::READ);
        Ok(())
    }
}

/// ROM, bank and mode shared by Freeze Frame and Freeze Machine.
///
/// Reading $DE00-$DEFF maps the ROM at $8000, reading $DF00-$DFFF hides
/// it; either releases a freeze. Neither window drives the bus.
struct Frame {
    cart_type: CartridgeType,
    rom: CartRom,
    bank: u8,
    mode: Mode,
}

impl Frame {
    fn new(cart_type: CartridgeType, mut rom: CartRom, banks: usize) -> Self {
        rom.ensure_banks(banks);
        Self {
            cart_type,
            rom,
            bank: 0,
            mode: Mode::Game8k,
        }
    }

    fn set(&mut self, mode: Mode, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        self.mode = mode;
        bus.set_mode(mode, u16::from(self.bank), flags);
    }

    fn read(&self, addr: u16) -> Option<u8> {
        self.rom.roml(self.bank as usize, addr)
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(self.cart_type.snapshot_name(), SNAP_MAJOR, SNAP_MINOR);
        m.write_u8(self.mode.bits());
        m.write_u8(self.bank);
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
        let bank = r.read_u8()?;
        let rom = CartRom::read_snapshot(&mut r)?;
        if bank as usize >= rom.banks() {
            return Err(r.rejected("bank beyond ROM"));
        }
        self.bank = bank;
        self.rom = rom;
        self.set(mode, bus, ConfigFlags::READ);
        Ok(())
    }
}

macro_rules! frame_common {
    () => {
        fn cart_type(&self) -> CartridgeType {
            self.0.cart_type
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::FREEZER
        }

        fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
            self.0.read(addr)
        }

        fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
            self.0.read(addr)
        }

        fn read_io1(&mut self, _addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
            self.0.set(Mode::Game8k, bus, ConfigFlags::RELEASE_FREEZE);
            None
        }

        fn read_io2(&mut self, _addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
            self.0.set(Mode::Ram, bus, ConfigFlags::RELEASE_FREEZE);
            None
        }

        fn freeze_allowed(&self) -> bool {
            true
        }

        fn freeze(&mut self, bus: &mut PortBus<'_>) {
            self.0.set(Mode::Ultimax, bus, ConfigFlags::READ);
        }

        fn snapshot_write(&self) -> SnapshotModule {
            self.0.snapshot_write()
        }

        fn snapshot_read(
            &mut self,
            module: &SnapshotModule,
            bus: &mut PortBus<'_>,
        ) -> Result<(), SnapshotError> {
            self.0.snapshot_read(module, bus)
        }
    };
}

/// Freeze Frame: one 8K ROM.
pub struct FreezeFrame(Frame);

impl FreezeFrame {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        let t = CartridgeType::FreezeFrame;
        let rom = CartRom::from_binary(t, data, BinaryLayout::Roml, 1)?;
        Ok(Self(Frame::new(t, rom, 1)))
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        let t = CartridgeType::FreezeFrame;
        Ok(Self(Frame::new(t, CartRom::from_crt(t, crt, 1)?, 1)))
    }
}

impl Driver for FreezeFrame {
    frame_common!();

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.0.set(Mode::Game8k, bus, ConfigFlags::READ);
    }
}

/// Freeze Machine: two 8K ROMs; every reset swaps to the other one.
pub struct FreezeMachine(Frame);

impl FreezeMachine {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        let t = CartridgeType::FreezeMachine;
        let rom = CartRom::from_binary(t, data, BinaryLayout::Roml, 2)?;
        Ok(Self(Frame::new(t, rom, 2)))
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        let t = CartridgeType::FreezeMachine;
        Ok(Self(Frame::new(t, CartRom::from_crt(t, crt, 2)?, 2)))
    }

    #[must_use]
    pub fn bank(&self) -> u8 {
        self.0.bank
    }
}

impl Driver for FreezeMachine {
    frame_common!();

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.0.bank = 0;
        self.0.set(Mode::Game8k, bus, ConfigFlags::READ);
    }

    fn config_reset(&mut self, bus: &mut PortBus<'_>) {
        self.0.bank ^= 1;
        self.0.set(Mode::Game8k, bus, ConfigFlags::READ);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banked::BANK_8K;
    use crate::carts::rig::Rig;
    use crate::freeze::FreezeState;

    #[test]
    fn game_killer_hidden_until_freeze() {
        let mut gk = GameKiller::from_binary(&vec![0x6b; BANK_8K]).expect("8K");
        let mut rig = Rig::new();
        rig.init(&mut gk);
        assert_eq!(rig.config.mode(), Mode::Ram);
        assert!(gk.freeze_allowed());
        rig.freeze(&mut gk);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert_eq!(gk.peek_romh(0xfffc, &rig.config), Some(0x6b));
        assert_eq!(gk.peek_roml(0x8000, &rig.config), None);
    }

    #[test]
    fn game_killer_second_write_latches_off() {
        let mut gk = GameKiller::from_binary(&vec![0x6b; BANK_8K]).expect("8K");
        let mut rig = Rig::new();
        rig.init(&mut gk);
        rig.freeze(&mut gk);
        rig.write_io1(&mut gk, 0xde00, 0);
        assert_eq!(rig.config.mode(), Mode::Ram);
        assert_eq!(rig.freeze, FreezeState::Idle);
        assert!(gk.freeze_allowed());

        rig.write_io2(&mut gk, 0xdf00, 0);
        assert!(!gk.freeze_allowed());
        rig.freeze(&mut gk);
        assert_eq!(rig.config.mode(), Mode::Ram);

        let mut bus = rig.bus(&gk);
        gk.config_reset(&mut bus);
        assert!(gk.freeze_allowed());
    }

    #[test]
    fn freeze_frame_io_reads_switch() {
        let mut ff = FreezeFrame::from_binary(&vec![0x46; BANK_8K]).expect("8K");
        let mut rig = Rig::new();
        rig.init(&mut ff);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        assert_eq!(rig.read_io2(&mut ff, 0xdf00), None);
        assert_eq!(rig.config.mode(), Mode::Ram);
        rig.freeze(&mut ff);
        assert_eq!(rig.config.mode(), Mode::Ultimax);
        assert_eq!(ff.peek_romh(0xe000, &rig.config), Some(0x46));
        rig.read_io1(&mut ff, 0xde00);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        assert!(!rig.host.nmi);
    }

    #[test]
    fn freeze_machine_swaps_bank_on_reset() {
        let mut data = vec![0x01; BANK_8K];
        data.extend(vec![0x02; BANK_8K]);
        let mut fm = FreezeMachine::from_binary(&data).expect("16K");
        let mut rig = Rig::new();
        rig.init(&mut fm);
        assert_eq!(fm.peek_roml(0x8000, &rig.config), Some(0x01));
        let mut bus = rig.bus(&fm);
        fm.config_reset(&mut bus);
        assert_eq!(fm.bank(), 1);
        assert_eq!(rig.config.bank(), 1);
        assert_eq!(fm.peek_roml(0x8000, &rig.config), Some(0x02));

        let mut restored = FreezeMachine::from_binary(&data).expect("16K");
        rig.round_trip(&fm, &mut restored);
        assert_eq!(restored.bank(), 1);
    }
}
