//! GAME/EXROM configuration state.
//!
//! The PLA sees two lines from the port. Their four combinations select
//! the mapping mode:
//!
//! | Mode      | Bits | GAME     | EXROM    | Cartridge memory visible            |
//! |-----------|------|----------|----------|-------------------------------------|
//! | `Game8k`  | 0    | inactive | asserted | ROML $8000-$9FFF                    |
//! | `Game16k` | 1    | asserted | asserted | ROML $8000-$9FFF, ROMH $A000-$BFFF  |
//! | `Ram`     | 2    | inactive | inactive | none                                |
//! | `Ultimax` | 3    | asserted | inactive | ROML $8000, ROMH $E000, rest open   |
//!
//! Mode bits: `game = bits & 1`, `exrom = ((bits >> 1) & 1) ^ 1`.
//!
//! [`PortBus::apply_configuration`] is the only path that changes a
//! [`BusConfiguration`]. Every request is remembered per slot; the
//! highest-priority slot with a live request owns the mapping.

use bitflags::bitflags;
use log::{debug, error};

use crate::freeze::FreezeState;
use crate::host::Host;
use crate::slots::Slot;

/// Memory configuration selected by the GAME and EXROM lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Mode {
    Game8k = 0,
    Game16k = 1,
    #[default]
    Ram = 2,
    Ultimax = 3,
}

impl Mode {
    pub const ALL: [Self; 4] = [Self::Game8k, Self::Game16k, Self::Ram, Self::Ultimax];

    /// Decode the low two bits of a mode number.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => Self::Game8k,
            1 => Self::Game16k,
            2 => Self::Ram,
            _ => Self::Ultimax,
        }
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// GAME line asserted (pulled low).
    #[must_use]
    pub fn game(self) -> bool {
        self.bits() & 1 != 0
    }

    /// EXROM line asserted (pulled low).
    #[must_use]
    pub fn exrom(self) -> bool {
        ((self.bits() >> 1) & 1) ^ 1 != 0
    }

    /// Mode for a pair of line states (true = asserted).
    #[must_use]
    pub fn from_lines(game: bool, exrom: bool) -> Self {
        Self::from_bits(u8::from(game) | (u8::from(!exrom) << 1))
    }

    #[must_use]
    pub fn is_ultimax(self) -> bool {
        self.game() && !self.exrom()
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Game8k => "8k",
            Self::Game16k => "16k",
            Self::Ram => "ram",
            Self::Ultimax => "ultimax",
        }
    }
}

bitflags! {
    /// Modifiers for a configuration request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct ConfigFlags: u8 {
        /// Request comes from a write access; flush the CPU's pending
        /// access under the old mapping first.
        const WRITE = 0x01;
        /// Clear NMI and leave the frozen state.
        const RELEASE_FREEZE = 0x02;
        /// Video fetches (phi2) see RAM even in Ultimax.
        const PHI2_RAM = 0x04;
        /// Cartridge RAM replaces ROML.
        const EXPORT_RAM = 0x08;
        /// Only raise NMI; leave the mapping alone.
        const TRIGGER_NMI_ONLY = 0x10;
    }
}

impl ConfigFlags {
    /// Flags for a read-triggered request.
    pub const READ: Self = Self::empty();
}

/// One remembered configuration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRequest {
    pub mode_phi1: Mode,
    pub mode_phi2: Mode,
    pub bank: u16,
    pub flags: ConfigFlags,
}

impl ConfigRequest {
    /// A slot device asking for plain RAM without its own RAM exported
    /// has nothing to show; the next slot down takes over.
    fn is_pass_through(&self) -> bool {
        self.mode_phi1 == Mode::Ram
            && self.mode_phi2 == Mode::Ram
            && !self.flags.contains(ConfigFlags::EXPORT_RAM)
    }
}

/// The effective mapping the decoder routes against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfiguration {
    mode: Mode,
    mode_phi1: Mode,
    bank: u16,
    export_ram: bool,
    phi2_ram: bool,
    ultimax_phi1: bool,
    ultimax_phi2: bool,
    generation: u64,
    requests: [Option<ConfigRequest>; 3],
    owner: Option<Slot>,
}

impl Default for BusConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl BusConfiguration {
    /// Nothing attached: both lines inactive.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: Mode::Ram,
            mode_phi1: Mode::Ram,
            bank: 0,
            export_ram: false,
            phi2_ram: false,
            ultimax_phi1: false,
            ultimax_phi2: false,
            generation: 0,
            requests: [None; 3],
            owner: None,
        }
    }

    /// Mode seen by CPU accesses.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Mode seen by video fetches.
    #[must_use]
    pub fn mode_phi1(&self) -> Mode {
        self.mode_phi1
    }

    #[must_use]
    pub fn game(&self) -> bool {
        self.mode.game()
    }

    #[must_use]
    pub fn exrom(&self) -> bool {
        self.mode.exrom()
    }

    #[must_use]
    pub fn bank(&self) -> u16 {
        self.bank
    }

    #[must_use]
    pub fn export_ram(&self) -> bool {
        self.export_ram
    }

    #[must_use]
    pub fn phi2_ram(&self) -> bool {
        self.phi2_ram
    }

    #[must_use]
    pub fn ultimax_phi1(&self) -> bool {
        self.ultimax_phi1
    }

    #[must_use]
    pub fn ultimax_phi2(&self) -> bool {
        self.ultimax_phi2
    }

    /// Bumped on every applied request. A decoder that caches anything
    /// must drop it when this changes.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Slot whose request is in effect.
    #[must_use]
    pub fn owner(&self) -> Option<Slot> {
        self.owner
    }

    /// Request remembered for `slot`.
    #[must_use]
    pub fn request(&self, slot: Slot) -> Option<ConfigRequest> {
        slot.mapping_index().and_then(|i| self.requests[i])
    }

    pub(crate) fn clear_request(&mut self, slot: Slot) {
        if let Some(i) = slot.mapping_index() {
            self.requests[i] = None;
        }
        self.resolve();
    }

    /// Put back a request taken earlier with [`request`](Self::request).
    pub(crate) fn restore_request(&mut self, slot: Slot, request: Option<ConfigRequest>) {
        if let Some(i) = slot.mapping_index() {
            self.requests[i] = request;
        }
        self.resolve();
    }

    pub(crate) fn clear_all(&mut self) {
        self.requests = [None; 3];
        self.resolve();
    }

    /// Pick the highest-priority live request and derive the lines.
    fn resolve(&mut self) {
        let effective = Slot::MAPPING_ORDER.into_iter().find_map(|slot| {
            slot.mapping_index()
                .and_then(|i| self.requests[i])
                .map(|req| (slot, req))
        });

        let old_mode = self.mode;
        let old_bank = self.bank;
        match effective {
            Some((slot, req)) => {
                self.owner = Some(slot);
                self.mode = req.mode_phi2;
                self.mode_phi1 = req.mode_phi1;
                self.bank = req.bank;
                self.export_ram = req.flags.contains(ConfigFlags::EXPORT_RAM);
                self.phi2_ram = req.flags.contains(ConfigFlags::PHI2_RAM);
            }
            None => {
                self.owner = None;
                self.mode = Mode::Ram;
                self.mode_phi1 = Mode::Ram;
                self.bank = 0;
                self.export_ram = false;
                self.phi2_ram = false;
            }
        }
        self.ultimax_phi1 = self.mode_phi1.is_ultimax();
        self.ultimax_phi2 = self.mode.is_ultimax() && !self.phi2_ram;
        self.generation = self.generation.wrapping_add(1);

        if old_mode != self.mode || old_bank != self.bank {
            debug!(
                "expansion port: {} bank {} -> {} bank {} (owner {})",
                old_mode.name(),
                old_bank,
                self.mode.name(),
                self.bank,
                self.owner.map_or("none", Slot::name),
            );
        }
    }
}

/// A driver's handle on the port while one of its hooks runs.
pub struct PortBus<'a> {
    config: &'a mut BusConfiguration,
    freeze: &'a mut FreezeState,
    host: &'a mut dyn Host,
    slot: Slot,
    clock: u64,
}

impl<'a> PortBus<'a> {
    pub(crate) fn new(
        config: &'a mut BusConfiguration,
        freeze: &'a mut FreezeState,
        host: &'a mut dyn Host,
        slot: Slot,
        clock: u64,
    ) -> Self {
        Self {
            config,
            freeze,
            host,
            slot,
            clock,
        }
    }

    #[must_use]
    pub fn config(&self) -> &BusConfiguration {
        self.config
    }

    #[must_use]
    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Current port clock, in ticks.
    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    #[must_use]
    pub fn freeze_state(&self) -> FreezeState {
        *self.freeze
    }

    /// Change the mapping on behalf of the calling driver's slot.
    ///
    /// Order: flush the pending access (write requests), raise NMI and
    /// stop (NMI-only requests), record the request and derive the lines,
    /// release the freeze, bump the generation.
    pub fn apply_configuration(
        &mut self,
        mode_phi1: Mode,
        mode_phi2: Mode,
        bank: u16,
        flags: ConfigFlags,
    ) {
        if flags.contains(ConfigFlags::WRITE) {
            self.host.flush_pending_access(self.config);
        }

        if flags.contains(ConfigFlags::TRIGGER_NMI_ONLY) {
            self.host.set_nmi(true);
            return;
        }

        if mode_phi2 == Mode::Ultimax
            && flags.contains(ConfigFlags::EXPORT_RAM | ConfigFlags::PHI2_RAM)
        {
            error!(
                "expansion port: {} requested export RAM with phi2 RAM in ultimax",
                self.slot.name()
            );
            debug_assert!(false, "conflicting ultimax configuration request");
        }

        let request = ConfigRequest {
            mode_phi1,
            mode_phi2,
            bank,
            flags,
        };
        if let Some(i) = self.slot.mapping_index() {
            let pass = self.slot != Slot::Main && request.is_pass_through();
            self.config.requests[i] = if pass { None } else { Some(request) };
            self.config.resolve();
        }

        if flags.contains(ConfigFlags::RELEASE_FREEZE) {
            self.release_freeze();
        }
    }

    /// Same mode for both clock phases.
    pub fn set_mode(&mut self, mode: Mode, bank: u16, flags: ConfigFlags) {
        self.apply_configuration(mode, mode, bank, flags);
    }

    /// Withdraw this slot's request so the next slot down shows through.
    pub fn pass_through(&mut self, flags: ConfigFlags) {
        if flags.contains(ConfigFlags::WRITE) {
            self.host.flush_pending_access(self.config);
        }
        self.config.clear_request(self.slot);
        if flags.contains(ConfigFlags::RELEASE_FREEZE) {
            self.release_freeze();
        }
    }

    /// Raise NMI without touching the mapping.
    pub fn trigger_nmi(&mut self) {
        self.apply_configuration(
            self.config.mode_phi1,
            self.config.mode,
            self.config.bank,
            ConfigFlags::TRIGGER_NMI_ONLY,
        );
    }

    /// Clear NMI and return the freeze controller to idle.
    pub fn release_freeze(&mut self) {
        self.host.set_nmi(false);
        *self.freeze = FreezeState::Idle;
    }

    pub fn set_irq(&mut self, asserted: bool) {
        self.host.set_irq(asserted);
    }

    pub fn dma_read(&mut self, addr: u16) -> u8 {
        self.host.dma_read(addr)
    }

    pub fn dma_write(&mut self, addr: u16, value: u8) {
        self.host.dma_write(addr, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SimpleHost;

    struct Fixture {
        config: BusConfiguration,
        freeze: FreezeState,
        host: SimpleHost,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                config: BusConfiguration::new(),
                freeze: FreezeState::Idle,
                host: SimpleHost::new(),
            }
        }

        fn bus(&mut self, slot: Slot) -> PortBus<'_> {
            PortBus::new(&mut self.config, &mut self.freeze, &mut self.host, slot, 0)
        }
    }

    #[test]
    fn mode_line_encoding() {
        assert!(!Mode::Game8k.game() && Mode::Game8k.exrom());
        assert!(Mode::Game16k.game() && Mode::Game16k.exrom());
        assert!(!Mode::Ram.game() && !Mode::Ram.exrom());
        assert!(Mode::Ultimax.game() && !Mode::Ultimax.exrom());
        for mode in Mode::ALL {
            assert_eq!(Mode::from_lines(mode.game(), mode.exrom()), mode);
            assert_eq!(Mode::from_bits(mode.bits()), mode);
        }
    }

    #[test]
    fn every_phase_pair_yields_one_mode() {
        for phi1 in Mode::ALL {
            for phi2 in Mode::ALL {
                let mut f = Fixture::new();
                f.bus(Slot::Main)
                    .apply_configuration(phi1, phi2, 0, ConfigFlags::READ);
                assert_eq!(f.config.mode(), phi2);
                assert_eq!(f.config.mode_phi1(), phi1);
                assert_eq!(f.config.ultimax_phi1(), phi1 == Mode::Ultimax);
                assert_eq!(f.config.ultimax_phi2(), phi2 == Mode::Ultimax);
            }
        }
    }

    #[test]
    fn phi2_ram_suppresses_ultimax_phi2() {
        let mut f = Fixture::new();
        f.bus(Slot::Main)
            .set_mode(Mode::Ultimax, 0, ConfigFlags::PHI2_RAM);
        assert_eq!(f.config.mode(), Mode::Ultimax);
        assert!(!f.config.ultimax_phi2());
    }

    #[test]
    fn write_flushes_before_change() {
        let mut f = Fixture::new();
        f.bus(Slot::Main).set_mode(Mode::Game8k, 1, ConfigFlags::READ);
        assert_eq!(f.host.flushes, 0);
        f.bus(Slot::Main).set_mode(Mode::Game16k, 3, ConfigFlags::WRITE);
        assert_eq!(f.host.flushes, 1);
        assert_eq!(f.host.last_flush_mode, Some(Mode::Game8k));
        assert_eq!(f.host.last_flush_bank, Some(1));
        assert_eq!(f.config.bank(), 3);
    }

    #[test]
    fn nmi_only_leaves_mapping() {
        let mut f = Fixture::new();
        f.bus(Slot::Main).set_mode(Mode::Game8k, 2, ConfigFlags::READ);
        let generation = f.config.generation();
        f.bus(Slot::Main).set_mode(
            Mode::Ultimax,
            0,
            ConfigFlags::TRIGGER_NMI_ONLY,
        );
        assert!(f.host.nmi);
        assert_eq!(f.config.mode(), Mode::Game8k);
        assert_eq!(f.config.bank(), 2);
        assert_eq!(f.config.generation(), generation);
    }

    #[test]
    fn release_freeze_clears_nmi() {
        let mut f = Fixture::new();
        f.freeze = FreezeState::Frozen;
        f.host.nmi = true;
        f.bus(Slot::Main)
            .set_mode(Mode::Game8k, 0, ConfigFlags::RELEASE_FREEZE);
        assert!(!f.host.nmi);
        assert_eq!(f.freeze, FreezeState::Idle);
    }

    #[test]
    fn generation_bumps_on_every_request() {
        let mut f = Fixture::new();
        let g0 = f.config.generation();
        f.bus(Slot::Main).set_mode(Mode::Game8k, 0, ConfigFlags::READ);
        f.bus(Slot::Main).set_mode(Mode::Game8k, 0, ConfigFlags::READ);
        assert_eq!(f.config.generation(), g0 + 2);
    }

    #[test]
    fn higher_slot_overrides_and_passes_through() {
        let mut f = Fixture::new();
        f.bus(Slot::Main).set_mode(Mode::Game16k, 4, ConfigFlags::READ);
        f.bus(Slot::Slot1).set_mode(Mode::Game8k, 0, ConfigFlags::EXPORT_RAM);
        assert_eq!(f.config.owner(), Some(Slot::Slot1));
        assert_eq!(f.config.mode(), Mode::Game8k);
        assert!(f.config.export_ram());

        // Slot 1 goes quiet: main cartridge's request is back in force.
        f.bus(Slot::Slot1).set_mode(Mode::Ram, 0, ConfigFlags::READ);
        assert_eq!(f.config.owner(), Some(Slot::Main));
        assert_eq!(f.config.mode(), Mode::Game16k);
        assert_eq!(f.config.bank(), 4);
        assert!(!f.config.export_ram());
    }

    #[test]
    fn main_ram_request_is_kept() {
        let mut f = Fixture::new();
        f.bus(Slot::Main).set_mode(Mode::Ram, 0, ConfigFlags::READ);
        assert_eq!(f.config.owner(), Some(Slot::Main));
        f.config.clear_request(Slot::Main);
        assert_eq!(f.config.owner(), None);
        assert_eq!(f.config.mode(), Mode::Ram);
    }

    #[test]
    fn io_slot_cannot_map() {
        let mut f = Fixture::new();
        f.bus(Slot::Io).set_mode(Mode::Ultimax, 0, ConfigFlags::READ);
        assert_eq!(f.config.mode(), Mode::Ram);
        assert_eq!(f.config.owner(), None);
    }
}
