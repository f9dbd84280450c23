//! The expansion port as the machine sees it.
//!
//! [`ExpansionPort`] owns every attached driver, the live
//! [`BusConfiguration`], the freeze controller and the host handle. The
//! CPU side calls [`read`](ExpansionPort::read) and
//! [`write`](ExpansionPort::write) for every access; the port decodes the
//! address, hands it to the driver that owns that region, and reports
//! whether the device or host memory answers.
//!
//! Devices are kept in mapping priority order: Slot 0, Slot 1, Main, then
//! the I/O-only expanders. I/O windows go to every device; the first one
//! that drives the bus wins.

use std::path::Path;

use log::{debug, info, warn};

use crate::bus::{BusConfiguration, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::carts::{AttachContext, Capabilities, Cartridge, Driver};
use crate::config::ExpansionConfig;
use crate::decoder::{self, BusRead, Region, WriteTarget};
use crate::error::{AttachError, SnapshotError};
use crate::freeze::FreezeState;
use crate::host::{Host, NullHost};
use crate::image::read_file;
use crate::observe::{Observable, Value};
use crate::slots::Slot;
use crate::snapshot::{SnapshotContainer, SnapshotModule};

/// Name of the module that lists the attached devices.
pub const PORT_MODULE: &str = "CARTRIDGE";
const PORT_SNAP_MAJOR: u8 = 0;
const PORT_SNAP_MINOR: u8 = 1;

/// Where an attach gets its image from.
#[derive(Debug, Clone, Copy)]
pub enum ImageSource<'a> {
    /// A file on disk. CRT files are recognised by signature or by a
    /// `.crt` extension; anything else is a raw binary.
    File(&'a Path),
    /// Raw binary image bytes.
    Binary(&'a [u8]),
    /// CRT container bytes.
    Crt(&'a [u8]),
    /// No image: RAM expansions, or an erased ROM for a snapshot to fill.
    Empty,
}

fn slot_rank(slot: Slot) -> u8 {
    match slot {
        Slot::Slot0 => 0,
        Slot::Slot1 => 1,
        Slot::Main => 2,
        Slot::Io => 3,
    }
}

/// Split borrow of the port state a driver hook needs.
macro_rules! bus {
    ($port:ident, $slot:expr) => {
        PortBus::new(
            &mut $port.bus,
            &mut $port.freeze,
            &mut $port.host,
            $slot,
            $port.clock,
        )
    };
}

/// The port and every device plugged into it.
pub struct ExpansionPort<H: Host = NullHost> {
    devices: Vec<Cartridge>,
    bus: BusConfiguration,
    freeze: FreezeState,
    host: H,
    clock: u64,
    config: ExpansionConfig,
}

impl<H: Host> ExpansionPort<H> {
    #[must_use]
    pub fn new(config: ExpansionConfig, host: H) -> Self {
        Self {
            devices: Vec::new(),
            bus: BusConfiguration::new(),
            freeze: FreezeState::Idle,
            host,
            clock: 0,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    /// Settings for later attaches. Attached devices keep theirs.
    pub fn set_config(&mut self, config: ExpansionConfig) {
        self.config = config;
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The mapping currently in effect.
    #[must_use]
    pub fn configuration(&self) -> &BusConfiguration {
        &self.bus
    }

    #[must_use]
    pub fn freeze_state(&self) -> FreezeState {
        self.freeze
    }

    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    #[must_use]
    pub fn list_supported_types(&self) -> &'static [CartridgeType] {
        &CartridgeType::ALL
    }

    #[must_use]
    pub fn is_type_active(&self, cart_type: CartridgeType) -> bool {
        self.device(cart_type).is_some()
    }

    /// Attached types in mapping priority order.
    #[must_use]
    pub fn active_types(&self) -> Vec<CartridgeType> {
        self.devices.iter().map(Driver::cart_type).collect()
    }

    /// Driver occupying `slot`, if any.
    #[must_use]
    pub fn slot_occupant(&self, slot: Slot) -> Option<CartridgeType> {
        self.devices
            .iter()
            .map(Driver::cart_type)
            .find(|t| t.slot() == slot)
    }

    fn device(&self, cart_type: CartridgeType) -> Option<&Cartridge> {
        self.devices.iter().find(|d| d.cart_type() == cart_type)
    }

    fn position(&self, cart_type: CartridgeType) -> Option<usize> {
        self.devices.iter().position(|d| d.cart_type() == cart_type)
    }

    fn owner_index(&self) -> Option<usize> {
        let owner = self.bus.owner()?;
        self.devices.iter().position(|d| d.slot() == owner)
    }

    /// Attach `cart_type` from `source`.
    ///
    /// Whatever shares the slot is detached first, including an earlier
    /// instance of the same type. On failure nothing is attached in its
    /// place.
    pub fn attach(
        &mut self,
        cart_type: CartridgeType,
        source: ImageSource<'_>,
    ) -> Result<(), AttachError> {
        self.insert(cart_type, source)?;
        if self.config.reset_on_change {
            self.reset();
        }
        Ok(())
    }

    /// Attach without the configured reset.
    fn insert(
        &mut self,
        cart_type: CartridgeType,
        source: ImageSource<'_>,
    ) -> Result<(), AttachError> {
        for other in Slot::conflicts_of(cart_type) {
            if self.remove(other) {
                debug!("expansion port: {other} evicted by {cart_type}");
            }
        }

        let cart = self.build(cart_type, source)?;
        let slot = cart.slot();
        let index = self
            .devices
            .iter()
            .position(|d| slot_rank(d.slot()) > slot_rank(slot))
            .unwrap_or(self.devices.len());
        self.devices.insert(index, cart);
        let mut bus = bus!(self, slot);
        self.devices[index].config_init(&mut bus);
        info!("expansion port: attached {cart_type} ({})", slot.name());
        Ok(())
    }

    fn build(
        &self,
        cart_type: CartridgeType,
        source: ImageSource<'_>,
    ) -> Result<Cartridge, AttachError> {
        let path = match source {
            ImageSource::File(path) => Some(path),
            _ => None,
        };
        let ctx = AttachContext {
            config: &self.config,
            path,
        };
        match source {
            ImageSource::File(path) => {
                let data = read_file(path)?;
                let named_crt = path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("crt"));
                if named_crt || format_crt::is_crt(&data) {
                    let crt = format_crt::parse(&data)?;
                    Cartridge::from_crt(cart_type, &crt, ctx)
                } else {
                    Cartridge::from_binary(cart_type, &data, ctx)
                }
            }
            ImageSource::Binary(data) => Cartridge::from_binary(cart_type, data, ctx),
            ImageSource::Crt(bytes) => {
                let crt = format_crt::parse(bytes)?;
                Cartridge::from_crt(cart_type, &crt, ctx)
            }
            ImageSource::Empty => Cartridge::empty(cart_type, ctx),
        }
    }

    /// Detach `cart_type`, writing back any image that needs it. Returns
    /// false if it was not attached.
    pub fn detach(&mut self, cart_type: CartridgeType) -> bool {
        if !self.remove(cart_type) {
            return false;
        }
        if self.config.reset_on_change {
            self.reset();
        }
        true
    }

    /// Detach without the configured reset.
    fn remove(&mut self, cart_type: CartridgeType) -> bool {
        let Some(index) = self.position(cart_type) else {
            return false;
        };
        let mut cart = self.devices.remove(index);
        cart.detach();
        self.bus.clear_request(cart.slot());
        if cart.capabilities().contains(Capabilities::FREEZER)
            && self.freeze != FreezeState::Idle
            && !self.devices.iter().any(Driver::freeze_allowed)
        {
            self.freeze = FreezeState::Idle;
            self.host.set_nmi(false);
        }
        info!("expansion port: detached {cart_type}");
        true
    }

    pub fn detach_all(&mut self) {
        for cart_type in self.active_types() {
            self.detach(cart_type);
        }
    }

    /// Where `cart_type` will write its image back on detach.
    #[must_use]
    pub fn backing_path(&self, cart_type: CartridgeType) -> Option<std::path::PathBuf> {
        self.device(cart_type).and_then(Cartridge::backing_path)
    }

    /// Machine reset: every driver returns to its reset mapping.
    pub fn reset(&mut self) {
        self.freeze = FreezeState::Idle;
        self.host.set_nmi(false);
        self.bus.clear_all();
        for i in 0..self.devices.len() {
            let slot = self.devices[i].slot();
            let mut bus = bus!(self, slot);
            self.devices[i].config_reset(&mut bus);
        }
        info!("expansion port: reset");
    }

    /// Power cycle: a reset that also loses RAM contents not backed by an
    /// image file.
    pub fn power_up(&mut self) {
        self.freeze = FreezeState::Idle;
        self.host.set_nmi(false);
        self.bus.clear_all();
        for i in 0..self.devices.len() {
            let slot = self.devices[i].slot();
            let mut bus = bus!(self, slot);
            self.devices[i].powerup(&mut bus);
        }
        info!("expansion port: power up");
    }

    /// Press the freeze button. Returns false if nothing attached can
    /// freeze right now or a freeze is already under way.
    pub fn trigger_freeze(&mut self) -> bool {
        if self.freeze != FreezeState::Idle {
            return false;
        }
        if !self.devices.iter().any(Driver::freeze_allowed) {
            debug!("expansion port: freeze ignored, no freezer ready");
            return false;
        }
        self.freeze = FreezeState::pressed(self.clock);
        self.host.set_nmi(true);
        info!("expansion port: freeze pressed at {}", self.clock);
        true
    }

    /// Flip the user switch on `cart_type`. Returns false if it is not
    /// attached or has no switch.
    pub fn set_switch(&mut self, cart_type: CartridgeType, on: bool) -> bool {
        let Some(index) = self.position(cart_type) else {
            return false;
        };
        let slot = self.devices[index].slot();
        let mut bus = bus!(self, slot);
        self.devices[index].set_switch(on, &mut bus)
    }

    /// Advance one tick.
    pub fn tick(&mut self) {
        self.clock += 1;
        for i in 0..self.devices.len() {
            let slot = self.devices[i].slot();
            let mut bus = bus!(self, slot);
            self.devices[i].tick(&mut bus);
        }
        if self.freeze.expire(self.clock) {
            self.run_freeze();
        }
    }

    pub fn tick_n(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Slot 1 freezers first, then the main cartridge.
    fn run_freeze(&mut self) {
        for slot in [Slot::Slot1, Slot::Main] {
            for i in 0..self.devices.len() {
                if self.devices[i].slot() != slot || !self.devices[i].freeze_allowed() {
                    continue;
                }
                debug!("expansion port: freezing {}", self.devices[i].cart_type());
                let mut bus = bus!(self, slot);
                self.devices[i].freeze(&mut bus);
            }
        }
    }

    /// Read fallback for a ROM window the owner left undriven.
    fn rom_fallback(&self, caps: Capabilities) -> BusRead {
        let ultimax = self.bus.mode() == Mode::Ultimax;
        if caps.contains(Capabilities::ROM_PASSTHROUGH)
            || (ultimax && caps.contains(Capabilities::ULTIMAX_PASSTHROUGH))
        {
            BusRead::Host
        } else {
            BusRead::OpenBus
        }
    }

    /// CPU read.
    pub fn read(&mut self, addr: u16) -> BusRead {
        let region = decoder::resolve(&self.bus, addr);
        match region {
            Region::Host => BusRead::Host,
            Region::Io1 | Region::Io2 => {
                let mut value = None;
                for i in 0..self.devices.len() {
                    let slot = self.devices[i].slot();
                    let mut bus = bus!(self, slot);
                    let driven = if region == Region::Io1 {
                        self.devices[i].read_io1(addr, &mut bus)
                    } else {
                        self.devices[i].read_io2(addr, &mut bus)
                    };
                    value = value.or(driven);
                }
                BusRead::driven(value)
            }
            _ => {
                let Some(i) = self.owner_index() else {
                    return BusRead::Host;
                };
                let slot = self.devices[i].slot();
                let caps = self.devices[i].capabilities();
                let mut bus = bus!(self, slot);
                let value = match region {
                    Region::RomL => self.devices[i].read_roml(addr, &mut bus),
                    Region::RomH => self.devices[i].read_romh(addr, &mut bus),
                    _ => return self.devices[i].read_ultimax(addr, &mut bus),
                };
                value.map_or_else(|| self.rom_fallback(caps), BusRead::Data)
            }
        }
    }

    /// Read without side effects, for monitors.
    #[must_use]
    pub fn peek(&self, addr: u16) -> BusRead {
        let region = decoder::resolve(&self.bus, addr);
        match region {
            Region::Host => BusRead::Host,
            Region::Io1 => BusRead::driven(
                self.devices
                    .iter()
                    .find_map(|d| d.peek_io1(addr, &self.bus)),
            ),
            Region::Io2 => BusRead::driven(
                self.devices
                    .iter()
                    .find_map(|d| d.peek_io2(addr, &self.bus)),
            ),
            _ => {
                let Some(i) = self.owner_index() else {
                    return BusRead::Host;
                };
                let cart = &self.devices[i];
                let value = match region {
                    Region::RomL => cart.peek_roml(addr, &self.bus),
                    Region::RomH => cart.peek_romh(addr, &self.bus),
                    _ => return cart.peek_ultimax(addr, &self.bus),
                };
                value.map_or_else(|| self.rom_fallback(cart.capabilities()), BusRead::Data)
            }
        }
    }

    /// CPU write. Devices watching host memory see every write that
    /// reaches it.
    pub fn write(&mut self, addr: u16, value: u8) -> WriteTarget {
        let region = decoder::resolve(&self.bus, addr);
        let target = match region {
            Region::Host => WriteTarget::Host,
            Region::Io1 | Region::Io2 => {
                for i in 0..self.devices.len() {
                    let slot = self.devices[i].slot();
                    let mut bus = bus!(self, slot);
                    if region == Region::Io1 {
                        self.devices[i].write_io1(addr, value, &mut bus);
                    } else {
                        self.devices[i].write_io2(addr, value, &mut bus);
                    }
                }
                WriteTarget::Device
            }
            _ => match self.owner_index() {
                None => WriteTarget::Host,
                Some(i) => {
                    let slot = self.devices[i].slot();
                    let mut bus = bus!(self, slot);
                    match region {
                        Region::RomL => self.devices[i].write_roml(addr, value, &mut bus),
                        Region::RomH => self.devices[i].write_romh(addr, value, &mut bus),
                        _ => self.devices[i].write_ultimax(addr, value, &mut bus),
                    }
                }
            },
        };
        if target.reaches_host() {
            for i in 0..self.devices.len() {
                let slot = self.devices[i].slot();
                let mut bus = bus!(self, slot);
                self.devices[i].snoop_write(addr, value, &mut bus);
            }
        }
        target
    }

    /// Save the port and every attached device.
    pub fn snapshot_write_all(&self, container: &mut SnapshotContainer) {
        let mut m = SnapshotModule::new(PORT_MODULE, PORT_SNAP_MAJOR, PORT_SNAP_MINOR);
        m.write_u64(self.clock);
        let (state, due) = match self.freeze {
            FreezeState::Idle => (0, 0),
            FreezeState::Pending { due } => (1, due),
            FreezeState::Frozen => (2, 0),
        };
        m.write_u8(state);
        m.write_u64(due);
        m.write_u8(self.devices.len() as u8);
        for cart in &self.devices {
            m.write_u16(cart.cart_type().id() as u16);
        }
        container.push(m);
        for cart in &self.devices {
            container.push(cart.snapshot_write());
        }
    }

    /// Restore from `container`, attaching and detaching so the port holds
    /// exactly the saved devices. Sections that fail are reported and the
    /// rest are still restored.
    pub fn snapshot_read_all(
        &mut self,
        container: &SnapshotContainer,
    ) -> Vec<(String, SnapshotError)> {
        let mut failures = Vec::new();
        let (clock, freeze, types) = match read_port_module(container) {
            Ok(saved) => saved,
            Err(e) => {
                failures.push((PORT_MODULE.to_string(), e));
                return failures;
            }
        };

        for active in self.active_types() {
            if !types.contains(&active) {
                self.remove(active);
            }
        }
        let before = self.bus.clone();
        self.bus.clear_all();
        for &cart_type in &types {
            let name = cart_type.snapshot_name().to_string();
            let kept = self.is_type_active(cart_type);
            if !kept
                && let Err(e) = self.insert(cart_type, ImageSource::Empty)
            {
                warn!("expansion port: cannot recreate {cart_type} for snapshot: {e}");
                failures.push((
                    name,
                    SnapshotError::Rejected {
                        module: cart_type.snapshot_name().to_string(),
                        reason: e.to_string(),
                    },
                ));
                continue;
            }
            let Some(i) = self.position(cart_type) else {
                continue;
            };
            let slot = self.devices[i].slot();
            let mut bus = bus!(self, slot);
            let restored = match container.find(&name) {
                Some(module) => self.devices[i].snapshot_read(module, &mut bus),
                None => Err(SnapshotError::Missing(name.clone())),
            };
            if let Err(e) = restored {
                warn!("expansion port: {name}: {e}");
                // A kept device is still in its old state; so is its mapping.
                if kept {
                    self.bus.restore_request(slot, before.request(slot));
                }
                failures.push((name, e));
            }
        }
        self.clock = clock;
        self.freeze = freeze;
        self.host.set_nmi(freeze != FreezeState::Idle);
        failures
    }
}

fn read_port_module(
    container: &SnapshotContainer,
) -> Result<(u64, FreezeState, Vec<CartridgeType>), SnapshotError> {
    let module = container
        .find(PORT_MODULE)
        .ok_or_else(|| SnapshotError::Missing(PORT_MODULE.to_string()))?;
    module.check_version(PORT_SNAP_MAJOR, PORT_SNAP_MINOR)?;
    let mut r = module.reader();
    let clock = r.read_u64()?;
    let state = r.read_u8()?;
    let due = r.read_u64()?;
    let freeze = match state {
        0 => FreezeState::Idle,
        1 => FreezeState::Pending { due },
        2 => FreezeState::Frozen,
        _ => return Err(r.rejected("unknown freeze state")),
    };
    let count = r.read_u8()?;
    let mut types = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let id = r.read_u16()? as i16;
        let cart_type = CartridgeType::from_id(id)
            .ok_or_else(|| r.rejected(&format!("unknown cartridge id {id}")))?;
        types.push(cart_type);
    }
    Ok((clock, freeze, types))
}

impl<H: Host> Observable for ExpansionPort<H> {
    fn query(&self, path: &str) -> Option<Value> {
        let bus = &self.bus;
        let slot = |slot: Slot| Value::from(self.slot_occupant(slot).map(CartridgeType::name));
        Some(match path {
            "bus.mode" => bus.mode().name().into(),
            "bus.mode_phi1" => bus.mode_phi1().name().into(),
            "bus.bank" => bus.bank().into(),
            "bus.game" => bus.game().into(),
            "bus.exrom" => bus.exrom().into(),
            "bus.export_ram" => bus.export_ram().into(),
            "bus.ultimax_phi1" => bus.ultimax_phi1().into(),
            "bus.ultimax_phi2" => bus.ultimax_phi2().into(),
            "bus.owner" => bus.owner().map(Slot::name).into(),
            "bus.generation" => bus.generation().into(),
            "slot.slot0" => slot(Slot::Slot0),
            "slot.slot1" => slot(Slot::Slot1),
            "slot.main" => slot(Slot::Main),
            "slot.io" => Value::Array(
                self.devices
                    .iter()
                    .filter(|d| d.slot() == Slot::Io)
                    .map(|d| d.cart_type().name().into())
                    .collect(),
            ),
            "freeze.state" => self.freeze.name().into(),
            "freeze.due" => match self.freeze {
                FreezeState::Pending { due } => Value::U64(due),
                _ => Value::None,
            },
            "clock" => self.clock.into(),
            _ => return None,
        })
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "bus.mode",
            "bus.mode_phi1",
            "bus.bank",
            "bus.game",
            "bus.exrom",
            "bus.export_ram",
            "bus.ultimax_phi1",
            "bus.ultimax_phi2",
            "bus.owner",
            "bus.generation",
            "slot.slot0",
            "slot.slot1",
            "slot.main",
            "slot.io",
            "freeze.state",
            "freeze.due",
            "clock",
        ]
    }
}
