//! Cartridge drivers.
//!
//! Every supported device implements [`Driver`]. Hooks a device does not
//! decode fall back to the trait defaults: nothing driven on reads, host
//! RAM underneath on ROM writes outside Ultimax. [`Cartridge`] is the
//! closed set of drivers and forwards each hook with a `match`.
//!
//! Drivers never touch the mapping directly. They call
//! [`PortBus::apply_configuration`] (or one of its shorthands), which
//! records the request for the driver's slot.

mod actionreplay;
mod bankswitch;
mod dqbb;
mod easyflash;
mod expert;
mod finalcart;
mod freezers;
mod generic;
mod georam;
mod ide64;
mod isepic;
mod kcs;
mod megabyter;
mod mmc64;
mod ramcart;
mod reu;
mod special;
mod supersnapshot;
mod toggle;
mod uc;

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use format_crt::CrtImage;

use crate::bus::{BusConfiguration, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::config::ExpansionConfig;
use crate::decoder::{BusRead, WriteTarget};
use crate::error::{AttachError, SnapshotError};
use crate::snapshot::{ModuleReader, SnapshotModule};

pub use actionreplay::ActionReplay;
pub use bankswitch::{
    Comal80, Dinamic, FunPlay, Gs, MagicDesk, Ocean, Rgcd, Ross, StructuredBasic, SuperGames,
};
pub use dqbb::Dqbb;
pub use easyflash::EasyFlash;
pub use expert::Expert;
pub use finalcart::{FinalI, FinalIII};
pub use freezers::{FreezeFrame, FreezeMachine, GameKiller};
pub use generic::Generic;
pub use georam::GeoRam;
pub use ide64::Ide64;
pub use isepic::Isepic;
pub use kcs::KcsPower;
pub use megabyter::Megabyter;
pub use mmc64::Mmc64;
pub use ramcart::RamCart;
pub use reu::Reu;
pub use special::{EpyxFastload, Zaxxon};
pub use supersnapshot::SuperSnapshotV5;
pub use toggle::{Mach5, RexUtility, SimonsBasic, WarpSpeed, Westermann};
pub use uc::Universal;

bitflags! {
    /// Static properties of a driver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u8 {
        /// In Ultimax, addresses the cartridge does not decode fall back
        /// to host RAM instead of open bus.
        const ULTIMAX_PASSTHROUGH = 0x01;
        /// Has a freeze button.
        const FREEZER = 0x02;
        /// Has a user switch that `set_switch` toggles.
        const SWITCH = 0x04;
        /// ROML/ROMH addresses the device leaves undriven read host RAM.
        const ROM_PASSTHROUGH = 0x08;
    }
}

/// What an attach has to work with besides the image bytes.
#[derive(Debug, Clone, Copy)]
pub struct AttachContext<'a> {
    pub config: &'a ExpansionConfig,
    /// File the image came from, kept for write-back.
    pub path: Option<&'a Path>,
}

/// The per-device hook set.
pub trait Driver {
    fn cart_type(&self) -> CartridgeType;

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Mapping right after attach.
    fn config_init(&mut self, bus: &mut PortBus<'_>);

    /// Mapping after a machine reset.
    fn config_reset(&mut self, bus: &mut PortBus<'_>) {
        self.config_init(bus);
    }

    /// Power cycle. Volatile RAM loses its contents; RAM loaded from an
    /// image file keeps them.
    fn powerup(&mut self, bus: &mut PortBus<'_>) {
        self.config_reset(bus);
    }

    fn peek_roml(&self, _addr: u16, _config: &BusConfiguration) -> Option<u8> {
        None
    }

    fn peek_romh(&self, _addr: u16, _config: &BusConfiguration) -> Option<u8> {
        None
    }

    fn peek_io1(&self, _addr: u16, _config: &BusConfiguration) -> Option<u8> {
        None
    }

    fn peek_io2(&self, _addr: u16, _config: &BusConfiguration) -> Option<u8> {
        None
    }

    /// Ultimax hole ($1000-$7FFF, $A000-$BFFF, $C000-$CFFF).
    fn peek_ultimax(&self, _addr: u16, _config: &BusConfiguration) -> BusRead {
        if self.capabilities().contains(Capabilities::ULTIMAX_PASSTHROUGH) {
            BusRead::Host
        } else {
            BusRead::OpenBus
        }
    }

    fn read_roml(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.peek_roml(addr, bus.config())
    }

    fn read_romh(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.peek_romh(addr, bus.config())
    }

    fn read_io1(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.peek_io1(addr, bus.config())
    }

    fn read_io2(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.peek_io2(addr, bus.config())
    }

    fn read_ultimax(&mut self, addr: u16, bus: &mut PortBus<'_>) -> BusRead {
        self.peek_ultimax(addr, bus.config())
    }

    fn write_roml(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        rom_write(bus.config())
    }

    fn write_romh(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        rom_write(bus.config())
    }

    fn write_io1(&mut self, _addr: u16, _value: u8, _bus: &mut PortBus<'_>) {}

    fn write_io2(&mut self, _addr: u16, _value: u8, _bus: &mut PortBus<'_>) {}

    fn write_ultimax(&mut self, _addr: u16, _value: u8, _bus: &mut PortBus<'_>) -> WriteTarget {
        if self.capabilities().contains(Capabilities::ULTIMAX_PASSTHROUGH) {
            WriteTarget::Host
        } else {
            WriteTarget::Device
        }
    }

    /// Sees every write that lands in host memory.
    fn snoop_write(&mut self, _addr: u16, _value: u8, _bus: &mut PortBus<'_>) {}

    fn freeze_allowed(&self) -> bool {
        false
    }

    fn freeze(&mut self, _bus: &mut PortBus<'_>) {}

    /// Flip the device's user switch. Returns false if it has none.
    fn set_switch(&mut self, _on: bool, _bus: &mut PortBus<'_>) -> bool {
        false
    }

    fn tick(&mut self, _bus: &mut PortBus<'_>) {}

    /// Release resources; write back images that need it.
    fn detach(&mut self) {}

    fn snapshot_write(&self) -> SnapshotModule;

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError>;
}

/// ROM writes: host RAM underneath, except in Ultimax where there is none.
#[must_use]
pub fn rom_write(config: &BusConfiguration) -> WriteTarget {
    if config.mode() == Mode::Ultimax {
        WriteTarget::Device
    } else {
        WriteTarget::Host
    }
}

/// Check a module's version and return a reader over it.
pub(crate) fn open_module(
    module: &SnapshotModule,
    major: u8,
    minor: u8,
) -> Result<ModuleReader<'_>, SnapshotError> {
    module.check_version(major, minor)?;
    Ok(module.reader())
}

/// Write `data` back to `path`, logging rather than failing.
pub(crate) fn write_back(cart_type: CartridgeType, path: &Path, data: &[u8]) {
    match std::fs::write(path, data) {
        Ok(()) => log::info!("{cart_type}: wrote image back to {}", path.display()),
        Err(e) => log::warn!("{cart_type}: writing {} failed: {e}", path.display()),
    }
}

/// Load a companion RAM image, creating it if it does not exist yet.
pub(crate) fn load_companion(
    cart_type: CartridgeType,
    path: &Path,
    ram: &mut [u8],
) -> Result<(), AttachError> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let len = bytes.len().min(ram.len());
            ram[..len].copy_from_slice(&bytes[..len]);
            log::info!("{cart_type}: loaded {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::write(path, &*ram).map_err(|source| AttachError::CompanionResource {
                cart_type,
                path: path.to_path_buf(),
                source,
            })?;
            log::info!("{cart_type}: created {}", path.display());
            Ok(())
        }
        Err(source) => Err(AttachError::CompanionResource {
            cart_type,
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Reject a CRT whose header names a different type.
fn check_crt_type(cart_type: CartridgeType, crt: &CrtImage) -> Result<(), AttachError> {
    let found = CartridgeType::from_crt_header(crt.hardware_type, crt.exrom, crt.game)
        .ok_or(AttachError::UnknownCrtType(crt.hardware_type))?;
    let generic = |t: CartridgeType| {
        matches!(
            t,
            CartridgeType::Generic8k | CartridgeType::Generic16k | CartridgeType::Ultimax
        )
    };
    if found == cart_type || (generic(found) && generic(cart_type)) {
        Ok(())
    } else {
        Err(AttachError::CrtTypeMismatch {
            expected: cart_type,
            found,
        })
    }
}

/// Every driver, one variant each.
pub enum Cartridge {
    Generic(Generic),
    Ocean(Ocean),
    FunPlay(FunPlay),
    SuperGames(SuperGames),
    MagicDesk(MagicDesk),
    Comal80(Comal80),
    Rgcd(Rgcd),
    Dinamic(Dinamic),
    Gs(Gs),
    StructuredBasic(StructuredBasic),
    Ross(Ross),
    EasyFlash(EasyFlash),
    Megabyter(Megabyter),
    Universal(Universal),
    SimonsBasic(SimonsBasic),
    WarpSpeed(WarpSpeed),
    Westermann(Westermann),
    RexUtility(RexUtility),
    Mach5(Mach5),
    Zaxxon(Zaxxon),
    EpyxFastload(EpyxFastload),
    ActionReplay(ActionReplay),
    KcsPower(KcsPower),
    FinalI(FinalI),
    FinalIII(FinalIII),
    SuperSnapshotV5(SuperSnapshotV5),
    GameKiller(GameKiller),
    FreezeFrame(FreezeFrame),
    FreezeMachine(FreezeMachine),
    Expert(Expert),
    Isepic(Isepic),
    Dqbb(Dqbb),
    RamCart(RamCart),
    Mmc64(Mmc64),
    Ide64(Ide64),
    GeoRam(GeoRam),
    Reu(Reu),
}

macro_rules! dispatch {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            Cartridge::Generic($c) => $body,
            Cartridge::Ocean($c) => $body,
            Cartridge::FunPlay($c) => $body,
            Cartridge::SuperGames($c) => $body,
            Cartridge::MagicDesk($c) => $body,
            Cartridge::Comal80($c) => $body,
            Cartridge::Rgcd($c) => $body,
            Cartridge::Dinamic($c) => $body,
            Cartridge::Gs($c) => $body,
            Cartridge::StructuredBasic($c) => $body,
            Cartridge::Ross($c) => $body,
            Cartridge::EasyFlash($c) => $body,
            Cartridge::Megabyter($c) => $body,
            Cartridge::Universal($c) => $body,
            Cartridge::SimonsBasic($c) => $body,
            Cartridge::WarpSpeed($c) => $body,
            Cartridge::Westermann($c) => $body,
            Cartridge::RexUtility($c) => $body,
            Cartridge::Mach5($c) => $body,
            Cartridge::Zaxxon($c) => $body,
            Cartridge::EpyxFastload($c) => $body,
            Cartridge::ActionReplay($c) => $body,
            Cartridge::KcsPower($c) => $body,
            Cartridge::FinalI($c) => $body,
            Cartridge::FinalIII($c) => $body,
            Cartridge::SuperSnapshotV5($c) => $body,
            Cartridge::GameKiller($c) => $body,
            Cartridge::FreezeFrame($c) => $body,
            Cartridge::FreezeMachine($c) => $body,
            Cartridge::Expert($c) => $body,
            Cartridge::Isepic($c) => $body,
            Cartridge::Dqbb($c) => $body,
            Cartridge::RamCart($c) => $body,
            Cartridge::Mmc64($c) => $body,
            Cartridge::Ide64($c) => $body,
            Cartridge::GeoRam($c) => $body,
            Cartridge::Reu($c) => $body,
        }
    };
}

impl Cartridge {
    /// Build a driver from a raw binary image.
    pub fn from_binary(
        cart_type: CartridgeType,
        data: &[u8],
        ctx: AttachContext<'_>,
    ) -> Result<Self, AttachError> {
        use CartridgeType as T;
        let path = ctx.path.map(Path::to_path_buf);
        Ok(match cart_type {
            T::Generic8k | T::Generic16k | T::Ultimax => {
                Self::Generic(Generic::from_binary(cart_type, data)?)
            }
            T::Ocean => Self::Ocean(Ocean::from_binary(data)?),
            T::FunPlay => Self::FunPlay(FunPlay::from_binary(data)?),
            T::SuperGames => Self::SuperGames(SuperGames::from_binary(data)?),
            T::MagicDesk | T::MagicDesk16 => {
                Self::MagicDesk(MagicDesk::from_binary(cart_type, data)?)
            }
            T::Comal80 => Self::Comal80(Comal80::from_binary(data)?),
            T::Rgcd => Self::Rgcd(Rgcd::from_binary(data)?),
            T::Dinamic => Self::Dinamic(Dinamic::from_binary(data)?),
            T::Gs => Self::Gs(Gs::from_binary(data)?),
            T::StructuredBasic => Self::StructuredBasic(StructuredBasic::from_binary(data)?),
            T::Ross => Self::Ross(Ross::from_binary(data)?),
            T::EasyFlash => Self::EasyFlash(EasyFlash::from_binary(data, ctx.config, path)?),
            T::Megabyter => {
                Self::Megabyter(Megabyter::from_binary(data, &ctx.config.megabyter, path)?)
            }
            T::Uc1 | T::Uc15 | T::Uc2 => Self::Universal(Universal::from_binary(cart_type, data)?),
            T::SimonsBasic => Self::SimonsBasic(SimonsBasic::from_binary(data)?),
            T::WarpSpeed => Self::WarpSpeed(WarpSpeed::from_binary(data)?),
            T::Westermann => Self::Westermann(Westermann::from_binary(data)?),
            T::RexUtility => Self::RexUtility(RexUtility::from_binary(data)?),
            T::Mach5 => Self::Mach5(Mach5::from_binary(data)?),
            T::Zaxxon => Self::Zaxxon(Zaxxon::from_binary(data)?),
            T::EpyxFastload => Self::EpyxFastload(EpyxFastload::from_binary(data)?),
            T::ActionReplay | T::AtomicPower => {
                Self::ActionReplay(ActionReplay::from_binary(cart_type, data)?)
            }
            T::KcsPower => Self::KcsPower(KcsPower::from_binary(data)?),
            T::FinalI => Self::FinalI(FinalI::from_binary(data)?),
            T::FinalIII => Self::FinalIII(FinalIII::from_binary(data)?),
            T::SuperSnapshotV5 => Self::SuperSnapshotV5(SuperSnapshotV5::from_binary(data)?),
            T::GameKiller => Self::GameKiller(GameKiller::from_binary(data)?),
            T::FreezeFrame => Self::FreezeFrame(FreezeFrame::from_binary(data)?),
            T::FreezeMachine => Self::FreezeMachine(FreezeMachine::from_binary(data)?),
            T::Expert => Self::Expert(Expert::from_binary(data, &ctx.config.expert)?),
            T::Isepic => Self::Isepic(Isepic::from_binary(data, &ctx.config.isepic)?),
            T::Dqbb => Self::Dqbb(Dqbb::from_binary(data, &ctx.config.dqbb, path)?),
            T::RamCart => Self::RamCart(RamCart::from_binary(data, &ctx.config.ramcart, path)?),
            T::Mmc64 => Self::Mmc64(Mmc64::from_binary(data, &ctx.config.mmc64, path)?),
            T::Ide64 => Self::Ide64(Ide64::from_binary(data, &ctx.config.ide64)?),
            T::GeoRam => Self::GeoRam(GeoRam::from_binary(data, &ctx.config.georam, path)?),
            T::Reu => Self::Reu(Reu::from_binary(data, &ctx.config.reu)?),
        })
    }

    /// Build a driver from a parsed CRT image. The header type must match.
    pub fn from_crt(
        cart_type: CartridgeType,
        crt: &CrtImage,
        ctx: AttachContext<'_>,
    ) -> Result<Self, AttachError> {
        use CartridgeType as T;
        check_crt_type(cart_type, crt)?;
        let path = ctx.path.map(Path::to_path_buf);
        Ok(match cart_type {
            T::Generic8k | T::Generic16k | T::Ultimax => {
                Self::Generic(Generic::from_crt(cart_type, crt)?)
            }
            T::Ocean => Self::Ocean(Ocean::from_crt(crt)?),
            T::FunPlay => Self::FunPlay(FunPlay::from_crt(crt)?),
            T::SuperGames => Self::SuperGames(SuperGames::from_crt(crt)?),
            T::MagicDesk | T::MagicDesk16 => Self::MagicDesk(MagicDesk::from_crt(cart_type, crt)?),
            T::Comal80 => Self::Comal80(Comal80::from_crt(crt)?),
            T::Rgcd => Self::Rgcd(Rgcd::from_crt(crt)?),
            T::Dinamic => Self::Dinamic(Dinamic::from_crt(crt)?),
            T::Gs => Self::Gs(Gs::from_crt(crt)?),
            T::StructuredBasic => Self::StructuredBasic(StructuredBasic::from_crt(crt)?),
            T::Ross => Self::Ross(Ross::from_crt(crt)?),
            T::EasyFlash => Self::EasyFlash(EasyFlash::from_crt(crt, ctx.config, path)?),
            T::Megabyter => Self::Megabyter(Megabyter::from_crt(crt, &ctx.config.megabyter, path)?),
            T::Uc1 | T::Uc15 | T::Uc2 => Self::Universal(Universal::from_crt(cart_type, crt)?),
            T::SimonsBasic => Self::SimonsBasic(SimonsBasic::from_crt(crt)?),
            T::WarpSpeed => Self::WarpSpeed(WarpSpeed::from_crt(crt)?),
            T::Westermann => Self::Westermann(Westermann::from_crt(crt)?),
            T::RexUtility => Self::RexUtility(RexUtility::from_crt(crt)?),
            T::Mach5 => Self::Mach5(Mach5::from_crt(crt)?),
            T::Zaxxon => Self::Zaxxon(Zaxxon::from_crt(crt)?),
            T::EpyxFastload => Self::EpyxFastload(EpyxFastload::from_crt(crt)?),
            T::ActionReplay | T::AtomicPower => {
                Self::ActionReplay(ActionReplay::from_crt(cart_type, crt)?)
            }
            T::KcsPower => Self::KcsPower(KcsPower::from_crt(crt)?),
            T::FinalI => Self::FinalI(FinalI::from_crt(crt)?),
            T::FinalIII => Self::FinalIII(FinalIII::from_crt(crt)?),
            T::SuperSnapshotV5 => Self::SuperSnapshotV5(SuperSnapshotV5::from_crt(crt)?),
            T::GameKiller => Self::GameKiller(GameKiller::from_crt(crt)?),
            T::FreezeFrame => Self::FreezeFrame(FreezeFrame::from_crt(crt)?),
            T::FreezeMachine => Self::FreezeMachine(FreezeMachine::from_crt(crt)?),
            T::Expert => Self::Expert(Expert::from_crt(crt, &ctx.config.expert)?),
            T::Mmc64 => Self::Mmc64(Mmc64::from_crt(crt, &ctx.config.mmc64, path)?),
            T::Ide64 => Self::Ide64(Ide64::from_crt(crt, &ctx.config.ide64)?),
            T::Isepic | T::Dqbb | T::RamCart | T::GeoRam | T::Reu => {
                return Err(AttachError::Unsupported(cart_type));
            }
        })
    }

    /// Build a driver without an image: RAM expansions, or a ROM cartridge
    /// whose contents will come from a snapshot.
    pub fn empty(cart_type: CartridgeType, ctx: AttachContext<'_>) -> Result<Self, AttachError> {
        use CartridgeType as T;
        let path = ctx.path.map(Path::to_path_buf);
        Ok(match cart_type {
            T::Expert => Self::Expert(Expert::new(&ctx.config.expert)),
            T::Isepic => Self::Isepic(Isepic::new(&ctx.config.isepic)),
            T::Dqbb => Self::Dqbb(Dqbb::new(&ctx.config.dqbb)?),
            T::RamCart => Self::RamCart(RamCart::new(&ctx.config.ramcart)?),
            T::GeoRam => Self::GeoRam(GeoRam::new(&ctx.config.georam)?),
            T::Reu => Self::Reu(Reu::new(&ctx.config.reu)?),
            T::Ide64 => Self::Ide64(Ide64::blank(&ctx.config.ide64)?),
            T::Mmc64 => Self::Mmc64(Mmc64::blank(&ctx.config.mmc64, path)?),
            T::EasyFlash => Self::EasyFlash(EasyFlash::blank(ctx.config, path)),
            T::Megabyter => Self::Megabyter(Megabyter::blank(&ctx.config.megabyter)),
            rom => {
                // Any ROM cartridge: start from an erased image of the
                // largest size the hardware decodes.
                let blank = CrtImage::new(rom.crt_id().unwrap_or(0), rom.name());
                let mut crt = blank;
                if matches!(rom, T::Generic8k | T::Generic16k | T::Ultimax) {
                    crt.exrom = u8::from(rom == T::Ultimax);
                    crt.game = u8::from(rom == T::Generic8k);
                }
                Self::from_crt(rom, &crt, ctx)?
            }
        })
    }

    #[must_use]
    pub fn slot(&self) -> crate::slots::Slot {
        self.cart_type().slot()
    }

    /// Path an image will be written back to on detach, if any.
    #[must_use]
    pub fn backing_path(&self) -> Option<PathBuf> {
        match self {
            Self::Dqbb(c) => c.backing_path(),
            Self::RamCart(c) => c.backing_path(),
            Self::GeoRam(c) => c.backing_path(),
            Self::EasyFlash(c) => c.backing_path(),
            Self::Megabyter(c) => c.backing_path(),
            _ => None,
        }
    }
}

impl Driver for Cartridge {
    fn cart_type(&self) -> CartridgeType {
        dispatch!(self, c => c.cart_type())
    }

    fn capabilities(&self) -> Capabilities {
        dispatch!(self, c => c.capabilities())
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        dispatch!(self, c => c.config_init(bus));
    }

    fn config_reset(&mut self, bus: &mut PortBus<'_>) {
        dispatch!(self, c => c.config_reset(bus));
    }

    fn powerup(&mut self, bus: &mut PortBus<'_>) {
        dispatch!(self, c => c.powerup(bus));
    }

    fn peek_roml(&self, addr: u16, config: &BusConfiguration) -> Option<u8> {
        dispatch!(self, c => c.peek_roml(addr, config))
    }

    fn peek_romh(&self, addr: u16, config: &BusConfiguration) -> Option<u8> {
        dispatch!(self, c => c.peek_romh(addr, config))
    }

    fn peek_io1(&self, addr: u16, config: &BusConfiguration) -> Option<u8> {
        dispatch!(self, c => c.peek_io1(addr, config))
    }

    fn peek_io2(&self, addr: u16, config: &BusConfiguration) -> Option<u8> {
        dispatch!(self, c => c.peek_io2(addr, config))
    }

    fn peek_ultimax(&self, addr: u16, config: &BusConfiguration) -> BusRead {
        dispatch!(self, c => c.peek_ultimax(addr, config))
    }

    fn read_roml(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        dispatch!(self, c => c.read_roml(addr, bus))
    }

    fn read_romh(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        dispatch!(self, c => c.read_romh(addr, bus))
    }

    fn read_io1(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        dispatch!(self, c => c.read_io1(addr, bus))
    }

    fn read_io2(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        dispatch!(self, c => c.read_io2(addr, bus))
    }

    fn read_ultimax(&mut self, addr: u16, bus: &mut PortBus<'_>) -> BusRead {
        dispatch!(self, c => c.read_ultimax(addr, bus))
    }

    fn write_roml(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        dispatch!(self, c => c.write_roml(addr, value, bus))
    }

    fn write_romh(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        dispatch!(self, c => c.write_romh(addr, value, bus))
    }

    fn write_io1(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        dispatch!(self, c => c.write_io1(addr, value, bus));
    }

    fn write_io2(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        dispatch!(self, c => c.write_io2(addr, value, bus));
    }

    fn write_ultimax(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) -> WriteTarget {
        dispatch!(self, c => c.write_ultimax(addr, value, bus))
    }

    fn snoop_write(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        dispatch!(self, c => c.snoop_write(addr, value, bus));
    }

    fn freeze_allowed(&self) -> bool {
        dispatch!(self, c => c.freeze_allowed())
    }

    fn freeze(&mut self, bus: &mut PortBus<'_>) {
        dispatch!(self, c => c.freeze(bus));
    }

    fn set_switch(&mut self, on: bool, bus: &mut PortBus<'_>) -> bool {
        dispatch!(self, c => c.set_switch(on, bus))
    }

    fn tick(&mut self, bus: &mut PortBus<'_>) {
        dispatch!(self, c => c.tick(bus));
    }

    fn detach(&mut self) {
        dispatch!(self, c => c.detach());
    }

    fn snapshot_write(&self) -> SnapshotModule {
        dispatch!(self, c => c.snapshot_write())
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        dispatch!(self, c => c.snapshot_read(module, bus))
    }
}
