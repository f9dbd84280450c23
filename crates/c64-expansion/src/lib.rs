//! Commodore 64 expansion port.
//!
//! Cartridges and RAM expanders share one port. Each driver asks for a
//! memory configuration (GAME/EXROM, bank, export RAM); the port keeps
//! one request per slot and the highest-priority slot wins. Slot 0 sits
//! in front of Slot 1, which sits in front of the main cartridge. I/O-only
//! expanders (GeoRAM, REU) never change the mapping and share IO1/IO2
//! with whatever else is plugged in.
//!
//! The CPU core calls [`ExpansionPort::read`] and [`ExpansionPort::write`]
//! for every access and the port reports whether a device answered or
//! host memory should.

pub mod ata;
pub mod banked;
pub mod bus;
mod cartridge_type;
pub mod carts;
pub mod config;
pub mod decoder;
mod error;
pub mod flash;
pub mod freeze;
pub mod host;
pub mod image;
pub mod observe;
mod port;
pub mod sdcard;
mod slots;
pub mod snapshot;

pub use bus::{BusConfiguration, ConfigFlags, Mode};
pub use cartridge_type::CartridgeType;
pub use config::ExpansionConfig;
pub use decoder::{BusRead, Region, WriteTarget};
pub use error::{AttachError, ConfigError, SnapshotError};
pub use freeze::{FREEZE_DELAY, FreezeState};
pub use host::{Host, NullHost, SimpleHost};
pub use observe::{Observable, Value};
pub use port::{ExpansionPort, ImageSource, PORT_MODULE};
pub use slots::Slot;
pub use snapshot::{SnapshotContainer, SnapshotModule};
