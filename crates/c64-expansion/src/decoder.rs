//! Address decoding for the expansion port.
//!
//! Resolution is recomputed from the live [`BusConfiguration`] on every
//! access; nothing is cached across a remap.
//!
//! | Range       | 8K     | 16K    | RAM  | Ultimax       |
//! |-------------|--------|--------|------|---------------|
//! | $0000-$0FFF | host   | host   | host | host          |
//! | $1000-$7FFF | host   | host   | host | `UltimaxLow`  |
//! | $8000-$9FFF | `RomL` | `RomL` | host | `RomL`        |
//! | $A000-$BFFF | host   | `RomH` | host | `UltimaxA000` |
//! | $C000-$CFFF | host   | host   | host | `UltimaxC000` |
//! | $DE00-$DEFF | `Io1`  | `Io1`  | `Io1`| `Io1`         |
//! | $DF00-$DFFF | `Io2`  | `Io2`  | `Io2`| `Io2`         |
//! | $E000-$FFFF | host   | host   | host | `RomH`        |
//!
//! The rest of $D000-$DFFF always belongs to the host's I/O chips.

use crate::bus::{BusConfiguration, Mode};

/// Where an address lands under the current mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Host,
    RomL,
    RomH,
    Io1,
    Io2,
    /// $1000-$7FFF in Ultimax.
    UltimaxLow,
    /// $A000-$BFFF in Ultimax.
    UltimaxA000,
    /// $C000-$CFFF in Ultimax.
    UltimaxC000,
}

impl Region {
    /// The Ultimax holes, where real hardware shows nothing.
    #[must_use]
    pub fn is_ultimax_hole(self) -> bool {
        matches!(
            self,
            Self::UltimaxLow | Self::UltimaxA000 | Self::UltimaxC000
        )
    }
}

#[must_use]
pub fn resolve(config: &BusConfiguration, addr: u16) -> Region {
    match addr {
        0xde00..=0xdeff => return Region::Io1,
        0xdf00..=0xdfff => return Region::Io2,
        _ => {}
    }
    match (config.mode(), addr) {
        (Mode::Game8k | Mode::Game16k | Mode::Ultimax, 0x8000..=0x9fff) => Region::RomL,
        (Mode::Game16k, 0xa000..=0xbfff) | (Mode::Ultimax, 0xe000..=0xffff) => Region::RomH,
        (Mode::Ultimax, 0x1000..=0x7fff) => Region::UltimaxLow,
        (Mode::Ultimax, 0xa000..=0xbfff) => Region::UltimaxA000,
        (Mode::Ultimax, 0xc000..=0xcfff) => Region::UltimaxC000,
        _ => Region::Host,
    }
}

/// Outcome of a read through the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusRead {
    /// A device drove the bus.
    Data(u8),
    /// Nothing drove the bus; the CPU sees the last value on it.
    OpenBus,
    /// The port is not involved; the host answers from its own memory.
    Host,
}

impl BusRead {
    /// `Data` if a device drove the bus, otherwise open bus.
    #[must_use]
    pub fn driven(value: Option<u8>) -> Self {
        value.map_or(Self::OpenBus, Self::Data)
    }

    /// Collapse to a byte, given what the host and the floating bus hold.
    #[must_use]
    pub fn resolve(self, host: u8, open_bus: u8) -> u8 {
        match self {
            Self::Data(v) => v,
            Self::OpenBus => open_bus,
            Self::Host => host,
        }
    }
}

/// Who stores a written byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    /// Only the device.
    Device,
    /// Only host RAM underneath.
    Host,
    /// Device and host RAM both.
    Both,
}

impl WriteTarget {
    #[must_use]
    pub fn reaches_host(self) -> bool {
        matches!(self, Self::Host | Self::Both)
    }
}
