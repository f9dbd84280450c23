//! Cartridge hardware types.
//!
//! Ids follow the numbering used by CRT files for positive values. Negative
//! ids are for devices that have no CRT form (binary images, RAM
//! expansions) and are never written to a CRT header.

use std::fmt;

use crate::slots::Slot;

/// Every expansion-port device the port knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CartridgeType {
    Generic8k,
    Generic16k,
    Ultimax,
    ActionReplay,
    KcsPower,
    FinalIII,
    SimonsBasic,
    Ocean,
    Expert,
    FunPlay,
    SuperGames,
    AtomicPower,
    EpyxFastload,
    Westermann,
    RexUtility,
    FinalI,
    Gs,
    WarpSpeed,
    Dinamic,
    Zaxxon,
    MagicDesk,
    SuperSnapshotV5,
    Comal80,
    StructuredBasic,
    Ross,
    EasyFlash,
    Mmc64,
    Ide64,
    GameKiller,
    FreezeFrame,
    FreezeMachine,
    Mach5,
    Rgcd,
    MagicDesk16,
    Uc1,
    Uc15,
    Uc2,
    Megabyter,
    Dqbb,
    GeoRam,
    Isepic,
    RamCart,
    Reu,
}

impl CartridgeType {
    pub const ALL: [Self; 43] = [
        Self::Generic8k,
        Self::Generic16k,
        Self::Ultimax,
        Self::ActionReplay,
        Self::KcsPower,
        Self::FinalIII,
        Self::SimonsBasic,
        Self::Ocean,
        Self::Expert,
        Self::FunPlay,
        Self::SuperGames,
        Self::AtomicPower,
        Self::EpyxFastload,
        Self::Westermann,
        Self::RexUtility,
        Self::FinalI,
        Self::Gs,
        Self::WarpSpeed,
        Self::Dinamic,
        Self::Zaxxon,
        Self::MagicDesk,
        Self::SuperSnapshotV5,
        Self::Comal80,
        Self::StructuredBasic,
        Self::Ross,
        Self::EasyFlash,
        Self::Mmc64,
        Self::Ide64,
        Self::GameKiller,
        Self::FreezeFrame,
        Self::FreezeMachine,
        Self::Mach5,
        Self::Rgcd,
        Self::MagicDesk16,
        Self::Uc1,
        Self::Uc15,
        Self::Uc2,
        Self::Megabyter,
        Self::Dqbb,
        Self::GeoRam,
        Self::Isepic,
        Self::RamCart,
        Self::Reu,
    ];

    /// Numeric hardware id.
    #[must_use]
    pub fn id(self) -> i16 {
        match self {
            Self::Generic8k => -3,
            Self::Generic16k => -2,
            Self::Ultimax => -6,
            Self::ActionReplay => 1,
            Self::KcsPower => 2,
            Self::FinalIII => 3,
            Self::SimonsBasic => 4,
            Self::Ocean => 5,
            Self::Expert => 6,
            Self::FunPlay => 7,
            Self::SuperGames => 8,
            Self::AtomicPower => 9,
            Self::EpyxFastload => 10,
            Self::Westermann => 11,
            Self::RexUtility => 12,
            Self::FinalI => 13,
            Self::Gs => 15,
            Self::WarpSpeed => 16,
            Self::Dinamic => 17,
            Self::Zaxxon => 18,
            Self::MagicDesk => 19,
            Self::SuperSnapshotV5 => 20,
            Self::Comal80 => 21,
            Self::StructuredBasic => 22,
            Self::Ross => 23,
            Self::EasyFlash => 32,
            Self::Mmc64 => 37,
            Self::Ide64 => 39,
            Self::GameKiller => 42,
            Self::FreezeFrame => 45,
            Self::FreezeMachine => 46,
            Self::Mach5 => 51,
            Self::Rgcd => 57,
            Self::MagicDesk16 => 79,
            Self::Uc1 => 80,
            Self::Uc15 => 81,
            Self::Uc2 => 82,
            Self::Megabyter => 83,
            Self::Dqbb => -101,
            Self::GeoRam => -102,
            Self::Isepic => -103,
            Self::RamCart => -104,
            Self::Reu => -105,
        }
    }

    #[must_use]
    pub fn from_id(id: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Generic8k => "Generic 8K",
            Self::Generic16k => "Generic 16K",
            Self::Ultimax => "Ultimax",
            Self::ActionReplay => "Action Replay",
            Self::KcsPower => "KCS Power Cartridge",
            Self::FinalIII => "Final Cartridge III",
            Self::SimonsBasic => "Simons' BASIC",
            Self::Ocean => "Ocean",
            Self::Expert => "Expert Cartridge",
            Self::FunPlay => "Fun Play",
            Self::SuperGames => "Super Games",
            Self::AtomicPower => "Atomic Power",
            Self::EpyxFastload => "Epyx FastLoad",
            Self::Westermann => "Westermann Learning",
            Self::RexUtility => "Rex Utility",
            Self::FinalI => "Final Cartridge",
            Self::Gs => "C64 Game System",
            Self::WarpSpeed => "Warp Speed",
            Self::Dinamic => "Dinamic",
            Self::Zaxxon => "Zaxxon",
            Self::MagicDesk => "Magic Desk",
            Self::SuperSnapshotV5 => "Super Snapshot V5",
            Self::Comal80 => "Comal-80",
            Self::StructuredBasic => "Structured BASIC",
            Self::Ross => "Ross",
            Self::EasyFlash => "EasyFlash",
            Self::Mmc64 => "MMC64",
            Self::Ide64 => "IDE64",
            Self::GameKiller => "Game Killer",
            Self::FreezeFrame => "Freeze Frame",
            Self::FreezeMachine => "Freeze Machine",
            Self::Mach5 => "Mach 5",
            Self::Rgcd => "RGCD",
            Self::MagicDesk16 => "Magic Desk 16",
            Self::Uc1 => "Universal Cartridge 1",
            Self::Uc15 => "Universal Cartridge 1.5",
            Self::Uc2 => "Universal Cartridge 2",
            Self::Megabyter => "Megabyter",
            Self::Dqbb => "Double Quick Brown Box",
            Self::GeoRam => "GeoRAM",
            Self::Isepic => "ISEPIC",
            Self::RamCart => "RamCart",
            Self::Reu => "REU",
        }
    }

    /// Name of the snapshot module that carries this device's state.
    #[must_use]
    pub fn snapshot_name(self) -> &'static str {
        match self {
            Self::Generic8k | Self::Generic16k | Self::Ultimax => "CARTGENERIC",
            Self::ActionReplay => "CARTAR",
            Self::KcsPower => "CARTKCS",
            Self::FinalIII => "CARTFINALV3",
            Self::SimonsBasic => "CARTSIMON",
            Self::Ocean => "CARTOCEAN",
            Self::Expert => "CARTEXPERT",
            Self::FunPlay => "CARTFUNPLAY",
            Self::SuperGames => "CARTSUPERGAMES",
            Self::AtomicPower => "CARTAP",
            Self::EpyxFastload => "CARTEPYX",
            Self::Westermann => "CARTWESTERMANN",
            Self::RexUtility => "CARTREX",
            Self::FinalI => "CARTFINALV1",
            Self::Gs => "CARTGS",
            Self::WarpSpeed => "CARTWARPSPEED",
            Self::Dinamic => "CARTDINAMIC",
            Self::Zaxxon => "CARTZAXXON",
            Self::MagicDesk => "CARTMAGICDESK",
            Self::SuperSnapshotV5 => "CARTSS5",
            Self::Comal80 => "CARTCOMAL",
            Self::StructuredBasic => "CARTSTB",
            Self::Ross => "CARTROSS",
            Self::EasyFlash => "CARTEF",
            Self::Mmc64 => "CARTMMC64",
            Self::Ide64 => "CARTIDE",
            Self::GameKiller => "CARTGK",
            Self::FreezeFrame => "CARTFREEZEF",
            Self::FreezeMachine => "CARTFREEZEM",
            Self::Mach5 => "CARTMACH5",
            Self::Rgcd => "CARTRGCD",
            Self::MagicDesk16 => "CARTMAGICDESK16",
            Self::Uc1 => "CARTUC1",
            Self::Uc15 | Self::Uc2 => "CARTUC2",
            Self::Megabyter => "CARTMEGABYTER",
            Self::Dqbb => "CARTDQBB",
            Self::GeoRam => "GEORAM",
            Self::Isepic => "CARTISEPIC",
            Self::RamCart => "CARTRAMCART",
            Self::Reu => "REU1764",
        }
    }

    /// Slot this type occupies.
    #[must_use]
    pub fn slot(self) -> Slot {
        match self {
            Self::Mmc64 => Slot::Slot0,
            Self::Expert | Self::Isepic | Self::Dqbb | Self::RamCart => Slot::Slot1,
            Self::GeoRam | Self::Reu => Slot::Io,
            _ => Slot::Main,
        }
    }

    /// RAM expansions are attached without a ROM image.
    #[must_use]
    pub fn is_ram_device(self) -> bool {
        matches!(
            self,
            Self::Dqbb | Self::GeoRam | Self::Isepic | Self::RamCart | Self::Reu | Self::Expert
        )
    }

    /// Id written to a CRT header, if the type has a CRT form.
    #[must_use]
    pub fn crt_id(self) -> Option<u16> {
        match self {
            Self::Generic8k | Self::Generic16k | Self::Ultimax => Some(0),
            t if t.id() > 0 => Some(t.id() as u16),
            _ => None,
        }
    }

    /// Resolve a CRT header. Hardware type 0 picks the generic flavour
    /// from the header's EXROM/GAME bytes (0 = asserted).
    #[must_use]
    pub fn from_crt_header(hardware_type: u16, exrom: u8, game: u8) -> Option<Self> {
        if hardware_type == 0 {
            return Some(match (exrom == 0, game == 0) {
                (true, true) => Self::Generic16k,
                (false, true) => Self::Ultimax,
                _ => Self::Generic8k,
            });
        }
        let id = i16::try_from(hardware_type).ok()?;
        Self::from_id(id).filter(|t| t.crt_id() == Some(hardware_type))
    }
}

impl fmt::Display for CartridgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_round_trip() {
        for t in CartridgeType::ALL {
            assert_eq!(CartridgeType::from_id(t.id()), Some(t));
        }
        let mut ids: Vec<i16> = CartridgeType::ALL.iter().map(|t| t.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CartridgeType::ALL.len());
    }

    #[test]
    fn crt_type_zero_uses_lines() {
        assert_eq!(
            CartridgeType::from_crt_header(0, 0, 1),
            Some(CartridgeType::Generic8k)
        );
        assert_eq!(
            CartridgeType::from_crt_header(0, 0, 0),
            Some(CartridgeType::Generic16k)
        );
        assert_eq!(
            CartridgeType::from_crt_header(0, 1, 0),
            Some(CartridgeType::Ultimax)
        );
    }

    #[test]
    fn crt_ids_map_to_types() {
        assert_eq!(
            CartridgeType::from_crt_header(5, 0, 0),
            Some(CartridgeType::Ocean)
        );
        assert_eq!(
            CartridgeType::from_crt_header(32, 1, 0),
            Some(CartridgeType::EasyFlash)
        );
        assert_eq!(
            CartridgeType::from_crt_header(83, 0, 1),
            Some(CartridgeType::Megabyter)
        );
        assert_eq!(CartridgeType::from_crt_header(999, 0, 0), None);
    }

    #[test]
    fn ram_devices_have_no_crt_id() {
        assert_eq!(CartridgeType::GeoRam.crt_id(), None);
        assert_eq!(CartridgeType::Dqbb.crt_id(), None);
        assert_eq!(CartridgeType::Ocean.crt_id(), Some(5));
    }

    #[test]
    fn slot_assignment() {
        assert_eq!(CartridgeType::Mmc64.slot(), Slot::Slot0);
        assert_eq!(CartridgeType::Isepic.slot(), Slot::Slot1);
        assert_eq!(CartridgeType::Reu.slot(), Slot::Io);
        assert_eq!(CartridgeType::Ocean.slot(), Slot::Main);
        assert_eq!(CartridgeType::Uc2.slot(), Slot::Main);
        assert_eq!(CartridgeType::Megabyter.slot(), Slot::Main);
    }
}
