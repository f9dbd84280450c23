//! Logical expansion slots and their conflict groups.
//!
//! | Slot    | Members                           | Mapping priority |
//! |---------|-----------------------------------|------------------|
//! | Slot 0  | MMC64                             | highest          |
//! | Slot 1  | Expert, ISEPIC, DQBB, RamCart     |                  |
//! | Main    | every ROM cartridge               | lowest           |
//! | I/O     | GeoRAM, REU                       | never maps ROM   |
//!
//! Each of Slot 0, Slot 1 and Main holds at most one device; attaching a
//! member evicts whichever member is already there. I/O devices coexist
//! with everything, one per type.

use crate::cartridge_type::CartridgeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Slot0,
    Slot1,
    Main,
    Io,
}

impl Slot {
    /// Slots that can own the ROM mapping, highest priority first.
    pub const MAPPING_ORDER: [Self; 3] = [Self::Slot0, Self::Slot1, Self::Main];

    /// Index into per-slot request storage. `None` for the I/O slot.
    #[must_use]
    pub fn mapping_index(self) -> Option<usize> {
        match self {
            Self::Slot0 => Some(0),
            Self::Slot1 => Some(1),
            Self::Main => Some(2),
            Self::Io => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Slot0 => "slot0",
            Self::Slot1 => "slot1",
            Self::Main => "main",
            Self::Io => "io",
        }
    }

    /// Types that cannot be attached alongside `cart_type`.
    ///
    /// The type itself is included: re-attaching replaces.
    #[must_use]
    pub fn conflicts_of(cart_type: CartridgeType) -> Vec<CartridgeType> {
        match cart_type.slot() {
            Slot::Io => vec![cart_type],
            slot => CartridgeType::ALL
                .into_iter()
                .filter(|t| t.slot() == slot)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot1_group_contains_all_members() {
        let group = Slot::conflicts_of(CartridgeType::Dqbb);
        for t in [
            CartridgeType::Expert,
            CartridgeType::Isepic,
            CartridgeType::Dqbb,
            CartridgeType::RamCart,
        ] {
            assert!(group.contains(&t), "{t} missing");
        }
        assert_eq!(group.len(), 4);
    }

    #[test]
    fn io_devices_only_conflict_with_themselves() {
        assert_eq!(
            Slot::conflicts_of(CartridgeType::GeoRam),
            vec![CartridgeType::GeoRam]
        );
    }

    #[test]
    fn main_group_excludes_slot_devices() {
        let group = Slot::conflicts_of(CartridgeType::Ocean);
        assert!(group.contains(&CartridgeType::EasyFlash));
        assert!(!group.contains(&CartridgeType::Mmc64));
        assert!(!group.contains(&CartridgeType::Reu));
    }
}
