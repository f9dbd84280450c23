//! Plain ROM cartridges: 8K, 16K and Ultimax.

use format_crt::CrtImage;

use crate::banked::BANK_8K;
use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::error::{AttachError, SnapshotError};
use crate::image::{BinaryLayout, CartRom, strip_load_address};
use crate::snapshot::SnapshotModule;

use super::{Driver, open_module};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

pub struct Generic {
    cart_type: CartridgeType,
    rom: CartRom,
}

impl Generic {
    pub fn from_binary(cart_type: CartridgeType, data: &[u8]) -> Result<Self, AttachError> {
        let rom = match cart_type {
            CartridgeType::Generic8k => {
                CartRom::from_binary(cart_type, data, BinaryLayout::Roml, 1)?
            }
            CartridgeType::Generic16k => {
                CartRom::from_binary(cart_type, data, BinaryLayout::Pairs, 1)?
            }
            _ => Self::ultimax_binary(data)?,
        };
        Ok(Self { cart_type, rom })
    }

    /// 4K images sit at $F000, 8K at $E000, 16K fill both windows.
    fn ultimax_binary(data: &[u8]) -> Result<CartRom, AttachError> {
        let data = strip_load_address(data, |len| matches!(len, 0x1000 | 0x2000 | 0x4000));
        let mut rom = CartRom::blank(1);
        match data.len() {
            0x1000 => {
                rom.romh.load(0, 0x1000, data);
            }
            0x2000 => {
                rom.romh.load(0, 0, data);
            }
            0x4000 => {
                rom.roml.load(0, 0, &data[..BANK_8K]);
                rom.romh.load(0, 0, &data[BANK_8K..]);
            }
            size => {
                return Err(AttachError::UnsupportedSize {
                    cart_type: CartridgeType::Ultimax,
                    size,
                });
            }
        }
        Ok(rom)
    }

    pub fn from_crt(cart_type: CartridgeType, crt: &CrtImage) -> Result<Self, AttachError> {
        Ok(Self {
            cart_type,
            rom: CartRom::from_crt(cart_type, crt, 1)?,
        })
    }

    fn mode(&self) -> Mode {
        match self.cart_type {
            CartridgeType::Generic8k => Mode::Game8k,
            CartridgeType::Generic16k => Mode::Game16k,
            _ => Mode::Ultimax,
        }
    }
}

impl Driver for Generic {
    fn cart_type(&self) -> CartridgeType {
        self.cart_type
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        bus.set_mode(self.mode(), 0, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.roml(0, addr)
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.rom.romh(0, addr)
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(self.cart_type.snapshot_name(), SNAP_MAJOR, SNAP_MINOR);
        m.write_u8(self.mode().bits());
        self.rom.write_snapshot(&mut m);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let cart_type = match Mode::from_bits(r.read_u8()?) {
            Mode::Game8k => CartridgeType::Generic8k,
            Mode::Game16k => CartridgeType::Generic16k,
            Mode::Ultimax => CartridgeType::Ultimax,
            Mode::Ram => return Err(r.rejected("generic cartridge in RAM mode")),
        };
        self.rom = CartRom::read_snapshot(&mut r)?;
        self.cart_type = cart_type;
        self.config_init(bus);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carts::rig::Rig;

    #[test]
    fn generic_8k_maps_roml() {
        let mut cart =
            Generic::from_binary(CartridgeType::Generic8k, &vec![0xa9; BANK_8K]).expect("8K");
        let mut rig = Rig::new();
        rig.init(&mut cart);
        assert_eq!(rig.config.mode(), Mode::Game8k);
        assert_eq!(cart.peek_roml(0x8000, &rig.config), Some(0xa9));
    }

    #[test]
    fn ultimax_4k_lands_at_f000() {
        let cart = Generic::from_binary(CartridgeType::Ultimax, &vec![0x4c; 0x1000]).expect("4K");
        let config = BusConfiguration::new();
        assert_eq!(cart.peek_romh(0xe000, &config), Some(0xff));
        assert_eq!(cart.peek_romh(0xfffc, &config), Some(0x4c));
    }

    #[test]
    fn ultimax_odd_size_rejected() {
        assert!(matches!(
            Generic::from_binary(CartridgeType::Ultimax, &[0; 0x3000]),
            Err(AttachError::UnsupportedSize { size: 0x3000, .. })
        ));
    }

    #[test]
    fn snapshot_restores_mode_and_rom() {
        let mut data = vec![1; BANK_8K];
        data.extend(vec![2; BANK_8K]);
        let cart = Generic::from_binary(CartridgeType::Generic16k, &data).expect("16K");
        let mut restored =
            Generic::from_crt(CartridgeType::Generic8k, &CrtImage::new(0, "blank")).expect("blank");
        let mut rig = Rig::new();
        rig.round_trip(&cart, &mut restored);
        assert_eq!(restored.cart_type(), CartridgeType::Generic16k);
        assert_eq!(rig.config.mode(), Mode::Game16k);
        assert_eq!(restored.peek_romh(0xa000, &rig.config), Some(2));
    }
}
