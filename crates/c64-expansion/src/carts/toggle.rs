//! Cartridges that switch mode on a bare I/O access.
//!
//! None of these latch data. The address window and the direction of the
//! access pick the new mode:
//!
//! | Type        | $DE00 read | $DE00 write | $DF00 read     | $DF00 write |
//! |-------------|------------|-------------|----------------|-------------|
//! | Simons      | 8K         | 16K         |                |             |
//! | Warp Speed  | ROM mirror | 16K         | ROM mirror     | off         |
//! | Westermann  |            |             | 8K             |             |
//! | Rex Utility |            |             | off/8K, zero   |             |
//! | Mach 5      | 8K, mirror | 8K          | mirror         | off         |

use format_crt::CrtImage;

use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::error::{AttachError, SnapshotError};
use crate::image::{BinaryLayout, CartRom};
use crate::snapshot::SnapshotModule;

use super::{Driver, open_module};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

/// ROM and current mode shared by every toggle cartridge.
struct Toggle {
    cart_type: CartridgeType,
    rom: CartRom,
    mode: Mode,
}

impl Toggle {
    fn set(&mut self, mode: Mode, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        self.mode = mode;
        bus.set_mode(mode, 0, flags);
    }

    /// Last two pages of the first ROML bank, as seen through I/O.
    fn io_mirror(&self, addr: u16, page: u16) -> Option<u8> {
        self.rom.roml(0, page | (addr & 0xff))
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(self.cart_type.snapshot_name(), SNAP_MAJOR, SNAP_MINOR);
        m.write_u8(self.mode.bits());
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
        self.rom = CartRom::read_snapshot(&mut r)?;
        self.set(mode, bus, ConfigFlags::READ);
        Ok(())
    }
}

macro_rules! toggle_common {
    () => {
        fn cart_type(&self) -> CartridgeType {
            self.0.cart_type
        }

        fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
            self.0.rom.roml(0, addr)
        }

        fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
            self.0.rom.romh(0, addr)
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

fn toggle_binary(
    cart_type: CartridgeType,
    data: &[u8],
    layout: BinaryLayout,
    mode: Mode,
) -> Result<Toggle, AttachError> {
    Ok(Toggle {
        cart_type,
        rom: CartRom::from_binary(cart_type, data, layout, 1)?,
        mode,
    })
}

fn toggle_crt(cart_type: CartridgeType, crt: &CrtImage, mode: Mode) -> Result<Toggle, AttachError> {
    Ok(Toggle {
        cart_type,
        rom: CartRom::from_crt(cart_type, crt, 1)?,
        mode,
    })
}

/// Simons' BASIC: 16K, with $DE00 reads hiding the upper half.
pub struct SimonsBasic(Toggle);

impl SimonsBasic {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        toggle_binary(
            CartridgeType::SimonsBasic,
            data,
            BinaryLayout::Pairs,
            Mode::Game16k,
        )
        .map(Self)
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        toggle_crt(CartridgeType::SimonsBasic, crt, Mode::Game16k).map(Self)
    }
}

impl Driver for SimonsBasic {
    toggle_common!();

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.0.set(Mode::Game16k, bus, ConfigFlags::READ);
    }

    fn read_io1(&mut self, _addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.0.set(Mode::Game8k, bus, ConfigFlags::READ);
        None
    }

    fn write_io1(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.0.set(Mode::Game16k, bus, ConfigFlags::WRITE);
    }
}

pub struct WarpSpeed(Toggle);

impl WarpSpeed {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        toggle_binary(CartridgeType::WarpSpeed, data, BinaryLayout::Pairs, Mode::Game16k).map(Self)
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        toggle_crt(CartridgeType::WarpSpeed, crt, Mode::Game16k).map(Self)
    }
}

impl Driver for WarpSpeed {
    toggle_common!();

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.0.set(Mode::Game16k, bus, ConfigFlags::READ);
    }

    fn peek_io1(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.0.io_mirror(addr, 0x1e00)
    }

    fn peek_io2(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.0.io_mirror(addr, 0x1f00)
    }

    fn write_io1(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.0.set(Mode::Game16k, bus, ConfigFlags::WRITE);
    }

    fn write_io2(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.0.set(Mode::Ram, bus, ConfigFlags::WRITE);
    }
}

/// Westermann Learning: 16K until the first $DF00 read.
pub struct Westermann(Toggle);

impl Westermann {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        toggle_binary(CartridgeType::Westermann, data, BinaryLayout::Pairs, Mode::Game16k).map(Self)
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        toggle_crt(CartridgeType::Westermann, crt, Mode::Game16k).map(Self)
    }
}

impl Driver for Westermann {
    toggle_common!();

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.0.set(Mode::Game16k, bus, ConfigFlags::READ);
    }

    fn read_io2(&mut self, _addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.0.set(Mode::Game8k, bus, ConfigFlags::READ);
        None
    }
}

pub struct RexUtility(Toggle);

impl RexUtility {
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        toggle_binary(CartridgeType::RexUtility, data, BinaryLayout::Roml, Mode::Game8k).map(Self)
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        toggle_crt(CartridgeType::RexUtility, crt, Mode::Game8k).map(Self)
    }
}

impl Driver for RexUtility {
    toggle_common!();

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.0.set(Mode::Game8k, bus, ConfigFlags::READ);
    }

    fn peek_io2(&self, _addr: u16, _config: &BusConfiguration) -> Option<u8> {
        Some(0)
    }

    /// $DF00-$DFBF switches the ROM out, $DFC0-$DFFF back in.
    fn read_io2(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        let mode = if addr & 0xff < 0xc0 {
            Mode::Ram
        } else {
            Mode::Game8k
        };
        self.0.set(mode, bus, ConfigFlags::READ);
        Some(0)
    }
}

pub struct Mach5(Toggle);

impl Mach5 {
    /// 4K images are mirrored to fill the 8K window.
    pub fn from_binary(data: &[u8]) -> Result<Self, AttachError> {
        let doubled;
        let data = if data.len() == 0x1000 || data.len() == 0x1002 {
            let body = &data[data.len() - 0x1000..];
            doubled = [body, body].concat();
            &doubled[..]
        } else {
            data
        };
        toggle_binary(CartridgeType::Mach5, data, BinaryLayout::Roml, Mode::Game8k).map(Self)
    }

    pub fn from_crt(crt: &CrtImage) -> Result<Self, AttachError> {
        let mut toggle = toggle_crt(CartridgeType::Mach5, crt, Mode::Game8k)?;
        if let Some(chip) = crt.chips.first().filter(|c| c.data.len() == 0x1000) {
            toggle.rom.roml.load(0, 0x1000, &chip.data);
        }
        Ok(Self(toggle))
    }
}

impl Driver for Mach5 {
    toggle_common!();

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.0.set(Mode::Game8k, bus, ConfigFlags::READ);
    }

    fn peek_io1(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.0.io_mirror(addr, 0x1e00)
    }

    fn peek_io2(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.0.io_mirror(addr, 0x1f00)
    }

    fn read_io1(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        self.0.set(Mode::Game8k, bus, ConfigFlags::READ);
        self.0.io_mirror(addr, 0x1e00)
    }

    fn write_io1(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.0.set(Mode::Game8k, bus, ConfigFlags::WRITE);
    }

    fn write_io2(&mut self, _addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        self.0.set(Mode::Ram, bus, ConfigFlags::WRITE);
    }
}
