//! Double Quick Brown Box.
//!
//! Battery-backed RAM in 16K banks, shown at $8000-$BFFF. The control
//! register at $DE00 (mirrored through the page) is write-only:
//!
//! | Bit | Meaning                                  |
//! |-----|------------------------------------------|
//! | 0-1 | bank, low bits                           |
//! | 2   | GAME                                     |
//! | 3   | bank bit 2                               |
//! | 4   | RAM is writable                          |
//! | 5   | bank bit 3                               |
//! | 6   | EXROM                                    |
//! | 7   | cartridge off                            |
//!
//! With the mode switch in the C64 position EXROM is always pulled, so
//! the box can only show 8K or 16K. In the C128 position GAME alone gives
//! Ultimax. Writes into the window also reach the host RAM underneath.

use std::path::PathBuf;

use crate::banked::{BANK_16K, BankedImage};
use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::config::DqbbConfig;
use crate::decoder::WriteTarget;
use crate::error::{AttachError, SnapshotError};
use crate::snapshot::SnapshotModule;

use super::{Driver, load_companion, open_module, write_back};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

const SIZES_KB: [u32; 5] = [16, 32, 64, 128, 256];

pub struct Dqbb {
    ram: BankedImage,
    register: u8,
    c64_mode: bool,
    write_back: bool,
    path: Option<PathBuf>,
}

impl Dqbb {
    /// Empty RAM, or the configured image if there is one.
    pub fn new(config: &DqbbConfig) -> Result<Self, AttachError> {
        let mut dqbb = Self::sized(config, config.image.clone())?;
        if let Some(path) = &config.image {
            load_companion(CartridgeType::Dqbb, path, dqbb.ram.as_bytes_mut())?;
        }
        Ok(dqbb)
    }

    /// RAM contents from a raw image; its length picks the size.
    pub fn from_binary(
        data: &[u8],
        config: &DqbbConfig,
        path: Option<PathBuf>,
    ) -> Result<Self, AttachError> {
        let size_kb = u32::try_from(data.len() / 1024).unwrap_or(0);
        if data.len() % 1024 != 0 || !SIZES_KB.contains(&size_kb) {
            return Err(AttachError::UnsupportedSize {
                cart_type: CartridgeType::Dqbb,
                size: data.len(),
            });
        }
        let sized = DqbbConfig {
            size_kb,
            ..config.clone()
        };
        let mut dqbb = Self::sized(&sized, path)?;
        dqbb.ram.replace(data);
        Ok(dqbb)
    }

    fn sized(config: &DqbbConfig, path: Option<PathBuf>) -> Result<Self, AttachError> {
        if !SIZES_KB.contains(&config.size_kb) {
            return Err(AttachError::UnsupportedSize {
                cart_type: CartridgeType::Dqbb,
                size: config.size_kb as usize * 1024,
            });
        }
        Ok(Self {
            ram: BankedImage::new(BANK_16K, config.size_kb as usize / 16),
            register: 0,
            c64_mode: config.c64_mode,
            write_back: config.write_back,
            path,
        })
    }

    #[must_use]
    pub fn backing_path(&self) -> Option<PathBuf> {
        self.path.clone().filter(|_| self.write_back)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.ram.len()
    }

    fn bank(&self) -> usize {
        let b = self.register;
        let bank = (b & 3) | ((b >> 1) & 4) | ((b >> 2) & 8);
        usize::from(bank) & (self.ram.bank_count() - 1)
    }

    fn writable(&self) -> bool {
        self.register & 0x10 != 0
    }

    fn mode(&self) -> Mode {
        let game = self.register & 0x04 != 0;
        let exrom = self.register & 0x40 != 0;
        if self.register & 0x80 != 0 {
            Mode::Ram
        } else if self.c64_mode || exrom {
            if game { Mode::Game16k } else { Mode::Game8k }
        } else if game {
            Mode::Ultimax
        } else {
            Mode::Ram
        }
    }

    fn apply(&self, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        let mode = self.mode();
        if mode == Mode::Ram {
            bus.pass_through(flags);
        } else {
            bus.set_mode(mode, 0, flags);
        }
    }

    fn store(&mut self, offset: usize, value: u8) -> WriteTarget {
        if self.writable() {
            self.ram.write(self.bank(), offset, value);
            WriteTarget::Both
        } else {
            WriteTarget::Host
        }
    }
}

impl Driver for Dqbb {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Dqbb
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.register = 0;
        self.apply(bus, ConfigFlags::READ);
    }

    fn powerup(&mut self, bus: &mut PortBus<'_>) {
        if self.path.is_none() {
            self.ram.fill(0);
        }
        self.config_init(bus);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.ram.read(self.bank(), usize::from(addr & 0x1fff))
    }

    fn peek_romh(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.ram.read(self.bank(), 0x2000 | usize::from(addr & 0x1fff))
    }

    fn peek_io1(&self, _addr: u16, _config: &BusConfiguration) -> Option<u8> {
        Some(self.register)
    }

    // The register cannot be read back by the CPU.
    fn read_io1(&mut self, _addr: u16, _bus: &mut PortBus<'_>) -> Option<u8> {
        None
    }

    fn write_roml(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) -> WriteTarget {
        self.store(usize::from(addr & 0x1fff), value)
    }

    fn write_romh(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) -> WriteTarget {
        self.store(0x2000 | usize::from(addr & 0x1fff), value)
    }

    fn write_io1(&mut self, _addr: u16, value: u8, bus: &mut PortBus<'_>) {
        self.register = value;
        self.apply(bus, ConfigFlags::WRITE);
    }

    fn detach(&mut self) {
        if let Some(path) = self.backing_path() {
            write_back(CartridgeType::Dqbb, &path, self.ram.as_bytes());
        }
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Dqbb.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.register);
        m.write_bool(self.c64_mode);
        m.write_image(&self.ram);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let register = r.read_u8()?;
        let c64_mode = r.read_bool()?;
        let ram = r.read_image_like(&self.ram)?;
        self.register = register;
        self.c64_mode = c64_mode;
        self.ram = ram;
        self.apply(bus, ConfigFlags::READ);
        Ok(())
    }
}
