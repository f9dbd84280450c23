//! GeoRAM.
//!
//! Up to 4M of RAM in 16K blocks of 64 pages. The selected page shows at
//! $DE00-$DEFF. Two write-only registers, mirrored through $DF80-$DFFF,
//! select it: odd addresses take the block, even ones the page. Values
//! past the installed size wrap. The device never touches GAME/EXROM.

use std::path::PathBuf;

use crate::bus::{BusConfiguration, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::config::GeoRamConfig;
use crate::error::{AttachError, SnapshotError};
use crate::snapshot::SnapshotModule;

use super::{Driver, load_companion, open_module, write_back};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

const BLOCK_SIZE: usize = 0x4000;
const PAGES_PER_BLOCK: u8 = 64;

pub struct GeoRam {
    ram: Vec<u8>,
    block: u8,
    page: u8,
    write_back: bool,
    path: Option<PathBuf>,
}

fn valid_size(size_kb: u32) -> bool {
    (64..=4096).contains(&size_kb) && size_kb.is_power_of_two()
}

impl GeoRam {
    pub fn new(config: &GeoRamConfig) -> Result<Self, AttachError> {
        let mut georam = Self::sized(config, config.image.clone())?;
        if let Some(path) = &config.image {
            load_companion(CartridgeType::GeoRam, path, &mut georam.ram)?;
        }
        Ok(georam)
    }

    /// RAM contents from a raw image; its length picks the size.
    pub fn from_binary(
        data: &[u8],
        config: &GeoRamConfig,
        path: Option<PathBuf>,
    ) -> Result<Self, AttachError> {
        let size_kb = u32::try_from(data.len() / 1024).unwrap_or(0);
        if data.len() % 1024 != 0 || !valid_size(size_kb) {
            return Err(AttachError::UnsupportedSize {
                cart_type: CartridgeType::GeoRam,
                size: data.len(),
            });
        }
        let sized = GeoRamConfig {
            size_kb,
            ..config.clone()
        };
        let mut georam = Self::sized(&sized, path)?;
        georam.ram.copy_from_slice(data);
        Ok(georam)
    }

    fn sized(config: &GeoRamConfig, path: Option<PathBuf>) -> Result<Self, AttachError> {
        if !valid_size(config.size_kb) {
            return Err(AttachError::UnsupportedSize {
                cart_type: CartridgeType::GeoRam,
                size: config.size_kb as usize * 1024,
            });
        }
        Ok(Self {
            ram: vec![0; config.size_kb as usize * 1024],
            block: 0,
            page: 0,
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

    /// Block and page currently selected.
    #[must_use]
    pub fn window(&self) -> (u8, u8) {
        (self.block, self.page)
    }

    fn blocks(&self) -> usize {
        self.ram.len() / BLOCK_SIZE
    }

    fn offset(&self, addr: u16) -> usize {
        usize::from(self.block) * BLOCK_SIZE
            + usize::from(self.page) * 0x100
            + usize::from(addr & 0xff)
    }
}

impl Driver for GeoRam {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::GeoRam
    }

    fn config_init(&mut self, _bus: &mut PortBus<'_>) {
        self.block = 0;
        self.page = 0;
    }

    fn powerup(&mut self, bus: &mut PortBus<'_>) {
        if self.path.is_none() {
            self.ram.fill(0);
        }
        self.config_init(bus);
    }

    fn peek_io1(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        Some(self.ram[self.offset(addr)])
    }

    fn peek_io2(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        match addr & 0xff {
            0x80..=0xff if addr & 1 == 1 => Some(self.block),
            0x80..=0xff => Some(self.page),
            _ => None,
        }
    }

    // The registers are write-only.
    fn read_io2(&mut self, _addr: u16, _bus: &mut PortBus<'_>) -> Option<u8> {
        None
    }

    fn write_io1(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) {
        let i = self.offset(addr);
        self.ram[i] = value;
    }

    fn write_io2(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) {
        if addr & 0x80 == 0 {
            return;
        }
        if addr & 1 == 1 {
            self.block = (usize::from(value) % self.blocks()) as u8;
        } else {
            self.page = value % PAGES_PER_BLOCK;
        }
    }

    fn detach(&mut self) {
        if let Some(path) = self.backing_path() {
            write_back(CartridgeType::GeoRam, &path, &self.ram);
        }
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::GeoRam.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.page);
        m.write_u8(self.block);
        m.write_block(&self.ram);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        _bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let page = r.read_u8()?;
        let block = r.read_u8()?;
        let ram = r.read_block()?;
        let size_kb = u32::try_from(ram.len() / 1024).unwrap_or(0);
        if ram.len() % 1024 != 0 || !valid_size(size_kb) {
            return Err(r.rejected("bad RAM size"));
        }
        self.ram = ram;
        self.page = page % PAGES_PER_BLOCK;
        self.block = (usize::from(block) % self.blocks()) as u8;
        Ok(())
    }
}
