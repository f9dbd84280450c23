//! MMC64: SD card interface with an 8K flash BIOS.
//!
//! Sits in slot 0, so a main cartridge plugged into its pass-through port
//! stays usable. Registers live at $DF10-$DF13, and also at $DE10-$DE13
//! while the flash jumper is set:
//!
//! | Reg   | Read                          | Write                        |
//! |-------|-------------------------------|------------------------------|
//! | $DF10 | last SPI byte from the card   | SPI byte to the card         |
//! | $DF11 | control                       | control                      |
//! | $DF12 | status                        | -                            |
//! | $DF13 | identification                | unlock sequences             |
//!
//! Control: bit 0 BIOS off, bit 1 card deselected, bit 2 8MHz clock,
//! bit 3 clock port at $DF20, bit 4 flash mode (only with the jumper),
//! bit 5 external ROM disabled, bit 6 SPI read trigger, bit 7 device
//! disabled. Bit 7 only takes effect after `55 AA` was written to $DF13;
//! `0A 1C` there re-enables a disabled device. A disabled device ignores
//! everything except $DF13 writes.
//!
//! The BIOS shows at ROML by way of a RAM/8K split: phi2 (CPU) accesses
//! see the BIOS, phi1 (VIC) accesses see RAM. The clock port is not
//! emulated.

use std::path::PathBuf;

use format_crt::{ChipPacket, ChipType, CrtImage};
use log::{debug, info};

use crate::banked::BANK_8K;
use crate::bus::{BusConfiguration, ConfigFlags, Mode, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::config::Mmc64Config;
use crate::decoder::WriteTarget;
use crate::error::{AttachError, SnapshotError};
use crate::image::CartRom;
use crate::sdcard::SdCard;
use crate::snapshot::SnapshotModule;

use super::{Driver, open_module, write_back};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

const CTRL_BIOS_OFF: u8 = 0x01;
const CTRL_CARD_DESELECT: u8 = 0x02;
const CTRL_FLASH_MODE: u8 = 0x10;
const CTRL_READ_TRIGGER: u8 = 0x40;
const CTRL_DISABLED: u8 = 0x80;

/// Where a reflashed BIOS goes on detach.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BiosFile {
    /// Raw 8K, optionally behind a two-byte load address.
    Binary { load_address: Option<[u8; 2]> },
    Crt { name: String },
}

pub struct Mmc64 {
    bios: Vec<u8>,
    bios_file: BiosFile,
    bios_changed: bool,
    bios_write_back: bool,
    path: Option<PathBuf>,
    card: SdCard,
    control: u8,
    spi_data: u8,
    unlock: [u8; 2],
    unlocked: bool,
    flash_jumper: bool,
    revision: u8,
}

impl Mmc64 {
    /// BIOS from an 8K binary, with or without a load address.
    pub fn from_binary(
        data: &[u8],
        config: &Mmc64Config,
        path: Option<PathBuf>,
    ) -> Result<Self, AttachError> {
        let (load_address, bios) = match data.len() {
            BANK_8K => (None, data),
            len if len == BANK_8K + 2 => (Some([data[0], data[1]]), &data[2..]),
            size => {
                return Err(AttachError::UnsupportedSize {
                    cart_type: CartridgeType::Mmc64,
                    size,
                });
            }
        };
        Self::with_bios(bios.to_vec(), BiosFile::Binary { load_address }, config, path)
    }

    pub fn from_crt(
        crt: &CrtImage,
        config: &Mmc64Config,
        path: Option<PathBuf>,
    ) -> Result<Self, AttachError> {
        let rom = CartRom::from_crt(CartridgeType::Mmc64, crt, 1)?;
        let bios = rom.roml.bank(0).map(<[u8]>::to_vec).unwrap_or_default();
        let name = crt.name.clone();
        Self::with_bios(bios, BiosFile::Crt { name }, config, path)
    }

    /// Erased BIOS, for a snapshot to fill.
    pub fn blank(config: &Mmc64Config, path: Option<PathBuf>) -> Result<Self, AttachError> {
        Self::with_bios(
            vec![0xff; BANK_8K],
            BiosFile::Binary { load_address: None },
            config,
            path,
        )
    }

    fn with_bios(
        bios: Vec<u8>,
        bios_file: BiosFile,
        config: &Mmc64Config,
        path: Option<PathBuf>,
    ) -> Result<Self, AttachError> {
        let card = match &config.card_image {
            Some(image) => SdCard::open(image, config.card_read_only).map_err(|source| {
                AttachError::CompanionResource {
                    cart_type: CartridgeType::Mmc64,
                    path: image.clone(),
                    source,
                }
            })?,
            None => SdCard::empty(),
        };
        Ok(Self {
            bios,
            bios_file,
            bios_changed: false,
            bios_write_back: config.bios_write_back,
            path,
            card,
            control: CTRL_CARD_DESELECT,
            spi_data: 0xff,
            unlock: [0; 2],
            unlocked: false,
            flash_jumper: config.flash_jumper,
            revision: config.revision,
        })
    }

    #[must_use]
    pub fn card(&self) -> &SdCard {
        &self.card
    }

    #[must_use]
    pub fn bios_changed(&self) -> bool {
        self.bios_changed
    }

    fn disabled(&self) -> bool {
        self.control & CTRL_DISABLED != 0
    }

    fn bios_visible(&self) -> bool {
        self.control & (CTRL_DISABLED | CTRL_BIOS_OFF) == 0
    }

    fn apply(&self, bus: &mut PortBus<'_>, flags: ConfigFlags) {
        if self.bios_visible() {
            bus.apply_configuration(Mode::Ram, Mode::Game8k, 0, flags);
        } else {
            bus.pass_through(flags);
        }
    }

    fn register(addr: u16) -> Option<u8> {
        match addr & 0xff {
            0x10..=0x13 => Some((addr & 0x03) as u8),
            _ => None,
        }
    }

    fn status(&self) -> u8 {
        // EXROM and GAME of the pass-through port read back high: nothing
        // is asserting them from here.
        let mut status = 0x06;
        if !self.card.inserted() {
            status |= 0x08;
        }
        if self.card.write_protected() {
            status |= 0x10;
        }
        if self.flash_jumper {
            status |= 0x20;
        }
        status
    }

    fn identification(&self) -> u8 {
        if self.control & CTRL_CARD_DESELECT == 0 {
            0x64
        } else if self.revision != 0 {
            2
        } else {
            1
        }
    }

    fn peek_register(&self, addr: u16) -> Option<u8> {
        if self.disabled() {
            return None;
        }
        match Self::register(addr)? {
            0 => Some(self.spi_data),
            1 => Some(self.control),
            2 => Some(self.status()),
            _ => Some(self.identification()),
        }
    }

    fn read_register(&mut self, addr: u16) -> Option<u8> {
        let value = self.peek_register(addr)?;
        if Self::register(addr) == Some(0) && self.control & CTRL_READ_TRIGGER != 0 {
            self.spi_data = self.card.transfer(0xff);
        }
        Some(value)
    }

    fn write_register(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        let Some(reg) = Self::register(addr) else {
            return;
        };
        if reg == 3 {
            self.unlock = [self.unlock[1], value];
            match self.unlock {
                [0x55, 0xaa] => {
                    debug!("MMC64: control bit 7 unlocked");
                    self.unlocked = true;
                }
                [0x0a, 0x1c] => {
                    info!("MMC64: re-enabled");
                    self.control &= !CTRL_DISABLED;
                    self.apply(bus, ConfigFlags::WRITE);
                }
                _ => {}
            }
            return;
        }
        if self.disabled() {
            return;
        }
        match reg {
            0 => self.spi_data = self.card.transfer(value),
            1 => self.write_control(value, bus),
            _ => {}
        }
    }

    fn write_control(&mut self, value: u8, bus: &mut PortBus<'_>) {
        let mut keep = 0;
        if !self.flash_jumper {
            keep |= CTRL_FLASH_MODE;
        }
        if !self.unlocked {
            keep |= CTRL_DISABLED;
        }
        self.control = (value & !keep) | (self.control & keep);
        self.card.select(self.control & CTRL_CARD_DESELECT == 0);
        if self.disabled() {
            info!("MMC64: disabled");
        }
        self.apply(bus, ConfigFlags::WRITE);
    }

    /// The BIOS as it should be written back.
    fn bios_file_bytes(&self) -> Result<Vec<u8>, format_crt::CrtError> {
        match &self.bios_file {
            BiosFile::Binary { load_address } => {
                let mut bytes = load_address.map(Vec::from).unwrap_or_default();
                bytes.extend_from_slice(&self.bios);
                Ok(bytes)
            }
            BiosFile::Crt { name } => {
                let mut crt = CrtImage::new(CartridgeType::Mmc64.crt_id().unwrap_or(37), name);
                crt.exrom = 0;
                crt.game = 1;
                crt.chips.push(ChipPacket {
                    chip_type: ChipType::Flash,
                    bank: 0,
                    load_address: 0x8000,
                    data: self.bios.clone(),
                });
                crt.to_bytes()
            }
        }
    }
}

impl Driver for Mmc64 {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Mmc64
    }

    fn config_init(&mut self, bus: &mut PortBus<'_>) {
        self.control = CTRL_CARD_DESELECT;
        self.spi_data = 0xff;
        self.unlock = [0; 2];
        self.unlocked = false;
        self.card.reset();
        self.apply(bus, ConfigFlags::READ);
    }

    fn peek_roml(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.bios_visible()
            .then(|| self.bios.get(usize::from(addr & 0x1fff)).copied())
            .flatten()
    }

    fn peek_io1(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        if self.flash_jumper {
            self.peek_register(addr)
        } else {
            None
        }
    }

    fn peek_io2(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        self.peek_register(addr)
    }

    fn read_io1(&mut self, addr: u16, _bus: &mut PortBus<'_>) -> Option<u8> {
        if self.flash_jumper {
            self.read_register(addr)
        } else {
            None
        }
    }

    fn read_io2(&mut self, addr: u16, _bus: &mut PortBus<'_>) -> Option<u8> {
        self.read_register(addr)
    }

    fn write_roml(&mut self, addr: u16, value: u8, _bus: &mut PortBus<'_>) -> WriteTarget {
        if self.bios_visible() && self.flash_jumper && self.control & CTRL_FLASH_MODE != 0 {
            let i = usize::from(addr & 0x1fff);
            if let Some(byte) = self.bios.get_mut(i)
                && *byte != value
            {
                *byte = value;
                self.bios_changed = true;
            }
            return WriteTarget::Device;
        }
        WriteTarget::Host
    }

    fn write_io1(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        if self.flash_jumper {
            self.write_register(addr, value, bus);
        }
    }

    fn write_io2(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        self.write_register(addr, value, bus);
    }

    fn detach(&mut self) {
        self.card.flush();
        if !(self.bios_write_back && self.bios_changed) {
            return;
        }
        let Some(path) = &self.path else {
            return;
        };
        match self.bios_file_bytes() {
            Ok(bytes) => write_back(CartridgeType::Mmc64, path, &bytes),
            Err(e) => log::warn!("MMC64: cannot encode BIOS for write-back: {e}"),
        }
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Mmc64.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.control);
        m.write_u8(self.spi_data);
        m.write_bytes(&self.unlock);
        m.write_bool(self.unlocked);
        m.write_bool(self.flash_jumper);
        m.write_u8(self.revision);
        m.write_bool(self.bios_changed);
        m.write_block(&self.bios);
        self.card.write_snapshot(&mut m);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let control = r.read_u8()?;
        let spi_data = r.read_u8()?;
        let mut unlock = [0; 2];
        r.read_into(&mut unlock)?;
        let unlocked = r.read_bool()?;
        let flash_jumper = r.read_bool()?;
        let revision = r.read_u8()?;
        let bios_changed = r.read_bool()?;
        let bios = r.read_block()?;
        if bios.len() != BANK_8K {
            return Err(r.rejected("BIOS is not 8K"));
        }
        // The card commits only once its whole section has been read.
        self.card.read_snapshot(&mut r)?;
        self.control = control;
        self.spi_data = spi_data;
        self.unlock = unlock;
        self.unlocked = unlocked;
        self.flash_jumper = flash_jumper;
        self.revision = revision;
        self.bios_changed = bios_changed;
        self.bios = bios;
        self.apply(bus, ConfigFlags::READ);
        Ok(())
    }
}
