//! ATA hard disk behind a register file.
//!
//! Registers by index (command block 0-7, control block 0xE):
//!
//! | Idx | Read             | Write                    |
//! |-----|------------------|--------------------------|
//! | 0   | data (16-bit)    | data (16-bit)            |
//! | 1   | error            | features                 |
//! | 2   | sector count     | sector count             |
//! | 3   | sector / LBA 0-7 | sector / LBA 0-7         |
//! | 4   | cylinder low     | cylinder low / LBA 8-15  |
//! | 5   | cylinder high    | cylinder high / LBA 16-23|
//! | 6   | device/head      | device/head / LBA 24-27  |
//! | 7   | status           | command                  |
//! | E   | alternate status | device control           |
//!
//! Commands complete instantly: the drive is never busy. Sector data goes
//! through a 512-byte buffer that the host drains or fills one word at a
//! time while DRQ is set.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use bitflags::bitflags;
use log::{debug, warn};

use crate::config::Geometry;
use crate::error::SnapshotError;
use crate::snapshot::{ModuleReader, SnapshotModule};

pub const SECTOR_SIZE: usize = 512;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const ERR = 0x01;
        const DRQ = 0x08;
        const DSC = 0x10;
        const DF = 0x20;
        const DRDY = 0x40;
        const BSY = 0x80;
    }
}

const ERROR_ABRT: u8 = 0x04;
const ERROR_IDNF: u8 = 0x10;
const ERROR_UNC: u8 = 0x40;

const DEVICE_LBA: u8 = 0x40;
const CONTROL_SRST: u8 = 0x04;

pub const CMD_RECALIBRATE: u8 = 0x10;
pub const CMD_READ_SECTORS: u8 = 0x20;
pub const CMD_WRITE_SECTORS: u8 = 0x30;
pub const CMD_EXECUTE_DIAGNOSTIC: u8 = 0x90;
pub const CMD_INITIALIZE_PARAMETERS: u8 = 0x91;
pub const CMD_READ_BUFFER: u8 = 0xe4;
pub const CMD_WRITE_BUFFER: u8 = 0xe8;
pub const CMD_IDENTIFY: u8 = 0xec;

/// What the data register is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    None,
    /// Host reads the buffer; `sectors` more follow once it is drained.
    Read { sectors: u16 },
    /// Host fills the buffer; it is written out once full.
    Write { sectors: u16 },
    /// Buffer-only transfers.
    ReadBuffer,
    WriteBuffer,
}

impl Transfer {
    fn code(self) -> (u8, u16) {
        match self {
            Self::None => (0, 0),
            Self::Read { sectors } => (1, sectors),
            Self::Write { sectors } => (2, sectors),
            Self::ReadBuffer => (3, 0),
            Self::WriteBuffer => (4, 0),
        }
    }

    fn from_code(code: u8, sectors: u16) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::Read { sectors },
            2 => Self::Write { sectors },
            3 => Self::ReadBuffer,
            4 => Self::WriteBuffer,
            _ => return None,
        })
    }
}

pub struct AtaDrive {
    image: Option<File>,
    read_only: bool,
    /// Total sectors on the image.
    capacity: u32,
    /// Native geometry, reported by IDENTIFY.
    geometry: Geometry,
    /// Translation set by INITIALIZE DEVICE PARAMETERS.
    logical: Geometry,
    error: u8,
    features: u8,
    count: u8,
    sector: u8,
    cylinder: u16,
    device: u8,
    status: Status,
    control: u8,
    buffer: [u8; SECTOR_SIZE],
    position: usize,
    transfer: Transfer,
}

impl Default for AtaDrive {
    fn default() -> Self {
        Self::absent()
    }
}

/// Geometry for a disk of `capacity` sectors: 16 heads of 63 sectors
/// where it fits.
#[must_use]
pub fn derive_geometry(capacity: u32) -> Geometry {
    let sectors = capacity.clamp(1, 63);
    let heads = (capacity / sectors).clamp(1, 16);
    let cylinders = (capacity / (sectors * heads)).clamp(1, 65535);
    Geometry {
        cylinders: cylinders as u16,
        heads: heads as u8,
        sectors: sectors as u8,
    }
}

impl AtaDrive {
    /// No drive on the cable.
    #[must_use]
    pub fn absent() -> Self {
        let geometry = Geometry {
            cylinders: 0,
            heads: 0,
            sectors: 0,
        };
        Self {
            image: None,
            read_only: true,
            capacity: 0,
            geometry,
            logical: geometry,
            error: 0,
            features: 0,
            count: 0,
            sector: 0,
            cylinder: 0,
            device: 0,
            status: Status::empty(),
            control: 0,
            buffer: [0; SECTOR_SIZE],
            position: 0,
            transfer: Transfer::None,
        }
    }

    /// A drive backed by the image at `path`.
    pub fn open(
        path: &Path,
        geometry: Option<Geometry>,
        read_only: bool,
    ) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)?;
        let capacity = u32::try_from(file.metadata()?.len() / SECTOR_SIZE as u64).unwrap_or(u32::MAX);
        let geometry = geometry.unwrap_or_else(|| derive_geometry(capacity));
        debug!(
            "ATA: {} ({} sectors, CHS {}/{}/{})",
            path.display(),
            capacity,
            geometry.cylinders,
            geometry.heads,
            geometry.sectors
        );
        let mut drive = Self {
            image: Some(file),
            read_only,
            capacity,
            geometry,
            logical: geometry,
            ..Self::absent()
        };
        drive.reset();
        Ok(drive)
    }

    #[must_use]
    pub fn present(&self) -> bool {
        self.image.is_some()
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Power-on or software reset: diagnostic signature in the registers.
    pub fn reset(&mut self) {
        self.logical = self.geometry;
        self.set_signature();
        self.transfer = Transfer::None;
        self.position = 0;
    }

    fn set_signature(&mut self) {
        self.error = 0x01;
        self.count = 1;
        self.sector = 1;
        self.cylinder = 0;
        self.device = 0;
        self.status = if self.present() {
            Status::DRDY | Status::DSC
        } else {
            Status::empty()
        };
    }

    pub fn flush(&mut self) {
        if let Some(file) = &mut self.image
            && let Err(e) = file.flush()
        {
            warn!("ATA: flushing image failed: {e}");
        }
    }

    /// Register read without side effects.
    #[must_use]
    pub fn peek(&self, reg: u8) -> u16 {
        if !self.present() {
            return 0xff;
        }
        match reg & 0x0f {
            0 => self.peek_word(),
            1 => u16::from(self.error),
            2 => u16::from(self.count),
            3 => u16::from(self.sector),
            4 => self.cylinder & 0xff,
            5 => self.cylinder >> 8,
            6 => u16::from(self.device | 0xa0),
            7 | 0x0e => u16::from(self.status.bits()),
            _ => 0xff,
        }
    }

    pub fn read(&mut self, reg: u8) -> u16 {
        if reg & 0x0f == 0 && self.present() {
            self.read_word()
        } else {
            self.peek(reg)
        }
    }

    pub fn write(&mut self, reg: u8, value: u16) {
        if !self.present() {
            return;
        }
        let byte = value as u8;
        match reg & 0x0f {
            0 => self.write_word(value),
            1 => self.features = byte,
            2 => self.count = byte,
            3 => self.sector = byte,
            4 => self.cylinder = (self.cylinder & 0xff00) | u16::from(byte),
            5 => self.cylinder = (self.cylinder & 0x00ff) | (u16::from(byte) << 8),
            6 => self.device = byte & 0x5f,
            7 => self.command(byte),
            0x0e => self.device_control(byte),
            _ => {}
        }
    }

    fn device_control(&mut self, value: u8) {
        let was_reset = self.control & CONTROL_SRST != 0;
        self.control = value;
        if value & CONTROL_SRST != 0 {
            self.status = Status::BSY;
            self.transfer = Transfer::None;
        } else if was_reset {
            debug!("ATA: software reset");
            self.reset();
        }
    }

    fn peek_word(&self) -> u16 {
        match self.transfer {
            Transfer::Read { .. } | Transfer::ReadBuffer if self.position < SECTOR_SIZE => {
                u16::from_le_bytes([self.buffer[self.position], self.buffer[self.position + 1]])
            }
            _ => 0xffff,
        }
    }

    fn read_word(&mut self) -> u16 {
        let word = self.peek_word();
        if !matches!(self.transfer, Transfer::Read { .. } | Transfer::ReadBuffer) {
            return word;
        }
        self.position += 2;
        if self.position >= SECTOR_SIZE {
            match self.transfer {
                Transfer::Read { sectors } if sectors > 1 => {
                    self.advance();
                    self.transfer = Transfer::Read {
                        sectors: sectors - 1,
                    };
                    self.load_sector();
                }
                _ => self.complete(),
            }
        }
        word
    }

    fn write_word(&mut self, value: u16) {
        if !matches!(self.transfer, Transfer::Write { .. } | Transfer::WriteBuffer) {
            return;
        }
        let [lo, hi] = value.to_le_bytes();
        self.buffer[self.position] = lo;
        self.buffer[self.position + 1] = hi;
        self.position += 2;
        if self.position < SECTOR_SIZE {
            return;
        }
        match self.transfer {
            Transfer::Write { sectors } => {
                if !self.store_sector() {
                    return;
                }
                if sectors > 1 {
                    self.advance();
                    self.transfer = Transfer::Write {
                        sectors: sectors - 1,
                    };
                    self.position = 0;
                } else {
                    self.complete();
                }
            }
            _ => self.complete(),
        }
    }

    fn complete(&mut self) {
        self.transfer = Transfer::None;
        self.position = 0;
        self.status = Status::DRDY | Status::DSC;
    }

    fn abort(&mut self, error: u8) {
        self.transfer = Transfer::None;
        self.position = 0;
        self.error = error;
        self.status = Status::DRDY | Status::DSC | Status::ERR;
    }

    fn start(&mut self, transfer: Transfer) {
        self.transfer = transfer;
        self.position = 0;
        self.status = Status::DRDY | Status::DSC | Status::DRQ;
    }

    fn command(&mut self, command: u8) {
        debug!("ATA: command {command:02x}");
        self.error = 0;
        let sectors = if self.count == 0 {
            256
        } else {
            u16::from(self.count)
        };
        match command {
            CMD_READ_SECTORS | 0x21 => {
                self.transfer = Transfer::Read { sectors };
                self.load_sector();
            }
            CMD_WRITE_SECTORS | 0x31 => {
                if self.read_only {
                    self.abort(ERROR_ABRT);
                } else if self.lba().is_none() {
                    self.abort(ERROR_IDNF);
                } else {
                    self.start(Transfer::Write { sectors });
                }
            }
            CMD_IDENTIFY => {
                self.buffer = self.identify();
                self.start(Transfer::ReadBuffer);
            }
            CMD_READ_BUFFER => self.start(Transfer::ReadBuffer),
            CMD_WRITE_BUFFER => self.start(Transfer::WriteBuffer),
            CMD_INITIALIZE_PARAMETERS => {
                self.logical = Geometry {
                    cylinders: self.geometry.cylinders,
                    heads: (self.device & 0x0f) + 1,
                    sectors: self.count,
                };
                self.complete();
            }
            CMD_EXECUTE_DIAGNOSTIC => {
                self.set_signature();
                self.transfer = Transfer::None;
            }
            CMD_RECALIBRATE..=0x1f => {
                self.cylinder = 0;
                self.complete();
            }
            _ => self.abort(ERROR_ABRT),
        }
    }

    /// Sector the registers point at, or None if outside the disk.
    fn lba(&self) -> Option<u32> {
        let lba = if self.device & DEVICE_LBA != 0 {
            (u32::from(self.device & 0x0f) << 24)
                | (u32::from(self.cylinder) << 8)
                | u32::from(self.sector)
        } else {
            let Geometry { heads, sectors, .. } = self.logical;
            let head = self.device & 0x0f;
            if self.sector == 0 || self.sector > sectors || head >= heads {
                return None;
            }
            (u32::from(self.cylinder) * u32::from(heads) + u32::from(head)) * u32::from(sectors)
                + u32::from(self.sector - 1)
        };
        (lba < self.capacity).then_some(lba)
    }

    /// Step the address registers to the next sector.
    fn advance(&mut self) {
        if self.device & DEVICE_LBA != 0 {
            let lba = ((u32::from(self.device & 0x0f) << 24)
                | (u32::from(self.cylinder) << 8)
                | u32::from(self.sector))
            .wrapping_add(1);
            self.sector = lba as u8;
            self.cylinder = (lba >> 8) as u16;
            self.device = (self.device & 0xf0) | ((lba >> 24) as u8 & 0x0f);
            return;
        }
        if self.sector < self.logical.sectors {
            self.sector += 1;
            return;
        }
        self.sector = 1;
        let head = (self.device & 0x0f) + 1;
        if head < self.logical.heads {
            self.device = (self.device & 0xf0) | head;
        } else {
            self.device &= 0xf0;
            self.cylinder = self.cylinder.wrapping_add(1);
        }
    }

    fn load_sector(&mut self) {
        let Some(lba) = self.lba() else {
            self.abort(ERROR_IDNF);
            return;
        };
        let Some(file) = self.image.as_mut() else {
            self.abort(ERROR_ABRT);
            return;
        };
        let result = file
            .seek(SeekFrom::Start(u64::from(lba) * SECTOR_SIZE as u64))
            .and_then(|_| file.read_exact(&mut self.buffer));
        match result {
            Ok(()) => {
                let transfer = self.transfer;
                self.start(transfer);
            }
            Err(e) => {
                warn!("ATA: reading sector {lba} failed: {e}");
                self.abort(ERROR_UNC);
            }
        }
    }

    fn store_sector(&mut self) -> bool {
        let Some(lba) = self.lba() else {
            self.abort(ERROR_IDNF);
            return false;
        };
        let Some(file) = self.image.as_mut() else {
            self.abort(ERROR_ABRT);
            return false;
        };
        let result = file
            .seek(SeekFrom::Start(u64::from(lba) * SECTOR_SIZE as u64))
            .and_then(|_| file.write_all(&self.buffer));
        if let Err(e) = result {
            warn!("ATA: writing sector {lba} failed: {e}");
            self.abort(ERROR_UNC);
            return false;
        }
        true
    }

    /// IDENTIFY DEVICE data.
    fn identify(&self) -> [u8; SECTOR_SIZE] {
        let mut words = [0u16; 256];
        let Geometry {
            cylinders,
            heads,
            sectors,
        } = self.geometry;
        words[0] = 0x0040;
        words[1] = cylinders;
        words[3] = u16::from(heads);
        words[4] = u16::from(sectors) * SECTOR_SIZE as u16;
        words[5] = SECTOR_SIZE as u16;
        words[6] = u16::from(sectors);
        put_string(&mut words[10..20], "CX0000000001");
        words[20] = 3;
        words[21] = SECTOR_SIZE as u16 / 512;
        put_string(&mut words[23..27], "1.0");
        put_string(&mut words[27..47], "C64 EXPANSION HARDDISK");
        words[49] = 0x0200;
        words[53] = 0x0001;
        let logical = self.logical;
        words[54] = logical.cylinders;
        words[55] = u16::from(logical.heads);
        words[56] = u16::from(logical.sectors);
        let chs_capacity =
            u32::from(logical.cylinders) * u32::from(logical.heads) * u32::from(logical.sectors);
        words[57] = chs_capacity as u16;
        words[58] = (chs_capacity >> 16) as u16;
        words[60] = self.capacity as u16;
        words[61] = (self.capacity >> 16) as u16;

        let mut bytes = [0u8; SECTOR_SIZE];
        for (chunk, word) in bytes.chunks_exact_mut(2).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn write_snapshot(&self, m: &mut SnapshotModule) {
        m.write_u8(self.error);
        m.write_u8(self.features);
        m.write_u8(self.count);
        m.write_u8(self.sector);
        m.write_u16(self.cylinder);
        m.write_u8(self.device);
        m.write_u8(self.status.bits());
        m.write_u8(self.control);
        m.write_u8(self.logical.heads);
        m.write_u8(self.logical.sectors);
        let (code, sectors) = self.transfer.code();
        m.write_u8(code);
        m.write_u16(sectors);
        m.write_u16(self.position as u16);
        m.write_bytes(&self.buffer);
    }

    pub fn read_snapshot(&mut self, r: &mut ModuleReader<'_>) -> Result<(), SnapshotError> {
        let error = r.read_u8()?;
        let features = r.read_u8()?;
        let count = r.read_u8()?;
        let sector = r.read_u8()?;
        let cylinder = r.read_u16()?;
        let device = r.read_u8()?;
        let status = Status::from_bits_truncate(r.read_u8()?);
        let control = r.read_u8()?;
        let heads = r.read_u8()?;
        let sectors_per_track = r.read_u8()?;
        let code = r.read_u8()?;
        let sectors = r.read_u16()?;
        let position = usize::from(r.read_u16()?);
        let mut buffer = [0; SECTOR_SIZE];
        r.read_into(&mut buffer)?;
        let transfer = Transfer::from_code(code, sectors)
            .ok_or_else(|| r.rejected("unknown ATA transfer state"))?;
        if position > SECTOR_SIZE || position % 2 != 0 {
            return Err(r.rejected("ATA buffer position out of range"));
        }
        self.error = error;
        self.features = features;
        self.count = count;
        self.sector = sector;
        self.cylinder = cylinder;
        self.device = device;
        self.status = status;
        self.control = control;
        self.logical.heads = heads;
        self.logical.sectors = sectors_per_track;
        self.buffer = buffer;
        self.transfer = transfer;
        self.position = position;
        Ok(())
    }
}

/// ATA strings: two characters per word, first in the high byte, space
/// padded.
fn put_string(words: &mut [u16], text: &str) {
    let mut bytes = text.bytes().chain(std::iter::repeat(b' '));
    for word in words {
        let hi = bytes.next().unwrap_or(b' ');
        let lo = bytes.next().unwrap_or(b' ');
        *word = u16::from_be_bytes([hi, lo]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(sectors: usize, read_only: bool) -> (tempfile::NamedTempFile, AtaDrive) {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        let image: Vec<u8> = (0..sectors * SECTOR_SIZE)
            .map(|i| (i / SECTOR_SIZE) as u8)
            .collect();
        file.write_all(&image).expect("write image");
        let drive = AtaDrive::open(file.path(), None, read_only).expect("open image");
        (file, drive)
    }

    fn read_sector(drive: &mut AtaDrive) -> Vec<u8> {
        (0..SECTOR_SIZE / 2)
            .flat_map(|_| drive.read(0).to_le_bytes())
            .collect()
    }

    #[test]
    fn signature_after_reset() {
        let (_file, drive) = disk(4, true);
        assert_eq!(drive.peek(1), 0x01);
        assert_eq!(drive.peek(2), 1);
        assert_eq!(drive.peek(3), 1);
        assert_eq!(drive.peek(7), 0x50);
        assert_eq!(AtaDrive::absent().peek(7), 0xff);
    }

    #[test]
    fn geometry_from_size() {
        assert_eq!(
            derive_geometry(16 * 63 * 100),
            Geometry {
                cylinders: 100,
                heads: 16,
                sectors: 63
            }
        );
        assert_eq!(
            derive_geometry(8),
            Geometry {
                cylinders: 1,
                heads: 1,
                sectors: 8
            }
        );
    }

    #[test]
    fn lba_read_of_two_sectors() {
        let (_file, mut drive) = disk(8, true);
        drive.write(2, 2);
        drive.write(3, 5);
        drive.write(6, DEVICE_LBA.into());
        drive.write(7, CMD_READ_SECTORS.into());
        assert!(drive.status().contains(Status::DRQ));
        assert!(read_sector(&mut drive).iter().all(|&b| b == 5));
        assert!(drive.status().contains(Status::DRQ));
        assert!(read_sector(&mut drive).iter().all(|&b| b == 6));
        assert_eq!(drive.status(), Status::DRDY | Status::DSC);
        assert_eq!(drive.peek(3), 6);
    }

    #[test]
    fn chs_addressing_and_translation() {
        let (_file, mut drive) = disk(64, true);
        // 64 sectors: 63 per track, 1 head.
        drive.write(2, 1);
        drive.write(3, 63);
        drive.write(7, CMD_READ_SECTORS.into());
        assert!(read_sector(&mut drive).iter().all(|&b| b == 62));
        drive.write(3, 0);
        drive.write(7, CMD_READ_SECTORS.into());
        assert_eq!(drive.peek(1), u16::from(ERROR_IDNF));
        assert!(drive.status().contains(Status::ERR));

        // Translate to 2 heads of 8 sectors: C0 H1 S2 is sector 9.
        drive.write(2, 8);
        drive.write(6, 0x01);
        drive.write(7, CMD_INITIALIZE_PARAMETERS.into());
        drive.write(2, 1);
        drive.write(3, 2);
        drive.write(6, 0x01);
        drive.write(7, CMD_READ_SECTORS.into());
        assert!(read_sector(&mut drive).iter().all(|&b| b == 9));
    }

    #[test]
    fn write_sectors_reaches_image() {
        let (file, mut drive) = disk(4, false);
        drive.write(2, 1);
        drive.write(3, 3);
        drive.write(6, DEVICE_LBA.into());
        drive.write(7, CMD_WRITE_SECTORS.into());
        assert!(drive.status().contains(Status::DRQ));
        for _ in 0..SECTOR_SIZE / 2 {
            drive.write(0, 0xbeef);
        }
        assert_eq!(drive.status(), Status::DRDY | Status::DSC);
        drive.flush();
        let image = std::fs::read(file.path()).expect("read back");
        assert_eq!(image[3 * SECTOR_SIZE..3 * SECTOR_SIZE + 2], [0xef, 0xbe]);
        assert_eq!(image[2 * SECTOR_SIZE], 2);
    }

    #[test]
    fn read_only_disk_aborts_writes() {
        let (_file, mut drive) = disk(4, true);
        drive.write(6, DEVICE_LBA.into());
        drive.write(7, CMD_WRITE_SECTORS.into());
        assert_eq!(drive.peek(1), u16::from(ERROR_ABRT));
        assert!(!drive.status().contains(Status::DRQ));
    }

    #[test]
    fn identify_reports_geometry_and_model() {
        let (_file, mut drive) = disk(16 * 63 * 2, true);
        drive.write(7, CMD_IDENTIFY.into());
        let data = read_sector(&mut drive);
        let word = |i: usize| u16::from_le_bytes([data[2 * i], data[2 * i + 1]]);
        assert_eq!(word(1), 2);
        assert_eq!(word(3), 16);
        assert_eq!(word(6), 63);
        assert_eq!(word(60), 16 * 63 * 2);
        assert_eq!(word(27), u16::from_be_bytes([b'C', b'6']));
    }

    #[test]
    fn buffer_round_trip() {
        let (_file, mut drive) = disk(1, true);
        drive.write(7, CMD_WRITE_BUFFER.into());
        for i in 0..SECTOR_SIZE as u16 / 2 {
            drive.write(0, i);
        }
        drive.write(7, CMD_READ_BUFFER.into());
        assert_eq!(drive.read(0), 0);
        assert_eq!(drive.read(0), 1);
    }

    #[test]
    fn software_reset_and_diagnostic() {
        let (_file, mut drive) = disk(4, true);
        drive.write(3, 9);
        drive.write(0x0e, CONTROL_SRST.into());
        assert!(drive.status().contains(Status::BSY));
        drive.write(0x0e, 0);
        assert_eq!(drive.peek(3), 1);
        drive.write(7, 0x42);
        assert_eq!(drive.peek(1), u16::from(ERROR_ABRT));
        drive.write(7, CMD_EXECUTE_DIAGNOSTIC.into());
        assert_eq!(drive.peek(1), 0x01);
        assert_eq!(drive.peek(7), 0x50);
    }
}
