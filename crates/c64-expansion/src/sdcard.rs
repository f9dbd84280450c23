//! SD card in SPI mode.
//!
//! The card exchanges one byte per SPI transfer: the host shifts a byte
//! out on MOSI while the card shifts one back on MISO. Commands are six
//! bytes (`01cccccc`, four argument bytes, CRC); the card answers after
//! one filler byte with an R1 status byte, followed by extra response
//! bytes or a data block:
//!
//! ```text
//! host: 51 00 00 02 00 ff | ff ff ff ff ...
//! card: ff ff ff ff ff ff | ff 00 fe <512 data bytes> crc crc
//! ```
//!
//! Supported: CMD0, CMD1, CMD8, CMD9, CMD10, CMD12, CMD16, CMD17, CMD24,
//! CMD55/ACMD41, CMD58. The card is a standard-capacity SD card (byte
//! addressing). Blocks are read from and written to the image file
//! directly, so nothing needs flushing at detach beyond the file itself.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, warn};

use crate::error::SnapshotError;
use crate::snapshot::{ModuleReader, SnapshotModule};

const R1_IDLE: u8 = 0x01;
const R1_ILLEGAL_COMMAND: u8 = 0x04;
const R1_ADDRESS_ERROR: u8 = 0x20;
const R1_PARAMETER_ERROR: u8 = 0x40;

const TOKEN_START_BLOCK: u8 = 0xfe;
const DATA_ACCEPTED: u8 = 0x05;
const DATA_WRITE_ERROR: u8 = 0x0d;

const MAX_BLOCK_LEN: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Collecting command bytes.
    Command,
    /// CMD24 accepted; waiting for the start token.
    WriteToken { address: u32 },
    /// Receiving the data block, then two CRC bytes.
    WriteData { address: u32, crc_left: u8 },
}

pub struct SdCard {
    image: Option<File>,
    size: u64,
    read_only: bool,
    selected: bool,
    idle: bool,
    app_cmd: bool,
    block_len: u32,
    phase: Phase,
    command: Vec<u8>,
    write_buffer: Vec<u8>,
    response: VecDeque<u8>,
}

impl Default for SdCard {
    fn default() -> Self {
        Self::empty()
    }
}

impl SdCard {
    /// An empty slot.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            image: None,
            size: 0,
            read_only: true,
            selected: false,
            idle: true,
            app_cmd: false,
            block_len: MAX_BLOCK_LEN,
            phase: Phase::Command,
            command: Vec::with_capacity(6),
            write_buffer: Vec::new(),
            response: VecDeque::new(),
        }
    }

    /// Insert the card image at `path`. A read-only card is opened
    /// read-only; otherwise the image must be writable.
    pub fn open(path: &Path, read_only: bool) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)?;
        let size = file.metadata()?.len();
        debug!(
            "SD card: {} ({} bytes{})",
            path.display(),
            size,
            if read_only { ", read-only" } else { "" }
        );
        Ok(Self {
            image: Some(file),
            size,
            read_only,
            ..Self::empty()
        })
    }

    #[must_use]
    pub fn inserted(&self) -> bool {
        self.image.is_some()
    }

    #[must_use]
    pub fn write_protected(&self) -> bool {
        self.read_only
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn selected(&self) -> bool {
        self.selected
    }

    /// Drive chip select. Deselecting abandons any transfer in progress.
    pub fn select(&mut self, selected: bool) {
        if self.selected && !selected {
            self.command.clear();
            self.response.clear();
            self.phase = Phase::Command;
        }
        self.selected = selected;
    }

    /// Power-on state. The image stays inserted.
    pub fn reset(&mut self) {
        self.selected = false;
        self.idle = true;
        self.app_cmd = false;
        self.block_len = MAX_BLOCK_LEN;
        self.phase = Phase::Command;
        self.command.clear();
        self.write_buffer.clear();
        self.response.clear();
    }

    pub fn flush(&mut self) {
        if let Some(file) = &mut self.image
            && let Err(e) = file.flush()
        {
            warn!("SD card: flushing image failed: {e}");
        }
    }

    /// One SPI byte exchange.
    pub fn transfer(&mut self, mosi: u8) -> u8 {
        if !self.selected || self.image.is_none() {
            return 0xff;
        }
        let miso = self.response.pop_front().unwrap_or(0xff);
        match self.phase {
            Phase::Command => self.command_byte(mosi),
            Phase::WriteToken { address } => {
                if mosi == TOKEN_START_BLOCK {
                    self.write_buffer.clear();
                    self.phase = Phase::WriteData {
                        address,
                        crc_left: 2,
                    };
                }
            }
            Phase::WriteData { address, crc_left } => {
                if self.write_buffer.len() < self.block_len as usize {
                    self.write_buffer.push(mosi);
                } else if crc_left > 1 {
                    self.phase = Phase::WriteData {
                        address,
                        crc_left: crc_left - 1,
                    };
                } else {
                    self.finish_write(address);
                }
            }
        }
        miso
    }

    fn command_byte(&mut self, mosi: u8) {
        if self.command.is_empty() && mosi & 0xc0 != 0x40 {
            return;
        }
        self.command.push(mosi);
        if self.command.len() == 6 {
            let index = self.command[0] & 0x3f;
            let arg = u32::from_be_bytes([
                self.command[1],
                self.command[2],
                self.command[3],
                self.command[4],
            ]);
            self.command.clear();
            self.execute(index, arg);
        }
    }

    fn r1(&self, flags: u8) -> u8 {
        flags | if self.idle { R1_IDLE } else { 0 }
    }

    fn respond(&mut self, bytes: &[u8]) {
        self.response.clear();
        self.response.push_back(0xff);
        self.response.extend(bytes);
    }

    fn respond_block(&mut self, r1: u8, data: &[u8]) {
        self.respond(&[r1, 0xff, TOKEN_START_BLOCK]);
        self.response.extend(data);
        self.response.extend([0xff, 0xff]);
    }

    fn execute(&mut self, index: u8, arg: u32) {
        let app = std::mem::take(&mut self.app_cmd);
        debug!("SD card: {}CMD{index} {arg:08x}", if app { "A" } else { "" });
        match (app, index) {
            (_, 0) => {
                self.idle = true;
                self.block_len = MAX_BLOCK_LEN;
                self.respond(&[R1_IDLE]);
            }
            (_, 1) | (true, 41) => {
                self.idle = false;
                self.respond(&[0x00]);
            }
            (_, 8) => {
                let r1 = self.r1(0);
                let [_, _, voltage, pattern] = arg.to_be_bytes();
                self.respond(&[r1, 0x00, 0x00, voltage & 0x0f, pattern]);
            }
            (_, 9) => {
                let r1 = self.r1(0);
                let csd = self.csd();
                self.respond_block(r1, &csd);
            }
            (_, 10) => {
                let r1 = self.r1(0);
                self.respond_block(r1, &CID);
            }
            (_, 12) => {
                let r1 = self.r1(0);
                self.respond(&[0xff, r1]);
            }
            (_, 16) => {
                if (1..=MAX_BLOCK_LEN).contains(&arg) {
                    self.block_len = arg;
                    let r1 = self.r1(0);
                    self.respond(&[r1]);
                } else {
                    let r1 = self.r1(R1_PARAMETER_ERROR);
                    self.respond(&[r1]);
                }
            }
            (_, 17) => match self.read_block(arg) {
                Some(data) => {
                    let r1 = self.r1(0);
                    self.respond_block(r1, &data);
                }
                None => {
                    let r1 = self.r1(R1_ADDRESS_ERROR);
                    self.respond(&[r1]);
                }
            },
            (_, 24) => {
                if u64::from(arg) + u64::from(self.block_len) > self.size {
                    let r1 = self.r1(R1_ADDRESS_ERROR);
                    self.respond(&[r1]);
                } else {
                    let r1 = self.r1(0);
                    self.respond(&[r1]);
                    self.phase = Phase::WriteToken { address: arg };
                }
            }
            (_, 55) => {
                self.app_cmd = true;
                let r1 = self.r1(0);
                self.respond(&[r1]);
            }
            (_, 58) => {
                // Powered up, 3.2-3.4V, standard capacity.
                let r1 = self.r1(0);
                self.respond(&[r1, 0x80, 0x30, 0x00, 0x00]);
            }
            _ => {
                let r1 = self.r1(R1_ILLEGAL_COMMAND);
                self.respond(&[r1]);
            }
        }
    }

    fn read_block(&mut self, address: u32) -> Option<Vec<u8>> {
        let len = self.block_len as usize;
        if u64::from(address) + len as u64 > self.size {
            return None;
        }
        let file = self.image.as_mut()?;
        let mut data = vec![0; len];
        let result = file
            .seek(SeekFrom::Start(u64::from(address)))
            .and_then(|_| file.read_exact(&mut data));
        match result {
            Ok(()) => Some(data),
            Err(e) => {
                warn!("SD card: reading block at {address:#x} failed: {e}");
                None
            }
        }
    }

    fn finish_write(&mut self, address: u32) {
        self.phase = Phase::Command;
        let token = if self.read_only {
            DATA_WRITE_ERROR
        } else if let Some(file) = self.image.as_mut() {
            let result = file
                .seek(SeekFrom::Start(u64::from(address)))
                .and_then(|_| file.write_all(&self.write_buffer));
            match result {
                Ok(()) => DATA_ACCEPTED,
                Err(e) => {
                    warn!("SD card: writing block at {address:#x} failed: {e}");
                    DATA_WRITE_ERROR
                }
            }
        } else {
            DATA_WRITE_ERROR
        };
        self.response.clear();
        self.response.extend([token, 0x00, 0xff]);
    }

    /// CSD version 1.0 describing the image size.
    fn csd(&self) -> [u8; 16] {
        // capacity = (C_SIZE + 1) * 2^(C_SIZE_MULT + 2) * 2^READ_BL_LEN
        const READ_BL_LEN: u8 = 9;
        const C_SIZE_MULT: u8 = 7;
        let unit = 1u64 << (u32::from(C_SIZE_MULT) + 2 + u32::from(READ_BL_LEN));
        let c_size = (self.size / unit).clamp(1, 4096) - 1;
        let c_size = c_size as u16;
        [
            0x00,
            0x0e,
            0x00,
            0x32,
            0x5b,
            0x50 | READ_BL_LEN,
            0x80 | ((c_size >> 10) & 0x03) as u8,
            (c_size >> 2) as u8,
            ((c_size & 0x03) << 6) as u8 | 0x3f,
            0xfc | (C_SIZE_MULT >> 1),
            ((C_SIZE_MULT & 1) << 7) | 0x7f,
            0x80,
            0x0a,
            0x40,
            0x00,
            0x01,
        ]
    }

    pub fn write_snapshot(&self, m: &mut SnapshotModule) {
        m.write_bool(self.selected);
        m.write_bool(self.idle);
        m.write_bool(self.app_cmd);
        m.write_u32(self.block_len);
        let response: Vec<u8> = self.response.iter().copied().collect();
        m.write_block(&response);
    }

    pub fn read_snapshot(&mut self, r: &mut ModuleReader<'_>) -> Result<(), SnapshotError> {
        let selected = r.read_bool()?;
        let idle = r.read_bool()?;
        let app_cmd = r.read_bool()?;
        let block_len = r.read_u32()?;
        if !(1..=MAX_BLOCK_LEN).contains(&block_len) {
            return Err(r.rejected("SD block length out of range"));
        }
        let response = r.read_block()?;
        self.selected = selected;
        self.idle = idle;
        self.app_cmd = app_cmd;
        self.block_len = block_len;
        self.response = response.into();
        self.phase = Phase::Command;
        self.command.clear();
        Ok(())
    }
}

/// Card identification: manufacturer, OEM, product name, revision, serial.
const CID: [u8; 16] = [
    0x02, b'C', b'X', b'E', b'M', b'U', b'S', b'D', 0x10, 0x00, 0x00, 0x00, 0x01, 0x01, 0x6a,
    0x01,
];
