//! C64 CRT cartridge container.
//!
//! A CRT file is a 64-byte (or longer) header followed by CHIP packets.
//! All multi-byte fields are big-endian.
//!
//! | Offset | Size | Field                                  |
//! |--------|------|----------------------------------------|
//! | $00    | 16   | `"C64 CARTRIDGE   "`                   |
//! | $10    | 4    | Header length                          |
//! | $14    | 2    | Version (major.minor)                  |
//! | $16    | 2    | Hardware type                          |
//! | $18    | 1    | EXROM line (0 = asserted)              |
//! | $19    | 1    | GAME line (0 = asserted)               |
//! | $1A    | 1    | Hardware subtype (version >= 1.1)      |
//! | $20    | 32   | Name, zero padded                      |
//!
//! Each CHIP packet:
//!
//! | Offset | Size | Field                                  |
//! |--------|------|----------------------------------------|
//! | $00    | 4    | `"CHIP"`                               |
//! | $04    | 4    | Packet length including this header    |
//! | $08    | 2    | Chip type (0 ROM, 1 RAM, 2 Flash, 3 EEPROM) |
//! | $0A    | 2    | Bank number                            |
//! | $0C    | 2    | Load address                           |
//! | $0E    | 2    | Image size                             |
//! | $10    | n    | Image data                             |
//!
//! This crate knows nothing about what a hardware type *means*; mapping
//! the packets onto a cartridge's banks is the consumer's job.

use thiserror::Error;

/// CRT file signature.
pub const CRT_SIGNATURE: &[u8; 16] = b"C64 CARTRIDGE   ";

/// CHIP packet signature.
pub const CHIP_SIGNATURE: &[u8; 4] = b"CHIP";

/// Minimum (and usual) header length.
pub const HEADER_LEN: usize = 0x40;

/// Length of a CHIP packet header.
pub const CHIP_HEADER_LEN: usize = 0x10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrtError {
    #[error("file too short for a CRT header ({0} bytes)")]
    TooShort(usize),
    #[error("missing \"C64 CARTRIDGE\" signature")]
    BadSignature,
    #[error("invalid header length {0}")]
    BadHeaderLength(usize),
    #[error("expected CHIP signature at offset {offset}")]
    BadChipSignature { offset: usize },
    #[error("CHIP packet at offset {offset} runs past end of file")]
    ChipTruncated { offset: usize },
    #[error("unknown chip type {chip_type} at offset {offset}")]
    UnknownChipType { chip_type: u16, offset: usize },
    #[error("image of {0} bytes does not fit a CHIP packet")]
    ChipTooLarge(usize),
}

/// Kind of memory a CHIP packet describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipType {
    Rom,
    Ram,
    Flash,
    Eeprom,
}

impl ChipType {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Rom),
            1 => Some(Self::Ram),
            2 => Some(Self::Flash),
            3 => Some(Self::Eeprom),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Rom => 0,
            Self::Ram => 1,
            Self::Flash => 2,
            Self::Eeprom => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipPacket {
    pub chip_type: ChipType,
    pub bank: u16,
    pub load_address: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtImage {
    /// (major, minor).
    pub version: (u8, u8),
    pub hardware_type: u16,
    /// Raw EXROM header byte; 0 means the line is asserted at power-on.
    pub exrom: u8,
    /// Raw GAME header byte; 0 means the line is asserted at power-on.
    pub game: u8,
    pub subtype: u8,
    pub name: String,
    pub chips: Vec<ChipPacket>,
}

impl CrtImage {
    /// New empty image of the given hardware type, version 1.0.
    #[must_use]
    pub fn new(hardware_type: u16, name: &str) -> Self {
        Self {
            version: (1, 0),
            hardware_type,
            exrom: 0,
            game: 1,
            subtype: 0,
            name: name.to_string(),
            chips: Vec::new(),
        }
    }

    #[must_use]
    pub fn exrom_asserted(&self) -> bool {
        self.exrom == 0
    }

    #[must_use]
    pub fn game_asserted(&self) -> bool {
        self.game == 0
    }

    /// Highest bank number used by any packet, plus one.
    #[must_use]
    pub fn bank_count(&self) -> usize {
        self.chips
            .iter()
            .map(|c| c.bank as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// Serialise back to the on-disk container.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CrtError> {
        let mut out = Vec::with_capacity(
            HEADER_LEN
                + self
                    .chips
                    .iter()
                    .map(|c| c.data.len() + CHIP_HEADER_LEN)
                    .sum::<usize>(),
        );
        out.extend_from_slice(CRT_SIGNATURE);
        out.extend_from_slice(&(HEADER_LEN as u32).to_be_bytes());
        out.push(self.version.0);
        out.push(self.version.1);
        out.extend_from_slice(&self.hardware_type.to_be_bytes());
        out.push(self.exrom);
        out.push(self.game);
        out.push(self.subtype);
        out.extend_from_slice(&[0; 5]);
        let mut name = [0u8; 32];
        let bytes = self.name.as_bytes();
        let len = bytes.len().min(32);
        name[..len].copy_from_slice(&bytes[..len]);
        out.extend_from_slice(&name);

        for chip in &self.chips {
            let size = u16::try_from(chip.data.len())
                .map_err(|_| CrtError::ChipTooLarge(chip.data.len()))?;
            out.extend_from_slice(CHIP_SIGNATURE);
            out.extend_from_slice(&((chip.data.len() + CHIP_HEADER_LEN) as u32).to_be_bytes());
            out.extend_from_slice(&chip.chip_type.to_u16().to_be_bytes());
            out.extend_from_slice(&chip.bank.to_be_bytes());
            out.extend_from_slice(&chip.load_address.to_be_bytes());
            out.extend_from_slice(&size.to_be_bytes());
            out.extend_from_slice(&chip.data);
        }
        Ok(out)
    }
}

/// Cheap check for the CRT signature, used to sniff files.
#[must_use]
pub fn is_crt(data: &[u8]) -> bool {
    data.len() >= CRT_SIGNATURE.len() && &data[..CRT_SIGNATURE.len()] == CRT_SIGNATURE
}

fn read_be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn read_be_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Parse a complete CRT file.
///
/// A header with zero CHIP packets is valid; the caller decides whether
/// that makes sense for the hardware type.
pub fn parse(data: &[u8]) -> Result<CrtImage, CrtError> {
    if data.len() < HEADER_LEN {
        return Err(CrtError::TooShort(data.len()));
    }
    if !is_crt(data) {
        return Err(CrtError::BadSignature);
    }

    let header_len = read_be_u32(data, 0x10) as usize;
    // Some tools write 0x20 here; the header is still 64 bytes on disk.
    let header_len = if header_len < HEADER_LEN {
        if header_len < 0x20 {
            return Err(CrtError::BadHeaderLength(header_len));
        }
        HEADER_LEN
    } else {
        header_len
    };
    if header_len > data.len() {
        return Err(CrtError::BadHeaderLength(header_len));
    }

    let version = (data[0x14], data[0x15]);
    let hardware_type = read_be_u16(data, 0x16);
    let exrom = data[0x18];
    let game = data[0x19];
    let subtype = if version >= (1, 1) { data[0x1a] } else { 0 };
    let name_bytes = &data[0x20..0x40];
    let end = name_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(name_bytes.len());
    let name = String::from_utf8_lossy(&name_bytes[..end])
        .trim()
        .to_string();

    let mut chips = Vec::new();
    let mut offset = header_len;
    while offset < data.len() {
        if offset + CHIP_HEADER_LEN > data.len() {
            // Trailing garbage shorter than a CHIP header
            if data[offset..].iter().all(|&b| b == 0) {
                break;
            }
            return Err(CrtError::ChipTruncated { offset });
        }
        if &data[offset..offset + 4] != CHIP_SIGNATURE {
            return Err(CrtError::BadChipSignature { offset });
        }

        let packet_len = read_be_u32(data, offset + 4) as usize;
        let raw_type = read_be_u16(data, offset + 8);
        let chip_type = ChipType::from_u16(raw_type).ok_or(CrtError::UnknownChipType {
            chip_type: raw_type,
            offset,
        })?;
        let bank = read_be_u16(data, offset + 0x0a);
        let load_address = read_be_u16(data, offset + 0x0c);
        let size = read_be_u16(data, offset + 0x0e) as usize;

        let start = offset + CHIP_HEADER_LEN;
        let end = start + size;
        if end > data.len() {
            return Err(CrtError::ChipTruncated { offset });
        }
        chips.push(ChipPacket {
            chip_type,
            bank,
            load_address,
            data: data[start..end].to_vec(),
        });

        // A packet length smaller than its contents is a known tool bug;
        // step over the data actually present.
        offset += packet_len.max(CHIP_HEADER_LEN + size);
    }

    Ok(CrtImage {
        version,
        hardware_type,
        exrom,
        game,
        subtype,
        name,
        chips,
    })
}
