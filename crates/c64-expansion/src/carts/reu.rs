//! REU (RAM Expansion Unit).
//!
//! The REU is a DMA-based memory expansion. The 1700, 1764 and 1750 carry
//! 128K, 256K and 512K; larger power-of-two sizes up to 16M model the
//! common upgrades.
//!
//! Registers at $DF00-$DF0A (mirrored every 32 bytes through $DF00-$DFFF)
//! control DMA transfers between host memory and expansion RAM:
//!
//! | Reg | Meaning                                         |
//! |-----|-------------------------------------------------|
//! | $00 | status: IRQ, end of block, verify error, size   |
//! | $01 | command: execute, autoload, $FF00 trigger, type |
//! | $02 | host address, low/high                          |
//! | $04 | REU address, low/high                           |
//! | $06 | REU bank                                        |
//! | $07 | transfer length, low/high (0 = 64K)             |
//! | $09 | interrupt mask                                  |
//! | $0A | address control: fix host / fix REU address    |
//!
//! The REU never touches GAME/EXROM.

use crate::bus::{BusConfiguration, PortBus};
use crate::cartridge_type::CartridgeType;
use crate::config::ReuConfig;
use crate::error::{AttachError, SnapshotError};
use crate::snapshot::SnapshotModule;

use super::{Driver, open_module};

const SNAP_MAJOR: u8 = 0;
const SNAP_MINOR: u8 = 1;

const STATUS_IRQ: u8 = 0x80;
const STATUS_END_OF_BLOCK: u8 = 0x40;
const STATUS_VERIFY_ERROR: u8 = 0x20;
const STATUS_SIZE: u8 = 0x10;

const CMD_EXECUTE: u8 = 0x80;
const CMD_AUTOLOAD: u8 = 0x20;
const CMD_FF00_DISABLE: u8 = 0x10;

/// Transfer type for REU DMA operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferType {
    /// Host RAM -> REU RAM
    Stash = 0,
    /// REU RAM -> host RAM
    Fetch = 1,
    /// Exchange
    Swap = 2,
    /// Compare, stopping at the first mismatch
    Verify = 3,
}

impl From<u8> for TransferType {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0 => TransferType::Stash,
            1 => TransferType::Fetch,
            2 => TransferType::Swap,
            _ => TransferType::Verify,
        }
    }
}

fn valid_size(size_kb: u32) -> bool {
    (128..=16384).contains(&size_kb) && size_kb.is_power_of_two()
}

/// REU state.
pub struct Reu {
    ram: Vec<u8>,
    status: u8,
    command: u8,
    host_addr: u16,
    reu_addr: u16,
    reu_bank: u8,
    length: u16,
    irq_mask: u8,
    addr_control: u8,
    /// Copies taken when the command is written, restored by autoload.
    host_addr_shadow: u16,
    reu_addr_shadow: u16,
    reu_bank_shadow: u8,
    length_shadow: u16,
    /// Armed transfer waiting for a write to $FF00.
    dma_pending: bool,
}

impl Reu {
    pub fn new(config: &ReuConfig) -> Result<Self, AttachError> {
        if !valid_size(config.size_kb) {
            return Err(AttachError::UnsupportedSize {
                cart_type: CartridgeType::Reu,
                size: config.size_kb as usize * 1024,
            });
        }
        let size = config.size_kb as usize * 1024;
        let mut reu = Self {
            ram: vec![0xff; size],
            status: 0,
            command: 0,
            host_addr: 0,
            reu_addr: 0,
            reu_bank: 0,
            length: 0xffff,
            irq_mask: 0,
            addr_control: 0,
            host_addr_shadow: 0,
            reu_addr_shadow: 0,
            reu_bank_shadow: 0,
            length_shadow: 0xffff,
            dma_pending: false,
        };
        reu.reset();
        Ok(reu)
    }

    /// RAM contents from a raw image; its length overrides the configured
    /// size.
    pub fn from_binary(data: &[u8], _config: &ReuConfig) -> Result<Self, AttachError> {
        let size_kb = u32::try_from(data.len() / 1024).unwrap_or(0);
        if data.len() % 1024 != 0 || !valid_size(size_kb) {
            return Err(AttachError::UnsupportedSize {
                cart_type: CartridgeType::Reu,
                size: data.len(),
            });
        }
        let mut reu = Self::new(&ReuConfig { size_kb })?;
        reu.ram.copy_from_slice(data);
        Ok(reu)
    }

    /// Get the total RAM size.
    #[must_use]
    pub fn ram_size(&self) -> usize {
        self.ram.len()
    }

    /// Direct read from REU RAM.
    #[must_use]
    pub fn read_ram(&self, addr: u32) -> u8 {
        self.ram.get(addr as usize).copied().unwrap_or(0xff)
    }

    pub fn write_ram(&mut self, addr: u32, value: u8) {
        if let Some(byte) = self.ram.get_mut(addr as usize) {
            *byte = value;
        }
    }

    /// A transfer is armed and waits for the $FF00 write.
    #[must_use]
    pub fn ff00_pending(&self) -> bool {
        self.dma_pending
    }

    fn reset(&mut self) {
        self.command = CMD_FF00_DISABLE;
        self.host_addr = 0;
        self.reu_addr = 0;
        self.reu_bank = 0;
        self.length = 0xffff;
        self.irq_mask = 0;
        self.addr_control = 0;
        self.host_addr_shadow = 0;
        self.reu_addr_shadow = 0;
        self.reu_bank_shadow = 0;
        self.length_shadow = 0xffff;
        self.dma_pending = false;
        self.status = if self.ram.len() > 128 * 1024 {
            STATUS_SIZE
        } else {
            0
        };
    }

    fn bank_mask(&self) -> u32 {
        ((self.ram.len() >> 16).max(1) - 1) as u32
    }

    fn register(&self, reg: u16) -> u8 {
        match reg {
            0x00 => self.status,
            0x01 => self.command,
            0x02 => self.host_addr as u8,
            0x03 => (self.host_addr >> 8) as u8,
            0x04 => self.reu_addr as u8,
            0x05 => (self.reu_addr >> 8) as u8,
            // Unused bank bits read back as 1 on the real chip.
            0x06 => self.reu_bank | !(self.bank_mask() as u8),
            0x07 => self.length as u8,
            0x08 => (self.length >> 8) as u8,
            0x09 => self.irq_mask | 0x1f,
            0x0a => self.addr_control | 0x3f,
            _ => 0xff,
        }
    }

    /// Execute the transfer described by the registers.
    fn execute_dma(&mut self, bus: &mut PortBus<'_>) {
        let transfer_type = TransferType::from(self.command);
        let fix_host = self.addr_control & 0x80 != 0;
        let fix_reu = self.addr_control & 0x40 != 0;

        // Transfer length: 0 means 64K
        let length = if self.length == 0 {
            0x10000usize
        } else {
            self.length as usize
        };

        let mut host_addr = self.host_addr;
        let mut reu_addr = u32::from(self.reu_addr) | (u32::from(self.reu_bank) << 16);
        let ram_mask = (self.ram.len() - 1) as u32;
        let wrap = (self.bank_mask() << 16) | 0xffff;

        let mut verify_error = false;
        let mut remaining = length;
        while remaining > 0 {
            let offset = (reu_addr & ram_mask) as usize;
            match transfer_type {
                TransferType::Stash => {
                    self.ram[offset] = bus.dma_read(host_addr);
                }
                TransferType::Fetch => {
                    bus.dma_write(host_addr, self.ram[offset]);
                }
                TransferType::Swap => {
                    let host_byte = bus.dma_read(host_addr);
                    bus.dma_write(host_addr, self.ram[offset]);
                    self.ram[offset] = host_byte;
                }
                TransferType::Verify => {
                    if bus.dma_read(host_addr) != self.ram[offset] {
                        verify_error = true;
                    }
                }
            }

            if !fix_host {
                host_addr = host_addr.wrapping_add(1);
            }
            if !fix_reu {
                reu_addr = (reu_addr + 1) & wrap;
            }
            remaining -= 1;
            if verify_error {
                break;
            }
        }

        if self.command & CMD_AUTOLOAD == 0 {
            self.host_addr = host_addr;
            self.reu_addr = reu_addr as u16;
            self.reu_bank = ((reu_addr >> 16) & self.bank_mask()) as u8;
            self.length = if remaining == 0 { 1 } else { remaining as u16 };
        } else {
            self.host_addr = self.host_addr_shadow;
            self.reu_addr = self.reu_addr_shadow;
            self.reu_bank = self.reu_bank_shadow;
            self.length = self.length_shadow;
        }

        if remaining == 0 {
            self.status |= STATUS_END_OF_BLOCK;
        }
        if verify_error {
            self.status |= STATUS_VERIFY_ERROR;
        }

        // IRQs need the global enable (bit 7) plus the source's own bit.
        if self.irq_mask & 0x80 != 0
            && ((remaining == 0 && self.irq_mask & 0x40 != 0)
                || (verify_error && self.irq_mask & 0x20 != 0))
        {
            self.status |= STATUS_IRQ;
            bus.set_irq(true);
        }

        // Execute clears once done; $FF00 triggering is re-disabled.
        self.command = (self.command & !CMD_EXECUTE) | CMD_FF00_DISABLE;

        log::debug!(
            "REU: {:?} of {} bytes done, status ${:02X}",
            transfer_type,
            length - remaining,
            self.status
        );
    }
}

impl Driver for Reu {
    fn cart_type(&self) -> CartridgeType {
        CartridgeType::Reu
    }

    fn config_init(&mut self, _bus: &mut PortBus<'_>) {
        self.reset();
    }

    fn powerup(&mut self, _bus: &mut PortBus<'_>) {
        self.ram.fill(0xff);
        self.reset();
    }

    fn peek_io2(&self, addr: u16, _config: &BusConfiguration) -> Option<u8> {
        Some(self.register(addr & 0x1f))
    }

    fn read_io2(&mut self, addr: u16, bus: &mut PortBus<'_>) -> Option<u8> {
        let reg = addr & 0x1f;
        let value = self.register(reg);
        if reg == 0 {
            // Reading status acknowledges everything but the size bit.
            self.status &= STATUS_SIZE;
            bus.set_irq(false);
        }
        Some(value)
    }

    fn write_io2(&mut self, addr: u16, value: u8, bus: &mut PortBus<'_>) {
        match addr & 0x1f {
            0x01 => {
                self.command = value;
                self.host_addr_shadow = self.host_addr;
                self.reu_addr_shadow = self.reu_addr;
                self.reu_bank_shadow = self.reu_bank;
                self.length_shadow = self.length;
                if value & CMD_EXECUTE != 0 {
                    if value & CMD_FF00_DISABLE == 0 {
                        self.dma_pending = true;
                    } else {
                        self.execute_dma(bus);
                    }
                }
            }
            0x02 => self.host_addr = (self.host_addr & 0xff00) | u16::from(value),
            0x03 => self.host_addr = (self.host_addr & 0x00ff) | (u16::from(value) << 8),
            0x04 => self.reu_addr = (self.reu_addr & 0xff00) | u16::from(value),
            0x05 => self.reu_addr = (self.reu_addr & 0x00ff) | (u16::from(value) << 8),
            0x06 => self.reu_bank = value & self.bank_mask() as u8,
            0x07 => self.length = (self.length & 0xff00) | u16::from(value),
            0x08 => self.length = (self.length & 0x00ff) | (u16::from(value) << 8),
            0x09 => self.irq_mask = value & 0xe0,
            0x0a => self.addr_control = value & 0xc0,
            // Status is read-only; the rest is unconnected.
            _ => {}
        }
    }

    fn snoop_write(&mut self, addr: u16, _value: u8, bus: &mut PortBus<'_>) {
        if addr == 0xff00 && self.dma_pending {
            self.dma_pending = false;
            self.execute_dma(bus);
        }
    }

    fn snapshot_write(&self) -> SnapshotModule {
        let mut m = SnapshotModule::new(
            CartridgeType::Reu.snapshot_name(),
            SNAP_MAJOR,
            SNAP_MINOR,
        );
        m.write_u8(self.status);
        m.write_u8(self.command);
        m.write_u16(self.host_addr);
        m.write_u16(self.reu_addr);
        m.write_u8(self.reu_bank);
        m.write_u16(self.length);
        m.write_u8(self.irq_mask);
        m.write_u8(self.addr_control);
        m.write_u16(self.host_addr_shadow);
        m.write_u16(self.reu_addr_shadow);
        m.write_u8(self.reu_bank_shadow);
        m.write_u16(self.length_shadow);
        m.write_bool(self.dma_pending);
        m.write_block(&self.ram);
        m
    }

    fn snapshot_read(
        &mut self,
        module: &SnapshotModule,
        _bus: &mut PortBus<'_>,
    ) -> Result<(), SnapshotError> {
        let mut r = open_module(module, SNAP_MAJOR, SNAP_MINOR)?;
        let status = r.read_u8()?;
        let command = r.read_u8()?;
        let host_addr = r.read_u16()?;
        let reu_addr = r.read_u16()?;
        let reu_bank = r.read_u8()?;
        let length = r.read_u16()?;
        let irq_mask = r.read_u8()?;
        let addr_control = r.read_u8()?;
        let host_addr_shadow = r.read_u16()?;
        let reu_addr_shadow = r.read_u16()?;
        let reu_bank_shadow = r.read_u8()?;
        let length_shadow = r.read_u16()?;
        let dma_pending = r.read_bool()?;
        let ram = r.read_block()?;
        let size_kb = u32::try_from(ram.len() / 1024).unwrap_or(0);
        if ram.len() % 1024 != 0 || !valid_size(size_kb) {
            return Err(r.rejected("bad RAM size"));
        }
        self.status = status;
        self.command = command;
        self.host_addr = host_addr;
        self.reu_addr = reu_addr;
        self.reu_bank = reu_bank;
        self.length = length;
        self.irq_mask = irq_mask;
        self.addr_control = addr_control;
        self.host_addr_shadow = host_addr_shadow;
        self.reu_addr_shadow = reu_addr_shadow;
        self.reu_bank_shadow = reu_bank_shadow;
        self.length_shadow = length_shadow;
        self.dma_pending = dma_pending;
        self.ram = ram;
        Ok(())
    }
}
