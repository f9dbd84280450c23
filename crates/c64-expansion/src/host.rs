//! The machine side of the expansion port.
//!
//! The port never owns the CPU or host RAM. It reaches them through
//! [`Host`]: raising or clearing NMI, flushing the CPU's pending access
//! before a write-triggered remap, and DMA into host memory.

use crate::bus::BusConfiguration;

/// Services the machine provides to the expansion port.
pub trait Host {
    /// Complete any bus access the CPU has in flight under `current`
    /// before the mapping changes. Called for write-triggered remaps only.
    fn flush_pending_access(&mut self, current: &BusConfiguration);

    /// Drive the NMI line.
    fn set_nmi(&mut self, asserted: bool);

    /// Drive the IRQ line. Only DMA devices use it.
    fn set_irq(&mut self, _asserted: bool) {}

    /// Read host memory for a DMA transfer.
    fn dma_read(&mut self, _addr: u16) -> u8 {
        0xff
    }

    /// Write host memory for a DMA transfer.
    fn dma_write(&mut self, _addr: u16, _value: u8) {}
}

/// A host that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {
    fn flush_pending_access(&mut self, _current: &BusConfiguration) {}

    fn set_nmi(&mut self, _asserted: bool) {}
}

/// 64K of flat RAM plus an NMI line. Used by tests and tools that drive
/// the port without a full machine.
pub struct SimpleHost {
    pub ram: Vec<u8>,
    pub nmi: bool,
    pub irq: bool,
    /// Number of `flush_pending_access` calls.
    pub flushes: usize,
    /// Mode in effect at the most recent flush.
    pub last_flush_mode: Option<crate::bus::Mode>,
    /// Bank in effect at the most recent flush.
    pub last_flush_bank: Option<u16>,
}

impl SimpleHost {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: vec![0; 0x10000],
            nmi: false,
            irq: false,
            flushes: 0,
            last_flush_mode: None,
            last_flush_bank: None,
        }
    }
}

impl Default for SimpleHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SimpleHost {
    fn flush_pending_access(&mut self, current: &BusConfiguration) {
        self.flushes += 1;
        self.last_flush_mode = Some(current.mode());
        self.last_flush_bank = Some(current.bank());
    }

    fn set_nmi(&mut self, asserted: bool) {
        self.nmi = asserted;
    }

    fn set_irq(&mut self, asserted: bool) {
        self.irq = asserted;
    }

    fn dma_read(&mut self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn dma_write(&mut self, addr: u16, value: u8) {
        self.ram[addr as usize] = value;
    }
}
