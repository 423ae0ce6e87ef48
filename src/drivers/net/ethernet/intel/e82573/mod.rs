//! Intel 82573 Gigabit Ethernet Controller Driver
//!
//! Descriptor-ring driver for the 82573L PCIe MAC, written for a real-time
//! fieldbus stack: fixed pools, no allocation after bring-up, and an
//! interrupt handler that does all the transmit reclaim and receive work
//! synchronously.
//!
//! # Implementation Notes
//!
//! - One transmit queue (16 legacy descriptors) and one receive queue
//!   (16 descriptors, 2 KiB buffers each)
//! - 42 transmit buffers of 1536 bytes in a single DMA region, handed out
//!   whole to the protocol stack
//! - Interrupt driven: TXDW for reclaim, RXT0/RXDMT0/SRPD for receive
//! - Perfect filtering only (16 receive-address entries, MTA left zeroed)
//!
//! # Contexts
//!
//! `send`, `alloc_tx_buffer` and `release_tx_buffer` run in the stack's
//! context and may race with [`Edrv::handle_interrupt`]. The interrupt path
//! never blocks and visits each ring at most once around. Bring-up and
//! teardown take `&mut self` and are the only places that sleep.
//!
//! # References
//!
//! - Intel 82573 Family GbE Controllers Open Source Software Developer's Manual
//! - Linux: drivers/net/ethernet/intel/e1000e

pub mod descriptor;
mod diag;
mod filter;
mod lifecycle;
pub mod regs;
mod rx;
mod tx;

#[cfg(test)]
mod sim;

use log::debug;

use crate::drivers::net::netdev::{
    BufferNumber, EdrvError, IrqReturn, RxFilter, RxHandler, TxBuffer,
};
use crate::hal::{DmaRegion, PciFunction, RegisterIo};
use crate::net::ethernet::MacAddress;

pub use diag::{EdrvStats, SliceWriter};
pub use regs::{DEVICE_IDS, INTEL_VENDOR_ID};

use descriptor::TxDesc;
use diag::{Counters, RingIndices, bump};
use regs::*;
use rx::RxRing;
use tx::{AtomicBitmap, InFlight, TxRing};

/// Whether this driver handles the given PCI function
pub fn supports_device(vendor: u16, device: u16) -> bool {
    vendor == INTEL_VENDOR_ID && DEVICE_IDS.contains(&device)
}

// ============================================================================
// Configuration
// ============================================================================

/// Bring-up parameters
#[derive(Clone, Copy)]
pub struct EdrvConfig<'cb> {
    /// Station address; all-zero means "use the address from the EEPROM"
    pub mac_address: MacAddress,

    /// Receives every good frame, from interrupt context
    pub rx_handler: &'cb dyn RxHandler,

    /// Polls (1 ms apart) for bus mastering to stop before reset
    pub master_disable_timeout_ms: u32,

    /// Polls (1 ms apart) for the EEPROM auto-read after reset
    pub auto_read_timeout_ms: u32,
}

impl<'cb> EdrvConfig<'cb> {
    pub const DEFAULT_MASTER_DISABLE_TIMEOUT_MS: u32 = 90;
    pub const DEFAULT_AUTO_READ_TIMEOUT_MS: u32 = 10;

    pub fn new(rx_handler: &'cb dyn RxHandler) -> Self {
        Self {
            mac_address: MacAddress::zero(),
            rx_handler,
            master_disable_timeout_ms: Self::DEFAULT_MASTER_DISABLE_TIMEOUT_MS,
            auto_read_timeout_ms: Self::DEFAULT_AUTO_READ_TIMEOUT_MS,
        }
    }

    pub fn with_mac_address(mut self, mac: MacAddress) -> Self {
        self.mac_address = mac;
        self
    }

    pub fn with_timeouts(mut self, master_disable_ms: u32, auto_read_ms: u32) -> Self {
        self.master_disable_timeout_ms = master_disable_ms;
        self.auto_read_timeout_ms = auto_read_ms;
        self
    }
}

// ============================================================================
// Driver State
// ============================================================================

/// Lifecycle state
///
/// Bring-up walks the states in declaration order; the state names the step
/// in progress, so a failure reports where it happened. Teardown passes
/// through `ShuttingDown` back to `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Enabling,
    MasterDisabling,
    Resetting,
    Configuring,
    BuffersAllocated,
    Running,
    ShuttingDown,
}

/// One 82573 controller
///
/// Owns its platform handle, the register mapping and the four DMA regions.
/// Shared by reference between the stack's send path and the host's
/// interrupt dispatch once running.
pub struct Edrv<'cb, P: PciFunction> {
    platform: P,
    config: EdrvConfig<'cb>,
    state: DeviceState,
    mac_address: MacAddress,

    regs: Option<P::Registers>,
    device_enabled: bool,
    regions_requested: bool,
    irq_registered: bool,

    tx_buffers: Option<DmaRegion>,
    tx_descs: Option<DmaRegion>,
    rx_buffers: Option<DmaRegion>,
    rx_descs: Option<DmaRegion>,

    tx_pool: AtomicBitmap,
    tx_ring: TxRing<'cb>,
    rx_ring: RxRing,
    counters: Counters,
}

impl<'cb, P: PciFunction> Edrv<'cb, P> {
    /// Create a driver instance for one PCI function; nothing is touched
    /// until [`init`](Self::init)
    pub fn new(platform: P, config: EdrvConfig<'cb>) -> Self {
        Self {
            platform,
            mac_address: config.mac_address,
            config,
            state: DeviceState::Uninitialized,
            regs: None,
            device_enabled: false,
            regions_requested: false,
            irq_registered: false,
            tx_buffers: None,
            tx_descs: None,
            rx_buffers: None,
            rx_descs: None,
            tx_pool: AtomicBitmap::new(),
            tx_ring: TxRing::new(),
            rx_ring: RxRing::new(),
            counters: Counters::default(),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Effective station address (burned-in one after `init` if none was
    /// configured)
    pub fn mac_address(&self) -> MacAddress {
        self.mac_address
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn stats(&self) -> EdrvStats {
        self.counters.snapshot()
    }

    fn set_state(&mut self, state: DeviceState) {
        debug!("e82573: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn registers(&self) -> Result<&P::Registers, EdrvError> {
        self.regs.as_ref().ok_or(EdrvError::NotInitialized)
    }

    // ========================================================================
    // Transmit Buffers
    // ========================================================================

    /// Grant a transmit pool slot to `buffer`
    ///
    /// The slot is always a full `MAX_FRAME_SIZE` bytes whatever the caller
    /// asked for; `buffer.max_len` is updated accordingly. A buffer that
    /// still holds a slot must be released first: allocating into it fails
    /// with `NoFreeBuffer` and leaves both the buffer and the pool unchanged.
    pub fn alloc_tx_buffer(&self, buffer: &mut TxBuffer<'cb>) -> Result<(), EdrvError> {
        if buffer.max_len > MAX_FRAME_SIZE || self.tx_buffers.is_none() {
            return Err(EdrvError::NoFreeBuffer);
        }
        if self.allocated(buffer).is_ok() {
            return Err(EdrvError::NoFreeBuffer);
        }
        let slot = self.tx_pool.acquire_bit().ok_or(EdrvError::NoFreeBuffer)?;
        buffer.number = Some(BufferNumber(slot as u32));
        buffer.max_len = MAX_FRAME_SIZE;
        buffer.len = 0;
        Ok(())
    }

    /// Return `buffer`'s slot to the pool
    ///
    /// Releasing an unallocated or already-released buffer does nothing. The
    /// caller must not release a buffer whose frame is still in flight.
    pub fn release_tx_buffer(&self, buffer: &mut TxBuffer<'cb>) {
        if let Some(number) = buffer.number.take() {
            self.tx_pool.release_bit(number.index());
        }
    }

    /// Copy `frame` into `buffer`'s slot and set its length
    pub fn write_frame(&self, buffer: &mut TxBuffer<'cb>, frame: &[u8]) -> Result<(), EdrvError> {
        let region = self.tx_buffers.as_ref().ok_or(EdrvError::NotInitialized)?;
        let number = self.allocated(buffer)?;
        if frame.len() > MAX_FRAME_SIZE {
            return Err(EdrvError::FrameTooLarge);
        }
        region.copy_in(number.index() * MAX_FRAME_SIZE, frame);
        buffer.len = frame.len();
        Ok(())
    }

    /// Copy the frame held in `buffer`'s slot into `out`
    ///
    /// Copies at most `out.len()` bytes and returns how many were copied.
    pub fn read_frame(
        &self,
        buffer: &TxBuffer<'cb>,
        out: &mut [u8],
    ) -> Result<usize, EdrvError> {
        let region = self.tx_buffers.as_ref().ok_or(EdrvError::NotInitialized)?;
        let number = self.allocated(buffer)?;
        let len = buffer.len.min(MAX_FRAME_SIZE).min(out.len());
        region.copy_out(number.index() * MAX_FRAME_SIZE, &mut out[..len]);
        Ok(len)
    }

    fn allocated(&self, buffer: &TxBuffer<'cb>) -> Result<BufferNumber, EdrvError> {
        match buffer.number {
            Some(number) if self.tx_pool.is_allocated(number.index()) => Ok(number),
            _ => Err(EdrvError::BufferNotExisting),
        }
    }

    // ========================================================================
    // Transmit
    // ========================================================================

    /// Queue `buffer` for transmission
    ///
    /// Returns `NoFreeDescriptor` when the ring is full; nothing is queued
    /// and the caller retries after completions. The buffer's completion
    /// sink (if any) is called from interrupt context once the controller
    /// is done with the frame.
    pub fn send(&self, buffer: &TxBuffer<'cb>) -> Result<(), EdrvError> {
        let number = self.allocated(buffer)?;
        if buffer.len > MAX_FRAME_SIZE {
            return Err(EdrvError::FrameTooLarge);
        }
        let (Some(regs), Some(descs), Some(pool)) =
            (self.regs.as_ref(), self.tx_descs.as_ref(), self.tx_buffers.as_ref())
        else {
            return Err(EdrvError::NotInitialized);
        };

        let addr = pool.bus_addr_at(number.index() * MAX_FRAME_SIZE);
        let entry = InFlight {
            number,
            completion: buffer.completion,
        };
        self.tx_ring.push(descs, regs, addr, buffer.len, entry)?;
        bump(&self.counters.tx_sent);
        Ok(())
    }

    // ========================================================================
    // Interrupt Handler
    // ========================================================================

    /// Service the controller's interrupt
    ///
    /// Called by the host for every assertion of the (possibly shared) line.
    /// Returns `NotHandled` when none of our causes is pending.
    pub fn handle_interrupt(&self) -> IrqReturn {
        let Some(regs) = self.regs.as_ref() else {
            return IrqReturn::NotHandled;
        };

        let cause = regs.read(ICR);
        if cause & INT_HANDLED == 0 {
            bump(&self.counters.irq_unhandled);
            return IrqReturn::NotHandled;
        }

        if cause & INT_ASSERTED == 0 {
            // Not cleared by the read above
            regs.write(ICR, cause);
        }

        if cause & INT_TXDW != 0 {
            if let Some(descs) = self.tx_descs.as_ref() {
                self.tx_ring.reclaim(descs, &self.counters);
            }
        }

        if cause & INT_RX_DRAIN != 0 {
            bump(&self.counters.rx_interrupts);
            if let (Some(descs), Some(buffers)) = (self.rx_descs.as_ref(), self.rx_buffers.as_ref()) {
                self.rx_ring
                    .drain(descs, buffers, regs, self.config.rx_handler, &self.counters);
            }
        }

        if cause & INT_RXSEQ != 0 {
            bump(&self.counters.rx_sequence_irqs);
        }
        if cause & INT_RXO != 0 {
            bump(&self.counters.rx_overruns);
        }

        IrqReturn::Handled
    }

    // ========================================================================
    // Receive Address Filters
    // ========================================================================

    /// Accept frames addressed to `mac` (unicast or multicast)
    ///
    /// Uses the first free receive-address entry in 1..15. Fails with
    /// `FilterTableFull` when all 15 are taken; there is no hash-table
    /// fallback.
    pub fn add_rx_filter(&self, mac: &MacAddress) -> Result<(), EdrvError> {
        let index = filter::add(self.registers()?, mac)?;
        debug!("e82573: rx filter {} -> entry {}", mac, index);
        Ok(())
    }

    /// Stop accepting frames for `mac`; unknown addresses are ignored
    pub fn remove_rx_filter(&self, mac: &MacAddress) -> Result<(), EdrvError> {
        if let Some(index) = filter::remove(self.registers()?, mac) {
            debug!("e82573: rx filter {} removed from entry {}", mac, index);
        }
        Ok(())
    }

    /// Accepted for interface compatibility; this controller has no
    /// programmable frame filters, so nothing is changed.
    pub fn change_filter(
        &self,
        _filters: &[RxFilter],
        _entry_changed: usize,
        _change_flags: u32,
    ) -> Result<(), EdrvError> {
        Ok(())
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Write a human-readable snapshot into `out`
    ///
    /// Output that does not fit is truncated. Returns the number of bytes
    /// written.
    pub fn diagnostics(&self, out: &mut [u8]) -> usize {
        let Some(regs) = self.regs.as_ref() else {
            return 0;
        };
        let mut w = SliceWriter::new(out);
        let tx_head = self.tx_ring.head();
        let rings = RingIndices {
            tx_head,
            tx_tail: self.tx_ring.tail(),
            tx_head_status: self
                .tx_descs
                .as_ref()
                .map(|descs| TxDesc::at(descs, tx_head).status()),
            tx_in_flight: self.tx_ring.in_flight(),
            tx_buffers_used: self.tx_pool.count(),
            rx_head: self.rx_ring.head(),
            rx_tail: self.rx_ring.tail(),
        };
        // SliceWriter never fails
        let _ = diag::dump(&mut w, regs, &rings, &self.counters.snapshot());
        w.written()
    }
}

impl<P: PciFunction> Drop for Edrv<'_, P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
