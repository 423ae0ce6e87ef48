//! Simulated 82573 for host tests
//!
//! A register file with just enough behaviour to walk the driver through
//! bring-up, plus a platform whose DMA memory is host memory at fake bus
//! addresses. Test code drives the "hardware" side through [`Sim`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use core::ptr::NonNull;

use super::regs::*;
use crate::hal::{DmaRegion, PciFunction, PlatformError, RegisterIo};
use crate::net::ethernet::MacAddress;

/// Address the simulated EEPROM loads into receive-address entry 0
pub const BURNED_IN_MAC: MacAddress = MacAddress::new([0x00, 0x1B, 0x21, 0x0A, 0x0B, 0x0C]);

/// Platform step to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Enable,
    Regions,
    Map,
    /// The n-th DMA allocation (0 = transmit buffers ... 3 = receive descriptors)
    Alloc(usize),
    Irq,
}

/// Platform calls in the order they happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Enable,
    Disable,
    RequestRegions,
    ReleaseRegions,
    Map,
    Unmap,
    BusMaster,
    Alloc(u64),
    Free(u64),
    RequestIrq,
    FreeIrq,
}

struct Allocation {
    bus: u64,
    len: usize,
    backing: Box<[u64]>,
}

#[derive(Default)]
struct SimState {
    regs: HashMap<usize, u32>,
    writes: Vec<(usize, u32)>,
    events: Vec<Event>,
    dma: Vec<Allocation>,
    next_bus: u64,
    allocs_seen: usize,
    fail: Option<FailAt>,
    master_stuck: bool,
    auto_read_stuck: bool,
    delays: u32,
    enabled: bool,
    regions: bool,
    mapped: bool,
    irq: bool,
}

impl SimState {
    fn reg(&self, offset: usize) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    fn allocation(&mut self, bus: u64) -> (&mut Allocation, usize) {
        self.dma
            .iter_mut()
            .find(|a| bus >= a.bus && bus < a.bus + a.len as u64)
            .map(|a| {
                let offset = (bus - a.bus) as usize;
                (a, offset)
            })
            .unwrap_or_else(|| panic!("bus address {:#x} not allocated", bus))
    }

    /// Run `f` on a region view of the allocation containing `bus`
    fn with_dma<T>(&mut self, bus: u64, f: impl FnOnce(&DmaRegion, usize) -> T) -> T {
        let (alloc, offset) = self.allocation(bus);
        let virt = NonNull::new(alloc.backing.as_mut_ptr() as *mut u8).unwrap();
        let region = unsafe { DmaRegion::new(virt, alloc.bus, alloc.len) };
        f(&region, offset)
    }
}

/// Test-side handle on the simulated controller
#[derive(Clone, Default)]
pub struct Sim(Arc<Mutex<SimState>>);

impl Sim {
    pub fn new() -> Self {
        let sim = Sim::default();
        {
            let mut st = sim.lock();
            st.next_bus = 0x8000_0000;
            // Bus mastering active out of reset
            st.regs.insert(STATUS, STATUS_MST_EN);
            let b = BURNED_IN_MAC.as_bytes();
            st.regs.insert(ral(0), u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
            st.regs
                .insert(rah(0), u32::from_le_bytes([b[4], b[5], 0, 0]) | RAH_AV);
        }
        sim
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.0.lock().unwrap()
    }

    pub fn platform(&self) -> SimPlatform {
        SimPlatform(self.clone())
    }

    pub fn fail_at(&self, step: FailAt) {
        self.lock().fail = Some(step);
    }

    pub fn stick_master_enable(&self) {
        self.lock().master_stuck = true;
    }

    pub fn stick_auto_read(&self) {
        self.lock().auto_read_stuck = true;
    }

    /// Register value without read side effects
    pub fn reg(&self, offset: usize) -> u32 {
        self.lock().reg(offset)
    }

    pub fn set_reg(&self, offset: usize, value: u32) {
        self.lock().regs.insert(offset, value);
    }

    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn delays(&self) -> u32 {
        self.lock().delays
    }

    /// Platform resources still held by the driver
    pub fn held(&self) -> (bool, bool, bool, bool, usize) {
        let st = self.lock();
        (st.enabled, st.regions, st.mapped, st.irq, st.dma.len())
    }

    /// Latch interrupt causes with INT_ASSERTED (read-to-clear)
    pub fn raise(&self, cause: u32) {
        let mut st = self.lock();
        let icr = st.reg(ICR) | cause | INT_ASSERTED;
        st.regs.insert(ICR, icr);
    }

    /// Latch interrupt causes without INT_ASSERTED (write-to-clear)
    pub fn raise_unasserted(&self, cause: u32) {
        let mut st = self.lock();
        let icr = st.reg(ICR) | cause;
        st.regs.insert(ICR, icr);
    }

    fn tx_ring_base(st: &SimState) -> u64 {
        (st.reg(TDBAH) as u64) << 32 | st.reg(TDBAL) as u64
    }

    fn rx_ring_base(st: &SimState) -> u64 {
        (st.reg(RDBAH0) as u64) << 32 | st.reg(RDBAL0) as u64
    }

    /// Transmit descriptor `index` as (address, cmd/length, status)
    pub fn tx_desc(&self, index: usize) -> (u64, u32, u32) {
        let mut st = self.lock();
        let base = Self::tx_ring_base(&st) + (index * 16) as u64;
        st.with_dma(base, |r, off| {
            (r.read_u64_le(off), r.read_u32_le(off + 8), r.read_u32_le(off + 12))
        })
    }

    /// Write back a transmit status (DD plus optional EC/LC)
    pub fn complete_tx(&self, index: usize, status: u32) {
        let mut st = self.lock();
        let base = Self::tx_ring_base(&st) + (index * 16) as u64;
        st.with_dma(base, |r, off| r.write_u32_le(off + 12, status));
    }

    /// Receive descriptor `index` buffer address and status byte
    pub fn rx_desc(&self, index: usize) -> (u64, u8) {
        let mut st = self.lock();
        let base = Self::rx_ring_base(&st) + (index * 16) as u64;
        st.with_dma(base, |r, off| (r.read_u64_le(off), r.read_u8(off + 12)))
    }

    /// DMA a frame into receive descriptor `index` and write back its status
    pub fn deliver_rx(&self, index: usize, frame: &[u8], status: u8, errors: u8) {
        let mut st = self.lock();
        let base = Self::rx_ring_base(&st) + (index * 16) as u64;
        let buffer = st.with_dma(base, |r, off| r.read_u64_le(off));
        st.with_dma(buffer, |r, off| r.copy_in(off, frame));
        st.with_dma(base, |r, off| {
            r.write_u16_le(off + 8, frame.len() as u16);
            r.write_u8(off + 13, errors);
            r.write_u8(off + 12, status);
        });
    }

    /// Bytes at a bus address, as the device would fetch them
    pub fn dma_bytes(&self, bus: u64, len: usize) -> Vec<u8> {
        let mut st = self.lock();
        st.with_dma(bus, |r, off| (0..len).map(|i| r.read_u8(off + i)).collect())
    }
}

/// Register window of the simulated controller
pub struct SimRegs(Sim);

impl RegisterIo for SimRegs {
    fn read(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= REGISTER_WINDOW, "read outside window: {:#x}", offset);
        let mut st = self.0.lock();
        let value = st.reg(offset);
        if offset == ICR && value & INT_ASSERTED != 0 {
            st.regs.insert(ICR, 0);
        }
        value
    }

    fn write(&self, offset: usize, value: u32) {
        assert!(offset + 4 <= REGISTER_WINDOW, "write outside window: {:#x}", offset);
        let mut st = self.0.lock();
        st.writes.push((offset, value));
        match offset {
            CTRL => {
                if value & CTRL_MST_DIS != 0 && !st.master_stuck {
                    let status = st.reg(STATUS) & !STATUS_MST_EN;
                    st.regs.insert(STATUS, status);
                }
                if value & CTRL_RST != 0 {
                    // Global reset: CTRL back to defaults, EEPROM reloaded
                    if !st.auto_read_stuck {
                        let eec = st.reg(EEC) | EEC_AUTO_RD;
                        st.regs.insert(EEC, eec);
                    }
                    st.regs.insert(CTRL, 0);
                } else {
                    st.regs.insert(CTRL, value);
                }
            }
            ICR => {
                let icr = st.reg(ICR) & !value;
                st.regs.insert(ICR, icr);
            }
            IMS => {
                let ims = st.reg(IMS) | value;
                st.regs.insert(IMS, ims);
            }
            IMC => {
                let ims = st.reg(IMS) & !value;
                st.regs.insert(IMS, ims);
            }
            _ => {
                st.regs.insert(offset, value);
            }
        }
    }
}

/// Host platform backed by [`Sim`]
pub struct SimPlatform(Sim);

impl SimPlatform {
    fn step(&self, step: FailAt, event: Event) -> Result<(), ()> {
        let mut st = self.0.lock();
        if st.fail == Some(step) {
            return Err(());
        }
        st.events.push(event);
        Ok(())
    }
}

impl PciFunction for SimPlatform {
    type Registers = SimRegs;

    fn enable_device(&mut self) -> Result<(), PlatformError> {
        self.step(FailAt::Enable, Event::Enable)
            .map_err(|_| PlatformError::EnableFailed)?;
        self.0.lock().enabled = true;
        Ok(())
    }

    fn disable_device(&mut self) {
        let mut st = self.0.lock();
        assert!(st.enabled, "device disabled twice");
        st.enabled = false;
        st.events.push(Event::Disable);
    }

    fn request_regions(&mut self) -> Result<(), PlatformError> {
        self.step(FailAt::Regions, Event::RequestRegions)
            .map_err(|_| PlatformError::RegionsBusy)?;
        self.0.lock().regions = true;
        Ok(())
    }

    fn release_regions(&mut self) {
        let mut st = self.0.lock();
        assert!(st.regions, "regions released twice");
        st.regions = false;
        st.events.push(Event::ReleaseRegions);
    }

    fn map_registers(&mut self) -> Result<SimRegs, PlatformError> {
        self.step(FailAt::Map, Event::Map)
            .map_err(|_| PlatformError::MapFailed)?;
        self.0.lock().mapped = true;
        Ok(SimRegs(self.0.clone()))
    }

    fn unmap_registers(&mut self, _registers: SimRegs) {
        let mut st = self.0.lock();
        assert!(st.mapped, "registers unmapped twice");
        st.mapped = false;
        st.events.push(Event::Unmap);
    }

    fn set_bus_master(&mut self) {
        self.0.lock().events.push(Event::BusMaster);
    }

    fn alloc_coherent(&mut self, size: usize) -> Result<DmaRegion, PlatformError> {
        let mut st = self.0.lock();
        let nth = st.allocs_seen;
        st.allocs_seen += 1;
        if st.fail == Some(FailAt::Alloc(nth)) {
            return Err(PlatformError::OutOfDmaMemory);
        }

        let bus = st.next_bus;
        st.next_bus += (size as u64).next_multiple_of(0x1000);
        let mut backing = vec![0u64; size.div_ceil(8)].into_boxed_slice();
        let virt = NonNull::new(backing.as_mut_ptr() as *mut u8).unwrap();
        st.dma.push(Allocation {
            bus,
            len: size,
            backing,
        });
        st.events.push(Event::Alloc(bus));
        // SAFETY: the boxed slice is kept alive in `dma` until freed
        Ok(unsafe { DmaRegion::new(virt, bus, size) })
    }

    fn free_coherent(&mut self, region: DmaRegion) {
        let mut st = self.0.lock();
        let pos = st
            .dma
            .iter()
            .position(|a| a.bus == region.bus_addr())
            .unwrap_or_else(|| panic!("double free of DMA region {:#x}", region.bus_addr()));
        assert_eq!(st.dma[pos].len, region.len());
        st.dma.remove(pos);
        st.events.push(Event::Free(region.bus_addr()));
    }

    fn request_irq(&mut self) -> Result<(), PlatformError> {
        self.step(FailAt::Irq, Event::RequestIrq)
            .map_err(|_| PlatformError::IrqUnavailable)?;
        self.0.lock().irq = true;
        Ok(())
    }

    fn free_irq(&mut self) {
        let mut st = self.0.lock();
        assert!(st.irq, "interrupt freed twice");
        st.irq = false;
        st.events.push(Event::FreeIrq);
    }

    fn delay_ms(&self, ms: u32) {
        self.0.lock().delays += ms;
    }
}
