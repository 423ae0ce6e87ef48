//! DMA-coherent memory regions
//!
//! A region is one contiguous allocation visible to both the CPU (through a
//! pointer) and the device (through a bus address). The driver never keeps
//! live pointers into a region: buffers and descriptors are addressed by
//! offset, and a bus address is only produced where a descriptor or register
//! needs one.
//!
//! All multi-byte accessors are little-endian regardless of host byte order,
//! since that is how the controller reads and writes descriptor memory.

use core::ptr::NonNull;
use core::slice;
use volatile::Volatile;

/// One DMA-coherent allocation
#[derive(Debug)]
pub struct DmaRegion {
    virt: NonNull<u8>,
    bus: u64,
    len: usize,
}

// SAFETY: DmaRegion is Send and Sync because:
// - The memory is owned by the platform allocator, not by any Rust value
// - Every accessor is a volatile load/store of at most 8 bytes, so concurrent
//   access from the send path and the interrupt path never tears a field the
//   other side depends on (ownership of each descriptor is handed over through
//   ring indices and the status field)
unsafe impl Send for DmaRegion {}
unsafe impl Sync for DmaRegion {}

impl DmaRegion {
    /// Wrap a coherent allocation
    ///
    /// # Safety
    /// `virt` must point to `len` bytes of DMA-coherent memory, aligned to at
    /// least 16 bytes, that the device reaches at `bus`. The memory must stay
    /// allocated until the region is handed back to the platform.
    pub unsafe fn new(virt: NonNull<u8>, bus: u64, len: usize) -> Self {
        Self { virt, bus, len }
    }

    /// Bus address of the first byte
    pub fn bus_addr(&self) -> u64 {
        self.bus
    }

    /// Bus address of the byte at `offset`
    pub fn bus_addr_at(&self, offset: usize) -> u64 {
        assert!(offset < self.len, "DMA offset {:#x} out of region", offset);
        self.bus + offset as u64
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// CPU pointer to the first byte (for freeing)
    pub fn as_ptr(&self) -> *mut u8 {
        self.virt.as_ptr()
    }

    #[inline]
    fn field<T: Copy>(&self, offset: usize) -> *mut Volatile<T> {
        let size = core::mem::size_of::<T>();
        assert!(
            offset % size == 0 && offset + size <= self.len,
            "DMA field {:#x}+{} out of region",
            offset,
            size
        );
        // SAFETY: bounds and natural alignment checked above; the region base
        // is at least 16-byte aligned (constructor contract)
        unsafe { self.virt.as_ptr().add(offset) as *mut Volatile<T> }
    }

    pub fn read_u8(&self, offset: usize) -> u8 {
        // SAFETY: field() validated the offset
        unsafe { (*self.field::<u8>(offset)).read() }
    }

    pub fn write_u8(&self, offset: usize, value: u8) {
        // SAFETY: field() validated the offset
        unsafe { (*self.field::<u8>(offset)).write(value) }
    }

    pub fn read_u16_le(&self, offset: usize) -> u16 {
        // SAFETY: field() validated the offset
        u16::from_le(unsafe { (*self.field::<u16>(offset)).read() })
    }

    pub fn write_u16_le(&self, offset: usize, value: u16) {
        // SAFETY: field() validated the offset
        unsafe { (*self.field::<u16>(offset)).write(value.to_le()) }
    }

    pub fn read_u32_le(&self, offset: usize) -> u32 {
        // SAFETY: field() validated the offset
        u32::from_le(unsafe { (*self.field::<u32>(offset)).read() })
    }

    pub fn write_u32_le(&self, offset: usize, value: u32) {
        // SAFETY: field() validated the offset
        unsafe { (*self.field::<u32>(offset)).write(value.to_le()) }
    }

    pub fn read_u64_le(&self, offset: usize) -> u64 {
        // SAFETY: field() validated the offset
        u64::from_le(unsafe { (*self.field::<u64>(offset)).read() })
    }

    pub fn write_u64_le(&self, offset: usize, value: u64) {
        // SAFETY: field() validated the offset
        unsafe { (*self.field::<u64>(offset)).write(value.to_le()) }
    }

    /// Zero the whole region
    pub fn clear(&self) {
        // SAFETY: the region covers exactly len bytes
        unsafe { core::ptr::write_bytes(self.virt.as_ptr(), 0, self.len) }
    }

    /// Copy `data` into the region at `offset`
    pub fn copy_in(&self, offset: usize, data: &[u8]) {
        assert!(
            offset + data.len() <= self.len,
            "DMA copy {:#x}+{} out of region",
            offset,
            data.len()
        );
        // SAFETY: destination range checked above; source is a distinct Rust slice
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), self.virt.as_ptr().add(offset), data.len())
        }
    }

    /// Copy bytes at `offset` out of the region into `out`
    pub fn copy_out(&self, offset: usize, out: &mut [u8]) {
        assert!(
            offset + out.len() <= self.len,
            "DMA copy {:#x}+{} out of region",
            offset,
            out.len()
        );
        // SAFETY: source range checked above; destination is a distinct Rust slice
        unsafe {
            core::ptr::copy_nonoverlapping(self.virt.as_ptr().add(offset), out.as_mut_ptr(), out.len())
        }
    }

    /// Borrow `len` bytes at `offset`
    ///
    /// # Safety
    /// The device must not write the range while the slice is alive. For
    /// receive buffers that holds until the descriptor goes back to hardware.
    pub unsafe fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        assert!(offset + len <= self.len, "DMA view {:#x}+{} out of region", offset, len);
        // SAFETY: range checked above; exclusivity is the caller's contract
        unsafe { slice::from_raw_parts(self.virt.as_ptr().add(offset), len) }
    }
}
