//! Register Access Layer
//!
//! A register window is a span of device memory addressed by byte offset.
//! Every access is a single 32-bit bus transaction with no other side effect
//! on driver state. Device registers are little-endian on the bus, so values
//! are converted on the way in and out.

use core::ptr::NonNull;
use volatile::Volatile;

/// Typed read/write of 32-bit device registers by byte offset
///
/// Implemented by [`Mmio`] for real hardware and by the simulated controller
/// in tests.
pub trait RegisterIo {
    /// Read the register at `offset`
    fn read(&self, offset: usize) -> u32;

    /// Write `value` to the register at `offset`
    fn write(&self, offset: usize, value: u32);

    /// Read-modify-write helper: set `bits` in the register at `offset`
    ///
    /// Returns the value written.
    fn set_bits(&self, offset: usize, bits: u32) -> u32 {
        let value = self.read(offset) | bits;
        self.write(offset, value);
        value
    }
}

/// Memory-mapped register window
pub struct Mmio {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: Mmio is Send and Sync because:
// - It only holds the address of device memory, never a Rust-owned buffer
// - Each access is one volatile 32-bit load or store, which the bus serializes
// - Ordering between registers is the driver's responsibility, not the window's
unsafe impl Send for Mmio {}
unsafe impl Sync for Mmio {}

impl Mmio {
    /// Wrap a mapped register window
    ///
    /// Returns `None` for a null base.
    ///
    /// # Safety
    /// `base` must point to `len` bytes of mapped device memory that stay
    /// mapped for the lifetime of the returned value, and must be 4-byte aligned.
    pub unsafe fn new(base: *mut u8, len: usize) -> Option<Self> {
        NonNull::new(base).map(|base| Self { base, len })
    }

    /// Size of the window in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address of the window (for unmapping)
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    fn register(&self, offset: usize) -> *mut Volatile<u32> {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.len,
            "register offset {:#x} outside window",
            offset
        );
        // SAFETY: offset was checked against the window length above
        unsafe { self.base.as_ptr().add(offset) as *mut Volatile<u32> }
    }
}

impl RegisterIo for Mmio {
    #[inline]
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: register() bounds-checks the offset; the window is mapped
        // for the lifetime of self (constructor contract)
        u32::from_le(unsafe { (*self.register(offset)).read() })
    }

    #[inline]
    fn write(&self, offset: usize, value: u32) {
        // SAFETY: same as read(); the store is a single volatile transaction
        unsafe { (*self.register(offset)).write(value.to_le()) }
    }
}
