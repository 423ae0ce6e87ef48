//! Transmit buffer pool and transmit descriptor ring
//!
//! ## Buffer pool
//!
//! `TX_BUFFERS` fixed-size slots carved out of one DMA region, tracked by a
//! lock-free bitmap (1 = allocated to a caller). Slot `n` lives at byte
//! offset `n * MAX_FRAME_SIZE`; nothing keeps a pointer into the region.
//!
//! ## Ring
//!
//! ```text
//!            head (IRQ path)          tail (send path)
//!               │                        │
//!   ┌───┬───┬───▼───┬───┬───┬───┬───┬───▼───┬───┐
//!   │   │   │ busy  │ … │ … │ … │ … │ free  │   │
//!   └───┴───┴───────┴───┴───┴───┴───┴───────┴───┘
//! ```
//!
//! Only the send path moves `tail`, only the interrupt path moves `head`.
//! Each slot carries an `occupied` flag and the in-flight record (buffer
//! number and completion sink). The send path fills the record and then
//! sets `occupied` (Release); the interrupt path takes the record, moves
//! `head` and then clears `occupied` (Release). The ring is full exactly
//! when the slot at `tail` is still occupied.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering, fence};

use spin::Mutex;

use super::descriptor::{TX_STAT_EC, TX_STAT_LC, TxDesc};
use super::diag::{Counters, bump};
use super::regs::{TDT, TX_BUFFERS, TX_DESCS};
use crate::drivers::net::netdev::{BufferNumber, EdrvError, TxCompletion};
use crate::hal::{DmaRegion, RegisterIo};

const BITMAP_WORDS: usize = TX_BUFFERS.div_ceil(32);

/// Atomic bitmap for lock-free slot allocation
///
/// Each bit: 0 = free, 1 = allocated. Bits at or above `TX_BUFFERS` are
/// never handed out.
pub(super) struct AtomicBitmap {
    words: [AtomicU32; BITMAP_WORDS],
}

impl AtomicBitmap {
    pub const fn new() -> Self {
        const ATOMIC_ZERO: AtomicU32 = AtomicU32::new(0);
        Self {
            words: [ATOMIC_ZERO; BITMAP_WORDS],
        }
    }

    /// Acquire the lowest free bit
    ///
    /// Returns the bit index if successful, None if all bits are allocated.
    pub fn acquire_bit(&self) -> Option<usize> {
        for (word_idx, word) in self.words.iter().enumerate() {
            let valid = Self::valid_mask(word_idx);
            let mut current = word.load(Ordering::Acquire);
            loop {
                let free = !current & valid;
                if free == 0 {
                    break;
                }
                let bit = free.trailing_zeros();
                match word.compare_exchange_weak(
                    current,
                    current | (1 << bit),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return Some(word_idx * 32 + bit as usize),
                    Err(actual) => current = actual,
                }
            }
        }
        None
    }

    /// Clear a bit
    ///
    /// Releasing a free or out-of-range bit is a no-op. Returns whether the
    /// bit was set.
    pub fn release_bit(&self, bit_idx: usize) -> bool {
        if bit_idx >= TX_BUFFERS {
            return false;
        }
        let mask = 1u32 << (bit_idx % 32);
        let prev = self.words[bit_idx / 32].fetch_and(!mask, Ordering::AcqRel);
        prev & mask != 0
    }

    /// Check if a bit is allocated
    pub fn is_allocated(&self, bit_idx: usize) -> bool {
        if bit_idx >= TX_BUFFERS {
            return false;
        }
        let mask = 1u32 << (bit_idx % 32);
        self.words[bit_idx / 32].load(Ordering::Acquire) & mask != 0
    }

    /// Number of allocated bits
    pub fn count(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Acquire).count_ones() as usize)
            .sum()
    }

    /// Mark everything free
    pub fn clear(&self) {
        for word in &self.words {
            word.store(0, Ordering::Release);
        }
    }

    fn valid_mask(word_idx: usize) -> u32 {
        let remaining = TX_BUFFERS - word_idx * 32;
        if remaining >= 32 {
            u32::MAX
        } else {
            (1u32 << remaining) - 1
        }
    }
}

/// What a ring slot remembers about the frame it carries
#[derive(Clone, Copy)]
pub(super) struct InFlight<'cb> {
    pub number: BufferNumber,
    pub completion: Option<&'cb dyn TxCompletion>,
}

struct TxSlot<'cb> {
    occupied: AtomicBool,
    entry: Mutex<Option<InFlight<'cb>>>,
}

impl TxSlot<'_> {
    fn new() -> Self {
        Self {
            occupied: AtomicBool::new(false),
            entry: Mutex::new(None),
        }
    }
}

/// Transmit ring bookkeeping
///
/// The descriptors themselves live in DMA memory and are passed in by the
/// caller; this type only owns the indices and the in-flight records.
pub(super) struct TxRing<'cb> {
    head: AtomicUsize,
    tail: AtomicUsize,
    slots: [TxSlot<'cb>; TX_DESCS],
}

impl<'cb> TxRing<'cb> {
    pub fn new() -> Self {
        Self {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            slots: core::array::from_fn(|_| TxSlot::new()),
        }
    }

    /// Forget everything in flight and start over at index 0
    ///
    /// Only called while the interrupt line is not registered.
    pub fn reset(&mut self) {
        *self.head.get_mut() = 0;
        *self.tail.get_mut() = 0;
        for slot in &mut self.slots {
            *slot.occupied.get_mut() = false;
            *slot.entry.lock() = None;
        }
    }

    pub fn head(&self) -> usize {
        self.head.load(Ordering::Acquire)
    }

    pub fn tail(&self) -> usize {
        self.tail.load(Ordering::Acquire)
    }

    /// Number of slots holding an unretired frame
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.occupied.load(Ordering::Acquire))
            .count()
    }

    /// Buffer number held by ring slot `index`, if any
    #[cfg(test)]
    pub fn entry_at(&self, index: usize) -> Option<BufferNumber> {
        let slot = &self.slots[index];
        if !slot.occupied.load(Ordering::Acquire) {
            return None;
        }
        slot.entry.lock().as_ref().map(|e| e.number)
    }

    /// Queue one frame and hand it to hardware
    ///
    /// `addr` is the bus address of the frame's pool slot. Fails with
    /// `NoFreeDescriptor` when the slot at tail still holds an unretired
    /// frame.
    pub fn push<R>(
        &self,
        descs: &DmaRegion,
        regs: &R,
        addr: u64,
        len: usize,
        entry: InFlight<'cb>,
    ) -> Result<(), EdrvError>
    where
        R: RegisterIo + ?Sized,
    {
        // Only this path stores tail
        let tail = self.tail.load(Ordering::Relaxed);
        let slot = &self.slots[tail];
        if slot.occupied.load(Ordering::Acquire) {
            return Err(EdrvError::NoFreeDescriptor);
        }

        *slot.entry.lock() = Some(entry);
        slot.occupied.store(true, Ordering::Release);

        let desc = TxDesc::at(descs, tail);
        desc.set_addr(addr);
        desc.set_status(0);
        desc.set_frame(len);

        let next = (tail + 1) % TX_DESCS;
        self.tail.store(next, Ordering::Release);

        // Descriptor contents must be visible before the device sees TDT move
        fence(Ordering::SeqCst);
        regs.write(TDT, next as u32);
        Ok(())
    }

    /// Reclaim completed descriptors from head onward
    ///
    /// Interrupt path only. Visits at most `TX_DESCS` descriptors. Returns
    /// the number of frames reclaimed.
    pub fn reclaim(&self, descs: &DmaRegion, counters: &Counters) -> usize {
        let mut reclaimed = 0;

        for _ in 0..TX_DESCS {
            // Only this path stores head
            let head = self.head.load(Ordering::Relaxed);
            let desc = TxDesc::at(descs, head);

            if !desc.is_done() {
                if reclaimed == 0 {
                    bump(&counters.tx_stalls);
                }
                break;
            }

            let status = desc.status();
            desc.set_status(0);

            let slot = &self.slots[head];
            if !slot.occupied.load(Ordering::Acquire) {
                // Nothing was queued here; keep head where it is
                bump(&counters.tx_spurious);
                break;
            }

            let entry = slot.entry.lock().take();
            let next = (head + 1) % TX_DESCS;
            self.head.store(next, Ordering::Release);
            slot.occupied.store(false, Ordering::Release);
            reclaimed += 1;

            if status & TX_STAT_EC != 0 {
                bump(&counters.tx_excess_collisions);
            } else if status & TX_STAT_LC != 0 {
                bump(&counters.tx_late_collisions);
            } else {
                bump(&counters.tx_completed);
            }

            match entry {
                Some(InFlight {
                    number,
                    completion: Some(sink),
                }) => sink.tx_complete(number),
                Some(_) => {}
                None => bump(&counters.tx_spurious),
            }

            if next == self.tail.load(Ordering::Acquire) {
                break;
            }
        }

        reclaimed
    }
}
