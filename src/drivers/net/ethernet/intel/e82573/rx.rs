//! Receive descriptor ring
//!
//! Every descriptor is posted once at bring-up with a fixed 2 KiB slice of
//! the receive buffer region (descriptor `i` owns bytes
//! `i * RX_BUFFER_PER_DESC ..`). Nothing is reallocated afterwards: a
//! drained descriptor goes back to hardware by moving the tail register.
//!
//! Hardware owns the descriptors from head up to (not including) tail. The
//! driver keeps tail one behind head so the two never meet.

use core::sync::atomic::{AtomicUsize, Ordering, fence};

use super::descriptor::{RX_ERR_CE, RX_ERR_SEQ, RX_STAT_DD, RX_STAT_EOP, RxDesc};
use super::diag::{Counters, bump};
use super::regs::{RDT0, RX_BUFFER_PER_DESC, RX_DESCS};
use crate::drivers::net::netdev::{BufferInFrame, RxBuffer, RxHandler};
use crate::hal::{DmaRegion, RegisterIo};

/// Receive ring indices
///
/// Only the interrupt path touches these once the device is running.
pub(super) struct RxRing {
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl RxRing {
    pub const fn new() -> Self {
        Self {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub fn head(&self) -> usize {
        self.head.load(Ordering::Relaxed)
    }

    pub fn tail(&self) -> usize {
        self.tail.load(Ordering::Relaxed)
    }

    /// Point every descriptor at its buffer and reset the indices
    ///
    /// Leaves head at 0 and tail at `RX_DESCS - 1`; the caller programs the
    /// matching RDH/RDT values.
    pub fn post_all(&mut self, descs: &DmaRegion, buffers: &DmaRegion) {
        for i in 0..RX_DESCS {
            RxDesc::at(descs, i).post(buffers.bus_addr_at(i * RX_BUFFER_PER_DESC));
        }
        *self.head.get_mut() = 0;
        *self.tail.get_mut() = RX_DESCS - 1;
    }

    pub fn reset(&mut self) {
        *self.head.get_mut() = 0;
        *self.tail.get_mut() = 0;
    }

    /// Consume written-back descriptors from head onward
    ///
    /// Error-free single-descriptor frames go to `handler`; everything else
    /// is counted and dropped. Visits at most `RX_DESCS` descriptors, then
    /// publishes `tail = head - 1` to RDT. Returns the number of descriptors
    /// consumed.
    pub fn drain<R>(
        &self,
        descs: &DmaRegion,
        buffers: &DmaRegion,
        regs: &R,
        handler: &dyn RxHandler,
        counters: &Counters,
    ) -> usize
    where
        R: RegisterIo + ?Sized,
    {
        let mut head = self.head.load(Ordering::Relaxed);
        let mut drained = 0;

        while drained < RX_DESCS {
            let desc = RxDesc::at(descs, head);
            let status = desc.status();
            if status == 0 {
                break;
            }
            let errors = desc.errors();

            if status & RX_STAT_DD == 0 {
                bump(&counters.rx_not_done);
            } else if status & RX_STAT_EOP == 0 {
                bump(&counters.rx_multi_descriptor);
            } else if errors & RX_ERR_CE != 0 {
                bump(&counters.rx_crc_errors);
            } else if errors & RX_ERR_SEQ != 0 {
                bump(&counters.rx_sequence_errors);
            } else {
                // Length excludes the FCS (RCTL.SECRC)
                let len = (desc.length() as usize).min(RX_BUFFER_PER_DESC);
                // SAFETY: the descriptor at head is driver-owned until RDT
                // moves past it, which happens after the handler returns
                let data = unsafe { buffers.bytes(head * RX_BUFFER_PER_DESC, len) };
                bump(&counters.rx_frames);
                handler.on_receive(&RxBuffer {
                    data,
                    in_frame: BufferInFrame::LastInFrame,
                });
            }

            desc.set_status(0);
            head = (head + 1) % RX_DESCS;
            drained += 1;
        }

        let tail = (head + RX_DESCS - 1) % RX_DESCS;
        self.head.store(head, Ordering::Relaxed);
        self.tail.store(tail, Ordering::Relaxed);

        // Cleared status bytes must land before the descriptors go back
        fence(Ordering::SeqCst);
        regs.write(RDT0, tail as u32);
        drained
    }
}
