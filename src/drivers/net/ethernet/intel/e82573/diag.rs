//! Statistics counters and the diagnostics text dump
//!
//! Protocol errors (CRC, sequence, collisions, ...) never surface as `Err`;
//! they are counted here and visible through [`EdrvStats`] and the dump.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU32, Ordering};

use super::regs::*;
use crate::hal::RegisterIo;

/// Snapshot of the driver counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdrvStats {
    /// Frames handed to the transmit ring
    pub tx_sent: u32,
    /// Transmit descriptors completed without collision errors
    pub tx_completed: u32,
    pub tx_excess_collisions: u32,
    pub tx_late_collisions: u32,
    /// Descriptor-done on a slot with no frame in flight
    pub tx_spurious: u32,
    /// Transmit-done interrupt that found nothing to reclaim
    pub tx_stalls: u32,
    pub rx_interrupts: u32,
    /// Frames handed to the receive handler
    pub rx_frames: u32,
    /// Frames spanning several descriptors (dropped)
    pub rx_multi_descriptor: u32,
    /// Status written back without descriptor-done
    pub rx_not_done: u32,
    pub rx_crc_errors: u32,
    /// Sequence errors flagged in a receive descriptor
    pub rx_sequence_errors: u32,
    /// RXSEQ interrupt causes
    pub rx_sequence_irqs: u32,
    pub rx_overruns: u32,
    /// Interrupts on a shared line that were not ours
    pub irq_unhandled: u32,
}

/// Live counters, bumped from the send path and the interrupt path
#[derive(Default)]
pub(super) struct Counters {
    pub tx_sent: AtomicU32,
    pub tx_completed: AtomicU32,
    pub tx_excess_collisions: AtomicU32,
    pub tx_late_collisions: AtomicU32,
    pub tx_spurious: AtomicU32,
    pub tx_stalls: AtomicU32,
    pub rx_interrupts: AtomicU32,
    pub rx_frames: AtomicU32,
    pub rx_multi_descriptor: AtomicU32,
    pub rx_not_done: AtomicU32,
    pub rx_crc_errors: AtomicU32,
    pub rx_sequence_errors: AtomicU32,
    pub rx_sequence_irqs: AtomicU32,
    pub rx_overruns: AtomicU32,
    pub irq_unhandled: AtomicU32,
}

#[inline]
pub(super) fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub fn snapshot(&self) -> EdrvStats {
        let get = |c: &AtomicU32| c.load(Ordering::Relaxed);
        EdrvStats {
            tx_sent: get(&self.tx_sent),
            tx_completed: get(&self.tx_completed),
            tx_excess_collisions: get(&self.tx_excess_collisions),
            tx_late_collisions: get(&self.tx_late_collisions),
            tx_spurious: get(&self.tx_spurious),
            tx_stalls: get(&self.tx_stalls),
            rx_interrupts: get(&self.rx_interrupts),
            rx_frames: get(&self.rx_frames),
            rx_multi_descriptor: get(&self.rx_multi_descriptor),
            rx_not_done: get(&self.rx_not_done),
            rx_crc_errors: get(&self.rx_crc_errors),
            rx_sequence_errors: get(&self.rx_sequence_errors),
            rx_sequence_irqs: get(&self.rx_sequence_irqs),
            rx_overruns: get(&self.rx_overruns),
            irq_unhandled: get(&self.irq_unhandled),
        }
    }
}

/// `fmt::Write` into a fixed byte buffer, silently truncating
///
/// Behaves like repeated `snprintf` into one buffer: output that does not
/// fit is dropped and [`written`](Self::written) reports what was kept.
pub struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn written(&self) -> usize {
        self.pos
    }
}

impl Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len() - self.pos;
        let n = s.len().min(room);
        self.buf[self.pos..self.pos + n].copy_from_slice(&s.as_bytes()[..n]);
        self.pos += n;
        Ok(())
    }
}

/// Driver-side ring indices shown next to the hardware registers
pub(super) struct RingIndices {
    pub tx_head: usize,
    pub tx_tail: usize,
    /// Status word of the transmit descriptor at `tx_head`, if mapped
    pub tx_head_status: Option<u32>,
    pub tx_in_flight: usize,
    pub tx_buffers_used: usize,
    pub rx_head: usize,
    pub rx_tail: usize,
}

/// Format the diagnostics dump
pub(super) fn dump<W, R>(w: &mut W, regs: &R, rings: &RingIndices, stats: &EdrvStats) -> fmt::Result
where
    W: Write,
    R: RegisterIo + ?Sized,
{
    writeln!(w, "Head: {} ({})", rings.tx_head, regs.read(TDH))?;
    match rings.tx_head_status {
        Some(status) => writeln!(w, "Headstatus: {:X}", status)?,
        None => writeln!(w, "Headstatus: -")?,
    }
    writeln!(w, "Tail: {} ({})", rings.tx_tail, regs.read(TDT))?;
    writeln!(
        w,
        "In flight: {}, buffers in use: {}/{}",
        rings.tx_in_flight, rings.tx_buffers_used, TX_BUFFERS
    )?;

    for i in 0..RAR_ENTRIES {
        writeln!(
            w,
            "RAH[{:2}] RAL[{:2}]: 0x{:08X} 0x{:08X}",
            i,
            i,
            regs.read(rah(i)),
            regs.read(ral(i))
        )?;
    }

    writeln!(w, "Interrupt Mask Set/Read Register:    0x{:08X}", regs.read(IMS))?;
    writeln!(w, "Receive Control Register:            0x{:08X}", regs.read(RCTL))?;
    writeln!(w, "Receive Descriptor Control Register: 0x{:08X}", regs.read(RXDCTL))?;
    writeln!(w, "Receive Descriptor Length Register:  0x{:08X}", regs.read(RDLEN0))?;
    writeln!(
        w,
        "Receive Descriptor Head Register:    0x{:08X} ({})",
        regs.read(RDH0),
        rings.rx_head
    )?;
    writeln!(
        w,
        "Receive Descriptor Tail Register:    0x{:08X} ({})",
        regs.read(RDT0),
        rings.rx_tail
    )?;

    writeln!(
        w,
        "Tx: sent {} done {} excess-col {} late-col {} spurious {} stalls {}",
        stats.tx_sent,
        stats.tx_completed,
        stats.tx_excess_collisions,
        stats.tx_late_collisions,
        stats.tx_spurious,
        stats.tx_stalls
    )?;
    writeln!(
        w,
        "Rx: irqs {} frames {} multi-desc {} not-done {} crc {} seq {}/{} overrun {}",
        stats.rx_interrupts,
        stats.rx_frames,
        stats.rx_multi_descriptor,
        stats.rx_not_done,
        stats.rx_crc_errors,
        stats.rx_sequence_errors,
        stats.rx_sequence_irqs,
        stats.rx_overruns
    )?;
    writeln!(w, "Unhandled interrupts: {}", stats.irq_unhandled)
}
