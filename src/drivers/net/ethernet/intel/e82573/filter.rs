//! Receive-address (perfect filter) table
//!
//! Sixteen RAL/RAH pairs. Entry 0 holds the station address and is never
//! touched here; entries 1..15 take additional unicast or multicast
//! addresses. There is no fallback to the multicast hash table when the
//! table is full.

use super::regs::{RAH_AV, RAR_ENTRIES, rah, ral};
use crate::drivers::net::netdev::EdrvError;
use crate::hal::RegisterIo;
use crate::net::ethernet::MacAddress;

const RAH_ADDR_MASK: u32 = 0xFFFF;

/// Split an address into its RAL and RAH (without AV) register values
pub fn split(mac: &MacAddress) -> (u32, u32) {
    let b = mac.as_bytes();
    let low = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    let high = u32::from_le_bytes([b[4], b[5], 0, 0]);
    (low, high)
}

/// Rebuild an address from RAL/RAH register values
pub fn join(low: u32, high: u32) -> MacAddress {
    let l = low.to_le_bytes();
    let h = high.to_le_bytes();
    MacAddress::new([l[0], l[1], l[2], l[3], h[0], h[1]])
}

/// Program entry `index` with `mac` and mark it valid
///
/// RAL goes first: hardware matches on the entry as soon as AV is set.
pub fn write_entry<R: RegisterIo + ?Sized>(regs: &R, index: usize, mac: &MacAddress) {
    let (low, high) = split(mac);
    regs.write(ral(index), low);
    regs.write(rah(index), high | RAH_AV);
}

/// Read entry `index` back, `None` if its AV bit is clear
pub fn read_entry<R: RegisterIo + ?Sized>(regs: &R, index: usize) -> Option<MacAddress> {
    let high = regs.read(rah(index));
    if high & RAH_AV == 0 {
        return None;
    }
    Some(join(regs.read(ral(index)), high & RAH_ADDR_MASK))
}

/// Store `mac` in the first free entry of 1..15
///
/// Returns the entry used.
pub fn add<R: RegisterIo + ?Sized>(regs: &R, mac: &MacAddress) -> Result<usize, EdrvError> {
    let index = (1..RAR_ENTRIES)
        .find(|&i| regs.read(rah(i)) & RAH_AV == 0)
        .ok_or(EdrvError::FilterTableFull)?;
    write_entry(regs, index, mac);
    Ok(index)
}

/// Invalidate the entry holding exactly `mac`
///
/// Returns the entry cleared, `None` (not an error) if no entry matches.
pub fn remove<R: RegisterIo + ?Sized>(regs: &R, mac: &MacAddress) -> Option<usize> {
    let (low, high) = split(mac);
    let index = (1..RAR_ENTRIES).find(|&i| {
        regs.read(rah(i)) & (RAH_AV | RAH_ADDR_MASK) == (high | RAH_AV) && regs.read(ral(i)) == low
    })?;
    regs.write(rah(index), 0);
    Some(index)
}
