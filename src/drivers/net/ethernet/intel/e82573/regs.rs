//! 82573 register map
//!
//! Offsets are byte offsets into BAR0. Only the registers the driver touches
//! are listed.

// ============================================================================
// Sizing
// ============================================================================

/// Number of transmit buffers in the pool
pub const TX_BUFFERS: usize = 42;

/// Size of one transmit pool slot (maximum frame)
pub const MAX_FRAME_SIZE: usize = 0x600;

/// Transmit descriptors (ring length must be a multiple of 128 bytes)
pub const TX_DESCS: usize = 16;

/// Receive descriptors
pub const RX_DESCS: usize = 16;

/// Receive buffer per descriptor, matches RCTL.BSIZE = 2048
pub const RX_BUFFER_PER_DESC: usize = 2048;

/// Receive-address entries (entry 0 is the station address)
pub const RAR_ENTRIES: usize = 16;

/// 32-bit words in the multicast table array
pub const MTA_WORDS: usize = 128;

pub const TX_BUFFERS_SIZE: usize = TX_BUFFERS * MAX_FRAME_SIZE;
pub const RX_BUFFERS_SIZE: usize = RX_DESCS * RX_BUFFER_PER_DESC;

// ============================================================================
// PCI Identification
// ============================================================================

pub const INTEL_VENDOR_ID: u16 = 0x8086;

/// 82573L Gigabit Ethernet
pub const DEVICE_IDS: [u16; 1] = [0x109A];

// ============================================================================
// General Registers
// ============================================================================

pub const CTRL: usize = 0x0000;
pub const CTRL_FD: u32 = 1 << 0;
pub const CTRL_MST_DIS: u32 = 1 << 2;
pub const CTRL_LRST: u32 = 1 << 3;
pub const CTRL_SLU: u32 = 1 << 6;
pub const CTRL_RST: u32 = 1 << 26;
pub const CTRL_PHY_RST: u32 = 1 << 31;
pub const CTRL_DEF: u32 = CTRL_LRST | CTRL_SLU;

pub const STATUS: usize = 0x0008;
/// Set while the controller still has bus-master requests pending
pub const STATUS_MST_EN: u32 = 1 << 19;

pub const EEC: usize = 0x0010;
pub const EEC_AUTO_RD: u32 = 1 << 9;

// ============================================================================
// Interrupt Registers
// ============================================================================

/// Interrupt cause read (read-to-clear when INT_ASSERTED is set)
pub const ICR: usize = 0x00C0;
/// Interrupt mask set/read
pub const IMS: usize = 0x00D0;
/// Interrupt mask clear
pub const IMC: usize = 0x00D8;

pub const INT_TXDW: u32 = 1 << 0;
pub const INT_TXQE: u32 = 1 << 1;
pub const INT_LSC: u32 = 1 << 2;
pub const INT_RXSEQ: u32 = 1 << 3;
pub const INT_RXDMT0: u32 = 1 << 4;
pub const INT_RXO: u32 = 1 << 6;
pub const INT_RXT0: u32 = 1 << 7;
pub const INT_TXD_LOW: u32 = 1 << 15;
pub const INT_SRPD: u32 = 1 << 16;
pub const INT_ASSERTED: u32 = 1 << 31;
pub const INT_MASK_ALL: u32 = 0xFFFF_FFFF;
pub const INT_MASK_DEF: u32 = INT_TXDW | INT_RXT0 | INT_RXDMT0 | INT_RXO | INT_RXSEQ;

/// Causes that start a receive drain
pub const INT_RX_DRAIN: u32 = INT_RXT0 | INT_SRPD | INT_RXDMT0;

/// Causes the interrupt handler acts on
///
/// SRPD is never unmasked but can be latched when another device on a
/// shared line triggers the handler.
pub const INT_HANDLED: u32 = INT_MASK_DEF | INT_RX_DRAIN;

// ============================================================================
// Transmit Registers
// ============================================================================

pub const TCTL: usize = 0x0400;
pub const TCTL_EN: u32 = 1 << 1;
pub const TCTL_PSP: u32 = 1 << 3;
pub const TCTL_CT: u32 = 0x0F << 4;
pub const TCTL_COLD: u32 = 0x3F << 12;
pub const TCTL_DEF: u32 = TCTL_EN | TCTL_PSP | TCTL_CT | TCTL_COLD;

pub const TIPG: usize = 0x0410;
pub const TIPG_DEF: u32 = 0x0070_2008;

pub const TDBAL: usize = 0x3800;
pub const TDBAH: usize = 0x3804;
pub const TDLEN: usize = 0x3808;
pub const TDH: usize = 0x3810;
pub const TDT: usize = 0x3818;

pub const TXDCTL: usize = 0x3828;
pub const TXDCTL_GRAN: u32 = 1 << 24;
pub const TXDCTL_DEF: u32 = TXDCTL_GRAN;

// ============================================================================
// Receive Registers
// ============================================================================

pub const RCTL: usize = 0x0100;
pub const RCTL_EN: u32 = 1 << 1;
pub const RCTL_BAM: u32 = 1 << 15;
pub const RCTL_BSIZE_2048: u32 = 0;
pub const RCTL_SECRC: u32 = 1 << 26;
pub const RCTL_DEF: u32 = RCTL_EN | RCTL_BAM | RCTL_SECRC | RCTL_BSIZE_2048;

pub const RDBAL0: usize = 0x2800;
pub const RDBAH0: usize = 0x2804;
pub const RDLEN0: usize = 0x2808;
pub const RDH0: usize = 0x2810;
pub const RDT0: usize = 0x2818;

pub const RXDCTL: usize = 0x2828;
pub const RXDCTL_GRAN: u32 = 1 << 24;
pub const RXDCTL_DEF: u32 = RXDCTL_GRAN;

// ============================================================================
// Address Filtering
// ============================================================================

pub const MTA_BASE: usize = 0x5200;
pub const RAL_BASE: usize = 0x5400;
pub const RAH_BASE: usize = 0x5404;
/// Address valid
pub const RAH_AV: u32 = 1 << 31;

/// Multicast table word `n`
#[inline]
pub const fn mta(n: usize) -> usize {
    MTA_BASE + 4 * n
}

/// Receive address low, entry `n`
#[inline]
pub const fn ral(n: usize) -> usize {
    RAL_BASE + 8 * n
}

/// Receive address high, entry `n`
#[inline]
pub const fn rah(n: usize) -> usize {
    RAH_BASE + 8 * n
}

/// Size of the register window the driver needs mapped
pub const REGISTER_WINDOW: usize = 0x20000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(CTRL_DEF, 0x48);
        assert_eq!(TCTL_DEF, 0x3F0FA);
        assert_eq!(RCTL_DEF, 0x0400_8002);
        assert_eq!(INT_MASK_DEF, 0xD9);
        assert_eq!(INT_HANDLED, 0x1_00D9);
        assert_eq!(CTRL_PHY_RST, 0x8000_0000);
    }

    #[test]
    fn test_table_offsets() {
        assert_eq!(ral(0), 0x5400);
        assert_eq!(rah(15), 0x547C);
        assert_eq!(mta(MTA_WORDS - 1), 0x53FC);
    }

    #[test]
    fn test_ring_lengths_are_128_byte_multiples() {
        assert_eq!((TX_DESCS * 16) % 128, 0);
        assert_eq!((RX_DESCS * 16) % 128, 0);
    }
}
