//! Legacy transmit and receive descriptors
//!
//! Both formats are 16 bytes, little-endian, and live in DMA-coherent
//! memory shared with the controller. They are accessed field by field
//! through [`DmaRegion`] rather than as `#[repr(C)]` structs, so the layout
//! holds on any host byte order.
//!
//! ```text
//! Transmit                              Receive
//! ┌──────────────────────────────┐      ┌──────────────────────────────┐
//! │ 0x00  buffer address (u64)   │      │ 0x00  buffer address (u64)   │
//! ├──────────────────────────────┤      ├───────────────┬──────────────┤
//! │ 0x08  cmd | length (u32)     │      │ 0x08 len u16  │ 0x0A csum u16│
//! ├──────────────────────────────┤      ├──────┬───────┬┴──────────────┤
//! │ 0x0C  status (u32)           │      │ 0x0C │ 0x0D  │ 0x0E reserved │
//! └──────────────────────────────┘      │status│errors │               │
//!                                       └──────┴───────┴───────────────┘
//! ```

use crate::hal::DmaRegion;

/// Size of either descriptor format
pub const DESC_SIZE: usize = 16;

// Transmit command bits (upper byte of the cmd/length word)
pub const TX_CMD_EOP: u32 = 1 << 24;
pub const TX_CMD_IFCS: u32 = 1 << 25;
pub const TX_CMD_RS: u32 = 1 << 27;
pub const TX_CMD_DEF: u32 = TX_CMD_RS | TX_CMD_IFCS | TX_CMD_EOP;
pub const TX_LENGTH_MASK: u32 = 0xFFFF;

// Transmit status bits
pub const TX_STAT_DD: u32 = 1 << 0;
pub const TX_STAT_EC: u32 = 1 << 1;
pub const TX_STAT_LC: u32 = 1 << 2;

// Receive status bits
pub const RX_STAT_DD: u8 = 1 << 0;
pub const RX_STAT_EOP: u8 = 1 << 1;

// Receive error bits
pub const RX_ERR_CE: u8 = 1 << 0;
pub const RX_ERR_SEQ: u8 = 1 << 2;

const ADDR: usize = 0x00;
const TX_CMD_LEN: usize = 0x08;
const TX_STATUS: usize = 0x0C;
const RX_LENGTH: usize = 0x08;
const RX_CHECKSUM: usize = 0x0A;
const RX_STATUS: usize = 0x0C;
const RX_ERRORS: usize = 0x0D;
const RX_RESERVED: usize = 0x0E;

/// View of transmit descriptor `index` inside a descriptor region
pub struct TxDesc<'a> {
    region: &'a DmaRegion,
    base: usize,
}

impl<'a> TxDesc<'a> {
    pub fn at(region: &'a DmaRegion, index: usize) -> Self {
        Self {
            region,
            base: index * DESC_SIZE,
        }
    }

    pub fn addr(&self) -> u64 {
        self.region.read_u64_le(self.base + ADDR)
    }

    pub fn set_addr(&self, addr: u64) {
        self.region.write_u64_le(self.base + ADDR, addr);
    }

    pub fn cmd_len(&self) -> u32 {
        self.region.read_u32_le(self.base + TX_CMD_LEN)
    }

    /// Frame length with the default command bits
    pub fn set_frame(&self, len: usize) {
        let word = (len as u32 & TX_LENGTH_MASK) | TX_CMD_DEF;
        self.region.write_u32_le(self.base + TX_CMD_LEN, word);
    }

    pub fn status(&self) -> u32 {
        self.region.read_u32_le(self.base + TX_STATUS)
    }

    pub fn set_status(&self, status: u32) {
        self.region.write_u32_le(self.base + TX_STATUS, status);
    }

    pub fn is_done(&self) -> bool {
        self.status() & TX_STAT_DD != 0
    }
}

/// View of receive descriptor `index` inside a descriptor region
pub struct RxDesc<'a> {
    region: &'a DmaRegion,
    base: usize,
}

impl<'a> RxDesc<'a> {
    pub fn at(region: &'a DmaRegion, index: usize) -> Self {
        Self {
            region,
            base: index * DESC_SIZE,
        }
    }

    pub fn addr(&self) -> u64 {
        self.region.read_u64_le(self.base + ADDR)
    }

    /// Post a buffer: set the address and clear every other field
    pub fn post(&self, addr: u64) {
        self.region.write_u64_le(self.base + ADDR, addr);
        self.region.write_u16_le(self.base + RX_LENGTH, 0);
        self.region.write_u16_le(self.base + RX_CHECKSUM, 0);
        self.region.write_u8(self.base + RX_STATUS, 0);
        self.region.write_u8(self.base + RX_ERRORS, 0);
        self.region.write_u16_le(self.base + RX_RESERVED, 0);
    }

    pub fn length(&self) -> u16 {
        self.region.read_u16_le(self.base + RX_LENGTH)
    }

    pub fn status(&self) -> u8 {
        self.region.read_u8(self.base + RX_STATUS)
    }

    pub fn set_status(&self, status: u8) {
        self.region.write_u8(self.base + RX_STATUS, status);
    }

    pub fn errors(&self) -> u8 {
        self.region.read_u8(self.base + RX_ERRORS)
    }
}
