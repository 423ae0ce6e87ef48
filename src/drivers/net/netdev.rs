//! Ethernet Driver Upstream Contract
//!
//! Types shared between a controller driver and the protocol stack sitting
//! on top of it. The stack owns transmit buffer descriptors and supplies two
//! callback sinks; the driver owns the DMA memory behind them.
//!
//! ## Buffer Lifecycle
//!
//! ```text
//! TxBuffer::new ─► alloc_tx_buffer ─► write_frame ─► send ─► (IRQ) tx_complete
//!                        ▲                                         │
//!                        └───────── release_tx_buffer ◄────────────┘
//! ```
//!
//! Receive buffers are never owned by the stack: an [`RxBuffer`] borrows a
//! slot of the receive pool for the duration of one [`RxHandler::on_receive`]
//! call, after which the descriptor goes back to hardware.
//!
//! ## Example Usage
//!
//! ```ignore
//! use edrv82573::drivers::net::netdev::{TxBuffer, TxCompletion, BufferNumber};
//!
//! struct Sink;
//! impl TxCompletion for Sink {
//!     fn tx_complete(&self, buffer: BufferNumber) {
//!         // Frame left the wire, buffer may be reused
//!     }
//! }
//!
//! let sink = Sink;
//! let mut buf = TxBuffer::new(60).with_completion(&sink);
//! edrv.alloc_tx_buffer(&mut buf)?;
//! edrv.write_frame(&mut buf, &frame)?;
//! edrv.send(&buf)?;
//! ```

use crate::hal::PlatformError;
use core::fmt;

/// Which bring-up poll ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// STATUS never reported bus mastering stopped after CTRL.MST_DIS
    MasterDisable,

    /// EEC never reported the EEPROM auto-read done after reset
    AutoRead,
}

/// Errors returned by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdrvError {
    /// Host platform refused a resource during bring-up
    Resource(PlatformError),

    /// Hardware did not acknowledge a bring-up step in time
    Timeout(TimeoutKind),

    /// No transmit buffer can be granted: pool exhausted, pool not mapped
    /// yet, or the requested size is above the slot size
    NoFreeBuffer,

    /// The transmit ring is full, retry after completions
    NoFreeDescriptor,

    /// All additional receive-address entries are in use
    FilterTableFull,

    /// The buffer does not reference an allocated pool slot
    BufferNotExisting,

    /// Frame does not fit a transmit slot
    FrameTooLarge,

    /// Operation needs a running device
    NotInitialized,

    /// `init` called on a device that is not uninitialized
    AlreadyInitialized,
}

/// Coarse error classes
///
/// Resource and timing errors are fatal to bring-up. Capacity errors are
/// backpressure: the caller retries or drops. Usage errors are caller bugs.
/// Protocol errors (CRC, collisions, ...) never surface as `Err`, they only
/// show up in the statistics counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Resource,
    Capacity,
    Timing,
    Usage,
}

impl EdrvError {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            EdrvError::Resource(_) => ErrorClass::Resource,
            EdrvError::Timeout(_) => ErrorClass::Timing,
            EdrvError::NoFreeBuffer | EdrvError::NoFreeDescriptor | EdrvError::FilterTableFull => {
                ErrorClass::Capacity
            }
            EdrvError::BufferNotExisting
            | EdrvError::FrameTooLarge
            | EdrvError::NotInitialized
            | EdrvError::AlreadyInitialized => ErrorClass::Usage,
        }
    }
}

impl From<PlatformError> for EdrvError {
    fn from(err: PlatformError) -> Self {
        EdrvError::Resource(err)
    }
}

impl fmt::Display for EdrvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdrvError::Resource(err) => write!(f, "Resource error: {}", err),
            EdrvError::Timeout(TimeoutKind::MasterDisable) => {
                write!(f, "Timeout waiting for master disable")
            }
            EdrvError::Timeout(TimeoutKind::AutoRead) => {
                write!(f, "Timeout waiting for EEPROM auto-read")
            }
            EdrvError::NoFreeBuffer => write!(f, "No free transmit buffer"),
            EdrvError::NoFreeDescriptor => write!(f, "Transmit ring full"),
            EdrvError::FilterTableFull => write!(f, "Receive address table full"),
            EdrvError::BufferNotExisting => write!(f, "Transmit buffer not allocated"),
            EdrvError::FrameTooLarge => write!(f, "Frame too large"),
            EdrvError::NotInitialized => write!(f, "Device not initialized"),
            EdrvError::AlreadyInitialized => write!(f, "Device already initialized"),
        }
    }
}

/// Opaque handle naming one transmit pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferNumber(pub(crate) u32);

impl BufferNumber {
    /// Slot index inside the transmit pool
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Transmit completion sink
///
/// Called from interrupt context once per completed descriptor. Must not
/// block.
pub trait TxCompletion: Sync {
    fn tx_complete(&self, buffer: BufferNumber);
}

/// Receive sink
///
/// Called from interrupt context once per error-free, single-descriptor
/// frame. The frame view is only valid during the call.
pub trait RxHandler: Sync {
    fn on_receive(&self, frame: &RxBuffer<'_>);
}

/// Caller-owned description of a frame to transmit
///
/// `number` is `None` until the driver grants a pool slot. `max_len` is the
/// size the caller asks for; after allocation it holds the slot size, which
/// is always the full transmit frame size regardless of the request.
#[derive(Clone, Copy)]
pub struct TxBuffer<'cb> {
    pub(crate) number: Option<BufferNumber>,
    pub max_len: usize,
    pub len: usize,
    pub completion: Option<&'cb dyn TxCompletion>,
}

impl<'cb> TxBuffer<'cb> {
    /// Describe a buffer of (at most) `max_len` bytes, not yet allocated
    pub fn new(max_len: usize) -> Self {
        Self {
            number: None,
            max_len,
            len: 0,
            completion: None,
        }
    }

    /// Attach a completion sink
    pub fn with_completion(mut self, completion: &'cb dyn TxCompletion) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Pool slot granted by the driver, if any
    pub fn number(&self) -> Option<BufferNumber> {
        self.number
    }
}

impl fmt::Debug for TxBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxBuffer")
            .field("number", &self.number)
            .field("max_len", &self.max_len)
            .field("len", &self.len)
            .field("completion", &self.completion.is_some())
            .finish()
    }
}

/// Position of a receive buffer within a frame
///
/// The controller is configured for 2048-byte receive buffers, so every
/// accepted frame fits one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferInFrame {
    LastInFrame,
}

/// Borrowed view of one received frame
#[derive(Debug)]
pub struct RxBuffer<'a> {
    pub data: &'a [u8],
    pub in_frame: BufferInFrame,
}

impl RxBuffer<'_> {
    /// Frame length in bytes (FCS stripped)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Bytes of frame header a receive filter matches against
pub const FILTER_LEN: usize = 22;

/// One receive filter entry as handed down by the stack
///
/// Only consumed by [`change_filter`](crate::Edrv::change_filter), which this
/// controller accepts and ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxFilter {
    pub handle: u32,
    pub enabled: bool,
    pub value: [u8; FILTER_LEN],
    pub mask: [u8; FILTER_LEN],
}

/// Result of an interrupt handler invocation
///
/// `NotHandled` lets a host sharing the line try other devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    Handled,
    NotHandled,
}
