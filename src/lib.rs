//! Intel 82573 Ethernet driver
//!
//! A `no_std` descriptor-ring driver for the 82573L Gigabit controller, as
//! used under a real-time fieldbus stack. The host OS supplies bus access,
//! DMA memory and interrupt dispatch through [`hal::PciFunction`]; the
//! protocol stack supplies the receive handler and transmit completion
//! sinks described in [`drivers::net::netdev`].
//!
//! ## Example Usage
//!
//! ```ignore
//! use edrv82573::{Edrv, EdrvConfig, TxBuffer};
//!
//! let mut edrv = Edrv::new(pci_function, EdrvConfig::new(&stack));
//! let mac = edrv.init()?;
//!
//! // From the host's interrupt dispatch:
//! edrv.handle_interrupt();
//!
//! let mut buf = TxBuffer::new(60).with_completion(&stack);
//! edrv.alloc_tx_buffer(&mut buf)?;
//! edrv.write_frame(&mut buf, &frame)?;
//! edrv.send(&buf)?;
//! ```

#![cfg_attr(not(test), no_std)]

pub mod drivers;
pub mod hal;
pub mod net;

pub use drivers::net::ethernet::intel::e82573::{
    DeviceState, Edrv, EdrvConfig, EdrvStats, supports_device,
};
pub use drivers::net::netdev::{
    BufferInFrame, BufferNumber, EdrvError, ErrorClass, IrqReturn, RxBuffer, RxFilter,
    RxHandler, TimeoutKind, TxBuffer, TxCompletion,
};
pub use hal::{DmaRegion, Mmio, PciFunction, PlatformError, RegisterIo};
pub use net::ethernet::MacAddress;
