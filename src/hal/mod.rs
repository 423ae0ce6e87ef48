//! Hardware Access Layer
//!
//! Everything the driver needs from the machine it runs on, kept behind small
//! interfaces so the controller logic never touches raw addresses directly:
//!
//! - `mmio`: typed 32-bit access to a mapped register window
//! - `dma`: DMA-coherent regions with a CPU view and a bus address
//! - `platform`: the host OS capability (bus enable, mapping, DMA allocation,
//!   interrupt routing, short sleeps)

pub mod dma;
pub mod mmio;
pub mod platform;

pub use dma::DmaRegion;
pub use mmio::{Mmio, RegisterIo};
pub use platform::{PciFunction, PlatformError};
