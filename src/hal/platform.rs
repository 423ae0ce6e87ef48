//! Host platform capability
//!
//! The driver does not enumerate the bus or own interrupt routing. The host
//! OS hands it one PCI function and these operations on it. Each acquire
//! has a matching release, and the driver pairs them itself so a partially
//! brought-up device can always be torn down.

use core::fmt;

use super::dma::DmaRegion;
use super::mmio::RegisterIo;

/// Failures reported by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    /// The bus refused to enable the device
    EnableFailed,

    /// The device's resources are reserved by someone else
    RegionsBusy,

    /// The register window could not be mapped
    MapFailed,

    /// No DMA-coherent memory of the requested size
    OutOfDmaMemory,

    /// The interrupt line could not be routed to the driver
    IrqUnavailable,
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::EnableFailed => write!(f, "bus device enable failed"),
            PlatformError::RegionsBusy => write!(f, "bus resources already reserved"),
            PlatformError::MapFailed => write!(f, "register window mapping failed"),
            PlatformError::OutOfDmaMemory => write!(f, "out of DMA-coherent memory"),
            PlatformError::IrqUnavailable => write!(f, "interrupt line unavailable"),
        }
    }
}

/// One PCI function as provided by the host OS
///
/// # Interrupt routing
///
/// The trait carries no handler pointer. The host keeps the `Edrv` it
/// created for this function (typically in a static or an `Arc` next to its
/// IRQ table) and, from the moment [`request_irq`] returns `Ok` until
/// [`free_irq`] returns, calls [`Edrv::handle_interrupt`] on it for every
/// assertion of the function's line. `handle_interrupt` takes `&self`, so
/// the host dispatches through a shared reference.
///
/// Both calls are made from inside `Edrv::init` and `Edrv::shutdown`, which
/// hold `&mut Edrv`. The host must therefore not dispatch through its shared
/// reference while either of them runs; arming its dispatch entry only after
/// `init` returns and disarming it before `shutdown` (or masking the line in
/// `request_irq`/`free_irq` until then) satisfies this. The driver only
/// unmasks the controller's interrupts as the last step of `init` and masks
/// them first thing in `shutdown`.
///
/// [`request_irq`]: PciFunction::request_irq
/// [`free_irq`]: PciFunction::free_irq
/// [`Edrv::handle_interrupt`]: crate::Edrv::handle_interrupt
pub trait PciFunction {
    /// Register window type produced by [`map_registers`](Self::map_registers)
    type Registers: RegisterIo + Sync;

    /// Enable the device on the bus
    fn enable_device(&mut self) -> Result<(), PlatformError>;

    /// Disable the device on the bus
    fn disable_device(&mut self);

    /// Reserve the function's resources for this driver
    fn request_regions(&mut self) -> Result<(), PlatformError>;

    /// Give up the reservation taken by `request_regions`
    fn release_regions(&mut self);

    /// Map the register BAR
    ///
    /// The window must cover at least
    /// [`REGISTER_WINDOW`](crate::drivers::net::ethernet::intel::e82573::regs::REGISTER_WINDOW)
    /// bytes.
    fn map_registers(&mut self) -> Result<Self::Registers, PlatformError>;

    /// Unmap a window returned by `map_registers`
    fn unmap_registers(&mut self, registers: Self::Registers);

    /// Allow the function to master the bus (required for DMA)
    fn set_bus_master(&mut self);

    /// Allocate `size` bytes of zeroed DMA-coherent memory
    fn alloc_coherent(&mut self, size: usize) -> Result<DmaRegion, PlatformError>;

    /// Return a region obtained from `alloc_coherent`
    fn free_coherent(&mut self, region: DmaRegion);

    /// Route the function's (possibly shared) interrupt line to
    /// `Edrv::handle_interrupt` (see the trait docs)
    fn request_irq(&mut self) -> Result<(), PlatformError>;

    /// Stop routing the interrupt line to the driver
    fn free_irq(&mut self);

    /// Sleep or busy-wait for roughly `ms` milliseconds
    ///
    /// Only called during bring-up polling, never from the interrupt path.
    fn delay_ms(&self, ms: u32);
}
