//! Device drivers subsystem
//!
//! Organized by device class:
//! - `net`: Network device drivers
//!
//! Drivers reach hardware only through [`crate::hal`].

pub mod net;
