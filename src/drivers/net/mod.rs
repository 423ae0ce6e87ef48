//! Network device drivers and the contract they share with the stack

pub mod ethernet;
pub mod netdev;

pub use netdev::*;
