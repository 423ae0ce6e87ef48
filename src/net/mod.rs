//! Network-layer types shared by drivers and the protocol stack

pub mod ethernet;

pub use ethernet::MacAddress;
