//! Intel Ethernet controllers

pub mod e82573;
