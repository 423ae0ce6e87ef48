//! Ethernet station addresses
//!
//! The driver deals in 48-bit MAC addresses: the local station address it
//! programs into receive-address entry 0 and the extra perfect-filter
//! entries the protocol stack asks for. Frame parsing lives above this layer.

use core::fmt;
use core::str::FromStr;

use smoltcp::wire::EthernetAddress;

/// 48-bit MAC (Media Access Control) address
///
/// Format: 6 bytes in transmission order, displayed as XX:XX:XX:XX:XX:XX.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Create a new MAC address from 6 bytes
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Broadcast MAC address (FF:FF:FF:FF:FF:FF)
    pub const fn broadcast() -> Self {
        Self([0xFF; 6])
    }

    /// Zero MAC address (00:00:00:00:00:00)
    ///
    /// In the driver configuration this means "use the burned-in address".
    pub const fn zero() -> Self {
        Self([0x00; 6])
    }

    /// Check if every byte is zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0x00; 6]
    }

    /// Check if this is a broadcast address
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xFF; 6]
    }

    /// Check if this is a multicast address (bit 0 of first byte is 1)
    pub fn is_multicast(&self) -> bool {
        (self.0[0] & 0x01) != 0
    }

    /// Check if this is a unicast address (not multicast)
    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    /// Get the bytes of this MAC address
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

/// Parse a MAC address from a colon-separated hex string
///
/// Example: "00:1B:21:3A:4C:5D"
impl FromStr for MacAddress {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or(())?;
            if part.len() != 2 {
                return Err(());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| ())?;
        }
        if parts.next().is_some() {
            return Err(());
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

// The protocol stack above the driver speaks smoltcp's address type.

impl From<EthernetAddress> for MacAddress {
    fn from(addr: EthernetAddress) -> Self {
        Self(addr.0)
    }
}

impl From<MacAddress> for EthernetAddress {
    fn from(mac: MacAddress) -> Self {
        EthernetAddress(mac.0)
    }
}
