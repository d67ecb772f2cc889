//! Fixed-width address codecs.
//!
//! IPv4 addresses are plain [`Ipv4Addr`] values: their derived ordering is
//! the byte-wise comparison from most to least significant octet, which is
//! what the pool relies on for "lowest free address". This module adds the
//! 4-byte wire parse and the overflow-checked successor.

use std::convert::TryFrom;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde_derive::{Deserialize, Serialize};

use crate::error::AddressError;

/// Parse a 4-byte wire field into an address.
pub fn parse_ipv4(bytes: &[u8]) -> Result<Ipv4Addr, AddressError> {
    match bytes {
        [a, b, c, d] => Ok(Ipv4Addr::new(*a, *b, *c, *d)),
        _ => Err(AddressError::InvalidLength(bytes.len())),
    }
}

/// The next address, treating the octets as a big-endian counter.
///
/// Never wraps: the successor of 255.255.255.255 is an error.
pub fn successor(address: Ipv4Addr) -> Result<Ipv4Addr, AddressError> {
    u32::from(address)
        .checked_add(1)
        .map(Ipv4Addr::from)
        .ok_or(AddressError::Overflow)
}

/// Inclusive iterator over `[start, end]` in ascending order.
pub fn range(start: Ipv4Addr, end: Ipv4Addr) -> AddressRange {
    AddressRange {
        next: if start <= end { Some(start) } else { None },
        end,
    }
}

pub struct AddressRange {
    next: Option<Ipv4Addr>,
    end: Ipv4Addr,
}

impl Iterator for AddressRange {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        let current = self.next?;
        self.next = if current == self.end {
            None
        } else {
            successor(current).ok()
        };
        Some(current)
    }
}

/// A 6-byte Ethernet hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareAddress([u8; 6]);

impl HardwareAddress {
    pub const fn new(octets: [u8; 6]) -> HardwareAddress {
        HardwareAddress(octets)
    }

    /// The first six bytes of a client-hardware field. Ethernet is assumed.
    pub fn from_chaddr(chaddr: &[u8; 16]) -> HardwareAddress {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&chaddr[..6]);
        HardwareAddress(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HardwareAddress({})", self)
    }
}

impl FromStr for HardwareAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<HardwareAddress, AddressError> {
        let invalid = || AddressError::InvalidHardwareAddress(s.to_string());
        let mut octets = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(HardwareAddress(octets))
    }
}

impl TryFrom<String> for HardwareAddress {
    type Error = AddressError;

    fn try_from(s: String) -> Result<HardwareAddress, AddressError> {
        s.parse()
    }
}

impl From<HardwareAddress> for String {
    fn from(mac: HardwareAddress) -> String {
        mac.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_requires_four_bytes() {
        assert_eq!(parse_ipv4(&[10, 0, 0, 1]), Ok(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(parse_ipv4(&[10, 0, 0]), Err(AddressError::InvalidLength(3)));
        assert_eq!(
            parse_ipv4(&[10, 0, 0, 1, 5]),
            Err(AddressError::InvalidLength(5))
        );
    }

    #[test]
    fn successor_carries_and_stops_at_broadcast() {
        assert_eq!(
            successor(Ipv4Addr::new(10, 0, 0, 255)),
            Ok(Ipv4Addr::new(10, 0, 1, 0))
        );
        assert_eq!(
            successor(Ipv4Addr::new(255, 255, 255, 254)),
            Ok(Ipv4Addr::BROADCAST)
        );
        assert_eq!(successor(Ipv4Addr::BROADCAST), Err(AddressError::Overflow));
    }

    #[test]
    fn ordering_is_most_significant_first() {
        assert!(Ipv4Addr::new(10, 0, 0, 255) < Ipv4Addr::new(10, 0, 1, 0));
        assert!(Ipv4Addr::new(9, 255, 255, 255) < Ipv4Addr::new(10, 0, 0, 0));
    }

    #[test]
    fn range_is_inclusive() {
        let all: Vec<_> = range(Ipv4Addr::new(10, 0, 0, 254), Ipv4Addr::new(10, 0, 1, 1)).collect();
        assert_eq!(
            all,
            vec![
                Ipv4Addr::new(10, 0, 0, 254),
                Ipv4Addr::new(10, 0, 0, 255),
                Ipv4Addr::new(10, 0, 1, 0),
                Ipv4Addr::new(10, 0, 1, 1),
            ]
        );
        assert_eq!(range(Ipv4Addr::BROADCAST, Ipv4Addr::BROADCAST).count(), 1);
        assert_eq!(
            range(Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1)).count(),
            0
        );
    }

    #[test]
    fn hardware_address_text_form() {
        let mac: HardwareAddress = "AA:bb:cc:00:00:01".parse().unwrap();
        assert_eq!(mac.octets(), [0xaa, 0xbb, 0xcc, 0, 0, 1]);
        assert_eq!(mac.to_string(), "aa:bb:cc:00:00:01");
        assert_eq!("aa-bb-cc-00-00-01".parse::<HardwareAddress>(), Ok(mac));
        assert!("aa:bb:cc:00:00".parse::<HardwareAddress>().is_err());
        assert!("aa:bb:cc:00:00:01:02".parse::<HardwareAddress>().is_err());
        assert!("zz:bb:cc:00:00:01".parse::<HardwareAddress>().is_err());
    }

    #[test]
    fn hardware_address_rejects_signed_octets() {
        assert!("+a:bb:cc:00:00:01".parse::<HardwareAddress>().is_err());
        assert!("aa:bb:cc:00:00:+1".parse::<HardwareAddress>().is_err());
        assert!("aa:bb:cc:00:00:-1".parse::<HardwareAddress>().is_err());
    }

    #[test]
    fn hardware_address_from_chaddr() {
        let mut chaddr = [0xffu8; 16];
        chaddr[..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(
            HardwareAddress::from_chaddr(&chaddr),
            HardwareAddress::new([1, 2, 3, 4, 5, 6])
        );
    }
}
