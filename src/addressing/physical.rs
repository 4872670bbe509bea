//! KNX Physical Address implementation.
//!
//! Physical addresses identify devices on the KNX bus and appear as the
//! origin of every telegram. Format: Area.Line.Member (e.g., 1.1.4)
//! - Area: 0-15 (4 bits)
//! - Line: 0-15 (4 bits)
//! - Member: 0-255 (8 bits)

use crate::error::{KnxError, Result};
use core::fmt;

/// KNX Physical Address (Area.Line.Member)
///
/// # Examples
///
/// ```
/// use knx_tunnel::PhysicalAddress;
///
/// let addr = PhysicalAddress::new(11, 6, 241).unwrap();
/// assert_eq!(addr.to_string(), "11.6.241");
/// assert_eq!(addr.to_raw(), [0xb6, 0xf1]);
///
/// let addr: PhysicalAddress = "1.1.4".parse().unwrap();
/// assert_eq!(u16::from(addr), 0x1104);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicalAddress {
    raw: u16,
}

impl PhysicalAddress {
    /// Maximum area value (4 bits)
    pub const MAX_AREA: u8 = 15;
    /// Maximum line value (4 bits)
    pub const MAX_LINE: u8 = 15;

    /// Create a new Physical Address from components.
    ///
    /// # Errors
    ///
    /// Returns an addressing error if area or line exceed 15.
    pub fn new(area: u8, line: u8, member: u8) -> Result<Self> {
        if area > Self::MAX_AREA || line > Self::MAX_LINE {
            return Err(KnxError::address_out_of_range());
        }

        let raw = u16::from_be_bytes([(area << 4) | line, member]);
        Ok(Self { raw })
    }

    /// Create from the two big-endian wire bytes.
    #[inline]
    pub const fn from_raw(bytes: [u8; 2]) -> Self {
        Self {
            raw: u16::from_be_bytes(bytes),
        }
    }

    /// Get the raw u16 representation of the address.
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Get the two big-endian wire bytes.
    #[inline(always)]
    pub const fn to_raw(self) -> [u8; 2] {
        self.raw.to_be_bytes()
    }

    /// Get the area component (0-15).
    #[inline(always)]
    pub const fn area(self) -> u8 {
        ((self.raw >> 12) & 0x0F) as u8
    }

    /// Get the line component (0-15).
    #[inline(always)]
    pub const fn line(self) -> u8 {
        ((self.raw >> 8) & 0x0F) as u8
    }

    /// Get the member component (0-255).
    #[inline(always)]
    pub const fn member(self) -> u8 {
        (self.raw & 0xFF) as u8
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.member())
    }
}

impl From<u16> for PhysicalAddress {
    #[inline(always)]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<PhysicalAddress> for u16 {
    #[inline(always)]
    fn from(addr: PhysicalAddress) -> u16 {
        addr.raw
    }
}

impl core::str::FromStr for PhysicalAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.');
        let mut next = || {
            parts
                .next()
                .filter(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|p| p.parse::<u16>().ok())
                .ok_or_else(KnxError::invalid_physical_address)
        };

        let area = next()?;
        let line = next()?;
        let member = next()?;

        if parts.next().is_some() {
            return Err(KnxError::invalid_physical_address());
        }

        let component = |v: u16| u8::try_from(v).ok().ok_or_else(KnxError::address_out_of_range);
        Self::new(component(area)?, component(line)?, component(member)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_valid() {
        let addr = PhysicalAddress::new(1, 2, 3).unwrap();
        assert_eq!(addr.area(), 1);
        assert_eq!(addr.line(), 2);
        assert_eq!(addr.member(), 3);
        assert_eq!(addr.to_raw(), [0x12, 0x03]);
    }

    #[test]
    fn test_new_out_of_range() {
        assert!(PhysicalAddress::new(16, 0, 0).is_err());
        assert!(PhysicalAddress::new(0, 16, 0).is_err());
    }

    #[test]
    fn test_from_raw() {
        let addr = PhysicalAddress::from_raw([0x11, 0x04]);
        assert_eq!(addr.to_string(), "1.1.4");
    }

    #[test]
    fn test_display() {
        let addr: PhysicalAddress = "11.6.241".parse().unwrap();
        assert_eq!(addr.to_string(), "11.6.241");
    }

    #[test]
    fn test_from_str_out_of_range() {
        for text in ["16.0.0", "0.16.0", "0.0.256", "300.1.1"] {
            let err = text.parse::<PhysicalAddress>().unwrap_err();
            assert!(matches!(err, KnxError::Addressing(ref e) if e.is_out_of_range()), "{text}");
        }
    }

    #[test]
    fn test_from_str_malformed() {
        for text in ["", "1.2", "1.2.3.4", "a.b.c", "1..3", "1/2/3"] {
            assert!(text.parse::<PhysicalAddress>().is_err(), "{text:?}");
        }
    }
}
