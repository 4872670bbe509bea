//! KNX Group Address implementation.
//!
//! Group addresses represent logical groupings of devices for functional control.
//! Two formats are supported:
//! - 2-level: Main/Sub (e.g., 15/1365)
//! - 3-level: Main/Middle/Sub (e.g., 4/2/155) - most common
//!
//! Internally stored as 16 bits:
//! - Main: 4 bits (0-15), bit 15 unused
//! - Middle: 3 bits (0-7)
//! - Sub: 8 bits (0-255), or 11 bits (0-2047) in 2-level form

use crate::error::{KnxError, Result};
use core::fmt;

/// KNX Group Address
///
/// Used for logical grouping of devices and functions.
///
/// # Examples
///
/// ```
/// use knx_tunnel::GroupAddress;
///
/// // Create 3-level address
/// let addr = GroupAddress::new(4, 2, 155).unwrap();
/// assert_eq!(addr.to_string(), "4/2/155");
/// assert_eq!(addr.raw(), 8859);
///
/// // Create 2-level address
/// let addr = GroupAddress::new_2level(15, 1365).unwrap();
/// assert_eq!(addr.to_string_2level(), "15/1365");
///
/// // From the two wire bytes
/// let addr = GroupAddress::from_raw([0x22, 0x9b]);
/// assert_eq!(addr.to_string(), "4/2/155");
///
/// // Parse from string (auto-detects format)
/// let addr: GroupAddress = "1/2/3".parse().unwrap();
/// assert_eq!(u16::from(addr), 2563);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupAddress {
    raw: u16,
}

impl GroupAddress {
    /// Maximum main group value (4 bits)
    pub const MAX_MAIN: u8 = 15;
    /// Maximum middle group value (3 bits)
    pub const MAX_MIDDLE: u8 = 7;
    /// Maximum sub group value (8 bits)
    pub const MAX_SUB: u8 = 255;
    /// Maximum sub value for 2-level format (11 bits)
    pub const MAX_SUB_2LEVEL: u16 = 2047;

    /// Create a new 3-level Group Address (Main/Middle/Sub).
    ///
    /// # Arguments
    ///
    /// * `main` - Main group (0-15)
    /// * `middle` - Middle group (0-7)
    /// * `sub` - Sub group (0-255)
    ///
    /// # Errors
    ///
    /// Returns an addressing error if any component is out of range.
    pub fn new(main: u8, middle: u8, sub: u8) -> Result<Self> {
        if main > Self::MAX_MAIN {
            return Err(KnxError::address_out_of_range());
        }
        if middle > Self::MAX_MIDDLE {
            return Err(KnxError::address_out_of_range());
        }

        let raw = (u16::from(main) << 11) | (u16::from(middle) << 8) | u16::from(sub);
        Ok(Self { raw })
    }

    /// Create a new 2-level Group Address (Main/Sub).
    ///
    /// # Arguments
    ///
    /// * `main` - Main group (0-15)
    /// * `sub` - Sub group (0-2047)
    ///
    /// # Errors
    ///
    /// Returns an addressing error if any component is out of range.
    pub fn new_2level(main: u8, sub: u16) -> Result<Self> {
        if main > Self::MAX_MAIN {
            return Err(KnxError::address_out_of_range());
        }
        if sub > Self::MAX_SUB_2LEVEL {
            return Err(KnxError::address_out_of_range());
        }

        let raw = (u16::from(main) << 11) | sub;
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

    /// Get the main group component (0-15); the reserved top bit is ignored.
    #[inline(always)]
    pub const fn main(self) -> u8 {
        ((self.raw >> 11) & 0x0F) as u8
    }

    /// Get the middle group component for 3-level format (0-7).
    #[inline(always)]
    pub const fn middle(self) -> u8 {
        ((self.raw >> 8) & 0x07) as u8
    }

    /// Get the sub group component for 3-level format (0-255).
    #[inline(always)]
    pub const fn sub(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Get the sub group component for 2-level format (0-2047).
    #[inline(always)]
    pub const fn sub_2level(self) -> u16 {
        self.raw & 0x07FF
    }

    /// Format as 2-level string (Main/Sub).
    pub fn to_string_2level(&self) -> heapless::String<16> {
        use core::fmt::Write;
        let mut s = heapless::String::new();
        let _ = write!(s, "{}/{}", self.main(), self.sub_2level());
        s
    }
}

impl From<u16> for GroupAddress {
    #[inline(always)]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<GroupAddress> for u16 {
    #[inline(always)]
    fn from(addr: GroupAddress) -> u16 {
        addr.raw
    }
}

impl TryFrom<u32> for GroupAddress {
    type Error = KnxError;

    /// Accepts any number that fits in 16 bits.
    fn try_from(value: u32) -> Result<Self> {
        u16::try_from(value)
            .ok()
            .map(Self::from)
            .ok_or_else(KnxError::address_out_of_range)
    }
}

impl TryFrom<&[u8]> for GroupAddress {
    type Error = KnxError;

    /// Accepts exactly two bytes.
    fn try_from(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [hi, lo] => Ok(Self::from_raw([*hi, *lo])),
            _ => Err(KnxError::invalid_group_address()),
        }
    }
}

impl fmt::Display for GroupAddress {
    /// Format as 3-level address by default
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main(), self.middle(), self.sub())
    }
}

impl core::str::FromStr for GroupAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('/');

        let main = parts
            .next()
            .and_then(parse_component)
            .ok_or_else(KnxError::invalid_group_address)?;

        let second = parts
            .next()
            .and_then(parse_component)
            .ok_or_else(KnxError::invalid_group_address)?;

        let main = u8::try_from(main)
            .ok()
            .ok_or_else(KnxError::address_out_of_range)?;

        if let Some(sub_str) = parts.next() {
            // 3-level format: Main/Middle/Sub
            let sub = parse_component(sub_str).ok_or_else(KnxError::invalid_group_address)?;

            if parts.next().is_some() {
                return Err(KnxError::invalid_group_address());
            }

            let middle = u8::try_from(second)
                .ok()
                .ok_or_else(KnxError::address_out_of_range)?;
            let sub = u8::try_from(sub)
                .ok()
                .ok_or_else(KnxError::address_out_of_range)?;

            Self::new(main, middle, sub)
        } else {
            // 2-level format: Main/Sub
            Self::new_2level(main, second)
        }
    }
}

/// Parse one decimal address component; only ASCII digits are accepted.
fn parse_component(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u16>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_3level_valid() {
        let addr = GroupAddress::new(1, 2, 3).unwrap();
        assert_eq!(addr.main(), 1);
        assert_eq!(addr.middle(), 2);
        assert_eq!(addr.sub(), 3);
        assert_eq!(addr.raw(), 2563);
    }

    #[test]
    fn test_new_3level_invalid_main() {
        assert!(GroupAddress::new(16, 0, 0).is_err());
    }

    #[test]
    fn test_new_3level_invalid_middle() {
        assert!(GroupAddress::new(0, 8, 0).is_err());
    }

    #[test]
    fn test_new_2level_valid() {
        let addr = GroupAddress::new_2level(1, 234).unwrap();
        assert_eq!(addr.main(), 1);
        assert_eq!(addr.sub_2level(), 234);
    }

    #[test]
    fn test_new_2level_invalid() {
        assert!(GroupAddress::new_2level(0, 2048).is_err());
        assert!(GroupAddress::new_2level(16, 0).is_err());
    }

    #[test]
    fn test_from_number() {
        let addr = GroupAddress::try_from(8859u32).unwrap();
        assert_eq!(addr.to_string(), "4/2/155");

        let err = GroupAddress::try_from(65536u32).unwrap_err();
        assert!(matches!(err, KnxError::Addressing(ref e) if e.is_out_of_range()));
    }

    #[test]
    fn test_from_bytes() {
        let addr = GroupAddress::try_from(&[0x7d, 0x55][..]).unwrap();
        assert_eq!(addr.raw(), 32085);

        assert!(GroupAddress::try_from(&[1, 2, 3][..]).is_err());
        assert!(GroupAddress::try_from(&[1][..]).is_err());
    }

    #[test]
    fn test_raw_bytes_round_trip() {
        let addr: GroupAddress = "4/2/155".parse().unwrap();
        assert_eq!(addr.to_raw(), [0x22, 0x9b]);
        assert_eq!(GroupAddress::from_raw(addr.to_raw()), addr);
    }

    #[test]
    fn test_display_3level() {
        let addr = GroupAddress::from(8859u16);
        assert_eq!(format!("{}", addr), "4/2/155");
    }

    #[test]
    fn test_reserved_bit_ignored_in_text() {
        let addr = GroupAddress::from(0x8000u16 | 8859);
        assert_eq!(addr.main(), 4);
        assert_eq!(addr.to_string(), "4/2/155");
        assert_eq!(addr.to_string_2level().as_str(), "4/667");
        let reparsed: GroupAddress = addr.to_string().parse().unwrap();
        assert_eq!(reparsed.raw(), 8859);
        assert_eq!(GroupAddress::from(0x8000u16).to_string(), "0/0/0");
    }

    #[test]
    fn test_to_string_2level() {
        let addr = GroupAddress::from(32085u16);
        assert_eq!(addr.to_string_2level(), "15/1365");
    }

    #[test]
    fn test_from_str_3level() {
        let cases = [("4/2/155", 8859), ("11/6/241", 24305), ("1/0/0", 2048), ("0/0/0", 0)];
        for (text, raw) in cases {
            let addr: GroupAddress = text.parse().unwrap();
            assert_eq!(addr.raw(), raw, "{text}");
        }
    }

    #[test]
    fn test_from_str_2level() {
        let cases = [("4/13", 8205), ("15/1365", 32085), ("7/0", 14336), ("0/0", 0)];
        for (text, raw) in cases {
            let addr: GroupAddress = text.parse().unwrap();
            assert_eq!(addr.raw(), raw, "{text}");
        }
    }

    #[test]
    fn test_from_str_out_of_range() {
        for text in ["16/0", "16/4", "4/2048", "4/8/100", "4/2/256", "16/2/100"] {
            assert!(text.parse::<GroupAddress>().is_err(), "{text}");
        }
    }

    #[test]
    fn test_from_str_malformed() {
        for text in ["", "1", "1/2/3/4", "a/b/c", "1/-2", "1//3", " 1/2", "+1/2"] {
            assert!(text.parse::<GroupAddress>().is_err(), "{text:?}");
        }
    }
}
