//! Common External Message Interface (cEMI) implementation.
//!
//! cEMI frames carry KNX telegrams inside KNXnet/IP tunneling requests. A
//! [`Cemi`] pairs a message code with the [`Telegram`] it transports.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Message Code (1 byte)                    │
//! ├──────────────────────────────────────────┤
//! │ Additional Info Length (1 byte)          │
//! ├──────────────────────────────────────────┤
//! │ Additional Info (variable, skipped)      │
//! ├──────────────────────────────────────────┤
//! │ Service Information (L_Data)             │
//! │  ├─ Control Field 1 (1 byte)             │
//! │  ├─ Control Field 2 (1 byte)             │
//! │  ├─ Source Address (2 bytes)             │
//! │  ├─ Destination Address (2 bytes)        │
//! │  ├─ NPDU Length (1 byte)                 │
//! │  ├─ TPCI/APCI (2 bytes)                  │
//! │  └─ Data (variable)                      │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Outbound frames never carry additional info.

use crate::error::{KnxError, Result};
use crate::protocol::constants::{CemiMessageCode, Priority};
use crate::protocol::frame::{put, Frame};
use crate::protocol::telegram::Telegram;

/// Control Field 1 of `L_Data` frame
///
/// ```text
/// Bit 7: Frame Type (1=standard)
/// Bit 6: Reserved
/// Bit 5: Repeat (0=repeated, 1=not repeated)
/// Bit 4: Always set for standard frames
/// Bit 3-2: Priority (00=system, 01=high, 10=alarm, 11=normal)
/// Bit 1-0: Unused by the tunneling client
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField1 {
    raw: u8,
}

impl From<u8> for ControlField1 {
    #[inline(always)]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl From<ControlField1> for u8 {
    #[inline(always)]
    fn from(ctrl: ControlField1) -> u8 {
        ctrl.raw
    }
}

impl ControlField1 {
    /// Create a Control Field 1 for a standard frame
    pub const fn new(repeated: bool, priority: Priority) -> Self {
        let mut raw = 0x90;
        if !repeated {
            raw |= 0x20;
        }
        raw |= (priority.to_u8() & 0x03) << 2;
        Self { raw }
    }

    /// Get raw byte value
    #[inline(always)]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Check if frame is standard (true) or extended (false)
    #[inline(always)]
    pub const fn is_standard_frame(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// The repeat bit is cleared on repetitions
    #[inline(always)]
    pub const fn is_repeated(self) -> bool {
        (self.raw & 0x20) == 0
    }

    /// Get priority
    #[inline(always)]
    pub const fn priority(self) -> Priority {
        Priority::from_u8((self.raw >> 2) & 0x03)
    }
}

impl Default for ControlField1 {
    #[inline]
    fn default() -> Self {
        // Standard frame, not repeated, normal priority: 0b1011_1100
        Self { raw: 0xBC }
    }
}

/// Control Field 2 of `L_Data` frame
///
/// ```text
/// Bit 7: Destination Address Type (0=individual, 1=group)
/// Bit 6-4: Hop Count (0-7)
/// Bit 3-0: Extended Frame Format (0000=standard)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField2 {
    raw: u8,
}

impl From<u8> for ControlField2 {
    #[inline(always)]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl From<ControlField2> for u8 {
    #[inline(always)]
    fn from(ctrl: ControlField2) -> u8 {
        ctrl.raw
    }
}

impl ControlField2 {
    /// Create a new Control Field 2
    pub const fn new(is_group: bool, hop_count: u8) -> Self {
        let mut raw = 0u8;
        if is_group {
            raw |= 0x80;
        }
        raw |= (hop_count & 0x07) << 4;
        Self { raw }
    }

    /// Get raw byte value
    #[inline(always)]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Check if destination is group address (true) or individual (false)
    #[inline(always)]
    pub const fn is_group_address(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Get hop count (0-7)
    #[inline(always)]
    pub const fn hop_count(self) -> u8 {
        (self.raw >> 4) & 0x07
    }
}

impl Default for ControlField2 {
    #[inline]
    fn default() -> Self {
        // Group address, hop count 6: 0b1110_0000
        Self { raw: 0xE0 }
    }
}

/// cEMI frame: message code plus the telegram it carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cemi {
    message_code: CemiMessageCode,
    telegram: Telegram,
}

impl Cemi {
    /// Minimum cEMI frame size (message code + add info length)
    pub const MIN_SIZE: usize = 2;

    /// Wrap a telegram
    pub const fn new(message_code: CemiMessageCode, telegram: Telegram) -> Self {
        Self {
            message_code,
            telegram,
        }
    }

    /// Get the message code
    #[inline(always)]
    pub const fn message_code(&self) -> CemiMessageCode {
        self.message_code
    }

    /// Rewrite the message code in place
    pub fn set_message_code(&mut self, message_code: CemiMessageCode) {
        self.message_code = message_code;
    }

    /// Carried telegram
    #[inline(always)]
    pub const fn telegram(&self) -> &Telegram {
        &self.telegram
    }

    /// Take the carried telegram
    pub fn into_telegram(self) -> Telegram {
        self.telegram
    }

    /// True for the `L_Data.con` confirmation frames a gateway echoes back
    pub fn is_confirmation(&self) -> bool {
        self.message_code == CemiMessageCode::LDataCon
    }

    /// Append the frame to `buf`
    pub fn encode(&self, buf: &mut Frame) -> Result<()> {
        put(buf, &[self.message_code.to_u8(), 0])?;
        self.telegram.encode(buf)
    }

    /// Serialize the frame
    pub fn to_bytes(&self) -> Result<Frame> {
        let mut buf = Frame::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Parse a cEMI frame from bytes.
    ///
    /// # Errors
    ///
    /// Unknown message codes fail with an invalid message code error so the
    /// caller can treat the frame as unsupported. Telegram errors are passed
    /// through from [`Telegram::parse`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        let &[code, add_info_len, ..] = data else {
            return Err(KnxError::truncated());
        };

        let message_code =
            CemiMessageCode::from_u8(code).ok_or_else(KnxError::invalid_message_code)?;

        let service_start = Self::MIN_SIZE + usize::from(add_info_len);
        let service_info = data.get(service_start..).ok_or_else(KnxError::truncated)?;

        Ok(Self {
            message_code,
            telegram: Telegram::parse(service_info)?,
        })
    }
}


#[cfg(test)]
mod properties {
    use super::*;
    use crate::protocol::telegram::strategies::any_telegram;
    use proptest::prelude::*;

    fn message_code() -> impl Strategy<Value = CemiMessageCode> {
        prop_oneof![
            Just(CemiMessageCode::LDataReq),
            Just(CemiMessageCode::LDataInd),
            Just(CemiMessageCode::LDataCon),
        ]
    }

    proptest! {
        #[test]
        fn test_parse_inverts_encode(code in message_code(), telegram in any_telegram()) {
            let cemi = Cemi::new(code, telegram);
            let bytes = cemi.to_bytes().unwrap();
            prop_assert_eq!(bytes[1], 0);
            prop_assert_eq!(Cemi::parse(&bytes).unwrap(), cemi);
        }

        #[test]
        fn test_additional_info_skipped(
            code in message_code(),
            telegram in any_telegram(),
            info in prop::collection::vec(any::<u8>(), 0..=16),
        ) {
            let cemi = Cemi::new(code, telegram);
            let bytes = cemi.to_bytes().unwrap();
            let mut framed = vec![bytes[0], info.len() as u8];
            framed.extend_from_slice(&info);
            framed.extend_from_slice(&bytes[2..]);
            prop_assert_eq!(Cemi::parse(&framed).unwrap(), cemi);
        }
    }
}
