//! KNX bus telegram model and codec.
//!
//! A [`Telegram`] is the in-memory form of a group communication message:
//! priority, repeat flag, routing counter, command, addresses and payload.
//! It serializes to the `L_Data` service information carried inside a cEMI
//! frame and, for TP1 bus tooling, to the legacy standard frame with a
//! trailing cross-parity byte.
//!
//! ## Service information layout
//!
//! ```text
//! ┌────────┬────────┬──────────┬──────────┬─────┬──────┬────────────┬──────┐
//! │ ctrl 1 │ ctrl 2 │ origin   │ dest     │ len │ TPCI │ APCI|value │ data │
//! │ 1 byte │ 1 byte │ 2 bytes  │ 2 bytes  │  1  │  1   │     1      │ 0..n │
//! └────────┴────────┴──────────┴──────────┴─────┴──────┴────────────┴──────┘
//! ```
//!
//! A payload of exactly one byte below 64 is packed into the low six bits of
//! the APCI byte (`len` = 1). Any other payload follows the APCI byte and
//! `len` is the payload length plus one.

use crate::addressing::{GroupAddress, PhysicalAddress};
use crate::error::{KnxError, Result};
use crate::protocol::cemi::{ControlField1, ControlField2};
use crate::protocol::constants::{Command, Priority, MAX_TELEGRAM_DATA};
use crate::protocol::frame::{put, Frame};
use core::fmt;

/// Telegram payload bytes
pub type TelegramData = heapless::Vec<u8, MAX_TELEGRAM_DATA>;

/// Largest value that fits into the APCI byte
const PACKED_VALUE_LIMIT: u8 = 64;

/// Default routing (hop) counter for new telegrams
pub const DEFAULT_ROUTING_COUNTER: u8 = 6;

/// KNX group telegram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telegram {
    priority: Priority,
    repeated: bool,
    routing_counter: u8,
    command: Command,
    destination: Option<GroupAddress>,
    origin: Option<PhysicalAddress>,
    data: TelegramData,
}

impl Default for Telegram {
    fn default() -> Self {
        let mut data = TelegramData::new();
        // capacity is never zero
        let _ = data.push(0);
        Self {
            priority: Priority::Normal,
            repeated: false,
            routing_counter: DEFAULT_ROUTING_COUNTER,
            command: Command::Write,
            destination: None,
            origin: None,
            data,
        }
    }
}

impl Telegram {
    /// Create a telegram with default fields (normal priority, write, `[0]`)
    pub fn new() -> Self {
        Self::default()
    }

    /// `A_GroupValue_Write` to `destination`
    pub fn group_write(destination: GroupAddress, data: &[u8]) -> Result<Self> {
        Self::new()
            .with_destination(destination)
            .with_command(Command::Write)
            .with_data(data)
    }

    /// `A_GroupValue_Read` from `destination`
    pub fn group_read(destination: GroupAddress) -> Self {
        Self::new()
            .with_destination(destination)
            .with_command(Command::Read)
    }

    /// `A_GroupValue_Response` for `destination`
    pub fn group_answer(destination: GroupAddress, data: &[u8]) -> Result<Self> {
        Self::new()
            .with_destination(destination)
            .with_command(Command::Answer)
            .with_data(data)
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the telegram as a repetition
    #[must_use]
    pub fn with_repeated(mut self, repeated: bool) -> Self {
        self.repeated = repeated;
        self
    }

    /// Set the routing counter (0-7)
    pub fn with_routing_counter(mut self, routing_counter: u8) -> Result<Self> {
        if routing_counter > 7 {
            return Err(KnxError::routing_counter_out_of_range());
        }
        self.routing_counter = routing_counter;
        Ok(self)
    }

    /// Set the command
    #[must_use]
    pub fn with_command(mut self, command: Command) -> Self {
        self.command = command;
        self
    }

    /// Set the destination group address
    #[must_use]
    pub fn with_destination(mut self, destination: GroupAddress) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Set the origin (source) device address
    #[must_use]
    pub fn with_origin(mut self, origin: PhysicalAddress) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Replace the payload.
    ///
    /// An empty slice stores the single zero byte it is transmitted as.
    pub fn with_data(mut self, data: &[u8]) -> Result<Self> {
        let data = if data.is_empty() { &[0][..] } else { data };
        self.data = TelegramData::from_slice(data)
            .ok()
            .ok_or_else(KnxError::payload_too_large)?;
        Ok(self)
    }

    /// Priority
    #[inline(always)]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// True if this is a repetition of an earlier telegram
    #[inline(always)]
    pub const fn is_repeated(&self) -> bool {
        self.repeated
    }

    /// Routing counter
    #[inline(always)]
    pub const fn routing_counter(&self) -> u8 {
        self.routing_counter
    }

    /// Command
    #[inline(always)]
    pub const fn command(&self) -> Command {
        self.command
    }

    /// Destination group address, `None` until set
    #[inline(always)]
    pub const fn destination(&self) -> Option<GroupAddress> {
        self.destination
    }

    /// Origin address, `None` if not set
    #[inline(always)]
    pub const fn origin(&self) -> Option<PhysicalAddress> {
        self.origin
    }

    /// Payload bytes
    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Control field 1 for this telegram
    pub const fn control_field(&self) -> ControlField1 {
        ControlField1::new(self.repeated, self.priority)
    }

    /// Control field 2 for this telegram (destination is always a group)
    pub const fn routing_field(&self) -> ControlField2 {
        ControlField2::new(true, self.routing_counter)
    }

    /// TPCI, APCI and payload bytes following the length byte
    fn command_bytes(&self, buf: &mut Frame) -> Result<()> {
        let command = self.command.to_u8() << 6;
        match self.data.as_slice() {
            &[value] if value < PACKED_VALUE_LIMIT => put(buf, &[0x00, command | value]),
            data => {
                put(buf, &[0x00, command])?;
                put(buf, data)
            }
        }
    }

    /// NPDU length byte: bytes following TPCI
    fn npdu_length(&self) -> u8 {
        match self.data.as_slice() {
            &[value] if value < PACKED_VALUE_LIMIT => 1,
            data => (data.len() + 1) as u8,
        }
    }

    fn destination_raw(&self) -> Result<[u8; 2]> {
        self.destination
            .map(GroupAddress::to_raw)
            .ok_or_else(KnxError::missing_destination)
    }

    fn origin_raw(&self) -> [u8; 2] {
        self.origin.map_or([0, 0], PhysicalAddress::to_raw)
    }

    /// Append the `L_Data` service information to `buf`.
    ///
    /// # Errors
    ///
    /// Fails if no destination is set or the buffer overflows.
    pub fn encode(&self, buf: &mut Frame) -> Result<()> {
        let destination = self.destination_raw()?;
        put(
            buf,
            &[self.control_field().raw(), self.routing_field().raw()],
        )?;
        put(buf, &self.origin_raw())?;
        put(buf, &destination)?;
        put(buf, &[self.npdu_length()])?;
        self.command_bytes(buf)
    }

    /// Serialize the `L_Data` service information
    pub fn to_bytes(&self) -> Result<Frame> {
        let mut buf = Frame::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Parse `L_Data` service information (the inverse of [`Telegram::encode`]).
    ///
    /// # Errors
    ///
    /// - fewer than 9 bytes, or fewer payload bytes than the length declares
    /// - destination flagged as an individual address
    /// - APCI other than group read, response or write
    pub fn parse(data: &[u8]) -> Result<Self> {
        let &[ctrl1, ctrl2, o_hi, o_lo, d_hi, d_lo, npdu_length, tpci, apci, ..] = data else {
            return Err(KnxError::truncated());
        };

        let ctrl1 = ControlField1::from(ctrl1);
        let ctrl2 = ControlField2::from(ctrl2);
        if !ctrl2.is_group_address() {
            return Err(KnxError::individual_destination());
        }

        let command = Command::from_u8(((tpci & 0x03) << 2) | (apci >> 6))
            .ok_or_else(KnxError::unsupported_command)?;

        let payload = if npdu_length <= 1 {
            TelegramData::from_slice(&[apci & 0x3F])
        } else {
            let end = 8 + usize::from(npdu_length);
            let bytes = data.get(9..end).ok_or_else(KnxError::truncated)?;
            TelegramData::from_slice(bytes)
        }
        .ok()
        .ok_or_else(KnxError::payload_too_large)?;

        Ok(Self {
            priority: ctrl1.priority(),
            repeated: ctrl1.is_repeated(),
            routing_counter: ctrl2.hop_count(),
            command,
            destination: Some(GroupAddress::from_raw([d_hi, d_lo])),
            origin: Some(PhysicalAddress::from_raw([o_hi, o_lo])),
            data: payload,
        })
    }

    /// Legacy TP1 standard frame with trailing parity byte.
    ///
    /// ```text
    /// ctrl | origin(2) | dest(2) | DAF/routing/length | TPCI | APCI | data.. | parity
    /// ```
    ///
    /// The low nibble of the DAF byte carries the payload length minus one.
    pub fn to_bus_frame(&self) -> Result<Frame> {
        let destination = self.destination_raw()?;
        let data_length = self.data.len().saturating_sub(1) as u8;
        let daf = 0x80 | ((self.routing_counter & 0x07) << 4) | (data_length & 0x0F);

        let mut buf = Frame::new();
        put(&mut buf, &[self.control_field().raw()])?;
        put(&mut buf, &self.origin_raw())?;
        put(&mut buf, &destination)?;
        put(&mut buf, &[daf])?;
        self.command_bytes(&mut buf)?;
        let parity = create_parity_byte(&buf);
        put(&mut buf, &[parity])?;
        Ok(buf)
    }
}

/// Cross parity over `bytes`: every bit position is XORed independently,
/// starting from all bits set.
pub fn create_parity_byte(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0xFF, |parity, byte| parity ^ byte)
}

impl fmt::Display for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.command.name())?;
        match self.origin {
            Some(origin) => write!(f, "{origin}")?,
            None => f.write_str("-")?,
        }
        match self.destination {
            Some(destination) => write!(f, " -> {destination}")?,
            None => f.write_str(" -> -")?,
        }
        for byte in &self.data {
            write!(f, " {byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ga(s: &str) -> GroupAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_defaults() {
        let telegram = Telegram::new();
        assert_eq!(telegram.priority(), Priority::Normal);
        assert!(!telegram.is_repeated());
        assert_eq!(telegram.routing_counter(), 6);
        assert_eq!(telegram.command(), Command::Write);
        assert_eq!(telegram.data(), &[0]);
        assert_eq!(telegram.destination(), None);
        assert_eq!(telegram.origin(), None);
    }

    #[test]
    fn test_control_field_bits() {
        let telegram = Telegram::new();
        assert_eq!(telegram.control_field().raw() & 0b1101_0011, 0b1001_0000);
        assert_eq!(telegram.control_field().raw() & 0x20, 0x20);
        assert_eq!(telegram.control_field().raw() & 0x0C, 0x0C);

        let telegram = Telegram::new()
            .with_repeated(true)
            .with_priority(Priority::Alarm);
        assert_eq!(telegram.control_field().raw() & 0x20, 0);
        assert_eq!(telegram.control_field().raw() & 0x0C, 0x08);
    }

    #[test]
    fn test_routing_counter_range() {
        assert_eq!(
            Telegram::new().with_routing_counter(0).unwrap().routing_counter(),
            0
        );
        let KnxError::Telegram(e) = Telegram::new().with_routing_counter(8).unwrap_err() else {
            panic!("expected telegram error");
        };
        assert!(e.is_routing_counter_out_of_range());
    }

    #[test]
    fn test_missing_destination() {
        let KnxError::Telegram(e) = Telegram::new().to_bytes().unwrap_err() else {
            panic!("expected telegram error");
        };
        assert!(e.is_missing_destination());
    }

    #[test]
    fn test_packed_small_value() {
        let telegram = Telegram::group_write(ga("1/2/3"), &[0x20]).unwrap();
        let bytes = telegram.to_bytes().unwrap();
        // len, TPCI, APCI|value
        assert_eq!(&bytes[6..], &[0x01, 0x00, 0x80 | 0x20]);
    }

    #[test]
    fn test_large_value_appended() {
        let telegram = Telegram::group_write(ga("1/2/3"), &[0x40]).unwrap();
        let bytes = telegram.to_bytes().unwrap();
        assert_eq!(&bytes[6..], &[0x02, 0x00, 0x80, 0x40]);

        let telegram = Telegram::group_answer(ga("1/2/3"), &[0x0C, 0x1A]).unwrap();
        let bytes = telegram.to_bytes().unwrap();
        assert_eq!(&bytes[6..], &[0x03, 0x00, 0x40, 0x0C, 0x1A]);
    }

    #[test]
    fn test_empty_payload_sent_as_zero() {
        let telegram = Telegram::group_write(ga("1/2/3"), &[]).unwrap();
        assert_eq!(telegram.data(), &[0]);
        let bytes = telegram.to_bytes().unwrap();
        assert_eq!(&bytes[6..], &[0x01, 0x00, 0x80]);
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let telegram = Telegram::new()
            .with_destination(ga("1/2/3"))
            .with_origin("1.1.1".parse().unwrap())
            .with_data(&[])
            .unwrap();
        let parsed = Telegram::parse(&telegram.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, telegram);
    }

    #[test]
    fn test_payload_too_large() {
        let data = [0u8; MAX_TELEGRAM_DATA + 1];
        assert!(Telegram::group_write(ga("1/2/3"), &data).is_err());
        let data = [0u8; MAX_TELEGRAM_DATA];
        assert!(Telegram::group_write(ga("1/2/3"), &data).is_ok());
    }

    #[test]
    fn test_round_trip() {
        let telegram = Telegram::group_answer(ga("4/2/155"), &[0x12, 0x34, 0x56])
            .unwrap()
            .with_origin("1.2.3".parse().unwrap())
            .with_priority(Priority::High)
            .with_repeated(true)
            .with_routing_counter(3)
            .unwrap();

        let parsed = Telegram::parse(&telegram.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, telegram);
    }

    #[test]
    fn test_round_trip_read() {
        let telegram = Telegram::group_read(ga("0/0/1")).with_origin("15.15.255".parse().unwrap());
        let parsed = Telegram::parse(&telegram.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.command(), Command::Read);
        assert_eq!(parsed, telegram);
    }

    #[test]
    fn test_round_trip_sweep() {
        let priorities = [Priority::System, Priority::High, Priority::Alarm, Priority::Normal];
        let commands = [Command::Read, Command::Answer, Command::Write];
        let longest = [0xA5u8; MAX_TELEGRAM_DATA];
        let mut payloads: Vec<Vec<u8>> = (0..=u8::MAX).map(|value| vec![value]).collect();
        payloads.extend([vec![], vec![0, 0], vec![63, 64], longest.to_vec()]);

        for priority in priorities {
            for command in commands {
                for routing in 0..=7 {
                    for repeated in [false, true] {
                        for payload in &payloads {
                            let telegram = Telegram::new()
                                .with_priority(priority)
                                .with_command(command)
                                .with_routing_counter(routing)
                                .unwrap()
                                .with_repeated(repeated)
                                .with_destination(ga("15/7/255"))
                                .with_origin("15.15.255".parse().unwrap())
                                .with_data(payload)
                                .unwrap();
                            let bytes = telegram.to_bytes().unwrap();
                            let packed = matches!(payload.as_slice(), [value] if *value < 64);
                            assert_eq!(bytes[6] == 1, packed || payload.is_empty());
                            assert_eq!(Telegram::parse(&bytes).unwrap(), telegram);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_parse_without_origin_yields_zero_origin() {
        let telegram = Telegram::group_write(ga("2/0/0"), &[1]).unwrap();
        let bytes = telegram.to_bytes().unwrap();
        assert_eq!(&bytes[2..4], &[0, 0]);
        let parsed = Telegram::parse(&bytes).unwrap();
        assert_eq!(parsed.origin(), Some(PhysicalAddress::from(0)));
    }

    #[test]
    fn test_parse_rejects_individual_destination() {
        let bytes = [0xBC, 0x60, 0x11, 0x01, 0x11, 0x02, 0x01, 0x00, 0x81];
        let KnxError::Telegram(e) = Telegram::parse(&bytes).unwrap_err() else {
            panic!("expected telegram error");
        };
        assert!(e.is_individual_destination());
    }

    #[test]
    fn test_parse_rejects_other_services() {
        // A_Memory_Read
        let bytes = [0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x01, 0x02, 0x00];
        let KnxError::Protocol(e) = Telegram::parse(&bytes).unwrap_err() else {
            panic!("expected protocol error");
        };
        assert!(e.is_unsupported_command());
    }

    #[test]
    fn test_parse_truncated_payload() {
        // declares 3 payload bytes, carries 1
        let bytes = [0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x04, 0x00, 0x80, 0x01];
        assert!(Telegram::parse(&bytes).is_err());
        assert!(Telegram::parse(&bytes[..5]).is_err());
    }

    #[test]
    fn test_parity_byte() {
        let bytes = [
            0b1011_0000,
            0b0000_0001,
            0b0000_1001,
            0b0000_0001,
            0b0000_0111,
            0b0001_0001,
            0b0000_0000,
            0b1000_0001,
        ];
        assert_eq!(create_parity_byte(&bytes), 0b1101_0001);
        assert_eq!(create_parity_byte(&[]), 0xFF);
    }

    #[test]
    fn test_bus_frame() {
        let telegram = Telegram::group_write(ga("4/2/155"), &[0x01])
            .unwrap()
            .with_origin("1.2.3".parse().unwrap());
        let frame = telegram.to_bus_frame().unwrap();
        assert_eq!(
            &frame[..],
            &[0xBC, 0x12, 0x03, 0x22, 0x9B, 0xE0, 0x00, 0x81, 0x8A]
        );
    }

    #[test]
    fn test_bus_frame_length_nibble() {
        let telegram = Telegram::group_write(ga("1/2/3"), &[0x22, 0x0B]).unwrap();
        let frame = telegram.to_bus_frame().unwrap();
        assert_eq!(frame[5] & 0x0F, 1);
        assert_eq!(frame[5] & 0x70, 0x60);
        assert_eq!(frame[5] & 0x80, 0x80);
    }

    #[test]
    fn test_display() {
        let telegram = Telegram::group_write(ga("1/2/3"), &[0x01])
            .unwrap()
            .with_origin("1.1.4".parse().unwrap());
        assert_eq!(telegram.to_string(), "write 1.1.4 -> 1/2/3 01");
    }
}
