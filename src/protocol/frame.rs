//! KNXnet/IP frame parsing and encoding.
//!
//! Handles the generic 6-byte header shared by every service and the HPAI
//! endpoint descriptor. Service-specific bodies live in
//! [`services`](crate::protocol::services).
//!
//! ## Frame Structure
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  Header (6 bytes)           │
//! │  - Header Length: 0x06      │
//! │  - Protocol Version: 0x10   │
//! │  - Service Type: 2 bytes    │
//! │  - Total Length: 2 bytes    │
//! ├─────────────────────────────┤
//! │  Body (variable)            │
//! │  - Service-specific data    │
//! └─────────────────────────────┘
//! ```
//!
//! The declared total length must match the datagram length exactly; a
//! gateway never pads tunneling datagrams, so anything else is foreign
//! traffic.

use crate::error::{KnxError, Result};
use crate::protocol::constants::{
    ServiceType, HEADER_SIZE_10, IPV4_UDP, KNXNETIP_VERSION_10, MAX_FRAME_SIZE,
};
use core::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Encoded KNXnet/IP frame
pub type Frame = heapless::Vec<u8, MAX_FRAME_SIZE>;

/// Compiler hint for unlikely branches (error paths)
#[inline(always)]
#[cold]
const fn unlikely(b: bool) -> bool {
    b
}

/// Append bytes to a frame buffer, failing when the frame would overflow.
pub(crate) fn put(buf: &mut Frame, bytes: &[u8]) -> Result<()> {
    buf.extend_from_slice(bytes)
        .ok()
        .ok_or_else(KnxError::payload_too_large)
}

/// KNXnet/IP frame header (6 bytes)
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Header Len   │ Protocol Ver │  Service Type ID    │
/// │   (1 byte)   │   (1 byte)   │     (2 bytes)       │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │           Total Length (2 bytes)                   │
/// └────────────────────────────────────────────────────┘
/// ```
///
/// The service type is kept raw so unknown services still parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnxnetIpHeader {
    /// Header length (0x06)
    pub header_length: u8,
    /// Protocol version (0x10 for v1.0)
    pub protocol_version: u8,
    /// Raw service type identifier
    pub service_type: u16,
    /// Total length of frame (header + body)
    pub total_length: u16,
}

impl KnxnetIpHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 6;

    /// Create a new header
    pub const fn new(service_type: u16, body_length: u16) -> Self {
        Self {
            header_length: HEADER_SIZE_10,
            protocol_version: KNXNETIP_VERSION_10,
            service_type,
            total_length: Self::SIZE as u16 + body_length,
        }
    }

    /// Parse and validate the header of a complete datagram.
    ///
    /// # Errors
    ///
    /// - datagram shorter than 6 bytes
    /// - header length byte other than 0x06
    /// - protocol version other than 0x10
    /// - declared total length different from `data.len()`
    #[inline(always)]
    pub fn parse(data: &[u8]) -> Result<Self> {
        let &[header_length, protocol_version, st_hi, st_lo, len_hi, len_lo, ..] = data else {
            return Err(KnxError::truncated());
        };

        if unlikely(header_length != HEADER_SIZE_10) {
            return Err(KnxError::invalid_header_length());
        }

        if unlikely(protocol_version != KNXNETIP_VERSION_10) {
            return Err(KnxError::unsupported_version());
        }

        let total_length = u16::from_be_bytes([len_hi, len_lo]);
        if unlikely(usize::from(total_length) != data.len()) {
            return Err(KnxError::length_mismatch());
        }

        Ok(Self {
            header_length,
            protocol_version,
            service_type: u16::from_be_bytes([st_hi, st_lo]),
            total_length,
        })
    }

    /// Append the header to a frame buffer
    pub fn encode(&self, buf: &mut Frame) -> Result<()> {
        put(buf, &[self.header_length, self.protocol_version])?;
        put(buf, &self.service_type.to_be_bytes())?;
        put(buf, &self.total_length.to_be_bytes())
    }

    /// Service type, if it is one of the known identifiers
    pub const fn known_service(&self) -> Option<ServiceType> {
        ServiceType::from_u16(self.service_type)
    }

    /// Get the expected body length from the header
    pub const fn body_length(&self) -> u16 {
        self.total_length.saturating_sub(Self::SIZE as u16)
    }
}

/// Zero-copy view of a validated KNXnet/IP frame
#[derive(Debug)]
pub struct KnxnetIpFrame<'a> {
    data: &'a [u8],
    header: KnxnetIpHeader,
}

impl<'a> KnxnetIpFrame<'a> {
    /// Parse a KNXnet/IP frame from a complete datagram
    #[inline(always)]
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header = KnxnetIpHeader::parse(data)?;
        Ok(Self { data, header })
    }

    /// Get the frame header
    #[inline(always)]
    pub const fn header(&self) -> &KnxnetIpHeader {
        &self.header
    }

    /// Raw service type
    #[inline(always)]
    pub const fn service_type(&self) -> u16 {
        self.header.service_type
    }

    /// Frame body (payload after header)
    #[inline(always)]
    pub fn body(&self) -> &'a [u8] {
        // Length validated in parse(), so the header is always present
        self.data.get(KnxnetIpHeader::SIZE..).unwrap_or_default()
    }
}

/// Builder for creating KNXnet/IP frames
#[derive(Debug)]
pub struct FrameBuilder<'a> {
    service_type: u16,
    body: &'a [u8],
}

impl<'a> FrameBuilder<'a> {
    /// Create a new frame builder
    pub const fn new(service_type: u16, body: &'a [u8]) -> Self {
        Self { service_type, body }
    }

    /// Build header and body into a frame buffer
    ///
    /// # Errors
    ///
    /// Returns a payload error if the frame exceeds [`MAX_FRAME_SIZE`].
    pub fn build(&self) -> Result<Frame> {
        if self.size() > MAX_FRAME_SIZE {
            return Err(KnxError::payload_too_large());
        }

        let mut buf = Frame::new();
        KnxnetIpHeader::new(self.service_type, self.body.len() as u16).encode(&mut buf)?;
        put(&mut buf, self.body)?;
        Ok(buf)
    }

    /// Calculate the total frame size
    pub const fn size(&self) -> usize {
        KnxnetIpHeader::SIZE + self.body.len()
    }
}

/// Host Protocol Address Information (HPAI)
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Structure Len│ Host Protocol│   IP Address        │
/// │   (1 byte)   │   (1 byte)   │   (4 bytes IPv4)    │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │                Port (2 bytes)                      │
/// └────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hpai {
    /// Host protocol code
    pub host_protocol: u8,
    /// IPv4 address
    pub ip_address: Ipv4Addr,
    /// UDP port
    pub port: u16,
}

impl Hpai {
    /// Size of HPAI structure for IPv4
    pub const SIZE: usize = 8;

    /// Create a new HPAI for IPv4 UDP
    pub const fn new(ip_address: Ipv4Addr, port: u16) -> Self {
        Self {
            host_protocol: IPV4_UDP,
            ip_address,
            port,
        }
    }

    /// Build an HPAI from a dotted-quad string and a port number.
    ///
    /// # Errors
    ///
    /// Returns an addressing error if the address is not a dotted-quad IPv4
    /// string or the port exceeds 65535.
    pub fn from_parts(ip_address: &str, port: u32) -> Result<Self> {
        let ip_address = ip_address
            .parse::<Ipv4Addr>()
            .ok()
            .ok_or_else(KnxError::invalid_ip_address)?;
        let port = u16::try_from(port)
            .ok()
            .ok_or_else(KnxError::address_out_of_range)?;
        Ok(Self::new(ip_address, port))
    }

    /// Socket address described by this HPAI
    pub const fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip_address, self.port)
    }

    /// Parse HPAI from the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        let &[structure_length, host_protocol, a, b, c, d, port_hi, port_lo, ..] = data else {
            return Err(KnxError::truncated());
        };

        if structure_length != Self::SIZE as u8 {
            return Err(KnxError::invalid_structure());
        }

        Ok(Self {
            host_protocol,
            ip_address: Ipv4Addr::new(a, b, c, d),
            port: u16::from_be_bytes([port_hi, port_lo]),
        })
    }

    /// Append the HPAI to a frame buffer
    pub fn encode(&self, buf: &mut Frame) -> Result<()> {
        put(buf, &[Self::SIZE as u8, self.host_protocol])?;
        put(buf, &self.ip_address.octets())?;
        put(buf, &self.port.to_be_bytes())
    }
}

impl From<SocketAddrV4> for Hpai {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl fmt::Display for Hpai {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parse() {
        let data = [
            0x06, // header length
            0x10, // protocol version
            0x02, 0x01, // service type (SEARCH_REQUEST)
            0x00, 0x0E, // total length (14 bytes)
            0, 0, 0, 0, 0, 0, 0, 0,
        ];

        let header = KnxnetIpHeader::parse(&data).unwrap();
        assert_eq!(header.header_length, 0x06);
        assert_eq!(header.protocol_version, 0x10);
        assert_eq!(header.known_service(), Some(ServiceType::SearchRequest));
        assert_eq!(header.total_length, 14);
        assert_eq!(header.body_length(), 8);
    }

    #[test]
    fn test_header_rejects_bad_values() {
        let bad_length = [0x07, 0x10, 0x02, 0x01, 0x00, 0x06];
        let KnxError::Protocol(e) = KnxnetIpHeader::parse(&bad_length).unwrap_err() else {
            panic!("expected protocol error");
        };
        assert!(e.is_invalid_header_length());

        let bad_version = [0x06, 0x20, 0x02, 0x01, 0x00, 0x06];
        let KnxError::Protocol(e) = KnxnetIpHeader::parse(&bad_version).unwrap_err() else {
            panic!("expected protocol error");
        };
        assert!(e.is_unsupported_version());

        // declared 10, actual 8
        let mismatch = [0x06, 0x10, 0x02, 0x01, 0x00, 0x0A, 0x01, 0x02];
        let KnxError::Protocol(e) = KnxnetIpHeader::parse(&mismatch).unwrap_err() else {
            panic!("expected protocol error");
        };
        assert!(e.is_length_mismatch());

        // trailing garbage is a mismatch too
        let padded = [0x06, 0x10, 0x02, 0x01, 0x00, 0x06, 0xFF];
        assert!(KnxnetIpHeader::parse(&padded).is_err());

        assert!(KnxnetIpHeader::parse(&[0x06, 0x10]).is_err());
    }

    #[test]
    fn test_header_unknown_service_kept_raw() {
        let data = [0x06, 0x10, 0x01, 0x49, 0x00, 0x06];
        let header = KnxnetIpHeader::parse(&data).unwrap();
        assert_eq!(header.service_type, 0x0149);
        assert_eq!(header.known_service(), None);
    }

    #[test]
    fn test_frame_builder() {
        let body = [0x01, 0x02, 0x03, 0x04];
        let builder = FrameBuilder::new(ServiceType::SearchRequest.to_u16(), &body);

        let buf = builder.build().unwrap();

        assert_eq!(buf.len(), 10); // 6 (header) + 4 (body)
        assert_eq!(buf[0], 0x06);
        assert_eq!(buf[1], 0x10);
        assert_eq!(buf[4..6], [0x00, 0x0A]);
        assert_eq!(&buf[6..10], &body);
    }

    #[test]
    fn test_frame_builder_rejects_oversize_body() {
        let body = [0u8; MAX_FRAME_SIZE];
        assert!(FrameBuilder::new(0x0420, &body).build().is_err());
    }

    #[test]
    fn test_hpai_parse() {
        let data = [
            0x08, // structure length
            0x01, // IPv4 UDP
            192, 168, 1, 100, // IP address
            0x0E, 0x57, // port 3671
        ];

        let hpai = Hpai::parse(&data).unwrap();
        assert_eq!(hpai.ip_address, Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(hpai.port, 3671);
        assert_eq!(hpai.to_string(), "192.168.1.100:3671");
    }

    #[test]
    fn test_hpai_encode() {
        let hpai = Hpai::new(Ipv4Addr::new(192, 168, 1, 100), 3671);
        let mut buf = Frame::new();
        hpai.encode(&mut buf).unwrap();

        assert_eq!(&buf[..], &[0x08, 0x01, 192, 168, 1, 100, 0x0E, 0x57]);
    }

    #[test]
    fn test_hpai_from_parts() {
        let hpai = Hpai::from_parts("10.0.0.7", 3671).unwrap();
        assert_eq!(hpai.socket_addr(), "10.0.0.7:3671".parse().unwrap());

        assert!(Hpai::from_parts("10.0.0", 3671).is_err());
        assert!(Hpai::from_parts("gateway", 3671).is_err());
        assert!(Hpai::from_parts("10.0.0.7", 65536).is_err());
    }

    #[test]
    fn test_frame_parse() {
        let data = [
            0x06, 0x10, // header
            0x02, 0x01, // SEARCH_REQUEST
            0x00, 0x0A, // total length = 10
            0x01, 0x02, 0x03, 0x04, // body
        ];

        let frame = KnxnetIpFrame::parse(&data).unwrap();
        assert_eq!(frame.service_type(), 0x0201);
        assert_eq!(frame.body(), &[0x01, 0x02, 0x03, 0x04]);
    }
}
