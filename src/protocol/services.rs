//! KNXnet/IP service packets.
//!
//! Every datagram exchanged with a gateway is a [`Packet`]. Known services
//! decode into typed variants; any other service type is kept as
//! [`Packet::Generic`] with its opaque body.
//!
//! ## Protocol Flow
//!
//! ```text
//! Client                          Gateway
//!   |                                |
//!   |------- CONNECT_REQUEST ------->|
//!   |<------ CONNECT_RESPONSE -------|
//!   |                                |
//!   |------ TUNNELING_REQUEST ------>|
//!   |<------ TUNNELING_ACK ----------|
//!   |<------ TUNNELING_REQUEST ------|  (L_Data.con)
//!   |------- TUNNELING_ACK --------->|
//!   |                                |
//!   |--- CONNECTIONSTATE_REQUEST --->|  (every 60s)
//!   |<-- CONNECTIONSTATE_RESPONSE ---|
//!   |                                |
//!   |------ DISCONNECT_REQUEST ----->|
//!   |<----- DISCONNECT_RESPONSE -----|
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use knx_tunnel::protocol::services::Packet;
//!
//! let packet = Packet::decode(&datagram)?;
//! if let Packet::TunnelingAck { sequence, .. } = packet {
//!     // resolve pending request
//! }
//! let frame = Packet::TunnelingAck { channel_id: 7, sequence: 1, status: 0 }.to_bytes()?;
//! ```

use crate::addressing::PhysicalAddress;
use crate::error::{KnxError, Result};
use crate::protocol::cemi::Cemi;
use crate::protocol::constants::{ServiceType, TUNNEL_CONNECTION, TUNNEL_LINKLAYER};
use crate::protocol::frame::{put, Frame, FrameBuilder, Hpai, KnxnetIpFrame};
use core::fmt;

/// Connection header length used by tunneling request and ack
const CONNECTION_HEADER_SIZE: u8 = 4;

/// Connection Request Information (CRI) for tunneling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequestInfo {
    /// Connection type (`TUNNEL_CONNECTION` = 0x04)
    pub connection_type: u8,
    /// KNX layer (`TUNNEL_LINKLAYER` = 0x02)
    pub knx_layer: u8,
}

impl ConnectionRequestInfo {
    /// Structure length
    pub const SIZE: usize = 4;

    /// Create a new CRI for tunnel link layer connection
    pub const fn tunnel_link_layer() -> Self {
        Self {
            connection_type: TUNNEL_CONNECTION,
            knx_layer: TUNNEL_LINKLAYER,
        }
    }

    /// Append the CRI to a frame buffer
    pub fn encode(&self, buf: &mut Frame) -> Result<()> {
        put(
            buf,
            &[Self::SIZE as u8, self.connection_type, self.knx_layer, 0x00],
        )
    }

    /// Decode CRI from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        let &[length, connection_type, knx_layer, _reserved, ..] = data else {
            return Err(KnxError::truncated());
        };
        if usize::from(length) != Self::SIZE {
            return Err(KnxError::invalid_structure());
        }
        Ok(Self {
            connection_type,
            knx_layer,
        })
    }
}

/// Payload of an inbound tunneling request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelingPayload {
    /// Decoded cEMI frame
    Cemi(Cemi),
    /// Frame that could not be decoded (unknown message code, other APCI)
    Unsupported(Frame),
}

/// KNXnet/IP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// `CONNECT_REQUEST` (0x0205)
    ConnectRequest {
        /// Control endpoint (connection management)
        control_endpoint: Hpai,
        /// Data endpoint (tunneling data)
        data_endpoint: Hpai,
    },
    /// `CONNECT_RESPONSE` (0x0206)
    ConnectResponse {
        /// Communication channel ID
        channel_id: u8,
        /// Status code (0 = OK)
        status: u8,
        /// Gateway data endpoint, absent in the short error form
        data_endpoint: Option<Hpai>,
        /// Individual address assigned to the tunnel
        assigned_address: Option<PhysicalAddress>,
    },
    /// `CONNECTIONSTATE_REQUEST` (0x0207)
    ConnectionStateRequest {
        /// Communication channel ID
        channel_id: u8,
        /// Control endpoint
        control_endpoint: Hpai,
    },
    /// `CONNECTIONSTATE_RESPONSE` (0x0208)
    ConnectionStateResponse {
        /// Communication channel ID
        channel_id: u8,
        /// Status code (0 = OK)
        status: u8,
    },
    /// `DISCONNECT_REQUEST` (0x0209)
    DisconnectRequest {
        /// Communication channel ID
        channel_id: u8,
        /// Control endpoint
        control_endpoint: Hpai,
    },
    /// `DISCONNECT_RESPONSE` (0x020A)
    DisconnectResponse {
        /// Communication channel ID
        channel_id: u8,
        /// Status code (0 = OK)
        status: u8,
    },
    /// `TUNNELLING_REQUEST` (0x0420)
    TunnelingRequest {
        /// Communication channel ID
        channel_id: u8,
        /// Sequence counter
        sequence: u8,
        /// Carried cEMI frame
        payload: TunnelingPayload,
    },
    /// `TUNNELLING_ACK` (0x0421)
    TunnelingAck {
        /// Communication channel ID
        channel_id: u8,
        /// Sequence counter being acknowledged
        sequence: u8,
        /// Status code (0 = OK)
        status: u8,
    },
    /// Any other service, body kept opaque
    Generic {
        /// Raw service type
        service_type: u16,
        /// Body bytes
        data: Frame,
    },
}

impl Packet {
    /// Tunneling request carrying `cemi`
    pub fn tunneling_request(channel_id: u8, sequence: u8, cemi: Cemi) -> Self {
        Self::TunnelingRequest {
            channel_id,
            sequence,
            payload: TunnelingPayload::Cemi(cemi),
        }
    }

    /// Raw 16-bit service type
    pub const fn service_type(&self) -> u16 {
        match self {
            Self::ConnectRequest { .. } => ServiceType::ConnectRequest.to_u16(),
            Self::ConnectResponse { .. } => ServiceType::ConnectResponse.to_u16(),
            Self::ConnectionStateRequest { .. } => ServiceType::ConnectionStateRequest.to_u16(),
            Self::ConnectionStateResponse { .. } => ServiceType::ConnectionStateResponse.to_u16(),
            Self::DisconnectRequest { .. } => ServiceType::DisconnectRequest.to_u16(),
            Self::DisconnectResponse { .. } => ServiceType::DisconnectResponse.to_u16(),
            Self::TunnelingRequest { .. } => ServiceType::TunnelingRequest.to_u16(),
            Self::TunnelingAck { .. } => ServiceType::TunnelingAck.to_u16(),
            Self::Generic { service_type, .. } => *service_type,
        }
    }

    /// Channel the packet belongs to, if the service carries one
    pub const fn channel_id(&self) -> Option<u8> {
        match self {
            Self::ConnectResponse { channel_id, .. }
            | Self::ConnectionStateRequest { channel_id, .. }
            | Self::ConnectionStateResponse { channel_id, .. }
            | Self::DisconnectRequest { channel_id, .. }
            | Self::DisconnectResponse { channel_id, .. }
            | Self::TunnelingRequest { channel_id, .. }
            | Self::TunnelingAck { channel_id, .. } => Some(*channel_id),
            Self::ConnectRequest { .. } | Self::Generic { .. } => None,
        }
    }

    /// Service name, `0x%04x` for unknown service types
    pub fn service_name(&self) -> heapless::String<32> {
        let mut name = heapless::String::new();
        // Both forms fit in 32 bytes
        let _ = match ServiceType::from_u16(self.service_type()) {
            Some(service) => name.push_str(service.name()).ok(),
            None => fmt::write(&mut name, format_args!("0x{:04x}", self.service_type())).ok(),
        };
        name
    }

    /// Append the service body (everything after the header) to `buf`
    pub fn encode_body(&self, buf: &mut Frame) -> Result<()> {
        match self {
            Self::ConnectRequest {
                control_endpoint,
                data_endpoint,
            } => {
                control_endpoint.encode(buf)?;
                data_endpoint.encode(buf)?;
                ConnectionRequestInfo::tunnel_link_layer().encode(buf)
            }
            Self::ConnectResponse {
                channel_id,
                status,
                data_endpoint,
                assigned_address,
            } => {
                put(buf, &[*channel_id, *status])?;
                if let Some(endpoint) = data_endpoint {
                    endpoint.encode(buf)?;
                    if let Some(address) = assigned_address {
                        put(buf, &[4, TUNNEL_CONNECTION])?;
                        put(buf, &address.to_raw())?;
                    }
                }
                Ok(())
            }
            Self::ConnectionStateRequest {
                channel_id,
                control_endpoint,
            }
            | Self::DisconnectRequest {
                channel_id,
                control_endpoint,
            } => {
                put(buf, &[*channel_id, 0x00])?;
                control_endpoint.encode(buf)
            }
            Self::ConnectionStateResponse { channel_id, status }
            | Self::DisconnectResponse { channel_id, status } => put(buf, &[*channel_id, *status]),
            Self::TunnelingRequest {
                channel_id,
                sequence,
                payload,
            } => {
                put(buf, &[CONNECTION_HEADER_SIZE, *channel_id, *sequence, 0x00])?;
                match payload {
                    TunnelingPayload::Cemi(cemi) => cemi.encode(buf),
                    TunnelingPayload::Unsupported(raw) => put(buf, raw),
                }
            }
            Self::TunnelingAck {
                channel_id,
                sequence,
                status,
            } => put(buf, &[CONNECTION_HEADER_SIZE, *channel_id, *sequence, *status]),
            Self::Generic { data, .. } => put(buf, data),
        }
    }

    /// Encode the complete frame (header + body)
    pub fn to_bytes(&self) -> Result<Frame> {
        let mut body = Frame::new();
        self.encode_body(&mut body)?;
        FrameBuilder::new(self.service_type(), &body).build()
    }

    /// Decode a datagram into the matching packet variant.
    ///
    /// The header is validated first (length byte, version, exact total
    /// length). Unknown service types yield [`Packet::Generic`].
    pub fn decode(datagram: &[u8]) -> Result<Self> {
        let frame = KnxnetIpFrame::parse(datagram)?;
        let body = frame.body();

        let Some(service) = frame.header().known_service() else {
            return Self::generic(frame.service_type(), body);
        };

        match service {
            ServiceType::ConnectRequest => {
                let control_endpoint = Hpai::parse(body)?;
                let rest = body.get(Hpai::SIZE..).unwrap_or_default();
                let data_endpoint = Hpai::parse(rest)?;
                ConnectionRequestInfo::decode(rest.get(Hpai::SIZE..).unwrap_or_default())?;
                Ok(Self::ConnectRequest {
                    control_endpoint,
                    data_endpoint,
                })
            }
            ServiceType::ConnectResponse => decode_connect_response(body),
            ServiceType::ConnectionStateRequest | ServiceType::DisconnectRequest => {
                let &[channel_id, _reserved, ref hpai @ ..] = body else {
                    return Err(KnxError::truncated());
                };
                let control_endpoint = Hpai::parse(hpai)?;
                Ok(if service == ServiceType::DisconnectRequest {
                    Self::DisconnectRequest {
                        channel_id,
                        control_endpoint,
                    }
                } else {
                    Self::ConnectionStateRequest {
                        channel_id,
                        control_endpoint,
                    }
                })
            }
            ServiceType::ConnectionStateResponse | ServiceType::DisconnectResponse => {
                let &[channel_id, status, ..] = body else {
                    return Err(KnxError::truncated());
                };
                Ok(if service == ServiceType::DisconnectResponse {
                    Self::DisconnectResponse { channel_id, status }
                } else {
                    Self::ConnectionStateResponse { channel_id, status }
                })
            }
            ServiceType::TunnelingRequest => {
                let &[header_length, channel_id, sequence, _reserved, ..] = body else {
                    return Err(KnxError::truncated());
                };
                let cemi = body
                    .get(usize::from(header_length)..)
                    .ok_or_else(KnxError::truncated)?;
                let payload = match Cemi::parse(cemi) {
                    Ok(cemi) => TunnelingPayload::Cemi(cemi),
                    Err(_) => TunnelingPayload::Unsupported(
                        Frame::from_slice(cemi)
                            .ok()
                            .ok_or_else(KnxError::payload_too_large)?,
                    ),
                };
                Ok(Self::TunnelingRequest {
                    channel_id,
                    sequence,
                    payload,
                })
            }
            ServiceType::TunnelingAck => {
                let &[_header_length, channel_id, sequence, status, ..] = body else {
                    return Err(KnxError::truncated());
                };
                Ok(Self::TunnelingAck {
                    channel_id,
                    sequence,
                    status,
                })
            }
            _ => Self::generic(frame.service_type(), body),
        }
    }

    fn generic(service_type: u16, body: &[u8]) -> Result<Self> {
        Ok(Self::Generic {
            service_type,
            data: Frame::from_slice(body)
                .ok()
                .ok_or_else(KnxError::payload_too_large)?,
        })
    }
}

/// CONNECT_RESPONSE body: channel, status, then HPAI and CRD when the
/// connection was accepted.
fn decode_connect_response(body: &[u8]) -> Result<Packet> {
    let &[channel_id, status, ref rest @ ..] = body else {
        return Err(KnxError::truncated());
    };

    let data_endpoint = if rest.len() >= Hpai::SIZE {
        Some(Hpai::parse(rest)?)
    } else {
        None
    };

    let assigned_address = match rest.get(Hpai::SIZE..) {
        Some(&[4, _connection_type, hi, lo, ..]) => Some(PhysicalAddress::from_raw([hi, lo])),
        _ => None,
    };

    Ok(Packet::ConnectResponse {
        channel_id,
        status,
        data_endpoint,
        assigned_address,
    })
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<KnxIpPacket ({})", self.service_name())?;
        let mut body = Frame::new();
        if self.encode_body(&mut body).is_err() {
            return f.write_str(" ..>");
        }
        for byte in &body {
            write!(f, " {byte:02x}")?;
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::CemiMessageCode;
    use crate::protocol::telegram::Telegram;
    use std::net::Ipv4Addr;

    fn hpai() -> Hpai {
        Hpai::new(Ipv4Addr::new(192, 168, 0, 2), 0x1234)
    }

    fn assert_envelope(frame: &[u8]) {
        assert_eq!(&frame[0..2], &[0x06, 0x10]);
        assert_eq!(
            usize::from(u16::from_be_bytes([frame[4], frame[5]])),
            frame.len()
        );
    }

    #[test]
    fn test_connect_request_layout() {
        let packet = Packet::ConnectRequest {
            control_endpoint: hpai(),
            data_endpoint: Hpai::new(Ipv4Addr::new(192, 168, 0, 2), 0x1235),
        };
        let frame = packet.to_bytes().unwrap();
        assert_envelope(&frame);
        assert_eq!(frame.len(), 26);
        assert_eq!(&frame[2..4], &[0x02, 0x05]);
        assert_eq!(&frame[6..14], &[0x08, 0x01, 192, 168, 0, 2, 0x12, 0x34]);
        assert_eq!(&frame[14..22], &[0x08, 0x01, 192, 168, 0, 2, 0x12, 0x35]);
        assert_eq!(&frame[22..26], &[0x04, 0x04, 0x02, 0x00]);
        assert_eq!(Packet::decode(&frame).unwrap(), packet);
    }

    #[test]
    fn test_connect_response_full() {
        let frame = [
            0x06, 0x10, 0x02, 0x06, 0x00, 0x14, // header
            0x60, 0x00, // channel 96, status ok
            0x08, 0x01, 192, 168, 0, 10, 0x0E, 0x57, // data endpoint
            0x04, 0x04, 0x11, 0xFF, // CRD, address 1.1.255
        ];
        let packet = Packet::decode(&frame).unwrap();
        assert_eq!(
            packet,
            Packet::ConnectResponse {
                channel_id: 96,
                status: 0,
                data_endpoint: Some(Hpai::new(Ipv4Addr::new(192, 168, 0, 10), 3671)),
                assigned_address: Some("1.1.255".parse().unwrap()),
            }
        );
        assert_eq!(&packet.to_bytes().unwrap()[..], &frame);
    }

    #[test]
    fn test_connect_response_short_error_form() {
        let frame = [0x06, 0x10, 0x02, 0x06, 0x00, 0x08, 0x00, 0x24];
        let packet = Packet::decode(&frame).unwrap();
        assert_eq!(
            packet,
            Packet::ConnectResponse {
                channel_id: 0,
                status: 0x24,
                data_endpoint: None,
                assigned_address: None,
            }
        );
        assert_eq!(&packet.to_bytes().unwrap()[..], &frame);
    }

    #[test]
    fn test_connection_state_request() {
        let packet = Packet::ConnectionStateRequest {
            channel_id: 7,
            control_endpoint: hpai(),
        };
        let frame = packet.to_bytes().unwrap();
        assert_envelope(&frame);
        assert_eq!(&frame[2..4], &[0x02, 0x07]);
        assert_eq!(&frame[6..8], &[7, 0]);
        assert_eq!(Packet::decode(&frame).unwrap(), packet);
    }

    #[test]
    fn test_disconnect_packets() {
        let request = Packet::DisconnectRequest {
            channel_id: 21,
            control_endpoint: hpai(),
        };
        let frame = request.to_bytes().unwrap();
        assert_eq!(&frame[2..4], &[0x02, 0x09]);
        assert_eq!(Packet::decode(&frame).unwrap(), request);

        let response = Packet::DisconnectResponse {
            channel_id: 21,
            status: 0,
        };
        let frame = response.to_bytes().unwrap();
        assert_eq!(&frame[..], &[0x06, 0x10, 0x02, 0x0A, 0x00, 0x08, 21, 0]);
        assert_eq!(Packet::decode(&frame).unwrap(), response);
    }

    #[test]
    fn test_tunneling_ack() {
        let frame = [0x06, 0x10, 0x04, 0x21, 0x00, 0x0A, 0x04, 0x11, 0x05, 0x00];
        let packet = Packet::decode(&frame).unwrap();
        assert_eq!(
            packet,
            Packet::TunnelingAck {
                channel_id: 0x11,
                sequence: 5,
                status: 0,
            }
        );
        assert_eq!(&packet.to_bytes().unwrap()[..], &frame);
    }

    #[test]
    fn test_tunneling_request() {
        let frame = [
            0x06, 0x10, 0x04, 0x20, 0x00, 0x15, // header
            0x04, 0x60, 0x03, 0x00, // connection header
            0x29, 0x00, 0xbc, 0xe0, 0x11, 0x02, 0x10, 0x00, 0x01, 0x00, 0x81, // cEMI
        ];
        let packet = Packet::decode(&frame).unwrap();
        let Packet::TunnelingRequest {
            channel_id,
            sequence,
            payload: TunnelingPayload::Cemi(cemi),
        } = &packet
        else {
            panic!("expected tunneling request, got {packet:?}");
        };
        assert_eq!(*channel_id, 0x60);
        assert_eq!(*sequence, 3);
        assert_eq!(cemi.message_code(), CemiMessageCode::LDataInd);
        assert_eq!(cemi.telegram().data(), &[1]);
        assert_eq!(&packet.to_bytes().unwrap()[..], &frame);
    }

    #[test]
    fn test_tunneling_request_unsupported_cemi() {
        let frame = [
            0x06, 0x10, 0x04, 0x20, 0x00, 0x0D, 0x04, 0x60, 0x03, 0x00, 0xF0, 0x00, 0x00,
        ];
        let packet = Packet::decode(&frame).unwrap();
        assert!(matches!(
            packet,
            Packet::TunnelingRequest {
                payload: TunnelingPayload::Unsupported(_),
                ..
            }
        ));
        assert_eq!(&packet.to_bytes().unwrap()[..], &frame);
    }

    #[test]
    fn test_tunneling_request_builder() {
        let telegram = Telegram::group_write("2/0/0".parse().unwrap(), &[1]).unwrap();
        let cemi = Cemi::new(CemiMessageCode::LDataReq, telegram);
        let frame = Packet::tunneling_request(1, 0, cemi).to_bytes().unwrap();
        assert_envelope(&frame);
        assert_eq!(&frame[6..10], &[0x04, 0x01, 0x00, 0x00]);
        assert_eq!(frame[10], 0x11);
    }

    #[test]
    fn test_generic_fallback() {
        let frame = [0x06, 0x10, 0x05, 0x30, 0x00, 0x08, 0xAB, 0xCD];
        let packet = Packet::decode(&frame).unwrap();
        assert_eq!(packet.service_type(), 0x0530);
        assert_eq!(packet.service_name().as_str(), "routing.indication");
        assert_eq!(packet.to_string(), "<KnxIpPacket (routing.indication) ab cd>");

        let frame = [0x06, 0x10, 0x01, 0x49, 0x00, 0x06];
        let packet = Packet::decode(&frame).unwrap();
        assert_eq!(packet.service_name().as_str(), "0x0149");
        assert_eq!(packet.channel_id(), None);
    }

    #[test]
    fn test_display() {
        let packet = Packet::TunnelingAck {
            channel_id: 0x6d,
            sequence: 0x69,
            status: 0,
        };
        assert_eq!(
            packet.to_string(),
            "<KnxIpPacket (tunneling.ack) 04 6d 69 00>"
        );
    }

    #[test]
    fn test_decode_rejects_bad_envelope() {
        assert!(Packet::decode(&[0x06, 0x10, 0x04, 0x21, 0x00, 0x0B, 0x04, 0x11, 0x05, 0x00]).is_err());
        assert!(Packet::decode(&[0x05, 0x10, 0x04, 0x21, 0x00, 0x0A, 0x04, 0x11, 0x05, 0x00]).is_err());
        // too short for its service
        assert!(Packet::decode(&[0x06, 0x10, 0x04, 0x21, 0x00, 0x08, 0x04, 0x11]).is_err());
    }
}
