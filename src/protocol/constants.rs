//! KNXnet/IP protocol constants, service type identifiers and telegram enums.

use crate::error::{KnxError, Result};
use core::fmt;
use core::str::FromStr;

/// KNXnet/IP protocol version 1.0
pub const KNXNETIP_VERSION_10: u8 = 0x10;

/// Standard KNXnet/IP header length (6 bytes)
pub const HEADER_SIZE_10: u8 = 0x06;

/// Standard UDP port for KNXnet/IP communication
pub const KNXNETIP_DEFAULT_PORT: u16 = 3671;

/// Maximum size of an encoded KNXnet/IP frame
pub const MAX_FRAME_SIZE: usize = 512;

/// Maximum telegram payload (the NPDU length byte counts payload + 1)
pub const MAX_TELEGRAM_DATA: usize = 254;

// =============================================================================
// Service Type Identifiers
// =============================================================================

/// KNXnet/IP service type identifiers known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ServiceType {
    /// `SEARCH_REQUEST` - Device discovery request
    SearchRequest = 0x0201,
    /// `SEARCH_RESPONSE` - Device discovery response
    SearchResponse = 0x0202,
    /// `DESCRIPTION_REQUEST` - Device description request
    DescriptionRequest = 0x0203,
    /// `DESCRIPTION_RESPONSE` - Device description response
    DescriptionResponse = 0x0204,
    /// `CONNECT_REQUEST` - Connection request
    ConnectRequest = 0x0205,
    /// `CONNECT_RESPONSE` - Connection response
    ConnectResponse = 0x0206,
    /// `CONNECTIONSTATE_REQUEST` - Connection state request (heartbeat)
    ConnectionStateRequest = 0x0207,
    /// `CONNECTIONSTATE_RESPONSE` - Connection state response
    ConnectionStateResponse = 0x0208,
    /// `DISCONNECT_REQUEST` - Disconnect request
    DisconnectRequest = 0x0209,
    /// `DISCONNECT_RESPONSE` - Disconnect response
    DisconnectResponse = 0x020A,
    /// `DEVICE_CONFIGURATION_REQUEST`
    ConfigurationRequest = 0x0310,
    /// `DEVICE_CONFIGURATION_ACK`
    ConfigurationAck = 0x0311,
    /// `TUNNELLING_REQUEST` - Tunnelling data request
    TunnelingRequest = 0x0420,
    /// `TUNNELLING_ACK` - Tunnelling acknowledgement
    TunnelingAck = 0x0421,
    /// `ROUTING_INDICATION` - Routing indication (multicast)
    RoutingIndication = 0x0530,
    /// `ROUTING_LOST_MESSAGE` - Routing lost message indication
    RoutingLostMessage = 0x0531,
}

impl ServiceType {
    const ALL: [Self; 16] = [
        Self::SearchRequest,
        Self::SearchResponse,
        Self::DescriptionRequest,
        Self::DescriptionResponse,
        Self::ConnectRequest,
        Self::ConnectResponse,
        Self::ConnectionStateRequest,
        Self::ConnectionStateResponse,
        Self::DisconnectRequest,
        Self::DisconnectResponse,
        Self::ConfigurationRequest,
        Self::ConfigurationAck,
        Self::TunnelingRequest,
        Self::TunnelingAck,
        Self::RoutingIndication,
        Self::RoutingLostMessage,
    ];

    /// Convert a u16 to `ServiceType`
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0201 => Some(Self::SearchRequest),
            0x0202 => Some(Self::SearchResponse),
            0x0203 => Some(Self::DescriptionRequest),
            0x0204 => Some(Self::DescriptionResponse),
            0x0205 => Some(Self::ConnectRequest),
            0x0206 => Some(Self::ConnectResponse),
            0x0207 => Some(Self::ConnectionStateRequest),
            0x0208 => Some(Self::ConnectionStateResponse),
            0x0209 => Some(Self::DisconnectRequest),
            0x020A => Some(Self::DisconnectResponse),
            0x0310 => Some(Self::ConfigurationRequest),
            0x0311 => Some(Self::ConfigurationAck),
            0x0420 => Some(Self::TunnelingRequest),
            0x0421 => Some(Self::TunnelingAck),
            0x0530 => Some(Self::RoutingIndication),
            0x0531 => Some(Self::RoutingLostMessage),
            _ => None,
        }
    }

    /// Convert `ServiceType` to u16
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Human readable service name, e.g. `tunneling.request`
    pub const fn name(self) -> &'static str {
        match self {
            Self::SearchRequest => "search.request",
            Self::SearchResponse => "search.response",
            Self::DescriptionRequest => "description.request",
            Self::DescriptionResponse => "description.response",
            Self::ConnectRequest => "connection.request",
            Self::ConnectResponse => "connection.response",
            Self::ConnectionStateRequest => "connectionstate.request",
            Self::ConnectionStateResponse => "connectionstate.response",
            Self::DisconnectRequest => "disconnect.request",
            Self::DisconnectResponse => "disconnect.response",
            Self::ConfigurationRequest => "configuration.request",
            Self::ConfigurationAck => "configuration.ack",
            Self::TunnelingRequest => "tunneling.request",
            Self::TunnelingAck => "tunneling.ack",
            Self::RoutingIndication => "routing.indication",
            Self::RoutingLostMessage => "routing.lostmessage",
        }
    }

    /// Resolve a service name back to its type.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for names not in the service table.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|service| service.name() == name)
            .ok_or_else(KnxError::unknown_service_name)
    }
}

// =============================================================================
// Connection Type Codes
// =============================================================================

/// Connection type for `TUNNEL_CONNECTION`
pub const TUNNEL_CONNECTION: u8 = 0x04;

/// KNX layer for `TUNNEL_LINKLAYER`
pub const TUNNEL_LINKLAYER: u8 = 0x02;

// =============================================================================
// Host Protocol Codes
// =============================================================================

/// IPv4 UDP protocol
pub const IPV4_UDP: u8 = 0x01;

// =============================================================================
// Error Codes
// =============================================================================

/// Error code for successful operation
pub const E_NO_ERROR: u8 = 0x00;

/// Error code for an unknown or closed channel
pub const E_CONNECTION_ID: u8 = 0x21;

/// Error code for no more connections available
pub const E_NO_MORE_CONNECTIONS: u8 = 0x24;

/// Error code for KNX connection error
pub const E_KNX_CONNECTION: u8 = 0x27;

// =============================================================================
// cEMI Message Codes
// =============================================================================

/// cEMI Message Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CemiMessageCode {
    /// `L_Raw.req` - Raw frame request
    LRawReq = 0x10,
    /// `L_Data.req` - Data request
    LDataReq = 0x11,
    /// `L_Poll_Data.req` - Poll data request
    LPollDataReq = 0x13,
    /// `L_Poll_Data.con` - Poll data confirmation
    LPollDataCon = 0x25,
    /// `L_Data.ind` - Data indication
    LDataInd = 0x29,
    /// `L_Busmon.ind` - Bus monitor indication
    LBusmonInd = 0x2B,
    /// `L_Raw.ind` - Raw frame indication
    LRawInd = 0x2D,
    /// `L_Data.con` - Data confirmation
    LDataCon = 0x2E,
    /// `L_Raw.con` - Raw frame confirmation
    LRawCon = 0x2F,
}

impl CemiMessageCode {
    const ALL: [Self; 9] = [
        Self::LRawReq,
        Self::LDataReq,
        Self::LPollDataReq,
        Self::LPollDataCon,
        Self::LDataInd,
        Self::LBusmonInd,
        Self::LRawInd,
        Self::LDataCon,
        Self::LRawCon,
    ];

    /// Convert u8 to `CemiMessageCode`, `None` for unsupported codes
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x10 => Some(Self::LRawReq),
            0x11 => Some(Self::LDataReq),
            0x13 => Some(Self::LPollDataReq),
            0x25 => Some(Self::LPollDataCon),
            0x29 => Some(Self::LDataInd),
            0x2B => Some(Self::LBusmonInd),
            0x2D => Some(Self::LRawInd),
            0x2E => Some(Self::LDataCon),
            0x2F => Some(Self::LRawCon),
            _ => None,
        }
    }

    /// Convert `CemiMessageCode` to u8
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Textual name as used in the KNX documentation
    pub const fn name(self) -> &'static str {
        match self {
            Self::LRawReq => "L_Raw.req",
            Self::LDataReq => "L_Data.req",
            Self::LPollDataReq => "L_Poll_Data.req",
            Self::LPollDataCon => "L_Poll_Data.con",
            Self::LDataInd => "L_Data.ind",
            Self::LBusmonInd => "L_Busmon.ind",
            Self::LRawInd => "L_Raw.ind",
            Self::LDataCon => "L_Data.con",
            Self::LRawCon => "L_Raw.con",
        }
    }
}

impl fmt::Display for CemiMessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CemiMessageCode {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|code| code.name() == s)
            .ok_or_else(KnxError::invalid_message_code)
    }
}

// =============================================================================
// KNX Priority
// =============================================================================

/// KNX telegram priority, stored in bits 3-2 of the control field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Priority {
    /// System priority
    System = 0b00,
    /// High priority
    High = 0b01,
    /// Alarm priority
    Alarm = 0b10,
    /// Normal priority (default)
    #[default]
    Normal = 0b11,
}

impl Priority {
    /// Convert the two priority bits to Priority
    pub const fn from_u8(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::System,
            0b01 => Self::High,
            0b10 => Self::Alarm,
            _ => Self::Normal,
        }
    }

    /// Convert Priority to u8
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Lower-case priority name
    pub const fn name(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::High => "high",
            Self::Alarm => "alarm",
            Self::Normal => "normal",
        }
    }
}

impl FromStr for Priority {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Self::System),
            "high" => Ok(Self::High),
            "alarm" => Ok(Self::Alarm),
            "normal" => Ok(Self::Normal),
            _ => Err(KnxError::unknown_priority()),
        }
    }
}

// =============================================================================
// Group Command
// =============================================================================

/// Group communication command (upper APCI bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Command {
    /// `A_GroupValue_Read`
    Read = 0,
    /// `A_GroupValue_Response`
    Answer = 1,
    /// `A_GroupValue_Write` (default)
    #[default]
    Write = 2,
}

impl Command {
    /// Convert the four APCI bits to a Command, `None` for other services
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Read),
            1 => Some(Self::Answer),
            2 => Some(Self::Write),
            _ => None,
        }
    }

    /// Convert Command to u8
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Lower-case command name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Answer => "answer",
            Self::Write => "write",
        }
    }
}

impl FromStr for Command {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(Self::Read),
            "answer" => Ok(Self::Answer),
            "write" => Ok(Self::Write),
            _ => Err(KnxError::unknown_command()),
        }
    }
}
