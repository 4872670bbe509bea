//! Error types for KNXnet/IP tunneling operations.
//!
//! Every fallible operation in this crate returns [`KnxError`]. The error is
//! split into categories; each category is a struct holding a private kind and
//! a captured backtrace, queried through `is_*` helpers.

use core::fmt;
use std::backtrace::Backtrace;

/// Result type alias for KNX operations.
pub type Result<T> = core::result::Result<T, KnxError>;

// =============================================================================
// Error Kind Enums (Internal)
// =============================================================================

/// Protocol error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProtocolErrorKind {
    InvalidHeaderLength,
    UnsupportedVersion,
    LengthMismatch,
    Truncated,
    InvalidStructure,
    PayloadTooLarge,
    InvalidMessageCode,
    UnsupportedCommand,
    UnknownServiceName,
}

/// Connection error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionErrorKind {
    Refused(u8),
    Timeout,
    Lost,
    Cancelled,
    NotConnected,
    AlreadyConnected,
}

/// Tunneling error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TunnelingErrorKind {
    AckTimeout,
    Unconfirmed,
    SequenceInUse(u8),
    Aborted,
}

/// Transport error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportErrorKind {
    BindFailed,
    SendFailed,
    ReceiveFailed,
    LocalAddressUnavailable,
    NotIpv4,
}

/// Addressing error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddressingErrorKind {
    InvalidGroupAddress,
    InvalidPhysicalAddress,
    InvalidIpAddress,
    OutOfRange,
}

/// Telegram field error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TelegramErrorKind {
    MissingDestination,
    RoutingCounterOutOfRange,
    IndividualDestination,
    UnknownPriority,
    UnknownCommand,
}

/// Configuration error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigErrorKind {
    MissingRemoteAddress,
    InvalidValue,
    InvalidMaxRepeats,
}

// =============================================================================
// Main Error Type
// =============================================================================

/// KNX tunneling error types.
///
/// This is the error type returned by all operations of the crate. Each
/// variant wraps a structured error carrying a backtrace.
#[derive(Debug)]
pub enum KnxError {
    /// Frame parsing and encoding errors (header, length, CEMI layout)
    Protocol(ProtocolError),
    /// Connection lifecycle errors (refused, timeout, not connected)
    Connection(ConnectionError),
    /// Tunneling delivery errors (ack timeout, missing confirmation)
    Tunneling(TunnelingError),
    /// Socket errors
    Transport(TransportError),
    /// Invalid group, physical or IP address values
    Addressing(AddressingError),
    /// Invalid telegram field values
    Telegram(TelegramError),
    /// Invalid or missing configuration
    Config(ConfigError),
}

// =============================================================================
// Structured Error Types
// =============================================================================

/// Protocol error with backtrace
#[derive(Debug)]
pub struct ProtocolError {
    kind: ProtocolErrorKind,
    backtrace: Backtrace,
}

impl ProtocolError {
    pub(crate) fn new(kind: ProtocolErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the header length byte was not 0x06
    pub fn is_invalid_header_length(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::InvalidHeaderLength)
    }

    /// Check if this is an unsupported version error
    pub fn is_unsupported_version(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::UnsupportedVersion)
    }

    /// Check if the declared total length differs from the datagram length
    pub fn is_length_mismatch(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::LengthMismatch)
    }

    /// Check if the input ended before a complete structure was read
    pub fn is_truncated(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::Truncated)
    }

    /// Check if a CEMI message code was not recognised
    pub fn is_invalid_message_code(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::InvalidMessageCode)
    }

    /// Check if the APCI did not encode read, answer or write
    pub fn is_unsupported_command(&self) -> bool {
        matches!(self.kind, ProtocolErrorKind::UnsupportedCommand)
    }

    /// Backtrace captured when the error was created
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

/// Connection error with backtrace
#[derive(Debug)]
pub struct ConnectionError {
    kind: ConnectionErrorKind,
    backtrace: Backtrace,
}

impl ConnectionError {
    /// Backtrace captured when the error was created
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub(crate) fn new(kind: ConnectionErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Timeout)
    }

    /// Check if connection was refused
    pub fn is_refused(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Refused(_))
    }

    /// Status code sent by the gateway when it refused the connection
    pub fn refused_status(&self) -> Option<u8> {
        match self.kind {
            ConnectionErrorKind::Refused(status) => Some(status),
            _ => None,
        }
    }

    /// Check if connection was lost
    pub fn is_lost(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Lost)
    }

    /// Check if the operation requires an open connection
    pub fn is_not_connected(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::NotConnected)
    }

    /// Check if a connect was attempted on a tunnel that is not closed
    pub fn is_already_connected(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::AlreadyConnected)
    }

    /// Check if a connect was aborted before the handshake finished
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Cancelled)
    }
}

/// Tunneling error with backtrace
#[derive(Debug)]
pub struct TunnelingError {
    kind: TunnelingErrorKind,
    backtrace: Backtrace,
}

impl TunnelingError {
    /// Backtrace captured when the error was created
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub(crate) fn new(kind: TunnelingErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the gateway never acknowledged the request
    pub fn is_ack_timeout(&self) -> bool {
        matches!(self.kind, TunnelingErrorKind::AckTimeout)
    }

    /// Check if the request was acknowledged but never confirmed on the bus
    pub fn is_unconfirmed(&self) -> bool {
        matches!(self.kind, TunnelingErrorKind::Unconfirmed)
    }

    /// Check if the next sequence slot was still occupied
    pub fn is_sequence_in_use(&self) -> bool {
        matches!(self.kind, TunnelingErrorKind::SequenceInUse(_))
    }

    /// Check if the request was dropped because the connection closed
    pub fn is_aborted(&self) -> bool {
        matches!(self.kind, TunnelingErrorKind::Aborted)
    }
}

/// Transport error with backtrace and the underlying I/O error, if any
#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    source: Option<std::io::Error>,
    backtrace: Backtrace,
}

impl TransportError {
    /// Backtrace captured when the error was created
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub(crate) fn new(kind: TransportErrorKind, source: Option<std::io::Error>) -> Self {
        Self {
            kind,
            source,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if binding a local socket failed
    pub fn is_bind_failed(&self) -> bool {
        matches!(self.kind, TransportErrorKind::BindFailed)
    }

    /// Check if no local address could be determined for the gateway
    pub fn is_local_address_unavailable(&self) -> bool {
        matches!(self.kind, TransportErrorKind::LocalAddressUnavailable)
    }

    /// Underlying socket error
    pub fn io_error(&self) -> Option<&std::io::Error> {
        self.source.as_ref()
    }
}

/// Addressing error with backtrace
#[derive(Debug)]
pub struct AddressingError {
    kind: AddressingErrorKind,
    backtrace: Backtrace,
}

impl AddressingError {
    /// Backtrace captured when the error was created
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub(crate) fn new(kind: AddressingErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if address is out of range
    pub fn is_out_of_range(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::OutOfRange)
    }

    /// Check if a group address string could not be parsed
    pub fn is_invalid_group_address(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::InvalidGroupAddress)
    }

    /// Check if a physical address string could not be parsed
    pub fn is_invalid_physical_address(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::InvalidPhysicalAddress)
    }
}

/// Telegram field error with backtrace
#[derive(Debug)]
pub struct TelegramError {
    kind: TelegramErrorKind,
    backtrace: Backtrace,
}

impl TelegramError {
    /// Backtrace captured when the error was created
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub(crate) fn new(kind: TelegramErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the telegram was serialized without a destination
    pub fn is_missing_destination(&self) -> bool {
        matches!(self.kind, TelegramErrorKind::MissingDestination)
    }

    /// Check if a routing counter above 7 was given
    pub fn is_routing_counter_out_of_range(&self) -> bool {
        matches!(self.kind, TelegramErrorKind::RoutingCounterOutOfRange)
    }

    /// Check if an inbound frame addressed a device instead of a group
    pub fn is_individual_destination(&self) -> bool {
        matches!(self.kind, TelegramErrorKind::IndividualDestination)
    }
}

/// Configuration error with backtrace
#[derive(Debug)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    backtrace: Backtrace,
}

impl ConfigError {
    /// Backtrace captured when the error was created
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub(crate) fn new(kind: ConfigErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the gateway address was not configured
    pub fn is_missing_remote_address(&self) -> bool {
        matches!(self.kind, ConfigErrorKind::MissingRemoteAddress)
    }

    /// Check if a configured value could not be parsed
    pub fn is_invalid_value(&self) -> bool {
        matches!(
            self.kind,
            ConfigErrorKind::InvalidValue | ConfigErrorKind::InvalidMaxRepeats
        )
    }
}

// =============================================================================
// Convenience Constructors for KnxError
// =============================================================================

impl KnxError {
    // Protocol errors
    pub(crate) fn invalid_header_length() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::InvalidHeaderLength))
    }

    pub(crate) fn unsupported_version() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::UnsupportedVersion))
    }

    pub(crate) fn length_mismatch() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::LengthMismatch))
    }

    pub(crate) fn truncated() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::Truncated))
    }

    pub(crate) fn invalid_structure() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::InvalidStructure))
    }

    pub(crate) fn payload_too_large() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::PayloadTooLarge))
    }

    pub(crate) fn invalid_message_code() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::InvalidMessageCode))
    }

    pub(crate) fn unsupported_command() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::UnsupportedCommand))
    }

    pub(crate) fn unknown_service_name() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::UnknownServiceName))
    }

    // Connection errors
    pub(crate) fn connection_refused(status: u8) -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Refused(status)))
    }

    pub(crate) fn connection_timeout() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Timeout))
    }

    pub(crate) fn connection_lost() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Lost))
    }

    pub(crate) fn connection_cancelled() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Cancelled))
    }

    pub(crate) fn not_connected() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::NotConnected))
    }

    pub(crate) fn already_connected() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::AlreadyConnected))
    }

    // Tunneling errors
    pub(crate) fn ack_timeout() -> Self {
        Self::Tunneling(TunnelingError::new(TunnelingErrorKind::AckTimeout))
    }

    pub(crate) fn unconfirmed() -> Self {
        Self::Tunneling(TunnelingError::new(TunnelingErrorKind::Unconfirmed))
    }

    pub(crate) fn sequence_in_use(sequence: u8) -> Self {
        Self::Tunneling(TunnelingError::new(TunnelingErrorKind::SequenceInUse(sequence)))
    }

    pub(crate) fn request_aborted() -> Self {
        Self::Tunneling(TunnelingError::new(TunnelingErrorKind::Aborted))
    }

    // Transport errors
    pub(crate) fn bind_failed(source: std::io::Error) -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::BindFailed, Some(source)))
    }

    pub(crate) fn send_failed(source: std::io::Error) -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::SendFailed, Some(source)))
    }

    pub(crate) fn receive_failed(source: std::io::Error) -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::ReceiveFailed, Some(source)))
    }

    pub(crate) fn local_address_unavailable(source: Option<std::io::Error>) -> Self {
        Self::Transport(TransportError::new(
            TransportErrorKind::LocalAddressUnavailable,
            source,
        ))
    }

    pub(crate) fn not_ipv4() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::NotIpv4, None))
    }

    // Addressing errors
    pub(crate) fn invalid_group_address() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::InvalidGroupAddress))
    }

    pub(crate) fn invalid_physical_address() -> Self {
        Self::Addressing(AddressingError::new(
            AddressingErrorKind::InvalidPhysicalAddress,
        ))
    }

    pub(crate) fn invalid_ip_address() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::InvalidIpAddress))
    }

    pub(crate) fn address_out_of_range() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::OutOfRange))
    }

    // Telegram errors
    pub(crate) fn missing_destination() -> Self {
        Self::Telegram(TelegramError::new(TelegramErrorKind::MissingDestination))
    }

    pub(crate) fn routing_counter_out_of_range() -> Self {
        Self::Telegram(TelegramError::new(
            TelegramErrorKind::RoutingCounterOutOfRange,
        ))
    }

    pub(crate) fn individual_destination() -> Self {
        Self::Telegram(TelegramError::new(TelegramErrorKind::IndividualDestination))
    }

    pub(crate) fn unknown_priority() -> Self {
        Self::Telegram(TelegramError::new(TelegramErrorKind::UnknownPriority))
    }

    pub(crate) fn unknown_command() -> Self {
        Self::Telegram(TelegramError::new(TelegramErrorKind::UnknownCommand))
    }

    // Configuration errors
    pub(crate) fn missing_remote_address() -> Self {
        Self::Config(ConfigError::new(ConfigErrorKind::MissingRemoteAddress))
    }

    pub(crate) fn invalid_config_value() -> Self {
        Self::Config(ConfigError::new(ConfigErrorKind::InvalidValue))
    }

    pub(crate) fn invalid_max_repeats() -> Self {
        Self::Config(ConfigError::new(ConfigErrorKind::InvalidMaxRepeats))
    }
}

// =============================================================================
// Display Implementation
// =============================================================================

impl fmt::Display for KnxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxError::Protocol(e) => write!(f, "Protocol error: {:?}", e.kind),
            KnxError::Connection(e) => write!(f, "Connection error: {:?}", e.kind),
            KnxError::Tunneling(e) => write!(f, "Tunneling error: {:?}", e.kind),
            KnxError::Transport(e) => match &e.source {
                Some(io) => write!(f, "Transport error: {:?} ({io})", e.kind),
                None => write!(f, "Transport error: {:?}", e.kind),
            },
            KnxError::Addressing(e) => write!(f, "Addressing error: {:?}", e.kind),
            KnxError::Telegram(e) => write!(f, "Telegram error: {:?}", e.kind),
            KnxError::Config(e) => write!(f, "Configuration error: {:?}", e.kind),
        }
    }
}

impl std::error::Error for KnxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KnxError::Transport(TransportError {
                source: Some(io), ..
            }) => Some(io),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_names_category() {
        let err = KnxError::not_connected();
        assert_eq!(err.to_string(), "Connection error: NotConnected");

        let err = KnxError::connection_refused(0x24);
        assert_eq!(err.to_string(), "Connection error: Refused(36)");
    }

    #[test]
    fn test_refused_status() {
        let KnxError::Connection(e) = KnxError::connection_refused(0x22) else {
            panic!("expected connection error");
        };
        assert!(e.is_refused());
        assert_eq!(e.refused_status(), Some(0x22));
    }

    #[test]
    fn test_transport_source() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy");
        let err = KnxError::bind_failed(io);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("BindFailed"));
    }

    #[test]
    fn test_protocol_queries() {
        let KnxError::Protocol(e) = KnxError::length_mismatch() else {
            panic!("expected protocol error");
        };
        assert!(e.is_length_mismatch());
        assert!(!e.is_truncated());
    }
}
