//! Sans-IO KNXnet/IP tunneling connection.
//!
//! [`TunnelConnection`] holds the whole tunneling protocol (connect
//! handshake, heartbeat, sequence numbering, acknowledgements, bus
//! confirmations and teardown) without touching a socket or a clock. The
//! caller feeds it datagrams and the current time, then drains what it wants
//! to send and what happened:
//!
//! ```text
//!            connect()                 CONNECT_RESPONSE (status 0)
//!   Closed ─────────────▶ Connecting ─────────────────────────────▶ OpenIdle
//!     ▲                      │  refused / no response                 │
//!     └──────────────────────┘                                         │
//!     ▲      DISCONNECT_* / heartbeat lost / disconnect()              │
//!     └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use knx_tunnel::protocol::frame::Hpai;
//! use knx_tunnel::protocol::tunnel::{TunnelConnection, TunnelSettings};
//! use std::net::Ipv4Addr;
//! use std::time::Instant;
//!
//! let mut tunnel = TunnelConnection::new(TunnelSettings::default());
//! let control = Hpai::new(Ipv4Addr::new(192, 168, 1, 50), 50000);
//! let data = Hpai::new(Ipv4Addr::new(192, 168, 1, 50), 50001);
//! tunnel.connect(Instant::now(), control, data)?;
//!
//! while let Some(transmit) = tunnel.poll_transmit() {
//!     // write transmit.packet.to_bytes()? to the control or data socket
//! }
//! // on datagram: tunnel.handle_datagram(Instant::now(), &bytes);
//! // on timer:    tunnel.handle_timeout(Instant::now());
//! # Ok::<(), knx_tunnel::KnxError>(())
//! ```

use crate::addressing::PhysicalAddress;
use crate::error::{KnxError, Result};
use crate::protocol::cemi::Cemi;
use crate::protocol::constants::{CemiMessageCode, E_NO_ERROR};
use crate::protocol::frame::Hpai;
use crate::protocol::heartbeat::Heartbeat;
use crate::protocol::pending::{Origin, PendingRequest, PendingTable};
use crate::protocol::retry::{RetryAction, RetryScheduler, StopCondition};
use crate::protocol::services::{Packet, TunnelingPayload};
use crate::protocol::telegram::Telegram;
use core::fmt;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Transmissions per request, including the first one
pub const DEFAULT_MAX_REPEATS: u8 = 6;

/// Time between retransmissions
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Time between a heartbeat response and the next request
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

// =============================================================================
// Public types
// =============================================================================

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No tunnel
    #[default]
    Closed,
    /// Connect request sent, waiting for the gateway
    Connecting,
    /// Tunnel established
    OpenIdle,
}

impl ConnectionState {
    /// Lowercase state name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::OpenIdle => "open",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Socket a packet has to leave on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Connection management (connect, heartbeat, disconnect)
    Control,
    /// Tunneling requests and acks
    Data,
}

/// Outbound packet produced by the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    /// Socket to send from
    pub channel: Channel,
    /// Packet to encode
    pub packet: Packet,
}

/// Why a connect attempt ended without a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// No connect response within the repeat budget
    Timeout,
    /// Gateway answered with a non-zero status
    Refused(u8),
    /// `disconnect` was called while connecting
    Cancelled,
}

impl ConnectFailure {
    /// Matching connection error
    pub fn to_error(self) -> KnxError {
        match self {
            Self::Timeout => KnxError::connection_timeout(),
            Self::Refused(status) => KnxError::connection_refused(status),
            Self::Cancelled => KnxError::connection_cancelled(),
        }
    }
}

/// Why an open tunnel closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Gateway sent a disconnect request
    Remote,
    /// Local `disconnect` finished (answered or retries spent)
    Local,
    /// Heartbeat failed or went unanswered
    HeartbeatLost,
}

/// Why a sent telegram did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// Gateway never acknowledged the tunneling request
    AckTimeout,
    /// Acknowledged, but no bus confirmation arrived
    Unconfirmed,
    /// The tunnel closed while the request was in flight
    Closed,
}

impl SendFailure {
    /// Matching tunneling error
    pub fn to_error(self) -> KnxError {
        match self {
            Self::AckTimeout => KnxError::ack_timeout(),
            Self::Unconfirmed => KnxError::unconfirmed(),
            Self::Closed => KnxError::request_aborted(),
        }
    }
}

/// Something the application should know about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    /// Tunnel established
    Connected {
        /// Channel assigned by the gateway
        channel_id: u8,
    },
    /// Connect attempt ended without a tunnel
    ConnectFailed(ConnectFailure),
    /// Telegram received from the bus
    Message(Telegram),
    /// Open tunnel closed
    Disconnected(DisconnectReason),
    /// Telegram acknowledged and confirmed on the bus
    SendCompleted {
        /// Sequence number returned by `send`
        sequence: u8,
    },
    /// Telegram could not be delivered
    SendFailed {
        /// Sequence number returned by `send`
        sequence: u8,
        /// Failure cause
        reason: SendFailure,
    },
    /// Every successfully decoded inbound packet
    Packet(Packet),
}

/// Timing and repeat parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelSettings {
    /// Transmissions per request, including the first one (at least 1)
    pub max_repeats: u8,
    /// Time between retransmissions
    pub retry_interval: Duration,
    /// Time between a heartbeat response and the next request
    pub heartbeat_interval: Duration,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            max_repeats: DEFAULT_MAX_REPEATS,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Tunneling protocol state machine
#[derive(Debug)]
pub struct TunnelConnection {
    settings: TunnelSettings,
    state: ConnectionState,
    disconnecting: bool,
    channel_id: u8,
    sequence: u8,
    control_endpoint: Hpai,
    gateway_data_endpoint: Option<Hpai>,
    assigned_address: Option<PhysicalAddress>,
    retries: RetryScheduler,
    pending: PendingTable,
    heartbeat: Heartbeat,
    next_token: u64,
    transmits: VecDeque<Transmit>,
    events: VecDeque<TunnelEvent>,
}

impl TunnelConnection {
    /// Create a closed connection
    pub fn new(settings: TunnelSettings) -> Self {
        let settings = TunnelSettings {
            max_repeats: settings.max_repeats.max(1),
            ..settings
        };
        Self {
            settings,
            state: ConnectionState::Closed,
            disconnecting: false,
            channel_id: 0,
            sequence: 0,
            control_endpoint: Hpai::new(Ipv4Addr::UNSPECIFIED, 0),
            gateway_data_endpoint: None,
            assigned_address: None,
            retries: RetryScheduler::new(),
            pending: PendingTable::new(),
            heartbeat: Heartbeat::new(settings.heartbeat_interval),
            next_token: 0,
            transmits: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    /// Current lifecycle state
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// True once the gateway accepted the connection
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::OpenIdle
    }

    /// True while a local disconnect waits for its response
    pub const fn is_disconnecting(&self) -> bool {
        self.disconnecting
    }

    /// Channel assigned by the gateway, while open
    pub fn channel_id(&self) -> Option<u8> {
        self.is_connected().then_some(self.channel_id)
    }

    /// Sequence number the next `send` will use
    pub const fn next_sequence(&self) -> u8 {
        self.sequence
    }

    /// Individual address the gateway assigned to the tunnel
    pub const fn assigned_address(&self) -> Option<PhysicalAddress> {
        self.assigned_address
    }

    /// Data endpoint announced by the gateway
    pub const fn gateway_data_endpoint(&self) -> Option<Hpai> {
        self.gateway_data_endpoint
    }

    /// Timing parameters in use
    pub const fn settings(&self) -> &TunnelSettings {
        &self.settings
    }

    /// Number of tunneling requests in flight
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Start the connect handshake.
    ///
    /// The control and data endpoints are the local socket addresses the
    /// gateway should answer to.
    pub fn connect(&mut self, now: Instant, control_endpoint: Hpai, data_endpoint: Hpai) -> Result<()> {
        if self.state != ConnectionState::Closed {
            return Err(KnxError::already_connected());
        }

        knx_log!(
            info,
            "Connecting, control endpoint {} data endpoint {}",
            control_endpoint,
            data_endpoint
        );
        self.state = ConnectionState::Connecting;
        self.disconnecting = false;
        self.channel_id = 0;
        self.sequence = 0;
        self.control_endpoint = control_endpoint;
        self.gateway_data_endpoint = None;
        self.assigned_address = None;
        self.retry(
            now,
            Channel::Control,
            Packet::ConnectRequest {
                control_endpoint,
                data_endpoint,
            },
            StopCondition::LeftConnecting,
        );
        Ok(())
    }

    /// Queue a telegram as `L_Data.req`, returns its sequence number.
    ///
    /// Completion is reported through [`TunnelEvent::SendCompleted`] or
    /// [`TunnelEvent::SendFailed`] carrying the same sequence number.
    pub fn send(&mut self, now: Instant, telegram: Telegram) -> Result<u8> {
        if !self.is_connected() || self.disconnecting {
            return Err(KnxError::not_connected());
        }
        if telegram.destination().is_none() {
            return Err(KnxError::missing_destination());
        }

        let sequence = self.sequence;
        let token = self.token();
        self.pending.insert(sequence, PendingRequest::local(token))?;
        self.sequence = sequence.wrapping_add(1);

        knx_log!(debug, "Sending {} as sequence {}", telegram, sequence);
        let cemi = Cemi::new(CemiMessageCode::LDataReq, telegram);
        self.retry(
            now,
            Channel::Data,
            Packet::tunneling_request(self.channel_id, sequence, cemi),
            StopCondition::Acknowledged { sequence, token },
        );
        Ok(sequence)
    }

    /// Tear the tunnel down.
    ///
    /// While connecting the attempt is cancelled at once. While open a
    /// disconnect request is sent and retried until answered.
    pub fn disconnect(&mut self, now: Instant) -> Result<()> {
        match self.state {
            ConnectionState::Closed => Err(KnxError::not_connected()),
            ConnectionState::Connecting => {
                knx_log!(info, "Connect cancelled");
                self.close();
                self.events
                    .push_back(TunnelEvent::ConnectFailed(ConnectFailure::Cancelled));
                Ok(())
            }
            ConnectionState::OpenIdle if self.disconnecting => Ok(()),
            ConnectionState::OpenIdle => {
                knx_log!(info, "Disconnecting channel {}", self.channel_id);
                self.disconnecting = true;
                self.heartbeat.stop();
                self.retry(
                    now,
                    Channel::Control,
                    Packet::DisconnectRequest {
                        channel_id: self.channel_id,
                        control_endpoint: self.control_endpoint,
                    },
                    StopCondition::Closed,
                );
                Ok(())
            }
        }
    }

    /// Process a datagram received on either socket
    pub fn handle_datagram(&mut self, now: Instant, datagram: &[u8]) {
        let packet = match Packet::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                knx_log!(warn, "Dropping datagram of {} bytes: {}", datagram.len(), e);
                return;
            }
        };

        knx_log!(debug, "recv: {}", packet);
        self.events.push_back(TunnelEvent::Packet(packet.clone()));
        self.handle_packet(now, packet);
        self.prune_retries();
    }

    /// Advance timers to `now`
    pub fn handle_timeout(&mut self, now: Instant) {
        let state = self.state;
        let pending = &self.pending;
        let heartbeat = &self.heartbeat;
        let actions = self
            .retries
            .poll(now, |stop| stop_satisfied(state, pending, heartbeat, *stop));

        for action in actions {
            match action {
                RetryAction::Retransmit(transmit) => {
                    knx_log!(debug, "Retransmitting {}", transmit.packet);
                    self.transmits.push_back(transmit);
                }
                RetryAction::Exhausted(stop) => self.on_retries_exhausted(stop),
            }
        }

        for (sequence, _) in self.pending.take_expired(now) {
            knx_log!(warn, "No bus confirmation for sequence {}", sequence);
            self.events.push_back(TunnelEvent::SendFailed {
                sequence,
                reason: SendFailure::Unconfirmed,
            });
        }

        if self.is_connected() && !self.disconnecting && self.heartbeat.is_due(now) {
            self.start_heartbeat(now);
        }
    }

    /// Next instant `handle_timeout` must run
    pub fn poll_timeout(&self) -> Option<Instant> {
        [
            self.retries.next_deadline(),
            self.pending.next_confirm_deadline(),
            self.heartbeat.next_due(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Next packet to put on the wire
    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.transmits.pop_front()
    }

    /// Next event for the application
    pub fn poll_event(&mut self) -> Option<TunnelEvent> {
        self.events.pop_front()
    }

    // -------------------------------------------------------------------------
    // Inbound dispatch
    // -------------------------------------------------------------------------

    fn handle_packet(&mut self, now: Instant, packet: Packet) {
        match packet {
            Packet::ConnectResponse {
                channel_id,
                status,
                data_endpoint,
                assigned_address,
            } => self.on_connect_response(now, channel_id, status, data_endpoint, assigned_address),
            Packet::ConnectionStateResponse { channel_id, status } if self.is_own_channel(channel_id) => {
                self.on_connection_state_response(now, status);
            }
            Packet::DisconnectRequest { channel_id, .. } if self.is_own_channel(channel_id) => {
                knx_log!(info, "Gateway closed channel {}", channel_id);
                self.transmits.push_back(Transmit {
                    channel: Channel::Control,
                    packet: Packet::DisconnectResponse {
                        channel_id,
                        status: E_NO_ERROR,
                    },
                });
                self.close_with(DisconnectReason::Remote);
            }
            Packet::DisconnectResponse { channel_id, .. } if self.is_own_channel(channel_id) => {
                let reason = if self.disconnecting {
                    DisconnectReason::Local
                } else {
                    DisconnectReason::Remote
                };
                knx_log!(info, "Channel {} closed", channel_id);
                self.close_with(reason);
            }
            Packet::TunnelingAck {
                channel_id,
                sequence,
                status,
            } if self.is_own_channel(channel_id) => self.on_tunneling_ack(now, sequence, status),
            Packet::TunnelingRequest {
                channel_id,
                sequence,
                payload,
            } if self.is_own_channel(channel_id) => self.on_tunneling_request(now, sequence, payload),
            other => {
                knx_log!(debug, "Ignoring {} in state {}", other.service_name(), self.state);
            }
        }
    }

    fn on_connect_response(
        &mut self,
        now: Instant,
        channel_id: u8,
        status: u8,
        data_endpoint: Option<Hpai>,
        assigned_address: Option<PhysicalAddress>,
    ) {
        if self.state != ConnectionState::Connecting {
            knx_log!(debug, "Ignoring connect response for channel {}", channel_id);
            return;
        }

        if status != E_NO_ERROR {
            knx_log!(warn, "Gateway refused connection, status 0x{:02x}", status);
            self.close();
            self.events
                .push_back(TunnelEvent::ConnectFailed(ConnectFailure::Refused(status)));
            return;
        }

        self.state = ConnectionState::OpenIdle;
        self.channel_id = channel_id;
        self.sequence = 0;
        self.gateway_data_endpoint = data_endpoint;
        self.assigned_address = assigned_address;
        match assigned_address {
            Some(address) => knx_log!(info, "Connected on channel {} as {}", channel_id, address),
            None => knx_log!(info, "Connected on channel {}", channel_id),
        }
        self.events.push_back(TunnelEvent::Connected { channel_id });
        self.start_heartbeat(now);
    }

    fn on_connection_state_response(&mut self, now: Instant, status: u8) {
        if self.disconnecting {
            return;
        }
        if status == E_NO_ERROR {
            self.heartbeat.answered(now);
        } else {
            knx_log!(warn, "Heartbeat answered with status 0x{:02x}", status);
            self.close_with(DisconnectReason::HeartbeatLost);
        }
    }

    fn on_tunneling_ack(&mut self, now: Instant, sequence: u8, status: u8) {
        if status != E_NO_ERROR {
            knx_log!(warn, "Tunneling ack for sequence {} with status 0x{:02x}", sequence, status);
            return;
        }

        let confirm_window = self.settings.retry_interval * u32::from(self.settings.max_repeats);
        let Some(request) = self.pending.get_mut(sequence) else {
            knx_log!(debug, "Unmatched tunneling ack for sequence {}", sequence);
            return;
        };
        if request.acknowledged {
            return;
        }

        request.acknowledged = true;
        let finished = match request.origin {
            Origin::Local => {
                if !request.repeated {
                    request.confirm_deadline = Some(now + confirm_window);
                }
                request.repeated
            }
            Origin::Remote(_) => true,
        };
        if finished {
            self.finish(sequence);
        }
    }

    fn on_tunneling_request(&mut self, now: Instant, sequence: u8, payload: TunnelingPayload) {
        self.transmits.push_back(Transmit {
            channel: Channel::Data,
            packet: Packet::TunnelingAck {
                channel_id: self.channel_id,
                sequence,
                status: E_NO_ERROR,
            },
        });

        let mut cemi = match payload {
            TunnelingPayload::Cemi(cemi) => cemi,
            TunnelingPayload::Unsupported(raw) => {
                knx_log!(debug, "Ignoring unsupported cEMI frame of {} bytes", raw.len());
                return;
            }
        };

        if cemi.is_confirmation() {
            match self.pending.get_mut(sequence) {
                Some(request) if request.origin == Origin::Local => {
                    request.repeated = true;
                    if request.acknowledged {
                        self.finish(sequence);
                    }
                }
                _ => knx_log!(debug, "Unmatched confirmation for sequence {}", sequence),
            }
            return;
        }

        match self.pending.get(sequence).map(|request| &request.origin) {
            Some(Origin::Remote(_)) => {
                knx_log!(debug, "Repeated tunneling request {}", sequence);
                return;
            }
            Some(Origin::Local) => {
                knx_log!(
                    warn,
                    "Sequence {} busy, delivering telegram without confirmation",
                    sequence
                );
                self.events
                    .push_back(TunnelEvent::Message(cemi.into_telegram()));
                return;
            }
            None => {}
        }

        let token = self.token();
        let telegram = cemi.telegram().clone();
        knx_log!(debug, "Received {}", telegram);
        if let Err(e) = self.pending.insert(sequence, PendingRequest::remote(token, telegram)) {
            knx_log!(warn, "Cannot track confirmation: {}", e);
            return;
        }
        cemi.set_message_code(CemiMessageCode::LDataCon);
        self.retry(
            now,
            Channel::Data,
            Packet::tunneling_request(self.channel_id, sequence, cemi),
            StopCondition::Acknowledged { sequence, token },
        );
    }

    // -------------------------------------------------------------------------
    // Timers
    // -------------------------------------------------------------------------

    fn on_retries_exhausted(&mut self, stop: StopCondition) {
        match stop {
            StopCondition::LeftConnecting => {
                if self.state == ConnectionState::Connecting {
                    knx_log!(
                        warn,
                        "No connect response after {} attempts",
                        self.settings.max_repeats
                    );
                    self.close();
                    self.events
                        .push_back(TunnelEvent::ConnectFailed(ConnectFailure::Timeout));
                }
            }
            StopCondition::Closed => {
                if self.state != ConnectionState::Closed {
                    knx_log!(warn, "No disconnect response, closing channel {}", self.channel_id);
                    self.close_with(DisconnectReason::Local);
                }
            }
            StopCondition::Acknowledged { sequence, token } => {
                match self.pending.remove_token(sequence, token).map(|request| request.origin) {
                    Some(Origin::Local) => {
                        knx_log!(warn, "No tunneling ack for sequence {}", sequence);
                        self.events.push_back(TunnelEvent::SendFailed {
                            sequence,
                            reason: SendFailure::AckTimeout,
                        });
                    }
                    Some(Origin::Remote(telegram)) => {
                        knx_log!(warn, "Confirmation {} never acknowledged", sequence);
                        self.sequence = sequence.wrapping_add(1);
                        self.events.push_back(TunnelEvent::Message(telegram));
                    }
                    None => {}
                }
            }
            StopCondition::HeartbeatAnswered { token } => {
                if self.heartbeat.is_outstanding(token) {
                    knx_log!(warn, "Heartbeat unanswered on channel {}", self.channel_id);
                    self.close_with(DisconnectReason::HeartbeatLost);
                }
            }
        }
    }

    fn start_heartbeat(&mut self, now: Instant) {
        let token = self.heartbeat.begin();
        self.retry(
            now,
            Channel::Control,
            Packet::ConnectionStateRequest {
                channel_id: self.channel_id,
                control_endpoint: self.control_endpoint,
            },
            StopCondition::HeartbeatAnswered { token },
        );
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn is_own_channel(&self, channel_id: u8) -> bool {
        self.is_connected() && channel_id == self.channel_id
    }

    fn token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn retry(&mut self, now: Instant, channel: Channel, packet: Packet, stop: StopCondition) {
        let first = self.retries.schedule(
            now,
            Transmit { channel, packet },
            stop,
            self.settings.max_repeats,
            self.settings.retry_interval,
        );
        self.transmits.push_back(first);
    }

    fn prune_retries(&mut self) {
        let state = self.state;
        let pending = &self.pending;
        let heartbeat = &self.heartbeat;
        self.retries
            .prune(|stop| stop_satisfied(state, pending, heartbeat, *stop));
    }

    /// Resolve a request that was both acked and, for local ones, confirmed
    fn finish(&mut self, sequence: u8) {
        match self.pending.remove(sequence).map(|request| request.origin) {
            Some(Origin::Local) => {
                self.events.push_back(TunnelEvent::SendCompleted { sequence });
            }
            Some(Origin::Remote(telegram)) => {
                self.sequence = sequence.wrapping_add(1);
                self.events.push_back(TunnelEvent::Message(telegram));
            }
            None => {}
        }
    }

    fn close(&mut self) {
        self.state = ConnectionState::Closed;
        self.disconnecting = false;
        self.retries.clear();
        self.heartbeat.stop();
        for (sequence, request) in self.pending.drain() {
            match request.origin {
                Origin::Local => self.events.push_back(TunnelEvent::SendFailed {
                    sequence,
                    reason: SendFailure::Closed,
                }),
                // received and acked by us, so it still reaches the application
                Origin::Remote(telegram) => {
                    knx_log!(debug, "Delivering unconfirmed inbound {} on close", telegram);
                    self.events.push_back(TunnelEvent::Message(telegram));
                }
            }
        }
    }

    fn close_with(&mut self, reason: DisconnectReason) {
        self.close();
        self.events.push_back(TunnelEvent::Disconnected(reason));
    }
}

fn stop_satisfied(
    state: ConnectionState,
    pending: &PendingTable,
    heartbeat: &Heartbeat,
    stop: StopCondition,
) -> bool {
    match stop {
        StopCondition::LeftConnecting => state != ConnectionState::Connecting,
        StopCondition::Closed => state == ConnectionState::Closed,
        StopCondition::Acknowledged { sequence, token } => pending.is_acknowledged(sequence, token),
        StopCondition::HeartbeatAnswered { token } => !heartbeat.is_outstanding(token),
    }
}

// =============================================================================
// Tests
// =============================================================================
