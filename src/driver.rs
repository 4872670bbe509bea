//! Tokio driver for the tunneling connection.
//!
//! [`KnxIpDriver`] is a cheap, cloneable handle. `connect` spawns one session
//! task that owns the control and data transports plus the sans-IO
//! [`TunnelConnection`], and drives it from a single select loop:
//!
//! ```text
//!   control.recv ─┐
//!   data.recv    ─┼──▶ TunnelConnection ──▶ poll_transmit ──▶ control/data.send
//!   commands     ─┤        (now)        └─▶ poll_event    ──▶ waiters + broadcast
//!   sleep_until  ─┘
//! ```
//!
//! The handle talks to the task through a command channel. Application
//! events go out on a `broadcast` channel, the connection state on a
//! `watch` channel.
//!
//! ## Example
//!
//! ```rust,no_run
//! use knx_tunnel::{DriverConfig, DriverEvent, GroupAddress, KnxIpDriver, Telegram};
//! use std::net::Ipv4Addr;
//!
//! # async fn demo() -> knx_tunnel::Result<()> {
//! let driver = KnxIpDriver::new(DriverConfig::new(Ipv4Addr::new(192, 168, 1, 10)));
//! let mut events = driver.subscribe();
//! driver.connect().await?;
//!
//! driver
//!     .send(Telegram::group_write(GroupAddress::new(1, 2, 3)?, &[1])?)
//!     .await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let DriverEvent::Message(telegram) = event {
//!         println!("{telegram}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::DriverConfig;
use crate::error::{KnxError, Result};
use crate::net::tokio_adapter::UdpTransport;
use crate::net::{determine_local_address, AsyncTransport};
use crate::protocol::constants::MAX_FRAME_SIZE;
use crate::protocol::services::Packet;
use crate::protocol::telegram::Telegram;
use crate::protocol::tunnel::{
    Channel, ConnectionState, DisconnectReason, Transmit, TunnelConnection, TunnelEvent,
    TunnelSettings,
};
use core::future::Future;
use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::time::Instant;

/// Buffered events per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 64;

/// Event published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// Handshake complete
    Connected {
        /// Channel assigned by the gateway
        channel_id: u8,
    },
    /// Telegram received from the bus
    Message(Telegram),
    /// Open tunnel closed
    Disconnected(DisconnectReason),
    /// Every decoded inbound packet
    Packet(Packet),
}

/// Capabilities of a KNX bus driver
pub trait Driver: Send + Sync {
    /// Open the tunnel, resolves once the gateway accepted it
    fn connect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Close the tunnel, resolves once it is closed
    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Send a telegram, resolves once the gateway acked and the bus confirmed it
    fn send(&self, telegram: Telegram) -> impl Future<Output = Result<()>> + Send;

    /// True while the tunnel is open
    fn is_connected(&self) -> bool;

    /// Receive driver events from now on
    fn subscribe(&self) -> broadcast::Receiver<DriverEvent>;
}

type Reply = oneshot::Sender<Result<()>>;

#[derive(Debug)]
enum SessionCommand {
    AwaitConnected(Reply),
    Send { telegram: Telegram, reply: Reply },
    Disconnect(Reply),
}

/// Channels shared between the handles and the session task
#[derive(Debug)]
struct Shared {
    events: broadcast::Sender<DriverEvent>,
    state: watch::Sender<ConnectionState>,
}

#[derive(Debug)]
struct Inner {
    config: DriverConfig,
    shared: Arc<Shared>,
    session: Mutex<Option<mpsc::UnboundedSender<SessionCommand>>>,
}

/// KNXnet/IP tunneling driver
#[derive(Debug, Clone)]
pub struct KnxIpDriver {
    inner: Arc<Inner>,
}

impl KnxIpDriver {
    /// Create a closed driver
    pub fn new(config: DriverConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            inner: Arc::new(Inner {
                config,
                shared: Arc::new(Shared { events, state }),
                session: Mutex::new(None),
            }),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state.borrow()
    }

    /// Watch connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    /// True while the tunnel is open
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::OpenIdle
    }

    /// Receive driver events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.inner.shared.events.subscribe()
    }

    /// Open the tunnel over two UDP sockets.
    ///
    /// The sockets bind to the configured local address, or to the address
    /// that routes to the gateway. Calling this while a connect is running
    /// waits for that handshake, calling it while open returns at once.
    pub async fn connect(&self) -> Result<()> {
        if let Some(waiter) = self.join_session().await {
            return settle(waiter, KnxError::connection_lost).await;
        }

        let config = &self.inner.config;
        let local = match config.local_address() {
            Some(address) => address,
            None => determine_local_address(config.remote_address())?,
        };
        let control = UdpTransport::bind(SocketAddrV4::new(local, 0)).await?;
        let data = UdpTransport::bind(SocketAddrV4::new(local, 0)).await?;
        self.connect_with(control, data).await
    }

    /// Open the tunnel over caller-provided transports
    pub async fn connect_with<T: AsyncTransport>(&self, control: T, data: T) -> Result<()> {
        let waiter = {
            let mut session = self.inner.session.lock().await;
            match session.as_ref().filter(|commands| !commands.is_closed()) {
                Some(commands) => request(commands, SessionCommand::AwaitConnected)?,
                None => {
                    let (commands, commands_rx) = mpsc::unbounded_channel();
                    let (reply, waiter) = oneshot::channel();
                    let task = Session::new(
                        control,
                        data,
                        self.inner.config.gateway(),
                        self.inner.config.tunnel_settings(),
                        Arc::clone(&self.inner.shared),
                        reply,
                    );
                    tokio::spawn(task.run(commands_rx));
                    *session = Some(commands);
                    waiter
                }
            }
        };
        settle(waiter, KnxError::connection_lost).await
    }

    /// Close the tunnel.
    ///
    /// Resolves once the gateway answered or the repeat budget ran out. A
    /// closed driver returns `Ok` immediately.
    pub async fn disconnect(&self) -> Result<()> {
        let waiter = {
            let session = self.inner.session.lock().await;
            match session.as_ref() {
                Some(commands) => request(commands, SessionCommand::Disconnect).ok(),
                None => None,
            }
        };
        match waiter {
            Some(waiter) => waiter.await.unwrap_or(Ok(())),
            None => Ok(()),
        }
    }

    /// Send a telegram.
    ///
    /// Resolves once the gateway acknowledged the request and confirmed it
    /// on the bus.
    pub async fn send(&self, telegram: Telegram) -> Result<()> {
        let waiter = {
            let session = self.inner.session.lock().await;
            let commands = session.as_ref().ok_or_else(KnxError::not_connected)?;
            request(commands, |reply| SessionCommand::Send { telegram, reply })?
        };
        settle(waiter, KnxError::not_connected).await
    }

    /// Join a running session, if there is one
    async fn join_session(&self) -> Option<oneshot::Receiver<Result<()>>> {
        let session = self.inner.session.lock().await;
        session
            .as_ref()
            .and_then(|commands| request(commands, SessionCommand::AwaitConnected).ok())
    }
}

impl Driver for KnxIpDriver {
    async fn connect(&self) -> Result<()> {
        KnxIpDriver::connect(self).await
    }

    async fn disconnect(&self) -> Result<()> {
        KnxIpDriver::disconnect(self).await
    }

    async fn send(&self, telegram: Telegram) -> Result<()> {
        KnxIpDriver::send(self, telegram).await
    }

    fn is_connected(&self) -> bool {
        KnxIpDriver::is_connected(self)
    }

    fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        KnxIpDriver::subscribe(self)
    }
}

/// Queue a command carrying a reply channel
fn request(
    commands: &mpsc::UnboundedSender<SessionCommand>,
    command: impl FnOnce(Reply) -> SessionCommand,
) -> Result<oneshot::Receiver<Result<()>>> {
    let (reply, waiter) = oneshot::channel();
    commands
        .send(command(reply))
        .ok()
        .ok_or_else(KnxError::not_connected)?;
    Ok(waiter)
}

/// Wait for a reply, `gone` is returned if the session dropped it
async fn settle(waiter: oneshot::Receiver<Result<()>>, gone: fn() -> KnxError) -> Result<()> {
    waiter.await.unwrap_or_else(|_| Err(gone()))
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(Instant::from_std(deadline)).await,
        None => core::future::pending().await,
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

// =============================================================================
// Session task
// =============================================================================

struct Session<T> {
    tunnel: TunnelConnection,
    control: T,
    data: T,
    gateway: SocketAddrV4,
    shared: Arc<Shared>,
    connect_waiters: Vec<Reply>,
    disconnect_waiters: Vec<Reply>,
    sends: HashMap<u8, Reply>,
}

impl<T: AsyncTransport> Session<T> {
    fn new(
        control: T,
        data: T,
        gateway: SocketAddrV4,
        settings: TunnelSettings,
        shared: Arc<Shared>,
        waiter: Reply,
    ) -> Self {
        Self {
            tunnel: TunnelConnection::new(settings),
            control,
            data,
            gateway,
            shared,
            connect_waiters: vec![waiter],
            disconnect_waiters: Vec::new(),
            sends: HashMap::new(),
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        if let Err(e) = self.start() {
            knx_log!(warn, "Cannot start tunnel: {}", e);
            for waiter in self.connect_waiters.drain(..) {
                let _ = waiter.send(Err(KnxError::connection_lost()));
            }
            return;
        }
        self.flush().await;

        let mut control_buf = [0u8; MAX_FRAME_SIZE];
        let mut data_buf = [0u8; MAX_FRAME_SIZE];
        let mut commands_open = true;

        while self.tunnel.state() != ConnectionState::Closed {
            let deadline = self.tunnel.poll_timeout();
            tokio::select! {
                received = self.control.recv_from(&mut control_buf) => {
                    self.on_datagram(received, &control_buf);
                }
                received = self.data.recv_from(&mut data_buf) => {
                    self.on_datagram(received, &data_buf);
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        // every handle dropped
                        commands_open = false;
                        if let Err(e) = self.tunnel.disconnect(now()) {
                            knx_log!(warn, "Cannot disconnect after last handle dropped: {}", e);
                        }
                    }
                },
                () = sleep_until(deadline) => self.tunnel.handle_timeout(now()),
            }
            self.flush().await;
        }

        self.finish();
    }

    fn start(&mut self) -> Result<()> {
        let control = self.control.local_endpoint()?;
        let data = self.data.local_endpoint()?;
        self.tunnel.connect(now(), control.into(), data.into())?;
        self.publish_state();
        Ok(())
    }

    fn on_datagram(&mut self, received: Result<(usize, SocketAddrV4)>, buf: &[u8]) {
        match received {
            Ok((len, from)) => {
                knx_log!(trace, "{} bytes from {}", len, from);
                self.tunnel.handle_datagram(now(), &buf[..len]);
            }
            Err(e) => knx_log!(warn, "Receive failed: {}", e),
        }
    }

    fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::AwaitConnected(reply) => {
                if self.tunnel.is_disconnecting() {
                    knx_log!(debug, "Connect rejected, tunnel is closing");
                    let _ = reply.send(Err(KnxError::connection_cancelled()));
                } else if self.tunnel.is_connected() {
                    let _ = reply.send(Ok(()));
                } else {
                    self.connect_waiters.push(reply);
                }
            }
            SessionCommand::Send { telegram, reply } => match self.tunnel.send(now(), telegram) {
                Ok(sequence) => {
                    self.sends.insert(sequence, reply);
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            SessionCommand::Disconnect(reply) => match self.tunnel.disconnect(now()) {
                Ok(()) if self.tunnel.state() == ConnectionState::Closed => {
                    let _ = reply.send(Ok(()));
                }
                Ok(()) => self.disconnect_waiters.push(reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
        }
    }

    /// Put queued packets on the wire and hand out queued events
    async fn flush(&mut self) {
        while let Some(transmit) = self.tunnel.poll_transmit() {
            self.transmit(transmit).await;
        }
        while let Some(event) = self.tunnel.poll_event() {
            self.dispatch(event);
        }
    }

    async fn transmit(&self, transmit: Transmit) {
        let frame = match transmit.packet.to_bytes() {
            Ok(frame) => frame,
            Err(e) => {
                knx_log!(warn, "Cannot encode {}: {}", transmit.packet.service_name(), e);
                return;
            }
        };

        knx_log!(debug, "send: {}", transmit.packet);
        let transport = match transmit.channel {
            Channel::Control => &self.control,
            Channel::Data => &self.data,
        };
        if let Err(e) = transport.send_to(&frame, self.gateway).await {
            knx_log!(warn, "Send to {} failed: {}", self.gateway, e);
        }
    }

    fn dispatch(&mut self, event: TunnelEvent) {
        match event {
            TunnelEvent::Connected { channel_id } => {
                self.publish_state();
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
                self.broadcast(DriverEvent::Connected { channel_id });
            }
            TunnelEvent::ConnectFailed(failure) => {
                self.publish_state();
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Err(failure.to_error()));
                }
                for waiter in self.disconnect_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }
            TunnelEvent::Disconnected(reason) => {
                self.publish_state();
                for waiter in self.disconnect_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
                self.broadcast(DriverEvent::Disconnected(reason));
            }
            TunnelEvent::Message(telegram) => self.broadcast(DriverEvent::Message(telegram)),
            TunnelEvent::Packet(packet) => self.broadcast(DriverEvent::Packet(packet)),
            TunnelEvent::SendCompleted { sequence } => {
                if let Some(reply) = self.sends.remove(&sequence) {
                    let _ = reply.send(Ok(()));
                }
            }
            TunnelEvent::SendFailed { sequence, reason } => {
                if let Some(reply) = self.sends.remove(&sequence) {
                    let _ = reply.send(Err(reason.to_error()));
                }
            }
        }
    }

    fn broadcast(&self, event: DriverEvent) {
        // no subscribers is fine
        let _ = self.shared.events.send(event);
    }

    fn publish_state(&self) {
        self.shared.state.send_replace(self.tunnel.state());
    }

    /// Release everyone still waiting on a closed session
    fn finish(&mut self) {
        self.publish_state();
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(KnxError::connection_lost()));
        }
        for waiter in self.disconnect_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        for (_, reply) in self.sends.drain() {
            let _ = reply.send(Err(KnxError::request_aborted()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::GroupAddress;
    use std::net::Ipv4Addr;

    fn driver() -> KnxIpDriver {
        KnxIpDriver::new(DriverConfig::new(Ipv4Addr::new(192, 168, 0, 10)))
    }

    #[tokio::test]
    async fn test_send_on_closed_driver() {
        let driver = driver();
        assert!(!driver.is_connected());
        assert_eq!(driver.state(), ConnectionState::Closed);

        let telegram = Telegram::group_write(GroupAddress::new(2, 0, 0).unwrap(), &[1]).unwrap();
        let KnxError::Connection(e) = driver.send(telegram).await.unwrap_err() else {
            panic!("expected connection error");
        };
        assert!(e.is_not_connected());
    }

    #[tokio::test]
    async fn test_disconnect_on_closed_driver() {
        driver().disconnect().await.unwrap();
    }

    #[test]
    fn test_clones_share_state() {
        let driver = driver();
        let clone = driver.clone();
        let _events = clone.subscribe();
        assert_eq!(clone.config().remote_port(), 3671);
        assert_eq!(*driver.watch_state().borrow(), ConnectionState::Closed);
    }
}
