//! Datagram transport abstraction for KNXnet/IP communication.
//!
//! The driver only needs to send and receive UDP-like datagrams, so it
//! depends on the [`AsyncTransport`] trait instead of a concrete socket.
//! This keeps the session task testable with
//! [`MockTransport`](crate::net::mock_transport::MockTransport) and lets
//! applications plug in their own socket setup.
//!
//! ## Example
//!
//! ```rust,no_run
//! use knx_tunnel::net::tokio_adapter::UdpTransport;
//! use knx_tunnel::net::AsyncTransport;
//! use std::net::{Ipv4Addr, SocketAddrV4};
//!
//! # async fn demo() -> knx_tunnel::Result<()> {
//! let transport = UdpTransport::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
//! let gateway = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 3671);
//! transport.send_to(&[0x06, 0x10], gateway).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use core::future::Future;
use std::net::SocketAddrV4;

/// Asynchronous datagram transport.
///
/// Both methods take `&self` so the driver can wait for inbound data on one
/// transport while sending on the other. Implementations must be
/// cancel-safe in `recv_from`: the driver drops pending receives whenever
/// another branch of its select loop fires.
///
/// # Examples
///
/// ```rust,no_run
/// use knx_tunnel::net::AsyncTransport;
/// use knx_tunnel::Result;
/// use std::net::SocketAddrV4;
///
/// #[derive(Debug)]
/// struct Discard(SocketAddrV4);
///
/// impl AsyncTransport for Discard {
///     fn local_endpoint(&self) -> Result<SocketAddrV4> {
///         Ok(self.0)
///     }
///
///     async fn send_to(&self, _data: &[u8], _target: SocketAddrV4) -> Result<()> {
///         Ok(())
///     }
///
///     async fn recv_from(&self, _buf: &mut [u8]) -> Result<(usize, SocketAddrV4)> {
///         core::future::pending().await
///     }
/// }
/// ```
pub trait AsyncTransport: Send + Sync + 'static {
    /// Address the transport is bound to.
    ///
    /// Goes into the HPAI of connect, heartbeat and disconnect requests.
    fn local_endpoint(&self) -> Result<SocketAddrV4>;

    /// Send one datagram to `target`.
    fn send_to(&self, data: &[u8], target: SocketAddrV4) -> impl Future<Output = Result<()>> + Send;

    /// Wait for one datagram.
    ///
    /// Returns the number of bytes written to `buf` and the sender address.
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(usize, SocketAddrV4)>> + Send;
}
