//! Network layer for KNXnet/IP communication.
//!
//! The tunneling driver talks to the gateway through the [`AsyncTransport`]
//! trait. Two implementations ship with the crate:
//!
//! - [`tokio_adapter::UdpTransport`]: a real UDP socket
//! - [`mock_transport::MockTransport`]: an in-memory pipe for tests
//!
//! This module also finds the local IPv4 address the gateway can reach us
//! on, which goes into the HPAI of every control packet.

pub mod mock_transport;
pub mod tokio_adapter;
pub mod transport;

pub use transport::AsyncTransport;

use crate::error::{KnxError, Result};
use crate::protocol::constants::KNXNETIP_DEFAULT_PORT;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

/// Find the local IPv4 address that routes to `remote`.
///
/// A UDP socket is "connected" to the gateway, which makes the OS pick the
/// outgoing interface without sending anything. Its address is the one on
/// the gateway's subnet, or the default route otherwise.
///
/// # Errors
///
/// Returns a transport error if the OS has no route to `remote` or only an
/// IPv6 source address.
///
/// # Examples
///
/// ```rust,no_run
/// use knx_tunnel::net::determine_local_address;
/// use std::net::Ipv4Addr;
///
/// let local = determine_local_address(Ipv4Addr::new(192, 168, 1, 10))?;
/// println!("reachable as {local}");
/// # Ok::<(), knx_tunnel::KnxError>(())
/// ```
pub fn determine_local_address(remote: Ipv4Addr) -> Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .map_err(|e| KnxError::local_address_unavailable(Some(e)))?;
    socket
        .connect((remote, KNXNETIP_DEFAULT_PORT))
        .map_err(|e| KnxError::local_address_unavailable(Some(e)))?;

    match socket
        .local_addr()
        .map_err(|e| KnxError::local_address_unavailable(Some(e)))?
    {
        SocketAddr::V4(addr) if !addr.ip().is_unspecified() => Ok(*addr.ip()),
        SocketAddr::V4(_) => Err(KnxError::local_address_unavailable(None)),
        SocketAddr::V6(_) => Err(KnxError::not_ipv4()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_routes_to_loopback() {
        let local = determine_local_address(Ipv4Addr::LOCALHOST).unwrap();
        assert!(local.is_loopback());
    }
}
