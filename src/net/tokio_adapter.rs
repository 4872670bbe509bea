//! Tokio UDP socket adapter for [`AsyncTransport`].

use crate::error::{KnxError, Result};
use crate::net::transport::AsyncTransport;
use std::net::{SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;

/// [`AsyncTransport`] over a `tokio::net::UdpSocket`
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind a UDP socket to `addr` (port 0 picks a free port).
    ///
    /// # Errors
    ///
    /// Returns a transport error if the address is unavailable.
    pub async fn bind(addr: SocketAddrV4) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(KnxError::bind_failed)?;
        Ok(Self { socket })
    }

    /// Wrap an already bound socket
    pub const fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }
}

impl AsyncTransport for UdpTransport {
    fn local_endpoint(&self) -> Result<SocketAddrV4> {
        match self.socket.local_addr() {
            Ok(SocketAddr::V4(addr)) => Ok(addr),
            Ok(SocketAddr::V6(_)) => Err(KnxError::not_ipv4()),
            Err(e) => Err(KnxError::local_address_unavailable(Some(e))),
        }
    }

    async fn send_to(&self, data: &[u8], target: SocketAddrV4) -> Result<()> {
        self.socket
            .send_to(data, target)
            .await
            .map_err(KnxError::send_failed)?;
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddrV4)> {
        let (len, from) = self
            .socket
            .recv_from(buf)
            .await
            .map_err(KnxError::receive_failed)?;
        match from {
            SocketAddr::V4(from) => Ok((len, from)),
            SocketAddr::V6(_) => Err(KnxError::not_ipv4()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn any_port() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)
    }

    #[tokio::test]
    async fn test_loopback_datagram() {
        let a = UdpTransport::bind(any_port()).await.unwrap();
        let b = UdpTransport::bind(any_port()).await.unwrap();
        let a_addr = a.local_endpoint().unwrap();
        let b_addr = b.local_endpoint().unwrap();
        assert_ne!(a_addr.port(), 0);

        a.send_to(&[0x06, 0x10, 0x04, 0x21], b_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[0x06, 0x10, 0x04, 0x21]);
        assert_eq!(from, a_addr);
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let a = UdpTransport::bind(any_port()).await.unwrap();
        let taken = a.local_endpoint().unwrap();

        let KnxError::Transport(e) = UdpTransport::bind(taken).await.unwrap_err() else {
            panic!("expected transport error");
        };
        assert!(e.is_bind_failed());
        assert!(e.io_error().is_some());
    }
}
