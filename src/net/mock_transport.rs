//! Mock transport implementation for testing.
//!
//! [`MockTransport::pair`] returns a transport for the driver and a
//! [`MockPeer`] for the test. Everything the driver sends shows up at the
//! peer, and everything the peer delivers is returned by `recv_from`. No
//! socket is involved, so tests run on tokio's paused clock.
//!
//! ## Example
//!
//! ```rust
//! use knx_tunnel::net::mock_transport::MockTransport;
//! use knx_tunnel::net::AsyncTransport;
//! use std::net::{Ipv4Addr, SocketAddrV4};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> knx_tunnel::Result<()> {
//! let local = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 50), 50000);
//! let gateway = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 3671);
//! let (transport, mut peer) = MockTransport::pair(local);
//!
//! transport.send_to(&[0x06, 0x10], gateway).await?;
//! assert_eq!(peer.try_next_sent(), Some((vec![0x06, 0x10], gateway)));
//!
//! peer.deliver(&[0x06, 0x10], gateway);
//! let mut buf = [0u8; 8];
//! let (len, from) = transport.recv_from(&mut buf).await?;
//! assert_eq!((len, from), (2, gateway));
//! # Ok(())
//! # }
//! ```

use crate::error::{KnxError, Result};
use crate::net::transport::AsyncTransport;
use std::net::SocketAddrV4;
use tokio::sync::{mpsc, Mutex};

/// Datagram with its peer address
pub type Datagram = (Vec<u8>, SocketAddrV4);

/// In-memory [`AsyncTransport`]
#[derive(Debug)]
pub struct MockTransport {
    local: SocketAddrV4,
    sent: mpsc::UnboundedSender<Datagram>,
    inbound: Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

/// Test side of a [`MockTransport`]
#[derive(Debug)]
pub struct MockPeer {
    local: SocketAddrV4,
    inbound: mpsc::UnboundedSender<Datagram>,
    sent: mpsc::UnboundedReceiver<Datagram>,
}

impl MockTransport {
    /// Create a transport reporting `local` as its endpoint, and its peer
    pub fn pair(local: SocketAddrV4) -> (Self, MockPeer) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                local,
                sent: sent_tx,
                inbound: Mutex::new(inbound_rx),
            },
            MockPeer {
                local,
                inbound: inbound_tx,
                sent: sent_rx,
            },
        )
    }
}

impl AsyncTransport for MockTransport {
    fn local_endpoint(&self) -> Result<SocketAddrV4> {
        Ok(self.local)
    }

    async fn send_to(&self, data: &[u8], target: SocketAddrV4) -> Result<()> {
        self.sent.send((data.to_vec(), target)).ok().ok_or_else(|| {
            KnxError::send_failed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock peer dropped",
            ))
        })
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddrV4)> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some((data, from)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, from))
            }
            // Peer gone: behave like a socket nobody writes to
            None => core::future::pending().await,
        }
    }
}

impl MockPeer {
    /// Endpoint of the transport this peer belongs to
    pub const fn local_endpoint(&self) -> SocketAddrV4 {
        self.local
    }

    /// Make `data` arrive at the transport as if sent from `from`.
    ///
    /// Returns `false` once the transport was dropped.
    pub fn deliver(&self, data: &[u8], from: SocketAddrV4) -> bool {
        self.inbound.send((data.to_vec(), from)).is_ok()
    }

    /// Wait for the next datagram the transport sent
    pub async fn next_sent(&mut self) -> Option<Datagram> {
        self.sent.recv().await
    }

    /// Next datagram the transport sent, if one is queued
    pub fn try_next_sent(&mut self) -> Option<Datagram> {
        self.sent.try_recv().ok()
    }

    /// All datagrams queued so far
    pub fn drain_sent(&mut self) -> Vec<Datagram> {
        core::iter::from_fn(|| self.try_next_sent()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn local() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 50), 50000)
    }

    fn gateway() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 3671)
    }

    #[tokio::test]
    async fn test_mock_send_receive() {
        let (transport, mut peer) = MockTransport::pair(local());
        assert_eq!(transport.local_endpoint().unwrap(), local());
        assert_eq!(peer.local_endpoint(), local());

        transport.send_to(&[0xAA, 0xBB], gateway()).await.unwrap();
        assert_eq!(peer.next_sent().await, Some((vec![0xAA, 0xBB], gateway())));

        assert!(peer.deliver(&[0x01, 0x02, 0x03], gateway()));
        let mut buf = [0u8; 10];
        let (n, from) = transport.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x02, 0x03]);
        assert_eq!(from, gateway());
    }

    #[tokio::test]
    async fn test_mock_fifo_order() {
        let (transport, peer) = MockTransport::pair(local());
        for byte in 1..=3u8 {
            peer.deliver(&[byte], gateway());
        }

        let mut buf = [0u8; 10];
        for byte in 1..=3u8 {
            transport.recv_from(&mut buf).await.unwrap();
            assert_eq!(buf[0], byte);
        }
    }

    #[tokio::test]
    async fn test_mock_truncates_to_buffer() {
        let (transport, peer) = MockTransport::pair(local());
        peer.deliver(&[1, 2, 3, 4], gateway());

        let mut buf = [0u8; 2];
        let (n, _) = transport.recv_from(&mut buf).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(buf, [1, 2]);
    }

    #[tokio::test]
    async fn test_mock_peer_dropped() {
        let (transport, peer) = MockTransport::pair(local());
        drop(peer);

        let KnxError::Transport(_) = transport.send_to(&[1], gateway()).await.unwrap_err() else {
            panic!("expected transport error");
        };

        let mut buf = [0u8; 4];
        let recv = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            transport.recv_from(&mut buf),
        )
        .await;
        assert!(recv.is_err());
    }

    #[tokio::test]
    async fn test_drain_sent() {
        let (transport, mut peer) = MockTransport::pair(local());
        transport.send_to(&[1], gateway()).await.unwrap();
        transport.send_to(&[2], gateway()).await.unwrap();
        assert_eq!(peer.drain_sent().len(), 2);
        assert_eq!(peer.try_next_sent(), None);
    }
}
