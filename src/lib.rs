#![doc = include_str!("../README.md")]

//! # knx-tunnel
//!
//! KNXnet/IP tunneling client for std + tokio.
//!
//! The crate is split in two layers:
//!
//! - [`protocol`]: wire codecs and the sans-IO [`TunnelConnection`], driven
//!   by explicit instants and usable with any runtime
//! - [`driver`]: a tokio task that owns two UDP sockets and feeds them into
//!   the connection, exposed through the cloneable [`KnxIpDriver`]
//!
//! ## Features
//!
//! - KNXnet/IP tunneling (connect, heartbeat, disconnect)
//! - Reliable send with bounded retransmission and bus confirmation
//! - Group and individual addressing
//! - `log` logging, or `tracing` with the `tracing` feature
//!
//! ## Example
//!
//! ```rust,no_run
//! use knx_tunnel::{DriverConfig, GroupAddress, KnxIpDriver, Telegram};
//! use std::net::Ipv4Addr;
//!
//! # async fn demo() -> knx_tunnel::Result<()> {
//! let driver = KnxIpDriver::new(DriverConfig::new(Ipv4Addr::new(192, 168, 1, 10)));
//! driver.connect().await?;
//! driver
//!     .send(Telegram::group_write(GroupAddress::new(1, 2, 3)?, &[1])?)
//!     .await?;
//! driver.disconnect().await?;
//! # Ok(())
//! # }
//! ```

// Macro modules (must be declared before use)
#[macro_use]
pub mod logging;

pub mod addressing;
pub mod config;
pub mod driver;
pub mod error;
pub mod net;
pub mod protocol;

// Re-export commonly used types
#[doc(inline)]
pub use addressing::{GroupAddress, PhysicalAddress};
#[doc(inline)]
pub use config::DriverConfig;
#[doc(inline)]
pub use driver::{Driver, DriverEvent, KnxIpDriver};
#[doc(inline)]
pub use error::{KnxError, Result};
#[doc(inline)]
pub use protocol::constants::{CemiMessageCode, Command, Priority, ServiceType};
#[doc(inline)]
pub use protocol::services::Packet;
#[doc(inline)]
pub use protocol::telegram::Telegram;
#[doc(inline)]
pub use protocol::tunnel::{ConnectionState, DisconnectReason, TunnelConnection};
