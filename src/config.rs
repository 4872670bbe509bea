//! Driver configuration.
//!
//! A [`DriverConfig`] is built in code with [`DriverConfig::new`] and the
//! `with_*` setters, or loaded from `KEY=VALUE` text:
//!
//! ```text
//! # gateway
//! KNX_GATEWAY_IP=192.168.1.10
//! KNX_GATEWAY_PORT=3671
//! KNX_LOCAL_IP=192.168.1.50
//! KNX_MAX_REPEATS=6
//! ```
//!
//! Only the gateway address is required.

use crate::error::{KnxError, Result};
use crate::protocol::constants::KNXNETIP_DEFAULT_PORT;
use crate::protocol::tunnel::{
    TunnelSettings, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_REPEATS, DEFAULT_RETRY_INTERVAL,
};
use core::str::FromStr;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

/// Gateway IPv4 address
pub const KEY_GATEWAY_IP: &str = "KNX_GATEWAY_IP";
/// Gateway UDP port
pub const KEY_GATEWAY_PORT: &str = "KNX_GATEWAY_PORT";
/// Local IPv4 address to bind to
pub const KEY_LOCAL_IP: &str = "KNX_LOCAL_IP";
/// Transmissions per request
pub const KEY_MAX_REPEATS: &str = "KNX_MAX_REPEATS";

/// Tunneling driver settings
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriverConfig {
    remote_address: Ipv4Addr,
    remote_port: u16,
    local_address: Option<Ipv4Addr>,
    max_repeats: u8,
    retry_interval: Duration,
    heartbeat_interval: Duration,
}

impl DriverConfig {
    /// Configuration for the gateway at `remote_address` with defaults
    pub const fn new(remote_address: Ipv4Addr) -> Self {
        Self {
            remote_address,
            remote_port: KNXNETIP_DEFAULT_PORT,
            local_address: None,
            max_repeats: DEFAULT_MAX_REPEATS,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Gateway UDP port
    #[must_use]
    pub const fn with_remote_port(mut self, port: u16) -> Self {
        self.remote_port = port;
        self
    }

    /// Bind the sockets to this address instead of auto-detecting it
    #[must_use]
    pub const fn with_local_address(mut self, address: Ipv4Addr) -> Self {
        self.local_address = Some(address);
        self
    }

    /// Transmissions per request, including the first one.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for 0.
    pub fn with_max_repeats(mut self, max_repeats: u8) -> Result<Self> {
        if max_repeats == 0 {
            return Err(KnxError::invalid_max_repeats());
        }
        self.max_repeats = max_repeats;
        Ok(self)
    }

    /// Time between retransmissions
    #[must_use]
    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Time between a heartbeat response and the next request
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Gateway IPv4 address
    pub const fn remote_address(&self) -> Ipv4Addr {
        self.remote_address
    }

    /// Gateway UDP port
    pub const fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Gateway socket address
    pub const fn gateway(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.remote_address, self.remote_port)
    }

    /// Configured local address, `None` means auto-detect
    pub const fn local_address(&self) -> Option<Ipv4Addr> {
        self.local_address
    }

    /// Transmissions per request
    pub const fn max_repeats(&self) -> u8 {
        self.max_repeats
    }

    /// Time between retransmissions
    pub const fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Time between a heartbeat response and the next request
    pub const fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Timing parameters for the protocol state machine
    pub const fn tunnel_settings(&self) -> TunnelSettings {
        TunnelSettings {
            max_repeats: self.max_repeats,
            retry_interval: self.retry_interval,
            heartbeat_interval: self.heartbeat_interval,
        }
    }

    /// Parse `KEY=VALUE` lines.
    ///
    /// Blank lines and lines starting with `#` are skipped, unknown keys are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `KNX_GATEWAY_IP` is missing or a
    /// value does not parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use knx_tunnel::DriverConfig;
    ///
    /// let config = DriverConfig::from_env_str("KNX_GATEWAY_IP=192.168.1.10\n")?;
    /// assert_eq!(config.remote_port(), 3671);
    /// # Ok::<(), knx_tunnel::KnxError>(())
    /// ```
    pub fn from_env_str(text: &str) -> Result<Self> {
        let lookup = |key: &str| {
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .filter_map(|line| line.split_once('='))
                .find(|(name, _)| name.trim() == key)
                .map(|(_, value)| value.trim().to_owned())
        };
        Self::from_lookup(lookup)
    }

    /// Read the same keys from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let remote = lookup(KEY_GATEWAY_IP).ok_or_else(KnxError::missing_remote_address)?;
        let mut config = Self::new(parse_value(&remote)?);

        if let Some(port) = lookup(KEY_GATEWAY_PORT) {
            config = config.with_remote_port(parse_value(&port)?);
        }
        if let Some(local) = lookup(KEY_LOCAL_IP) {
            config = config.with_local_address(parse_value(&local)?);
        }
        if let Some(repeats) = lookup(KEY_MAX_REPEATS) {
            config = config.with_max_repeats(parse_value(&repeats)?)?;
        }
        Ok(config)
    }
}

fn parse_value<T: FromStr>(value: &str) -> Result<T> {
    value
        .parse()
        .ok()
        .ok_or_else(KnxError::invalid_config_value)
}
