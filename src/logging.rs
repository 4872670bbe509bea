//! Unified logging macro for the tunneling client.
//!
//! All log output of the crate goes through [`knx_log!`](crate::knx_log),
//! which selects the backend at compile time:
//!
//! - default: the `log` facade (nothing is printed until the application
//!   installs a logger, e.g. `env_logger`)
//! - `tracing` feature: `tracing` events
//!
//! # Usage
//!
//! ```rust,ignore
//! knx_log!(info, "Connected on channel {}", channel_id);
//! knx_log!(debug, "send: {}", packet);
//! knx_log!(warn, "Dropping datagram: {}", err);
//! ```

/// Unified logging macro, forwards to `log::` or `tracing::` based on features.
#[macro_export]
#[cfg(not(feature = "tracing"))]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { log::info!(target: "knx_tunnel", $($arg)*) };
    (debug, $($arg:tt)*) => { log::debug!(target: "knx_tunnel", $($arg)*) };
    (warn, $($arg:tt)*) => { log::warn!(target: "knx_tunnel", $($arg)*) };
    (error, $($arg:tt)*) => { log::error!(target: "knx_tunnel", $($arg)*) };
    (trace, $($arg:tt)*) => { log::trace!(target: "knx_tunnel", $($arg)*) };
}

#[macro_export]
#[cfg(feature = "tracing")]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { tracing::info!(target: "knx_tunnel", $($arg)*) };
    (debug, $($arg:tt)*) => { tracing::debug!(target: "knx_tunnel", $($arg)*) };
    (warn, $($arg:tt)*) => { tracing::warn!(target: "knx_tunnel", $($arg)*) };
    (error, $($arg:tt)*) => { tracing::error!(target: "knx_tunnel", $($arg)*) };
    (trace, $($arg:tt)*) => { tracing::trace!(target: "knx_tunnel", $($arg)*) };
}
