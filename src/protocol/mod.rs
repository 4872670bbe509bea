//! KNXnet/IP protocol implementation.
//!
//! This module contains the wire structures (KNXnet/IP frames, cEMI
//! messages, KNX telegrams) and the sans-IO tunneling connection that
//! drives them.

pub mod cemi;
pub mod constants;
pub mod frame;
pub mod heartbeat;
pub mod pending;
pub mod retry;
pub mod services;
pub mod telegram;
pub mod tunnel;

pub use cemi::*;
pub use constants::*;
pub use frame::*;
pub use services::*;
pub use telegram::*;
pub use tunnel::*;
