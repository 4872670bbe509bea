//! KNX addressing system.
//!
//! KNX uses two types of addresses:
//! - Physical addresses for devices (Area.Line.Member)
//! - Group addresses for logical grouping (Main/Middle/Sub or Main/Sub)

pub mod group;
pub mod physical;

pub use group::GroupAddress;
pub use physical::PhysicalAddress;
