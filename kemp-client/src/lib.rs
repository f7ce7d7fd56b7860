//! KEMP LoadMaster statistics client.
//!
//! This crate provides the statistics source consumed by the exporter:
//!
//! - [`stats`] - Snapshot data model (`Snapshot`, `Totals`, per-server records)
//! - [`client`] - `StatisticsSource` trait and the HTTP `LoadMasterClient`
//! - [`error`] - Error types

pub mod client;
pub mod error;
pub mod stats;

pub use client::{Credentials, LoadMasterClient, StatisticsSource};
pub use error::{ClientError, Result};
pub use stats::{
    RealServerStat, ServerCounters, ServerStat, Snapshot, Totals, VirtualServerStat,
};
