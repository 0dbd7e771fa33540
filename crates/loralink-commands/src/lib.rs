//! Command correlation for the LoraLink control plane.
//!
//! Gateways only speak pub/sub: a command goes out on
//! `gateway/{id}/command`, the answer eventually comes back on
//! `gateway/{id}/response`, unordered, possibly duplicated, possibly never.
//! This crate deterministically matches each command to its reply:
//!
//! - [`CorrelationIdGenerator`]: unique ids for in-flight commands.
//! - [`CommandCorrelator`]: tracks pending commands and races response
//!   arrival against a per-command deadline, settling each exactly once.
//! - [`ResponseDemultiplexer`]: the single wildcard subscription that parses
//!   inbound responses and forwards them to the correlator.
//!
//! The correlator's `send` is the one operation the rest of the system
//! consumes; enrollment, unenrollment and relay control all go through it.

pub mod correlation;
pub mod correlator;
pub mod demux;

// Re-exports
pub use correlation::CorrelationIdGenerator;
pub use correlator::{
    CommandCorrelator, CommandError, CorrelatorStats, PendingCommandInfo, SettleOutcome,
};
pub use demux::{DemuxStats, ResponseDemultiplexer};
