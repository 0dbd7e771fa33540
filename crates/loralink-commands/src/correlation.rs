//! Correlation id generation.
//!
//! Ids only need to be unique among *currently pending* commands, but they
//! must stay unique under concurrent `send` calls. A wall-clock-millisecond
//! id is not (two calls in the same millisecond collide and the second
//! response would settle the wrong command). A process-wide monotonic counter
//! is, and its decimal rendering stays wire-compatible with the numeric
//! string ids deployed gateways already echo back.

use std::sync::atomic::{AtomicU64, Ordering};

use loralink_core::CorrelationId;

/// Monotonic correlation id source.
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    counter: AtomicU64,
}

impl CorrelationIdGenerator {
    /// Create a generator starting at 1.
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }

    /// Produce the next id.
    pub fn next_id(&self) -> CorrelationId {
        self.counter.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
