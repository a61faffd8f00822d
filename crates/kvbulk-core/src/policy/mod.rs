//! Policy engine — admission and retry rules for chunk lineages.
//!
//! ```text
//! Chunk → [ConcurrencyGate] → [RetryPolicy] → [ChunkWriter]
//! ```

pub mod gate;
pub mod retry;

pub use gate::{ConcurrencyGate, GateClosed, GatePermit};
pub use retry::{RetryConfig, RetryPolicy};
