//! Shared vocabulary for the pulsemon workspace.
//!
//! Holds the status/ping/flip enums that the storage, alerting, and
//! notification crates exchange, plus id generation helpers. No I/O here.

pub mod id;
pub mod types;

/// Flips older than this are pruned. System-wide hard constant.
pub const FLIP_RETENTION_DAYS: i64 = 93;

/// How many pings each check retains; older pings are pruned on write.
pub const PING_RETENTION: u64 = 100;

/// Ping bodies up to this size are stored inline; larger bodies are
/// offloaded to the object body store.
pub const MAX_INLINE_BODY: usize = 100;
