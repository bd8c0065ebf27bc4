//! Working memory entry.

use super::TtlTier;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single working-memory entry as persisted under the `wm:` prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemoryEntry {
    /// Logical key within the owning agent's namespace.
    pub key: String,
    /// Sanitized payload.
    pub payload: Value,
    /// Agent that wrote the entry.
    pub agent_id: String,
    /// TTL tier the entry was stored under.
    pub ttl_tier: TtlTier,
    /// Write timestamp (Unix epoch milliseconds).
    pub stored_at: u64,
    /// Whether the sanitizer modified the payload on the way in.
    #[serde(default)]
    pub sanitized: bool,
}
