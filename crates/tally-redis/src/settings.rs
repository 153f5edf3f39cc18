//! Redis Streams キューの設定

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    /// Stream key holding queued votes.
    pub stream: String,
    /// Consumer group shared by all workers.
    pub group: String,
    /// How long an `XREADGROUP` may block.
    pub block: Duration,
    /// Pending entries idle longer than this are re-claimed by another consumer.
    pub claim_idle: Duration,
    /// Per-command allowance on top of `block`.
    pub op_timeout: Duration,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            stream: "votes".to_string(),
            group: "tally-workers".to_string(),
            block: Duration::from_secs(5),
            claim_idle: Duration::from_secs(30),
            op_timeout: Duration::from_secs(2),
        }
    }
}
