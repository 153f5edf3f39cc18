//! tally-redis
//!
//! Redis Streams implementation of the durable vote queue ports
//! (`VotePublisher`, `VoteSource`, `Delivery`).

pub mod queue;
pub mod settings;

pub use self::queue::{PAYLOAD_FIELD, RedisVoteQueue, RedisVoteSource};
pub use self::settings::RedisSettings;
