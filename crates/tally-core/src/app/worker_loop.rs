//! ConsumerGroup - 投票 consumer タスク群
//!
//! # フロー
//! 1. VoteSource::next_delivery() で 1 件取得（shutdown と競合させる）
//! 2. VoteProcessor::process() で最後まで処理（途中キャンセルしない）
//! 3. 次のメッセージへ
//!
//! shutdown 要求後は新しいメッセージを取らず、処理中の 1 件だけ完了させる。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::consumer::VoteProcessor;
use crate::ports::VoteSource;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// How long one pull may block waiting for a message.
    pub poll_wait: Duration,
    /// Extra allowance on top of `poll_wait` before a pull counts as hung.
    pub queue_timeout: Duration,
    /// Pause after a queue or storage failure.
    pub error_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_wait: Duration::from_secs(5),
            queue_timeout: Duration::from_secs(2),
            error_backoff: Duration::from_millis(500),
        }
    }
}

/// Consumer group handle.
/// - `request_shutdown()` で全 consumer が新規取得を止める
/// - `shutdown_and_join()` で処理中メッセージの完了まで待てる
pub struct ConsumerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ConsumerGroup {
    /// Spawns one consumer per source. Each source is that consumer's own
    /// connection; sources may point at the same queue.
    pub fn spawn(
        sources: Vec<Arc<dyn VoteSource>>,
        processor: Arc<VoteProcessor>,
        config: ConsumerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = sources
            .into_iter()
            .enumerate()
            .map(|(consumer_id, source)| {
                let processor = Arc::clone(&processor);
                let config = config.clone();
                let mut rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    consumer_loop(consumer_id, source, processor, config, &mut rx).await;
                })
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for every consumer to finish its current message.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "consumer task panicked");
            }
        }
    }
}

/// Sleeps for `d` unless shutdown arrives first. Returns true on shutdown.
async fn pause(d: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(d) => false,
        _ = shutdown_rx.changed() => true,
    }
}

async fn consumer_loop(
    consumer_id: usize,
    source: Arc<dyn VoteSource>,
    processor: Arc<VoteProcessor>,
    config: ConsumerConfig,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    info!(consumer_id, "consumer started");
    let pull_limit = config.poll_wait + config.queue_timeout;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // 取得は待つ可能性があるので shutdown と競合させる
        let pulled = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // sender dropped: nobody can ask us to stop any more
                    break;
                }
                continue;
            }
            pulled = tokio::time::timeout(pull_limit, source.next_delivery(config.poll_wait)) => pulled,
        };

        let delivery = match pulled {
            Ok(Ok(Some(delivery))) => delivery,
            Ok(Ok(None)) => continue,
            Ok(Err(e)) => {
                error!(consumer_id, error = %e, "vote queue unavailable");
                if pause(config.error_backoff, shutdown_rx).await {
                    break;
                }
                continue;
            }
            Err(_) => {
                warn!(consumer_id, limit = ?pull_limit, "vote queue pull timed out");
                continue;
            }
        };

        // ここから先は shutdown と競合させない（graceful drain）
        match processor.process(delivery).await {
            Ok(processed) => debug!(consumer_id, ?processed, "message done"),
            Err(e) => {
                warn!(consumer_id, stage = %e.stage(), error = %e, "message left unacknowledged");
                if pause(config.error_backoff, shutdown_rx).await {
                    break;
                }
            }
        }
    }

    info!(consumer_id, "consumer stopped");
}
