/*
[INPUT]:  StreamClient, one WatchConfig per task, CancellationToken
[OUTPUT]: Logged update summaries; reconnect-with-backoff on transport failures
[POS]:    Runtime layer - one long-lived watch loop per configured stream
[UPDATE]: When changing retry policy, summaries or shutdown semantics
*/

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wirebook_adapter::{OrderStatus, StreamClient, StreamUpdate, WirebookError};

use crate::config::WatchConfig;

const MAX_BACKOFF_SECS: u64 = 30;

/// Why a watch loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum WatchExit {
    Shutdown,
    Failed(WirebookError),
}

/// 1s, 2s, 4s ... capped at 30s
pub fn backoff_duration(retry_count: u32) -> Duration {
    let exp = retry_count.saturating_sub(1).min(63);
    let secs = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
    Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}

fn fmt_decimal(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.normalize().to_string())
}

/// One-line description of an update for the log
pub fn summarize(update: &StreamUpdate, limit: Option<usize>) -> String {
    match update {
        StreamUpdate::OrderBook(book) => {
            let view = book.limited(limit);
            format!(
                "bid {} ask {} spread {} depth {}/{} seq {}",
                fmt_decimal(view.best_bid().map(|l| l.price)),
                fmt_decimal(view.best_ask().map(|l| l.price)),
                fmt_decimal(view.spread()),
                view.bids.len(),
                view.asks.len(),
                view.nonce.map_or_else(|| "-".to_string(), |n| n.to_string()),
            )
        }
        StreamUpdate::Trades(trades) => format!(
            "{} trades, last {}",
            trades.len(),
            fmt_decimal(trades.last().map(|t| t.price))
        ),
        StreamUpdate::Ohlcv(candles) => format!(
            "{} candles, last close {}",
            candles.len(),
            fmt_decimal(candles.last().map(|c| c.close))
        ),
        StreamUpdate::Ticker(ticker) => format!(
            "last {} bid {} ask {}",
            fmt_decimal(ticker.last),
            fmt_decimal(ticker.bid),
            fmt_decimal(ticker.ask)
        ),
        StreamUpdate::Orders(orders) => {
            let open = orders
                .iter()
                .filter(|o| o.status == OrderStatus::Open)
                .count();
            format!("{} orders, {open} open", orders.len())
        }
        StreamUpdate::Positions(positions) => {
            let contracts: Decimal = positions.iter().map(|p| p.contracts).sum();
            format!(
                "{} positions, {} contracts",
                positions.len(),
                contracts.normalize()
            )
        }
        StreamUpdate::Balance(balances) => {
            let shown: Vec<String> = balances
                .currencies
                .iter()
                .take(limit.unwrap_or(usize::MAX))
                .map(|(currency, balance)| {
                    format!(
                        "{currency} free={} total={}",
                        fmt_decimal(balance.free),
                        fmt_decimal(balance.total)
                    )
                })
                .collect();
            format!("{} currencies: {}", balances.currencies.len(), shown.join(", "))
        }
    }
}

/// Follows one stream until shutdown or a non-retryable failure
pub struct Watcher {
    client: Arc<StreamClient>,
    watch: WatchConfig,
    shutdown: CancellationToken,
}

impl Watcher {
    pub fn new(client: Arc<StreamClient>, watch: WatchConfig, shutdown: CancellationToken) -> Self {
        Self {
            client,
            watch,
            shutdown,
        }
    }

    pub async fn run(self) -> WatchExit {
        let label = self.watch.label();
        let kind = self.watch.channel.kind();
        let mut retry_count: u32 = 0;
        let mut updates: u64 = 0;

        info!(watch = %label, "watch started");
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!(watch = %label, updates, "watch stopped");
                    return WatchExit::Shutdown;
                }
                next = self.client.watch(
                    kind,
                    self.watch.symbol.as_deref(),
                    self.watch.timeframe.as_deref(),
                ) => next,
            };

            match next {
                Ok(update) => {
                    retry_count = 0;
                    updates += 1;
                    info!(
                        watch = %label,
                        updates,
                        summary = %summarize(&update, self.watch.limit),
                        "update"
                    );
                }
                Err(err) if err.is_retryable() => {
                    retry_count = retry_count.saturating_add(1);
                    let backoff = backoff_duration(retry_count);
                    warn!(watch = %label, retry_count, ?backoff, error = %err, "watch interrupted; resubscribing after backoff");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            info!(watch = %label, updates, "watch stopped");
                            return WatchExit::Shutdown;
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    debug!(watch = %label, retry_count, "resubscribing");
                }
                Err(err) => {
                    warn!(watch = %label, error = %err, "watch failed");
                    return WatchExit::Failed(err);
                }
            }
        }
    }
}

/// One task per configured watch
pub fn spawn_watchers(
    client: Arc<StreamClient>,
    watches: Vec<WatchConfig>,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<WatchExit>> {
    watches
        .into_iter()
        .map(|watch| {
            let watcher = Watcher::new(client.clone(), watch, shutdown.clone());
            tokio::spawn(watcher.run())
        })
        .collect()
}
