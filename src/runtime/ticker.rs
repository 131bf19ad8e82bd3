//! Settlement retry ticker.
//!
//! Polls a check function at a fixed interval until the check reports
//! success, the deadline passes, or someone cancels the ticker. Used to
//! watch invoices on nodes that can't push a webhook.

use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Interval used when none is configured.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// How a ticker run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerOutcome {
    /// The check succeeded or the ticker was cancelled from outside.
    Cancelled,
    /// The deadline passed first.
    DeadlineExceeded,
}

/// A single polling run. Discarded after it ends.
#[derive(Debug, Clone)]
pub struct RetryTicker {
    name: String,
    interval: Duration,
    deadline: Duration,
    cancel: CancellationToken,
}

impl RetryTicker {
    pub fn new(name: impl Into<String>, interval: Duration, deadline: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_RETRY_INTERVAL
        } else {
            interval
        };

        Self {
            name: name.into(),
            interval,
            deadline,
            cancel: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token that stops the ticker when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until settled, cancelled or out of time.
    ///
    /// `check` runs once per tick, the first tick one interval after the
    /// start. Returning `ControlFlow::Break(())` means settled: `on_settled`
    /// runs and the ticker ends as [`TickerOutcome::Cancelled`]. When the
    /// deadline passes `on_deadline` runs instead, even while a check is
    /// still in flight; that check is dropped. An external cancel ends the
    /// run without calling either.
    pub async fn run<C, Fut, S, D>(self, mut check: C, on_settled: S, on_deadline: D) -> TickerOutcome
    where
        C: FnMut() -> Fut,
        Fut: Future<Output = ControlFlow<()>>,
        S: FnOnce(),
        D: FnOnce(),
    {
        let start = Instant::now();
        let deadline = start + self.deadline;
        let mut ticks = interval_at(start + self.interval, self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let deadline_sleep = sleep_until(deadline);
        tokio::pin!(deadline_sleep);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("Ticker {} cancelled", self.name);
                    return TickerOutcome::Cancelled;
                }
                _ = &mut deadline_sleep => {
                    debug!("Ticker {} hit its deadline", self.name);
                    on_deadline();
                    return TickerOutcome::DeadlineExceeded;
                }
                _ = ticks.tick() => {
                    let flow = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return TickerOutcome::Cancelled,
                        _ = &mut deadline_sleep => {
                            debug!("Ticker {} hit its deadline during a check", self.name);
                            on_deadline();
                            return TickerOutcome::DeadlineExceeded;
                        }
                        flow = check() => flow,
                    };
                    if flow.is_break() {
                        self.cancel.cancel();
                        on_settled();
                        return TickerOutcome::Cancelled;
                    }
                }
            }
        }
    }
}

/// Named tickers owned by the bot instance.
///
/// Starting a ticker under a name that is already running cancels the old
/// one, so a user pressing "check again" never ends up with two pollers.
#[derive(Clone, Default)]
pub struct TickerRegistry {
    running: Arc<Mutex<HashMap<String, (u64, CancellationToken)>>>,
    next_id: Arc<AtomicU64>,
}

impl TickerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `ticker` on the runtime and track it by name.
    pub fn spawn<C, Fut, S, D>(
        &self,
        ticker: RetryTicker,
        check: C,
        on_settled: S,
        on_deadline: D,
    ) -> tokio::task::JoinHandle<TickerOutcome>
    where
        C: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
        S: FnOnce() + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        let name = ticker.name().to_string();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let previous = self
            .running
            .lock()
            .insert(name.clone(), (id, ticker.cancel_token()));
        if let Some((_, token)) = previous {
            debug!("Replacing running ticker {}", name);
            token.cancel();
        }

        let registry = self.clone();
        tokio::spawn(async move {
            let outcome = ticker.run(check, on_settled, on_deadline).await;
            registry.forget(&name, id);
            outcome
        })
    }

    /// Cancel the ticker running under `name`, if any.
    pub fn cancel(&self, name: &str) -> bool {
        match self.running.lock().remove(name) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running.lock().contains_key(name)
    }

    /// Remove `name` unless a newer run has taken it over.
    fn forget(&self, name: &str, id: u64) {
        let mut running = self.running.lock();
        if running.get(name).is_some_and(|(current, _)| *current == id) {
            running.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_without_settlement() {
        let calls = Arc::new(AtomicUsize::new(0));
        let deadline_hits = Arc::new(AtomicUsize::new(0));
        let settled_hits = Arc::new(AtomicUsize::new(0));

        let ticker = RetryTicker::new("never", Duration::from_secs(1), Duration::from_secs(10));
        let outcome = {
            let calls = calls.clone();
            let deadline_hits = deadline_hits.clone();
            let settled_hits = settled_hits.clone();
            ticker
                .run(
                    move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async { ControlFlow::Continue(()) }
                    },
                    move || {
                        settled_hits.fetch_add(1, Ordering::SeqCst);
                    },
                    move || {
                        deadline_hits.fetch_add(1, Ordering::SeqCst);
                    },
                )
                .await
        };

        assert_eq!(outcome, TickerOutcome::DeadlineExceeded);
        assert_eq!(deadline_hits.load(Ordering::SeqCst), 1);
        assert_eq!(settled_hits.load(Ordering::SeqCst), 0);

        // Ticks at 1..=9s; the deadline wins the tie at 10s.
        let made = calls.load(Ordering::SeqCst);
        assert!((9..=10).contains(&made), "check ran {} times", made);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), made);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settlement_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let deadline_hit = Arc::new(AtomicUsize::new(0));
        let settled = Arc::new(AtomicUsize::new(0));

        let ticker = RetryTicker::new("settles", Duration::from_secs(1), Duration::from_secs(10));
        let token = ticker.cancel_token();
        let outcome = {
            let calls = calls.clone();
            let settled = settled.clone();
            let deadline_hit = deadline_hit.clone();
            ticker
                .run(
                    move || {
                        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        async move {
                            if n == 3 {
                                ControlFlow::Break(())
                            } else {
                                ControlFlow::Continue(())
                            }
                        }
                    },
                    move || {
                        settled.fetch_add(1, Ordering::SeqCst);
                    },
                    move || {
                        deadline_hit.fetch_add(1, Ordering::SeqCst);
                    },
                )
                .await
        };

        assert_eq!(outcome, TickerOutcome::Cancelled);
        assert!(token.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(settled.load(Ordering::SeqCst), 1);
        assert_eq!(deadline_hit.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_slow_check() {
        let settled = Arc::new(AtomicUsize::new(0));
        let deadline_hit = Arc::new(AtomicUsize::new(0));

        let start = Instant::now();
        let ticker = RetryTicker::new("slow", Duration::from_secs(5), Duration::from_secs(10));
        let outcome = {
            let settled = settled.clone();
            let deadline_hit = deadline_hit.clone();
            ticker
                .run(
                    || async {
                        tokio::time::sleep(Duration::from_secs(9)).await;
                        ControlFlow::Break(())
                    },
                    move || {
                        settled.fetch_add(1, Ordering::SeqCst);
                    },
                    move || {
                        deadline_hit.fetch_add(1, Ordering::SeqCst);
                    },
                )
                .await
        };

        assert_eq!(outcome, TickerOutcome::DeadlineExceeded);
        let ended = start.elapsed();
        assert!(ended >= Duration::from_secs(10) && ended < Duration::from_secs(11), "ended at {:?}", ended);
        assert_eq!(deadline_hit.load(Ordering::SeqCst), 1);
        assert_eq!(settled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancel() {
        let registry = TickerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let deadline_hit = Arc::new(AtomicUsize::new(0));

        let handle = {
            let calls = calls.clone();
            let deadline_hit = deadline_hit.clone();
            registry.spawn(
                RetryTicker::new("user:1", Duration::from_secs(1), Duration::from_secs(10)),
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { ControlFlow::Continue(()) }
                },
                || {},
                move || {
                    deadline_hit.fetch_add(1, Ordering::SeqCst);
                },
            )
        };

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(registry.cancel("user:1"));

        assert_eq!(handle.await.unwrap(), TickerOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(deadline_hit.load(Ordering::SeqCst), 0);
        assert!(!registry.is_running("user:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_name_replaces_previous_run() {
        let registry = TickerRegistry::new();

        let first = registry.spawn(
            RetryTicker::new("node:1", Duration::from_secs(1), Duration::from_secs(10)),
            || async { ControlFlow::Continue(()) },
            || {},
            || {},
        );
        let second = registry.spawn(
            RetryTicker::new("node:1", Duration::from_secs(1), Duration::from_secs(3)),
            || async { ControlFlow::Continue(()) },
            || {},
            || {},
        );

        assert_eq!(first.await.unwrap(), TickerOutcome::Cancelled);
        assert!(registry.is_running("node:1"));
        assert_eq!(second.await.unwrap(), TickerOutcome::DeadlineExceeded);
        assert!(!registry.is_running("node:1"));
    }
}
