//! Cyclic updates
//!
//! Anything that refreshes itself from hardware on a fixed cadence implements
//! [`Cyclic`]. An [`UpdateLoop`] drives one target:
//!
//! ```text
//! tick ──► update() ──► tick ──► update() ──► ... ──► stop()
//! ```
//!
//! Ticks come from a `tokio::time::interval` with [`MissedTickBehavior::Skip`]:
//! when an update takes longer than the interval, the missed ticks are
//! dropped and the next update starts on the original tick grid, so a slow
//! device never causes a burst of back-to-back updates.
//!
//! A failing update is logged and the loop carries on with the next tick.

use crate::error::AppResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Smallest period a loop will run at
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A periodic, idempotent refresh.
#[async_trait]
pub trait Cyclic: Send + Sync {
    /// Refresh once.
    async fn update(&self) -> AppResult<()>;
}

/// Handle to a running update loop.
///
/// Dropping the handle signals the loop to stop without waiting for it.
pub struct UpdateLoop {
    name: String,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl UpdateLoop {
    /// Spawn a loop calling `target.update()` every `interval`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<C>(name: impl Into<String>, target: Arc<C>, interval: Duration) -> Self
    where
        C: Cyclic + ?Sized + 'static,
    {
        let name = name.into();
        let (stop_tx, stop_rx) = watch::channel(false);
        let period = interval.max(MIN_INTERVAL);
        let loop_name = name.clone();
        let handle = tokio::spawn(async move {
            run(&loop_name, target.as_ref(), period, stop_rx).await;
        });
        Self {
            name,
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Loop name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the loop task is still alive
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to stop and wait until it has.
    ///
    /// An update in progress is abandoned at its next suspension point.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(update_loop = %self.name, error = %e, "Update loop ended abnormally");
            }
        }
    }
}

impl Drop for UpdateLoop {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

async fn run<C>(name: &str, target: &C, period: Duration, mut stop_rx: watch::Receiver<bool>)
where
    C: Cyclic + ?Sized,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(update_loop = name, period_ms = period.as_millis() as u64, "Update loop started");

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            result = target.update() => {
                if let Err(e) = result {
                    warn!(update_loop = name, error = %e, "Update failed");
                }
            }
        }

        let elapsed = started.elapsed();
        if elapsed > period {
            debug!(
                update_loop = name,
                elapsed_ms = elapsed.as_millis() as u64,
                period_ms = period.as_millis() as u64,
                "Update overran its interval, skipping missed ticks"
            );
        }
    }

    info!(update_loop = name, "Update loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WavefinderError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        calls: AtomicUsize,
        work: Duration,
        fail: bool,
    }

    #[async_trait]
    impl Cyclic for Counter {
        async fn update(&self) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            if self.fail {
                return Err(WavefinderError::Instrument("device offline".into()));
            }
            Ok(())
        }
    }

    impl Counter {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_on_fixed_cadence() {
        let counter = Arc::new(Counter::default());
        let update_loop = UpdateLoop::spawn("counter", counter.clone(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(350)).await;
        // ticks at 0, 100, 200, 300
        assert_eq!(counter.calls(), 4);
        assert!(update_loop.is_running());
        update_loop.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_updates_after_stop() {
        let counter = Arc::new(Counter::default());
        let update_loop = UpdateLoop::spawn("counter", counter.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(150)).await;
        update_loop.stop().await;

        let seen = counter.calls();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.calls(), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_loop() {
        let counter = Arc::new(Counter::default());
        let update_loop = UpdateLoop::spawn("counter", counter.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(update_loop);

        // let the loop observe the signal
        tokio::time::sleep(Duration::from_millis(10)).await;
        let seen = counter.calls();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counter.calls(), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overruns_do_not_burst() {
        let counter = Arc::new(Counter {
            work: Duration::from_millis(250),
            ..Default::default()
        });
        let update_loop = UpdateLoop::spawn("slow", counter.clone(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        // each update spans three ticks; skipped ticks are not replayed
        let calls = counter.calls();
        assert!((3..=4).contains(&calls), "unexpected update count {calls}");
        update_loop.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_update_keeps_loop_alive() {
        let counter = Arc::new(Counter {
            fail: true,
            ..Default::default()
        });
        let update_loop = UpdateLoop::spawn("failing", counter.clone(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(counter.calls(), 5);
        assert!(update_loop.is_running());
        update_loop.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_hung_update() {
        let counter = Arc::new(Counter {
            work: Duration::from_secs(3600),
            ..Default::default()
        });
        let update_loop = UpdateLoop::spawn("hung", counter.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let started = Instant::now();
        update_loop.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(counter.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let counter = Arc::new(Counter::default());
        let update_loop = UpdateLoop::spawn("zero", counter.clone(), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(counter.calls() >= 1);
        update_loop.stop().await;
    }
}
