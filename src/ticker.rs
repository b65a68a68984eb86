//! Cancellable repeating timer.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// A task that runs a callback every `period` until cancelled or dropped.
///
/// The first callback fires one full `period` after [`spawn`](Ticker::spawn),
/// not immediately. Missed ticks are delayed rather than burst.
#[derive(Debug)]
pub struct Ticker {
    name: &'static str,
    task: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawn the ticker on the current tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        debug!("ticker {name}: scheduled every {period:?}");
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                on_tick().await;
            }
        });
        Self {
            name,
            task: Some(task),
        }
    }

    /// Stop the ticker. A callback already in progress is dropped at its next
    /// await point.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("ticker {}: cancelled", self.name);
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}
