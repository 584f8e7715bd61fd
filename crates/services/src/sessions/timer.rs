use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Handle to a spawned countdown ticker.
///
/// Cancelling (or just dropping) the handle aborts the underlying task, so
/// no tick can outlive the session it was armed for.
#[derive(Debug)]
pub struct TickerHandle {
    task: JoinHandle<()>,
}

impl TickerHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn a repeating tick on the given period (one second in production).
///
/// The receiver yields one unit per elapsed period. The task exits on its
/// own when the receiver is dropped.
#[must_use]
pub fn spawn_ticker(period: Duration) -> (TickerHandle, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    let task = tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it so the stream
        // starts one full period from now.
        interval.tick().await;
        loop {
            interval.tick().await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
    (TickerHandle { task }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_period() {
        let (_handle, mut ticks) = spawn_ticker(Duration::from_secs(1));
        for _ in 0..3 {
            assert_eq!(ticks.recv().await, Some(()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_stream() {
        let (handle, mut ticks) = spawn_ticker(Duration::from_secs(1));
        assert_eq!(ticks.recv().await, Some(()));
        handle.cancel();
        assert_eq!(ticks.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_the_stream() {
        let (handle, mut ticks) = spawn_ticker(Duration::from_secs(1));
        drop(handle);
        assert_eq!(ticks.recv().await, None);
    }
}
