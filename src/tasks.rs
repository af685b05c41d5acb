//! Periodic background tasks (discovery broadcasts, heartbeats).

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Handle to a spawned periodic task. The task stops when [`TaskHandle::shutdown`]
/// is called or the handle is dropped.
pub struct TaskHandle {
    stop: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.join.await;
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Run `tick` every `period` until shut down. A tick that overruns the
/// period is not replayed; the schedule skips ahead.
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let (stop, mut stopped) = watch::channel(false);
    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    tick().await;
                }
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        tracing::debug!(task = name, "periodic task stopped");
                        break;
                    }
                }
            }
        }
    });
    TaskHandle { stop, join }
}
