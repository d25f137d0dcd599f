//! Cancellable background tasks.
//!
//! Every timer or step driver the session starts is wrapped in a
//! [`TaskHandle`]; cancelling or dropping the handle stops the task.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use log::trace;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a spawned task that can be invalidated by its owner.
pub struct TaskHandle {
    name: &'static str,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawn `f` on `runtime`, passing it the task's cancellation token.
    pub fn spawn<F, Fut>(runtime: &Handle, name: &'static str, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let task = runtime.spawn(f(token.clone()));
        trace!("[Task] Spawned {}", name);
        Self {
            name,
            token,
            task: Some(task),
        }
    }

    /// Run `tick` every `period`, starting one period from now.
    ///
    /// The timer stops for good when `tick` returns `Break` or the handle is
    /// cancelled. Ticks never overlap.
    pub fn repeating<T>(runtime: &Handle, name: &'static str, period: Duration, mut tick: T) -> Self
    where
        T: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        Self::spawn(runtime, name, move |token| async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if tick().is_break() {
                            break;
                        }
                    }
                }
            }
            trace!("[Task] {} finished", name);
        })
    }

    /// Token observed by the task.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the task has run to completion (or been aborted).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Cancel the task. Safe to call more than once.
    pub fn cancel(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
            trace!("[Task] Cancelled {}", self.name);
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_repeating_ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut handle = TaskHandle::repeating(&Handle::current(), "test", Duration::from_millis(50), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });

        tokio::time::sleep(Duration::from_millis(175)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_stops_on_break() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = TaskHandle::repeating(&Handle::current(), "test", Duration::from_millis(10), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_drop_cancels_token() {
        let handle = TaskHandle::spawn(&Handle::current(), "test", |token| async move {
            token.cancelled().await;
        });
        let token = handle.token().clone();
        drop(handle);
        assert!(token.is_cancelled());
    }
}
