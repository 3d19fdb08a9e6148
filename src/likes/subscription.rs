use futures::Future;
use tokio::sync::{oneshot, watch};

type StopSignal = oneshot::Receiver<()>;

/// A background task that can be told to stop.
#[derive(Debug)]
struct Task {
    handle: Option<tokio::task::JoinHandle<()>>,
    stop: Option<oneshot::Sender<()>>,
}

impl Task {
    fn spawn<F>(f: impl FnOnce(StopSignal) -> F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (stop, signal) = oneshot::channel();
        let handle = tokio::spawn(f(signal));

        Self {
            handle: Some(handle),
            stop: Some(stop),
        }
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    async fn shutdown(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }
}

/// A live view of the global like count.
///
/// The first call to [Subscription::next] returns the count at the time of subscribing; every
/// later call waits for the count to change. Dropping the subscription releases the upstream
/// live query.
#[derive(Debug)]
pub struct Subscription {
    receiver: watch::Receiver<u64>,
    task: Task,
    primed: bool,
}

impl Subscription {
    pub(super) fn spawn<F>(initial: u64, f: impl FnOnce(watch::Sender<u64>, StopSignal) -> F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = watch::channel(initial);
        let task = Task::spawn(|signal| f(sender, signal));

        Self {
            receiver,
            task,
            primed: false,
        }
    }

    /// The most recent count, without waiting.
    pub fn current(&self) -> u64 {
        *self.receiver.borrow()
    }

    /// Wait for the next count. Returns `None` once the upstream has gone away.
    pub async fn next(&mut self) -> Option<u64> {
        if std::mem::replace(&mut self.primed, true) {
            self.receiver.changed().await.ok()?;
        }

        Some(*self.receiver.borrow_and_update())
    }

    /// Whether the background task has ended, either by unsubscribing or because the upstream closed.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop following the count and wait for the background task to wind down.
    pub async fn unsubscribe(mut self) {
        self.task.shutdown().await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.stop();
    }
}
