//! Serial task queue.
//!
//! Each queue owns a mailbox and one drain task. Tasks run strictly in the
//! order they were enqueued and never overlap; the next task starts only after
//! the previous one's future has completed. A failing task is logged and the
//! drain carries on. Cancelling the queue's token stops the drain before the
//! next task is picked up; a task that is already running finishes first.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

type TaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;
type Task = Box<dyn FnOnce() -> TaskFuture + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("task queue is closed")]
pub struct QueueClosed;

pub struct SerialTaskQueue {
    tx: mpsc::UnboundedSender<Task>,
    cancel: CancellationToken,
}

impl SerialTaskQueue {
    /// Spawn the drain task on the current runtime. `label` tags log lines.
    pub fn spawn(label: impl Into<String>, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(label.into(), rx, cancel.clone()));
        Self { tx, cancel }
    }

    /// Append a task. It runs after every task enqueued before it.
    pub fn enqueue<F, Fut, E>(&self, task: F) -> Result<(), QueueClosed>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<TaskError>,
    {
        if self.cancel.is_cancelled() {
            return Err(QueueClosed);
        }
        let task: Task = Box::new(move || {
            Box::pin(async move { task().await.map_err(Into::<TaskError>::into) }) as TaskFuture
        });
        self.tx.send(task).map_err(|_| QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

async fn drain(label: String, mut rx: mpsc::UnboundedReceiver<Task>, cancel: CancellationToken) {
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        if let Err(e) = task().await {
            tracing::warn!(queue = %label, "Queued task failed: {}", e);
        }
    }

    tracing::debug!(queue = %label, "Task queue stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn record(log: &Arc<Mutex<Vec<u32>>>, n: u32) {
        log.lock().unwrap().push(n);
    }

    #[tokio::test]
    async fn tasks_run_in_enqueue_order() {
        let queue = SerialTaskQueue::spawn("test", CancellationToken::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 1..=5u32 {
            let log = log.clone();
            // Earlier tasks sleep longer, so any overlap would reorder the log
            let delay = Duration::from_millis(u64::from(6 - n) * 10);
            queue
                .enqueue(move || async move {
                    tokio::time::sleep(delay).await;
                    record(&log, n);
                    Ok::<_, TaskError>(())
                })
                .unwrap();
        }

        let (done_tx, done_rx) = oneshot::channel();
        queue
            .enqueue(move || async move {
                let _ = done_tx.send(());
                Ok::<_, TaskError>(())
            })
            .unwrap();
        done_rx.await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn only_one_task_runs_at_a_time() {
        let queue = SerialTaskQueue::spawn("test", CancellationToken::new());
        let running = Arc::new(Mutex::new(0u32));
        let peak = Arc::new(Mutex::new(0u32));

        for _ in 0..5 {
            let running = running.clone();
            let peak = peak.clone();
            queue
                .enqueue(move || async move {
                    {
                        let mut r = running.lock().unwrap();
                        *r += 1;
                        let mut p = peak.lock().unwrap();
                        *p = (*p).max(*r);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    *running.lock().unwrap() -= 1;
                    Ok::<_, TaskError>(())
                })
                .unwrap();
        }

        let (done_tx, done_rx) = oneshot::channel();
        queue
            .enqueue(move || async move {
                let _ = done_tx.send(());
                Ok::<_, TaskError>(())
            })
            .unwrap();
        done_rx.await.unwrap();

        assert_eq!(*peak.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_task_does_not_stop_queue() {
        let queue = SerialTaskQueue::spawn("test", CancellationToken::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = log.clone();
        queue
            .enqueue(move || async move {
                record(&first, 1);
                Ok::<_, TaskError>(())
            })
            .unwrap();
        queue
            .enqueue(|| async { Err::<(), _>(QueueClosed) })
            .unwrap();
        let third = log.clone();
        let (done_tx, done_rx) = oneshot::channel();
        queue
            .enqueue(move || async move {
                record(&third, 3);
                let _ = done_tx.send(());
                Ok::<_, TaskError>(())
            })
            .unwrap();

        done_rx.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn queues_run_independently() {
        let slow = SerialTaskQueue::spawn("slow", CancellationToken::new());
        let fast = SerialTaskQueue::spawn("fast", CancellationToken::new());

        let (release_tx, release_rx) = oneshot::channel::<()>();
        slow.enqueue(move || async move {
            let _ = release_rx.await;
            Ok::<_, TaskError>(())
        })
        .unwrap();

        // The fast queue must make progress while the slow one is blocked
        let (done_tx, done_rx) = oneshot::channel();
        fast.enqueue(move || async move {
            let _ = done_tx.send(());
            Ok::<_, TaskError>(())
        })
        .unwrap();
        tokio::time::timeout(Duration::from_secs(1), done_rx)
            .await
            .expect("fast queue blocked by slow queue")
            .unwrap();

        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn cancel_lets_running_task_finish_and_drops_the_rest() {
        let cancel = CancellationToken::new();
        let queue = SerialTaskQueue::spawn("test", cancel.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        let (started_tx, started_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = oneshot::channel();
        let first = log.clone();
        queue
            .enqueue(move || async move {
                let _ = started_tx.send(());
                tokio::time::sleep(Duration::from_millis(30)).await;
                record(&first, 1);
                let _ = finished_tx.send(());
                Ok::<_, TaskError>(())
            })
            .unwrap();
        let second = log.clone();
        queue
            .enqueue(move || async move {
                record(&second, 2);
                Ok::<_, TaskError>(())
            })
            .unwrap();

        started_rx.await.unwrap();
        cancel.cancel();
        finished_rx.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*log.lock().unwrap(), vec![1]);
        assert!(queue.is_closed());
        assert_eq!(
            queue.enqueue(|| async { Ok::<_, TaskError>(()) }),
            Err(QueueClosed)
        );
    }
}
