//! FIFO single-flight execution queue for bridge commands.
//!
//! Every downstream call - read or write, from either front end - is
//! submitted here. One worker task drains the channel and awaits each
//! operation to settlement before taking the next, so at most one command is
//! in flight against the bridge at any instant and commands start in exactly
//! submission order.
//!
//! The channel push in [`CommandQueue::submit`] is synchronous: the caller's
//! position in the queue is fixed before `submit` returns, with no await in
//! between. Failures resolve only the submitting caller's handle; the worker
//! keeps draining.

use std::future::Future;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot};

type QueuedOperation = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handle for a shared command queue. Clones submit to the same worker.
#[derive(Clone)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<QueuedOperation>,
}

/// A submitted operation's result slot. Awaiting it yields the operation's
/// outcome; dropping it abandons the result without cancelling the
/// operation, which still runs in its queue slot.
pub struct SubmittedCommand<T> {
    rx: oneshot::Receiver<anyhow::Result<T>>,
}

impl CommandQueue {
    /// Start the worker and return a handle to its queue.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedOperation>();

        tokio::spawn(async move {
            while let Some(operation) = rx.recv().await {
                operation.await;
            }
            tracing::debug!("Command queue worker finished");
        });

        Self { tx }
    }

    /// Append an operation to the queue and return its result handle.
    ///
    /// The operation imposes no timeout of its own; whatever it awaits is
    /// expected to carry one (the bridge HTTP client does).
    pub fn submit<T, F>(&self, operation: F) -> SubmittedCommand<T>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();

        let wrapped: QueuedOperation = Box::pin(async move {
            let result = operation.await;
            if let Err(err) = &result {
                tracing::warn!(error = %err, "Queued command failed");
            }
            // The submitter may have given up on the result; fine either way.
            let _ = done_tx.send(result);
        });

        // If the worker is gone (shutdown), the dropped operation takes its
        // oneshot sender with it and the handle reports a closed queue
        // instead of hanging.
        let _ = self.tx.send(wrapped);

        SubmittedCommand { rx: done_rx }
    }

    /// Submit and wait for the outcome in one step.
    pub async fn run<T, F>(&self, operation: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.submit(operation).await
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Future for SubmittedCommand<T> {
    type Output = anyhow::Result<T>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("command queue is shut down")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn commands_run_in_submission_order_without_overlap() {
        let queue = CommandQueue::new();
        let started = Arc::new(std::sync::Mutex::new(Vec::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..10usize {
            let started = started.clone();
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            handles.push(queue.submit(async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                started.lock().unwrap().push(i);
                // Finish out of order if anything overlapped.
                tokio::time::sleep(Duration::from_millis(10 - i as u64)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(i)
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), i);
        }

        assert_eq!(*started.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_failure_does_not_abort_the_queue() {
        let queue = CommandQueue::new();

        let first = queue.submit(async { Ok(1u32) });
        let failing =
            queue.submit(async { Err::<u32, _>(anyhow::anyhow!("bridge unreachable")) });
        let last = queue.submit(async { Ok(3u32) });

        assert_eq!(first.await.unwrap(), 1);
        let err = failing.await.unwrap_err();
        assert!(err.to_string().contains("bridge unreachable"));
        assert_eq!(last.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel_the_operation() {
        let queue = CommandQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = ran.clone();
        drop(queue.submit(async move {
            ran_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        // A later command settles strictly after the dropped one ran.
        queue.run(async { Ok(()) }).await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_submitters_each_get_their_own_result() {
        let queue = CommandQueue::new();
        let mut joins = Vec::new();
        for i in 0..5u64 {
            let queue = queue.clone();
            joins.push(tokio::spawn(async move {
                queue.run(async move { Ok(i * 2) }).await.unwrap()
            }));
        }
        let results = futures::future::join_all(joins).await;
        for (i, r) in results.into_iter().enumerate() {
            assert_eq!(r.unwrap(), i as u64 * 2);
        }
    }
}
