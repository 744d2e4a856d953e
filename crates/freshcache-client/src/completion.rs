use crate::arena::Arena;
use crate::error::Error;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type Responder<T> = oneshot::Sender<Result<T, Error>>;

struct Inner<T> {
    arena: Mutex<Arena<(Instant, Responder<T>)>>,
    tx: mpsc::UnboundedSender<(u64, Result<T, Error>)>,
    latency_log: Mutex<Vec<Duration>>,
}

/// Demultiplexes completions for every in-flight call on a client/server
/// instance through a single logical completion queue, mirroring the
/// `CREATE -> PROCESS -> FINISH -> DELETE` lifecycle: [`CompletionQueue::create`]
/// is CREATE, the background dispatcher task draining the channel is the
/// one-worker "pulls (tag, ok) forever" loop (PROCESS), resolving the
/// caller's future is FINISH, and reclaiming the arena slot is DELETE.
///
/// The RPC itself runs on a spawned task (the runtime's own thread pool
/// stands in for the spec's "thread pool sized to hardware concurrency"
/// used for heavier post-processing); only the result delivery is funneled
/// through the single dispatcher.
pub struct CompletionQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CompletionQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> CompletionQueue<T> {
    pub fn new() -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            arena: Mutex::new(Arena::new()),
            tx,
            latency_log: Mutex::new(Vec::new()),
        });
        let dispatcher_inner = inner.clone();
        let handle = tokio::spawn(Self::run_dispatcher(rx, dispatcher_inner));
        (Self { inner }, handle)
    }

    async fn run_dispatcher(
        mut rx: mpsc::UnboundedReceiver<(u64, Result<T, Error>)>,
        inner: Arc<Inner<T>>,
    ) {
        while let Some((tag, outcome)) = rx.recv().await {
            let entry = inner.arena.lock().remove(tag);
            if let Some((started_at, responder)) = entry {
                inner.latency_log.lock().push(started_at.elapsed());
                // The caller may have already dropped its receiver (e.g. it
                // was cancelled); a failed send is not itself an error here.
                let _ = responder.send(outcome);
            } else {
                tracing::debug!(tag, "completion for unknown or already-resolved call");
            }
        }
    }

    /// CREATE a new in-flight call, returning its tag (the arena index)
    /// and a receiver that resolves once [`CompletionQueue::complete`] is
    /// called with a matching tag.
    pub fn create(&self) -> (u64, oneshot::Receiver<Result<T, Error>>) {
        let (responder, receiver) = oneshot::channel();
        let tag = self.inner.arena.lock().insert((Instant::now(), responder));
        (tag, receiver)
    }

    /// PROCESS: hand a call's outcome to the dispatcher. Called from the
    /// spawned task that actually performed the RPC.
    pub fn complete(&self, tag: u64, outcome: Result<T, Error>) {
        let _ = self.inner.tx.send((tag, outcome));
    }

    pub fn latencies(&self) -> Vec<Duration> {
        self.inner.latency_log.lock().clone()
    }

    pub fn in_flight_calls(&self) -> usize {
        self.inner.arena.lock().len_in_use()
    }

    /// Graceful shutdown: resolve every outstanding promise with
    /// [`Error::Cancelled`] so no promise is leaked.
    pub fn cancel_all_pending(&self) {
        let drained = self.inner.arena.lock().drain_all();
        for (_, (_, responder)) in drained {
            let _ = responder.send(Err(Error::Cancelled));
        }
    }

    /// Run `issue` (typically a future wrapping one gRPC call) to
    /// completion on a spawned task, delivering its result back through
    /// this completion queue. Returns the resolved value, or
    /// [`Error::Cancelled`] if the dispatcher was torn down first.
    pub async fn dispatch<F>(&self, issue: F) -> Result<T, Error>
    where
        F: std::future::Future<Output = Result<T, Error>> + Send + 'static,
    {
        let (tag, receiver) = self.create();
        let completion = self.clone();
        tokio::spawn(async move {
            let outcome = issue.await;
            completion.complete(tag, outcome);
        });
        receiver.await.unwrap_or(Err(Error::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_resolves_with_the_inner_future_result() {
        let (cq, _handle): (CompletionQueue<u32>, _) = CompletionQueue::new();
        let result = cq.dispatch(async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(cq.latencies().len(), 1);
    }

    #[tokio::test]
    async fn cancel_all_pending_resolves_outstanding_calls() {
        let (cq, _handle): (CompletionQueue<u32>, _) = CompletionQueue::new();
        let (tag, receiver) = cq.create();
        assert_eq!(cq.in_flight_calls(), 1);
        cq.cancel_all_pending();
        assert_eq!(cq.in_flight_calls(), 0);
        let result = receiver.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        let _ = tag;
    }
}
