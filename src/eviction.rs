//! Preservation/eviction controller (spec §4.4): throttles bulk eviction
//! (e.g. after a replication peer disconnects) behind an externally
//! injected quota stream, so a single misbehaving source can't collapse
//! the registry.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;

use crate::contract::Cancellation;
use crate::future::Stream;
use crate::source::Source;

/// A queued copy awaiting removal through the preservation queue.
#[derive(Clone, Debug)]
pub struct EvictionCandidate {
    pub id: Arc<str>,
    pub source: Source,
}

/// FIFO queue of eviction candidates, drained by an externally supplied
/// quota stream (spec §6 `EvictionQuotaStream`): a lazy sequence of
/// non-negative integers, each integer authorizing up to N dequeues.
pub struct EvictionController {
    queue: Mutex<VecDeque<EvictionCandidate>>,
}

impl Default for EvictionController {
    fn default() -> Self {
        Self::new()
    }
}

impl EvictionController {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends candidates to the queue. Returns the number enqueued.
    pub fn enqueue(&self, candidates: impl IntoIterator<Item = EvictionCandidate>) -> usize {
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.extend(candidates);
        queue.len() - before
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Dequeues up to `quota` candidates observed in the queue *at this
    /// moment*; a quota grant against an empty queue is simply discarded,
    /// not stored for a later arrival (spec §4.4).
    fn drain(&self, quota: u64) -> Vec<EvictionCandidate> {
        let mut queue = self.queue.lock();
        let n = (quota as usize).min(queue.len());
        queue.drain(..n).collect()
    }

    /// Drives the controller off `quota_stream` until it completes or
    /// `closed` is cancelled (registry shutdown, spec §5). `complete` is
    /// invoked once per dequeued candidate; failures in the candidate's
    /// originating registration stream do not stop the drain (spec §4.4
    /// failure semantics: a candidate already queued is evicted normally
    /// even if its source errored in the meantime).
    pub async fn run<S, F>(self: Arc<Self>, mut quota_stream: S, closed: Cancellation, complete: F)
    where
        S: Stream<Item = u64> + Unpin,
        F: Fn(EvictionCandidate) + Send + Sync + 'static,
    {
        loop {
            let quota = tokio::select! {
                () = closed.cancelled() => return,
                quota = Self::next(&mut quota_stream) => match quota {
                    Some(quota) => quota,
                    None => return,
                },
            };
            for candidate in self.drain(quota) {
                complete(candidate);
            }
        }
    }

    async fn next<S>(stream: &mut S) -> Option<u64>
    where
        S: Stream<Item = u64> + Unpin,
    {
        std::future::poll_fn(|cx| std::pin::Pin::new(&mut *stream).poll_next(cx)).await
    }
}

/// Wraps a quota stream so `initial` is yielded exactly once before
/// anything pulled from `inner` (spec §6: `eviction_quota_initial` is "the
/// first quota request emitted at startup by the preservation controller").
pub struct PrependedQuotaStream<S> {
    initial: Option<u64>,
    inner: S,
}

impl<S> PrependedQuotaStream<S> {
    pub fn new(initial: u64, inner: S) -> Self {
        Self {
            initial: Some(initial),
            inner,
        }
    }
}

impl<S> Stream for PrependedQuotaStream<S>
where
    S: Stream<Item = u64> + Unpin,
{
    type Item = u64;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<u64>> {
        let this = self.get_mut();
        if let Some(initial) = this.initial.take() {
            return Poll::Ready(Some(initial));
        }
        Pin::new(&mut this.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// A quota stream backed by a fixed, in-memory sequence — matches the
    /// literal `3, 0, 0, 7` grant sequence of scenario S5.
    struct FixedQuotaStream {
        remaining: VecDeque<u64>,
    }

    impl Stream for FixedQuotaStream {
        type Item = u64;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<u64>> {
            Poll::Ready(self.remaining.pop_front())
        }
    }

    #[tokio::test]
    async fn s5_eviction_throttled_by_quota() {
        let controller = Arc::new(EvictionController::new());
        let peer = Source::replicated("peer");
        let candidates: Vec<_> = (0..10)
            .map(|i| EvictionCandidate {
                id: Arc::from(format!("id-{i}")),
                source: peer.clone(),
            })
            .collect();
        controller.enqueue(candidates);
        assert_eq!(controller.queue_len(), 10);

        let evicted = Arc::new(Mutex::new(Vec::new()));
        let evicted_clone = evicted.clone();
        let quota_stream = FixedQuotaStream {
            remaining: VecDeque::from([3, 0, 0, 7]),
        };

        controller
            .clone()
            .run(quota_stream, Cancellation::new(), move |candidate| {
                evicted_clone.lock().push(candidate.id);
            })
            .await;

        assert_eq!(evicted.lock().len(), 10);
        assert_eq!(controller.queue_len(), 0);
    }

    #[tokio::test]
    async fn quota_against_empty_queue_is_discarded_not_stored() {
        let controller = Arc::new(EvictionController::new());
        let evicted = Arc::new(Mutex::new(0usize));
        let evicted_clone = evicted.clone();
        let quota_stream = FixedQuotaStream {
            remaining: VecDeque::from([5]),
        };
        controller
            .clone()
            .run(quota_stream, Cancellation::new(), move |_candidate| {
                *evicted_clone.lock() += 1;
            })
            .await;
        assert_eq!(*evicted.lock(), 0);
    }

    #[tokio::test]
    async fn run_stops_once_cancelled() {
        let controller = Arc::new(EvictionController::new());
        let closed = Cancellation::new();
        let evicted = Arc::new(Mutex::new(0usize));
        let evicted_clone = evicted.clone();
        // Never yields a quota on its own; only cancellation should end the loop.
        struct PendingForever;
        impl Stream for PendingForever {
            type Item = u64;

            fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<u64>> {
                Poll::Pending
            }
        }
        let run_closed = closed.clone();
        let handle = tokio::spawn(controller.clone().run(PendingForever, run_closed, move |_candidate| {
            *evicted_clone.lock() += 1;
        }));
        tokio::task::yield_now().await;
        closed.cancel();
        handle.await.unwrap();
        assert_eq!(*evicted.lock(), 0);
    }

    #[tokio::test]
    async fn prepended_quota_stream_yields_initial_value_first() {
        let inner = FixedQuotaStream {
            remaining: VecDeque::from([9]),
        };
        let mut stream = PrependedQuotaStream::new(4, inner);
        let first = std::future::poll_fn(|cx| Pin::new(&mut stream).poll_next(cx)).await;
        assert_eq!(first, Some(4));
        let second = std::future::poll_fn(|cx| Pin::new(&mut stream).poll_next(cx)).await;
        assert_eq!(second, Some(9));
    }
}
