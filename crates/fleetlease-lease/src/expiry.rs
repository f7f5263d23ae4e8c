//! Delayed queue driving lease reclamation.
//!
//! One task per queue sleeps until the earliest deadline, instead of one
//! sleeping task per lease.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

struct Scheduled<K> {
    at: Instant,
    seq: u64,
    key: K,
}

impl<K> PartialEq for Scheduled<K> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<K> Eq for Scheduled<K> {}

impl<K> PartialOrd for Scheduled<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Scheduled<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

/// Fires `on_expire(key)` once for every scheduled key, at or after its
/// deadline. Keys sharing a deadline fire in scheduling order.
///
/// Dropping the queue aborts the driver task; pending keys never fire.
pub struct ExpiryQueue<K> {
    tx: mpsc::UnboundedSender<(Instant, K)>,
    task: JoinHandle<()>,
}

impl<K: Send + 'static> ExpiryQueue<K> {
    /// Spawns the driver task. Must be called from within a tokio runtime.
    pub fn spawn<F>(on_expire: F) -> Self
    where
        F: Fn(K) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(rx, on_expire));
        Self { tx, task }
    }

    pub fn schedule(&self, key: K, at: Instant) {
        if self.tx.send((at, key)).is_err() {
            tracing::warn!("expiry queue driver is gone, lease will only lapse lazily");
        }
    }
}

impl<K> Drop for ExpiryQueue<K> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn drive<K, F>(mut rx: mpsc::UnboundedReceiver<(Instant, K)>, on_expire: F)
where
    F: Fn(K),
{
    let mut heap: BinaryHeap<Reverse<Scheduled<K>>> = BinaryHeap::new();
    let mut seq = 0u64;

    loop {
        let next = heap.peek().map(|Reverse(s)| s.at);
        // The placeholder deadline is never awaited while the heap is empty.
        let wake = next.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            msg = rx.recv() => match msg {
                Some((at, key)) => {
                    heap.push(Reverse(Scheduled { at, seq, key }));
                    seq += 1;
                }
                None => return,
            },
            _ = sleep_until(wake), if next.is_some() => {
                let now = Instant::now();
                while heap.peek().is_some_and(|Reverse(s)| s.at <= now) {
                    if let Some(Reverse(due)) = heap.pop() {
                        on_expire(due.key);
                    }
                }
            }
        }
    }
}
