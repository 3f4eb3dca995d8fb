//! Monotonic call accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Counts call attempts, successful or not.
///
/// The counter starts at zero and every [`CallCounter::next`] hands out the
/// following value, so concurrent callers always observe the contiguous range
/// `1..=n` with no duplicates. There is no reset.
#[derive(Debug)]
pub struct CallCounter {
    count: AtomicU64,
    published: watch::Sender<u64>,
}

impl CallCounter {
    pub fn new() -> Self {
        let (published, _) = watch::channel(0);
        Self {
            count: AtomicU64::new(0),
            published,
        }
    }

    /// Account for a new call and return its call count.
    pub fn next(&self) -> u64 {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;

        // Publishers race; only move the observed value forward.
        self.published.send_if_modified(|latest| {
            if count > *latest {
                *latest = count;
                true
            } else {
                false
            }
        });

        count
    }

    /// Number of calls accounted so far.
    pub fn current(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Watch the call count. The observed value never goes backwards.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.published.subscribe()
    }
}

impl Default for CallCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_at_one() {
        let counter = CallCounter::new();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn test_independent_counters() {
        let a = CallCounter::new();
        let b = CallCounter::new();
        a.next();
        a.next();
        assert_eq!(b.next(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_values_are_contiguous() {
        let counter = Arc::new(CallCounter::new());
        let mut tasks = Vec::new();

        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            tasks.push(tokio::spawn(async move {
                let mut seen = Vec::with_capacity(1000);
                for _ in 0..1000 {
                    seen.push(counter.next());
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for task in tasks {
            all.extend(task.await.unwrap());
        }
        all.sort_unstable();

        let expected: Vec<u64> = (1..=16_000).collect();
        assert_eq!(all, expected);
        assert_eq!(counter.current(), 16_000);
    }

    #[test]
    fn test_subscriber_sees_latest_count() {
        let counter = CallCounter::new();
        let receiver = counter.subscribe();
        assert_eq!(*receiver.borrow(), 0);

        counter.next();
        counter.next();
        counter.next();

        assert!(receiver.has_changed().unwrap());
        assert_eq!(*receiver.borrow(), 3);
    }
}
