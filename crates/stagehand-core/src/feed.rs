//! Bounded single-producer/single-consumer hand-off between threads.
//!
//! External producers (touch hardware, paint callbacks) push from their own
//! thread; the logic thread drains once per tick. A full feed drops its oldest
//! entry instead of blocking the producer.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct Shared<T> {
    queue: ArrayQueue<T>,
    dropped: AtomicU64,
}

/// Producing end of a feed.
pub struct FeedProducer<T> {
    shared: Arc<Shared<T>>,
}

/// Consuming end of a feed.
pub struct FeedConsumer<T> {
    shared: Arc<Shared<T>>,
}

/// Create a feed holding at most `capacity` items (at least one).
pub fn bounded<T>(capacity: usize) -> (FeedProducer<T>, FeedConsumer<T>) {
    let shared = Arc::new(Shared {
        queue: ArrayQueue::new(capacity.max(1)),
        dropped: AtomicU64::new(0),
    });
    (
        FeedProducer {
            shared: Arc::clone(&shared),
        },
        FeedConsumer { shared },
    )
}

impl<T> FeedProducer<T> {
    /// Push `item`, evicting the oldest entry when full. Never blocks.
    pub fn push(&self, item: T) {
        if self.shared.queue.force_push(item).is_some() {
            let total = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if total.is_power_of_two() {
                log::warn!("Feed overflow, {} items dropped so far", total);
            }
        }
    }
}

impl<T> FeedConsumer<T> {
    /// Take everything queued at the time of the call. Items pushed while
    /// draining wait for the next tick.
    pub fn drain(&self) -> Vec<T> {
        let pending = self.shared.queue.len();
        let mut items = Vec::with_capacity(pending);
        for _ in 0..pending {
            match self.shared.queue.pop() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        items
    }

    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    /// Items evicted because the feed was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_overflow_drops_oldest() {
        let (tx, rx) = bounded(3);
        for i in 0..5 {
            tx.push(i);
        }

        assert_eq!(rx.drain(), vec![2, 3, 4]);
        assert_eq!(rx.dropped(), 2);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_cross_thread_handoff() {
        let (tx, rx) = bounded(1024);
        let producer = thread::spawn(move || {
            for i in 0..100 {
                tx.push(i);
            }
        });
        producer.join().unwrap();

        let items = rx.drain();
        assert_eq!(items.len(), 100);
        assert!(items.windows(2).all(|w| w[0] < w[1]));
    }
}
