use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Drop-oldest buffer with fetch-and-clear semantics.
///
/// Holds the records (or frames) captured since the last fetch so that a
/// consumer on any thread can stream partial data without stopping
/// capture. When a `memory_limit` is configured, only the most recent
/// `memory_limit` items are retained — the durable log is unaffected by
/// this trimming and keeps everything.
///
/// This is the only shared mutable state between a producer thread and its
/// consumers; one mutex section covers both operations, so an `append`
/// racing a `fetch_and_clear` lands either in the returned snapshot or in
/// the buffer for the next call, never both and never nowhere.
pub struct RingBuffer<T> {
    items: Mutex<VecDeque<T>>,
    memory_limit: Option<usize>,
    stats: RingBufferStats,
}

/// Statistics for ring buffer monitoring.
#[derive(Debug, Default)]
pub struct RingBufferStats {
    /// Total items appended.
    pub items_appended: AtomicU64,
    /// Items discarded to stay within the memory limit.
    pub items_dropped: AtomicU64,
    /// Total items handed to consumers.
    pub items_fetched: AtomicU64,
}

impl RingBufferStats {
    /// Get current statistics as a snapshot.
    pub fn snapshot(&self) -> RingBufferStatsSnapshot {
        RingBufferStatsSnapshot {
            items_appended: self.items_appended.load(Ordering::Relaxed),
            items_dropped: self.items_dropped.load(Ordering::Relaxed),
            items_fetched: self.items_fetched.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of ring buffer statistics.
#[derive(Debug, Clone, Copy)]
pub struct RingBufferStatsSnapshot {
    pub items_appended: u64,
    pub items_dropped: u64,
    pub items_fetched: u64,
}

impl<T> RingBuffer<T> {
    /// Create a buffer, optionally bounded to the most recent
    /// `memory_limit` items.
    pub fn new(memory_limit: Option<usize>) -> Self {
        debug!("Created ring buffer (memory_limit: {:?})", memory_limit);
        Self {
            items: Mutex::new(VecDeque::new()),
            memory_limit,
            stats: RingBufferStats::default(),
        }
    }

    /// Append an item at the tail, discarding from the head if the buffer
    /// exceeds its memory limit.
    pub fn append(&self, item: T) {
        let mut items = self.items.lock();
        items.push_back(item);
        if let Some(limit) = self.memory_limit {
            while items.len() > limit {
                items.pop_front();
                self.stats.items_dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Ring buffer over limit {}, dropped oldest item", limit);
            }
        }
        self.stats.items_appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically take everything accumulated since the last call.
    ///
    /// Ownership of the returned snapshot transfers to the caller; the
    /// buffer is left empty.
    pub fn fetch_and_clear(&self) -> Vec<T> {
        let mut items = self.items.lock();
        let snapshot: Vec<T> = items.drain(..).collect();
        self.stats
            .items_fetched
            .fetch_add(snapshot.len() as u64, Ordering::Relaxed);
        snapshot
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the buffer is currently empty.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Configured memory limit, if any.
    pub fn memory_limit(&self) -> Option<usize> {
        self.memory_limit
    }

    /// Get current buffer statistics.
    pub fn stats(&self) -> RingBufferStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_append_and_fetch() {
        let buffer = RingBuffer::new(None);
        buffer.append(1);
        buffer.append(2);
        buffer.append(3);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.fetch_and_clear(), vec![1, 2, 3]);
        assert!(buffer.is_empty());
        assert!(buffer.fetch_and_clear().is_empty());
    }

    #[test]
    fn test_memory_limit_drops_oldest() {
        let buffer = RingBuffer::new(Some(3));
        for i in 0..5 {
            buffer.append(i);
        }

        assert_eq!(buffer.fetch_and_clear(), vec![2, 3, 4]);

        let stats = buffer.stats();
        assert_eq!(stats.items_appended, 5);
        assert_eq!(stats.items_dropped, 2);
        assert_eq!(stats.items_fetched, 3);
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let buffer = RingBuffer::new(None);
        for i in 0..10_000 {
            buffer.append(i);
        }
        assert_eq!(buffer.len(), 10_000);
        assert_eq!(buffer.stats().items_dropped, 0);
    }

    #[test]
    fn test_fetch_completeness_under_interleaving() {
        // Union of all snapshots must equal the full append sequence, each
        // item exactly once, regardless of how fetches interleave.
        let buffer = Arc::new(RingBuffer::new(None));
        let total: u64 = 4 * 2_500;

        let mut producers = Vec::new();
        for p in 0..4u64 {
            let buffer = Arc::clone(&buffer);
            producers.push(thread::spawn(move || {
                for i in 0..2_500u64 {
                    buffer.append(p * 2_500 + i);
                }
            }));
        }

        let consumer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    seen.extend(buffer.fetch_and_clear());
                    thread::yield_now();
                }
                seen
            })
        };

        for handle in producers {
            handle.join().unwrap();
        }
        let mut seen = consumer.join().unwrap();
        seen.extend(buffer.fetch_and_clear());

        assert_eq!(seen.len() as u64, total);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len() as u64, total);
    }

    #[test]
    fn test_per_producer_order_preserved() {
        let buffer = RingBuffer::new(None);
        for i in 0..100 {
            buffer.append(i);
        }
        let snapshot = buffer.fetch_and_clear();
        assert!(snapshot.windows(2).all(|w| w[0] < w[1]));
    }
}
