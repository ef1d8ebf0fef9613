// Batch buffer with a dual size + time flush condition

use crate::normalize::NormalizedText;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// A newly discovered item waiting for dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedItem {
    pub id: u64,
    pub text: NormalizedText,
}

/// Accumulates new items and releases them only when both the size and
/// the elapsed-time thresholds are met
#[derive(Debug)]
pub struct BatchBuffer {
    items: Vec<BufferedItem>,
    min_batch_size: usize,
    min_interval: Duration,
    last_flush: Instant,
}

impl BatchBuffer {
    /// `created_at` counts as the last flush for the first batch
    pub fn new(min_batch_size: usize, min_interval: Duration, created_at: Instant) -> Self {
        Self {
            items: Vec::new(),
            min_batch_size,
            min_interval,
            last_flush: created_at,
        }
    }

    pub fn add(&mut self, item: BufferedItem) {
        self.items.push(item);
    }

    /// Whether a flush at `now` would release a batch
    pub fn is_ready(&self, now: Instant) -> bool {
        self.items.len() >= self.min_batch_size
            && now.saturating_duration_since(self.last_flush) >= self.min_interval
    }

    /// Take the whole buffer if both thresholds are met, otherwise nothing
    pub fn try_flush(&mut self, now: Instant) -> Vec<BufferedItem> {
        if !self.is_ready(now) {
            return Vec::new();
        }
        self.last_flush = now;
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::normalize::Normalizer;

    fn items(range: std::ops::Range<u64>) -> Vec<BufferedItem> {
        let n = Normalizer::new(&Config::default().normalize).unwrap();
        range
            .map(|id| BufferedItem {
                id,
                text: n.normalize_str(&format!("post {}", id)),
            })
            .collect()
    }

    #[test]
    fn test_needs_both_size_and_time() {
        let t0 = Instant::now();
        let mut buffer = BatchBuffer::new(5, Duration::from_millis(5000), t0);

        for item in items(1..4) {
            buffer.add(item);
        }
        assert!(buffer.try_flush(t0).is_empty());

        for item in items(4..7) {
            buffer.add(item);
        }
        // Six items but only 2000ms since the last flush
        assert!(buffer.try_flush(t0 + Duration::from_millis(2000)).is_empty());
        assert_eq!(buffer.len(), 6);

        let batch = buffer.try_flush(t0 + Duration::from_millis(5001));
        assert_eq!(batch.len(), 6);
        assert_eq!(batch[0].id, 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_time_alone_is_not_enough() {
        let t0 = Instant::now();
        let mut buffer = BatchBuffer::new(5, Duration::from_secs(5), t0);
        for item in items(1..3) {
            buffer.add(item);
        }
        assert!(buffer.try_flush(t0 + Duration::from_secs(60)).is_empty());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_flush_restarts_the_clock() {
        let t0 = Instant::now();
        let mut buffer = BatchBuffer::new(1, Duration::from_secs(5), t0);

        buffer.add(items(1..2).remove(0));
        let t1 = t0 + Duration::from_secs(5);
        assert_eq!(buffer.try_flush(t1).len(), 1);
        assert_eq!(buffer.last_flush(), t1);

        buffer.add(items(2..3).remove(0));
        assert!(buffer.try_flush(t1 + Duration::from_secs(4)).is_empty());
        assert_eq!(buffer.try_flush(t1 + Duration::from_secs(5)).len(), 1);
    }
}
