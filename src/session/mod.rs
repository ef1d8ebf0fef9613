//! Observation sessions
//!
//! A [`Session`] is one epoch of observation: the dedup ledger, the pending
//! batch buffer and the toxic set, all created together and thrown away
//! together. Resetting means replacing the session, so nothing can keep
//! mutating the state of an epoch that has ended.

mod buffer;
mod ledger;
mod toxic;

pub use buffer::{BatchBuffer, BufferedItem};
pub use ledger::{DedupLedger, LedgerEntry};
pub use toxic::ToxicSet;

use crate::normalize::NormalizedText;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Classifier verdict: a probability or a bare flag
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Verdict {
    Score(f64),
    Flag(bool),
}

impl Verdict {
    /// Verdict as a score clamped to [0, 1]; flags map to the bounds
    pub fn score(self) -> f64 {
        match self {
            Verdict::Score(s) if s.is_nan() => 0.0,
            Verdict::Score(s) => s.clamp(0.0, 1.0),
            Verdict::Flag(true) => 1.0,
            Verdict::Flag(false) => 0.0,
        }
    }
}

/// Classification of one previously dispatched ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub id: u64,
    pub verdict: Verdict,
}

impl ClassificationResult {
    pub fn score(id: u64, score: f64) -> Self {
        Self {
            id,
            verdict: Verdict::Score(score),
        }
    }

    pub fn flag(id: u64, is_toxic: bool) -> Self {
        Self {
            id,
            verdict: Verdict::Flag(is_toxic),
        }
    }
}

/// Outcome of recording one scrape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub scraped: usize,
    pub new: usize,
}

/// Outcome of merging a result batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub applied: usize,
    pub toxic: usize,
    pub dropped: usize,
}

/// Aggregate counters shown to the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub epoch: Option<Uuid>,
    pub observing: bool,
    pub seen: usize,
    pub pending: usize,
    pub processed: u64,
    pub toxic: usize,
    pub percentage: f64,
}

/// One observation epoch
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    ledger: DedupLedger,
    buffer: BatchBuffer,
    toxic: ToxicSet,
    processed: u64,
    dropped: u64,
}

impl Session {
    pub fn new(
        min_batch_size: usize,
        min_flush_interval: Duration,
        threshold: f64,
        now: Instant,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ledger: DedupLedger::new(),
            buffer: BatchBuffer::new(min_batch_size, min_flush_interval, now),
            toxic: ToxicSet::new(threshold),
            processed: 0,
            dropped: 0,
        }
    }

    /// Record scraped texts; novel ones go to the buffer
    pub fn ingest(&mut self, texts: &[NormalizedText]) -> IngestStats {
        let mut stats = IngestStats {
            scraped: texts.len(),
            new: 0,
        };
        for text in texts {
            let (id, is_new) = self.ledger.record(text);
            if is_new {
                tracing::trace!("New post #{}: {}", id, text);
                self.buffer.add(BufferedItem {
                    id,
                    text: text.clone(),
                });
                stats.new += 1;
            }
        }
        stats
    }

    /// Take the pending batch if both flush thresholds are met at `now`
    pub fn try_flush(&mut self, now: Instant) -> Vec<BufferedItem> {
        self.buffer.try_flush(now)
    }

    /// Merge classifier results. Ids unknown to this epoch's ledger are dropped.
    pub fn apply_results(&mut self, results: &[ClassificationResult]) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        for result in results {
            match self.ledger.lookup_text(result.id) {
                Some(text) => {
                    if self.toxic.update(text, result.verdict.score()) {
                        stats.toxic += 1;
                    }
                    stats.applied += 1;
                }
                None => {
                    tracing::debug!("Dropping result for unknown id {}", result.id);
                    stats.dropped += 1;
                }
            }
        }
        self.processed += stats.applied as u64;
        self.dropped += stats.dropped as u64;
        stats
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn buffer(&self) -> &BatchBuffer {
        &self.buffer
    }

    pub fn toxic(&self) -> &ToxicSet {
        &self.toxic
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn progress(&self, observing: bool) -> ProgressReport {
        let toxic = self.toxic.len();
        let percentage = if self.processed == 0 {
            0.0
        } else {
            toxic as f64 / self.processed as f64 * 100.0
        };
        ProgressReport {
            epoch: Some(self.id),
            observing,
            seen: self.ledger.len(),
            pending: self.buffer.len(),
            processed: self.processed,
            toxic,
            percentage,
        }
    }
}
