// Dedup ledger: every distinct normalized text seen in the current epoch

use crate::normalize::NormalizedText;
use serde::{Deserialize, Serialize};

/// A recorded text and the id it was issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: u64,
    pub text: NormalizedText,
}

/// Append-only record of distinct texts, keyed by a dense id starting at 1
#[derive(Debug, Default)]
pub struct DedupLedger {
    entries: Vec<LedgerEntry>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every entry; the next issued id is 1 again
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Record a text. Returns its id and whether it was new.
    pub fn record(&mut self, text: &NormalizedText) -> (u64, bool) {
        // Texts are short and epochs small, so a value scan is enough
        if let Some(entry) = self.entries.iter().find(|e| e.text == *text) {
            return (entry.id, false);
        }
        let id = self.entries.len() as u64 + 1;
        self.entries.push(LedgerEntry {
            id,
            text: text.clone(),
        });
        (id, true)
    }

    pub fn lookup_text(&self, id: u64) -> Option<&NormalizedText> {
        // Ids are dense, so entry `id` lives at index `id - 1`
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.entries.get(index).map(|e| &e.text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::normalize::Normalizer;

    fn texts(raw: &[&str]) -> Vec<NormalizedText> {
        let n = Normalizer::new(&Config::default().normalize).unwrap();
        raw.iter().map(|r| n.normalize_str(r)).collect()
    }

    #[test]
    fn test_one_id_per_distinct_text() {
        let mut ledger = DedupLedger::new();
        let input = texts(&["a", "b", "a", "c", "b", "a"]);

        let results: Vec<(u64, bool)> = input.iter().map(|t| ledger.record(t)).collect();
        assert_eq!(
            results,
            vec![(1, true), (2, true), (1, false), (3, true), (2, false), (1, false)]
        );
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_lookup() {
        let mut ledger = DedupLedger::new();
        let input = texts(&["hello world", "gm frens"]);
        for t in &input {
            ledger.record(t);
        }
        assert_eq!(ledger.lookup_text(2), Some(&input[1]));
        assert_eq!(ledger.lookup_text(0), None);
        assert_eq!(ledger.lookup_text(3), None);
    }

    #[test]
    fn test_reset_starts_new_epoch() {
        let mut ledger = DedupLedger::new();
        let input = texts(&["x", "y"]);
        ledger.record(&input[0]);
        ledger.record(&input[1]);

        ledger.reset();
        assert!(ledger.lookup_text(1).is_none());
        assert!(ledger.lookup_text(2).is_none());
        assert_eq!(ledger.record(&input[1]), (1, true));
    }
}
