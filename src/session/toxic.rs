// Toxic set: texts whose latest classification exceeded the threshold

use crate::normalize::NormalizedText;
use ahash::{HashMap, HashMapExt};

/// Text-keyed record of toxic posts and their latest score
#[derive(Debug)]
pub struct ToxicSet {
    threshold: f64,
    scores: HashMap<NormalizedText, f64>,
}

impl ToxicSet {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            scores: HashMap::new(),
        }
    }

    /// Upsert by text. A score at or below the threshold clears the text.
    /// Returns whether the text is toxic afterwards.
    pub fn update(&mut self, text: &NormalizedText, score: f64) -> bool {
        if score > self.threshold {
            self.scores.insert(text.clone(), score);
            true
        } else {
            self.scores.remove(text);
            false
        }
    }

    pub fn score(&self, text: &NormalizedText) -> Option<f64> {
        self.scores.get(text).copied()
    }

    pub fn contains(&self, text: &NormalizedText) -> bool {
        self.scores.contains_key(text)
    }

    pub fn clear(&mut self) {
        self.scores.clear();
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::normalize::Normalizer;

    #[test]
    fn test_threshold_is_exclusive_and_latest_wins() {
        let n = Normalizer::new(&Config::default().normalize).unwrap();
        let text = n.normalize_str("you absolute clown");
        let mut set = ToxicSet::new(0.5);

        assert!(!set.update(&text, 0.5));
        assert!(set.is_empty());

        assert!(set.update(&text, 0.7));
        assert!(set.update(&text, 0.9));
        assert_eq!(set.score(&text), Some(0.9));
        assert_eq!(set.len(), 1);

        assert!(!set.update(&text, 0.1));
        assert!(!set.contains(&text));
    }
}
