//! Text normalization
//!
//! Turns the raw fragments of a scraped post into the canonical string used
//! both as the post's identity and as classifier input. Normalization is
//! lossy: mentions and URLs collapse to fixed tokens and emoji
//! collapse to their textual alias.

use crate::config::NormalizeConfig;
use crate::error::{Result, ToxwatchError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a raw fragment scraped from a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Text,
    Glyph,
    Other,
}

/// A piece of a post in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub value: String,
}

impl Fragment {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Text,
            value: value.into(),
        }
    }

    pub fn glyph(value: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Glyph,
            value: value.into(),
        }
    }

    pub fn other(value: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Other,
            value: value.into(),
        }
    }
}

/// Canonical post text. Equality on this value is the only identity a post has.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Pre-compiled normalizer
#[derive(Debug, Clone)]
pub struct Normalizer {
    mention: Regex,
    url: Regex,
    mention_token: String,
    url_token: String,
}

impl Normalizer {
    /// Build a normalizer from configuration
    pub fn new(config: &NormalizeConfig) -> Result<Self> {
        let mention = Regex::new(r"@\w+")
            .map_err(|e| ToxwatchError::Config(format!("Invalid mention pattern: {}", e)))?;
        let url = Regex::new(r"https?://\S+")
            .map_err(|e| ToxwatchError::Config(format!("Invalid URL pattern: {}", e)))?;

        Ok(Self {
            mention,
            url,
            mention_token: config.mention_token.clone(),
            url_token: config.url_token.clone(),
        })
    }

    /// Normalize an ordered sequence of fragments
    pub fn normalize(&self, fragments: &[Fragment]) -> NormalizedText {
        let mut raw = String::new();
        for fragment in fragments {
            match fragment.kind {
                FragmentKind::Glyph => raw.push_str(&glyph_alias(&fragment.value)),
                FragmentKind::Text | FragmentKind::Other => raw.push_str(&fragment.value),
            }
        }
        self.normalize_str(&raw)
    }

    /// Normalize plain text, as if it were a single text fragment
    pub fn normalize_str(&self, raw: &str) -> NormalizedText {
        let folded = raw.to_lowercase();
        let no_mentions = self.mention.replace_all(&folded, self.mention_token.as_str());
        let no_urls = self.url.replace_all(&no_mentions, self.url_token.as_str());
        NormalizedText(no_urls.trim().to_string())
    }
}

/// Stable textual alias for a glyph. Distinct emoji sharing an alias collapse together.
fn glyph_alias(glyph: &str) -> String {
    let glyph = glyph.trim();
    match emojis::get(glyph) {
        Some(emoji) => match emoji.shortcode() {
            Some(code) => format!(":{}:", code),
            None => format!(":{}:", emoji.name().replace(' ', "_")),
        },
        // Not an emoji: the alt text already is the alias
        None => glyph.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn normalizer() -> Normalizer {
        Normalizer::new(&Config::default().normalize).unwrap()
    }

    #[test]
    fn test_mentions_and_urls() {
        let n = normalizer();
        let text = n.normalize_str("  Hey @Alice look https://t.co/abc123 now ");
        assert_eq!(text.as_str(), "hey @user look httpurl now");
    }

    #[test]
    fn test_fragments_concatenate_in_order() {
        let n = normalizer();
        let text = n.normalize(&[
            Fragment::text("GM "),
            Fragment::other("frens"),
            Fragment::text("!"),
        ]);
        assert_eq!(text.as_str(), "gm frens!");
    }

    #[test]
    fn test_glyph_becomes_alias() {
        let n = normalizer();
        let text = n.normalize(&[Fragment::text("nice "), Fragment::glyph("😀")]);
        assert_eq!(text.as_str(), "nice :grinning:");
        assert!(!text.as_str().contains('😀'));
    }

    #[test]
    fn test_non_emoji_glyph_keeps_alt_text() {
        let n = normalizer();
        let text = n.normalize(&[Fragment::text("look "), Fragment::glyph("Image")]);
        assert_eq!(text.as_str(), "look image");
    }

    #[test]
    fn test_idempotent() {
        let n = normalizer();
        let inputs = [
            vec![Fragment::text("Hello @Bob, see http://x.y/z "), Fragment::glyph("🔥")],
            vec![Fragment::text("   ")],
            vec![Fragment::other("@a@b https://a https://b")],
        ];
        for fragments in inputs {
            let once = n.normalize(&fragments);
            let twice = n.normalize(&[Fragment::text(once.as_str())]);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_case_insensitive() {
        let n = normalizer();
        let raw = "You are SO wrong @Someone https://example.com/Path";
        assert_eq!(n.normalize_str(raw), n.normalize_str(&raw.to_uppercase()));
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        let n = normalizer();
        assert!(n.normalize(&[Fragment::text(" \n\t ")]).is_empty());
    }
}
