// Minimal element selectors: `tag`, `[attr]`, `[attr='value']`, `tag[attr='value']`

use super::{Document, NodeId};
use crate::error::{Result, ToxwatchError};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute condition inside `[...]`
#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatch {
    name: String,
    value: Option<String>,
}

/// Compiled selector matching a single element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    tag: Option<String>,
    attrs: Vec<AttrMatch>,
}

impl Selector {
    /// Parse a selector string
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(ToxwatchError::Selector("empty selector".to_string()));
        }

        let (tag_part, mut rest) = match source.find('[') {
            Some(idx) => (&source[..idx], &source[idx..]),
            None => (source, ""),
        };

        let tag = if tag_part.is_empty() {
            None
        } else if tag_part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            Some(tag_part.to_ascii_lowercase())
        } else {
            return Err(ToxwatchError::Selector(format!(
                "unsupported tag '{}' in '{}'",
                tag_part, source
            )));
        };

        let mut attrs = Vec::new();
        while !rest.is_empty() {
            let inner_end = rest.find(']').ok_or_else(|| {
                ToxwatchError::Selector(format!("unterminated '[' in '{}'", source))
            })?;
            if !rest.starts_with('[') {
                return Err(ToxwatchError::Selector(format!(
                    "unexpected '{}' in '{}'",
                    rest, source
                )));
            }
            attrs.push(parse_attr(&rest[1..inner_end], source)?);
            rest = &rest[inner_end + 1..];
        }

        Ok(Self {
            source: source.to_string(),
            tag,
            attrs,
        })
    }

    /// Check whether an element with this tag and attributes matches
    pub fn matches(&self, tag: &str, attrs: &BTreeMap<String, String>) -> bool {
        if let Some(expected) = &self.tag {
            if !expected.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        self.attrs.iter().all(|m| match (attrs.get(&m.name), &m.value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    /// Create a detached element this selector matches (`div` when untagged)
    pub fn instantiate(&self, doc: &mut Document) -> NodeId {
        let tag = self.tag.as_deref().unwrap_or("div");
        let attrs: Vec<(&str, &str)> = self
            .attrs
            .iter()
            .map(|m| (m.name.as_str(), m.value.as_deref().unwrap_or("")))
            .collect();
        doc.create_element(tag, &attrs)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_attr(inner: &str, source: &str) -> Result<AttrMatch> {
    let (name, value) = match inner.split_once('=') {
        Some((name, value)) => {
            let value = value.trim();
            let unquoted = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                .unwrap_or(value);
            (name.trim(), Some(unquoted.to_string()))
        }
        None => (inner.trim(), None),
    };

    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ToxwatchError::Selector(format!(
            "bad attribute name '{}' in '{}'",
            name, source
        )));
    }

    Ok(AttrMatch {
        name: name.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_tag_and_attribute() {
        let sel = Selector::parse("div[data-testid='tweetText']").unwrap();
        assert!(sel.matches("div", &attrs(&[("data-testid", "tweetText")])));
        assert!(sel.matches("DIV", &attrs(&[("data-testid", "tweetText"), ("dir", "auto")])));
        assert!(!sel.matches("span", &attrs(&[("data-testid", "tweetText")])));
        assert!(!sel.matches("div", &attrs(&[("data-testid", "User-Name")])));
    }

    #[test]
    fn test_bare_tag_and_presence() {
        assert!(Selector::parse("article").unwrap().matches("article", &attrs(&[])));
        let presence = Selector::parse("[role]").unwrap();
        assert!(presence.matches("main", &attrs(&[("role", "main")])));
        assert!(!presence.matches("main", &attrs(&[])));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("div[role='main'").is_err());
        assert!(Selector::parse("div > span").is_err());
        assert!(Selector::parse("div[=x]").is_err());
    }

    #[test]
    fn test_instantiate_matches_itself() {
        let sel = Selector::parse("main[role='main']").unwrap();
        let mut doc = Document::new();
        let node = sel.instantiate(&mut doc);
        assert!(doc.matches(node, &sel));
        assert_eq!(doc.tag(node), Some("main"));
    }
}
