//! Post scraper
//!
//! One-shot extraction of the posts currently rendered under a root node.
//! The only component that knows what the page looks like; the post
//! predicate comes from configuration.

use crate::config::PageConfig;
use crate::dom::{Document, NodeId, Selector};
use crate::error::Result;
use crate::normalize::{Fragment, NormalizedText, Normalizer};

/// A rendered post and its normalized text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedPost {
    pub node: NodeId,
    pub text: NormalizedText,
}

/// Scraper for post containers
#[derive(Debug, Clone)]
pub struct Scraper {
    post_selector: Selector,
    normalizer: Normalizer,
}

impl Scraper {
    pub fn new(post_selector: Selector, normalizer: Normalizer) -> Self {
        Self {
            post_selector,
            normalizer,
        }
    }

    pub fn from_config(page: &PageConfig, normalizer: Normalizer) -> Result<Self> {
        Ok(Self::new(Selector::parse(&page.post_selector)?, normalizer))
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Normalized text of every post under `root`, in document order
    pub fn scrape(&self, doc: &Document, root: NodeId) -> Vec<NormalizedText> {
        self.scrape_posts(doc, root)
            .into_iter()
            .map(|post| post.text)
            .collect()
    }

    /// Like [`Scraper::scrape`] but keeps the node of each post
    pub fn scrape_posts(&self, doc: &Document, root: NodeId) -> Vec<ScrapedPost> {
        let mut posts = Vec::new();
        for node in doc.query_all(root, &self.post_selector) {
            match self.extract(doc, node) {
                Some(text) => posts.push(ScrapedPost { node, text }),
                None => tracing::trace!("Skipping post container {:?} with no usable text", node),
            }
        }
        posts
    }

    fn extract(&self, doc: &Document, container: NodeId) -> Option<NormalizedText> {
        let fragments = fragments_of(doc, container);
        if fragments.is_empty() {
            return None;
        }
        let text = self.normalizer.normalize(&fragments);
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Raw fragments of a post container, one per direct child
fn fragments_of(doc: &Document, container: NodeId) -> Vec<Fragment> {
    doc.children(container)
        .iter()
        .map(|&child| {
            if doc.is_text(child) {
                return Fragment::text(doc.text_content(child));
            }
            match doc.tag(child) {
                Some("span") => Fragment::text(doc.text_content(child)),
                Some("img") => Fragment::glyph(doc.attr(child, "alt").unwrap_or_default()),
                _ => Fragment::other(doc.text_content(child)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn scraper() -> Scraper {
        let config = Config::default();
        let normalizer = Normalizer::new(&config.normalize).unwrap();
        Scraper::from_config(&config.page, normalizer).unwrap()
    }

    fn add_post(doc: &mut Document, parent: NodeId, parts: &[(&str, &str)]) -> NodeId {
        let post = doc.create_element("div", &[("data-testid", "tweetText")]);
        for (tag, value) in parts {
            let child = match *tag {
                "img" => doc.create_element("img", &[("alt", *value)]),
                "#text" => doc.create_text(value),
                other => {
                    let el = doc.create_element(other, &[]);
                    let text = doc.create_text(value);
                    doc.append_child(el, text);
                    el
                }
            };
            doc.append_child(post, child);
        }
        doc.append_child(parent, post);
        post
    }

    #[test]
    fn test_scrape_in_order_with_glyphs() {
        let mut doc = Document::new();
        let root = doc.root();
        add_post(&mut doc, root, &[("span", "Hello "), ("img", "👋"), ("a", " @Ann")]);
        add_post(&mut doc, root, &[("#text", "GM frens")]);

        let texts = scraper().scrape(&doc, root);
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0].as_str(), "hello :wave: @user");
        assert_eq!(texts[1].as_str(), "gm frens");
    }

    #[test]
    fn test_malformed_containers_are_skipped() {
        let mut doc = Document::new();
        let root = doc.root();
        // No children at all
        let empty = doc.create_element("div", &[("data-testid", "tweetText")]);
        doc.append_child(root, empty);
        // Image without alt, whitespace only
        add_post(&mut doc, root, &[("img", ""), ("span", "   ")]);
        let good = add_post(&mut doc, root, &[("span", "still here")]);

        let posts = scraper().scrape_posts(&doc, root);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].node, good);
    }

    #[test]
    fn test_only_under_root() {
        let mut doc = Document::new();
        let body = doc.root();
        let main = doc.create_element("main", &[("role", "main")]);
        doc.append_child(body, main);
        add_post(&mut doc, body, &[("span", "sidebar")]);
        add_post(&mut doc, main, &[("span", "timeline")]);

        let texts = scraper().scrape(&doc, main);
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].as_str(), "timeline");
    }
}
