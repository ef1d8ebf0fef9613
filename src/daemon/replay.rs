//! Scripted page timeline
//!
//! A replay file is a JSON list of steps, each waiting `after` since the
//! previous step and then performing one page action:
//!
//! ```json
//! [
//!   {"after": "0ms", "action": "mount_container"},
//!   {"after": "200ms", "action": "mount_post", "key": "a", "text": "Hi @bob", "glyphs": ["😀"]},
//!   {"after": "3s", "action": "open_detail", "key": "a"},
//!   {"after": "1s", "action": "go_back"}
//! ]
//! ```
//!
//! Elements are built from the configured selectors so the observer sees
//! exactly what it is configured to look for.

use crate::config::{parse_duration, PageConfig};
use crate::dom::{NodeId, Page, Selector};
use crate::error::{Result, ToxwatchError};
use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One page action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplayAction {
    /// Render the timeline container
    MountContainer,
    /// Render a post; glyphs become emoji images after the text
    MountPost {
        key: String,
        text: String,
        #[serde(default)]
        glyphs: Vec<String>,
    },
    UnmountPost { key: String },
    /// Click a post, entering its detail view
    OpenDetail { key: String },
    /// History back
    GoBack,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default = "default_after")]
    after: String,
    #[serde(flatten)]
    action: ReplayAction,
}

fn default_after() -> String {
    "0ms".to_string()
}

/// A parsed step
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayStep {
    pub after: Duration,
    pub action: ReplayAction,
}

/// Parsed timeline
#[derive(Debug, Clone)]
pub struct Replay {
    steps: Vec<ReplayStep>,
}

impl Replay {
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Vec<RawStep> = serde_json::from_str(json).map_err(|e| ToxwatchError::Json {
            source: e,
            context: "Failed to parse replay file".to_string(),
        })?;

        let steps = raw
            .into_iter()
            .map(|step| {
                Ok(ReplayStep {
                    after: parse_duration(&step.after)?,
                    action: step.action,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { steps })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ToxwatchError::Io {
            source: e,
            context: format!("Failed to read replay file: {}", path.display()),
        })?;
        Self::from_json(&content)
    }

    pub fn steps(&self) -> &[ReplayStep] {
        &self.steps
    }

    /// Perform every step on the stage, sleeping between them
    pub async fn play(self, mut stage: Stage) {
        tracing::info!("Replaying {} page actions", self.steps.len());
        for step in self.steps {
            tokio::time::sleep(step.after).await;
            stage.perform(&step.action);
        }
        tracing::info!("Replay finished");
    }
}

/// Builds and tracks the elements a replay acts on
pub struct Stage {
    page: Page,
    container_selector: Selector,
    post_selector: Selector,
    detail_selector: Selector,
    container: Option<NodeId>,
    // key -> (detail wrapper, post element)
    posts: HashMap<String, (NodeId, NodeId)>,
}

impl Stage {
    pub fn new(page: Page, config: &PageConfig) -> Result<Self> {
        Ok(Self {
            page,
            container_selector: Selector::parse(&config.container_selector)?,
            post_selector: Selector::parse(&config.post_selector)?,
            detail_selector: Selector::parse(&config.detail_selector)?,
            container: None,
            posts: HashMap::new(),
        })
    }

    pub fn perform(&mut self, action: &ReplayAction) {
        tracing::debug!("Replay: {:?}", action);
        match action {
            ReplayAction::MountContainer => {
                self.ensure_container();
            }
            ReplayAction::MountPost { key, text, glyphs } => self.mount_post(key, text, glyphs),
            ReplayAction::UnmountPost { key } => match self.posts.remove(key) {
                Some((wrapper, _)) => {
                    self.page.remove(wrapper);
                }
                None => tracing::warn!("Replay: no mounted post '{}'", key),
            },
            ReplayAction::OpenDetail { key } => match self.posts.get(key) {
                Some(&(_, post)) => self.page.click(post),
                None => tracing::warn!("Replay: no mounted post '{}'", key),
            },
            ReplayAction::GoBack => self.page.pop_state(),
        }
    }

    fn ensure_container(&mut self) -> NodeId {
        if let Some(container) = self.container {
            return container;
        }
        let root = self.page.read().root();
        let selector = &self.container_selector;
        let container = self.page.mutate(root, |doc| {
            let node = selector.instantiate(doc);
            doc.append_child(root, node);
            node
        });
        self.container = Some(container);
        container
    }

    fn mount_post(&mut self, key: &str, text: &str, glyphs: &[String]) {
        let container = self.ensure_container();
        if let Some((wrapper, _)) = self.posts.remove(key) {
            self.page.remove(wrapper);
        }

        let (detail, post_selector) = (&self.detail_selector, &self.post_selector);
        let nodes = self.page.mutate(container, |doc| {
            let wrapper = detail.instantiate(doc);
            let post = post_selector.instantiate(doc);
            let span = doc.create_element("span", &[]);
            let body = doc.create_text(text);
            doc.append_child(span, body);
            doc.append_child(post, span);
            for glyph in glyphs {
                let img = doc.create_element("img", &[("alt", glyph.as_str())]);
                doc.append_child(post, img);
            }
            doc.append_child(wrapper, post);
            doc.append_child(container, wrapper);
            (wrapper, post)
        });
        self.posts.insert(key.to_string(), nodes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dom::PageEvent;

    const TIMELINE: &str = r#"[
        {"action": "mount_container"},
        {"after": "200ms", "action": "mount_post", "key": "a", "text": "Hi @bob", "glyphs": ["😀"]},
        {"after": "1s", "action": "open_detail", "key": "a"},
        {"after": "1s", "action": "go_back"},
        {"after": "100ms", "action": "unmount_post", "key": "a"}
    ]"#;

    #[test]
    fn test_parse_steps() {
        let replay = Replay::from_json(TIMELINE).unwrap();
        assert_eq!(replay.steps().len(), 5);
        assert_eq!(replay.steps()[0].after, Duration::ZERO);
        assert_eq!(replay.steps()[1].after, Duration::from_millis(200));
        assert_eq!(replay.steps()[3].action, ReplayAction::GoBack);
    }

    #[test]
    fn test_rejects_bad_duration() {
        let err = Replay::from_json(r#"[{"after": "soon", "action": "go_back"}]"#);
        assert!(err.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_builds_matching_elements() {
        let config = Config::default();
        let page = Page::default();
        let mut events = page.subscribe();
        let stage = Stage::new(page.clone(), &config.page).unwrap();

        let replay = Replay::from_json(TIMELINE).unwrap();
        replay.play(stage).await;

        let mut clicks = 0;
        let mut pops = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                PageEvent::Click { .. } => clicks += 1,
                PageEvent::PopState => pops += 1,
                PageEvent::Mutation { .. } => {}
            }
        }
        assert_eq!((clicks, pops), (1, 1));

        let doc = page.read();
        let container = doc
            .query_first(doc.root(), &Selector::parse(&config.page.container_selector).unwrap())
            .unwrap();
        let posts = Selector::parse(&config.page.post_selector).unwrap();
        assert!(doc.query_all(container, &posts).is_empty());
    }

    #[test]
    fn test_mounted_post_is_scrapable() {
        let config = Config::default();
        let page = Page::default();
        let mut stage = Stage::new(page.clone(), &config.page).unwrap();
        stage.perform(&ReplayAction::MountPost {
            key: "x".to_string(),
            text: "Look at https://t.co/abc".to_string(),
            glyphs: vec![],
        });

        let normalizer = crate::normalize::Normalizer::new(&config.normalize).unwrap();
        let scraper = crate::scraper::Scraper::from_config(&config.page, normalizer).unwrap();
        let doc = page.read();
        let texts = scraper.scrape(&doc, doc.root());
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].as_str(), "look at httpurl");
    }
}
