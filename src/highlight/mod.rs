//! Visual treatment of toxic posts
//!
//! Posts are tinted with a color interpolated between a low and a high
//! reference color by their score, or hidden outright when the user asked
//! for that. Posts that are no longer toxic, or that carry the treatment of
//! the other mode, are restored. Applying the same treatment twice is a no-op
//! on the page.

use crate::config::HighlightConfig;
use crate::dom::Page;
use crate::error::{Result, ToxwatchError};
use crate::scraper::ScrapedPost;
use crate::session::ToxicSet;

pub const BACKGROUND: &str = "background-color";
pub const DISPLAY: &str = "display";

/// An sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Parse `#rrggbb`
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.trim().strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    /// Linear interpolation; `t` is clamped to [0, 1]
    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }

    pub fn to_css(self) -> String {
        format!("rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Applies the toxic treatment to rendered posts
#[derive(Debug, Clone)]
pub struct Highlighter {
    low: Rgb,
    high: Rgb,
}

impl Highlighter {
    pub fn new(low: Rgb, high: Rgb) -> Self {
        Self { low, high }
    }

    pub fn from_config(config: &HighlightConfig) -> Result<Self> {
        let parse = |name: &str, value: &str| {
            Rgb::parse_hex(value).ok_or_else(|| ToxwatchError::InvalidConfigValue {
                path: format!("highlight.{}", name),
                message: format!("Expected a #rrggbb color, got '{}'", value),
            })
        };
        Ok(Self::new(
            parse("low_color", &config.low_color)?,
            parse("high_color", &config.high_color)?,
        ))
    }

    pub fn color_for(&self, score: f64) -> Rgb {
        self.low.lerp(self.high, score)
    }

    /// Bring every rendered post in line with the toxic set: matches get the
    /// tint (or are hidden), everything else loses any treatment it carried.
    /// Returns how many posts matched.
    pub fn apply(&self, page: &Page, posts: &[ScrapedPost], toxic: &ToxicSet, hide: bool) -> usize {
        let mut matched = 0;
        for post in posts {
            let Some(score) = toxic.score(&post.text) else {
                clear_post(page, post);
                continue;
            };
            matched += 1;
            if hide {
                page.remove_style(post.node, BACKGROUND);
                page.set_style(post.node, DISPLAY, "none");
            } else {
                page.remove_style(post.node, DISPLAY);
                page.set_style(post.node, BACKGROUND, &self.color_for(score).to_css());
            }
        }
        matched
    }

    /// Take the treatment off every post. Returns how many were touched.
    pub fn clear(&self, page: &Page, posts: &[ScrapedPost]) -> usize {
        posts.iter().filter(|post| clear_post(page, post)).count()
    }
}

fn clear_post(page: &Page, post: &ScrapedPost) -> bool {
    let shown = page.remove_style(post.node, DISPLAY);
    let untinted = page.remove_style(post.node, BACKGROUND);
    shown || untinted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::normalize::Normalizer;

    #[test]
    fn test_parse_hex() {
        assert_eq!(Rgb::parse_hex("#ff8000"), Some(Rgb { r: 255, g: 128, b: 0 }));
        assert_eq!(Rgb::parse_hex("ff8000"), None);
        assert_eq!(Rgb::parse_hex("#ff80"), None);
        assert_eq!(Rgb::parse_hex("#gg0000"), None);
    }

    #[test]
    fn test_lerp_is_monotonic_and_clamped() {
        let low = Rgb { r: 0, g: 200, b: 0 };
        let high = Rgb { r: 200, g: 0, b: 0 };

        assert_eq!(low.lerp(high, -1.0), low);
        assert_eq!(low.lerp(high, 2.0), high);
        assert_eq!(low.lerp(high, 0.5), Rgb { r: 100, g: 100, b: 0 });

        let mut previous = 0;
        for step in 0..=10 {
            let red = low.lerp(high, step as f64 / 10.0).r;
            assert!(red >= previous);
            previous = red;
        }
    }

    #[test]
    fn test_apply_is_idempotent() {
        let config = Config::default();
        let n = Normalizer::new(&config.normalize).unwrap();
        let highlighter = Highlighter::from_config(&config.highlight).unwrap();

        let page = Page::default();
        let root = page.read().root();
        let (bad, good) = page.mutate(root, |doc| {
            let bad = doc.create_element("div", &[]);
            let good = doc.create_element("div", &[]);
            doc.append_child(root, bad);
            doc.append_child(root, good);
            (bad, good)
        });
        let posts = vec![
            ScrapedPost { node: bad, text: n.normalize_str("hello world") },
            ScrapedPost { node: good, text: n.normalize_str("gm frens") },
        ];
        let mut toxic = ToxicSet::new(0.5);
        toxic.update(&n.normalize_str("hello world"), 1.0);

        assert_eq!(highlighter.apply(&page, &posts, &toxic, false), 1);
        let first = page.read().style(bad, BACKGROUND).map(str::to_string);
        assert_eq!(first.as_deref(), Some("rgb(230, 57, 70)"));

        let mut rx = page.subscribe();
        assert_eq!(highlighter.apply(&page, &posts, &toxic, false), 1);
        // Nothing changed, so nothing was announced
        assert!(rx.try_recv().is_err());
        assert!(page.read().style(good, BACKGROUND).is_none());

        highlighter.apply(&page, &posts, &toxic, true);
        assert_eq!(page.read().style(bad, DISPLAY), Some("none"));
    }

    #[test]
    fn test_apply_removes_stale_treatment() {
        let config = Config::default();
        let n = Normalizer::new(&config.normalize).unwrap();
        let highlighter = Highlighter::from_config(&config.highlight).unwrap();

        let page = Page::default();
        let root = page.read().root();
        let node = page.mutate(root, |doc| {
            let node = doc.create_element("div", &[]);
            doc.append_child(root, node);
            node
        });
        let text = n.normalize_str("you fool");
        let posts = vec![ScrapedPost { node, text: text.clone() }];
        let mut toxic = ToxicSet::new(0.5);
        toxic.update(&text, 0.9);

        // Hide, then switch back to tinting
        highlighter.apply(&page, &posts, &toxic, true);
        highlighter.apply(&page, &posts, &toxic, false);
        assert!(page.read().style(node, DISPLAY).is_none());
        assert!(page.read().style(node, BACKGROUND).is_some());

        // Tint, then switch to hiding
        highlighter.apply(&page, &posts, &toxic, true);
        assert!(page.read().style(node, BACKGROUND).is_none());
        assert_eq!(page.read().style(node, DISPLAY), Some("none"));

        // A recheck scores it below the threshold
        toxic.update(&text, 0.2);
        assert_eq!(highlighter.apply(&page, &posts, &toxic, true), 0);
        assert!(page.read().style(node, DISPLAY).is_none());

        // Clean posts stay quiet on later passes
        let mut rx = page.subscribe();
        highlighter.apply(&page, &posts, &toxic, false);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_clear_counts_touched_posts() {
        let config = Config::default();
        let n = Normalizer::new(&config.normalize).unwrap();
        let highlighter = Highlighter::from_config(&config.highlight).unwrap();

        let page = Page::default();
        let root = page.read().root();
        let (a, b) = page.mutate(root, |doc| {
            let a = doc.create_element("div", &[]);
            let b = doc.create_element("div", &[]);
            doc.append_child(root, a);
            doc.append_child(root, b);
            (a, b)
        });
        page.set_style(a, BACKGROUND, "rgb(1, 2, 3)");
        let posts = vec![
            ScrapedPost { node: a, text: n.normalize_str("one") },
            ScrapedPost { node: b, text: n.normalize_str("two") },
        ];

        assert_eq!(highlighter.clear(&page, &posts), 1);
        assert_eq!(highlighter.clear(&page, &posts), 0);
        assert!(page.read().style(a, BACKGROUND).is_none());
    }
}
