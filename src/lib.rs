//! Toxwatch - timeline toxicity watcher
//!
//! Scrapes posts from a live page as they render, records each distinct
//! normalized text once per epoch, ships new posts to a toxicity classifier
//! in batches, and highlights or hides the posts it reports as toxic.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod dom;
pub mod error;
pub mod highlight;
pub mod normalize;
pub mod observer;
pub mod scraper;
pub mod session;
pub mod store;

pub use error::{Result, ToxwatchError};
