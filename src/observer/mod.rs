//! Observation controller
//!
//! A single task owns the current [`Session`] and reacts, one event at a
//! time, to page events, timer ticks, and commands. Because nothing else
//! touches the session, a scrape, its ledger updates and its buffer appends
//! can never interleave with another handler.
//!
//! State machine: `Idle -> Observing -> Idle`. Starting while observing and
//! stopping while idle are no-ops. Stopping drops the page subscription and
//! every timer before it is acknowledged, so nothing from the old epoch runs
//! after [`ObserverHandle::stop`] returns.

mod timer;

pub use timer::PeriodicTimer;

use crate::config::Config;
use crate::dom::{MutationKind, NodeId, Page, PageEvent, Selector};
use crate::error::{Result, ToxwatchError};
use crate::highlight::Highlighter;
use crate::normalize::{NormalizedText, Normalizer};
use crate::scraper::Scraper;
use crate::session::{BufferedItem, ClassificationResult, ProgressReport, Session};
use crate::store::{StatusKey, StatusStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

const COMMAND_CAPACITY: usize = 256;

/// Observation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationState {
    Idle,
    Observing,
}

impl ObservationState {
    pub fn as_str(self) -> &'static str {
        match self {
            ObservationState::Idle => "idle",
            ObservationState::Observing => "observing",
        }
    }
}

/// Commands accepted by the observer task
#[derive(Debug)]
pub enum Command {
    Start {
        ack: oneshot::Sender<ObservationState>,
    },
    Stop {
        ack: oneshot::Sender<ObservationState>,
    },
    /// Classifier results for a batch dispatched in `epoch`
    ResultReady {
        epoch: Uuid,
        results: Vec<ClassificationResult>,
    },
    /// Single-item classification requested through [`Command::Recheck`]
    UserItemResult { epoch: Uuid, id: u64, score: f64 },
    /// Ask for one recorded item to be classified again
    Recheck { id: u64, reply: oneshot::Sender<bool> },
    Progress {
        reply: oneshot::Sender<ProgressReport>,
    },
    State {
        reply: oneshot::Sender<ObservationState>,
    },
    Shutdown,
}

/// Requests from the observer to the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    SubmitBatch {
        epoch: Uuid,
        items: Vec<BufferedItem>,
    },
    SubmitSingle {
        epoch: Uuid,
        id: u64,
        text: NormalizedText,
    },
    Progress(ProgressReport),
}

/// Cloneable handle to a running observer
#[derive(Debug, Clone)]
pub struct ObserverHandle {
    tx: mpsc::Sender<Command>,
}

impl ObserverHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ToxwatchError::ChannelClosed("observer"))
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| ToxwatchError::ChannelClosed("observer reply"))
    }

    /// Start observing; resolves once the request has been handled
    pub async fn start(&self) -> Result<ObservationState> {
        self.request(|ack| Command::Start { ack }).await
    }

    /// Stop observing; once this resolves no callback of the old epoch runs
    pub async fn stop(&self) -> Result<ObservationState> {
        self.request(|ack| Command::Stop { ack }).await
    }

    pub async fn state(&self) -> Result<ObservationState> {
        self.request(|reply| Command::State { reply }).await
    }

    pub async fn progress(&self) -> Result<ProgressReport> {
        self.request(|reply| Command::Progress { reply }).await
    }

    pub async fn recheck(&self, id: u64) -> Result<bool> {
        self.request(|reply| Command::Recheck { id, reply }).await
    }

    pub async fn result_ready(&self, epoch: Uuid, results: Vec<ClassificationResult>) -> Result<()> {
        self.send(Command::ResultReady { epoch, results }).await
    }

    pub async fn user_item_result(&self, epoch: Uuid, id: u64, score: f64) -> Result<()> {
        self.send(Command::UserItemResult { epoch, id, score }).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }
}

/// Settings the observer needs from configuration
#[derive(Debug, Clone)]
pub struct ObserverSettings {
    pub container: Selector,
    pub detail: Selector,
    pub wait_interval: Duration,
    pub wait_max_attempts: u32,
    pub min_batch_size: usize,
    pub min_flush_interval: Duration,
    pub poll_interval: Duration,
    pub highlight_interval: Duration,
    pub progress_interval: Duration,
    pub threshold: f64,
}

impl ObserverSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            container: Selector::parse(&config.page.container_selector)?,
            detail: Selector::parse(&config.page.detail_selector)?,
            wait_interval: config.wait_interval()?,
            wait_max_attempts: config.page.wait_max_attempts,
            min_batch_size: config.batching.min_batch_size,
            min_flush_interval: config.min_flush_interval()?,
            poll_interval: config.poll_interval()?,
            highlight_interval: config.highlight_interval()?,
            progress_interval: config.progress_interval()?,
            threshold: config.highlight.threshold,
        })
    }
}

enum LoopEvent {
    Command(Command),
    Page(std::result::Result<PageEvent, broadcast::error::RecvError>),
    WaitTick,
    PollTick,
    HighlightTick,
    ProgressTick,
}

/// The observation controller task
pub struct Observer {
    settings: ObserverSettings,
    page: Page,
    scraper: Scraper,
    highlighter: Highlighter,
    store: Arc<dyn StatusStore>,
    outbound: mpsc::Sender<Outbound>,
    commands: mpsc::Receiver<Command>,

    state: ObservationState,
    session: Option<Session>,
    container: Option<NodeId>,
    events: Option<broadcast::Receiver<PageEvent>>,
    wait_attempts: u32,

    wait_timer: PeriodicTimer,
    poll_timer: PeriodicTimer,
    highlight_timer: PeriodicTimer,
    progress_timer: PeriodicTimer,
}

impl Observer {
    pub fn new(
        settings: ObserverSettings,
        page: Page,
        scraper: Scraper,
        highlighter: Highlighter,
        store: Arc<dyn StatusStore>,
        outbound: mpsc::Sender<Outbound>,
    ) -> (Self, ObserverHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let observer = Self {
            wait_timer: PeriodicTimer::new("wait", settings.wait_interval),
            poll_timer: PeriodicTimer::new("poll", settings.poll_interval),
            highlight_timer: PeriodicTimer::new("highlight", settings.highlight_interval),
            progress_timer: PeriodicTimer::new("progress", settings.progress_interval),
            settings,
            page,
            scraper,
            highlighter,
            store,
            outbound,
            commands,
            state: ObservationState::Idle,
            session: None,
            container: None,
            events: None,
            wait_attempts: 0,
        };
        (observer, ObserverHandle { tx })
    }

    /// Build every component from configuration
    pub fn from_config(
        config: &Config,
        page: Page,
        store: Arc<dyn StatusStore>,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<(Self, ObserverHandle)> {
        let normalizer = Normalizer::new(&config.normalize)?;
        let scraper = Scraper::from_config(&config.page, normalizer)?;
        let highlighter = Highlighter::from_config(&config.highlight)?;
        let settings = ObserverSettings::from_config(config)?;
        Ok(Self::new(settings, page, scraper, highlighter, store, outbound))
    }

    /// Spawn the observer task
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Event loop; returns on shutdown or when every handle is dropped
    pub async fn run(mut self) {
        while let Some(event) = self.next_event().await {
            match event {
                LoopEvent::Command(Command::Shutdown) => {
                    self.stop().await;
                    break;
                }
                LoopEvent::Command(command) => self.handle_command(command).await,
                LoopEvent::Page(event) => self.handle_page_event(event),
                LoopEvent::WaitTick => self.on_wait_tick(),
                LoopEvent::PollTick => self.on_poll_tick().await,
                LoopEvent::HighlightTick => self.on_highlight_tick(),
                LoopEvent::ProgressTick => self.on_progress_tick().await,
            }
        }
        self.stop().await;
        tracing::info!("Observer finished");
    }

    async fn next_event(&mut self) -> Option<LoopEvent> {
        tokio::select! {
            // Commands first so a stop always beats pending ticks
            biased;
            command = self.commands.recv() => command.map(LoopEvent::Command),
            event = recv_page_event(&mut self.events) => Some(LoopEvent::Page(event)),
            _ = self.wait_timer.tick() => Some(LoopEvent::WaitTick),
            _ = self.poll_timer.tick() => Some(LoopEvent::PollTick),
            _ = self.highlight_timer.tick() => Some(LoopEvent::HighlightTick),
            _ = self.progress_timer.tick() => Some(LoopEvent::ProgressTick),
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { ack } => {
                self.start();
                let _ = ack.send(self.state);
            }
            Command::Stop { ack } => {
                self.stop().await;
                let _ = ack.send(self.state);
            }
            Command::ResultReady { epoch, results } => self.apply_results(epoch, &results),
            Command::UserItemResult { epoch, id, score } => {
                self.apply_results(epoch, &[ClassificationResult::score(id, score)])
            }
            Command::Recheck { id, reply } => {
                let queued = self.recheck(id).await;
                let _ = reply.send(queued);
            }
            Command::Progress { reply } => {
                let _ = reply.send(self.progress());
            }
            Command::State { reply } => {
                let _ = reply.send(self.state);
            }
            Command::Shutdown => {}
        }
    }

    fn start(&mut self) {
        if self.state == ObservationState::Observing {
            tracing::debug!("Start ignored, already observing");
            return;
        }

        let session = Session::new(
            self.settings.min_batch_size,
            self.settings.min_flush_interval,
            self.settings.threshold,
            Instant::now(),
        );
        tracing::info!("Observation started (epoch {})", session.id);
        self.session = Some(session);
        self.state = ObservationState::Observing;
        self.wait_attempts = 0;

        if !self.try_attach() {
            tracing::debug!("Container {} not present yet, waiting", self.settings.container);
            self.wait_timer.start();
        }
    }

    async fn stop(&mut self) {
        if self.state == ObservationState::Idle {
            return;
        }

        self.events = None;
        self.wait_timer.stop();
        self.poll_timer.stop();
        self.highlight_timer.stop();
        self.progress_timer.stop();
        self.clear_treatment();
        self.container = None;
        if let Some(session) = self.session.take() {
            tracing::info!(
                "Observation stopped (epoch {}, {} posts seen)",
                session.id,
                session.ledger().len()
            );
        }
        self.state = ObservationState::Idle;

        self.send_outbound(Outbound::Progress(self.progress())).await;
    }

    /// Find the container and hook everything onto it
    fn try_attach(&mut self) -> bool {
        let container = {
            let doc = self.page.read();
            doc.query_first(doc.root(), &self.settings.container)
        };
        let Some(container) = container else {
            return false;
        };

        // Subscribe before the initial scrape so no mutation falls in between
        self.events = Some(self.page.subscribe());
        self.container = Some(container);
        self.scrape_and_record();

        self.poll_timer.start();
        self.highlight_timer.start();
        self.progress_timer.start();
        tracing::info!("Container found, observer attached");
        true
    }

    fn on_wait_tick(&mut self) {
        if self.state != ObservationState::Observing || self.container.is_some() {
            self.wait_timer.stop();
            return;
        }

        self.wait_attempts += 1;
        if self.try_attach() {
            self.wait_timer.stop();
        } else if self.wait_attempts >= self.settings.wait_max_attempts {
            tracing::warn!(
                "Container {} not found after {} attempts, giving up",
                self.settings.container,
                self.wait_attempts
            );
            self.wait_timer.stop();
            self.session = None;
            self.state = ObservationState::Idle;
            if let Err(e) = self.store.set(StatusKey::ObservationActive, false) {
                tracing::warn!("Failed to clear {}: {}", StatusKey::ObservationActive.as_str(), e);
            }
        }
    }

    fn handle_page_event(&mut self, event: std::result::Result<PageEvent, broadcast::error::RecvError>) {
        let Some(container) = self.container else {
            return;
        };

        match event {
            Ok(PageEvent::Mutation {
                target,
                kind: MutationKind::ChildList,
            }) => {
                if self.page.read().contains(container, target) {
                    self.scrape_and_record();
                }
            }
            Ok(PageEvent::Mutation { .. }) => {}
            Ok(PageEvent::Click { target }) => {
                let opens_detail = {
                    let doc = self.page.read();
                    doc.contains(container, target)
                        && doc.closest(target, &self.settings.detail).is_some()
                };
                if opens_detail {
                    self.reset_epoch("entered detail view");
                }
            }
            Ok(PageEvent::PopState) => self.reset_epoch("navigated back"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // A navigation may be among the skipped events
                tracing::warn!("Missed {} page events, starting over", skipped);
                self.reset_epoch("missed page events");
                self.scrape_and_record();
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::warn!("Page event stream closed");
                self.events = None;
            }
        }
    }

    fn scrape_and_record(&mut self) {
        let (Some(container), Some(session)) = (self.container, self.session.as_mut()) else {
            return;
        };
        let texts = {
            let doc = self.page.read();
            self.scraper.scrape(&doc, container)
        };
        let stats = session.ingest(&texts);
        if stats.new > 0 {
            tracing::debug!("Scraped {} posts, {} new", stats.scraped, stats.new);
        }
    }

    /// Start a fresh epoch: empty ledger, buffer and toxic set
    fn reset_epoch(&mut self, reason: &str) {
        if self.session.is_none() {
            return;
        }
        let session = Session::new(
            self.settings.min_batch_size,
            self.settings.min_flush_interval,
            self.settings.threshold,
            Instant::now(),
        );
        tracing::info!("Resetting seen posts ({}), new epoch {}", reason, session.id);
        self.session = Some(session);
        // Toxic set is empty again, so this only strips old treatment
        self.on_highlight_tick();
    }

    /// Restore every rendered post in the container
    fn clear_treatment(&self) {
        let Some(container) = self.container else {
            return;
        };
        let posts = {
            let doc = self.page.read();
            self.scraper.scrape_posts(&doc, container)
        };
        let cleared = self.highlighter.clear(&self.page, &posts);
        if cleared > 0 {
            tracing::debug!("Removed treatment from {} posts", cleared);
        }
    }

    async fn on_poll_tick(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let items = session.try_flush(Instant::now());
        if items.is_empty() {
            return;
        }
        let epoch = session.id;
        tracing::debug!("Dispatching batch of {} posts (epoch {})", items.len(), epoch);
        self.send_outbound(Outbound::SubmitBatch { epoch, items }).await;
    }

    fn on_highlight_tick(&mut self) {
        let (Some(container), Some(session)) = (self.container, self.session.as_ref()) else {
            return;
        };
        let posts = {
            let doc = self.page.read();
            self.scraper.scrape_posts(&doc, container)
        };
        let hide = self.store.get(StatusKey::HideToxic);
        let marked = self.highlighter.apply(&self.page, &posts, session.toxic(), hide);
        tracing::trace!("Highlight pass: {} of {} rendered posts toxic", marked, posts.len());
    }

    async fn on_progress_tick(&mut self) {
        let report = self.progress();
        self.send_outbound(Outbound::Progress(report)).await;
    }

    fn apply_results(&mut self, epoch: Uuid, results: &[ClassificationResult]) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("Dropping {} results, not observing", results.len());
            return;
        };
        if session.id != epoch {
            tracing::debug!(
                "Dropping {} results from stale epoch {}",
                results.len(),
                epoch
            );
            return;
        }
        let stats = session.apply_results(results);
        tracing::debug!(
            "Applied {} results ({} toxic, {} unknown)",
            stats.applied,
            stats.toxic,
            stats.dropped
        );
    }

    async fn recheck(&mut self, id: u64) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        let Some(text) = session.ledger().lookup_text(id).cloned() else {
            return false;
        };
        let epoch = session.id;
        self.send_outbound(Outbound::SubmitSingle { epoch, id, text }).await;
        true
    }

    fn progress(&self) -> ProgressReport {
        match &self.session {
            Some(session) => session.progress(self.state == ObservationState::Observing),
            None => ProgressReport::default(),
        }
    }

    async fn send_outbound(&self, message: Outbound) {
        if self.outbound.send(message).await.is_err() {
            tracing::warn!("Coordinator is gone, outbound message dropped");
        }
    }
}

async fn recv_page_event(
    events: &mut Option<broadcast::Receiver<PageEvent>>,
) -> std::result::Result<PageEvent, broadcast::error::RecvError> {
    match events.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
