//! Coordinator
//!
//! Sits between the popup surface, the observer, and the classifier. It
//! forwards batches to the classifier on their own tasks so a slow request
//! never blocks the observer, and routes results back tagged with the epoch
//! they were dispatched in.

use crate::classifier::{BatchEntry, Classifier};
use crate::error::Result;
use crate::observer::{ObservationState, ObserverHandle, Outbound};
use crate::session::{BufferedItem, ProgressReport};
use crate::store::{StatusKey, StatusStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Snapshot returned by the status command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: ObservationState,
    pub classifier: String,
    pub progress: ProgressReport,
    pub flags: BTreeMap<StatusKey, bool>,
}

/// Popup-facing handle. Cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn StatusStore>,
    observer: ObserverHandle,
    progress: watch::Receiver<ProgressReport>,
}

impl Coordinator {
    /// Spawn the dispatcher that drains the observer's outbound channel
    pub fn spawn(
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn StatusStore>,
        observer: ObserverHandle,
        outbound: mpsc::Receiver<Outbound>,
    ) -> (Self, JoinHandle<()>) {
        let (progress_tx, progress_rx) = watch::channel(ProgressReport::default());
        let dispatcher = Dispatcher {
            classifier: classifier.clone(),
            observer: observer.clone(),
            progress: progress_tx,
        };
        let handle = tokio::spawn(dispatcher.run(outbound));

        let coordinator = Self {
            classifier,
            store,
            observer,
            progress: progress_rx,
        };
        (coordinator, handle)
    }

    /// Start observing if the stored flag says so; called once at boot
    pub async fn auto_start(&self) -> Result<ObservationState> {
        if self.store.get(StatusKey::ObservationActive) {
            tracing::info!("Observation was active, resuming");
            self.observer.start().await
        } else {
            self.observer.state().await
        }
    }

    pub async fn start(&self) -> Result<ObservationState> {
        self.store.set(StatusKey::ObservationActive, true)?;
        self.observer.start().await
    }

    pub async fn stop(&self) -> Result<ObservationState> {
        self.store.set(StatusKey::ObservationActive, false)?;
        self.observer.stop().await
    }

    /// Classify free text entered by the user
    pub async fn analyze(&self, text: &str) -> Result<f64> {
        self.classifier.analyze_single(text).await
    }

    /// Queue a recorded item for single classification. False if the id is
    /// unknown in the current epoch.
    pub async fn recheck(&self, id: u64) -> Result<bool> {
        self.observer.recheck(id).await
    }

    pub fn set_flag(&self, key: StatusKey, value: bool) -> Result<()> {
        tracing::info!("Setting {} = {}", key.as_str(), value);
        self.store.set(key, value)
    }

    pub async fn status(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            state: self.observer.state().await?,
            classifier: self.classifier.name().to_string(),
            progress: self.observer.progress().await?,
            flags: self.store.snapshot(),
        })
    }

    /// Latest periodic progress report
    pub fn latest_progress(&self) -> ProgressReport {
        self.progress.borrow().clone()
    }

    /// Receiver notified on every periodic progress report
    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressReport> {
        self.progress.clone()
    }
}

struct Dispatcher {
    classifier: Arc<dyn Classifier>,
    observer: ObserverHandle,
    progress: watch::Sender<ProgressReport>,
}

impl Dispatcher {
    async fn run(self, mut outbound: mpsc::Receiver<Outbound>) {
        while let Some(message) = outbound.recv().await {
            match message {
                Outbound::SubmitBatch { epoch, items } => self.submit_batch(epoch, items),
                Outbound::SubmitSingle { epoch, id, text } => {
                    self.submit_single(epoch, id, text.into_string())
                }
                Outbound::Progress(report) => {
                    self.progress.send_replace(report);
                }
            }
        }
        tracing::debug!("Observer outbound channel closed, dispatcher exiting");
    }

    fn submit_batch(&self, epoch: Uuid, items: Vec<BufferedItem>) {
        let classifier = self.classifier.clone();
        let observer = self.observer.clone();
        let entries: Vec<BatchEntry> = items
            .into_iter()
            .map(|item| BatchEntry {
                id: item.id,
                text: item.text.into_string(),
            })
            .collect();

        tokio::spawn(async move {
            match classifier.analyze_batch(&entries).await {
                Ok(results) => {
                    if let Err(e) = observer.result_ready(epoch, results).await {
                        tracing::debug!("Observer gone before results arrived: {}", e);
                    }
                }
                // No retry: the items stay recorded, so they are not scraped again
                Err(e) => tracing::warn!("Batch of {} posts lost: {}", entries.len(), e),
            }
        });
    }

    fn submit_single(&self, epoch: Uuid, id: u64, text: String) {
        let classifier = self.classifier.clone();
        let observer = self.observer.clone();

        tokio::spawn(async move {
            match classifier.analyze_single(&text).await {
                Ok(score) => {
                    if let Err(e) = observer.user_item_result(epoch, id, score).await {
                        tracing::debug!("Observer gone before result arrived: {}", e);
                    }
                }
                Err(e) => tracing::warn!("Recheck of post #{} failed: {}", id, e),
            }
        });
    }
}
