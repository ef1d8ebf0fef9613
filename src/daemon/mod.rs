// Daemon: hosts the page, observer and coordinator behind the IPC socket

mod ipc;
mod replay;
mod signals;

pub use ipc::{IpcClient, IpcMessage, IpcResponse, IpcServer};
pub use replay::{Replay, ReplayAction, ReplayStep, Stage};
pub use signals::{ShutdownSignal, SignalHandler};

use crate::classifier;
use crate::config::{expand_tilde, Config};
use crate::coordinator::Coordinator;
use crate::dom::Page;
use crate::error::{Result, ToxwatchError};
use crate::observer::Observer;
use crate::store::{FileStatusStore, StatusStore};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task;

const OUTBOUND_CAPACITY: usize = 256;

/// Owns configuration and runs every component until shutdown
pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run in the foreground until SIGTERM, SIGINT, SIGHUP or a shutdown request
    pub async fn run_foreground(&self) -> Result<()> {
        let mut signal_handler = SignalHandler::new()?;
        self.run_until(async move {
            signal_handler.wait().await;
        })
        .await
    }

    /// Run until `shutdown` resolves or a client asks to shut down
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Daemon starting");

        let page = Page::default();
        let store: Arc<dyn StatusStore> = Arc::new(FileStatusStore::open(expand_tilde(
            &self.config.daemon.status_file,
        ))?);
        let classifier = classifier::from_config(&self.config)?;
        tracing::info!("Using {} classifier", classifier.name());

        let replay = match &self.config.daemon.replay_file {
            Some(path) => Some(Replay::load(&expand_tilde(path))?),
            None => None,
        };

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (observer, observer_handle) =
            Observer::from_config(&self.config, page.clone(), store.clone(), outbound_tx)?;
        let observer_task = observer.spawn();
        let (coordinator, dispatcher_task) =
            Coordinator::spawn(classifier, store, observer_handle.clone(), outbound_rx);

        let mut ipc_server = IpcServer::new(expand_tilde(&self.config.daemon.socket_path));
        ipc_server.bind()?;

        let replay_task = match replay {
            Some(replay) => {
                let stage = Stage::new(page.clone(), &self.config.page)?;
                Some(task::spawn(replay.play(stage)))
            }
            None => None,
        };

        let progress_task = task::spawn(log_progress(coordinator.clone()));
        let state = coordinator.auto_start().await?;
        tracing::info!("Daemon started (observation {})", state.as_str());

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = ipc_server.accept() => match accepted {
                    Ok(stream) => {
                        let coordinator = coordinator.clone();
                        let stop_tx = stop_tx.clone();
                        task::spawn(async move {
                            if let Err(e) = handle_client(stream, coordinator, stop_tx).await {
                                tracing::error!("Client handler error: {}", e);
                            }
                        });
                    }
                    Err(e) => tracing::error!("{}", e),
                },

                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }

                _ = stop_rx.recv() => {
                    tracing::info!("Shutdown requested by client");
                    break;
                }
            }
        }

        tracing::info!("Shutting down daemon");
        if let Some(replay_task) = replay_task {
            replay_task.abort();
        }
        progress_task.abort();

        // Observer exit drops its outbound sender, which ends the dispatcher
        if let Err(e) = observer_handle.shutdown().await {
            tracing::debug!("Observer already stopped: {}", e);
        }
        if let Err(e) = observer_task.await {
            tracing::error!("Observer task failed: {}", e);
        }
        if let Err(e) = dispatcher_task.await {
            tracing::error!("Dispatcher task failed: {}", e);
        }

        ipc_server.shutdown()?;
        tracing::info!("Daemon shutdown complete");
        Ok(())
    }
}

async fn log_progress(coordinator: Coordinator) {
    let mut updates = coordinator.subscribe_progress();
    while updates.changed().await.is_ok() {
        let report = updates.borrow_and_update().clone();
        if report.observing {
            tracing::debug!(
                "Progress: {} seen, {} pending, {} processed, {} toxic ({:.1}%)",
                report.seen,
                report.pending,
                report.processed,
                report.toxic,
                report.percentage
            );
        }
    }
}

async fn handle_client(
    mut stream: tokio::net::UnixStream,
    coordinator: Coordinator,
    stop_tx: mpsc::Sender<()>,
) -> Result<()> {
    let message = ipc::read_message(&mut stream).await?;
    tracing::debug!("IPC request: {:?}", message);

    let response = match handle_message(&coordinator, message, &stop_tx).await {
        Ok(response) => response,
        Err(e) => IpcResponse::error(e.to_string()),
    };

    ipc::write_response(&mut stream, &response).await
}

async fn handle_message(
    coordinator: &Coordinator,
    message: IpcMessage,
    stop_tx: &mpsc::Sender<()>,
) -> Result<IpcResponse> {
    let response = match message {
        IpcMessage::Start => {
            let state = coordinator.start().await?;
            IpcResponse::success(format!("Observation {}", state.as_str()))
        }
        IpcMessage::Stop => {
            let state = coordinator.stop().await?;
            IpcResponse::success(format!("Observation {}", state.as_str()))
        }
        IpcMessage::Status => {
            let status = coordinator.status().await?;
            IpcResponse::success_with_data(to_json(&status)?)
        }
        IpcMessage::Analyze { text } => {
            let score = coordinator.analyze(&text).await?;
            IpcResponse::success_with_data(serde_json::json!({ "score": score }))
        }
        IpcMessage::Recheck { id } => {
            if coordinator.recheck(id).await? {
                IpcResponse::success(format!("Post #{} queued for recheck", id))
            } else {
                IpcResponse::error(format!("No post #{} in the current epoch", id))
            }
        }
        IpcMessage::Flag { key, value } => {
            coordinator.set_flag(key, value)?;
            IpcResponse::success(format!("{} = {}", key.as_str(), value))
        }
        IpcMessage::Shutdown => {
            // Already shutting down if the slot is taken
            let _ = stop_tx.try_send(());
            IpcResponse::success("Shutdown initiated")
        }
    };
    Ok(response)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ToxwatchError::Json {
        source: e,
        context: "Failed to serialize status".to_string(),
    })
}
