use std::future::Future;
use std::path::PathBuf;
use toxwatch::cli::{Cli, Commands, ConfigAction};
use toxwatch::config::{expand_tilde, Config};
use toxwatch::coordinator::StatusReport;
use toxwatch::daemon::{Daemon, IpcClient, IpcMessage, IpcResponse};
use toxwatch::error::{Result, ToxwatchError};
use toxwatch::store::StatusKey;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Run { replay } => cmd_run(cli.config, replay)?,
        Commands::Start => cmd_simple(cli.config, IpcMessage::Start)?,
        Commands::Stop => cmd_simple(cli.config, IpcMessage::Stop)?,
        Commands::Status { json } => cmd_status(cli.config, json)?,
        Commands::Analyze { text } => cmd_analyze(cli.config, text)?,
        Commands::Recheck { id } => cmd_simple(cli.config, IpcMessage::Recheck { id })?,
        Commands::Flag { key, value } => {
            let key: StatusKey = key.parse()?;
            cmd_simple(cli.config, IpcMessage::Flag { key, value })?
        }
        Commands::Shutdown => cmd_simple(cli.config, IpcMessage::Shutdown)?,
        Commands::Config { action } => cmd_config(cli.config, action)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "toxwatch=debug" } else { "toxwatch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| ToxwatchError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    Ok(runtime.block_on(future))
}

fn cmd_run(config_path: Option<PathBuf>, replay: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if replay.is_some() {
        config.daemon.replay_file = replay;
    }

    let daemon = Daemon::new(config);
    block_on(daemon.run_foreground())?
}

fn send(config_path: Option<PathBuf>, message: IpcMessage) -> Result<IpcResponse> {
    let config = load_config(config_path)?;
    let client = IpcClient::new(expand_tilde(&config.daemon.socket_path));
    block_on(client.send(&message))?.map_err(|e| {
        tracing::debug!("IPC failure: {}", e);
        ToxwatchError::Daemon("Daemon is not running. Start it with 'toxwatch run'.".to_string())
    })
}

fn check(response: IpcResponse) -> Result<IpcResponse> {
    if response.success {
        Ok(response)
    } else {
        Err(ToxwatchError::Daemon(
            response.message.unwrap_or_else(|| "Request failed".to_string()),
        ))
    }
}

fn cmd_simple(config_path: Option<PathBuf>, message: IpcMessage) -> Result<()> {
    let response = check(send(config_path, message)?)?;
    if let Some(message) = response.message {
        println!("✓ {}", message);
    }
    Ok(())
}

fn cmd_analyze(config_path: Option<PathBuf>, text: String) -> Result<()> {
    let response = check(send(config_path, IpcMessage::Analyze { text })?)?;
    let score = response
        .data
        .as_ref()
        .and_then(|d| d.get("score"))
        .and_then(|s| s.as_f64())
        .ok_or_else(|| ToxwatchError::Daemon("Malformed analyze response".to_string()))?;
    println!("Toxicity: {:.3}", score);
    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let response = check(send(config_path, IpcMessage::Status)?)?;
    let data = response
        .data
        .ok_or_else(|| ToxwatchError::Daemon("Malformed status response".to_string()))?;

    if json {
        println!("{}", pretty_json(&data)?);
        return Ok(());
    }

    let status: StatusReport = serde_json::from_value(data).map_err(|e| ToxwatchError::Json {
        source: e,
        context: "Failed to decode status report".to_string(),
    })?;

    println!("Toxwatch Status");
    println!("===============");
    println!("\nObservation: {}", status.state.as_str());
    println!("Classifier:  {}", status.classifier);
    if let Some(epoch) = status.progress.epoch {
        println!("Epoch:       {}", epoch);
    }
    println!("\nSeen:        {}", status.progress.seen);
    println!("Pending:     {}", status.progress.pending);
    println!("Processed:   {}", status.progress.processed);
    println!(
        "Toxic:       {} ({:.1}%)",
        status.progress.toxic, status.progress.percentage
    );
    println!("\nFlags:");
    for (key, value) in &status.flags {
        println!("  {:<20} {}", key.as_str(), value);
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path)?;
            let value = serde_json::to_value(&config).map_err(|e| ToxwatchError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let shown = match section {
                Some(section) => value.get(&section).cloned().ok_or_else(|| {
                    ToxwatchError::Config(format!("Unknown config section: {}", section))
                })?,
                None => value,
            };
            println!("{}", pretty_json(&shown)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            // Load runs the validator
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ToxwatchError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'toxwatch config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&expand_tilde(&path))
}

fn pretty_json(value: &serde_json::Value) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| ToxwatchError::Json {
        source: e,
        context: "Failed to format JSON".to_string(),
    })
}
