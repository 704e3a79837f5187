use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use notification_sync::config::{CliConfig, FileConfig};
use notification_sync::{
    HttpNotificationApi, ReconcileStrategy, Session, SyncCoordinator, SyncError, SyncSettings,
    WebSocketTransport,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Base URL of the notification REST API.
    #[clap(long)]
    pub api_url: Option<String>,

    /// WebSocket URL of the push channel.
    #[clap(long)]
    pub channel_url: Option<String>,

    /// Bearer token of the session to sync.
    #[clap(long, env = "NOTIFICATION_TOKEN", hide_env_values = true)]
    pub token: String,

    /// User id of the session, used for logging only.
    #[clap(long)]
    pub user_id: Option<String>,

    /// Timeout in seconds for REST requests.
    #[clap(long)]
    pub request_timeout_sec: Option<u64>,

    /// How rejected optimistic writes are undone.
    #[clap(long, value_enum)]
    pub reconcile_strategy: Option<ReconcileStrategy>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        api_base_url: cli_args.api_url.clone(),
        channel_url: cli_args.channel_url.clone(),
        request_timeout_sec: cli_args.request_timeout_sec,
        reconcile_strategy: cli_args.reconcile_strategy,
    };
    let settings = SyncSettings::resolve(&cli_config, file_config)?;

    let Some(api_url) = settings.api_base_url.clone() else {
        bail!("No API URL configured, pass --api-url or set api_base_url in the config file");
    };
    let Some(channel_url) = settings.channel_url.clone() else {
        bail!("No channel URL configured, pass --channel-url or set channel_url in the config file");
    };

    let api = HttpNotificationApi::new(&api_url, settings.request_timeout_sec)
        .context("Failed to create notification API client")?;
    let transport = WebSocketTransport::new(&channel_url, settings.channel_buffer);
    info!("Syncing notifications from {} (push: {})", api_url, channel_url);

    let coordinator = SyncCoordinator::new(Arc::new(api), Arc::new(transport), settings);
    let session = match cli_args.user_id {
        Some(user_id) => Session::authenticated(user_id, cli_args.token),
        None => Session {
            user_id: None,
            token: Some(cli_args.token),
        },
    };

    match coordinator.start(&session).await {
        Ok(()) => {}
        Err(SyncError::ChannelUnavailable(e)) => {
            warn!("{}, retrying in background", e);
        }
        Err(e) => return Err(e).context("Failed to start notification sync"),
    }
    if let Err(e) = coordinator.fetch().await {
        error!("Initial fetch failed: {}", e);
    }

    let mut stats = coordinator.subscribe_stats();
    let mut states = coordinator.subscribe_connection_state();
    info!("{}", serde_json::to_string(&*stats.borrow_and_update())?);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
            changed = stats.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = stats.borrow_and_update().clone();
                info!("{}", serde_json::to_string(&snapshot)?);
                if let Some(latest) = coordinator.latest() {
                    info!("Latest: [{}] {}", latest.category, latest.title);
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("Connection {}", *states.borrow_and_update());
            }
        }
    }

    coordinator.stop();
    Ok(())
}
