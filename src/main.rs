use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use stackdeck::{
    util, Config, DeployAction, HttpStreamClient, SessionId, SessionManager, StdoutTerminal,
    WsConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Stackdeck - follow logs, open shells and run deployment actions
#[derive(Parser, Debug)]
#[command(name = "stackdeck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory (defaults to $STACKDECK_HOME, then ~/.stackdeck)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Orchestration host, e.g. http://127.0.0.1:5000
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow a log stream
    Logs {
        /// Stream path on the host, e.g. /api/logs/web
        path: String,
    },
    /// Open a shell socket
    Exec {
        /// Socket path on the host, e.g. /exec/web
        path: String,
        /// Only display output, do not forward stdin
        #[arg(long)]
        read_only: bool,
    },
    /// Run a deployment action on a stack
    Action {
        #[arg(value_enum)]
        action: DeployAction,
        /// Stack file
        file: String,
        /// Limit the action to these services
        services: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir.clone());

    // Initialize logging to file (<data dir>/logs/stackdeck.log)
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::ensure_log_file_path()?)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    let mut config = Config::load();
    if let Some(server) = cli.server {
        config = config
            .with_socket_url(socket_url_for(&server))
            .with_server_url(server);
    }

    let streams = Arc::new(HttpStreamClient::new(config.server_url.clone())?);
    let connector = Arc::new(WsConnector::new(config.socket_url.clone()));
    let manager = Arc::new(SessionManager::new(config, streams, connector));

    let (id, forward_stdin) = match cli.command {
        Command::Logs { path } => (manager.open_log_session(path.clone(), &path)?, false),
        Command::Exec { path, read_only } => (
            manager.open_exec_session(path.clone(), &path, !read_only)?,
            !read_only,
        ),
        Command::Action {
            action,
            file,
            services,
        } => (manager.run_action(&file, action, &services, || {})?, false),
    };

    manager.attach_terminal(&id, Arc::new(StdoutTerminal))?;
    if forward_stdin {
        tokio::spawn(forward_input(manager.clone(), id.clone()));
    }

    let snapshot = tokio::select! {
        snapshot = manager.wait_for_end(&id) => snapshot,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(session_id = %id, "Interrupted");
            manager.shutdown();
            manager.wait_for_end(&id).await
        }
    };

    match snapshot.and_then(|s| s.error) {
        Some(error) => bail!(error),
        None => Ok(()),
    }
}

/// Forward stdin lines to an interactive session until it closes
async fn forward_input(manager: Arc<SessionManager>, id: SessionId) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match manager.send_input(&id, format!("{line}\n")) {
                Ok(true) => {}
                Ok(false) => tracing::debug!(session_id = %id, "Input dropped, socket not open"),
                Err(e) => {
                    tracing::debug!(session_id = %id, error = %e, "Stopping input");
                    break;
                }
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }
}

fn socket_url_for(server: &str) -> String {
    if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        server.to_string()
    }
}
