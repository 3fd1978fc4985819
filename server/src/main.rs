use clap::Parser;
use log::{error, info};
use server::config::{MatchConfig, ServerConfig};
use server::history::MatchRecord;
use server::network::{Server, ServerMessage};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Board width in cells
    #[arg(long, default_value_t = shared::BOARD_WIDTH)]
    width: usize,

    /// Board height in cells
    #[arg(long, default_value_t = shared::BOARD_HEIGHT)]
    height: usize,

    /// Earliest a batch may close, in milliseconds
    #[arg(long, default_value = "40")]
    min_wait_ms: u64,

    /// Latest a batch may close, in milliseconds
    #[arg(long, default_value = "500")]
    max_wait_ms: u64,

    /// Round length in seconds, 0 for no deadline
    #[arg(short = 'd', long, default_value = "120")]
    duration_secs: u64,

    /// Maximum number of concurrent clients
    #[arg(short = 'm', long, default_value = "64")]
    max_clients: usize,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    client_timeout_secs: u64,

    /// Directory receiving snapshot and move logs of finished rounds
    #[arg(long)]
    history_dir: Option<PathBuf>,

    /// RNG seed for reproducible spawns
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            max_clients: self.max_clients,
            client_timeout: Duration::from_secs(self.client_timeout_secs),
            ..ServerConfig::default()
        }
    }

    fn match_config(&self) -> MatchConfig {
        MatchConfig {
            width: self.width,
            height: self.height,
            duration: (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs)),
            seed: self.seed,
            min_wait: Duration::from_millis(self.min_wait_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
            ..MatchConfig::default()
        }
    }
}

async fn write_record(dir: &Path, record: &MatchRecord) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let snapshots = dir.join(format!("{}.snapshots.json", record.name));
    tokio::fs::write(&snapshots, record.snapshots_json()).await?;
    let moves = dir.join(format!("{}.moves.json", record.name));
    let moves_json = serde_json::to_string(&record.moves).map_err(std::io::Error::from)?;
    tokio::fs::write(&moves, moves_json).await
}

/// Drains finished match records, persisting them when a directory is set
fn spawn_history_writer(dir: Option<PathBuf>) -> mpsc::UnboundedSender<MatchRecord> {
    let (tx, mut rx) = mpsc::unbounded_channel::<MatchRecord>();

    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            info!(
                "Game {} recorded: {} snapshots, {} players",
                record.name,
                record.snapshots.len(),
                record.moves.len()
            );
            let Some(dir) = &dir else { continue };
            if let Err(e) = write_record(dir, &record).await {
                error!("Failed to write history of {}: {}", record.name, e);
            }
        }
    });

    tx
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting server...");
    info!(
        "Board {}x{}, batch window {}-{}ms",
        args.width, args.height, args.min_wait_ms, args.max_wait_ms
    );

    let history = spawn_history_writer(args.history_dir.clone());
    let mut server = Server::new(args.server_config(), args.match_config(), history).await?;

    let control = server.sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            if let Err(e) = control.send(ServerMessage::Shutdown) {
                error!("Failed to signal shutdown: {}", e);
            }
        }
    });

    server.run().await?;

    Ok(())
}
