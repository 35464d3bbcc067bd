use clap::Parser;
use log::info;
use relay_server::config::{FramingMode, ServerConfig};
use relay_server::network::Server;
use relay_server::store::{MemoryPlayerStore, PlayerStore, SqlitePlayerStore};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = relay_protocol::DEFAULT_PORT)]
    port: u16,

    /// SQLite database file for player saves
    #[arg(short, long, default_value = "players.db")]
    database: String,

    /// Keep player saves in memory instead of SQLite
    #[arg(long)]
    memory_store: bool,

    /// How incoming bytes are split into messages
    #[arg(long, value_enum, default_value_t = FramingMode::Line)]
    framing: FramingMode,

    /// Receive buffer size in bytes
    #[arg(long, default_value_t = relay_server::config::DEFAULT_READ_BUFFER)]
    read_buffer: usize,

    /// Longest accepted line in line framing, in bytes
    #[arg(long, default_value_t = relay_protocol::framing::DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,

    /// Frames queued per client before messages to it are dropped
    #[arg(long, default_value_t = relay_server::config::DEFAULT_OUTBOUND_CAPACITY)]
    outbound_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let store: Arc<dyn PlayerStore> = if args.memory_store {
        info!("Using in-memory player store");
        Arc::new(MemoryPlayerStore::new())
    } else {
        info!("Using player database {}", args.database);
        Arc::new(SqlitePlayerStore::open(&args.database)?)
    };

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        framing: args.framing,
        read_buffer: args.read_buffer,
        max_frame_len: args.max_frame_len,
        outbound_capacity: args.outbound_capacity,
    };
    info!("Framing mode: {:?}", config.framing);

    let server = Server::bind(config, store).await?;
    let shutdown = server.shutdown_handle();
    let server_handle = tokio::spawn(server.run());

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down gracefully...");
    shutdown.trigger();
    server_handle.await?;

    Ok(())
}
