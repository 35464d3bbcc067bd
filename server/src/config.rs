//! Server configuration

use clap::ValueEnum;
use relay_protocol::framing::DEFAULT_MAX_FRAME_LEN;
use relay_protocol::DEFAULT_PORT;

/// Size of the per-connection receive buffer
pub const DEFAULT_READ_BUFFER: usize = 4096;

/// Frames a session may have queued before further deliveries are dropped
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

/// How incoming bytes are cut into messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FramingMode {
    /// Split on `\n`, buffering partial lines across reads
    #[default]
    Line,
    /// Treat each read from the socket as exactly one message
    Raw,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to listen on; 0 lets the OS pick one
    pub port: u16,
    pub framing: FramingMode,
    /// Bytes requested per socket read
    pub read_buffer: usize,
    /// Longest unterminated line accepted in line framing
    pub max_frame_len: usize,
    /// Outbound queue length per session
    pub outbound_capacity: usize,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Outbound queue length, never zero
    pub fn queue_capacity(&self) -> usize {
        self.outbound_capacity.max(1)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            framing: FramingMode::default(),
            read_buffer: DEFAULT_READ_BUFFER,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}
