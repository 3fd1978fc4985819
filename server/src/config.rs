use shared::{BOARD_HEIGHT, BOARD_WIDTH};
use std::time::Duration;

/// Settings for one match: its board, lifetime rules and batch pacing
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub name: String,
    pub width: usize,
    pub height: usize,
    /// Persistent matches never end on a tie or a low player count
    pub persistent: bool,
    /// Match length, armed at the first step. `None` runs until the
    /// elimination rules end the match.
    pub duration: Option<Duration>,
    /// Fixed RNG seed for reproducible spawns
    pub seed: Option<u64>,
    /// Earliest a batch may close, even when everyone has answered
    pub min_wait: Duration,
    /// Latest a batch may close, regardless of stragglers
    pub max_wait: Duration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            name: "melee".to_string(),
            width: BOARD_WIDTH,
            height: BOARD_HEIGHT,
            persistent: true,
            duration: Some(Duration::from_secs(120)),
            seed: None,
            min_wait: Duration::from_millis(40),
            max_wait: Duration::from_millis(500),
        }
    }
}

/// Settings for the UDP transport hosting a match
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_clients: usize,
    /// Clients silent for longer than this are dropped from the match
    pub client_timeout: Duration,
    /// Command queue depth between the transport and the match task
    pub command_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            max_clients: 64,
            client_timeout: Duration::from_secs(5),
            command_buffer: 1000,
        }
    }
}
