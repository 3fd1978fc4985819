/// Failures of the simulation engine
///
/// In-game outcomes (eliminations, rejected captures, ties) are state
/// transitions, not errors. These variants only cover match construction
/// and running out of spawn space.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("board of {width}x{height} is smaller than the {min}x{min} minimum")]
    InvalidDimensions {
        width: usize,
        height: usize,
        min: usize,
    },
    #[error("no room left on the board to place player {name}")]
    NoSpawnSpace { name: String },
}

/// Failures surfaced through a `MatchHandle`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("match is not accepting new players")]
    Closed,
    #[error("match task has stopped")]
    Stopped,
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Failures decoding the run-length board text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("malformed cell {0:?}")]
    Cell(String),
    #[error("malformed run {0:?}")]
    Run(String),
    #[error("board text covers {actual} cells, expected {expected}")]
    Length { expected: usize, actual: usize },
    #[error("failed to encode snapshot: {0}")]
    Json(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Json(e.to_string())
    }
}
