//! Serializable views of a match
//!
//! Two read-only projections of `GameState`:
//!
//! - `FullSnapshot`: the whole board, run-length compressed, with every
//!   player. Feeds observers and the match history.
//! - `PlayerView`: a square window centred on one player, growing with its
//!   score. Other players are listed everywhere but only located when they
//!   are inside the window.
//!
//! ## Board encoding
//!
//! Each cell renders as `"<owner>,<tail>"` with empty ids left blank.
//! Consecutive identical cells in row-major order collapse into a
//! `"<count>;<cell>"` run, and runs are joined with `"!"`:
//!
//! ```text
//! 36;,!5;1,!6;,!5;1,
//! ```

use crate::board::{Board, Cell, PlayerId};
use crate::error::CodecError;
use crate::game::{GameState, Player};
use serde::{Deserialize, Serialize};
use shared::{Direction, Point, Rect, VIEW_BASE_RADIUS};
use std::ops::Not;

const RUN_SEPARATOR: char = '!';
const COUNT_SEPARATOR: char = ';';

/// A player as listed in snapshots and views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub name: String,
    pub score: usize,
    pub id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<Direction>,
}

impl PlayerEntry {
    fn located(player: &Player) -> Self {
        Self {
            name: player.name().to_string(),
            score: player.score(),
            id: player.id(),
            pos: Some(player.position()),
            dir: Some(player.direction()),
        }
    }

    fn unlocated(player: &Player) -> Self {
        Self {
            pos: None,
            dir: None,
            ..Self::located(player)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPlayer {
    #[serde(flatten)]
    pub entry: PlayerEntry,
    /// Milliseconds into the latest batch window the player answered
    pub last_played: Option<u64>,
}

/// The complete match at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSnapshot {
    pub board: String,
    pub players: Vec<SnapshotPlayer>,
    pub time_left: Option<i64>,
    pub width: usize,
    pub height: usize,
    #[serde(default, skip_serializing_if = "Not::not")]
    pub over: bool,
}

impl FullSnapshot {
    pub fn capture(state: &GameState) -> Self {
        let board = state.board();
        Self {
            board: compress_board(board),
            players: state
                .players()
                .map(|p| SnapshotPlayer {
                    entry: PlayerEntry::located(p),
                    last_played: p.last_move().map(|d| d.as_millis() as u64),
                })
                .collect(),
            time_left: state.time_left(),
            width: board.width(),
            height: board.height(),
            over: state.is_over(),
        }
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes `board` back into row-major cells
    pub fn cells(&self) -> Result<Vec<Cell>, CodecError> {
        expand_board(&self.board, self.width * self.height)
    }
}

/// One player's fog-of-war window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub board_width: usize,
    pub board_height: usize,
    /// Board coordinate of `board[0][0]`
    pub view_origin: Point,
    pub board: Vec<Vec<Cell>>,
    pub players: Vec<PlayerEntry>,
    #[serde(default, skip_serializing_if = "Not::not")]
    pub over: bool,
}

/// What a seated player receives after each batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewResponse {
    Window(PlayerView),
    /// The player is no longer on the board
    Over { over: bool },
}

impl ViewResponse {
    pub fn capture(state: &GameState, id: PlayerId) -> Self {
        let Some(me) = state.player(id) else {
            return ViewResponse::Over { over: true };
        };
        let board = state.board();
        let radius = view_radius(me.score(), board.area());
        let window = Rect::around(me.position(), radius).clip(&board.bounds());

        let players = state
            .players()
            .map(|p| {
                if window.contains(p.position()) {
                    PlayerEntry::located(p)
                } else {
                    PlayerEntry::unlocated(p)
                }
            })
            .collect();

        ViewResponse::Window(PlayerView {
            board_width: board.width(),
            board_height: board.height(),
            view_origin: window.origin(),
            board: board.window(window),
            players,
            over: state.is_over(),
        })
    }

    /// Whether the receiving player has nothing further to play for
    pub fn is_over(&self) -> bool {
        match self {
            ViewResponse::Window(view) => view.over,
            ViewResponse::Over { over } => *over,
        }
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }
}

fn raw_view_radius(score: usize, area: usize) -> f64 {
    VIEW_BASE_RADIUS + score as f64 / area as f64 * 100.0
}

/// Half-width of a player's view window
pub fn view_radius(score: usize, area: usize) -> i32 {
    raw_view_radius(score, area).round() as i32
}

/// Run-length encodes the board in row-major order
pub fn compress_board(board: &Board) -> String {
    let mut runs: Vec<String> = Vec::new();
    let mut cells = board.cells().iter();
    let Some(mut current) = cells.next() else {
        return String::new();
    };
    let mut count = 1usize;

    for cell in cells {
        if cell == current {
            count += 1;
        } else {
            runs.push(format!("{}{}{}", count, COUNT_SEPARATOR, current));
            current = cell;
            count = 1;
        }
    }
    runs.push(format!("{}{}{}", count, COUNT_SEPARATOR, current));

    runs.join(&RUN_SEPARATOR.to_string())
}

/// Inverse of `compress_board`; the text must describe exactly `area` cells
pub fn expand_board(text: &str, area: usize) -> Result<Vec<Cell>, CodecError> {
    let mut cells = Vec::with_capacity(area);

    for run in text.split(RUN_SEPARATOR) {
        let (count, cell) = run
            .split_once(COUNT_SEPARATOR)
            .ok_or_else(|| CodecError::Run(run.to_string()))?;
        let count: usize = count
            .parse()
            .map_err(|_| CodecError::Run(run.to_string()))?;
        let cell: Cell = cell.parse()?;
        cells.extend(std::iter::repeat(cell).take(count));
    }

    if cells.len() != area {
        return Err(CodecError::Length {
            expected: area,
            actual: cells.len(),
        });
    }
    Ok(cells)
}
