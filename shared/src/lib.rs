//! Wire vocabulary shared by the match server and its clients
//!
//! Contains the grid coordinate and direction types, the UDP packet
//! protocol, match constants and the geometry helpers.

pub mod geometry;

pub use geometry::{insert_sorted, sorted_insert_index, Rect};

use serde::{Deserialize, Serialize};

pub const BOARD_WIDTH: usize = 162;
pub const BOARD_HEIGHT: usize = 108;

/// Moves a player may queue per batch, and micro-turns run per batch
pub const MOVES_PER_BATCH: usize = 5;
/// Consecutive silent batches after which a player is eliminated
pub const MAX_MISSED_BATCHES: u32 = 5;

/// Starting territory is the square of this radius around the spawn (5x5)
pub const START_TERRITORY_RADIUS: i32 = 2;
/// A spawn needs a clear square of this radius around it (11x11)
pub const SPAWN_CLEARANCE_RADIUS: i32 = 5;
/// Largest share of the board, in percent, a single claim may capture
pub const MAX_CAPTURE_PERCENT: usize = 20;

/// Base radius of a player's view window before score growth
pub const VIEW_BASE_RADIUS: f64 = 12.0;

pub const PROTOCOL_VERSION: u32 = 1;

/// Integer grid coordinate, `y` grows downwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring coordinate one step in `direction`
    pub fn step(self, direction: Direction) -> Point {
        let d = direction.vector();
        Point::new(self.x + d.x, self.y + d.y)
    }
}

/// One of the four cardinal unit vectors
///
/// Serialized as its `{x, y}` vector. Anything other than the four unit
/// vectors fails to parse, which is how malformed moves get dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Point", try_from = "Point")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn vector(self) -> Point {
        match self {
            Direction::Up => Point::new(0, -1),
            Direction::Down => Point::new(0, 1),
            Direction::Left => Point::new(-1, 0),
            Direction::Right => Point::new(1, 0),
        }
    }

    pub fn from_vector(v: Point) -> Option<Direction> {
        match (v.x, v.y) {
            (0, -1) => Some(Direction::Up),
            (0, 1) => Some(Direction::Down),
            (-1, 0) => Some(Direction::Left),
            (1, 0) => Some(Direction::Right),
            _ => None,
        }
    }
}

impl From<Direction> for Point {
    fn from(d: Direction) -> Self {
        d.vector()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("({}, {}) is not a cardinal unit vector", .0.x, .0.y)]
pub struct InvalidDirection(pub Point);

impl TryFrom<Point> for Direction {
    type Error = InvalidDirection;

    fn try_from(v: Point) -> Result<Self, Self::Error> {
        Direction::from_vector(v).ok_or(InvalidDirection(v))
    }
}

/// Keeps the legal directions of a submitted batch, in order, up to the
/// per-batch cap
pub fn sanitize_moves(moves: &[Point]) -> Vec<Direction> {
    moves
        .iter()
        .filter_map(|&m| Direction::from_vector(m))
        .take(MOVES_PER_BATCH)
        .collect()
}

/// Datagrams exchanged between bots/observers and the server
///
/// Views and snapshots travel as their JSON text so the board encoding
/// reaches clients byte for byte.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Join {
        client_version: u32,
        name: String,
    },
    /// Raw vectors; illegal entries are dropped by the server
    Moves {
        moves: Vec<Point>,
    },
    Observe,
    Leave,

    Joined {
        player_id: u32,
    },
    Status {
        view: String,
    },
    Observation {
        snapshots: String,
    },
    Rejected {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_vector() {
        assert_eq!(Direction::from_vector(Point::new(1, 0)), Some(Direction::Right));
        assert_eq!(Direction::from_vector(Point::new(-1, 0)), Some(Direction::Left));
        assert_eq!(Direction::from_vector(Point::new(0, 1)), Some(Direction::Down));
        assert_eq!(Direction::from_vector(Point::new(0, -1)), Some(Direction::Up));
        assert_eq!(Direction::from_vector(Point::new(1, 1)), None);
        assert_eq!(Direction::from_vector(Point::new(0, 0)), None);
        assert_eq!(Direction::from_vector(Point::new(2, 0)), None);
    }

    #[test]
    fn test_direction_vector_matches_parse() {
        for d in Direction::ALL {
            assert_eq!(Direction::try_from(d.vector()), Ok(d));
        }
    }

    #[test]
    fn test_point_step() {
        let p = Point::new(3, 4);
        assert_eq!(p.step(Direction::Right), Point::new(4, 4));
        assert_eq!(p.step(Direction::Up), Point::new(3, 3));
    }

    #[test]
    fn test_direction_json_is_vector() {
        let json = serde_json::to_string(&Direction::Left).unwrap();
        assert_eq!(json, r#"{"x":-1,"y":0}"#);

        let parsed: Direction = serde_json::from_str(r#"{"x":0,"y":1}"#).unwrap();
        assert_eq!(parsed, Direction::Down);

        let bad: Result<Direction, _> = serde_json::from_str(r#"{"x":1,"y":1}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_sanitize_moves_drops_and_caps() {
        let moves = vec![
            Point::new(1, 0),
            Point::new(5, 5),
            Point::new(0, 1),
            Point::new(0, 1),
            Point::new(0, 0),
            Point::new(-1, 0),
            Point::new(0, -1),
            Point::new(1, 0),
        ];
        let kept = sanitize_moves(&moves);
        assert_eq!(
            kept,
            vec![
                Direction::Right,
                Direction::Down,
                Direction::Down,
                Direction::Left,
                Direction::Up,
            ]
        );
    }

    #[test]
    fn test_packet_serialization_join() {
        let packet = Packet::Join {
            client_version: PROTOCOL_VERSION,
            name: "bot-7".to_string(),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Join {
                client_version,
                name,
            } => {
                assert_eq!(client_version, PROTOCOL_VERSION);
                assert_eq!(name, "bot-7");
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_moves_keeps_raw_vectors() {
        let packet = Packet::Moves {
            moves: vec![Point::new(1, 0), Point::new(3, 3)],
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, packet);
    }
}
