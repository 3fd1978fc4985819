//! Authoritative match state and the micro-turn simulation
//!
//! `GameState` exclusively owns the board and the player roster. Every
//! change to a cell's owner goes through `set_owner`, which moves score
//! between players so that a player's score always equals the number of
//! cells it owns.

use crate::board::{Board, Cell, PlayerId};
use crate::config::MatchConfig;
use crate::enclosure;
use crate::error::GameError;
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    Direction, Point, MAX_CAPTURE_PERCENT, MAX_MISSED_BATCHES, SPAWN_CLEARANCE_RADIUS,
    START_TERRITORY_RADIUS,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::Instant;

const SPAWN_RANDOM_PROBES: usize = 300;
const SPAWN_MAX_PADDING: usize = 30;

/// A participant in the match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub(crate) id: PlayerId,
    pub(crate) name: String,
    pub(crate) position: Point,
    pub(crate) direction: Direction,
    pub(crate) score: usize,
    pub(crate) missed_batches: u32,
    pub(crate) last_move: Option<Duration>,
}

impl Player {
    fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            position: Point::default(),
            direction: Direction::Right,
            score: 0,
            missed_batches: 0,
            last_move: None,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of cells this player owns
    pub fn score(&self) -> usize {
        self.score
    }

    pub fn missed_batches(&self) -> u32 {
        self.missed_batches
    }

    /// How long into its latest batch window the player answered, if it did
    pub fn last_move(&self) -> Option<Duration> {
        self.last_move
    }
}

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Deadline,
    /// Every remaining player was eliminated in the same micro-turn
    Tie,
    /// Fewer than two players remain
    LastStanding,
}

/// Result of one claim attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub player: PlayerId,
    /// Interior cells the player did not already own, trail included
    pub cells: usize,
    pub accepted: bool,
}

/// What happened during one micro-turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub eliminated: Vec<PlayerId>,
    pub captures: Vec<Capture>,
    pub ended: Option<EndReason>,
}

#[derive(Debug, Clone)]
pub struct GameState {
    name: String,
    board: Board,
    players: BTreeMap<PlayerId, Player>,
    next_id: PlayerId,
    over: bool,
    persistent: bool,
    duration: Option<Duration>,
    deadline: Option<Instant>,
    tick: u64,
    rng: StdRng,
}

impl GameState {
    /// Creates an empty match. Fails if the board cannot host a spawn.
    pub fn new(config: &MatchConfig) -> Result<Self, GameError> {
        let board = Board::new(config.width, config.height)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            name: config.name.clone(),
            board,
            players: BTreeMap::new(),
            next_id: 1,
            over: false,
            persistent: config.persistent,
            duration: config.duration,
            deadline: None,
            tick: 0,
            rng,
        })
    }

    /// Creates a match with a fixed roster spread evenly on an ellipse
    /// around the board centre
    pub fn with_players<S: AsRef<str>>(
        config: &MatchConfig,
        names: &[S],
    ) -> Result<(Self, Vec<PlayerId>), GameError> {
        let mut state = Self::new(config)?;
        let (w, h) = (state.board.width() as f64, state.board.height() as f64);
        let count = names.len().max(1) as f64;

        let ids = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let theta = i as f64 / count * std::f64::consts::TAU;
                let at = Point::new(
                    (w / 2.0 + w / 3.0 * theta.cos()).round() as i32,
                    (h / 2.0 + h / 3.0 * theta.sin()).round() as i32,
                );
                state.spawn_at(name.as_ref(), at)
            })
            .collect();

        Ok((state, ids))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_alive(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn is_over(&self) -> bool {
        self.over
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Micro-turns simulated so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Milliseconds until the deadline, negative once it has passed
    pub fn time_left(&self) -> Option<i64> {
        let now = Instant::now();
        self.deadline.map(|deadline| {
            if deadline >= now {
                (deadline - now).as_millis() as i64
            } else {
                -((now - deadline).as_millis() as i64)
            }
        })
    }

    /// Places a newcomer on a clear 11x11 area with a 5x5 starting
    /// territory
    ///
    /// Searches with random probes, then an exhaustive scan. If the board is
    /// full it clears everything but the existing players' starting blocks,
    /// and as a last resort eliminates every player to make room.
    pub fn add_player(&mut self, name: &str) -> Result<PlayerId, GameError> {
        if let Some(at) = self.find_spawn() {
            return Ok(self.spawn_at(name, at));
        }

        warn!(
            "Game {}: making room for more players before placing {}",
            self.name, name
        );
        self.rehome_players();
        if let Some(at) = self.find_spawn() {
            return Ok(self.spawn_at(name, at));
        }

        error!(
            "Game {}: killing all {} players to make room for {}",
            self.name,
            self.players.len(),
            name
        );
        let everyone: Vec<PlayerId> = self.players.keys().copied().collect();
        for id in everyone {
            self.kill(id);
        }
        match self.scan_for_spawn() {
            Some(at) => Ok(self.spawn_at(name, at)),
            None => Err(GameError::NoSpawnSpace {
                name: name.to_string(),
            }),
        }
    }

    /// Changes a player's heading. Unknown players are ignored.
    pub fn set_direction(&mut self, id: PlayerId, direction: Direction) {
        if let Some(player) = self.players.get_mut(&id) {
            player.direction = direction;
        }
    }

    /// Records that a player answered `elapsed` into the batch window
    pub fn record_response(&mut self, id: PlayerId, elapsed: Duration) {
        if let Some(player) = self.players.get_mut(&id) {
            player.missed_batches = 0;
            player.last_move = Some(elapsed);
        }
    }

    /// Records that a player let a batch window close without answering
    pub fn record_miss(&mut self, id: PlayerId) {
        if let Some(player) = self.players.get_mut(&id) {
            player.missed_batches += 1;
            player.last_move = None;
        }
    }

    /// Advances the simulation by one micro-turn
    pub fn step(&mut self) -> StepReport {
        self.step_at(Instant::now())
    }

    pub fn step_at(&mut self, now: Instant) -> StepReport {
        let mut report = StepReport::default();

        if self.deadline.is_none() {
            self.deadline = self.duration.map(|d| now + d);
        }
        if !self.over && self.deadline.is_some_and(|deadline| now >= deadline) {
            self.shutdown();
            report.ended = Some(EndReason::Deadline);
        }
        if self.over || self.players.is_empty() {
            return report;
        }
        self.tick += 1;

        let order = self.processing_order();
        let mut doomed = BTreeSet::new();
        let mut arrivals: HashMap<Point, Vec<PlayerId>> = HashMap::new();

        for &id in &order {
            let (from, to) = {
                let player = &self.players[&id];
                (player.position, player.position.step(player.direction))
            };

            if !self.board.contains(to) {
                info!("Game {}: player {} ran off the board", self.name, id);
                doomed.insert(id);
                continue;
            }
            arrivals.entry(to).or_default().push(id);

            // Re-entering own territory straight off the trail closes a loop.
            if self.board[to].owner == Some(id) && self.board[from].tail == Some(id) {
                report.captures.push(self.claim(id, to));
            }

            if let Some(player) = self.players.get_mut(&id) {
                player.position = to;
            }
        }

        for (at, ids) in &arrivals {
            if ids.len() < 2 {
                continue;
            }
            for &id in ids {
                if self.board[*at].owner != Some(id) {
                    info!(
                        "Game {}: player {} hit another head outside its territory at {},{}",
                        self.name, id, at.x, at.y
                    );
                    doomed.insert(id);
                }
            }
        }

        for &id in &order {
            let at = self.players[&id].position;
            let cell = &mut self.board[at];
            if let Some(victim) = cell.tail {
                if victim != id {
                    info!(
                        "Game {}: player {} cut the trail of player {} at {},{}",
                        self.name, id, victim, at.x, at.y
                    );
                    doomed.insert(victim);
                }
            }
            if cell.owner != Some(id) {
                cell.tail = Some(id);
            }
        }

        for &id in &order {
            let player = &self.players[&id];
            if player.score == 0 {
                info!("Game {}: player {} lost its entire territory", self.name, id);
                doomed.insert(id);
            }
            if player.missed_batches >= MAX_MISSED_BATCHES {
                info!(
                    "Game {}: player {} missed {} batches in a row",
                    self.name, id, player.missed_batches
                );
                doomed.insert(id);
            }
        }

        if !doomed.is_empty() && doomed.len() == self.players.len() && !self.persistent {
            info!("Game {}: ended in a tie", self.name);
            self.shutdown();
            report.ended = Some(EndReason::Tie);
            return report;
        }

        for id in doomed {
            if self.kill(id) {
                report.eliminated.push(id);
            }
        }
        if self.players.len() < 2 && !self.persistent {
            self.shutdown();
            report.ended = Some(EndReason::LastStanding);
        }

        report
    }

    /// Removes a player and releases every cell it owns or trails
    ///
    /// Used both for eliminations and for removal from outside the batch
    /// loop. Returns false if the player was already gone.
    pub fn kill(&mut self, id: PlayerId) -> bool {
        let Some(player) = self.players.remove(&id) else {
            return false;
        };
        info!("Player {} ({}) killed in game {}", id, player.name, self.name);
        for (_, cell) in self.board.iter_mut() {
            if cell.owner == Some(id) {
                cell.owner = None;
            }
            if cell.tail == Some(id) {
                cell.tail = None;
            }
        }
        true
    }

    /// Ends the match and wipes every trail from the board
    pub fn shutdown(&mut self) {
        if !self.over {
            info!("Game {} over", self.name);
        }
        for (_, cell) in self.board.iter_mut() {
            cell.tail = None;
        }
        self.over = true;
    }

    /// Players by descending score; ties keep id order
    fn processing_order(&self) -> Vec<PlayerId> {
        let mut order: Vec<&Player> = self.players.values().collect();
        order.sort_by(|a, b| b.score.cmp(&a.score));
        order.into_iter().map(|p| p.id).collect()
    }

    /// Converts the loop closed at `reentry` into territory
    ///
    /// Succeeds when the enclosed cells the player does not already own stay
    /// within the capture cap. Either way the player's trail is lifted; on
    /// success it becomes territory, otherwise it is left unowned.
    fn claim(&mut self, id: PlayerId, reentry: Point) -> Capture {
        let solid = |cell: &Cell| cell.owner == Some(id) || cell.tail == Some(id);
        let interior: Vec<Point> = enclosure::enclosed_cells(&self.board, solid, reentry)
            .into_iter()
            .filter(|&p| self.board[p].owner != Some(id))
            .collect();

        let accepted = interior.len() * 100 <= self.board.area() * MAX_CAPTURE_PERCENT;
        if accepted {
            for &p in &interior {
                self.set_owner(p, Some(id));
            }
        } else {
            info!(
                "Game {}: player {} capture of {} cells rejected",
                self.name,
                id,
                interior.len()
            );
        }

        let trail = self.board.positions(|cell| cell.tail == Some(id));
        for p in trail {
            self.set_owner(p, accepted.then_some(id));
            self.board[p].tail = None;
        }

        Capture {
            player: id,
            cells: interior.len(),
            accepted,
        }
    }

    /// Reassigns a cell's owner, moving one point of score between the
    /// previous and the new owner
    fn set_owner(&mut self, at: Point, owner: Option<PlayerId>) {
        let previous = self.board[at].owner;
        if previous == owner {
            return;
        }
        if let Some(prev) = previous.and_then(|id| self.players.get_mut(&id)) {
            prev.score = prev.score.saturating_sub(1);
        }
        if let Some(next) = owner.and_then(|id| self.players.get_mut(&id)) {
            next.score += 1;
        }
        self.board[at].owner = owner;
    }

    /// Registers a new player centred on `at` and stamps its starting block
    pub(crate) fn spawn_at(&mut self, name: &str, at: Point) -> PlayerId {
        let id = self.next_id;
        self.next_id += 1;

        let mut player = Player::new(id, name.to_string());
        player.position = at;
        self.players.insert(id, player);
        self.stamp_start_territory(id, at);

        info!(
            "Game {}: player {} ({}) placed at {},{}",
            self.name, id, name, at.x, at.y
        );
        id
    }

    fn stamp_start_territory(&mut self, id: PlayerId, center: Point) {
        let r = START_TERRITORY_RADIUS;
        for y in center.y - r..=center.y + r {
            for x in center.x - r..=center.x + r {
                let p = Point::new(x, y);
                if self.board.contains(p) {
                    self.set_owner(p, Some(id));
                }
            }
        }
    }

    fn is_clear_around(&self, center: Point) -> bool {
        let r = SPAWN_CLEARANCE_RADIUS;
        (center.y - r..=center.y + r).all(|y| {
            (center.x - r..=center.x + r).all(|x| {
                self.board
                    .get(Point::new(x, y))
                    .is_some_and(|cell| cell.is_empty())
            })
        })
    }

    /// Spawn centres are drawn from `[pad, dim - pad)` on each axis
    fn spawn_range(dim: usize) -> std::ops::Range<i32> {
        let pad = SPAWN_MAX_PADDING.min(dim / 4);
        pad as i32..(dim - pad) as i32
    }

    fn find_spawn(&mut self) -> Option<Point> {
        let xs = Self::spawn_range(self.board.width());
        let ys = Self::spawn_range(self.board.height());
        for _ in 0..SPAWN_RANDOM_PROBES {
            let at = Point::new(
                self.rng.gen_range(xs.clone()),
                self.rng.gen_range(ys.clone()),
            );
            if self.is_clear_around(at) {
                return Some(at);
            }
        }
        self.scan_for_spawn()
    }

    fn scan_for_spawn(&self) -> Option<Point> {
        let xs = Self::spawn_range(self.board.width());
        let ys = Self::spawn_range(self.board.height());
        ys.flat_map(|y| xs.clone().map(move |x| Point::new(x, y)))
            .find(|&at| self.is_clear_around(at))
    }

    /// Wipes the board and gives every player back only the 5x5 block
    /// around its current position
    fn rehome_players(&mut self) {
        let positions: Vec<Point> = self.board.iter().map(|(p, _)| p).collect();
        for p in positions {
            self.set_owner(p, None);
            self.board[p].tail = None;
        }
        let homes: Vec<(PlayerId, Point)> =
            self.players.values().map(|p| (p.id, p.position)).collect();
        for (id, at) in homes {
            self.stamp_start_territory(id, at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(width: usize, height: usize, persistent: bool) -> MatchConfig {
        MatchConfig {
            name: "test".to_string(),
            width,
            height,
            persistent,
            duration: None,
            seed: Some(7),
            ..MatchConfig::default()
        }
    }

    fn owned_count(state: &GameState, id: PlayerId) -> usize {
        state
            .board()
            .cells()
            .iter()
            .filter(|c| c.owner == Some(id))
            .count()
    }

    fn assert_scores_match_board(state: &GameState) {
        for player in state.players() {
            assert_eq!(
                player.score(),
                owned_count(state, player.id()),
                "score of player {} drifted from the board",
                player.id()
            );
        }
    }

    fn steer(state: &mut GameState, id: PlayerId, dir: Direction, steps: usize) {
        for _ in 0..steps {
            state.set_direction(id, dir);
            state.step();
        }
    }

    #[test]
    fn test_new_rejects_small_board() {
        let result = GameState::new(&config(8, 40, true));
        assert!(matches!(result, Err(GameError::InvalidDimensions { .. })));
    }

    #[test]
    fn test_spawn_owns_five_by_five() {
        let mut state = GameState::new(&config(20, 20, true)).unwrap();
        let id = state.spawn_at("a", Point::new(10, 10));
        assert_eq!(state.player(id).unwrap().score(), 25);
        assert_eq!(state.board()[Point::new(8, 8)].owner, Some(id));
        assert_eq!(state.board()[Point::new(12, 12)].owner, Some(id));
        assert_eq!(state.board()[Point::new(13, 12)].owner, None);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut state = GameState::new(&config(40, 40, true)).unwrap();
        let a = state.add_player("a").unwrap();
        assert!(state.kill(a));
        let b = state.add_player("b").unwrap();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_add_player_finds_clear_space() {
        let mut state = GameState::new(&MatchConfig {
            seed: Some(3),
            ..MatchConfig::default()
        })
        .unwrap();
        let ids: Vec<PlayerId> = (0..8)
            .map(|i| state.add_player(&format!("bot{}", i)).unwrap())
            .collect();
        for id in &ids {
            assert_eq!(state.player(*id).unwrap().score(), 25);
        }
        assert_scores_match_board(&state);
    }

    #[test]
    fn test_add_player_on_full_board_rehomes_existing_players() {
        let mut state = GameState::new(&config(40, 40, true)).unwrap();
        let hog = state.spawn_at("hog", Point::new(20, 20));
        let everything: Vec<Point> = state.board().iter().map(|(p, _)| p).collect();
        for p in everything {
            state.set_owner(p, Some(hog));
        }
        assert_eq!(state.player(hog).unwrap().score(), 1600);

        let newcomer = state.add_player("newcomer").unwrap();

        assert_eq!(state.player(hog).unwrap().score(), 25);
        assert_eq!(state.player(newcomer).unwrap().score(), 25);
        assert_scores_match_board(&state);
    }

    #[test]
    fn test_add_player_last_resort_kills_everyone() {
        // Players sitting on every possible spawn centre keep the board
        // crowded even after re-homing.
        let mut state = GameState::new(&config(11, 11, true)).unwrap();
        let squatter = state.spawn_at("squatter", Point::new(5, 5));

        let newcomer = state.add_player("newcomer").unwrap();

        assert!(!state.is_alive(squatter));
        assert_eq!(state.player_count(), 1);
        assert_eq!(state.player(newcomer).unwrap().position(), Point::new(5, 5));
        assert_scores_match_board(&state);
    }

    #[test]
    fn test_with_players_places_ring() {
        let names = ["a", "b", "c", "d"];
        let (state, ids) = GameState::with_players(&config(162, 108, false), &names).unwrap();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(state.player(1).unwrap().position(), Point::new(135, 54));
        assert_eq!(state.player(3).unwrap().position(), Point::new(27, 54));
        for id in ids {
            assert_eq!(state.player(id).unwrap().score(), 25);
        }
    }

    #[test]
    fn test_simple_capture() {
        let mut state = GameState::new(&config(20, 20, true)).unwrap();
        let id = state.spawn_at("looper", Point::new(10, 10));

        steer(&mut state, id, Direction::Right, 4);
        steer(&mut state, id, Direction::Down, 4);
        steer(&mut state, id, Direction::Left, 4);
        steer(&mut state, id, Direction::Up, 4);

        let player = state.player(id).unwrap();
        assert_eq!(player.position(), Point::new(10, 10));
        // 5 enclosed empty cells plus 11 trail cells
        assert_eq!(player.score(), 25 + 16);
        for p in [(13, 11), (13, 12), (11, 13), (12, 13), (13, 13), (14, 14), (10, 13)] {
            assert_eq!(state.board()[Point::new(p.0, p.1)].owner, Some(id), "{:?}", p);
        }
        assert_eq!(state.board()[Point::new(9, 13)].owner, None);
        assert!(state.board().cells().iter().all(|c| c.tail.is_none()));
        assert_scores_match_board(&state);
    }

    #[test]
    fn test_capture_reported_in_step() {
        let mut state = GameState::new(&config(20, 20, true)).unwrap();
        let id = state.spawn_at("looper", Point::new(10, 10));
        steer(&mut state, id, Direction::Right, 3);
        steer(&mut state, id, Direction::Down, 3);
        steer(&mut state, id, Direction::Left, 2);
        state.set_direction(id, Direction::Up);
        let report = state.step();
        assert_eq!(
            report.captures,
            vec![Capture {
                player: id,
                cells: 6,
                accepted: true
            }]
        );
    }

    fn framed_state(interior_h: i32) -> (GameState, PlayerId) {
        let mut state = GameState::new(&config(100, 100, true)).unwrap();
        let id = state.spawn_at("framer", Point::new(80, 80));
        let (x0, y0, x1, y1) = (10, 10, 61, 10 + interior_h + 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                if x == x0 || x == x1 || y == y0 || y == y1 {
                    state.set_owner(Point::new(x, y), Some(id));
                }
            }
        }
        (state, id)
    }

    #[test]
    fn test_capture_cap_boundaries() {
        // 100x100 board: the cap is 2000 cells.
        for (interior_h, expect_accept) in [(38, true), (40, true), (42, false)] {
            let (mut state, id) = framed_state(interior_h);
            let before = state.player(id).unwrap().score();
            let capture = state.claim(id, Point::new(10, 10));
            let interior = 50 * interior_h as usize;

            assert_eq!(capture.cells, interior);
            assert_eq!(capture.accepted, expect_accept, "interior {}", interior);
            let gained = state.player(id).unwrap().score() - before;
            assert_eq!(gained, if expect_accept { interior } else { 0 });
            assert!(gained * 100 <= state.board().area() * MAX_CAPTURE_PERCENT);
            assert_scores_match_board(&state);
        }
    }

    #[test]
    fn test_rejected_capture_drops_trail() {
        let (mut state, id) = framed_state(42);
        let tail_at = Point::new(5, 5);
        state.board[tail_at].tail = Some(id);
        let capture = state.claim(id, Point::new(10, 10));
        assert!(!capture.accepted);
        assert_eq!(state.board()[tail_at], Cell::default());
    }

    #[test]
    fn test_capture_steals_from_other_owner() {
        let mut state = GameState::new(&config(30, 30, true)).unwrap();
        let a = state.spawn_at("a", Point::new(5, 5));
        let b = state.spawn_at("b", Point::new(20, 20));
        // A thin ring of a's trail around one of b's cells
        let stolen = Point::new(12, 5);
        state.set_owner(stolen, Some(b));
        for p in [(8, 4), (9, 4), (10, 4), (11, 4), (12, 4), (13, 4)] {
            state.board[Point::new(p.0, p.1)].tail = Some(a);
        }
        for p in [(13, 5), (13, 6), (12, 6), (11, 6), (10, 6), (9, 6), (8, 6)] {
            state.board[Point::new(p.0, p.1)].tail = Some(a);
        }
        let b_before = state.player(b).unwrap().score();

        let capture = state.claim(a, Point::new(7, 5));

        assert!(capture.accepted);
        assert_eq!(state.board()[stolen].owner, Some(a));
        assert_eq!(state.player(b).unwrap().score(), b_before - 1);
        assert_scores_match_board(&state);
    }

    #[test]
    fn test_mutual_elimination() {
        let mut state = GameState::new(&config(40, 40, true)).unwrap();
        let a = state.spawn_at("a", Point::new(5, 10));
        let b = state.spawn_at("b", Point::new(15, 10));
        let c = state.spawn_at("c", Point::new(30, 30));
        state.set_direction(a, Direction::Right);
        state.set_direction(b, Direction::Left);
        state.set_direction(c, Direction::Up);

        for _ in 0..4 {
            assert!(state.step().eliminated.is_empty());
        }
        let report = state.step();

        assert_eq!(report.eliminated, vec![a, b]);
        assert!(!state.is_alive(a));
        assert!(!state.is_alive(b));
        assert!(state.is_alive(c));
        assert_eq!(state.board()[Point::new(10, 10)], Cell::default());
        assert!(!state.is_over());
    }

    #[test]
    fn test_head_on_inside_own_territory_is_safe() {
        let mut state = GameState::new(&config(40, 40, true)).unwrap();
        let a = state.spawn_at("a", Point::new(10, 10));
        let b = state.spawn_at("b", Point::new(30, 30));
        // b has wandered into a's block and both heads meet at (10, 9).
        state.players.get_mut(&b).unwrap().position = Point::new(11, 9);
        state.set_direction(a, Direction::Up);
        state.set_direction(b, Direction::Left);

        let report = state.step();

        assert_eq!(report.eliminated, vec![b]);
        assert!(state.is_alive(a));
        assert_eq!(state.player(a).unwrap().position(), Point::new(10, 9));
        assert_eq!(state.board()[Point::new(10, 9)].owner, Some(a));
        assert_eq!(state.board()[Point::new(10, 9)].tail, None);
    }

    #[test]
    fn test_tail_strike() {
        let mut state = GameState::new(&config(30, 30, true)).unwrap();
        let a = state.spawn_at("a", Point::new(5, 15));
        let b = state.spawn_at("b", Point::new(17, 5));
        state.set_direction(a, Direction::Up);
        state.set_direction(b, Direction::Left);

        for _ in 0..11 {
            let report = state.step();
            assert!(report.eliminated.is_empty());
        }
        assert_eq!(state.player(a).unwrap().position(), Point::new(5, 4));
        assert_eq!(state.board()[Point::new(5, 5)].tail, Some(a));

        let report = state.step();

        assert_eq!(report.eliminated, vec![a]);
        assert!(state.is_alive(b));
        assert_eq!(state.player(b).unwrap().position(), Point::new(5, 5));
        assert_eq!(state.board()[Point::new(5, 5)].tail, Some(b));
        assert_eq!(state.board()[Point::new(5, 5)].owner, None);
    }

    #[test]
    fn test_tie_shutdown() {
        let mut state = GameState::new(&config(40, 40, false)).unwrap();
        let a = state.spawn_at("a", Point::new(5, 10));
        let b = state.spawn_at("b", Point::new(15, 10));
        state.set_direction(a, Direction::Right);
        state.set_direction(b, Direction::Left);

        for _ in 0..4 {
            assert_eq!(state.step().ended, None);
        }
        let report = state.step();

        assert_eq!(report.ended, Some(EndReason::Tie));
        assert!(report.eliminated.is_empty());
        assert!(state.is_over());
        // Nobody is declared the winner; both stay on the roster.
        assert_eq!(state.player_count(), 2);
        assert!(state.board().cells().iter().all(|c| c.tail.is_none()));
    }

    #[test]
    fn test_persistent_match_survives_total_elimination() {
        let mut state = GameState::new(&config(40, 40, true)).unwrap();
        let a = state.spawn_at("a", Point::new(5, 10));
        let b = state.spawn_at("b", Point::new(15, 10));
        state.set_direction(a, Direction::Right);
        state.set_direction(b, Direction::Left);
        for _ in 0..4 {
            state.step();
        }
        let report = state.step();

        assert_eq!(report.ended, None);
        assert_eq!(state.player_count(), 0);
        assert!(!state.is_over());
        assert_eq!(state.step(), StepReport::default());
    }

    #[test]
    fn test_last_standing_ends_non_persistent() {
        let (mut state, ids) =
            GameState::with_players(&config(60, 60, false), &["a", "b"]).unwrap();
        for _ in 0..MAX_MISSED_BATCHES {
            state.record_miss(ids[1]);
        }
        let report = state.step();
        assert_eq!(report.eliminated, vec![ids[1]]);
        assert_eq!(report.ended, Some(EndReason::LastStanding));
        assert!(state.is_over());
    }

    #[test]
    fn test_off_board_both_axes() {
        let mut state = GameState::new(&config(30, 30, true)).unwrap();
        let up = state.spawn_at("up", Point::new(10, 2));
        let left = state.spawn_at("left", Point::new(2, 20));
        state.set_direction(up, Direction::Up);
        state.set_direction(left, Direction::Left);

        state.step();
        state.step();
        assert!(state.is_alive(up));
        assert!(state.is_alive(left));
        let report = state.step();

        assert_eq!(report.eliminated, vec![up, left]);
        assert_eq!(state.board().cells().iter().filter(|c| !c.is_empty()).count(), 0);
    }

    #[test]
    fn test_response_resets_miss_counter() {
        let mut state = GameState::new(&config(30, 30, true)).unwrap();
        let id = state.spawn_at("a", Point::new(15, 15));
        state.record_miss(id);
        state.record_miss(id);
        assert_eq!(state.player(id).unwrap().missed_batches(), 2);
        state.record_response(id, Duration::from_millis(12));
        let player = state.player(id).unwrap();
        assert_eq!(player.missed_batches(), 0);
        assert_eq!(player.last_move(), Some(Duration::from_millis(12)));
    }

    #[test]
    fn test_zero_score_is_eliminated() {
        let mut state = GameState::new(&config(30, 30, true)).unwrap();
        let a = state.spawn_at("a", Point::new(10, 10));
        let b = state.spawn_at("b", Point::new(20, 20));
        let a_cells = state.board().positions(|c| c.owner == Some(a));
        for p in a_cells {
            state.set_owner(p, Some(b));
        }
        let report = state.step();
        assert_eq!(report.eliminated, vec![a]);
        assert_eq!(state.player(b).unwrap().score(), 50);
    }

    #[test]
    fn test_kill_releases_cells() {
        let mut state = GameState::new(&config(30, 30, true)).unwrap();
        let a = state.spawn_at("a", Point::new(10, 10));
        state.set_direction(a, Direction::Right);
        state.step();
        state.step();
        state.step();
        assert!(state.board().cells().iter().any(|c| c.tail == Some(a)));

        assert!(state.kill(a));
        assert!(!state.kill(a));
        assert!(state
            .board()
            .cells()
            .iter()
            .all(|c| c.owner != Some(a) && c.tail != Some(a)));
    }

    #[test]
    fn test_deadline_ends_match() {
        let mut state = GameState::new(&MatchConfig {
            duration: Some(Duration::from_secs(120)),
            persistent: false,
            ..config(40, 40, false)
        })
        .unwrap();
        state.spawn_at("a", Point::new(10, 10));
        state.spawn_at("b", Point::new(30, 30));
        let start = Instant::now();

        assert_eq!(state.step_at(start).ended, None);
        assert!(state.time_left().is_some());
        let report = state.step_at(start + Duration::from_secs(121));
        assert_eq!(report.ended, Some(EndReason::Deadline));
        assert!(state.is_over());
        let tick = state.tick();
        state.step();
        assert_eq!(state.tick(), tick);
    }

    proptest! {
        #[test]
        fn prop_scores_track_board(moves in prop::collection::vec((0usize..3, 0usize..4), 1..120)) {
            let mut state = GameState::new(&config(40, 40, true)).unwrap();
            let ids = [
                state.spawn_at("a", Point::new(10, 10)),
                state.spawn_at("b", Point::new(28, 12)),
                state.spawn_at("c", Point::new(18, 28)),
            ];
            for (who, dir) in moves {
                state.set_direction(ids[who], Direction::ALL[dir]);
                let report = state.step();

                for player in state.players() {
                    prop_assert_eq!(player.score(), owned_count(&state, player.id()));
                }
                for dead in report.eliminated {
                    prop_assert!(!state.is_alive(dead));
                    prop_assert!(state
                        .board()
                        .cells()
                        .iter()
                        .all(|c| c.owner != Some(dead) && c.tail != Some(dead)));
                }
                for capture in report.captures {
                    prop_assert!(capture.cells * 100 <= state.board().area() * MAX_CAPTURE_PERCENT || !capture.accepted);
                }
            }
        }
    }
}
