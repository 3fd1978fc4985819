//! Turn-batching orchestrator
//!
//! Each match runs in its own tokio task that exclusively owns the
//! `GameState`. Everything else talks to it through a cloneable
//! `MatchHandle`, which sends `MatchCommand`s over an mpsc channel; every
//! request carries a oneshot sender for its reply.
//!
//! ## Batch cycle
//!
//! 1. Open a `BatchWindow` and collect moves until it closes
//! 2. Count a miss for every seated player that stayed silent
//! 3. Run up to five micro-turns, applying one queued move per player before
//!    each step and keeping a `FullSnapshot` of every step
//! 4. Answer every waiting player with its view and every observer with the
//!    batch's snapshots; drop the seats of eliminated players
//!
//! The first batch of a match only hands out views.
//!
//! Once the match is over the record goes to the `HistorySink`, and the task
//! keeps answering requests with terminal replies until every handle is
//! dropped.

use crate::batch::BatchWindow;
use crate::board::PlayerId;
use crate::config::MatchConfig;
use crate::error::MatchError;
use crate::game::{GameState, StepReport};
use crate::history::{HistorySink, MatchRecord, MoveLog};
use crate::snapshot::{FullSnapshot, ViewResponse};
use log::{debug, error, info};
use shared::{sanitize_moves, Direction, Point, MOVES_PER_BATCH};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

const OVER_VIEW: &str = r#"{"over":true}"#;

/// Reply to a successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    pub player: PlayerId,
    /// JSON `ViewResponse` of the freshly placed player
    pub view: String,
}

/// Reply to a move submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// JSON `ViewResponse`
    pub view: String,
    /// The player has nothing left to play for
    pub over: bool,
}

#[derive(Debug)]
pub enum MatchCommand {
    Join {
        name: String,
        respond: oneshot::Sender<Result<Joined, MatchError>>,
    },
    /// Replaces the player's queued moves for the current batch; answered
    /// at the next broadcast
    SubmitMoves {
        player: PlayerId,
        moves: Vec<Point>,
        respond: oneshot::Sender<Status>,
    },
    /// Answered at the next broadcast with a JSON array of snapshots
    Observe { respond: oneshot::Sender<String> },
    /// Takes a player out of the match immediately, releasing its cells
    Remove { player: PlayerId },
}

/// Cloneable front door to a running match
#[derive(Debug, Clone)]
pub struct MatchHandle {
    commands: mpsc::Sender<MatchCommand>,
    finished: watch::Receiver<bool>,
}

impl MatchHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> MatchCommand,
    ) -> Result<T, MatchError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| MatchError::Stopped)?;
        rx.await.map_err(|_| MatchError::Stopped)
    }

    /// Seats a new player. Only persistent matches accept joins.
    pub async fn join(&self, name: &str) -> Result<Joined, MatchError> {
        self.request(|respond| MatchCommand::Join {
            name: name.to_string(),
            respond,
        })
        .await?
    }

    /// Queues up to five moves and waits for the batch to be played
    pub async fn submit_moves(
        &self,
        player: PlayerId,
        moves: Vec<Point>,
    ) -> Result<Status, MatchError> {
        self.request(|respond| MatchCommand::SubmitMoves {
            player,
            moves,
            respond,
        })
        .await
    }

    /// Waits for the next broadcast and returns its snapshots
    pub async fn observe(&self) -> Result<String, MatchError> {
        self.request(|respond| MatchCommand::Observe { respond })
            .await
    }

    pub async fn remove(&self, player: PlayerId) -> Result<(), MatchError> {
        self.commands
            .send(MatchCommand::Remove { player })
            .await
            .map_err(|_| MatchError::Stopped)
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// Resolves once the match is over or its task is gone
    pub async fn finished(&self) {
        let mut finished = self.finished.clone();
        while !*finished.borrow_and_update() {
            if finished.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Per-player batch bookkeeping
#[derive(Debug, Default)]
struct Seat {
    queue: VecDeque<Direction>,
    answered: bool,
    waiting: Vec<oneshot::Sender<Status>>,
}

/// The task body driving one match
pub struct MatchRunner {
    state: GameState,
    min_wait: Duration,
    max_wait: Duration,
    seats: BTreeMap<PlayerId, Seat>,
    observers: Vec<oneshot::Sender<String>>,
    commands: mpsc::Receiver<MatchCommand>,
    detached: bool,
    batches: u64,
    history: Vec<String>,
    moves: MoveLog,
    sink: Option<Box<dyn HistorySink>>,
    finished: watch::Sender<bool>,
}

impl MatchRunner {
    /// Creates the match, seats `roster` and spawns its task
    pub fn spawn<S: HistorySink>(
        config: &MatchConfig,
        roster: &[String],
        command_buffer: usize,
        sink: S,
    ) -> Result<(MatchHandle, JoinHandle<()>), MatchError> {
        let (state, ids) = GameState::with_players(config, roster)?;
        let (commands_tx, commands_rx) = mpsc::channel(command_buffer.max(1));
        let (finished_tx, finished_rx) = watch::channel(false);

        let runner = MatchRunner {
            state,
            min_wait: config.min_wait,
            max_wait: config.max_wait,
            seats: ids.into_iter().map(|id| (id, Seat::default())).collect(),
            observers: Vec::new(),
            commands: commands_rx,
            detached: false,
            batches: 0,
            history: Vec::new(),
            moves: MoveLog::new(),
            sink: Some(Box::new(sink)),
            finished: finished_tx,
        };

        let task = tokio::spawn(runner.run());
        let handle = MatchHandle {
            commands: commands_tx,
            finished: finished_rx,
        };
        Ok((handle, task))
    }

    async fn run(mut self) {
        info!(
            "Game {} started with {} players",
            self.state.name(),
            self.state.player_count()
        );

        while !self.state.is_over() {
            self.collect_batch().await;

            if self.detached {
                info!("Game {}: every handle dropped, ending match", self.state.name());
                self.state.shutdown();
                let last = self.frame();
                self.history.extend(last);
                self.broadcast(&[]);
                break;
            }

            let frames = self.advance();
            self.broadcast(&frames);
        }

        self.finish();
        self.serve_finished().await;
    }

    /// Accepts commands until the batch window closes
    async fn collect_batch(&mut self) {
        let mut window = BatchWindow::open(Instant::now(), self.min_wait, self.max_wait);
        if self.everyone_answered() {
            let opened = window.opened_at();
            window.all_arrived(opened);
        }

        while !window.is_closed(Instant::now()) && !self.detached {
            tokio::select! {
                _ = sleep_until(window.closes_at()) => {},

                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle(command, &mut window),
                        None => self.detached = true,
                    }
                },
            }
        }

        // Silent seats contribute no moves, not even ones left from earlier.
        for (&id, seat) in self.seats.iter_mut() {
            if seat.answered {
                continue;
            }
            seat.queue.clear();
            if self.batches > 0 {
                self.state.record_miss(id);
            }
        }

        debug!(
            "Game {}: batch {} closed after {:?}",
            self.state.name(),
            self.batches,
            window.elapsed(Instant::now())
        );
    }

    fn handle(&mut self, command: MatchCommand, window: &mut BatchWindow) {
        let now = Instant::now();

        match command {
            MatchCommand::Join { name, respond } => {
                let joined = self.join(&name);
                reply(respond, joined);
            }
            MatchCommand::SubmitMoves {
                player,
                moves,
                respond,
            } => match self.seats.get_mut(&player) {
                Some(seat) => {
                    seat.queue = sanitize_moves(&moves).into();
                    seat.waiting.push(respond);
                    if !seat.answered {
                        seat.answered = true;
                        self.state.record_response(player, window.elapsed(now));
                    }
                }
                None => reply(respond, self.status_for(player)),
            },
            MatchCommand::Observe { respond } => self.observers.push(respond),
            MatchCommand::Remove { player } => self.remove(player),
        }

        if self.everyone_answered() {
            window.all_arrived(now);
        }
    }

    fn everyone_answered(&self) -> bool {
        self.seats.values().all(|seat| seat.answered)
    }

    fn join(&mut self, name: &str) -> Result<Joined, MatchError> {
        if !self.state.is_persistent() || self.state.is_over() {
            return Err(MatchError::Closed);
        }

        let player = self.state.add_player(name)?;
        // The last-resort spawn tier may have eliminated everyone else.
        self.drop_dead_seats();
        self.seats.insert(
            player,
            Seat {
                answered: true,
                ..Seat::default()
            },
        );

        let view = ViewResponse::capture(&self.state, player).to_json()?;
        Ok(Joined { player, view })
    }

    fn remove(&mut self, player: PlayerId) {
        if self.state.kill(player) {
            info!(
                "Player {} removed from game {}",
                player,
                self.state.name()
            );
        }
        self.drop_dead_seats();
    }

    /// Runs the micro-turns of one batch and returns their snapshots
    fn advance(&mut self) -> Vec<String> {
        let sync = self.batches == 0;
        self.batches += 1;
        if sync {
            return Vec::new();
        }

        let mut frames = Vec::new();
        for _ in 0..MOVES_PER_BATCH {
            if self.state.is_over() {
                break;
            }

            for (&id, seat) in self.seats.iter_mut() {
                let Some(player) = self.state.player(id) else {
                    continue;
                };
                let next = seat.queue.pop_front();
                self.moves.push(player.name(), next.map(Point::from));
                if let Some(direction) = next {
                    self.state.set_direction(id, direction);
                }
            }

            let report = self.state.step();
            if report == StepReport::default() && self.state.player_count() == 0 {
                break;
            }
            for capture in &report.captures {
                debug!(
                    "Game {}: player {} closed a loop of {} cells (accepted: {})",
                    self.state.name(),
                    capture.player,
                    capture.cells,
                    capture.accepted
                );
            }
            if let Some(reason) = report.ended {
                info!("Game {} ended: {:?}", self.state.name(), reason);
            }

            frames.extend(self.frame());
        }
        frames
    }

    /// Answers everyone waiting on this batch
    fn broadcast(&mut self, frames: &[String]) {
        self.history.extend_from_slice(frames);

        if !self.observers.is_empty() {
            let payload = if frames.is_empty() {
                snapshots_json(&self.frame().into_iter().collect::<Vec<_>>())
            } else {
                snapshots_json(frames)
            };
            for respond in self.observers.drain(..) {
                reply(respond, payload.clone());
            }
        }

        let ids: Vec<PlayerId> = self.seats.keys().copied().collect();
        for id in ids {
            let status = match self.seats.get(&id) {
                Some(seat) if !seat.waiting.is_empty() => Some(self.status_for(id)),
                _ => None,
            };
            if let Some(seat) = self.seats.get_mut(&id) {
                if let Some(status) = status {
                    for respond in seat.waiting.drain(..) {
                        reply(respond, status.clone());
                    }
                }
                seat.answered = false;
            }
        }

        self.drop_dead_seats();
    }

    /// Sends the terminal view to eliminated players and forgets them
    fn drop_dead_seats(&mut self) {
        let dead: Vec<PlayerId> = self
            .seats
            .keys()
            .copied()
            .filter(|&id| !self.state.is_alive(id))
            .collect();

        for id in dead {
            if let Some(seat) = self.seats.remove(&id) {
                debug!("Game {}: seat {} released", self.state.name(), id);
                for respond in seat.waiting {
                    reply(respond, self.status_for(id));
                }
            }
        }
    }

    fn status_for(&self, id: PlayerId) -> Status {
        let view = ViewResponse::capture(&self.state, id);
        let over = view.is_over();
        let view = view.to_json().unwrap_or_else(|e| {
            error!("Failed to encode view for player {}: {}", id, e);
            OVER_VIEW.to_string()
        });
        Status { view, over }
    }

    fn frame(&self) -> Option<String> {
        match FullSnapshot::capture(&self.state).to_json() {
            Ok(frame) => Some(frame),
            Err(e) => {
                error!("Failed to encode snapshot of game {}: {}", self.state.name(), e);
                None
            }
        }
    }

    fn finish(&mut self) {
        info!(
            "Game {} over after {} batches and {} micro-turns",
            self.state.name(),
            self.batches,
            self.state.tick()
        );

        let record = MatchRecord {
            name: self.state.name().to_string(),
            snapshots: std::mem::take(&mut self.history),
            moves: std::mem::take(&mut self.moves),
        };
        if let Some(mut sink) = self.sink.take() {
            sink.record(record);
        }
        self.finished.send_replace(true);
    }

    /// Answers late requests until every handle is gone
    async fn serve_finished(mut self) {
        let last = snapshots_json(&self.frame().into_iter().collect::<Vec<_>>());

        while let Some(command) = self.commands.recv().await {
            match command {
                MatchCommand::Join { respond, .. } => reply(respond, Err(MatchError::Closed)),
                MatchCommand::SubmitMoves {
                    player, respond, ..
                } => reply(respond, self.status_for(player)),
                MatchCommand::Observe { respond } => reply(respond, last.clone()),
                MatchCommand::Remove { .. } => {}
            }
        }

        debug!("Game {} task exiting", self.state.name());
    }
}

fn reply<T>(respond: oneshot::Sender<T>, value: T) {
    if respond.send(value).is_err() {
        debug!("Requester went away before its reply");
    }
}

fn snapshots_json(frames: &[String]) -> String {
    format!("[{}]", frames.join(","))
}
