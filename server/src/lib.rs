//! # Match Server Library
//!
//! This library provides the authoritative server for a paper.io style
//! territory game played by bots. Every player moves one cell per
//! micro-turn, trails a tail behind it while outside its territory, and
//! captures the region enclosed when it returns home.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server owns the board. Bots only ever send directions; movement,
//! collisions, captures, eliminations and the end of the match are decided
//! here.
//!
//! ### Turn Batching
//! Moves are collected in batches of up to five per player. A batch closes
//! once every seated player has answered and a minimum wait has passed, or
//! when the maximum wait runs out. Players that stay silent accumulate
//! misses and are eventually eliminated.
//!
//! ### Views and Snapshots
//! Each player receives a square window of the board around its head that
//! grows with its score. Observers receive the full board, run-length
//! encoded, for every micro-turn.
//!
//! ## Architecture Design
//!
//! ### One Task per Match
//! A match runs in its own tokio task which exclusively owns the
//! `GameState`. All access goes through a cloneable `MatchHandle`, so the
//! simulation never needs a lock.
//!
//! ### UDP-Based Communication
//! The transport speaks bincode packets over UDP. Requests that wait for a
//! batch are answered from spawned tasks, keeping the receive loop free.
//!
//! ## Module Organization
//!
//! ### Board and Enclosure (`board`, `enclosure`)
//! Row-major cell grid with per-cell owner and tail, plus the outline
//! tracer that finds the cells enclosed by a player's territory and tail.
//!
//! ### Game Module (`game`)
//! Spawning, movement, collision rules, captures, attrition and the
//! match clock.
//!
//! ### Snapshot Module (`snapshot`)
//! JSON encoding of full snapshots and per-player views, and the board
//! run-length codec.
//!
//! ### Batching and Orchestration (`batch`, `orchestrator`, `history`)
//! The batch window timers, the match task and the record handed off when
//! a match ends.
//!
//! ### Network Modules (`network`, `client_manager`)
//! UDP packet handling, connection tracking and timeouts. Rounds restart
//! automatically when a match ends.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::{MatchConfig, ServerConfig};
//! use server::history::MatchRecord;
//! use server::network::Server;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (history, mut records) = mpsc::unbounded_channel::<MatchRecord>();
//!     tokio::spawn(async move {
//!         while let Some(record) = records.recv().await {
//!             println!("match {} finished", record.name);
//!         }
//!     });
//!
//!     let mut server =
//!         Server::new(ServerConfig::default(), MatchConfig::default(), history).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! Matches can also be driven directly without the transport:
//!
//! ```rust,no_run
//! use server::config::MatchConfig;
//! use server::orchestrator::MatchRunner;
//! use shared::Point;
//!
//! # async fn demo() -> Result<(), server::error::MatchError> {
//! let roster = vec!["north".to_string(), "south".to_string()];
//! let (handle, _task) =
//!     MatchRunner::spawn(&MatchConfig::default(), &roster, 100, |_record| {})?;
//!
//! let status = handle.submit_moves(1, vec![Point::new(0, -1)]).await?;
//! println!("{}", status.view);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod board;
pub mod client_manager;
pub mod config;
pub mod enclosure;
pub mod error;
pub mod game;
pub mod history;
pub mod network;
pub mod orchestrator;
pub mod snapshot;
