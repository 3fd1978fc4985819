//! Server network layer bridging UDP clients to the running match
//!
//! Bots and observers talk bincode `Packet`s over UDP. The main loop owns
//! the `MatchHandle` of the current round; each request that has to wait for
//! a batch runs in its own task and queues its reply for the sender task, so
//! a slow batch never blocks packet handling.
//!
//! When a match ends its record goes to the history channel, every seat
//! binding is dropped and a fresh round starts; bots rejoin on their own.

use crate::board::PlayerId;
use crate::client_manager::{Client, ClientManager};
use crate::config::{MatchConfig, ServerConfig};
use crate::error::MatchError;
use crate::history::MatchRecord;
use crate::orchestrator::{MatchHandle, MatchRunner};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Largest datagram the server accepts
const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client: Client },
    Shutdown,
}

/// Messages sent to the network sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// UDP front end hosting one match round after another
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    match_config: MatchConfig,
    command_buffer: usize,
    history: mpsc::UnboundedSender<MatchRecord>,
    current: MatchHandle,
    round: u32,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    /// Binds the socket and starts the first round
    ///
    /// The hosted match is always persistent so bots can join at any time.
    pub async fn new(
        config: ServerConfig,
        match_config: MatchConfig,
        history: mpsc::UnboundedSender<MatchRecord>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let match_config = MatchConfig {
            persistent: true,
            ..match_config
        };
        let current = Self::spawn_round(&match_config, 1, config.command_buffer, &history)?;

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout,
            ))),
            match_config,
            command_buffer: config.command_buffer,
            history,
            current,
            round: 1,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Channel into the main loop, e.g. for sending `Shutdown`
    pub fn sender(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    fn spawn_round(
        base: &MatchConfig,
        round: u32,
        command_buffer: usize,
        history: &mpsc::UnboundedSender<MatchRecord>,
    ) -> Result<MatchHandle, MatchError> {
        let config = MatchConfig {
            name: format!("{}-{}", base.name, round),
            ..base.clone()
        };
        let (handle, _task) = MatchRunner::spawn(&config, &[], command_buffer, history.clone())?;
        info!("Round {} started as game {}", round, config.name);
        Ok(handle)
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = encode_for_datagram(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn queue_packet(game_tx: &mpsc::UnboundedSender<GameMessage>, packet: Packet, addr: SocketAddr) {
        if let Err(e) = game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        Self::queue_packet(&self.game_tx, packet, addr);
    }

    /// Processes incoming packets
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Join {
                client_version,
                name,
            } => {
                self.handle_join(client_version, name, addr).await;
            }

            Packet::Moves { moves } => {
                let player = {
                    let mut clients = self.clients.write().await;
                    clients.find_client_by_addr(addr).and_then(|client_id| {
                        clients.touch(client_id);
                        clients.player_of(client_id)
                    })
                };

                let Some(player) = player else {
                    debug!("Moves from unseated client at {}", addr);
                    self.send_packet(
                        Packet::Rejected {
                            reason: "join the match before sending moves".to_string(),
                        },
                        addr,
                    );
                    return;
                };

                let handle = self.current.clone();
                let game_tx = self.game_tx.clone();
                tokio::spawn(async move {
                    let packet = match handle.submit_moves(player, moves).await {
                        Ok(status) => Packet::Status { view: status.view },
                        Err(e) => Packet::Rejected {
                            reason: e.to_string(),
                        },
                    };
                    Self::queue_packet(&game_tx, packet, addr);
                });
            }

            Packet::Observe => {
                let client_id = {
                    let mut clients = self.clients.write().await;
                    match clients.find_client_by_addr(addr) {
                        Some(client_id) => {
                            clients.touch(client_id);
                            Some(client_id)
                        }
                        None => clients.add_client(addr),
                    }
                };
                if client_id.is_none() {
                    self.send_packet(
                        Packet::Rejected {
                            reason: "Server full".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                let handle = self.current.clone();
                let game_tx = self.game_tx.clone();
                tokio::spawn(async move {
                    let packet = match handle.observe().await {
                        Ok(snapshots) => Packet::Observation { snapshots },
                        Err(e) => Packet::Rejected {
                            reason: e.to_string(),
                        },
                    };
                    Self::queue_packet(&game_tx, packet, addr);
                });
            }

            Packet::Leave => {
                let client = {
                    let mut clients = self.clients.write().await;
                    match clients.find_client_by_addr(addr) {
                        Some(client_id) => clients.remove_client(&client_id),
                        None => None,
                    }
                };
                if let Some(player) = client.and_then(|c| c.player) {
                    self.release_player(player).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_join(&mut self, client_version: u32, name: String, addr: SocketAddr) {
        info!(
            "Client joining from {} as {} (version: {})",
            addr, name, client_version
        );

        if client_version != PROTOCOL_VERSION {
            warn!("Rejecting {}: unsupported client version {}", addr, client_version);
            self.send_packet(
                Packet::Rejected {
                    reason: format!("unsupported client version {}", client_version),
                },
                addr,
            );
            return;
        }

        let (client_id, previous_seat) = {
            let mut clients = self.clients.write().await;
            match clients.find_client_by_addr(addr) {
                Some(client_id) => {
                    clients.touch(client_id);
                    (Some(client_id), clients.player_of(client_id))
                }
                None => (clients.add_client(addr), None),
            }
        };

        let Some(client_id) = client_id else {
            self.send_packet(
                Packet::Rejected {
                    reason: "Server full".to_string(),
                },
                addr,
            );
            return;
        };

        // Rejoining from the same address gives up the old seat.
        if let Some(player) = previous_seat {
            self.release_player(player).await;
        }

        let handle = self.current.clone();
        let clients = Arc::clone(&self.clients);
        let game_tx = self.game_tx.clone();
        tokio::spawn(async move {
            match handle.join(&name).await {
                Ok(joined) => {
                    clients
                        .write()
                        .await
                        .bind_player(client_id, &name, joined.player);
                    info!(
                        "Client {} seated as player {} ({})",
                        client_id, joined.player, name
                    );
                    Self::queue_packet(
                        &game_tx,
                        Packet::Joined {
                            player_id: joined.player,
                        },
                        addr,
                    );
                    Self::queue_packet(&game_tx, Packet::Status { view: joined.view }, addr);
                }
                Err(e) => {
                    warn!("Join from {} refused: {}", addr, e);
                    Self::queue_packet(
                        &game_tx,
                        Packet::Rejected {
                            reason: e.to_string(),
                        },
                        addr,
                    );
                }
            }
        });
    }

    /// Takes a player off the board of the current round
    async fn release_player(&self, player: PlayerId) {
        if let Err(e) = self.current.remove(player).await {
            warn!("Failed to remove player {}: {}", player, e);
        }
    }

    async fn start_next_round(&mut self) -> Result<(), MatchError> {
        self.clients.write().await.unbind_players();
        self.round += 1;
        self.current = Self::spawn_round(
            &self.match_config,
            self.round,
            self.command_buffer,
            &self.history,
        )?;
        Ok(())
    }

    /// Main server loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client }) => {
                            info!(
                                "Client {} ({}) timed out",
                                client.id,
                                client.name.as_deref().unwrap_or("observer")
                            );
                            if let Some(player) = client.player {
                                self.release_player(player).await;
                            }
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Replace the match once it is over
                _ = self.current.finished() => {
                    self.start_next_round().await?;
                },
            }
        }

        Ok(())
    }
}

/// Serializes `packet`, replacing it with something smaller when it would
/// not fit in one datagram
///
/// Observations fall back to their newest snapshot. Anything else that is
/// still too large becomes a `Rejected` naming the size.
fn encode_for_datagram(packet: &Packet) -> Result<Vec<u8>, bincode::Error> {
    let data = serialize(packet)?;
    if data.len() <= MAX_DATAGRAM_SIZE {
        return Ok(data);
    }

    if let Packet::Observation { snapshots } = packet {
        if let Some(snapshots) = newest_snapshot(snapshots) {
            let smaller = serialize(&Packet::Observation { snapshots })?;
            if smaller.len() <= MAX_DATAGRAM_SIZE {
                warn!(
                    "Observation of {} bytes trimmed to its newest snapshot",
                    data.len()
                );
                return Ok(smaller);
            }
        }
    }

    warn!(
        "Reply of {} bytes exceeds the datagram limit, sending a rejection",
        data.len()
    );
    serialize(&Packet::Rejected {
        reason: format!(
            "reply of {} bytes exceeds the {} byte datagram limit",
            data.len(),
            MAX_DATAGRAM_SIZE
        ),
    })
}

/// The last frame of a JSON array of snapshots, as a one-element array
fn newest_snapshot(snapshots: &str) -> Option<String> {
    let mut frames: Vec<serde_json::Value> = serde_json::from_str(snapshots).ok()?;
    if frames.len() < 2 {
        return None;
    }
    let last = frames.pop()?;
    Some(format!("[{}]", last))
}
