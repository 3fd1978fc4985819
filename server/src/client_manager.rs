//! Connection registry for the UDP transport
//!
//! This module tracks which remote addresses are talking to the server:
//! - Connection lifecycle (join, leave, idle timeout)
//! - Capacity enforcement
//! - The binding between a connection and its seat in the current match
//!
//! A connection outlives match rounds. When a round ends its player binding
//! is dropped and the bot is expected to join again.

use crate::board::PlayerId;
use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A remote bot or observer
#[derive(Debug)]
pub struct Client {
    /// Connection identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Name the bot joined with, if it joined as a player
    pub name: Option<String>,
    /// Seat in the current match
    pub player: Option<PlayerId>,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            name: None,
            player: None,
            last_seen: Instant::now(),
        }
    }

    /// Records activity from this client
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing has arrived from this client within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages every connected client
///
/// Enforces the capacity limit and maps incoming addresses to clients and
/// clients to match seats.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    /// Silence after which a client is dropped
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if the server is at
    /// capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));
        Some(client_id)
    }

    /// Removes a client, handing it back so its seat can be released
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    /// Finds a client ID by its network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Marks a client as recently active. Returns false for unknown ids.
    pub fn touch(&mut self, client_id: u32) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Associates a client with its seat in the current match
    pub fn bind_player(&mut self, client_id: u32, name: &str, player: PlayerId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.name = Some(name.to_string());
                client.player = Some(player);
                true
            }
            None => false,
        }
    }

    pub fn player_of(&self, client_id: u32) -> Option<PlayerId> {
        self.clients.get(&client_id).and_then(|c| c.player)
    }

    /// Forgets every seat; called when a new match round starts
    pub fn unbind_players(&mut self) {
        for client in self.clients.values_mut() {
            client.player = None;
        }
    }

    /// Removes clients that have been silent for longer than the timeout
    ///
    /// Returns the removed clients so their seats can be released.
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timeout = self.timeout;
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
