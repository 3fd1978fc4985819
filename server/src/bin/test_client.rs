use bincode::{deserialize, serialize};
use shared::{Direction, Packet, Point, MOVES_PER_BATCH, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Sides of the square the bot keeps tracing, one batch per side
const LOOP: [Direction; 4] = [
    Direction::Up,
    Direction::Right,
    Direction::Down,
    Direction::Left,
];

async fn receive(socket: &UdpSocket, buf: &mut [u8]) -> Result<Packet, Box<dyn std::error::Error>> {
    let (len, _) = timeout(Duration::from_secs(3), socket.recv_from(buf)).await??;
    Ok(deserialize::<Packet>(&buf[0..len])?)
}

fn describe(view: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(view) {
        Ok(value) if value["over"] == true => "match over".to_string(),
        Ok(value) => {
            let scores: Vec<String> = value["players"]
                .as_array()
                .map(|players| {
                    players
                        .iter()
                        .map(|p| format!("{}={}", p["name"], p["score"]))
                        .collect()
                })
                .unwrap_or_default();
            format!("origin={} players: {}", value["viewOrigin"], scores.join(" "))
        }
        Err(e) => format!("unreadable view: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse::<SocketAddr>()?;
    let name = std::env::args().nth(2).unwrap_or_else(|| "square".to_string());

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let join = Packet::Join {
        client_version: PROTOCOL_VERSION,
        name: name.clone(),
    };
    println!("Joining {} as {}", server_addr, name);
    socket.send_to(&serialize(&join)?, server_addr).await?;

    let mut buf = vec![0u8; 64 * 1024];
    match receive(&socket, &mut buf).await? {
        Packet::Joined { player_id } => println!("Seated as player {}", player_id),
        other => {
            println!("Expected Joined but got: {:?}", other);
            return Ok(());
        }
    }
    if let Packet::Status { view } = receive(&socket, &mut buf).await? {
        println!("Initial view: {}", describe(&view));
    }

    for (batch, side) in LOOP.iter().cycle().take(40).enumerate() {
        let moves = vec![Point::from(*side); MOVES_PER_BATCH];
        socket
            .send_to(&serialize(&Packet::Moves { moves })?, server_addr)
            .await?;

        match receive(&socket, &mut buf).await? {
            Packet::Status { view } => {
                let summary = describe(&view);
                println!("Batch {}: {}", batch + 1, summary);
                if summary == "match over" {
                    break;
                }
            }
            other => println!("Unexpected packet: {:?}", other),
        }
    }

    println!("Sending leave");
    socket.send_to(&serialize(&Packet::Leave)?, server_addr).await?;
    println!("Test client finished");

    Ok(())
}
