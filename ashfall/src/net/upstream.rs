//! The persistent link to the authoritative game server. One connection,
//! automatic reconnect with exponential backoff, fatal after the retry
//! budget: a chunk server without its upstream is not a server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::atomic::AtomicCell;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use ashfall_protocol::framing::{FrameAccumulator, MAX_UPSTREAM_FRAME_BYTES, READ_CHUNK_BYTES};
use ashfall_protocol::upstream::event_type as up;
use ashfall_protocol::{RequestEnvelope, RequestTimestamps, ResponseBuilder};

use crate::event::{Event, EventKind, EventPayload};
use crate::services::GameServices;

pub const MAX_RETRY_COUNT: u32 = 5;
const RETRY_BASE_SECS: u64 = 5;

/// Shared sender half of the upstream link. Handlers queue finished lines;
/// the link task owns the socket and the reconnect policy.
pub struct UpstreamHandle {
    sender: mpsc::UnboundedSender<String>,
    connected: AtomicBool,
    last_activity: AtomicCell<Option<Instant>>,
}

impl UpstreamHandle {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            sender,
            connected: AtomicBool::new(false),
            last_activity: AtomicCell::new(None),
        }
    }

    /// Queue a line for the game server. Failures are logged, not retried;
    /// per-message delivery is best-effort, reconnection is handled at the
    /// connection level.
    pub fn send(&self, line: String) -> bool {
        match self.sender.send(line) {
            Ok(()) => true,
            Err(_) => {
                log::error!("upstream link is gone; dropping outbound message");
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Seconds since the last replication frame, if any arrived yet.
    pub fn idle_secs(&self) -> Option<u64> {
        self.last_activity
            .load()
            .map(|at| at.elapsed().as_secs())
    }

    fn mark_activity(&self) {
        self.last_activity.store(Some(Instant::now()));
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

/// Run the link until process shutdown. Owns both directions: outbound
/// lines from `outbound`, inbound replication frames onto the upstream
/// queue.
pub async fn run_upstream_link(
    services: Arc<GameServices>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let endpoint = format!(
        "{}:{}",
        services.config.game_server.host, services.config.game_server.port
    );
    let mut retries: u32 = 0;

    loop {
        log::info!("connecting to game server at {endpoint}");
        let stream = match TcpStream::connect(&endpoint).await {
            Ok(stream) => stream,
            Err(err) => {
                if retries >= MAX_RETRY_COUNT {
                    log::error!("game server unreachable after {MAX_RETRY_COUNT} retries: {err}");
                    std::process::exit(1);
                }
                let wait = RETRY_BASE_SECS * (1 << retries);
                retries += 1;
                log::warn!(
                    "game server connect failed ({err}); retry {retries}/{MAX_RETRY_COUNT} in {wait}s"
                );
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }
        };

        retries = 0;
        services.upstream.set_connected(true);
        log::info!("connected to game server at {endpoint}");

        if let Err(err) = drive_connection(&services, stream, &mut outbound).await {
            let idle = services
                .upstream
                .idle_secs()
                .map_or_else(|| "never heard from".to_owned(), |s| format!("idle {s}s"));
            log::error!("upstream link dropped ({idle}): {err}");
        }
        services.upstream.set_connected(false);
    }
}

async fn drive_connection(
    services: &Arc<GameServices>,
    stream: TcpStream,
    outbound: &mut mpsc::UnboundedReceiver<String>,
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    let handshake = ResponseBuilder::new("chunkServerConnection")
        .body("id", services.chunks.chunk_id())
        .body("ip", services.config.chunk_server.host.clone())
        .body("port", services.config.chunk_server.port)
        .success();
    writer.write_all(handshake.as_bytes()).await?;

    let mut accumulator = FrameAccumulator::new(MAX_UPSTREAM_FRAME_BYTES);
    let mut scratch = vec![0u8; READ_CHUNK_BYTES];

    loop {
        tokio::select! {
            read = reader.read(&mut scratch) => {
                let n = read?;
                if n == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "game server closed the connection",
                    ));
                }
                if accumulator.push(&scratch[..n]).is_err() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "upstream frame buffer overflow",
                    ));
                }
                while let Some(frame) = accumulator.next_frame() {
                    ingest_frame(services, &frame);
                }
                accumulator.compact();
            }
            line = outbound.recv() => {
                match line {
                    Some(line) => writer.write_all(line.as_bytes()).await?,
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Parse one replication frame and queue it for the upstream event loop.
fn ingest_frame(services: &Arc<GameServices>, frame: &str) {
    services.upstream.mark_activity();
    let envelope = match RequestEnvelope::parse(frame) {
        Ok(envelope) => envelope,
        Err(err) => {
            log::error!("malformed upstream frame skipped: {err}");
            return;
        }
    };

    let Some(kind) = replication_kind(&envelope.header.event_type) else {
        log::warn!(
            "unknown upstream event type {:?} dropped",
            envelope.header.event_type
        );
        return;
    };

    let event = Event::new(kind, envelope.header.client_id, EventPayload::Json(envelope.body))
        .with_timestamps(RequestTimestamps::capture(&envelope.header));
    services.upstream_queue.push(event);
}

fn replication_kind(event_type: &str) -> Option<EventKind> {
    Some(match event_type {
        up::SET_CHUNK_DATA => EventKind::SetChunkData,
        up::SET_CHARACTER_DATA => EventKind::SetCharacterData,
        up::SET_CHARACTER_ATTRIBUTES => EventKind::SetCharacterAttributes,
        up::SET_ALL_SPAWN_ZONES => EventKind::SetAllSpawnZones,
        up::SET_ALL_MOBS_LIST => EventKind::SetAllMobsList,
        up::SET_ALL_MOBS_ATTRIBUTES => EventKind::SetAllMobsAttributes,
        up::SET_ALL_MOBS_SKILLS => EventKind::SetAllMobsSkills,
        up::SET_ALL_ITEMS_LIST => EventKind::SetAllItemsList,
        up::SET_MOB_LOOT_INFO => EventKind::SetMobLootInfo,
        up::SET_EXP_LEVEL_TABLE => EventKind::SetExpLevelTable,
        _ => return None,
    })
}

/// Ask the game server for everything this chunk needs to simulate.
/// Sent once after the chunk assignment lands.
pub fn request_initial_state(services: &GameServices) {
    for event_type in [
        "getSpawnZones",
        "getMobsList",
        "getAllItems",
        "getExpLevelTable",
        "getMobsAttributes",
        "getMobsSkills",
        "getMobLootInfo",
    ] {
        let line = ResponseBuilder::new(event_type)
            .body("chunkId", services.chunks.chunk_id())
            .success();
        services.upstream.send(line);
    }
}
