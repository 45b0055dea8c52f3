//! Per-client read loop: framing, the ping fast path, identity resolution,
//! and the single-shot disconnect path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use ashfall_protocol::client::event_type as ev;
use ashfall_protocol::envelope::parse_ping_header;
use ashfall_protocol::framing::{
    FrameAccumulator, MAX_FRAMES_PER_READ, MAX_FRAME_BYTES, READ_CHUNK_BYTES,
};
use ashfall_protocol::{RequestEnvelope, RequestTimestamps};

use crate::event::dispatcher::{dispatch_client_event, DispatchOutcome};
use crate::event::{Event, EventKind, EventPayload};
use crate::net::{send, SessionHandle};
use crate::registry::ClientInfo;
use crate::services::GameServices;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Unauthenticated ping drops are logged once per this many occurrences.
const PING_DROP_LOG_EVERY: u64 = 100;

/// Drive one client connection to completion. Returns when the peer
/// disconnects, errs, or breaches a session limit.
pub async fn run_session(services: Arc<GameServices>, stream: TcpStream) {
    let peer = match stream.peer_addr() {
        Ok(peer) => peer,
        Err(err) => {
            log::error!("dropping connection without peer address: {err}");
            return;
        }
    };
    let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
    log::info!("client connected from {peer} (session {session_id})");

    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = Arc::new(SessionHandle::new(session_id, peer, tx));

    // Writer task: drains queued lines onto the socket. The response
    // builders finished every line; this task only moves bytes.
    let writer_handle = handle.clone();
    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                writer_handle.close();
                break;
            }
        }
    });

    let mut accumulator = FrameAccumulator::new(MAX_FRAME_BYTES);
    let mut scratch = vec![0u8; READ_CHUNK_BYTES];
    let mut dropped_pings: u64 = 0;

    'read: loop {
        let n = match read_half.read(&mut scratch).await {
            Ok(0) => {
                log::info!("client {peer} disconnected");
                break 'read;
            }
            Ok(n) => n,
            Err(err) => {
                log::error!("read error from {peer}: {err}");
                break 'read;
            }
        };

        if accumulator.push(&scratch[..n]).is_err() {
            log::error!("session {session_id} exceeded the buffer limit, disconnecting");
            break 'read;
        }

        // Drain complete frames, yielding between bursts so one chatty
        // client cannot starve the others on this executor.
        loop {
            let mut processed = 0usize;
            while processed < MAX_FRAMES_PER_READ {
                let Some(frame) = accumulator.next_frame() else {
                    break;
                };
                if !handle.is_open() {
                    break 'read;
                }
                process_frame(&services, &handle, &frame, &mut dropped_pings);
                processed += 1;
            }
            if processed < MAX_FRAMES_PER_READ {
                break;
            }
            tokio::task::yield_now().await;
        }

        if accumulator.drop_stuck_partial() {
            log::error!("session {session_id} buffered a large frameless backlog, buffer dropped");
        }
        accumulator.compact();
    }

    finish_session(&services, &handle);
    writer.abort();
}

/// Route one complete frame. Pings take the header-only fast path straight
/// onto the ping queue; everything else gets the full parse, identity
/// resolution, and the dispatcher.
fn process_frame(
    services: &Arc<GameServices>,
    handle: &Arc<SessionHandle>,
    frame: &str,
    dropped_pings: &mut u64,
) {
    // Cheap pre-filter; the header parse below confirms.
    if frame.contains("pingClient") {
        if let Some(header) = parse_ping_header(frame) {
            if header.event_type == ev::PING_CLIENT {
                let client_id = if header.client_id != 0 {
                    header.client_id
                } else {
                    services.clients.client_id_by_session(handle.session_id())
                };
                if client_id == 0 {
                    *dropped_pings += 1;
                    if *dropped_pings % PING_DROP_LOG_EVERY == 1 {
                        log::debug!(
                            "dropping ping from unauthenticated session {} ({} so far)",
                            handle.session_id(),
                            dropped_pings
                        );
                    }
                    return;
                }
                let event = Event::new(EventKind::PingClient, client_id, EventPayload::Empty)
                    .with_timestamps(RequestTimestamps::capture(&header));
                services.ping_queue.push(event);
                return;
            }
        }
    }

    let envelope = match RequestEnvelope::parse(frame) {
        Ok(envelope) => envelope,
        Err(err) => {
            log::error!("malformed frame from session {}: {err}", handle.session_id());
            return;
        }
    };

    // Identity: the header claim wins, the session binding backs it up.
    let client_id = if envelope.header.client_id != 0 {
        envelope.header.client_id
    } else {
        services.clients.client_id_by_session(handle.session_id())
    };

    // First identifying message binds this socket to the client id.
    if envelope.header.event_type == ev::JOIN_GAME_CLIENT && client_id != 0 {
        let existing_character = services
            .clients
            .get(client_id)
            .map(|c| c.character_id)
            .unwrap_or(0);
        services.clients.register(
            ClientInfo {
                client_id,
                hash: envelope.header.hash.clone(),
                character_id: existing_character,
            },
            handle.clone(),
        );
    }

    let character_id = services
        .clients
        .get(client_id)
        .map(|c| c.character_id)
        .unwrap_or(0);

    match dispatch_client_event(services, &envelope, client_id, character_id, handle) {
        DispatchOutcome::Enqueued(_) | DispatchOutcome::SessionClosed => {}
        DispatchOutcome::UnknownEventType(event_type) => {
            log::warn!("unknown event type {event_type:?} from client {client_id}");
        }
        DispatchOutcome::Malformed(err) => {
            log::error!("malformed body from client {client_id}: {err}");
            send::send_error(
                services,
                client_id,
                &envelope.header.event_type,
                &RequestTimestamps::capture(&envelope.header),
                "MALFORMED_BODY",
                &err.to_string(),
            );
        }
    }
}

/// Close-and-cleanup, exactly once per session: close the handle, unbind
/// the registry row, and emit a single disconnect event when a client was
/// actually bound to this socket.
fn finish_session(services: &Arc<GameServices>, handle: &Arc<SessionHandle>) {
    handle.close();

    let client_id = services
        .clients
        .client_id_by_session(handle.session_id());
    services.clients.remove_by_session(handle.session_id());

    if client_id > 0 {
        services.main_queue.push(Event::new(
            EventKind::DisconnectClient,
            client_id,
            EventPayload::Empty,
        ));
        log::info!("disconnect event queued for client {client_id}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::test_handle;
    use crate::services::test_services;

    #[test]
    fn authenticated_ping_goes_to_the_ping_queue() {
        let services = test_services();
        let (handle, _rx) = test_handle(7);
        services.clients.register(
            ClientInfo {
                client_id: 5,
                hash: "h".into(),
                character_id: 0,
            },
            handle.clone(),
        );

        let mut dropped = 0;
        process_frame(
            &services,
            &handle,
            r#"{"header":{"eventType":"pingClient","clientId":5,"hash":"h","clientSendMs":100}}"#,
            &mut dropped,
        );
        assert_eq!(services.ping_queue.size(), 1);
        assert_eq!(services.main_queue.size(), 0);

        let event = services.ping_queue.pop().unwrap();
        assert_eq!(event.kind, EventKind::PingClient);
        assert_eq!(event.timestamps.client_send_ms_echo, 100);
    }

    #[test]
    fn unauthenticated_ping_is_dropped_silently() {
        let services = test_services();
        let (handle, _rx) = test_handle(7);

        let mut dropped = 0;
        process_frame(
            &services,
            &handle,
            r#"{"header":{"eventType":"pingClient"}}"#,
            &mut dropped,
        );
        assert_eq!(dropped, 1);
        assert_eq!(services.ping_queue.size(), 0);
    }

    #[test]
    fn ping_resolves_client_by_session_binding() {
        let services = test_services();
        let (handle, _rx) = test_handle(7);
        services.clients.register(
            ClientInfo {
                client_id: 5,
                hash: "h".into(),
                character_id: 0,
            },
            handle.clone(),
        );

        let mut dropped = 0;
        process_frame(
            &services,
            &handle,
            r#"{"header":{"eventType":"pingClient"}}"#,
            &mut dropped,
        );
        let event = services.ping_queue.pop().unwrap();
        assert_eq!(event.client_id, 5);
    }

    #[test]
    fn join_frame_binds_the_session() {
        let services = test_services();
        let (handle, _rx) = test_handle(7);

        let mut dropped = 0;
        process_frame(
            &services,
            &handle,
            r#"{"header":{"eventType":"joinGameClient","clientId":5,"hash":"abc"},"body":{"id":42}}"#,
            &mut dropped,
        );

        assert_eq!(services.clients.client_id_by_session(7), 5);
        assert_eq!(services.clients.get(5).unwrap().hash, "abc");
        assert_eq!(services.main_queue.size(), 1);
    }

    #[test]
    fn malformed_frame_keeps_the_session() {
        let services = test_services();
        let (handle, _rx) = test_handle(7);

        let mut dropped = 0;
        process_frame(&services, &handle, "{{{{ not json", &mut dropped);
        assert!(handle.is_open());
        assert_eq!(services.main_queue.size(), 0);
    }

    #[test]
    fn finish_session_emits_one_disconnect() {
        let services = test_services();
        let (handle, _rx) = test_handle(7);
        services.clients.register(
            ClientInfo {
                client_id: 5,
                hash: "h".into(),
                character_id: 0,
            },
            handle.clone(),
        );

        finish_session(&services, &handle);
        finish_session(&services, &handle);

        assert_eq!(services.main_queue.size(), 1);
        let event = services.main_queue.pop().unwrap();
        assert_eq!(event.kind, EventKind::DisconnectClient);
        assert_eq!(event.client_id, 5);
        assert!(!handle.is_open());
    }
}
