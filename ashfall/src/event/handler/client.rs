//! Connection lifecycle: joins, disconnects, pings, roster queries.

use std::sync::Arc;

use serde_json::json;

use ashfall_protocol::{wire, ResponseBuilder};

use crate::engine::harvest as harvest_engine;
use crate::engine::skill::{Caster, InterruptReason};
use crate::event::{Event, EventPayload};
use crate::net::send;
use crate::services::GameServices;

/// Pong with the full lag-compensation echo. Runs on the dedicated ping
/// loop, not the worker pool.
pub fn handle_ping(services: &Arc<GameServices>, event: &Event) {
    let line = ResponseBuilder::new("pingClient")
        .header("clientId", event.client_id)
        .timestamps(&event.timestamps)
        .body("type", "PONG")
        .success();
    send::send_line(services, event.client_id, line);
}

/// A client identified itself. The session layer already bound the socket
/// in the client registry; from here the character data is requested from
/// upstream and the client is acknowledged.
pub fn handle_join_client(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::Join { character_id, ref hash } = event.payload else {
        return;
    };
    log::info!(
        "client {} joined (hash {}, character {character_id})",
        event.client_id,
        if hash.is_empty() { "<none>" } else { hash.as_str() }
    );

    if character_id != 0 {
        services.clients.set_character(event.client_id, character_id);
        request_character_data(services, event.client_id, hash, character_id);
    }

    send::send_success(
        services,
        event.client_id,
        "joinGameClient",
        &event.timestamps,
        json!({
            "clientId": event.client_id,
            "characterId": character_id,
        }),
    );
}

/// A client asked to take control of a character. If the character is
/// already replicated the join completes here; otherwise the upstream
/// request is (re)issued and the `setCharacterData` handler finishes it.
pub fn handle_join_character(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::Join { character_id, ref hash } = event.payload else {
        return;
    };
    if character_id == 0 {
        send::send_error(
            services,
            event.client_id,
            "joinGameCharacter",
            &event.timestamps,
            "NO_CHARACTER",
            "join carried no character id",
        );
        return;
    }

    services.clients.set_character(event.client_id, character_id);

    match services.characters.get(character_id) {
        Some(mut character) => {
            character.client_id = event.client_id;
            services.characters.insert(character.clone());
            announce_character(services, event.client_id, &character);
            send::send_success(
                services,
                event.client_id,
                "joinGameCharacter",
                &event.timestamps,
                json!({"character": wire::character(&character)}),
            );
        }
        None => {
            request_character_data(services, event.client_id, hash, character_id);
        }
    }
}

/// Post-replication join completion, called by the replication handler
/// once `setCharacterData` lands for a waiting client.
pub fn complete_character_join(services: &GameServices, client_id: i32, character_id: i32) {
    let Some(character) = services.characters.get(character_id) else {
        return;
    };
    let line = ResponseBuilder::new("joinGameCharacter")
        .header("clientId", client_id)
        .body("character", wire::character(&character))
        .success();
    send::send_line(services, client_id, line);
    announce_character(services, client_id, &character);
}

fn announce_character(
    services: &GameServices,
    client_id: i32,
    character: &ashfall_core::character::CharacterData,
) {
    // The owner gets their skill sheet, everyone else gets the arrival.
    let skills_line = ResponseBuilder::new("initializePlayerSkills")
        .header("clientId", client_id)
        .body("characterId", character.character_id)
        .body("skills", wire::skills(&character.skills))
        .success();
    send::send_line(services, client_id, skills_line);

    let joined = send::broadcast_line(
        "joinGameCharacter",
        json!({"character": wire::character(character)}),
    );
    send::broadcast_except(services, client_id, &joined);
}

/// Full teardown for one client. Safe to run twice: every step tolerates
/// the state already being gone.
pub fn handle_disconnect(services: &Arc<GameServices>, event: &Event) {
    let client_id = event.client_id;
    log::info!("client {client_id} disconnected");

    let character_id = services
        .clients
        .get(client_id)
        .map(|c| c.character_id)
        .filter(|id| *id != 0)
        .or_else(|| {
            services
                .characters
                .list()
                .into_iter()
                .find(|c| c.client_id == client_id)
                .map(|c| c.character_id)
        });

    if let Some(character_id) = character_id {
        harvest_engine::cancel_harvest(services, character_id, "disconnect");
        services
            .skills
            .interrupt(services, Caster::Player(character_id), InterruptReason::PlayerCancelled);
        services.skills.forget_caster(Caster::Player(character_id));
        services.characters.remove(character_id);

        let line = send::broadcast_line(
            "disconnectClient",
            json!({"clientId": client_id, "characterId": character_id}),
        );
        send::broadcast(services, &line);
    }

    services.clients.remove(client_id);

    // The authoritative server keeps its own session table in sync.
    let upstream_line = ResponseBuilder::new("disconnectClient")
        .header("clientId", client_id)
        .success();
    services.upstream.send(upstream_line);
}

pub fn handle_get_connected(services: &Arc<GameServices>, event: &Event) {
    let characters = services.characters.list();
    let body = json!({
        "characters": characters.iter().map(wire::character).collect::<Vec<_>>(),
        "count": characters.len(),
    });
    send::send_success(
        services,
        event.client_id,
        "getConnectedCharacters",
        &event.timestamps,
        body,
    );
}

fn request_character_data(services: &GameServices, client_id: i32, hash: &str, character_id: i32) {
    let line = ResponseBuilder::new("getCharacterData")
        .header("clientId", client_id)
        .header("hash", hash)
        .body("characterId", character_id)
        .success();
    if !services.upstream.send(line) {
        log::error!("character data request for {character_id} could not reach the game server");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::net::test_handle;
    use crate::registry::ClientInfo;
    use crate::services::test_services;
    use ashfall_core::character::CharacterData;

    fn joined_services() -> (
        Arc<GameServices>,
        tokio::sync::mpsc::UnboundedReceiver<String>,
    ) {
        let services = test_services();
        let (session, rx) = test_handle(1);
        services.clients.register(
            ClientInfo {
                client_id: 5,
                hash: "h".into(),
                character_id: 0,
            },
            session,
        );
        (services, rx)
    }

    #[test]
    fn ping_response_echoes_timestamps() {
        let (services, mut rx) = joined_services();
        let event = Event::new(EventKind::PingClient, 5, EventPayload::Empty).with_timestamps(
            ashfall_protocol::RequestTimestamps {
                server_recv_ms: 150,
                client_send_ms_echo: 100,
                request_id: String::new(),
            },
        );
        handle_ping(&services, &event);

        let line = rx.try_recv().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["header"]["status"], "success");
        assert_eq!(parsed["header"]["clientSendMsEcho"], 100);
        assert!(parsed["header"]["serverRecvMs"].as_i64().unwrap() >= 100);
        assert!(
            parsed["header"]["serverSendMs"].as_i64().unwrap()
                >= parsed["header"]["serverRecvMs"].as_i64().unwrap() - 150
        );
    }

    #[test]
    fn join_character_with_replicated_data_completes_inline() {
        let (services, mut rx) = joined_services();
        services.characters.insert(CharacterData {
            character_id: 42,
            name: "Vex".into(),
            current_health: 100,
            max_health: 100,
            ..Default::default()
        });

        let event = Event::new(
            EventKind::JoinCharacter,
            5,
            EventPayload::Join {
                character_id: 42,
                hash: "h".into(),
            },
        );
        handle_join_character(&services, &event);

        assert_eq!(services.clients.get(5).unwrap().character_id, 42);
        assert_eq!(services.characters.get(42).unwrap().client_id, 5);

        // Owner receives the skill sheet then the join response.
        let first = rx.try_recv().unwrap();
        assert!(first.contains("initializePlayerSkills"));
        let second = rx.try_recv().unwrap();
        assert!(second.contains("joinGameCharacter"));
    }

    #[test]
    fn disconnect_twice_leaves_registries_clean() {
        let (services, _rx) = joined_services();
        services.clients.set_character(5, 42);
        services.characters.insert(CharacterData {
            character_id: 42,
            client_id: 5,
            ..Default::default()
        });

        let event = Event::new(EventKind::DisconnectClient, 5, EventPayload::Empty);
        handle_disconnect(&services, &event);
        handle_disconnect(&services, &event);

        assert!(services.clients.get(5).is_none());
        assert!(services.characters.get(42).is_none());
        assert!(services.clients.is_empty());
    }
}
