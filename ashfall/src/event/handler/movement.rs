//! Character movement and zone/mob position fan-out.

use std::sync::Arc;

use serde_json::json;

use ashfall_protocol::wire;

use crate::engine::harvest as harvest_engine;
use crate::engine::skill::{ActionState, Caster, InterruptReason};
use crate::event::{Event, EventPayload};
use crate::net::send;
use crate::services::GameServices;

pub fn handle_move_character(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::Move { character_id, position } = event.payload else {
        return;
    };

    // Ownership: a client can only move the character bound to it.
    let owned = services
        .clients
        .get(event.client_id)
        .map(|c| c.character_id)
        .unwrap_or(0);
    if owned == 0 || owned != character_id {
        send::send_error(
            services,
            event.client_id,
            "moveCharacter",
            &event.timestamps,
            "SECURITY_VIOLATION",
            "client does not control this character",
        );
        return;
    }

    if !services.characters.update_position(character_id, position) {
        send::send_error(
            services,
            event.client_id,
            "moveCharacter",
            &event.timestamps,
            "CHARACTER_NOT_FOUND",
            "character is not resident in this chunk",
        );
        return;
    }

    // Moving breaks stand-still activities.
    harvest_engine::check_movement_cancel(services, character_id, position);
    let caster = Caster::Player(character_id);
    if services
        .skills
        .ongoing_action(caster)
        .is_some_and(|a| a.state == ActionState::Casting)
    {
        services
            .skills
            .interrupt(services, caster, InterruptReason::Movement);
    }

    send::send_success(
        services,
        event.client_id,
        "moveCharacter",
        &event.timestamps,
        json!({"id": character_id, "position": wire::position(&position)}),
    );

    let line = send::broadcast_line(
        "moveCharacter",
        json!({"id": character_id, "position": wire::position(&position)}),
    );
    send::broadcast(services, &line);
}

pub fn handle_get_spawn_zones(services: &Arc<GameServices>, event: &Event) {
    let zones = services.zones.all();
    send::send_success(
        services,
        event.client_id,
        "getSpawnZones",
        &event.timestamps,
        json!({"spawnZones": wire::spawn_zones(&zones)}),
    );
}

/// Fan out freshly spawned mobs; the scheduler produced the payload.
pub fn handle_spawn_broadcast(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::Mobs(ref mobs) = event.payload else {
        return;
    };
    if mobs.is_empty() {
        return;
    }
    let line = send::broadcast_line(
        "spawnMobsInZone",
        json!({"mobs": wire::mob_instances(mobs)}),
    );
    send::broadcast(services, &line);
}

/// Fan out mob movement updates from the zone tick.
pub fn handle_move_broadcast(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::Mobs(ref mobs) = event.payload else {
        return;
    };
    if mobs.is_empty() {
        return;
    }
    let line = send::broadcast_line(
        "moveMobsInZone",
        json!({"mobs": wire::mob_instances(mobs)}),
    );
    send::broadcast(services, &line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::net::test_handle;
    use crate::registry::ClientInfo;
    use crate::services::test_services;
    use ashfall_core::character::CharacterData;
    use ashfall_core::math::Position;

    #[test]
    fn move_updates_registry_and_broadcasts() {
        let services = test_services();
        let (session, mut rx) = test_handle(1);
        services.clients.register(
            ClientInfo {
                client_id: 5,
                hash: "h".into(),
                character_id: 42,
            },
            session,
        );
        services.characters.insert(CharacterData {
            character_id: 42,
            client_id: 5,
            current_health: 100,
            max_health: 100,
            ..Default::default()
        });

        let event = Event::new(
            EventKind::MoveCharacter,
            5,
            EventPayload::Move {
                character_id: 42,
                position: Position::new(10.0, 0.0, 0.0, 0.0),
            },
        );
        handle_move_character(&services, &event);

        let stored = services.characters.get(42).unwrap();
        assert_eq!(stored.position.x, 10.0);

        let response = rx.try_recv().unwrap();
        assert!(response.contains("\"status\":\"success\""));
        let broadcast = rx.try_recv().unwrap();
        assert!(broadcast.contains("moveCharacter"));
    }

    #[test]
    fn moving_someone_elses_character_is_rejected() {
        let services = test_services();
        let (session, mut rx) = test_handle(1);
        services.clients.register(
            ClientInfo {
                client_id: 5,
                hash: "h".into(),
                character_id: 42,
            },
            session,
        );

        let event = Event::new(
            EventKind::MoveCharacter,
            5,
            EventPayload::Move {
                character_id: 99,
                position: Position::default(),
            },
        );
        handle_move_character(&services, &event);

        let response = rx.try_recv().unwrap();
        assert!(response.contains("SECURITY_VIOLATION"));
    }
}
