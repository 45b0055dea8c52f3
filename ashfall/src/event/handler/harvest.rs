//! Harvest flow: claim, cancel, completion, corpse queries, loot pickup.

use std::sync::Arc;

use serde_json::json;

use ashfall_protocol::wire;
use ashfall_world::harvest::CorpseLoot;

use crate::engine::harvest as engine;
use crate::event::handler::require_character;
use crate::event::{Event, EventPayload};
use crate::net::send;
use crate::services::GameServices;

const DEFAULT_CORPSE_QUERY_RADIUS: f32 = 1000.0;

pub fn handle_start(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::HarvestStart { corpse_uid } = event.payload else {
        return;
    };
    let Some(character_id) = require_character(services, event, "harvestStart") else {
        return;
    };

    match engine::start_harvest(services, character_id, corpse_uid) {
        Ok(session) => {
            send::send_success(
                services,
                event.client_id,
                "harvestStart",
                &event.timestamps,
                json!({
                    "type": "HARVEST_STARTED",
                    "corpseUID": corpse_uid,
                    "duration": session.duration_secs,
                }),
            );
        }
        Err(err) => {
            send::send_error(
                services,
                event.client_id,
                "harvestStart",
                &event.timestamps,
                engine::error_code(&err, false),
                &err.to_string(),
            );
        }
    }
}

pub fn handle_cancel(services: &Arc<GameServices>, event: &Event) {
    let Some(character_id) = require_character(services, event, "harvestCancel") else {
        return;
    };

    match engine::cancel_harvest(services, character_id, "player_cancelled") {
        Some(session) => {
            send::send_success(
                services,
                event.client_id,
                "harvestCancel",
                &event.timestamps,
                json!({"type": "HARVEST_CANCELLED", "corpseUID": session.corpse_uid}),
            );
        }
        None => {
            send::send_error(
                services,
                event.client_id,
                "harvestCancel",
                &event.timestamps,
                "HARVEST_FAILED",
                "no harvest in progress",
            );
        }
    }
}

/// Internal completion event from the progress ticker.
pub fn handle_complete(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::HarvestComplete {
        character_id,
        corpse_uid,
    } = event.payload
    else {
        return;
    };
    if let Err(err) = engine::complete_harvest(services, character_id, corpse_uid) {
        log::warn!("harvest completion for corpse {corpse_uid} failed: {err}");
        // Free the slot so the character is not wedged by a vanished corpse.
        services.harvest.cancel_session(character_id);
    }
}

pub fn handle_nearby_corpses(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::NearbyQuery { radius } = event.payload else {
        return;
    };
    let Some(character_id) = require_character(services, event, "getNearbyCorpses") else {
        return;
    };
    let Some(character) = services.characters.get(character_id) else {
        return;
    };

    let radius = if radius > 0.0 {
        radius
    } else {
        DEFAULT_CORPSE_QUERY_RADIUS
    };
    let corpses = services.harvest.nearby_corpses(character.position, radius);
    send::send_success(
        services,
        event.client_id,
        "getNearbyCorpses",
        &event.timestamps,
        json!({"corpses": wire::corpses(&corpses)}),
    );
}

pub fn handle_loot_pickup(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::LootPickup {
        corpse_uid,
        player_id,
        ref requested,
    } = event.payload
    else {
        return;
    };
    let Some(character_id) = require_character(services, event, "corpseLootPickup") else {
        return;
    };

    // The body echoes the requester's own id; a mismatch is a spoof attempt.
    if player_id != 0 && player_id != character_id {
        send::send_error(
            services,
            event.client_id,
            "corpseLootPickup",
            &event.timestamps,
            "SECURITY_VIOLATION",
            "loot pickup for another character",
        );
        return;
    }

    let rows: Vec<CorpseLoot> = requested
        .iter()
        .map(|r| CorpseLoot {
            item_id: r.item_id,
            quantity: r.quantity,
        })
        .collect();

    match engine::pickup_corpse_loot(services, character_id, corpse_uid, &rows) {
        Ok(taken) => {
            send::send_success(
                services,
                event.client_id,
                "corpseLootPickup",
                &event.timestamps,
                json!({
                    "type": "CORPSE_LOOT_PICKUP",
                    "corpseUID": corpse_uid,
                    "pickedUpItems": wire::corpse_loot(&taken.picked_up),
                    "remainingLoot": wire::corpse_loot(&taken.remaining),
                    "corpseHasLoot": !taken.remaining.is_empty(),
                }),
            );
        }
        Err(err) => {
            send::send_error(
                services,
                event.client_id,
                "corpseLootPickup",
                &event.timestamps,
                engine::error_code(&err, true),
                &err.to_string(),
            );
        }
    }
}

pub fn handle_loot_inspect(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::LootInspect {
        corpse_uid,
        player_id,
    } = event.payload
    else {
        return;
    };
    let Some(character_id) = require_character(services, event, "corpseLootInspect") else {
        return;
    };
    if player_id != 0 && player_id != character_id {
        send::send_error(
            services,
            event.client_id,
            "corpseLootInspect",
            &event.timestamps,
            "SECURITY_VIOLATION",
            "loot inspect for another character",
        );
        return;
    }

    let Some(corpse) = services.harvest.get_corpse(corpse_uid) else {
        send::send_error(
            services,
            event.client_id,
            "corpseLootInspect",
            &event.timestamps,
            "CORPSE_NOT_FOUND",
            "no such corpse",
        );
        return;
    };
    if !corpse.has_been_harvested {
        send::send_error(
            services,
            event.client_id,
            "corpseLootInspect",
            &event.timestamps,
            "CORPSE_NOT_HARVESTED",
            "corpse has not been harvested",
        );
        return;
    }
    if corpse.harvested_by_character_id != character_id {
        send::send_error(
            services,
            event.client_id,
            "corpseLootInspect",
            &event.timestamps,
            "NOT_YOUR_HARVEST",
            "corpse was harvested by another character",
        );
        return;
    }

    send::send_success(
        services,
        event.client_id,
        "corpseLootInspect",
        &event.timestamps,
        json!({
            "type": "CORPSE_LOOT_INSPECT",
            "corpseUID": corpse_uid,
            "availableLoot": wire::corpse_loot(&corpse.available_loot),
        }),
    );
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

    fn seeded() -> (
        Arc<GameServices>,
        tokio::sync::mpsc::UnboundedReceiver<String>,
    ) {
        let services = test_services();
        let (session, rx) = test_handle(1);
        services.clients.register(
            ClientInfo {
                client_id: 5,
                hash: "h".into(),
                character_id: 1,
            },
            session,
        );
        services.characters.insert(CharacterData {
            character_id: 1,
            client_id: 5,
            current_health: 100,
            max_health: 100,
            position: Position::default(),
            ..Default::default()
        });
        services
            .harvest
            .register_corpse(100, 7, Position::new(10.0, 0.0, 0.0, 0.0), 0.0);
        (services, rx)
    }

    #[test]
    fn spoofed_pickup_is_a_security_violation() {
        let (services, mut rx) = seeded();
        let event = Event::new(
            EventKind::CorpseLootPickup,
            5,
            EventPayload::LootPickup {
                corpse_uid: 100,
                player_id: 999,
                requested: vec![],
            },
        );
        handle_loot_pickup(&services, &event);
        assert!(rx.try_recv().unwrap().contains("SECURITY_VIOLATION"));
    }

    #[test]
    fn inspect_before_harvest_reports_not_harvested() {
        let (services, mut rx) = seeded();
        let event = Event::new(
            EventKind::CorpseLootInspect,
            5,
            EventPayload::LootInspect {
                corpse_uid: 100,
                player_id: 1,
            },
        );
        handle_loot_inspect(&services, &event);
        assert!(rx.try_recv().unwrap().contains("CORPSE_NOT_HARVESTED"));
    }

    #[test]
    fn start_then_cancel_round_trip() {
        let (services, mut rx) = seeded();
        let start = Event::new(
            EventKind::HarvestStartRequest,
            5,
            EventPayload::HarvestStart { corpse_uid: 100 },
        );
        handle_start(&services, &start);
        // Broadcast of the start goes out first (engine), then the response.
        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(first.contains("harvestStartBroadcast"));
        assert!(second.contains("HARVEST_STARTED"));

        let cancel = Event::new(
            EventKind::HarvestCancelled,
            5,
            EventPayload::HarvestCancel { corpse_uid: 100 },
        );
        handle_cancel(&services, &cancel);
        let third = rx.try_recv().unwrap();
        assert!(third.contains("harvestCancelBroadcast"));
        let fourth = rx.try_recv().unwrap();
        assert!(fourth.contains("HARVEST_CANCELLED"));
    }
}
