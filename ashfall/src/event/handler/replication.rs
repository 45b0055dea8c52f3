//! Consumers for the game server's state-replication stream. Each message
//! is idempotent: re-delivery after a reconnect overwrites in place.

use std::sync::Arc;

use crate::engine::experience;
use crate::event::handler::client;
use crate::event::{Event, EventKind, EventPayload};
use crate::services::GameServices;

use ashfall_protocol::upstream;

pub fn handle(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::Json(ref body) = event.payload else {
        return;
    };

    match event.kind {
        EventKind::SetChunkData => {
            services.chunks.set_assigned(upstream::parse_chunk_info(body));
        }
        EventKind::SetCharacterData => {
            let mut character = upstream::parse_character_data(body);
            if character.character_id == 0 {
                log::warn!("character replication without id dropped");
                return;
            }

            // Bind to the waiting client, if any; replication may also
            // refresh a character that is already resident.
            let client_id = if character.client_id != 0 {
                character.client_id
            } else {
                event.client_id
            };
            character.client_id = client_id;
            let character_id = character.character_id;
            services.characters.insert(character);

            if client_id != 0 {
                services.clients.set_character(client_id, character_id);
                client::complete_character_join(services, client_id, character_id);
            }
            log::info!("character {character_id} replicated (client {client_id})");
        }
        EventKind::SetCharacterAttributes => {
            let (character_id, attributes) = upstream::parse_character_attributes(body);
            if character_id == 0 {
                return;
            }
            let updated = services
                .characters
                .mutate(character_id, |c| c.attributes = attributes);
            if updated {
                experience::broadcast_stats(services, character_id);
            }
        }
        EventKind::SetAllSpawnZones => {
            let zones = upstream::parse_spawn_zones(body);
            log::info!("replicated {} spawn zones", zones.len());
            services.zones.load_zones(zones);
        }
        EventKind::SetAllMobsList => {
            let templates = upstream::parse_mob_templates(body);
            log::info!("replicated {} mob templates", templates.len());
            services.mob_templates.load_templates(templates);
        }
        EventKind::SetAllMobsAttributes => {
            services
                .mob_templates
                .merge_attributes(upstream::parse_mob_attributes(body));
        }
        EventKind::SetAllMobsSkills => {
            services
                .mob_templates
                .merge_skills(upstream::parse_mob_skills(body));
        }
        EventKind::SetAllItemsList => {
            let items = upstream::parse_item_templates(body);
            log::info!("replicated {} item templates", items.len());
            services.items.load_items(items);
        }
        EventKind::SetMobLootInfo => {
            for (mob_id, entries) in upstream::parse_mob_loot(body) {
                services.items.set_mob_loot(mob_id, entries);
            }
        }
        EventKind::SetExpLevelTable => {
            let rows = upstream::parse_exp_table(body);
            log::info!("replicated experience table with {} rows", rows.len());
            services.exp_table.load(rows);
        }
        other => {
            log::error!("replication handler got non-replication event {other:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::test_handle;
    use crate::registry::ClientInfo;
    use crate::services::test_services;
    use serde_json::json;

    fn replication_event(kind: EventKind, body: serde_json::Value) -> Event {
        Event::new(kind, 0, EventPayload::Json(body))
    }

    #[test]
    fn character_data_completes_a_waiting_join() {
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

        let event = replication_event(
            EventKind::SetCharacterData,
            json!({
                "id": 42,
                "clientId": 5,
                "level": 3,
                "currentHealth": 80,
                "maxHealth": 100,
                "position": {"posX": 1.0, "posY": 2.0, "posZ": 200.0, "rotZ": 0.0},
            }),
        );
        handle(&services, &event);

        let character = services.characters.get(42).unwrap();
        assert_eq!(character.client_id, 5);
        assert_eq!(character.level, 3);
        assert_eq!(services.clients.get(5).unwrap().character_id, 42);

        let line = rx.try_recv().unwrap();
        assert!(line.contains("joinGameCharacter"));
    }

    #[test]
    fn exp_table_replication_switches_off_fallback() {
        let services = test_services();
        let event = replication_event(
            EventKind::SetExpLevelTable,
            json!({"experienceTable": [
                {"level": 1, "experiencePoints": 0},
                {"level": 2, "experiencePoints": 50},
            ]}),
        );
        handle(&services, &event);
        assert!(services.exp_table.is_loaded());
        assert_eq!(services.exp_table.level_from_exp(60), 2);
    }

    #[test]
    fn zone_and_template_replication_enable_spawning() {
        let services = test_services();
        handle(
            &services,
            &replication_event(
                EventKind::SetAllMobsList,
                json!({"mobs": [{"id": 7, "name": "ash wolf", "level": 4, "maxHealth": 120}]}),
            ),
        );
        handle(
            &services,
            &replication_event(
                EventKind::SetAllSpawnZones,
                json!({"spawnZones": [{
                    "id": 1, "name": "flats",
                    "posX": 0.0, "posY": 0.0, "posZ": 0.0,
                    "sizeX": 400.0, "sizeY": 400.0, "sizeZ": 100.0,
                    "spawnMobId": 7, "spawnCount": 2, "respawnTime": 15.0,
                }]}),
            ),
        );

        let spawned = services.zones.spawn_mobs_in_zone(
            1,
            &services.mob_templates,
            &services.mobs,
            &services.mob_uids,
        );
        assert_eq!(spawned.len(), 2);
    }
}
