//! Ground loot and inventory surface.

use std::sync::Arc;

use serde_json::json;

use ashfall_protocol::{wire, ResponseBuilder};

use crate::event::handler::require_character;
use crate::event::{Event, EventPayload};
use crate::net::send;
use crate::services::GameServices;

const DEFAULT_ITEM_QUERY_RADIUS: f32 = 1000.0;

pub fn handle_pickup(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::ItemPickup { item_uid } = event.payload else {
        return;
    };
    let Some(character_id) = require_character(services, event, "pickupDroppedItem") else {
        return;
    };
    let Some(character) = services.characters.get(character_id) else {
        return;
    };

    match services.loot.take_for_pickup(item_uid, character.position) {
        Ok(item) => {
            if let Err(err) = services
                .inventory
                .add(character_id, item.item_id, item.quantity)
            {
                log::error!("inventory refused dropped item {item_uid}: {err}");
                services.loot.restore(item);
                send::send_error(
                    services,
                    event.client_id,
                    "pickupDroppedItem",
                    &event.timestamps,
                    "PICKUP_FAILED",
                    "inventory refused the item",
                );
                return;
            }
            send::send_success(
                services,
                event.client_id,
                "pickupDroppedItem",
                &event.timestamps,
                json!({
                    "itemUID": item_uid,
                    "itemId": item.item_id,
                    "quantity": item.quantity,
                }),
            );

            // Everyone else sees the drop disappear.
            let line = send::broadcast_line(
                "itemPickedUp",
                json!({"itemUID": item_uid, "characterId": character_id}),
            );
            send::broadcast(services, &line);
        }
        Err(err) => {
            send::send_error(
                services,
                event.client_id,
                "pickupDroppedItem",
                &event.timestamps,
                "PICKUP_FAILED",
                &err.to_string(),
            );
        }
    }
}

pub fn handle_nearby(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::NearbyQuery { radius } = event.payload else {
        return;
    };
    let Some(character_id) = require_character(services, event, "getNearbyItems") else {
        return;
    };
    let Some(character) = services.characters.get(character_id) else {
        return;
    };

    let radius = if radius > 0.0 {
        radius
    } else {
        DEFAULT_ITEM_QUERY_RADIUS
    };
    let items = services.loot.nearby(character.position, radius);
    send::send_success(
        services,
        event.client_id,
        "nearbyItems",
        &event.timestamps,
        json!({"items": wire::dropped_items(&items)}),
    );
}

pub fn handle_get_inventory(services: &Arc<GameServices>, event: &Event) {
    let Some(character_id) = require_character(services, event, "getPlayerInventory") else {
        return;
    };
    let entries = services.inventory.list(character_id);
    send::send_success(
        services,
        event.client_id,
        "getPlayerInventory",
        &event.timestamps,
        json!({
            "characterId": character_id,
            "items": wire::item_stacks(entries.iter().map(|e| (e.item_id, e.quantity))),
        }),
    );
}

/// Internal: fresh ground drops from a mob death.
pub fn handle_item_drop(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::Drops(ref drops) = event.payload else {
        return;
    };
    if drops.is_empty() {
        return;
    }
    let line = send::broadcast_line("itemDrop", json!({"items": wire::dropped_items(drops)}));
    send::broadcast(services, &line);
}

/// Internal: an inventory changed; push the new state to its owner.
pub fn handle_inventory_update(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::Inventory {
        character_id,
        ref entries,
    } = event.payload
    else {
        return;
    };
    let Some(character) = services.characters.get(character_id) else {
        return;
    };
    if character.client_id == 0 {
        return;
    }

    let line = ResponseBuilder::new("inventoryUpdate")
        .header("clientId", character.client_id)
        .body("characterId", character_id)
        .body(
            "items",
            wire::item_stacks(entries.iter().map(|e| (e.item_id, e.quantity))),
        )
        .success();
    send::send_line(services, character.client_id, line);
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
    use ashfall_registry::LootEntry;

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
        (services, rx)
    }

    #[test]
    fn pickup_moves_item_into_inventory() {
        let (services, mut rx) = seeded();
        let drops = services.loot.generate_loot_on_mob_death(
            9,
            Position::default(),
            &[LootEntry {
                item_id: 4,
                drop_chance: 1.0,
            }],
            0.0,
        );
        let uid = drops[0].uid;

        let event = Event::new(
            EventKind::ItemPickup,
            5,
            EventPayload::ItemPickup { item_uid: uid },
        );
        handle_pickup(&services, &event);

        assert_eq!(services.inventory.quantity(1, 4), 1);
        assert!(services.loot.is_empty());
        // Inventory hook queued a push event on the main queue.
        assert_eq!(
            services.main_queue.pop().unwrap().kind,
            EventKind::InventoryUpdate
        );
        let response = rx.try_recv().unwrap();
        assert!(response.contains("\"status\":\"success\""));
    }

    #[test]
    fn pickup_of_missing_item_fails_cleanly() {
        let (services, mut rx) = seeded();
        let event = Event::new(
            EventKind::ItemPickup,
            5,
            EventPayload::ItemPickup { item_uid: 404 },
        );
        handle_pickup(&services, &event);
        assert!(rx.try_recv().unwrap().contains("PICKUP_FAILED"));
    }

    #[test]
    fn inventory_query_lists_stacks() {
        let (services, mut rx) = seeded();
        services.inventory.add(1, 4, 3).unwrap();
        // Drain the hook event so the test only sees the response.
        services.main_queue.pop();

        let event = Event::new(EventKind::GetPlayerInventory, 5, EventPayload::Empty);
        handle_get_inventory(&services, &event);

        let line = rx.try_recv().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["body"]["items"][0]["itemId"], 4);
        assert_eq!(parsed["body"]["items"][0]["quantity"], 3);
    }
}
