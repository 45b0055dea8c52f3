pub mod client;
pub mod combat;
pub mod harvest;
pub mod item;
pub mod movement;
pub mod replication;

use std::sync::Arc;

use crate::services::GameServices;

use super::{Event, EventKind};

/// Single entry point for the worker pool: route one event to its handler.
/// Handlers answer application failures with error packets; anything they
/// panic on is caught at the worker boundary and logged. A bad event never
/// takes a worker down.
pub fn dispatch(services: &Arc<GameServices>, event: Event) {
    use EventKind as K;
    match event.kind {
        K::PingClient => client::handle_ping(services, &event),
        K::JoinClient => client::handle_join_client(services, &event),
        K::JoinCharacter => client::handle_join_character(services, &event),
        K::DisconnectClient => client::handle_disconnect(services, &event),
        K::GetConnectedClients => client::handle_get_connected(services, &event),
        K::MoveCharacter => movement::handle_move_character(services, &event),
        K::GetSpawnZones => movement::handle_get_spawn_zones(services, &event),
        K::SpawnMobsInZone => movement::handle_spawn_broadcast(services, &event),
        K::MoveMobsInZone => movement::handle_move_broadcast(services, &event),
        K::PlayerAttack => combat::handle_player_attack(services, &event),
        K::InterruptCombatAction => combat::handle_interrupt(services, &event),
        K::HarvestStartRequest => harvest::handle_start(services, &event),
        K::HarvestCancelled => harvest::handle_cancel(services, &event),
        K::HarvestComplete => harvest::handle_complete(services, &event),
        K::GetNearbyCorpses => harvest::handle_nearby_corpses(services, &event),
        K::CorpseLootPickup => harvest::handle_loot_pickup(services, &event),
        K::CorpseLootInspect => harvest::handle_loot_inspect(services, &event),
        K::ItemPickup => item::handle_pickup(services, &event),
        K::GetNearbyItems => item::handle_nearby(services, &event),
        K::GetPlayerInventory => item::handle_get_inventory(services, &event),
        K::ItemDrop => item::handle_item_drop(services, &event),
        K::InventoryUpdate => item::handle_inventory_update(services, &event),
        K::SetChunkData
        | K::SetCharacterData
        | K::SetCharacterAttributes
        | K::SetAllSpawnZones
        | K::SetAllMobsList
        | K::SetAllMobsAttributes
        | K::SetAllMobsSkills
        | K::SetAllItemsList
        | K::SetMobLootInfo
        | K::SetExpLevelTable => replication::handle(services, &event),
    }
}

/// Resolve the character a client event acts for; answers the error packet
/// itself when the client has not joined a character yet.
pub(crate) fn require_character(
    services: &GameServices,
    event: &Event,
    event_type: &str,
) -> Option<i32> {
    let character_id = services
        .clients
        .get(event.client_id)
        .map(|c| c.character_id)
        .unwrap_or(0);
    if character_id == 0 {
        crate::net::send::send_error(
            services,
            event.client_id,
            event_type,
            &event.timestamps,
            "NO_CHARACTER",
            "no character joined on this connection",
        );
        return None;
    }
    Some(character_id)
}
