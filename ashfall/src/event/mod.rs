pub mod dispatcher;
pub mod handler;
pub mod queue;

use num_derive::FromPrimitive;
use serde::Serialize;
use serde_json::Value;

use ashfall_core::math::Position;
use ashfall_inventory::InventoryEntry;
use ashfall_protocol::client::{RequestedLoot, TargetType};
use ashfall_protocol::RequestTimestamps;
use ashfall_world::loot::DroppedItem;
use ashfall_world::mob::MobInstance;

/// Every event the pipelines route. Client-originated kinds come out of the
/// dispatcher; upstream kinds out of the game-server reader; the rest are
/// internal, produced by engines and the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, FromPrimitive)]
pub enum EventKind {
    PingClient,
    JoinClient,
    JoinCharacter,
    MoveCharacter,
    DisconnectClient,
    GetSpawnZones,
    GetConnectedClients,
    PlayerAttack,
    InterruptCombatAction,
    HarvestStartRequest,
    HarvestCancelled,
    HarvestComplete,
    GetNearbyCorpses,
    CorpseLootPickup,
    CorpseLootInspect,
    ItemPickup,
    GetNearbyItems,
    GetPlayerInventory,
    // internal
    SpawnMobsInZone,
    MoveMobsInZone,
    ItemDrop,
    InventoryUpdate,
    // upstream replication
    SetChunkData,
    SetCharacterData,
    SetCharacterAttributes,
    SetAllSpawnZones,
    SetAllMobsList,
    SetAllMobsAttributes,
    SetAllMobsSkills,
    SetAllItemsList,
    SetMobLootInfo,
    SetExpLevelTable,
}

/// Event payloads are plain data. Serialize is derived on purpose: anything
/// that cannot be serialized (sockets, handles, guards) cannot end up in an
/// event, which is the property the whole pipeline leans on.
#[derive(Debug, Clone, Serialize)]
pub enum EventPayload {
    Empty,
    Join {
        character_id: i32,
        hash: String,
    },
    Move {
        character_id: i32,
        position: Position,
    },
    Attack {
        skill_slug: String,
        target_id: i64,
        target_type: TargetType,
    },
    Interrupt {
        reason: String,
    },
    HarvestStart {
        corpse_uid: i64,
    },
    HarvestCancel {
        corpse_uid: i64,
    },
    HarvestComplete {
        character_id: i32,
        corpse_uid: i64,
    },
    LootPickup {
        corpse_uid: i64,
        player_id: i32,
        requested: Vec<RequestedLoot>,
    },
    LootInspect {
        corpse_uid: i64,
        player_id: i32,
    },
    ItemPickup {
        item_uid: i64,
    },
    NearbyQuery {
        radius: f32,
    },
    Mobs(Vec<MobInstance>),
    Drops(Vec<DroppedItem>),
    Inventory {
        character_id: i32,
        entries: Vec<InventoryEntry>,
    },
    /// Raw replication body; the replication handler owns the parse.
    Json(Value),
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub client_id: i32,
    pub payload: EventPayload,
    #[serde(skip)]
    pub timestamps: RequestTimestamps,
}

impl Event {
    pub fn new(kind: EventKind, client_id: i32, payload: EventPayload) -> Self {
        Self {
            kind,
            client_id,
            payload,
            timestamps: RequestTimestamps::default(),
        }
    }

    pub fn with_timestamps(mut self, timestamps: RequestTimestamps) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Kind/payload agreement. The queue refuses events whose payload does
    /// not belong to their kind instead of letting a handler discover the
    /// mismatch mid-flight.
    pub fn payload_matches_kind(&self) -> bool {
        use EventKind as K;
        use EventPayload as P;
        match self.kind {
            K::PingClient
            | K::DisconnectClient
            | K::GetSpawnZones
            | K::GetConnectedClients
            | K::GetPlayerInventory => matches!(self.payload, P::Empty),
            K::JoinClient | K::JoinCharacter => matches!(self.payload, P::Join { .. }),
            K::MoveCharacter => matches!(self.payload, P::Move { .. }),
            K::PlayerAttack => matches!(self.payload, P::Attack { .. }),
            K::InterruptCombatAction => matches!(self.payload, P::Interrupt { .. }),
            K::HarvestStartRequest => matches!(self.payload, P::HarvestStart { .. }),
            K::HarvestCancelled => matches!(self.payload, P::HarvestCancel { .. }),
            K::HarvestComplete => matches!(self.payload, P::HarvestComplete { .. }),
            K::CorpseLootPickup => matches!(self.payload, P::LootPickup { .. }),
            K::CorpseLootInspect => matches!(self.payload, P::LootInspect { .. }),
            K::ItemPickup => matches!(self.payload, P::ItemPickup { .. }),
            K::GetNearbyItems | K::GetNearbyCorpses => {
                matches!(self.payload, P::NearbyQuery { .. })
            }
            K::SpawnMobsInZone | K::MoveMobsInZone => matches!(self.payload, P::Mobs(_)),
            K::ItemDrop => matches!(self.payload, P::Drops(_)),
            K::InventoryUpdate => matches!(self.payload, P::Inventory { .. }),
            K::SetChunkData
            | K::SetCharacterData
            | K::SetCharacterAttributes
            | K::SetAllSpawnZones
            | K::SetAllMobsList
            | K::SetAllMobsAttributes
            | K::SetAllMobsSkills
            | K::SetAllItemsList
            | K::SetMobLootInfo
            | K::SetExpLevelTable => matches!(self.payload, P::Json(_)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kind_agreement() {
        let ok = Event::new(EventKind::PingClient, 7, EventPayload::Empty);
        assert!(ok.payload_matches_kind());

        let bad = Event::new(EventKind::PlayerAttack, 7, EventPayload::Empty);
        assert!(!bad.payload_matches_kind());
    }

    #[test]
    fn payloads_are_serializable_data() {
        // Serialization succeeding means no transport handle can hide in a
        // payload; this is the compile-and-runtime guard for that property.
        let event = Event::new(
            EventKind::MoveCharacter,
            5,
            EventPayload::Move {
                character_id: 42,
                position: Position::new(10.0, 0.0, 0.0, 0.0),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "MoveCharacter");
    }

    #[test]
    fn kind_discriminants_are_dense() {
        use num_traits::FromPrimitive;
        assert_eq!(EventKind::from_u32(0), Some(EventKind::PingClient));
        assert!(EventKind::from_u32(500).is_none());
    }
}
