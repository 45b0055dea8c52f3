use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::ProtocolError;

/// Recognized client `header.eventType` strings.
pub mod event_type {
    pub const JOIN_GAME_CLIENT: &str = "joinGameClient";
    pub const JOIN_GAME_CHARACTER: &str = "joinGameCharacter";
    pub const MOVE_CHARACTER: &str = "moveCharacter";
    pub const DISCONNECT_CLIENT: &str = "disconnectClient";
    pub const PING_CLIENT: &str = "pingClient";
    pub const GET_SPAWN_ZONES: &str = "getSpawnZones";
    pub const GET_CONNECTED_CHARACTERS: &str = "getConnectedCharacters";
    pub const PLAYER_ATTACK: &str = "playerAttack";
    pub const INTERRUPT_ATTACK: &str = "interruptAttack";
    pub const PICKUP_DROPPED_ITEM: &str = "pickupDroppedItem";
    pub const GET_NEARBY_ITEMS: &str = "getNearbyItems";
    pub const GET_PLAYER_INVENTORY: &str = "getPlayerInventory";
    pub const HARVEST_START: &str = "harvestStart";
    pub const HARVEST_CANCEL: &str = "harvestCancel";
    pub const GET_NEARBY_CORPSES: &str = "getNearbyCorpses";
    pub const CORPSE_LOOT_PICKUP: &str = "corpseLootPickup";
    pub const CORPSE_LOOT_INSPECT: &str = "corpseLootInspect";
}

/// Who a combat action is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    #[serde(rename = "PLAYER")]
    Player,
    #[serde(rename = "MOB")]
    Mob,
    #[serde(rename = "SELF", alias = "SELF_TARGET")]
    SelfTarget,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "PLAYER",
            Self::Mob => "MOB",
            Self::SelfTarget => "SELF",
        }
    }
}

/// `joinGameClient` / `joinGameCharacter` body. `id` is the character id
/// the client wants to control; when absent the stored registry value wins.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct JoinBody {
    #[serde(default)]
    pub id: i32,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCharacterBody {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub pos_x: f32,
    #[serde(default)]
    pub pos_y: f32,
    #[serde(default)]
    pub pos_z: f32,
    #[serde(default)]
    pub rot_z: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAttackBody {
    pub skill_slug: String,
    pub target_id: i64,
    pub target_type: TargetType,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterruptAttackBody {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HarvestStartBody {
    #[serde(rename = "corpseUID")]
    pub corpse_uid: i64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct HarvestCancelBody {
    #[serde(rename = "corpseUID", default)]
    pub corpse_uid: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedLoot {
    pub item_id: i32,
    #[serde(default = "one")]
    pub quantity: i32,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpseLootPickupBody {
    #[serde(rename = "corpseUID")]
    pub corpse_uid: i64,
    /// Echo of the requester's own character id; must match the sender.
    #[serde(default)]
    pub player_id: i32,
    #[serde(default)]
    pub requested_items: Vec<RequestedLoot>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpseLootInspectBody {
    #[serde(rename = "corpseUID")]
    pub corpse_uid: i64,
    #[serde(default)]
    pub player_id: i32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ItemPickupBody {
    #[serde(rename = "itemUID")]
    pub item_uid: i64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQueryBody {
    #[serde(default)]
    pub radius: f32,
}

/// Decode an event body, mapping failures to one protocol error kind so
/// handlers answer a uniform malformed-body error packet.
pub fn parse_body<T: serde::de::DeserializeOwned>(
    event_type: &str,
    body: &Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(body.clone()).map_err(|err| ProtocolError::MalformedBody {
        event_type: event_type.to_owned(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attack_body_parses() {
        let body = json!({"skillSlug": "basic_attack", "targetId": 200, "targetType": "MOB"});
        let parsed: PlayerAttackBody = parse_body(event_type::PLAYER_ATTACK, &body).unwrap();
        assert_eq!(parsed.skill_slug, "basic_attack");
        assert_eq!(parsed.target_id, 200);
        assert_eq!(parsed.target_type, TargetType::Mob);
    }

    #[test]
    fn attack_body_requires_skill() {
        let body = json!({"targetId": 200, "targetType": "MOB"});
        let err = parse_body::<PlayerAttackBody>(event_type::PLAYER_ATTACK, &body).unwrap_err();
        assert!(err.to_string().contains("playerAttack"));
    }

    #[test]
    fn pickup_body_defaults_quantity() {
        let body = json!({
            "corpseUID": 10,
            "playerId": 1,
            "requestedItems": [{"itemId": 4}]
        });
        let parsed: CorpseLootPickupBody =
            parse_body(event_type::CORPSE_LOOT_PICKUP, &body).unwrap();
        assert_eq!(parsed.requested_items[0].quantity, 1);
    }

    #[test]
    fn move_body_tolerates_missing_fields() {
        let parsed: MoveCharacterBody =
            parse_body(event_type::MOVE_CHARACTER, &json!({"id": 42, "posX": 10.0})).unwrap();
        assert_eq!(parsed.id, 42);
        assert_eq!(parsed.pos_x, 10.0);
        assert_eq!(parsed.pos_y, 0.0);
    }
}
