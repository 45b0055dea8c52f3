use std::collections::HashMap;

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ashfall_core::id::IdGenerator;
use ashfall_core::math::Position;
use ashfall_registry::LootEntry;

/// How far a character may stand from a ground drop and still pick it up.
/// Corpse harvesting uses its own, wider interaction radius; the two are
/// different mechanics and tuned separately.
pub const PICKUP_RADIUS: f32 = 100.0;

/// XY scatter applied to drops so a multi-item death doesn't stack items on
/// one spot.
const DROP_JITTER: f32 = 20.0;

/// Ground drops older than this are swept by the periodic cleanup.
pub const DROPPED_ITEM_MAX_AGE_SECS: f32 = 300.0;

/// One item lying on the ground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedItem {
    pub uid: i64,
    pub item_id: i32,
    pub quantity: i32,
    pub position: Position,
    pub drop_time_secs: f32,
    pub dropped_by_mob_uid: i64,
    pub can_be_picked_up: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LootError {
    #[error("dropped item {0} not found")]
    NotFound(i64),
    #[error("dropped item {0} cannot be picked up")]
    NotPickable(i64),
    #[error("too far from dropped item {0}")]
    OutOfRange(i64),
}

/// Ground-drop store. UIDs are monotonic per process; rows disappear on
/// pickup or age-out.
#[derive(Debug, Default)]
pub struct LootStore {
    items: RwLock<HashMap<i64, DroppedItem>>,
    uids: IdGenerator,
}

impl LootStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roll the mob's ground loot table and insert the winners around the
    /// death position. Returns the created drops for broadcast.
    pub fn generate_loot_on_mob_death(
        &self,
        mob_uid: i64,
        position: Position,
        table: &[LootEntry],
        now_secs: f32,
    ) -> Vec<DroppedItem> {
        let mut rng = rand::thread_rng();
        let mut drops = Vec::new();

        for entry in table {
            if rng.gen::<f32>() >= entry.drop_chance {
                continue;
            }
            let drop = DroppedItem {
                uid: self.uids.next(),
                item_id: entry.item_id,
                quantity: 1,
                position: Position::new(
                    position.x + rng.gen_range(-DROP_JITTER..=DROP_JITTER),
                    position.y + rng.gen_range(-DROP_JITTER..=DROP_JITTER),
                    position.z,
                    0.0,
                ),
                drop_time_secs: now_secs,
                dropped_by_mob_uid: mob_uid,
                can_be_picked_up: true,
            };
            drops.push(drop);
        }

        let mut items = self.items.write();
        for drop in &drops {
            items.insert(drop.uid, drop.clone());
        }
        drops
    }

    /// Validate and remove a drop for pickup. The caller credits the
    /// character's inventory; if that ever fails, `restore` puts the drop
    /// back so nothing is lost.
    pub fn take_for_pickup(
        &self,
        item_uid: i64,
        player_position: Position,
    ) -> Result<DroppedItem, LootError> {
        let mut items = self.items.write();
        let item = items.get(&item_uid).ok_or(LootError::NotFound(item_uid))?;
        if !item.can_be_picked_up {
            return Err(LootError::NotPickable(item_uid));
        }
        if item.position.distance_xy(&player_position) > PICKUP_RADIUS {
            return Err(LootError::OutOfRange(item_uid));
        }
        items.remove(&item_uid).ok_or(LootError::NotFound(item_uid))
    }

    pub fn restore(&self, item: DroppedItem) {
        self.items.write().insert(item.uid, item);
    }

    pub fn get(&self, item_uid: i64) -> Option<DroppedItem> {
        self.items.read().get(&item_uid).cloned()
    }

    pub fn nearby(&self, position: Position, radius: f32) -> Vec<DroppedItem> {
        self.items
            .read()
            .values()
            .filter(|item| item.position.distance_xy(&position) <= radius)
            .cloned()
            .collect()
    }

    /// Sweep drops older than `max_age_secs`; returns how many were removed.
    pub fn cleanup_old(&self, now_secs: f32, max_age_secs: f32) -> usize {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|_, item| now_secs - item.drop_time_secs < max_age_secs);
        before - items.len()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}
