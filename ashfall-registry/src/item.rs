use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ashfall_core::attribute::Attribute;

/// Immutable catalog entry for one item type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemTemplate {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub item_type: String,
    pub rarity: String,
    pub stack_max: i32,
    pub weight: f32,
    pub equip_slot: String,
    pub is_harvest: bool,
    pub attributes: Vec<Attribute>,
}

/// One row of a mob's loot table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LootEntry {
    pub item_id: i32,
    pub drop_chance: f32,
}

/// Item catalog plus per-mob loot tables, both replicated from upstream.
#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: RwLock<HashMap<i32, ItemTemplate>>,
    loot_tables: RwLock<HashMap<i32, Vec<LootEntry>>>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_items(&self, items: Vec<ItemTemplate>) {
        if items.is_empty() {
            log::warn!("item replication carried no entries");
            return;
        }
        let mut map = self.items.write();
        for item in items {
            map.insert(item.id, item);
        }
    }

    pub fn set_mob_loot(&self, mob_id: i32, entries: Vec<LootEntry>) {
        self.loot_tables.write().insert(mob_id, entries);
    }

    pub fn get_item(&self, item_id: i32) -> Option<ItemTemplate> {
        self.items.read().get(&item_id).cloned()
    }

    pub fn loot_for_mob(&self, mob_id: i32) -> Vec<LootEntry> {
        self.loot_tables
            .read()
            .get(&mob_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Loot rows whose item is flagged harvestable. These roll on harvest
    /// completion; everything else rolls as ground drops on death.
    pub fn harvest_loot_for_mob(&self, mob_id: i32) -> Vec<LootEntry> {
        self.partition_loot(mob_id, true)
    }

    pub fn ground_loot_for_mob(&self, mob_id: i32) -> Vec<LootEntry> {
        self.partition_loot(mob_id, false)
    }

    fn partition_loot(&self, mob_id: i32, harvest: bool) -> Vec<LootEntry> {
        let items = self.items.read();
        self.loot_tables
            .read()
            .get(&mob_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| items.get(&e.item_id).is_some_and(|i| i.is_harvest == harvest))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn item_count(&self) -> usize {
        self.items.read().len()
    }
}
