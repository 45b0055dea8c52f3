use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One stack in a character's bag, unique by `item_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub item_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i32),
    #[error("character {character_id} does not hold {quantity} of item {item_id}")]
    InsufficientQuantity {
        character_id: i32,
        item_id: i32,
        quantity: i32,
    },
}

type UpdateListener = Box<dyn Fn(i32, &[InventoryEntry]) + Send + Sync>;

/// Per-character item stacks. Additions merge by `item_id`; removals
/// decrement and erase on zero. Every successful mutation notifies the
/// installed listener so callers downstream push the new state to clients
/// without each mutation site notifying by hand.
#[derive(Default)]
pub struct InventoryStore {
    inventories: RwLock<HashMap<i32, Vec<InventoryEntry>>>,
    update_listener: RwLock<Option<UpdateListener>>,
}

impl InventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the mutation listener. Called once at service wiring.
    pub fn set_update_listener(&self, listener: UpdateListener) {
        *self.update_listener.write() = Some(listener);
    }

    pub fn add(
        &self,
        character_id: i32,
        item_id: i32,
        quantity: i32,
    ) -> Result<(), InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let snapshot = {
            let mut inventories = self.inventories.write();
            let entries = inventories.entry(character_id).or_default();
            match entries.iter_mut().find(|e| e.item_id == item_id) {
                Some(entry) => entry.quantity += quantity,
                None => entries.push(InventoryEntry { item_id, quantity }),
            }
            entries.clone()
        };

        log::debug!("character {character_id} gained {quantity} of item {item_id}");
        self.notify(character_id, &snapshot);
        Ok(())
    }

    pub fn remove(
        &self,
        character_id: i32,
        item_id: i32,
        quantity: i32,
    ) -> Result<(), InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let snapshot = {
            let mut inventories = self.inventories.write();
            let entries = inventories.get_mut(&character_id).ok_or(
                InventoryError::InsufficientQuantity {
                    character_id,
                    item_id,
                    quantity,
                },
            )?;
            let index = entries
                .iter()
                .position(|e| e.item_id == item_id && e.quantity >= quantity)
                .ok_or(InventoryError::InsufficientQuantity {
                    character_id,
                    item_id,
                    quantity,
                })?;

            entries[index].quantity -= quantity;
            if entries[index].quantity == 0 {
                entries.remove(index);
            }
            entries.clone()
        };

        self.notify(character_id, &snapshot);
        Ok(())
    }

    pub fn has(&self, character_id: i32, item_id: i32) -> bool {
        self.quantity(character_id, item_id) > 0
    }

    pub fn quantity(&self, character_id: i32, item_id: i32) -> i32 {
        self.inventories
            .read()
            .get(&character_id)
            .and_then(|entries| entries.iter().find(|e| e.item_id == item_id))
            .map_or(0, |e| e.quantity)
    }

    pub fn list(&self, character_id: i32) -> Vec<InventoryEntry> {
        self.inventories
            .read()
            .get(&character_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop a character's whole inventory, e.g. after chunk handoff.
    pub fn clear(&self, character_id: i32) {
        self.inventories.write().remove(&character_id);
    }

    fn notify(&self, character_id: i32, entries: &[InventoryEntry]) {
        if let Some(listener) = self.update_listener.read().as_ref() {
            listener(character_id, entries);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn additions_merge_by_item() {
        let store = InventoryStore::new();
        store.add(1, 10, 2).unwrap();
        store.add(1, 10, 3).unwrap();
        store.add(1, 11, 1).unwrap();

        let entries = store.list(1);
        assert_eq!(entries.len(), 2);
        assert_eq!(store.quantity(1, 10), 5);
    }

    #[test]
    fn removal_erases_empty_stacks() {
        let store = InventoryStore::new();
        store.add(1, 10, 2).unwrap();
        store.remove(1, 10, 2).unwrap();
        assert!(!store.has(1, 10));
        assert!(store.list(1).is_empty());
    }

    #[test]
    fn removal_fails_closed_on_shortfall() {
        let store = InventoryStore::new();
        store.add(1, 10, 1).unwrap();
        let err = store.remove(1, 10, 2).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientQuantity {
                character_id: 1,
                item_id: 10,
                quantity: 2,
            }
        );
        assert_eq!(store.quantity(1, 10), 1);
    }

    #[test]
    fn mutations_notify_listener() {
        let store = InventoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        store.set_update_listener(Box::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        store.add(1, 10, 1).unwrap();
        store.remove(1, 10, 1).unwrap();
        assert!(store.remove(1, 10, 1).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
