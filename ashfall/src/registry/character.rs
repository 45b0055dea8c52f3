use std::collections::HashMap;

use parking_lot::RwLock;

use ashfall_core::character::CharacterData;
use ashfall_core::math::Position;

/// Authoritative character state for avatars resident in this chunk.
/// Replicated in from upstream on join; health/mana/exp/position mutate
/// locally. Queries return copies.
#[derive(Default)]
pub struct CharacterRegistry {
    characters: RwLock<HashMap<i32, CharacterData>>,
}

impl CharacterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update by character id.
    pub fn insert(&self, character: CharacterData) {
        self.characters
            .write()
            .insert(character.character_id, character);
    }

    pub fn get(&self, character_id: i32) -> Option<CharacterData> {
        self.characters.read().get(&character_id).cloned()
    }

    pub fn remove(&self, character_id: i32) -> Option<CharacterData> {
        self.characters.write().remove(&character_id)
    }

    pub fn list(&self) -> Vec<CharacterData> {
        self.characters.read().values().cloned().collect()
    }

    pub fn update_position(&self, character_id: i32, position: Position) -> bool {
        self.mutate(character_id, |c| c.position = position)
    }

    /// Short-span mutation under the write lock. Returns false when the
    /// character is not resident.
    pub fn mutate(&self, character_id: i32, f: impl FnOnce(&mut CharacterData)) -> bool {
        let mut characters = self.characters.write();
        match characters.get_mut(&character_id) {
            Some(character) => {
                f(character);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.characters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_by_id() {
        let registry = CharacterRegistry::new();
        registry.insert(CharacterData {
            character_id: 42,
            level: 1,
            ..Default::default()
        });
        registry.insert(CharacterData {
            character_id: 42,
            level: 7,
            ..Default::default()
        });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(42).unwrap().level, 7);
    }

    #[test]
    fn mutate_misses_return_false() {
        let registry = CharacterRegistry::new();
        assert!(!registry.update_position(1, Position::default()));
    }

    #[test]
    fn queries_return_copies() {
        let registry = CharacterRegistry::new();
        registry.insert(CharacterData {
            character_id: 42,
            current_health: 100,
            ..Default::default()
        });
        let mut copy = registry.get(42).unwrap();
        copy.current_health = 1;
        assert_eq!(registry.get(42).unwrap().current_health, 100);
    }
}
