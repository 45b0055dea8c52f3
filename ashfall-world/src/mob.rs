use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ashfall_core::attribute::Attribute;
use ashfall_core::math::Position;
use ashfall_core::skill::Skill;
use ashfall_registry::MobTemplate;

/// One live mob in the chunk. Attributes and skills are copied from the
/// template at spawn so combat never needs a template lookup mid-resolution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MobInstance {
    pub uid: i64,
    pub mob_id: i32,
    pub zone_id: i32,
    pub name: String,
    pub race: String,
    pub level: i32,
    pub base_exp: i32,
    pub is_aggressive: bool,
    pub position: Position,
    pub current_health: i32,
    pub max_health: i32,
    pub current_mana: i32,
    pub max_mana: i32,
    pub is_dead: bool,
    pub attributes: Vec<Attribute>,
    pub skills: Vec<Skill>,
}

impl MobInstance {
    pub fn from_template(template: &MobTemplate, uid: i64, zone_id: i32, position: Position) -> Self {
        Self {
            uid,
            mob_id: template.mob_id,
            zone_id,
            name: template.name.clone(),
            race: template.race.clone(),
            level: template.level,
            base_exp: template.base_exp,
            is_aggressive: template.is_aggressive,
            position,
            current_health: template.base_health,
            max_health: template.base_health,
            current_mana: template.base_mana,
            max_mana: template.base_mana,
            is_dead: false,
            attributes: template.attributes.clone(),
            skills: template.skills.clone(),
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.is_dead && self.current_health > 0
    }
}

/// Outcome of a health mutation. `mob_died` reports only the transition into
/// death; callers use it to fire loot/corpse/experience exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthUpdate {
    pub success: bool,
    pub mob_died: bool,
    pub was_already_dead: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MobRegistryError {
    #[error("mob uid {0} already registered")]
    DuplicateUid(i64),
    #[error("mob uid {0} not found")]
    NotFound(i64),
}

#[derive(Debug, Default)]
struct MobMaps {
    by_uid: HashMap<i64, MobInstance>,
    by_zone: HashMap<i32, Vec<i64>>,
}

/// Primary map `uid -> instance` plus the `zone -> [uid]` index. Both live
/// under one lock; every mutation edits them together so the index can never
/// point at a mob that moved zones or despawned.
#[derive(Debug, Default)]
pub struct MobInstanceRegistry {
    maps: RwLock<MobMaps>,
}

impl MobInstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, instance: MobInstance) -> Result<(), MobRegistryError> {
        let mut maps = self.maps.write();
        if maps.by_uid.contains_key(&instance.uid) {
            return Err(MobRegistryError::DuplicateUid(instance.uid));
        }
        maps.by_zone
            .entry(instance.zone_id)
            .or_default()
            .push(instance.uid);
        maps.by_uid.insert(instance.uid, instance);
        Ok(())
    }

    pub fn unregister(&self, uid: i64) -> Option<MobInstance> {
        let mut maps = self.maps.write();
        let instance = maps.by_uid.remove(&uid)?;
        if let Some(uids) = maps.by_zone.get_mut(&instance.zone_id) {
            uids.retain(|u| *u != uid);
            if uids.is_empty() {
                maps.by_zone.remove(&instance.zone_id);
            }
        }
        Some(instance)
    }

    pub fn get(&self, uid: i64) -> Option<MobInstance> {
        self.maps.read().by_uid.get(&uid).cloned()
    }

    pub fn in_zone(&self, zone_id: i32) -> Vec<MobInstance> {
        let maps = self.maps.read();
        maps.by_zone
            .get(&zone_id)
            .map(|uids| {
                uids.iter()
                    .filter_map(|uid| maps.by_uid.get(uid).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<MobInstance> {
        self.maps.read().by_uid.values().cloned().collect()
    }

    /// Set health, reporting the death transition. Health never goes below
    /// zero; a mob that was already dead only reports `was_already_dead`.
    pub fn update_health(&self, uid: i64, health: i32) -> HealthUpdate {
        let mut maps = self.maps.write();
        let Some(instance) = maps.by_uid.get_mut(&uid) else {
            return HealthUpdate::default();
        };

        if instance.is_dead {
            return HealthUpdate {
                success: true,
                mob_died: false,
                was_already_dead: true,
            };
        }

        let mut died = false;
        if health <= 0 {
            instance.current_health = 0;
            instance.is_dead = true;
            died = true;
        } else {
            instance.current_health = health.min(instance.max_health);
        }

        HealthUpdate {
            success: true,
            mob_died: died,
            was_already_dead: false,
        }
    }

    pub fn update_mana(&self, uid: i64, mana: i32) -> Result<(), MobRegistryError> {
        let mut maps = self.maps.write();
        let instance = maps
            .by_uid
            .get_mut(&uid)
            .ok_or(MobRegistryError::NotFound(uid))?;
        instance.current_mana = mana.clamp(0, instance.max_mana);
        Ok(())
    }

    pub fn update_position(&self, uid: i64, position: Position) -> Result<(), MobRegistryError> {
        let mut maps = self.maps.write();
        let instance = maps
            .by_uid
            .get_mut(&uid)
            .ok_or(MobRegistryError::NotFound(uid))?;
        instance.position = position;
        Ok(())
    }

    pub fn alive_count_in_zone(&self, zone_id: i32) -> usize {
        let maps = self.maps.read();
        maps.by_zone
            .get(&zone_id)
            .map(|uids| {
                uids.iter()
                    .filter(|uid| maps.by_uid.get(uid).is_some_and(MobInstance::is_alive))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Index consistency probe used by tests and debug assertions: every
    /// indexed uid must resolve to an instance recorded in that zone, and
    /// every instance must be indexed exactly once.
    pub fn zone_index_consistent(&self) -> bool {
        let maps = self.maps.read();
        let indexed: usize = maps.by_zone.values().map(Vec::len).sum();
        if indexed != maps.by_uid.len() {
            return false;
        }
        maps.by_zone.iter().all(|(zone_id, uids)| {
            uids.iter()
                .all(|uid| maps.by_uid.get(uid).is_some_and(|m| m.zone_id == *zone_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mob(uid: i64, zone_id: i32) -> MobInstance {
        MobInstance {
            uid,
            mob_id: 1,
            zone_id,
            current_health: 100,
            max_health: 100,
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_uid_is_rejected() {
        let registry = MobInstanceRegistry::new();
        registry.register(mob(1, 5)).unwrap();
        assert_eq!(
            registry.register(mob(1, 6)),
            Err(MobRegistryError::DuplicateUid(1))
        );
        assert!(registry.zone_index_consistent());
    }

    #[test]
    fn unregister_drops_empty_zone_entry() {
        let registry = MobInstanceRegistry::new();
        registry.register(mob(1, 5)).unwrap();
        registry.register(mob(2, 5)).unwrap();

        registry.unregister(1).unwrap();
        assert_eq!(registry.in_zone(5).len(), 1);
        registry.unregister(2).unwrap();
        assert!(registry.in_zone(5).is_empty());
        assert!(registry.zone_index_consistent());
    }

    #[test]
    fn death_transition_reports_once() {
        let registry = MobInstanceRegistry::new();
        registry.register(mob(1, 5)).unwrap();

        let first = registry.update_health(1, -10);
        assert!(first.success && first.mob_died && !first.was_already_dead);
        assert_eq!(registry.get(1).unwrap().current_health, 0);

        let second = registry.update_health(1, 50);
        assert!(second.success && !second.mob_died && second.was_already_dead);
    }

    #[test]
    fn health_caps_at_max() {
        let registry = MobInstanceRegistry::new();
        registry.register(mob(1, 5)).unwrap();
        registry.update_health(1, 5000);
        assert_eq!(registry.get(1).unwrap().current_health, 100);
    }

    #[test]
    fn alive_count_skips_dead() {
        let registry = MobInstanceRegistry::new();
        registry.register(mob(1, 5)).unwrap();
        registry.register(mob(2, 5)).unwrap();
        registry.update_health(2, 0);
        assert_eq!(registry.alive_count_in_zone(5), 1);
    }

    #[test]
    fn queries_return_copies() {
        let registry = MobInstanceRegistry::new();
        registry.register(mob(1, 5)).unwrap();
        let mut copy = registry.get(1).unwrap();
        copy.current_health = 1;
        assert_eq!(registry.get(1).unwrap().current_health, 100);
    }
}
