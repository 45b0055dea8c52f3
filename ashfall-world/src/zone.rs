use std::collections::HashMap;

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};

use ashfall_core::id::IdGenerator;
use ashfall_core::math::{Aabb, Position};
use ashfall_registry::MobTemplateRegistry;

use crate::mob::{MobInstance, MobInstanceRegistry};

/// Height assigned to freshly spawned mobs. The world streamer drops them
/// onto the terrain client-side; zones carry no height map of their own.
pub const DEFAULT_SPAWN_Z: f32 = 200.0;

/// One mob population box replicated from upstream, plus the live counters
/// this server maintains while simulating it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpawnZone {
    pub zone_id: i32,
    pub name: String,
    pub center_x: f32,
    pub center_y: f32,
    pub center_z: f32,
    pub size_x: f32,
    pub size_y: f32,
    pub size_z: f32,
    pub spawn_mob_id: i32,
    pub spawn_count: i32,
    pub respawn_seconds: f32,
    pub spawned_count: i32,
    pub spawned_mobs: Vec<i64>,
}

impl SpawnZone {
    pub fn bounds(&self) -> Aabb {
        Aabb {
            center_x: self.center_x,
            center_y: self.center_y,
            center_z: self.center_z,
            size_x: self.size_x,
            size_y: self.size_y,
            size_z: self.size_z,
        }
    }
}

/// Zone definitions keyed by id. Deep-copy queries; population mutations go
/// through `spawn_mobs_in_zone` / `mob_died` so `spawned_count` always
/// matches the set of live instances registered for the zone.
#[derive(Debug, Default)]
pub struct SpawnZoneRegistry {
    zones: RwLock<HashMap<i32, SpawnZone>>,
}

impl SpawnZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_zones(&self, zones: Vec<SpawnZone>) {
        if zones.is_empty() {
            log::warn!("spawn zone replication carried no entries");
            return;
        }
        let mut map = self.zones.write();
        for mut zone in zones {
            // Re-replication keeps live population state.
            if let Some(existing) = map.get(&zone.zone_id) {
                zone.spawned_count = existing.spawned_count;
                zone.spawned_mobs = existing.spawned_mobs.clone();
            }
            map.insert(zone.zone_id, zone);
        }
    }

    pub fn get(&self, zone_id: i32) -> Option<SpawnZone> {
        self.zones.read().get(&zone_id).cloned()
    }

    pub fn all(&self) -> Vec<SpawnZone> {
        self.zones.read().values().cloned().collect()
    }

    pub fn zone_ids(&self) -> Vec<i32> {
        self.zones.read().keys().copied().collect()
    }

    /// Top the zone population back up to `spawn_count`. New mobs get a
    /// uniform random XY inside the zone box, the documented spawn height,
    /// and a random facing. Returns the created instances for broadcast.
    pub fn spawn_mobs_in_zone(
        &self,
        zone_id: i32,
        templates: &MobTemplateRegistry,
        mobs: &MobInstanceRegistry,
        uids: &IdGenerator,
    ) -> Vec<MobInstance> {
        let mut spawned = Vec::new();

        let mut zones = self.zones.write();
        let Some(zone) = zones.get_mut(&zone_id) else {
            log::error!("spawn requested for unknown zone {zone_id}");
            return spawned;
        };
        if zone.spawned_count >= zone.spawn_count {
            return spawned;
        }

        let Some(template) = templates.get(zone.spawn_mob_id) else {
            log::error!(
                "zone {zone_id} spawns mob template {} which is not replicated yet",
                zone.spawn_mob_id
            );
            return spawned;
        };

        let bounds = zone.bounds();
        let mut rng = rand::thread_rng();
        let missing = zone.spawn_count - zone.spawned_count;
        for _ in 0..missing {
            let position = Position::new(
                rng.gen_range(bounds.min_x()..=bounds.max_x()),
                rng.gen_range(bounds.min_y()..=bounds.max_y()),
                DEFAULT_SPAWN_Z,
                rng.gen_range(0.0..360.0),
            );

            let instance = MobInstance::from_template(&template, uids.next(), zone_id, position);
            if let Err(err) = mobs.register(instance.clone()) {
                log::error!("failed to register spawned mob: {err}");
                continue;
            }
            zone.spawned_mobs.push(instance.uid);
            zone.spawned_count += 1;
            spawned.push(instance);
        }

        spawned
    }

    /// Account for a death so the next spawn pulse refills the slot.
    pub fn mob_died(&self, zone_id: i32, mob_uid: i64) {
        let mut zones = self.zones.write();
        if let Some(zone) = zones.get_mut(&zone_id) {
            zone.spawned_mobs.retain(|uid| *uid != mob_uid);
            zone.spawned_count = (zone.spawned_count - 1).max(0);
        }
    }
}
