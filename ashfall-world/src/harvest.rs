use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ashfall_core::math::Position;

/// How close a character must stand to claim or loot a corpse. Wider than
/// the ground-drop pickup radius; harvesting is aimed at a body, not a
/// pinpoint item.
pub const INTERACTION_RADIUS: f32 = 150.0;

/// Time a harvest channel takes to finish.
pub const HARVEST_DURATION_SECS: f32 = 3.0;

/// Moving farther than this from the harvest start position cancels it.
pub const HARVEST_MAX_MOVE_DISTANCE: f32 = 50.0;

/// Corpses older than this are swept with whatever loot is left on them.
pub const CORPSE_MAX_AGE_SECS: f32 = 600.0;

/// One rolled loot stack sitting on a harvested corpse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpseLoot {
    pub item_id: i32,
    pub quantity: i32,
}

/// Post-death anchor for harvest loot; distinct from ground drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestCorpse {
    pub mob_uid: i64,
    pub mob_id: i32,
    pub position: Position,
    pub death_time_secs: f32,
    pub has_been_harvested: bool,
    pub harvested_by_character_id: i32,
    pub current_harvester_character_id: i32,
    pub interaction_radius: f32,
    pub available_loot: Vec<CorpseLoot>,
}

/// One in-flight harvest channel. At most one per character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestSession {
    pub character_id: i32,
    pub corpse_uid: i64,
    pub start_secs: f32,
    pub duration_secs: f32,
    pub start_position: Position,
    pub max_move_distance: f32,
    pub is_active: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HarvestError {
    #[error("corpse {0} not found")]
    CorpseNotFound(i64),
    #[error("corpse {0} has already been harvested")]
    AlreadyHarvested(i64),
    #[error("corpse {0} is being harvested by character {1}")]
    CorpseBusy(i64, i32),
    #[error("character {0} already has an active harvest")]
    AlreadyHarvesting(i32),
    #[error("too far from corpse {0}")]
    OutOfRange(i64),
    #[error("corpse {0} has not been harvested yet")]
    NotHarvested(i64),
    #[error("corpse {0} was harvested by another character")]
    NotYourHarvest(i64),
}

#[derive(Debug, Default)]
struct HarvestState {
    corpses: HashMap<i64, HarvestCorpse>,
    sessions: HashMap<i32, HarvestSession>,
}

/// What a loot pickup actually produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LootTaken {
    pub picked_up: Vec<CorpseLoot>,
    pub remaining: Vec<CorpseLoot>,
}

/// Corpse and session state behind one lock, so the exclusivity rules (one
/// session per character, one harvester per corpse) hold atomically.
#[derive(Debug, Default)]
pub struct HarvestStore {
    state: RwLock<HarvestState>,
}

impl HarvestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_corpse(&self, mob_uid: i64, mob_id: i32, position: Position, now_secs: f32) {
        let corpse = HarvestCorpse {
            mob_uid,
            mob_id,
            position,
            death_time_secs: now_secs,
            has_been_harvested: false,
            harvested_by_character_id: 0,
            current_harvester_character_id: 0,
            interaction_radius: INTERACTION_RADIUS,
            available_loot: Vec::new(),
        };
        self.state.write().corpses.insert(mob_uid, corpse);
    }

    pub fn get_corpse(&self, mob_uid: i64) -> Option<HarvestCorpse> {
        self.state.read().corpses.get(&mob_uid).cloned()
    }

    pub fn nearby_corpses(&self, position: Position, radius: f32) -> Vec<HarvestCorpse> {
        self.state
            .read()
            .corpses
            .values()
            .filter(|c| c.position.distance_xy(&position) <= radius)
            .cloned()
            .collect()
    }

    pub fn session_for(&self, character_id: i32) -> Option<HarvestSession> {
        self.state.read().sessions.get(&character_id).cloned()
    }

    /// Claim the corpse and open a session. All exclusivity and range rules
    /// are checked under the single write lock.
    pub fn begin_harvest(
        &self,
        character_id: i32,
        corpse_uid: i64,
        player_position: Position,
        now_secs: f32,
    ) -> Result<HarvestSession, HarvestError> {
        let mut state = self.state.write();

        if state.sessions.contains_key(&character_id) {
            return Err(HarvestError::AlreadyHarvesting(character_id));
        }

        let corpse = state
            .corpses
            .get_mut(&corpse_uid)
            .ok_or(HarvestError::CorpseNotFound(corpse_uid))?;
        if corpse.has_been_harvested {
            return Err(HarvestError::AlreadyHarvested(corpse_uid));
        }
        if corpse.current_harvester_character_id != 0
            && corpse.current_harvester_character_id != character_id
        {
            return Err(HarvestError::CorpseBusy(
                corpse_uid,
                corpse.current_harvester_character_id,
            ));
        }
        if corpse.position.distance_xy(&player_position) > corpse.interaction_radius {
            return Err(HarvestError::OutOfRange(corpse_uid));
        }

        corpse.current_harvester_character_id = character_id;

        let session = HarvestSession {
            character_id,
            corpse_uid,
            start_secs: now_secs,
            duration_secs: HARVEST_DURATION_SECS,
            start_position: player_position,
            max_move_distance: HARVEST_MAX_MOVE_DISTANCE,
            is_active: true,
        };
        state.sessions.insert(character_id, session.clone());
        Ok(session)
    }

    /// Drop the character's session and release the corpse claim. Returns
    /// the session so the caller can broadcast the cancellation.
    pub fn cancel_session(&self, character_id: i32) -> Option<HarvestSession> {
        let mut state = self.state.write();
        let session = state.sessions.remove(&character_id)?;
        if let Some(corpse) = state.corpses.get_mut(&session.corpse_uid) {
            if corpse.current_harvester_character_id == character_id {
                corpse.current_harvester_character_id = 0;
            }
        }
        Some(session)
    }

    /// Sessions whose duration has elapsed. Each is flipped inactive and
    /// reported exactly once; completion removes it for good.
    pub fn due_sessions(&self, now_secs: f32) -> Vec<HarvestSession> {
        let mut state = self.state.write();
        let mut due = Vec::new();
        for session in state.sessions.values_mut() {
            if session.is_active && now_secs - session.start_secs >= session.duration_secs {
                session.is_active = false;
                due.push(session.clone());
            }
        }
        due
    }

    /// Finish the harvest: stamp ownership, attach the rolled loot, release
    /// the claim, and drop the session.
    pub fn complete_harvest(
        &self,
        character_id: i32,
        corpse_uid: i64,
        loot: Vec<CorpseLoot>,
    ) -> Result<HarvestCorpse, HarvestError> {
        let mut state = self.state.write();

        let corpse = state
            .corpses
            .get_mut(&corpse_uid)
            .ok_or(HarvestError::CorpseNotFound(corpse_uid))?;
        if corpse.has_been_harvested {
            return Err(HarvestError::AlreadyHarvested(corpse_uid));
        }

        corpse.has_been_harvested = true;
        corpse.harvested_by_character_id = character_id;
        corpse.current_harvester_character_id = 0;
        corpse.available_loot = loot;
        let snapshot = corpse.clone();

        state.sessions.remove(&character_id);
        Ok(snapshot)
    }

    /// Debit requested loot rows from a harvested corpse. Quantities clamp
    /// to what is available; unknown items are skipped. The corpse loot
    /// entry disappears once everything is taken.
    pub fn take_corpse_loot(
        &self,
        character_id: i32,
        corpse_uid: i64,
        requested: &[CorpseLoot],
        player_position: Position,
    ) -> Result<LootTaken, HarvestError> {
        let mut state = self.state.write();

        let corpse = state
            .corpses
            .get_mut(&corpse_uid)
            .ok_or(HarvestError::CorpseNotFound(corpse_uid))?;
        if !corpse.has_been_harvested {
            return Err(HarvestError::NotHarvested(corpse_uid));
        }
        if corpse.harvested_by_character_id != character_id {
            return Err(HarvestError::NotYourHarvest(corpse_uid));
        }
        if corpse.position.distance_xy(&player_position) > corpse.interaction_radius {
            return Err(HarvestError::OutOfRange(corpse_uid));
        }

        let mut taken = LootTaken::default();
        for request in requested {
            let Some(row) = corpse
                .available_loot
                .iter_mut()
                .find(|l| l.item_id == request.item_id)
            else {
                continue;
            };
            let quantity = request.quantity.clamp(0, row.quantity);
            if quantity == 0 {
                continue;
            }
            row.quantity -= quantity;
            taken.picked_up.push(CorpseLoot {
                item_id: request.item_id,
                quantity,
            });
        }
        corpse.available_loot.retain(|l| l.quantity > 0);
        taken.remaining = corpse.available_loot.clone();
        Ok(taken)
    }

    /// Undo a debit after a failed inventory credit.
    pub fn restore_corpse_loot(&self, corpse_uid: i64, rows: &[CorpseLoot]) {
        let mut state = self.state.write();
        if let Some(corpse) = state.corpses.get_mut(&corpse_uid) {
            for row in rows {
                match corpse
                    .available_loot
                    .iter_mut()
                    .find(|l| l.item_id == row.item_id)
                {
                    Some(existing) => existing.quantity += row.quantity,
                    None => corpse.available_loot.push(*row),
                }
            }
        }
    }

    pub fn corpse_has_loot(&self, corpse_uid: i64) -> bool {
        self.state
            .read()
            .corpses
            .get(&corpse_uid)
            .is_some_and(|c| !c.available_loot.is_empty())
    }

    /// Sweep corpses past their age limit, skipping any that still have an
    /// active harvester. Returns how many were removed.
    pub fn cleanup_old_corpses(&self, now_secs: f32, max_age_secs: f32) -> usize {
        let mut state = self.state.write();
        let before = state.corpses.len();
        state.corpses.retain(|_, corpse| {
            corpse.current_harvester_character_id != 0
                || now_secs - corpse.death_time_secs < max_age_secs
        });
        before - state.corpses.len()
    }

    pub fn corpse_count(&self) -> usize {
        self.state.read().corpses.len()
    }

    pub fn active_session_count(&self) -> usize {
        self.state
            .read()
            .sessions
            .values()
            .filter(|s| s.is_active)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_corpse() -> HarvestStore {
        let store = HarvestStore::new();
        store.register_corpse(100, 7, Position::new(0.0, 0.0, 200.0, 0.0), 0.0);
        store
    }

    #[test]
    fn claim_is_exclusive_per_corpse() {
        let store = store_with_corpse();
        let here = Position::default();

        store.begin_harvest(1, 100, here, 0.0).unwrap();
        assert_eq!(
            store.begin_harvest(2, 100, here, 0.0),
            Err(HarvestError::CorpseBusy(100, 1))
        );
    }

    #[test]
    fn one_session_per_character() {
        let store = store_with_corpse();
        store.register_corpse(101, 7, Position::default(), 0.0);
        let here = Position::default();

        store.begin_harvest(1, 100, here, 0.0).unwrap();
        assert_eq!(
            store.begin_harvest(1, 101, here, 0.0),
            Err(HarvestError::AlreadyHarvesting(1))
        );
    }

    #[test]
    fn range_is_checked_on_claim() {
        let store = store_with_corpse();
        let far = Position::new(INTERACTION_RADIUS + 1.0, 0.0, 0.0, 0.0);
        assert_eq!(
            store.begin_harvest(1, 100, far, 0.0),
            Err(HarvestError::OutOfRange(100))
        );
    }

    #[test]
    fn due_sessions_report_once() {
        let store = store_with_corpse();
        store.begin_harvest(1, 100, Position::default(), 0.0).unwrap();

        assert!(store.due_sessions(1.0).is_empty());
        let due = store.due_sessions(HARVEST_DURATION_SECS);
        assert_eq!(due.len(), 1);
        assert!(store.due_sessions(HARVEST_DURATION_SECS + 1.0).is_empty());
    }

    #[test]
    fn completion_transfers_ownership_and_clears_claim() {
        let store = store_with_corpse();
        store.begin_harvest(1, 100, Position::default(), 0.0).unwrap();

        let corpse = store
            .complete_harvest(
                1,
                100,
                vec![CorpseLoot {
                    item_id: 5,
                    quantity: 2,
                }],
            )
            .unwrap();

        assert!(corpse.has_been_harvested);
        assert_eq!(corpse.harvested_by_character_id, 1);
        assert_eq!(corpse.current_harvester_character_id, 0);
        assert!(store.session_for(1).is_none());
        // Invariant: a harvested corpse cannot be claimed again.
        assert_eq!(
            store.begin_harvest(2, 100, Position::default(), 10.0),
            Err(HarvestError::AlreadyHarvested(100))
        );
    }

    #[test]
    fn loot_pickup_enforces_ownership_and_clamps() {
        let store = store_with_corpse();
        store.begin_harvest(1, 100, Position::default(), 0.0).unwrap();
        store
            .complete_harvest(
                1,
                100,
                vec![CorpseLoot {
                    item_id: 5,
                    quantity: 2,
                }],
            )
            .unwrap();

        assert_eq!(
            store.take_corpse_loot(2, 100, &[], Position::default()),
            Err(HarvestError::NotYourHarvest(100))
        );

        let taken = store
            .take_corpse_loot(
                1,
                100,
                &[CorpseLoot {
                    item_id: 5,
                    quantity: 99,
                }],
                Position::default(),
            )
            .unwrap();
        assert_eq!(taken.picked_up, vec![CorpseLoot { item_id: 5, quantity: 2 }]);
        assert!(taken.remaining.is_empty());
        assert!(!store.corpse_has_loot(100));
    }

    #[test]
    fn cancel_releases_claim() {
        let store = store_with_corpse();
        store.begin_harvest(1, 100, Position::default(), 0.0).unwrap();
        let session = store.cancel_session(1).unwrap();
        assert_eq!(session.corpse_uid, 100);
        assert_eq!(store.get_corpse(100).unwrap().current_harvester_character_id, 0);
        // Another character can claim now.
        store.begin_harvest(2, 100, Position::default(), 1.0).unwrap();
    }

    #[test]
    fn sweep_keeps_actively_harvested_corpses() {
        let store = store_with_corpse();
        store.register_corpse(101, 7, Position::default(), 0.0);
        store.begin_harvest(1, 100, Position::default(), 0.0).unwrap();

        let removed = store.cleanup_old_corpses(CORPSE_MAX_AGE_SECS + 1.0, CORPSE_MAX_AGE_SECS);
        assert_eq!(removed, 1);
        assert!(store.get_corpse(100).is_some());
        assert!(store.get_corpse(101).is_none());
    }
}
