use std::collections::HashMap;

use parking_lot::RwLock;
use rand::Rng;

use ashfall_core::math::{Aabb, Position};
use ashfall_world::mob::MobInstance;
use ashfall_world::zone::SpawnZone;

use crate::services::GameServices;

// Wander tuning. Distances are world units, times are seconds.
const MIN_MOVE_DISTANCE: f32 = 120.0;
const MIN_SEPARATION_DISTANCE: f32 = 140.0;
const BORDER_THRESHOLD_PERCENT: f32 = 0.25;
const BASE_SPEED_MIN: f32 = 80.0;
const BASE_SPEED_MAX: f32 = 140.0;
const STEP_MULTIPLIER_MIN: f32 = 1.2;
const STEP_MULTIPLIER_MAX: f32 = 3.0;
const MAX_STEP_PERCENT: f32 = 0.08;
const MAX_STEP_ABSOLUTE: f32 = 450.0;
const MOVE_TIME_MIN: f32 = 10.0;
const MOVE_TIME_MAX: f32 = 40.0;
const SPEED_TIME_MIN: f32 = 12.0;
const SPEED_TIME_MAX: f32 = 28.0;
const INITIAL_DELAY_MAX: f32 = 5.0;
const COOLDOWN_MIN: f32 = 5.0;
const COOLDOWN_MAX: f32 = 15.0;
const BORDER_ANGLE_MIN_DEG: f32 = 30.0;
const BORDER_ANGLE_MAX_DEG: f32 = 100.0;
const DIRECTION_ADJUST_MIN: f32 = 0.2;
const DIRECTION_ADJUST_MAX: f32 = 0.6;
const ROTATION_JITTER_DEG: f32 = 5.0;
const MAX_DIRECTION_RETRIES: usize = 4;
const MIN_MOVE_INTERVAL: f32 = 7.0;

// Aggro tuning.
const AGGRO_RADIUS: f32 = 400.0;
const LEASH_RANGE: f32 = 1500.0;
const MAX_CHASE_BEYOND_ZONE: f32 = 800.0;
const CHASE_STEP: f32 = 180.0;
const FALLBACK_ATTACK_RANGE: f32 = 250.0;
const ATTACK_COOLDOWN_SECS: f32 = 2.0;

/// Per-mob AI phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiState {
    #[default]
    Idle,
    Chasing,
    Attacking,
    Returning,
}

#[derive(Debug, Clone, Default)]
struct MobMovementState {
    next_move_secs: f32,
    dir_x: f32,
    dir_y: f32,
    step_multiplier: f32,
    speed_multiplier: f32,
    combat_state: AiState,
    target_character_id: i32,
    next_attack_secs: f32,
    spawn_position: Option<Position>,
}

/// Wander, aggro and leash behavior for every mob in the chunk. Holds only
/// per-mob steering state; world truth stays in the instance registry.
#[derive(Default)]
pub struct MovementEngine {
    states: RwLock<HashMap<i64, MobMovementState>>,
}

impl MovementEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// One tick for a zone. Returns the mobs that actually moved, as
    /// snapshots for the position broadcast.
    pub fn move_mobs_in_zone(&self, services: &GameServices, zone_id: i32) -> Vec<MobInstance> {
        let Some(zone) = services.zones.get(zone_id) else {
            log::error!("movement tick for unknown zone {zone_id}");
            return Vec::new();
        };
        let mobs_in_zone = services.mobs.in_zone(zone_id);
        if mobs_in_zone.is_empty() {
            return Vec::new();
        }

        let now = services.clock.now_secs();
        let mut moved = Vec::new();

        for mob in &mobs_in_zone {
            if !mob.is_alive() {
                continue;
            }

            let mut state = self.state_for(mob);
            let next_state = self.drive_mob(services, mob, &zone, &mobs_in_zone, &mut state, now);
            {
                let mut states = self.states.write();
                let entry = states.entry(mob.uid).or_default();
                // Forced aggro may have landed mid-tick; keep it instead of
                // stomping it with the stale snapshot.
                if state.combat_state == AiState::Idle
                    && entry.combat_state == AiState::Chasing
                    && entry.target_character_id != 0
                {
                    state.combat_state = AiState::Chasing;
                    state.target_character_id = entry.target_character_id;
                }
                *entry = state;
            }

            if let Some(position) = next_state {
                if services.mobs.update_position(mob.uid, position).is_ok() {
                    let mut snapshot = mob.clone();
                    snapshot.position = position;
                    moved.push(snapshot);
                }
            }
        }

        moved
    }

    /// Aggro ingress from combat: being hit forces a chase of the attacker
    /// no matter what the mob was doing.
    pub fn handle_mob_attacked(&self, mob_uid: i64, attacker_character_id: i32) {
        let mut states = self.states.write();
        let state = states.entry(mob_uid).or_default();
        if state.combat_state != AiState::Attacking {
            state.combat_state = AiState::Chasing;
        }
        state.target_character_id = attacker_character_id;
    }

    pub fn combat_state(&self, mob_uid: i64) -> AiState {
        self.states
            .read()
            .get(&mob_uid)
            .map_or(AiState::Idle, |s| s.combat_state)
    }

    pub fn forget_mob(&self, mob_uid: i64) {
        self.states.write().remove(&mob_uid);
    }

    fn state_for(&self, mob: &MobInstance) -> MobMovementState {
        let mut state = self
            .states
            .read()
            .get(&mob.uid)
            .cloned()
            .unwrap_or_default();
        if state.spawn_position.is_none() {
            state.spawn_position = Some(mob.position);
        }
        if state.speed_multiplier == 0.0 {
            state.speed_multiplier = 1.0;
        }
        state
    }

    /// Advance one mob's state machine; returns the new position if it
    /// moved this tick.
    fn drive_mob(
        &self,
        services: &GameServices,
        mob: &MobInstance,
        zone: &SpawnZone,
        others: &[MobInstance],
        state: &mut MobMovementState,
        now: f32,
    ) -> Option<Position> {
        let bounds = zone.bounds();

        match state.combat_state {
            AiState::Idle => {
                self.try_acquire_target(services, mob, state);
                if state.combat_state == AiState::Idle {
                    return self.wander(mob, &bounds, zone, others, state, now);
                }
                self.drive_mob(services, mob, zone, others, state, now)
            }
            AiState::Chasing | AiState::Attacking => {
                let target = services.characters.get(state.target_character_id);
                let Some(target) = target.filter(|t| t.is_alive()) else {
                    state.combat_state = AiState::Returning;
                    state.target_character_id = 0;
                    return self.drive_mob(services, mob, zone, others, state, now);
                };

                let distance_to_target = mob.position.distance_xy(&target.position);
                let zone_center = Position::new(zone.center_x, zone.center_y, zone.center_z, 0.0);
                let beyond_zone = mob.position.distance_xy(&zone_center)
                    - bounds.size_x.max(bounds.size_y) / 2.0;

                if distance_to_target > LEASH_RANGE || beyond_zone > MAX_CHASE_BEYOND_ZONE {
                    state.combat_state = AiState::Returning;
                    state.target_character_id = 0;
                    return self.drive_mob(services, mob, zone, others, state, now);
                }

                let attack_range = best_attack_range(mob);
                if distance_to_target <= attack_range {
                    state.combat_state = AiState::Attacking;
                    if now >= state.next_attack_secs {
                        services
                            .skills
                            .process_ai_attack(services, mob.uid, state.target_character_id);
                        state.next_attack_secs = now + ATTACK_COOLDOWN_SECS;
                    }
                    // Face the target even when standing still.
                    let rot = angle_degrees(&mob.position, &target.position);
                    if (rot - mob.position.rot_z).abs() > 1.0 {
                        let mut position = mob.position;
                        position.rot_z = rot;
                        return Some(position);
                    }
                    return None;
                }

                state.combat_state = AiState::Chasing;
                self.step_towards(mob, &target.position, others, CHASE_STEP, None)
            }
            AiState::Returning => {
                let home = state.spawn_position.unwrap_or_else(|| {
                    Position::new(zone.center_x, zone.center_y, zone.center_z, 0.0)
                });
                if bounds.contains_xy(mob.position.x, mob.position.y) {
                    state.combat_state = AiState::Idle;
                    return None;
                }
                // Head home ignoring separation; a returning mob must not
                // get wedged outside its zone by a crowd at the border.
                self.step_towards(mob, &home, &[], CHASE_STEP, None)
            }
        }
    }

    fn try_acquire_target(
        &self,
        services: &GameServices,
        mob: &MobInstance,
        state: &mut MobMovementState,
    ) {
        if !mob.is_aggressive {
            return;
        }
        let nearest = services
            .characters
            .list()
            .into_iter()
            .filter(|c| c.is_alive())
            .map(|c| (c.position.distance_xy(&mob.position), c.character_id))
            .filter(|(distance, _)| *distance <= AGGRO_RADIUS)
            .min_by(|a, b| a.0.total_cmp(&b.0));

        if let Some((_, character_id)) = nearest {
            state.combat_state = AiState::Chasing;
            state.target_character_id = character_id;
        }
    }

    /// One straight step toward `goal`, rejecting positions that crowd
    /// other mobs. No zone clamp: chasing and returning may cross borders.
    fn step_towards(
        &self,
        mob: &MobInstance,
        goal: &Position,
        others: &[MobInstance],
        step: f32,
        bounds: Option<&Aabb>,
    ) -> Option<Position> {
        let distance = mob.position.distance_xy(goal);
        if distance < 1.0 {
            return None;
        }
        let step = step.min(distance);
        let dx = (goal.x - mob.position.x) / distance;
        let dy = (goal.y - mob.position.y) / distance;

        let mut x = mob.position.x + dx * step;
        let mut y = mob.position.y + dy * step;
        if let Some(bounds) = bounds {
            (x, y) = bounds.clamp_xy(x, y);
        }

        if collides(x, y, mob.uid, others) {
            return None;
        }

        let mut position = mob.position;
        position.x = x;
        position.y = y;
        position.rot_z = angle_degrees(&mob.position, goal);
        Some(position)
    }

    /// The idle stroll: pick a step size, try a handful of directions
    /// (center-biased near the border), blend with the previous heading
    /// when nothing fits, clamp to the zone box.
    fn wander(
        &self,
        mob: &MobInstance,
        bounds: &Aabb,
        zone: &SpawnZone,
        others: &[MobInstance],
        state: &mut MobMovementState,
        now: f32,
    ) -> Option<Position> {
        let mut rng = rand::thread_rng();

        if state.next_move_secs == 0.0 {
            state.next_move_secs = now
                + rng.gen_range(0.0..INITIAL_DELAY_MAX)
                + rng.gen_range(MOVE_TIME_MIN..MOVE_TIME_MAX);
            return None;
        }
        if now < state.next_move_secs {
            return None;
        }

        state.next_move_secs = now
            + (rng.gen_range(SPEED_TIME_MIN..SPEED_TIME_MAX) / state.speed_multiplier)
                .max(MIN_MOVE_INTERVAL);
        if rng.gen_range(0.85..1.2) > 1.15 {
            state.next_move_secs += rng.gen_range(COOLDOWN_MIN..COOLDOWN_MAX) * 0.5;
        }

        if state.step_multiplier == 0.0 {
            state.step_multiplier = rng.gen_range(STEP_MULTIPLIER_MIN..STEP_MULTIPLIER_MAX);
        }

        let max_step =
            ((zone.size_x + zone.size_y) * MAX_STEP_PERCENT).min(MAX_STEP_ABSOLUTE);
        let step = (rng.gen_range(BASE_SPEED_MIN..BASE_SPEED_MAX)
            * state.step_multiplier
            * rng.gen_range(0.85..1.2))
        .clamp(MIN_MOVE_DISTANCE * 0.75, max_step);
        if step < MIN_MOVE_DISTANCE {
            return None;
        }

        let border_threshold = bounds.size_x.max(bounds.size_y) * BORDER_THRESHOLD_PERCENT;
        let at_border = bounds.border_distance_xy(mob.position.x, mob.position.y) < border_threshold;

        let mut dir_x = state.dir_x;
        let mut dir_y = state.dir_y;
        let mut found = false;
        let mut last_angle = 0.0f32;

        for _ in 0..MAX_DIRECTION_RETRIES {
            let angle = if at_border {
                let to_center = (zone.center_y - mob.position.y)
                    .atan2(zone.center_x - mob.position.x);
                to_center
                    + rng.gen_range(BORDER_ANGLE_MIN_DEG..BORDER_ANGLE_MAX_DEG).to_radians()
            } else {
                rng.gen_range(0.0f32..360.0).to_radians()
            };
            last_angle = angle;

            let try_x = mob.position.x + angle.cos() * step;
            let try_y = mob.position.y + angle.sin() * step;
            if bounds.contains_xy(try_x, try_y) && !collides(try_x, try_y, mob.uid, others) {
                dir_x = angle.cos();
                dir_y = angle.sin();
                found = true;
                break;
            }
        }

        if !found {
            let blend = rng.gen_range(DIRECTION_ADJUST_MIN..DIRECTION_ADJUST_MAX);
            dir_x = last_angle.cos() * blend + state.dir_x * (1.0 - blend);
            dir_y = last_angle.sin() * blend + state.dir_y * (1.0 - blend);
        }

        let (x, y) = bounds.clamp_xy(
            mob.position.x + dir_x * step,
            mob.position.y + dir_y * step,
        );
        if collides(x, y, mob.uid, others) {
            return None;
        }

        state.dir_x = dir_x;
        state.dir_y = dir_y;

        let mut position = mob.position;
        position.x = x;
        position.y = y;
        position.rot_z = dir_y.atan2(dir_x).to_degrees()
            + rng.gen_range(-ROTATION_JITTER_DEG..ROTATION_JITTER_DEG);
        Some(position)
    }
}

fn collides(x: f32, y: f32, own_uid: i64, others: &[MobInstance]) -> bool {
    others.iter().any(|other| {
        other.uid != own_uid && {
            let dx = x - other.position.x;
            let dy = y - other.position.y;
            (dx * dx + dy * dy).sqrt() < MIN_SEPARATION_DISTANCE
        }
    })
}

fn best_attack_range(mob: &MobInstance) -> f32 {
    mob.skills
        .iter()
        .map(|s| s.world_range())
        .fold(0.0f32, f32::max)
        .max(FALLBACK_ATTACK_RANGE)
}

fn angle_degrees(from: &Position, to: &Position) -> f32 {
    (to.y - from.y).atan2(to.x - from.x).to_degrees()
}
