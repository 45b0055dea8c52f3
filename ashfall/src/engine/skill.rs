use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::json;
use thiserror::Error;

use ashfall_core::attribute::Attribute;
use ashfall_core::math::Position;
use ashfall_core::skill::{find_skill, Skill, SkillEffectType};
use ashfall_protocol::client::TargetType;

use crate::engine::combat_calc::{
    calculate_heal_amount, calculate_mob_skill_damage, calculate_skill_damage, DamageResult,
};
use crate::engine::experience;
use crate::event::{Event, EventKind, EventPayload};
use crate::net::send;
use crate::services::GameServices;

/// Either side of a combat action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Caster {
    Player(i32),
    Mob(i64),
}

impl Caster {
    pub fn id(&self) -> i64 {
        match self {
            Self::Player(id) => i64::from(*id),
            Self::Mob(uid) => *uid,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Player(_) => "PLAYER",
            Self::Mob(_) => "MOB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Initiated,
    Casting,
    Executing,
    Completed,
    Interrupted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    PlayerCancelled,
    Movement,
    DamageTaken,
    TargetLost,
    ResourceDepleted,
    Death,
    StunEffect,
}

impl InterruptReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlayerCancelled => "PLAYER_CANCELLED",
            Self::Movement => "MOVEMENT",
            Self::DamageTaken => "DAMAGE_TAKEN",
            Self::TargetLost => "TARGET_LOST",
            Self::ResourceDepleted => "RESOURCE_DEPLETED",
            Self::Death => "DEATH",
            Self::StunEffect => "STUN_EFFECT",
        }
    }
}

/// A cast or channel in flight. At most one per caster, enforced by the
/// single-entry map below.
#[derive(Debug, Clone, PartialEq)]
pub struct OngoingAction {
    pub caster: Caster,
    pub skill_slug: String,
    pub target_id: i64,
    pub target_type: TargetType,
    pub start_ms: u64,
    pub end_ms: u64,
    pub state: ActionState,
    pub interrupt_reason: Option<InterruptReason>,
}

#[derive(Debug, Error, PartialEq)]
pub enum CombatError {
    #[error("caster not found")]
    CasterNotFound,
    #[error("skill {0} is not known to the caster")]
    SkillNotKnown(String),
    #[error("skill {0} is on cooldown for {1} ms")]
    OnCooldown(String, u64),
    #[error("not enough mana: need {required}, have {available}")]
    NotEnoughMana { required: i32, available: i32 },
    #[error("target {0} not found")]
    TargetNotFound(i64),
    #[error("target {0} is dead")]
    TargetDead(i64),
    #[error("target does not match the requested target type")]
    InvalidTarget,
    #[error("target out of range: {distance:.0} > {max:.0}")]
    OutOfRange { distance: f32, max: f32 },
    #[error("caster already has an action in flight")]
    AlreadyCasting,
}

impl CombatError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CasterNotFound => "CASTER_NOT_FOUND",
            Self::SkillNotKnown(_) => "SKILL_NOT_KNOWN",
            Self::OnCooldown(..) => "SKILL_ON_COOLDOWN",
            Self::NotEnoughMana { .. } => "NOT_ENOUGH_MANA",
            Self::TargetNotFound(_) => "TARGET_NOT_FOUND",
            Self::TargetDead(_) => "TARGET_DEAD",
            Self::InvalidTarget => "INVALID_TARGET",
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::AlreadyCasting => "ALREADY_CASTING",
        }
    }
}

/// What `initiate_skill` produced: an instant skill resolves inline and
/// carries its outcome; a timed cast leaves execution to the ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct InitiationResult {
    pub cast_ms: u64,
    pub outcome: Option<ExecutionOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExecutionOutcome {
    pub damage: DamageResult,
    pub heal: i32,
    pub target_health: i32,
    pub target_died: bool,
}

struct CasterSnapshot {
    position: Position,
    attributes: Vec<Attribute>,
    skills: Vec<Skill>,
    current_mana: i32,
    alive: bool,
}

struct TargetSnapshot {
    position: Position,
    attributes: Vec<Attribute>,
    alive: bool,
}

/// Ongoing actions and skill cooldowns for every caster in the chunk.
#[derive(Default)]
pub struct SkillEngine {
    ongoing: RwLock<HashMap<Caster, OngoingAction>>,
    // caster -> skill slug -> monotonic ms the skill is ready again at
    cooldowns: RwLock<HashMap<Caster, HashMap<String, u64>>>,
}

impl SkillEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and start a skill use. Instant skills resolve inline;
    /// timed casts are recorded and resolved by `update_ongoing_actions`.
    pub fn initiate_skill(
        &self,
        services: &GameServices,
        caster: Caster,
        skill_slug: &str,
        target_id: i64,
        target_type: TargetType,
    ) -> Result<InitiationResult, CombatError> {
        let snapshot = resolve_caster(services, caster).ok_or(CombatError::CasterNotFound)?;
        if !snapshot.alive {
            return Err(CombatError::CasterNotFound);
        }

        let skill = find_skill(&snapshot.skills, skill_slug)
            .cloned()
            .ok_or_else(|| CombatError::SkillNotKnown(skill_slug.to_owned()))?;

        let now = services.clock.now_ms();
        let ready_at = self.cooldown_ready_at(caster, skill_slug);
        if ready_at > now {
            return Err(CombatError::OnCooldown(
                skill_slug.to_owned(),
                ready_at - now,
            ));
        }

        if snapshot.current_mana < skill.cost_mp {
            return Err(CombatError::NotEnoughMana {
                required: skill.cost_mp,
                available: snapshot.current_mana,
            });
        }

        let target = resolve_target(services, caster, target_id, target_type)?;
        if !target.alive {
            return Err(CombatError::TargetDead(target_id));
        }

        let distance = snapshot.position.distance_xy(&target.position);
        if distance > skill.world_range() {
            return Err(CombatError::OutOfRange {
                distance,
                max: skill.world_range(),
            });
        }

        let action = OngoingAction {
            caster,
            skill_slug: skill.slug.clone(),
            target_id,
            target_type,
            start_ms: now,
            end_ms: now + skill.cast_ms,
            state: if skill.is_instant() {
                ActionState::Executing
            } else {
                ActionState::Casting
            },
            interrupt_reason: None,
        };

        {
            let mut ongoing = self.ongoing.write();
            let blocked = ongoing
                .get(&caster)
                .is_some_and(|existing| existing.state != ActionState::Completed);
            if blocked {
                return Err(CombatError::AlreadyCasting);
            }
            ongoing.insert(caster, action.clone());
        }

        self.broadcast_initiation(services, &action, &skill);

        if skill.is_instant() {
            let outcome = self.execute_action(services, action);
            Ok(InitiationResult {
                cast_ms: 0,
                outcome,
            })
        } else {
            Ok(InitiationResult {
                cast_ms: skill.cast_ms,
                outcome: None,
            })
        }
    }

    /// Resolve a cast that reached its end time (or an instant one).
    /// Returns `None` when the world changed under the cast and it was
    /// interrupted instead of executed.
    fn execute_action(
        &self,
        services: &GameServices,
        action: OngoingAction,
    ) -> Option<ExecutionOutcome> {
        let caster = action.caster;
        let Some(snapshot) = resolve_caster(services, caster) else {
            self.interrupt(services, caster, InterruptReason::Death);
            return None;
        };
        let Some(skill) = find_skill(&snapshot.skills, &action.skill_slug).cloned() else {
            self.interrupt(services, caster, InterruptReason::TargetLost);
            return None;
        };
        if snapshot.current_mana < skill.cost_mp {
            self.interrupt(services, caster, InterruptReason::ResourceDepleted);
            return None;
        }
        let target = match resolve_target(services, caster, action.target_id, action.target_type) {
            Ok(target) if target.alive => target,
            _ => {
                self.interrupt(services, caster, InterruptReason::TargetLost);
                return None;
            }
        };

        deduct_mana(services, caster, skill.cost_mp);

        let mut outcome = ExecutionOutcome::default();
        let mut rng = rand::thread_rng();
        match skill.effect_type {
            SkillEffectType::Heal => {
                outcome.heal = calculate_heal_amount(&skill, &snapshot.attributes);
                outcome.target_health = apply_heal(
                    services,
                    caster,
                    action.target_id,
                    action.target_type,
                    outcome.heal,
                );
            }
            // Buffs and debuffs resolve as zero-damage hits until the
            // aura system lands upstream.
            SkillEffectType::Damage | SkillEffectType::Buff | SkillEffectType::Debuff => {
                outcome.damage = match caster {
                    Caster::Player(_) => calculate_skill_damage(
                        &skill,
                        &snapshot.attributes,
                        &target.attributes,
                        &mut rng,
                    ),
                    Caster::Mob(_) => calculate_mob_skill_damage(
                        &skill,
                        &snapshot.attributes,
                        &target.attributes,
                        &mut rng,
                    ),
                };
                if !outcome.damage.is_missed {
                    let (health, died) = apply_damage(
                        services,
                        caster,
                        action.target_id,
                        action.target_type,
                        outcome.damage.total_damage,
                    );
                    outcome.target_health = health;
                    outcome.target_died = died;
                }
            }
        }

        let now = services.clock.now_ms();
        self.cooldowns
            .write()
            .entry(caster)
            .or_default()
            .insert(skill.slug.clone(), now + skill.cooldown_ms);

        self.ongoing.write().remove(&caster);

        self.broadcast_result(services, &action, &skill, &outcome);
        Some(outcome)
    }

    /// Mark and erase the caster's in-flight action, if any.
    pub fn interrupt(
        &self,
        services: &GameServices,
        caster: Caster,
        reason: InterruptReason,
    ) -> Option<OngoingAction> {
        let mut action = self.ongoing.write().remove(&caster)?;
        action.state = ActionState::Interrupted;
        action.interrupt_reason = Some(reason);
        log::debug!(
            "interrupted {:?} action {} ({})",
            caster,
            action.skill_slug,
            reason.as_str()
        );

        let line = send::broadcast_line(
            "combatAnimation",
            json!({
                "casterId": caster.id(),
                "casterType": caster.kind_str(),
                "animation": "interrupt",
                "skillSlug": action.skill_slug,
                "reason": reason.as_str(),
            }),
        );
        send::broadcast(services, &line);
        Some(action)
    }

    /// Scheduler pulse: finish casts whose timer elapsed.
    pub fn update_ongoing_actions(&self, services: &GameServices) {
        let now = services.clock.now_ms();
        let due: Vec<OngoingAction> = {
            let mut ongoing = self.ongoing.write();
            ongoing
                .values_mut()
                .filter(|action| action.state == ActionState::Casting && now >= action.end_ms)
                .map(|action| {
                    action.state = ActionState::Executing;
                    action.clone()
                })
                .collect()
        };

        for action in due {
            self.execute_action(services, action);
        }
    }

    /// Scheduler pulse: drop expired cooldown rows so the maps stay small.
    pub fn update_cooldowns(&self, services: &GameServices) {
        let now = services.clock.now_ms();
        let mut cooldowns = self.cooldowns.write();
        for per_caster in cooldowns.values_mut() {
            per_caster.retain(|_, ready_at| *ready_at > now);
        }
        cooldowns.retain(|_, per_caster| !per_caster.is_empty());
    }

    pub fn cooldown_ready_at(&self, caster: Caster, skill_slug: &str) -> u64 {
        self.cooldowns
            .read()
            .get(&caster)
            .and_then(|per_caster| per_caster.get(skill_slug))
            .copied()
            .unwrap_or(0)
    }

    pub fn ongoing_action(&self, caster: Caster) -> Option<OngoingAction> {
        self.ongoing.read().get(&caster).cloned()
    }

    /// Forget a caster entirely (death, despawn, disconnect).
    pub fn forget_caster(&self, caster: Caster) {
        self.ongoing.write().remove(&caster);
        self.cooldowns.write().remove(&caster);
    }

    /// Mob AI swing: pick the best usable damage skill and fire it through
    /// the same initiate path a player uses. AI favors instant skills;
    /// anything with a cast time resolves through the ticker like any cast.
    pub fn process_ai_attack(
        &self,
        services: &GameServices,
        mob_uid: i64,
        target_character_id: i32,
    ) -> bool {
        let caster = Caster::Mob(mob_uid);
        let Some(mob) = services.mobs.get(mob_uid) else {
            return false;
        };
        let Some(target) = services.characters.get(target_character_id) else {
            return false;
        };
        if !mob.is_alive() || !target.is_alive() {
            return false;
        }
        if self.ongoing_action(caster).is_some() {
            return false;
        }

        let distance = mob.position.distance_xy(&target.position);
        let now = services.clock.now_ms();
        let best = mob
            .skills
            .iter()
            .filter(|skill| skill.effect_type == SkillEffectType::Damage)
            .filter(|skill| skill.cost_mp <= mob.current_mana)
            .filter(|skill| skill.world_range() >= distance)
            .filter(|skill| self.cooldown_ready_at(caster, &skill.slug) <= now)
            .max_by(|a, b| {
                let score =
                    |s: &Skill| s.coeff * 1000.0 - s.cooldown_ms as f32 * 0.1;
                score(a).total_cmp(&score(b))
            })
            .cloned();

        let Some(skill) = best else {
            return false;
        };

        match self.initiate_skill(
            services,
            caster,
            &skill.slug,
            i64::from(target_character_id),
            TargetType::Player,
        ) {
            Ok(_) => true,
            Err(err) => {
                log::debug!("mob {mob_uid} attack with {} failed: {err}", skill.slug);
                false
            }
        }
    }

    fn broadcast_initiation(&self, services: &GameServices, action: &OngoingAction, skill: &Skill) {
        let event_type = format!("{}Initiation", skill.effect_type.as_str());
        let line = send::broadcast_line(
            &event_type,
            json!({
                "casterId": action.caster.id(),
                "casterType": action.caster.kind_str(),
                "targetId": action.target_id,
                "targetType": action.target_type.as_str(),
                "skillSlug": skill.slug,
                "castTime": skill.cast_ms,
                "animation": skill.slug,
            }),
        );
        send::broadcast(services, &line);
    }

    fn broadcast_result(
        &self,
        services: &GameServices,
        action: &OngoingAction,
        skill: &Skill,
        outcome: &ExecutionOutcome,
    ) {
        let caster_mana = match action.caster {
            Caster::Player(id) => services
                .characters
                .get(id)
                .map_or(0, |c| c.current_mana),
            Caster::Mob(uid) => services.mobs.get(uid).map_or(0, |m| m.current_mana),
        };

        let event_type = format!("{}Result", skill.effect_type.as_str());
        let line = send::broadcast_line(
            &event_type,
            json!({
                "casterId": action.caster.id(),
                "casterType": action.caster.kind_str(),
                "targetId": action.target_id,
                "targetType": action.target_type.as_str(),
                "skillSlug": skill.slug,
                "damage": outcome.damage.total_damage,
                "heal": outcome.heal,
                "isCritical": outcome.damage.is_critical,
                "isBlocked": outcome.damage.is_blocked,
                "isMissed": outcome.damage.is_missed,
                "targetHealth": outcome.target_health,
                "casterMana": caster_mana,
                "targetDied": outcome.target_died,
            }),
        );
        send::broadcast(services, &line);
    }
}

fn resolve_caster(services: &GameServices, caster: Caster) -> Option<CasterSnapshot> {
    match caster {
        Caster::Player(id) => services.characters.get(id).map(|c| CasterSnapshot {
            position: c.position,
            alive: c.is_alive(),
            current_mana: c.current_mana,
            attributes: c.attributes,
            skills: c.skills,
        }),
        Caster::Mob(uid) => services.mobs.get(uid).map(|m| CasterSnapshot {
            position: m.position,
            alive: m.is_alive(),
            current_mana: m.current_mana,
            attributes: m.attributes,
            skills: m.skills,
        }),
    }
}

fn resolve_target(
    services: &GameServices,
    caster: Caster,
    target_id: i64,
    target_type: TargetType,
) -> Result<TargetSnapshot, CombatError> {
    match target_type {
        TargetType::Mob => {
            let mob = services
                .mobs
                .get(target_id)
                .ok_or(CombatError::TargetNotFound(target_id))?;
            Ok(TargetSnapshot {
                position: mob.position,
                alive: mob.is_alive(),
                attributes: mob.attributes,
            })
        }
        TargetType::Player => {
            let character = services
                .characters
                .get(target_id as i32)
                .ok_or(CombatError::TargetNotFound(target_id))?;
            Ok(TargetSnapshot {
                position: character.position,
                alive: character.is_alive(),
                attributes: character.attributes,
            })
        }
        TargetType::SelfTarget => {
            if caster.id() != target_id {
                return Err(CombatError::InvalidTarget);
            }
            let snapshot =
                resolve_caster(services, caster).ok_or(CombatError::TargetNotFound(target_id))?;
            Ok(TargetSnapshot {
                position: snapshot.position,
                alive: snapshot.alive,
                attributes: snapshot.attributes,
            })
        }
    }
}

fn deduct_mana(services: &GameServices, caster: Caster, cost: i32) {
    match caster {
        Caster::Player(id) => {
            services.characters.mutate(id, |c| {
                c.current_mana = c.clamped_mana(c.current_mana - cost);
            });
        }
        Caster::Mob(uid) => {
            if let Some(mob) = services.mobs.get(uid) {
                let _ = services.mobs.update_mana(uid, mob.current_mana - cost);
            }
        }
    }
}

fn apply_heal(
    services: &GameServices,
    caster: Caster,
    target_id: i64,
    target_type: TargetType,
    amount: i32,
) -> i32 {
    // Self-targets resolve to whatever kind the caster is.
    let target_is_mob = match target_type {
        TargetType::Mob => true,
        TargetType::Player => false,
        TargetType::SelfTarget => matches!(caster, Caster::Mob(_)),
    };

    if target_is_mob {
        if let Some(mob) = services.mobs.get(target_id) {
            let healed = (mob.current_health + amount).min(mob.max_health);
            services.mobs.update_health(target_id, healed);
            healed
        } else {
            0
        }
    } else {
        let id = target_id as i32;
        let mut health = 0;
        services.characters.mutate(id, |c| {
            c.current_health = c.clamped_health(c.current_health + amount);
            health = c.current_health;
        });
        health
    }
}

/// Apply damage and run the death flow. Returns `(new health, died)`.
fn apply_damage(
    services: &GameServices,
    caster: Caster,
    target_id: i64,
    target_type: TargetType,
    damage: i32,
) -> (i32, bool) {
    let target_is_mob = match target_type {
        TargetType::Mob => true,
        TargetType::Player => false,
        TargetType::SelfTarget => matches!(caster, Caster::Mob(_)),
    };
    if target_is_mob {
        let Some(mob) = services.mobs.get(target_id) else {
            return (0, false);
        };
        let update = services
            .mobs
            .update_health(target_id, mob.current_health - damage);

        if let Caster::Player(attacker) = caster {
            services.movement.handle_mob_attacked(target_id, attacker);
        }

        if update.mob_died {
            handle_mob_death(services, target_id, caster);
        }
        let health = services
            .mobs
            .get(target_id)
            .map_or(0, |m| m.current_health);
        (health, update.mob_died)
    } else {
        let id = target_id as i32;
        let mut health = 0;
        let mut died = false;
        services.characters.mutate(id, |c| {
            c.current_health = c.clamped_health(c.current_health - damage);
            health = c.current_health;
            died = c.current_health == 0;
        });

        // A player casting while hit loses the cast.
        let target_caster = Caster::Player(id);
        if let Some(action) = services.skills.ongoing_action(target_caster) {
            if action.state == ActionState::Casting {
                services
                    .skills
                    .interrupt(services, target_caster, InterruptReason::DamageTaken);
            }
        }

        if died {
            handle_player_death(services, id);
        }
        (health, died)
    }
}

/// Everything a mob death triggers: population accounting, the harvest
/// corpse, ground loot, experience for a player killer, and removal of the
/// live instance.
fn handle_mob_death(services: &GameServices, mob_uid: i64, killer: Caster) {
    let Some(mob) = services.mobs.get(mob_uid) else {
        return;
    };
    log::info!("mob {} (uid {mob_uid}) died in zone {}", mob.name, mob.zone_id);

    services.zones.mob_died(mob.zone_id, mob_uid);
    services.movement.forget_mob(mob_uid);
    services.skills.forget_caster(Caster::Mob(mob_uid));

    let now = services.clock.now_secs();
    services
        .harvest
        .register_corpse(mob_uid, mob.mob_id, mob.position, now);

    let table = services.items.ground_loot_for_mob(mob.mob_id);
    let drops = services
        .loot
        .generate_loot_on_mob_death(mob_uid, mob.position, &table, now);
    if !drops.is_empty() {
        services.main_queue.push(Event::new(
            EventKind::ItemDrop,
            0,
            EventPayload::Drops(drops),
        ));
    }

    if let Caster::Player(character_id) = killer {
        if let Some(character) = services.characters.get(character_id) {
            let exp = experience::calculate_mob_experience(mob.level, character.level, mob.base_exp);
            if exp > 0 {
                experience::grant(services, character_id, exp, "mob_kill", mob_uid);
            }
        }
    }

    services.mobs.unregister(mob_uid);
}

fn handle_player_death(services: &GameServices, character_id: i32) {
    log::info!("character {character_id} died");
    services
        .skills
        .interrupt(services, Caster::Player(character_id), InterruptReason::Death);
    services.harvest.cancel_session(character_id);

    let penalty = services
        .characters
        .get(character_id)
        .map_or(0, |c| experience::calculate_death_penalty(services, &c));
    if penalty > 0 {
        experience::grant(services, character_id, -penalty, "death_penalty", 0);
    }

    let line = send::broadcast_line(
        "playerDeath",
        json!({"characterId": character_id, "expPenalty": penalty}),
    );
    send::broadcast(services, &line);
}
