use serde_json::json;

use ashfall_core::character::CharacterData;
use ashfall_protocol::wire;
use ashfall_registry::MAX_LEVEL;

use crate::net::send;
use crate::services::GameServices;

const LEVEL_UP_HEALTH_BONUS: i32 = 10;
const LEVEL_UP_MANA_BONUS: i32 = 5;
const DEATH_PENALTY_PERCENT: f64 = 0.10;
/// Characters unlock a new ability every this many levels.
const ABILITY_LEVEL_STRIDE: i32 = 5;

/// What one grant did to the character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperienceGrant {
    pub character_id: i32,
    pub old_exp: i32,
    pub new_exp: i32,
    pub old_level: i32,
    pub new_level: i32,
    pub unlocked_ability_levels: Vec<i32>,
}

/// Apply an experience delta, re-derive the level, roll level-up bonuses
/// into the character, and push the update broadcasts. Negative deltas
/// (death penalties) floor at zero experience.
pub fn grant(
    services: &GameServices,
    character_id: i32,
    delta: i32,
    reason: &str,
    source_id: i64,
) -> Option<ExperienceGrant> {
    let character = services.characters.get(character_id)?;

    let old_exp = character.current_exp;
    let old_level = character.level;

    let mut new_exp = i64::from(old_exp).saturating_add(i64::from(delta)).max(0);
    let mut new_level = services.exp_table.level_from_exp(new_exp);
    if new_level >= MAX_LEVEL {
        new_level = MAX_LEVEL;
        new_exp = services.exp_table.exp_for_level(MAX_LEVEL);
    }
    let new_exp = new_exp.min(i64::from(i32::MAX)) as i32;

    let gained_levels = (new_level - old_level).max(0);
    let unlocked_ability_levels: Vec<i32> = ((old_level + 1)..=new_level)
        .filter(|level| level % ABILITY_LEVEL_STRIDE == 0)
        .collect();

    let exp_for_next = services
        .exp_table
        .exp_for_level((new_level + 1).min(MAX_LEVEL))
        .min(i64::from(i32::MAX)) as i32;

    services.characters.mutate(character_id, |c| {
        c.current_exp = new_exp;
        c.level = new_level;
        c.exp_for_next_level = exp_for_next;
        if gained_levels > 0 {
            c.max_health += LEVEL_UP_HEALTH_BONUS * gained_levels;
            c.max_mana += LEVEL_UP_MANA_BONUS * gained_levels;
            c.current_health = c.max_health;
            c.current_mana = c.max_mana;
        }
    });

    log::info!(
        "character {character_id} {reason}: {delta:+} exp ({old_exp} -> {new_exp}), level {old_level} -> {new_level}"
    );

    let line = send::broadcast_line(
        "experience_update",
        json!({
            "characterId": character_id,
            "exp": new_exp,
            "delta": delta,
            "expForNextLevel": exp_for_next,
            "reason": reason,
            "sourceId": source_id,
        }),
    );
    send::broadcast(services, &line);

    if gained_levels > 0 {
        let line = send::broadcast_line(
            "levelUp",
            json!({
                "characterId": character_id,
                "oldLevel": old_level,
                "newLevel": new_level,
                "newAbilityLevels": unlocked_ability_levels,
            }),
        );
        send::broadcast(services, &line);
        broadcast_stats(services, character_id);
    }

    Some(ExperienceGrant {
        character_id,
        old_exp,
        new_exp,
        old_level,
        new_level,
        unlocked_ability_levels,
    })
}

/// Push the character's full stat block to everyone; sent after any
/// mutation that changes the visible sheet (level, attributes).
pub fn broadcast_stats(services: &GameServices, character_id: i32) {
    if let Some(character) = services.characters.get(character_id) {
        let line = send::broadcast_line(
            "stats_update",
            json!({"character": wire::character(&character)}),
        );
        send::broadcast(services, &line);
    }
}

/// Kill reward scaled by the level gap. Gray kills pay a tenth; red kills
/// pay double.
pub fn calculate_mob_experience(mob_level: i32, character_level: i32, base_exp: i32) -> i32 {
    let difference = mob_level - character_level;
    let modifier = if difference < -5 {
        0.1
    } else if difference < -2 {
        0.5
    } else if difference <= 2 {
        1.0
    } else if difference <= 5 {
        1.5
    } else {
        2.0
    };
    (f64::from(base_exp) * modifier) as i32
}

/// Ten percent of current experience, never dipping below the previous
/// level's threshold.
pub fn calculate_death_penalty(services: &GameServices, character: &CharacterData) -> i32 {
    let current = i64::from(character.current_exp);
    let penalty = (current as f64 * DEATH_PENALTY_PERCENT) as i64;
    let floor = services.exp_table.exp_for_level(character.level - 1);
    let max_penalty = (current - floor).max(0);
    penalty.min(max_penalty).max(0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_services;

    fn resident_character(services: &GameServices, exp: i32, level: i32) {
        services.characters.insert(CharacterData {
            character_id: 1,
            level,
            current_exp: exp,
            max_health: 100,
            current_health: 60,
            max_mana: 50,
            current_mana: 10,
            ..Default::default()
        });
    }

    #[test]
    fn grant_levels_up_with_bonuses() {
        let services = test_services();
        resident_character(&services, 0, 1);

        // Fallback curve: level 2 at 100, level 3 at 220.
        let grant = grant(&services, 1, 230, "mob_kill", 9).unwrap();
        assert_eq!(grant.old_level, 1);
        assert_eq!(grant.new_level, 3);

        let character = services.characters.get(1).unwrap();
        assert_eq!(character.level, 3);
        assert_eq!(character.max_health, 120);
        assert_eq!(character.max_mana, 60);
        assert_eq!(character.current_health, 120);
        assert_eq!(character.current_mana, 60);
    }

    #[test]
    fn ability_unlocks_land_on_stride_levels() {
        let services = test_services();
        resident_character(&services, 0, 3);

        let enough_for_level_11 = services.exp_table.exp_for_level(11) as i32;
        let grant = grant(&services, 1, enough_for_level_11, "quest", 0).unwrap();
        assert_eq!(grant.new_level, 11);
        assert_eq!(grant.unlocked_ability_levels, vec![5, 10]);
    }

    #[test]
    fn negative_delta_floors_at_zero() {
        let services = test_services();
        resident_character(&services, 50, 1);

        let grant = grant(&services, 1, -500, "death_penalty", 0).unwrap();
        assert_eq!(grant.new_exp, 0);
        assert_eq!(grant.new_level, 1);
    }

    #[test]
    fn level_is_capped_at_max() {
        let services = test_services();
        resident_character(&services, 0, 99);

        let grant = grant(&services, 1, i32::MAX, "gm_command", 0).unwrap();
        assert_eq!(grant.new_level, MAX_LEVEL);
        // The stored value saturates at the i32 ceiling when the curve's
        // cumulative requirement exceeds it.
        let expected = services
            .exp_table
            .exp_for_level(MAX_LEVEL)
            .min(i64::from(i32::MAX));
        assert_eq!(i64::from(grant.new_exp), expected);
    }

    #[test]
    fn mob_experience_modifier_bands() {
        assert_eq!(calculate_mob_experience(1, 10, 100), 10);
        assert_eq!(calculate_mob_experience(6, 10, 100), 50);
        assert_eq!(calculate_mob_experience(10, 10, 100), 100);
        assert_eq!(calculate_mob_experience(14, 10, 100), 150);
        assert_eq!(calculate_mob_experience(20, 10, 100), 200);
    }

    #[test]
    fn death_penalty_respects_level_floor() {
        let services = test_services();
        // Level 2 starts at 100 on the fallback curve.
        let character = CharacterData {
            character_id: 1,
            level: 2,
            current_exp: 105,
            ..Default::default()
        };
        // 10% of 105 is 10 (integer), and 105 - 100 = 5 caps it at 5... the
        // floor is expForLevel(level-1) = 0, so the cap is 105.
        let penalty = calculate_death_penalty(&services, &character);
        assert_eq!(penalty, 10);

        let rich = CharacterData {
            character_id: 1,
            level: 3,
            current_exp: 225,
            ..Default::default()
        };
        // floor = expForLevel(2) = 100; 10% of 225 = 22; cap = 125.
        assert_eq!(calculate_death_penalty(&services, &rich), 22);
    }
}
