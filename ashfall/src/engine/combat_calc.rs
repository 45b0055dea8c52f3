use rand::Rng;

use ashfall_core::attribute::{attribute_value, Attribute};
use ashfall_core::skill::{Skill, SkillSchool};

/// Mobs skip the accuracy/evasion math and use flat roll chances.
const MOB_MISS_CHANCE: f64 = 0.05;
const MOB_CRIT_CHANCE: f64 = 0.15;

/// Defense mitigation caps at 75% no matter how stacked the target is.
const MAX_DEFENSE_REDUCTION: f64 = 0.75;

/// One resolved hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DamageResult {
    pub base_damage: i32,
    pub scaled_damage: i32,
    pub total_damage: i32,
    pub is_critical: bool,
    pub is_blocked: bool,
    pub is_missed: bool,
}

/// Player-sourced hit. Accuracy vs evasion decides the miss; crit, block
/// and school defense apply in that order.
pub fn calculate_skill_damage(
    skill: &Skill,
    attacker: &[Attribute],
    target: &[Attribute],
    rng: &mut impl Rng,
) -> DamageResult {
    let mut result = DamageResult::default();

    let accuracy = attribute_value(attacker, "accuracy");
    let evasion = attribute_value(target, "evasion");
    let hit_chance = (0.95 + f64::from(accuracy - evasion) * 0.01).clamp(0.05, 0.95);
    if rng.gen::<f64>() >= hit_chance {
        result.is_missed = true;
        return result;
    }

    result.base_damage = base_damage(skill, attacker);

    if rng.gen::<f64>() < f64::from(attribute_value(attacker, "crit_chance")) / 100.0 {
        result.is_critical = true;
        let mut multiplier = f64::from(attribute_value(attacker, "crit_multiplier")) / 100.0;
        if multiplier == 0.0 {
            multiplier = 2.0;
        }
        result.scaled_damage = (f64::from(result.base_damage) * multiplier) as i32;
    } else {
        result.scaled_damage = result.base_damage;
    }

    apply_block_and_defense(&mut result, skill.school, target, rng);
    result
}

/// Mob-sourced hit: flat 5% miss, flat 15% crit at x2; block and defense
/// still come from the target's attributes.
pub fn calculate_mob_skill_damage(
    skill: &Skill,
    attacker: &[Attribute],
    target: &[Attribute],
    rng: &mut impl Rng,
) -> DamageResult {
    let mut result = DamageResult::default();

    if rng.gen::<f64>() < MOB_MISS_CHANCE {
        result.is_missed = true;
        return result;
    }

    result.base_damage = base_damage(skill, attacker);

    if rng.gen::<f64>() < MOB_CRIT_CHANCE {
        result.is_critical = true;
        result.scaled_damage = result.base_damage * 2;
    } else {
        result.scaled_damage = result.base_damage;
    }

    apply_block_and_defense(&mut result, skill.school, target, rng);
    result
}

/// Healing has no miss/crit/defense pipeline; the scaled base is the heal.
pub fn calculate_heal_amount(skill: &Skill, caster: &[Attribute]) -> i32 {
    base_damage(skill, caster)
}

fn base_damage(skill: &Skill, attacker: &[Attribute]) -> i32 {
    let scale_value = attribute_value(attacker, &skill.scale_stat);
    let damage = skill.flat_add + (scale_value as f32 * skill.coeff) as i32;
    damage.max(1)
}

fn apply_block_and_defense(
    result: &mut DamageResult,
    school: SkillSchool,
    target: &[Attribute],
    rng: &mut impl Rng,
) {
    if rng.gen::<f64>() < f64::from(attribute_value(target, "block_chance")) / 100.0 {
        result.is_blocked = true;
        let block_value = attribute_value(target, "block_value");
        result.scaled_damage = (result.scaled_damage - block_value).max(0);
    }

    let defense = attribute_value(target, school.defense_slug());
    let reduction = (f64::from(defense) * 0.01).clamp(0.0, MAX_DEFENSE_REDUCTION);
    result.total_damage =
        ((f64::from(result.scaled_damage) * (1.0 - reduction)).round() as i32).max(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ashfall_core::skill::SkillEffectType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn basic_attack() -> Skill {
        Skill {
            slug: "basic_attack".into(),
            name: "Basic Attack".into(),
            cast_ms: 0,
            cooldown_ms: 1000,
            gcd_ms: 1000,
            cost_mp: 10,
            max_range: 5.0,
            coeff: 1.0,
            flat_add: 5,
            scale_stat: "strength".into(),
            effect_type: SkillEffectType::Damage,
            school: SkillSchool::Physical,
        }
    }

    fn attrs(pairs: &[(&str, i32)]) -> Vec<Attribute> {
        pairs.iter().map(|(s, v)| Attribute::new(*s, *v)).collect()
    }

    #[test]
    fn base_damage_formula() {
        let attacker = attrs(&[("strength", 100)]);
        // 5 + 100 * 1.0 = 105.
        assert_eq!(base_damage(&basic_attack(), &attacker), 105);

        // Degenerate stats still deal at least 1.
        let weakling = attrs(&[("strength", -500)]);
        assert_eq!(base_damage(&basic_attack(), &weakling), 1);
    }

    #[test]
    fn undefended_hit_deals_full_damage() {
        let attacker = attrs(&[("strength", 100), ("accuracy", 50)]);
        let target = attrs(&[("physical_defense", 0)]);
        let mut rng = StdRng::seed_from_u64(7);

        let mut saw_plain_hit = false;
        for _ in 0..64 {
            let result = calculate_skill_damage(&basic_attack(), &attacker, &target, &mut rng);
            if !result.is_missed && !result.is_critical && !result.is_blocked {
                assert_eq!(result.total_damage, 105);
                saw_plain_hit = true;
            }
        }
        assert!(saw_plain_hit);
    }

    #[test]
    fn defense_reduction_caps_at_three_quarters() {
        let attacker = attrs(&[("strength", 100), ("accuracy", 100)]);
        let fortress = attrs(&[("physical_defense", 10_000)]);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..64 {
            let result = calculate_skill_damage(&basic_attack(), &attacker, &fortress, &mut rng);
            if !result.is_missed && !result.is_critical {
                // 105 * 0.25 = 26.25 -> 26.
                assert_eq!(result.total_damage, 26);
                return;
            }
        }
        panic!("no plain hit in 64 rolls");
    }

    #[test]
    fn guaranteed_crit_doubles_by_default() {
        let attacker = attrs(&[("strength", 100), ("accuracy", 100), ("crit_chance", 100)]);
        let target = attrs(&[]);
        let mut rng = StdRng::seed_from_u64(1);

        let result = calculate_skill_damage(&basic_attack(), &attacker, &target, &mut rng);
        if !result.is_missed {
            assert!(result.is_critical);
            assert_eq!(result.scaled_damage, 210);
        }
    }

    #[test]
    fn hopeless_attacker_still_hits_sometimes() {
        // Evasion 200 over accuracy 0 pins the hit chance at the 5% floor.
        let attacker = attrs(&[("strength", 10)]);
        let target = attrs(&[("evasion", 200)]);
        let mut rng = StdRng::seed_from_u64(99);

        let hits = (0..2000)
            .filter(|_| {
                !calculate_skill_damage(&basic_attack(), &attacker, &target, &mut rng).is_missed
            })
            .count();
        assert!(hits > 0 && hits < 400, "hits = {hits}");
    }

    #[test]
    fn block_subtracts_block_value() {
        let attacker = attrs(&[("strength", 100), ("accuracy", 100)]);
        let blocker = attrs(&[("block_chance", 100), ("block_value", 25)]);
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..64 {
            let result = calculate_skill_damage(&basic_attack(), &attacker, &blocker, &mut rng);
            if !result.is_missed && !result.is_critical {
                assert!(result.is_blocked);
                // 105 - 25 = 80, no defense.
                assert_eq!(result.total_damage, 80);
                return;
            }
        }
        panic!("no plain blocked hit in 64 rolls");
    }

    #[test]
    fn mob_damage_uses_flat_rates() {
        let attacker = attrs(&[("strength", 50)]);
        let target = attrs(&[]);
        let mut rng = StdRng::seed_from_u64(11);

        let mut misses = 0;
        let mut crits = 0;
        for _ in 0..2000 {
            let result = calculate_mob_skill_damage(&basic_attack(), &attacker, &target, &mut rng);
            if result.is_missed {
                misses += 1;
            } else if result.is_critical {
                assert_eq!(result.scaled_damage, result.base_damage * 2);
                crits += 1;
            }
        }
        // 5% miss and ~15% crit with generous tolerances.
        assert!((50..250).contains(&misses), "misses = {misses}");
        assert!((150..450).contains(&crits), "crits = {crits}");
    }
}
