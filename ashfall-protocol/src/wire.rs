//! JSON shapes for domain types as the client expects them. All builders
//! here produce `serde_json::Value` fragments; the response builder wraps
//! them into the outer envelope.

use serde_json::{json, Value};

use ashfall_core::attribute::Attribute;
use ashfall_core::character::CharacterData;
use ashfall_core::math::Position;
use ashfall_core::skill::Skill;
use ashfall_world::harvest::{CorpseLoot, HarvestCorpse};
use ashfall_world::loot::DroppedItem;
use ashfall_world::mob::MobInstance;
use ashfall_world::zone::SpawnZone;

pub fn position(position: &Position) -> Value {
    json!({
        "posX": position.x,
        "posY": position.y,
        "posZ": position.z,
        "rotZ": position.rot_z,
    })
}

pub fn attributes(attributes: &[Attribute]) -> Value {
    Value::Array(
        attributes
            .iter()
            .map(|a| json!({"slug": a.slug, "name": a.name, "value": a.value}))
            .collect(),
    )
}

pub fn skill(skill: &Skill) -> Value {
    json!({
        "slug": skill.slug,
        "name": skill.name,
        "castMs": skill.cast_ms,
        "cooldownMs": skill.cooldown_ms,
        "gcdMs": skill.gcd_ms,
        "costMp": skill.cost_mp,
        "maxRange": skill.max_range,
        "coeff": skill.coeff,
        "flatAdd": skill.flat_add,
        "scaleStat": skill.scale_stat,
        "effectType": skill.effect_type.as_str(),
        "school": skill.school.as_str(),
    })
}

pub fn skills(list: &[Skill]) -> Value {
    Value::Array(list.iter().map(skill).collect())
}

pub fn character(character: &CharacterData) -> Value {
    json!({
        "id": character.character_id,
        "clientId": character.client_id,
        "name": character.name,
        "class": character.class_name,
        "race": character.race,
        "level": character.level,
        "exp": character.current_exp,
        "expForNextLevel": character.exp_for_next_level,
        "currentHealth": character.current_health,
        "maxHealth": character.max_health,
        "currentMana": character.current_mana,
        "maxMana": character.max_mana,
        "position": position(&character.position),
        "attributes": attributes(&character.attributes),
        "skills": skills(&character.skills),
    })
}

pub fn mob_instance(mob: &MobInstance) -> Value {
    json!({
        "uid": mob.uid,
        "id": mob.mob_id,
        "zoneId": mob.zone_id,
        "name": mob.name,
        "race": mob.race,
        "level": mob.level,
        "currentHealth": mob.current_health,
        "maxHealth": mob.max_health,
        "currentMana": mob.current_mana,
        "maxMana": mob.max_mana,
        "isAggressive": mob.is_aggressive,
        "isDead": mob.is_dead,
        "position": position(&mob.position),
        "attributes": attributes(&mob.attributes),
    })
}

pub fn mob_instances(mobs: &[MobInstance]) -> Value {
    Value::Array(mobs.iter().map(mob_instance).collect())
}

pub fn spawn_zone(zone: &SpawnZone) -> Value {
    json!({
        "id": zone.zone_id,
        "name": zone.name,
        "posX": zone.center_x,
        "posY": zone.center_y,
        "posZ": zone.center_z,
        "sizeX": zone.size_x,
        "sizeY": zone.size_y,
        "sizeZ": zone.size_z,
        "spawnMobId": zone.spawn_mob_id,
        "spawnCount": zone.spawn_count,
        "respawnTime": zone.respawn_seconds,
        "spawnedCount": zone.spawned_count,
    })
}

pub fn spawn_zones(zones: &[SpawnZone]) -> Value {
    Value::Array(zones.iter().map(spawn_zone).collect())
}

pub fn dropped_item(item: &DroppedItem) -> Value {
    json!({
        "uid": item.uid,
        "itemId": item.item_id,
        "quantity": item.quantity,
        "position": position(&item.position),
        "canBePickedUp": item.can_be_picked_up,
    })
}

pub fn dropped_items(items: &[DroppedItem]) -> Value {
    Value::Array(items.iter().map(dropped_item).collect())
}

pub fn corpse_loot(rows: &[CorpseLoot]) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| json!({"itemId": row.item_id, "quantity": row.quantity}))
            .collect(),
    )
}

pub fn corpse(corpse: &HarvestCorpse) -> Value {
    json!({
        "corpseUID": corpse.mob_uid,
        "mobId": corpse.mob_id,
        "position": position(&corpse.position),
        "hasBeenHarvested": corpse.has_been_harvested,
        "harvestedBy": corpse.harvested_by_character_id,
        "currentHarvester": corpse.current_harvester_character_id,
        "interactionRadius": corpse.interaction_radius,
        "hasLoot": !corpse.available_loot.is_empty(),
    })
}

pub fn corpses(list: &[HarvestCorpse]) -> Value {
    Value::Array(list.iter().map(corpse).collect())
}

pub fn item_stacks(entries: impl IntoIterator<Item = (i32, i32)>) -> Value {
    Value::Array(
        entries
            .into_iter()
            .map(|(item_id, quantity)| json!({"itemId": item_id, "quantity": quantity}))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_uses_wire_names() {
        let value = position(&Position::new(1.0, 2.0, 3.0, 90.0));
        assert_eq!(value["posX"], 1.0);
        assert_eq!(value["rotZ"], 90.0);
    }

    #[test]
    fn character_includes_skill_list() {
        let mut data = CharacterData {
            character_id: 42,
            name: "Vex".into(),
            ..Default::default()
        };
        data.skills.push(Skill {
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
            effect_type: ashfall_core::skill::SkillEffectType::Damage,
            school: ashfall_core::skill::SkillSchool::Physical,
        });

        let value = character(&data);
        assert_eq!(value["id"], 42);
        assert_eq!(value["skills"][0]["slug"], "basic_attack");
        assert_eq!(value["skills"][0]["effectType"], "damage");
    }

    #[test]
    fn item_stacks_shape() {
        let value = item_stacks([(4, 2), (9, 1)]);
        assert_eq!(value[0]["itemId"], 4);
        assert_eq!(value[1]["quantity"], 1);
    }
}
