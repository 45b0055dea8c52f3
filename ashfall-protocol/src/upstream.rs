//! Parsers for the state-replication payloads the game server pushes over
//! the upstream link. Shapes are tolerated defensively: absent fields read
//! as zero/empty and malformed rows are skipped with a log line, because a
//! half-bad catalog must never take the replication stream down.

use serde_json::Value;

use ashfall_core::attribute::Attribute;
use ashfall_core::character::CharacterData;
use ashfall_core::math::Position;
use ashfall_core::skill::{Skill, SkillEffectType, SkillSchool};
use ashfall_registry::{ItemTemplate, LootEntry, MobTemplate};
use ashfall_world::zone::SpawnZone;

/// Upstream `header.eventType` strings.
pub mod event_type {
    pub const SET_CHUNK_DATA: &str = "setChunkData";
    pub const SET_CHARACTER_DATA: &str = "setCharacterData";
    pub const SET_CHARACTER_ATTRIBUTES: &str = "setCharacterAttributes";
    pub const SET_ALL_SPAWN_ZONES: &str = "setAllSpawnZones";
    pub const SET_ALL_MOBS_LIST: &str = "setAllMobsList";
    pub const SET_ALL_MOBS_ATTRIBUTES: &str = "setAllMobsAttributes";
    pub const SET_ALL_MOBS_SKILLS: &str = "setAllMobsSkills";
    pub const SET_ALL_ITEMS_LIST: &str = "setAllItemsList";
    pub const SET_MOB_LOOT_INFO: &str = "setMobLootInfo";
    pub const SET_EXP_LEVEL_TABLE: &str = "setExpLevelTable";
}

/// The chunk assignment this server received at handshake time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkInfo {
    pub chunk_id: i32,
    pub host: String,
    pub port: u16,
}

pub fn parse_chunk_info(body: &Value) -> ChunkInfo {
    ChunkInfo {
        chunk_id: int(body, "id") as i32,
        host: string(body, "ip"),
        port: int(body, "port") as u16,
    }
}

pub fn parse_position(value: &Value) -> Position {
    Position {
        x: float(value, "posX"),
        y: float(value, "posY"),
        z: float(value, "posZ"),
        rot_z: float(value, "rotZ"),
    }
}

pub fn parse_attribute(value: &Value) -> Attribute {
    Attribute {
        slug: string(value, "slug"),
        name: string(value, "name"),
        value: int(value, "value") as i32,
    }
}

pub fn parse_attributes(value: &Value) -> Vec<Attribute> {
    rows(value).iter().map(parse_attribute).collect()
}

pub fn parse_skill(value: &Value) -> Skill {
    Skill {
        slug: string(value, "slug"),
        name: string(value, "name"),
        cast_ms: int(value, "castMs").max(0) as u64,
        cooldown_ms: int(value, "cooldownMs").max(0) as u64,
        gcd_ms: int(value, "gcdMs").max(0) as u64,
        cost_mp: int(value, "costMp") as i32,
        max_range: float(value, "maxRange"),
        coeff: float(value, "coeff"),
        flat_add: int(value, "flatAdd") as i32,
        scale_stat: string(value, "scaleStat"),
        effect_type: SkillEffectType::parse(&string(value, "effectType")),
        school: SkillSchool::parse(&string(value, "school")),
    }
}

pub fn parse_skills(value: &Value) -> Vec<Skill> {
    rows(value).iter().map(parse_skill).collect()
}

pub fn parse_character_data(body: &Value) -> CharacterData {
    CharacterData {
        character_id: int(body, "id") as i32,
        client_id: int(body, "clientId") as i32,
        level: int(body, "level") as i32,
        current_exp: int(body, "exp") as i32,
        exp_for_next_level: int(body, "expForNextLevel") as i32,
        current_health: int(body, "currentHealth") as i32,
        max_health: int(body, "maxHealth") as i32,
        current_mana: int(body, "currentMana") as i32,
        max_mana: int(body, "maxMana") as i32,
        position: parse_position(&body["position"]),
        name: string(body, "name"),
        class_name: string(body, "class"),
        race: string(body, "race"),
        attributes: parse_attributes(&body["attributes"]),
        skills: parse_skills(&body["skills"]),
    }
}

/// `(characterId, attributes)` from a character-attributes refresh.
pub fn parse_character_attributes(body: &Value) -> (i32, Vec<Attribute>) {
    (
        int(body, "characterId") as i32,
        parse_attributes(&body["attributes"]),
    )
}

pub fn parse_spawn_zones(body: &Value) -> Vec<SpawnZone> {
    rows(&body["spawnZones"])
        .iter()
        .map(|row| SpawnZone {
            zone_id: int(row, "id") as i32,
            name: string(row, "name"),
            center_x: float(row, "posX"),
            center_y: float(row, "posY"),
            center_z: float(row, "posZ"),
            size_x: float(row, "sizeX"),
            size_y: float(row, "sizeY"),
            size_z: float(row, "sizeZ"),
            spawn_mob_id: int(row, "spawnMobId") as i32,
            spawn_count: int(row, "spawnCount") as i32,
            respawn_seconds: float(row, "respawnTime"),
            spawned_count: 0,
            spawned_mobs: Vec::new(),
        })
        .collect()
}

pub fn parse_mob_templates(body: &Value) -> Vec<MobTemplate> {
    rows(&body["mobs"])
        .iter()
        .filter_map(|row| {
            let mob_id = int(row, "id") as i32;
            if mob_id == 0 {
                log::warn!("mob template row without id skipped");
                return None;
            }
            Some(MobTemplate {
                mob_id,
                name: string(row, "name"),
                race: string(row, "race"),
                level: int(row, "level") as i32,
                base_health: int(row, "maxHealth") as i32,
                base_mana: int(row, "maxMana") as i32,
                base_exp: int(row, "baseExp") as i32,
                is_aggressive: boolean(row, "isAggressive"),
                attributes: parse_attributes(&row["attributes"]),
                skills: parse_skills(&row["skills"]),
            })
        })
        .collect()
}

/// `(mobId, attributes)` rows from a mob-attributes replication message.
pub fn parse_mob_attributes(body: &Value) -> Vec<(i32, Vec<Attribute>)> {
    group_by_mob(&body["attributes"], parse_attribute)
}

pub fn parse_mob_skills(body: &Value) -> Vec<(i32, Vec<Skill>)> {
    group_by_mob(&body["skills"], parse_skill)
}

pub fn parse_item_templates(body: &Value) -> Vec<ItemTemplate> {
    rows(&body["items"])
        .iter()
        .filter_map(|row| {
            let id = int(row, "id") as i32;
            if id == 0 {
                log::warn!("item template row without id skipped");
                return None;
            }
            Some(ItemTemplate {
                id,
                name: string(row, "name"),
                slug: string(row, "slug"),
                description: string(row, "description"),
                item_type: string(row, "itemType"),
                rarity: string(row, "rarity"),
                stack_max: int(row, "stackMax") as i32,
                weight: float(row, "weight"),
                equip_slot: string(row, "equipSlot"),
                is_harvest: boolean(row, "isHarvest"),
                attributes: parse_attributes(&row["attributes"]),
            })
        })
        .collect()
}

/// `(mobId, loot rows)` from the loot-table replication message.
pub fn parse_mob_loot(body: &Value) -> Vec<(i32, Vec<LootEntry>)> {
    rows(&body["loot"])
        .iter()
        .filter_map(|row| {
            let mob_id = int(row, "mobId") as i32;
            if mob_id == 0 {
                return None;
            }
            let entries = rows(&row["items"])
                .iter()
                .map(|item| LootEntry {
                    item_id: int(item, "itemId") as i32,
                    drop_chance: float(item, "dropChance"),
                })
                .collect();
            Some((mob_id, entries))
        })
        .collect()
}

pub fn parse_exp_table(body: &Value) -> Vec<(i32, i64)> {
    rows(&body["experienceTable"])
        .iter()
        .map(|row| (int(row, "level") as i32, int(row, "experiencePoints")))
        .collect()
}

fn group_by_mob<T>(value: &Value, parse: impl Fn(&Value) -> T) -> Vec<(i32, Vec<T>)> {
    let mut grouped: Vec<(i32, Vec<T>)> = Vec::new();
    for row in rows(value) {
        let mob_id = int(row, "mobId") as i32;
        if mob_id == 0 {
            continue;
        }
        let parsed = parse(row);
        match grouped.iter_mut().find(|(id, _)| *id == mob_id) {
            Some((_, list)) => list.push(parsed),
            None => grouped.push((mob_id, vec![parsed])),
        }
    }
    grouped
}

fn rows(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or_default()
}

fn int(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn float(value: &Value, key: &str) -> f32 {
    value.get(key).and_then(Value::as_f64).unwrap_or(0.0) as f32
}

fn string(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn boolean(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn character_data_parses_nested_lists() {
        let body = json!({
            "id": 42,
            "clientId": 5,
            "level": 3,
            "exp": 250,
            "maxHealth": 150,
            "currentHealth": 150,
            "position": {"posX": 10.0, "posY": -4.0, "posZ": 200.0, "rotZ": 45.0},
            "attributes": [{"slug": "strength", "name": "Strength", "value": 100}],
            "skills": [{"slug": "basic_attack", "castMs": 0, "cooldownMs": 1000,
                        "costMp": 10, "maxRange": 5.0, "coeff": 1.0, "flatAdd": 5,
                        "scaleStat": "strength", "effectType": "damage", "school": "physical"}],
        });

        let character = parse_character_data(&body);
        assert_eq!(character.character_id, 42);
        assert_eq!(character.position.x, 10.0);
        assert_eq!(character.attributes[0].value, 100);
        assert_eq!(character.skills[0].slug, "basic_attack");
        assert_eq!(character.skills[0].school, SkillSchool::Physical);
    }

    #[test]
    fn mob_rows_without_id_are_skipped() {
        let body = json!({"mobs": [
            {"id": 7, "name": "ash wolf", "level": 4, "maxHealth": 120},
            {"name": "ghost"},
        ]});
        let templates = parse_mob_templates(&body);
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].mob_id, 7);
        assert_eq!(templates[0].base_health, 120);
    }

    #[test]
    fn mob_attributes_group_by_mob() {
        let body = json!({"attributes": [
            {"mobId": 7, "slug": "strength", "value": 30},
            {"mobId": 7, "slug": "accuracy", "value": 5},
            {"mobId": 8, "slug": "strength", "value": 9},
        ]});
        let grouped = parse_mob_attributes(&body);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, 7);
        assert_eq!(grouped[0].1.len(), 2);
    }

    #[test]
    fn loot_tables_parse_per_mob() {
        let body = json!({"loot": [
            {"mobId": 7, "items": [{"itemId": 1, "dropChance": 0.25}]},
        ]});
        let loot = parse_mob_loot(&body);
        assert_eq!(loot[0].0, 7);
        assert!((loot[0].1[0].drop_chance - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn exp_table_rows_parse() {
        let body = json!({"experienceTable": [
            {"level": 1, "experiencePoints": 0},
            {"level": 2, "experiencePoints": 100},
        ]});
        assert_eq!(parse_exp_table(&body), vec![(1, 0), (2, 100)]);
    }

    #[test]
    fn chunk_info_parses() {
        let body = json!({"id": 3, "ip": "127.0.0.1", "port": 27017});
        let info = parse_chunk_info(&body);
        assert_eq!(info.chunk_id, 3);
        assert_eq!(info.port, 27017);
    }
}
