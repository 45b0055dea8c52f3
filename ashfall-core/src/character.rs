use serde::{Deserialize, Serialize};

use crate::attribute::Attribute;
use crate::math::Position;
use crate::skill::Skill;

/// Authoritative runtime record for one player avatar.
///
/// Identity, name, class and the attribute/skill lists are replicated from
/// the upstream game server; health, mana, experience and position mutate
/// locally while the character resides in this chunk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CharacterData {
    pub character_id: i32,
    pub client_id: i32,
    pub level: i32,
    pub current_exp: i32,
    pub exp_for_next_level: i32,
    pub current_health: i32,
    pub max_health: i32,
    pub current_mana: i32,
    pub max_mana: i32,
    pub position: Position,
    pub name: String,
    pub class_name: String,
    pub race: String,
    pub attributes: Vec<Attribute>,
    pub skills: Vec<Skill>,
}

impl CharacterData {
    pub fn is_alive(&self) -> bool {
        self.current_health > 0
    }

    /// Clamp a health mutation into `[0, max_health]`.
    pub fn clamped_health(&self, health: i32) -> i32 {
        health.clamp(0, self.max_health)
    }

    pub fn clamped_mana(&self, mana: i32) -> i32 {
        mana.clamp(0, self.max_mana)
    }
}
