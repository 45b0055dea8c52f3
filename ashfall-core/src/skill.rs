use serde::{Deserialize, Serialize};

/// What a skill does to its target when it resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillEffectType {
    Damage,
    Heal,
    Buff,
    Debuff,
}

impl SkillEffectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Damage => "damage",
            Self::Heal => "heal",
            Self::Buff => "buff",
            Self::Debuff => "debuff",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "heal" => Self::Heal,
            "buff" => Self::Buff,
            "debuff" => Self::Debuff,
            _ => Self::Damage,
        }
    }
}

/// Damage school; decides which defense attribute mitigates the hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillSchool {
    Physical,
    Magical,
}

impl SkillSchool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Physical => "physical",
            Self::Magical => "magical",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value == "physical" {
            Self::Physical
        } else {
            Self::Magical
        }
    }

    pub fn defense_slug(&self) -> &'static str {
        match self {
            Self::Physical => "physical_defense",
            Self::Magical => "magical_defense",
        }
    }
}

/// One castable ability, as replicated from the upstream catalog.
///
/// `max_range` is in catalog units; multiply by 100 to compare against world
/// coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub slug: String,
    pub name: String,
    pub cast_ms: u64,
    pub cooldown_ms: u64,
    pub gcd_ms: u64,
    pub cost_mp: i32,
    pub max_range: f32,
    pub coeff: f32,
    pub flat_add: i32,
    pub scale_stat: String,
    pub effect_type: SkillEffectType,
    pub school: SkillSchool,
}

impl Skill {
    /// Range in world units.
    pub fn world_range(&self) -> f32 {
        self.max_range * 100.0
    }

    pub fn is_instant(&self) -> bool {
        self.cast_ms == 0
    }
}

pub fn find_skill<'a>(skills: &'a [Skill], slug: &str) -> Option<&'a Skill> {
    skills.iter().find(|s| s.slug == slug)
}
