use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ashfall_core::attribute::Attribute;
use ashfall_core::skill::Skill;

/// Immutable per-type mob record replicated from the upstream catalog.
/// Attributes and skills arrive in separate replication messages and are
/// merged into the template by `mob_id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MobTemplate {
    pub mob_id: i32,
    pub name: String,
    pub race: String,
    pub level: i32,
    pub base_health: i32,
    pub base_mana: i32,
    pub base_exp: i32,
    pub is_aggressive: bool,
    pub attributes: Vec<Attribute>,
    pub skills: Vec<Skill>,
}

/// Read-heavy template map. Queries return copies; re-inserting an existing
/// `mob_id` updates in place so replication is idempotent.
#[derive(Debug, Default)]
pub struct MobTemplateRegistry {
    templates: RwLock<HashMap<i32, MobTemplate>>,
}

impl MobTemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_templates(&self, templates: Vec<MobTemplate>) {
        if templates.is_empty() {
            log::warn!("mob template replication carried no entries");
            return;
        }
        let mut map = self.templates.write();
        for template in templates {
            map.insert(template.mob_id, template);
        }
    }

    /// Merge replicated attributes into the template they belong to.
    /// Attributes for unknown templates are dropped with a log line; the
    /// upstream may interleave replication messages on reconnect.
    pub fn merge_attributes(&self, entries: Vec<(i32, Vec<Attribute>)>) {
        let mut map = self.templates.write();
        for (mob_id, attributes) in entries {
            match map.get_mut(&mob_id) {
                Some(template) => template.attributes = attributes,
                None => log::warn!("attributes for unknown mob template {mob_id} dropped"),
            }
        }
    }

    pub fn merge_skills(&self, entries: Vec<(i32, Vec<Skill>)>) {
        let mut map = self.templates.write();
        for (mob_id, skills) in entries {
            match map.get_mut(&mob_id) {
                Some(template) => template.skills = skills,
                None => log::warn!("skills for unknown mob template {mob_id} dropped"),
            }
        }
    }

    pub fn get(&self, mob_id: i32) -> Option<MobTemplate> {
        self.templates.read().get(&mob_id).cloned()
    }

    pub fn all(&self) -> Vec<MobTemplate> {
        self.templates.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(mob_id: i32) -> MobTemplate {
        MobTemplate {
            mob_id,
            name: format!("mob-{mob_id}"),
            level: 3,
            base_health: 100,
            ..Default::default()
        }
    }

    #[test]
    fn reload_updates_in_place() {
        let registry = MobTemplateRegistry::new();
        registry.load_templates(vec![template(1)]);
        let mut updated = template(1);
        updated.level = 9;
        registry.load_templates(vec![updated]);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(1).unwrap().level, 9);
    }

    #[test]
    fn attribute_merge_targets_template() {
        let registry = MobTemplateRegistry::new();
        registry.load_templates(vec![template(1)]);
        registry.merge_attributes(vec![
            (1, vec![Attribute::new("strength", 40)]),
            (99, vec![Attribute::new("strength", 1)]),
        ]);

        let loaded = registry.get(1).unwrap();
        assert_eq!(loaded.attributes.len(), 1);
        assert!(registry.get(99).is_none());
    }
}
