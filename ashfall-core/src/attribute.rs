use serde::{Deserialize, Serialize};

/// A named stat carried by characters and mob templates. Slugs are the
/// authoritative key (`strength`, `accuracy`, `physical_defense`, ...);
/// anything not present reads as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub slug: String,
    pub name: String,
    pub value: i32,
}

impl Attribute {
    pub fn new(slug: impl Into<String>, value: i32) -> Self {
        let slug = slug.into();
        Self {
            name: slug.clone(),
            slug,
            value,
        }
    }
}

/// Look up an attribute by slug; missing attributes read as zero, so combat
/// math never branches on absence.
pub fn attribute_value(attributes: &[Attribute], slug: &str) -> i32 {
    attributes
        .iter()
        .find(|a| a.slug == slug)
        .map_or(0, |a| a.value)
}

/// Insert or replace an attribute by slug.
pub fn set_attribute(attributes: &mut Vec<Attribute>, slug: &str, value: i32) {
    match attributes.iter_mut().find(|a| a.slug == slug) {
        Some(attr) => attr.value = value,
        None => attributes.push(Attribute::new(slug, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_attribute_reads_zero() {
        let attrs = vec![Attribute::new("strength", 100)];
        assert_eq!(attribute_value(&attrs, "strength"), 100);
        assert_eq!(attribute_value(&attrs, "evasion"), 0);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut attrs = vec![Attribute::new("defense", 10)];
        set_attribute(&mut attrs, "defense", 25);
        set_attribute(&mut attrs, "accuracy", 5);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attribute_value(&attrs, "defense"), 25);
    }
}
