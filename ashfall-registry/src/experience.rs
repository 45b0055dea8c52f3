use parking_lot::RwLock;

/// Hard cap on character level; experience past the cap is clamped away.
pub const MAX_LEVEL: i32 = 100;

/// Cumulative experience curve, replicated from the upstream game server.
/// When the table has not arrived yet, the local fallback formula answers
/// instead so experience math never blocks on replication.
#[derive(Debug, Default)]
pub struct ExperienceTable {
    // Sorted by level; entry (level, cumulative exp needed to reach it).
    entries: RwLock<Vec<(i32, i64)>>,
}

impl ExperienceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, mut entries: Vec<(i32, i64)>) {
        if entries.is_empty() {
            log::warn!("experience table replication carried no entries");
            return;
        }
        entries.sort_unstable_by_key(|(level, _)| *level);
        entries.dedup_by_key(|(level, _)| *level);
        *self.entries.write() = entries;
    }

    pub fn is_loaded(&self) -> bool {
        !self.entries.read().is_empty()
    }

    /// Cumulative experience required to reach `level`.
    pub fn exp_for_level(&self, level: i32) -> i64 {
        let level = level.clamp(1, MAX_LEVEL);
        let entries = self.entries.read();
        if entries.is_empty() {
            return fallback_exp_for_level(level);
        }
        entries
            .iter()
            .rev()
            .find(|(l, _)| *l <= level)
            .map_or(0, |(_, exp)| *exp)
    }

    /// Highest level whose cumulative requirement is satisfied by `exp`.
    pub fn level_from_exp(&self, exp: i64) -> i32 {
        let exp = exp.max(0);
        let entries = self.entries.read();
        if entries.is_empty() {
            let mut level = 1;
            while level < MAX_LEVEL && exp >= fallback_exp_for_level(level + 1) {
                level += 1;
            }
            return level;
        }

        let mut level = 1;
        for (entry_level, required) in entries.iter() {
            if exp >= *required {
                level = *entry_level;
            } else {
                break;
            }
        }
        level.clamp(1, MAX_LEVEL)
    }
}

/// Local curve used until the upstream table arrives:
/// `sum_{i=2..level} 100 * 1.2^(i-2)`, rounded per step.
fn fallback_exp_for_level(level: i32) -> i64 {
    let mut total = 0i64;
    for i in 2..=level {
        total += (100.0 * 1.2f64.powi(i - 2)).round() as i64;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_curve_first_levels() {
        assert_eq!(fallback_exp_for_level(1), 0);
        assert_eq!(fallback_exp_for_level(2), 100);
        assert_eq!(fallback_exp_for_level(3), 220);
        assert_eq!(fallback_exp_for_level(4), 364);
    }

    #[test]
    fn fallback_levels_from_exp() {
        let table = ExperienceTable::new();
        assert_eq!(table.level_from_exp(0), 1);
        assert_eq!(table.level_from_exp(99), 1);
        assert_eq!(table.level_from_exp(100), 2);
        assert_eq!(table.level_from_exp(220), 3);
    }

    #[test]
    fn loaded_table_wins_over_fallback() {
        let table = ExperienceTable::new();
        table.load(vec![(1, 0), (2, 50), (3, 150)]);
        assert!(table.is_loaded());
        assert_eq!(table.exp_for_level(2), 50);
        assert_eq!(table.level_from_exp(49), 1);
        assert_eq!(table.level_from_exp(160), 3);
    }

    #[test]
    fn level_is_capped() {
        let table = ExperienceTable::new();
        assert_eq!(table.level_from_exp(i64::MAX), MAX_LEVEL);
        assert!(table.exp_for_level(MAX_LEVEL + 50) == table.exp_for_level(MAX_LEVEL));
    }
}
