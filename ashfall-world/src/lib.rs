pub mod harvest;
pub mod loot;
pub mod mob;
pub mod zone;

pub use harvest::{CorpseLoot, HarvestCorpse, HarvestError, HarvestSession, HarvestStore};
pub use loot::{DroppedItem, LootError, LootStore};
pub use mob::{HealthUpdate, MobInstance, MobInstanceRegistry, MobRegistryError};
pub use zone::{SpawnZone, SpawnZoneRegistry};
