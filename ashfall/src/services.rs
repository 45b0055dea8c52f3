use std::sync::Arc;

use tokio::sync::mpsc;

use ashfall_core::id::IdGenerator;
use ashfall_core::time::GameClock;
use ashfall_inventory::InventoryStore;
use ashfall_registry::{ExperienceTable, ItemRegistry, MobTemplateRegistry};
use ashfall_world::{HarvestStore, LootStore, MobInstanceRegistry, SpawnZoneRegistry};

use crate::config::Config;
use crate::engine::movement::MovementEngine;
use crate::engine::skill::SkillEngine;
use crate::event::queue::EventQueue;
use crate::event::{Event, EventKind, EventPayload};
use crate::net::upstream::UpstreamHandle;
use crate::registry::{CharacterRegistry, ChunkRegistry, ClientRegistry};

/// The process-wide service bundle. Constructed once at startup in
/// dependency order and passed by reference everywhere; the only hidden
/// globals in the system are the atomic uid counters inside the stores.
pub struct GameServices {
    pub config: Config,
    pub clock: GameClock,

    // transport-facing registries
    pub clients: ClientRegistry,
    pub characters: CharacterRegistry,
    pub chunks: ChunkRegistry,

    // replicated template state
    pub mob_templates: MobTemplateRegistry,
    pub items: ItemRegistry,
    pub exp_table: ExperienceTable,

    // live world state
    pub mobs: MobInstanceRegistry,
    pub zones: SpawnZoneRegistry,
    pub inventory: InventoryStore,
    pub loot: LootStore,
    pub harvest: HarvestStore,
    pub mob_uids: IdGenerator,

    // simulation engines
    pub skills: SkillEngine,
    pub movement: MovementEngine,

    // event pipeline
    pub main_queue: EventQueue,
    pub upstream_queue: EventQueue,
    pub ping_queue: EventQueue,

    pub upstream: UpstreamHandle,
}

impl GameServices {
    /// Build the bundle and wire the cross-component hooks. The returned
    /// receiver is the upstream link's outbound line stream.
    pub fn new(config: Config) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (upstream_tx, upstream_rx) = mpsc::unbounded_channel();

        let services = Arc::new(Self {
            config,
            clock: GameClock::new(),
            clients: ClientRegistry::new(),
            characters: CharacterRegistry::new(),
            chunks: ChunkRegistry::new(),
            mob_templates: MobTemplateRegistry::new(),
            items: ItemRegistry::new(),
            exp_table: ExperienceTable::new(),
            mobs: MobInstanceRegistry::new(),
            zones: SpawnZoneRegistry::new(),
            inventory: InventoryStore::new(),
            loot: LootStore::new(),
            harvest: HarvestStore::new(),
            mob_uids: IdGenerator::new(),
            skills: SkillEngine::new(),
            movement: MovementEngine::new(),
            main_queue: EventQueue::new(),
            upstream_queue: EventQueue::new(),
            ping_queue: EventQueue::new(),
            upstream: UpstreamHandle::new(upstream_tx),
        });

        // Inventory mutations push their own update events; mutation sites
        // (harvest, loot pickup, future trade) stay notification-free.
        let hook = Arc::downgrade(&services);
        services.inventory.set_update_listener(Box::new(move |character_id, entries| {
            if let Some(services) = hook.upgrade() {
                services.main_queue.push(Event::new(
                    EventKind::InventoryUpdate,
                    0,
                    EventPayload::Inventory {
                        character_id,
                        entries: entries.to_vec(),
                    },
                ));
            }
        }));

        (services, upstream_rx)
    }

    /// Stop intake and wake every queue consumer for shutdown.
    pub fn close_queues(&self) {
        self.main_queue.close();
        self.upstream_queue.close();
        self.ping_queue.close();
    }
}

#[cfg(test)]
pub(crate) fn test_services() -> Arc<GameServices> {
    let config: Config = serde_json::from_str(
        r#"{
            "game_server": {"host": "127.0.0.1", "port": 27016, "max_clients": 100},
            "chunk_server": {"host": "127.0.0.1", "port": 27017, "max_clients": 100}
        }"#,
    )
    .unwrap();
    GameServices::new(config).0
}
