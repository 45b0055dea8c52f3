use parking_lot::RwLock;

use ashfall_protocol::upstream::ChunkInfo;

/// The spatial assignment this process received from the game server at
/// handshake time. Exposes hooks for future cross-chunk handoff; today one
/// process owns exactly one chunk.
#[derive(Default)]
pub struct ChunkRegistry {
    assigned: RwLock<Option<ChunkInfo>>,
}

impl ChunkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_assigned(&self, info: ChunkInfo) {
        log::info!(
            "chunk assignment received: id {} at {}:{}",
            info.chunk_id,
            info.host,
            info.port
        );
        *self.assigned.write() = Some(info);
    }

    pub fn assigned(&self) -> Option<ChunkInfo> {
        self.assigned.read().clone()
    }

    pub fn chunk_id(&self) -> i32 {
        self.assigned.read().as_ref().map_or(0, |c| c.chunk_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_round_trips() {
        let registry = ChunkRegistry::new();
        assert_eq!(registry.chunk_id(), 0);
        registry.set_assigned(ChunkInfo {
            chunk_id: 3,
            host: "10.0.0.2".into(),
            port: 27020,
        });
        assert_eq!(registry.chunk_id(), 3);
        assert_eq!(registry.assigned().unwrap().port, 27020);
    }
}
