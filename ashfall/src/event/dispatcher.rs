use ashfall_core::math::Position;
use ashfall_protocol::client::{self, event_type as ev};
use ashfall_protocol::envelope::ProtocolError;
use ashfall_protocol::{RequestEnvelope, RequestTimestamps};

use crate::net::SessionHandle;
use crate::services::GameServices;

use super::{Event, EventKind, EventPayload};

/// Events pushed per queue batch.
pub const DISPATCH_BATCH_SIZE: usize = 10;

#[derive(Debug)]
pub enum DispatchOutcome {
    Enqueued(usize),
    UnknownEventType(String),
    Malformed(ProtocolError),
    SessionClosed,
}

/// Convert one parsed envelope into typed events on the main queue.
/// `client_id`/`character_id` are the session-resolved identities; join
/// events may override the character id from their body. The session's
/// liveness is checked before enqueue — events for a dead socket are
/// discarded, except the disconnect event cleanup depends on.
pub fn dispatch_client_event(
    services: &GameServices,
    envelope: &RequestEnvelope,
    client_id: i32,
    character_id: i32,
    session: &SessionHandle,
) -> DispatchOutcome {
    let timestamps = RequestTimestamps::capture(&envelope.header);
    let event_type = envelope.header.event_type.as_str();

    let built = match build_events(envelope, client_id, character_id, event_type) {
        Ok(events) => events,
        Err(BuildError::Unknown) => {
            return DispatchOutcome::UnknownEventType(event_type.to_owned());
        }
        Err(BuildError::Malformed(err)) => return DispatchOutcome::Malformed(err),
    };

    let mut admitted = 0usize;
    let mut batch = Vec::with_capacity(built.len().min(DISPATCH_BATCH_SIZE));
    for event in built {
        if !session.is_open() && event.kind != EventKind::DisconnectClient {
            log::debug!(
                "discarding {:?} for client {client_id}: session closed",
                event.kind
            );
            continue;
        }
        batch.push(event.with_timestamps(timestamps.clone()));
        admitted += 1;
        if batch.len() == DISPATCH_BATCH_SIZE {
            services.main_queue.push_batch(std::mem::take(&mut batch));
        }
    }
    if !batch.is_empty() {
        services.main_queue.push_batch(batch);
    }

    if admitted == 0 && !session.is_open() {
        DispatchOutcome::SessionClosed
    } else {
        DispatchOutcome::Enqueued(admitted)
    }
}

enum BuildError {
    Unknown,
    Malformed(ProtocolError),
}

impl From<ProtocolError> for BuildError {
    fn from(err: ProtocolError) -> Self {
        Self::Malformed(err)
    }
}

fn build_events(
    envelope: &RequestEnvelope,
    client_id: i32,
    character_id: i32,
    event_type: &str,
) -> Result<Vec<Event>, BuildError> {
    let body = &envelope.body;
    let event = |kind, payload| Event::new(kind, client_id, payload);

    let built = match event_type {
        ev::JOIN_GAME_CLIENT | ev::JOIN_GAME_CHARACTER => {
            let join: client::JoinBody = client::parse_body(event_type, body).unwrap_or_default();
            // Body id wins over the stored registry value.
            let resolved = if join.id != 0 { join.id } else { character_id };
            let kind = if event_type == ev::JOIN_GAME_CLIENT {
                EventKind::JoinClient
            } else {
                EventKind::JoinCharacter
            };
            vec![event(
                kind,
                EventPayload::Join {
                    character_id: resolved,
                    hash: envelope.header.hash.clone(),
                },
            )]
        }
        ev::MOVE_CHARACTER => {
            let body: client::MoveCharacterBody = client::parse_body(event_type, body)?;
            let resolved = if body.id != 0 { body.id } else { character_id };
            vec![event(
                EventKind::MoveCharacter,
                EventPayload::Move {
                    character_id: resolved,
                    position: Position::new(body.pos_x, body.pos_y, body.pos_z, body.rot_z),
                },
            )]
        }
        ev::DISCONNECT_CLIENT => vec![event(EventKind::DisconnectClient, EventPayload::Empty)],
        ev::GET_SPAWN_ZONES => vec![event(EventKind::GetSpawnZones, EventPayload::Empty)],
        ev::GET_CONNECTED_CHARACTERS => {
            vec![event(EventKind::GetConnectedClients, EventPayload::Empty)]
        }
        ev::PLAYER_ATTACK => {
            let body: client::PlayerAttackBody = client::parse_body(event_type, body)?;
            vec![event(
                EventKind::PlayerAttack,
                EventPayload::Attack {
                    skill_slug: body.skill_slug,
                    target_id: body.target_id,
                    target_type: body.target_type,
                },
            )]
        }
        ev::INTERRUPT_ATTACK => {
            let body: client::InterruptAttackBody =
                client::parse_body(event_type, body).unwrap_or_default();
            vec![event(
                EventKind::InterruptCombatAction,
                EventPayload::Interrupt { reason: body.reason },
            )]
        }
        ev::PICKUP_DROPPED_ITEM => {
            let body: client::ItemPickupBody = client::parse_body(event_type, body)?;
            vec![event(
                EventKind::ItemPickup,
                EventPayload::ItemPickup {
                    item_uid: body.item_uid,
                },
            )]
        }
        ev::GET_NEARBY_ITEMS => {
            let body: client::NearbyQueryBody =
                client::parse_body(event_type, body).unwrap_or_default();
            vec![event(
                EventKind::GetNearbyItems,
                EventPayload::NearbyQuery {
                    radius: body.radius,
                },
            )]
        }
        ev::GET_PLAYER_INVENTORY => {
            vec![event(EventKind::GetPlayerInventory, EventPayload::Empty)]
        }
        ev::HARVEST_START => {
            let body: client::HarvestStartBody = client::parse_body(event_type, body)?;
            vec![event(
                EventKind::HarvestStartRequest,
                EventPayload::HarvestStart {
                    corpse_uid: body.corpse_uid,
                },
            )]
        }
        ev::HARVEST_CANCEL => {
            let body: client::HarvestCancelBody =
                client::parse_body(event_type, body).unwrap_or_default();
            vec![event(
                EventKind::HarvestCancelled,
                EventPayload::HarvestCancel {
                    corpse_uid: body.corpse_uid,
                },
            )]
        }
        ev::GET_NEARBY_CORPSES => {
            let body: client::NearbyQueryBody =
                client::parse_body(event_type, body).unwrap_or_default();
            vec![event(
                EventKind::GetNearbyCorpses,
                EventPayload::NearbyQuery {
                    radius: body.radius,
                },
            )]
        }
        ev::CORPSE_LOOT_PICKUP => {
            let body: client::CorpseLootPickupBody = client::parse_body(event_type, body)?;
            vec![event(
                EventKind::CorpseLootPickup,
                EventPayload::LootPickup {
                    corpse_uid: body.corpse_uid,
                    player_id: body.player_id,
                    requested: body.requested_items,
                },
            )]
        }
        ev::CORPSE_LOOT_INSPECT => {
            let body: client::CorpseLootInspectBody = client::parse_body(event_type, body)?;
            vec![event(
                EventKind::CorpseLootInspect,
                EventPayload::LootInspect {
                    corpse_uid: body.corpse_uid,
                    player_id: body.player_id,
                },
            )]
        }
        _ => return Err(BuildError::Unknown),
    };
    Ok(built)
}
