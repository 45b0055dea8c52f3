use rand::Rng;
use serde_json::json;

use ashfall_core::math::Position;
use ashfall_protocol::wire;
use ashfall_world::harvest::{CorpseLoot, HarvestError, HarvestSession, LootTaken};

use crate::event::{Event, EventKind, EventPayload};
use crate::net::send;
use crate::services::GameServices;

/// Wire error code for a harvest failure. Start-time and pickup-time
/// failures deliberately map to different codes for the same underlying
/// cause, matching what clients already distinguish.
pub fn error_code(err: &HarvestError, during_pickup: bool) -> &'static str {
    match err {
        HarvestError::CorpseNotFound(_) => "CORPSE_NOT_FOUND",
        HarvestError::AlreadyHarvested(_) | HarvestError::CorpseBusy(..) => "CORPSE_NOT_AVAILABLE",
        HarvestError::AlreadyHarvesting(_) => "HARVEST_FAILED",
        HarvestError::OutOfRange(_) => {
            if during_pickup {
                "PICKUP_FAILED"
            } else {
                "HARVEST_FAILED"
            }
        }
        HarvestError::NotHarvested(_) => "CORPSE_NOT_HARVESTED",
        HarvestError::NotYourHarvest(_) => "NOT_YOUR_HARVEST",
    }
}

/// Claim a corpse and open the channel. The character's registry position
/// is authoritative; the client never supplies its own.
pub fn start_harvest(
    services: &GameServices,
    character_id: i32,
    corpse_uid: i64,
) -> Result<HarvestSession, HarvestError> {
    let position = services
        .characters
        .get(character_id)
        .map(|c| c.position)
        .ok_or(HarvestError::CorpseNotFound(corpse_uid))?;

    let session = services.harvest.begin_harvest(
        character_id,
        corpse_uid,
        position,
        services.clock.now_secs(),
    )?;

    let line = send::broadcast_line(
        "harvestStartBroadcast",
        json!({
            "type": "HARVEST_START_BROADCAST",
            "characterId": character_id,
            "corpseUID": corpse_uid,
            "position": wire::position(&position),
            "duration": session.duration_secs,
        }),
    );
    send::broadcast(services, &line);
    Ok(session)
}

/// Tear down the character's session, if any, and tell the world why.
pub fn cancel_harvest(
    services: &GameServices,
    character_id: i32,
    reason: &str,
) -> Option<HarvestSession> {
    let session = services.harvest.cancel_session(character_id)?;
    log::debug!(
        "harvest by character {character_id} on corpse {} cancelled ({reason})",
        session.corpse_uid
    );

    let line = send::broadcast_line(
        "harvestCancelBroadcast",
        json!({
            "type": "HARVEST_CANCEL_BROADCAST",
            "characterId": character_id,
            "corpseUID": session.corpse_uid,
            "reason": reason,
        }),
    );
    send::broadcast(services, &line);
    Some(session)
}

/// Scheduler pulse: sessions that ran their full duration emit one
/// completion event each. Progress itself is client-local; the server only
/// signals the end.
pub fn update_harvest_progress(services: &GameServices) {
    for session in services.harvest.due_sessions(services.clock.now_secs()) {
        services.main_queue.push(Event::new(
            EventKind::HarvestComplete,
            0,
            EventPayload::HarvestComplete {
                character_id: session.character_id,
                corpse_uid: session.corpse_uid,
            },
        ));
    }
}

/// Completion consumer: roll the harvest loot table, stamp the corpse, and
/// answer the harvester with the rolled list. Items stay on the corpse
/// until explicitly picked up.
pub fn complete_harvest(
    services: &GameServices,
    character_id: i32,
    corpse_uid: i64,
) -> Result<Vec<CorpseLoot>, HarvestError> {
    let corpse = services
        .harvest
        .get_corpse(corpse_uid)
        .ok_or(HarvestError::CorpseNotFound(corpse_uid))?;

    let mut rng = rand::thread_rng();
    let loot: Vec<CorpseLoot> = services
        .items
        .harvest_loot_for_mob(corpse.mob_id)
        .iter()
        .filter(|entry| rng.gen::<f32>() < entry.drop_chance)
        .map(|entry| CorpseLoot {
            item_id: entry.item_id,
            quantity: 1,
        })
        .collect();

    let corpse = services
        .harvest
        .complete_harvest(character_id, corpse_uid, loot.clone())?;

    if let Some(character) = services.characters.get(character_id) {
        let line = ashfall_protocol::ResponseBuilder::new("harvestComplete")
            .header("clientId", character.client_id)
            .body("type", "HARVEST_COMPLETE")
            .body("corpseUID", corpse_uid)
            .body("characterId", character_id)
            .body("availableLoot", wire::corpse_loot(&corpse.available_loot))
            .success();
        send::send_line(services, character.client_id, line);
    }

    let line = send::broadcast_line(
        "harvestCompleteBroadcast",
        json!({
            "type": "HARVEST_COMPLETE_BROADCAST",
            "characterId": character_id,
            "corpseUID": corpse_uid,
            "position": wire::position(&corpse.position),
        }),
    );
    send::broadcast(services, &line);

    Ok(loot)
}

/// Debit requested rows and credit the character's inventory. Fails closed:
/// anything the inventory refuses goes back on the corpse.
pub fn pickup_corpse_loot(
    services: &GameServices,
    character_id: i32,
    corpse_uid: i64,
    requested: &[CorpseLoot],
) -> Result<LootTaken, HarvestError> {
    let position = services
        .characters
        .get(character_id)
        .map(|c| c.position)
        .ok_or(HarvestError::CorpseNotFound(corpse_uid))?;

    let taken = services
        .harvest
        .take_corpse_loot(character_id, corpse_uid, requested, position)?;

    for row in &taken.picked_up {
        if let Err(err) = services
            .inventory
            .add(character_id, row.item_id, row.quantity)
        {
            log::error!("inventory refused corpse loot: {err}");
            services.harvest.restore_corpse_loot(corpse_uid, &[*row]);
        }
    }

    Ok(taken)
}

/// Movement hook: harvesting is a stand-still channel. A step beyond the
/// session's allowance cancels it.
pub fn check_movement_cancel(services: &GameServices, character_id: i32, new_position: Position) {
    let Some(session) = services.harvest.session_for(character_id) else {
        return;
    };
    if !session.is_active {
        return;
    }
    if session.start_position.distance_xy(&new_position) > session.max_move_distance {
        cancel_harvest(services, character_id, "movement");
    }
}
