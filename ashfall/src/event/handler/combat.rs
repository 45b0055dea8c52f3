//! Player-initiated combat: skill use and explicit interruption.

use std::sync::Arc;

use serde_json::json;

use crate::engine::skill::{Caster, InterruptReason};
use crate::event::handler::require_character;
use crate::event::{Event, EventPayload};
use crate::net::send;
use crate::services::GameServices;

pub fn handle_player_attack(services: &Arc<GameServices>, event: &Event) {
    let EventPayload::Attack {
        ref skill_slug,
        target_id,
        target_type,
    } = event.payload
    else {
        return;
    };
    let Some(character_id) = require_character(services, event, "playerAttack") else {
        return;
    };

    match services.skills.initiate_skill(
        services,
        Caster::Player(character_id),
        skill_slug,
        target_id,
        target_type,
    ) {
        Ok(result) => {
            send::send_success(
                services,
                event.client_id,
                "playerAttack",
                &event.timestamps,
                json!({
                    "skillSlug": skill_slug,
                    "targetId": target_id,
                    "castTime": result.cast_ms,
                    "executed": result.outcome.is_some(),
                }),
            );
        }
        Err(err) => {
            log::debug!("attack by character {character_id} rejected: {err}");
            send::send_error(
                services,
                event.client_id,
                "playerAttack",
                &event.timestamps,
                err.code(),
                &err.to_string(),
            );
        }
    }
}

pub fn handle_interrupt(services: &Arc<GameServices>, event: &Event) {
    let Some(character_id) = require_character(services, event, "interruptAttack") else {
        return;
    };

    match services.skills.interrupt(
        services,
        Caster::Player(character_id),
        InterruptReason::PlayerCancelled,
    ) {
        Some(action) => {
            send::send_success(
                services,
                event.client_id,
                "interruptAttack",
                &event.timestamps,
                json!({"skillSlug": action.skill_slug}),
            );
        }
        None => {
            send::send_error(
                services,
                event.client_id,
                "interruptAttack",
                &event.timestamps,
                "NO_ACTION",
                "no action in flight to interrupt",
            );
        }
    }
}
