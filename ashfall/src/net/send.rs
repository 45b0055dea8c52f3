//! Response paths. Handlers never hold a socket; they resolve the session
//! from the client registry at send time, check it is still open, and move
//! on if it is not. A dead session is cleaned up by its own disconnect
//! path, not by whoever happened to write last.

use serde_json::Value;

use ashfall_protocol::{RequestTimestamps, ResponseBuilder};

use crate::services::GameServices;

pub fn send_line(services: &GameServices, client_id: i32, line: String) -> bool {
    match services.clients.session_for(client_id) {
        Some(session) if session.is_open() => session.send(line),
        Some(_) => {
            log::debug!("dropping write to closed session of client {client_id}");
            false
        }
        None => {
            log::debug!("dropping write to unknown client {client_id}");
            false
        }
    }
}

/// Send to every connected client. Each session sees lines in the order
/// they were queued to it; no ordering holds across sessions.
pub fn broadcast(services: &GameServices, line: &str) {
    for session in services.clients.sessions() {
        if session.is_open() {
            session.send(line.to_owned());
        }
    }
}

pub fn broadcast_except(services: &GameServices, skip_client_id: i32, line: &str) {
    let skip = services
        .clients
        .session_for(skip_client_id)
        .map(|s| s.session_id());
    for session in services.clients.sessions() {
        if Some(session.session_id()) != skip && session.is_open() {
            session.send(line.to_owned());
        }
    }
}

pub fn send_success(
    services: &GameServices,
    client_id: i32,
    event_type: &str,
    timestamps: &RequestTimestamps,
    body: Value,
) -> bool {
    let line = ResponseBuilder::new(event_type)
        .header("clientId", client_id)
        .timestamps(timestamps)
        .body_object(body)
        .success();
    send_line(services, client_id, line)
}

pub fn send_error(
    services: &GameServices,
    client_id: i32,
    event_type: &str,
    timestamps: &RequestTimestamps,
    error_code: &str,
    message: &str,
) -> bool {
    let line = ResponseBuilder::new(event_type)
        .header("clientId", client_id)
        .timestamps(timestamps)
        .body("errorCode", error_code)
        .body("message", message)
        .error();
    send_line(services, client_id, line)
}

/// Build a broadcast line; broadcasts answer no specific request so they
/// carry no echo fields.
pub fn broadcast_line(event_type: &str, body: Value) -> String {
    ResponseBuilder::new(event_type).body_object(body).success()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::test_handle;
    use crate::registry::ClientInfo;
    use crate::services::test_services;
    use serde_json::json;

    #[test]
    fn unknown_client_write_is_not_fatal() {
        let services = test_services();
        assert!(!send_line(&services, 999, "x\n".into()));
    }

    #[test]
    fn broadcast_reaches_every_open_session() {
        let services = test_services();
        let (one, mut rx1) = test_handle(1);
        let (two, mut rx2) = test_handle(2);
        services.clients.register(
            ClientInfo {
                client_id: 1,
                ..Default::default()
            },
            one,
        );
        services.clients.register(
            ClientInfo {
                client_id: 2,
                ..Default::default()
            },
            two.clone(),
        );

        broadcast(&services, "hello\n");
        assert_eq!(rx1.try_recv().unwrap(), "hello\n");
        assert_eq!(rx2.try_recv().unwrap(), "hello\n");

        two.close();
        broadcast(&services, "again\n");
        assert_eq!(rx1.try_recv().unwrap(), "again\n");
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn error_packet_carries_code_and_echoes() {
        let services = test_services();
        let (session, mut rx) = test_handle(1);
        services.clients.register(
            ClientInfo {
                client_id: 1,
                ..Default::default()
            },
            session,
        );

        let ts = RequestTimestamps {
            server_recv_ms: 50,
            client_send_ms_echo: 40,
            request_id: "r".into(),
        };
        assert!(send_error(
            &services,
            1,
            "harvestStart",
            &ts,
            "CORPSE_NOT_FOUND",
            "no such corpse"
        ));

        let line = rx.try_recv().unwrap();
        let parsed: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["header"]["status"], "error");
        assert_eq!(parsed["body"]["errorCode"], "CORPSE_NOT_FOUND");
        assert_eq!(parsed["header"]["clientSendMsEcho"], 40);
    }

    #[test]
    fn broadcast_except_skips_the_origin() {
        let services = test_services();
        let (one, mut rx1) = test_handle(1);
        let (two, mut rx2) = test_handle(2);
        services.clients.register(
            ClientInfo {
                client_id: 1,
                ..Default::default()
            },
            one,
        );
        services.clients.register(
            ClientInfo {
                client_id: 2,
                ..Default::default()
            },
            two,
        );

        let line = broadcast_line("moveCharacter", json!({"id": 42}));
        broadcast_except(&services, 1, &line);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().unwrap().contains("moveCharacter"));
    }
}
