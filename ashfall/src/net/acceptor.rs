//! Listener loop: accept, enforce the session cap, hand off to a session
//! task.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::net::session;
use crate::services::GameServices;

pub const MAX_SESSIONS: usize = 1000;

/// Live session tracker shared with the per-session tasks.
#[derive(Default)]
pub struct SessionSet {
    ids: Mutex<HashSet<u64>>,
}

impl SessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to admit a new session id; false when the server is full.
    pub fn try_admit(&self, session_id: u64) -> bool {
        let mut ids = self.ids.lock();
        if ids.len() >= MAX_SESSIONS {
            return false;
        }
        ids.insert(session_id);
        true
    }

    pub fn remove(&self, session_id: u64) {
        self.ids.lock().remove(&session_id);
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }
}

/// Accept until the shutdown flag flips. Each accepted socket runs its own
/// session task; a full server closes the socket immediately.
pub async fn run_acceptor(
    services: Arc<GameServices>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let endpoint = format!(
        "{}:{}",
        services.config.chunk_server.host, services.config.chunk_server.port
    );
    let listener = TcpListener::bind(&endpoint).await?;
    log::info!("chunk server listening on {endpoint}");

    let sessions = Arc::new(SessionSet::new());
    let mut next_admission_id: u64 = 1;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let admission_id = next_admission_id;
                        next_admission_id += 1;
                        if !sessions.try_admit(admission_id) {
                            log::warn!("session cap reached ({MAX_SESSIONS}), refusing {peer}");
                            drop(stream);
                            continue;
                        }
                        let services = services.clone();
                        let sessions = sessions.clone();
                        tokio::spawn(async move {
                            session::run_session(services, stream).await;
                            sessions.remove(admission_id);
                        });
                    }
                    Err(err) => {
                        log::error!("accept failed: {err}");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    log::info!("acceptor stopping ({} live sessions)", sessions.len());
                    return Ok(());
                }
            }
        }
    }
}
