pub mod acceptor;
pub mod send;
pub mod session;
pub mod upstream;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

/// Write-side handle for one connected client. The reader task, the client
/// registry and the response path share it; events never do. Lines pushed
/// here are drained by the session's writer task, which stamps nothing —
/// the response builder already finished the frame.
#[derive(Debug)]
pub struct SessionHandle {
    session_id: u64,
    peer: SocketAddr,
    sender: mpsc::UnboundedSender<String>,
    open: AtomicBool,
}

impl SessionHandle {
    pub fn new(session_id: u64, peer: SocketAddr, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            session_id,
            peer,
            sender,
            open: AtomicBool::new(true),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Queue a finished line for the writer task. A send to a closed
    /// session is an error-but-not-fatal: the caller gets `false` and the
    /// disconnect path owns the cleanup.
    pub fn send(&self, line: String) -> bool {
        if !self.is_open() {
            return false;
        }
        self.sender.send(line).is_ok()
    }

    /// Mark the session closed. Idempotent; the writer task drains and
    /// exits once its channel closes.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

#[cfg(test)]
pub(crate) fn test_handle(session_id: u64) -> (std::sync::Arc<SessionHandle>, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    (
        std::sync::Arc::new(SessionHandle::new(session_id, addr, tx)),
        rx,
    )
}
