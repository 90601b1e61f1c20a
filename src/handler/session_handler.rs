//! Process-wide session and server registries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::AbortHandle;

use super::reply_handler::ReplyHandler;
use crate::session::Session;

/// A running server: its accept task and where it listens.
pub(crate) struct ServerEntry {
    pub accept_task: AbortHandle,
    pub local_port: Option<u16>,
}

/// Owns every session and server of a controller behind one lock each.
///
/// The handler never destroys sessions on its own; teardown always runs
/// through the session, which deregisters itself here. Sessions keep only a
/// `Weak` back-reference, so dropping the handler releases everything.
pub struct SessionHandler {
    sessions: Mutex<HashMap<u32, Arc<Session>>>,
    servers: Mutex<HashMap<u32, ServerEntry>>,
    session_id_counter: AtomicU32,
    server_id_counter: AtomicU32,
    reply_handler: Arc<ReplyHandler>,
}

impl SessionHandler {
    pub(crate) fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            servers: Mutex::new(HashMap::new()),
            session_id_counter: AtomicU32::new(0),
            server_id_counter: AtomicU32::new(0),
            reply_handler: Arc::new(ReplyHandler::new()),
        }
    }

    /// The timer's pending-reply table.
    pub(crate) fn reply_handler(&self) -> &Arc<ReplyHandler> {
        &self.reply_handler
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub(crate) fn add_session(&self, id: u32, session: Arc<Session>) {
        self.sessions.lock().unwrap().insert(id, session);
    }

    /// Remove a session from the registry without closing it.
    pub(crate) fn remove_session(&self, id: u32) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().remove(&id)
    }

    /// Look up a session by id.
    pub fn get_session(&self, id: u32) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().get(&id).cloned()
    }

    pub(crate) fn contains_session(&self, id: u32) -> bool {
        self.sessions.lock().unwrap().contains_key(&id)
    }

    /// Move a session from its offered id to the server-chosen one.
    pub(crate) fn rekey_session(&self, old_id: u32, new_id: u32) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.remove(&old_id) {
            Some(session) => {
                sessions.insert(new_id, session);
                true
            }
            None => false,
        }
    }

    /// Random non-zero id unused in the local registry, for the client's
    /// init offer.
    pub(crate) fn random_offered_id(&self) -> u32 {
        let sessions = self.sessions.lock().unwrap();
        loop {
            let id: u32 = rand::random();
            if id != 0 && !sessions.contains_key(&id) {
                return id;
            }
        }
    }

    /// Counter-based non-zero id unused in the local registry, for init
    /// collisions on the server.
    pub(crate) fn next_unique_session_id(&self) -> u32 {
        loop {
            let id = self.session_id_counter.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
            if id != 0 && !self.contains_session(id) {
                return id;
            }
        }
    }

    /// Snapshot of all registered sessions, for lock-free iteration.
    pub(crate) fn sessions_snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().unwrap().values().cloned().collect()
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Ask every session to end itself; sessions deregister on their own.
    pub(crate) async fn clear_all_sessions(&self) {
        for session in self.sessions_snapshot() {
            session.teardown(true).await;
        }
    }

    // ------------------------------------------------------------------
    // Servers
    // ------------------------------------------------------------------

    pub(crate) fn add_server(&self, entry: ServerEntry) -> u32 {
        let id = self.server_id_counter.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        self.servers.lock().unwrap().insert(id, entry);
        id
    }

    pub(crate) fn remove_server(&self, id: u32) -> Option<ServerEntry> {
        self.servers.lock().unwrap().remove(&id)
    }

    /// The locally bound port of a TCP-family server.
    pub fn server_port(&self, id: u32) -> Option<u16> {
        self.servers
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|entry| entry.local_port)
    }

    pub(crate) fn clear_all_servers(&self) {
        let mut servers = self.servers.lock().unwrap();
        for (_, entry) in servers.drain() {
            entry.accept_task.abort();
        }
    }
}
