//! Shared state handed to every conversation handler.

use teloxide::types::ChatId;
use tokio::sync::Mutex;

use crate::config::RetryPolicy;
use crate::directory::DirectoryStore;
use crate::session::{Session, SessionStore};

/// Repositories and settings shared by all handlers
///
/// Locks are only held for synchronous sections; handlers release them before
/// awaiting any outbound call.
pub struct BotContext {
    pub sessions: Mutex<SessionStore>,
    pub directory: Mutex<DirectoryStore>,
    pub admin_id: ChatId,
    pub retry: RetryPolicy,
}

impl BotContext {
    pub fn new(directory: DirectoryStore, admin_id: ChatId, retry: RetryPolicy) -> Self {
        Self {
            sessions: Mutex::new(SessionStore::new()),
            directory: Mutex::new(directory),
            admin_id,
            retry,
        }
    }

    pub fn is_admin(&self, chat_id: ChatId) -> bool {
        chat_id == self.admin_id
    }

    /// Snapshot of the chat's session, created on first interaction
    pub async fn session(&self, chat_id: ChatId) -> Session {
        self.sessions.lock().await.get_or_init(chat_id)
    }

    pub async fn save_session(&self, chat_id: ChatId, session: Session) {
        self.sessions.lock().await.upsert(chat_id, session);
    }
}
