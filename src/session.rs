//! Per-chat conversation sessions, kept in memory for the process lifetime.

use std::collections::{BTreeSet, HashMap};

use teloxide::types::ChatId;

use crate::clinic_model::{GeoPoint, Language};
use crate::dialogue::Step;

/// Conversation state of one chat
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    pub step: Step,
    pub language: Language,
    pub last_location: Option<GeoPoint>,
    pub subscribed_categories: BTreeSet<String>,
}

impl Session {
    /// Return to idle, dropping any in-progress input
    pub fn reset_step(&mut self) {
        self.step = Step::Idle;
    }
}

/// Chat id to session map without eviction
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<ChatId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chat_id: ChatId) -> Option<&Session> {
        self.sessions.get(&chat_id)
    }

    /// Create a session with defaults, replacing any existing one
    pub fn init(&mut self, chat_id: ChatId) -> Session {
        let session = Session::default();
        self.sessions.insert(chat_id, session.clone());
        session
    }

    /// Existing session, or a freshly created one
    pub fn get_or_init(&mut self, chat_id: ChatId) -> Session {
        self.sessions.entry(chat_id).or_default().clone()
    }

    pub fn upsert(&mut self, chat_id: ChatId, session: Session) {
        self.sessions.insert(chat_id, session);
    }

    /// Every chat that has interacted with the bot
    pub fn chat_ids(&self) -> Vec<ChatId> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions that have shared a location
    pub fn active_users(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.last_location.is_some())
            .count()
    }

    /// Sessions subscribed to at least one category
    pub fn subscribed_users(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| !s.subscribed_categories.is_empty())
            .count()
    }
}
