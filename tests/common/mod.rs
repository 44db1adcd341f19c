//! Shared fixtures: a recording messenger, directory data and a context builder.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::types::{ChatId, MessageId, ReplyMarkup};

use clinic_directory_bot::clinic_model::{Clinic, District, GeoPoint, LocalizedName, Service};
use clinic_directory_bot::config::RetryPolicy;
use clinic_directory_bot::context::BotContext;
use clinic_directory_bot::directory::DirectoryStore;
use clinic_directory_bot::errors::TransportError;
use clinic_directory_bot::transport::{InboundEvent, Messenger};

pub const ADMIN: ChatId = ChatId(1000);
pub const USER: ChatId = ChatId(2000);

/// One outbound call captured by [`RecordingMessenger`]
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat_id: ChatId,
        text: String,
        markup: Option<ReplyMarkup>,
    },
    Edit {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
    },
    Answer {
        callback_id: String,
    },
}

/// Messenger fake recording every call; sends to `failing` chats error out
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    failing: Mutex<HashSet<ChatId>>,
    /// Upcoming sends that fail with a dropped connection, whatever the chat
    dropped_sends: Mutex<u32>,
    send_delay: Mutex<Option<Duration>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, chat_id: ChatId) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    /// Make the next `count` sends fail as if the connection was reset
    pub fn drop_next_sends(&self, count: u32) {
        *self.dropped_sends.lock().unwrap() = count;
    }

    /// Make every send take `delay` before it completes
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = Some(delay);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Texts delivered to `chat_id`, in order
    pub fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text { chat_id: to, text, .. } if to == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text_to(&self, chat_id: ChatId) -> Option<String> {
        self.texts_to(chat_id).pop()
    }

    pub fn answered(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Answer { callback_id } => Some(callback_id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<ReplyMarkup>,
    ) -> Result<(), TransportError> {
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut dropped = self.dropped_sends.lock().unwrap();
            if *dropped > 0 {
                *dropped -= 1;
                return Err(TransportError::ConnectionReset("read ECONNRESET".to_string()));
            }
        }
        if self.failing.lock().unwrap().contains(&chat_id) {
            return Err(TransportError::Api("Forbidden: bot was blocked by the user".to_string()));
        }
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
            markup,
        });
        Ok(())
    }

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(Sent::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(Sent::Answer {
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }
}

pub fn districts() -> Vec<District> {
    vec![
        District {
            id: "chilonzor".to_string(),
            name: LocalizedName::new("Чиланзар", "Chilonzor"),
        },
        District {
            id: "yunusobod".to_string(),
            name: LocalizedName::new("Юнусабад", "Yunusobod"),
        },
    ]
}

pub fn service(id: &str, price: u64) -> Service {
    Service {
        id: id.to_string(),
        name: LocalizedName::new(format!("Услуга {id}"), format!("Xizmat {id}")),
        price,
        description: None,
    }
}

pub fn clinic(id: &str, name: &str, location: GeoPoint, services: Vec<Service>) -> Clinic {
    Clinic {
        id: id.to_string(),
        name: name.to_string(),
        district: "chilonzor".to_string(),
        location,
        website: String::new(),
        phone: "+998711234567".to_string(),
        working_hours: "8-20".to_string(),
        services,
    }
}

pub fn sample_clinics() -> Vec<Clinic> {
    vec![
        clinic(
            "clinic1",
            "Shifo Med",
            GeoPoint::new(41.2856, 69.2034),
            vec![service("service1", 45000), service("service2", 120000)],
        ),
        clinic(
            "clinic2",
            "Yunusobod Diagnostika",
            GeoPoint::new(41.3648, 69.2853),
            vec![service("service1", 80000)],
        ),
    ]
}

/// Retry policy that fails fast in tests
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        attempt_timeout: Duration::from_secs(1),
        retry_delay: Duration::from_millis(1),
    }
}

pub fn context_with(directory: DirectoryStore) -> BotContext {
    BotContext::new(directory, ADMIN, fast_retry())
}

/// Context whose clinics are persisted to `clinics_path`
pub fn persisted_context(clinics_path: &Path) -> BotContext {
    context_with(DirectoryStore::with_path(
        clinics_path.to_path_buf(),
        sample_clinics(),
        districts(),
    ))
}

pub fn in_memory_context() -> BotContext {
    context_with(DirectoryStore::in_memory(sample_clinics(), districts()))
}

pub fn text(chat_id: ChatId, text: &str) -> InboundEvent {
    InboundEvent::Text {
        chat_id,
        text: text.to_string(),
    }
}

pub fn location(chat_id: ChatId, latitude: f64, longitude: f64) -> InboundEvent {
    InboundEvent::Location {
        chat_id,
        point: GeoPoint::new(latitude, longitude),
    }
}

pub fn callback(chat_id: ChatId, data: &str) -> InboundEvent {
    InboundEvent::Callback {
        chat_id,
        message_id: Some(MessageId(77)),
        callback_id: format!("cb-{data}"),
        data: data.to_string(),
    }
}

pub mod connector {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use clinic_directory_bot::errors::TransportError;
    use clinic_directory_bot::resilience::{Connection, Connector, SignalSender};

    /// How fake connections answer the liveness probe
    #[derive(Debug, Clone)]
    pub enum ProbeBehavior {
        Succeed,
        Fail(TransportError),
        Hang,
    }

    /// Counters and knobs shared between a test and its fake connector
    #[derive(Clone)]
    pub struct Script {
        pub connects: Arc<AtomicU32>,
        pub stops: Arc<AtomicU32>,
        pub generations: Arc<Mutex<Vec<u64>>>,
        connect_results: Arc<Mutex<VecDeque<Result<(), TransportError>>>>,
        fail_by_default: Arc<Mutex<bool>>,
        probe: Arc<Mutex<ProbeBehavior>>,
    }

    impl Script {
        pub fn new() -> Self {
            Self {
                connects: Arc::new(AtomicU32::new(0)),
                stops: Arc::new(AtomicU32::new(0)),
                generations: Arc::new(Mutex::new(Vec::new())),
                connect_results: Arc::new(Mutex::new(VecDeque::new())),
                fail_by_default: Arc::new(Mutex::new(false)),
                probe: Arc::new(Mutex::new(ProbeBehavior::Succeed)),
            }
        }

        /// Queue outcomes for the next connect calls
        pub fn push_results(&self, results: Vec<Result<(), TransportError>>) {
            self.connect_results.lock().unwrap().extend(results);
        }

        /// Outcome once the queue is drained
        pub fn fail_connects(&self, fail: bool) {
            *self.fail_by_default.lock().unwrap() = fail;
        }

        pub fn set_probe(&self, behavior: ProbeBehavior) {
            *self.probe.lock().unwrap() = behavior;
        }

        pub fn connects(&self) -> u32 {
            self.connects.load(Ordering::SeqCst)
        }

        pub fn stops(&self) -> u32 {
            self.stops.load(Ordering::SeqCst)
        }
    }

    pub struct ScriptedConnector {
        pub script: Script,
    }

    pub struct FakeConnection {
        script: Script,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Connection = FakeConnection;

        async fn connect(
            &self,
            generation: u64,
            _signals: SignalSender,
        ) -> Result<FakeConnection, TransportError> {
            self.script.connects.fetch_add(1, Ordering::SeqCst);
            self.script.generations.lock().unwrap().push(generation);

            let scripted = self.script.connect_results.lock().unwrap().pop_front();
            let outcome = scripted.unwrap_or_else(|| {
                if *self.script.fail_by_default.lock().unwrap() {
                    Err(TransportError::Unreachable("connect ECONNREFUSED".to_string()))
                } else {
                    Ok(())
                }
            });

            outcome.map(|()| FakeConnection {
                script: self.script.clone(),
            })
        }
    }

    #[async_trait]
    impl Connection for FakeConnection {
        async fn probe(&self) -> Result<(), TransportError> {
            let behavior = self.script.probe.lock().unwrap().clone();
            match behavior {
                ProbeBehavior::Succeed => Ok(()),
                ProbeBehavior::Fail(e) => Err(e),
                ProbeBehavior::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
            }
        }

        async fn stop(&mut self) {
            self.script.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}
