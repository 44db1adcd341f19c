//! Telegram adapter: the [`Messenger`] implementation and the polling [`Connector`].

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, CallbackQueryId, MessageId, ReplyMarkup};
use teloxide::update_listeners::Polling;
use teloxide::RequestError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::bot::dispatch_event;
use crate::clinic_model::GeoPoint;
use crate::config::{ResilienceConfig, USER_AGENT};
use crate::context::BotContext;
use crate::errors::TransportError;
use crate::fallback::FallbackHandler;
use crate::resilience::{Connection, ConnectionSignal, Connector, SignalKind, SignalSender};
use crate::retry::{with_deadline, Deadline};
use crate::transport::{InboundEvent, Messenger};

/// Outbound messaging through the Bot API
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<ReplyMarkup>,
    ) -> Result<(), TransportError> {
        let mut request = self.bot.send_message(chat_id, text);
        if let Some(markup) = markup {
            request = request.reply_markup(markup);
        }
        request.send().await?;
        Ok(())
    }

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), TransportError> {
        self.bot
            .edit_message_text(chat_id, message_id, text)
            .send()
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        self.bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()))
            .send()
            .await?;
        Ok(())
    }
}

/// HTTP client tuned for long polling
pub fn build_http_client(config: &ResilienceConfig) -> Result<reqwest::Client, TransportError> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout)
        .tcp_keepalive(config.keep_alive)
        .pool_idle_timeout(config.keep_alive)
        .pool_max_idle_per_host(config.max_idle_connections)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Convert a Telegram message into an inbound event; other message kinds are dropped
pub fn inbound_from_message(msg: &Message) -> Option<InboundEvent> {
    if let Some(text) = msg.text() {
        return Some(InboundEvent::Text {
            chat_id: msg.chat.id,
            text: text.to_string(),
        });
    }

    msg.location().map(|location| InboundEvent::Location {
        chat_id: msg.chat.id,
        point: GeoPoint::new(location.latitude, location.longitude),
    })
}

/// Convert a callback query; queries without data are dropped
pub fn inbound_from_callback(q: &CallbackQuery) -> Option<InboundEvent> {
    let data = q.data.clone()?;
    let chat_id = q
        .message
        .as_ref()
        .map(|message| message.chat().id)
        .unwrap_or_else(|| q.from.id.into());

    Some(InboundEvent::Callback {
        chat_id,
        message_id: q.message.as_ref().map(|message| message.id()),
        callback_id: q.id.0.clone(),
        data,
    })
}

async fn on_message(
    msg: Message,
    ctx: Arc<BotContext>,
    messenger: Arc<TelegramMessenger>,
    fallback: Arc<FallbackHandler>,
) -> anyhow::Result<()> {
    match inbound_from_message(&msg) {
        Some(event) => dispatch_event(&ctx, messenger.as_ref(), &fallback, event).await,
        None => debug!(chat_id = %msg.chat.id, "Ignoring unsupported message kind"),
    }
    Ok(())
}

async fn on_callback(
    q: CallbackQuery,
    ctx: Arc<BotContext>,
    messenger: Arc<TelegramMessenger>,
    fallback: Arc<FallbackHandler>,
) -> anyhow::Result<()> {
    match inbound_from_callback(&q) {
        Some(event) => dispatch_event(&ctx, messenger.as_ref(), &fallback, event).await,
        None => debug!(user_id = %q.from.id, "Ignoring callback without data"),
    }
    Ok(())
}

/// Creates long-polling connections wired to the conversation handlers
pub struct TelegramConnector {
    token: String,
    config: ResilienceConfig,
    ctx: Arc<BotContext>,
    fallback: Arc<FallbackHandler>,
}

impl TelegramConnector {
    pub fn new(
        token: String,
        config: ResilienceConfig,
        ctx: Arc<BotContext>,
        fallback: Arc<FallbackHandler>,
    ) -> Self {
        Self {
            token,
            config,
            ctx,
            fallback,
        }
    }
}

#[async_trait]
impl Connector for TelegramConnector {
    type Connection = TelegramConnection;

    async fn connect(
        &self,
        generation: u64,
        signals: SignalSender,
    ) -> Result<TelegramConnection, TransportError> {
        let client = build_http_client(&self.config)?;
        let bot = Bot::with_client(self.token.clone(), client);

        // Confirm token and network before committing to a poller
        match with_deadline(self.config.probe_timeout, bot.get_me().send()).await {
            Deadline::Completed(Ok(me)) => {
                info!(bot_id = %me.user.id, generation, "Bot API reachable");
            }
            Deadline::Completed(Err(e)) => return Err(e.into()),
            Deadline::TimedOut => {
                return Err(TransportError::Timeout(
                    "getMe probe exceeded its deadline".to_string(),
                ))
            }
        }

        let listener = Polling::builder(bot.clone())
            .timeout(self.config.poll_timeout)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
            .build();

        let schema = dptree::entry()
            .branch(Update::filter_message().endpoint(on_message))
            .branch(Update::filter_callback_query().endpoint(on_callback));

        let messenger = Arc::new(TelegramMessenger::new(bot.clone()));
        let mut dispatcher = Dispatcher::builder(bot.clone(), schema)
            .dependencies(dptree::deps![
                Arc::clone(&self.ctx),
                messenger,
                Arc::clone(&self.fallback)
            ])
            .default_handler(|update| async move {
                debug!(update_id = ?update.id, "Ignoring unsupported update");
            })
            .build();
        let shutdown = dispatcher.shutdown_token();

        let error_signals = signals.clone();
        let on_listener_error = Arc::new(move |err: RequestError| {
            let signals = error_signals.clone();
            async move {
                let signal = ConnectionSignal::from_connection(
                    generation,
                    SignalKind::PollingError(TransportError::from(err)),
                );
                let _ = signals.send(signal);
            }
        });

        let task = tokio::spawn(async move {
            dispatcher
                .dispatch_with_listener(listener, on_listener_error)
                .await;
            let _ = signals.send(ConnectionSignal::from_connection(
                generation,
                SignalKind::ListenerStopped,
            ));
        });

        Ok(TelegramConnection {
            bot,
            shutdown,
            task,
        })
    }
}

/// A running dispatcher and its polling task
pub struct TelegramConnection {
    bot: Bot,
    shutdown: ShutdownToken,
    task: JoinHandle<()>,
}

#[async_trait]
impl Connection for TelegramConnection {
    async fn probe(&self) -> Result<(), TransportError> {
        self.bot.get_me().send().await?;
        Ok(())
    }

    async fn stop(&mut self) {
        if self.shutdown.shutdown().is_err() {
            debug!("Dispatcher was idle, aborting the polling task");
            self.task.abort();
        }
        // The caller bounds this wait; the task is aborted on drop either way
        let _ = (&mut self.task).await;
    }
}

impl Drop for TelegramConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}
