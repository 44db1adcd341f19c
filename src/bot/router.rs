//! Dispatch Router: maps inbound events to conversation entry points and wraps each
//! event in the bounded per-event retry.

use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use teloxide::types::ChatId;
use tracing::{debug, error, warn};

use crate::clinic_model::{GeoPoint, Language};
use crate::context::BotContext;
use crate::errors::BotError;
use crate::fallback::FallbackHandler;
use crate::localization::t_lang;
use crate::dialogue::Step;
use crate::retry::{retry_with_deadline_if, RetryExhausted};
use crate::transport::{InboundEvent, Messenger};

use super::ui_builder::{
    ADD_CLINIC_PREFIX, ADMIN_BROADCAST_PREFIX, ADMIN_CLINICS_PREFIX, ADMIN_PANEL_PREFIX,
    ADMIN_STATS_PREFIX, BACK_PREFIX, HELP_PREFIX, LANGUAGE_PREFIX, LOCATION_PREFIX,
};
use super::{admin_handler, callback_handler, dialogue_manager, message_handler};

lazy_static! {
    /// `/command` optionally addressed as `/command@botname`
    static ref COMMAND_REGEX: Regex =
        Regex::new(r"^/([A-Za-z0-9_]+)(?:@\w+)?(?:\s|$)").expect("Command pattern should be valid");
    static ref LANGUAGE_CALLBACK_REGEX: Regex =
        Regex::new(r"^lang_(\w+)$").expect("Language callback pattern should be valid");
    static ref CLINIC_CALLBACK_REGEX: Regex = Regex::new(r"^(delete_clinic|add_service)_(.+)$")
        .expect("Clinic callback pattern should be valid");
}

/// Parsed callback payload
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAction {
    SetLanguage(Language),
    Nearest,
    Cheapest,
    NextClinic,
    DeleteClinic(String),
    AddService(String),
    Unknown(String),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Self {
        match data {
            "nearest" => return CallbackAction::Nearest,
            "cheapest" => return CallbackAction::Cheapest,
            "next_clinic" => return CallbackAction::NextClinic,
            _ => {}
        }

        if let Some(caps) = LANGUAGE_CALLBACK_REGEX.captures(data) {
            return match Language::from_code(&caps[1]) {
                Some(language) => CallbackAction::SetLanguage(language),
                None => CallbackAction::Unknown(data.to_string()),
            };
        }

        if let Some(caps) = CLINIC_CALLBACK_REGEX.captures(data) {
            let clinic_id = caps[2].to_string();
            return match &caps[1] {
                "delete_clinic" => CallbackAction::DeleteClinic(clinic_id),
                _ => CallbackAction::AddService(clinic_id),
            };
        }

        CallbackAction::Unknown(data.to_string())
    }
}

/// Conversation entry point selected for an inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Start,
    Help,
    Catalog,
    AdminPanel,
    AdminStats,
    AdminBroadcast,
    AdminClinicsList,
    AdminAddClinic,
    AdminBack,
    LocationButton,
    LanguageButton,
    /// Free text for the multi-step input handlers
    TextInput(String),
    Location(GeoPoint),
    Callback(CallbackAction),
    /// Reserved command with no handler
    Ignored,
}

/// Select the entry point for an event without touching any state
pub fn route(event: &InboundEvent) -> Route {
    match event {
        InboundEvent::Text { text, .. } => route_text(text),
        InboundEvent::Location { point, .. } => Route::Location(*point),
        InboundEvent::Callback { data, .. } => Route::Callback(CallbackAction::parse(data)),
    }
}

fn route_text(text: &str) -> Route {
    if let Some(caps) = COMMAND_REGEX.captures(text) {
        return match &caps[1] {
            "start" => Route::Start,
            "help" => Route::Help,
            "catalog" => Route::Catalog,
            _ => Route::Ignored,
        };
    }
    if text.starts_with('/') {
        return Route::Ignored;
    }

    // Buttons always lead with their emoji; an emoji later in the text is plain input
    let prefixed = [
        (HELP_PREFIX, Route::Help),
        (ADMIN_PANEL_PREFIX, Route::AdminPanel),
        (ADMIN_STATS_PREFIX, Route::AdminStats),
        (ADMIN_BROADCAST_PREFIX, Route::AdminBroadcast),
        (ADMIN_CLINICS_PREFIX, Route::AdminClinicsList),
        (ADD_CLINIC_PREFIX, Route::AdminAddClinic),
        (BACK_PREFIX, Route::AdminBack),
        (LOCATION_PREFIX, Route::LocationButton),
        (LANGUAGE_PREFIX, Route::LanguageButton),
    ];

    prefixed
        .into_iter()
        .find(|(prefix, _)| text.starts_with(prefix))
        .map(|(_, route)| route)
        .unwrap_or_else(|| Route::TextInput(text.to_string()))
}

/// Run the handler selected for `event` once
pub async fn handle_event(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    event: &InboundEvent,
) -> Result<()> {
    let chat_id = event.chat_id();

    match route(event) {
        Route::Start => message_handler::handle_start(ctx, messenger, chat_id).await,
        Route::Help => message_handler::handle_help(ctx, messenger, chat_id).await,
        Route::Catalog => message_handler::handle_catalog(ctx, messenger, chat_id).await,
        Route::LocationButton => {
            message_handler::handle_location_button(ctx, messenger, chat_id).await
        }
        Route::LanguageButton => {
            message_handler::handle_language_button(ctx, messenger, chat_id).await
        }
        Route::Location(point) => {
            message_handler::handle_location(ctx, messenger, chat_id, point).await
        }
        Route::AdminPanel => admin_handler::handle_admin_panel(ctx, messenger, chat_id).await,
        Route::AdminStats => admin_handler::handle_admin_stats(ctx, messenger, chat_id).await,
        Route::AdminBroadcast => {
            admin_handler::handle_admin_broadcast(ctx, messenger, chat_id).await
        }
        Route::AdminClinicsList => {
            admin_handler::handle_clinics_list(ctx, messenger, chat_id).await
        }
        Route::AdminAddClinic => admin_handler::handle_add_clinic(ctx, messenger, chat_id).await,
        Route::AdminBack => admin_handler::handle_back(ctx, messenger, chat_id).await,
        Route::TextInput(text) => {
            dialogue_manager::handle_text_input(ctx, messenger, chat_id, &text).await
        }
        Route::Callback(action) => {
            callback_handler::handle_callback(ctx, messenger, event, action).await
        }
        Route::Ignored => {
            debug!(chat_id = %chat_id, "Ignoring unknown command");
            Ok(())
        }
    }
}

/// Deliver one event with bounded retries, recovering once they are exhausted
///
/// Persistence failures are not retried: the handler has already left its flow, so a
/// replay would run as a different action. They go to the fallback right away.
pub async fn dispatch_event(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    fallback: &FallbackHandler,
    event: InboundEvent,
) {
    let chat_id = event.chat_id();

    let result = if completes_broadcast(ctx, &event).await {
        // Delivery must reach every recipient, so it runs once and without the deadline
        handle_event(ctx, messenger, &event)
            .await
            .map_err(|last_error| RetryExhausted {
                attempts: 1,
                last_error,
            })
    } else {
        retry_with_deadline_if(
            &ctx.retry,
            |e| !is_persistence_error(e),
            || handle_event(ctx, messenger, &event),
        )
        .await
    };

    let Err(exhausted) = result else {
        return;
    };

    error!(
        chat_id = %chat_id,
        attempts = exhausted.attempts,
        error = %exhausted.last_error,
        "Giving up on event"
    );

    notify_failure(ctx, messenger, chat_id, &event).await;

    if is_persistence_error(&exhausted.last_error) {
        fallback.report("router", &exhausted.last_error);
    }
}

fn is_persistence_error(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<BotError>()
        .is_some_and(BotError::is_persistence)
}

/// Admin free text answering the broadcast prompt
async fn completes_broadcast(ctx: &BotContext, event: &InboundEvent) -> bool {
    let InboundEvent::Text { chat_id, .. } = event else {
        return false;
    };
    ctx.is_admin(*chat_id)
        && matches!(route(event), Route::TextInput(_))
        && ctx.session(*chat_id).await.step == Step::AwaitingBroadcast
}

async fn notify_failure(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    event: &InboundEvent,
) {
    let language = ctx.session(chat_id).await.language;

    if let Err(e) = messenger
        .send_text(chat_id, &t_lang("error-retry", language), None)
        .await
    {
        warn!(chat_id = %chat_id, error = %e, "Failed to send error message");
    }

    if let Some(callback_id) = event.callback_id() {
        if let Err(e) = messenger.answer_callback(callback_id).await {
            warn!(chat_id = %chat_id, error = %e, "Failed to answer callback query");
        }
    }
}
