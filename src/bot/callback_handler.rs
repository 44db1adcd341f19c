//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use teloxide::types::{ChatId, MessageId, ReplyMarkup};
use tracing::{debug, info, warn};

use crate::context::BotContext;
use crate::dialogue::Step;
use crate::directory::DEFAULT_LISTING_LIMIT;
use crate::localization::t_lang;
use crate::transport::{InboundEvent, Messenger};

use super::admin_handler::send_clinics_list;
use super::message_handler::{render_clinic_card, send_main_menu};
use super::router::CallbackAction;
use super::ui_builder::{format_cheapest_services, format_nearest_clinics, next_clinic_keyboard};

/// Handle a button press and acknowledge it once handled
pub async fn handle_callback(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    event: &InboundEvent,
    action: CallbackAction,
) -> Result<()> {
    let InboundEvent::Callback {
        chat_id,
        message_id,
        callback_id,
        ..
    } = event
    else {
        return Ok(());
    };
    let chat_id = *chat_id;
    debug!(chat_id = %chat_id, action = ?action, "Received callback query");

    match action {
        CallbackAction::SetLanguage(language) => {
            let mut session = ctx.session(chat_id).await;
            session.language = language;
            ctx.save_session(chat_id, session).await;
            info!(chat_id = %chat_id, language = %language, "Language changed");

            send_main_menu(ctx, messenger, chat_id, language, &t_lang("language-changed", language))
                .await?;
        }
        CallbackAction::Nearest => handle_nearest(ctx, messenger, chat_id).await?,
        CallbackAction::Cheapest => handle_cheapest(ctx, messenger, chat_id).await?,
        CallbackAction::NextClinic => handle_next_clinic(ctx, messenger, chat_id).await?,
        CallbackAction::DeleteClinic(clinic_id) => {
            handle_delete_clinic(ctx, messenger, chat_id, *message_id, &clinic_id).await?
        }
        CallbackAction::AddService(clinic_id) => {
            handle_add_service(ctx, messenger, chat_id, &clinic_id).await?
        }
        CallbackAction::Unknown(data) => {
            debug!(chat_id = %chat_id, data = %data, "Ignoring unknown callback");
        }
    }

    messenger.answer_callback(callback_id).await?;
    Ok(())
}

async fn handle_nearest(ctx: &BotContext, messenger: &dyn Messenger, chat_id: ChatId) -> Result<()> {
    let session = ctx.session(chat_id).await;
    let language = session.language;

    let Some(origin) = session.last_location else {
        messenger
            .send_text(chat_id, &t_lang("no-location", language), None)
            .await?;
        return Ok(());
    };

    let listing = {
        let directory = ctx.directory.lock().await;
        format_nearest_clinics(
            &directory.find_nearest_clinics(origin, DEFAULT_LISTING_LIMIT),
            language,
        )
    };
    messenger.send_text(chat_id, &listing, None).await?;
    Ok(())
}

async fn handle_cheapest(ctx: &BotContext, messenger: &dyn Messenger, chat_id: ChatId) -> Result<()> {
    let language = ctx.session(chat_id).await.language;

    let listing = {
        let directory = ctx.directory.lock().await;
        format_cheapest_services(&directory.cheapest_services(DEFAULT_LISTING_LIMIT), language)
    };
    messenger.send_text(chat_id, &listing, None).await?;
    Ok(())
}

/// Advance the catalog browser, wrapping around after the last clinic
async fn handle_next_clinic(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
) -> Result<()> {
    let mut session = ctx.session(chat_id).await;
    let language = session.language;
    let current = match session.step {
        Step::BrowsingCatalog { index } => index,
        _ => 0,
    };

    let card = {
        let directory = ctx.directory.lock().await;
        let clinics = directory.clinics();
        if clinics.is_empty() {
            None
        } else {
            let next = (current + 1) % clinics.len();
            Some((next, render_clinic_card(&directory, &clinics[next], language)))
        }
    };

    let Some((next, card)) = card else {
        messenger
            .send_text(chat_id, &t_lang("no-clinics", language), None)
            .await?;
        return Ok(());
    };

    // An unrelated flow in progress keeps its step
    if matches!(session.step, Step::Idle | Step::BrowsingCatalog { .. }) {
        session.step = Step::BrowsingCatalog { index: next };
        ctx.save_session(chat_id, session).await;
    }

    messenger
        .send_text(
            chat_id,
            &card,
            Some(ReplyMarkup::InlineKeyboard(next_clinic_keyboard(language))),
        )
        .await?;
    Ok(())
}

async fn handle_delete_clinic(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    message_id: Option<MessageId>,
    clinic_id: &str,
) -> Result<()> {
    let mut session = ctx.session(chat_id).await;
    let language = session.language;

    if !ctx.is_admin(chat_id) {
        warn!(chat_id = %chat_id, "Unauthorized clinic deletion");
        messenger
            .send_text(chat_id, &t_lang("not-authorized", language), None)
            .await?;
        return Ok(());
    }

    let deleted = ctx.directory.lock().await.delete_clinic(clinic_id)?;
    session.reset_step();
    ctx.save_session(chat_id, session).await;

    if !deleted {
        messenger
            .send_text(chat_id, &t_lang("clinic-not-found", language), None)
            .await?;
        return Ok(());
    }

    match message_id {
        Some(message_id) => {
            messenger
                .edit_text(chat_id, message_id, &t_lang("clinic-deleted", language))
                .await?
        }
        None => {
            messenger
                .send_text(chat_id, &t_lang("clinic-deleted", language), None)
                .await?
        }
    }

    send_clinics_list(
        ctx,
        messenger,
        chat_id,
        language,
        &t_lang("clinic-management", language),
    )
    .await
}

async fn handle_add_service(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    clinic_id: &str,
) -> Result<()> {
    let mut session = ctx.session(chat_id).await;
    let language = session.language;

    if !ctx.is_admin(chat_id) {
        warn!(chat_id = %chat_id, "Unauthorized service creation");
        messenger
            .send_text(chat_id, &t_lang("not-authorized", language), None)
            .await?;
        return Ok(());
    }

    if ctx.directory.lock().await.find_by_id(clinic_id).is_none() {
        messenger
            .send_text(chat_id, &t_lang("clinic-not-found", language), None)
            .await?;
        return Ok(());
    }

    session.step = Step::AwaitingServiceNameRu {
        clinic_id: clinic_id.to_string(),
    };
    ctx.save_session(chat_id, session).await;

    messenger
        .send_text(chat_id, &t_lang("enter-service-name-ru", language), None)
        .await?;
    Ok(())
}
