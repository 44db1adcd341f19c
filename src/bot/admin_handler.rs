//! Admin Handler module for the admin panel, statistics, broadcasts and clinic management

use anyhow::Result;
use teloxide::types::{ChatId, ReplyMarkup};
use tracing::{debug, info, warn};

use crate::clinic_model::{Clinic, Language};
use crate::context::BotContext;
use crate::dialogue::Step;
use crate::localization::{t_args_lang, t_lang};
use crate::transport::Messenger;

use super::message_handler::{render_clinic_card, send_main_menu};
use super::ui_builder::{
    admin_panel_keyboard, clinic_actions_keyboard, clinic_management_keyboard, format_stats,
};

/// Outcome of delivering a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub total: usize,
}

pub async fn handle_admin_panel(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
) -> Result<()> {
    let language = ctx.session(chat_id).await.language;

    if !ctx.is_admin(chat_id) {
        warn!(chat_id = %chat_id, "Unauthorized admin panel request");
        messenger
            .send_text(chat_id, &t_lang("not-authorized", language), None)
            .await?;
        return Ok(());
    }

    messenger
        .send_text(
            chat_id,
            &t_lang("admin-panel-welcome", language),
            Some(ReplyMarkup::Keyboard(admin_panel_keyboard(language))),
        )
        .await?;
    Ok(())
}

pub async fn handle_admin_stats(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
) -> Result<()> {
    if !ctx.is_admin(chat_id) {
        return Ok(());
    }

    let language = ctx.session(chat_id).await.language;
    let (total, active, subscribed) = {
        let sessions = ctx.sessions.lock().await;
        (
            sessions.len(),
            sessions.active_users(),
            sessions.subscribed_users(),
        )
    };

    messenger
        .send_text(chat_id, &format_stats(total, active, subscribed, language), None)
        .await?;
    Ok(())
}

pub async fn handle_admin_broadcast(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
) -> Result<()> {
    if !ctx.is_admin(chat_id) {
        return Ok(());
    }

    let mut session = ctx.session(chat_id).await;
    let language = session.language;
    session.step = Step::AwaitingBroadcast;
    ctx.save_session(chat_id, session).await;

    messenger
        .send_text(chat_id, &t_lang("enter-broadcast-message", language), None)
        .await?;
    Ok(())
}

/// Send `text` to every known chat; individual failures are logged and skipped
pub async fn deliver_broadcast(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    text: &str,
) -> BroadcastReport {
    let recipients = ctx.sessions.lock().await.chat_ids();
    let total = recipients.len();
    let mut delivered = 0;

    for recipient in recipients {
        match messenger.send_text(recipient, text, None).await {
            Ok(()) => delivered += 1,
            Err(e) => {
                warn!(chat_id = %recipient, error = %e, "Broadcast delivery failed");
            }
        }
    }

    info!(delivered, total, "Broadcast finished");
    BroadcastReport { delivered, total }
}

/// Broadcast the admin's message, then report the counts back
pub async fn complete_broadcast(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    language: Language,
    text: &str,
) -> Result<()> {
    let mut session = ctx.session(chat_id).await;
    session.reset_step();
    ctx.save_session(chat_id, session).await;

    let report = deliver_broadcast(ctx, messenger, text).await;
    let delivered = report.delivered.to_string();
    let total = report.total.to_string();

    messenger
        .send_text(
            chat_id,
            &t_args_lang(
                "broadcast-sent",
                &[("delivered", &delivered), ("total", &total)],
                language,
            ),
            Some(ReplyMarkup::Keyboard(admin_panel_keyboard(language))),
        )
        .await?;
    Ok(())
}

/// Send the clinic management keyboard with `header` as text
pub async fn send_clinics_list(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    language: Language,
    header: &str,
) -> Result<()> {
    let keyboard = {
        let directory = ctx.directory.lock().await;
        clinic_management_keyboard(directory.clinics(), language)
    };

    messenger
        .send_text(chat_id, header, Some(ReplyMarkup::Keyboard(keyboard)))
        .await?;
    Ok(())
}

pub async fn handle_clinics_list(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
) -> Result<()> {
    if !ctx.is_admin(chat_id) {
        return Ok(());
    }

    let language = ctx.session(chat_id).await.language;
    send_clinics_list(
        ctx,
        messenger,
        chat_id,
        language,
        &t_lang("clinic-management", language),
    )
    .await
}

pub async fn handle_add_clinic(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
) -> Result<()> {
    if !ctx.is_admin(chat_id) {
        return Ok(());
    }

    let mut session = ctx.session(chat_id).await;
    let language = session.language;
    session.step = Step::AwaitingClinicName;
    ctx.save_session(chat_id, session).await;

    messenger
        .send_text(
            chat_id,
            &t_lang("enter-clinic-name", language),
            Some(ReplyMarkup::kb_remove()),
        )
        .await?;
    Ok(())
}

/// Leave whatever flow is active and return to the main menu
pub async fn handle_back(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
) -> Result<()> {
    if !ctx.is_admin(chat_id) {
        return Ok(());
    }

    let mut session = ctx.session(chat_id).await;
    let language = session.language;
    if session.step.has_scratch() {
        debug!(chat_id = %chat_id, step = ?session.step, "Dropping in-progress input");
    }
    session.reset_step();
    ctx.save_session(chat_id, session).await;

    send_main_menu(ctx, messenger, chat_id, language, &t_lang("welcome", language)).await
}

/// Clinic card with the add-service and delete actions
pub async fn send_clinic_details(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    language: Language,
    clinic: &Clinic,
) -> Result<()> {
    let card = {
        let directory = ctx.directory.lock().await;
        render_clinic_card(&directory, clinic, language)
    };

    messenger
        .send_text(
            chat_id,
            &format!("{}\n\n{}", t_lang("manage-clinic", language), card),
            Some(ReplyMarkup::InlineKeyboard(clinic_actions_keyboard(
                &clinic.id, language,
            ))),
        )
        .await?;
    Ok(())
}
