//! Message Handler module for commands, menu buttons and shared locations

use anyhow::Result;
use teloxide::types::{ChatId, ReplyMarkup};
use tracing::{debug, info};

use crate::clinic_model::{Clinic, GeoPoint, Language};
use crate::context::BotContext;
use crate::dialogue::Step;
use crate::directory::{DirectoryStore, DEFAULT_LISTING_LIMIT};
use crate::localization::t_lang;
use crate::transport::Messenger;

use super::dialogue_manager::complete_clinic_creation;
use super::ui_builder::{
    catalog_keyboard, format_clinic_card, format_help, format_nearest_clinics,
    language_keyboard, location_request_keyboard, main_menu_keyboard, next_clinic_keyboard,
};

/// Send `text` together with the main menu keyboard
pub async fn send_main_menu(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    language: Language,
    text: &str,
) -> Result<()> {
    let keyboard = main_menu_keyboard(language, ctx.is_admin(chat_id));
    messenger
        .send_text(chat_id, text, Some(ReplyMarkup::Keyboard(keyboard)))
        .await?;
    Ok(())
}

/// Clinic card with the district resolved in the given language
pub fn render_clinic_card(directory: &DirectoryStore, clinic: &Clinic, language: Language) -> String {
    let district = directory.district_name(&clinic.district, language);
    format_clinic_card(clinic, &district, language)
}

/// `/start`: reset the session to defaults and show the welcome menu
pub async fn handle_start(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
) -> Result<()> {
    let session = ctx.sessions.lock().await.init(chat_id);
    info!(chat_id = %chat_id, "Session started");

    send_main_menu(ctx, messenger, chat_id, session.language, &t_lang("welcome", session.language))
        .await
}

pub async fn handle_help(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
) -> Result<()> {
    let language = ctx.session(chat_id).await.language;
    send_main_menu(ctx, messenger, chat_id, language, &format_help(language)).await
}

/// `/catalog`: header with listing buttons, then the first clinic card
pub async fn handle_catalog(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
) -> Result<()> {
    let mut session = ctx.session(chat_id).await;
    let language = session.language;

    let first_card = {
        let directory = ctx.directory.lock().await;
        directory
            .clinics()
            .first()
            .map(|clinic| render_clinic_card(&directory, clinic, language))
    };

    let Some(card) = first_card else {
        messenger
            .send_text(chat_id, &t_lang("no-clinics", language), None)
            .await?;
        return Ok(());
    };

    session.step = Step::BrowsingCatalog { index: 0 };
    ctx.save_session(chat_id, session).await;

    messenger
        .send_text(
            chat_id,
            &format!("🏥 {}", t_lang("catalog", language)),
            Some(ReplyMarkup::InlineKeyboard(catalog_keyboard(language))),
        )
        .await?;
    messenger
        .send_text(
            chat_id,
            &card,
            Some(ReplyMarkup::InlineKeyboard(next_clinic_keyboard(language))),
        )
        .await?;
    Ok(())
}

pub async fn handle_location_button(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
) -> Result<()> {
    let language = ctx.session(chat_id).await.language;
    messenger
        .send_text(
            chat_id,
            &t_lang("share-location", language),
            Some(ReplyMarkup::Keyboard(location_request_keyboard(language))),
        )
        .await?;
    Ok(())
}

pub async fn handle_language_button(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
) -> Result<()> {
    let language = ctx.session(chat_id).await.language;
    messenger
        .send_text(
            chat_id,
            &t_lang("choose-language", language),
            Some(ReplyMarkup::InlineKeyboard(language_keyboard())),
        )
        .await?;
    Ok(())
}

/// A shared location either completes clinic creation or lists nearby clinics
pub async fn handle_location(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    point: GeoPoint,
) -> Result<()> {
    let mut session = ctx.session(chat_id).await;
    let language = session.language;

    if let Step::AwaitingClinicLocation(draft) = &session.step {
        if ctx.is_admin(chat_id) {
            let draft = draft.clone();
            return complete_clinic_creation(ctx, messenger, chat_id, session, draft, point).await;
        }
    }

    debug!(chat_id = %chat_id, "Storing user location");
    session.last_location = Some(point);
    ctx.save_session(chat_id, session).await;

    let listing = {
        let directory = ctx.directory.lock().await;
        let nearby = directory.find_nearest_clinics(point, DEFAULT_LISTING_LIMIT);
        format_nearest_clinics(&nearby, language)
    };

    send_main_menu(ctx, messenger, chat_id, language, &listing).await
}
