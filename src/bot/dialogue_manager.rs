//! Dialogue Manager module for the multi-step text input flows
//!
//! Each handler validates the input for the current [`Step`], prompts for the
//! following field and only then stores the next step carrying the accumulated
//! data, so a failed prompt leaves the step untouched for the retry. Invalid input
//! re-prompts without changing the step.

use anyhow::Result;
use teloxide::types::{ChatId, ReplyMarkup};
use tracing::{debug, info};

use crate::clinic_model::{Clinic, GeoPoint, Language, LocalizedName, Service};
use crate::context::BotContext;
use crate::dialogue::{parse_price, validate_text_field, ClinicDraft, Step};
use crate::localization::t_lang;
use crate::session::Session;
use crate::transport::Messenger;

use super::admin_handler::{complete_broadcast, send_clinic_details, send_clinics_list};
use super::ui_builder::{clinic_location_keyboard, district_keyboard, website_keyboard};

async fn prompt(
    messenger: &dyn Messenger,
    chat_id: ChatId,
    key: &str,
    language: Language,
    markup: Option<ReplyMarkup>,
) -> Result<()> {
    messenger
        .send_text(chat_id, &t_lang(key, language), markup)
        .await?;
    Ok(())
}

async fn district_names(ctx: &BotContext, language: Language) -> Vec<String> {
    ctx.directory
        .lock()
        .await
        .districts()
        .iter()
        .map(|district| district.name.get(language).to_string())
        .collect()
}

/// Free text that is neither a command nor a menu button
pub async fn handle_text_input(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    text: &str,
) -> Result<()> {
    if !ctx.is_admin(chat_id) {
        debug!(chat_id = %chat_id, "Ignoring free text from non-admin");
        return Ok(());
    }

    let session = ctx.session(chat_id).await;
    let language = session.language;

    match session.step.clone() {
        Step::Idle => handle_clinic_selection(ctx, messenger, chat_id, language, text).await,
        Step::BrowsingCatalog { .. } => Ok(()),
        Step::AwaitingBroadcast => {
            complete_broadcast(ctx, messenger, chat_id, language, text).await
        }
        Step::AwaitingClinicName => {
            let Ok(name) = validate_text_field(text) else {
                return prompt(messenger, chat_id, "invalid-text", language, None).await;
            };
            prompt(messenger, chat_id, "enter-clinic-phone", language, None).await?;
            advance(ctx, chat_id, session, Step::AwaitingClinicPhone { name }).await;
            Ok(())
        }
        Step::AwaitingClinicPhone { name } => {
            let Ok(phone) = validate_text_field(text) else {
                return prompt(messenger, chat_id, "invalid-text", language, None).await;
            };
            let keyboard = district_keyboard(&district_names(ctx, language).await, language);
            prompt(
                messenger,
                chat_id,
                "select-clinic-district",
                language,
                Some(ReplyMarkup::Keyboard(keyboard)),
            )
            .await?;
            advance(ctx, chat_id, session, Step::AwaitingClinicDistrict { name, phone }).await;
            Ok(())
        }
        Step::AwaitingClinicDistrict { name, phone } => {
            let district_id = ctx
                .directory
                .lock()
                .await
                .find_district_by_name(text.trim(), language)
                .map(|district| district.id.clone());

            let Some(district_id) = district_id else {
                let keyboard = district_keyboard(&district_names(ctx, language).await, language);
                return prompt(
                    messenger,
                    chat_id,
                    "invalid-district",
                    language,
                    Some(ReplyMarkup::Keyboard(keyboard)),
                )
                .await;
            };

            let next = Step::AwaitingClinicWebsite {
                name,
                phone,
                district_id,
            };
            prompt(
                messenger,
                chat_id,
                "enter-clinic-website",
                language,
                Some(ReplyMarkup::Keyboard(website_keyboard(language))),
            )
            .await?;
            advance(ctx, chat_id, session, next).await;
            Ok(())
        }
        Step::AwaitingClinicWebsite {
            name,
            phone,
            district_id,
        } => {
            let website = if text.trim() == t_lang("no-website", language) {
                String::new()
            } else {
                match validate_text_field(text) {
                    Ok(website) => website,
                    Err(_) => {
                        return prompt(messenger, chat_id, "invalid-text", language, None).await
                    }
                }
            };

            let next = Step::AwaitingClinicHours {
                name,
                phone,
                district_id,
                website,
            };
            prompt(
                messenger,
                chat_id,
                "enter-clinic-hours",
                language,
                Some(ReplyMarkup::kb_remove()),
            )
            .await?;
            advance(ctx, chat_id, session, next).await;
            Ok(())
        }
        Step::AwaitingClinicHours {
            name,
            phone,
            district_id,
            website,
        } => {
            let Ok(working_hours) = validate_text_field(text) else {
                return prompt(messenger, chat_id, "invalid-text", language, None).await;
            };

            let draft = ClinicDraft {
                name,
                phone,
                district_id,
                website,
                working_hours,
            };
            prompt(
                messenger,
                chat_id,
                "share-clinic-location",
                language,
                Some(ReplyMarkup::Keyboard(clinic_location_keyboard(language))),
            )
            .await?;
            advance(ctx, chat_id, session, Step::AwaitingClinicLocation(draft)).await;
            Ok(())
        }
        // Only a location completes this step
        Step::AwaitingClinicLocation(_) => {
            prompt(
                messenger,
                chat_id,
                "share-clinic-location",
                language,
                Some(ReplyMarkup::Keyboard(clinic_location_keyboard(language))),
            )
            .await
        }
        Step::AwaitingServiceNameRu { clinic_id } => {
            let Ok(name_ru) = validate_text_field(text) else {
                return prompt(messenger, chat_id, "invalid-text", language, None).await;
            };
            prompt(messenger, chat_id, "enter-service-name-uz", language, None).await?;
            advance(ctx, chat_id, session, Step::AwaitingServiceNameUz { clinic_id, name_ru }).await;
            Ok(())
        }
        Step::AwaitingServiceNameUz { clinic_id, name_ru } => {
            let Ok(name_uz) = validate_text_field(text) else {
                return prompt(messenger, chat_id, "invalid-text", language, None).await;
            };
            let next = Step::AwaitingServicePrice {
                clinic_id,
                name: LocalizedName::new(name_ru, name_uz),
            };
            prompt(messenger, chat_id, "enter-service-price", language, None).await?;
            advance(ctx, chat_id, session, next).await;
            Ok(())
        }
        Step::AwaitingServicePrice { clinic_id, name } => {
            let Ok(price) = parse_price(text) else {
                return prompt(messenger, chat_id, "invalid-price", language, None).await;
            };
            complete_service_creation(ctx, messenger, chat_id, session, clinic_id, name, price)
                .await
        }
    }
}

async fn advance(ctx: &BotContext, chat_id: ChatId, mut session: Session, next: Step) {
    debug!(chat_id = %chat_id, step = ?next, "Advancing dialogue");
    session.step = next;
    ctx.save_session(chat_id, session).await;
}

/// Idle admin text naming a clinic opens its management card
async fn handle_clinic_selection(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    language: Language,
    text: &str,
) -> Result<()> {
    let clinic = ctx.directory.lock().await.find_by_name(text).cloned();

    match clinic {
        Some(clinic) => send_clinic_details(ctx, messenger, chat_id, language, &clinic).await,
        None => {
            debug!(chat_id = %chat_id, "Idle text matches no clinic");
            Ok(())
        }
    }
}

/// Create the clinic from the collected draft and the shared location
pub async fn complete_clinic_creation(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    mut session: Session,
    draft: ClinicDraft,
    location: GeoPoint,
) -> Result<()> {
    let language = session.language;

    let outcome = {
        let mut directory = ctx.directory.lock().await;
        let clinic = Clinic {
            id: directory.next_clinic_id(),
            name: draft.name,
            district: draft.district_id,
            location,
            website: draft.website,
            phone: draft.phone,
            working_hours: draft.working_hours,
            services: Vec::new(),
        };
        info!(chat_id = %chat_id, clinic_id = %clinic.id, "Creating clinic");
        directory.add_clinic(clinic)
    };

    // The clinic is in memory even when the write failed; a retry must not add it twice
    session.reset_step();
    ctx.save_session(chat_id, session).await;
    outcome?;

    send_clinics_list(
        ctx,
        messenger,
        chat_id,
        language,
        &t_lang("clinic-added", language),
    )
    .await
}

async fn complete_service_creation(
    ctx: &BotContext,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    mut session: Session,
    clinic_id: String,
    name: LocalizedName,
    price: u64,
) -> Result<()> {
    let language = session.language;

    let outcome = {
        let mut directory = ctx.directory.lock().await;
        let service = Service {
            id: directory.next_service_id(&clinic_id),
            name,
            price,
            description: None,
        };
        directory.append_service(&clinic_id, service)
    };

    session.reset_step();
    ctx.save_session(chat_id, session).await;

    match outcome? {
        Some(clinic) => {
            prompt(messenger, chat_id, "service-added", language, None).await?;
            send_clinic_details(ctx, messenger, chat_id, language, &clinic).await
        }
        None => prompt(messenger, chat_id, "clinic-not-found", language, None).await,
    }
}
