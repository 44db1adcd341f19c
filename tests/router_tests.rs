//! # Router Tests
//!
//! Routing of catalog and location events, plus the per-event retry and its
//! recovery path once attempts are exhausted.

mod common;

use std::time::Duration;

use anyhow::Result;
use teloxide::types::ChatId;
use tempfile::TempDir;

use clinic_directory_bot::bot::dispatch_event;
use clinic_directory_bot::clinic_model::{GeoPoint, Language};
use clinic_directory_bot::config::RetryPolicy;
use clinic_directory_bot::context::BotContext;
use clinic_directory_bot::dialogue::{ClinicDraft, Step};
use clinic_directory_bot::directory::DirectoryStore;
use clinic_directory_bot::fallback::FallbackHandler;
use clinic_directory_bot::localization::{t_args_lang, t_lang};
use clinic_directory_bot::resilience::{signal_channel, SignalKind, SignalReceiver};

use common::*;

fn fallback() -> (FallbackHandler, SignalReceiver) {
    let (tx, rx) = signal_channel();
    (FallbackHandler::new(tx, Duration::from_millis(500)), rx)
}

/// Context with production retry settings whose clinic file cannot be written
fn unwritable_context(dir: &TempDir) -> BotContext {
    let unwritable = dir.path().join("missing-dir").join("clinics.json");
    BotContext::new(
        DirectoryStore::with_path(unwritable, sample_clinics(), districts()),
        ADMIN,
        RetryPolicy::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_catalog_cycles_through_clinics() -> Result<()> {
    let ctx = in_memory_context();
    let messenger = RecordingMessenger::new();
    let (fallback, _rx) = fallback();

    dispatch_event(&ctx, &messenger, &fallback, text(USER, "/catalog")).await;
    assert_eq!(ctx.session(USER).await.step, Step::BrowsingCatalog { index: 0 });
    let texts = messenger.texts_to(USER);
    assert_eq!(texts.len(), 2);
    assert!(texts[1].contains("Shifo Med"));

    dispatch_event(&ctx, &messenger, &fallback, callback(USER, "next_clinic")).await;
    assert_eq!(ctx.session(USER).await.step, Step::BrowsingCatalog { index: 1 });
    assert!(messenger
        .last_text_to(USER)
        .unwrap()
        .contains("Yunusobod Diagnostika"));

    dispatch_event(&ctx, &messenger, &fallback, callback(USER, "next_clinic")).await;
    assert_eq!(ctx.session(USER).await.step, Step::BrowsingCatalog { index: 0 });
    assert!(messenger.last_text_to(USER).unwrap().contains("Shifo Med"));
    assert_eq!(messenger.answered().len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_next_clinic_leaves_other_flows_alone() -> Result<()> {
    let ctx = in_memory_context();
    let messenger = RecordingMessenger::new();
    let (fallback, _rx) = fallback();

    let mut session = ctx.session(ADMIN).await;
    session.step = Step::AwaitingBroadcast;
    ctx.save_session(ADMIN, session).await;

    dispatch_event(&ctx, &messenger, &fallback, callback(ADMIN, "next_clinic")).await;

    assert_eq!(ctx.session(ADMIN).await.step, Step::AwaitingBroadcast);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_empty_catalog() -> Result<()> {
    let ctx = context_with(DirectoryStore::in_memory(Vec::new(), districts()));
    let messenger = RecordingMessenger::new();
    let (fallback, _rx) = fallback();

    dispatch_event(&ctx, &messenger, &fallback, text(USER, "/catalog")).await;

    assert_eq!(
        messenger.texts_to(USER),
        vec![t_lang("no-clinics", Language::Ru)]
    );
    assert_eq!(ctx.session(USER).await.step, Step::Idle);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_location_then_nearest() -> Result<()> {
    let ctx = in_memory_context();
    let messenger = RecordingMessenger::new();
    let (fallback, _rx) = fallback();

    dispatch_event(&ctx, &messenger, &fallback, callback(USER, "nearest")).await;
    assert_eq!(
        messenger.last_text_to(USER),
        Some(t_lang("no-location", Language::Ru))
    );

    // Right next to Yunusobod Diagnostika
    dispatch_event(&ctx, &messenger, &fallback, location(USER, 41.365, 69.285)).await;
    assert_eq!(
        ctx.session(USER).await.last_location,
        Some(GeoPoint::new(41.365, 69.285))
    );
    let listing = messenger.last_text_to(USER).unwrap();
    assert!(listing.starts_with(&t_lang("nearest-clinics-title", Language::Ru)));
    let first = listing.find("Yunusobod Diagnostika").unwrap();
    let second = listing.find("Shifo Med").unwrap();
    assert!(first < second);

    dispatch_event(&ctx, &messenger, &fallback, callback(USER, "nearest")).await;
    assert_eq!(messenger.last_text_to(USER), Some(listing));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cheapest_listing() -> Result<()> {
    let ctx = in_memory_context();
    let messenger = RecordingMessenger::new();
    let (fallback, _rx) = fallback();

    dispatch_event(&ctx, &messenger, &fallback, callback(USER, "cheapest")).await;

    let listing = messenger.last_text_to(USER).unwrap();
    let first = listing.find("45000").unwrap();
    let second = listing.find("80000").unwrap();
    let third = listing.find("120000").unwrap();
    assert!(first < second && second < third);
    assert_eq!(messenger.answered(), vec!["cb-cheapest"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unknown_command_is_ignored() -> Result<()> {
    let ctx = in_memory_context();
    let messenger = RecordingMessenger::new();
    let (fallback, _rx) = fallback();

    dispatch_event(&ctx, &messenger, &fallback, text(USER, "/settings")).await;

    assert!(messenger.sent().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_notify_user_without_escalating() -> Result<()> {
    let ctx = in_memory_context();
    let messenger = RecordingMessenger::new();
    let (fallback, mut rx) = fallback();
    messenger.fail_for(USER);

    dispatch_event(&ctx, &messenger, &fallback, callback(USER, "cheapest")).await;

    // The callback is acknowledged even though every send failed
    assert_eq!(messenger.answered(), vec!["cb-cheapest"]);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_delete_escalates_without_replay() -> Result<()> {
    let dir = TempDir::new()?;
    let ctx = unwritable_context(&dir);
    let messenger = RecordingMessenger::new();
    let (fallback, mut rx) = fallback();

    dispatch_event(
        &ctx,
        &messenger,
        &fallback,
        callback(ADMIN, "delete_clinic_clinic1"),
    )
    .await;

    // A replay would have answered "clinic not found"
    assert_eq!(
        messenger.texts_to(ADMIN),
        vec![t_lang("error-retry", Language::Ru)]
    );
    assert_eq!(messenger.answered(), vec!["cb-delete_clinic_clinic1"]);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let signal = rx.try_recv().expect("fallback signal");
    assert_eq!(signal.generation, None);
    assert!(matches!(
        signal.kind,
        SignalKind::Unhandled(ref message) if message.contains("Persistence error")
    ));
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_clinic_save_is_reported_not_replayed() -> Result<()> {
    let dir = TempDir::new()?;
    let ctx = unwritable_context(&dir);
    let messenger = RecordingMessenger::new();
    let (fallback, mut rx) = fallback();

    let mut session = ctx.session(ADMIN).await;
    session.step = Step::AwaitingClinicLocation(ClinicDraft {
        name: "Clinic A".to_string(),
        phone: "+998901234567".to_string(),
        district_id: "chilonzor".to_string(),
        website: String::new(),
        working_hours: "9-18".to_string(),
    });
    ctx.save_session(ADMIN, session).await;

    dispatch_event(&ctx, &messenger, &fallback, location(ADMIN, 41.3, 69.2)).await;

    let session = ctx.session(ADMIN).await;
    assert_eq!(session.step, Step::Idle);
    assert_eq!(session.last_location, None);
    assert_eq!(
        messenger.texts_to(ADMIN),
        vec![t_lang("error-retry", Language::Ru)]
    );
    assert_eq!(
        ctx.directory
            .lock()
            .await
            .clinics()
            .iter()
            .filter(|c| c.name == "Clinic A")
            .count(),
        1
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(matches!(
        rx.try_recv().expect("fallback signal").kind,
        SignalKind::Unhandled(_)
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_slow_broadcast_reaches_every_recipient() -> Result<()> {
    let ctx = BotContext::new(
        DirectoryStore::in_memory(sample_clinics(), districts()),
        ADMIN,
        RetryPolicy::default(),
    );
    let messenger = RecordingMessenger::new();
    let (fallback, _rx) = fallback();

    for id in 1..=40 {
        ctx.session(ChatId(id)).await;
    }
    let mut session = ctx.session(ADMIN).await;
    session.step = Step::AwaitingBroadcast;
    ctx.save_session(ADMIN, session).await;

    // 41 recipients at 300ms each take far longer than one attempt's deadline
    messenger.set_send_delay(Duration::from_millis(300));
    let announcement = "Clinics close early on Friday";
    dispatch_event(&ctx, &messenger, &fallback, text(ADMIN, announcement)).await;

    for id in 1..=40 {
        assert_eq!(messenger.texts_to(ChatId(id)), vec![announcement.to_string()]);
    }
    assert_eq!(
        messenger.texts_to(ADMIN),
        vec![
            announcement.to_string(),
            t_args_lang(
                "broadcast-sent",
                &[("delivered", "41"), ("total", "41")],
                Language::Ru
            ),
        ]
    );
    assert_eq!(ctx.session(ADMIN).await.step, Step::Idle);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropped_prompt_is_retried_on_the_same_step() -> Result<()> {
    let ctx = in_memory_context();
    let messenger = RecordingMessenger::new();
    let (fallback, _rx) = fallback();

    let mut session = ctx.session(ADMIN).await;
    session.step = Step::AwaitingClinicName;
    ctx.save_session(ADMIN, session).await;

    messenger.drop_next_sends(1);
    dispatch_event(&ctx, &messenger, &fallback, text(ADMIN, "Clinic A")).await;

    assert_eq!(
        ctx.session(ADMIN).await.step,
        Step::AwaitingClinicPhone {
            name: "Clinic A".to_string()
        }
    );
    assert_eq!(
        messenger.texts_to(ADMIN),
        vec![t_lang("enter-clinic-phone", Language::Ru)]
    );

    let mut session = ctx.session(ADMIN).await;
    session.step = Step::AwaitingServiceNameRu {
        clinic_id: "clinic1".to_string(),
    };
    ctx.save_session(ADMIN, session).await;

    messenger.drop_next_sends(1);
    dispatch_event(&ctx, &messenger, &fallback, text(ADMIN, "Анализ крови")).await;

    assert_eq!(
        ctx.session(ADMIN).await.step,
        Step::AwaitingServiceNameUz {
            clinic_id: "clinic1".to_string(),
            name_ru: "Анализ крови".to_string(),
        }
    );
    Ok(())
}
