//! UI Builder module for creating keyboards and formatting messages
//!
//! Button captions are localized values prefixed with the emoji the router
//! recognizes, so a press on a reply keyboard routes back to the right handler.

use teloxide::types::{
    ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
};

use crate::clinic_model::{Clinic, Language, NearbyClinic, Service};
use crate::geo::format_distance;
use crate::localization::t_lang;

pub const HELP_PREFIX: &str = "❓";
pub const ADMIN_PANEL_PREFIX: &str = "⚙️";
pub const ADMIN_STATS_PREFIX: &str = "📊";
pub const ADMIN_BROADCAST_PREFIX: &str = "📢";
pub const ADMIN_CLINICS_PREFIX: &str = "🏥";
pub const ADD_CLINIC_PREFIX: &str = "➕";
pub const BACK_PREFIX: &str = "⬅️";
pub const LOCATION_PREFIX: &str = "📍";
pub const LANGUAGE_PREFIX: &str = "🌐";

fn caption(prefix: &str, key: &str, language: Language) -> String {
    format!("{} {}", prefix, t_lang(key, language))
}

/// Reply keyboard shown after /start, language changes and back navigation
pub fn main_menu_keyboard(language: Language, is_admin: bool) -> KeyboardMarkup {
    let mut rows = vec![
        vec![
            KeyboardButton::new(caption(LOCATION_PREFIX, "send-location", language)),
            KeyboardButton::new(caption(LANGUAGE_PREFIX, "change-language", language)),
        ],
        vec![KeyboardButton::new(caption(HELP_PREFIX, "help", language))],
    ];

    if is_admin {
        rows.push(vec![KeyboardButton::new(caption(
            ADMIN_PANEL_PREFIX,
            "admin-panel",
            language,
        ))]);
    }

    KeyboardMarkup::new(rows).resize_keyboard()
}

/// One-button keyboard asking the client to share its location
pub fn location_request_keyboard(language: Language) -> KeyboardMarkup {
    let button = KeyboardButton::new(caption(LOCATION_PREFIX, "send-location", language))
        .request(ButtonRequest::Location);

    KeyboardMarkup::new(vec![vec![button]])
        .resize_keyboard()
        .one_time_keyboard()
}

pub fn language_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("🇷🇺 Русский", "lang_ru"),
        InlineKeyboardButton::callback("🇺🇿 O'zbekcha", "lang_uz"),
    ]])
}

pub fn catalog_keyboard(language: Language) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(caption("📍", "nearest", language), "nearest"),
        InlineKeyboardButton::callback(caption("💰", "cheapest", language), "cheapest"),
    ]])
}

pub fn next_clinic_keyboard(language: Language) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        t_lang("next-clinic", language),
        "next_clinic",
    )]])
}

pub fn admin_panel_keyboard(language: Language) -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new(caption(ADMIN_STATS_PREFIX, "admin-stats", language)),
            KeyboardButton::new(caption(ADMIN_BROADCAST_PREFIX, "admin-broadcast", language)),
        ],
        vec![KeyboardButton::new(caption(
            ADMIN_CLINICS_PREFIX,
            "admin-clinics-list",
            language,
        ))],
        vec![back_button(language)],
    ])
    .resize_keyboard()
}

/// "Add clinic", one plain button per clinic name (pressing it selects the clinic), and back
pub fn clinic_management_keyboard(clinics: &[Clinic], language: Language) -> KeyboardMarkup {
    let mut rows = vec![vec![KeyboardButton::new(caption(
        ADD_CLINIC_PREFIX,
        "add-clinic",
        language,
    ))]];
    rows.extend(
        clinics
            .iter()
            .map(|clinic| vec![KeyboardButton::new(clinic.name.clone())]),
    );
    rows.push(vec![back_button(language)]);

    KeyboardMarkup::new(rows).resize_keyboard()
}

pub fn clinic_actions_keyboard(clinic_id: &str, language: Language) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            caption(ADD_CLINIC_PREFIX, "add-service", language),
            format!("add_service_{}", clinic_id),
        )],
        vec![InlineKeyboardButton::callback(
            caption("🗑️", "delete-clinic", language),
            format!("delete_clinic_{}", clinic_id),
        )],
    ])
}

/// District names in the session language, two per row
pub fn district_keyboard(district_names: &[String], language: Language) -> KeyboardMarkup {
    let mut rows: Vec<Vec<KeyboardButton>> = district_names
        .chunks(2)
        .map(|pair| pair.iter().map(|name| KeyboardButton::new(name.clone())).collect())
        .collect();
    rows.push(vec![back_button(language)]);

    KeyboardMarkup::new(rows).resize_keyboard()
}

/// Offers the localized "no website" answer as a button
pub fn website_keyboard(language: Language) -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(t_lang("no-website", language))],
        vec![back_button(language)],
    ])
    .resize_keyboard()
}

pub fn clinic_location_keyboard(language: Language) -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(caption(LOCATION_PREFIX, "send-location", language))
            .request(ButtonRequest::Location)],
        vec![back_button(language)],
    ])
    .resize_keyboard()
}

fn back_button(language: Language) -> KeyboardButton {
    KeyboardButton::new(caption(BACK_PREFIX, "back", language))
}

pub fn format_help(language: Language) -> String {
    format!(
        "/start - {}\n/help - {}\n/catalog - {}\n\n{}\n{} - {}\n{} - {}",
        t_lang("help-start", language),
        t_lang("help-help", language),
        t_lang("help-catalog", language),
        t_lang("help-extra", language),
        LOCATION_PREFIX,
        t_lang("help-location", language),
        LANGUAGE_PREFIX,
        t_lang("help-language", language),
    )
}

pub fn format_price(price: u64, language: Language) -> String {
    format!("{} {}", price, t_lang("currency", language))
}

/// Full clinic card used by the catalog browser and the admin clinic view
pub fn format_clinic_card(clinic: &Clinic, district_name: &str, language: Language) -> String {
    let phone = if clinic.phone.is_empty() {
        t_lang("no-phone", language)
    } else {
        clinic.phone.clone()
    };
    let website = if clinic.website.is_empty() {
        t_lang("no-website", language)
    } else {
        clinic.website.clone()
    };

    let mut card = format!(
        "🏥 {}\n📍 {}\n📞 {}\n🕒 {}\n🌐 {}\n\n{}:\n",
        clinic.name,
        district_name,
        phone,
        clinic.working_hours,
        website,
        t_lang("services", language),
    );

    if clinic.services.is_empty() {
        card.push_str(&t_lang("no-services", language));
    } else {
        for service in &clinic.services {
            card.push_str(&format!(
                "• {} - {}\n",
                service.name.get(language),
                format_price(service.price, language)
            ));
        }
    }

    card
}

pub fn format_nearest_clinics(nearby: &[NearbyClinic], language: Language) -> String {
    if nearby.is_empty() {
        return t_lang("no-clinics", language);
    }

    let mut result = format!("{}\n\n", t_lang("nearest-clinics-title", language));
    for (i, entry) in nearby.iter().enumerate() {
        result.push_str(&format!(
            "{}. {}\n📍 {}: {} {}\n",
            i + 1,
            entry.clinic.name,
            t_lang("distance", language),
            format_distance(entry.distance_km),
            t_lang("km", language),
        ));
        if !entry.clinic.phone.is_empty() {
            result.push_str(&format!("📞 {}\n", entry.clinic.phone));
        }
        result.push('\n');
    }

    result
}

pub fn format_cheapest_services(entries: &[(&Clinic, &Service)], language: Language) -> String {
    if entries.is_empty() {
        return t_lang("no-services", language);
    }

    let mut result = format!("{}\n\n", t_lang("cheapest-services", language));
    for (i, (clinic, service)) in entries.iter().enumerate() {
        result.push_str(&format!(
            "{}. {} - {}\n🏥 {}\n\n",
            i + 1,
            service.name.get(language),
            format_price(service.price, language),
            clinic.name,
        ));
    }

    result
}

pub fn format_stats(total: usize, active: usize, subscribed: usize, language: Language) -> String {
    format!(
        "📊 {}\n\n{}: {}\n{}: {}\n{}: {}",
        t_lang("stats-title", language),
        t_lang("total-users", language),
        total,
        t_lang("active-users", language),
        active,
        t_lang("subscribed-users", language),
        subscribed,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinic_model::{GeoPoint, LocalizedName};

    fn clinic(services: Vec<Service>) -> Clinic {
        Clinic {
            id: "clinic1".to_string(),
            name: "Shifo Med".to_string(),
            district: "chilonzor".to_string(),
            location: GeoPoint::new(41.28, 69.2),
            website: String::new(),
            phone: "+998901234567".to_string(),
            working_hours: "9-18".to_string(),
            services,
        }
    }

    #[test]
    fn test_main_menu_has_admin_row_only_for_admin() {
        let user_menu = main_menu_keyboard(Language::Ru, false);
        let admin_menu = main_menu_keyboard(Language::Ru, true);

        assert_eq!(user_menu.keyboard.len(), 2);
        assert_eq!(admin_menu.keyboard.len(), 3);
        assert!(admin_menu.keyboard[2][0].text.starts_with(ADMIN_PANEL_PREFIX));
    }

    #[test]
    fn test_clinic_actions_carry_clinic_id() {
        let markup = clinic_actions_keyboard("clinic42", Language::Uz);
        let buttons: Vec<_> = markup.inline_keyboard.iter().flatten().collect();

        assert_eq!(buttons.len(), 2);
        assert!(buttons.iter().any(|b| matches!(
            &b.kind,
            teloxide::types::InlineKeyboardButtonKind::CallbackData(data) if data == "add_service_clinic42"
        )));
        assert!(buttons.iter().any(|b| matches!(
            &b.kind,
            teloxide::types::InlineKeyboardButtonKind::CallbackData(data) if data == "delete_clinic_clinic42"
        )));
    }

    #[test]
    fn test_clinic_card_uses_fallbacks() {
        let card = format_clinic_card(&clinic(vec![]), "Чиланзар", Language::Ru);

        assert!(card.contains("Shifo Med"));
        assert!(card.contains("Чиланзар"));
        assert!(card.contains(&t_lang("no-website", Language::Ru)));
        assert!(card.contains(&t_lang("no-services", Language::Ru)));
    }

    #[test]
    fn test_clinic_card_lists_services_in_language() {
        let service = Service {
            id: "service1".to_string(),
            name: LocalizedName::new("Анализ крови", "Qon tahlili"),
            price: 45000,
            description: None,
        };
        let card = format_clinic_card(&clinic(vec![service]), "Chilonzor", Language::Uz);

        assert!(card.contains("Qon tahlili"));
        assert!(card.contains("45000"));
    }

    #[test]
    fn test_district_keyboard_pairs_names() {
        let names: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let markup = district_keyboard(&names, Language::Ru);

        // two rows of districts plus back
        assert_eq!(markup.keyboard.len(), 3);
        assert_eq!(markup.keyboard[0].len(), 2);
        assert_eq!(markup.keyboard[1].len(), 1);
    }
}
