//! Conversation steps and input validation for the multi-step admin flows.

use serde::{Deserialize, Serialize};

use crate::clinic_model::LocalizedName;

/// Clinic fields collected before the location arrives
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClinicDraft {
    pub name: String,
    pub phone: String,
    pub district_id: String,
    pub website: String,
    pub working_hours: String,
}

/// Position of a chat within a conversation flow
///
/// Each waiting variant carries exactly the partial record collected so far, so
/// leaving a flow drops its data with it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Step {
    #[default]
    Idle,
    BrowsingCatalog {
        index: usize,
    },
    AwaitingBroadcast,
    AwaitingClinicName,
    AwaitingClinicPhone {
        name: String,
    },
    AwaitingClinicDistrict {
        name: String,
        phone: String,
    },
    AwaitingClinicWebsite {
        name: String,
        phone: String,
        district_id: String,
    },
    AwaitingClinicHours {
        name: String,
        phone: String,
        district_id: String,
        website: String,
    },
    AwaitingClinicLocation(ClinicDraft),
    AwaitingServiceNameRu {
        clinic_id: String,
    },
    AwaitingServiceNameUz {
        clinic_id: String,
        name_ru: String,
    },
    AwaitingServicePrice {
        clinic_id: String,
        name: LocalizedName,
    },
}

impl Step {
    /// Whether the step is collecting free-text or location input
    pub fn is_waiting(&self) -> bool {
        !matches!(self, Step::Idle | Step::BrowsingCatalog { .. })
    }

    /// Whether the step holds transient scratch data
    pub fn has_scratch(&self) -> bool {
        !matches!(self, Step::Idle | Step::AwaitingBroadcast | Step::AwaitingClinicName)
    }
}

/// Parses a service price: a non-negative integer, spaces allowed as separators
pub fn parse_price(input: &str) -> Result<u64, &'static str> {
    let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();

    if digits.is_empty() {
        return Err("empty");
    }

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("not_a_number");
    }

    digits.parse::<u64>().map_err(|_| "too_large")
}

/// Validates a free-text field, trimming surrounding whitespace
pub fn validate_text_field(input: &str) -> Result<String, &'static str> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err("empty");
    }

    if trimmed.chars().count() > 255 {
        return Err("too_long");
    }

    Ok(trimmed.to_string())
}
