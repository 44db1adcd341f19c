//! # Clinic Directory Data Model
//!
//! Records persisted in the clinic and district data files. Field names are
//! serialized in camelCase so the files stay compatible with hand-edited data.
//!
//! ## Core Concepts
//!
//! - **Clinic**: a location with contact details and an ordered list of services
//! - **Service**: a priced offer owned by exactly one clinic
//! - **District**: read-only reference data, referenced from clinics by id
//! - **Language**: the two interface languages, Russian being the primary one

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interface language of a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ru,
    Uz,
}

impl Language {
    /// Short code used in callback payloads and locale directories
    pub fn code(self) -> &'static str {
        match self {
            Language::Ru => "ru",
            Language::Uz => "uz",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ru" => Some(Language::Ru),
            "uz" => Some(Language::Uz),
            _ => None,
        }
    }

    pub fn all() -> [Language; 2] {
        [Language::Ru, Language::Uz]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A name carried in both interface languages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedName {
    pub ru: String,
    pub uz: String,
}

impl LocalizedName {
    pub fn new(ru: impl Into<String>, uz: impl Into<String>) -> Self {
        Self {
            ru: ru.into(),
            uz: uz.into(),
        }
    }

    pub fn get(&self, language: Language) -> &str {
        match language {
            Language::Ru => &self.ru,
            Language::Uz => &self.uz,
        }
    }
}

/// Geographic coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A priced service offered by a clinic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Unique within the owning clinic
    pub id: String,
    pub name: LocalizedName,
    /// Price in the local currency unit
    pub price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A clinic entry of the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clinic {
    pub id: String,
    pub name: String,
    /// Id of a [`District`]; not validated after creation
    pub district: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub working_hours: String,
    #[serde(default)]
    pub services: Vec<Service>,
}

/// Read-only district reference data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    pub id: String,
    pub name: LocalizedName,
}

/// A clinic paired with its distance from a query point
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyClinic {
    pub clinic: Clinic,
    pub distance_km: f64,
}
