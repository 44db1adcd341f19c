//! Clinic and district repository backed by flat JSON files.
//!
//! Every mutation rewrites the whole clinic file. The write is a plain
//! truncate-and-write: a crash in the middle of it can leave a truncated file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clinic_model::{Clinic, District, GeoPoint, Language, NearbyClinic, Service};
use crate::errors::BotError;
use crate::geo::haversine_km;

/// Number of entries shown by the nearest and cheapest listings
pub const DEFAULT_LISTING_LIMIT: usize = 5;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ClinicsFile {
    clinics: Vec<Clinic>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DistrictsFile {
    districts: Vec<District>,
}

/// In-memory clinic directory with write-through persistence
#[derive(Debug)]
pub struct DirectoryStore {
    clinics: Vec<Clinic>,
    districts: Vec<District>,
    clinics_path: Option<PathBuf>,
}

impl DirectoryStore {
    /// Load clinics and districts from their data files
    ///
    /// A missing clinics file starts an empty directory; districts are required.
    pub fn load(clinics_path: &Path, districts_path: &Path) -> Result<Self, BotError> {
        info!(clinics_path = %clinics_path.display(), districts_path = %districts_path.display(), "Loading directory");

        let clinics = match fs::read_to_string(clinics_path) {
            Ok(raw) => {
                serde_json::from_str::<ClinicsFile>(&raw)
                    .map_err(|e| {
                        BotError::Data(format!("{}: {e}", clinics_path.display()))
                    })?
                    .clinics
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(clinics_path = %clinics_path.display(), "Clinics file not found, starting empty");
                Vec::new()
            }
            Err(e) => {
                return Err(BotError::Persistence(format!(
                    "{}: {e}",
                    clinics_path.display()
                )))
            }
        };

        let raw = fs::read_to_string(districts_path).map_err(|e| {
            BotError::Persistence(format!("{}: {e}", districts_path.display()))
        })?;
        let districts = serde_json::from_str::<DistrictsFile>(&raw)
            .map_err(|e| BotError::Data(format!("{}: {e}", districts_path.display())))?
            .districts;

        info!(
            clinics = clinics.len(),
            districts = districts.len(),
            "Directory loaded"
        );

        Ok(Self {
            clinics,
            districts,
            clinics_path: Some(clinics_path.to_path_buf()),
        })
    }

    /// Directory that writes mutations to `clinics_path`
    pub fn with_path(clinics_path: PathBuf, clinics: Vec<Clinic>, districts: Vec<District>) -> Self {
        Self {
            clinics,
            districts,
            clinics_path: Some(clinics_path),
        }
    }

    /// Directory without a backing file; mutations stay in memory
    pub fn in_memory(clinics: Vec<Clinic>, districts: Vec<District>) -> Self {
        Self {
            clinics,
            districts,
            clinics_path: None,
        }
    }

    pub fn clinics(&self) -> &[Clinic] {
        &self.clinics
    }

    pub fn districts(&self) -> &[District] {
        &self.districts
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Clinic> {
        self.clinics.iter().find(|c| c.id == id)
    }

    /// Exact, case-sensitive name lookup
    pub fn find_by_name(&self, name: &str) -> Option<&Clinic> {
        self.clinics.iter().find(|c| c.name == name)
    }

    /// District whose name in `language` equals `name`
    pub fn find_district_by_name(&self, name: &str, language: Language) -> Option<&District> {
        self.districts.iter().find(|d| d.name.get(language) == name)
    }

    /// Localized district name, or the raw id for unknown districts
    pub fn district_name(&self, district_id: &str, language: Language) -> String {
        self.districts
            .iter()
            .find(|d| d.id == district_id)
            .map(|d| d.name.get(language).to_string())
            .unwrap_or_else(|| district_id.to_string())
    }

    pub fn add_clinic(&mut self, clinic: Clinic) -> Result<(), BotError> {
        info!(clinic_id = %clinic.id, name = %clinic.name, "Adding clinic");
        self.clinics.push(clinic);
        self.save()
    }

    /// Replace the clinic with the same id; returns false when absent
    pub fn update_clinic(&mut self, clinic: Clinic) -> Result<bool, BotError> {
        match self.clinics.iter_mut().find(|c| c.id == clinic.id) {
            Some(existing) => {
                info!(clinic_id = %clinic.id, "Updating clinic");
                *existing = clinic;
                self.save()?;
                Ok(true)
            }
            None => {
                debug!(clinic_id = %clinic.id, "No clinic to update");
                Ok(false)
            }
        }
    }

    /// Remove a clinic by id; unknown ids leave the directory untouched
    pub fn delete_clinic(&mut self, id: &str) -> Result<bool, BotError> {
        let before = self.clinics.len();
        self.clinics.retain(|c| c.id != id);

        if self.clinics.len() == before {
            debug!(clinic_id = %id, "No clinic to delete");
            return Ok(false);
        }

        info!(clinic_id = %id, "Clinic deleted");
        self.save()?;
        Ok(true)
    }

    /// Append a service to a clinic; returns the updated clinic
    pub fn append_service(
        &mut self,
        clinic_id: &str,
        service: Service,
    ) -> Result<Option<Clinic>, BotError> {
        let Some(clinic) = self.clinics.iter_mut().find(|c| c.id == clinic_id) else {
            debug!(clinic_id = %clinic_id, "No clinic to append service to");
            return Ok(None);
        };

        info!(clinic_id = %clinic_id, service_id = %service.id, "Appending service");
        clinic.services.push(service);
        let updated = clinic.clone();
        self.save()?;
        Ok(Some(updated))
    }

    /// Fresh clinic id, unique within the directory
    pub fn next_clinic_id(&self) -> String {
        unique_id("clinic", |candidate| self.find_by_id(candidate).is_some())
    }

    /// Fresh service id, unique within the given clinic
    pub fn next_service_id(&self, clinic_id: &str) -> String {
        let services = self
            .find_by_id(clinic_id)
            .map(|c| c.services.as_slice())
            .unwrap_or_default();
        unique_id("service", |candidate| {
            services.iter().any(|s| s.id == candidate)
        })
    }

    /// Clinics ordered by distance from `origin`, truncated to `limit`
    pub fn find_nearest_clinics(&self, origin: GeoPoint, limit: usize) -> Vec<NearbyClinic> {
        let mut nearby: Vec<NearbyClinic> = self
            .clinics
            .iter()
            .map(|clinic| NearbyClinic {
                distance_km: haversine_km(origin, clinic.location),
                clinic: clinic.clone(),
            })
            .collect();

        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        nearby.truncate(limit);
        nearby
    }

    /// Every (clinic, service) pair in directory order
    pub fn all_services(&self) -> Vec<(&Clinic, &Service)> {
        self.clinics
            .iter()
            .flat_map(|clinic| clinic.services.iter().map(move |service| (clinic, service)))
            .collect()
    }

    /// Cheapest services across all clinics; ties keep directory order
    pub fn cheapest_services(&self, limit: usize) -> Vec<(&Clinic, &Service)> {
        let mut services = self.all_services();
        services.sort_by_key(|(_, service)| service.price);
        services.truncate(limit);
        services
    }

    fn save(&self) -> Result<(), BotError> {
        let Some(path) = &self.clinics_path else {
            return Ok(());
        };

        let document = serde_json::to_string_pretty(&ClinicsFileRef {
            clinics: &self.clinics,
        })
        .map_err(|e| BotError::Data(e.to_string()))?;

        fs::write(path, document)
            .map_err(|e| BotError::Persistence(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), clinics = self.clinics.len(), "Clinics persisted");
        Ok(())
    }
}

#[derive(Serialize)]
struct ClinicsFileRef<'a> {
    clinics: &'a [Clinic],
}

/// `<prefix><unix millis>`, bumped until `taken` rejects it
fn unique_id(prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut stamp = Utc::now().timestamp_millis();
    loop {
        let candidate = format!("{prefix}{stamp}");
        if !taken(&candidate) {
            return candidate;
        }
        stamp += 1;
    }
}
