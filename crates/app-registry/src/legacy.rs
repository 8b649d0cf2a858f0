use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

use crate::mapper::{self, LegacyPathRecord, LegacyRegionRecord};
use crate::model::AppRegistration;
use crate::store::{RegistrationStore, StoreError};
use crate::validate;

#[derive(Debug, Error)]
pub enum LegacyError {
    /// The feed delivered a document this consumer cannot interpret at all.
    /// This is the one case that propagates instead of being skipped.
    #[error("malformed legacy record: {0}")]
    Malformed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read side of the legacy collections, addressed by the collection names in
/// `Config`. The engine never sees those names; implementations own them.
#[async_trait]
pub trait LegacySource: Send + Sync {
    async fn path_records(&self) -> Result<Vec<LegacyPathRecord>, LegacyError>;
    async fn region_records(&self, path: &str) -> Result<Vec<LegacyRegionRecord>, LegacyError>;
}

/// Merges the two legacy change streams into registrations. Delivery is
/// at-least-once and ordered only within one path, so every merge here is
/// written to be idempotent under redelivery.
pub struct LegacyReconciler {
    store: Arc<dyn RegistrationStore>,
    source: Arc<dyn LegacySource>,
}

impl LegacyReconciler {
    pub fn new(store: Arc<dyn RegistrationStore>, source: Arc<dyn LegacySource>) -> Self {
        Self { store, source }
    }

    /// Raw change-feed entry point for the path stream.
    pub async fn handle_path_document(&self, document: Value) -> Result<(), LegacyError> {
        let record: LegacyPathRecord = serde_json::from_value(document).map_err(|error| {
            tracing::error!(
                target: "app_registry.legacy",
                error = %error,
                "legacy path document could not be interpreted",
            );
            LegacyError::Malformed(error.to_string())
        })?;
        self.handle_path_event(&record).await
    }

    /// Raw change-feed entry point for the region stream.
    pub async fn handle_region_document(&self, document: Value) -> Result<(), LegacyError> {
        let record: LegacyRegionRecord = serde_json::from_value(document).map_err(|error| {
            tracing::error!(
                target: "app_registry.legacy",
                error = %error,
                "legacy region document could not be interpreted",
            );
            LegacyError::Malformed(error.to_string())
        })?;
        self.handle_region_event(&record).await
    }

    /// A path event updates (or implicitly creates) the registration's
    /// scalar fields. Validation failures are logged and skipped; this
    /// stream must never crash the consumer.
    pub async fn handle_path_event(&self, record: &LegacyPathRecord) -> Result<(), LegacyError> {
        let now = Utc::now();
        let mut registration = match self.store.get(&record.path).await? {
            Some(existing) => existing,
            None => {
                let mut created = AppRegistration::new(&record.path);
                created.date_of_registration = Some(now);
                created
            }
        };

        mapper::apply_path_record(record, &mut registration);

        let failures = validate::validate_registration(&registration);
        if !failures.is_empty() {
            log_skip(&record.path, "path event produced an invalid registration", &failures);
            return Ok(());
        }

        registration.last_modified_date = Some(now);
        self.store.upsert(registration).await?;
        Ok(())
    }

    /// A region event replaces the entry for its slot. A region cannot be
    /// accepted before its owning path is known: that event is dropped with
    /// a logged error, and redelivery after the path event is the recovery
    /// path.
    pub async fn handle_region_event(&self, record: &LegacyRegionRecord) -> Result<(), LegacyError> {
        let Some(mut registration) = self.store.get(&record.path).await? else {
            tracing::error!(
                target: "app_registry.legacy",
                path = %record.path,
                region = %record.page_region,
                "region event arrived before any path event; dropping",
            );
            return Ok(());
        };

        let now = Utc::now();
        let mut region = mapper::region_from_record(record);
        region.date_of_registration = registration
            .region(record.page_region)
            .and_then(|existing| existing.date_of_registration)
            .or(Some(now));
        region.last_modified_date = Some(now);

        registration.upsert_region(region);

        let failures = validate::validate_registration(&registration);
        if !failures.is_empty() {
            log_skip(&record.path, "region event produced an invalid registration", &failures);
            return Ok(());
        }

        registration.last_modified_date = Some(now);
        self.store.upsert(registration).await?;
        Ok(())
    }

    /// Full resync: enumerate every legacy path, map fields and the whole
    /// region list in one pass, and upsert. Used for scheduled backfill;
    /// creates registrations that do not exist yet.
    pub async fn load(&self) -> Result<(), LegacyError> {
        for record in self.source.path_records().await? {
            let now = Utc::now();
            let mut registration = match self.store.get(&record.path).await? {
                Some(existing) => existing,
                None => {
                    let mut created = AppRegistration::new(&record.path);
                    created.date_of_registration = Some(now);
                    created
                }
            };

            mapper::apply_path_record(&record, &mut registration);

            // Whole-list replace rather than per-key merge: the resync is
            // authoritative for the full region set of each path.
            registration.regions = self
                .source
                .region_records(&record.path)
                .await?
                .iter()
                .map(|region_record| {
                    let mut region = mapper::region_from_record(region_record);
                    region.date_of_registration = Some(now);
                    region.last_modified_date = Some(now);
                    region
                })
                .collect();

            let failures = validate::validate_registration(&registration);
            if !failures.is_empty() {
                log_skip(&record.path, "resync produced an invalid registration", &failures);
                continue;
            }

            registration.last_modified_date = Some(now);
            self.store.upsert(registration).await?;
        }
        Ok(())
    }
}

fn log_skip(path: &str, reason: &str, failures: &[validate::ValidationFailure]) {
    for failure in failures {
        tracing::error!(
            target: "app_registry.legacy",
            path,
            field = %failure.field,
            message = %failure.message,
            "{reason}; skipping upsert",
        );
    }
}
