use std::sync::Arc;

use chrono::Utc;
use reqwest::StatusCode;
use serde_json::Value;

use crate::model::{AjaxRequest, AppRegistration, PageRegion, Region};
use crate::patch::{self, PatchOp};
use crate::store::{RegistrationStore, UpsertOutcome};
use crate::validate::{self, ValidationFailure};

/// Body returned by a successful replace-shaped mutation: the whole
/// aggregate, or the nested entry a nested patch addressed.
#[derive(Debug, Clone)]
pub enum ReplacedPayload {
    Registration(AppRegistration),
    Region(Region),
    AjaxRequest(AjaxRequest),
}

/// Result-code taxonomy for every mutation attempt. `status_for` maps it to
/// transport status codes as a pure function, so the taxonomy is testable
/// without any host layer.
#[derive(Debug)]
pub enum MutationOutcome {
    Created(AppRegistration),
    Replaced(ReplacedPayload),
    Deleted,
    /// Target aggregate or nested entry absent: an idempotent nothing-to-do
    /// outcome, not an error.
    NotFound,
    /// Caller error: unparsable body, empty patch, path mismatch.
    Malformed(String),
    /// Parsed fine, failed validation.
    Unprocessable(Vec<ValidationFailure>),
    /// Store-level failure during persistence.
    UpsertFailed(String),
}

pub fn status_for(outcome: &MutationOutcome) -> StatusCode {
    match outcome {
        MutationOutcome::Created(_) => StatusCode::CREATED,
        MutationOutcome::Replaced(_) | MutationOutcome::Deleted => StatusCode::OK,
        MutationOutcome::NotFound => StatusCode::NO_CONTENT,
        MutationOutcome::Malformed(_) => StatusCode::BAD_REQUEST,
        MutationOutcome::Unprocessable(_) | MutationOutcome::UpsertFailed(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

/// Create/replace/patch/delete semantics against one registration, with
/// validation enforced before every write.
#[derive(Clone)]
pub struct MutationPipeline {
    store: Arc<dyn RegistrationStore>,
}

impl MutationPipeline {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    /// POST semantics: full body, upsert, `Created` with the re-read
    /// document when the store created it, `Replaced` when it overwrote.
    /// Identity and the registration date belong to the stored document;
    /// a redelivered body never reassigns them.
    pub async fn create_or_replace(&self, body: Value) -> MutationOutcome {
        let mut registration: AppRegistration = match serde_json::from_value(body) {
            Ok(parsed) => parsed,
            Err(error) => return MutationOutcome::Malformed(error.to_string()),
        };

        if let Some(outcome) = self.reject_invalid(&registration) {
            return outcome;
        }

        let existing = match self.store.get(&registration.path).await {
            Ok(existing) => existing,
            Err(error) => return MutationOutcome::UpsertFailed(error.to_string()),
        };

        let now = Utc::now();
        if let Some(stored) = existing {
            registration.id = stored.id;
            registration.date_of_registration = stored.date_of_registration;
        } else {
            registration.date_of_registration = Some(now);
        }
        registration.last_modified_date = Some(now);
        for region in &mut registration.regions {
            if region.date_of_registration.is_none() {
                region.date_of_registration = Some(now);
            }
            region.last_modified_date = Some(now);
        }

        let path = registration.path.clone();
        match self.store.upsert(registration.clone()).await {
            Ok(UpsertOutcome::Created) => match self.store.get(&path).await {
                Ok(Some(fresh)) => MutationOutcome::Created(fresh),
                Ok(None) => {
                    MutationOutcome::UpsertFailed("created document could not be re-read".into())
                }
                Err(error) => MutationOutcome::UpsertFailed(error.to_string()),
            },
            Ok(UpsertOutcome::Replaced) => {
                MutationOutcome::Replaced(ReplacedPayload::Registration(registration))
            }
            Err(error) => MutationOutcome::UpsertFailed(error.to_string()),
        }
    }

    /// PUT semantics: the path parameter and the body's path must agree
    /// (case-insensitively) and the target must already exist. Identity and
    /// registration date carry over from the stored document.
    pub async fn replace(&self, path: &str, body: Value) -> MutationOutcome {
        let mut registration: AppRegistration = match serde_json::from_value(body) {
            Ok(parsed) => parsed,
            Err(error) => return MutationOutcome::Malformed(error.to_string()),
        };

        if !registration.path.eq_ignore_ascii_case(path) {
            return MutationOutcome::Malformed(format!(
                "body path {:?} does not match requested path {path:?}",
                registration.path
            ));
        }

        let existing = match self.store.get(path).await {
            Ok(Some(existing)) => existing,
            Ok(None) => return MutationOutcome::NotFound,
            Err(error) => return MutationOutcome::UpsertFailed(error.to_string()),
        };

        registration.id = existing.id;
        registration.date_of_registration = existing.date_of_registration;

        if let Some(outcome) = self.reject_invalid(&registration) {
            return outcome;
        }

        let now = Utc::now();
        registration.last_modified_date = Some(now);
        for region in &mut registration.regions {
            if region.date_of_registration.is_none() {
                region.date_of_registration = Some(now);
            }
            region.last_modified_date = Some(now);
        }

        match self.store.upsert(registration.clone()).await {
            Ok(_) => MutationOutcome::Replaced(ReplacedPayload::Registration(registration)),
            Err(error) => MutationOutcome::UpsertFailed(error.to_string()),
        }
    }

    /// PATCH semantics at aggregate level: apply the operations to a copy,
    /// re-validate, persist. Identity and path are immutable under patch.
    pub async fn patch(&self, path: &str, ops: &[PatchOp]) -> MutationOutcome {
        if ops.is_empty() {
            return MutationOutcome::Malformed("patch document is empty".into());
        }

        let existing = match self.store.get(path).await {
            Ok(Some(existing)) => existing,
            Ok(None) => return MutationOutcome::NotFound,
            Err(error) => return MutationOutcome::UpsertFailed(error.to_string()),
        };

        let mut patched = match apply_to_copy::<AppRegistration>(&existing, ops) {
            Ok(patched) => patched,
            Err(message) => return MutationOutcome::Malformed(message),
        };

        if !patched.path.eq_ignore_ascii_case(&existing.path) {
            return MutationOutcome::Malformed("path cannot be changed by a patch".into());
        }
        patched.id = existing.id;

        if let Some(outcome) = self.reject_invalid(&patched) {
            return outcome;
        }

        patched.last_modified_date = Some(Utc::now());
        match self.store.upsert(patched.clone()).await {
            Ok(_) => MutationOutcome::Replaced(ReplacedPayload::Registration(patched)),
            Err(error) => MutationOutcome::UpsertFailed(error.to_string()),
        }
    }

    /// PATCH semantics against the region entry for `slot`. Validation is
    /// nested-only: the rest of the aggregate is untouched and was valid
    /// when it was written.
    pub async fn patch_region(
        &self,
        path: &str,
        slot: PageRegion,
        ops: &[PatchOp],
    ) -> MutationOutcome {
        if ops.is_empty() {
            return MutationOutcome::Malformed("patch document is empty".into());
        }

        let mut registration = match self.store.get(path).await {
            Ok(Some(existing)) => existing,
            Ok(None) => return MutationOutcome::NotFound,
            Err(error) => return MutationOutcome::UpsertFailed(error.to_string()),
        };

        let Some(region) = registration.region(slot) else {
            return MutationOutcome::NotFound;
        };

        let mut patched = match apply_to_copy::<Region>(region, ops) {
            Ok(patched) => patched,
            Err(message) => return MutationOutcome::Malformed(message),
        };

        let failures = validate::validate_region(&patched);
        if !failures.is_empty() {
            log_failures(path, &failures);
            return MutationOutcome::Unprocessable(failures);
        }

        let now = Utc::now();
        patched.last_modified_date = Some(now);
        registration.regions.retain(|entry| entry.page_region != slot);
        registration.upsert_region(patched.clone());
        registration.last_modified_date = Some(now);

        match self.store.upsert(registration).await {
            Ok(_) => MutationOutcome::Replaced(ReplacedPayload::Region(patched)),
            Err(error) => MutationOutcome::UpsertFailed(error.to_string()),
        }
    }

    /// PATCH semantics against the ajax request named `name`
    /// (case-insensitive key).
    pub async fn patch_ajax_request(
        &self,
        path: &str,
        name: &str,
        ops: &[PatchOp],
    ) -> MutationOutcome {
        if ops.is_empty() {
            return MutationOutcome::Malformed("patch document is empty".into());
        }

        let mut registration = match self.store.get(path).await {
            Ok(Some(existing)) => existing,
            Ok(None) => return MutationOutcome::NotFound,
            Err(error) => return MutationOutcome::UpsertFailed(error.to_string()),
        };

        let Some(request) = registration.ajax_request(name) else {
            return MutationOutcome::NotFound;
        };

        let mut patched = match apply_to_copy::<AjaxRequest>(request, ops) {
            Ok(patched) => patched,
            Err(message) => return MutationOutcome::Malformed(message),
        };

        let failures = validate::validate_ajax_request(&patched);
        if !failures.is_empty() {
            log_failures(path, &failures);
            return MutationOutcome::Unprocessable(failures);
        }

        let now = Utc::now();
        patched.last_modified_date = Some(now);
        registration
            .ajax_requests
            .retain(|entry| !entry.name.eq_ignore_ascii_case(name));
        registration.upsert_ajax_request(patched.clone());
        registration.last_modified_date = Some(now);

        match self.store.upsert(registration).await {
            Ok(_) => MutationOutcome::Replaced(ReplacedPayload::AjaxRequest(patched)),
            Err(error) => MutationOutcome::UpsertFailed(error.to_string()),
        }
    }

    /// Delete by path. Absence is the idempotent `NotFound`; a store that
    /// reports nothing deleted for a document we just read is a persistence
    /// failure.
    pub async fn delete(&self, path: &str) -> MutationOutcome {
        if path.trim().is_empty() {
            return MutationOutcome::Malformed("path is required".into());
        }

        let existing = match self.store.get(path).await {
            Ok(Some(existing)) => existing,
            Ok(None) => return MutationOutcome::NotFound,
            Err(error) => return MutationOutcome::UpsertFailed(error.to_string()),
        };

        match self.store.delete(existing.id).await {
            Ok(true) => MutationOutcome::Deleted,
            Ok(false) => MutationOutcome::UpsertFailed("document was not deleted".into()),
            Err(error) => MutationOutcome::UpsertFailed(error.to_string()),
        }
    }

    fn reject_invalid(&self, registration: &AppRegistration) -> Option<MutationOutcome> {
        let failures = validate::validate_registration(registration);
        if failures.is_empty() {
            return None;
        }
        log_failures(&registration.path, &failures);
        Some(MutationOutcome::Unprocessable(failures))
    }
}

/// Serializes the target, applies the operations, and deserializes back into
/// the typed model. Both a structural patch error and a patched document
/// that no longer fits the schema are caller errors.
fn apply_to_copy<T>(target: &T, ops: &[PatchOp]) -> Result<T, String>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut doc = serde_json::to_value(target).map_err(|error| error.to_string())?;
    patch::apply(ops, &mut doc).map_err(|error| error.to_string())?;
    serde_json::from_value(doc).map_err(|error| error.to_string())
}

fn log_failures(path: &str, failures: &[ValidationFailure]) {
    for failure in failures {
        tracing::warn!(
            target: "app_registry.mutation",
            path,
            field = %failure.field,
            message = %failure.message,
            "registration failed validation",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchOpKind;
    use crate::store::{FileRegistrationStore, StoreError};
    use async_trait::async_trait;
    use serde_json::json;
    use uuid::Uuid;

    fn pipeline() -> (MutationPipeline, Arc<FileRegistrationStore>) {
        let store = Arc::new(FileRegistrationStore::in_memory());
        (MutationPipeline::new(store.clone()), store)
    }

    fn valid_body(path: &str) -> Value {
        json!({
            "path": path,
            "layout": "FullWidth",
            "isOnline": true,
            "regions": [{
                "pageRegion": "Body",
                "regionEndpoint": "https://app.example/body",
            }],
            "ajaxRequests": [{
                "name": "suggestions",
                "ajaxEndpoint": "https://app.example/api/suggest",
            }],
        })
    }

    fn replace_op(path: &str, value: Value) -> PatchOp {
        PatchOp {
            op: PatchOpKind::Replace,
            path: path.to_string(),
            value: Some(value),
            from: None,
        }
    }

    #[test]
    fn outcomes_map_to_the_documented_statuses() {
        let cases = [
            (
                MutationOutcome::Created(AppRegistration::new("a")),
                StatusCode::CREATED,
            ),
            (
                MutationOutcome::Replaced(ReplacedPayload::Registration(AppRegistration::new(
                    "a",
                ))),
                StatusCode::OK,
            ),
            (MutationOutcome::Deleted, StatusCode::OK),
            (MutationOutcome::NotFound, StatusCode::NO_CONTENT),
            (
                MutationOutcome::Malformed("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                MutationOutcome::Unprocessable(Vec::new()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                MutationOutcome::UpsertFailed("down".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (outcome, expected) in cases {
            assert_eq!(status_for(&outcome), expected, "{outcome:?}");
        }
    }

    #[tokio::test]
    async fn create_then_replace_round_trips() {
        let (pipeline, _) = pipeline();

        let created = pipeline.create_or_replace(valid_body("careers")).await;
        let MutationOutcome::Created(registration) = created else {
            panic!("expected Created, got {created:?}");
        };
        assert!(registration.date_of_registration.is_some());
        assert!(registration.regions[0].date_of_registration.is_some());

        let body = serde_json::to_value(&registration)
            .unwrap_or_else(|error| panic!("serialize: {error}"));
        let replaced = pipeline.replace("careers", body).await;
        let MutationOutcome::Replaced(ReplacedPayload::Registration(after)) = replaced else {
            panic!("expected Replaced, got {replaced:?}");
        };
        assert_eq!(after.id, registration.id);
        assert_eq!(
            after.date_of_registration,
            registration.date_of_registration
        );
    }

    #[tokio::test]
    async fn redelivered_create_keeps_the_stored_identity() {
        let (pipeline, store) = pipeline();

        let created = pipeline.create_or_replace(valid_body("careers")).await;
        let MutationOutcome::Created(first) = created else {
            panic!("expected Created, got {created:?}");
        };

        let redelivered = pipeline.create_or_replace(valid_body("careers")).await;
        let MutationOutcome::Replaced(ReplacedPayload::Registration(second)) = redelivered else {
            panic!("expected Replaced, got {redelivered:?}");
        };
        assert_eq!(second.id, first.id, "id must be stable across updates");
        assert_eq!(second.date_of_registration, first.date_of_registration);

        let stored = store
            .get("careers")
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| panic!("registration should exist"));
        assert_eq!(stored.id, first.id);
    }

    #[tokio::test]
    async fn replace_stamps_regions_that_arrive_without_dates() {
        let (pipeline, store) = pipeline();
        pipeline.create_or_replace(valid_body("careers")).await;

        // Same body again: its region omits dateOfRegistration.
        let outcome = pipeline.replace("careers", valid_body("careers")).await;
        assert!(matches!(outcome, MutationOutcome::Replaced(_)));

        let stored = store
            .get("careers")
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| panic!("registration should exist"));
        assert!(stored.regions[0].date_of_registration.is_some());
        assert!(stored.regions[0].last_modified_date.is_some());
    }

    #[tokio::test]
    async fn create_with_unparsable_body_is_malformed() {
        let (pipeline, _) = pipeline();
        let outcome = pipeline
            .create_or_replace(json!({ "layout": "FullWidth" }))
            .await;
        assert!(matches!(outcome, MutationOutcome::Malformed(_)));
    }

    #[tokio::test]
    async fn create_with_invalid_fields_is_unprocessable() {
        let (pipeline, store) = pipeline();
        let outcome = pipeline
            .create_or_replace(json!({ "path": "_bad-path_" }))
            .await;
        assert!(matches!(outcome, MutationOutcome::Unprocessable(_)));
        let all = store.get_all().await.unwrap_or_default();
        assert!(all.is_empty(), "invalid registration must not persist");
    }

    #[tokio::test]
    async fn replace_with_mismatched_path_is_malformed() {
        let (pipeline, _) = pipeline();
        pipeline.create_or_replace(valid_body("careers")).await;
        let outcome = pipeline.replace("other", valid_body("careers")).await;
        assert!(matches!(outcome, MutationOutcome::Malformed(_)));
    }

    #[tokio::test]
    async fn replace_of_missing_registration_is_not_found() {
        let (pipeline, _) = pipeline();
        let outcome = pipeline.replace("ghost", valid_body("ghost")).await;
        assert!(matches!(outcome, MutationOutcome::NotFound));
    }

    #[tokio::test]
    async fn patch_of_missing_path_is_not_found_and_never_writes() {
        let (pipeline, store) = pipeline();
        let outcome = pipeline
            .patch("ghost", &[replace_op("/isOnline", json!(true))])
            .await;
        assert!(matches!(outcome, MutationOutcome::NotFound));
        assert!(store.get_all().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn patch_replay_is_idempotent() {
        let (pipeline, store) = pipeline();
        pipeline.create_or_replace(valid_body("careers")).await;

        let ops = [replace_op("/layout", json!("SidebarLeft"))];
        let first = pipeline.patch("careers", &ops).await;
        let MutationOutcome::Replaced(ReplacedPayload::Registration(first_body)) = first else {
            panic!("expected Replaced");
        };
        let second = pipeline.patch("careers", &ops).await;
        let MutationOutcome::Replaced(ReplacedPayload::Registration(second_body)) = second else {
            panic!("expected Replaced");
        };

        assert_eq!(first_body.layout, second_body.layout);
        let stored = store.get("careers").await.ok().flatten();
        assert_eq!(
            stored.and_then(|r| r.layout),
            Some("SidebarLeft".to_string())
        );
    }

    #[tokio::test]
    async fn patch_cannot_move_a_registration_to_another_path() {
        let (pipeline, store) = pipeline();
        pipeline.create_or_replace(valid_body("careers")).await;

        let outcome = pipeline
            .patch("careers", &[replace_op("/path", json!("elsewhere"))])
            .await;
        assert!(matches!(outcome, MutationOutcome::Malformed(_)));
        assert!(store.get("elsewhere").await.ok().flatten().is_none());
    }

    #[tokio::test]
    async fn patch_with_bad_pointer_is_malformed() {
        let (pipeline, _) = pipeline();
        pipeline.create_or_replace(valid_body("careers")).await;
        let outcome = pipeline
            .patch("careers", &[replace_op("/absent/field", json!(1))])
            .await;
        assert!(matches!(outcome, MutationOutcome::Malformed(_)));
    }

    #[tokio::test]
    async fn patch_yielding_invalid_fields_is_unprocessable() {
        let (pipeline, _) = pipeline();
        pipeline.create_or_replace(valid_body("careers")).await;
        let outcome = pipeline
            .patch(
                "careers",
                &[replace_op("/regions/0/regionEndpoint", json!("not-a-url"))],
            )
            .await;
        assert!(matches!(outcome, MutationOutcome::Unprocessable(_)));
    }

    #[tokio::test]
    async fn region_patch_updates_one_entry_in_place() {
        let (pipeline, store) = pipeline();
        pipeline.create_or_replace(valid_body("careers")).await;

        let outcome = pipeline
            .patch_region(
                "careers",
                PageRegion::Body,
                &[replace_op(
                    "/regionEndpoint",
                    json!("https://app.example/body-v2"),
                )],
            )
            .await;
        let MutationOutcome::Replaced(ReplacedPayload::Region(region)) = outcome else {
            panic!("expected a patched region");
        };
        assert_eq!(
            region.region_endpoint.as_deref(),
            Some("https://app.example/body-v2")
        );

        let stored = store
            .get("careers")
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| panic!("registration should exist"));
        assert_eq!(stored.regions.len(), 1);
    }

    #[tokio::test]
    async fn region_patch_for_missing_slot_is_not_found() {
        let (pipeline, _) = pipeline();
        pipeline.create_or_replace(valid_body("careers")).await;
        let outcome = pipeline
            .patch_region(
                "careers",
                PageRegion::Footer,
                &[replace_op("/regionEndpoint", json!("https://x.example/"))],
            )
            .await;
        assert!(matches!(outcome, MutationOutcome::NotFound));
    }

    #[tokio::test]
    async fn ajax_patch_addresses_entries_case_insensitively() {
        let (pipeline, _) = pipeline();
        pipeline.create_or_replace(valid_body("careers")).await;
        let outcome = pipeline
            .patch_ajax_request(
                "careers",
                "SUGGESTIONS",
                &[replace_op("/noCache", json!(true))],
            )
            .await;
        let MutationOutcome::Replaced(ReplacedPayload::AjaxRequest(request)) = outcome else {
            panic!("expected a patched ajax request");
        };
        assert!(request.no_cache);
    }

    #[tokio::test]
    async fn delete_removes_and_further_gets_miss() {
        let (pipeline, store) = pipeline();
        pipeline.create_or_replace(valid_body("careers")).await;

        let outcome = pipeline.delete("careers").await;
        assert!(matches!(outcome, MutationOutcome::Deleted));
        assert!(store.get("careers").await.ok().flatten().is_none());

        let again = pipeline.delete("careers").await;
        assert!(matches!(again, MutationOutcome::NotFound));
    }

    #[tokio::test]
    async fn delete_with_empty_path_is_malformed() {
        let (pipeline, _) = pipeline();
        let outcome = pipeline.delete("  ").await;
        assert!(matches!(outcome, MutationOutcome::Malformed(_)));
    }

    struct BrokenStore;

    #[async_trait]
    impl RegistrationStore for BrokenStore {
        async fn get(&self, path: &str) -> Result<Option<AppRegistration>, StoreError> {
            Ok(Some(AppRegistration::new(path)))
        }
        async fn get_all(&self) -> Result<Vec<AppRegistration>, StoreError> {
            Ok(Vec::new())
        }
        async fn get_with_scripts(&self) -> Result<Vec<AppRegistration>, StoreError> {
            Ok(Vec::new())
        }
        async fn upsert(&self, _: AppRegistration) -> Result<UpsertOutcome, StoreError> {
            Err(StoreError::Persistence {
                message: "store offline".into(),
            })
        }
        async fn delete(&self, _: Uuid) -> Result<bool, StoreError> {
            Err(StoreError::Persistence {
                message: "store offline".into(),
            })
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn store_failures_surface_as_upsert_failed() {
        let pipeline = MutationPipeline::new(Arc::new(BrokenStore));

        let outcome = pipeline.create_or_replace(valid_body("careers")).await;
        assert!(matches!(outcome, MutationOutcome::UpsertFailed(_)));

        let outcome = pipeline.delete("careers").await;
        assert!(matches!(outcome, MutationOutcome::UpsertFailed(_)));
    }
}
