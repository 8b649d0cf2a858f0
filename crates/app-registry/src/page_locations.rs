use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::model::PageLocation;
use crate::store::{RegistrationStore, StoreError};

/// Operation carried by a page-location webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentOperation {
    None,
    CreateOrUpdate,
    Delete,
}

/// One webhook delivery: what happened to which content item, and where the
/// fresh payload can be fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLocationEvent {
    pub operation: ContentOperation,
    pub content_id: Uuid,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Error)]
pub enum PageLocationError {
    #[error("create-or-update event without a source url")]
    MissingUrl,
    #[error("failed to fetch page location: {0}")]
    Fetch(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one reconciliation. `NotFound` covers both a missing pages
/// aggregate and an absent `pageLocations` map; either way there is nothing
/// to reconcile into, and that is a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLocationOutcome {
    Updated,
    NotFound,
    Skipped,
}

/// Fetches the current `PageLocation` payload for a content item from the
/// webhook's source url.
#[derive(Clone)]
pub struct PageLocationClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl PageLocationClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout: Duration::from_millis(config.page_location_timeout_ms),
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<PageLocation, PageLocationError> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|error| PageLocationError::Fetch(error.to_string()))?;
        let response = response
            .error_for_status()
            .map_err(|error| PageLocationError::Fetch(error.to_string()))?;
        response
            .json::<PageLocation>()
            .await
            .map_err(|error| PageLocationError::Fetch(error.to_string()))
    }
}

/// Maintains the `pageLocations` map inside the one well-known pages
/// aggregate. Only updates an existing aggregate; creation belongs to the
/// mutation pipeline and the legacy feed.
pub struct PageLocationReconciler {
    store: Arc<dyn RegistrationStore>,
    client: PageLocationClient,
    pages_path: String,
}

impl PageLocationReconciler {
    pub fn from_config(store: Arc<dyn RegistrationStore>, config: &Config) -> Self {
        Self {
            store,
            client: PageLocationClient::from_config(config),
            pages_path: config.pages_path.clone(),
        }
    }

    /// Full webhook handling: fetch on create-or-update, then merge by
    /// content id. `None` operations are acknowledged without touching the
    /// store.
    pub async fn handle_event(
        &self,
        event: &PageLocationEvent,
    ) -> Result<PageLocationOutcome, PageLocationError> {
        match event.operation {
            ContentOperation::None => Ok(PageLocationOutcome::Skipped),
            ContentOperation::CreateOrUpdate => {
                let url = event.url.as_deref().ok_or(PageLocationError::MissingUrl)?;
                let location = self.client.fetch(url).await?;
                Ok(self.set_location(event.content_id, location).await?)
            }
            ContentOperation::Delete => Ok(self.remove_location(event.content_id).await?),
        }
    }

    /// Insert-or-overwrite the map entry for `content_id`. Direct key
    /// assignment makes redelivery idempotent.
    pub async fn set_location(
        &self,
        content_id: Uuid,
        location: PageLocation,
    ) -> Result<PageLocationOutcome, StoreError> {
        let Some(mut registration) = self.store.get(&self.pages_path).await? else {
            return Ok(PageLocationOutcome::NotFound);
        };
        let Some(locations) = registration.page_locations.as_mut() else {
            return Ok(PageLocationOutcome::NotFound);
        };

        locations.insert(content_id, location);
        registration.last_modified_date = Some(Utc::now());
        self.store.upsert(registration).await?;
        Ok(PageLocationOutcome::Updated)
    }

    /// Remove the map entry for `content_id`. A missing key is still a
    /// successful removal; the aggregate is re-persisted either way so its
    /// timestamp reflects the event.
    pub async fn remove_location(
        &self,
        content_id: Uuid,
    ) -> Result<PageLocationOutcome, StoreError> {
        let Some(mut registration) = self.store.get(&self.pages_path).await? else {
            return Ok(PageLocationOutcome::NotFound);
        };
        let Some(locations) = registration.page_locations.as_mut() else {
            return Ok(PageLocationOutcome::NotFound);
        };

        if locations.remove(&content_id).is_none() {
            tracing::debug!(
                target: "app_registry.page_locations",
                %content_id,
                "remove for absent content id; treating as already removed",
            );
        }
        registration.last_modified_date = Some(Utc::now());
        self.store.upsert(registration).await?;
        Ok(PageLocationOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppRegistration;
    use crate::store::FileRegistrationStore;
    use std::collections::HashMap;

    fn reconciler() -> (PageLocationReconciler, Arc<FileRegistrationStore>) {
        let store = Arc::new(FileRegistrationStore::in_memory());
        let config = Config::for_tests();
        (
            PageLocationReconciler::from_config(store.clone(), &config),
            store,
        )
    }

    async fn seed_pages_aggregate(store: &FileRegistrationStore) {
        let mut pages = AppRegistration::new("pages");
        pages.page_locations = Some(HashMap::new());
        store.upsert(pages).await.ok();
    }

    fn location(entries: &[&str]) -> PageLocation {
        PageLocation {
            locations: entries.iter().map(|entry| entry.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn set_location_without_pages_aggregate_is_not_found() {
        let (reconciler, store) = reconciler();
        let outcome = reconciler
            .set_location(Uuid::new_v4(), location(&["/careers"]))
            .await
            .unwrap_or_else(|error| panic!("set: {error}"));
        assert_eq!(outcome, PageLocationOutcome::NotFound);
        assert!(
            store.get("pages").await.ok().flatten().is_none(),
            "reconciler must never create the aggregate",
        );
    }

    #[tokio::test]
    async fn set_location_without_a_map_is_not_found() {
        let (reconciler, store) = reconciler();
        store.upsert(AppRegistration::new("pages")).await.ok();

        let outcome = reconciler
            .set_location(Uuid::new_v4(), location(&["/careers"]))
            .await
            .unwrap_or_else(|error| panic!("set: {error}"));
        assert_eq!(outcome, PageLocationOutcome::NotFound);
    }

    #[tokio::test]
    async fn set_location_overwrites_on_redelivery() {
        let (reconciler, store) = reconciler();
        seed_pages_aggregate(&store).await;
        let content_id = Uuid::new_v4();

        reconciler
            .set_location(content_id, location(&["/old"]))
            .await
            .ok();
        reconciler
            .set_location(content_id, location(&["/new", "/new-alias"]))
            .await
            .ok();

        let stored = store
            .get("pages")
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| panic!("pages aggregate should exist"));
        let map = stored
            .page_locations
            .unwrap_or_else(|| panic!("map should exist"));
        assert_eq!(map.len(), 1);
        assert_eq!(
            map.get(&content_id).map(|entry| entry.locations.clone()),
            Some(vec!["/new".to_string(), "/new-alias".to_string()])
        );
    }

    #[tokio::test]
    async fn remove_of_absent_key_still_repersists() {
        let (reconciler, store) = reconciler();
        seed_pages_aggregate(&store).await;

        let before = store
            .get("pages")
            .await
            .ok()
            .flatten()
            .and_then(|r| r.last_modified_date);
        let outcome = reconciler
            .remove_location(Uuid::new_v4())
            .await
            .unwrap_or_else(|error| panic!("remove: {error}"));
        assert_eq!(outcome, PageLocationOutcome::Updated);

        let after = store
            .get("pages")
            .await
            .ok()
            .flatten()
            .and_then(|r| r.last_modified_date);
        assert_ne!(before, after, "timestamp must reflect the event");
    }

    #[tokio::test]
    async fn remove_deletes_the_entry() {
        let (reconciler, store) = reconciler();
        seed_pages_aggregate(&store).await;
        let content_id = Uuid::new_v4();

        reconciler
            .set_location(content_id, location(&["/careers"]))
            .await
            .ok();
        reconciler.remove_location(content_id).await.ok();

        let stored = store.get("pages").await.ok().flatten();
        assert_eq!(
            stored.and_then(|r| r.page_locations).map(|map| map.len()),
            Some(0)
        );
    }

    #[tokio::test]
    async fn none_operation_is_skipped() {
        let (reconciler, _) = reconciler();
        let outcome = reconciler
            .handle_event(&PageLocationEvent {
                operation: ContentOperation::None,
                content_id: Uuid::new_v4(),
                url: None,
            })
            .await
            .unwrap_or_else(|error| panic!("handle: {error}"));
        assert_eq!(outcome, PageLocationOutcome::Skipped);
    }

    #[tokio::test]
    async fn create_event_without_url_is_an_error() {
        let (reconciler, _) = reconciler();
        let result = reconciler
            .handle_event(&PageLocationEvent {
                operation: ContentOperation::CreateOrUpdate,
                content_id: Uuid::new_v4(),
                url: None,
            })
            .await;
        assert!(matches!(result, Err(PageLocationError::MissingUrl)));
    }
}
