use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::Config;
use crate::model::AppRegistration;
use crate::store::{RegistrationStore, StoreError};

/// Outbound side of the refresher: fetch one asset and report its
/// content-hash header. `Ok(None)` means the asset was served without a
/// hash header.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn content_hash(&self, url: &str) -> Result<Option<String>, String>;
}

/// reqwest-backed fetcher reading the configured content-hash header.
pub struct HttpAssetFetcher {
    http: reqwest::Client,
    timeout: Duration,
    header_name: String,
}

impl HttpAssetFetcher {
    pub fn from_config(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout: Duration::from_millis(config.asset_timeout_ms),
            header_name: config.content_hash_header.clone(),
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn content_hash(&self, url: &str) -> Result<Option<String>, String> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|error| error.to_string())?;
        let response = response.error_for_status().map_err(|error| error.to_string())?;
        let header = response
            .headers()
            .get(&self.header_name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        Ok(header)
    }
}

/// Recomputes script content hashes across all registrations. An aggregate
/// is written back only when at least one entry actually changed, which is
/// what keeps a refresh tick from rewriting the whole collection.
pub struct AssetHashRefresher {
    store: Arc<dyn RegistrationStore>,
    fetcher: Arc<dyn AssetFetcher>,
    cdn_location: String,
}

impl AssetHashRefresher {
    pub fn from_config(store: Arc<dyn RegistrationStore>, config: &Config) -> Self {
        Self {
            store,
            fetcher: Arc::new(HttpAssetFetcher::from_config(config)),
            cdn_location: config.cdn_location.clone(),
        }
    }

    pub fn with_fetcher(
        store: Arc<dyn RegistrationStore>,
        fetcher: Arc<dyn AssetFetcher>,
        cdn_location: impl Into<String>,
    ) -> Self {
        Self {
            store,
            fetcher,
            cdn_location: cdn_location.into(),
        }
    }

    /// Visits every registration that declares script assets and upserts the
    /// ones whose hash maps changed. Returns how many were written.
    pub async fn refresh_all(&self) -> Result<usize, StoreError> {
        let mut upserted = 0;
        for mut registration in self.store.get_with_scripts().await? {
            let changed = self.refresh_hashes(&mut registration).await;
            if changed == 0 {
                continue;
            }
            registration.last_modified_date = Some(Utc::now());
            self.store.upsert(registration).await?;
            upserted += 1;
        }
        Ok(upserted)
    }

    /// Recomputes both script maps in place and returns how many entries
    /// changed. The maps are refreshed independently; a key present in both
    /// is fetched once per map and each entry gets its own value.
    pub async fn refresh_hashes(&self, registration: &mut AppRegistration) -> usize {
        self.refresh_map(&mut registration.java_script_names).await
            + self.refresh_map(&mut registration.css_script_names).await
    }

    /// A fetch that fails in any way degrades to an hour-granularity
    /// timestamp so every entry still converges on some value.
    async fn refresh_map(&self, scripts: &mut BTreeMap<String, Option<String>>) -> usize {
        let mut changed = 0;
        let keys: Vec<String> = scripts.keys().cloned().collect();

        for key in keys {
            let url = resolve_asset_url(&self.cdn_location, &key);
            let fresh = match self.fetcher.content_hash(&url).await {
                Ok(Some(raw)) => strip_separators(&raw),
                Ok(None) => {
                    tracing::warn!(
                        target: "app_registry.assets",
                        url = %url,
                        "asset response carried no content-hash header; using timestamp fallback",
                    );
                    fallback_stamp()
                }
                Err(error) => {
                    tracing::warn!(
                        target: "app_registry.assets",
                        url = %url,
                        error = %error,
                        "asset fetch failed; using timestamp fallback",
                    );
                    fallback_stamp()
                }
            };

            if let Some(stored) = scripts.get_mut(&key)
                && stored.as_deref() != Some(fresh.as_str())
            {
                *stored = Some(fresh);
                changed += 1;
            }
        }
        changed
    }
}

/// Root-relative keys are served from the configured CDN; anything else is
/// taken as already absolute.
fn resolve_asset_url(cdn_location: &str, key: &str) -> String {
    if key.starts_with('/') {
        format!(
            "{}/{}",
            cdn_location.trim_end_matches('/'),
            key.trim_start_matches('/')
        )
    } else {
        key.to_string()
    }
}

fn strip_separators(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Hour-granularity stamp: stable within the hour so repeated failed
/// refreshes do not churn the stored value.
fn fallback_stamp() -> String {
    Utc::now().format("%Y%m%d%H").to_string()
}
