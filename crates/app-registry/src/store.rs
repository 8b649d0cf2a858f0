use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;
use crate::model::AppRegistration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{message}")]
    Persistence { message: String },
}

/// Whether an upsert created a new document or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Replaced,
}

/// The aggregate store boundary. The physical document-store driver lives
/// behind this trait; the collection is keyed by path, so path uniqueness
/// and partition-key equality hold structurally.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<AppRegistration>, StoreError>;
    async fn get_all(&self) -> Result<Vec<AppRegistration>, StoreError>;
    /// Registrations with at least one declared script asset; the filtered
    /// scan the asset-hash refresher runs on every tick.
    async fn get_with_scripts(&self) -> Result<Vec<AppRegistration>, StoreError>;
    async fn upsert(&self, registration: AppRegistration) -> Result<UpsertOutcome, StoreError>;
    /// Delete by internal id. Returns whether a document was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Default)]
#[serde(default)]
struct StoreState {
    // Keyed by lowercased path; path lookups are case-insensitive.
    registrations: BTreeMap<String, AppRegistration>,
}

/// In-memory registration store with optional JSON file persistence. Every
/// mutation snapshots the state and rewrites the file through a temp-file
/// rename, so a crash mid-write never leaves a torn document behind.
#[derive(Clone)]
pub struct FileRegistrationStore {
    state: Arc<RwLock<StoreState>>,
    path: Option<PathBuf>,
}

impl FileRegistrationStore {
    pub fn from_config(config: &Config) -> Self {
        let path = config.store_path.clone();
        let state = Self::load_state(path.as_ref());
        Self {
            state: Arc::new(RwLock::new(state)),
            path,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            path: None,
        }
    }

    fn load_state(path: Option<&PathBuf>) -> StoreState {
        let Some(path) = path else {
            return StoreState::default();
        };

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return StoreState::default();
            }
            Err(error) => {
                tracing::warn!(
                    target: "app_registry.store",
                    path = %path.display(),
                    error = %error,
                    "registration file unreadable; starting with an empty collection",
                );
                return StoreState::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|error| {
            tracing::warn!(
                target: "app_registry.store",
                path = %path.display(),
                error = %error,
                "registration file did not deserialize; starting with an empty collection",
            );
            StoreState::default()
        })
    }

    async fn persist_state(&self, snapshot: &StoreState) -> Result<(), StoreError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        let payload = serde_json::to_vec(snapshot).map_err(|error| StoreError::Persistence {
            message: format!("registration snapshot would not serialize: {error}"),
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| persistence_error("create the store directory", &error))?;
        }

        // Stage then rename, so a crash mid-write never tears the file.
        let staging = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&staging, payload)
            .await
            .map_err(|error| persistence_error("stage the registration snapshot", &error))?;
        tokio::fs::rename(&staging, path)
            .await
            .map_err(|error| persistence_error("swap in the registration snapshot", &error))?;

        Ok(())
    }

    async fn mutate<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StoreState) -> Result<T, StoreError>,
    {
        let mut state = self.state.write().await;
        let result = operation(&mut state)?;
        let snapshot = state.clone();
        drop(state);

        self.persist_state(&snapshot).await?;
        Ok(result)
    }
}

fn persistence_error(action: &str, error: &std::io::Error) -> StoreError {
    StoreError::Persistence {
        message: format!("could not {action}: {error}"),
    }
}

fn partition_key(path: &str) -> String {
    path.trim().to_lowercase()
}

#[async_trait]
impl RegistrationStore for FileRegistrationStore {
    async fn get(&self, path: &str) -> Result<Option<AppRegistration>, StoreError> {
        let state = self.state.read().await;
        Ok(state.registrations.get(&partition_key(path)).cloned())
    }

    async fn get_all(&self) -> Result<Vec<AppRegistration>, StoreError> {
        let state = self.state.read().await;
        Ok(state.registrations.values().cloned().collect())
    }

    async fn get_with_scripts(&self) -> Result<Vec<AppRegistration>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .registrations
            .values()
            .filter(|registration| registration.has_scripts())
            .cloned()
            .collect())
    }

    async fn upsert(&self, registration: AppRegistration) -> Result<UpsertOutcome, StoreError> {
        self.mutate(|state| {
            let key = partition_key(&registration.path);
            let outcome = if state.registrations.contains_key(&key) {
                UpsertOutcome::Replaced
            } else {
                UpsertOutcome::Created
            };
            state.registrations.insert(key, registration);
            Ok(outcome)
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.mutate(|state| {
            let key = state
                .registrations
                .iter()
                .find(|(_, registration)| registration.id == id)
                .map(|(key, _)| key.clone());
            match key {
                Some(key) => {
                    state.registrations.remove(&key);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let _ = self.state.read().await;
        Ok(())
    }
}
