//! # Secure Storage
//!
//! The only local persistence in the client: one record under one fixed key
//! holding the credential and the last confirmed user.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storage Layers                                   │
//! │                                                                         │
//! │  CredentialVault          typed: StoredAuth { credential, user, at }   │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  dyn SecureStore          string key → string value                    │
//! │   ├── FileSecureStore     JSON map file, atomic rename, mode 0600      │
//! │   └── MemorySecureStore   process-local (tests, ephemeral sessions)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hubline_core::{AppUser, Credential};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

// =============================================================================
// Secure Store Trait
// =============================================================================

/// Platform secure key/value storage.
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn read(&self, key: &str) -> ClientResult<Option<String>>;

    async fn write(&self, key: &str, value: &str) -> ClientResult<()>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> ClientResult<()>;
}

// =============================================================================
// File Store
// =============================================================================

/// JSON map persisted to a single owner-only file.
pub struct FileSecureStore {
    path: PathBuf,
    // Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl FileSecureStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSecureStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_map(&self) -> ClientResult<HashMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                ClientError::Storage(format!("corrupt store {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(ClientError::Storage(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn persist_map(&self, map: &HashMap<String, String>) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientError::Storage(format!("failed to create store dir: {}", e)))?;
        }

        let data = serde_json::to_vec_pretty(map)
            .map_err(|e| ClientError::Storage(format!("failed to encode store: {}", e)))?;

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &data)
            .await
            .map_err(|e| ClientError::Storage(format!("failed to write temp file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| ClientError::Storage(format!("failed to set permissions: {}", e)))?;
        }

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| ClientError::Storage(format!("failed to rename temp file: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn read(&self, key: &str) -> ClientResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load_map().await?.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> ClientResult<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.load_map().await?;
        map.insert(key.to_string(), value.to_string());
        self.persist_map(&map).await?;
        debug!(key, "Secure store record written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> ClientResult<()> {
        let _guard = self.lock.lock().await;
        let mut map = match self.load_map().await {
            Ok(map) => map,
            // A corrupt file is replaced rather than blocking removal.
            Err(ClientError::Storage(_)) => HashMap::new(),
            Err(e) => return Err(e),
        };
        if map.remove(key).is_some() || map.is_empty() {
            self.persist_map(&map).await?;
            debug!(key, "Secure store record removed");
        }
        Ok(())
    }
}

// =============================================================================
// Memory Store
// =============================================================================

#[derive(Default)]
pub struct MemorySecureStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn read(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> ClientResult<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> ClientResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

// =============================================================================
// Credential Vault
// =============================================================================

/// The persisted session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAuth {
    pub credential: Credential,
    /// Last server-confirmed user. `None` after a "no session" response.
    pub user: Option<AppUser>,
    pub stored_at: DateTime<Utc>,
}

impl StoredAuth {
    pub fn new(credential: Credential, user: Option<AppUser>) -> Self {
        StoredAuth {
            credential,
            user,
            stored_at: Utc::now(),
        }
    }
}

/// Typed access to the single session record.
#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn SecureStore>,
    key: String,
}

impl CredentialVault {
    pub fn new(store: Arc<dyn SecureStore>, key: impl Into<String>) -> Self {
        CredentialVault {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads the record. A record that cannot be parsed is a `Storage` error.
    pub async fn load(&self) -> ClientResult<Option<StoredAuth>> {
        match self.store.read(&self.key).await? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| ClientError::Storage(format!("corrupt session record: {}", e))),
        }
    }

    pub async fn save(&self, record: &StoredAuth) -> ClientResult<()> {
        let raw = serde_json::to_string(record)
            .map_err(|e| ClientError::Storage(format!("failed to encode session record: {}", e)))?;
        self.store.write(&self.key, &raw).await
    }

    pub async fn clear(&self) -> ClientResult<()> {
        self.store.remove(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> AppUser {
        AppUser {
            id: 1,
            username: "sam".into(),
            display_name: "Sam".into(),
            email: None,
            avatar_url: None,
            bio: None,
            byte_count: 0,
            comment_count: 0,
            likes_given: 0,
            likes_received: 0,
            trust_level: 0,
            admin: false,
            moderator: false,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecureStore::new(dir.path().join("secure.json"));

        assert_eq!(store.read("k").await.unwrap(), None);
        store.write("k", "v1").await.unwrap();
        store.write("other", "v2").await.unwrap();
        assert_eq!(store.read("k").await.unwrap().as_deref(), Some("v1"));

        store.remove("k").await.unwrap();
        assert_eq!(store.read("k").await.unwrap(), None);
        assert_eq!(store.read("other").await.unwrap().as_deref(), Some("v2"));
        assert!(!dir.path().join("secure.tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secure.json");
        let store = FileSecureStore::new(&path);
        store.write("k", "v").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_corrupt_file_surfaces_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secure.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileSecureStore::new(&path);
        assert!(matches!(store.read("k").await, Err(ClientError::Storage(_))));

        // Removal recovers from corruption.
        store.remove("k").await.unwrap();
        assert_eq!(store.read("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_vault_roundtrip_and_clear() {
        let vault = CredentialVault::new(Arc::new(MemorySecureStore::new()), "hubline.session");
        assert!(vault.load().await.unwrap().is_none());

        let record = StoredAuth::new(Credential::new("a".repeat(32)), Some(sample_user()));
        vault.save(&record).await.unwrap();
        assert_eq!(vault.load().await.unwrap(), Some(record));

        vault.clear().await.unwrap();
        assert!(vault.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_vault_corrupt_record() {
        let store = Arc::new(MemorySecureStore::new());
        store.write("hubline.session", "garbage").await.unwrap();

        let vault = CredentialVault::new(store, "hubline.session");
        assert!(matches!(vault.load().await, Err(ClientError::Storage(_))));
    }
}
