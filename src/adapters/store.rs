use crate::domain::model::{CredentialBundle, ProfileRecord};
use crate::domain::ports::CredentialStore;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    profiles: Vec<ProfileRecord>,
}

/// Profiles kept in a local JSON file, re-read on every lookup.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<ProfileFile> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(ProfileFile::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProfileFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, file: &ProfileFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for JsonFileStore {
    async fn load_profile(&self, user_id: &str) -> Result<Option<ProfileRecord>> {
        let file = self.read_file().await?;
        Ok(file.profiles.into_iter().find(|p| p.user_id == user_id))
    }

    async fn save_bundle(&self, user_id: &str, bundle: CredentialBundle) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.read_file().await?;

        match file.profiles.iter_mut().find(|p| p.user_id == user_id) {
            Some(profile) => profile.portal = Some(bundle),
            None => file.profiles.push(ProfileRecord {
                user_id: user_id.to_string(),
                portal: Some(bundle),
            }),
        }

        self.write_file(&file).await?;
        tracing::debug!(user_id, path = %self.path.display(), "Saved credential bundle");
        Ok(())
    }
}

/// In-process store for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    profiles: Arc<RwLock<HashMap<String, ProfileRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = ProfileRecord>) -> Self {
        let map = profiles
            .into_iter()
            .map(|p| (p.user_id.clone(), p))
            .collect();
        Self {
            profiles: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load_profile(&self, user_id: &str) -> Result<Option<ProfileRecord>> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn save_bundle(&self, user_id: &str, bundle: CredentialBundle) -> Result<()> {
        let mut profiles = self.profiles.write().await;
        profiles
            .entry(user_id.to_string())
            .or_insert_with(|| ProfileRecord {
                user_id: user_id.to_string(),
                portal: None,
            })
            .portal = Some(bundle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bundle(tag: &str) -> CredentialBundle {
        CredentialBundle {
            portal_url: Some(format!("url-{}", tag)),
            username: Some(format!("user-{}", tag)),
            password: Some(format!("pass-{}", tag)),
            connected: true,
        }
    }

    #[tokio::test]
    async fn test_json_store_missing_file_has_no_profiles() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("profiles.json"));
        assert!(store.load_profile("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_store_save_and_update() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("profiles.json");
        let store = JsonFileStore::new(&path);

        store.save_bundle("u1", bundle("a")).await.unwrap();
        store.save_bundle("u2", bundle("b")).await.unwrap();
        store.save_bundle("u1", bundle("c")).await.unwrap();

        let u1 = store.load_profile("u1").await.unwrap().unwrap();
        assert_eq!(u1.portal, Some(bundle("c")));
        let u2 = store.load_profile("u2").await.unwrap().unwrap();
        assert_eq!(u2.portal, Some(bundle("b")));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["profiles"].as_array().unwrap().len(), 2);
        assert_eq!(raw["profiles"][0]["userId"], "u1");
        assert_eq!(raw["profiles"][0]["portal"]["portalUrl"], "url-c");
    }

    #[tokio::test]
    async fn test_json_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(store.load_profile("u1").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load_profile("u1").await.unwrap().is_none());
        store.save_bundle("u1", bundle("a")).await.unwrap();
        let profile = store.load_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.portal, Some(bundle("a")));
    }
}
