//! In-memory manifest registry, mirrored to one JSON file per skill under
//! the data directory. Mutations take a write lock; reads a read lock.

use std::collections::HashMap;
use std::path::PathBuf;

use kore_commons::error::{KoreError, KoreResult};
use tokio::sync::RwLock;

use super::types::{SkillManifest, SkillState, SkillType};

pub struct Registry {
    data_dir: PathBuf,
    manifests: RwLock<HashMap<String, SkillManifest>>,
}

impl Registry {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir, manifests: RwLock::new(HashMap::new()) }
    }

    fn manifest_path(&self, id: &str) -> PathBuf {
        self.data_dir.join("skills").join(format!("{id}.json"))
    }

    /// Rejects a duplicate `(id, version)` pair and semver-incompatible
    /// downgrades (a lower version than the one already registered).
    pub async fn register(&self, manifest: SkillManifest) -> KoreResult<()> {
        manifest.validate().map_err(KoreError::Validation)?;
        let mut guard = self.manifests.write().await;

        if let Some(existing) = guard.get(&manifest.id) {
            if existing.version == manifest.version {
                return Err(KoreError::Conflict(format!(
                    "skill `{}` version {} is already registered",
                    manifest.id, manifest.version
                )));
            }
            if manifest.version < existing.version {
                return Err(KoreError::Conflict(format!(
                    "refusing to downgrade skill `{}` from {} to {}",
                    manifest.id, existing.version, manifest.version
                )));
            }
        }

        self.persist(&manifest).await?;
        guard.insert(manifest.id.clone(), manifest);
        Ok(())
    }

    async fn persist(&self, manifest: &SkillManifest) -> KoreResult<()> {
        let path = self.manifest_path(&manifest.id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| KoreError::Storage(format!("creating {}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(manifest)
            .map_err(|e| KoreError::Storage(format!("serializing manifest: {e}")))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| KoreError::Storage(format!("writing {}: {e}", path.display())))?;
        Ok(())
    }

    async fn set_state(&self, id: &str, state: SkillState) -> KoreResult<()> {
        let mut guard = self.manifests.write().await;
        let manifest = guard.get_mut(id).ok_or_else(|| KoreError::not_found("skill", id))?;
        manifest.state = state;
        manifest.updated_at = chrono::Utc::now();
        let snapshot = manifest.clone();
        drop(guard);
        self.persist(&snapshot).await
    }

    pub async fn enable(&self, id: &str) -> KoreResult<()> {
        self.set_state(id, SkillState::Enabled).await
    }

    pub async fn disable(&self, id: &str) -> KoreResult<()> {
        self.set_state(id, SkillState::Disabled).await
    }

    pub async fn get(&self, id: &str) -> KoreResult<SkillManifest> {
        self.manifests.read().await.get(id).cloned().ok_or_else(|| KoreError::not_found("skill", id))
    }

    pub async fn list_by_state(&self, state: SkillState) -> Vec<SkillManifest> {
        self.manifests.read().await.values().filter(|m| m.state == state).cloned().collect()
    }

    pub async fn list_by_type(&self, kind: SkillType) -> Vec<SkillManifest> {
        self.manifests.read().await.values().filter(|m| m.kind == kind).cloned().collect()
    }
}
