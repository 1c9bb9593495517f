//! Virtual File System: an in-memory `path -> VirtualDocument` map with
//! commit/rollback semantics, guarded by a single read-write lock so
//! readers run concurrently and writers are exclusive.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use kore_commons::diff::{self, DiffResult};
use kore_commons::error::{KoreError, KoreResult};
use kore_commons::paths::directory_group_key;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualDocument {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_committed: bool,
}

pub struct VirtualFileSystem {
    documents: RwLock<HashMap<String, VirtualDocument>>,
}

impl Default for VirtualFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFileSystem {
    pub fn new() -> Self {
        Self { documents: RwLock::new(HashMap::new()) }
    }

    pub fn create(&self, path: &str, content: String) -> KoreResult<()> {
        let mut docs = self.write_lock()?;
        if docs.contains_key(path) {
            return Err(KoreError::Conflict(format!("document already exists at `{path}`")));
        }
        let now = Utc::now();
        docs.insert(
            path.to_string(),
            VirtualDocument {
                path: path.to_string(),
                content,
                metadata: HashMap::new(),
                created_at: now,
                updated_at: now,
                is_committed: false,
            },
        );
        Ok(())
    }

    pub fn read(&self, path: &str) -> KoreResult<VirtualDocument> {
        let docs = self.read_lock()?;
        docs.get(path)
            .cloned()
            .ok_or_else(|| KoreError::not_found("document", path))
    }

    /// Fails if the document doesn't exist, or exists and is already
    /// committed (committed documents require an explicit re-authorised
    /// write, modeled here as going through `commit`/`rollback` instead).
    pub fn update(&self, path: &str, content: String) -> KoreResult<()> {
        let mut docs = self.write_lock()?;
        let doc = docs.get_mut(path).ok_or_else(|| KoreError::not_found("document", path))?;
        if doc.is_committed {
            return Err(KoreError::Conflict(format!(
                "`{path}` is committed; rollback or recreate to modify it"
            )));
        }
        doc.content = content;
        doc.updated_at = Utc::now();
        Ok(())
    }

    pub fn commit(&self, path: &str) -> KoreResult<()> {
        let mut docs = self.write_lock()?;
        let doc = docs.get_mut(path).ok_or_else(|| KoreError::not_found("document", path))?;
        doc.is_committed = true;
        doc.updated_at = Utc::now();
        Ok(())
    }

    pub fn rollback(&self, path: &str) -> KoreResult<()> {
        let mut docs = self.write_lock()?;
        docs.remove(path).ok_or_else(|| KoreError::not_found("document", path))?;
        Ok(())
    }

    pub fn diff(&self, path: &str, disk_content: &str) -> KoreResult<DiffResult> {
        let doc = self.read(path)?;
        Ok(diff::unified_diff(path, disk_content, &doc.content))
    }

    /// Partitions tracked paths by parent directory, e.g. `/test/a.txt`
    /// groups under `/test`.
    pub fn group_by_directory(&self) -> KoreResult<BTreeMap<String, Vec<String>>> {
        let docs = self.read_lock()?;
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for path in docs.keys() {
            groups.entry(directory_group_key(path)).or_default().push(path.clone());
        }
        for paths in groups.values_mut() {
            paths.sort();
        }
        Ok(groups)
    }

    fn read_lock(&self) -> KoreResult<std::sync::RwLockReadGuard<'_, HashMap<String, VirtualDocument>>> {
        self.documents.read().map_err(|_| KoreError::Fatal("vfs lock poisoned".into()))
    }

    fn write_lock(&self) -> KoreResult<std::sync::RwLockWriteGuard<'_, HashMap<String, VirtualDocument>>> {
        self.documents.write().map_err(|_| KoreError::Fatal("vfs lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_read_round_trips() {
        let vfs = VirtualFileSystem::new();
        vfs.create("/a.txt", "hello".into()).unwrap();
        let doc = vfs.read("/a.txt").unwrap();
        assert_eq!(doc.content, "hello");
        assert!(!doc.is_committed);
    }

    #[test]
    fn create_twice_conflicts() {
        let vfs = VirtualFileSystem::new();
        vfs.create("/a.txt", "hello".into()).unwrap();
        assert!(vfs.create("/a.txt", "again".into()).is_err());
    }

    #[test]
    fn update_missing_document_fails() {
        let vfs = VirtualFileSystem::new();
        assert!(vfs.update("/missing.txt", "x".into()).is_err());
    }

    #[test]
    fn committed_document_rejects_update() {
        let vfs = VirtualFileSystem::new();
        vfs.create("/a.txt", "hello".into()).unwrap();
        vfs.commit("/a.txt").unwrap();
        assert!(vfs.update("/a.txt", "world".into()).is_err());
    }

    #[test]
    fn rollback_removes_document() {
        let vfs = VirtualFileSystem::new();
        vfs.create("/a.txt", "hello".into()).unwrap();
        vfs.rollback("/a.txt").unwrap();
        assert!(vfs.read("/a.txt").is_err());
    }

    #[test]
    fn group_by_directory_uses_parent_convention() {
        let vfs = VirtualFileSystem::new();
        vfs.create("/test/a.txt", "a".into()).unwrap();
        vfs.create("/test/b.txt", "b".into()).unwrap();
        vfs.create("/other/c.txt", "c".into()).unwrap();
        let groups = vfs.group_by_directory().unwrap();
        assert_eq!(groups.get("/test").map(Vec::len), Some(2));
        assert_eq!(groups.get("/other").map(Vec::len), Some(1));
    }

    #[test]
    fn diff_reports_has_diff_false_when_unchanged() {
        let vfs = VirtualFileSystem::new();
        vfs.create("/a.txt", "same\n".into()).unwrap();
        let result = vfs.diff("/a.txt", "same\n").unwrap();
        assert!(!result.has_diff);
    }
}
