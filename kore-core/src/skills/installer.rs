//! Atomic skill-package installer: unpack a zip with a Zip-Slip guard,
//! validate the manifest, move into the final install directory, and roll
//! back on any failure. Grounded on the teacher's
//! `marketplace/installer.rs` install/integrate flow.

use std::io::Read;
use std::path::{Path, PathBuf};

use kore_commons::error::{KoreError, KoreResult};

use super::registry::Registry;
use super::types::SkillManifest;

pub struct Installer {
    skills_dir: PathBuf,
}

impl Installer {
    pub fn new(skills_dir: PathBuf) -> Self {
        Self { skills_dir }
    }

    /// Extract `zip_path` to a tempdir (rejecting any entry whose resolved
    /// path would escape it), load+validate `manifest.json`, copy the tree
    /// into the final install directory, and register with the registry.
    pub async fn install(&self, zip_path: &Path, registry: &Registry, auto_enable: bool) -> KoreResult<SkillManifest> {
        let tempdir = tempfile::tempdir().map_err(|e| KoreError::Storage(e.to_string()))?;
        extract_zip_guarded(zip_path, tempdir.path())?;

        let manifest_path = tempdir.path().join("manifest.json");
        let manifest: SkillManifest = serde_json::from_str(
            &std::fs::read_to_string(&manifest_path).map_err(|e| KoreError::Validation(format!("reading manifest.json: {e}")))?,
        )
        .map_err(|e| KoreError::Validation(format!("parsing manifest.json: {e}")))?;
        manifest.validate().map_err(KoreError::Validation)?;

        let install_dir = self.skills_dir.join(&manifest.id);
        if let Err(e) = copy_tree(tempdir.path(), &install_dir).await {
            let _ = tokio::fs::remove_dir_all(&install_dir).await;
            return Err(e);
        }

        let mut manifest = manifest;
        registry.register(manifest.clone()).await?;
        if auto_enable {
            registry.enable(&manifest.id).await?;
            manifest.state = super::types::SkillState::Enabled;
        }
        Ok(manifest)
    }

    /// Snapshot the existing install, install the new package, and roll
    /// back (restore snapshot, re-register the old manifest) if the new
    /// package's id differs from the one being upgraded.
    pub async fn upgrade(&self, id: &str, zip_path: &Path, registry: &Registry) -> KoreResult<SkillManifest> {
        let old_manifest = registry.get(id).await?;
        let install_dir = self.skills_dir.join(id);
        let backup_dir = self.skills_dir.join(format!("{id}.bak"));
        if install_dir.exists() {
            copy_tree(&install_dir, &backup_dir).await?;
        }

        match self.install(zip_path, registry, false).await {
            Ok(new_manifest) if new_manifest.id == id => {
                let _ = tokio::fs::remove_dir_all(&backup_dir).await;
                Ok(new_manifest)
            }
            Ok(mismatched) => {
                let _ = tokio::fs::remove_dir_all(self.skills_dir.join(&mismatched.id)).await;
                if backup_dir.exists() {
                    let _ = tokio::fs::remove_dir_all(&install_dir).await;
                    copy_tree(&backup_dir, &install_dir).await?;
                    let _ = tokio::fs::remove_dir_all(&backup_dir).await;
                }
                registry.register(old_manifest).await?;
                Err(KoreError::Conflict(format!(
                    "upgrade package id `{}` does not match `{id}`; rolled back",
                    mismatched.id
                )))
            }
            Err(e) => {
                if backup_dir.exists() {
                    let _ = tokio::fs::remove_dir_all(&backup_dir).await;
                }
                Err(e)
            }
        }
    }
}

fn extract_zip_guarded(zip_path: &Path, dest: &Path) -> KoreResult<()> {
    let file = std::fs::File::open(zip_path).map_err(|e| KoreError::Storage(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| KoreError::Validation(format!("invalid zip archive: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| KoreError::Validation(e.to_string()))?;
        let Some(enclosed) = entry.enclosed_name() else {
            return Err(KoreError::Security(kore_commons::error::SecurityError::PathEscape {
                path: PathBuf::from(entry.name()),
                root: dest.to_path_buf(),
            }));
        };
        let out_path = dest.join(enclosed);
        if !out_path.starts_with(dest) {
            return Err(KoreError::Security(kore_commons::error::SecurityError::PathEscape { path: out_path, root: dest.to_path_buf() }));
        }

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| KoreError::Storage(e.to_string()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KoreError::Storage(e.to_string()))?;
        }
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).map_err(|e| KoreError::Storage(e.to_string()))?;
        std::fs::write(&out_path, buf).map_err(|e| KoreError::Storage(e.to_string()))?;
    }
    Ok(())
}

async fn copy_tree(src: &Path, dst: &Path) -> KoreResult<()> {
    tokio::fs::create_dir_all(dst).await.map_err(|e| KoreError::Storage(e.to_string()))?;
    let mut entries = tokio::fs::read_dir(src).await.map_err(|e| KoreError::Storage(e.to_string()))?;
    while let Some(entry) = entries.next_entry().await.map_err(|e| KoreError::Storage(e.to_string()))? {
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type().await.map_err(|e| KoreError::Storage(e.to_string()))?;
        if file_type.is_dir() {
            Box::pin(copy_tree(&entry.path(), &target)).await?;
        } else {
            tokio::fs::copy(entry.path(), &target).await.map_err(|e| KoreError::Storage(e.to_string()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_zip(path: &Path, manifest_json: &str) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("manifest.json", options).unwrap();
        zip.write_all(manifest_json.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    fn builtin_manifest_json(id: &str) -> String {
        format!(
            r#"{{"id":"{id}","name":"{id}","version":"1.0.0","type":"builtin","permissions":[],"tools":[],"state":"installed","installed_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z"}}"#
        )
    }

    #[tokio::test]
    async fn install_registers_manifest_from_zip() {
        let workdir = tempfile::tempdir().unwrap();
        let zip_path = workdir.path().join("pkg.zip");
        write_test_zip(&zip_path, &builtin_manifest_json("demo"));

        let skills_dir = workdir.path().join("skills");
        let installer = Installer::new(skills_dir);
        let registry = Registry::new(workdir.path().join("data"));

        let manifest = installer.install(&zip_path, &registry, true).await.unwrap();
        assert_eq!(manifest.id, "demo");
        let fetched = registry.get("demo").await.unwrap();
        assert_eq!(fetched.state, super::super::types::SkillState::Enabled);
    }
}
