//! Path helpers shared by the VFS and security interceptor.

use std::path::{Component, Path, PathBuf};

use path_clean::PathClean;

/// Lexically clean a path (resolve `.`/`..` without touching the
/// filesystem). Used before any symlink-aware canonicalisation so relative
/// paths without `..` segments can be validated without requiring the file
/// to already exist.
pub fn clean(path: &Path) -> PathBuf {
    path.clean()
}

/// Whether `path` contains a literal `..` component, lexically.
pub fn has_parent_traversal(path: &Path) -> bool {
    path.components().any(|c| c == Component::ParentDir)
}

/// Separator-boundary check: `candidate` is `root` itself, or a descendant
/// of `root` separated by a path component boundary. A naive string-prefix
/// check would wrongly accept `/workspace-evil` as a descendant of
/// `/workspace`; this compares component sequences instead.
pub fn is_descendant_or_equal(candidate: &Path, root: &Path) -> bool {
    let candidate_components: Vec<_> = candidate.components().collect();
    let root_components: Vec<_> = root.components().collect();
    if candidate_components.len() < root_components.len() {
        return false;
    }
    candidate_components[..root_components.len()] == root_components[..]
}

/// Partition key used by the VFS's `group_by_directory`: the parent of
/// `path`, normalised to use `/` so the convention holds across platforms.
/// `/test/a.txt` groups under `/test`.
pub fn directory_group_key(path: &str) -> String {
    let p = Path::new(path);
    match p.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            parent.to_string_lossy().replace('\\', "/")
        }
        _ => "/".to_string(),
    }
}
