use crate::core::hash::{HashIndex, PerceptualHash};
use crate::core::scanner::file_location;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to delete duplicate {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One duplicate group after resolution: the copy kept and the copies removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGroup {
    pub hash: PerceptualHash,
    pub retained: PathBuf,
    pub removed: Vec<PathBuf>,
}

/// Delete every member but the first of each group with more than one member.
///
/// A member that names the same file as the kept copy is never deleted.
/// Stops at the first failed delete; files already removed stay removed.
/// With `dry_run` nothing is touched and the returned plan is the same.
pub fn remove_duplicates(index: &HashIndex, dry_run: bool) -> Result<Vec<ResolvedGroup>, ResolveError> {
    let mut resolved = Vec::new();
    for (hash, paths) in index.duplicate_groups() {
        let Some((retained, rest)) = paths.split_first() else {
            continue;
        };
        let kept = file_location(retained);
        let mut removed = Vec::new();

        for dup in rest {
            if dup == retained || file_location(dup) == kept {
                log::warn!("{} listed twice; keeping it", dup.display());
                continue;
            }
            if dry_run {
                log::info!("[dry-run] would delete {}", dup.display());
            } else {
                fs::remove_file(dup).map_err(|source| ResolveError::Delete {
                    path: dup.clone(),
                    source,
                })?;
                log::info!("deleted {} (duplicate of {})", dup.display(), retained.display());
            }
            removed.push(dup.clone());
        }

        if !removed.is_empty() {
            resolved.push(ResolvedGroup {
                hash,
                retained: retained.clone(),
                removed,
            });
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(path: &Path) -> PathBuf {
        fs::write(path, b"x").unwrap();
        path.to_path_buf()
    }

    #[test]
    fn test_keeps_first_of_each_group() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let a = write(&dir.join("a.png"));
        let b = write(&dir.join("b.png"));
        let c = write(&dir.join("c.png"));
        let d = write(&dir.join("d.png"));

        let mut index = HashIndex::new();
        index.insert(PerceptualHash(1), a.clone());
        index.insert(PerceptualHash(2), b.clone());
        index.insert(PerceptualHash(1), c.clone());
        index.insert(PerceptualHash(1), d.clone());

        let resolved = remove_duplicates(&index, false).unwrap();

        assert_eq!(
            resolved,
            vec![ResolvedGroup {
                hash: PerceptualHash(1),
                retained: a.clone(),
                removed: vec![c.clone(), d.clone()],
            }]
        );
        assert!(a.exists());
        assert!(b.exists());
        assert!(!c.exists());
        assert!(!d.exists());
    }

    #[test]
    fn test_unique_hashes_delete_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut index = HashIndex::new();
        let mut paths = Vec::new();
        for i in 0..4 {
            let path = write(&temp_dir.path().join(format!("{i}.jpg")));
            index.insert(PerceptualHash(i), path.clone());
            paths.push(path);
        }

        let resolved = remove_duplicates(&index, false).unwrap();

        assert!(resolved.is_empty());
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_dry_run_leaves_files() {
        let temp_dir = TempDir::new().unwrap();
        let a = write(&temp_dir.path().join("a.png"));
        let b = write(&temp_dir.path().join("b.png"));

        let mut index = HashIndex::new();
        index.insert(PerceptualHash(7), a.clone());
        index.insert(PerceptualHash(7), b.clone());

        let resolved = remove_duplicates(&index, true).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].removed, vec![b.clone()]);
        assert!(a.exists());
        assert!(b.exists());
    }

    #[test]
    fn test_missing_duplicate_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let a = write(&temp_dir.path().join("a.png"));
        let gone = temp_dir.path().join("gone.png");

        let mut index = HashIndex::new();
        index.insert(PerceptualHash(3), a.clone());
        index.insert(PerceptualHash(3), gone.clone());

        let err = remove_duplicates(&index, false).unwrap_err();
        let ResolveError::Delete { path, .. } = err;
        assert_eq!(path, gone);
        assert!(a.exists());
    }

    #[test]
    fn test_kept_copy_listed_twice_is_not_deleted() {
        let temp_dir = TempDir::new().unwrap();
        let only = write(&temp_dir.path().join("only.png"));

        let mut index = HashIndex::new();
        index.insert(PerceptualHash(5), only.clone());
        index.insert(PerceptualHash(5), only.clone());

        let resolved = remove_duplicates(&index, false).unwrap();

        assert!(resolved.is_empty());
        assert!(only.exists());
    }

    #[test]
    fn test_kept_copy_under_another_spelling_is_not_deleted() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("sub")).unwrap();
        let x = write(&temp_dir.path().join("sub/x.png"));
        let y = write(&temp_dir.path().join("sub/y.png"));
        let alias = temp_dir.path().join("sub/../sub/x.png");

        let mut index = HashIndex::new();
        index.insert(PerceptualHash(6), x.clone());
        index.insert(PerceptualHash(6), alias);
        index.insert(PerceptualHash(6), y.clone());

        let resolved = remove_duplicates(&index, false).unwrap();

        assert_eq!(resolved[0].removed, vec![y.clone()]);
        assert!(x.exists());
        assert!(!y.exists());
    }
}
