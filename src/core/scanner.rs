use crate::core::progress;
use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Extensions picked up by the walk. Matching is exact, so `photo.JPG` is ignored.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("directory does not exist: {}", path.display())]
    MissingDirectory { path: PathBuf },

    #[error("not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl ScanError {
    /// The path the failure is about.
    pub fn path(&self) -> &Path {
        match self {
            ScanError::MissingDirectory { path }
            | ScanError::NotADirectory { path }
            | ScanError::Walk { path, .. } => path,
        }
    }
}

/// Order in which discovered paths are handed to hashing. The first path of a
/// duplicate group survives, so this decides which copy is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TraversalOrder {
    /// Whatever order the filesystem walk yields.
    #[default]
    Walk,
    /// Paths of each set sorted; the first set still precedes the second.
    Sorted,
}

/// Recursively walk `base`, returning every file with an image extension in
/// walk order.
pub fn collect_images(base: &Path) -> Result<Vec<PathBuf>, ScanError> {
    collect_images_with_progress(base, false)
}

fn collect_images_with_progress(base: &Path, show_progress: bool) -> Result<Vec<PathBuf>, ScanError> {
    if !base.exists() {
        return Err(ScanError::MissingDirectory {
            path: base.to_path_buf(),
        });
    }
    if !base.is_dir() {
        return Err(ScanError::NotADirectory {
            path: base.to_path_buf(),
        });
    }

    let spinner = progress::spinner(&format!("Scanning {}…", base.display()), show_progress);
    let mut images = Vec::new();
    for entry in WalkDir::new(base).follow_links(false) {
        let entry = entry.map_err(|source| ScanError::Walk {
            path: source.path().unwrap_or(base).to_path_buf(),
            source,
        })?;
        let path = entry.path();
        // is_file follows symlinks, so linked images count but linked dirs are not entered
        if path.is_file() && has_image_extension(path) {
            images.push(path.to_path_buf());
        }
        spinner.tick();
    }
    spinner.finish_and_clear();

    log::debug!("found {} image(s) under {}", images.len(), base.display());
    Ok(images)
}

/// Collect every base in turn and concatenate the results: all of the first
/// base, then all of the second, and so on. A file reached from more than one
/// base (same base given twice, or one base nested in another) is kept only
/// at its first occurrence.
pub fn collect_image_sets(
    bases: &[PathBuf],
    order: TraversalOrder,
    show_progress: bool,
) -> Result<Vec<PathBuf>, ScanError> {
    let mut all: IndexMap<PathBuf, PathBuf> = IndexMap::new();
    for base in bases {
        let mut images = collect_images_with_progress(base, show_progress)?;
        if order == TraversalOrder::Sorted {
            images.sort();
        }
        for path in images {
            if let Entry::Vacant(slot) = all.entry(file_location(&path)) {
                slot.insert(path);
            } else {
                log::debug!("{} already collected from an earlier set", path.display());
            }
        }
    }
    Ok(all.into_values().collect())
}

/// Where `path` lives on disk, with the directory part resolved so that
/// `photos/a.png`, `./photos/a.png` and `/abs/photos/a.png` compare equal.
/// The file name itself is not resolved, so a symlink stays distinct from its
/// target. Falls back to `path` when the directory cannot be resolved.
pub(crate) fn file_location(path: &Path) -> PathBuf {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return path.to_path_buf();
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    match parent.canonicalize() {
        Ok(dir) => dir.join(name),
        Err(_) => path.to_path_buf(),
    }
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"not really an image").unwrap();
    }

    #[test]
    fn test_extension_matching_is_exact() {
        assert!(has_image_extension(Path::new("a.jpg")));
        assert!(has_image_extension(Path::new("a.jpeg")));
        assert!(has_image_extension(Path::new("dir/a.png")));
        assert!(has_image_extension(Path::new("a.bmp")));
        assert!(!has_image_extension(Path::new("a.JPG")));
        assert!(!has_image_extension(Path::new("a.gif")));
        assert!(!has_image_extension(Path::new("a.tiff")));
        assert!(!has_image_extension(Path::new(".png")));
        assert!(!has_image_extension(Path::new("jpg")));
    }

    #[test]
    fn test_collect_recurses_and_filters() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("a.jpg"));
        touch(&root.join("notes.txt"));
        touch(&root.join("upper.PNG"));
        touch(&root.join("nested/deeper/b.png"));
        touch(&root.join("nested/c.bmp"));

        let mut found = collect_images(root).unwrap();
        found.sort();

        assert_eq!(
            found,
            vec![
                root.join("a.jpg"),
                root.join("nested/c.bmp"),
                root.join("nested/deeper/b.png"),
            ]
        );
    }

    #[test]
    fn test_empty_directory_yields_nothing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(collect_images(temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");

        let err = collect_images(&missing).unwrap_err();
        assert!(matches!(err, ScanError::MissingDirectory { .. }));
        assert_eq!(err.path(), missing.as_path());
    }

    #[test]
    fn test_file_as_base_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.jpg");
        touch(&file);

        assert!(matches!(
            collect_images(&file),
            Err(ScanError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_sets_are_concatenated_in_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(&first.path().join("z.jpg"));
        touch(&first.path().join("y.jpg"));
        touch(&second.path().join("a.jpg"));

        let found = collect_image_sets(
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            TraversalOrder::Sorted,
            false,
        )
        .unwrap();

        assert_eq!(
            found,
            vec![
                first.path().join("y.jpg"),
                first.path().join("z.jpg"),
                second.path().join("a.jpg"),
            ]
        );
    }

    #[test]
    fn test_walk_order_keeps_first_set_first() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        for name in ["b.png", "a.png", "c.png"] {
            touch(&first.path().join(name));
            touch(&second.path().join(name));
        }

        let found = collect_image_sets(
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            TraversalOrder::Walk,
            false,
        )
        .unwrap();

        assert_eq!(found.len(), 6);
        assert!(found[..3].iter().all(|p| p.starts_with(first.path())));
        assert!(found[3..].iter().all(|p| p.starts_with(second.path())));
    }

    #[test]
    fn test_same_base_twice_collects_each_file_once() {
        let photos = TempDir::new().unwrap();
        touch(&photos.path().join("only.png"));
        touch(&photos.path().join("sub/other.jpg"));

        let mut found = collect_image_sets(
            &[photos.path().to_path_buf(), photos.path().to_path_buf()],
            TraversalOrder::Walk,
            false,
        )
        .unwrap();
        found.sort();

        assert_eq!(
            found,
            vec![photos.path().join("only.png"), photos.path().join("sub/other.jpg")]
        );
    }

    #[test]
    fn test_nested_second_base_adds_nothing_new() {
        let photos = TempDir::new().unwrap();
        touch(&photos.path().join("top.png"));
        touch(&photos.path().join("sub/x.png"));

        let found = collect_image_sets(
            &[photos.path().to_path_buf(), photos.path().join("sub")],
            TraversalOrder::Sorted,
            false,
        )
        .unwrap();

        assert_eq!(
            found,
            vec![photos.path().join("sub/x.png"), photos.path().join("top.png")]
        );
    }

    #[test]
    fn test_differently_spelled_base_is_the_same_location() {
        let photos = TempDir::new().unwrap();
        touch(&photos.path().join("sub/x.png"));
        let roundabout = photos.path().join("sub/../sub");

        let found = collect_image_sets(
            &[photos.path().join("sub"), roundabout],
            TraversalOrder::Walk,
            false,
        )
        .unwrap();

        assert_eq!(found, vec![photos.path().join("sub/x.png")]);
    }
}
