use crate::core::hash::{HashError, HashIndex, decode_image};
use crate::core::progress;
use image::{ColorType, DynamicImage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no file name in {}", path.display())]
    NoFileName { path: PathBuf },

    #[error(transparent)]
    Decode(#[from] HashError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl MergeError {
    pub fn path(&self) -> Option<&Path> {
        match self {
            MergeError::CreateDir { path, .. }
            | MergeError::NoFileName { path }
            | MergeError::Write { path, .. } => Some(path),
            MergeError::Decode(err) => err.path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedImage {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Hands out destination paths inside one directory, never the same one twice.
///
/// Only names handed out by this namer count as taken; files already sitting
/// in the directory are not looked at and get overwritten.
#[derive(Debug)]
pub struct OutputNamer {
    target_dir: PathBuf,
    written: HashSet<PathBuf>,
}

impl OutputNamer {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            written: HashSet::new(),
        }
    }

    /// Destination for `source`: its own file name, or `stem_1.ext`,
    /// `stem_2.ext`, … when that name was already handed out.
    pub fn claim(&mut self, source: &Path) -> Result<PathBuf, MergeError> {
        let file_name = source.file_name().ok_or_else(|| MergeError::NoFileName {
            path: source.to_path_buf(),
        })?;
        let base = Path::new(file_name);
        let stem = base.file_stem().unwrap_or(file_name);

        let mut candidate = self.target_dir.join(file_name);
        let mut suffix = 1u32;
        while self.written.contains(&candidate) {
            let mut name = OsString::from(stem);
            name.push(format!("_{suffix}"));
            if let Some(ext) = base.extension() {
                name.push(".");
                name.push(ext);
            }
            candidate = self.target_dir.join(name);
            suffix += 1;
        }

        self.written.insert(candidate.clone());
        Ok(candidate)
    }
}

/// Destinations every canonical image would be written to, without touching disk.
pub fn plan_outputs(index: &HashIndex, target_dir: &Path) -> Result<Vec<MaterializedImage>, MergeError> {
    let mut namer = OutputNamer::new(target_dir);
    index
        .canonicals()
        .map(|source| -> Result<MaterializedImage, MergeError> {
            Ok(MaterializedImage {
                source: source.to_path_buf(),
                destination: namer.claim(source)?,
            })
        })
        .collect()
}

/// Re-encode the first image of every group into `target_dir`, creating it
/// if needed.
pub fn materialize(index: &HashIndex, target_dir: &Path) -> Result<Vec<MaterializedImage>, MergeError> {
    materialize_with_progress(index, target_dir, false)
}

pub fn materialize_with_progress(
    index: &HashIndex,
    target_dir: &Path,
    show_progress: bool,
) -> Result<Vec<MaterializedImage>, MergeError> {
    fs::create_dir_all(target_dir).map_err(|source| MergeError::CreateDir {
        path: target_dir.to_path_buf(),
        source,
    })?;

    let planned = plan_outputs(index, target_dir)?;
    let bar = progress::bar(planned.len(), "Merging", show_progress);
    for item in &planned {
        let img = decode_image(&item.source)?;
        encodable_for(img, &item.destination)
            .save(&item.destination)
            .map_err(|source| MergeError::Write {
                path: item.destination.clone(),
                source,
            })?;
        log::debug!("wrote {} → {}", item.source.display(), item.destination.display());
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(planned)
}

/// JPEG carries neither alpha nor 16-bit samples, and BMP only 8-bit
/// gray, RGB or RGBA, so flatten to something the encoder accepts.
fn encodable_for(img: DynamicImage, destination: &Path) -> DynamicImage {
    let ext = destination.extension().and_then(|ext| ext.to_str());
    match (ext, img.color()) {
        (_, ColorType::L8 | ColorType::Rgb8) => img,
        (Some("jpg" | "jpeg"), _) => DynamicImage::ImageRgb8(img.to_rgb8()),
        (Some("bmp"), ColorType::Rgba8) => img,
        (Some("bmp"), color) if color.has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
        (Some("bmp"), _) => DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => img,
    }
}
