use crate::core::progress;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageReader};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_HASH_SIZE: u32 = 8;

/// Largest grid whose bits still fit in a `u64`.
pub const MAX_HASH_SIZE: u32 = 8;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("hash size must be between 1 and {MAX_HASH_SIZE}, got {size}")]
    InvalidHashSize { size: u32 },

    #[error("a {width}x{height} grid is too small for hash size {hash_size}")]
    GridTooSmall {
        width: u32,
        height: u32,
        hash_size: u32,
    },

    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl HashError {
    pub fn path(&self) -> Option<&Path> {
        match self {
            HashError::InvalidHashSize { .. } | HashError::GridTooSmall { .. } => None,
            HashError::Open { path, .. } | HashError::Decode { path, .. } => Some(path),
        }
    }
}

/// Difference hash of an image: one bit per horizontally adjacent pixel pair
/// of the downsampled luminance grid, row-major, bit 0 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerceptualHash(pub u64);

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// What to do with a file that has an image extension but does not decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Stop the whole run on the first unreadable image.
    #[default]
    Abort,
    /// Log a warning, remember the path as skipped, keep going.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashOptions {
    pub hash_size: u32,
    pub decode_policy: DecodePolicy,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            hash_size: DEFAULT_HASH_SIZE,
            decode_policy: DecodePolicy::Abort,
        }
    }
}

fn check_hash_size(hash_size: u32) -> Result<(), HashError> {
    if (1..=MAX_HASH_SIZE).contains(&hash_size) {
        Ok(())
    } else {
        Err(HashError::InvalidHashSize { size: hash_size })
    }
}

/// Compare each pixel of a `hash_size + 1` by `hash_size` grid with its right
/// neighbour. Bit `row * hash_size + col` is set when the left pixel is brighter.
pub fn difference_bits(grid: &GrayImage, hash_size: u32) -> Result<u64, HashError> {
    check_hash_size(hash_size)?;
    if grid.width() <= hash_size || grid.height() < hash_size {
        return Err(HashError::GridTooSmall {
            width: grid.width(),
            height: grid.height(),
            hash_size,
        });
    }

    let mut bits = 0u64;
    for row in 0..hash_size {
        for col in 0..hash_size {
            let left = grid.get_pixel(col, row)[0];
            let right = grid.get_pixel(col + 1, row)[0];
            if left > right {
                bits |= 1u64 << (row * hash_size + col);
            }
        }
    }
    Ok(bits)
}

pub fn dhash_image(img: &DynamicImage, hash_size: u32) -> Result<PerceptualHash, HashError> {
    check_hash_size(hash_size)?;
    let gray = img.to_luma8();
    let grid = imageops::resize(&gray, hash_size + 1, hash_size, FilterType::Triangle);
    difference_bits(&grid, hash_size).map(PerceptualHash)
}

/// Decode the file at `path` (format sniffed from its content) and hash it.
/// The file handle does not outlive this call.
pub fn dhash_file(path: &Path, hash_size: u32) -> Result<PerceptualHash, HashError> {
    check_hash_size(hash_size)?;
    let img = decode_image(path)?;
    dhash_image(&img, hash_size)
}

pub(crate) fn decode_image(path: &Path) -> Result<DynamicImage, HashError> {
    let open_err = |source| HashError::Open {
        path: path.to_path_buf(),
        source,
    };
    ImageReader::open(path)
        .map_err(open_err)?
        .with_guessed_format()
        .map_err(open_err)?
        .decode()
        .map_err(|source| HashError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Paths grouped by identical hash. Groups iterate in the order their hash
/// was first seen and keep their members in insertion order, so the first
/// member of every group is the earliest discovered copy.
#[derive(Debug, Clone, Default)]
pub struct HashIndex {
    groups: IndexMap<PerceptualHash, Vec<PathBuf>>,
    skipped: Vec<PathBuf>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(paths: &[PathBuf], options: &HashOptions) -> Result<Self, HashError> {
        Self::build_with_progress(paths, options, false)
    }

    pub fn build_with_progress(
        paths: &[PathBuf],
        options: &HashOptions,
        show_progress: bool,
    ) -> Result<Self, HashError> {
        check_hash_size(options.hash_size)?;

        let bar = progress::bar(paths.len(), "Hashing", show_progress);
        let mut index = Self::new();
        for path in paths {
            match dhash_file(path, options.hash_size) {
                Ok(hash) => {
                    log::debug!("{} {}", hash, path.display());
                    index.insert(hash, path.clone());
                }
                Err(err) if options.decode_policy == DecodePolicy::Skip => {
                    log::warn!("skipping unreadable image: {err}");
                    index.skipped.push(path.clone());
                }
                Err(err) => {
                    bar.abandon();
                    return Err(err);
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        log::info!(
            "hashed {} image(s) into {} group(s), {} skipped",
            index.image_count(),
            index.len(),
            index.skipped.len()
        );
        Ok(index)
    }

    pub fn insert(&mut self, hash: PerceptualHash, path: PathBuf) {
        self.groups.entry(hash).or_default().push(path);
    }

    /// Number of distinct hashes.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of hashed paths across all groups.
    pub fn image_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn group(&self, hash: PerceptualHash) -> Option<&[PathBuf]> {
        self.groups.get(&hash).map(Vec::as_slice)
    }

    pub fn groups(&self) -> impl Iterator<Item = (PerceptualHash, &[PathBuf])> {
        self.groups.iter().map(|(hash, paths)| (*hash, paths.as_slice()))
    }

    /// Groups with more than one member.
    pub fn duplicate_groups(&self) -> impl Iterator<Item = (PerceptualHash, &[PathBuf])> {
        self.groups().filter(|(_, paths)| paths.len() > 1)
    }

    /// First member of every group, in group order.
    pub fn canonicals(&self) -> impl Iterator<Item = &Path> {
        self.groups.values().filter_map(|paths| paths.first().map(PathBuf::as_path))
    }

    /// Paths left out under [`DecodePolicy::Skip`].
    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }
}
