//! Perceptual-hash deduplication of two image trees, with an optional merge
//! of the surviving images into a single directory.

pub mod core;

pub use crate::core::duplicate::{ResolveError, ResolvedGroup, remove_duplicates};
pub use crate::core::hash::{
    DEFAULT_HASH_SIZE, DecodePolicy, HashError, HashIndex, HashOptions, PerceptualHash,
};
pub use crate::core::merge::{MaterializedImage, MergeError, OutputNamer, materialize};
pub use crate::core::pipeline::{MergeOptions, Phase, PipelineError, RunSummary, run};
pub use crate::core::scanner::{ScanError, TraversalOrder, collect_image_sets, collect_images};
