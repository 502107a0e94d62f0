use crate::core::duplicate::{ResolveError, ResolvedGroup, remove_duplicates};
use crate::core::hash::{HashError, HashIndex, HashOptions};
use crate::core::history::{HistoryError, HistoryLog};
use crate::core::merge::{MaterializedImage, MergeError, materialize_with_progress, plan_outputs};
use crate::core::scanner::{ScanError, TraversalOrder, collect_image_sets};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

/// Everything one run needs, already resolved from the command line.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub imgset1: PathBuf,
    pub imgset2: PathBuf,
    /// Merge target; `None` leaves both sets deduplicated in place.
    pub savedir: Option<PathBuf>,
    pub hash: HashOptions,
    pub order: TraversalOrder,
    pub dry_run: bool,
    /// JSON-lines file that gets one record per resolved duplicate group.
    pub history: Option<PathBuf>,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Discovery,
    Hashing,
    Deletion,
    Materialization,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Discovery => "discovery",
            Phase::Hashing => "hashing",
            Phase::Deletion => "deletion",
            Phase::Materialization => "materialization",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No images found")]
    EmptyInput,

    #[error("discovery failed: {0}")]
    Discovery(#[source] ScanError),

    #[error("hashing failed: {0}")]
    Hashing(#[source] HashError),

    #[error("deletion failed: {0}")]
    Deletion(#[source] ResolveError),

    #[error("materialization failed: {0}")]
    Materialization(#[source] MergeError),

    #[error("recording history failed: {0}")]
    History(#[source] HistoryError),
}

impl PipelineError {
    pub fn phase(&self) -> Option<Phase> {
        match self {
            PipelineError::EmptyInput => None,
            PipelineError::Discovery(_) => Some(Phase::Discovery),
            PipelineError::Hashing(_) => Some(Phase::Hashing),
            PipelineError::Deletion(_) | PipelineError::History(_) => Some(Phase::Deletion),
            PipelineError::Materialization(_) => Some(Phase::Materialization),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub images_found: usize,
    pub images_hashed: usize,
    pub skipped: Vec<PathBuf>,
    pub unique_hashes: usize,
    pub resolved: Vec<ResolvedGroup>,
    /// `None` when no merge target was given.
    pub merged: Option<Vec<MaterializedImage>>,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn removed_count(&self) -> usize {
        self.resolved.iter().map(|g| g.removed.len()).sum()
    }
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("{} took {:.2?}", label, start.elapsed());
    result
}

/// Collect both sets, hash, delete duplicates, then merge if a target is set.
/// Each phase finishes before the next starts; nothing is rolled back on error.
pub fn run(options: &MergeOptions) -> Result<RunSummary, PipelineError> {
    let bases = [options.imgset1.clone(), options.imgset2.clone()];
    let paths = benchmark("discovery", || {
        collect_image_sets(&bases, options.order, options.show_progress)
    })
    .map_err(PipelineError::Discovery)?;
    if paths.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    log::info!("found {} image(s)", paths.len());

    let index = benchmark("hashing", || {
        HashIndex::build_with_progress(&paths, &options.hash, options.show_progress)
    })
    .map_err(PipelineError::Hashing)?;

    // Open before deleting anything so a bad history path fails the run early.
    let mut history = match (&options.history, options.dry_run) {
        (Some(path), false) => Some(HistoryLog::open(path).map_err(PipelineError::History)?),
        _ => None,
    };
    let resolved = benchmark("deletion", || remove_duplicates(&index, options.dry_run))
        .map_err(PipelineError::Deletion)?;
    if let Some(out) = history.as_mut() {
        for group in &resolved {
            out.append(group).map_err(PipelineError::History)?;
        }
    }

    let merged = match &options.savedir {
        Some(dir) if options.dry_run => {
            Some(plan_outputs(&index, dir).map_err(PipelineError::Materialization)?)
        }
        Some(dir) => Some(
            benchmark("materialization", || {
                materialize_with_progress(&index, dir, options.show_progress)
            })
            .map_err(PipelineError::Materialization)?,
        ),
        None => None,
    };

    Ok(RunSummary {
        images_found: paths.len(),
        images_hashed: index.image_count(),
        skipped: index.skipped().to_vec(),
        unique_hashes: index.len(),
        resolved,
        merged,
        dry_run: options.dry_run,
    })
}
