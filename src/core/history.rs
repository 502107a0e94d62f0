use crate::core::duplicate::ResolvedGroup;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to open history file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read history file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write history file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize history record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One line of the history file: a duplicate group and what was deleted from it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DedupHistoryRecord {
    pub timestamp: String,
    pub hash: String,
    pub retained: String,
    pub removed: Vec<String>,
}

impl DedupHistoryRecord {
    pub fn from_group(group: &ResolvedGroup) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            hash: group.hash.to_string(),
            retained: group.retained.to_string_lossy().into_owned(),
            removed: group
                .removed
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

/// Append-only JSON-lines log of resolved duplicate groups.
pub struct HistoryLog {
    path: PathBuf,
    out: File,
}

impl HistoryLog {
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| HistoryError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            out,
        })
    }

    pub fn append(&mut self, group: &ResolvedGroup) -> Result<(), HistoryError> {
        let record = DedupHistoryRecord::from_group(group);
        writeln!(self.out, "{}", serde_json::to_string(&record)?).map_err(|source| {
            HistoryError::Write {
                path: self.path.clone(),
                source,
            }
        })
    }
}

/// Read back every well-formed record; malformed lines are logged and skipped.
#[cfg(test)]
pub(crate) fn read_history(path: &Path) -> Result<Vec<DedupHistoryRecord>, HistoryError> {
    use std::io::{BufRead, BufReader};

    let f = File::open(path).map_err(|source| HistoryError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for (i, line) in BufReader::new(f).lines().enumerate() {
        let line = line.map_err(|source| HistoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match serde_json::from_str::<DedupHistoryRecord>(&line) {
            Ok(rec) => records.push(rec),
            Err(err) => log::warn!("skipping malformed history entry {i}: {err}"),
        }
    }
    Ok(records)
}
