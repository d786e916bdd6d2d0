//! Node-registry snapshot: a flat JSON array of nodes.
//!
//! A snapshot lets a run (or a test) work against a fixed hierarchy with no
//! tracker access. Loading rebuilds child lists from parent pointers and
//! rejects any file that breaks the tree invariants.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ErrorCode;
use crate::graph::{Registry, TreeError};
use crate::model::WorkItemNode;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to write snapshot {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read snapshot {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("snapshot {} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("snapshot {} is not a valid hierarchy: {source}", path.display())]
    Invalid { path: PathBuf, source: TreeError },
}

impl SnapshotError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Write { .. } => ErrorCode::SnapshotWriteFailed,
            Self::Read { .. } | Self::Parse { .. } => ErrorCode::SnapshotReadFailed,
            Self::Invalid { .. } => ErrorCode::MalformedHierarchy,
        }
    }
}

/// Write `registry` to `path` as pretty JSON, in placement order.
///
/// # Errors
///
/// Returns [`SnapshotError::Write`] if the file cannot be written.
pub fn write_snapshot(path: &Path, registry: &Registry) -> Result<(), SnapshotError> {
    let io_err = |source: std::io::Error| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    let nodes: Vec<&WorkItemNode> = registry.iter().collect();
    serde_json::to_writer_pretty(&mut writer, &nodes).map_err(|err| io_err(err.into()))?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    debug!(path = %path.display(), nodes = nodes.len(), "snapshot written");
    Ok(())
}

/// Read a snapshot and rebuild the registry.
///
/// # Errors
///
/// Returns [`SnapshotError`] if the file cannot be read, is not a JSON node
/// array, or describes something other than a forest.
pub fn load_snapshot(path: &Path) -> Result<Registry, SnapshotError> {
    let file = File::open(path).map_err(|source| SnapshotError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let nodes: Vec<WorkItemNode> =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| SnapshotError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let registry = Registry::from_nodes(nodes).map_err(|source| SnapshotError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), nodes = registry.len(), "snapshot loaded");
    Ok(registry)
}
