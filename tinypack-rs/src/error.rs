//! Error types for tinypack.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Result type alias using BundleError.
pub type BundleResult<T> = Result<T, BundleError>;

/// Errors that can occur while building, sealing or emitting a bundle.
///
/// Build errors are shared between every module that waits on the failing
/// module, so the type is `Clone` and wraps I/O errors in an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum BundleError {
    /// A module file is missing or unreadable.
    #[error("Failed to read module {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: Arc<io::Error>,
    },

    /// A module's source is not valid JavaScript.
    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Source text could not be regenerated from a rewritten syntax tree.
    #[error("Failed to generate code for {}: {message}", path.display())]
    Codegen { path: PathBuf, message: String },

    /// The output directory or an output file is not writable.
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: Arc<io::Error>,
    },

    /// The chunk template could not be loaded or rendered.
    #[error("Template error: {0}")]
    Template(String),

    /// Invalid bundler options.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Two entries were registered under the same chunk name.
    #[error("Duplicate entry name `{name}`")]
    DuplicateEntry { name: String },

    /// A hook tap rejected the current phase.
    #[error("Hook `{hook}` failed in tap `{tap}`: {message}")]
    Hook {
        hook: &'static str,
        tap: String,
        message: String,
    },

    /// A module build stopped before publishing its outcome.
    #[error("Build of module `{id}` was interrupted")]
    Interrupted { id: String },
}

impl BundleError {
    pub fn read(path: &Path, err: io::Error) -> Self {
        BundleError::Read {
            path: path.to_path_buf(),
            source: Arc::new(err),
        }
    }

    pub fn write(path: &Path, err: io::Error) -> Self {
        BundleError::Write {
            path: path.to_path_buf(),
            source: Arc::new(err),
        }
    }
}

impl From<serde_json::Error> for BundleError {
    fn from(err: serde_json::Error) -> Self {
        BundleError::Config(err.to_string())
    }
}
