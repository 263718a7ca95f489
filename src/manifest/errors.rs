use std::fmt;
use std::io;
use std::path::PathBuf;

/// Failures raised by the manifest layer
#[derive(Debug)]
pub enum ManifestError {
    /// `remove_key` was called for an origin with no current mapping
    NotFound {
        /// Origin path that had no mapping
        key: String,
    },
    /// A path cannot be used as a manifest key because it is not valid UTF-8
    InvalidPath {
        /// Offending path
        path: PathBuf,
    },
    /// The snapshot file could not be read or written
    Io {
        /// File that was being accessed
        path: PathBuf,
        /// Underlying I/O failure
        source: io::Error,
    },
    /// The snapshot is not valid JSON or is not shaped like `{keys, values}`
    Parse {
        /// File the snapshot came from, if any
        path: Option<PathBuf>,
        /// Underlying decode failure
        source: serde_json::Error,
    },
}

impl ManifestError {
    /// Whether this error only affects a single pipeline event
    ///
    /// Load-time failures are fatal to stage startup; a missing key or an
    /// unusable path only aborts bookkeeping for the event that referenced it.
    #[must_use]
    pub const fn is_per_event(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::InvalidPath { .. })
    }
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "No manifest entry for key \"{key}\""),
            Self::InvalidPath { path } => {
                write!(f, "Path is not valid UTF-8: {}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "Failed to access manifest {}: {source}", path.display())
            }
            Self::Parse {
                path: Some(path),
                source,
            } => write!(f, "Failed to parse manifest {}: {source}", path.display()),
            Self::Parse { path: None, source } => write!(f, "Failed to parse manifest: {source}"),
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NotFound { .. } | Self::InvalidPath { .. } => None,
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}
