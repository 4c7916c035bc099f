use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Startup failures while building the media catalog. These are the only
/// errors that end the process with a failure status.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The configured media directory is missing or not a directory.
    #[error("media directory is missing or not a directory: {}", .0.display())]
    BadDir(PathBuf),

    /// The scan completed but found nothing playable.
    #[error("no supported media found")]
    Empty,

    /// Underlying directory walk error.
    #[error("failed to read media directory {}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// A video item could not be handed to an external player.
#[derive(Debug, Error)]
pub enum SpawnFailure {
    #[error("no supported video player found in PATH")]
    NoPlayer,

    #[error("failed to spawn video player {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Per-item rendering failures. Never propagated past the transition that hit them.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to decode image {}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to scale image {}: {message}", path.display())]
    Scale { path: PathBuf, message: String },

    #[error("rendering surface unavailable: {0}")]
    Surface(String),
}
