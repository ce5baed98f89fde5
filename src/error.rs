use thiserror::Error;

/// Errors raised by slide readers.
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// The slide file could not be opened or decoded
    #[error("Failed to open slide {path}: {reason}")]
    Open { path: String, reason: String },

    /// The slide has no pyramid levels
    #[error("Slide has no pyramid levels")]
    EmptyPyramid,

    /// Requested level does not exist
    #[error("Invalid level {level}: slide has {level_count} levels")]
    InvalidLevel { level: usize, level_count: usize },

    /// A region could not be read or decoded
    #[error("Failed to read region at ({x}, {y}) on level {level}: {reason}")]
    Read {
        level: usize,
        x: i64,
        y: i64,
        reason: String,
    },
}

/// Errors from the tile pipeline (manager, loader pool, configuration).
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Error from the underlying slide
    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    /// A loader thread could not be started
    #[error("Failed to spawn tile worker: {0}")]
    WorkerSpawn(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors from annotation persistence.
#[derive(Debug, Clone, Error)]
pub enum AnnotationError {
    /// Reading or writing the annotation file failed
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// The annotation document is not valid JSON for the schema
    #[error("Invalid annotation document: {0}")]
    Json(String),
}

impl From<serde_json::Error> for AnnotationError {
    fn from(err: serde_json::Error) -> Self {
        AnnotationError::Json(err.to_string())
    }
}
