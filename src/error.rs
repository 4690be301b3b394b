//! Error types for the `multires` crate.

use thiserror::Error;

/// Main error type for multires operations.
///
/// Evaluation-time errors are always reported to the caller; producing a
/// wrong mesh silently is worse than refusing. Destructive operations
/// (`delete_levels`, `base_apply`) either fully commit or leave prior state
/// untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed base mesh: degenerate face, out-of-range index or
    /// non-manifold edge use.
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// A requested subdivision level exceeds the modifier's total levels or
    /// the hard maximum.
    #[error("Level {level} out of range (max: {max})")]
    LevelOutOfRange { level: u8, max: u8 },

    /// The grid store and the base mesh disagree on the number of face
    /// corners. The caller must notify the modifier of topology changes
    /// before evaluating.
    #[error("Topology mismatch: store holds {stored} grids, base mesh has {expected} corners")]
    TopologyMismatch { stored: usize, expected: usize },

    /// A reshape source has the wrong vertex count for the matching level.
    #[error("Shape mismatch: reshape source has {actual} vertices, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Two multires states cannot be reconciled by resampling within the
    /// supported resolution range.
    #[error("Incompatible levels: cannot reconcile {left} and {right} below level {max}")]
    IncompatibleLevels { left: u8, right: u8, max: u8 },

    /// Index out of bounds.
    #[error("Index {index} out of bounds (max: {max})")]
    IndexOutOfBounds { index: usize, max: usize },

    /// Persisted grid data that cannot be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unknown or unsupported persisted format version.
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),

    /// IO error for file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
