use thiserror::Error;

/// Errors returned by the engine.
///
/// Every variant here is fatal for the run: the fabric is torn down, no
/// partial output is written, and the driver exits non-zero.
#[derive(Debug, Error)]
pub enum Error {
    /// The dataset holds no points, so there is nothing to partition.
    #[error("dataset holds no points")]
    EmptyInput,

    /// A run parameter (cluster count, worker count, thread count, CLI
    /// value) is outside its valid range.
    #[error("bad run parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What a valid value looks like.
        message: &'static str,
    },

    /// Seeding needs at least K distinct dataset points.
    #[error("cannot seed {requested} clusters from {n_items} points")]
    InvalidClusterCount {
        /// Requested number of clusters.
        requested: usize,
        /// Points available to seed from.
        n_items: usize,
    },

    /// A CSV row or decoded point disagrees with the run's fixed point
    /// dimension.
    #[error("point of dimension {found} in a run of dimension {expected}")]
    DimensionMismatch {
        /// The run's dimension.
        expected: usize,
        /// Dimension actually seen.
        found: usize,
    },

    /// A point carries a non-finite coordinate.
    #[error("non-finite coordinate in input point {index}")]
    NonFinitePoint {
        /// Dataset index of the offending point.
        index: usize,
    },

    /// A cross-worker operation failed (peer gone, channel closed).
    #[error("fabric failure: {0}")]
    Fabric(String),

    /// A received frame does not match the expected wire layout.
    #[error("short wire frame: expected {expected} bytes, found {found}")]
    ShortFrame {
        /// Bytes the decoder needed.
        expected: usize,
        /// Bytes actually present.
        found: usize,
    },

    /// Worker thread pool could not be built.
    #[error("thread pool: {0}")]
    ThreadPool(String),

    /// CSV source/sink failure.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
