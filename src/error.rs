//! The crate's top-level error type.
//!
//! Each component module (`catalog`, `geolocation`, `cache`) defines its own
//! richer error enum and converts into one of the kinds here with `#[from]`,
//! the same pattern the teacher uses for `header::Error` converting into the
//! crate `Error` (see `examples/gadomski-las-rs/src/header/mod.rs`).

#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;
use thiserror::Error as ThisError;

use crate::cache;
use crate::catalog;
use crate::geolocation;

/// The five error kinds of spec.md §7, plus `Cancelled`.
#[derive(Debug, ThisError)]
pub enum Error {
    /// OS-level (open/read/lock/rename) failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path the failing operation targeted.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// An `io::Error` with no associated path (bare conversions via `?`).
    #[error("I/O error: {0}")]
    PlainIo(#[from] io::Error),

    /// The HDF4 library failed during metadata traversal, or a classifier/
    /// rewriter invariant was violated. Fatal for the request; the catalog
    /// that was being built is discarded.
    #[error(transparent)]
    Format(#[from] catalog::Error),

    /// The GCTP library refused a projection parameter set, or a projected
    /// grid could not be reconstructed. Fatal for any request needing that
    /// projection's lat/lon.
    #[error(transparent)]
    Projection(#[from] geolocation::Error),

    /// A caller-supplied hyperslab exceeds a dimension's size. Always
    /// surfaced to the caller.
    #[error(
        "hyperslab out of range on dimension {dim_index} (size {dim_size}): \
         start {start} + stride {stride} * (count {count} - 1) exceeds the dimension"
    )]
    OutOfRange {
        /// Index of the offending dimension.
        dim_index: usize,
        /// The dimension's materialized size.
        dim_size: u64,
        /// The requested start offset.
        start: u64,
        /// The requested stride.
        stride: u64,
        /// The requested element count.
        count: u64,
    },

    /// Cooperative cancellation observed at an HDF4-call or cache-read
    /// boundary.
    #[error("operation cancelled")]
    Cancelled,

    /// The cache directory is missing, unreadable, or misconfigured. Fatal
    /// for the cache, not for the read path (callers fall back to live
    /// computation).
    #[error("cache configuration error: {0}")]
    Config(String),

    /// A cache I/O or locking failure below `ConfigError` severity.
    #[error(transparent)]
    Cache(#[from] cache::Error),
}

impl Error {
    /// Wraps an `io::Error` with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Error {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
