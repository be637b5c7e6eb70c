//! Exposes legacy HDF4 and HDF-EOS2 scientific data files as uniform,
//! self-describing, CF-convention-compliant datasets suitable for
//! request-driven hyperslab subsetting by a network data server.
//!
//! The crate is organized around the pipeline a request actually walks:
//!
//! ```text
//! open -> load_catalog(_hybrid) -> classify -> rewrite -> subset-read
//! ```
//!
//! [`catalog`] walks the opaque HDF4 tag/reference graph and builds an
//! in-memory [`catalog::Catalog`]. [`classify`] assigns the file one
//! [`classify::SpecialProductType`]. [`rewrite`] mutates the catalog so it
//! satisfies CF conventions. [`geolocation`] reconstructs latitude/longitude
//! arrays for HDF-EOS2 grids that only carry projection parameters.
//! [`cache`] persists the results of both the rewriter's synthesis and raw
//! variable reads so repeat requests don't recompute them. [`subset`] ties
//! all of the above together behind a single read entry point.
//!
//! The HDF4 and HDF-EOS2 C libraries are treated as an external collaborator
//! (see [`hdf4::Hdf4Backend`]): this crate does not reimplement them.

#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![allow(clippy::too_many_arguments)]
// `unsafe_code` is forbidden module-by-module instead of crate-wide: every module
// except `hdf4::native` (the FFI boundary to the external HDF4/HDF-EOS2 libraries)
// carries its own `#![forbid(unsafe_code)]`.

#[macro_use]
extern crate log;

pub mod cache;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod error;
pub mod geolocation;
pub mod hdf4;
pub mod hyperslab;
pub mod rewrite;
pub mod subset;

pub use catalog::{Catalog, SpecialProductType};
pub use config::Config;
pub use error::Error;
pub use hyperslab::Hyperslab;
pub use subset::Hdf4File;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;
