//! The geolocation reconstructor: spec.md §4.4.
//!
//! Computes latitude/longitude arrays for HDF-EOS2 grids whose coordinates
//! are encoded only as projection parameters. [`compute_latlon`] is the
//! single entry point every projection family funnels through; it is
//! "idempotent; referentially transparent in `(proj, which, offset,
//! stride, count)`" per spec.md §4.4's contract.

#![forbid(unsafe_code)]

mod geographic;
mod lamaz;
mod som;

use thiserror::Error as ThisError;

use crate::catalog::ProjectionDescriptor;
use crate::hdf4::{Hdf4Backend, Hdf4Error};

pub use geographic::repair_fill_values;

/// GCTP projection codes this crate recognizes (a subset of the full
/// GCTP table, matching spec.md §4.4's five handled families).
pub mod proj_code {
    /// Geographic (plate carrée).
    pub const GEO: i32 = 0;
    /// Universal Transverse Mercator.
    pub const UTM: i32 = 1;
    /// Lambert Azimuthal Equal Area.
    pub const LAMAZ: i32 = 11;
    /// Cylindrical Equal-Area.
    pub const CEA: i32 = 97;
    /// Space-Oblique Mercator (MISR uses variant SOM type A).
    pub const SOM: i32 = 22;
}

/// Errors raised while reconstructing geolocation arrays.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The GCTP library refused a projection parameter set.
    #[error("GCTP rejected the projection parameters: {0}")]
    Projection(#[from] Hdf4Error),

    /// The requested subset exceeds the projected grid's bounds.
    #[error("requested subset exceeds the projected grid (dim {dim}: size {size}, requested up to {requested})")]
    OutOfRange {
        /// The offending dimension index.
        dim: usize,
        /// The grid's size along that dimension.
        size: u64,
        /// The highest index the request touches.
        requested: u64,
    },

    /// A "large geo" or MOD13C2-like corner pair was not in the valid
    /// lat/lon range.
    #[error("corner coordinates out of range: {0}")]
    InvalidCorners(String),
}

/// Which coordinate axis a [`compute_latlon`] call is asking for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Latitude.
    Lat,
    /// Longitude.
    Lon,
}

/// A sentinel the legacy HDF-EOS2 library sometimes returns in place of a
/// valid coordinate (spec.md §4.4's LAMAZ repair rule).
pub(crate) const LEGACY_SENTINEL: f64 = 1e51;

fn is_invalid_lat(v: f64) -> bool {
    !v.is_finite() || v.abs() > 90.0 || v == LEGACY_SENTINEL
}

fn is_invalid_lon(v: f64) -> bool {
    !v.is_finite() || v.abs() > 180.0 || v == LEGACY_SENTINEL
}

/// Computes the requested hyperslab of a projection's latitude or
/// longitude array.
///
/// Dispatches on `proj.proj_code` (and `proj.special_format` for the two
/// non-standard cases) to the algorithm spec.md §4.4 assigns it. Returns
/// exactly `Π count[i]` elements, per the contract.
pub fn compute_latlon(
    backend: &dyn Hdf4Backend,
    grid_path: &std::path::Path,
    grid_name: &str,
    proj: &ProjectionDescriptor,
    which: Axis,
    offset: &[u64],
    stride: &[u64],
    count: &[u64],
) -> Result<Vec<f64>, Error> {
    match proj.special_format {
        1 => geographic::large_geo(proj, which, offset, stride, count),
        3 => geographic::mod13c2_like(proj, which, offset, stride, count),
        _ => match proj.proj_code {
            proj_code::SOM => som::compute(backend, proj, which, offset, stride, count),
            proj_code::LAMAZ => {
                let raw = geographic::call_library(
                    backend, grid_path, grid_name, proj, which, offset, stride, count,
                )?;
                Ok(lamaz::repair(proj, which, offset, stride, count, raw))
            }
            _ => geographic::call_library(
                backend, grid_path, grid_name, proj, which, offset, stride, count,
            ),
        },
    }
}

/// Normalizes a monotonically increasing longitude series that crosses
/// 180° back into the conventional −180..180 range, per spec.md §4.4's
/// "Longitude 0..360 ↔ −180..180" rule: "if a monotonically increasing
/// longitude series crosses 180, subtract 360 from all elements past the
/// crossing."
pub fn normalize_crossing_longitude(values: &mut [f64]) {
    if let Some(crossing) = values.windows(2).position(|w| w[0] <= 180.0 && w[1] > 180.0) {
        for v in &mut values[crossing + 1..] {
            *v -= 360.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_lat_detects_sentinel_and_out_of_range() {
        assert!(is_invalid_lat(f64::NAN));
        assert!(is_invalid_lat(91.0));
        assert!(is_invalid_lat(LEGACY_SENTINEL));
        assert!(!is_invalid_lat(45.0));
    }

    #[test]
    fn normalize_crossing_longitude_shifts_tail() {
        let mut values = vec![170.0, 175.0, 185.0, 190.0];
        normalize_crossing_longitude(&mut values);
        assert_eq!(vec![170.0, 175.0, -175.0, -170.0], values);
    }

    #[test]
    fn normalize_crossing_longitude_noop_when_no_crossing() {
        let mut values = vec![10.0, 20.0, 30.0];
        let before = values.clone();
        normalize_crossing_longitude(&mut values);
        assert_eq!(before, values);
    }
}
