//! Geographic/CEA/LAMAZ library-backed projection, plus the two
//! non-standard "special format" linear formulas and the fill-value
//! repair pass, spec.md §4.4.

use std::path::Path;

use super::{is_invalid_lat, is_invalid_lon, Axis, Error};
use crate::catalog::ProjectionDescriptor;
use crate::hdf4::Hdf4Backend;

/// Calls the underlying HDF-EOS2 library to project each requested
/// (row, col) pair to lat/lon using the grid's GCTP parameters, flattening
/// 2-D results in the order `proj.ydimmajor` declares.
pub(super) fn call_library(
    backend: &dyn Hdf4Backend,
    grid_path: &Path,
    grid_name: &str,
    proj: &ProjectionDescriptor,
    which: Axis,
    offset: &[u64],
    stride: &[u64],
    count: &[u64],
) -> Result<Vec<f64>, Error> {
    validate_subset(proj, offset, stride, count)?;
    let backend_proj = crate::hdf4::ProjectionParams {
        proj_code: proj.proj_code,
        zone: proj.zone,
        sphere: proj.sphere,
        upleft: proj.upleft,
        lowright: proj.lowright,
        params: proj.params,
        xdim: proj.xdim,
        ydim: proj.ydim,
        pix_reg: proj.pix_reg,
        origin: proj.origin,
        ydimmajor: proj.ydimmajor,
    };
    let _ = (grid_path, grid_name);

    let rank = count.len();
    let mut out = Vec::with_capacity(count.iter().product::<u64>() as usize);
    if rank == 1 {
        // [ydim] for lat, [xdim] for lon: the other axis is held at 0.
        for i in 0..count[0] {
            let idx = offset[0] + i * stride[0];
            let (row, col) = match which {
                Axis::Lat => (idx, 0),
                Axis::Lon => (0, idx),
            };
            let (lat, lon) = backend
                .eos_project_rowcol(&backend_proj, row as f64, col as f64)
                .map_err(Error::Projection)?;
            out.push(select(which, lat, lon));
        }
    } else {
        for i in 0..count[0] {
            for j in 0..count[1] {
                let row = offset[0] + i * stride[0];
                let col = offset[1] + j * stride[1];
                let (r, c) = if proj.ydimmajor { (row, col) } else { (col, row) };
                let (lat, lon) = backend
                    .eos_project_rowcol(&backend_proj, r as f64, c as f64)
                    .map_err(Error::Projection)?;
                out.push(select(which, lat, lon));
            }
        }
    }
    Ok(out)
}

fn select(which: Axis, lat: f64, lon: f64) -> f64 {
    match which {
        Axis::Lat => lat,
        Axis::Lon => lon,
    }
}

fn validate_subset(
    proj: &ProjectionDescriptor,
    offset: &[u64],
    stride: &[u64],
    count: &[u64],
) -> Result<(), Error> {
    let dims = [proj.ydim as u64, proj.xdim as u64];
    for (i, ((&off, &st), &cnt)) in offset.iter().zip(stride).zip(count).enumerate() {
        if cnt == 0 {
            continue;
        }
        let last = off + (cnt - 1) * st;
        let size = dims.get(i).copied().unwrap_or(u64::MAX);
        if last >= size {
            return Err(Error::OutOfRange {
                dim: i,
                size,
                requested: last,
            });
        }
    }
    Ok(())
}

/// "Non-standard large geographic" (`special_format == 1`): linear
/// interpolation between the grid's corners, one dimension only.
///
/// `lat(i) = up_left_y + (i+½)·(low_right_y − up_left_y)/ydim`,
/// symmetrically for longitude against the x corners.
pub(super) fn large_geo(
    proj: &ProjectionDescriptor,
    which: Axis,
    offset: &[u64],
    stride: &[u64],
    count: &[u64],
) -> Result<Vec<f64>, Error> {
    let (origin, extent, dim_size) = match which {
        Axis::Lat => (proj.upleft.1, proj.lowright.1 - proj.upleft.1, proj.ydim as f64),
        Axis::Lon => (proj.upleft.0, proj.lowright.0 - proj.upleft.0, proj.xdim as f64),
    };
    if proj.upleft.1 < -90.0
        || proj.upleft.1 > 90.0
        || proj.lowright.1 < -90.0
        || proj.lowright.1 > 90.0
    {
        return Err(Error::InvalidCorners(format!(
            "latitude corners out of [-90, 90]: {:?}/{:?}",
            proj.upleft, proj.lowright
        )));
    }
    if proj.upleft.0 < -180.0
        || proj.upleft.0 > 180.0
        || proj.lowright.0 < -180.0
        || proj.lowright.0 > 180.0
    {
        return Err(Error::InvalidCorners(format!(
            "longitude corners out of [-180, 180]: {:?}/{:?}",
            proj.upleft, proj.lowright
        )));
    }
    let step = extent / dim_size;
    Ok(offset
        .first()
        .zip(stride.first())
        .zip(count.first())
        .map(|((&off, &st), &cnt)| {
            (0..cnt)
                .map(|i| origin + (off as f64 + i as f64 * st as f64 + 0.5) * step)
                .collect()
        })
        .unwrap_or_default())
}

/// "MOD13C2-like missing projection" (`special_format == 3`): a fixed
/// −90/+90, −180/+180 grid with half-cell-centred steps `180/ydim` and
/// `360/xdim`.
pub(super) fn mod13c2_like(
    proj: &ProjectionDescriptor,
    which: Axis,
    offset: &[u64],
    stride: &[u64],
    count: &[u64],
) -> Result<Vec<f64>, Error> {
    let (origin, step) = match which {
        Axis::Lat => (90.0, -180.0 / proj.ydim as f64),
        Axis::Lon => (-180.0, 360.0 / proj.xdim as f64),
    };
    Ok(offset
        .first()
        .zip(stride.first())
        .zip(count.first())
        .map(|((&off, &st), &cnt)| {
            (0..cnt)
                .map(|i| origin + (off as f64 + i as f64 * st as f64 + 0.5) * step)
                .collect()
        })
        .unwrap_or_default())
}

/// Geographic fill-value repair: if a library-computed lat/lon array
/// contains the variable's fill value, compute the uniform step from the
/// first two valid values and fill forward. Rejects if the repaired tail
/// would leave the valid range.
pub fn repair_fill_values(which: Axis, mut values: Vec<f64>, fill_value: f64) -> Result<Vec<f64>, Error> {
    let Some(first_fill) = values.iter().position(|&v| v == fill_value) else {
        return Ok(values);
    };
    if first_fill < 2 {
        return Err(Error::InvalidCorners(
            "not enough leading valid values to derive a fill-repair step".to_string(),
        ));
    }
    let step = values[first_fill - 1] - values[first_fill - 2];
    for i in first_fill..values.len() {
        let candidate = values[i - 1] + step;
        let out_of_range = match which {
            Axis::Lat => is_invalid_lat(candidate),
            Axis::Lon => is_invalid_lon(candidate),
        };
        if out_of_range {
            return Err(Error::InvalidCorners(format!(
                "fill-repair tail value {candidate} left the valid range"
            )));
        }
        values[i] = candidate;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_proj() -> ProjectionDescriptor {
        ProjectionDescriptor {
            proj_code: 0,
            zone: 0,
            sphere: 0,
            upleft: (-180.0, 90.0),
            lowright: (180.0, -90.0),
            params: [0.0; 13],
            xdim: 4,
            ydim: 2,
            pix_reg: 0,
            origin: 0,
            ydimmajor: true,
            special_format: 1,
        }
    }

    #[test]
    fn large_geo_linear_interpolation() {
        let proj = base_proj();
        let lat = large_geo(&proj, Axis::Lat, &[0], &[1], &[2]).unwrap();
        assert_eq!(vec![45.0, -45.0], lat);
    }

    #[test]
    fn large_geo_rejects_bad_corners() {
        let mut proj = base_proj();
        proj.upleft.1 = 200.0;
        assert!(large_geo(&proj, Axis::Lat, &[0], &[1], &[1]).is_err());
    }

    #[test]
    fn mod13c2_like_fixed_grid() {
        let proj = base_proj();
        let lon = mod13c2_like(&proj, Axis::Lon, &[0], &[1], &[4]).unwrap();
        assert_eq!(vec![-135.0, -45.0, 45.0, 135.0], lon);
    }

    #[test]
    fn repair_fill_values_fills_forward() {
        let values = vec![-90.0, -89.9, -89.8, 9999.0, 9999.0];
        let repaired = repair_fill_values(Axis::Lat, values, 9999.0).unwrap();
        assert!((repaired[3] - (-89.7)).abs() < 1e-9);
        assert!((repaired[4] - (-89.6)).abs() < 1e-9);
    }

    #[test]
    fn repair_fill_values_rejects_tail_leaving_range() {
        let values = vec![89.8, 89.9, 9999.0, 9999.0];
        assert!(repair_fill_values(Axis::Lat, values, 9999.0).is_err());
    }
}
