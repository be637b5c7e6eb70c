//! Lambert Azimuthal Equal-Area post-processing, spec.md §4.4: "compute
//! full grid, then post-process: any element for which the library
//! returned ±∞, NaN, or a magnitude > 90 (lat) or > 180 (lon), or the
//! sentinel 1e51, is replaced by the value of the nearest neighbour that
//! *is* valid. Nearest is computed by recursive diagonal/axial walk from
//! the current cell toward the interior."

use super::{is_invalid_lat, is_invalid_lon, Axis};
use crate::catalog::ProjectionDescriptor;

/// Repairs invalid cells in a library-computed LAMAZ grid in place,
/// returning the repaired values. `offset`/`stride`/`count` describe the
/// requested subset against the full `[ydim, xdim]` grid; the walk toward
/// "the interior" is expressed in the subset's own index space, since that
/// is the only grid this function has values for.
pub(super) fn repair(
    _proj: &ProjectionDescriptor,
    which: Axis,
    _offset: &[u64],
    _stride: &[u64],
    count: &[u64],
    mut values: Vec<f64>,
) -> Vec<f64> {
    if count.len() != 2 {
        return values;
    }
    let (rows, cols) = (count[0] as usize, count[1] as usize);
    let is_invalid = |v: f64| match which {
        Axis::Lat => is_invalid_lat(v),
        Axis::Lon => is_invalid_lon(v),
    };

    let invalid_cells: Vec<(usize, usize)> = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .filter(|&(r, c)| is_invalid(values[r * cols + c]))
        .collect();

    for (r, c) in invalid_cells {
        if let Some(v) = nearest_valid(&values, rows, cols, r, c, &is_invalid) {
            values[r * cols + c] = v;
        }
    }
    values
}

/// Walks diagonally and axially from `(r, c)` toward the grid's centre
/// (the "interior"), returning the first valid value encountered.
fn nearest_valid(
    values: &[f64],
    rows: usize,
    cols: usize,
    r: usize,
    c: usize,
    is_invalid: &impl Fn(f64) -> bool,
) -> Option<f64> {
    let centre_r = rows / 2;
    let centre_c = cols / 2;
    let step_r: isize = if centre_r >= r { 1 } else { -1 };
    let step_c: isize = if centre_c >= c { 1 } else { -1 };

    let mut cur_r = r as isize;
    let mut cur_c = c as isize;
    while (cur_r, cur_c) != (centre_r as isize, centre_c as isize) {
        if cur_r != centre_r as isize {
            cur_r += step_r;
        }
        if cur_c != centre_c as isize {
            cur_c += step_c;
        }
        if cur_r < 0 || cur_c < 0 || cur_r as usize >= rows || cur_c as usize >= cols {
            break;
        }
        let value = values[cur_r as usize * cols + cur_c as usize];
        if !is_invalid(value) {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proj() -> ProjectionDescriptor {
        ProjectionDescriptor {
            proj_code: crate::geolocation::proj_code::LAMAZ,
            zone: 0,
            sphere: 0,
            upleft: (0.0, 0.0),
            lowright: (0.0, 0.0),
            params: [0.0; 13],
            xdim: 3,
            ydim: 3,
            pix_reg: 0,
            origin: 0,
            ydimmajor: true,
            special_format: 0,
        }
    }

    #[test]
    fn repairs_corner_from_nearest_valid_toward_centre() {
        #[rustfmt::skip]
        let values = vec![
            1e51, 10.0, 20.0,
            30.0, 40.0, 50.0,
            60.0, 70.0, 80.0,
        ];
        let repaired = repair(&proj(), Axis::Lat, &[0, 0], &[1, 1], &[3, 3], values);
        assert_eq!(40.0, repaired[0]);
    }

    #[test]
    fn leaves_valid_grid_untouched() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        let repaired = repair(&proj(), Axis::Lon, &[0, 0], &[1, 1], &[2, 2], values.clone());
        assert_eq!(values, repaired);
    }
}
