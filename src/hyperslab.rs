//! Regular strided subsets of a multi-dimensional array.
//!
//! A [`Hyperslab`] is the per-dimension `(start, stride, count)` request
//! described in spec.md's glossary; callers may also build one from
//! `(start, stride, stop)` triples, the other notation the spec allows.

#![forbid(unsafe_code)]

use crate::Error;

/// A regular strided subset request over an N-dimensional array.
///
/// All three per-dimension vectors have the same length, the rank of the
/// request (which may be less than the variable's rank only in the sense
/// that every dimension must still be named; there is no implicit "rest of
/// the array" dimension).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hyperslab {
    start: Vec<u64>,
    stride: Vec<u64>,
    count: Vec<u64>,
}

impl Hyperslab {
    /// Builds a hyperslab from explicit `(start, stride, count)` triples.
    ///
    /// # Examples
    ///
    /// ```
    /// use hdf4_cf::Hyperslab;
    /// let slab = Hyperslab::from_start_stride_count(vec![0, 0], vec![1, 1], vec![10, 10]);
    /// assert_eq!(100, slab.element_count());
    /// ```
    pub fn from_start_stride_count(start: Vec<u64>, stride: Vec<u64>, count: Vec<u64>) -> Hyperslab {
        assert_eq!(start.len(), stride.len());
        assert_eq!(start.len(), count.len());
        Hyperslab {
            start,
            stride,
            count,
        }
    }

    /// Builds a hyperslab from `(start, stride, stop)` triples, where `stop`
    /// is the last index included in the slab (inclusive), matching the
    /// DAP2-style constraint notation spec.md's glossary allows.
    ///
    /// # Examples
    ///
    /// ```
    /// use hdf4_cf::Hyperslab;
    /// // 0, 2, 4, 6, 8, 10 -> 6 elements
    /// let slab = Hyperslab::from_start_stride_stop(vec![0], vec![2], vec![10]);
    /// assert_eq!(6, slab.element_count());
    /// ```
    pub fn from_start_stride_stop(start: Vec<u64>, stride: Vec<u64>, stop: Vec<u64>) -> Hyperslab {
        assert_eq!(start.len(), stride.len());
        assert_eq!(start.len(), stop.len());
        let count = start
            .iter()
            .zip(stride.iter())
            .zip(stop.iter())
            .map(|((&s, &st), &stop)| (stop - s) / st + 1)
            .collect();
        Hyperslab {
            start,
            stride,
            count,
        }
    }

    /// A hyperslab covering the whole of a variable with the given per-
    /// dimension sizes.
    pub fn whole(dim_sizes: &[u64]) -> Hyperslab {
        Hyperslab {
            start: vec![0; dim_sizes.len()],
            stride: vec![1; dim_sizes.len()],
            count: dim_sizes.to_vec(),
        }
    }

    /// The rank (number of dimensions) of this request.
    pub fn rank(&self) -> usize {
        self.start.len()
    }

    /// Per-dimension start offsets.
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Per-dimension strides.
    pub fn stride(&self) -> &[u64] {
        &self.stride
    }

    /// Per-dimension element counts.
    pub fn count(&self) -> &[u64] {
        &self.count
    }

    /// The total number of elements `Π count[i]` this hyperslab selects.
    pub fn element_count(&self) -> u64 {
        self.count.iter().product()
    }

    /// `true` if every stride is 1 and the slab covers the whole of
    /// `dim_sizes` (spec.md §4.5's "whole variable, zero-copy" fast path).
    pub fn is_whole(&self, dim_sizes: &[u64]) -> bool {
        self.rank() == dim_sizes.len()
            && self.start.iter().all(|&s| s == 0)
            && self.stride.iter().all(|&s| s == 1)
            && self.count == dim_sizes
    }

    /// Validates this hyperslab against a variable's per-dimension sizes,
    /// returning `OutOfRange` on the first violated dimension.
    ///
    /// # Examples
    ///
    /// ```
    /// use hdf4_cf::Hyperslab;
    /// // last visited index = 5 + 2*2 = 9, within the dimension's bound of 10
    /// let slab = Hyperslab::from_start_stride_count(vec![5], vec![2], vec![3]);
    /// assert!(slab.validate(&[10]).is_ok());
    /// ```
    pub fn validate(&self, dim_sizes: &[u64]) -> Result<(), Error> {
        if dim_sizes.len() != self.rank() {
            return Err(Error::OutOfRange {
                dim_index: 0,
                dim_size: dim_sizes.first().copied().unwrap_or(0),
                start: 0,
                stride: 0,
                count: 0,
            });
        }
        for (i, ((&start, &stride), &count)) in self
            .start
            .iter()
            .zip(self.stride.iter())
            .zip(self.count.iter())
            .enumerate()
        {
            let dim_size = dim_sizes[i];
            let last = count
                .checked_sub(1)
                .and_then(|c| c.checked_mul(stride))
                .and_then(|s| s.checked_add(start));
            match last {
                Some(last) if count == 0 || last < dim_size => {}
                _ => {
                    return Err(Error::OutOfRange {
                        dim_index: i,
                        dim_size,
                        start,
                        stride,
                        count,
                    })
                }
            }
        }
        Ok(())
    }

    /// The flat (row-major) offsets this hyperslab visits within an array of
    /// the given per-dimension sizes, in nested iteration order (last
    /// dimension varies fastest).
    pub fn flat_offsets(&self, dim_sizes: &[u64]) -> Vec<u64> {
        let rank = self.rank();
        if rank == 0 {
            return vec![0];
        }
        let mut strides = vec![1u64; rank];
        for i in (0..rank - 1).rev() {
            strides[i] = strides[i + 1] * dim_sizes[i + 1];
        }
        let mut offsets = Vec::with_capacity(self.element_count() as usize);
        let mut idx = vec![0u64; rank];
        loop {
            let flat: u64 = (0..rank)
                .map(|d| (self.start[d] + idx[d] * self.stride[d]) * strides[d])
                .sum();
            offsets.push(flat);
            let mut d = rank - 1;
            loop {
                idx[d] += 1;
                if idx[d] < self.count[d] {
                    break;
                }
                idx[d] = 0;
                if d == 0 {
                    return offsets;
                }
                d -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_count() {
        let slab = Hyperslab::from_start_stride_count(vec![0, 0], vec![1, 2], vec![4, 3]);
        assert_eq!(12, slab.element_count());
    }

    #[test]
    fn from_stop_inclusive() {
        let slab = Hyperslab::from_start_stride_stop(vec![0], vec![1], vec![9]);
        assert_eq!(10, slab.element_count());
    }

    #[test]
    fn validate_in_range() {
        let slab = Hyperslab::from_start_stride_count(vec![5], vec![2], vec![3]);
        assert!(slab.validate(&[10]).is_ok());
    }

    #[test]
    fn validate_out_of_range() {
        let slab = Hyperslab::from_start_stride_count(vec![5], vec![2], vec![4]);
        // last index = 5 + 2*3 = 11 >= 10
        assert!(slab.validate(&[10]).is_err());
    }

    #[test]
    fn is_whole_detects_full_contiguous_slab() {
        let slab = Hyperslab::whole(&[4, 5]);
        assert!(slab.is_whole(&[4, 5]));
        let partial = Hyperslab::from_start_stride_count(vec![0, 0], vec![1, 2], vec![4, 3]);
        assert!(!partial.is_whole(&[4, 5]));
    }

    #[test]
    fn flat_offsets_row_major() {
        let slab = Hyperslab::whole(&[2, 3]);
        assert_eq!(vec![0, 1, 2, 3, 4, 5], slab.flat_offsets(&[2, 3]));
    }

    #[test]
    fn flat_offsets_strided() {
        let slab = Hyperslab::from_start_stride_count(vec![0], vec![2], vec![3]);
        assert_eq!(vec![0, 2, 4], slab.flat_offsets(&[6]));
    }
}
