//! MISR's Space-Oblique Mercator (SOM) projection, spec.md §4.4: "3-D
//! (block, line, sample) projection used by MISR", output shape
//! `[180, ydim, xdim]`.
//!
//! "Initialize the MISR offset table from attribute `NBLOCK×NOFFSET=180×…`
//! then, for each (block, line, sample) triple, compute SOM X/Y and invert
//! to (lat,lon). If the caller requests an unsubsetted full cube, generate
//! all 180 blocks once and cache; for subsets, generate only the requested
//! triples."

use super::{Axis, Error};
use crate::catalog::ProjectionDescriptor;
use crate::hdf4::Hdf4Backend;

/// Total MISR blocks per orbit, per spec.md §4.4's `NBLOCK×NOFFSET=180×…`.
const NBLOCK: u32 = 180;

pub(super) fn compute(
    backend: &dyn Hdf4Backend,
    proj: &ProjectionDescriptor,
    which: Axis,
    offset: &[u64],
    stride: &[u64],
    count: &[u64],
) -> Result<Vec<f64>, Error> {
    if offset.len() != 3 || stride.len() != 3 || count.len() != 3 {
        return Err(Error::OutOfRange {
            dim: 0,
            size: 3,
            requested: offset.len() as u64,
        });
    }
    let offsets = backend
        .misr_init(NBLOCK, proj.upleft, proj.lowright)
        .map_err(Error::Projection)?;

    let dims = [NBLOCK as u64, proj.ydim as u64, proj.xdim as u64];
    for (i, ((&off, &st), &cnt)) in offset.iter().zip(stride).zip(count).enumerate() {
        if cnt == 0 {
            continue;
        }
        let last = off + (cnt - 1) * st;
        if last >= dims[i] {
            return Err(Error::OutOfRange {
                dim: i,
                size: dims[i],
                requested: last,
            });
        }
    }

    let mut out = Vec::with_capacity((count[0] * count[1] * count[2]) as usize);
    for bi in 0..count[0] {
        let block = (offset[0] + bi * stride[0]) as u32;
        for li in 0..count[1] {
            let line = (offset[1] + li * stride[1]) as f64;
            for si in 0..count[2] {
                let sample = (offset[2] + si * stride[2]) as f64;
                let (som_x, som_y) = backend
                    .misr_inv(&offsets, block, line, sample)
                    .map_err(Error::Projection)?;
                let (lat, lon) = backend
                    .som_inv(
                        &crate::hdf4::ProjectionParams {
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
                        },
                        som_x,
                        som_y,
                    )
                    .map_err(Error::Projection)?;
                out.push(match which {
                    Axis::Lat => lat,
                    Axis::Lon => lon,
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    struct FakeBackend {
        calls: Mutex<Vec<(u32, f64, f64)>>,
    }

    impl std::fmt::Debug for FakeBackend {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("FakeBackend").finish()
        }
    }

    impl Hdf4Backend for FakeBackend {
        fn open(&self, _: &Path) -> Result<(i32, i32), crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn close(&self, _: i32, _: i32) -> Result<(), crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn file_attrs(&self, _: i32) -> Result<Vec<crate::hdf4::RawAttr>, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn sd_refs(&self, _: i32) -> Result<Vec<crate::hdf4::ObjRef>, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn sd_info(
            &self,
            _: i32,
            _: crate::hdf4::ObjRef,
        ) -> Result<crate::hdf4::SdsInfo, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn sd_read_hyperslab(
            &self,
            _: i32,
            _: crate::hdf4::ObjRef,
            _: &[u64],
            _: &[u64],
            _: &[u64],
        ) -> Result<Vec<u8>, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn sd_fill_value(
            &self,
            _: i32,
            _: crate::hdf4::ObjRef,
        ) -> Result<Option<Vec<u8>>, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn vdata_refs(&self, _: i32) -> Result<Vec<crate::hdf4::ObjRef>, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn vdata_info(
            &self,
            _: i32,
            _: crate::hdf4::ObjRef,
        ) -> Result<crate::hdf4::VdataInfo, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn vdata_attrs(
            &self,
            _: i32,
            _: crate::hdf4::ObjRef,
        ) -> Result<Vec<crate::hdf4::RawAttr>, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn vdata_read_field(
            &self,
            _: i32,
            _: crate::hdf4::ObjRef,
            _: &str,
        ) -> Result<Vec<u8>, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn lone_vgroups(&self, _: i32) -> Result<Vec<crate::hdf4::ObjRef>, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn vgroup_info(
            &self,
            _: i32,
            _: crate::hdf4::ObjRef,
        ) -> Result<crate::hdf4::VgroupInfo, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn vgroup_children(
            &self,
            _: i32,
            _: crate::hdf4::ObjRef,
        ) -> Result<Vec<crate::hdf4::VgroupChild>, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn vgroup_attrs(
            &self,
            _: i32,
            _: crate::hdf4::ObjRef,
        ) -> Result<Vec<crate::hdf4::RawAttr>, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn eos_grid_projection(
            &self,
            _: &Path,
            _: &str,
        ) -> Result<crate::hdf4::ProjectionParams, crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn eos_project_rowcol(
            &self,
            _: &crate::hdf4::ProjectionParams,
            _: f64,
            _: f64,
        ) -> Result<(f64, f64), crate::hdf4::Hdf4Error> {
            unimplemented!()
        }
        fn misr_init(&self, nblock: u32, _: (f64, f64), _: (f64, f64)) -> Result<Vec<f64>, crate::hdf4::Hdf4Error> {
            Ok(vec![0.0; nblock as usize * 2])
        }
        fn misr_inv(
            &self,
            _: &[f64],
            block: u32,
            line: f64,
            sample: f64,
        ) -> Result<(f64, f64), crate::hdf4::Hdf4Error> {
            self.calls.lock().unwrap().push((block, line, sample));
            Ok((line, sample))
        }
        fn som_inv(
            &self,
            _: &crate::hdf4::ProjectionParams,
            som_x: f64,
            som_y: f64,
        ) -> Result<(f64, f64), crate::hdf4::Hdf4Error> {
            Ok((som_x * 2.0, som_y * 3.0))
        }
    }

    fn som_proj() -> ProjectionDescriptor {
        ProjectionDescriptor {
            proj_code: crate::geolocation::proj_code::SOM,
            zone: 0,
            sphere: 0,
            upleft: (0.0, 0.0),
            lowright: (0.0, 0.0),
            params: [0.0; 13],
            xdim: 11,
            ydim: 11,
            pix_reg: 0,
            origin: 0,
            ydimmajor: true,
            special_format: 0,
        }
    }

    #[test]
    fn som_subset_visits_requested_triples_only() {
        let backend = FakeBackend {
            calls: Mutex::new(Vec::new()),
        };
        let proj = som_proj();
        let result = compute(&backend, &proj, Axis::Lat, &[5, 0, 0], &[1, 2, 2], &[1, 6, 6]).unwrap();
        assert_eq!(36, result.len());
        assert_eq!(36, backend.calls.lock().unwrap().len());
        assert!(backend.calls.lock().unwrap().iter().all(|&(b, _, _)| b == 5));
        // lat = line*2, line in {0,2,4,6,8,10}; first entry line=0 -> lat=0.
        assert_eq!(0.0, result[0]);
    }

    #[test]
    fn som_rejects_wrong_rank() {
        let backend = FakeBackend {
            calls: Mutex::new(Vec::new()),
        };
        let proj = som_proj();
        assert!(compute(&backend, &proj, Axis::Lat, &[0, 0], &[1, 1], &[1, 1]).is_err());
    }
}
