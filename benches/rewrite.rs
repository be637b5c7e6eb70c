//! Timing for the two hottest parts of a large open: the metadata
//! rewriter's six phases (`src/rewrite/mod.rs`), and MISR's per-pixel
//! block/line/sample inversion (`src/geolocation/som.rs`), which is the
//! one projection path that can't be vectorized into a single library
//! call. See `examples/gadomski-las-rs/benches/roundtrip.rs` for the
//! precedent this is grounded on (the teacher's Cargo.toml already moved
//! that bench to `criterion`, ahead of the stale nightly-`test` file the
//! retrieval pack happened to carry).

use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use hdf4_cf::catalog::{Catalog, Dimension, ElementType, FieldKind, FieldSource, ProjectionDescriptor, SdsField};
use hdf4_cf::geolocation::{self, proj_code, Axis};
use hdf4_cf::hdf4::{Hdf4Backend, Hdf4Error, ObjRef, ProjectionParams, RawAttr, SdsInfo, VdataInfo, VgroupChild, VgroupInfo};
use hdf4_cf::{Config, SpecialProductType};

/// A catalog with `nvars` 2-D fields sharing one `row`/`col` pair, each
/// needing a fresh synthetic-index CV the first time the pipeline runs.
fn fixture_catalog(nvars: usize) -> Catalog {
    let mut catalog = Catalog::empty("bench.hdf");
    for i in 0..nvars {
        catalog.sds_fields.push(SdsField {
            name: format!("var_{i}"),
            new_name: format!("var_{i}"),
            element_type: ElementType::Float32,
            dims: vec![
                Dimension {
                    name: "row".to_string(),
                    size: 1000,
                    scale_type: 0,
                },
                Dimension {
                    name: "col".to_string(),
                    size: 1000,
                    scale_type: 0,
                },
            ],
            field_kind: FieldKind::General,
            units: None,
            coordinates: None,
            source: FieldSource::SyntheticIndex(0),
            path: "/Data Fields".to_string(),
        });
    }
    catalog
}

fn bench_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite_pipeline");
    for nvars in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(nvars), &nvars, |b, &nvars| {
            let config = Config::default();
            b.iter_batched(
                || fixture_catalog(nvars),
                |mut catalog| {
                    hdf4_cf::rewrite::rewrite(&mut catalog, SpecialProductType::Other, &config).unwrap();
                    black_box(&catalog);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Stands in for the MISR offset table and GCTP inversion: returns a flat
/// per-block Y-offset table from `misr_init` and a trivial linear mapping
/// from `misr_inv`/`som_inv`, just enough to exercise the nested-loop
/// shape `som::compute` drives the real library through.
#[derive(Debug)]
struct SomBackend;

impl Hdf4Backend for SomBackend {
    fn open(&self, _path: &Path) -> Result<(i32, i32), Hdf4Error> {
        unimplemented!()
    }
    fn close(&self, _sd_id: i32, _h_id: i32) -> Result<(), Hdf4Error> {
        unimplemented!()
    }
    fn file_attrs(&self, _sd_id: i32) -> Result<Vec<RawAttr>, Hdf4Error> {
        unimplemented!()
    }
    fn sd_refs(&self, _sd_id: i32) -> Result<Vec<ObjRef>, Hdf4Error> {
        unimplemented!()
    }
    fn sd_info(&self, _sd_id: i32, _sds_ref: ObjRef) -> Result<SdsInfo, Hdf4Error> {
        unimplemented!()
    }
    fn sd_read_hyperslab(&self, _sd_id: i32, _sds_ref: ObjRef, _start: &[u64], _stride: &[u64], _count: &[u64]) -> Result<Vec<u8>, Hdf4Error> {
        unimplemented!()
    }
    fn sd_fill_value(&self, _sd_id: i32, _sds_ref: ObjRef) -> Result<Option<Vec<u8>>, Hdf4Error> {
        unimplemented!()
    }
    fn vdata_refs(&self, _h_id: i32) -> Result<Vec<ObjRef>, Hdf4Error> {
        unimplemented!()
    }
    fn vdata_info(&self, _h_id: i32, _vdata_ref: ObjRef) -> Result<VdataInfo, Hdf4Error> {
        unimplemented!()
    }
    fn vdata_attrs(&self, _h_id: i32, _vdata_ref: ObjRef) -> Result<Vec<RawAttr>, Hdf4Error> {
        unimplemented!()
    }
    fn vdata_read_field(&self, _h_id: i32, _vdata_ref: ObjRef, _field_name: &str) -> Result<Vec<u8>, Hdf4Error> {
        unimplemented!()
    }
    fn lone_vgroups(&self, _h_id: i32) -> Result<Vec<ObjRef>, Hdf4Error> {
        unimplemented!()
    }
    fn vgroup_info(&self, _h_id: i32, _vgroup_ref: ObjRef) -> Result<VgroupInfo, Hdf4Error> {
        unimplemented!()
    }
    fn vgroup_children(&self, _h_id: i32, _vgroup_ref: ObjRef) -> Result<Vec<VgroupChild>, Hdf4Error> {
        unimplemented!()
    }
    fn vgroup_attrs(&self, _h_id: i32, _vgroup_ref: ObjRef) -> Result<Vec<RawAttr>, Hdf4Error> {
        unimplemented!()
    }
    fn eos_grid_projection(&self, _path: &Path, _grid_name: &str) -> Result<ProjectionParams, Hdf4Error> {
        unimplemented!()
    }
    fn eos_project_rowcol(&self, _proj: &ProjectionParams, _row: f64, _col: f64) -> Result<(f64, f64), Hdf4Error> {
        unimplemented!()
    }
    fn misr_init(&self, nblock: u32, _ulc: (f64, f64), _lrc: (f64, f64)) -> Result<Vec<f64>, Hdf4Error> {
        Ok((0..nblock).map(|b| b as f64 * 17.6).collect())
    }
    fn misr_inv(&self, offsets: &[f64], block: u32, line: f64, sample: f64) -> Result<(f64, f64), Hdf4Error> {
        Ok((offsets[block as usize] + line, sample))
    }
    fn som_inv(&self, _proj: &ProjectionParams, som_x: f64, som_y: f64) -> Result<(f64, f64), Hdf4Error> {
        Ok((som_y / 1000.0, som_x / 1000.0))
    }
}

fn bench_som_inversion(c: &mut Criterion) {
    let backend = SomBackend;
    let proj = ProjectionDescriptor {
        proj_code: proj_code::SOM,
        zone: 0,
        sphere: 0,
        upleft: (0.0, 0.0),
        lowright: (1.0, 1.0),
        params: [0.0; 13],
        xdim: 4,
        ydim: 512,
        pix_reg: 0,
        origin: 0,
        ydimmajor: true,
        special_format: 0,
    };

    c.bench_function("som_inversion_one_block", |b| {
        b.iter(|| {
            let values = geolocation::compute_latlon(
                &backend,
                Path::new("bench.hdf"),
                "MISR_Grid",
                &proj,
                Axis::Lat,
                &[0, 0, 0],
                &[1, 1, 1],
                &[1, 512, 4],
            )
            .unwrap();
            black_box(values);
        });
    });
}

criterion_group!(benches, bench_rewrite, bench_som_inversion);
criterion_main!(benches);
