//! The subset-read façade: opens a file, builds and rewrites its catalog,
//! discovers HDF-EOS2 grids, and serves hyperslab reads against whatever
//! `FieldSource` a variable turned out to have.
//!
//! [`Hdf4File`] is the one thing the rest of this crate exists to produce;
//! it plays the role the teacher's `las::Reader` plays over `header::Header`
//! (see `examples/gadomski-las-rs/src/reader/mod.rs`), except the per-read
//! unit here is a named variable's hyperslab rather than a point record.

#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::{self, SubsetCache};
use crate::catalog::{
    self, AnalyticAxis, Catalog, Dimension, ElementType, FieldKind, FieldSource, FileHandle,
    ProjectionDescriptor, SdsField,
};
use crate::classify;
use crate::config::Config;
use crate::geolocation::{self, Axis};
use crate::hdf4::{Hdf4Backend, ObjRef};
use crate::hyperslab::Hyperslab;
use crate::Error;

/// A cooperative cancellation flag, checked at HDF4-call and cache-read
/// boundaries (spec.md §5). Cheap to clone; every clone observes the same
/// underlying flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that starts out not cancelled.
    pub fn new() -> CancellationToken {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// `true` if `cancel` has been called on this token or a clone of it.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

fn check_cancelled(token: &CancellationToken) -> Result<(), Error> {
    if token.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// One hyperslab read's result: the element type and shape needed to
/// interpret `bytes`, packed native-endian row-major per `ElementType`.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableSlice {
    /// The variable's element type.
    pub element_type: ElementType,
    /// Per-dimension element counts, matching the requested hyperslab.
    pub shape: Vec<u64>,
    /// Packed values, `Π shape[i] * element_type.byte_width()` bytes.
    pub bytes: Vec<u8>,
}

/// An open HDF4/HDF-EOS2 file with its CF-rewritten catalog built and its
/// grids discovered, ready to serve hyperslab reads.
#[derive(Debug)]
pub struct Hdf4File {
    handle: FileHandle,
    catalog: Catalog,
    config: Config,
    cache: Option<SubsetCache>,
}

impl Hdf4File {
    /// Opens `path`, builds its catalog (hybrid hint heuristic, falling
    /// back to a plain traversal if nothing was classified as
    /// geolocation/data), classifies the product, rewrites metadata, and
    /// discovers HDF-EOS2 grids (spec.md §4.1–§4.4 in sequence).
    pub fn open(
        backend: Arc<dyn Hdf4Backend>,
        path: impl Into<PathBuf>,
        config: Config,
    ) -> Result<Hdf4File, Error> {
        let handle = FileHandle::open(backend, path, config.pass_file_id)?;

        let mut catalog = catalog::inventory::load_catalog_hybrid(&handle, &config)?;
        if catalog.sds_fields.is_empty() && catalog.vdata_tables.is_empty() {
            catalog = catalog::inventory::load_catalog(&handle, &config)?;
        }

        let product = classify::classify(&catalog);
        crate::rewrite::rewrite(&mut catalog, product, &config)?;
        discover_grids(&handle, &mut catalog);

        let cache = if config.eos_geo_cache_file || config.data_cache_file {
            Some(SubsetCache::open(&config.cache_dir, config.cache_size_bytes)?)
        } else {
            None
        };

        Ok(Hdf4File {
            handle,
            catalog,
            config,
            cache,
        })
    }

    /// The file's fully rewritten catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Reads `slab` of the variable named `name` (its CF-rewritten
    /// `new_name`), dispatching on that variable's `FieldSource`.
    pub fn read_variable(
        &self,
        name: &str,
        slab: &Hyperslab,
        cancel: &CancellationToken,
    ) -> Result<VariableSlice, Error> {
        check_cancelled(cancel)?;
        let field = self.catalog.field_by_new_name(name).ok_or_else(|| {
            Error::Format(catalog::Error::Structural(format!(
                "no such variable {name:?}"
            )))
        })?;
        let dim_sizes = field.dim_sizes();
        slab.validate(&dim_sizes)?;

        let bytes = match field.source.clone() {
            FieldSource::Sds(sds_ref) => self.read_sds(sds_ref, field, slab, cancel)?,
            FieldSource::VdataField {
                vdata_ref,
                field_name,
            } => self.read_vdata_field(vdata_ref, &field_name, field, slab, cancel)?,
            FieldSource::SyntheticIndex(_) => synthetic_index_bytes(slab),
            FieldSource::Analytic(axis) => analytic_bytes(axis, slab),
            FieldSource::Projected {
                projection_index,
                which,
            } => self.read_projected(projection_index, which, field, slab, cancel)?,
        };

        Ok(VariableSlice {
            element_type: field.element_type,
            shape: slab.count().to_vec(),
            bytes,
        })
    }

    fn read_sds(
        &self,
        sds_ref: ObjRef,
        field: &SdsField,
        slab: &Hyperslab,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, Error> {
        check_cancelled(cancel)?;
        let dim_sizes = field.dim_sizes();
        if !slab.is_whole(&dim_sizes) || !self.config.data_cache_file {
            return self.read_sds_live(sds_ref, slab, cancel);
        }

        let Some(cache) = self.cache.as_ref() else {
            return self.read_sds_live(sds_ref, slab, cancel);
        };
        let key = cache::hash_key(&cache::raw_data_fingerprint(
            &self.config.cache_prefix,
            &self.catalog.file_path,
            &field.new_name,
        ));
        let expected_bytes = slab.element_count() * field.element_type.byte_width() as u64;

        match cache.get(&key, expected_bytes) {
            Ok(Some(mut handle)) => match handle.read_at(0, expected_bytes) {
                Ok(bytes) => return Ok(bytes),
                Err(err) => warn!("data cache read failed for {key}: {err}"),
            },
            Ok(None) => {}
            Err(err) => warn!("data cache lookup failed for {key}: {err}"),
        }

        let bytes = self.read_sds_live(sds_ref, slab, cancel)?;
        if let Err(err) = cache.put(&key, expected_bytes, |w| {
            w.write_all(&bytes)
                .map_err(|e| cache::Error::Io {
                    path: self.config.cache_dir.clone(),
                    source: e,
                })
        }) {
            warn!("data cache write failed for {key}: {err}");
        }
        Ok(bytes)
    }

    fn read_sds_live(
        &self,
        sds_ref: ObjRef,
        slab: &Hyperslab,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, Error> {
        check_cancelled(cancel)?;
        let bytes = self
            .handle
            .with_ids(|backend, sd_id, _h_id| {
                backend.sd_read_hyperslab(sd_id, sds_ref, slab.start(), slab.stride(), slab.count())
            })
            .map_err(catalog::Error::from)?;
        Ok(bytes)
    }

    fn read_vdata_field(
        &self,
        vdata_ref: ObjRef,
        field_name: &str,
        field: &SdsField,
        slab: &Hyperslab,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, Error> {
        check_cancelled(cancel)?;
        let whole = self
            .handle
            .with_ids(|backend, _sd_id, h_id| backend.vdata_read_field(h_id, vdata_ref, field_name))
            .map_err(catalog::Error::from)?;
        let width = field.element_type.byte_width();
        let dim_sizes = field.dim_sizes();
        let mut out = Vec::with_capacity(slab.element_count() as usize * width);
        for offset in slab.flat_offsets(&dim_sizes) {
            let start = offset as usize * width;
            out.extend_from_slice(&whole[start..start + width]);
        }
        Ok(out)
    }

    fn read_projected(
        &self,
        projection_index: usize,
        which: Axis,
        field: &SdsField,
        slab: &Hyperslab,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, Error> {
        check_cancelled(cancel)?;
        let proj = self.catalog.projections[projection_index];
        let grid_name = self.catalog.grid_names[projection_index].clone();
        let dim_sizes = field.dim_sizes();

        if self.config.eos_geo_cache_file {
            if let Some(cache) = self.cache.as_ref() {
                return self.read_projected_cached(cache, &proj, &grid_name, which, &dim_sizes, slab, cancel);
            }
        }

        let values = geolocation::compute_latlon(
            self.handle.backend(),
            self.handle.path(),
            &grid_name,
            &proj,
            which,
            slab.start(),
            slab.stride(),
            slab.count(),
        )?;
        let values = repair_if_geographic(&proj, which, values)?;
        Ok(pack_f64(&values))
    }

    fn read_projected_cached(
        &self,
        cache: &SubsetCache,
        proj: &ProjectionDescriptor,
        grid_name: &str,
        which: Axis,
        dim_sizes: &[u64],
        slab: &Hyperslab,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, Error> {
        let key = cache::hash_key(&cache::latlon_fingerprint(&self.config.cache_prefix, proj));
        let total: u64 = dim_sizes.iter().product();
        let half_bytes = total * 8;
        let expected_bytes = half_bytes * 2;

        let whole = match cache.get(&key, expected_bytes) {
            Ok(Some(mut handle)) => match handle.read_at(0, expected_bytes) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    warn!("lat/lon cache read failed for {key}: {err}");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!("lat/lon cache lookup failed for {key}: {err}");
                None
            }
        };

        let whole = match whole {
            Some(w) => w,
            None => {
                check_cancelled(cancel)?;
                let rank = dim_sizes.len();
                let offset = vec![0u64; rank];
                let stride = vec![1u64; rank];
                let lat = geolocation::compute_latlon(
                    self.handle.backend(),
                    self.handle.path(),
                    grid_name,
                    proj,
                    Axis::Lat,
                    &offset,
                    &stride,
                    dim_sizes,
                )?;
                let lat = repair_if_geographic(proj, Axis::Lat, lat)?;
                check_cancelled(cancel)?;
                let lon = geolocation::compute_latlon(
                    self.handle.backend(),
                    self.handle.path(),
                    grid_name,
                    proj,
                    Axis::Lon,
                    &offset,
                    &stride,
                    dim_sizes,
                )?;
                let lon = repair_if_geographic(proj, Axis::Lon, lon)?;

                let mut buf = Vec::with_capacity(expected_bytes as usize);
                buf.extend_from_slice(&pack_f64(&lat));
                buf.extend_from_slice(&pack_f64(&lon));
                if let Err(err) = cache.put(&key, expected_bytes, |w| {
                    w.write_all(&buf).map_err(|e| cache::Error::Io {
                        path: self.config.cache_dir.clone(),
                        source: e,
                    })
                }) {
                    warn!("lat/lon cache write failed for {key}: {err}");
                }
                buf
            }
        };

        let axis_bytes = match which {
            Axis::Lat => &whole[..half_bytes as usize],
            Axis::Lon => &whole[half_bytes as usize..],
        };
        let axis_values = unpack_f64(axis_bytes);
        let mut out = Vec::with_capacity(slab.element_count() as usize * 8);
        for offset in slab.flat_offsets(dim_sizes) {
            out.extend_from_slice(&axis_values[offset as usize].to_ne_bytes());
        }
        Ok(out)
    }
}

/// Geographic-projection lat/lon can come back poisoned with fill values
/// from the library's internal interpolation; spec.md §4.4's repair rule
/// only applies to the standard GEO path, not the two special-format
/// shortcuts (which are closed-form and never poisoned).
fn repair_if_geographic(proj: &ProjectionDescriptor, which: Axis, values: Vec<f64>) -> Result<Vec<f64>, Error> {
    if proj.special_format == 0 && proj.proj_code == geolocation::proj_code::GEO {
        Ok(geolocation::repair_fill_values(which, values, geolocation::LEGACY_SENTINEL)?)
    } else {
        Ok(values)
    }
}

fn pack_f64(values: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for v in values {
        out.extend_from_slice(&v.to_ne_bytes());
    }
    out
}

fn unpack_f64(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
        .collect()
}

fn synthetic_index_bytes(slab: &Hyperslab) -> Vec<u8> {
    let mut out = Vec::with_capacity(slab.count()[0] as usize * 4);
    for i in 0..slab.count()[0] {
        let idx = slab.start()[0] + i * slab.stride()[0];
        out.extend_from_slice(&(idx as i32).to_ne_bytes());
    }
    out
}

fn analytic_bytes(axis: AnalyticAxis, slab: &Hyperslab) -> Vec<u8> {
    let mut out = Vec::with_capacity(slab.count()[0] as usize * 8);
    for i in 0..slab.count()[0] {
        let idx = slab.start()[0] + i * slab.stride()[0];
        out.extend_from_slice(&axis.value_at(idx).to_ne_bytes());
    }
    out
}

/// Finds every HDF-EOS2 grid name referenced by the object inventory's
/// vgroup paths (`/<name>/Data Fields`, `/<name>/Geolocation Fields`), in
/// sorted order so discovery is deterministic.
fn grid_name_candidates(catalog: &Catalog) -> Vec<String> {
    let mut names: HashSet<String> = HashSet::new();
    let paths = catalog
        .sds_fields
        .iter()
        .map(|f| f.path.as_str())
        .chain(catalog.vdata_tables.iter().map(|t| t.path.as_str()));
    for path in paths {
        let components: Vec<&str> = path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        for (i, comp) in components.iter().enumerate() {
            if i > 0 && (*comp == "Data Fields" || *comp == "Geolocation Fields") {
                names.insert(components[i - 1].to_string());
            }
        }
    }
    let mut names: Vec<String> = names.into_iter().collect();
    names.sort();
    names
}

fn grid_dims(proj: &ProjectionDescriptor, grid_name: &str) -> Vec<Dimension> {
    if proj.proj_code == geolocation::proj_code::SOM {
        vec![
            Dimension {
                name: format!("{grid_name}_block"),
                size: 180,
                scale_type: 0,
            },
            Dimension {
                name: format!("{grid_name}_line"),
                size: proj.ydim as u64,
                scale_type: 0,
            },
            Dimension {
                name: format!("{grid_name}_sample"),
                size: proj.xdim as u64,
                scale_type: 0,
            },
        ]
    } else {
        vec![
            Dimension {
                name: format!("{grid_name}_row"),
                size: proj.ydim as u64,
                scale_type: 0,
            },
            Dimension {
                name: format!("{grid_name}_col"),
                size: proj.xdim as u64,
                scale_type: 0,
            },
        ]
    }
}

/// Post-rewrite grid discovery: attaches every HDF-EOS2 grid's projection
/// descriptor to the catalog and, for grids whose product strategy left no
/// latitude/longitude field behind, synthesizes `Projected` lat/lon
/// variables and points the grid's data fields at them via `coordinates`.
///
/// Runs after [`crate::rewrite::rewrite`] (rather than as one more of its
/// phases) because it needs a real HDF-EOS2 library call per candidate
/// grid name, which the rewriter's otherwise pure, catalog-only phases
/// deliberately avoid.
fn discover_grids(handle: &FileHandle, catalog: &mut Catalog) {
    for grid_name in grid_name_candidates(catalog) {
        let params = match handle.backend().eos_grid_projection(handle.path(), &grid_name) {
            Ok(p) => p,
            Err(_) => continue,
        };
        let descriptor = ProjectionDescriptor {
            proj_code: params.proj_code,
            zone: params.zone,
            sphere: params.sphere,
            upleft: params.upleft,
            lowright: params.lowright,
            params: params.params,
            xdim: params.xdim,
            ydim: params.ydim,
            pix_reg: params.pix_reg,
            origin: params.origin,
            ydimmajor: params.ydimmajor,
            special_format: 0,
        };
        let projection_index = catalog.projections.len();
        catalog.projections.push(descriptor);
        catalog.grid_names.push(grid_name.clone());

        let grid_path = format!("/{grid_name}");
        let grid_prefix = format!("{grid_path}/");
        let already_has_latlon = catalog
            .sds_fields
            .iter()
            .any(|f| f.path.starts_with(&grid_prefix) && matches!(f.field_kind, FieldKind::Latitude | FieldKind::Longitude));
        if already_has_latlon {
            continue;
        }

        let dims = grid_dims(&descriptor, &grid_name);
        let mut taken: HashSet<String> = catalog.sds_fields.iter().map(|f| f.new_name.clone()).collect();

        let lat_sanitized = crate::rewrite::sanitize::sanitize(&format!("{grid_name}_latitude"));
        let lat_name = crate::rewrite::sanitize::resolve_clash(&lat_sanitized, &taken);
        taken.insert(lat_name.clone());

        let lon_sanitized = crate::rewrite::sanitize::sanitize(&format!("{grid_name}_longitude"));
        let lon_name = crate::rewrite::sanitize::resolve_clash(&lon_sanitized, &taken);
        taken.insert(lon_name.clone());

        catalog.sds_fields.push(SdsField {
            name: lat_name.clone(),
            new_name: lat_name.clone(),
            element_type: ElementType::Float64,
            dims: dims.clone(),
            field_kind: FieldKind::Latitude,
            units: Some("degrees_north".to_string()),
            coordinates: Some(String::new()),
            source: FieldSource::Projected {
                projection_index,
                which: Axis::Lat,
            },
            path: grid_path.clone(),
        });
        catalog.sds_fields.push(SdsField {
            name: lon_name.clone(),
            new_name: lon_name.clone(),
            element_type: ElementType::Float64,
            dims: dims.clone(),
            field_kind: FieldKind::Longitude,
            units: Some("degrees_east".to_string()),
            coordinates: Some(String::new()),
            source: FieldSource::Projected {
                projection_index,
                which: Axis::Lon,
            },
            path: grid_path.clone(),
        });

        // By this point `rewrite::rewrite` has already run its own
        // coordinates-assembly phase, which only knows about dimension-name
        // CVs and so has nothing better than the synthetic index CVs to
        // offer a generic grid's data fields; `already_has_latlon` above
        // guarantees no real lat/lon exists yet for this grid, so it's
        // always correct to replace whatever that phase wrote.
        let grid_dim_sizes: Vec<u64> = dims.iter().map(|d| d.size).collect();
        let coordinates = format!("{lat_name} {lon_name}");
        for field in catalog.sds_fields.iter_mut() {
            if field.path.starts_with(&grid_prefix)
                && field.field_kind == FieldKind::General
                && field.dim_sizes() == grid_dim_sizes
            {
                field.coordinates = Some(coordinates.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VdataTable;

    fn field(path: &str, dims: Vec<Dimension>, kind: FieldKind, source: FieldSource) -> SdsField {
        SdsField {
            name: "f".to_string(),
            new_name: "f".to_string(),
            element_type: ElementType::Float32,
            dims,
            field_kind: kind,
            units: None,
            coordinates: None,
            source,
            path: path.to_string(),
        }
    }

    #[test]
    fn grid_name_candidates_finds_names_under_data_and_geolocation() {
        let mut catalog = Catalog::empty("f.hdf");
        catalog.sds_fields.push(field(
            "/GridA/Data Fields",
            vec![],
            FieldKind::General,
            FieldSource::SyntheticIndex(0),
        ));
        catalog.vdata_tables.push(VdataTable {
            vdata_ref: 1,
            name: "v".to_string(),
            new_name: "v".to_string(),
            path: "/GridB/Geolocation Fields".to_string(),
            as_attributes: true,
            record_count: 1,
            fields: vec![],
        });
        assert_eq!(vec!["GridA", "GridB"], grid_name_candidates(&catalog));
    }

    #[test]
    fn grid_dims_uses_three_axes_for_som() {
        let proj = ProjectionDescriptor {
            proj_code: geolocation::proj_code::SOM,
            zone: 0,
            sphere: 0,
            upleft: (0.0, 0.0),
            lowright: (0.0, 0.0),
            params: [0.0; 13],
            xdim: 10,
            ydim: 20,
            pix_reg: 0,
            origin: 0,
            ydimmajor: true,
            special_format: 0,
        };
        let dims = grid_dims(&proj, "Grid");
        assert_eq!(3, dims.len());
        assert_eq!(180, dims[0].size);
    }

    #[test]
    fn cancellation_token_reports_requested_state() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        assert!(check_cancelled(&token).is_err());
    }

    #[test]
    fn synthetic_index_bytes_are_packed_i32_native_endian() {
        let slab = Hyperslab::from_start_stride_count(vec![2], vec![3], vec![4]);
        let bytes = synthetic_index_bytes(&slab);
        let values: Vec<i32> = bytes
            .chunks_exact(4)
            .map(|c| i32::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(vec![2, 5, 8, 11], values);
    }

    #[test]
    fn analytic_bytes_match_formula() {
        let slab = Hyperslab::from_start_stride_count(vec![0], vec![1], vec![3]);
        let axis = AnalyticAxis {
            origin: -180.0,
            step: 0.25,
        };
        let bytes = analytic_bytes(axis, &slab);
        let values = unpack_f64(&bytes);
        assert_eq!(vec![-180.0, -179.75, -179.5], values);
    }

    #[test]
    fn pack_unpack_round_trips() {
        let values = vec![1.5, -2.25, 3.0];
        assert_eq!(values, unpack_f64(&pack_f64(&values)));
    }

    #[test]
    fn grid_name_candidates_ignores_grids_already_covered_by_a_product_strategy() {
        let mut catalog = Catalog::empty("f.hdf");
        catalog.sds_fields.push(field(
            "/Grid/Data Fields",
            vec![Dimension {
                name: "latitude".to_string(),
                size: 2,
                scale_type: 0,
            }],
            FieldKind::Latitude,
            FieldSource::Analytic(AnalyticAxis {
                origin: 0.0,
                step: 1.0,
            }),
        ));
        assert!(catalog
            .sds_fields
            .iter()
            .any(|f| f.field_kind == FieldKind::Latitude));
        assert_eq!(vec!["Grid"], grid_name_candidates(&catalog));
    }
}
