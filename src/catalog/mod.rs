//! The variable catalog: the in-memory shape every downstream phase
//! (classifier, rewriter, subset reader) operates on.
//!
//! Mirrors the owned-tree redesign from spec.md §9: "File owns SD and
//! Vdatas; SD owns SDFields; SDField owns Dimensions and Attributes."
//! [`FileHandle`] plays the role of the teacher's `header::Header` as the
//! thing every other type borrows from — see
//! `examples/gadomski-las-rs/src/header/mod.rs`.

#![forbid(unsafe_code)]

pub mod inventory;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error as ThisError;

use crate::hdf4::{Hdf4Backend, Hdf4Error, ObjRef};

/// Errors raised while building or interpreting a [`Catalog`].
#[derive(Debug, ThisError)]
pub enum Error {
    /// The path does not exist or could not be opened.
    #[error("failed to open {path:?}: {source}")]
    Open {
        /// The file that failed to open.
        path: PathBuf,
        /// The underlying backend error.
        #[source]
        source: Hdf4Error,
    },

    /// A library call failed during traversal or the object graph violated
    /// a structural assumption (e.g. a Vgroup child tag this crate does
    /// not recognize).
    #[error("HDF4 object inventory error: {0}")]
    Backend(#[from] Hdf4Error),

    /// A fake dimension could not be coalesced into a real one and the
    /// product type is not `OTHER` (spec.md §4.3 phase 1).
    #[error("dimension {name:?} of size {size} has no non-fake counterpart to coalesce into")]
    UnresolvedFakeDimension {
        /// The fake dimension's original name.
        name: String,
        /// Its materialized size.
        size: u64,
    },

    /// A classifier or rewriter invariant was violated (spec.md §7
    /// `FormatError`, the "structural error" fatal-for-the-request case).
    #[error("metadata rewriting error: {0}")]
    Structural(String),
}

/// Element type of a stored array, drawn from spec.md §3's closed set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Signed 8-bit integer.
    Int8,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit IEEE float.
    Float64,
}

impl ElementType {
    /// Size in bytes of one element.
    pub fn byte_width(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::UInt8 => 1,
            ElementType::Int16 | ElementType::UInt16 => 2,
            ElementType::Int32 | ElementType::UInt32 | ElementType::Float32 => 4,
            ElementType::Float64 => 8,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Int8 => "i8",
            ElementType::UInt8 => "u8",
            ElementType::Int16 => "i16",
            ElementType::UInt16 => "u16",
            ElementType::Int32 => "i32",
            ElementType::UInt32 => "u32",
            ElementType::Float32 => "f32",
            ElementType::Float64 => "f64",
        };
        f.write_str(name)
    }
}

/// One attribute's value, decoded from the raw bytes the backend returns.
/// `Str` covers `DFNT_CHAR` attributes, which the library reports as an
/// element count of characters rather than a typed array.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    /// A string attribute (`DFNT_CHAR`).
    Str(String),
    /// A numeric attribute, decoded per its element type, native-endian.
    Numeric {
        /// The attribute's element type.
        element_type: ElementType,
        /// Decoded values (always `f64`-widened for uniform matching; the
        /// original `element_type` is kept for round-tripping on write-back
        /// paths this crate does not use, but which keep the type honest
        /// for callers inspecting it).
        values: Vec<f64>,
    },
}

impl AttrValue {
    /// The attribute's value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            AttrValue::Numeric { .. } => None,
        }
    }

    /// The attribute's values as `f64`, if it is numeric.
    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            AttrValue::Numeric { values, .. } => Some(values),
            AttrValue::Str(_) => None,
        }
    }
}

/// One (name, new_name, value) triple. spec.md §3's `AttributeSet` entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    /// Name as stored in the file.
    pub name: String,
    /// Sanitized, clash-free name (populated by the rewriter's phase 4).
    pub new_name: String,
    /// The decoded value.
    pub value: AttrValue,
}

/// A named, ordered sequence of attributes, attachable to a file, an
/// `SdsField`, a `VdataField`, a `VdataTable`, or a synthesized dimension
/// info container (spec.md §3).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeSet {
    /// The set's name (e.g. a sanitized vgroup path, or `_dim_<i>`).
    pub name: String,
    /// The attributes, in discovery order.
    pub attrs: Vec<Attribute>,
}

impl AttributeSet {
    /// Builds an empty, named attribute set.
    pub fn named(name: impl Into<String>) -> AttributeSet {
        AttributeSet {
            name: name.into(),
            attrs: Vec::new(),
        }
    }

    /// The first attribute with the given original name, if any.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// The first attribute's value as a string, if present and textual.
    pub fn str_value(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|a| a.value.as_str())
    }
}

/// A named axis. spec.md §3's `Dimension`.
#[derive(Clone, Debug, PartialEq)]
pub struct Dimension {
    /// Current name (starts out possibly `fakeDim*`; coalesced and
    /// sanitized by the rewriter).
    pub name: String,
    /// Materialized size (never 0; "unlimited" is resolved before
    /// exposure).
    pub size: u64,
    /// Non-zero iff a dimension-scale variable is attached.
    pub scale_type: i32,
}

impl Dimension {
    /// `true` if this dimension's name matches the HDF4 library's
    /// autogenerated `fakeDim<N>` pattern.
    pub fn is_fake(&self) -> bool {
        self.name.starts_with("fakeDim")
            && self.name["fakeDim".len()..].chars().all(|c| c.is_ascii_digit())
            && self.name.len() > "fakeDim".len()
    }
}

/// What role a field plays in the CF-rewritten catalog, spec.md §3's
/// `field_kind`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// An ordinary data variable.
    General,
    /// A latitude coordinate array.
    Latitude,
    /// A longitude coordinate array.
    Longitude,
    /// A vertical-level coordinate array.
    Vertical,
    /// A synthesized 0..n-1 index CV with no backing storage.
    SyntheticIndex,
    /// A time coordinate array.
    Time,
    /// An HDF4 dimension-scale variable exposed as a CV.
    DimScale,
}

/// Where an `SdsField`'s bulk bytes come from: a real HDF4 SDS, or a
/// value computed on demand (synthesized CVs, TRMM analytic lat/lon).
#[derive(Clone, Debug, PartialEq)]
pub enum FieldSource {
    /// Backed by a real SDS, identified by reference number.
    Sds(ObjRef),
    /// Backed by a Vdata field promoted to a variable (record count
    /// becomes the leading, and only, dimension).
    VdataField {
        /// The owning Vdata's reference number.
        vdata_ref: ObjRef,
        /// The field name within that Vdata.
        field_name: String,
    },
    /// `0..n` generated on demand; no library call needed.
    SyntheticIndex(u64),
    /// Values computed by an analytic formula baked in by a product
    /// strategy (e.g. TRMM L3B's `−180 + (i+½)·360/1440`).
    Analytic(AnalyticAxis),
    /// Values computed via the geolocation reconstructor from a
    /// projection descriptor.
    Projected {
        /// Index into `Catalog::projections`.
        projection_index: usize,
        /// Which axis this field supplies.
        which: crate::geolocation::Axis,
    },
}

/// A closed-form per-index formula for a synthesized coordinate axis
/// (spec.md §4.3.1's TRMM_L3* lat/lon formulas).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalyticAxis {
    /// Value at index 0.
    pub origin: f64,
    /// Per-index step (may be negative, as for TRMM latitude).
    pub step: f64,
}

impl AnalyticAxis {
    /// The value at the given index: `origin + index * step`.
    pub fn value_at(&self, index: u64) -> f64 {
        self.origin + index as f64 * self.step
    }
}

/// A multi-dimensional array variable. spec.md §3's `SdsField`.
#[derive(Clone, Debug, PartialEq)]
pub struct SdsField {
    /// Name as stored (or as synthesized, for generated fields).
    pub name: String,
    /// Sanitized, path-qualified, clash-resolved name. Populated by the
    /// rewriter; equal to `name` until then.
    pub new_name: String,
    /// Element type of the array.
    pub element_type: ElementType,
    /// Ordered dimensions, length = rank.
    pub dims: Vec<Dimension>,
    /// This field's role.
    pub field_kind: FieldKind,
    /// Units string, if any.
    pub units: Option<String>,
    /// Space-separated new_names of this field's associated coordinate
    /// variables. Empty until the rewriter's phase 6 runs.
    pub coordinates: Option<String>,
    /// Where to get this field's bytes.
    pub source: FieldSource,
    /// The vgroup path this field was discovered under, if any (used by
    /// several product strategies to disambiguate by location).
    pub path: String,
}

impl SdsField {
    /// Rank (number of dimensions).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Per-dimension sizes, in order.
    pub fn dim_sizes(&self) -> Vec<u64> {
        self.dims.iter().map(|d| d.size).collect()
    }

    /// `true` if this field is a coordinate variable: its kind isn't
    /// `General`, it is rank 1, and its sole dimension's name equals its
    /// own `new_name` (spec.md §3, §GLOSSARY).
    pub fn is_coordinate_variable(&self) -> bool {
        self.field_kind != FieldKind::General
            && self.dims.len() == 1
            && self.dims[0].name == self.new_name
    }
}

/// One field of a `VdataTable`. spec.md §3's `VdataField`.
#[derive(Clone, Debug, PartialEq)]
pub struct VdataField {
    /// Field name as stored.
    pub name: String,
    /// Sanitized, qualified name once promoted to a variable.
    pub new_name: String,
    /// Element type of one value.
    pub element_type: ElementType,
    /// Field order (values per record).
    pub order: u16,
    /// Number of records (shared with the owning table).
    pub record_count: u32,
    /// Materialized values, if this table was classified as
    /// "treat as attributes" at load time; `None` for "treat as variable"
    /// tables, whose bytes are fetched on demand via `FieldSource`.
    pub materialized: Option<Vec<u8>>,
}

/// A Vdata promoted either to a set of attributes or to a set of
/// variables. spec.md §3's `VdataTable`.
#[derive(Clone, Debug, PartialEq)]
pub struct VdataTable {
    /// The Vdata's reference number.
    pub vdata_ref: ObjRef,
    /// Name as stored.
    pub name: String,
    /// Sanitized name.
    pub new_name: String,
    /// The vgroup path this table was discovered under.
    pub path: String,
    /// `true` if classified "treat as attributes" (record count at or
    /// below the configured threshold and `vdata_to_attr` enabled).
    pub as_attributes: bool,
    /// Number of records.
    pub record_count: u32,
    /// The table's fields.
    pub fields: Vec<VdataField>,
}

/// Exactly one per File; assigned by [`crate::classify::classify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpecialProductType {
    /// TRMM Level 2, format version 6.
    TrmmL2V6,
    /// TRMM Level 3B, format version 6.
    TrmmL3bV6,
    /// TRMM Level 3A, format version 6.
    TrmmL3aV6,
    /// TRMM Level 3C, format version 6.
    TrmmL3cV6,
    /// TRMM Level 2, format version 7.
    TrmmL2V7,
    /// TRMM Level 3 single-grid, format version 7.
    TrmmL3sV7,
    /// TRMM Level 3 multi-grid, format version 7.
    TrmmL3mV7,
    /// CERES averaged product.
    CerAvg,
    /// CERES ES-4 product.
    CerEs4,
    /// CERES ISCCP-D2-like day product.
    CerCday,
    /// CERES ISCCP-D2-like GEO product.
    CerCgeo,
    /// CERES SRBAVG3 product.
    CerSrb,
    /// CERES SYN product.
    CerSyn,
    /// CERES ZAVG product.
    CerZavg,
    /// Ocean Biology Processing Group Level 2 product.
    ObpgL2,
    /// Ocean Biology Processing Group Level 3 product.
    ObpgL3,
    /// MODIS ARNSS (aggregated, re-sampled swath-to-non-swath) product.
    ModisArnss,
    /// Anything not matching a known rule.
    Other,
}

/// For an HDF-EOS2 grid: the immutable projection identity used both to
/// compute and to cache-key its lat/lon arrays. spec.md §3's
/// `ProjectionDescriptor`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionDescriptor {
    /// GCTP projection code.
    pub proj_code: i32,
    /// UTM zone.
    pub zone: i32,
    /// GCTP sphere code.
    pub sphere: i32,
    /// Upper-left corner, projection coordinates.
    pub upleft: (f64, f64),
    /// Lower-right corner, projection coordinates.
    pub lowright: (f64, f64),
    /// The 13 GCTP parameters.
    pub params: [f64; 13],
    /// Grid x-dimension size.
    pub xdim: u32,
    /// Grid y-dimension size.
    pub ydim: u32,
    /// Pixel registration (0 = center, 1 = corner).
    pub pix_reg: i32,
    /// Origin code.
    pub origin: i32,
    /// `true` if row varies before column in a flattened 2-D layout.
    pub ydimmajor: bool,
    /// Special-format tag (0 = standard GCTP path; 1 = "large geo" linear
    /// formula; 2 = reserved; 3 = "MOD13C2-like missing projection"; 4 =
    /// reserved), spec.md §4.4.
    pub special_format: u8,
}

/// Process-local handle to one open HDF4 file. spec.md §3's `FileHandle`:
/// "Owns two interface identifiers... Lifetime = from open through the
/// last outstanding variable read; closed exactly once."
pub struct FileHandle {
    path: PathBuf,
    backend: std::sync::Arc<dyn Hdf4Backend>,
    /// `(sd_id, h_id)`, serialized: "HDF4 is serialized per file handle by
    /// a per-FileHandle mutex" (spec.md §5).
    ids: Mutex<(i32, i32)>,
    /// If set, the enclosing server owns the handle and `Drop` must not
    /// close it (`EnablePassFileID`, spec.md §5, §6).
    pass_file_id: bool,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("pass_file_id", &self.pass_file_id)
            .finish_non_exhaustive()
    }
}

impl FileHandle {
    /// Opens `path`, failing with `Error::Open` on any backend error
    /// (including "not an HDF4 file").
    pub fn open(
        backend: std::sync::Arc<dyn Hdf4Backend>,
        path: impl Into<PathBuf>,
        pass_file_id: bool,
    ) -> Result<FileHandle, Error> {
        let path = path.into();
        let (sd_id, h_id) = backend.open(&path).map_err(|source| Error::Open {
            path: path.clone(),
            source,
        })?;
        Ok(FileHandle {
            path,
            backend,
            ids: Mutex::new((sd_id, h_id)),
            pass_file_id,
        })
    }

    /// The path this handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` with exclusive access to the backend and this handle's
    /// interface identifiers, serializing concurrent callers per spec.md
    /// §5's "per-FileHandle mutex" rule.
    pub fn with_ids<T>(
        &self,
        f: impl FnOnce(&dyn Hdf4Backend, i32, i32) -> Result<T, Hdf4Error>,
    ) -> Result<T, Hdf4Error> {
        let guard = self.ids.lock().unwrap_or_else(|poison| poison.into_inner());
        let (sd_id, h_id) = *guard;
        f(self.backend.as_ref(), sd_id, h_id)
    }

    /// A reference to the backend, for calls that don't need the file's
    /// ids (e.g. HDF-EOS2 grid calls, which reopen by path).
    pub fn backend(&self) -> &dyn Hdf4Backend {
        self.backend.as_ref()
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.pass_file_id {
            return;
        }
        let (sd_id, h_id) = *self.ids.lock().unwrap_or_else(|poison| poison.into_inner());
        if let Err(err) = self.backend.close(sd_id, h_id) {
            warn!("failed to close {:?}: {err}", self.path);
        }
    }
}

/// The full object inventory for one file, after §4.1 traversal and
/// before (or after) the rewriter has run. Immutable once built and
/// freely shared across requests (spec.md §5).
#[derive(Clone, Debug, PartialEq)]
pub struct Catalog {
    /// The source file's path (used in cache fingerprints).
    pub file_path: PathBuf,
    /// File-level attributes.
    pub file_attrs: AttributeSet,
    /// Every SDS-backed or synthesized variable.
    pub sds_fields: Vec<SdsField>,
    /// Every Vdata table, whether exposed as attributes or as variables.
    pub vdata_tables: Vec<VdataTable>,
    /// Synthesized "dim info" attribute sets for dimensions with no
    /// dimension-scale variable, named `_dim_<i>`.
    pub dim_info: Vec<AttributeSet>,
    /// Attribute sets attached to vgroups, named by sanitized path.
    pub vgroup_attrs: Vec<AttributeSet>,
    /// Map from HDF4 reference number to an index into `sds_fields`.
    pub ref_to_index: std::collections::HashMap<ObjRef, usize>,
    /// This file's classified product type. `None` until the classifier
    /// has run.
    pub product_type: Option<SpecialProductType>,
    /// Projection descriptors referenced by `FieldSource::Projected`
    /// entries, in discovery order.
    pub projections: Vec<ProjectionDescriptor>,
    /// Names of HDF-EOS2 grids corresponding 1:1 with `projections`.
    pub grid_names: Vec<String>,
}

impl Catalog {
    /// An empty catalog for `file_path`, ready for `inventory::load_catalog`
    /// to populate.
    pub fn empty(file_path: impl Into<PathBuf>) -> Catalog {
        Catalog {
            file_path: file_path.into(),
            file_attrs: AttributeSet::default(),
            sds_fields: Vec::new(),
            vdata_tables: Vec::new(),
            dim_info: Vec::new(),
            vgroup_attrs: Vec::new(),
            ref_to_index: std::collections::HashMap::new(),
            product_type: None,
            projections: Vec::new(),
            grid_names: Vec::new(),
        }
    }

    /// Looks up a field by its current (possibly rewritten) name.
    pub fn field_by_new_name(&self, name: &str) -> Option<&SdsField> {
        self.sds_fields.iter().find(|f| f.new_name == name)
    }

    /// Every dimension name currently in use, deduplicated, across all
    /// `sds_fields` (spec.md §3's "global dimension name set").
    pub fn dimension_names(&self) -> std::collections::HashSet<&str> {
        self.sds_fields
            .iter()
            .flat_map(|f| f.dims.iter())
            .map(|d| d.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_is_fake_detects_pattern() {
        let fake = Dimension {
            name: "fakeDim12".to_string(),
            size: 10,
            scale_type: 0,
        };
        let real = Dimension {
            name: "latitude".to_string(),
            size: 10,
            scale_type: 0,
        };
        let not_numeric = Dimension {
            name: "fakeDimX".to_string(),
            size: 10,
            scale_type: 0,
        };
        assert!(fake.is_fake());
        assert!(!real.is_fake());
        assert!(!not_numeric.is_fake());
    }

    #[test]
    fn coordinate_variable_requires_matching_self_name() {
        let mut field = SdsField {
            name: "latitude".to_string(),
            new_name: "latitude".to_string(),
            element_type: ElementType::Float64,
            dims: vec![Dimension {
                name: "latitude".to_string(),
                size: 400,
                scale_type: 0,
            }],
            field_kind: FieldKind::Latitude,
            units: Some("degrees_north".to_string()),
            coordinates: None,
            source: FieldSource::Analytic(AnalyticAxis {
                origin: 89.775,
                step: -0.45,
            }),
            path: String::new(),
        };
        assert!(field.is_coordinate_variable());
        field.field_kind = FieldKind::General;
        assert!(!field.is_coordinate_variable());
    }

    #[test]
    fn analytic_axis_matches_trmm_l3b_formula() {
        let lon = AnalyticAxis {
            origin: -180.0 + 0.5 * 360.0 / 1440.0,
            step: 360.0 / 1440.0,
        };
        assert!((lon.value_at(0) - (-179.875)).abs() < 1e-9);
    }
}
