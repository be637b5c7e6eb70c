//! The HDF4/HDF-EOS2 library boundary.
//!
//! spec.md §6 treats the HDF4 library as an external collaborator: "The
//! implementation may bind either to the native library or re-implement the
//! subset used; this specification assumes the external library is
//! available." [`Hdf4Backend`] is the Rust expression of that contract, one
//! method per bullet point in §6's enumeration (SD, Vdata, Vgroup,
//! HDF-EOS2 grid, MISR). [`native`] binds it to the real shared libraries
//! via `dlopen` (grounded on
//! `examples/other_examples/…tensor4all-hdf5-ffi…sys-mod.rs.rs`, which binds
//! the sibling HDF5 C API the same way); tests and the rest of this crate
//! depend only on the trait.

#![forbid(unsafe_code)]

pub mod native;

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error as ThisError;

use crate::catalog::ElementType;

/// An HDF4 "reference number": a process-wide identifier for an SDS,
/// Vdata, or Vgroup within one open file.
pub type ObjRef = i32;

/// Errors the backend itself can raise. Distinct from `catalog::Error`
/// because a backend failure doesn't know which catalog-construction phase
/// was in progress; `catalog::inventory` attaches that context.
#[derive(Debug, ThisError)]
pub enum Hdf4Error {
    /// The shared library could not be loaded or a required symbol was
    /// missing.
    #[error("failed to load HDF4/HDF-EOS2 library: {0}")]
    LibraryLoad(String),

    /// The library returned its documented failure sentinel (typically -1)
    /// from the named call.
    #[error("HDF4 call {call} failed with status {status}")]
    CallFailed {
        /// Name of the failing library call, e.g. `"SDreaddata"`.
        call: &'static str,
        /// The library's raw (non-zero/negative) return status.
        status: i32,
    },

    /// The file does not begin with the HDF4 magic number.
    #[error("{0:?} is not an HDF4 file")]
    NotHdf4(PathBuf),
}

/// One HDF4 attribute as the library hands it back: name, element type,
/// element count, and the raw packed bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct RawAttr {
    /// Attribute name, as stored (not yet sanitized).
    pub name: String,
    /// Element type of the attribute's values.
    pub element_type: ElementType,
    /// Number of elements (1 for scalars; for `DFNT_CHAR` attributes, the
    /// string length).
    pub count: usize,
    /// Packed native-endian bytes, `count * element_type.byte_width()` long.
    pub raw: Vec<u8>,
}

/// Per-dimension identity as `SDgetdiminfo` reports it.
#[derive(Clone, Debug, PartialEq)]
pub struct DimInfo {
    /// The dimension's name (possibly a `fakeDim*` autogenerated one).
    pub name: String,
    /// Materialized size (the library never reports 0/unlimited for an SDS
    /// dimension that has already been written).
    pub size: u32,
    /// 0 if no dimension-scale variable is attached to this dimension.
    pub scale_type: i32,
}

/// One SDS (`SDgetinfo` + per-dimension `SDgetdiminfo` + `SDattrinfo`).
#[derive(Clone, Debug, PartialEq)]
pub struct SdsInfo {
    /// The SDS's reference number.
    pub sds_ref: ObjRef,
    /// Name as stored in the file.
    pub name: String,
    /// Element type of the array.
    pub element_type: ElementType,
    /// Per-dimension identity, length equal to rank.
    pub dims: Vec<DimInfo>,
    /// The SDS's own attributes.
    pub attrs: Vec<RawAttr>,
}

/// One Vdata field (`VSfieldtype`/`VSfieldorder`/`VSfieldisize`).
#[derive(Clone, Debug, PartialEq)]
pub struct VdataFieldInfo {
    /// Field name.
    pub name: String,
    /// Element type of one field value.
    pub element_type: ElementType,
    /// Field order (number of element_type values per record for this
    /// field).
    pub order: u16,
}

/// One Vdata (`VSgetclass`/`VSinquire`/`VSfexist` surface).
#[derive(Clone, Debug, PartialEq)]
pub struct VdataInfo {
    /// The Vdata's reference number.
    pub vdata_ref: ObjRef,
    /// Name as stored.
    pub name: String,
    /// Vdata class string (used to exclude internal tables, spec.md
    /// §4.1 rule 3).
    pub class: String,
    /// Whether the library's "is attribute" flag is set.
    pub is_attr: bool,
    /// Number of records.
    pub record_count: u32,
    /// Field layout.
    pub fields: Vec<VdataFieldInfo>,
}

/// A Vgroup child, as `Vgettagref`/`Vgettagrefs` classify it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VgroupChild {
    /// A nested Vgroup, by reference number.
    Vgroup(ObjRef),
    /// A Vdata, by reference number.
    Vdata(ObjRef),
    /// An SDS, by reference number (recorded, not opened; see spec.md
    /// §4.1 rule 3).
    Sds(ObjRef),
}

/// One Vgroup's identity (`Vgetname`/`Vgetclass`).
#[derive(Clone, Debug, PartialEq)]
pub struct VgroupInfo {
    /// The Vgroup's reference number.
    pub vgroup_ref: ObjRef,
    /// Name as stored.
    pub name: String,
    /// Class string, used to filter internal vgroups (spec.md §4.1 rule 1).
    pub class: String,
}

/// The thirteen GCTP projection parameters plus the surrounding grid
/// metadata HDF-EOS2's `GDprojinfo`/`GDgridinfo`/`GDpixreginfo`/
/// `GDorigininfo` report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionParams {
    /// GCTP projection code.
    pub proj_code: i32,
    /// UTM zone (only meaningful for `proj_code == 1`).
    pub zone: i32,
    /// GCTP sphere code.
    pub sphere: i32,
    /// Upper-left grid corner, (x, y) in projection coordinates (meters or
    /// packed DMS depending on projection).
    pub upleft: (f64, f64),
    /// Lower-right grid corner.
    pub lowright: (f64, f64),
    /// The 13 GCTP projection parameters.
    pub params: [f64; 13],
    /// Grid x dimension size.
    pub xdim: u32,
    /// Grid y dimension size.
    pub ydim: u32,
    /// Pixel registration code (0 = center, 1 = corner).
    pub pix_reg: i32,
    /// Origin code (0..3, the four corners as origin).
    pub origin: i32,
    /// `true` if row varies before column in the flattened 2-D layout.
    pub ydimmajor: bool,
}

impl fmt::Display for ProjectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "proj={} zone={} sphere={} reg={} origin={} {}x{}",
            self.proj_code, self.zone, self.sphere, self.pix_reg, self.origin, self.xdim, self.ydim
        )
    }
}

/// The full surface of library calls the catalog, rewriter, and
/// geolocation reconstructor need. See the module doc for how this
/// corresponds to spec.md §6.
pub trait Hdf4Backend: Send + Sync {
    /// Opens the file for both the SD and H/V interfaces, returning their
    /// interface identifiers. Fails with `NotHdf4` if the file doesn't
    /// carry the HDF4 magic number.
    fn open(&self, path: &Path) -> Result<(i32, i32), Hdf4Error>;

    /// Closes both interfaces. Called exactly once per successful `open`.
    fn close(&self, sd_id: i32, h_id: i32) -> Result<(), Hdf4Error>;

    /// The file-level attributes.
    fn file_attrs(&self, sd_id: i32) -> Result<Vec<RawAttr>, Hdf4Error>;

    /// Every SDS reference number, in library (0..n_sds) index order.
    fn sd_refs(&self, sd_id: i32) -> Result<Vec<ObjRef>, Hdf4Error>;

    /// Metadata (not bulk data) for one SDS.
    fn sd_info(&self, sd_id: i32, sds_ref: ObjRef) -> Result<SdsInfo, Hdf4Error>;

    /// Reads a hyperslab of bulk data, returning packed
    /// `element_type.byte_width()`-sized native-endian elements in
    /// row-major order.
    fn sd_read_hyperslab(
        &self,
        sd_id: i32,
        sds_ref: ObjRef,
        start: &[u64],
        stride: &[u64],
        count: &[u64],
    ) -> Result<Vec<u8>, Hdf4Error>;

    /// The SDS's fill value, if one is set, packed the same way as
    /// `sd_read_hyperslab`'s output elements.
    fn sd_fill_value(&self, sd_id: i32, sds_ref: ObjRef) -> Result<Option<Vec<u8>>, Hdf4Error>;

    /// Every Vdata reference number.
    fn vdata_refs(&self, h_id: i32) -> Result<Vec<ObjRef>, Hdf4Error>;

    /// Metadata for one Vdata.
    fn vdata_info(&self, h_id: i32, vdata_ref: ObjRef) -> Result<VdataInfo, Hdf4Error>;

    /// The Vdata's attributes (distinct from a Vdata *field's* attributes).
    fn vdata_attrs(&self, h_id: i32, vdata_ref: ObjRef) -> Result<Vec<RawAttr>, Hdf4Error>;

    /// Reads every record of one field, packed the same way as
    /// `sd_read_hyperslab`.
    fn vdata_read_field(
        &self,
        h_id: i32,
        vdata_ref: ObjRef,
        field_name: &str,
    ) -> Result<Vec<u8>, Hdf4Error>;

    /// Vgroups that are no other vgroup's child ("lone" vgroups, spec.md
    /// §4.1 rule 1).
    fn lone_vgroups(&self, h_id: i32) -> Result<Vec<ObjRef>, Hdf4Error>;

    /// One Vgroup's identity.
    fn vgroup_info(&self, h_id: i32, vgroup_ref: ObjRef) -> Result<VgroupInfo, Hdf4Error>;

    /// One Vgroup's direct children, classified by tag.
    fn vgroup_children(&self, h_id: i32, vgroup_ref: ObjRef) -> Result<Vec<VgroupChild>, Hdf4Error>;

    /// One Vgroup's attributes.
    fn vgroup_attrs(&self, h_id: i32, vgroup_ref: ObjRef) -> Result<Vec<RawAttr>, Hdf4Error>;

    /// Opens an HDF-EOS2 grid by name and returns its projection
    /// descriptor.
    fn eos_grid_projection(&self, path: &Path, grid_name: &str) -> Result<ProjectionParams, Hdf4Error>;

    /// Projects one (row, col) pair to (lat, lon) using the grid's GCTP
    /// parameters (`GDij2ll`).
    fn eos_project_rowcol(
        &self,
        proj: &ProjectionParams,
        row: f64,
        col: f64,
    ) -> Result<(f64, f64), Hdf4Error>;

    /// Builds the MISR SOM block-offset table (`misr_init`).
    fn misr_init(
        &self,
        nblock: u32,
        ulc: (f64, f64),
        lrc: (f64, f64),
    ) -> Result<Vec<f64>, Hdf4Error>;

    /// Inverts (block, line, sample) to SOM (x, y) using the offset table
    /// (`misrinv`).
    fn misr_inv(
        &self,
        offsets: &[f64],
        block: u32,
        line: f64,
        sample: f64,
    ) -> Result<(f64, f64), Hdf4Error>;

    /// Inverts SOM (x, y) to (lat, lon) (`sominv`).
    fn som_inv(&self, proj: &ProjectionParams, som_x: f64, som_y: f64) -> Result<(f64, f64), Hdf4Error>;
}
