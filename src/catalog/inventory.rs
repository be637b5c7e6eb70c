//! The object inventory: spec.md §4.1's vgroup/SDS/Vdata traversal.

use std::collections::{HashMap, HashSet};

use super::{
    AttrValue, Attribute, AttributeSet, Catalog, Dimension, ElementType, Error, FieldKind,
    FieldSource, FileHandle, SdsField, VdataField, VdataTable,
};
use crate::config::Config;
use crate::hdf4::{DimInfo, ObjRef, RawAttr, VgroupChild};

/// Vgroup classes that are internal bookkeeping, never exposed (spec.md
/// §4.1 rule 1).
const INTERNAL_VGROUP_CLASSES: &[&str] =
    &["Attr0.0", "Var0.0", "Dim0.0", "UDim0.0", "CDF0.0", "RI", "RIG0.0"];

/// Vdata classes used internally by the library, excluded from exposure
/// (spec.md §4.1 rule 3).
const INTERNAL_VDATA_CLASSES: &[&str] = &[
    "_HDF_CHK_TBL_",
    "_HDF_SDSVAR",
    "_HDF_CRDVAR",
    "DimVal0.0",
    "DimVal0.1",
    "RIATTR0.0N",
];

/// Whether HDF-EOS2 markers were seen during traversal, used by
/// `load_catalog_hybrid` to decide which SDS/Vdata become variables.
#[derive(Default)]
struct HybridMarkers {
    saw_geolocation_fields: bool,
    saw_data_fields: bool,
    sds_under_data_or_geo: HashSet<ObjRef>,
    vdata_under_geo: HashSet<ObjRef>,
    vdata_under_data: HashSet<ObjRef>,
}

/// Reads metadata only (no bulk data) into a single [`Catalog`].
pub fn load_catalog(handle: &FileHandle, config: &Config) -> Result<Catalog, Error> {
    load_catalog_impl(handle, config, false)
}

/// Like [`load_catalog`], but restricts SDS/Vdata variables to those
/// reachable via an HDF-EOS2 `"Data Fields"`/`"Geolocation Fields"` path
/// (spec.md §4.1).
pub fn load_catalog_hybrid(handle: &FileHandle, config: &Config) -> Result<Catalog, Error> {
    load_catalog_impl(handle, config, true)
}

fn load_catalog_impl(handle: &FileHandle, config: &Config, hybrid: bool) -> Result<Catalog, Error> {
    let mut catalog = Catalog::empty(handle.path());
    let mut markers = HybridMarkers::default();
    let mut sds_paths: HashMap<ObjRef, String> = HashMap::new();

    let lone_refs = handle.with_ids(|backend, _sd_id, h_id| backend.lone_vgroups(h_id))?;
    for vgroup_ref in lone_refs {
        let info = handle.with_ids(|backend, _sd_id, h_id| backend.vgroup_info(h_id, vgroup_ref))?;
        if INTERNAL_VGROUP_CLASSES.contains(&info.class.as_str()) {
            continue;
        }
        walk_vgroup(
            handle,
            config,
            &mut catalog,
            &mut markers,
            &mut sds_paths,
            vgroup_ref,
            &format!("/{}", info.name),
        )?;
    }

    load_sds(handle, &mut catalog, &sds_paths, hybrid, &markers)?;

    if hybrid {
        catalog.vdata_tables.retain(|t| {
            if markers.saw_geolocation_fields && markers.vdata_under_geo.contains(&t.vdata_ref) {
                return false;
            }
            if markers.saw_geolocation_fields
                && markers.saw_data_fields
                && markers.vdata_under_data.contains(&t.vdata_ref)
            {
                return false;
            }
            true
        });
    }

    let file_attrs = handle.with_ids(|backend, sd_id, _h_id| backend.file_attrs(sd_id))?;
    catalog.file_attrs = attribute_set("file", file_attrs);

    Ok(catalog)
}

#[allow(clippy::too_many_arguments)]
fn walk_vgroup(
    handle: &FileHandle,
    config: &Config,
    catalog: &mut Catalog,
    markers: &mut HybridMarkers,
    sds_paths: &mut HashMap<ObjRef, String>,
    vgroup_ref: ObjRef,
    path: &str,
) -> Result<(), Error> {
    if path.ends_with("Geolocation Fields") {
        markers.saw_geolocation_fields = true;
    }
    if path.ends_with("Data Fields") {
        markers.saw_data_fields = true;
    }

    let vgroup_attrs = handle.with_ids(|backend, _sd_id, h_id| backend.vgroup_attrs(h_id, vgroup_ref))?;
    catalog.vgroup_attrs.push(attribute_set(path, vgroup_attrs));

    let children = handle.with_ids(|backend, _sd_id, h_id| backend.vgroup_children(h_id, vgroup_ref))?;
    for child in children {
        match child {
            VgroupChild::Vgroup(child_ref) => {
                let info = handle.with_ids(|backend, _sd_id, h_id| backend.vgroup_info(h_id, child_ref))?;
                if INTERNAL_VGROUP_CLASSES.contains(&info.class.as_str()) {
                    continue;
                }
                let child_path = format!("{path}/{}", info.name);
                walk_vgroup(handle, config, catalog, markers, sds_paths, child_ref, &child_path)?;
            }
            VgroupChild::Vdata(vdata_ref) => {
                load_vdata(handle, config, catalog, vdata_ref, path)?;
                if path.ends_with("Geolocation Fields") {
                    markers.vdata_under_geo.insert(vdata_ref);
                }
                if path.ends_with("Data Fields") {
                    markers.vdata_under_data.insert(vdata_ref);
                }
            }
            VgroupChild::Sds(sds_ref) => {
                sds_paths.insert(sds_ref, path.to_string());
                if path.ends_with("Geolocation Fields") || path.ends_with("Data Fields") {
                    markers.sds_under_data_or_geo.insert(sds_ref);
                }
            }
        }
    }
    Ok(())
}

fn load_vdata(
    handle: &FileHandle,
    config: &Config,
    catalog: &mut Catalog,
    vdata_ref: ObjRef,
    path: &str,
) -> Result<(), Error> {
    let info = handle.with_ids(|backend, _sd_id, h_id| backend.vdata_info(h_id, vdata_ref))?;
    if info.is_attr
        || INTERNAL_VDATA_CLASSES.contains(&info.class.as_str())
        || info.name == "RIATTR0.0C"
    {
        return Ok(());
    }

    let as_attributes = info.record_count <= config.vdata_to_attr_threshold && config.vdata_to_attr;
    let mut fields = Vec::with_capacity(info.fields.len());
    for field_info in &info.fields {
        let materialized = if as_attributes {
            let bytes =
                handle.with_ids(|backend, _sd_id, h_id| backend.vdata_read_field(h_id, vdata_ref, &field_info.name))?;
            Some(bytes)
        } else {
            None
        };
        fields.push(VdataField {
            name: field_info.name.clone(),
            new_name: field_info.name.clone(),
            element_type: field_info.element_type,
            order: field_info.order,
            record_count: info.record_count,
            materialized,
        });
    }

    if !as_attributes {
        for field in &fields {
            let record_dim = format!("{}_records", info.name);
            catalog.sds_fields.push(SdsField {
                name: field.name.clone(),
                new_name: field.name.clone(),
                element_type: field.element_type,
                dims: vec![Dimension {
                    name: record_dim,
                    size: info.record_count as u64,
                    scale_type: 0,
                }],
                field_kind: FieldKind::General,
                units: None,
                coordinates: None,
                source: FieldSource::VdataField {
                    vdata_ref,
                    field_name: field.name.clone(),
                },
                path: path.to_string(),
            });
        }
    }

    catalog.vdata_tables.push(VdataTable {
        vdata_ref,
        name: info.name.clone(),
        new_name: info.name,
        path: path.to_string(),
        as_attributes,
        record_count: info.record_count,
        fields,
    });
    Ok(())
}

fn load_sds(
    handle: &FileHandle,
    catalog: &mut Catalog,
    sds_paths: &HashMap<ObjRef, String>,
    hybrid: bool,
    markers: &HybridMarkers,
) -> Result<(), Error> {
    let refs = handle.with_ids(|backend, sd_id, _h_id| backend.sd_refs(sd_id))?;
    for sds_ref in refs {
        if hybrid && !markers.sds_under_data_or_geo.contains(&sds_ref) {
            continue;
        }
        let info = handle.with_ids(|backend, sd_id, _h_id| backend.sd_info(sd_id, sds_ref))?;
        let path = sds_paths.get(&sds_ref).cloned().unwrap_or_default();

        let mut dims = Vec::with_capacity(info.dims.len());
        for (i, raw_dim) in info.dims.iter().enumerate() {
            dims.push(Dimension {
                name: raw_dim.name.clone(),
                size: raw_dim.size as u64,
                scale_type: raw_dim.scale_type,
            });
            if raw_dim.scale_type == 0 {
                catalog
                    .dim_info
                    .push(synthesize_dim_info(i, raw_dim, &info.attrs));
            }
        }

        let index = catalog.sds_fields.len();
        catalog.sds_fields.push(SdsField {
            name: info.name.clone(),
            new_name: info.name,
            element_type: info.element_type,
            dims,
            field_kind: FieldKind::General,
            units: attrs_str_value(&info.attrs, "units").map(str::to_string),
            coordinates: None,
            source: FieldSource::Sds(sds_ref),
            path,
        });
        catalog.ref_to_index.insert(sds_ref, index);
    }
    Ok(())
}

/// Synthesizes a `_dim_<i>` AttributeSet for a dimension with no
/// dimension-scale variable, spec.md §4.1 rule 4: "at minimum contains an
/// attribute `name` whose value is the original dimension name (or such
/// an attribute already present among the dimension's own attributes)."
fn synthesize_dim_info(index: usize, dim: &DimInfo, sds_attrs: &[RawAttr]) -> AttributeSet {
    let mut set = AttributeSet::named(format!("_dim_{index}"));
    let has_name_attr = sds_attrs.iter().any(|a| a.name == "name");
    if !has_name_attr {
        set.attrs.push(Attribute {
            name: "name".to_string(),
            new_name: "name".to_string(),
            value: AttrValue::Str(dim.name.clone()),
        });
    }
    set
}

fn attrs_str_value<'a>(attrs: &'a [RawAttr], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|a| a.name == name && a.element_type == ElementType::UInt8)
        .and_then(|a| std::str::from_utf8(&a.raw).ok())
}

fn attribute_set(name: &str, raw: Vec<RawAttr>) -> AttributeSet {
    let attrs = raw
        .into_iter()
        .map(|raw_attr| Attribute {
            name: raw_attr.name.clone(),
            new_name: raw_attr.name,
            value: decode_attr_value(&raw_attr.element_type, &raw_attr.raw),
        })
        .collect();
    AttributeSet {
        name: name.to_string(),
        attrs,
    }
}

fn decode_attr_value(element_type: &ElementType, raw: &[u8]) -> AttrValue {
    if *element_type == ElementType::UInt8 {
        if let Ok(s) = std::str::from_utf8(raw) {
            return AttrValue::Str(s.trim_end_matches('\0').to_string());
        }
    }
    let width = element_type.byte_width();
    let values = raw
        .chunks_exact(width)
        .map(|chunk| decode_one(*element_type, chunk))
        .collect();
    AttrValue::Numeric {
        element_type: *element_type,
        values,
    }
}

fn decode_one(element_type: ElementType, bytes: &[u8]) -> f64 {
    match element_type {
        ElementType::Int8 => bytes[0] as i8 as f64,
        ElementType::UInt8 => bytes[0] as f64,
        ElementType::Int16 => i16::from_ne_bytes(bytes.try_into().unwrap()) as f64,
        ElementType::UInt16 => u16::from_ne_bytes(bytes.try_into().unwrap()) as f64,
        ElementType::Int32 => i32::from_ne_bytes(bytes.try_into().unwrap()) as f64,
        ElementType::UInt32 => u32::from_ne_bytes(bytes.try_into().unwrap()) as f64,
        ElementType::Float32 => f32::from_ne_bytes(bytes.try_into().unwrap()) as f64,
        ElementType::Float64 => f64::from_ne_bytes(bytes.try_into().unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_attr_value_recognizes_strings() {
        let value = decode_attr_value(&ElementType::UInt8, b"SeaWiFS\0");
        assert_eq!(Some("SeaWiFS"), value.as_str());
    }

    #[test]
    fn decode_attr_value_decodes_numeric() {
        let raw = 1440i32.to_ne_bytes();
        let value = decode_attr_value(&ElementType::Int32, &raw);
        assert_eq!(Some(&[1440.0][..]), value.as_numeric());
    }

    #[test]
    fn synthesize_dim_info_uses_raw_dim_name_when_absent() {
        let dim = DimInfo {
            name: "fakeDim0".to_string(),
            size: 10,
            scale_type: 0,
        };
        let set = synthesize_dim_info(0, &dim, &[]);
        assert_eq!("_dim_0", set.name);
        assert_eq!(Some("fakeDim0"), set.str_value("name"));
    }
}
