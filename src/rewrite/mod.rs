//! The metadata rewriter: spec.md §4.3's six common phases plus the
//! per-product strategies of §4.3.1.
//!
//! Grounded on the teacher's `header::builder::Builder` in spirit — a
//! value built up through validated stages — but the stages here mutate
//! an existing [`Catalog`] in place rather than constructing a new
//! `Header`, since the rewriter's six phases are inherently sequential
//! and share mutable state (the growing name-clash tables).

#![forbid(unsafe_code)]

pub(crate) mod sanitize;
mod strategies;

use std::collections::{HashMap, HashSet};

use crate::catalog::{Catalog, Error, FieldKind, SpecialProductType};
use crate::config::Config;

/// Runs all six common phases plus the dispatched product strategy,
/// turning a freshly loaded [`Catalog`] into a CF-compliant view.
pub fn rewrite(catalog: &mut Catalog, product: SpecialProductType, config: &Config) -> Result<(), Error> {
    catalog.product_type = Some(product);
    coalesce_fake_dimensions(catalog, product)?;
    strategies::apply(catalog, product, config);
    synthesize_missing_coordinate_variables(catalog);
    sanitize_names(catalog);
    resolve_clashes(catalog);
    resolve_vdata_clashes(catalog, config);
    assemble_coordinates_attributes(catalog);
    Ok(())
}

/// Phase 1: dimensions whose original names match `fakeDim*` are renamed
/// to the single name already in use for another non-fake dimension of
/// the same size, if one exists. If none exists and the product type
/// isn't `OTHER`, fails with a structural error; for `OTHER`, the fake
/// name is kept.
fn coalesce_fake_dimensions(catalog: &mut Catalog, product: SpecialProductType) -> Result<(), Error> {
    let mut size_to_real_name: HashMap<u64, String> = HashMap::new();
    for field in &catalog.sds_fields {
        for dim in &field.dims {
            if !dim.is_fake() {
                size_to_real_name.entry(dim.size).or_insert_with(|| dim.name.clone());
            }
        }
    }

    for field in &mut catalog.sds_fields {
        for dim in &mut field.dims {
            if !dim.is_fake() {
                continue;
            }
            match size_to_real_name.get(&dim.size) {
                Some(real_name) => dim.name = real_name.clone(),
                None if product == SpecialProductType::Other => {}
                None => {
                    return Err(Error::UnresolvedFakeDimension {
                        name: dim.name.clone(),
                        size: dim.size,
                    })
                }
            }
        }
    }
    Ok(())
}

/// Phase 3: every dimension name with no coordinate variable gets a
/// synthesized `SdsField` of `field_kind = synthetic-index`.
fn synthesize_missing_coordinate_variables(catalog: &mut Catalog) {
    let cv_names: HashSet<String> = catalog
        .sds_fields
        .iter()
        .filter(|f| f.is_coordinate_variable())
        .map(|f| f.new_name.clone())
        .collect();

    let mut missing: Vec<(String, u64)> = Vec::new();
    let mut seen = HashSet::new();
    for field in &catalog.sds_fields {
        for dim in &field.dims {
            if cv_names.contains(&dim.name) || seen.contains(&dim.name) {
                continue;
            }
            seen.insert(dim.name.clone());
            missing.push((dim.name.clone(), dim.size));
        }
    }

    for (name, size) in missing {
        catalog.sds_fields.push(crate::catalog::SdsField {
            name: name.clone(),
            new_name: name.clone(),
            element_type: crate::catalog::ElementType::Int32,
            dims: vec![crate::catalog::Dimension {
                name: name.clone(),
                size,
                scale_type: 0,
            }],
            field_kind: FieldKind::SyntheticIndex,
            units: Some("level".to_string()),
            coordinates: None,
            source: crate::catalog::FieldSource::SyntheticIndex(size),
            path: String::new(),
        });
    }
}

/// Phase 4: maps every original name to a CF-legal form.
fn sanitize_names(catalog: &mut Catalog) {
    for field in &mut catalog.sds_fields {
        field.new_name = sanitize::sanitize(&field.new_name);
        for dim in &mut field.dims {
            dim.name = sanitize::sanitize(&dim.name);
        }
    }
    for table in &mut catalog.vdata_tables {
        table.new_name = sanitize::sanitize(&table.new_name);
        for field in &mut table.fields {
            field.new_name = sanitize::sanitize(&field.new_name);
        }
    }
    for attr in &mut catalog.file_attrs.attrs {
        attr.new_name = sanitize::sanitize(&attr.name);
    }
}

/// Phase 5: within each of three disjoint buckets — data variables,
/// lat/lon variables, other-coordinate variables — resolves collisions by
/// appending `_1`, `_2`, … in source order, unique across the union of
/// all three buckets. Always runs: `DisableVdataNameclashingCheck` scopes
/// to Vdata tables only (see [`resolve_vdata_clashes`]), not to the SDS
/// catalog.
fn resolve_clashes(catalog: &mut Catalog) {
    let mut taken: HashSet<String> = HashSet::new();

    let data_indices: Vec<usize> = bucket_indices(catalog, |k| k == FieldKind::General);
    let latlon_indices: Vec<usize> =
        bucket_indices(catalog, |k| matches!(k, FieldKind::Latitude | FieldKind::Longitude));
    let other_cv_indices: Vec<usize> = bucket_indices(catalog, |k| {
        matches!(
            k,
            FieldKind::Vertical | FieldKind::Time | FieldKind::SyntheticIndex | FieldKind::DimScale
        )
    });

    for indices in [data_indices, latlon_indices, other_cv_indices] {
        for i in indices {
            let resolved = sanitize::resolve_clash(&catalog.sds_fields[i].new_name, &taken);
            taken.insert(resolved.clone());
            catalog.sds_fields[i].new_name = resolved;
        }
    }
}

/// Resolves name collisions among Vdata tables, in source order, unless
/// disabled by `DisableVdataNameclashingCheck` (spec.md §6). Scoped to
/// `catalog.vdata_tables` only; the SDS catalog's own clash resolution in
/// [`resolve_clashes`] is unconditional.
fn resolve_vdata_clashes(catalog: &mut Catalog, config: &Config) {
    if config.disable_vdata_nameclashing_check {
        return;
    }
    let mut taken: HashSet<String> = HashSet::new();
    for table in &mut catalog.vdata_tables {
        let resolved = sanitize::resolve_clash(&table.new_name, &taken);
        taken.insert(resolved.clone());
        table.new_name = resolved;
    }
}

fn bucket_indices(catalog: &Catalog, matches_kind: impl Fn(FieldKind) -> bool) -> Vec<usize> {
    catalog
        .sds_fields
        .iter()
        .enumerate()
        .filter(|(_, f)| matches_kind(f.field_kind))
        .map(|(i, _)| i)
        .collect()
}

/// Phase 6: for every data variable, emits
/// `coordinates = <cv1> <cv2> … <cvk>` from the dimension-name-to-CV-name
/// map, with the "one shared, one not" and COARDS-1-D special cases.
fn assemble_coordinates_attributes(catalog: &mut Catalog) {
    let dim_to_cv: HashMap<String, String> = catalog
        .sds_fields
        .iter()
        .filter(|f| f.is_coordinate_variable())
        .map(|f| (f.dims[0].name.clone(), f.new_name.clone()))
        .collect();

    for i in 0..catalog.sds_fields.len() {
        if catalog.sds_fields[i].coordinates.is_some() {
            // A strategy already set an explicit (possibly empty) value.
            continue;
        }
        if catalog.sds_fields[i].is_coordinate_variable() {
            continue;
        }

        let dims = catalog.sds_fields[i].dims.clone();
        let latlon_dims_shared = dims
            .iter()
            .filter(|d| {
                catalog
                    .sds_fields
                    .iter()
                    .any(|f| f.dims.len() == 1 && &f.dims[0] == *d && matches!(f.field_kind, FieldKind::Latitude | FieldKind::Longitude))
            })
            .count();
        let is_2d_latlon_partial_match = dims.len() == 2 && latlon_dims_shared == 1;

        if is_2d_latlon_partial_match {
            catalog.sds_fields[i].coordinates = Some(String::new());
            continue;
        }

        let names: Vec<String> = dims
            .iter()
            .filter_map(|d| dim_to_cv.get(&d.name).cloned())
            .collect();
        catalog.sds_fields[i].coordinates = Some(names.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Dimension, ElementType, FieldSource, SdsField};

    fn dim(name: &str, size: u64) -> Dimension {
        Dimension {
            name: name.to_string(),
            size,
            scale_type: 0,
        }
    }

    fn general_field(name: &str, dims: Vec<Dimension>) -> SdsField {
        SdsField {
            name: name.to_string(),
            new_name: name.to_string(),
            element_type: ElementType::Float32,
            dims,
            field_kind: FieldKind::General,
            units: None,
            coordinates: None,
            source: FieldSource::SyntheticIndex(0),
            path: String::new(),
        }
    }

    #[test]
    fn coalesce_fake_dimensions_renames_to_real_counterpart() {
        let mut catalog = Catalog::empty("x");
        catalog.sds_fields.push(general_field("latitude", vec![dim("latitude", 10)]));
        catalog.sds_fields.push(general_field("temp", vec![dim("fakeDim0", 10)]));
        coalesce_fake_dimensions(&mut catalog, SpecialProductType::Other).unwrap();
        assert_eq!("latitude", catalog.sds_fields[1].dims[0].name);
    }

    #[test]
    fn coalesce_fake_dimensions_fails_when_no_substitute_and_not_other() {
        let mut catalog = Catalog::empty("x");
        catalog.sds_fields.push(general_field("temp", vec![dim("fakeDim0", 10)]));
        let result = coalesce_fake_dimensions(&mut catalog, SpecialProductType::TrmmL2V6);
        assert!(result.is_err());
    }

    #[test]
    fn synthesize_missing_cvs_fills_uncovered_dimension() {
        let mut catalog = Catalog::empty("x");
        catalog.sds_fields.push(general_field("temp", vec![dim("level", 5)]));
        synthesize_missing_coordinate_variables(&mut catalog);
        assert!(catalog
            .sds_fields
            .iter()
            .any(|f| f.name == "level" && f.field_kind == FieldKind::SyntheticIndex));
    }

    #[test]
    fn sanitize_names_fixes_illegal_chars() {
        let mut catalog = Catalog::empty("x");
        catalog.sds_fields.push(general_field("Sensor Name", vec![]));
        sanitize_names(&mut catalog);
        assert_eq!("Sensor_Name", catalog.sds_fields[0].new_name);
    }

    #[test]
    fn resolve_clashes_disambiguates_within_buckets() {
        let mut catalog = Catalog::empty("x");
        catalog.sds_fields.push(general_field("temp", vec![]));
        catalog.sds_fields.push(general_field("temp", vec![]));
        resolve_clashes(&mut catalog);
        assert_ne!(catalog.sds_fields[0].new_name, catalog.sds_fields[1].new_name);
    }

    fn vdata_table(name: &str) -> crate::catalog::VdataTable {
        crate::catalog::VdataTable {
            vdata_ref: 0,
            name: name.to_string(),
            new_name: name.to_string(),
            path: String::new(),
            as_attributes: true,
            record_count: 0,
            fields: vec![],
        }
    }

    #[test]
    fn resolve_vdata_clashes_disambiguates_vdata_tables() {
        let mut catalog = Catalog::empty("x");
        catalog.vdata_tables.push(vdata_table("Quality"));
        catalog.vdata_tables.push(vdata_table("Quality"));
        resolve_vdata_clashes(&mut catalog, &Config::default());
        assert_ne!(catalog.vdata_tables[0].new_name, catalog.vdata_tables[1].new_name);
    }

    #[test]
    fn disable_vdata_nameclashing_check_only_skips_vdata_tables() {
        let mut catalog = Catalog::empty("x");
        catalog.sds_fields.push(general_field("temp", vec![]));
        catalog.sds_fields.push(general_field("temp", vec![]));
        catalog.vdata_tables.push(vdata_table("Quality"));
        catalog.vdata_tables.push(vdata_table("Quality"));

        let config = Config {
            disable_vdata_nameclashing_check: true,
            ..Config::default()
        };
        resolve_clashes(&mut catalog);
        resolve_vdata_clashes(&mut catalog, &config);

        assert_ne!(catalog.sds_fields[0].new_name, catalog.sds_fields[1].new_name);
        assert_eq!(catalog.vdata_tables[0].new_name, catalog.vdata_tables[1].new_name);
    }

    #[test]
    fn coordinates_attribute_lists_associated_cvs() {
        let mut catalog = Catalog::empty("x");
        catalog.sds_fields.push(SdsField {
            field_kind: FieldKind::Latitude,
            ..general_field("latitude", vec![dim("latitude", 4)])
        });
        catalog.sds_fields.push(SdsField {
            field_kind: FieldKind::Longitude,
            ..general_field("longitude", vec![dim("longitude", 5)])
        });
        catalog
            .sds_fields
            .push(general_field("data", vec![dim("latitude", 4), dim("longitude", 5)]));
        assemble_coordinates_attributes(&mut catalog);
        let data = catalog.sds_fields.iter().find(|f| f.name == "data").unwrap();
        assert_eq!(Some("latitude longitude".to_string()), data.coordinates);
    }
}
