//! The product classifier: spec.md §4.2's top-to-bottom rule table.
//!
//! `classify` is a pure function of a [`Catalog`]'s file-level attributes
//! (plus, for the CERES rule, one Vdata's materialized field) — no I/O, no
//! mutation. Running it twice on the same catalog yields the same
//! [`SpecialProductType`] (spec.md §8 invariant 6).

#![forbid(unsafe_code)]

pub use crate::catalog::SpecialProductType;
use crate::catalog::{AttributeSet, Catalog, SdsField};

/// Assigns exactly one [`SpecialProductType`] to a catalog's source file,
/// per spec.md §4.2's decision table (first matching rule wins).
pub fn classify(catalog: &Catalog) -> SpecialProductType {
    let attrs = &catalog.file_attrs;

    let has_file_header = attrs.get("FileHeader").is_some();
    let has_file_info = attrs.get("FileInfo").is_some();
    let has_swath_header = attrs.get("SwathHeader").is_some();
    if has_file_header && has_file_info && has_swath_header {
        return SpecialProductType::TrmmL2V7;
    }

    let grid_header_count = count_matching_attrs(attrs, "GridHeader");
    if has_file_header && has_file_info && grid_header_count == 1 {
        return SpecialProductType::TrmmL3sV7;
    }
    if has_file_header && has_file_info && grid_header_count >= 2 {
        return SpecialProductType::TrmmL3mV7;
    }

    let has_modis_core_triplet = attrs.get("CoreMetadata.0").is_some()
        && attrs.get("ArchiveMetadata.0").is_some()
        && attrs.get("StructMetadata.0").is_some();
    let has_subsetting_method = attrs
        .attrs
        .iter()
        .any(|a| a.name.contains("SubsettingMethod"));
    if has_modis_core_triplet && has_subsetting_method {
        return SpecialProductType::ModisArnss;
    }

    if has_modis_core_triplet && !has_subsetting_method {
        if let Some(field) = find_geolocation_swath_field(catalog) {
            let _ = field;
            return SpecialProductType::TrmmL2V6;
        }
        if has_data_granule_field_matching(catalog, &[1440, 400], None) {
            return SpecialProductType::TrmmL3bV6;
        }
        if has_data_granule_field_matching(catalog, &[360, 180], Some(3)) {
            return SpecialProductType::TrmmL3aV6;
        }
        if has_data_granule_field_matching(catalog, &[720, 148], Some(3)) {
            return SpecialProductType::TrmmL3cV6;
        }
    }

    if let Some(local_granule_id) = find_ceres_local_granule_id(catalog) {
        if let Some(product) = classify_ceres_prefix(&local_granule_id) {
            return product;
        }
    }

    if let Some(product) = classify_obpg(attrs) {
        return product;
    }

    SpecialProductType::Other
}

fn count_matching_attrs(attrs: &AttributeSet, prefix: &str) -> usize {
    attrs.attrs.iter().filter(|a| a.name.starts_with(prefix)).count()
}

/// A 3-D SDS named `geolocation` under a path matching
/// `*DATA_GRANULE*SwathData*` (spec.md §4.2, TRMM L2 V6 rule).
fn find_geolocation_swath_field(catalog: &Catalog) -> Option<&SdsField> {
    catalog.sds_fields.iter().find(|f| {
        f.name == "geolocation"
            && f.rank() == 3
            && f.path.contains("DATA_GRANULE")
            && f.path.contains("SwathData")
    })
}

/// `true` if some variable under a `*DATA_GRANULE*` path has all of
/// `want` among its dimension sizes, per the TRMM L3{B,A,C} V6 rules.
/// L3B has no rank requirement; L3A and L3C both require a 3-D variable
/// (spec.md §4.2), so `want_rank` lets the caller enforce that per rule
/// rather than only ever looking at the first matching field.
fn has_data_granule_field_matching(catalog: &Catalog, want: &[u64], want_rank: Option<usize>) -> bool {
    catalog.sds_fields.iter().any(|f| {
        f.path.contains("DATA_GRANULE")
            && want_rank.is_none_or(|rank| f.rank() == rank)
            && want.iter().all(|size| f.dim_sizes().contains(size))
    })
}

fn find_ceres_local_granule_id(catalog: &Catalog) -> Option<String> {
    let table = catalog
        .vdata_tables
        .iter()
        .find(|t| t.name == "CERES_metadata")?;
    let field = table.fields.iter().find(|f| f.name == "LOCALGRANULEID")?;
    let bytes = field.materialized.as_ref()?;
    Some(String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string())
}

fn classify_ceres_prefix(local_granule_id: &str) -> Option<SpecialProductType> {
    const RULES: &[(&str, SpecialProductType)] = &[
        ("CER_AVG", SpecialProductType::CerAvg),
        ("CER_ES4", SpecialProductType::CerEs4),
        ("CER_ISCCP-D2like-Day", SpecialProductType::CerCday),
        ("CER_ISCCP-D2like-GEO", SpecialProductType::CerCgeo),
        ("CER_SRBAVG3", SpecialProductType::CerSrb),
        ("CER_SYN", SpecialProductType::CerSyn),
        ("CER_ZAVG", SpecialProductType::CerZavg),
    ];
    RULES
        .iter()
        .find(|(prefix, _)| local_granule_id.starts_with(prefix))
        .map(|(_, product)| *product)
}

const OBPG_SENSORS: &[&str] = &["MODISA", "MODIST", "OCTS", "SeaWiFS", "CZCS"];

fn classify_obpg(attrs: &AttributeSet) -> Option<SpecialProductType> {
    let sensor = attrs.str_value("Sensor Name")?;
    let product = attrs.str_value("Product Name")?;
    if !OBPG_SENSORS.iter().any(|&s| sensor.contains(s)) {
        return None;
    }
    if product.contains(".L2") {
        Some(SpecialProductType::ObpgL2)
    } else if product.contains(".L3m") {
        Some(SpecialProductType::ObpgL3)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        AnalyticAxis, AttrValue, Attribute, Dimension, ElementType, FieldKind, FieldSource,
        VdataField, VdataTable,
    };

    fn attr(name: &str, value: AttrValue) -> Attribute {
        Attribute {
            name: name.to_string(),
            new_name: name.to_string(),
            value,
        }
    }

    fn str_attr(name: &str, value: &str) -> Attribute {
        attr(name, AttrValue::Str(value.to_string()))
    }

    #[test]
    fn trmm_l2_v7_requires_all_three_headers() {
        let mut catalog = Catalog::empty("x.hdf");
        catalog.file_attrs.attrs = vec![
            str_attr("FileHeader", ""),
            str_attr("FileInfo", ""),
            str_attr("SwathHeader", ""),
        ];
        assert_eq!(SpecialProductType::TrmmL2V7, classify(&catalog));
    }

    #[test]
    fn trmm_l3_single_grid_vs_multi_grid() {
        let mut single = Catalog::empty("x.hdf");
        single.file_attrs.attrs = vec![
            str_attr("FileHeader", ""),
            str_attr("FileInfo", ""),
            str_attr("GridHeader", ""),
        ];
        assert_eq!(SpecialProductType::TrmmL3sV7, classify(&single));

        let mut multi = Catalog::empty("x.hdf");
        multi.file_attrs.attrs = vec![
            str_attr("FileHeader", ""),
            str_attr("FileInfo", ""),
            str_attr("GridHeader1", ""),
            str_attr("GridHeader2", ""),
        ];
        assert_eq!(SpecialProductType::TrmmL3mV7, classify(&multi));
    }

    #[test]
    fn modis_arnss_requires_subsetting_method() {
        let mut catalog = Catalog::empty("x.hdf");
        catalog.file_attrs.attrs = vec![
            str_attr("CoreMetadata.0", ""),
            str_attr("ArchiveMetadata.0", ""),
            str_attr("StructMetadata.0", ""),
            str_attr("ShortNameSubsettingMethod", ""),
        ];
        assert_eq!(SpecialProductType::ModisArnss, classify(&catalog));
    }

    #[test]
    fn trmm_l3b_v6_matches_1440_by_400() {
        let mut catalog = Catalog::empty("x.hdf");
        catalog.file_attrs.attrs = vec![
            str_attr("CoreMetadata.0", ""),
            str_attr("ArchiveMetadata.0", ""),
            str_attr("StructMetadata.0", ""),
        ];
        catalog.sds_fields.push(SdsField {
            name: "precipitation".to_string(),
            new_name: "precipitation".to_string(),
            element_type: ElementType::Float32,
            dims: vec![
                Dimension {
                    name: "fakeDim0".to_string(),
                    size: 1440,
                    scale_type: 0,
                },
                Dimension {
                    name: "fakeDim1".to_string(),
                    size: 400,
                    scale_type: 0,
                },
            ],
            field_kind: FieldKind::General,
            units: None,
            coordinates: None,
            source: FieldSource::SyntheticIndex(0),
            path: "/DATA_GRANULE".to_string(),
        });
        assert_eq!(SpecialProductType::TrmmL3bV6, classify(&catalog));
    }

    fn data_granule_field(name: &str, path: &str, dims: Vec<Dimension>) -> SdsField {
        SdsField {
            name: name.to_string(),
            new_name: name.to_string(),
            element_type: ElementType::Float32,
            dims,
            field_kind: FieldKind::General,
            units: None,
            coordinates: None,
            source: FieldSource::SyntheticIndex(0),
            path: path.to_string(),
        }
    }

    fn dim(name: &str, size: u64) -> Dimension {
        Dimension {
            name: name.to_string(),
            size,
            scale_type: 0,
        }
    }

    #[test]
    fn trmm_l3a_v6_requires_a_3d_match_not_just_a_2d_one() {
        let mut catalog = Catalog::empty("x.hdf");
        catalog.file_attrs.attrs = vec![
            str_attr("CoreMetadata.0", ""),
            str_attr("ArchiveMetadata.0", ""),
            str_attr("StructMetadata.0", ""),
        ];
        catalog.sds_fields.push(data_granule_field(
            "rainAccum",
            "/DATA_GRANULE",
            vec![dim("fakeDim0", 360), dim("fakeDim1", 180)],
        ));
        assert_eq!(SpecialProductType::Other, classify(&catalog));
    }

    #[test]
    fn trmm_l3a_v6_matches_even_when_the_3d_field_is_not_first() {
        let mut catalog = Catalog::empty("x.hdf");
        catalog.file_attrs.attrs = vec![
            str_attr("CoreMetadata.0", ""),
            str_attr("ArchiveMetadata.0", ""),
            str_attr("StructMetadata.0", ""),
        ];
        catalog.sds_fields.push(data_granule_field(
            "unrelated",
            "/DATA_GRANULE",
            vec![dim("fakeDim0", 5)],
        ));
        catalog.sds_fields.push(data_granule_field(
            "rainAccum",
            "/DATA_GRANULE",
            vec![dim("fakeDim1", 360), dim("fakeDim2", 180), dim("fakeDim3", 1)],
        ));
        assert_eq!(SpecialProductType::TrmmL3aV6, classify(&catalog));
    }

    #[test]
    fn ceres_prefix_match() {
        let mut catalog = Catalog::empty("x.hdf");
        catalog.vdata_tables.push(VdataTable {
            vdata_ref: 1,
            name: "CERES_metadata".to_string(),
            new_name: "CERES_metadata".to_string(),
            path: String::new(),
            as_attributes: true,
            record_count: 1,
            fields: vec![VdataField {
                name: "LOCALGRANULEID".to_string(),
                new_name: "LOCALGRANULEID".to_string(),
                element_type: ElementType::UInt8,
                order: 1,
                record_count: 1,
                materialized: Some(b"CER_SYN_Terra-FM1-MODIS_Edition1\0".to_vec()),
            }],
        });
        assert_eq!(SpecialProductType::CerSyn, classify(&catalog));
    }

    #[test]
    fn obpg_l2_vs_l3() {
        let mut l2 = Catalog::empty("x.hdf");
        l2.file_attrs.attrs = vec![
            str_attr("Sensor Name", "SeaWiFS"),
            str_attr("Product Name", "S2000001.L2"),
        ];
        assert_eq!(SpecialProductType::ObpgL2, classify(&l2));

        let mut l3 = Catalog::empty("x.hdf");
        l3.file_attrs.attrs = vec![
            str_attr("Sensor Name", "MODISA"),
            str_attr("Product Name", "A2000001.L3m_DAY"),
        ];
        assert_eq!(SpecialProductType::ObpgL3, classify(&l3));
    }

    #[test]
    fn falls_through_to_other() {
        let catalog = Catalog::empty("x.hdf");
        assert_eq!(SpecialProductType::Other, classify(&catalog));
    }

    #[test]
    fn idempotent_classification() {
        let mut catalog = Catalog::empty("x.hdf");
        catalog.file_attrs.attrs = vec![
            str_attr("Sensor Name", "OCTS"),
            str_attr("Product Name", "O2000001.L2"),
        ];
        assert_eq!(classify(&catalog), classify(&catalog));
        let _ = AnalyticAxis {
            origin: 0.0,
            step: 0.0,
        };
    }
}
