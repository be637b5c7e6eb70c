//! Per-product rewrite strategies, spec.md §4.3.1.
//!
//! Each function mutates a [`Catalog`] that has already been through
//! fake-dim coalescing (spec.md §4.3 phase 1) but not yet sanitized. They
//! run before missing-CV synthesis, so most of them only need to retarget
//! or delete fields and let phase 3 fill in any dimension left without a
//! CV.

use crate::catalog::{
    AnalyticAxis, Catalog, Dimension, ElementType, FieldKind, FieldSource, SdsField,
    SpecialProductType,
};
use crate::config::Config;

/// Dispatches to the strategy for `product`, per spec.md §4.3.1's summary
/// table.
pub fn apply(catalog: &mut Catalog, product: SpecialProductType, config: &Config) {
    match product {
        SpecialProductType::TrmmL2V6 => trmm_l2_v6(catalog),
        SpecialProductType::TrmmL3bV6 => trmm_l3_v6(catalog, &[(1440, 400)], "latitude", "longitude", None),
        SpecialProductType::TrmmL3aV6 => trmm_l3_v6(catalog, &[(360, 180)], "latitude", "longitude", None),
        SpecialProductType::TrmmL3cV6 => {
            trmm_l3_v6(catalog, &[(720, 148)], "latitude", "longitude", Some(19))
        }
        SpecialProductType::TrmmL2V7 => trmm_l2_v7(catalog),
        SpecialProductType::TrmmL3sV7 => trmm_l3s_v7(catalog),
        SpecialProductType::TrmmL3mV7 => trmm_l3m_v7(catalog),
        SpecialProductType::CerAvg | SpecialProductType::CerSyn => ceres_avg_syn(catalog),
        SpecialProductType::CerEs4 | SpecialProductType::CerCgeo => ceres_es4_cgeo(catalog),
        SpecialProductType::CerCday | SpecialProductType::CerSrb => {
            ceres_cday_srb(catalog, product == SpecialProductType::CerSrb)
        }
        SpecialProductType::CerZavg => ceres_zavg(catalog),
        SpecialProductType::ObpgL2 => obpg_l2(catalog),
        SpecialProductType::ObpgL3 => obpg_l3(catalog),
        SpecialProductType::ModisArnss => modis_arnss(catalog),
        SpecialProductType::Other => other(catalog, config),
    }
}

fn new_dim(name: &str, size: u64) -> Dimension {
    Dimension {
        name: name.to_string(),
        size,
        scale_type: 0,
    }
}

fn synth_cv(name: &str, size: u64, kind: FieldKind, units: &str, axis: AnalyticAxis, path: &str) -> SdsField {
    SdsField {
        name: name.to_string(),
        new_name: name.to_string(),
        element_type: ElementType::Float64,
        dims: vec![new_dim(name, size)],
        field_kind: kind,
        units: Some(units.to_string()),
        coordinates: None,
        source: FieldSource::Analytic(axis),
        path: path.to_string(),
    }
}

/// **TRMM_L2_V6.** Splits the 3-D `geolocation` field into two 2-D fields
/// `latitude`, `longitude` with the parent's first two dimensions;
/// deletes the original.
fn trmm_l2_v6(catalog: &mut Catalog) {
    let Some(index) = catalog
        .sds_fields
        .iter()
        .position(|f| f.name == "geolocation" && f.rank() == 3)
    else {
        return;
    };
    let geolocation = catalog.sds_fields.remove(index);
    let dims = geolocation.dims[..2].to_vec();
    let path = geolocation.path.clone();

    catalog.sds_fields.push(SdsField {
        name: "latitude".to_string(),
        new_name: "latitude".to_string(),
        element_type: geolocation.element_type,
        dims: dims.clone(),
        field_kind: FieldKind::Latitude,
        units: Some("degrees_north".to_string()),
        coordinates: None,
        source: geolocation.source.clone(),
        path: path.clone(),
    });
    catalog.sds_fields.push(SdsField {
        name: "longitude".to_string(),
        new_name: "longitude".to_string(),
        element_type: geolocation.element_type,
        dims,
        field_kind: FieldKind::Longitude,
        units: Some("degrees_east".to_string()),
        coordinates: None,
        source: geolocation.source,
        path,
    });
}

/// **TRMM_L3B/A/C_V6.** The first field whose dims include the given
/// `(lon_size, lat_size)` pair induces analytic `longitude`/`latitude`
/// CVs; for L3C, the third size names the `height` vertical CV.
fn trmm_l3_v6(
    catalog: &mut Catalog,
    size_pairs: &[(u64, u64)],
    lat_name: &str,
    lon_name: &str,
    height_size: Option<u64>,
) {
    let &(lon_size, lat_size) = match size_pairs.first() {
        Some(pair) => pair,
        None => return,
    };
    let Some(field) = catalog
        .sds_fields
        .iter()
        .find(|f| f.dim_sizes().contains(&lon_size) && f.dim_sizes().contains(&lat_size))
    else {
        return;
    };
    let path = field.path.clone();

    let lon_step = 360.0 / lon_size as f64;
    let lon_axis = AnalyticAxis {
        origin: -180.0 + 0.5 * lon_step,
        step: lon_step,
    };
    let lat_step = -180.0 / lat_size as f64;
    let lat_axis = AnalyticAxis {
        origin: 90.0 + 0.5 * lat_step,
        step: lat_step,
    };

    catalog.sds_fields.push(synth_cv(
        lon_name,
        lon_size,
        FieldKind::Longitude,
        "degrees_east",
        lon_axis,
        &path,
    ));
    catalog.sds_fields.push(synth_cv(
        lat_name,
        lat_size,
        FieldKind::Latitude,
        "degrees_north",
        lat_axis,
        &path,
    ));

    if let Some(height_size) = height_size {
        if catalog
            .sds_fields
            .iter()
            .any(|f| f.dim_sizes().contains(&height_size))
        {
            catalog.sds_fields.push(synth_cv(
                "height",
                height_size,
                FieldKind::Vertical,
                "level",
                AnalyticAxis { origin: 0.0, step: 1.0 },
                &path,
            ));
        }
    }
}

/// **TRMM_L2_V7.** Marks existing `Latitude`/`Longitude` as CVs, strips
/// the leading two path components from every variable's new name, and
/// (for `2A12`-like files) synthesizes a `nlayer` vertical CV.
fn trmm_l2_v7(catalog: &mut Catalog) {
    for field in &mut catalog.sds_fields {
        if field.name == "Latitude" {
            field.field_kind = FieldKind::Latitude;
            field.units.get_or_insert_with(|| "degrees_north".to_string());
        } else if field.name == "Longitude" {
            field.field_kind = FieldKind::Longitude;
            field.units.get_or_insert_with(|| "degrees_east".to_string());
        }
        field.new_name = strip_leading_path_components(&field.path, &field.name, 2);
    }

    let has_nlayer_28 = catalog
        .sds_fields
        .iter()
        .any(|f| f.dims.iter().any(|d| d.name == "nlayer" && d.size == 28));
    if has_nlayer_28 {
        catalog.sds_fields.push(synth_cv(
            "nlayer",
            28,
            FieldKind::Vertical,
            "level",
            AnalyticAxis { origin: 0.0, step: 1.0 },
            "",
        ));
    }
}

fn strip_leading_path_components(path: &str, fallback_name: &str, n: usize) -> String {
    let components: Vec<&str> = path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    if components.len() > n {
        components[n..].join("_")
    } else {
        fallback_name.to_string()
    }
}

/// Parsed `GridHeader` attribute, spec.md §6's TRMM V7 grid-header format.
#[derive(Clone, Copy, Debug, PartialEq)]
struct GridHeader {
    center_registration: bool,
    lat_res: f64,
    lon_res: f64,
    north: f64,
    south: f64,
    east: f64,
    west: f64,
}

impl GridHeader {
    fn parse(text: &str) -> Option<GridHeader> {
        let mut registration = "CENTER".to_string();
        let mut lat_res = None;
        let mut lon_res = None;
        let mut north = None;
        let mut south = None;
        let mut east = None;
        let mut west = None;
        for pair in text.split(';') {
            let pair = pair.trim();
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "Registration" => registration = value.to_string(),
                "LatitudeResolution" => lat_res = value.parse().ok(),
                "LongitudeResolution" => lon_res = value.parse().ok(),
                "NorthBoundingCoordinate" => north = value.parse().ok(),
                "SouthBoundingCoordinate" => south = value.parse().ok(),
                "EastBoundingCoordinate" => east = value.parse().ok(),
                "WestBoundingCoordinate" => west = value.parse().ok(),
                _ => {}
            }
        }
        Some(GridHeader {
            center_registration: registration == "CENTER",
            lat_res: lat_res?,
            lon_res: lon_res?,
            north: north?,
            south: south?,
            east: east?,
            west: west?,
        })
    }

    fn lat_size(&self) -> u64 {
        ((self.north - self.south) / self.lat_res).round() as u64
    }

    fn lon_size(&self) -> u64 {
        ((self.east - self.west) / self.lon_res).round() as u64
    }

    fn lat_axis(&self) -> AnalyticAxis {
        let origin = if self.center_registration {
            self.south + self.lat_res / 2.0
        } else {
            self.south + self.lat_res
        };
        AnalyticAxis {
            origin,
            step: self.lat_res,
        }
    }

    fn lon_axis(&self) -> AnalyticAxis {
        let origin = if self.center_registration {
            self.west + self.lon_res / 2.0
        } else {
            self.west + self.lon_res
        };
        AnalyticAxis {
            origin,
            step: self.lon_res,
        }
    }
}

/// **TRMM_L3S_V7.** Removes input-provenance attributes, parses the
/// single `GridHeader` to synthesize `latitude`/`longitude`, and handles
/// the `3A26` special case (spec.md §9's documented approximation).
fn trmm_l3s_v7(catalog: &mut Catalog) {
    catalog.file_attrs.attrs.retain(|a| {
        !matches!(
            a.name.as_str(),
            "InputFileNames" | "InputAlgorithmVersions" | "InputGenerationDateTimes"
        )
    });

    let header = catalog
        .file_attrs
        .str_value("GridHeader")
        .and_then(GridHeader::parse);
    if let Some(header) = header {
        catalog.sds_fields.push(synth_cv(
            "latitude",
            header.lat_size(),
            FieldKind::Latitude,
            "degrees_north",
            header.lat_axis(),
            "",
        ));
        catalog.sds_fields.push(synth_cv(
            "longitude",
            header.lon_size(),
            FieldKind::Longitude,
            "degrees_east",
            header.lon_axis(),
            "",
        ));
    }

    let is_3a26 = catalog
        .file_attrs
        .str_value("FileHeader")
        .map(|v| v.contains("3A26"))
        .unwrap_or(false)
        || catalog.sds_fields.iter().any(|f| f.name.contains("2A25"));
    if is_3a26 {
        synthesize_3a26_cvs(catalog);
    }
}

/// "The source's handling of the `3A26` special CVs relies on substring
/// matches in variable names (`"Order"`, `"hb"`, `"HB"`, `"2A25"`) that
/// appear to be fragile" (spec.md §9). Implemented exactly as directed:
/// synthesize up to three `nthrsh*` CVs of size 6 when the substring test
/// matches, and retarget the matching variables' dimension to the new CV.
fn synthesize_3a26_cvs(catalog: &mut Catalog) {
    const MARKERS: [(&str, &str); 3] = [("Order", "nthrshOrder"), ("hb", "nthrshHb"), ("HB", "nthrshHB")];
    for (marker, cv_name) in MARKERS {
        let matches_marker = catalog.sds_fields.iter().any(|f| f.name.contains(marker));
        if !matches_marker {
            continue;
        }
        if catalog.sds_fields.iter().any(|f| f.name == cv_name) {
            continue;
        }
        catalog.sds_fields.push(synth_cv(
            cv_name,
            6,
            FieldKind::Vertical,
            "level",
            AnalyticAxis { origin: 0.0, step: 1.0 },
            "",
        ));
        for field in &mut catalog.sds_fields {
            if field.name.contains(marker) && field.name != cv_name {
                if let Some(dim) = field.dims.iter_mut().find(|d| d.size == 6) {
                    dim.name = cv_name.to_string();
                }
            }
        }
    }
}

/// **TRMM_L3M_V7.** Multiple grids: parses each `GridHeaderN` attribute
/// and, per grid index, synthesizes dedicated lat/lon CVs and (for the
/// first grid) strips the grid-name suffix from its variables.
fn trmm_l3m_v7(catalog: &mut Catalog) {
    let grid_headers: Vec<(usize, GridHeader)> = catalog
        .file_attrs
        .attrs
        .iter()
        .filter_map(|a| {
            let suffix = a.name.strip_prefix("GridHeader")?;
            let index: usize = suffix.parse().ok()?;
            let header = a.value.as_str().and_then(GridHeader::parse)?;
            Some((index, header))
        })
        .collect();

    for (index, header) in &grid_headers {
        let lat_name = format!("latitude{index}");
        let lon_name = format!("longitude{index}");
        let grid_marker = format!("/Grid{index}/");
        catalog.sds_fields.push(synth_cv(
            &lat_name,
            header.lat_size(),
            FieldKind::Latitude,
            "degrees_north",
            header.lat_axis(),
            &grid_marker,
        ));
        catalog.sds_fields.push(synth_cv(
            &lon_name,
            header.lon_size(),
            FieldKind::Longitude,
            "degrees_east",
            header.lon_axis(),
            &grid_marker,
        ));
    }

    if let Some((first_index, _)) = grid_headers.first() {
        let marker = format!("/Grid{first_index}/");
        for field in &mut catalog.sds_fields {
            if field.path.contains(&marker) {
                field.new_name = field.name.clone();
            }
        }
    }
}

/// **CER_AVG / CER_SYN.** Keeps the first `Colatitude` and first
/// `Longitude` fields; deletes any later duplicates.
fn ceres_avg_syn(catalog: &mut Catalog) {
    keep_first_of_each(catalog, &["Colatitude", "Longitude"]);
}

fn keep_first_of_each(catalog: &mut Catalog, names: &[&str]) {
    for &name in names {
        let mut seen = false;
        catalog.sds_fields.retain(|f| {
            if f.name == name {
                if seen {
                    return false;
                }
                seen = true;
            }
            true
        });
    }
}

/// **CER_ES4 / CER_CGEO.** Condenses 3-D "regional" lat/lon to 1-D by
/// keeping only the dimension named `regional colat*`/`regional long*`.
fn ceres_es4_cgeo(catalog: &mut Catalog) {
    for field in &mut catalog.sds_fields {
        if field.rank() < 2 {
            continue;
        }
        let is_regional = field
            .dims
            .iter()
            .any(|d| d.name.starts_with("regional colat") || d.name.starts_with("regional long"));
        if !is_regional {
            continue;
        }
        field.dims.retain(|d| {
            d.name.starts_with("regional colat") || d.name.starts_with("regional long")
        });
    }
}

/// **CER_CDAY / CER_SRB.** Synthesizes 2-D `latitude(180,360)`,
/// `longitude(180,360)` on a nested 1° grid; for `CER_SRB`, also
/// synthesizes 1-D zonal `latitudez(180)`, `longitudez(1)`.
fn ceres_cday_srb(catalog: &mut Catalog, is_srb: bool) {
    let lat_axis = AnalyticAxis { origin: 89.5, step: -1.0 };
    let lon_axis = AnalyticAxis { origin: -179.5, step: 1.0 };

    catalog.sds_fields.push(SdsField {
        name: "latitude".to_string(),
        new_name: "latitude".to_string(),
        element_type: ElementType::Float64,
        dims: vec![new_dim("lat_nested", 180), new_dim("lon_nested", 360)],
        field_kind: FieldKind::Latitude,
        units: Some("degrees_north".to_string()),
        coordinates: Some(String::new()),
        source: FieldSource::Analytic(lat_axis),
        path: String::new(),
    });
    catalog.sds_fields.push(SdsField {
        name: "longitude".to_string(),
        new_name: "longitude".to_string(),
        element_type: ElementType::Float64,
        dims: vec![new_dim("lat_nested", 180), new_dim("lon_nested", 360)],
        field_kind: FieldKind::Longitude,
        units: Some("degrees_east".to_string()),
        coordinates: Some(String::new()),
        source: FieldSource::Analytic(lon_axis),
        path: String::new(),
    });

    if is_srb {
        catalog
            .sds_fields
            .push(synth_cv("latitudez", 180, FieldKind::Latitude, "degrees_north", lat_axis, ""));
        catalog.sds_fields.push(synth_cv(
            "longitudez",
            1,
            FieldKind::Longitude,
            "degrees_east",
            AnalyticAxis { origin: 0.0, step: 0.0 },
            "",
        ));
    }
}

/// **CER_ZAVG.** Synthesizes only `latitudez(180)`, `longitudez(1)`.
fn ceres_zavg(catalog: &mut Catalog) {
    catalog.sds_fields.push(synth_cv(
        "latitudez",
        180,
        FieldKind::Latitude,
        "degrees_north",
        AnalyticAxis { origin: 89.5, step: -1.0 },
        "",
    ));
    catalog.sds_fields.push(synth_cv(
        "longitudez",
        1,
        FieldKind::Longitude,
        "degrees_east",
        AnalyticAxis { origin: 0.0, step: 0.0 },
        "",
    ));
}

/// **OBPG_L2.** Renames/resizes the `Number of Pixel Control Points`
/// dimension to the true pixel extent from `Pixels per Scan Line`.
fn obpg_l2(catalog: &mut Catalog) {
    let Some(true_extent) = catalog
        .file_attrs
        .get("Pixels per Scan Line")
        .and_then(|a| a.value.as_numeric())
        .and_then(|v| v.first())
        .map(|&v| v as u64)
    else {
        return;
    };
    for field in &mut catalog.sds_fields {
        if field.dims.len() >= 2 && field.dims[1].name == "Number of Pixel Control Points" {
            field.dims[1].name = "pixels_per_scan_line".to_string();
            field.dims[1].size = true_extent;
        }
    }
}

/// **OBPG_L3.** Synthesizes `latitude(Number of Lines)`,
/// `longitude(Number of Columns)`; renames matching-size `fakeDim*`
/// dimensions to the corresponding name.
fn obpg_l3(catalog: &mut Catalog) {
    let lines = catalog.dimension_size("Number of Lines");
    let columns = catalog.dimension_size("Number of Columns");

    if let Some(n) = lines {
        catalog.sds_fields.push(synth_cv(
            "latitude",
            n,
            FieldKind::Latitude,
            "degrees_north",
            AnalyticAxis {
                origin: 90.0 - 0.5 * 180.0 / n as f64,
                step: -180.0 / n as f64,
            },
            "",
        ));
    }
    if let Some(n) = columns {
        catalog.sds_fields.push(synth_cv(
            "longitude",
            n,
            FieldKind::Longitude,
            "degrees_east",
            AnalyticAxis {
                origin: -180.0 + 0.5 * 360.0 / n as f64,
                step: 360.0 / n as f64,
            },
            "",
        ));
    }

    for field in &mut catalog.sds_fields {
        for dim in &mut field.dims {
            if !dim.is_fake() {
                continue;
            }
            if Some(dim.size) == lines {
                dim.name = "Number of Lines".to_string();
            } else if Some(dim.size) == columns {
                dim.name = "Number of Columns".to_string();
            }
        }
    }
}

/// **MODIS_ARNSS.** Builds a size → dim-name map from the existing
/// `Latitude`/`Longitude` fields, then rewrites every other variable's
/// matching-size dimension to use that name.
fn modis_arnss(catalog: &mut Catalog) {
    let mut size_to_name: std::collections::HashMap<u64, String> = std::collections::HashMap::new();
    for field in &mut catalog.sds_fields {
        if field.name == "Latitude" {
            field.field_kind = FieldKind::Latitude;
            if let Some(dim) = field.dims.first() {
                size_to_name.insert(dim.size, dim.name.clone());
            }
        } else if field.name == "Longitude" {
            field.field_kind = FieldKind::Longitude;
            if let Some(dim) = field.dims.last() {
                size_to_name.insert(dim.size, dim.name.clone());
            }
        }
    }
    for field in &mut catalog.sds_fields {
        if field.name == "Latitude" || field.name == "Longitude" {
            continue;
        }
        for dim in &mut field.dims {
            if let Some(name) = size_to_name.get(&dim.size) {
                dim.name = name.clone();
            }
        }
    }
}

/// **OTHER.** Marks rank-1 SDS fields whose name equals their dimension's
/// name as dim-scale CVs when every such dimension has a scale variable;
/// if any doesn't, suppresses all `coordinates` attributes. Also strips
/// unambiguous `:EOSGRID` suffixes (MERRA).
fn other(catalog: &mut Catalog, _config: &Config) {
    let candidates: Vec<usize> = catalog
        .sds_fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.rank() == 1 && f.dims[0].name == f.name)
        .map(|(i, _)| i)
        .collect();

    let any_no_scale = candidates
        .iter()
        .any(|&i| catalog.sds_fields[i].dims[0].scale_type == 0);

    for &i in &candidates {
        if catalog.sds_fields[i].dims[0].scale_type != 0 {
            catalog.sds_fields[i].field_kind = FieldKind::DimScale;
        }
    }
    if any_no_scale {
        for field in &mut catalog.sds_fields {
            field.coordinates = Some(String::new());
        }
    }

    strip_eosgrid_suffix(catalog);
}

/// MERRA-specific post-step: strips `:EOSGRID` suffixes from variable
/// names where doing so doesn't introduce a name collision.
fn strip_eosgrid_suffix(catalog: &mut Catalog) {
    let stripped_names: Vec<String> = catalog
        .sds_fields
        .iter()
        .map(|f| f.name.trim_end_matches(":EOSGRID").to_string())
        .collect();
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for name in &stripped_names {
        *counts.entry(name.as_str()).or_insert(0) += 1;
    }
    for (field, stripped) in catalog.sds_fields.iter_mut().zip(stripped_names.iter()) {
        if field.name.ends_with(":EOSGRID") && counts.get(stripped.as_str()) == Some(&1) {
            field.name = stripped.clone();
        }
    }
}

impl Catalog {
    fn dimension_size(&self, name: &str) -> Option<u64> {
        self.sds_fields
            .iter()
            .flat_map(|f| f.dims.iter())
            .find(|d| d.name == name)
            .map(|d| d.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, dims: Vec<Dimension>) -> SdsField {
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
    fn trmm_l2_v6_splits_geolocation() {
        let mut catalog = Catalog::empty("x");
        catalog.sds_fields.push(field(
            "geolocation",
            vec![new_dim("fakeDim0", 10), new_dim("fakeDim1", 20), new_dim("fakeDim2", 2)],
        ));
        trmm_l2_v6(&mut catalog);
        assert!(catalog.sds_fields.iter().any(|f| f.name == "latitude"));
        assert!(catalog.sds_fields.iter().any(|f| f.name == "longitude"));
        assert!(!catalog.sds_fields.iter().any(|f| f.name == "geolocation"));
    }

    #[test]
    fn trmm_l3b_v6_synthesizes_analytic_axes() {
        let mut catalog = Catalog::empty("x");
        catalog
            .sds_fields
            .push(field("precip", vec![new_dim("fakeDim0", 1440), new_dim("fakeDim1", 400)]));
        trmm_l3_v6(&mut catalog, &[(1440, 400)], "latitude", "longitude", None);
        let lon = catalog.sds_fields.iter().find(|f| f.name == "longitude").unwrap();
        match lon.source {
            FieldSource::Analytic(axis) => assert!((axis.value_at(0) - (-179.875)).abs() < 1e-9),
            _ => panic!("expected analytic source"),
        }
    }

    #[test]
    fn grid_header_parses_center_registration() {
        let text = "Registration=CENTER;LatitudeResolution=0.25;LongitudeResolution=0.25;\
                     NorthBoundingCoordinate=90;SouthBoundingCoordinate=-90;\
                     EastBoundingCoordinate=180;WestBoundingCoordinate=-180;";
        let header = GridHeader::parse(text).unwrap();
        assert_eq!(720, header.lat_size());
        assert_eq!(1440, header.lon_size());
        assert!((header.lat_axis().origin - (-89.875)).abs() < 1e-9);
    }

    #[test]
    fn strip_eosgrid_suffix_only_when_unambiguous() {
        let mut catalog = Catalog::empty("x");
        catalog.sds_fields.push(field("TLML:EOSGRID", vec![]));
        catalog.sds_fields.push(field("QLML:EOSGRID", vec![]));
        catalog.sds_fields.push(field("TLML", vec![]));
        strip_eosgrid_suffix(&mut catalog);
        assert_eq!("QLML", catalog.sds_fields[1].name);
        // TLML:EOSGRID can't be stripped: "TLML" is already taken.
        assert_eq!("TLML:EOSGRID", catalog.sds_fields[0].name);
    }

    #[test]
    fn keep_first_of_each_drops_duplicates() {
        let mut catalog = Catalog::empty("x");
        catalog.sds_fields.push(field("Colatitude", vec![]));
        catalog.sds_fields.push(field("Colatitude", vec![]));
        keep_first_of_each(&mut catalog, &["Colatitude"]);
        assert_eq!(1, catalog.sds_fields.iter().filter(|f| f.name == "Colatitude").count());
    }

    #[test]
    fn synthesize_3a26_cvs_only_on_marker_match() {
        let mut catalog = Catalog::empty("x");
        catalog.sds_fields.push(field("rainOrder", vec![new_dim("fakeDim0", 6)]));
        synthesize_3a26_cvs(&mut catalog);
        assert!(catalog.sds_fields.iter().any(|f| f.name == "nthrshOrder"));
        assert!(!catalog.sds_fields.iter().any(|f| f.name == "nthrshHb"));
    }
}
