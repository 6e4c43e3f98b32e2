use geo::Geometry;
use geojson::{GeoJson, JsonObject};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::geo_core::Crs;
use crate::geometric::layer::{AttributeValue, Attributes, Feature};

/// Reference a source declares about itself
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DeclaredCrs {
    Epsg(u32),
    /// Declared, but not as an identifiable EPSG code
    Unresolved(String),
    Missing,
}

impl DeclaredCrs {
    pub(crate) fn resolve(&self, name: &str) -> Result<Crs> {
        match self {
            DeclaredCrs::Epsg(code) => Crs::resolve(*code),
            DeclaredCrs::Unresolved(text) => Err(Error::reference_mismatch(
                format!("load `{}`", name),
                format!("declared reference `{}` cannot be resolved; set `declared_epsg`", text),
            )),
            DeclaredCrs::Missing => Err(Error::reference_mismatch(
                format!("load `{}`", name),
                "source declares no reference; set `declared_epsg`",
            )),
        }
    }
}

/// Features as read from storage, before any reprojection
#[derive(Debug)]
pub(crate) struct RawLayer {
    pub features: Vec<Feature>,
    pub declared: DeclaredCrs,
}

/// Read a vector file; GeoJSON is parsed directly, anything else goes through OGR
pub(crate) fn read_vector(name: &str, path: &Path) -> Result<RawLayer> {
    if !path.exists() {
        return Err(Error::data_source(
            name,
            format!("{} does not exist", path.display()),
        ));
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("geojson") | Some("json") => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                Error::data_source(name, format!("cannot read {}: {}", path.display(), e))
            })?;
            parse_geojson(name, &text)
        }
        _ => read_ogr(name, path),
    }
}

/// Parse GeoJSON text.
///
/// Without a legacy `crs` member the reference is EPSG:4326, as RFC 7946 defines.
pub(crate) fn parse_geojson(name: &str, text: &str) -> Result<RawLayer> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e| Error::data_source(name, format!("invalid GeoJSON: {}", e)))?;

    let (features, foreign) = match geojson {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(f) => {
            let foreign = f.foreign_members.clone();
            (vec![f], foreign)
        }
        GeoJson::Geometry(g) => (vec![geojson::Feature::from(g)], None),
    };

    let declared = declared_crs(foreign.as_ref());
    let mut converted = Vec::with_capacity(features.len());
    for (idx, feature) in features.iter().enumerate() {
        let Some(geometry) = feature.geometry.as_ref() else {
            warn!(layer = name, feature = idx, "feature has no geometry, skipped");
            continue;
        };
        let geometry: Geometry<f64> = geometry
            .clone()
            .try_into()
            .map_err(|e: geojson::Error| Error::data_source(name, format!("feature {}: {}", idx, e)))?;

        let attributes: Attributes = feature
            .properties
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), AttributeValue::from(v)))
            .collect();
        converted.push(Feature {
            geometry,
            attributes,
        });
    }
    debug!(layer = name, features = converted.len(), ?declared, "parsed GeoJSON");

    Ok(RawLayer {
        features: converted,
        declared,
    })
}

fn declared_crs(foreign: Option<&JsonObject>) -> DeclaredCrs {
    let Some(crs) = foreign.and_then(|members| members.get("crs")) else {
        return DeclaredCrs::Epsg(4326);
    };
    let crs_name = crs
        .get("properties")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str());
    match crs_name {
        Some(text) => match epsg_from_crs_name(text) {
            Some(code) => DeclaredCrs::Epsg(code),
            None => DeclaredCrs::Unresolved(text.to_string()),
        },
        None => DeclaredCrs::Unresolved(crs.to_string()),
    }
}

/// `urn:ogc:def:crs:EPSG::29902`, `EPSG:29902` or `urn:ogc:def:crs:OGC:1.3:CRS84`
fn epsg_from_crs_name(text: &str) -> Option<u32> {
    let upper = text.to_ascii_uppercase();
    if upper.ends_with("CRS84") {
        return Some(4326);
    }
    if !upper.contains("EPSG") {
        return None;
    }
    upper.rsplit(':').next()?.trim().parse().ok()
}

#[cfg(feature = "gdal")]
fn read_ogr(name: &str, path: &Path) -> Result<RawLayer> {
    use gdal::vector::LayerAccess;
    use gdal::Dataset;

    let dataset = Dataset::open(path)
        .map_err(|e| Error::data_source(name, format!("cannot open {}: {}", path.display(), e)))?;
    let mut layer = dataset
        .layer(0)
        .map_err(|e| Error::data_source(name, format!("no vector layer: {}", e)))?;

    let declared = match layer.spatial_ref() {
        None => DeclaredCrs::Missing,
        Some(srs) => match ogr_epsg(&srs) {
            Some(code) => DeclaredCrs::Epsg(code),
            None => DeclaredCrs::Unresolved(srs.to_wkt().unwrap_or_default().chars().take(80).collect()),
        },
    };

    let mut features = Vec::new();
    for (idx, feature) in layer.features().enumerate() {
        let Some(geometry) = feature.geometry() else {
            warn!(layer = name, feature = idx, "feature has no geometry, skipped");
            continue;
        };
        let geometry = geometry
            .to_geo()
            .map_err(|e| Error::data_source(name, format!("feature {}: {}", idx, e)))?;
        let attributes: Attributes = feature
            .fields()
            .map(|(field, value)| (field, ogr_value(value)))
            .collect();
        features.push(Feature {
            geometry,
            attributes,
        });
    }
    debug!(layer = name, features = features.len(), ?declared, "read OGR layer");

    Ok(RawLayer { features, declared })
}

#[cfg(not(feature = "gdal"))]
fn read_ogr(name: &str, path: &Path) -> Result<RawLayer> {
    Err(Error::data_source(
        name,
        format!(
            "{} needs OGR; build with the `gdal` feature or convert it to GeoJSON",
            path.display()
        ),
    ))
}

#[cfg(feature = "gdal")]
fn ogr_epsg(srs: &gdal::spatial_ref::SpatialRef) -> Option<u32> {
    if let Ok(code) = srs.auth_code() {
        return u32::try_from(code).ok();
    }
    // .prj files usually carry WKT without an authority node
    let mut identified = srs.clone();
    identified.auto_identify_epsg().ok()?;
    identified.auth_code().ok().and_then(|c| u32::try_from(c).ok())
}

#[cfg(feature = "gdal")]
fn ogr_value(value: Option<gdal::vector::FieldValue>) -> AttributeValue {
    use gdal::vector::FieldValue;

    match value {
        None => AttributeValue::Null,
        Some(FieldValue::IntegerValue(i)) => AttributeValue::Integer(i as i64),
        Some(FieldValue::Integer64Value(i)) => AttributeValue::Integer(i),
        Some(FieldValue::RealValue(f)) => AttributeValue::Real(f),
        Some(FieldValue::StringValue(s)) => AttributeValue::Text(s),
        Some(other) => other
            .into_string()
            .map(AttributeValue::Text)
            .unwrap_or(AttributeValue::Null),
    }
}
