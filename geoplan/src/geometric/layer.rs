use geo::{Geometry, MultiPolygon, Polygon};
use geos::Geom;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geo_core::{BoundingBox, Crs, Reprojector};
use crate::geometric::geos_ops::{from_geos, to_geos};

/// A single attribute value, typed once at ingestion
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl AttributeValue {
    /// Parse a raw text cell (CSV) into the narrowest type that fits.
    ///
    /// A number is only kept as a number when it prints back to the same
    /// text; codes such as `01` or `2.50` stay `Text` (still readable
    /// through [`AttributeValue::as_f64`]).
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return AttributeValue::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            if i.to_string() == trimmed {
                return AttributeValue::Integer(i);
            }
        } else if let Ok(f) = trimmed.parse::<f64>() {
            if f.to_string() == trimmed {
                return AttributeValue::Real(f);
            }
        }
        AttributeValue::Text(raw.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Real(f) if f.is_finite() => Some(*f),
            AttributeValue::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => Ok(()),
            AttributeValue::Integer(i) => write!(f, "{}", i),
            AttributeValue::Real(v) => write!(f, "{}", v),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&JsonValue> for AttributeValue {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => AttributeValue::Null,
            JsonValue::Bool(b) => AttributeValue::Text(b.to_string()),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Integer(i),
                None => n
                    .as_f64()
                    .map(AttributeValue::Real)
                    .unwrap_or(AttributeValue::Null),
            },
            JsonValue::String(s) => AttributeValue::Text(s.clone()),
            other => AttributeValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Real(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

/// One geometry with its attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub attributes: Attributes,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Feature {
            geometry: geometry.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// A named collection of features sharing one coordinate reference.
///
/// Layers are immutable once built: filtering, clipping and reprojection
/// return new layers.
#[derive(Debug, Clone)]
pub struct GeometryLayer {
    name: String,
    crs: Crs,
    features: Vec<Feature>,
}

impl GeometryLayer {
    pub fn new(name: impl Into<String>, crs: Crs, features: Vec<Feature>) -> Self {
        GeometryLayer {
            name: name.into(),
            crs,
            features,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    /// Union of the bounds of every feature
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.features
            .iter()
            .filter_map(|f| BoundingBox::of_geometry(&f.geometry))
            .reduce(|acc, b| acc.union(&b))
    }

    /// True if at least one feature carries `field`
    pub fn has_field(&self, field: &str) -> bool {
        self.features.iter().any(|f| f.attributes.contains_key(field))
    }

    pub(crate) fn require_field(&self, field: &str) -> Result<()> {
        if self.has_field(field) {
            Ok(())
        } else {
            Err(Error::schema(&self.name, format!("field `{}` is absent", field)))
        }
    }

    /// Distinct non-null values of `field`, in first-seen order
    pub fn unique_values(&self, field: &str) -> Result<Vec<String>> {
        self.require_field(field)?;
        let mut seen: Vec<String> = Vec::new();
        for value in self.features.iter().filter_map(|f| f.attribute(field)) {
            if value.is_null() {
                continue;
            }
            let text = value.to_string();
            if !seen.contains(&text) {
                seen.push(text);
            }
        }
        Ok(seen)
    }

    /// Keep the features whose `field` equals `value` (compared as text)
    pub fn filter_eq(&self, field: &str, value: &str) -> Result<GeometryLayer> {
        self.require_field(field)?;
        let features: Vec<Feature> = self
            .features
            .iter()
            .filter(|f| f.attribute(field).is_some_and(|v| v.to_string() == value))
            .cloned()
            .collect();
        debug!(
            layer = %self.name,
            field,
            value,
            kept = features.len(),
            total = self.features.len(),
            "filtered layer"
        );
        Ok(GeometryLayer::new(self.name.clone(), self.crs, features))
    }

    /// Intersect every feature with the polygonal area of `mask`.
    ///
    /// Attributes are preserved; features falling entirely outside the mask
    /// are dropped.
    pub fn clip_to(&self, mask: &GeometryLayer) -> Result<GeometryLayer> {
        self.crs
            .ensure_same(&mask.crs, &format!("clip `{}` to `{}`", self.name, mask.name))?;

        let geos_mask = mask.polygonal_union()?;

        let mut clipped = Vec::with_capacity(self.features.len());
        for feature in &self.features {
            let geos_feature = to_geos(&feature.geometry)?;
            let intersection = geos_feature
                .intersection(&geos_mask)
                .map_err(|e| Error::geometry("clip", e))?;
            if let Some(geometry) = from_geos(intersection)? {
                clipped.push(Feature {
                    geometry,
                    attributes: feature.attributes.clone(),
                });
            }
        }
        debug!(
            layer = %self.name,
            mask = %mask.name,
            kept = clipped.len(),
            total = self.features.len(),
            "clipped layer"
        );
        Ok(GeometryLayer::new(self.name.clone(), self.crs, clipped))
    }

    /// Polygonal area of every feature dissolved into one GEOS geometry;
    /// overlapping or adjacent polygons become a single valid area
    fn polygonal_union(&self) -> Result<geos::Geometry> {
        let mut polygons: Vec<Polygon<f64>> = Vec::new();
        for feature in &self.features {
            match &feature.geometry {
                Geometry::Polygon(p) => polygons.push(p.clone()),
                Geometry::MultiPolygon(mp) => polygons.extend(mp.0.iter().cloned()),
                Geometry::Rect(r) => polygons.push(r.to_polygon()),
                _ => {}
            }
        }
        if polygons.is_empty() {
            return Err(Error::schema(&self.name, "mask layer has no polygon features"));
        }
        to_geos(&Geometry::MultiPolygon(MultiPolygon(polygons)))?
            .unary_union()
            .map_err(|e| Error::geometry("dissolve mask", e))
    }

    /// Same features expressed in `target`
    pub fn reprojected(&self, target: Crs) -> Result<GeometryLayer> {
        if self.crs == target {
            return Ok(self.clone());
        }
        let reprojector = Reprojector::new(self.crs, target)?;
        let features = self
            .features
            .iter()
            .map(|f| {
                Ok(Feature {
                    geometry: reprojector.geometry(&f.geometry)?,
                    attributes: f.attributes.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(GeometryLayer::new(self.name.clone(), target, features))
    }
}

impl<'a> IntoIterator for &'a GeometryLayer {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon, Area};

    fn grid() -> Crs {
        Crs::projected_metres(29902)
    }

    fn buildings() -> GeometryLayer {
        GeometryLayer::new(
            "buildings",
            grid(),
            vec![
                Feature::new(point!(x: 0.0, y: 0.0)).with_attribute("USE", "RESIDENTIAL"),
                Feature::new(point!(x: 5.0, y: 5.0)).with_attribute("USE", "COMMERCIAL"),
                Feature::new(point!(x: 9.0, y: 1.0)).with_attribute("USE", "RESIDENTIAL"),
            ],
        )
    }

    #[test]
    fn test_attribute_from_raw() {
        assert_eq!(AttributeValue::from_raw("12"), AttributeValue::Integer(12));
        assert_eq!(AttributeValue::from_raw("433580.5"), AttributeValue::Real(433580.5));
        assert_eq!(AttributeValue::from_raw(""), AttributeValue::Null);
        assert_eq!(
            AttributeValue::from_raw("Main Road"),
            AttributeValue::Text("Main Road".to_string())
        );
    }

    #[test]
    fn test_raw_text_survives_parsing() {
        for raw in ["01", "2.50", "265000.0", "+7"] {
            assert_eq!(AttributeValue::from_raw(raw).to_string(), raw);
        }
        assert_eq!(AttributeValue::from_raw("01").as_f64(), Some(1.0));
        assert_eq!(AttributeValue::from_raw("265000.0").as_f64(), Some(265000.0));
        assert_eq!(AttributeValue::from_raw("NaN").as_f64(), None);
    }

    #[test]
    fn test_attribute_from_json() {
        let v = serde_json::json!(700);
        assert_eq!(AttributeValue::from(&v), AttributeValue::Integer(700));
        let v = serde_json::json!(12.5);
        assert_eq!(AttributeValue::from(&v).as_f64(), Some(12.5));
        let v = serde_json::json!("BALLYKELLY");
        assert_eq!(AttributeValue::from(&v).to_string(), "BALLYKELLY");
    }

    #[test]
    fn test_bounds() {
        let layer = buildings();
        assert_eq!(layer.bounds(), Some(BoundingBox::new(0.0, 0.0, 9.0, 5.0)));
        let empty = GeometryLayer::new("empty", grid(), vec![]);
        assert_eq!(empty.bounds(), None);
    }

    #[test]
    fn test_filter_eq() {
        let residential = buildings().filter_eq("USE", "RESIDENTIAL").unwrap();
        assert_eq!(residential.len(), 2);
        assert_eq!(residential.crs(), grid());
        assert_eq!(residential.name(), "buildings");
    }

    #[test]
    fn test_filter_on_missing_field_is_schema_error() {
        let err = buildings().filter_eq("TYPE", "RESIDENTIAL").unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[test]
    fn test_unique_values_first_seen_order() {
        let values = buildings().unique_values("USE").unwrap();
        assert_eq!(values, vec!["RESIDENTIAL".to_string(), "COMMERCIAL".to_string()]);
    }

    #[test]
    fn test_clip_to_mask() {
        let mask = GeometryLayer::new(
            "study_area",
            grid(),
            vec![Feature::new(polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
            ])],
        );
        let outline = GeometryLayer::new(
            "outline",
            grid(),
            vec![
                Feature::new(polygon![
                    (x: 5.0, y: 5.0),
                    (x: 15.0, y: 5.0),
                    (x: 15.0, y: 15.0),
                    (x: 5.0, y: 15.0),
                ])
                .with_attribute("NAME", "half in"),
                Feature::new(polygon![
                    (x: 20.0, y: 20.0),
                    (x: 30.0, y: 20.0),
                    (x: 30.0, y: 30.0),
                    (x: 20.0, y: 30.0),
                ]),
            ],
        );

        let clipped = outline.clip_to(&mask).unwrap();
        assert_eq!(clipped.len(), 1);
        let f = &clipped.features()[0];
        assert!((f.geometry.unsigned_area() - 25.0).abs() < 1e-9);
        assert_eq!(f.attribute("NAME").unwrap().to_string(), "half in");
    }

    #[test]
    fn test_clip_to_overlapping_mask_polygons() {
        let square = |min: f64, max: f64| {
            Feature::new(polygon![
                (x: min, y: min),
                (x: max, y: min),
                (x: max, y: max),
                (x: min, y: max),
            ])
        };
        let mask = GeometryLayer::new("study_boxes", grid(), vec![square(0.0, 10.0), square(5.0, 15.0)]);
        let outline = GeometryLayer::new(
            "outline",
            grid(),
            vec![square(-5.0, 20.0).with_attribute("NAME", "coast")],
        );

        let clipped = outline.clip_to(&mask).unwrap();
        assert_eq!(clipped.len(), 1);
        // 100 + 100 minus the shared 5 x 5 corner, counted once
        assert!((clipped.features()[0].geometry.unsigned_area() - 175.0).abs() < 1e-9);
    }

    #[test]
    fn test_clip_rejects_other_reference() {
        let mask = GeometryLayer::new("mask", Crs::wgs84(), vec![]);
        let err = buildings().clip_to(&mask).unwrap_err();
        assert!(matches!(err, Error::ReferenceMismatch { .. }));
    }

    #[test]
    fn test_reprojected_same_reference_is_identity() {
        let layer = buildings();
        let same = layer.reprojected(grid()).unwrap();
        assert_eq!(same.features(), layer.features());
    }
}
