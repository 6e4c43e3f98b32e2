use geo::{Area, Geometry, MultiPolygon, Point};
use geos::Geom;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::geo_core::{Crs, Length};
use crate::geometric::geos_ops::{from_geos, to_geos};
use crate::geometric::layer::{Feature, GeometryLayer};

/// Segments per quarter circle when approximating round buffer edges
pub const BUFFER_QUADRANT_SEGMENTS: i32 = 32;

/// A single point or line used as the origin of a buffer
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGeometry {
    geometry: Geometry<f64>,
    crs: Crs,
}

impl ReferenceGeometry {
    /// Wrap a point or line geometry; areas are rejected
    pub fn new(geometry: impl Into<Geometry<f64>>, crs: Crs) -> Result<Self> {
        let geometry = geometry.into();
        if !is_point_or_line(&geometry) {
            return Err(Error::invalid_parameter(
                "reference",
                format!("a {} cannot be a buffer reference", geometry_kind(&geometry)),
            ));
        }
        Ok(ReferenceGeometry { geometry, crs })
    }

    pub fn point(x: f64, y: f64, crs: Crs) -> Self {
        ReferenceGeometry {
            geometry: Point::new(x, y).into(),
            crs,
        }
    }

    /// Take feature `index` of `layer` as the reference.
    ///
    /// A whole layer is never used as a reference geometry.
    pub fn from_layer(layer: &GeometryLayer, index: usize) -> Result<Self> {
        let feature = layer.features().get(index).ok_or_else(|| {
            Error::schema(
                layer.name(),
                format!("no feature at index {} ({} features)", index, layer.len()),
            )
        })?;
        if !is_point_or_line(&feature.geometry) {
            return Err(Error::schema(
                layer.name(),
                format!(
                    "feature {} is a {}; a buffer reference must be a point or a line",
                    index,
                    geometry_kind(&feature.geometry)
                ),
            ));
        }
        Ok(ReferenceGeometry {
            geometry: feature.geometry.clone(),
            crs: layer.crs(),
        })
    }

    pub fn geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }
}

/// Region within a fixed distance of a reference geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    area: MultiPolygon<f64>,
    crs: Crs,
    radius: f64,
}

impl Buffer {
    pub fn area(&self) -> &MultiPolygon<f64> {
        &self.area
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Radius in the linear unit of `crs`
    pub fn radius(&self) -> f64 {
        self.radius
    }

    fn prepared(&self) -> Result<geos::Geometry> {
        to_geos(&Geometry::MultiPolygon(self.area.clone()))
    }
}

/// Build the disk of `radius` around `reference`, in the reference's CRS.
///
/// Rejects degree-based references and lengths that cannot be expressed in
/// the reference's linear unit.
pub fn buffer(reference: &ReferenceGeometry, radius: Length) -> Result<Buffer> {
    let crs = reference.crs();
    if crs.is_geographic() {
        return Err(Error::reference_mismatch(
            format!("buffer in {}", crs),
            "buffering needs a projected reference; reproject the reference geometry first",
        ));
    }
    let distance = radius.in_units_of(&crs)?;
    if !distance.is_finite() || distance < 0.0 {
        return Err(Error::invalid_parameter(
            "radius",
            format!("must be a finite, non-negative length, got {}", radius),
        ));
    }

    let geos_reference = to_geos(reference.geometry())?;
    let buffered = geos_reference
        .buffer(distance, BUFFER_QUADRANT_SEGMENTS)
        .map_err(|e| Error::geometry("buffer", e))?;

    let area = match from_geos(buffered)? {
        None => MultiPolygon(vec![]),
        Some(Geometry::Polygon(p)) => MultiPolygon(vec![p]),
        Some(Geometry::MultiPolygon(mp)) => mp,
        Some(other) => {
            return Err(Error::geometry(
                "buffer",
                format!("expected a polygonal result, got {}", geometry_kind(&other)),
            ))
        }
    };
    debug!(radius = distance, %crs, "buffer built");

    Ok(Buffer {
        area,
        crs,
        radius: distance,
    })
}

fn is_point_or_line(geometry: &Geometry<f64>) -> bool {
    matches!(
        geometry,
        Geometry::Point(_)
            | Geometry::MultiPoint(_)
            | Geometry::Line(_)
            | Geometry::LineString(_)
            | Geometry::MultiLineString(_)
    )
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Spatial predicate evaluated between a buffer and each target feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    /// Feature lies entirely within the buffer
    #[default]
    #[serde(alias = "contains", alias = "within")]
    Contained,
    /// Feature overlaps the buffer at all
    #[serde(alias = "intersect", alias = "overlaps")]
    Intersects,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Contained => f.write_str("contained"),
            Predicate::Intersects => f.write_str("intersects"),
        }
    }
}

/// Outcome of a buffer query, aligned index-for-index with the target layer
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    predicate: Predicate,
    mask: Vec<bool>,
}

impl QueryResult {
    pub fn predicate(&self) -> Predicate {
        self.predicate
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    /// Number of features satisfying the predicate
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|hit| **hit).count()
    }

    pub fn matching_indices(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, hit)| hit.then_some(i))
            .collect()
    }

    fn matching<'a>(&'a self, target: &'a GeometryLayer) -> Result<impl Iterator<Item = &'a Feature>> {
        if target.len() != self.mask.len() {
            return Err(Error::schema(
                target.name(),
                format!(
                    "query result has {} entries but the layer has {} features",
                    self.mask.len(),
                    target.len()
                ),
            ));
        }
        Ok(target
            .iter()
            .zip(self.mask.iter())
            .filter_map(|(f, hit)| hit.then_some(f)))
    }

    /// Sum of numeric `field` over matching features.
    ///
    /// Null values count as zero; any other non-numeric value is a `SchemaError`.
    pub fn sum_attribute(&self, target: &GeometryLayer, field: &str) -> Result<f64> {
        target.require_field(field)?;
        let mut total = 0.0;
        for feature in self.matching(target)? {
            match feature.attribute(field) {
                None => {}
                Some(value) if value.is_null() => {}
                Some(value) => {
                    total += value.as_f64().ok_or_else(|| {
                        Error::schema(
                            target.name(),
                            format!("field `{}` is not numeric (value `{}`)", field, value),
                        )
                    })?;
                }
            }
        }
        Ok(total)
    }

    /// Total planar area of matching features, in squared CRS units
    pub fn sum_area(&self, target: &GeometryLayer) -> Result<f64> {
        Ok(self
            .matching(target)?
            .map(|f| f.geometry.unsigned_area())
            .sum())
    }
}

/// Which features of `target` lie fully inside `buffer`
pub fn contained_by(buffer: &Buffer, target: &GeometryLayer) -> Result<QueryResult> {
    evaluate(buffer, target, Predicate::Contained)
}

/// Which features of `target` overlap `buffer` at all
pub fn intersects(buffer: &Buffer, target: &GeometryLayer) -> Result<QueryResult> {
    evaluate(buffer, target, Predicate::Intersects)
}

/// Evaluate `predicate` for every feature of `target`, preserving order
pub fn evaluate(buffer: &Buffer, target: &GeometryLayer, predicate: Predicate) -> Result<QueryResult> {
    buffer
        .crs()
        .ensure_same(&target.crs(), &format!("query against `{}`", target.name()))?;

    // A zero radius around a point leaves nothing to contain or touch
    if buffer.area().0.is_empty() {
        return Ok(QueryResult {
            predicate,
            mask: vec![false; target.len()],
        });
    }

    let area = buffer.prepared()?;
    let prepared = area
        .to_prepared_geom()
        .map_err(|e| Error::geometry("prepare buffer", e))?;

    let mut mask = Vec::with_capacity(target.len());
    for feature in target.iter() {
        let geometry = to_geos(&feature.geometry)?;
        let hit = match predicate {
            Predicate::Contained => prepared.contains(&geometry),
            Predicate::Intersects => prepared.intersects(&geometry),
        }
        .map_err(|e| Error::geometry(predicate.to_string(), e))?;
        mask.push(hit);
    }

    if mask.len() != target.len() {
        return Err(Error::geometry(
            predicate.to_string(),
            "result is not aligned with the target layer",
        ));
    }

    let result = QueryResult { predicate, mask };
    info!(
        target = target.name(),
        %predicate,
        matches = result.count(),
        total = result.len(),
        "buffer query evaluated"
    );
    Ok(result)
}
