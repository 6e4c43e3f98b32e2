use geo::{BoundingRect, Coord, Geometry, MapCoords, Rect};
use proj::Proj;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Linear unit of a coordinate reference (or of a distance)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinearUnit {
    #[serde(alias = "m", alias = "meter", alias = "meters", alias = "metres")]
    Metre,
    #[serde(alias = "ft", alias = "feet")]
    Foot,
    #[serde(alias = "deg", alias = "degrees")]
    Degree,
}

impl LinearUnit {
    /// Metres per unit, `None` for angular units
    pub fn metres_per_unit(&self) -> Option<f64> {
        match self {
            LinearUnit::Metre => Some(1.0),
            LinearUnit::Foot => Some(0.3048),
            LinearUnit::Degree => None,
        }
    }

    pub fn is_angular(&self) -> bool {
        self.metres_per_unit().is_none()
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            LinearUnit::Metre => "m",
            LinearUnit::Foot => "ft",
            LinearUnit::Degree => "deg",
        }
    }
}

/// Coordinate reference system, identified by its EPSG code.
///
/// The unit is resolved once, when the reference is created, so that
/// distance-based operations can reject degree-based references without
/// consulting PROJ again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crs {
    epsg: u32,
    unit: LinearUnit,
}

impl Crs {
    pub fn new(epsg: u32, unit: LinearUnit) -> Self {
        Crs { epsg, unit }
    }

    /// Projected reference measured in metres (Irish Grid, ITM, UTM, ...)
    pub fn projected_metres(epsg: u32) -> Self {
        Crs::new(epsg, LinearUnit::Metre)
    }

    /// Geographic reference measured in degrees
    pub fn geographic(epsg: u32) -> Self {
        Crs::new(epsg, LinearUnit::Degree)
    }

    /// WGS 84, the reference RFC 7946 mandates for GeoJSON
    pub fn wgs84() -> Self {
        Crs::geographic(4326)
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    pub fn unit(&self) -> LinearUnit {
        self.unit
    }

    pub fn is_geographic(&self) -> bool {
        self.unit.is_angular()
    }

    /// Authority string understood by PROJ and GDAL
    pub fn authority(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }

    /// Resolve an EPSG code to a reference with a known unit.
    ///
    /// Common references resolve from a built-in table; anything else is
    /// looked up through GDAL. Fails with `ReferenceMismatch` when the code
    /// cannot be resolved; the unit is never guessed.
    pub fn resolve(epsg: u32) -> Result<Self> {
        if let Some(unit) = known_unit(epsg) {
            return Ok(Crs::new(epsg, unit));
        }
        Self::lookup(epsg)
    }

    #[cfg(feature = "gdal")]
    fn lookup(epsg: u32) -> Result<Self> {
        let srs = gdal::spatial_ref::SpatialRef::from_epsg(epsg).map_err(|e| {
            Error::reference_mismatch(format!("EPSG:{}", epsg), format!("cannot resolve: {}", e))
        })?;
        Self::from_spatial_ref(epsg, &srs)
    }

    #[cfg(not(feature = "gdal"))]
    fn lookup(epsg: u32) -> Result<Self> {
        Err(Error::reference_mismatch(
            format!("EPSG:{}", epsg),
            "unknown reference (build with the `gdal` feature to resolve any EPSG code)",
        ))
    }

    #[cfg(feature = "gdal")]
    pub(crate) fn from_spatial_ref(epsg: u32, srs: &gdal::spatial_ref::SpatialRef) -> Result<Self> {
        if srs.is_geographic() {
            return Ok(Crs::geographic(epsg));
        }
        let metres = srs.linear_units();
        let unit = if (metres - 1.0).abs() < 1e-9 {
            LinearUnit::Metre
        } else if (metres - 0.3048).abs() < 1e-5 {
            LinearUnit::Foot
        } else {
            return Err(Error::reference_mismatch(
                format!("EPSG:{}", epsg),
                format!("unsupported linear unit ({} m per unit)", metres),
            ));
        };
        Ok(Crs::new(epsg, unit))
    }

    /// Fail unless `other` is the same reference
    pub fn ensure_same(&self, other: &Crs, context: &str) -> Result<()> {
        if self.epsg != other.epsg {
            return Err(Error::reference_mismatch(
                context,
                format!("expected {}, found {} (reproject first)", self, other),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// References resolved without consulting GDAL
fn known_unit(epsg: u32) -> Option<LinearUnit> {
    match epsg {
        4326 | 4258 | 4269 | 4283 | 4167 | 4188 | 4299 | 4300 => Some(LinearUnit::Degree),
        // Irish Grid variants, ITM, British National Grid, Lambert-93, Web Mercator
        29900..=29903 | 2157 | 27700 | 2154 | 3857 | 3395 => Some(LinearUnit::Metre),
        // WGS 84 / UTM and ETRS89 / UTM zones
        32601..=32660 | 32701..=32760 | 25828..=25838 => Some(LinearUnit::Metre),
        2263 => Some(LinearUnit::Foot),
        _ => None,
    }
}

/// A distance with its unit, e.g. a buffer radius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Length {
    pub value: f64,
    #[serde(default = "default_length_unit")]
    pub unit: LinearUnit,
}

fn default_length_unit() -> LinearUnit {
    LinearUnit::Metre
}

impl Length {
    pub fn new(value: f64, unit: LinearUnit) -> Self {
        Length { value, unit }
    }

    pub fn metres(value: f64) -> Self {
        Length::new(value, LinearUnit::Metre)
    }

    pub fn feet(value: f64) -> Self {
        Length::new(value, LinearUnit::Foot)
    }

    /// Express this length in the linear unit of `crs`.
    ///
    /// Metres and feet convert freely; anything involving degrees is a
    /// `ReferenceMismatch`.
    pub fn in_units_of(&self, crs: &Crs) -> Result<f64> {
        let from = self.unit.metres_per_unit();
        let to = crs.unit().metres_per_unit();
        match (from, to) {
            (Some(from), Some(to)) => Ok(self.value * from / to),
            _ => Err(Error::reference_mismatch(
                format!("distance in {}", crs),
                format!(
                    "a length in {} cannot be applied to a reference measured in {}",
                    self.unit.symbol(),
                    crs.unit().symbol()
                ),
            )),
        }
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit.symbol())
    }
}

/// Transforms coordinates between two references through PROJ.
///
/// Built once per source layer; reprojection happens at load, never per query.
pub struct Reprojector {
    proj: Proj,
}

impl Reprojector {
    pub fn new(from: Crs, to: Crs) -> Result<Self> {
        let proj = Proj::new_known_crs(&from.authority(), &to.authority(), None).map_err(|e| {
            Error::reference_mismatch(format!("{} -> {}", from, to), format!("no transformation: {}", e))
        })?;
        Ok(Reprojector { proj })
    }

    /// Transformation into an arbitrary PROJ definition (used for local frames)
    pub(crate) fn to_definition(from: Crs, definition: &str) -> Result<Proj> {
        Proj::new_known_crs(&from.authority(), definition, None)
            .map_err(|e| Error::geometry("create local projection", e))
    }

    pub(crate) fn from_definition(definition: &str, to: Crs) -> Result<Proj> {
        Proj::new_known_crs(definition, &to.authority(), None)
            .map_err(|e| Error::geometry("create local projection", e))
    }

    pub fn convert(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let (x, y) = self
            .proj
            .convert((coord.x, coord.y))
            .map_err(|e| Error::geometry("reproject", e))?;
        Ok(Coord { x, y })
    }

    pub fn geometry(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
        geometry
            .try_map_coords(|c| {
                self.proj
                    .convert((c.x, c.y))
                    .map(|(x, y)| Coord { x, y })
            })
            .map_err(|e| Error::geometry("reproject", e))
    }
}

/// Axis-aligned extent; every bound is inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    /// Bounds of a geometry, `None` when it is empty
    pub fn of_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        geometry.bounding_rect().map(Self::from_rect)
    }

    pub fn union(&self, other: &BoundingBox) -> Self {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: (self.min_x + self.max_x) / 2.0,
            y: (self.min_y + self.max_y) / 2.0,
        }
    }

    pub fn corners(&self) -> [Coord<f64>; 4] {
        [
            Coord { x: self.min_x, y: self.min_y },
            Coord { x: self.max_x, y: self.min_y },
            Coord { x: self.max_x, y: self.max_y },
            Coord { x: self.min_x, y: self.max_y },
        ]
    }

    /// Finite with a positive width and height
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.width() > 0.0
            && self.height() > 0.0
    }

    pub fn contains(&self, coord: Coord<f64>) -> bool {
        coord.x >= self.min_x && coord.x <= self.max_x && coord.y >= self.min_y && coord.y <= self.max_y
    }

    pub fn padded(&self, amount: f64) -> Self {
        BoundingBox::new(
            self.min_x - amount,
            self.min_y - amount,
            self.max_x + amount,
            self.max_y + amount,
        )
    }

    /// Grow the shorter side around the centre so width / height == `ratio`
    pub fn fit_aspect(&self, ratio: f64) -> Self {
        let c = self.center();
        let (mut w, mut h) = (self.width(), self.height());
        if w / h < ratio {
            w = h * ratio;
        } else {
            h = w / ratio;
        }
        BoundingBox::new(c.x - w / 2.0, c.y - h / 2.0, c.x + w / 2.0, c.y + h / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon};

    #[test]
    fn test_crs_display_and_unit() {
        let grid = Crs::projected_metres(29902);
        assert_eq!(grid.to_string(), "EPSG:29902");
        assert!(!grid.is_geographic());
        assert!(Crs::wgs84().is_geographic());
    }

    #[test]
    fn test_resolve_common_references() {
        assert_eq!(Crs::resolve(29902).unwrap(), Crs::projected_metres(29902));
        assert_eq!(Crs::resolve(4326).unwrap(), Crs::wgs84());
        assert_eq!(Crs::resolve(32629).unwrap().unit(), LinearUnit::Metre);
    }

    #[test]
    fn test_ensure_same() {
        let grid = Crs::projected_metres(29902);
        assert!(grid.ensure_same(&Crs::projected_metres(29902), "test").is_ok());
        let err = grid.ensure_same(&Crs::wgs84(), "add layer").unwrap_err();
        assert!(matches!(err, Error::ReferenceMismatch { .. }));
    }

    #[test]
    fn test_length_conversion() {
        let grid = Crs::projected_metres(29902);
        assert_eq!(Length::metres(1000.0).in_units_of(&grid).unwrap(), 1000.0);
        let feet = Length::feet(1000.0).in_units_of(&grid).unwrap();
        assert!((feet - 304.8).abs() < 1e-9);

        let err = Length::metres(1000.0).in_units_of(&Crs::wgs84()).unwrap_err();
        assert!(matches!(err, Error::ReferenceMismatch { .. }));
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(bbox.min_x, 0.0);
        assert_eq!(bbox.max_x, 1.0);
        assert!(bbox.contains(Coord { x: 1.0, y: 0.0 }));
        assert!(!bbox.contains(Coord { x: 1.0001, y: 0.0 }));
    }

    #[test]
    fn test_bounding_box_of_geometry() {
        let poly: Geometry<f64> = polygon![
            (x: 2.0, y: 1.0),
            (x: 6.0, y: 1.0),
            (x: 6.0, y: 3.0),
            (x: 2.0, y: 1.0),
        ]
        .into();
        let bbox = BoundingBox::of_geometry(&poly).unwrap();
        assert_eq!(bbox, BoundingBox::new(2.0, 1.0, 6.0, 3.0));

        let p: Geometry<f64> = point!(x: 10.0, y: 10.0).into();
        let merged = bbox.union(&BoundingBox::of_geometry(&p).unwrap());
        assert_eq!(merged, BoundingBox::new(2.0, 1.0, 10.0, 10.0));
    }

    #[test]
    fn test_fit_aspect_keeps_center() {
        let bbox = BoundingBox::new(0.0, 0.0, 40.0, 10.0);
        let square = bbox.fit_aspect(1.0);
        assert_eq!(square.width(), 40.0);
        assert_eq!(square.height(), 40.0);
        assert_eq!(square.center(), bbox.center());
    }

    #[test]
    fn test_degenerate_box_is_invalid() {
        assert!(!BoundingBox::new(1.0, 1.0, 1.0, 5.0).is_valid());
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 5.0).is_valid());
    }

    #[test]
    fn test_reproject_to_irish_grid() {
        // Needs the PROJ database; skipped silently when it is not installed
        let Ok(reprojector) = Reprojector::new(Crs::wgs84(), Crs::projected_metres(29902)) else {
            return;
        };
        if let Ok(c) = reprojector.convert(Coord { x: -6.9, y: 55.1 }) {
            assert!(c.x.is_finite());
            assert!(c.y.is_finite());
        }
    }
}
