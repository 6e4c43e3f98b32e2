use geo::Geometry;
use geos::{Geom, Geometry as GeosGeometry};

use crate::error::{Error, Result};

/// Convert a geo geometry for GEOS operations
pub(crate) fn to_geos(geometry: &Geometry<f64>) -> Result<GeosGeometry> {
    geometry
        .clone()
        .try_into()
        .map_err(|e: geos::Error| Error::geometry("convert to GEOS", e))
}

/// Convert a GEOS result back, `None` when it is empty
pub(crate) fn from_geos(geometry: GeosGeometry) -> Result<Option<Geometry<f64>>> {
    if geometry
        .is_empty()
        .map_err(|e| Error::geometry("inspect GEOS result", e))?
    {
        return Ok(None);
    }
    let converted: Geometry<f64> = geometry
        .try_into()
        .map_err(|e: geos::Error| Error::geometry("convert from GEOS", e))?;
    Ok(Some(converted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon};

    #[test]
    fn test_round_trip_polygon() {
        let poly: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 4.0),
            (x: 0.0, y: 0.0),
        ]
        .into();
        let back = from_geos(to_geos(&poly).unwrap()).unwrap().unwrap();
        assert!(matches!(back, Geometry::Polygon(_)));
    }

    #[test]
    fn test_empty_result_is_none() {
        let a = to_geos(&point!(x: 0.0, y: 0.0).into()).unwrap();
        let b = to_geos(&point!(x: 1.0, y: 1.0).into()).unwrap();
        let empty = a.intersection(&b).unwrap();
        assert!(from_geos(empty).unwrap().is_none());
    }
}
