use geo::Coord;
use proj::Proj;
use tracing::debug;

use crate::commons::format_distance;
use crate::error::{Error, Result};
use crate::geo_core::{BoundingBox, Crs, Reprojector};
use crate::render::style::Color;

pub const DEFAULT_ANCHOR: (f64, f64) = (0.9, 0.03);
pub const DEFAULT_SEGMENTS: [f64; 3] = [5000.0, 10000.0, 20000.0];

/// A metric frame in which distances near the view read true
pub trait LocalFrame {
    fn to_local(&self, coord: Coord<f64>) -> Result<Coord<f64>>;
    fn from_local(&self, coord: Coord<f64>) -> Result<Coord<f64>>;
}

/// The view's own coordinates used as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarFrame;

impl LocalFrame for PlanarFrame {
    fn to_local(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        Ok(coord)
    }

    fn from_local(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        Ok(coord)
    }
}

/// Transverse Mercator tangent at the centre of an extent, scale factor 1
pub struct TransverseMercatorFrame {
    forward: Proj,
    inverse: Proj,
}

impl TransverseMercatorFrame {
    pub fn centred_on(crs: Crs, extent: &BoundingBox) -> Result<Self> {
        let centre = if crs.is_geographic() {
            extent.center()
        } else {
            Reprojector::new(crs, Crs::wgs84())?.convert(extent.center())?
        };
        let definition = format!(
            "+proj=tmerc +lat_0={:.6} +lon_0={:.6} +k=1 +x_0=0 +y_0=0 +ellps=WGS84 +units=m +no_defs",
            centre.y, centre.x
        );
        debug!(%definition, "local scale-bar frame");
        Ok(TransverseMercatorFrame {
            forward: Reprojector::to_definition(crs, &definition)?,
            inverse: Reprojector::from_definition(&definition, crs)?,
        })
    }
}

impl LocalFrame for TransverseMercatorFrame {
    fn to_local(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let (x, y) = self
            .forward
            .convert((coord.x, coord.y))
            .map_err(|e| Error::geometry("project to local frame", e))?;
        Ok(Coord { x, y })
    }

    fn from_local(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let (x, y) = self
            .inverse
            .convert((coord.x, coord.y))
            .map_err(|e| Error::geometry("project from local frame", e))?;
        Ok(Coord { x, y })
    }
}

/// A stretch of the bar, in view coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct BarSegment {
    pub start: Coord<f64>,
    pub end: Coord<f64>,
    pub color: Color,
}

/// A distance label, in view coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct BarLabel {
    pub position: Coord<f64>,
    pub text: String,
}

/// Scale bar laid out in view coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleBar {
    /// Full-length backing bar, drawn wider than the segments
    pub outline: BarSegment,
    pub segments: Vec<BarSegment>,
    pub labels: Vec<BarLabel>,
}

/// Lay out a scale bar whose right end sits at `anchor` (fractions of the
/// visible extent measured in the local frame).
///
/// The bar spans the longest length leftwards from the anchor. Each length
/// marks a boundary measured from the left end, segments alternate black
/// and white ending black at the anchor, and each boundary is labelled with
/// its distance, the shortest one compactly.
pub fn layout_scale_bar(
    frame: &dyn LocalFrame,
    extent: &BoundingBox,
    anchor: (f64, f64),
    lengths: &[f64],
) -> Result<ScaleBar> {
    if !(0.0..=1.0).contains(&anchor.0) || !(0.0..=1.0).contains(&anchor.1) {
        return Err(Error::invalid_parameter(
            "anchor",
            format!("({}, {}) is outside the unit square", anchor.0, anchor.1),
        ));
    }
    if lengths.is_empty() {
        return Err(Error::invalid_parameter("segments", "no segment lengths"));
    }
    if let Some(bad) = lengths.iter().find(|l| !l.is_finite() || **l <= 0.0) {
        return Err(Error::invalid_parameter(
            "segments",
            format!("segment length {} must be positive", bad),
        ));
    }
    let mut lengths = lengths.to_vec();
    lengths.sort_by(|a, b| a.total_cmp(b));
    lengths.dedup();

    let mut local: Option<BoundingBox> = None;
    for corner in extent.corners() {
        let c = frame.to_local(corner)?;
        let b = BoundingBox::new(c.x, c.y, c.x, c.y);
        local = Some(local.map_or(b, |acc| acc.union(&b)));
    }
    let local = local.ok_or_else(|| Error::geometry("scale bar", "empty extent"))?;

    let sbx = local.min_x + local.width() * anchor.0;
    let sby = local.min_y + local.height() * anchor.1;
    let longest = lengths[lengths.len() - 1];
    let left = sbx - longest;
    let label_offset = longest * 0.2;

    let at = |x: f64, y: f64| frame.from_local(Coord { x, y });

    let outline = BarSegment {
        start: at(left, sby)?,
        end: at(sbx, sby)?,
        color: Color::BLACK,
    };

    let mut segments = Vec::with_capacity(lengths.len());
    let mut previous = 0.0;
    for (i, length) in lengths.iter().enumerate() {
        let from_right = lengths.len() - 1 - i;
        segments.push(BarSegment {
            start: at(left + previous, sby)?,
            end: at(left + length, sby)?,
            color: if from_right % 2 == 0 {
                Color::BLACK
            } else {
                Color::WHITE
            },
        });
        previous = *length;
    }

    let labels = lengths
        .iter()
        .enumerate()
        .map(|(i, length)| {
            Ok(BarLabel {
                position: at(left + length, sby - label_offset)?,
                text: format_distance(*length, i == 0),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ScaleBar {
        outline,
        segments,
        labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fifty_km() -> BoundingBox {
        BoundingBox::new(250_000.0, 400_000.0, 300_000.0, 450_000.0)
    }

    #[test]
    fn test_default_scale_bar_labels() {
        let bar = layout_scale_bar(&PlanarFrame, &fifty_km(), DEFAULT_ANCHOR, &DEFAULT_SEGMENTS)
            .unwrap();
        let texts: Vec<&str> = bar.labels.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["5km", "10 km", "20 km"]);
        assert_eq!(bar.segments.len(), 3);
    }

    #[test]
    fn test_scale_bar_geometry() {
        let bar = layout_scale_bar(&PlanarFrame, &fifty_km(), DEFAULT_ANCHOR, &DEFAULT_SEGMENTS)
            .unwrap();
        // anchor at 90% across, 3% up
        assert!((bar.outline.end.x - 295_000.0).abs() < 1e-6);
        assert!((bar.outline.end.y - 401_500.0).abs() < 1e-6);
        assert!((bar.outline.start.x - 275_000.0).abs() < 1e-6);

        let expected = [280_000.0, 285_000.0, 295_000.0];
        for (label, x) in bar.labels.iter().zip(expected) {
            assert!((label.position.x - x).abs() < 1e-6);
            assert!(label.position.y < bar.outline.start.y);
        }

        let last = bar.segments.last().unwrap();
        assert_eq!(last.color, Color::BLACK);
        assert_eq!(bar.segments[1].color, Color::WHITE);
        assert!((bar.segments[1].start.x - 280_000.0).abs() < 1e-6);
        assert!((bar.segments[1].end.x - 285_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_unsorted_lengths_are_sorted() {
        let bar = layout_scale_bar(
            &PlanarFrame,
            &fifty_km(),
            DEFAULT_ANCHOR,
            &[20000.0, 5000.0, 10000.0],
        )
        .unwrap();
        assert_eq!(bar.labels[0].text, "5km");
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(layout_scale_bar(&PlanarFrame, &fifty_km(), (1.2, 0.0), &DEFAULT_SEGMENTS).is_err());
        assert!(layout_scale_bar(&PlanarFrame, &fifty_km(), DEFAULT_ANCHOR, &[]).is_err());
        assert!(layout_scale_bar(&PlanarFrame, &fifty_km(), DEFAULT_ANCHOR, &[-5.0]).is_err());
    }

    #[test]
    fn test_transverse_mercator_frame() {
        // Needs a PROJ database; skipped when unavailable
        let grid = Crs::projected_metres(29902);
        if let Ok(frame) = TransverseMercatorFrame::centred_on(grid, &fifty_km()) {
            let centre = fifty_km().center();
            let local = frame.to_local(centre).unwrap();
            assert!(local.x.abs() < 1.0 && local.y.abs() < 1.0);
            let back = frame.from_local(local).unwrap();
            assert!((back.x - centre.x).abs() < 1e-3);

            let bar =
                layout_scale_bar(&frame, &fifty_km(), DEFAULT_ANCHOR, &DEFAULT_SEGMENTS).unwrap();
            let drawn = bar.outline.end.x - bar.outline.start.x;
            // Irish Grid scale is close to 1 here
            assert!((drawn - 20_000.0).abs() < 100.0);
        }
    }
}
