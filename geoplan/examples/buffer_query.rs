// Example: buffer query around the track centre
// Builds land cover polygons in memory, buffers a point by 1 km and compares
// full containment with any overlap.
use anyhow::Result;
use geo::polygon;
use geoplan::geo_core::{Crs, Length};
use geoplan::geometric::{buffer, contained_by, intersects, Feature, GeometryLayer, ReferenceGeometry};

fn main() -> Result<()> {
    println!("=== Example: buffer containment on Irish Grid ===\n");

    let grid = Crs::projected_metres(29902);
    let square = |x: f64, y: f64, side: f64| {
        polygon![
            (x: x, y: y),
            (x: x + side, y: y),
            (x: x + side, y: y + side),
            (x: x, y: y + side),
        ]
    };

    let landcover = GeometryLayer::new(
        "landcover",
        grid,
        vec![
            Feature::new(square(24_200.0, 433_400.0, 300.0)).with_attribute("BHSUB", "B1"),
            Feature::new(square(25_100.0, 433_500.0, 400.0)).with_attribute("BHSUB", "C3"),
            Feature::new(square(27_000.0, 436_000.0, 200.0)).with_attribute("BHSUB", "H1"),
        ],
    );

    let track = ReferenceGeometry::point(24_400.0, 433_580.0, grid);
    let zone = buffer(&track, Length::metres(1000.0))?;
    println!("Buffer radius: {} m", zone.radius());

    let contained = contained_by(&zone, &landcover)?;
    let overlapping = intersects(&zone, &landcover)?;

    println!("Contained:   {:?} ({} features)", contained.mask(), contained.count());
    println!("Overlapping: {:?} ({} features)", overlapping.mask(), overlapping.count());
    println!(
        "Area contained: {:.0} m2, overlapping: {:.0} m2",
        contained.sum_area(&landcover)?,
        overlapping.sum_area(&landcover)?
    );

    Ok(())
}
