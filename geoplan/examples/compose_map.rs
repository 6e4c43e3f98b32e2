// Example: composing a map view by hand
// Layers, legend and scale bar are added one at a time, then rendered once.
use anyhow::Result;
use geo::{line_string, point, polygon};
use geoplan::geo_core::{BoundingBox, Crs};
use geoplan::geometric::{Feature, GeometryLayer};
use geoplan::render::{create_view, generate_handles, Color, MarkerShape, Style};

fn main() -> Result<()> {
    println!("=== Example: composing a study-area map ===\n");

    let grid = Crs::projected_metres(29902);

    let study_area = GeometryLayer::new(
        "study_area",
        grid,
        vec![Feature::new(polygon![
            (x: 262_000.0, y: 425_000.0),
            (x: 282_000.0, y: 425_000.0),
            (x: 282_000.0, y: 445_000.0),
            (x: 262_000.0, y: 445_000.0),
        ])],
    );
    let roads = GeometryLayer::new(
        "roads",
        grid,
        vec![Feature::new(line_string![
            (x: 262_000.0, y: 430_000.0),
            (x: 270_000.0, y: 434_000.0),
            (x: 282_000.0, y: 436_000.0),
        ])],
    );
    let towns = GeometryLayer::new(
        "towns",
        grid,
        vec![
            Feature::new(point!(x: 267_500.0, y: 432_500.0)).with_attribute("NAME", "LIMAVADY"),
            Feature::new(point!(x: 276_000.0, y: 441_000.0)).with_attribute("NAME", "CASTLEROCK"),
        ],
    );

    let purple = Color::parse("purple")?;
    let cyan = Color::parse("c")?;
    let extent = study_area
        .bounds()
        .map(|b| b.padded(5_000.0))
        .unwrap_or(BoundingBox::new(250_000.0, 420_000.0, 300_000.0, 450_000.0));

    let handles = generate_handles(&["Study area", "Towns"], &[purple, cyan], Color::BLACK, 1.0)?;
    let view = create_view(grid, extent)?
        .with_title("Binevenagh")
        .add_layer(&study_area, Style::filled(purple, Color::BLACK).with_alpha(0.4))?
        .add_layer(&roads, Style::line(Color::parse("grey")?, 1.0))?
        .add_labeled_points(&towns, "NAME", Style::markers(MarkerShape::Diamond, cyan))?
        .add_legend("Legend", handles)
        .add_scale_bar((0.9, 0.03), &[5_000.0, 10_000.0, 20_000.0])?;

    let image = view.render(std::path::Path::new("study_area.png"), 150)?;
    println!(
        "Map written: {} x {} px at {} dpi",
        image.width, image.height, image.dpi
    );
    Ok(())
}
