use geo::{Coord, Geometry, LineString, Polygon as GeoPolygon};
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::{
    BitMapBackend, Cartesian2d, ChartBuilder, ChartContext, Circle, DrawingArea, EmptyElement,
    IntoDrawingArea, IntoFont, PathElement, Polygon, Rectangle, ShapeStyle, Text, BLACK, WHITE,
};
use plotters::style::{Color as _, FontTransform, RGBAColor, TextStyle};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::render::legend::Legend;
use crate::render::scale_bar::ScaleBar;
use crate::render::style::{viridis, Color, Marker, MarkerShape, Style};
use crate::render::view::{ColorBar, DrawItem, LabelSet, MapView, StyledLayer};

/// Largest side, in pixels, a figure may have
const MAX_SIDE_PX: u32 = 20_000;
const METRES_PER_INCH: f64 = 0.0254;

const LABEL_PT: f64 = 8.0;
const LEGEND_TITLE_PT: f64 = 14.0;
const LEGEND_ENTRY_PT: f64 = 12.0;
const TITLE_PT: f64 = 16.0;
const SCALE_OUTLINE_PT: f64 = 9.0;
const SCALE_SEGMENT_PT: f64 = 6.0;

/// Dimensions and resolution of a written image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

type MapChart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;
type Area<'b> = DrawingArea<BitMapBackend<'b>, Shift>;

fn render_err(e: impl Display) -> Error {
    Error::Render(e.to_string())
}

/// Points to pixels at the output resolution
#[derive(Debug, Clone, Copy)]
struct Scale {
    dpi: f64,
}

impl Scale {
    fn px(&self, points: f64) -> f64 {
        points * self.dpi / 72.0
    }

    fn stroke(&self, points: f64) -> u32 {
        self.px(points).round().max(1.0) as u32
    }

    fn font(&self, points: f64) -> TextStyle<'static> {
        ("sans-serif", self.px(points)).into_font().color(&BLACK)
    }
}

fn rgba(color: Color, alpha: f64) -> RGBAColor {
    color.to_rgb().mix(alpha)
}

fn fill_style(color: Color, alpha: f64) -> ShapeStyle {
    ShapeStyle {
        color: rgba(color, alpha),
        filled: true,
        stroke_width: 0,
    }
}

fn stroke_style(color: Color, alpha: f64, width: u32) -> ShapeStyle {
    ShapeStyle {
        color: rgba(color, alpha),
        filled: false,
        stroke_width: width,
    }
}

pub(crate) fn render(view: &MapView<'_>, destination: &Path, dpi: u32) -> Result<RenderedImage> {
    let (bytes, mut image) = rasterize(view, dpi)?;
    std::fs::write(destination, &bytes).map_err(|source| Error::Io {
        path: destination.to_path_buf(),
        source,
    })?;
    info!(
        path = %destination.display(),
        width = image.width,
        height = image.height,
        dpi,
        "wrote map"
    );
    image.path = Some(destination.to_path_buf());
    Ok(image)
}

/// Draw the whole view into memory and encode it as PNG
pub(crate) fn rasterize(view: &MapView<'_>, dpi: u32) -> Result<(Vec<u8>, RenderedImage)> {
    if dpi == 0 {
        return Err(Error::invalid_parameter("dpi", "must be positive"));
    }
    let (width_in, height_in) = view.figure_inches;
    let width = (width_in * dpi as f64).round() as u32;
    let height = (height_in * dpi as f64).round() as u32;
    if width == 0 || height == 0 || width > MAX_SIDE_PX || height > MAX_SIDE_PX {
        return Err(Error::invalid_parameter(
            "figure size",
            format!("{} x {} px at {} dpi", width, height, dpi),
        ));
    }

    let scale = Scale { dpi: dpi as f64 };
    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;
        draw_figure(view, &root, scale)?;
        root.present().map_err(render_err)?;
    }

    let bytes = encode_png(&pixels, width, height, dpi)?;
    debug!(width, height, dpi, bytes = bytes.len(), "encoded map");
    Ok((
        bytes,
        RenderedImage {
            path: None,
            width,
            height,
            dpi,
        },
    ))
}

fn encode_png(pixels: &[u8], width: u32, height: u32, dpi: u32) -> Result<Vec<u8>> {
    let per_metre = (dpi as f64 / METRES_PER_INCH).round() as u32;
    let mut bytes = Vec::new();
    let mut encoder = png::Encoder::new(&mut bytes, width, height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_pixel_dims(Some(png::PixelDimensions {
        xppu: per_metre,
        yppu: per_metre,
        unit: png::Unit::Meter,
    }));
    let mut writer = encoder.write_header().map_err(render_err)?;
    writer.write_image_data(pixels).map_err(render_err)?;
    writer.finish().map_err(render_err)?;
    Ok(bytes)
}

fn draw_figure(view: &MapView<'_>, root: &Area<'_>, scale: Scale) -> Result<()> {
    let body = match &view.title {
        Some(title) => root
            .titled(title, scale.font(TITLE_PT))
            .map_err(render_err)?,
        None => root.clone(),
    };

    let (body_w, _) = body.dim_in_pixel();
    let (map_slot, bar_slot) = match &view.color_bar {
        Some(_) => {
            let (left, right) = body.split_horizontally((body_w as f64 * 0.86) as i32);
            (left, Some(right))
        }
        None => (body, None),
    };

    let map_area = letterbox(&map_slot, view.extent().width() / view.extent().height());
    let extent = *view.extent();
    let mut chart = ChartBuilder::on(&map_area)
        .build_cartesian_2d(extent.min_x..extent.max_x, extent.min_y..extent.max_y)
        .map_err(render_err)?;

    for item in &view.items {
        match item {
            DrawItem::Layer(styled) => draw_layer(&mut chart, styled, scale)?,
            DrawItem::Labels(labels) => draw_labels(&mut chart, labels, scale)?,
        }
    }
    if let Some(bar) = &view.scale_bar {
        draw_scale_bar(&mut chart, bar, scale)?;
    }

    let (w, h) = map_area.dim_in_pixel();
    map_area
        .draw(&Rectangle::new(
            [(0, 0), (w as i32 - 1, h as i32 - 1)],
            stroke_style(Color::BLACK, 1.0, scale.stroke(1.0)),
        ))
        .map_err(render_err)?;

    if let Some(legend) = &view.legend {
        draw_legend(&map_area, legend, scale)?;
    }
    if let (Some(bar), Some(slot)) = (&view.color_bar, bar_slot) {
        draw_color_bar(&slot, bar, scale)?;
    }
    Ok(())
}

/// Largest centred sub-area with width / height == `ratio`
fn letterbox<'b>(area: &Area<'b>, ratio: f64) -> Area<'b> {
    let (w, h) = area.dim_in_pixel();
    let (w, h) = (w as f64, h as f64);
    let (mw, mh) = if w / h > ratio { (h * ratio, h) } else { (w, w / ratio) };
    let dx = ((w - mw) / 2.0).floor() as i32;
    let dy = ((h - mh) / 2.0).floor() as i32;
    area.margin(dy, dy, dx, dx)
}

fn ring(line: &LineString<f64>) -> Vec<(f64, f64)> {
    line.coords().map(|c| (c.x, c.y)).collect()
}

fn draw_layer(chart: &mut MapChart<'_, '_>, styled: &StyledLayer<'_>, scale: Scale) -> Result<()> {
    let style = &styled.style;
    for feature in styled.layer.iter() {
        let fill = styled.fill.color_for(feature);
        draw_geometry(chart, &feature.geometry, style, fill, scale)?;
    }
    debug!(layer = styled.layer.name(), "drew layer");
    Ok(())
}

fn draw_geometry(
    chart: &mut MapChart<'_, '_>,
    geometry: &Geometry<f64>,
    style: &Style,
    fill: Option<Color>,
    scale: Scale,
) -> Result<()> {
    match geometry {
        Geometry::Point(p) => draw_marker(chart, p.0, &style.marker_or_default(), scale),
        Geometry::MultiPoint(mp) => mp
            .iter()
            .try_for_each(|p| draw_marker(chart, p.0, &style.marker_or_default(), scale)),
        Geometry::Line(l) => draw_path(chart, vec![(l.start.x, l.start.y), (l.end.x, l.end.y)], style, scale),
        Geometry::LineString(ls) => draw_path(chart, ring(ls), style, scale),
        Geometry::MultiLineString(mls) => mls
            .iter()
            .try_for_each(|ls| draw_path(chart, ring(ls), style, scale)),
        Geometry::Polygon(p) => draw_polygon(chart, p, style, fill, scale),
        Geometry::MultiPolygon(mp) => mp
            .iter()
            .try_for_each(|p| draw_polygon(chart, p, style, fill, scale)),
        Geometry::Rect(r) => draw_polygon(chart, &r.to_polygon(), style, fill, scale),
        Geometry::Triangle(t) => draw_polygon(chart, &t.to_polygon(), style, fill, scale),
        Geometry::GeometryCollection(gc) => gc
            .iter()
            .try_for_each(|g| draw_geometry(chart, g, style, fill, scale)),
    }
}

fn draw_path(
    chart: &mut MapChart<'_, '_>,
    points: Vec<(f64, f64)>,
    style: &Style,
    scale: Scale,
) -> Result<()> {
    let stroke = stroke_style(style.stroke_color(), style.alpha, scale.stroke(style.line_width));
    chart
        .draw_series(std::iter::once(PathElement::new(points, stroke)))
        .map_err(render_err)?;
    Ok(())
}

/// Exterior ring followed by every interior ring, each bridged back to the
/// exterior's first vertex. The rasterizer fills scanline spans pairwise, so
/// the doubled bridge edges cancel and the holes stay empty.
fn keyhole_ring(polygon: &GeoPolygon<f64>) -> Vec<(f64, f64)> {
    let mut points = ring(polygon.exterior());
    let Some(&start) = points.first() else {
        return points;
    };
    for interior in polygon.interiors() {
        if interior.0.is_empty() {
            continue;
        }
        points.extend(ring(interior));
        points.push(start);
    }
    points
}

fn draw_polygon(
    chart: &mut MapChart<'_, '_>,
    polygon: &GeoPolygon<f64>,
    style: &Style,
    fill: Option<Color>,
    scale: Scale,
) -> Result<()> {
    if let Some(color) = fill {
        chart
            .draw_series(std::iter::once(Polygon::new(
                keyhole_ring(polygon),
                fill_style(color, style.alpha),
            )))
            .map_err(render_err)?;
    }
    if let Some(edge) = style.edge {
        let stroke = stroke_style(edge, 1.0, scale.stroke(style.line_width));
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());
        chart
            .draw_series(rings.map(|r| PathElement::new(ring(r), stroke)))
            .map_err(render_err)?;
    }
    Ok(())
}

/// Outline of a marker around the origin, pixel y pointing down
fn marker_outline(shape: MarkerShape, r: i32) -> Vec<(i32, i32)> {
    match shape {
        MarkerShape::Circle => Vec::new(),
        MarkerShape::Square => vec![(-r, -r), (r, -r), (r, r), (-r, r)],
        // matplotlib's thin diamond
        MarkerShape::Diamond => {
            let half = ((r as f64) * 0.6).round().max(1.0) as i32;
            vec![(0, -r), (half, 0), (0, r), (-half, 0)]
        }
        MarkerShape::Star => (0..10)
            .map(|i| {
                let radius = if i % 2 == 0 { r as f64 } else { r as f64 * 0.4 };
                let angle = std::f64::consts::PI * (i as f64) / 5.0;
                (
                    (radius * angle.sin()).round() as i32,
                    (-radius * angle.cos()).round() as i32,
                )
            })
            .collect(),
    }
}

fn draw_marker(
    chart: &mut MapChart<'_, '_>,
    at: Coord<f64>,
    marker: &Marker,
    scale: Scale,
) -> Result<()> {
    let r = (scale.px(marker.size) / 2.0).round().max(1.0) as i32;
    let style = fill_style(marker.color, 1.0);
    let anchor = (at.x, at.y);
    let drawn = match marker.shape {
        MarkerShape::Circle => chart
            .draw_series(std::iter::once(
                EmptyElement::at(anchor) + Circle::new((0, 0), r, style),
            ))
            .map(|_| ()),
        shape => chart
            .draw_series(std::iter::once(
                EmptyElement::at(anchor) + Polygon::new(marker_outline(shape, r), style),
            ))
            .map(|_| ()),
    };
    drawn.map_err(render_err)
}

fn draw_labels(chart: &mut MapChart<'_, '_>, labels: &LabelSet, scale: Scale) -> Result<()> {
    let marker = labels.style.marker_or_default();
    let offset = (scale.px(marker.size) / 2.0 + scale.px(2.0)).round() as i32;
    for (at, text) in &labels.points {
        draw_marker(chart, *at, &marker, scale)?;
        if text.is_empty() {
            continue;
        }
        chart
            .draw_series(std::iter::once(
                EmptyElement::at((at.x, at.y))
                    + Text::new(text.clone(), (offset, -offset), scale.font(LABEL_PT)),
            ))
            .map_err(render_err)?;
    }
    Ok(())
}

fn draw_scale_bar(chart: &mut MapChart<'_, '_>, bar: &ScaleBar, scale: Scale) -> Result<()> {
    let outline = &bar.outline;
    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(outline.start.x, outline.start.y), (outline.end.x, outline.end.y)],
            stroke_style(outline.color, 1.0, scale.stroke(SCALE_OUTLINE_PT)),
        )))
        .map_err(render_err)?;
    chart
        .draw_series(bar.segments.iter().map(|s| {
            PathElement::new(
                vec![(s.start.x, s.start.y), (s.end.x, s.end.y)],
                stroke_style(s.color, 1.0, scale.stroke(SCALE_SEGMENT_PT)),
            )
        }))
        .map_err(render_err)?;
    chart
        .draw_series(bar.labels.iter().map(|l| {
            Text::new(
                l.text.clone(),
                (l.position.x, l.position.y),
                scale.font(LABEL_PT),
            )
        }))
        .map_err(render_err)?;
    Ok(())
}

fn estimate_text_px(text: &str, font_px: f64) -> f64 {
    text.chars().count() as f64 * font_px * 0.55
}

fn draw_legend(area: &Area<'_>, legend: &Legend, scale: Scale) -> Result<()> {
    let title_px = scale.px(LEGEND_TITLE_PT);
    let entry_px = scale.px(LEGEND_ENTRY_PT);
    let pad = entry_px * 0.5;
    let row = entry_px * 1.4;
    let swatch_w = entry_px * 1.6;
    let swatch_h = entry_px * 0.8;

    let widest_label = legend
        .handles
        .iter()
        .map(|h| estimate_text_px(&h.label, entry_px))
        .fold(0.0, f64::max);
    let width = (swatch_w + pad + widest_label).max(estimate_text_px(&legend.title, title_px))
        + 2.0 * pad;
    let height = title_px * 1.4 + row * legend.handles.len() as f64 + pad;

    let x0 = pad.round() as i32;
    let y0 = pad.round() as i32;
    let x1 = (pad + width).round() as i32;
    let y1 = (pad + height).round() as i32;
    area.draw(&Rectangle::new([(x0, y0), (x1, y1)], fill_style(Color::WHITE, 1.0)))
        .map_err(render_err)?;
    area.draw(&Rectangle::new(
        [(x0, y0), (x1, y1)],
        stroke_style(Color::BLACK, 1.0, scale.stroke(0.8)),
    ))
    .map_err(render_err)?;

    let title_x = x0 + ((width - estimate_text_px(&legend.title, title_px)) / 2.0).round() as i32;
    area.draw(&Text::new(
        legend.title.clone(),
        (title_x, y0 + (pad * 0.5).round() as i32),
        scale.font(LEGEND_TITLE_PT),
    ))
    .map_err(render_err)?;

    for (i, handle) in legend.handles.iter().enumerate() {
        let top = y0 as f64 + title_px * 1.4 + row * i as f64;
        let sx0 = (x0 as f64 + pad).round() as i32;
        let sy0 = (top + (row - swatch_h) / 2.0).round() as i32;
        let sx1 = (x0 as f64 + pad + swatch_w).round() as i32;
        let sy1 = sy0 + swatch_h.round() as i32;
        area.draw(&Rectangle::new(
            [(sx0, sy0), (sx1, sy1)],
            fill_style(handle.fill, handle.alpha),
        ))
        .map_err(render_err)?;
        area.draw(&Rectangle::new(
            [(sx0, sy0), (sx1, sy1)],
            stroke_style(handle.edge, 1.0, scale.stroke(0.8)),
        ))
        .map_err(render_err)?;
        area.draw(&Text::new(
            handle.label.clone(),
            (sx1 + pad.round() as i32, sy0),
            scale.font(LEGEND_ENTRY_PT),
        ))
        .map_err(render_err)?;
    }
    Ok(())
}

fn format_tick(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{:.1}", value)
    }
}

fn draw_color_bar(area: &Area<'_>, bar: &ColorBar, scale: Scale) -> Result<()> {
    const STEPS: usize = 128;
    let (w, h) = area.dim_in_pixel();
    let (w, h) = (w as f64, h as f64);
    let x0 = (w * 0.1).round() as i32;
    let x1 = (w * 0.3).round() as i32;
    let top = h * 0.1;
    let bottom = h * 0.9;
    let step = (bottom - top) / STEPS as f64;

    for i in 0..STEPS {
        let t = (i as f64 + 0.5) / STEPS as f64;
        let y_hi = (bottom - step * (i + 1) as f64).floor() as i32;
        let y_lo = (bottom - step * i as f64).ceil() as i32;
        area.draw(&Rectangle::new(
            [(x0, y_hi), (x1, y_lo)],
            fill_style(viridis(t), 1.0),
        ))
        .map_err(render_err)?;
    }
    area.draw(&Rectangle::new(
        [(x0, top.round() as i32), (x1, bottom.round() as i32)],
        stroke_style(Color::BLACK, 1.0, scale.stroke(0.8)),
    ))
    .map_err(render_err)?;

    let font_px = scale.px(LABEL_PT);
    for fraction in [0.0, 0.5, 1.0] {
        let value = bar.vmin + (bar.vmax - bar.vmin) * fraction;
        let y = (bottom - (bottom - top) * fraction - font_px / 2.0).round() as i32;
        area.draw(&Text::new(
            format_tick(value),
            (x1 + scale.px(3.0).round() as i32, y),
            scale.font(LABEL_PT),
        ))
        .map_err(render_err)?;
    }

    if let Some(label) = &bar.label {
        let x = (w * 0.75).round() as i32;
        let y = ((top + bottom) / 2.0 - estimate_text_px(label, font_px) / 2.0).round() as i32;
        let style = ("sans-serif", font_px)
            .into_font()
            .transform(FontTransform::Rotate90)
            .color(&BLACK);
        area.draw(&Text::new(label.clone(), (x, y), style))
            .map_err(render_err)?;
    }
    Ok(())
}
