//! One run of a theme: load every layer, evaluate the buffer query, draw the
//! map, and report.

use std::fmt;
use std::path::PathBuf;
use tracing::info;

use crate::collect::LayerCatalog;
use crate::config::{LayerConfig, MapConfig, QueryConfig, ReferenceConfig};
use crate::error::{Error, Result};
use crate::geo_core::{BoundingBox, Crs, Length};
use crate::geometric::{buffer, evaluate, GeometryLayer, Predicate, ReferenceGeometry};
use crate::render::legend::{handles_for, LegendHandle};
use crate::render::style::{Color, Fill};
use crate::render::view::create_view;
use crate::render::RenderedImage;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Overrides `output.path`
    pub output: Option<PathBuf>,
    pub render: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            output: None,
            render: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerSummary {
    pub name: String,
    pub features: usize,
    pub crs: Crs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySummary {
    pub target: String,
    pub predicate: Predicate,
    pub radius: Length,
    pub mask: Vec<bool>,
    pub matched: usize,
    pub field_sum: Option<(String, f64)>,
    pub area_sum: Option<f64>,
}

/// What a run produced, printed as the diagnostic summary
#[derive(Debug, Clone)]
pub struct RunReport {
    pub name: String,
    pub crs: Crs,
    pub layers: Vec<LayerSummary>,
    pub image: Option<RenderedImage>,
    pub query: Option<QuerySummary>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {} layers in {}", self.name, self.layers.len(), self.crs)?;
        for layer in &self.layers {
            writeln!(f, "  {:<20} {} features", layer.name, layer.features)?;
        }
        if let Some(image) = &self.image {
            let path = image
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            writeln!(
                f,
                "map: {} ({} x {} px, {} dpi)",
                path, image.width, image.height, image.dpi
            )?;
        }
        if let Some(query) = &self.query {
            let verb = match query.predicate {
                Predicate::Contained => "contained in",
                Predicate::Intersects => "intersecting",
            };
            writeln!(
                f,
                "query: `{}` features {} a {} buffer",
                query.target, verb, query.radius
            )?;
            writeln!(f, "  matched: {} of {}", query.matched, query.mask.len())?;
            writeln!(f, "  mask: {:?}", query.mask)?;
            if let Some((field, sum)) = &query.field_sum {
                writeln!(f, "  sum of {}: {}", field, sum)?;
            }
            if let Some(area) = query.area_sum {
                writeln!(f, "  area: {:.1}", area)?;
            }
        }
        Ok(())
    }
}

/// Run a theme end to end.
///
/// The query is evaluated before anything is drawn, so a failing run never
/// leaves an image behind.
pub fn run(config: &MapConfig, options: &RunOptions) -> Result<RunReport> {
    let working = Crs::resolve(config.working_epsg)?;
    info!(theme = %config.name, crs = %working, "starting run");

    let catalog = build_catalog(config, working)?;

    let query = config
        .query
        .as_ref()
        .map(|q| run_query(&catalog, q))
        .transpose()?;

    let image = if options.render {
        let destination = options
            .output
            .clone()
            .unwrap_or_else(|| config.output.path.clone());
        Some(render_map(config, &catalog, &destination)?)
    } else {
        None
    };

    let layers = config
        .layers
        .iter()
        .map(|l| {
            let layer = catalog.get(&l.name)?;
            Ok(LayerSummary {
                name: layer.name().to_string(),
                features: layer.len(),
                crs: layer.crs(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RunReport {
        name: config.name.clone(),
        crs: working,
        layers,
        image,
        query,
    })
}

/// Load every layer, then apply filters and clips in configuration order
pub fn build_catalog(config: &MapConfig, working: Crs) -> Result<LayerCatalog> {
    let mut catalog = LayerCatalog::new(working);
    for layer in &config.layers {
        catalog.load(&layer.name, &layer.source)?;
    }
    for layer in &config.layers {
        if let Some(filter) = &layer.filter {
            let filtered = catalog
                .get(&layer.name)?
                .filter_eq(&filter.field, &filter.equals)?;
            catalog.replace(filtered)?;
        }
    }
    for layer in &config.layers {
        if let Some(mask) = &layer.clip_to {
            let clipped = catalog.get(&layer.name)?.clip_to(catalog.get(mask)?)?;
            catalog.replace(clipped)?;
        }
    }
    Ok(catalog)
}

fn run_query(catalog: &LayerCatalog, query: &QueryConfig) -> Result<QuerySummary> {
    let reference = match &query.reference {
        ReferenceConfig::Feature { layer, index } => {
            ReferenceGeometry::from_layer(catalog.get(layer)?, *index)?
        }
        ReferenceConfig::Point { x, y } => ReferenceGeometry::point(*x, *y, catalog.working()),
    };
    let zone = buffer(&reference, query.radius())?;

    let target = catalog.get(&query.target)?;
    let filtered: GeometryLayer;
    let target = match &query.target_filter {
        Some(filter) => {
            filtered = target.filter_eq(&filter.field, &filter.equals)?;
            &filtered
        }
        None => target,
    };

    let result = evaluate(&zone, target, query.predicate)?;
    let field_sum = query
        .sum_field
        .as_ref()
        .map(|field| Ok::<_, Error>((field.clone(), result.sum_attribute(target, field)?)))
        .transpose()?;
    let area_sum = if query.sum_area {
        Some(result.sum_area(target)?)
    } else {
        None
    };

    Ok(QuerySummary {
        target: query.target.clone(),
        predicate: query.predicate,
        radius: query.radius(),
        matched: result.count(),
        mask: result.mask().to_vec(),
        field_sum,
        area_sum,
    })
}

/// Bounds of `extent_from`, or of every drawn layer, padded and widened to
/// the figure's aspect ratio
fn view_extent(config: &MapConfig, catalog: &LayerCatalog) -> Result<BoundingBox> {
    let bounds = match &config.extent_from {
        Some(name) => catalog.get(name)?.bounds(),
        None => config
            .layers
            .iter()
            .filter(|l| l.draw)
            .filter_map(|l| catalog.get(&l.name).ok().and_then(|layer| layer.bounds()))
            .reduce(|acc, b| acc.union(&b)),
    };
    let bounds = bounds.ok_or_else(|| Error::Config("no layer bounds to frame the map".into()))?;
    let padded = bounds.padded(config.extent_padding);
    if !padded.is_valid() {
        return Err(Error::Config(format!(
            "map extent {:?} has no area; set `extent_padding`",
            padded
        )));
    }
    Ok(padded.fit_aspect(config.output.width_in / config.output.height_in))
}

/// Representative swatch colour for a layer's legend entry
fn swatch(layer: &LayerConfig) -> LegendHandle {
    let style = &layer.style;
    let (fill, alpha) = match (&style.fill, &style.marker) {
        (Fill::Solid { color }, _) => (*color, style.alpha),
        (_, Some(marker)) => (marker.color, 1.0),
        _ => (style.stroke_color(), style.alpha),
    };
    LegendHandle {
        label: layer.legend_label.clone().unwrap_or_default(),
        fill,
        edge: Color::BLACK,
        alpha,
    }
}

fn render_map(
    config: &MapConfig,
    catalog: &LayerCatalog,
    destination: &std::path::Path,
) -> Result<RenderedImage> {
    let extent = view_extent(config, catalog)?;
    let mut view = create_view(catalog.working(), extent)?
        .with_figure_size(config.output.width_in, config.output.height_in)?;
    if let Some(title) = &config.output.title {
        view = view.with_title(title.clone());
    }

    for layer in config.layers.iter().filter(|l| l.draw) {
        let data = catalog.get(&layer.name)?;
        view = match &layer.label_field {
            Some(field) => view.add_labeled_points(data, field, layer.style.clone())?,
            None => view.add_layer(data, layer.style.clone())?,
        };
    }

    if let Some(legend) = &config.legend {
        let mut handles = Vec::new();
        for layer in config.layers.iter().filter(|l| l.draw && l.label_field.is_none()) {
            if matches!(layer.style.fill, Fill::Categorized { .. }) {
                handles.extend(view.category_handles(&layer.name)?);
            }
        }
        handles.extend(
            config
                .layers
                .iter()
                .filter(|l| l.draw && l.legend_label.is_some())
                .map(swatch),
        );
        handles.extend(handles_for(&legend.entries));
        view = view.add_legend(&legend.title, handles);
    }

    if let Some(bar) = &config.scale_bar {
        view = view.add_scale_bar((bar.anchor[0], bar.anchor[1]), &bar.segments)?;
    }

    view.render(destination, config.output.dpi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const STUDY_AREA: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::29902" } },
        "features": [
            { "type": "Feature", "properties": { "NAME": "BINEVENAGH" },
              "geometry": { "type": "Polygon", "coordinates": [[
                [260000.0, 420000.0], [270000.0, 420000.0], [270000.0, 430000.0],
                [260000.0, 430000.0], [260000.0, 420000.0] ]] } }
        ]
    }"#;

    const LANDCOVER: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::29902" } },
        "features": [
            { "type": "Feature", "properties": { "BHSUB": "B1" },
              "geometry": { "type": "Polygon", "coordinates": [[
                [264800.0, 424800.0], [265200.0, 424800.0], [265200.0, 425200.0],
                [264800.0, 425200.0], [264800.0, 424800.0] ]] } },
            { "type": "Feature", "properties": { "BHSUB": "C3" },
              "geometry": { "type": "Polygon", "coordinates": [[
                [264000.0, 425000.0], [266000.0, 425000.0], [266000.0, 425400.0],
                [264000.0, 425400.0], [264000.0, 425000.0] ]] } },
            { "type": "Feature", "properties": { "BHSUB": "H1" },
              "geometry": { "type": "Polygon", "coordinates": [[
                [268000.0, 428000.0], [268500.0, 428000.0], [268500.0, 428500.0],
                [268000.0, 428500.0], [268000.0, 428000.0] ]] } }
        ]
    }"#;

    const BUILDINGS: &str = "X,Y,USE,POP\n\
        265100,425100,RESIDENTIAL,4\n\
        265300,425300,COMMERCIAL,0\n\
        271000,429000,RESIDENTIAL,3\n";

    fn write_fixtures(dir: &Path) {
        std::fs::write(dir.join("study_area.geojson"), STUDY_AREA).unwrap();
        std::fs::write(dir.join("landcover.geojson"), LANDCOVER).unwrap();
        std::fs::write(dir.join("buildings.csv"), BUILDINGS).unwrap();
    }

    fn config_text(dir: &Path, predicate: &str) -> String {
        format!(
            r#"
            name = "landcover"
            working_epsg = 29902
            extent_from = "study_area"
            extent_padding = 500

            [output]
            path = "{out}"
            dpi = 20
            width_in = 4
            height_in = 4

            [[layers]]
            name = "study_area"
            source = {{ kind = "vector", path = "{dir}/study_area.geojson" }}
            style = {{ edge = "black" }}

            [[layers]]
            name = "landcover"
            source = {{ kind = "vector", path = "{dir}/landcover.geojson" }}
            style = {{ edge = "black", alpha = 0.25, fill = {{ kind = "categorized", field = "BHSUB", palette = ["olive", "peru"] }} }}

            [[layers]]
            name = "residential"
            source = {{ kind = "table", path = "{dir}/buildings.csv", x_field = "X", y_field = "Y", declared_epsg = 29902 }}
            filter = {{ field = "USE", equals = "RESIDENTIAL" }}
            clip_to = "study_area"
            style = {{ marker = {{ shape = "*", color = "red" }} }}

            [query]
            reference = {{ x = 265000.0, y = 425000.0 }}
            radius = 1000
            target = "landcover"
            predicate = "{predicate}"
            sum_area = true
            "#,
            out = dir.join("map.png").display(),
            dir = dir.display(),
            predicate = predicate,
        )
    }

    #[test]
    fn test_query_only_run() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let config = MapConfig::parse(&config_text(dir.path(), "contained")).unwrap();
        let options = RunOptions {
            output: None,
            render: false,
        };
        let report = run(&config, &options).unwrap();

        assert!(report.image.is_none());
        assert!(!dir.path().join("map.png").exists());
        let residential = report.layers.iter().find(|l| l.name == "residential").unwrap();
        // commercial building filtered out, the far one clipped away
        assert_eq!(residential.features, 1);

        let query = report.query.as_ref().unwrap();
        assert_eq!(query.mask, vec![true, false, false]);
        assert_eq!(query.matched, 1);
        assert!((query.area_sum.unwrap() - 160_000.0).abs() < 1e-6);
        let text = report.to_string();
        assert!(text.contains("matched: 1 of 3"));
        assert!(text.contains("contained in"));
    }

    #[test]
    fn test_intersects_counts_straddling_features() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let config = MapConfig::parse(&config_text(dir.path(), "intersects")).unwrap();
        let report = run(
            &config,
            &RunOptions {
                output: None,
                render: false,
            },
        )
        .unwrap();
        assert_eq!(report.query.unwrap().mask, vec![true, true, false]);
    }

    #[test]
    fn test_render_run_writes_image() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let config = MapConfig::parse(&config_text(dir.path(), "contained")).unwrap();
        let output = dir.path().join("override.png");
        let report = run(
            &config,
            &RunOptions {
                output: Some(output.clone()),
                render: true,
            },
        )
        .unwrap();
        let image = report.image.unwrap();
        assert_eq!((image.width, image.height, image.dpi), (80, 80, 20));
        assert!(output.exists());
    }

    #[test]
    fn test_failed_query_leaves_no_image() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let text = config_text(dir.path(), "contained")
            .replace("sum_area = true", r#"sum_field = "BHSUB""#);
        let config = MapConfig::parse(&text).unwrap();
        let err = run(&config, &RunOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
        assert!(!dir.path().join("map.png").exists());
    }

    #[test]
    fn test_missing_source_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let config = MapConfig::parse(&config_text(dir.path(), "contained")).unwrap();
        let err = run(&config, &RunOptions::default()).unwrap_err();
        assert!(matches!(err, Error::DataSource { .. }));
    }
}
