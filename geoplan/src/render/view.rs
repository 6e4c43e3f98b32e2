use geo::{Centroid, Coord, Geometry};
use std::path::Path;
use tracing::debug;

use crate::commons::title_case;
use crate::error::{Error, Result};
use crate::geo_core::{BoundingBox, Crs};
use crate::geometric::layer::{Feature, GeometryLayer};
use crate::render::legend::{generate_handles, Legend, LegendAnchor, LegendHandle};
use crate::render::raster::{self, RenderedImage};
use crate::render::scale_bar::{layout_scale_bar, LocalFrame, ScaleBar, TransverseMercatorFrame};
use crate::render::style::{viridis, Color, Fill, Style};

pub const DEFAULT_FIGURE_INCHES: (f64, f64) = (10.0, 10.0);
pub const DEFAULT_DPI: u32 = 300;

/// Fill resolved against a concrete layer
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResolvedFill {
    None,
    Solid(Color),
    Categorized {
        field: String,
        categories: Vec<(String, Color)>,
    },
    Choropleth {
        field: String,
        vmin: f64,
        vmax: f64,
    },
}

impl ResolvedFill {
    fn resolve(layer: &GeometryLayer, fill: &Fill) -> Result<Self> {
        Ok(match fill {
            Fill::None => ResolvedFill::None,
            Fill::Solid { color } => ResolvedFill::Solid(*color),
            Fill::Categorized { field, palette } => {
                let values = layer.unique_values(field)?;
                let categories = values
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (v, palette[i % palette.len()]))
                    .collect();
                ResolvedFill::Categorized {
                    field: field.clone(),
                    categories,
                }
            }
            Fill::Choropleth {
                field, vmin, vmax, ..
            } => {
                layer.require_field(field)?;
                ResolvedFill::Choropleth {
                    field: field.clone(),
                    vmin: *vmin,
                    vmax: *vmax,
                }
            }
        })
    }

    /// Interior colour of one feature; `None` leaves it unfilled
    pub(crate) fn color_for(&self, feature: &Feature) -> Option<Color> {
        match self {
            ResolvedFill::None => None,
            ResolvedFill::Solid(color) => Some(*color),
            ResolvedFill::Categorized { field, categories } => {
                let value = feature.attribute(field)?.to_string();
                categories
                    .iter()
                    .find(|(category, _)| *category == value)
                    .map(|(_, color)| *color)
            }
            ResolvedFill::Choropleth { field, vmin, vmax } => {
                let value = feature.attribute(field)?.as_f64()?;
                Some(viridis((value - vmin) / (vmax - vmin)))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StyledLayer<'a> {
    pub layer: &'a GeometryLayer,
    pub style: Style,
    pub fill: ResolvedFill,
}

/// Point markers with a text label each
#[derive(Debug, Clone)]
pub(crate) struct LabelSet {
    pub points: Vec<(Coord<f64>, String)>,
    pub style: Style,
}

#[derive(Debug, Clone)]
pub(crate) enum DrawItem<'a> {
    Layer(StyledLayer<'a>),
    Labels(LabelSet),
}

/// Vertical colour ramp beside the map
#[derive(Debug, Clone, PartialEq)]
pub struct ColorBar {
    pub vmin: f64,
    pub vmax: f64,
    pub label: Option<String>,
}

/// Everything needed to draw one map.
///
/// Every composer step consumes the view and returns the extended one;
/// nothing is drawn until [`MapView::render`]. Layers are borrowed from the
/// catalog that owns them.
#[derive(Debug, Clone)]
pub struct MapView<'a> {
    crs: Crs,
    extent: BoundingBox,
    pub(crate) items: Vec<DrawItem<'a>>,
    pub(crate) legend: Option<Legend>,
    pub(crate) scale_bar: Option<ScaleBar>,
    pub(crate) color_bar: Option<ColorBar>,
    pub(crate) title: Option<String>,
    pub(crate) figure_inches: (f64, f64),
}

/// Start a view of `extent` in `crs`; every bound is inclusive
pub fn create_view<'a>(crs: Crs, extent: BoundingBox) -> Result<MapView<'a>> {
    if !extent.is_valid() {
        return Err(Error::invalid_parameter(
            "extent",
            format!("{:?} has no area", extent),
        ));
    }
    Ok(MapView {
        crs,
        extent,
        items: Vec::new(),
        legend: None,
        scale_bar: None,
        color_bar: None,
        title: None,
        figure_inches: DEFAULT_FIGURE_INCHES,
    })
}

impl<'a> MapView<'a> {
    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn extent(&self) -> &BoundingBox {
        &self.extent
    }

    pub fn legend(&self) -> Option<&Legend> {
        self.legend.as_ref()
    }

    pub fn scale_bar(&self) -> Option<&ScaleBar> {
        self.scale_bar.as_ref()
    }

    pub fn color_bar(&self) -> Option<&ColorBar> {
        self.color_bar.as_ref()
    }

    /// Names of drawn layers, in draw order
    pub fn layer_names(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                DrawItem::Layer(styled) => Some(styled.layer.name()),
                DrawItem::Labels(_) => None,
            })
            .collect()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_figure_size(mut self, width_in: f64, height_in: f64) -> Result<Self> {
        if !(width_in > 0.0 && height_in > 0.0 && width_in.is_finite() && height_in.is_finite()) {
            return Err(Error::invalid_parameter(
                "figure size",
                format!("{} x {} inches", width_in, height_in),
            ));
        }
        self.figure_inches = (width_in, height_in);
        Ok(self)
    }

    /// Append a styled layer; later layers draw on top
    pub fn add_layer(mut self, layer: &'a GeometryLayer, style: Style) -> Result<Self> {
        self.crs
            .ensure_same(&layer.crs(), &format!("add layer `{}`", layer.name()))?;
        style.validate(layer.name())?;
        let fill = ResolvedFill::resolve(layer, &style.fill)?;

        if let Fill::Choropleth {
            vmin, vmax, label, ..
        } = &style.fill
        {
            if self.color_bar.is_none() {
                self.color_bar = Some(ColorBar {
                    vmin: *vmin,
                    vmax: *vmax,
                    label: label.clone(),
                });
            }
        }
        debug!(layer = layer.name(), features = layer.len(), "added layer to view");
        self.items.push(DrawItem::Layer(StyledLayer { layer, style, fill }));
        Ok(self)
    }

    /// Draw each feature as a marker labelled with its title-cased `text_field`
    pub fn add_labeled_points(
        mut self,
        layer: &'a GeometryLayer,
        text_field: &str,
        style: Style,
    ) -> Result<Self> {
        self.crs
            .ensure_same(&layer.crs(), &format!("label layer `{}`", layer.name()))?;
        layer.require_field(text_field)?;
        style.validate(layer.name())?;

        let points = layer
            .iter()
            .filter_map(|feature| {
                let anchor = match &feature.geometry {
                    Geometry::Point(p) => Some(p.0),
                    other => other.centroid().map(|p| p.0),
                }?;
                let text = feature
                    .attribute(text_field)
                    .map(|v| title_case(&v.to_string()))
                    .unwrap_or_default();
                Some((anchor, text))
            })
            .collect();
        self.items.push(DrawItem::Labels(LabelSet { points, style }));
        Ok(self)
    }

    /// Legend in the upper-left corner, one swatch per handle, in order
    pub fn add_legend(mut self, title: &str, handles: Vec<LegendHandle>) -> Self {
        self.legend = Some(Legend {
            title: title.to_string(),
            anchor: LegendAnchor::UpperLeft,
            handles,
        });
        self
    }

    /// Legend handles for the categories of a categorised layer, in first-seen order
    pub fn category_handles(&self, layer_name: &str) -> Result<Vec<LegendHandle>> {
        for item in &self.items {
            if let DrawItem::Layer(styled) = item {
                if styled.layer.name() != layer_name {
                    continue;
                }
                if let ResolvedFill::Categorized { categories, .. } = &styled.fill {
                    let labels: Vec<&str> = categories.iter().map(|(l, _)| l.as_str()).collect();
                    let colors: Vec<Color> = categories.iter().map(|(_, c)| *c).collect();
                    return generate_handles(
                        &labels,
                        &colors,
                        styled.style.edge.unwrap_or(Color::BLACK),
                        styled.style.alpha,
                    );
                }
                return Err(Error::invalid_parameter(
                    "legend",
                    format!("layer `{}` is not categorised", layer_name),
                ));
            }
        }
        Err(Error::Config(format!("layer `{}` is not in the view", layer_name)))
    }

    /// Scale bar measured in a transverse Mercator frame centred on the extent
    pub fn add_scale_bar(self, anchor: (f64, f64), segments: &[f64]) -> Result<Self> {
        let frame = TransverseMercatorFrame::centred_on(self.crs, &self.extent)?;
        self.add_scale_bar_in(&frame, anchor, segments)
    }

    /// Scale bar measured in a caller-supplied local frame
    pub fn add_scale_bar_in(
        mut self,
        frame: &dyn LocalFrame,
        anchor: (f64, f64),
        segments: &[f64],
    ) -> Result<Self> {
        self.scale_bar = Some(layout_scale_bar(frame, &self.extent, anchor, segments)?);
        Ok(self)
    }

    /// Rasterise to PNG bytes without touching the filesystem
    pub fn render_to_png(&self, dpi: u32) -> Result<(Vec<u8>, RenderedImage)> {
        raster::rasterize(self, dpi)
    }

    /// Rasterise and write `destination`; nothing is written on failure
    pub fn render(&self, destination: &Path, dpi: u32) -> Result<RenderedImage> {
        raster::render(self, destination, dpi)
    }
}
