//! Theme configuration.
//!
//! One TOML file describes one map: where each dataset lives, how it is
//! styled, the view extent, legend and scale bar, the output image and the
//! buffer query to evaluate.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::collect::Source;
use crate::error::{Error, Result};
use crate::geo_core::{Length, LinearUnit};
use crate::geometric::Predicate;
use crate::render::legend::{LegendEntry, DEFAULT_LEGEND_TITLE};
use crate::render::scale_bar::{DEFAULT_ANCHOR, DEFAULT_SEGMENTS};
use crate::render::style::Style;
use crate::render::view::{DEFAULT_DPI, DEFAULT_FIGURE_INCHES};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapConfig {
    pub name: String,
    /// EPSG code every layer is expressed in
    pub working_epsg: u32,
    pub output: OutputConfig,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    /// Layer whose bounds define the view extent
    #[serde(default)]
    pub extent_from: Option<String>,
    /// Margin added around the extent, in working units
    #[serde(default)]
    pub extent_padding: f64,
    #[serde(default)]
    pub legend: Option<LegendConfig>,
    #[serde(default)]
    pub scale_bar: Option<ScaleBarConfig>,
    #[serde(default)]
    pub query: Option<QueryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub path: PathBuf,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default = "default_width_in")]
    pub width_in: f64,
    #[serde(default = "default_height_in")]
    pub height_in: f64,
    #[serde(default)]
    pub title: Option<String>,
}

fn default_dpi() -> u32 {
    DEFAULT_DPI
}

fn default_width_in() -> f64 {
    DEFAULT_FIGURE_INCHES.0
}

fn default_height_in() -> f64 {
    DEFAULT_FIGURE_INCHES.1
}

/// Keep features whose `field` equals `equals`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    pub field: String,
    pub equals: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
    pub name: String,
    pub source: Source,
    #[serde(default)]
    pub filter: Option<FilterConfig>,
    /// Name of a polygon layer to clip this one to
    #[serde(default)]
    pub clip_to: Option<String>,
    /// `false` for layers only used by the query or as a mask
    #[serde(default = "default_draw")]
    pub draw: bool,
    #[serde(default)]
    pub style: Style,
    /// Draw features as labelled markers using this field
    #[serde(default)]
    pub label_field: Option<String>,
    /// Adds a legend swatch for this layer
    #[serde(default)]
    pub legend_label: Option<String>,
}

fn default_draw() -> bool {
    true
}

/// Legend rows: categories of categorised layers first, then layers with a
/// `legend_label`, then `entries`, each group in configuration order.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegendConfig {
    #[serde(default = "default_legend_title")]
    pub title: String,
    #[serde(default)]
    pub entries: Vec<LegendEntry>,
}

fn default_legend_title() -> String {
    DEFAULT_LEGEND_TITLE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScaleBarConfig {
    #[serde(default = "default_anchor")]
    pub anchor: [f64; 2],
    /// Segment lengths in metres
    #[serde(default = "default_segments")]
    pub segments: Vec<f64>,
}

fn default_anchor() -> [f64; 2] {
    [DEFAULT_ANCHOR.0, DEFAULT_ANCHOR.1]
}

fn default_segments() -> Vec<f64> {
    DEFAULT_SEGMENTS.to_vec()
}

impl Default for ScaleBarConfig {
    fn default() -> Self {
        ScaleBarConfig {
            anchor: default_anchor(),
            segments: default_segments(),
        }
    }
}

/// Origin of the buffer: one feature of a layer, or an explicit point
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReferenceConfig {
    Feature {
        layer: String,
        #[serde(default)]
        index: usize,
    },
    Point {
        x: f64,
        y: f64,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    pub reference: ReferenceConfig,
    pub radius: f64,
    #[serde(default = "default_unit")]
    pub unit: LinearUnit,
    pub target: String,
    #[serde(default)]
    pub predicate: Predicate,
    #[serde(default)]
    pub target_filter: Option<FilterConfig>,
    /// Numeric field summed over matching features
    #[serde(default)]
    pub sum_field: Option<String>,
    /// Report the total area of matching features
    #[serde(default)]
    pub sum_area: bool,
}

fn default_unit() -> LinearUnit {
    LinearUnit::Metre
}

impl QueryConfig {
    pub fn radius(&self) -> Length {
        Length::new(self.radius, self.unit)
    }
}

impl MapConfig {
    /// Read and validate a configuration file
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Parse and validate configuration text
    pub fn parse(text: &str) -> Result<Self> {
        let config: MapConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn layer(&self, name: &str) -> Option<&LayerConfig> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Check cross references and value ranges
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.name.as_str()) {
                return Err(Error::Config(format!("layer `{}` is defined twice", layer.name)));
            }
        }
        let known = |name: &str, context: &str| -> Result<()> {
            if seen.contains(name) {
                Ok(())
            } else {
                Err(Error::Config(format!("{} refers to unknown layer `{}`", context, name)))
            }
        };

        for layer in &self.layers {
            if let Some(mask) = &layer.clip_to {
                known(mask, &format!("`clip_to` of `{}`", layer.name))?;
                if mask == &layer.name {
                    return Err(Error::Config(format!("layer `{}` is clipped to itself", layer.name)));
                }
            }
        }
        if let Some(name) = &self.extent_from {
            known(name, "`extent_from`")?;
        }
        if !self.extent_padding.is_finite() || self.extent_padding < 0.0 {
            return Err(Error::Config(format!(
                "`extent_padding` {} must be a non-negative number",
                self.extent_padding
            )));
        }

        if self.output.dpi == 0 {
            return Err(Error::Config("`output.dpi` must be positive".into()));
        }
        if !(self.output.width_in > 0.0 && self.output.height_in > 0.0) {
            return Err(Error::Config("figure width and height must be positive".into()));
        }

        if let Some(bar) = &self.scale_bar {
            if bar.segments.is_empty() {
                return Err(Error::Config("`scale_bar.segments` is empty".into()));
            }
        }

        if let Some(query) = &self.query {
            known(&query.target, "`query.target`")?;
            if let ReferenceConfig::Feature { layer, .. } = &query.reference {
                known(layer, "`query.reference`")?;
            }
            if !query.radius.is_finite() || query.radius < 0.0 {
                return Err(Error::Config(format!(
                    "`query.radius` {} must be a non-negative number",
                    query.radius
                )));
            }
        }
        Ok(())
    }
}
