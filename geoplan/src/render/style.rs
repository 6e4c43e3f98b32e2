use plotters::style::RGBColor;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// An opaque RGB colour; transparency lives on the style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Named colours accepted in configuration, with their single-letter shorthands
const NAMED_COLORS: &[(&str, (u8, u8, u8))] = &[
    ("k", (0, 0, 0)),
    ("black", (0, 0, 0)),
    ("w", (255, 255, 255)),
    ("white", (255, 255, 255)),
    ("r", (255, 0, 0)),
    ("red", (255, 0, 0)),
    ("g", (0, 128, 0)),
    ("green", (0, 128, 0)),
    ("b", (0, 0, 255)),
    ("blue", (0, 0, 255)),
    ("c", (0, 191, 191)),
    ("cyan", (0, 255, 255)),
    ("m", (191, 0, 191)),
    ("magenta", (255, 0, 255)),
    ("y", (191, 191, 0)),
    ("yellow", (255, 255, 0)),
    ("grey", (128, 128, 128)),
    ("gray", (128, 128, 128)),
    ("lightgrey", (211, 211, 211)),
    ("lightgray", (211, 211, 211)),
    ("dimgrey", (105, 105, 105)),
    ("dimgray", (105, 105, 105)),
    ("whitesmoke", (245, 245, 245)),
    ("purple", (128, 0, 128)),
    ("pink", (255, 192, 203)),
    ("orange", (255, 165, 0)),
    ("brown", (165, 42, 42)),
    ("sienna", (160, 82, 45)),
    ("peru", (205, 133, 63)),
    ("tan", (210, 180, 140)),
    ("gold", (255, 215, 0)),
    ("navy", (0, 0, 128)),
    ("royalblue", (65, 105, 225)),
    ("darkslateblue", (72, 61, 139)),
    ("lightblue", (173, 216, 230)),
    ("olive", (128, 128, 0)),
    ("olivedrab", (107, 142, 35)),
    ("darkolivegreen", (85, 107, 47)),
    ("yellowgreen", (154, 205, 50)),
    ("greenyellow", (173, 255, 47)),
    ("chartreuse", (127, 255, 0)),
    ("lawngreen", (124, 252, 0)),
    ("darkseagreen", (143, 188, 143)),
    ("lightgreen", (144, 238, 144)),
    ("limegreen", (50, 205, 50)),
    ("darkgreen", (0, 100, 0)),
];

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    /// Parse a colour name (`purple`, `k`) or `#rrggbb`
    pub fn parse(text: &str) -> Result<Self> {
        let key = text.trim().to_ascii_lowercase();
        if let Some(hex) = key.strip_prefix('#') {
            if hex.len() == 6 {
                if let Ok(value) = u32::from_str_radix(hex, 16) {
                    return Ok(Color::rgb(
                        (value >> 16) as u8,
                        (value >> 8) as u8,
                        value as u8,
                    ));
                }
            }
            return Err(Error::Config(format!("invalid hex colour `{}`", text)));
        }
        NAMED_COLORS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, (r, g, b))| Color::rgb(*r, *g, *b))
            .ok_or_else(|| Error::Config(format!("unknown colour `{}`", text)))
    }

    pub(crate) fn to_rgb(self) -> RGBColor {
        RGBColor(self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Color::parse(s)
    }
}

impl TryFrom<String> for Color {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Color::parse(&value)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Viridis ramp sampled at nine evenly spaced stops
const VIRIDIS: [(u8, u8, u8); 9] = [
    (68, 1, 84),
    (71, 44, 122),
    (59, 81, 139),
    (44, 113, 142),
    (33, 144, 141),
    (39, 173, 129),
    (92, 200, 99),
    (170, 220, 50),
    (253, 231, 37),
];

/// Colour at `t` along the viridis ramp, `t` clamped to [0, 1]
pub fn viridis(t: f64) -> Color {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (VIRIDIS.len() - 1) as f64;
    let lower = scaled.floor() as usize;
    let upper = (lower + 1).min(VIRIDIS.len() - 1);
    let frac = scaled - lower as f64;
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    let (a, b) = (VIRIDIS[lower], VIRIDIS[upper]);
    Color::rgb(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

/// How polygon interiors are coloured
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Fill {
    #[default]
    None,
    Solid { color: Color },
    /// One colour per distinct value of `field`, cycling through `palette`
    Categorized { field: String, palette: Vec<Color> },
    /// Numeric `field` mapped through viridis between `vmin` and `vmax`
    Choropleth {
        field: String,
        vmin: f64,
        vmax: f64,
        #[serde(default)]
        label: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarkerShape {
    #[default]
    #[serde(alias = "o")]
    Circle,
    #[serde(alias = "d")]
    Diamond,
    #[serde(alias = "*")]
    Star,
    #[serde(alias = "s")]
    Square,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Marker {
    #[serde(default)]
    pub shape: MarkerShape,
    /// Size in points
    #[serde(default = "default_marker_size")]
    pub size: f64,
    pub color: Color,
}

fn default_marker_size() -> f64 {
    3.5
}

impl Marker {
    pub fn new(shape: MarkerShape, color: Color) -> Self {
        Marker {
            shape,
            size: default_marker_size(),
            color,
        }
    }
}

/// Presentation of one layer; has no effect on analysis
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Style {
    #[serde(default)]
    pub fill: Fill,
    /// Polygon outline and line colour
    #[serde(default)]
    pub edge: Option<Color>,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Width in points
    #[serde(default = "default_line_width")]
    pub line_width: f64,
    #[serde(default)]
    pub marker: Option<Marker>,
}

fn default_alpha() -> f64 {
    1.0
}

fn default_line_width() -> f64 {
    1.0
}

impl Default for Style {
    fn default() -> Self {
        Style {
            fill: Fill::None,
            edge: None,
            alpha: default_alpha(),
            line_width: default_line_width(),
            marker: None,
        }
    }
}

impl Style {
    pub fn outline(edge: Color) -> Self {
        Style {
            edge: Some(edge),
            ..Style::default()
        }
    }

    pub fn filled(fill: Color, edge: Color) -> Self {
        Style {
            fill: Fill::Solid { color: fill },
            edge: Some(edge),
            ..Style::default()
        }
    }

    pub fn line(color: Color, width: f64) -> Self {
        Style {
            edge: Some(color),
            line_width: width,
            ..Style::default()
        }
    }

    pub fn markers(shape: MarkerShape, color: Color) -> Self {
        Style {
            marker: Some(Marker::new(shape, color)),
            ..Style::default()
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub(crate) fn validate(&self, layer: &str) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::invalid_parameter(
                "alpha",
                format!("{} for `{}` is outside [0, 1]", self.alpha, layer),
            ));
        }
        if !self.line_width.is_finite() || self.line_width < 0.0 {
            return Err(Error::invalid_parameter(
                "line_width",
                format!("{} for `{}`", self.line_width, layer),
            ));
        }
        match &self.fill {
            Fill::Categorized { palette, .. } if palette.is_empty() => Err(
                Error::invalid_parameter("palette", format!("empty palette for `{}`", layer)),
            ),
            Fill::Choropleth { vmin, vmax, .. } if !(vmin < vmax) => Err(Error::invalid_parameter(
                "vmin",
                format!("vmin {} must be below vmax {} for `{}`", vmin, vmax, layer),
            )),
            _ => Ok(()),
        }
    }

    /// Colour used for lines and marker fallbacks
    pub(crate) fn stroke_color(&self) -> Color {
        self.edge.unwrap_or(Color::BLACK)
    }

    pub(crate) fn marker_or_default(&self) -> Marker {
        self.marker
            .clone()
            .unwrap_or_else(|| Marker::new(MarkerShape::Circle, self.stroke_color()))
    }
}
