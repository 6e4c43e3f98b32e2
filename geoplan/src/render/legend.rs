use serde::Deserialize;

use crate::error::{Error, Result};
use crate::render::style::Color;

pub const DEFAULT_LEGEND_TITLE: &str = "Legend";

/// A labelled rectangular swatch
#[derive(Debug, Clone, PartialEq)]
pub struct LegendHandle {
    pub label: String,
    pub fill: Color,
    pub edge: Color,
    pub alpha: f64,
}

/// One configured legend row
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: Color,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn default_alpha() -> f64 {
    1.0
}

impl LegendEntry {
    pub fn new(label: &str, color: Color) -> Self {
        LegendEntry {
            label: label.to_string(),
            color,
            alpha: default_alpha(),
        }
    }
}

/// Where the legend box sits on the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LegendAnchor {
    #[default]
    UpperLeft,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Legend {
    pub title: String,
    pub anchor: LegendAnchor,
    pub handles: Vec<LegendHandle>,
}

/// One handle per label, colours reused cyclically when there are fewer
/// colours than labels.
pub fn generate_handles<S: AsRef<str>>(
    labels: &[S],
    colors: &[Color],
    edge: Color,
    alpha: f64,
) -> Result<Vec<LegendHandle>> {
    if colors.is_empty() && !labels.is_empty() {
        return Err(Error::invalid_parameter("colors", "no colours for legend handles"));
    }
    Ok(labels
        .iter()
        .enumerate()
        .map(|(i, label)| LegendHandle {
            label: label.as_ref().to_string(),
            fill: colors[i % colors.len()],
            edge,
            alpha,
        })
        .collect())
}

/// Handles for configured entries, in order, with a black edge
pub fn handles_for(entries: &[LegendEntry]) -> Vec<LegendHandle> {
    entries
        .iter()
        .map(|entry| LegendHandle {
            label: entry.label.clone(),
            fill: entry.color,
            edge: Color::BLACK,
            alpha: entry.alpha,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_handles_wraps_colors() {
        let colors = [Color::parse("olive").unwrap(), Color::parse("peru").unwrap()];
        let handles = generate_handles(&["H1", "C3", "B1"], &colors, Color::BLACK, 0.25).unwrap();
        assert_eq!(handles.len(), 3);
        assert_eq!(handles[2].fill, colors[0]);
        assert_eq!(handles[1].label, "C3");
        assert!(handles.iter().all(|h| h.alpha == 0.25));
    }

    #[test]
    fn test_generate_handles_without_colors() {
        assert!(generate_handles(&["Towns"], &[], Color::BLACK, 1.0).is_err());
        let none: [&str; 0] = [];
        assert!(generate_handles(&none, &[], Color::BLACK, 1.0).unwrap().is_empty());
    }

    #[test]
    fn test_handles_for_entries_keep_order() {
        let entries = vec![
            LegendEntry::new("Protected Area", Color::parse("purple").unwrap()),
            LegendEntry::new("Track", Color::parse("green").unwrap()),
        ];
        let handles = handles_for(&entries);
        assert_eq!(handles[0].label, "Protected Area");
        assert_eq!(handles[1].fill, Color::rgb(0, 128, 0));
        assert!(handles.iter().all(|h| h.edge == Color::BLACK && h.alpha == 1.0));
    }
}
