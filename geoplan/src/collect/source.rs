use serde::Deserialize;
use std::path::PathBuf;

/// Where a layer comes from
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Source {
    /// Vector file: GeoJSON, or any OGR format (shapefile, GeoPackage, ...)
    Vector {
        path: PathBuf,
        /// Reference to use when the file declares none (shapefile without .prj)
        #[serde(default)]
        declared_epsg: Option<u32>,
    },
    /// Attribute table whose rows carry numeric coordinate columns
    Table {
        path: PathBuf,
        x_field: String,
        y_field: String,
        /// Tables carry no reference of their own; this one is mandatory at load
        #[serde(default)]
        declared_epsg: Option<u32>,
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
}

fn default_delimiter() -> char {
    ','
}

impl Source {
    pub fn vector(path: impl Into<PathBuf>) -> Self {
        Source::Vector {
            path: path.into(),
            declared_epsg: None,
        }
    }

    pub fn table(path: impl Into<PathBuf>, x_field: &str, y_field: &str, epsg: u32) -> Self {
        Source::Table {
            path: path.into(),
            x_field: x_field.to_string(),
            y_field: y_field.to_string(),
            declared_epsg: Some(epsg),
            delimiter: default_delimiter(),
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            Source::Vector { path, .. } | Source::Table { path, .. } => path,
        }
    }
}
