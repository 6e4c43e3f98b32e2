use tracing::info;

use crate::collect::source::Source;
use crate::collect::tabular::{read_table, tabular_to_layer};
use crate::collect::vector::{read_vector, DeclaredCrs};
use crate::error::{Error, Result};
use crate::geo_core::Crs;
use crate::geometric::layer::GeometryLayer;

/// Load one named dataset and express it in `expected`.
///
/// The reference must come from the source itself or from its explicit
/// `declared_epsg`; a source that names one reference while the override
/// names another is rejected rather than reconciled.
pub fn load(name: &str, source: &Source, expected: Crs) -> Result<GeometryLayer> {
    let layer = match source {
        Source::Vector {
            path,
            declared_epsg,
        } => {
            let raw = read_vector(name, path)?;
            let crs = match (&raw.declared, declared_epsg) {
                (DeclaredCrs::Epsg(code), Some(declared)) if code != declared => {
                    return Err(Error::reference_mismatch(
                        format!("load `{}`", name),
                        format!(
                            "source declares EPSG:{} but configuration declares EPSG:{}",
                            code, declared
                        ),
                    ));
                }
                (DeclaredCrs::Epsg(code), _) => Crs::resolve(*code)?,
                (_, Some(declared)) => Crs::resolve(*declared)?,
                (declared, None) => declared.resolve(name)?,
            };
            GeometryLayer::new(name, crs, raw.features)
        }
        Source::Table {
            path,
            x_field,
            y_field,
            declared_epsg,
            delimiter,
        } => {
            let Some(code) = declared_epsg else {
                return Err(Error::reference_mismatch(
                    format!("load `{}`", name),
                    "tables carry no reference; set `declared_epsg`",
                ));
            };
            let crs = Crs::resolve(*code)?;
            let rows = read_table(name, path, *delimiter)?;
            tabular_to_layer(name, rows, x_field, y_field, crs)?
        }
    };

    if layer.is_empty() {
        return Err(Error::data_source(
            name,
            format!("{} holds no features", source.path().display()),
        ));
    }

    info!(
        layer = name,
        features = layer.len(),
        crs = %layer.crs(),
        "loaded layer"
    );

    if layer.crs() == expected {
        Ok(layer)
    } else {
        info!(layer = name, from = %layer.crs(), to = %expected, "reprojecting");
        layer.reprojected(expected)
    }
}

/// Every layer of one run, all in the working reference
#[derive(Debug, Clone)]
pub struct LayerCatalog {
    working: Crs,
    layers: Vec<GeometryLayer>,
}

impl LayerCatalog {
    pub fn new(working: Crs) -> Self {
        LayerCatalog {
            working,
            layers: Vec::new(),
        }
    }

    pub fn working(&self) -> Crs {
        self.working
    }

    /// Load `source` under `name` and keep it
    pub fn load(&mut self, name: &str, source: &Source) -> Result<&GeometryLayer> {
        let layer = load(name, source, self.working)?;
        self.insert(layer)
    }

    /// Keep an already-built layer; its reference must be the working one
    pub fn insert(&mut self, layer: GeometryLayer) -> Result<&GeometryLayer> {
        self.working
            .ensure_same(&layer.crs(), &format!("catalog insert of `{}`", layer.name()))?;
        if self.layers.iter().any(|l| l.name() == layer.name()) {
            return Err(Error::Config(format!(
                "layer `{}` is defined twice",
                layer.name()
            )));
        }
        self.layers.push(layer);
        let idx = self.layers.len() - 1;
        Ok(&self.layers[idx])
    }

    /// Replace a kept layer by a derived one (filtered, clipped) of the same name
    pub fn replace(&mut self, layer: GeometryLayer) -> Result<()> {
        self.working
            .ensure_same(&layer.crs(), &format!("catalog replace of `{}`", layer.name()))?;
        match self.layers.iter_mut().find(|l| l.name() == layer.name()) {
            Some(slot) => {
                *slot = layer;
                Ok(())
            }
            None => Err(Error::Config(format!("no layer named `{}`", layer.name()))),
        }
    }

    pub fn get(&self, name: &str) -> Result<&GeometryLayer> {
        self.layers
            .iter()
            .find(|l| l.name() == name)
            .ok_or_else(|| Error::Config(format!("no layer named `{}`", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.name())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::layer::Feature;
    use geo::point;
    use std::io::Write;
    use std::path::Path;

    fn grid() -> Crs {
        Crs::projected_metres(29902)
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    const TRACK: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "EPSG:29902" } },
        "features": [
            { "type": "Feature", "properties": { "ID": 1 },
              "geometry": { "type": "LineString",
                            "coordinates": [[264000.0, 430000.0], [266000.0, 433000.0]] } }
        ]
    }"#;

    #[test]
    fn test_load_geojson_in_working_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "track.geojson", TRACK);
        let layer = load("track", &Source::vector(path), grid()).unwrap();
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.crs(), grid());
        assert_eq!(layer.name(), "track");
    }

    #[test]
    fn test_load_table_requires_declared_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "points.csv", "X,Y\n1,2\n");
        let source = Source::Table {
            path,
            x_field: "X".to_string(),
            y_field: "Y".to_string(),
            declared_epsg: None,
            delimiter: ',',
        };
        let err = load("points", &source, grid()).unwrap_err();
        assert!(matches!(err, Error::ReferenceMismatch { .. }));
    }

    #[test]
    fn test_load_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "buildings.csv",
            "X,Y,USE\n264500,431000,RESIDENTIAL\n265000,432000,COMMERCIAL\n",
        );
        let layer = load("buildings", &Source::table(path, "X", "Y", 29902), grid()).unwrap();
        assert_eq!(layer.len(), 2);
    }

    #[test]
    fn test_empty_source_is_data_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "empty.csv", "X,Y\n");
        let err = load("empty", &Source::table(path, "X", "Y", 29902), grid()).unwrap_err();
        assert!(matches!(err, Error::DataSource { .. }));
    }

    #[test]
    fn test_conflicting_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "track.geojson", TRACK);
        let source = Source::Vector {
            path,
            declared_epsg: Some(2157),
        };
        let err = load("track", &source, grid()).unwrap_err();
        assert!(matches!(err, Error::ReferenceMismatch { .. }));
    }

    #[test]
    fn test_catalog_insert_and_get() {
        let mut catalog = LayerCatalog::new(grid());
        let layer = GeometryLayer::new(
            "centre",
            grid(),
            vec![Feature::new(point!(x: 24400.0, y: 433580.0))],
        );
        catalog.insert(layer.clone()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("centre").unwrap().len(), 1);
        assert!(matches!(catalog.get("roads"), Err(Error::Config(_))));

        // duplicate names are a configuration error
        assert!(matches!(catalog.insert(layer), Err(Error::Config(_))));
    }

    #[test]
    fn test_catalog_rejects_foreign_reference() {
        let mut catalog = LayerCatalog::new(grid());
        let layer = GeometryLayer::new("towns", Crs::wgs84(), vec![]);
        let err = catalog.insert(layer).unwrap_err();
        assert!(matches!(err, Error::ReferenceMismatch { .. }));
    }

    #[test]
    fn test_catalog_replace() {
        let mut catalog = LayerCatalog::new(grid());
        catalog
            .insert(GeometryLayer::new(
                "buildings",
                grid(),
                vec![
                    Feature::new(point!(x: 0.0, y: 0.0)).with_attribute("USE", "RESIDENTIAL"),
                    Feature::new(point!(x: 1.0, y: 1.0)).with_attribute("USE", "COMMERCIAL"),
                ],
            ))
            .unwrap();
        let residential = catalog
            .get("buildings")
            .unwrap()
            .filter_eq("USE", "RESIDENTIAL")
            .unwrap();
        catalog.replace(residential).unwrap();
        assert_eq!(catalog.get("buildings").unwrap().len(), 1);
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["buildings"]);
    }
}
