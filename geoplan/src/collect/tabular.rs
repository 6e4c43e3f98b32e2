use csv::ReaderBuilder;
use geo::Point;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geo_core::Crs;
use crate::geometric::layer::{AttributeValue, Attributes, Feature, GeometryLayer};

/// One table row, keyed by column header
pub type Row = Attributes;

/// Read a delimited text table into typed rows
pub fn read_table(name: &str, path: &Path, delimiter: char) -> Result<Vec<Row>> {
    let delimiter = u8::try_from(delimiter).map_err(|_| {
        Error::invalid_parameter("delimiter", format!("`{}` is not a single byte", delimiter))
    })?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)
        .map_err(|e| Error::data_source(name, format!("cannot open {}: {}", path.display(), e)))?;

    let headers = rdr
        .headers()
        .map_err(|e| Error::data_source(name, format!("unreadable header: {}", e)))?
        .clone();

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record =
            record.map_err(|e| Error::data_source(name, format!("row {}: {}", line + 1, e)))?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.to_string(), AttributeValue::from_raw(cell)))
            .collect();
        rows.push(row);
    }
    debug!(table = name, rows = rows.len(), "read table");
    Ok(rows)
}

/// Build a point layer from rows carrying numeric coordinate columns.
///
/// Every row must hold a number in both fields; the coordinate columns stay
/// in the attributes.
pub fn tabular_to_layer(
    name: &str,
    rows: Vec<Row>,
    x_field: &str,
    y_field: &str,
    crs: Crs,
) -> Result<GeometryLayer> {
    let mut features = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        let x = coordinate(name, &row, x_field, idx)?;
        let y = coordinate(name, &row, y_field, idx)?;
        features.push(Feature {
            geometry: Point::new(x, y).into(),
            attributes: row,
        });
    }
    Ok(GeometryLayer::new(name, crs, features))
}

fn coordinate(name: &str, row: &Row, field: &str, idx: usize) -> Result<f64> {
    match row.get(field) {
        None => Err(Error::schema(
            name,
            format!("row {} has no coordinate field `{}`", idx, field),
        )),
        Some(value) => value.as_f64().ok_or_else(|| {
            Error::schema(
                name,
                format!("row {}: `{}` = `{}` is not numeric", idx, field, value),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn grid() -> Crs {
        Crs::projected_metres(29902)
    }

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_table_and_build_points() {
        let file = write_csv("X,Y,USE\n267500,422500,RESIDENTIAL\n268100.5,423000,COMMERCIAL\n");
        let rows = read_table("buildings", file.path(), ',').unwrap();
        assert_eq!(rows.len(), 2);

        let layer = tabular_to_layer("buildings", rows, "X", "Y", grid()).unwrap();
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.crs(), grid());
        let first = &layer.features()[1];
        assert_eq!(first.geometry, Point::new(268100.5, 423000.0).into());
        assert_eq!(first.attribute("USE").unwrap().to_string(), "COMMERCIAL");
    }

    #[test]
    fn test_leading_zero_codes_are_kept() {
        let file = write_csv("X,Y,CODE\n265000.0,425000,01\n265100,425100,1\n");
        let rows = read_table("buildings", file.path(), ',').unwrap();
        let layer = tabular_to_layer("buildings", rows, "X", "Y", grid()).unwrap();
        assert_eq!(layer.features()[0].attribute("CODE").unwrap().to_string(), "01");

        let coded = layer.filter_eq("CODE", "01").unwrap();
        assert_eq!(coded.len(), 1);
        assert_eq!(coded.features()[0].geometry, Point::new(265000.0, 425000.0).into());
    }

    #[test]
    fn test_semicolon_delimiter() {
        let file = write_csv("E;N\n1;2\n");
        let rows = read_table("points", file.path(), ';').unwrap();
        let layer = tabular_to_layer("points", rows, "E", "N", grid()).unwrap();
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_missing_coordinate_field() {
        let file = write_csv("X,USE\n1,RESIDENTIAL\n");
        let rows = read_table("buildings", file.path(), ',').unwrap();
        let err = tabular_to_layer("buildings", rows, "X", "Y", grid()).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
        assert!(err.to_string().contains("`Y`"));
    }

    #[test]
    fn test_non_numeric_coordinate() {
        let file = write_csv("X,Y\n1,2\nabc,3\n");
        let rows = read_table("buildings", file.path(), ',').unwrap();
        let err = tabular_to_layer("buildings", rows, "X", "Y", grid()).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_empty_cell_is_not_numeric() {
        let file = write_csv("X,Y\n1,\n");
        let rows = read_table("buildings", file.path(), ',').unwrap();
        assert!(tabular_to_layer("buildings", rows, "X", "Y", grid()).is_err());
    }

    #[test]
    fn test_unreadable_table() {
        let err = read_table("buildings", Path::new("/no/such/table.csv"), ',').unwrap_err();
        assert!(matches!(err, Error::DataSource { .. }));
    }
}
