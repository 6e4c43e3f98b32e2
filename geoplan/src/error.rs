use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading layers, composing a map or running a query.
///
/// None of these are recoverable mid-run: the first one aborts the run and
/// no partial image is written.
#[derive(Debug, Error)]
pub enum Error {
    /// Source missing, unreadable or empty
    #[error("data source `{name}`: {reason}")]
    DataSource { name: String, reason: String },

    /// Required attribute absent or mistyped
    #[error("schema error in `{layer}`: {reason}")]
    Schema { layer: String, reason: String },

    /// Coordinate reference or unit disagreement between two inputs
    #[error("reference mismatch in {context}: {reason}")]
    ReferenceMismatch { context: String, reason: String },

    /// Output destination not writable
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// GEOS or PROJ refused an otherwise valid input
    #[error("geometry operation `{operation}` failed: {reason}")]
    Geometry { operation: String, reason: String },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("rendering failed: {0}")]
    Render(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn data_source(name: impl Into<String>, reason: impl ToString) -> Self {
        Error::DataSource {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn schema(layer: impl Into<String>, reason: impl ToString) -> Self {
        Error::Schema {
            layer: layer.into(),
            reason: reason.to_string(),
        }
    }

    pub fn reference_mismatch(context: impl Into<String>, reason: impl ToString) -> Self {
        Error::ReferenceMismatch {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    pub fn geometry(operation: impl Into<String>, reason: impl ToString) -> Self {
        Error::Geometry {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_parameter(name: impl Into<String>, reason: impl ToString) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failing_input() {
        let err = Error::data_source("track", "file not found");
        assert_eq!(err.to_string(), "data source `track`: file not found");

        let err = Error::schema("buildings", "field `X` is missing");
        assert!(err.to_string().contains("buildings"));
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = Error::Io {
            path: PathBuf::from("/nope/map.png"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
        };
        assert!(err.to_string().contains("/nope/map.png"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
