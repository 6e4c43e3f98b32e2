pub mod catalog;
pub mod source;
pub mod tabular;
pub(crate) mod vector;

pub use catalog::{load, LayerCatalog};
pub use source::Source;
pub use tabular::{read_table, tabular_to_layer, Row};
