pub mod basic_functions;

pub use basic_functions::{format_distance, title_case};
