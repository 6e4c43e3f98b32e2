pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod render;
pub mod theme;

pub use error::{Error, Result};
