pub mod association;
pub mod bbox;
pub mod config;
pub mod cost_matrix;
pub mod detection;
pub mod error;
pub mod evaluation;
pub mod interpolate;
pub mod lifecycle;
pub mod mot;
pub mod results;
pub mod track;
pub mod tracker;

pub use tracker::*;
