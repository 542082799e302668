//! Core data types: unit cells and reciprocal-space grids.

pub mod cell;
pub mod grid;

pub use cell::UnitCell;
pub use grid::CoefficientGrid;
