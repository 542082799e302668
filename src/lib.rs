//! Reader and writer for the CCP4 MTZ reflection file format, plus
//! expansion of map-coefficient columns into a complex reciprocal-space
//! grid.

pub mod mtz;
pub mod sym;
pub mod types;

pub use mtz::{read_mtz_file, read_mtz_stream, Column, Dataset, Mtz, MtzError};
pub use types::cell::UnitCell;
pub use types::grid::CoefficientGrid;
