//! CCP4 MTZ reflection file support.
//!
//! MTZ binary layout:
//! - 80-byte preamble record: magic `MTZ `, 4-byte word offset of the
//!   header block, machine stamp encoding the file's byte order
//! - Reflection data from byte 80: `ncol * nreflections` float32 values,
//!   column-interleaved (one reflection = `ncol` consecutive floats)
//! - ASCII header block: fixed-width 80-byte records, space-padded, no
//!   line terminators, ending with `END`
//! - Trailer records (history, batch headers) up to `MTZENDOFHEADERS`
//!
//! Reading populates the [`Mtz`] model; writing formats a model back out.
//! [`Mtz::get_map_coef_as_grid`] expands an amplitude/phase column pair
//! into a symmetry-complete complex grid.

mod map_coef;
mod read;
mod write;

pub use read::{read_mtz_file, read_mtz_stream};

use thiserror::Error;

use crate::sym::{Op, SpaceGroup};
use crate::types::cell::UnitCell;

/// Errors raised by MTZ reading, writing and gridding.
#[derive(Error, Debug)]
pub enum MtzError {
    #[error("not an MTZ file: it does not start with 'MTZ '")]
    NotMtz,
    #[error("unexpected end of file while reading {0}")]
    Truncated(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("inconsistent MTZ: {0}")]
    Inconsistent(String),
    #[error("no reflection data")]
    NoData,
    #[error("no space group")]
    NoSpaceGroup,
    #[error("column not found: {0}")]
    MissingColumn(String),
    #[error("cannot parse symmetry triplet: {0}")]
    BadSymmetry(String),
    #[error("{path}: {source}")]
    File { path: String, source: Box<MtzError> },
}

/// One crystal/dataset block from the PROJECT/CRYSTAL/DATASET headers.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// File-assigned id; may or may not equal the dataset's index.
    pub id: i32,
    pub project_name: String,
    pub crystal_name: String,
    pub dataset_name: String,
    /// Per-dataset cell from DCELL; a dummy cell falls back to the
    /// file-level cell.
    pub cell: UnitCell,
    pub wavelength: f64,
}

/// One data column described by a COLUMN header.
#[derive(Debug, Clone)]
pub struct Column {
    pub dataset_id: i32,
    /// One-letter MTZ column type code (`H`, `F`, `P`, `Q`, ...).
    pub col_type: char,
    pub label: String,
    /// Value range as recorded in the header; NaN when absent.
    pub min_value: f32,
    pub max_value: f32,
    /// Producing program, from COLSRC.
    pub source: String,
    /// Position within [`Mtz::columns`], which is also the offset of this
    /// column's values within each reflection record.
    pub idx: usize,
}

/// In-memory MTZ file: header metadata plus the dense reflection matrix.
#[derive(Debug)]
pub struct Mtz {
    /// Whether the file's byte order matches the host's.
    pub same_byte_order: bool,
    /// 1-based offset of the ASCII header block, in 4-byte words.
    pub header_offset: i32,
    pub version_stamp: String,
    pub title: String,
    pub ncol: i32,
    pub nreflections: i32,
    pub nbatches: i32,
    pub sort_order: [i32; 5],
    /// Reciprocal resolution bounds (1/d²) from the RESO header.
    pub min_1_d2: f64,
    pub max_1_d2: f64,
    /// The file's missing-value sentinel; NaN unless VALM says otherwise.
    pub valm: f32,
    pub nsymop: i32,
    pub cell: UnitCell,
    pub spacegroup_number: i32,
    pub spacegroup_name: String,
    /// Operators from SYMM records, as stored in the file.
    pub symops: Vec<Op>,
    /// Table entry resolved from `spacegroup_name`; None when the name is
    /// unknown (the file still reads, with a warning).
    pub spacegroup: Option<&'static SpaceGroup>,
    pub datasets: Vec<Dataset>,
    pub columns: Vec<Column>,
    pub history: Vec<String>,
    /// `ncol * nreflections` floats, one reflection per `ncol`-chunk;
    /// empty when the data block was not read.
    pub data: Vec<f32>,
    /// Recoverable oddities collected while reading; also emitted through
    /// `log::warn!`.
    pub warnings: Vec<String>,
}

impl Default for Mtz {
    fn default() -> Self {
        Mtz {
            same_byte_order: true,
            header_offset: 0,
            version_stamp: String::new(),
            title: String::new(),
            ncol: 0,
            nreflections: 0,
            nbatches: 0,
            sort_order: [0; 5],
            min_1_d2: f64::NAN,
            max_1_d2: f64::NAN,
            valm: f32::NAN,
            nsymop: 0,
            cell: UnitCell::default(),
            spacegroup_number: 0,
            spacegroup_name: String::new(),
            symops: Vec::new(),
            spacegroup: None,
            datasets: Vec::new(),
            columns: Vec::new(),
            history: Vec::new(),
            data: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl Mtz {
    /// High-resolution limit in Angstroms, from the RESO bounds.
    pub fn resolution_high(&self) -> f64 {
        (1.0 / self.max_1_d2).sqrt()
    }

    /// Low-resolution limit in Angstroms, from the RESO bounds.
    pub fn resolution_low(&self) -> f64 {
        (1.0 / self.min_1_d2).sqrt()
    }

    /// Cell of the given dataset if it carries real crystal parameters,
    /// otherwise the file-level cell. Pass -1 for the file-level cell.
    pub fn get_cell(&self, dataset_id: i32) -> &UnitCell {
        for ds in &self.datasets {
            if ds.id == dataset_id && ds.cell.is_crystal() && ds.cell.a > 0.0 {
                return &ds.cell;
            }
        }
        &self.cell
    }

    /// Dataset with the given file-assigned id. `datasets[id]` is tried as
    /// a fast path before the linear scan.
    pub fn dataset(&self, id: i32) -> Result<&Dataset, MtzError> {
        if id >= 0 {
            if let Some(ds) = self.datasets.get(id as usize) {
                if ds.id == id {
                    return Ok(ds);
                }
            }
        }
        self.datasets
            .iter()
            .find(|ds| ds.id == id)
            .ok_or_else(|| MtzError::Inconsistent(format!("no dataset with ID {id}")))
    }

    pub(crate) fn last_dataset_mut(&mut self) -> Result<&mut Dataset, MtzError> {
        self.datasets.last_mut().ok_or_else(|| {
            MtzError::Inconsistent("dataset record before any PROJECT header".to_string())
        })
    }

    /// Number of columns carrying this exact label.
    pub fn count(&self, label: &str) -> usize {
        self.columns.iter().filter(|col| col.label == label).count()
    }

    pub fn column_with_label(&self, label: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.label == label)
    }

    pub fn column_with_type(&self, col_type: char) -> Option<&Column> {
        self.columns.iter().find(|col| col.col_type == col_type)
    }

    pub fn has_data(&self) -> bool {
        self.ncol >= 0
            && self.nreflections >= 0
            && self.data.len() == self.ncol as usize * self.nreflections as usize
    }

    /// Values of column `idx`, one per reflection: a stride adaptor over
    /// `(data, ncol, idx)`.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = f32> + '_ {
        debug_assert!(self.ncol > 0 || self.data.is_empty());
        self.data
            .iter()
            .skip(idx)
            .step_by(self.ncol.max(1) as usize)
            .copied()
    }

    /// Per-axis maxima of |h|, |k|, |l| over all reflections.
    pub fn max_abs_hkl(&self) -> [i32; 3] {
        let mut max_abs = [0; 3];
        if self.ncol < 3 {
            return max_abs;
        }
        for row in self.data.chunks_exact(self.ncol as usize) {
            for (m, &v) in max_abs.iter_mut().zip(row) {
                let v = (v as i32).abs();
                if v > *m {
                    *m = v;
                }
            }
        }
        max_abs
    }

    /// Recompute the 1/d² range over the file cell and every distinct
    /// dataset cell (adjacent duplicates skipped). Without any crystal
    /// cell the lower bound is 0.
    pub fn calculate_min_max_1_d2(&self) -> Result<[f64; 2], MtzError> {
        if !self.has_data() || self.ncol < 3 {
            return Err(MtzError::NoData);
        }
        let mut min = f64::INFINITY;
        let mut max = 0.0;
        if self.cell.is_crystal() && self.cell.a > 0.0 {
            self.extend_min_max_1_d2(&self.cell, &mut min, &mut max);
        }
        let mut prev_cell: Option<&UnitCell> = None;
        for ds in &self.datasets {
            if ds.cell.is_crystal()
                && ds.cell.a > 0.0
                && ds.cell != self.cell
                && prev_cell.map_or(true, |prev| ds.cell != *prev)
            {
                self.extend_min_max_1_d2(&ds.cell, &mut min, &mut max);
                prev_cell = Some(&ds.cell);
            }
        }
        if min == f64::INFINITY {
            min = 0.0;
        }
        Ok([min, max])
    }

    fn extend_min_max_1_d2(&self, cell: &UnitCell, min: &mut f64, max: &mut f64) {
        for row in self.data.chunks_exact(self.ncol as usize) {
            let res = cell.calculate_1_d2(row[0] as f64, row[1] as f64, row[2] as f64);
            if res < *min {
                *min = res;
            }
            if res > *max {
                *max = res;
            }
        }
    }

    /// Flip the recorded byte order; `header_offset` is byte-swapped along
    /// with it since it was read in file order.
    pub fn toggle_endianness(&mut self) {
        self.same_byte_order = !self.same_byte_order;
        self.header_offset = self.header_offset.swap_bytes();
    }

    pub(crate) fn warn(&mut self, message: String) {
        log::warn!("{message}");
        self.warnings.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with_columns(labels: &[&str]) -> Mtz {
        let mut mtz = Mtz::default();
        for (idx, label) in labels.iter().enumerate() {
            mtz.columns.push(Column {
                dataset_id: 1,
                col_type: if idx < 3 { 'H' } else { 'F' },
                label: (*label).to_string(),
                min_value: f32::NAN,
                max_value: f32::NAN,
                source: String::new(),
                idx,
            });
        }
        mtz.ncol = labels.len() as i32;
        mtz
    }

    #[test]
    fn column_lookup_and_count() {
        let mtz = model_with_columns(&["H", "K", "L", "F", "F"]);
        assert_eq!(mtz.column_with_label("F").unwrap().idx, 3);
        assert!(mtz.column_with_label("SIGF").is_none());
        assert_eq!(mtz.count("F"), 2);
        assert_eq!(mtz.count("H"), 1);
        assert_eq!(mtz.column_with_type('H').unwrap().label, "H");
    }

    #[test]
    fn column_values_stride_over_reflections() {
        let mut mtz = model_with_columns(&["H", "K", "L", "F"]);
        mtz.nreflections = 2;
        mtz.data = vec![1.0, 0.0, 0.0, 11.0, 2.0, 0.0, 0.0, 22.0];
        assert!(mtz.has_data());
        let f: Vec<f32> = mtz.column_values(3).collect();
        assert_eq!(f, vec![11.0, 22.0]);
        let h: Vec<f32> = mtz.column_values(0).collect();
        assert_eq!(h, vec![1.0, 2.0]);
    }

    #[test]
    fn dataset_lookup_never_misidentifies() {
        let mut mtz = Mtz::default();
        mtz.datasets.push(Dataset { id: 7, ..Dataset::default() });
        mtz.datasets.push(Dataset { id: 0, ..Dataset::default() });
        // Fast path (datasets[0].id == 7 != 0) must fall through to the scan.
        assert_eq!(mtz.dataset(0).unwrap().id, 0);
        assert_eq!(mtz.dataset(7).unwrap().id, 7);
        assert!(mtz.dataset(3).is_err());
    }

    #[test]
    fn toggle_endianness_twice_is_identity() {
        let mut mtz = Mtz::default();
        mtz.header_offset = 0x0102_0304;
        mtz.toggle_endianness();
        assert!(!mtz.same_byte_order);
        assert_eq!(mtz.header_offset, 0x0403_0201);
        mtz.toggle_endianness();
        assert!(mtz.same_byte_order);
        assert_eq!(mtz.header_offset, 0x0102_0304);
    }

    #[test]
    fn min_max_1_d2_without_crystal_cell_starts_at_zero() {
        let mut mtz = model_with_columns(&["H", "K", "L"]);
        mtz.nreflections = 1;
        mtz.data = vec![1.0, 0.0, 0.0];
        let range = mtz.calculate_min_max_1_d2().unwrap();
        assert_eq!(range, [0.0, 0.0]);
    }

    #[test]
    fn min_max_1_d2_uses_dataset_cells() {
        let mut mtz = model_with_columns(&["H", "K", "L"]);
        mtz.nreflections = 2;
        mtz.data = vec![1.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        mtz.cell = UnitCell::new(10.0, 10.0, 10.0, 90.0, 90.0, 90.0);
        mtz.datasets.push(Dataset {
            id: 1,
            cell: UnitCell::new(20.0, 20.0, 20.0, 90.0, 90.0, 90.0),
            ..Dataset::default()
        });
        let range = mtz.calculate_min_max_1_d2().unwrap();
        // min from the 20 A cell at h=1, max from the 10 A cell at h=2.
        assert!((range[0] - 0.0025).abs() < 1e-12);
        assert!((range[1] - 0.04).abs() < 1e-12);
    }

    #[test]
    fn min_max_1_d2_requires_data() {
        let mut mtz = model_with_columns(&["H", "K", "L"]);
        mtz.nreflections = 5;
        assert!(!mtz.has_data());
        assert!(matches!(mtz.calculate_min_max_1_d2(), Err(MtzError::NoData)));
    }
}
