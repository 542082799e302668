//! Expansion of an amplitude/phase column pair into a symmetry-complete
//! reciprocal-space grid of complex map coefficients.

use num_complex::Complex;

use super::{Mtz, MtzError};
use crate::sym::Op;
use crate::types::grid::CoefficientGrid;

impl Mtz {
    /// Build the complex coefficient grid from the amplitude column
    /// `f_label` and the phase column `phi_label` (degrees).
    ///
    /// Each stored reflection is written at its own index, then propagated
    /// to the images under every non-identity operator with the phase
    /// shifted by the operator's translation, first writer winning. For
    /// acentric groups the remaining holes are filled with Friedel mates.
    /// `size` is a lower bound on the grid dimensions; each axis extends
    /// at least to `2 * max|index| + 1` and rounds up to an FFT-friendly
    /// size.
    pub fn get_map_coef_as_grid(
        &self,
        f_label: &str,
        phi_label: &str,
        size: [i32; 3],
    ) -> Result<CoefficientGrid, MtzError> {
        if !self.has_data() || self.ncol < 5 {
            return Err(MtzError::NoData);
        }
        let sg = self.spacegroup.ok_or(MtzError::NoSpaceGroup)?;
        let f_col = self
            .column_with_label(f_label)
            .ok_or_else(|| MtzError::MissingColumn(f_label.to_string()))?;
        let phi_col = self
            .column_with_label(phi_label)
            .ok_or_else(|| MtzError::MissingColumn(phi_label.to_string()))?;

        let mut grid = CoefficientGrid::new(self.cell.clone(), Some(sg));
        let max_abs = self.max_abs_hkl();
        let mut limit = [0.0f64; 3];
        for (lim, (&hint, &max)) in limit.iter_mut().zip(size.iter().zip(&max_abs)) {
            *lim = f64::from(hint.max(2 * max + 1));
        }
        grid.set_size_from(limit, true);

        let ops = sg.operations();
        let mut sym_ops: Vec<Op> = ops.sym_ops.clone();
        sym_ops.retain(|op| *op != Op::identity());

        let zero = Complex::new(0.0f32, 0.0);
        for row in self.data.chunks_exact(self.ncol as usize) {
            let h = row[0] as i32;
            let k = row[1] as i32;
            let l = row[2] as i32;
            let f = row[f_col.idx];
            let phi = f64::from(row[phi_col.idx]).to_radians();
            if !(f > 0.0) {
                continue;
            }
            let idx = grid.index_of(h, k, l);
            grid.data[idx] = Complex::from_polar(f, phi as f32);
            for op in &sym_ops {
                let hkl = op.apply_to_hkl([h, k, l]);
                let image = grid.index_of(hkl[0], hkl[1], hkl[2]);
                if grid.data[image] == zero {
                    let shifted_phi = phi - op.phase_shift(hkl);
                    grid.data[image] = Complex::from_polar(f, shifted_phi as f32);
                }
            }
        }
        if !ops.is_centric() {
            grid.add_friedel_mates();
        }
        Ok(grid)
    }
}
