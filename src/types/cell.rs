//! Unit cell parameters and derived reciprocal-space quantities.

use glam::{DMat3, DVec3};

/// Crystallographic unit cell: axis lengths in Angstroms, angles in degrees.
///
/// A default-constructed cell has unit axes and right angles; such a cell
/// is a placeholder meaning "no cell parameters known" and reports
/// `is_crystal() == false`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitCell {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Reciprocal metric tensor, so that `1/d² = hᵀ · G* · h`.
    reciprocal_metric: DMat3,
}

impl Default for UnitCell {
    fn default() -> Self {
        UnitCell::new(1.0, 1.0, 1.0, 90.0, 90.0, 90.0)
    }
}

impl UnitCell {
    pub fn new(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let cos_gamma = gamma.to_radians().cos();
        // Direct metric tensor G; its inverse is the reciprocal metric.
        let metric = DMat3::from_cols(
            DVec3::new(a * a, a * b * cos_gamma, a * c * cos_beta),
            DVec3::new(a * b * cos_gamma, b * b, b * c * cos_alpha),
            DVec3::new(a * c * cos_beta, b * c * cos_alpha, c * c),
        );
        let reciprocal_metric = if metric.determinant().abs() > 1e-9 {
            metric.inverse()
        } else {
            DMat3::ZERO
        };
        UnitCell {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
            reciprocal_metric,
        }
    }

    /// Whether the cell carries real crystal parameters. A dummy cell with
    /// `a == 1` marks the absence of a CELL/DCELL record.
    pub fn is_crystal(&self) -> bool {
        self.a != 1.0
    }

    /// Reciprocal resolution `1/d²` of a reflection.
    pub fn calculate_1_d2(&self, h: f64, k: f64, l: f64) -> f64 {
        let hkl = DVec3::new(h, k, l);
        hkl.dot(self.reciprocal_metric * hkl)
    }
}
