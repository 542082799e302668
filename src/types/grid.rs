//! Reciprocal-space grid of complex structure-factor coefficients.

use ndarray::Array3;
use num_complex::Complex;

use crate::sym::SpaceGroup;
use crate::types::cell::UnitCell;

/// Dense 3D grid over reciprocal space.
///
/// The grid is indexed by Miller indices with wrap-around: index `h` maps
/// to `h mod nu` along the first axis, so negative indices address the
/// upper half of the axis. `data[[0, 0, 0]]` is the F(0,0,0) term.
#[derive(Debug, Clone)]
pub struct CoefficientGrid {
    pub unit_cell: UnitCell,
    pub space_group: Option<&'static SpaceGroup>,
    pub data: Array3<Complex<f32>>,
}

impl CoefficientGrid {
    pub fn new(unit_cell: UnitCell, space_group: Option<&'static SpaceGroup>) -> Self {
        CoefficientGrid {
            unit_cell,
            space_group,
            data: Array3::zeros((0, 0, 0)),
        }
    }

    /// Allocate the grid with per-axis extents of at least `limit`,
    /// rounded to FFT-friendly sizes (products of 2, 3 and 5).
    ///
    /// With `denser` the extents only ever round up; otherwise they round
    /// down to the nearest friendly size (but never below 1).
    pub fn set_size_from(&mut self, limit: [f64; 3], denser: bool) {
        let nu = good_size(limit[0], denser);
        let nv = good_size(limit[1], denser);
        let nw = good_size(limit[2], denser);
        self.data = Array3::zeros((nu, nv, nw));
    }

    pub fn size(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Array position of Miller index (h, k, l), wrapping negatives.
    pub fn index_of(&self, h: i32, k: i32, l: i32) -> [usize; 3] {
        let (nu, nv, nw) = self.data.dim();
        [wrap(h, nu), wrap(k, nv), wrap(l, nw)]
    }

    /// Coefficient at Miller index (h, k, l).
    pub fn get(&self, h: i32, k: i32, l: i32) -> Complex<f32> {
        self.data[self.index_of(h, k, l)]
    }

    /// Fill every still-empty grid point (-h,-k,-l) with the complex
    /// conjugate of its Friedel mate (h,k,l). Points whose mate is also
    /// empty stay empty.
    pub fn add_friedel_mates(&mut self) {
        let (nu, nv, nw) = self.data.dim();
        let zero = Complex::new(0.0, 0.0);
        for u in 0..nu {
            for v in 0..nv {
                for w in 0..nw {
                    if self.data[[u, v, w]] != zero {
                        continue;
                    }
                    let mate = [(nu - u) % nu, (nv - v) % nv, (nw - w) % nw];
                    let value = self.data[mate];
                    if value != zero {
                        self.data[[u, v, w]] = value.conj();
                    }
                }
            }
        }
    }
}

fn wrap(index: i32, n: usize) -> usize {
    debug_assert!(n > 0);
    index.rem_euclid(n as i32) as usize
}

/// Smallest (largest) number >= (<=) `limit` whose prime factors are all
/// in {2, 3, 5}.
fn good_size(limit: f64, denser: bool) -> usize {
    if denser {
        let mut n = limit.ceil().max(1.0) as usize;
        while !is_friendly(n) {
            n += 1;
        }
        n
    } else {
        let mut n = limit.floor().max(1.0) as usize;
        while n > 1 && !is_friendly(n) {
            n -= 1;
        }
        n
    }
}

fn is_friendly(mut n: usize) -> bool {
    for f in [2, 3, 5] {
        while n % f == 0 {
            n /= f;
        }
    }
    n == 1
}
