//! Space-group symmetry: operator triplets, group operations, and a table
//! of common space groups.
//!
//! An operator is a 3x3 integer rotation matrix plus a translation vector
//! stored in 24ths; every translation occurring in the 230 space groups is
//! a multiple of 1/24, so the representation is exact. A space group is a
//! set of coset representatives combined with the centering translations
//! implied by its lattice letter.

use std::f64::consts::PI;

use thiserror::Error;

/// Denominator of operator translations: all space-group translations are
/// multiples of 1/24.
pub const DEN: i32 = 24;

const NEG_IDENTITY: [[i32; 3]; 3] = [[-1, 0, 0], [0, -1, 0], [0, 0, -1]];

#[derive(Error, Debug)]
pub enum SymError {
    #[error("cannot parse symmetry triplet: {0}")]
    BadTriplet(String),
}

/// A single symmetry operation: rotation matrix plus fractional translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Op {
    pub rot: [[i32; 3]; 3],
    /// Translation components in units of 1/[`DEN`].
    pub tran: [i32; 3],
}

impl Op {
    pub const fn identity() -> Op {
        Op {
            rot: [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
            tran: [0, 0, 0],
        }
    }

    /// Transform Miller indices: row vector times rotation matrix, the
    /// reciprocal-space counterpart of applying `rot` to a position.
    pub fn apply_to_hkl(&self, hkl: [i32; 3]) -> [i32; 3] {
        let mut out = [0; 3];
        for (i, o) in out.iter_mut().enumerate() {
            *o = hkl[0] * self.rot[0][i] + hkl[1] * self.rot[1][i] + hkl[2] * self.rot[2][i];
        }
        out
    }

    /// Translational phase shift of a structure factor under this
    /// operation, in radians: `-2π (hkl · tran)`.
    pub fn phase_shift(&self, hkl: [i32; 3]) -> f64 {
        let ht = hkl[0] * self.tran[0] + hkl[1] * self.tran[1] + hkl[2] * self.tran[2];
        -2.0 * PI * f64::from(ht) / f64::from(DEN)
    }

    /// The same rotation with a centering translation folded in.
    pub fn add_centering(&self, cen: [i32; 3]) -> Op {
        let mut tran = self.tran;
        for (t, c) in tran.iter_mut().zip(cen) {
            *t = (*t + c).rem_euclid(DEN);
        }
        Op { rot: self.rot, tran }
    }

    /// Format as a coordinate triplet, e.g. `-y,x-y,z+1/3`.
    pub fn triplet(&self) -> String {
        let rows: Vec<String> = (0..3).map(|row| self.triplet_row(row)).collect();
        rows.join(",")
    }

    fn triplet_row(&self, row: usize) -> String {
        let mut s = String::new();
        for (j, letter) in ['x', 'y', 'z'].into_iter().enumerate() {
            let r = self.rot[row][j];
            if r == 0 {
                continue;
            }
            if r < 0 {
                s.push('-');
            } else if !s.is_empty() {
                s.push('+');
            }
            if r.abs() != 1 {
                s.push_str(&r.abs().to_string());
            }
            s.push(letter);
        }
        let t = self.tran[row];
        if t != 0 {
            if !s.is_empty() && t > 0 {
                s.push('+');
            } else if t < 0 {
                s.push('-');
            }
            let g = gcd(t.abs(), DEN);
            s.push_str(&format!("{}/{}", t.abs() / g, DEN / g));
        }
        if s.is_empty() {
            s.push('0');
        }
        s
    }
}

/// Parse a coordinate triplet such as `X,Y,Z` or `-x,y+1/2,-z`.
pub fn parse_triplet(text: &str) -> Result<Op, SymError> {
    let bad = || SymError::BadTriplet(text.trim().to_string());
    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != 3 {
        return Err(bad());
    }
    let mut rot = [[0; 3]; 3];
    let mut tran = [0; 3];
    for (row, part) in parts.iter().enumerate() {
        let (r, t) = parse_triplet_part(part).ok_or_else(bad)?;
        rot[row] = r;
        tran[row] = t;
    }
    Ok(Op { rot, tran })
}

/// One comma-separated component; returns the rotation row and the
/// translation in 24ths, normalized into [0, DEN).
fn parse_triplet_part(part: &str) -> Option<([i32; 3], i32)> {
    let mut rot = [0i32; 3];
    let mut tran = 0i32;
    let bytes = part.as_bytes();
    let mut i = 0;
    let mut sign = 1i32;
    let mut seen_term = false;
    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\t' => i += 1,
            b'+' => {
                sign = 1;
                i += 1;
            }
            b'-' => {
                sign = -1;
                i += 1;
            }
            b'x' | b'X' | b'y' | b'Y' | b'z' | b'Z' => {
                let axis = match bytes[i].to_ascii_lowercase() {
                    b'x' => 0,
                    b'y' => 1,
                    _ => 2,
                };
                rot[axis] += sign;
                sign = 1;
                seen_term = true;
                i += 1;
            }
            b'0'..=b'9' => {
                let (num, after) = scan_int(bytes, i);
                i = after;
                if i < bytes.len() && bytes[i] == b'/' {
                    let (den, after) = scan_int(bytes, i + 1);
                    i = after;
                    if den == 0 || (DEN * num) % den != 0 {
                        return None;
                    }
                    tran += sign * DEN * num / den;
                } else {
                    tran += sign * DEN * num;
                }
                sign = 1;
                seen_term = true;
            }
            _ => return None,
        }
    }
    if !seen_term {
        return None;
    }
    Some((rot, tran.rem_euclid(DEN)))
}

fn scan_int(bytes: &[u8], mut i: usize) -> (i32, usize) {
    let mut value = 0i32;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value * 10 + i32::from(bytes[i] - b'0');
        i += 1;
    }
    (value, i)
}

fn gcd(mut a: i32, mut b: i32) -> i32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// The operations of a space group: coset representatives plus centering
/// translations.
#[derive(Debug, Clone)]
pub struct GroupOps {
    pub sym_ops: Vec<Op>,
    /// Centering translations in units of 1/[`DEN`]; the first entry is
    /// always `[0, 0, 0]`.
    pub cen_ops: Vec<[i32; 3]>,
}

impl GroupOps {
    /// Total number of operations, centerings included.
    pub fn order(&self) -> usize {
        self.sym_ops.len() * self.cen_ops.len()
    }

    /// Whether the group contains the inversion.
    pub fn is_centric(&self) -> bool {
        self.sym_ops.iter().any(|op| op.rot == NEG_IDENTITY)
    }

    /// All `order()` operations, centering-major (the order CCP4 SYMM
    /// records are written in).
    pub fn iter(&self) -> impl Iterator<Item = Op> + '_ {
        self.cen_ops
            .iter()
            .flat_map(move |&cen| self.sym_ops.iter().map(move |op| op.add_centering(cen)))
    }
}

/// One entry of the space-group table.
#[derive(Debug)]
pub struct SpaceGroup {
    /// CCP4 space-group number.
    pub ccp4_number: i32,
    /// Hermann-Mauguin symbol, e.g. `P 21 21 21`.
    pub hm: &'static str,
    point_group: &'static str,
    /// Coset representatives as `;`-separated triplets.
    triplets: &'static str,
}

impl SpaceGroup {
    pub fn lattice_type(&self) -> char {
        self.hm.as_bytes()[0] as char
    }

    /// Point-group symbol without the `PG` prefix, e.g. `222`.
    pub fn point_group_hm(&self) -> &'static str {
        self.point_group
    }

    pub fn operations(&self) -> GroupOps {
        let sym_ops = self
            .triplets
            .split(';')
            .map(|t| parse_triplet(t).expect("triplet in the space-group table"))
            .collect();
        GroupOps {
            sym_ops,
            cen_ops: centering_vectors(self.lattice_type()),
        }
    }
}

/// Centering translations (in 24ths) implied by a lattice letter.
fn centering_vectors(lattice: char) -> Vec<[i32; 3]> {
    let h = DEN / 2;
    match lattice {
        'A' => vec![[0, 0, 0], [0, h, h]],
        'B' => vec![[0, 0, 0], [h, 0, h]],
        'C' => vec![[0, 0, 0], [h, h, 0]],
        'I' => vec![[0, 0, 0], [h, h, h]],
        'F' => vec![[0, 0, 0], [0, h, h], [h, 0, h], [h, h, 0]],
        // Rhombohedral lattice in the hexagonal setting.
        'R' => vec![[0, 0, 0], [16, 8, 8], [8, 16, 16]],
        _ => vec![[0, 0, 0]],
    }
}

static SPACEGROUP_TABLE: &[SpaceGroup] = &[
    SpaceGroup { ccp4_number: 1, hm: "P 1", point_group: "1", triplets: "x,y,z" },
    SpaceGroup { ccp4_number: 2, hm: "P -1", point_group: "-1", triplets: "x,y,z;-x,-y,-z" },
    SpaceGroup { ccp4_number: 3, hm: "P 2", point_group: "2", triplets: "x,y,z;-x,y,-z" },
    SpaceGroup { ccp4_number: 4, hm: "P 21", point_group: "2", triplets: "x,y,z;-x,y+1/2,-z" },
    SpaceGroup { ccp4_number: 5, hm: "C 2", point_group: "2", triplets: "x,y,z;-x,y,-z" },
    SpaceGroup {
        ccp4_number: 16,
        hm: "P 2 2 2",
        point_group: "222",
        triplets: "x,y,z;-x,-y,z;-x,y,-z;x,-y,-z",
    },
    SpaceGroup {
        ccp4_number: 18,
        hm: "P 21 21 2",
        point_group: "222",
        triplets: "x,y,z;-x,-y,z;-x+1/2,y+1/2,-z;x+1/2,-y+1/2,-z",
    },
    SpaceGroup {
        ccp4_number: 19,
        hm: "P 21 21 21",
        point_group: "222",
        triplets: "x,y,z;-x+1/2,-y,z+1/2;-x,y+1/2,-z+1/2;x+1/2,-y+1/2,-z",
    },
    SpaceGroup {
        ccp4_number: 20,
        hm: "C 2 2 21",
        point_group: "222",
        triplets: "x,y,z;-x,-y,z+1/2;-x,y,-z+1/2;x,-y,-z",
    },
    SpaceGroup {
        ccp4_number: 23,
        hm: "I 2 2 2",
        point_group: "222",
        triplets: "x,y,z;-x,-y,z;-x,y,-z;x,-y,-z",
    },
    SpaceGroup {
        ccp4_number: 75,
        hm: "P 4",
        point_group: "4",
        triplets: "x,y,z;-x,-y,z;-y,x,z;y,-x,z",
    },
    SpaceGroup {
        ccp4_number: 76,
        hm: "P 41",
        point_group: "4",
        triplets: "x,y,z;-x,-y,z+1/2;-y,x,z+1/4;y,-x,z+3/4",
    },
    SpaceGroup {
        ccp4_number: 96,
        hm: "P 43 21 2",
        point_group: "422",
        triplets: "x,y,z;-x,-y,z+1/2;-y+1/2,x+1/2,z+3/4;y+1/2,-x+1/2,z+1/4;\
                   -x+1/2,y+1/2,-z+3/4;x+1/2,-y+1/2,-z+1/4;y,x,-z;-y,-x,-z+1/2",
    },
    SpaceGroup {
        ccp4_number: 143,
        hm: "P 3",
        point_group: "3",
        triplets: "x,y,z;-y,x-y,z;-x+y,-x,z",
    },
    SpaceGroup {
        ccp4_number: 146,
        hm: "R 3",
        point_group: "3",
        triplets: "x,y,z;-y,x-y,z;-x+y,-x,z",
    },
];

/// Look up a space group by Hermann-Mauguin name; spacing and case are
/// ignored, so `P212121` and `p 21 21 21` both resolve.
pub fn find_spacegroup_by_name(name: &str) -> Option<&'static SpaceGroup> {
    let wanted = normalize_hm(name);
    SPACEGROUP_TABLE.iter().find(|sg| normalize_hm(sg.hm) == wanted)
}

fn normalize_hm(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
