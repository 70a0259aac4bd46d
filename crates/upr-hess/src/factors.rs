use crate::{FactorPosition, HessError, factor_order};

pub const ROTATION_NORM_TOLERANCE: f64 = 1e-10;
pub const MAX_DENSE_ORDER: usize = 1024;

/// Real core factor acting on rows/cols `(i, i+1)` as `[[c, -s], [s, c]]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoreRotation {
    pub c: f64,
    pub s: f64,
}

impl CoreRotation {
    #[must_use]
    pub fn from_angle(theta: f64) -> Self {
        let (s, c) = theta.sin_cos();
        Self { c, s }
    }

    #[must_use]
    pub const fn identity() -> Self {
        Self { c: 1.0, s: 0.0 }
    }

    pub fn validate(&self) -> Result<(), HessError> {
        if !self.c.is_finite() || !self.s.is_finite() {
            return Err(HessError::InvalidArgument(
                "core rotation entries must be finite",
            ));
        }
        let norm_sq = self.c.mul_add(self.c, self.s * self.s);
        if (norm_sq - 1.0).abs() > ROTATION_NORM_TOLERANCE {
            return Err(HessError::InvalidArgument(
                "core rotation is not unitary (c^2 + s^2 != 1)",
            ));
        }
        Ok(())
    }
}

/// Row-major square matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    order: usize,
    values: Vec<f64>,
}

impl DenseMatrix {
    pub fn identity(order: usize) -> Result<Self, HessError> {
        if order > MAX_DENSE_ORDER {
            return Err(HessError::InvalidArgument(
                "dense assembly order exceeded budget",
            ));
        }
        let mut values = vec![0.0; order * order];
        for idx in 0..order {
            values[idx * order + idx] = 1.0;
        }
        Ok(Self { order, values })
    }

    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.order || col >= self.order {
            return None;
        }
        self.values.get(row * self.order + col).copied()
    }

    /// Largest `r - c` over entries with magnitude above `tol`.
    #[must_use]
    pub fn lower_bandwidth(&self, tol: f64) -> usize {
        let mut bandwidth = 0;
        for row in 0..self.order {
            for col in 0..row {
                if self.values[row * self.order + col].abs() > tol {
                    bandwidth = bandwidth.max(row - col);
                    break;
                }
            }
        }
        bandwidth
    }

    #[must_use]
    pub fn is_upper_hessenberg(&self, tol: f64) -> bool {
        self.lower_bandwidth(tol) <= 1
    }

    fn apply_right(&mut self, slot: usize, rotation: CoreRotation) {
        let n = self.order;
        let CoreRotation { c, s } = rotation;
        for row in 0..n {
            let a = self.values[row * n + slot];
            let b = self.values[row * n + slot + 1];
            self.values[row * n + slot] = a.mul_add(c, b * s);
            self.values[row * n + slot + 1] = b.mul_add(c, -a * s);
        }
    }
}

/// Multiplies `flags.len() + 1` core factors in the order the flags encode.
pub fn assemble_factored(
    rotations: &[CoreRotation],
    flags: &[FactorPosition],
) -> Result<DenseMatrix, HessError> {
    if rotations.len() != flags.len() + 1 {
        return Err(HessError::InvalidArgument(
            "core rotation count must equal len(p)+1",
        ));
    }
    for rotation in rotations {
        rotation.validate()?;
    }

    let mut matrix = DenseMatrix::identity(flags.len() + 2)?;
    for slot in factor_order(flags)? {
        let rotation = rotations.get(slot).copied().ok_or(HessError::InternalFault(
            "factor order referenced a missing core rotation",
        ))?;
        matrix.apply_right(slot, rotation);
    }
    Ok(matrix)
}

pub fn verify_hessenberg_structure(
    rotations: &[CoreRotation],
    flags: &[FactorPosition],
    tol: f64,
) -> Result<bool, HessError> {
    if !tol.is_finite() || tol < 0.0 {
        return Err(HessError::InvalidArgument(
            "structure tolerance must be finite and >= 0",
        ));
    }
    Ok(assemble_factored(rotations, flags)?.is_upper_hessenberg(tol))
}
