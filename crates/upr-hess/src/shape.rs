use std::collections::VecDeque;

use crate::{FactorPosition, HessError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactorShape {
    /// Every pair descending: `Q_0 Q_1 ... Q_{n-2}`.
    Hessenberg,
    /// Every pair ascending: `Q_{n-2} ... Q_1 Q_0`.
    InverseHessenberg,
    /// Strictly alternating pairs.
    Cmv,
    Mixed,
}

impl FactorShape {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hessenberg => "hessenberg",
            Self::InverseHessenberg => "inverse_hessenberg",
            Self::Cmv => "cmv",
            Self::Mixed => "mixed",
        }
    }

    pub fn from_token(token: &str) -> Result<Self, HessError> {
        match token.trim().to_ascii_lowercase().as_str() {
            "hessenberg" => Ok(Self::Hessenberg),
            "inverse_hessenberg" => Ok(Self::InverseHessenberg),
            "cmv" => Ok(Self::Cmv),
            "mixed" => Ok(Self::Mixed),
            _ => Err(HessError::InvalidArgument(
                "factor shape is not one of hessenberg|inverse_hessenberg|cmv|mixed",
            )),
        }
    }
}

#[must_use]
pub fn classify_shape(flags: &[FactorPosition]) -> FactorShape {
    if flags.iter().all(|flag| !flag.is_ascending()) {
        return FactorShape::Hessenberg;
    }
    if flags.iter().all(|flag| flag.is_ascending()) {
        return FactorShape::InverseHessenberg;
    }
    if flags.len() >= 2 && flags.windows(2).all(|pair| pair[0] != pair[1]) {
        return FactorShape::Cmv;
    }
    FactorShape::Mixed
}

/// Product order of the `flags.len() + 1` core factors.
///
/// Factor `i+1` only fails to commute with factors `i` and `i+2`, so placing it
/// at the far right (descending) or far left (ascending) of the factors placed
/// so far respects every pair constraint.
pub fn factor_order(flags: &[FactorPosition]) -> Result<Vec<usize>, HessError> {
    let factor_count = flags.len() + 1;
    let mut order = VecDeque::with_capacity(factor_count);
    order.push_back(0usize);
    for (idx, flag) in flags.iter().enumerate() {
        match flag {
            FactorPosition::Descending => order.push_back(idx + 1),
            FactorPosition::Ascending => order.push_front(idx + 1),
        }
    }

    let order: Vec<usize> = order.into_iter().collect();
    let mut seen = vec![false; factor_count];
    for &factor in &order {
        match seen.get_mut(factor) {
            Some(slot) if !*slot => *slot = true,
            _ => {
                return Err(HessError::InternalFault(
                    "factor traversal did not produce a permutation",
                ));
            }
        }
    }
    if order.len() != factor_count {
        return Err(HessError::InternalFault(
            "factor traversal did not produce a permutation",
        ));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::{FactorShape, classify_shape, factor_order};
    use crate::FactorPosition::{Ascending as A, Descending as D};
    use crate::{FactorPosition, HessRuntimeMode, PositionVector};

    fn position_of(order: &[usize], factor: usize) -> usize {
        order
            .iter()
            .position(|&f| f == factor)
            .expect("factor present")
    }

    #[test]
    fn shapes_classify_canonical_orderings() {
        assert_eq!(classify_shape(&[]), FactorShape::Hessenberg);
        assert_eq!(classify_shape(&[D, D, D]), FactorShape::Hessenberg);
        assert_eq!(classify_shape(&[A]), FactorShape::InverseHessenberg);
        assert_eq!(classify_shape(&[A, A, A]), FactorShape::InverseHessenberg);
        assert_eq!(classify_shape(&[A, D, A, D]), FactorShape::Cmv);
        assert_eq!(classify_shape(&[D, A]), FactorShape::Cmv);
        assert_eq!(classify_shape(&[D, D, A]), FactorShape::Mixed);
    }

    #[test]
    fn shape_tokens_round_trip_and_fail_closed() {
        for shape in [
            FactorShape::Hessenberg,
            FactorShape::InverseHessenberg,
            FactorShape::Cmv,
            FactorShape::Mixed,
        ] {
            assert_eq!(FactorShape::from_token(shape.as_str()), Ok(shape));
        }
        let err = FactorShape::from_token("banded").expect_err("unknown shape");
        assert_eq!(err.reason_code(), "upr_hess_invalid_argument");
    }

    #[test]
    fn factor_order_matches_extreme_shapes() {
        assert_eq!(factor_order(&[]).expect("single factor"), vec![0]);
        assert_eq!(factor_order(&[D, D, D]).expect("hess"), vec![0, 1, 2, 3]);
        assert_eq!(factor_order(&[A, A, A]).expect("inv"), vec![3, 2, 1, 0]);
        assert_eq!(factor_order(&[D, A]).expect("mixed"), vec![2, 0, 1]);
    }

    #[test]
    fn factor_order_respects_every_pair_constraint() {
        let raw = [0, 1, 1, 0, 1, 0, 0, 1];
        let vector = PositionVector::from_raw(&raw, HessRuntimeMode::Hardened).expect("valid");
        let order = factor_order(vector.flags()).expect("order");
        assert_eq!(order.len(), raw.len() + 1);
        for (idx, flag) in vector.flags().iter().enumerate() {
            let left = position_of(&order, idx);
            let right = position_of(&order, idx + 1);
            match flag {
                FactorPosition::Descending => assert!(left < right, "pair {idx}"),
                FactorPosition::Ascending => assert!(left > right, "pair {idx}"),
            }
        }
    }
}
