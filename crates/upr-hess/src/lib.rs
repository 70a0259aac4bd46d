#![forbid(unsafe_code)]

//! Position-vector bookkeeping for unitary-plus-rank-one factorizations.
//!
//! A factored matrix of order `n` is a product of `n-1` core factors
//! `Q_0 .. Q_{n-2}`, each a 2x2 unitary acting on rows `(i, i+1)`. Neighbouring
//! factors do not commute, so the product is only determined once the relative
//! position of every neighbour pair is fixed. The position vector `p` holds one
//! flag per pair: `0` puts `Q_{i+1}` to the right of `Q_i`, `1` puts it to the
//! left. The product is upper Hessenberg exactly when every flag is `0`.

mod factors;
mod shape;

pub use factors::{
    CoreRotation, DenseMatrix, MAX_DENSE_ORDER, ROTATION_NORM_TOLERANCE, assemble_factored,
    verify_hessenberg_structure,
};
pub use shape::{FactorShape, classify_shape, factor_order};

use core::fmt;

pub const HESS_PACKET_ID: &str = "UPR-P1-001";
pub const HESSENBERG_FLAG: i32 = 1;
pub const NOT_HESSENBERG_FLAG: i32 = 0;
pub const MAX_POSITION_VECTOR_LEN: usize = (i32::MAX as usize) - 2;
pub const HESS_OK_REASON_CODE: &str = "upr_hess_ok";

pub const HESS_REASON_CODES: [&str; 2] = ["upr_hess_invalid_argument", "upr_hess_internal_fault"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HessRuntimeMode {
    /// Reads flags the way a Fortran `LOGICAL` is read: any nonzero is set.
    Strict,
    /// Accepts only `0` and `1`.
    #[default]
    Hardened,
}

impl HessRuntimeMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Hardened => "hardened",
        }
    }

    pub fn from_token(token: &str) -> Result<Self, HessError> {
        match token.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "hardened" => Ok(Self::Hardened),
            _ => Err(HessError::InvalidArgument(
                "runtime mode is not one of strict|hardened",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HessError {
    InvalidArgument(&'static str),
    InternalFault(&'static str),
}

impl HessError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "upr_hess_invalid_argument",
            Self::InternalFault(_) => "upr_hess_internal_fault",
        }
    }
}

impl fmt::Display for HessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::InternalFault(msg) => write!(f, "internal fault: {msg}"),
        }
    }
}

impl std::error::Error for HessError {}

/// Relative position of core factor `Q_{i+1}` with respect to `Q_i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactorPosition {
    /// `Q_{i+1}` multiplies to the right of `Q_i` (raw flag `0`).
    Descending,
    /// `Q_{i+1}` multiplies to the left of `Q_i` (raw flag `1`).
    Ascending,
}

impl FactorPosition {
    pub fn from_raw(raw: i32, mode: HessRuntimeMode) -> Result<Self, HessError> {
        match (raw, mode) {
            (0, _) => Ok(Self::Descending),
            (1, _) | (_, HessRuntimeMode::Strict) => Ok(Self::Ascending),
            (_, HessRuntimeMode::Hardened) => Err(HessError::InvalidArgument(
                "position flag outside {0,1}",
            )),
        }
    }

    #[must_use]
    pub fn as_raw(self) -> i32 {
        match self {
            Self::Descending => 0,
            Self::Ascending => 1,
        }
    }

    #[must_use]
    pub fn is_ascending(self) -> bool {
        matches!(self, Self::Ascending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PositionVector {
    flags: Vec<FactorPosition>,
}

impl PositionVector {
    pub fn from_raw(raw: &[i32], mode: HessRuntimeMode) -> Result<Self, HessError> {
        if raw.len() > MAX_POSITION_VECTOR_LEN {
            return Err(HessError::InvalidArgument(
                "position vector length exceeds i32 order budget",
            ));
        }
        let flags = raw
            .iter()
            .map(|&value| FactorPosition::from_raw(value, mode))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { flags })
    }

    #[must_use]
    pub fn from_flags(flags: Vec<FactorPosition>) -> Self {
        Self { flags }
    }

    #[must_use]
    pub fn flags(&self) -> &[FactorPosition] {
        &self.flags
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Order of the matrix this vector fully describes.
    #[must_use]
    pub fn order(&self) -> usize {
        self.flags.len() + 2
    }

    #[must_use]
    pub fn to_raw(&self) -> Vec<i32> {
        self.flags.iter().map(|flag| flag.as_raw()).collect()
    }

    /// Flags read by an order-`n` check.
    pub fn prefix(&self, n: Option<i32>) -> Result<&[FactorPosition], HessError> {
        let order = resolve_order(self.flags.len(), n)?;
        self.flags
            .get(..scanned_slots(order))
            .ok_or(HessError::InternalFault(
                "resolved order exceeded position vector",
            ))
    }

    /// Index of the first ascending pair. The first entry below the
    /// subdiagonal appears at `(i+2, i)` for this `i`.
    #[must_use]
    pub fn first_ascending(&self) -> Option<usize> {
        self.flags.iter().position(|flag| flag.is_ascending())
    }

    #[must_use]
    pub fn is_hessenberg(&self) -> bool {
        is_hessenberg_ordering(&self.flags)
    }

    #[must_use]
    pub fn shape(&self) -> FactorShape {
        classify_shape(&self.flags)
    }
}

/// Resolves the caller-facing order `n` against a position vector of
/// `position_len` entries. `None` means `position_len + 2`.
pub fn resolve_order(position_len: usize, n: Option<i32>) -> Result<usize, HessError> {
    if position_len > MAX_POSITION_VECTOR_LEN {
        return Err(HessError::InvalidArgument(
            "position vector length exceeds i32 order budget",
        ));
    }
    let max_order = position_len + 2;
    let Some(n) = n else {
        return Ok(max_order);
    };

    // a negative order has no neighbour pairs, same as n <= 2
    let Ok(order) = usize::try_from(n) else {
        return Ok(0);
    };
    if order > max_order {
        return Err(HessError::InvalidArgument(
            "matrix order n exceeds len(p)+2",
        ));
    }
    Ok(order)
}

/// Number of neighbour pairs in an order-`order` factorization.
#[must_use]
pub fn scanned_slots(order: usize) -> usize {
    order.saturating_sub(2)
}

#[must_use]
pub fn is_hessenberg_ordering(flags: &[FactorPosition]) -> bool {
    !flags.iter().any(|flag| flag.is_ascending())
}

pub fn hess_check_with_mode(
    p: &[i32],
    n: Option<i32>,
    mode: HessRuntimeMode,
) -> Result<i32, HessError> {
    let order = resolve_order(p.len(), n)?;
    let scanned = p
        .get(..scanned_slots(order))
        .ok_or(HessError::InternalFault(
            "resolved order exceeded position vector",
        ))?;

    // every scanned flag is decoded, even after the first ascending one
    let any_ascending = scanned.iter().try_fold(false, |seen, &raw| {
        FactorPosition::from_raw(raw, mode).map(|flag| seen || flag.is_ascending())
    })?;
    if any_ascending {
        Ok(NOT_HESSENBERG_FLAG)
    } else {
        Ok(HESSENBERG_FLAG)
    }
}

/// Returns [`HESSENBERG_FLAG`] when `p[..n-2]` orders the core factors
/// descending, [`NOT_HESSENBERG_FLAG`] otherwise. `n` defaults to
/// `p.len() + 2` and may not exceed it.
pub fn l_upr1fact_hess(p: &[i32], n: Option<i32>) -> Result<i32, HessError> {
    hess_check_with_mode(p, n, HessRuntimeMode::Hardened)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HessLogRecord {
    pub ts_utc: String,
    pub suite_id: String,
    pub test_id: String,
    pub packet_id: String,
    pub fixture_id: String,
    pub mode: HessRuntimeMode,
    pub seed: u64,
    pub input_digest: String,
    pub output_digest: String,
    pub env_fingerprint: String,
    pub artifact_refs: Vec<String>,
    pub duration_ms: u64,
    pub outcome: String,
    pub reason_code: String,
}

impl HessLogRecord {
    #[must_use]
    pub fn is_replay_complete(&self) -> bool {
        if self.ts_utc.trim().is_empty()
            || self.suite_id.trim().is_empty()
            || self.test_id.trim().is_empty()
            || self.packet_id.trim().is_empty()
            || self.fixture_id.trim().is_empty()
            || self.input_digest.trim().is_empty()
            || self.output_digest.trim().is_empty()
            || self.env_fingerprint.trim().is_empty()
            || self.reason_code.trim().is_empty()
        {
            return false;
        }

        if self.packet_id != HESS_PACKET_ID {
            return false;
        }

        if self.outcome != "pass" && self.outcome != "fail" {
            return false;
        }

        if self.artifact_refs.is_empty()
            || self
                .artifact_refs
                .iter()
                .any(|artifact| artifact.trim().is_empty())
        {
            return false;
        }

        self.reason_code == HESS_OK_REASON_CODE
            || HESS_REASON_CODES
                .iter()
                .any(|code| *code == self.reason_code)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FactorPosition, FactorShape, HESS_OK_REASON_CODE, HESS_PACKET_ID, HESS_REASON_CODES,
        HESSENBERG_FLAG, HessError, HessLogRecord, HessRuntimeMode, NOT_HESSENBERG_FLAG,
        PositionVector, hess_check_with_mode, is_hessenberg_ordering, l_upr1fact_hess,
        resolve_order, scanned_slots,
    };

    fn packet_artifacts() -> Vec<String> {
        vec![
            "crates/upr-conformance/fixtures/hess_differential_cases.json".to_string(),
            "crates/upr-conformance/fixtures/oracle_outputs/hess_reference_vectors.json"
                .to_string(),
        ]
    }

    fn log_record(reason_code: &str) -> HessLogRecord {
        HessLogRecord {
            ts_utc: "2026-10-19T00:00:00Z".to_string(),
            suite_id: "upr-hess::tests".to_string(),
            test_id: "UP-001-hess-contract".to_string(),
            packet_id: HESS_PACKET_ID.to_string(),
            fixture_id: "UP-001-hess-contract".to_string(),
            mode: HessRuntimeMode::Hardened,
            seed: 1001,
            input_digest: "sha256:input".to_string(),
            output_digest: "sha256:output".to_string(),
            env_fingerprint: "upr-hess-unit-tests".to_string(),
            artifact_refs: packet_artifacts(),
            duration_ms: 1,
            outcome: "pass".to_string(),
            reason_code: reason_code.to_string(),
        }
    }

    #[test]
    fn reason_code_registry_matches_packet_contract() {
        assert_eq!(
            HESS_REASON_CODES,
            ["upr_hess_invalid_argument", "upr_hess_internal_fault"]
        );
        assert_eq!(
            HessError::InvalidArgument("x").reason_code(),
            HESS_REASON_CODES[0]
        );
        assert_eq!(
            HessError::InternalFault("x").reason_code(),
            HESS_REASON_CODES[1]
        );
    }

    #[test]
    fn end_to_end_scenarios_match_contract() {
        assert_eq!(l_upr1fact_hess(&[], Some(2)), Ok(HESSENBERG_FLAG));
        assert_eq!(l_upr1fact_hess(&[0, 0, 0], Some(5)), Ok(HESSENBERG_FLAG));
        assert_eq!(l_upr1fact_hess(&[1, 0, 1], Some(5)), Ok(NOT_HESSENBERG_FLAG));

        let err = l_upr1fact_hess(&[0, 0], Some(10)).expect_err("n beyond len(p)+2");
        assert_eq!(err.reason_code(), "upr_hess_invalid_argument");
        assert!(err.to_string().contains("exceeds len(p)+2"));
    }

    #[test]
    fn base_case_differs_from_non_hessenberg_ordering() {
        let base = l_upr1fact_hess(&[], None).expect("empty vector");
        let alternating = l_upr1fact_hess(&[1, 0, 1, 0], None).expect("alternating");
        let decreasing = l_upr1fact_hess(&[1, 1, 0], None).expect("decreasing");
        assert_eq!(base, HESSENBERG_FLAG);
        assert_ne!(base, alternating);
        assert_ne!(base, decreasing);
    }

    #[test]
    fn default_order_matches_explicit_full_order() {
        let vectors: [&[i32]; 5] = [&[], &[0], &[1], &[0, 0, 1], &[0, 1, 0, 0, 0]];
        for p in vectors {
            let explicit = i32::try_from(p.len() + 2).expect("small order");
            assert_eq!(
                l_upr1fact_hess(p, None),
                l_upr1fact_hess(p, Some(explicit)),
                "p={p:?}"
            );
        }
    }

    #[test]
    fn every_order_beyond_budget_is_rejected() {
        let p = [0, 1, 0];
        for n in 6..12 {
            let err = l_upr1fact_hess(&p, Some(n)).expect_err("over budget");
            assert!(matches!(err, HessError::InvalidArgument(_)));
        }
    }

    #[test]
    fn negative_and_small_orders_scan_nothing() {
        assert_eq!(l_upr1fact_hess(&[0], Some(-1)), Ok(HESSENBERG_FLAG));
        assert_eq!(l_upr1fact_hess(&[], Some(i32::MIN)), Ok(HESSENBERG_FLAG));
        assert_eq!(
            hess_check_with_mode(&[1], Some(-1), HessRuntimeMode::Strict),
            Ok(HESSENBERG_FLAG)
        );
        // nothing is scanned, so out-of-domain flags go unread
        assert_eq!(l_upr1fact_hess(&[9, 9], Some(-5)), Ok(HESSENBERG_FLAG));
        assert_eq!(resolve_order(3, Some(i32::MIN)), Ok(0));
        for n in 0..=2 {
            assert_eq!(l_upr1fact_hess(&[1, 1], Some(n)), Ok(HESSENBERG_FLAG));
        }
    }

    #[test]
    fn shorter_order_scans_only_the_prefix() {
        assert_eq!(l_upr1fact_hess(&[0, 0, 1], Some(5)), Ok(NOT_HESSENBERG_FLAG));
        assert_eq!(l_upr1fact_hess(&[0, 0, 1], Some(4)), Ok(HESSENBERG_FLAG));
        // entries past n-2 are not even validated
        assert_eq!(l_upr1fact_hess(&[0, 0, 7], Some(4)), Ok(HESSENBERG_FLAG));
        assert!(l_upr1fact_hess(&[0, 0, 7], Some(5)).is_err());
    }

    #[test]
    fn repeated_calls_are_idempotent() {
        let p = [0, 1, 1, 0, 0, 1];
        let first = l_upr1fact_hess(&p, None);
        for _ in 0..8 {
            assert_eq!(l_upr1fact_hess(&p, None), first);
        }
    }

    #[test]
    fn hardened_mode_rejects_out_of_domain_flags() {
        let err = l_upr1fact_hess(&[0, 2, 0], None).expect_err("flag 2");
        assert_eq!(err.reason_code(), "upr_hess_invalid_argument");
        assert!(err.to_string().contains("outside {0,1}"));
        assert!(l_upr1fact_hess(&[-1], None).is_err());
        // an ascending flag before the bad entry does not short-circuit validation
        assert!(l_upr1fact_hess(&[1, 5], None).is_err());
    }

    #[test]
    fn strict_mode_reads_nonzero_as_ascending() {
        assert_eq!(
            hess_check_with_mode(&[0, -1, 0], None, HessRuntimeMode::Strict),
            Ok(NOT_HESSENBERG_FLAG)
        );
        assert_eq!(
            hess_check_with_mode(&[0, 0, 0], None, HessRuntimeMode::Strict),
            Ok(HESSENBERG_FLAG)
        );
        assert_eq!(
            hess_check_with_mode(&[0, 42], Some(3), HessRuntimeMode::Strict),
            Ok(HESSENBERG_FLAG)
        );
    }

    #[test]
    fn mode_tokens_are_fail_closed() {
        assert_eq!(
            HessRuntimeMode::from_token("Strict"),
            Ok(HessRuntimeMode::Strict)
        );
        assert_eq!(
            HessRuntimeMode::from_token(" hardened "),
            Ok(HessRuntimeMode::Hardened)
        );
        assert!(HessRuntimeMode::from_token("lenient").is_err());
        assert_eq!(HessRuntimeMode::default(), HessRuntimeMode::Hardened);
        assert_eq!(HessRuntimeMode::Strict.as_str(), "strict");
    }

    #[test]
    fn single_pass_check_agrees_with_decoded_vector() {
        let vectors: [&[i32]; 6] = [&[], &[0], &[1], &[0, 0, 0, 1], &[1, 0, 1], &[0, 1, 1, 0]];
        for p in vectors {
            let vector = PositionVector::from_raw(p, HessRuntimeMode::Hardened).expect("0/1 flags");
            let expected = if vector.is_hessenberg() {
                HESSENBERG_FLAG
            } else {
                NOT_HESSENBERG_FLAG
            };
            assert_eq!(l_upr1fact_hess(p, None), Ok(expected), "p={p:?}");
        }
    }

    #[test]
    fn order_resolution_enforces_precondition() {
        assert_eq!(resolve_order(3, None), Ok(5));
        assert_eq!(resolve_order(3, Some(5)), Ok(5));
        assert_eq!(resolve_order(3, Some(4)), Ok(4));
        assert!(resolve_order(3, Some(6)).is_err());
        assert_eq!(scanned_slots(0), 0);
        assert_eq!(scanned_slots(2), 0);
        assert_eq!(scanned_slots(7), 5);
    }

    #[test]
    fn position_vector_accessors_are_consistent() {
        let vector =
            PositionVector::from_raw(&[0, 0, 1, 0], HessRuntimeMode::Hardened).expect("valid");
        assert_eq!(vector.len(), 4);
        assert_eq!(vector.order(), 6);
        assert!(!vector.is_empty());
        assert_eq!(vector.to_raw(), vec![0, 0, 1, 0]);
        assert_eq!(vector.first_ascending(), Some(2));
        assert!(!vector.is_hessenberg());
        assert_eq!(vector.shape(), FactorShape::Mixed);
        assert_eq!(vector.prefix(Some(4)).expect("prefix").len(), 2);
        assert!(is_hessenberg_ordering(
            vector.prefix(Some(4)).expect("prefix")
        ));
        assert!(vector.prefix(Some(7)).is_err());

        let strict = PositionVector::from_raw(&[3, 0], HessRuntimeMode::Strict).expect("strict");
        assert_eq!(strict.to_raw(), vec![1, 0]);
        assert_eq!(
            strict,
            PositionVector::from_flags(vec![FactorPosition::Ascending, FactorPosition::Descending])
        );
    }

    #[test]
    fn hess_log_record_is_replay_complete() {
        assert!(log_record(HESS_OK_REASON_CODE).is_replay_complete());
        for code in HESS_REASON_CODES {
            assert!(log_record(code).is_replay_complete());
        }
    }

    #[test]
    fn hess_log_record_rejects_missing_fields() {
        let mut record = log_record("upr_hess_unknown");
        assert!(!record.is_replay_complete());

        record.reason_code = HESS_OK_REASON_CODE.to_string();
        record.packet_id = "wrong-packet".to_string();
        assert!(!record.is_replay_complete());

        record.packet_id = HESS_PACKET_ID.to_string();
        record.outcome = "unknown".to_string();
        assert!(!record.is_replay_complete());

        record.outcome = "fail".to_string();
        record.artifact_refs = vec![String::new()];
        assert!(!record.is_replay_complete());

        record.artifact_refs = packet_artifacts();
        record.input_digest = String::new();
        assert!(!record.is_replay_complete());
    }
}
