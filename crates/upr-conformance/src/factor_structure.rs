//! Dense cross-check: assemble seeded core rotations in the order a position
//! vector encodes and compare the resulting band structure with the flag-only
//! Hessenberg check.

use crate::{
    CaseEvidence, HarnessConfig, SuiteReport, digest_hess_input, digest_hess_outcome,
    load_fixture_cases, normalize_artifact_refs, normalize_env_fingerprint,
    normalize_reason_code, outcome_reason_code, record_case_evidence, resolve_case_mode,
    write_report_artifact,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use upr_hess::{
    CoreRotation, FactorShape, HessRuntimeMode, NOT_HESSENBERG_FLAG, PositionVector,
    assemble_factored, hess_check_with_mode,
};

const FACTOR_STRUCTURE_FIXTURE: &str = "factor_structure_cases.json";

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;
const MIX_CONST1: u64 = 0xBF58_476D_1CE4_E5B9;
const MIX_CONST2: u64 = 0x94D0_49BB_1331_11EB;

/// Counter-based splitmix64 stream; the same seed always yields the same draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeededStream {
    seed: u64,
    counter: u64,
}

impl SeededStream {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { seed, counter: 0 }
    }

    #[must_use]
    pub fn next_u64(&mut self) -> u64 {
        self.counter = self.counter.wrapping_add(1);
        splitmix64(self.seed.wrapping_add(self.counter.wrapping_mul(GOLDEN_GAMMA)))
    }

    #[must_use]
    pub fn next_f64(&mut self) -> f64 {
        let sample = self.next_u64() >> 11;
        sample as f64 / (1u64 << 53) as f64
    }

    #[must_use]
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        (high - low).mul_add(self.next_f64(), low)
    }

    #[must_use]
    pub fn next_i32(&mut self) -> i32 {
        (self.next_u64() >> 32) as u32 as i32
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(MIX_CONST1);
    x ^= x >> 27;
    x = x.wrapping_mul(MIX_CONST2);
    x ^ (x >> 31)
}

#[derive(Debug, Deserialize)]
struct FactorStructureCase {
    id: String,
    p: Vec<i32>,
    expected_shape: String,
    #[serde(default)]
    seed: u64,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    env_fingerprint: String,
    #[serde(default)]
    artifact_refs: Vec<String>,
    #[serde(default)]
    reason_code: String,
    #[serde(default = "default_min_angle")]
    min_angle: f64,
    #[serde(default = "default_max_angle")]
    max_angle: f64,
    #[serde(default = "default_structure_tolerance")]
    tolerance: f64,
}

#[derive(Debug, Serialize)]
struct FactorStructureObservation {
    fixture_id: String,
    seed: u64,
    shape: String,
    hess_flag: i32,
    lower_bandwidth: usize,
    passed: bool,
}

#[derive(Debug, Serialize)]
struct FactorStructureReportArtifact {
    suite: &'static str,
    total_cases: usize,
    passed_cases: usize,
    observations: Vec<FactorStructureObservation>,
}

fn default_min_angle() -> f64 {
    0.3
}

fn default_max_angle() -> f64 {
    1.2
}

fn default_structure_tolerance() -> f64 {
    1e-12
}

/// Core rotations with angles drawn from `[min_angle, max_angle)`.
#[must_use]
pub fn seeded_rotations(
    seed: u64,
    count: usize,
    min_angle: f64,
    max_angle: f64,
) -> Vec<CoreRotation> {
    let mut stream = SeededStream::new(seed);
    (0..count)
        .map(|_| CoreRotation::from_angle(stream.uniform(min_angle, max_angle)))
        .collect()
}

fn evaluate_factor_structure_case(
    case: &FactorStructureCase,
    mode: HessRuntimeMode,
) -> Result<(i32, usize), String> {
    if !(case.min_angle > 0.0 && case.max_angle < std::f64::consts::FRAC_PI_2)
        || case.min_angle >= case.max_angle
    {
        return Err(format!(
            "angle window [{}, {}) must lie strictly inside (0, pi/2)",
            case.min_angle, case.max_angle
        ));
    }

    let vector = PositionVector::from_raw(&case.p, mode)
        .map_err(|err| format!("position vector rejected: {err}"))?;
    let expected_shape = FactorShape::from_token(&case.expected_shape)
        .map_err(|err| format!("bad expected_shape: {err}"))?;
    if vector.shape() != expected_shape {
        return Err(format!(
            "shape mismatch expected={} actual={}",
            expected_shape.as_str(),
            vector.shape().as_str()
        ));
    }

    let rotations = seeded_rotations(case.seed, vector.len() + 1, case.min_angle, case.max_angle);
    let matrix = assemble_factored(&rotations, vector.flags())
        .map_err(|err| format!("dense assembly failed: {err}"))?;
    let bandwidth = matrix.lower_bandwidth(case.tolerance);
    let flag = hess_check_with_mode(&case.p, None, mode)
        .map_err(|err| format!("hess check failed: {err}"))?;

    if i32::from(matrix.is_upper_hessenberg(case.tolerance)) != flag {
        return Err(format!(
            "dense lower bandwidth {bandwidth} disagrees with hess flag {flag}"
        ));
    }
    if flag == NOT_HESSENBERG_FLAG {
        let slot = vector
            .first_ascending()
            .ok_or_else(|| "non-Hessenberg flag without an ascending slot".to_string())?;
        let fill = matrix.get(slot + 2, slot).unwrap_or(0.0);
        if fill.abs() <= case.tolerance {
            return Err(format!(
                "expected fill at ({}, {slot}) but found {fill:e}",
                slot + 2
            ));
        }
    }
    Ok((flag, bandwidth))
}

pub fn run_factor_structure_suite(config: &HarnessConfig) -> Result<SuiteReport, String> {
    let cases: Vec<FactorStructureCase> =
        load_fixture_cases(&config.fixture_root.join(FACTOR_STRUCTURE_FIXTURE))?;
    let mut report = SuiteReport::empty("factor_structure", cases.len());
    let mut observations = Vec::with_capacity(cases.len());

    for case in cases {
        let started = Instant::now();
        let env_fingerprint = normalize_env_fingerprint(&case.env_fingerprint);
        let artifact_refs =
            normalize_artifact_refs(case.artifact_refs.clone(), FACTOR_STRUCTURE_FIXTURE);
        let reason_code = normalize_reason_code(&case.reason_code);
        let mode = match resolve_case_mode(&case.mode, config.strict_mode) {
            Ok(mode) => mode,
            Err(err) => {
                report.failures.push(format!("{}: {err}", case.id));
                continue;
            }
        };

        let outcome = hess_check_with_mode(&case.p, None, mode);
        let verdict = evaluate_factor_structure_case(&case, mode);
        let passed = verdict.is_ok();
        let (hess_flag, lower_bandwidth) = match verdict {
            Ok(observed) => {
                report.pass_count += 1;
                observed
            }
            Err(message) => {
                report.failures.push(format!(
                    "{}: seed={} mode={} reason_code={} env_fingerprint={} artifact_refs={} {}",
                    case.id,
                    case.seed,
                    mode.as_str(),
                    reason_code,
                    env_fingerprint,
                    artifact_refs.join(","),
                    message
                ));
                (outcome.clone().unwrap_or(NOT_HESSENBERG_FLAG), 0)
            }
        };
        observations.push(FactorStructureObservation {
            fixture_id: case.id.clone(),
            seed: case.seed,
            shape: case.expected_shape.clone(),
            hess_flag,
            lower_bandwidth,
            passed,
        });

        record_case_evidence(
            &mut report,
            CaseEvidence {
                suite: "factor_structure",
                fixture_id: &case.id,
                seed: case.seed,
                mode,
                env_fingerprint: &env_fingerprint,
                artifact_refs: &artifact_refs,
                input_digest: digest_hess_input(&case.p, None, mode),
                output_digest: digest_hess_outcome(&outcome),
                reason_code: outcome_reason_code(&outcome),
                started,
                passed,
            },
        )?;
    }

    let artifact = FactorStructureReportArtifact {
        suite: "factor_structure",
        total_cases: report.case_count,
        passed_cases: report.pass_count,
        observations,
    };
    write_report_artifact(
        &config.oracle_root.join("factor_structure_report.json"),
        &artifact,
    )?;

    Ok(report)
}
