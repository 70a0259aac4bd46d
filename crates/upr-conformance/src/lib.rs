#![forbid(unsafe_code)]

pub mod benchmark;
pub mod factor_structure;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use upr_hess::{
    CoreRotation, FactorShape, HESS_OK_REASON_CODE, HESS_PACKET_ID, HESSENBERG_FLAG, HessError,
    HessLogRecord, HessRuntimeMode, NOT_HESSENBERG_FLAG, PositionVector, factor_order,
    hess_check_with_mode, resolve_order, scanned_slots, verify_hessenberg_structure,
};

const FIXTURE_REF_PREFIX: &str = "crates/upr-conformance/fixtures";
const DIFFERENTIAL_FIXTURE: &str = "hess_differential_cases.json";
const METAMORPHIC_FIXTURE: &str = "hess_metamorphic_cases.json";
const ADVERSARIAL_FIXTURE: &str = "hess_adversarial_cases.json";
const HESS_LOG_PATH_ENV: &str = "UPR_HESS_LOG_PATH";

static HESS_LOG_PATH: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub oracle_root: PathBuf,
    pub fixture_root: PathBuf,
    pub strict_mode: bool,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        let fixture_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures");
        Self {
            oracle_root: fixture_root.join("oracle_outputs"),
            fixture_root,
            strict_mode: true,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessReport {
    pub suite: &'static str,
    pub oracle_present: bool,
    pub fixture_count: usize,
    pub strict_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteReport {
    pub suite: &'static str,
    pub case_count: usize,
    pub pass_count: usize,
    pub failures: Vec<String>,
}

impl SuiteReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.case_count == self.pass_count && self.failures.is_empty()
    }

    fn empty(suite: &'static str, case_count: usize) -> Self {
        Self {
            suite,
            case_count,
            pass_count: 0,
            failures: Vec::new(),
        }
    }
}

/// Reference results the differential suite compares against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HessOracleCapture {
    pub oracle_source: String,
    pub cases: Vec<HessOracleCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HessOracleCase {
    pub id: String,
    pub result: i32,
}

#[derive(Debug, Deserialize)]
struct HessDifferentialCase {
    id: String,
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
    #[serde(default)]
    p: Vec<i32>,
    #[serde(default)]
    n: Option<i32>,
    #[serde(default)]
    expected_error_contains: String,
    #[serde(default)]
    expected_reason_code: String,
}

#[derive(Debug, Deserialize)]
struct HessMetamorphicCase {
    id: String,
    relation: String,
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
    #[serde(default)]
    p: Vec<i32>,
    #[serde(default)]
    n: Option<i32>,
    #[serde(default = "default_repeats")]
    repeats: usize,
}

#[derive(Debug, Deserialize)]
struct HessAdversarialCase {
    id: String,
    operation: String,
    expected_error_contains: String,
    expected_reason_code: String,
    #[serde(default)]
    severity: String,
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
    #[serde(default)]
    p: Vec<i32>,
    #[serde(default)]
    n: Option<i32>,
    #[serde(default)]
    token: String,
    #[serde(default)]
    rotations: Vec<[f64; 2]>,
    #[serde(default)]
    tolerance: f64,
}

#[derive(Debug, Serialize)]
struct HessLogEntry {
    ts_utc: String,
    suite: String,
    fixture_id: String,
    packet_id: String,
    seed: u64,
    mode: String,
    env_fingerprint: String,
    artifact_refs: Vec<String>,
    reason_code: String,
    input_digest: String,
    output_digest: String,
    duration_ms: u64,
    outcome: String,
    replay_complete: bool,
}

impl From<&HessLogRecord> for HessLogEntry {
    fn from(record: &HessLogRecord) -> Self {
        Self {
            ts_utc: record.ts_utc.clone(),
            suite: record.suite_id.clone(),
            fixture_id: record.fixture_id.clone(),
            packet_id: record.packet_id.clone(),
            seed: record.seed,
            mode: record.mode.as_str().to_string(),
            env_fingerprint: record.env_fingerprint.clone(),
            artifact_refs: record.artifact_refs.clone(),
            reason_code: record.reason_code.clone(),
            input_digest: record.input_digest.clone(),
            output_digest: record.output_digest.clone(),
            duration_ms: record.duration_ms,
            outcome: record.outcome.clone(),
            replay_complete: record.is_replay_complete(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HessDifferentialMismatch {
    fixture_id: String,
    seed: u64,
    mode: String,
    expected_reason_code: String,
    actual_reason_code: String,
    message: String,
    artifact_refs: Vec<String>,
}

#[derive(Debug, Serialize)]
struct HessDifferentialReportArtifact {
    suite: &'static str,
    total_cases: usize,
    passed_cases: usize,
    failed_cases: usize,
    mismatches: Vec<HessDifferentialMismatch>,
}

/// Per-case evidence that ends up as one JSONL log line.
pub(crate) struct CaseEvidence<'a> {
    pub suite: &'static str,
    pub fixture_id: &'a str,
    pub seed: u64,
    pub mode: HessRuntimeMode,
    pub env_fingerprint: &'a str,
    pub artifact_refs: &'a [String],
    pub input_digest: String,
    pub output_digest: String,
    pub reason_code: &'a str,
    pub started: Instant,
    pub passed: bool,
}

fn default_repeats() -> usize {
    4
}

pub fn set_hess_log_path(path: Option<PathBuf>) {
    let cell = HESS_LOG_PATH.get_or_init(|| Mutex::new(None));
    if let Ok(mut slot) = cell.lock() {
        *slot = path;
    }
}

#[must_use]
pub fn run_smoke(config: &HarnessConfig) -> HarnessReport {
    let fixture_count = fs::read_dir(&config.fixture_root)
        .ok()
        .into_iter()
        .flat_map(|it| it.filter_map(Result::ok))
        .count();

    HarnessReport {
        suite: "smoke",
        oracle_present: config.oracle_root.exists(),
        fixture_count,
        strict_mode: config.strict_mode,
    }
}

pub(crate) fn load_fixture_cases<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed reading {}: {err}", path.display()))?;
    serde_json::from_str(&raw).map_err(|err| format!("invalid json in {}: {err}", path.display()))
}

pub fn load_oracle_capture(path: &Path) -> Result<HessOracleCapture, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed reading {}: {err}", path.display()))?;
    serde_json::from_str(&raw).map_err(|err| format!("invalid oracle json: {err}"))
}

pub fn run_hess_differential_suite(config: &HarnessConfig) -> Result<SuiteReport, String> {
    let cases: Vec<HessDifferentialCase> =
        load_fixture_cases(&config.fixture_root.join(DIFFERENTIAL_FIXTURE))?;
    let oracle = load_oracle_capture(&config.oracle_root.join("hess_reference_vectors.json"))?;
    let oracle_results: BTreeMap<&str, i32> = oracle
        .cases
        .iter()
        .map(|case| (case.id.as_str(), case.result))
        .collect();

    let mut report = SuiteReport::empty("hess_differential", cases.len());
    let mut mismatches = Vec::new();

    for case in cases {
        let started = Instant::now();
        let env_fingerprint = normalize_env_fingerprint(&case.env_fingerprint);
        let artifact_refs =
            normalize_artifact_refs(case.artifact_refs.clone(), DIFFERENTIAL_FIXTURE);
        let reason_code = normalize_reason_code(&case.reason_code);
        let mode = match resolve_case_mode(&case.mode, config.strict_mode) {
            Ok(mode) => mode,
            Err(err) => {
                report.failures.push(format!("{}: {err}", case.id));
                continue;
            }
        };

        let outcome = hess_check_with_mode(&case.p, case.n, mode);
        let expects_error = !case.expected_error_contains.trim().is_empty();
        let expected_reason_code = if !case.expected_reason_code.trim().is_empty() {
            case.expected_reason_code.trim().to_string()
        } else if expects_error {
            reason_code.clone()
        } else {
            HESS_OK_REASON_CODE.to_string()
        };

        let verdict = if expects_error {
            expect_hess_error(
                &outcome,
                &case.expected_error_contains,
                &expected_reason_code,
            )
        } else {
            match (&outcome, oracle_results.get(case.id.as_str())) {
                (Ok(actual), Some(expected)) if actual == expected => Ok(()),
                (Ok(actual), Some(expected)) => Err(format!(
                    "result mismatch expected={expected} actual={actual}"
                )),
                (Ok(_), None) => Err("no oracle vector recorded for fixture".to_string()),
                (Err(err), _) => Err(format!("expected success but got error '{err}'")),
            }
        };

        let actual_reason_code = outcome_reason_code(&outcome);
        let passed = verdict.is_ok();
        match verdict {
            Ok(()) => report.pass_count += 1,
            Err(message) => {
                let rendered = format!(
                    "{}: seed={} mode={} reason_code={} env_fingerprint={} artifact_refs={} {}",
                    case.id,
                    case.seed,
                    mode.as_str(),
                    reason_code,
                    env_fingerprint,
                    artifact_refs.join(","),
                    message
                );
                report.failures.push(rendered.clone());
                mismatches.push(HessDifferentialMismatch {
                    fixture_id: case.id.clone(),
                    seed: case.seed,
                    mode: mode.as_str().to_string(),
                    expected_reason_code,
                    actual_reason_code: actual_reason_code.to_string(),
                    message: rendered,
                    artifact_refs: artifact_refs.clone(),
                });
            }
        }

        record_case_evidence(
            &mut report,
            CaseEvidence {
                suite: "hess_differential",
                fixture_id: &case.id,
                seed: case.seed,
                mode,
                env_fingerprint: &env_fingerprint,
                artifact_refs: &artifact_refs,
                input_digest: digest_hess_input(&case.p, case.n, mode),
                output_digest: digest_hess_outcome(&outcome),
                reason_code: actual_reason_code,
                started,
                passed,
            },
        )?;
    }

    let artifact = HessDifferentialReportArtifact {
        suite: "hess_differential",
        total_cases: report.case_count,
        passed_cases: report.pass_count,
        failed_cases: report.case_count.saturating_sub(report.pass_count),
        mismatches,
    };
    write_report_artifact(
        &config.oracle_root.join("hess_differential_report.json"),
        &artifact,
    )?;

    Ok(report)
}

pub fn run_hess_metamorphic_suite(config: &HarnessConfig) -> Result<SuiteReport, String> {
    let cases: Vec<HessMetamorphicCase> =
        load_fixture_cases(&config.fixture_root.join(METAMORPHIC_FIXTURE))?;
    let mut report = SuiteReport::empty("hess_metamorphic", cases.len());

    for case in cases {
        let started = Instant::now();
        let env_fingerprint = normalize_env_fingerprint(&case.env_fingerprint);
        let artifact_refs =
            normalize_artifact_refs(case.artifact_refs.clone(), METAMORPHIC_FIXTURE);
        let reason_code = normalize_reason_code(&case.reason_code);
        let mode = match resolve_case_mode(&case.mode, config.strict_mode) {
            Ok(mode) => mode,
            Err(err) => {
                report.failures.push(format!("{}: {err}", case.id));
                continue;
            }
        };

        let outcome = hess_check_with_mode(&case.p, case.n, mode);
        let verdict = evaluate_metamorphic_relation(&case, mode);
        let passed = verdict.is_ok();
        match verdict {
            Ok(()) => report.pass_count += 1,
            Err(message) => report.failures.push(format!(
                "{}: relation={} seed={} mode={} reason_code={} env_fingerprint={} artifact_refs={} {}",
                case.id,
                case.relation,
                case.seed,
                mode.as_str(),
                reason_code,
                env_fingerprint,
                artifact_refs.join(","),
                message
            )),
        }

        record_case_evidence(
            &mut report,
            CaseEvidence {
                suite: "hess_metamorphic",
                fixture_id: &case.id,
                seed: case.seed,
                mode,
                env_fingerprint: &env_fingerprint,
                artifact_refs: &artifact_refs,
                input_digest: digest_hess_input(&case.p, case.n, mode),
                output_digest: digest_hess_outcome(&outcome),
                reason_code: outcome_reason_code(&outcome),
                started,
                passed,
            },
        )?;
    }

    Ok(report)
}

fn evaluate_metamorphic_relation(
    case: &HessMetamorphicCase,
    mode: HessRuntimeMode,
) -> Result<(), String> {
    let check = |p: &[i32], n: Option<i32>| {
        hess_check_with_mode(p, n, mode).map_err(|err| format!("hess check failed: {err}"))
    };

    match case.relation.as_str() {
        "default_order_equivalence" => {
            let explicit = i32::try_from(case.p.len() + 2)
                .map_err(|_| "explicit order does not fit i32".to_string())?;
            let defaulted = hess_check_with_mode(&case.p, None, mode);
            let explicit_outcome = hess_check_with_mode(&case.p, Some(explicit), mode);
            if defaulted != explicit_outcome {
                return Err(format!(
                    "default order gave {defaulted:?} but n={explicit} gave {explicit_outcome:?}"
                ));
            }
            Ok(())
        }
        "prefix_independence" => {
            let n = case
                .n
                .ok_or_else(|| "prefix_independence requires n".to_string())?;
            let order = resolve_order(case.p.len(), Some(n))
                .map_err(|err| format!("order rejected: {err}"))?;
            let keep = scanned_slots(order);
            let base = check(&case.p, Some(n))?;
            let mut stream = factor_structure::SeededStream::new(case.seed);
            for round in 0..case.repeats {
                let mut mutated = case.p.clone();
                for value in mutated.iter_mut().skip(keep) {
                    *value = stream.next_i32();
                }
                let mutated_result = check(&mutated, Some(n))?;
                if mutated_result != base {
                    return Err(format!(
                        "round {round}: mutating entries past n-2 changed result {base} -> {mutated_result}"
                    ));
                }
            }
            Ok(())
        }
        "idempotence" => {
            let first = hess_check_with_mode(&case.p, case.n, mode);
            for round in 0..case.repeats {
                let again = hess_check_with_mode(&case.p, case.n, mode);
                if again != first {
                    return Err(format!("round {round}: {first:?} then {again:?}"));
                }
            }
            Ok(())
        }
        "prefix_closure" => {
            let mut previous = HESSENBERG_FLAG;
            for order in 0..=case.p.len() + 2 {
                let n = i32::try_from(order).map_err(|_| "order does not fit i32".to_string())?;
                let result = check(&case.p, Some(n))?;
                if previous == NOT_HESSENBERG_FLAG && result == HESSENBERG_FLAG {
                    return Err(format!(
                        "order {n} is Hessenberg although a shorter prefix was not"
                    ));
                }
                previous = result;
            }
            Ok(())
        }
        "shape_consistency" => {
            let vector = PositionVector::from_raw(&case.p, mode)
                .map_err(|err| format!("position vector rejected: {err}"))?;
            let is_hess = check(&case.p, None)? == HESSENBERG_FLAG;
            if (vector.shape() == FactorShape::Hessenberg) != is_hess {
                return Err(format!(
                    "shape {} disagrees with hess flag {is_hess}",
                    vector.shape().as_str()
                ));
            }
            if vector.first_ascending().is_none() != is_hess {
                return Err("first ascending slot disagrees with hess flag".to_string());
            }
            let order = factor_order(vector.flags())
                .map_err(|err| format!("factor order failed: {err}"))?;
            let ascending_run: Vec<usize> = (0..=vector.len()).collect();
            if is_hess && order != ascending_run {
                return Err(format!("Hessenberg ordering produced factor order {order:?}"));
            }
            Ok(())
        }
        other => Err(format!("unknown metamorphic relation '{other}'")),
    }
}

pub fn run_hess_adversarial_suite(config: &HarnessConfig) -> Result<SuiteReport, String> {
    let cases: Vec<HessAdversarialCase> =
        load_fixture_cases(&config.fixture_root.join(ADVERSARIAL_FIXTURE))?;
    let mut report = SuiteReport::empty("hess_adversarial", cases.len());

    for case in cases {
        let started = Instant::now();
        let env_fingerprint = normalize_env_fingerprint(&case.env_fingerprint);
        let artifact_refs =
            normalize_artifact_refs(case.artifact_refs.clone(), ADVERSARIAL_FIXTURE);
        let reason_code = normalize_reason_code(&case.reason_code);
        let severity = case.severity.trim().to_lowercase();
        if !matches!(severity.as_str(), "low" | "medium" | "high" | "critical") {
            report.failures.push(format!(
                "{}: invalid severity '{}' (must be low|medium|high|critical), reason_code={}, env_fingerprint={}, artifact_refs={}",
                case.id,
                case.severity,
                reason_code,
                env_fingerprint,
                artifact_refs.join(",")
            ));
            continue;
        }
        if case.expected_error_contains.trim().is_empty() {
            report.failures.push(format!(
                "{}: expected_error_contains must be non-empty, reason_code={}, env_fingerprint={}, artifact_refs={}",
                case.id,
                reason_code,
                env_fingerprint,
                artifact_refs.join(",")
            ));
            continue;
        }
        let mode = match resolve_case_mode(&case.mode, config.strict_mode) {
            Ok(mode) => mode,
            Err(err) => {
                report.failures.push(format!("{}: {err}", case.id));
                continue;
            }
        };

        let outcome = execute_hess_adversarial_operation(&case, mode);
        let verdict = match &outcome {
            Ok(rendered) => Err(format!(
                "expected error containing '{}' but operation '{}' succeeded with {rendered}",
                case.expected_error_contains, case.operation
            )),
            Err(err) => {
                let expected_reason_code = case.expected_reason_code.trim();
                let contains_expected = err
                    .to_string()
                    .to_lowercase()
                    .contains(&case.expected_error_contains.to_lowercase());
                if contains_expected && err.reason_code() == expected_reason_code {
                    Ok(())
                } else {
                    Err(format!(
                        "expected error containing '{}' with reason_code='{}' but got '{}' (reason_code='{}')",
                        case.expected_error_contains,
                        expected_reason_code,
                        err,
                        err.reason_code()
                    ))
                }
            }
        };

        let passed = verdict.is_ok();
        match verdict {
            Ok(()) => report.pass_count += 1,
            Err(message) => report.failures.push(format!(
                "{}: severity={severity} seed={} reason_code={} mode={} env_fingerprint={} artifact_refs={} {}",
                case.id,
                case.seed,
                reason_code,
                mode.as_str(),
                env_fingerprint,
                artifact_refs.join(","),
                message
            )),
        }

        let (output_digest, actual_reason_code) = match &outcome {
            Ok(rendered) => (digest_text(rendered), HESS_OK_REASON_CODE),
            Err(err) => (digest_text(&format!("error={}", err.reason_code())), err.reason_code()),
        };
        record_case_evidence(
            &mut report,
            CaseEvidence {
                suite: "hess_adversarial",
                fixture_id: &case.id,
                seed: case.seed,
                mode,
                env_fingerprint: &env_fingerprint,
                artifact_refs: &artifact_refs,
                input_digest: digest_hess_input(&case.p, case.n, mode),
                output_digest,
                reason_code: actual_reason_code,
                started,
                passed,
            },
        )?;
    }

    Ok(report)
}

fn execute_hess_adversarial_operation(
    case: &HessAdversarialCase,
    mode: HessRuntimeMode,
) -> Result<String, HessError> {
    match case.operation.as_str() {
        "hess_check" => {
            hess_check_with_mode(&case.p, case.n, mode).map(|flag| format!("flag={flag}"))
        }
        "mode_token" => HessRuntimeMode::from_token(&case.token).map(|m| m.as_str().to_string()),
        "shape_token" => FactorShape::from_token(&case.token).map(|s| s.as_str().to_string()),
        "dense_structure" => {
            let vector = PositionVector::from_raw(&case.p, mode)?;
            let rotations: Vec<CoreRotation> = case
                .rotations
                .iter()
                .map(|&[c, s]| CoreRotation { c, s })
                .collect();
            verify_hessenberg_structure(&rotations, vector.flags(), case.tolerance)
                .map(|hess| format!("hessenberg={hess}"))
        }
        _ => Err(HessError::InvalidArgument("unknown adversarial operation")),
    }
}

pub fn run_all_core_suites(config: &HarnessConfig) -> Result<Vec<SuiteReport>, String> {
    Ok(vec![
        run_hess_differential_suite(config)?,
        run_hess_metamorphic_suite(config)?,
        run_hess_adversarial_suite(config)?,
        factor_structure::run_factor_structure_suite(config)?,
    ])
}

fn expect_hess_error(
    outcome: &Result<i32, HessError>,
    expected_error_contains: &str,
    expected_reason_code: &str,
) -> Result<(), String> {
    match outcome {
        Ok(actual) => Err(format!(
            "expected error containing '{expected_error_contains}' but got flag {actual}"
        )),
        Err(err) => {
            let contains_expected = err
                .to_string()
                .to_lowercase()
                .contains(&expected_error_contains.to_lowercase());
            if contains_expected && err.reason_code() == expected_reason_code {
                Ok(())
            } else {
                Err(format!(
                    "expected error containing '{expected_error_contains}' with reason_code='{expected_reason_code}' but got '{err}' (reason_code='{}')",
                    err.reason_code()
                ))
            }
        }
    }
}

pub(crate) fn resolve_case_mode(raw: &str, strict_mode: bool) -> Result<HessRuntimeMode, String> {
    if raw.trim().is_empty() {
        if strict_mode {
            Ok(HessRuntimeMode::Strict)
        } else {
            Ok(HessRuntimeMode::Hardened)
        }
    } else {
        HessRuntimeMode::from_token(raw).map_err(|err| err.to_string())
    }
}

pub(crate) fn outcome_reason_code<T>(outcome: &Result<T, HessError>) -> &'static str {
    match outcome {
        Ok(_) => HESS_OK_REASON_CODE,
        Err(err) => err.reason_code(),
    }
}

pub(crate) fn normalize_env_fingerprint(raw: &str) -> String {
    if raw.trim().is_empty() {
        "unknown_env".to_string()
    } else {
        raw.trim().to_string()
    }
}

/// Repo-relative path of a fixture file, used as the artifact ref of its cases.
pub(crate) fn fixture_artifact_ref(fixture_file: &str) -> String {
    format!("{FIXTURE_REF_PREFIX}/{fixture_file}")
}

pub(crate) fn normalize_artifact_refs(mut refs: Vec<String>, fixture_file: &str) -> Vec<String> {
    refs.retain(|entry| !entry.trim().is_empty());
    if refs.is_empty() {
        refs.push(fixture_artifact_ref(fixture_file));
    }
    refs
}

pub(crate) fn normalize_reason_code(raw: &str) -> String {
    if raw.trim().is_empty() {
        "unspecified".to_string()
    } else {
        raw.trim().to_string()
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

pub(crate) fn digest_text(text: &str) -> String {
    format!("sha256:{}", sha256_hex(text.as_bytes()))
}

/// Digest over the canonical `mode;n;p` rendering of a hess-check call.
#[must_use]
pub fn digest_hess_input(p: &[i32], n: Option<i32>, mode: HessRuntimeMode) -> String {
    let mut material = format!("mode={};n=", mode.as_str());
    match n {
        Some(n) => {
            let _ = write!(&mut material, "{n}");
        }
        None => material.push_str("default"),
    }
    material.push_str(";p=");
    for (idx, value) in p.iter().enumerate() {
        if idx > 0 {
            material.push(',');
        }
        let _ = write!(&mut material, "{value}");
    }
    digest_text(&material)
}

#[must_use]
pub fn digest_hess_outcome(outcome: &Result<i32, HessError>) -> String {
    match outcome {
        Ok(flag) => digest_text(&format!("flag={flag}")),
        Err(err) => digest_text(&format!("error={}", err.reason_code())),
    }
}

fn now_utc_millis() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    format!("unix_ms:{millis}")
}

pub(crate) fn record_case_evidence(
    report: &mut SuiteReport,
    evidence: CaseEvidence<'_>,
) -> Result<(), String> {
    let record = HessLogRecord {
        ts_utc: now_utc_millis(),
        suite_id: format!("upr-conformance::{}", evidence.suite),
        test_id: format!("{}::{}", evidence.suite, evidence.fixture_id),
        packet_id: HESS_PACKET_ID.to_string(),
        fixture_id: evidence.fixture_id.to_string(),
        mode: evidence.mode,
        seed: evidence.seed,
        input_digest: evidence.input_digest,
        output_digest: evidence.output_digest,
        env_fingerprint: evidence.env_fingerprint.to_string(),
        artifact_refs: evidence.artifact_refs.to_vec(),
        duration_ms: u64::try_from(evidence.started.elapsed().as_millis()).unwrap_or(u64::MAX),
        outcome: if evidence.passed { "pass" } else { "fail" }.to_string(),
        reason_code: evidence.reason_code.to_string(),
    };
    if !record.is_replay_complete() {
        report.failures.push(format!(
            "{}: log record is not replay complete (reason_code={})",
            evidence.fixture_id, record.reason_code
        ));
    }
    maybe_append_hess_log(&HessLogEntry::from(&record))
}

fn maybe_append_hess_log(entry: &HessLogEntry) -> Result<(), String> {
    let configured = HESS_LOG_PATH
        .get()
        .and_then(|cell| cell.lock().ok())
        .and_then(|slot| slot.clone());
    let from_env = std::env::var_os(HESS_LOG_PATH_ENV).map(PathBuf::from);
    let Some(path) = configured.or(from_env) else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| format!("failed opening {}: {err}", path.display()))?;
    let line = serde_json::to_string(entry)
        .map_err(|err| format!("failed serializing hess log entry: {err}"))?;
    let mut payload = line.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)
        .map_err(|err| format!("failed appending hess log {}: {err}", path.display()))
}

pub(crate) fn write_report_artifact<T: Serialize>(path: &Path, artifact: &T) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }
    let payload = serde_json::to_string_pretty(artifact)
        .map_err(|err| format!("failed serializing report {}: {err}", path.display()))?;
    fs::write(path, payload.as_bytes())
        .map_err(|err| format!("failed writing {}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::{
        ADVERSARIAL_FIXTURE, DIFFERENTIAL_FIXTURE, HarnessConfig, METAMORPHIC_FIXTURE,
        digest_hess_input, digest_hess_outcome, fixture_artifact_ref, normalize_artifact_refs,
        resolve_case_mode, set_hess_log_path,
    };
    use std::fs;
    use upr_hess::{HessError, HessRuntimeMode};

    #[test]
    fn case_mode_falls_back_to_harness_default() {
        assert_eq!(resolve_case_mode("", true), Ok(HessRuntimeMode::Strict));
        assert_eq!(resolve_case_mode("  ", false), Ok(HessRuntimeMode::Hardened));
        assert_eq!(resolve_case_mode("hardened", true), Ok(HessRuntimeMode::Hardened));
        let err = resolve_case_mode("lenient", true).expect_err("unknown mode");
        assert!(err.contains("strict|hardened"));
    }

    #[test]
    fn input_digest_separates_default_and_explicit_order() {
        let defaulted = digest_hess_input(&[0, 1], None, HessRuntimeMode::Hardened);
        let explicit = digest_hess_input(&[0, 1], Some(4), HessRuntimeMode::Hardened);
        let strict = digest_hess_input(&[0, 1], None, HessRuntimeMode::Strict);
        assert!(defaulted.starts_with("sha256:"));
        assert_eq!(defaulted.len(), "sha256:".len() + 64);
        assert_ne!(defaulted, explicit);
        assert_ne!(defaulted, strict);
        assert_eq!(
            defaulted,
            digest_hess_input(&[0, 1], None, HessRuntimeMode::Hardened)
        );
    }

    #[test]
    fn outcome_digest_tracks_flag_and_reason_code() {
        assert_ne!(digest_hess_outcome(&Ok(1)), digest_hess_outcome(&Ok(0)));
        assert_eq!(
            digest_hess_outcome(&Err(HessError::InvalidArgument("a"))),
            digest_hess_outcome(&Err(HessError::InvalidArgument("b")))
        );
    }

    #[test]
    fn artifact_refs_fall_back_to_the_backing_fixture() {
        assert_eq!(
            normalize_artifact_refs(vec![String::new(), " ".to_string()], DIFFERENTIAL_FIXTURE),
            vec!["crates/upr-conformance/fixtures/hess_differential_cases.json".to_string()]
        );
        assert_eq!(
            normalize_artifact_refs(vec!["custom.json".to_string()], DIFFERENTIAL_FIXTURE),
            vec!["custom.json".to_string()]
        );
    }

    #[test]
    fn fallback_artifact_refs_exist_in_repo() {
        let repo_root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
        for fixture in [
            DIFFERENTIAL_FIXTURE,
            METAMORPHIC_FIXTURE,
            ADVERSARIAL_FIXTURE,
            "factor_structure_cases.json",
        ] {
            let artifact = repo_root.join(fixture_artifact_ref(fixture));
            assert!(artifact.is_file(), "missing {}", artifact.display());
        }
    }

    #[test]
    fn configured_log_path_receives_jsonl_entries() {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        let log_path = std::env::temp_dir().join(format!("upr_hess_log_{ts}.jsonl"));
        let cfg = HarnessConfig::default_paths();

        set_hess_log_path(Some(log_path.clone()));
        let report = super::run_hess_adversarial_suite(&cfg).expect("adversarial suite");
        set_hess_log_path(None);

        let raw = fs::read_to_string(&log_path).expect("log written");
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|line| serde_json::from_str(line).expect("jsonl line"))
            .collect();
        assert!(lines.len() >= report.case_count);
        assert!(lines.iter().all(|line| line["packet_id"] == "UPR-P1-001"));
        assert!(lines.iter().all(|line| line["replay_complete"] == true));
        let adversarial_ref = fixture_artifact_ref(ADVERSARIAL_FIXTURE);
        assert!(
            lines
                .iter()
                .any(|line| line["artifact_refs"][0] == adversarial_ref.as_str())
        );

        let _ = fs::remove_file(log_path);
    }
}
