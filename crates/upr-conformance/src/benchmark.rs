#![forbid(unsafe_code)]

use crate::factor_structure::seeded_rotations;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use upr_hess::{
    HessRuntimeMode, PositionVector, assemble_factored, factor_order, hess_check_with_mode,
    l_upr1fact_hess,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileSummary {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkWorkload {
    pub name: String,
    pub runs: usize,
    pub samples_ms: Vec<f64>,
    pub percentiles: PercentileSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkBaseline {
    pub schema_version: u8,
    pub generated_at_unix_ms: u128,
    pub git_commit: String,
    pub workloads: Vec<BenchmarkWorkload>,
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn git_commit_short(repo_root: &Path) -> String {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .current_dir(repo_root)
        .output();

    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        _ => "unknown".to_string(),
    }
}

fn percentile_index(len: usize, percentile_num: usize) -> usize {
    if len == 0 {
        return 0;
    }
    ((len - 1) * percentile_num + 50) / 100
}

fn summarize_samples(samples: &[f64]) -> PercentileSummary {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let at = |percentile_num: usize| {
        sorted
            .get(percentile_index(sorted.len(), percentile_num))
            .copied()
            .unwrap_or(0.0)
    };

    PercentileSummary {
        p50_ms: at(50),
        p95_ms: at(95),
        p99_ms: at(99),
        min_ms: sorted.first().copied().unwrap_or(0.0),
        max_ms: sorted.last().copied().unwrap_or(0.0),
    }
}

fn time_workload<F>(name: &str, runs: usize, mut run_fn: F) -> Result<BenchmarkWorkload, String>
where
    F: FnMut() -> Result<(), String>,
{
    let mut samples_ms = Vec::with_capacity(runs);
    for _ in 0..runs {
        let start = Instant::now();
        run_fn()?;
        samples_ms.push(start.elapsed().as_secs_f64() * 1000.0);
    }

    let percentiles = summarize_samples(&samples_ms);
    Ok(BenchmarkWorkload {
        name: name.to_string(),
        runs,
        samples_ms,
        percentiles,
    })
}

pub fn generate_benchmark_baseline(
    repo_root: &Path,
    output_path: &Path,
) -> Result<BenchmarkBaseline, String> {
    const SCAN_LEN: usize = 1 << 20;
    const DENSE_LEN: usize = 254;

    let descending = vec![0_i32; SCAN_LEN];
    let mut late_ascending = descending.clone();
    late_ascending[SCAN_LEN - 1] = 1;
    let cmv: Vec<i32> = (0..SCAN_LEN).map(|idx| i32::from(idx % 2 == 1)).collect();
    let cmv_vector = PositionVector::from_raw(&cmv, HessRuntimeMode::Hardened)
        .map_err(|err| format!("benchmark cmv init failed: {err}"))?;
    let dense_vector = PositionVector::from_raw(&cmv[..DENSE_LEN], HessRuntimeMode::Hardened)
        .map_err(|err| format!("benchmark dense init failed: {err}"))?;
    let rotations = seeded_rotations(0xC0DE_CAFE, DENSE_LEN + 1, 0.3, 1.2);

    let full_scan = time_workload("hess_check_descending_1m", 20, || {
        let flag = l_upr1fact_hess(&descending, None)
            .map_err(|err| format!("descending scan failed: {err}"))?;
        std::hint::black_box(flag);
        Ok(())
    })?;

    let strict_scan = time_workload("hess_check_strict_late_ascending_1m", 20, || {
        let flag = hess_check_with_mode(&late_ascending, None, HessRuntimeMode::Strict)
            .map_err(|err| format!("strict scan failed: {err}"))?;
        std::hint::black_box(flag);
        Ok(())
    })?;

    let traversal = time_workload("factor_order_cmv_1m", 20, || {
        let order = factor_order(cmv_vector.flags())
            .map_err(|err| format!("factor traversal failed: {err}"))?;
        std::hint::black_box(order.len());
        Ok(())
    })?;

    let dense = time_workload("dense_assembly_cmv_256", 5, || {
        let matrix = assemble_factored(&rotations, dense_vector.flags())
            .map_err(|err| format!("dense assembly failed: {err}"))?;
        std::hint::black_box(matrix.lower_bandwidth(1e-12));
        Ok(())
    })?;

    let baseline = BenchmarkBaseline {
        schema_version: 1,
        generated_at_unix_ms: now_unix_ms(),
        git_commit: git_commit_short(repo_root),
        workloads: vec![full_scan, strict_scan, traversal, dense],
    };

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let raw = serde_json::to_string_pretty(&baseline)
        .map_err(|err| format!("failed serializing baseline: {err}"))?;
    fs::write(output_path, raw)
        .map_err(|err| format!("failed writing {}: {err}", output_path.display()))?;

    Ok(baseline)
}
