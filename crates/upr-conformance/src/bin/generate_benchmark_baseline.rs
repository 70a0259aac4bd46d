#![forbid(unsafe_code)]

use upr_conformance::benchmark::generate_benchmark_baseline;

fn main() {
    if let Err(err) = run() {
        eprintln!("generate_benchmark_baseline failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let repo_root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
    let output_path = repo_root.join("artifacts/baselines/hess_benchmark_baseline.json");

    let baseline = generate_benchmark_baseline(&repo_root, &output_path)?;
    for workload in &baseline.workloads {
        println!(
            "{}: p50={:.3}ms p95={:.3}ms",
            workload.name, workload.percentiles.p50_ms, workload.percentiles.p95_ms
        );
    }
    println!("wrote {}", output_path.display());
    Ok(())
}
