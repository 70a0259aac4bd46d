#![forbid(unsafe_code)]

use upr_conformance::{HarnessConfig, run_all_core_suites};

fn main() {
    if let Err(err) = run() {
        eprintln!("run_hess_conformance failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cfg = HarnessConfig::default_paths();
    let suites = run_all_core_suites(&cfg)?;

    let mut failed = 0usize;
    for suite in &suites {
        println!(
            "{}: cases={} passed={} failures={}",
            suite.suite,
            suite.case_count,
            suite.pass_count,
            suite.failures.len()
        );
        for failure in &suite.failures {
            eprintln!("  {failure}");
        }
        if !suite.all_passed() {
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {} suites failed", suites.len()));
    }
    println!("all {} suites passed", suites.len());
    Ok(())
}
