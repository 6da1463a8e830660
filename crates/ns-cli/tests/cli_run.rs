use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_nextstat-sim"))
}

fn tmp_path(filename: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("nextstat_sim_{}_{}_{}", std::process::id(), nanos, filename));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn write_study(name: &str, algorithm: serde_json::Value) -> PathBuf {
    let study = serde_json::json!({
        "marginals": [
            {"type": "normal", "mu": 0.0, "sigma": 1.0},
            {"type": "normal", "mu": 0.0, "sigma": 1.0}
        ],
        "model": {"type": "hyperplane", "dimension": 2, "beta": 2.0},
        "operator": "less",
        "threshold": 0.0,
        "algorithm": algorithm,
        "seed": 11
    });
    let path = tmp_path(name);
    std::fs::write(&path, serde_json::to_string(&study).unwrap()).unwrap();
    path
}

fn stdout_json(out: &Output) -> serde_json::Value {
    assert!(
        out.status.success(),
        "command failed, status={:?}\nstderr:\n{}",
        out.status,
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("stdout should be valid JSON")
}

#[test]
fn run_directional_study() {
    let input = write_study(
        "directional.json",
        serde_json::json!({
            "type": "directional",
            "config": {
                "block_size": 50,
                "max_outer_sampling": 20,
                "max_coefficient_of_variation": 0.0
            }
        }),
    );
    let v = stdout_json(&run(&["run", "--input", input.to_str().unwrap(), "--threads", "2"]));
    let _ = std::fs::remove_file(&input);

    assert_eq!(v["algorithm"], "directional");
    let p = v["report"]["result"]["probability_estimate"].as_f64().unwrap();
    // Phi(-2) = 0.02275.
    assert!((p - 0.02275).abs() < 0.01, "p={}", p);
    assert_eq!(v["report"]["sample_size"].as_u64(), Some(1000));
}

#[test]
fn run_is_reproducible_across_thread_counts() {
    let algorithm = serde_json::json!({
        "type": "cross_entropy_standard",
        "config": {"block_size": 100, "max_outer_sampling": 10}
    });
    let input = write_study("ce.json", algorithm);
    let a = stdout_json(&run(&["run", "--input", input.to_str().unwrap(), "--threads", "1"]));
    let b = stdout_json(&run(&["run", "--input", input.to_str().unwrap(), "--threads", "4"]));
    let _ = std::fs::remove_file(&input);

    assert_eq!(a["report"]["probability_estimate"], b["report"]["probability_estimate"]);
    assert_eq!(a["report"]["thresholds"], b["report"]["thresholds"]);
}

#[test]
fn run_writes_output_file() {
    let input = write_study(
        "ads.json",
        serde_json::json!({"type": "ads", "config": {"block_size": 50, "max_outer_sampling": 20}}),
    );
    let output = tmp_path("ads_out.json");
    let out =
        run(&["run", "--input", input.to_str().unwrap(), "--output", output.to_str().unwrap()]);
    assert!(out.status.success(), "stderr:\n{}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    let _ = std::fs::remove_file(&input);
    let _ = std::fs::remove_file(&output);
    assert_eq!(v["algorithm"], "ads");
    assert!(v["report"]["result"]["probability_estimate"].as_f64().unwrap() > 0.0);
}

#[test]
fn run_rejects_invalid_config() {
    let input = write_study(
        "bad.json",
        serde_json::json!({"type": "subset", "config": {"conditional_probability": 1.5}}),
    );
    let out = run(&["run", "--input", input.to_str().unwrap()]);
    let _ = std::fs::remove_file(&input);
    assert!(!out.status.success());
}

#[test]
fn quantile_confidence_wilks_sizes() {
    let v = stdout_json(&run(&["quantile-confidence", "--alpha", "0.95", "--beta", "0.95"]));
    assert_eq!(v["unilateral_minimum_sample_size"].as_u64(), Some(59));
    // 1 - 0.95^n - 0.05^n >= 0.95.
    assert_eq!(v["bilateral_minimum_sample_size"].as_u64(), Some(59));

    let v = stdout_json(&run(&[
        "quantile-confidence",
        "--alpha",
        "0.95",
        "--beta",
        "0.95",
        "--rank",
        "1",
    ]));
    assert_eq!(v["unilateral_minimum_sample_size"].as_u64(), Some(93));
}

#[test]
fn version_prints_crate_version() {
    let out = run(&["version"]);
    assert!(out.status.success());
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.starts_with("nextstat-sim "), "stdout={}", s);
}
