//! Runs the binary against the bundled configs.

use std::process::{Command, Output};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_community-sim"))
        .args(args)
        .output()
        .expect("community-sim process should run")
}

fn stdout_of(output: &Output) -> String {
    assert!(
        output.status.success(),
        "run failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).expect("stdout should be valid UTF-8")
}

#[test]
fn config_run_prints_ranking_and_writes_exports() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ranking = dir.path().join("ranking.csv");
    let billing_in = dir.path().join("billing_in.csv");
    let billing_out = dir.path().join("billing_out.csv");
    std::fs::write(
        &billing_in,
        "interval,production_kwh,a,b\n0,4,1,3\n1,0,1,1\n2,9,2,2\n",
    )
    .expect("write billing input");

    let output = run(&[
        "--config",
        "configs/quick_week.toml",
        "--ranking-out",
        ranking.to_str().expect("utf-8 path"),
        "--billing-input",
        billing_in.to_str().expect("utf-8 path"),
        "--billing-out",
        billing_out.to_str().expect("utf-8 path"),
    ]);
    let stdout = stdout_of(&output);
    assert!(stdout.contains("--- Community Ranking ---"));
    assert!(stdout.contains("--- Billing Summary (equal_capped, same level) ---"));

    let ranking_csv = std::fs::read_to_string(&ranking).expect("ranking written");
    assert!(ranking_csv.starts_with("rank,community_id"));
    let billing_csv = std::fs::read_to_string(&billing_out).expect("billing written");
    assert_eq!(billing_csv.lines().count(), 3);
}

#[test]
fn seed_changes_the_demo_population() {
    let a = stdout_of(&run(&["--preset", "quick", "--seed", "1"]));
    let b = stdout_of(&run(&["--preset", "quick", "--seed", "2"]));
    let again = stdout_of(&run(&["--preset", "quick", "--seed", "1"]));
    assert_eq!(a, again);
    assert_ne!(a, b);
}

#[test]
fn unknown_preset_fails() {
    let output = run(&["--preset", "megacity"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown preset"));
}

#[test]
fn invalid_config_reports_every_field() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[clustering]\nradius_m = -1.0\nmin_community_size = 1\n")
        .expect("write config");
    let output = run(&["--config", path.to_str().expect("utf-8 path")]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("clustering.radius_m"));
    assert!(stderr.contains("clustering.min_community_size"));
}
