//! E2E tests for `gossip run`.
//!
//! Covers: JSON summary schema, text output, config-file layering,
//! JSON-lines persistence and argument validation.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn gossip_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("gossip"));
    cmd.current_dir(dir);
    cmd.env("GOSSIP_LOG", "error");
    cmd.env_remove("GOSSIP_FORMAT");
    cmd
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let output = gossip_cmd(dir)
        .arg("run")
        .args(args)
        .args(["--format", "json"])
        .output()
        .expect("run should not crash");
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON from run")
}

#[test]
fn run_json_reports_timestep_statistics() {
    let dir = TempDir::new().expect("temp dir");
    let json = run_json(dir.path(), &["--agents", "6", "--seeds", "12"]);

    assert_eq!(json["agents"], 6);
    assert_eq!(json["strategy"], "Random");
    assert_eq!(json["call_protocol"], "Standard");
    assert_eq!(json["seeds_run"], 12);
    assert_eq!(json["finished"], 12);
    assert_eq!(json["all_passed"], true);
    assert!(json["mean_timesteps"].as_f64().is_some_and(|m| m >= 3.0));
    assert!(json["std_timesteps"].as_f64().is_some());
    assert!(json["failures"].as_array().is_some_and(Vec::is_empty));
}

#[test]
fn run_bubble_power_of_two_is_exactly_log2() {
    let dir = TempDir::new().expect("temp dir");
    let json = run_json(
        dir.path(),
        &["--agents", "16", "--strategy", "Bubble", "--seeds", "5"],
    );
    assert_eq!(json["mean_timesteps"], 4.0);
    assert_eq!(json["std_timesteps"], 0.0);
}

#[test]
fn run_accepts_every_strategy_name() {
    let dir = TempDir::new().expect("temp dir");
    for name in [
        "Random",
        "Call-Me-Once",
        "Learn-New-Secrets",
        "Bubble",
        "Mathematical",
        "Token",
        "Spider",
        "Token-improved",
        "Spider-improved",
        "Call-Min-Secrets",
        "Call-Max-Secrets",
        "Call-Best-Secrets",
        "Divide",
    ] {
        let json = run_json(
            dir.path(),
            &["--agents", "5", "--seeds", "3", "--max-rounds", "200", "--strategy", name],
        );
        assert_eq!(json["strategy"], name);
        assert_eq!(json["all_passed"], true, "{name} failed the oracle");
    }
}

#[test]
fn run_text_output_is_key_value() {
    let dir = TempDir::new().expect("temp dir");
    gossip_cmd(dir.path())
        .args(["run", "--agents", "4", "--seeds", "3", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("campaign agents=4 strategy=Random"))
        .stdout(predicate::str::contains("oracle all_passed=true"));
}

#[test]
fn run_out_appends_one_record_per_seed() {
    let dir = TempDir::new().expect("temp dir");
    let out = dir.path().join("results.jsonl");
    let out_arg = out.to_str().expect("utf-8 path");

    for _ in 0..2 {
        gossip_cmd(dir.path())
            .args([
                "run",
                "--agents",
                "5",
                "--seeds",
                "4",
                "--strategy",
                "Call-Me-Once",
                "--format",
                "text",
                "--out",
                out_arg,
            ])
            .assert()
            .success();
    }

    let content = std::fs::read_to_string(&out).expect("results file");
    let records: Vec<Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid JSON line"))
        .collect();
    assert_eq!(records.len(), 8);
    for record in &records {
        assert_eq!(record["num_agents"], 5);
        assert_eq!(record["num_simulations"], 4);
        assert_eq!(record["strategy"], "Call-Me-Once");
        assert!(record["timesteps_taken"].as_u64().is_some());
    }
}

#[test]
fn run_reads_config_file_and_flags_override_it() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("campaign.toml");
    std::fs::write(
        &config,
        "agent_count = 9\nstrategy = \"Divide\"\nseeds = 4\nseed_start = 100\n",
    )
    .expect("write config");
    let config_arg = config.to_str().expect("utf-8 path");

    let json = run_json(dir.path(), &["--config", config_arg]);
    assert_eq!(json["agents"], 9);
    assert_eq!(json["strategy"], "Divide");
    assert_eq!(json["seeds_run"], 4);

    let json = run_json(dir.path(), &["--config", config_arg, "--agents", "3"]);
    assert_eq!(json["agents"], 3);
    assert_eq!(json["strategy"], "Divide");
}

#[test]
fn run_rejects_single_agent() {
    let dir = TempDir::new().expect("temp dir");
    gossip_cmd(dir.path())
        .args(["run", "--agents", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("agent_count"));
}

#[test]
fn run_rejects_unknown_strategy() {
    let dir = TempDir::new().expect("temp dir");
    gossip_cmd(dir.path())
        .args(["run", "--strategy", "Telepathy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown strategy"));
}

#[test]
fn run_reports_missing_config_file() {
    let dir = TempDir::new().expect("temp dir");
    gossip_cmd(dir.path())
        .args(["run", "--config", "does-not-exist.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.toml"));
}

#[test]
fn run_prints_error_code_for_bad_config() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "agent_count = \n").expect("write config");

    gossip_cmd(dir.path())
        .args(["run", "--config", config.to_str().expect("utf-8 path")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[E1005]"))
        .stderr(predicate::str::contains("bad.toml"));
}

#[test]
fn config_file_strategy_typo_reports_unknown_strategy() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("typo.toml");
    std::fs::write(&config, "strategy = \"Telepathy\"\n").expect("write config");

    gossip_cmd(dir.path())
        .args(["run", "--config", config.to_str().expect("utf-8 path")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[E1002]"))
        .stderr(predicate::str::contains("unknown strategy"))
        .stderr(predicate::str::contains("typo.toml"));
}

#[test]
fn config_file_accepts_command_line_spellings() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("spelled.toml");
    std::fs::write(
        &config,
        "strategy = \"call_me_once\"\ncall_protocol = \"not_standard\"\nagent_count = 4\nseeds = 2\n",
    )
    .expect("write config");

    gossip_cmd(dir.path())
        .args([
            "run",
            "--config",
            config.to_str().expect("utf-8 path"),
            "--format",
            "json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Call-Me-Once"))
        .stdout(predicate::str::contains("Not-Standard"));
}
