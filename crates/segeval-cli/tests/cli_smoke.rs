use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::tempdir;

fn segeval() -> Command {
    Command::new(env!("CARGO_BIN_EXE_segeval"))
}

fn dataset(root: &Path, count: usize) -> Vec<String> {
    let volumes = root.join("volumes");
    fs::create_dir_all(&volumes).expect("volumes dir");
    for sequence in 0..count {
        fs::write(volumes.join(format!("case{sequence}.nii.gz")), b"vol").expect("volume");
    }
    let mut args = vec![
        "--volumes".to_string(),
        volumes.display().to_string(),
        "--methods".to_string(),
    ];
    for method in 1..=4 {
        let dir = root.join(format!("m{method}"));
        fs::create_dir_all(&dir).expect("method dir");
        for sequence in 0..count {
            fs::write(dir.join(format!("case{sequence}.nrrd")), b"seg").expect("seg");
        }
        args.push(dir.display().to_string());
    }
    args
}

fn run_session(args: &[String], script: &str) -> Output {
    let mut child = segeval()
        .arg("run")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn run");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(script.as_bytes())
        .expect("write script");
    child.wait_with_output().expect("wait run")
}

#[test]
fn seed_validation() {
    let output = segeval().args(["seed", "--validate", "0042"]).output().expect("seed");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "42");

    let status = segeval()
        .args(["seed", "--validate", "4.2"])
        .status()
        .expect("seed");
    assert!(!status.success());

    let output = segeval().arg("seed").output().expect("random seed");
    let value: u64 = String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .expect("numeric seed");
    assert!(value <= 65_535);
}

#[test]
fn order_is_reproducible() {
    let run = || {
        segeval()
            .args(["order", "--seed", "42", "--count", "3", "--json"])
            .output()
            .expect("order")
    };
    let first = run();
    let second = run();
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
    let report: serde_json::Value = serde_json::from_slice(&first.stdout).expect("json");
    assert_eq!(report["slots"].as_array().map(Vec::len), Some(12));
}

#[test]
fn check_reports_count_mismatch() {
    let temp = tempdir().expect("tmp dir");
    let args = dataset(temp.path(), 2);
    let ok = segeval().arg("check").args(&args).status().expect("check");
    assert!(ok.success());

    fs::remove_file(temp.path().join("m2").join("case1.nrrd")).expect("remove");
    let output = segeval()
        .arg("check")
        .args(&args)
        .arg("--json")
        .output()
        .expect("check");
    assert!(!output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["consistent"], serde_json::json!(false));
    assert_eq!(report["error"], serde_json::json!("config.count-mismatch"));
}

#[test]
fn scripted_session_writes_and_resumes_scores() {
    let temp = tempdir().expect("tmp dir");
    let mut args = dataset(temp.path(), 2);
    let output_file: PathBuf = temp.path().join("scores.csv");
    args.extend([
        "--output".to_string(),
        output_file.display().to_string(),
        "--seed".to_string(),
        "42".to_string(),
        "--yes".to_string(),
    ]);

    let first = run_session(&args, "score 3 4 2 5\nnext\nq4 2\nsave\nquit\n");
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    let table = fs::read_to_string(&output_file).expect("table");
    assert_eq!(table.lines().count(), 9);
    assert!(table.lines().any(|line| line.ends_with(",3,4,2,5")));
    assert!(table.lines().any(|line| line.ends_with(",1,1,1,2")));

    let second = run_session(&args, "status\nquit\n");
    assert!(second.status.success());
    let stdout = String::from_utf8_lossy(&second.stdout);
    assert!(stdout.contains("resumed seed 42: 2 of 8"), "{stdout}");

    let status = segeval()
        .args(["status", "--output"])
        .arg(&output_file)
        .arg("--json")
        .output()
        .expect("status");
    assert!(status.status.success());
    let report: serde_json::Value = serde_json::from_slice(&status.stdout).expect("json");
    assert_eq!(report["scored"], serde_json::json!(2));
    assert_eq!(report["rows"], serde_json::json!(8));
    assert_eq!(report["seed"], serde_json::json!(42));
}

#[test]
fn order_report_uses_the_score_table_method_numbering() {
    let temp = tempdir().expect("tmp dir");
    let mut args = dataset(temp.path(), 2);
    let output_file: PathBuf = temp.path().join("scores.csv");
    args.extend([
        "--output".to_string(),
        output_file.display().to_string(),
        "--seed".to_string(),
        "42".to_string(),
    ]);

    let session = run_session(
        &[args.clone(), vec!["--yes".to_string()]].concat(),
        "score 3 4 2 5\nsave\nquit\n",
    );
    assert!(session.status.success(), "{}", String::from_utf8_lossy(&session.stderr));
    let table = fs::read_to_string(&output_file).expect("table");
    let first_row: Vec<&str> = table.lines().nth(1).expect("first row").split(',').collect();

    let order = segeval()
        .arg("order")
        .args(&args)
        .arg("--json")
        .output()
        .expect("order");
    assert!(order.status.success(), "{}", String::from_utf8_lossy(&order.stderr));
    let report: serde_json::Value = serde_json::from_slice(&order.stdout).expect("json");
    let slots = report["slots"].as_array().expect("slots");
    assert_eq!(slots[0]["sequence"].to_string(), first_row[0]);
    assert_eq!(slots[0]["method"].to_string(), first_row[1]);
    assert!(slots.iter().all(|slot| slot["method"].as_u64().is_some_and(|m| m < 4)));
    assert!(slots.iter().any(|slot| slot["method"] == serde_json::json!(0)));
}
