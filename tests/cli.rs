mod common;

use std::fs;

use common::TestWorkspace;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;

fn read_csv(path: &std::path::Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).expect("open csv");
    let headers = reader
        .headers()
        .expect("headers")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|record| {
            record
                .expect("record")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect();
    (headers, rows)
}

#[test]
fn normalize_cleans_headers_and_fills_gaps() {
    let workspace = TestWorkspace::new();
    let input = workspace.copy_fixture("sales.csv");
    let output = workspace.path().join("clean.csv");
    workspace
        .command()
        .args([
            "normalize",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--no-journal",
        ])
        .assert()
        .success();

    let (headers, rows) = read_csv(&output);
    assert_eq!(
        headers,
        vec!["order_id", "sale_amount", "region", "order_date", "notes"]
    );
    assert_eq!(rows.len(), 20);
    assert!(rows.iter().all(|row| !row[1].is_empty()));
    assert_eq!(rows[15][3], "2024-01-15 00:00:00");
    assert_eq!(rows[7][4], "large corporate order");
}

#[test]
fn normalize_writes_to_stdout_by_default() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("tiny.csv", "First Name,Score\nann,1\nbob,\ncy,3\n");
    workspace
        .command()
        .args(["normalize", "-i", input.to_str().unwrap(), "--no-journal"])
        .assert()
        .success()
        .stdout(contains("first_name,score").and(contains("bob,2")));
}

#[test]
fn analyze_emits_the_json_report() {
    let workspace = TestWorkspace::new();
    let input = workspace.copy_fixture("sales.csv");
    let assert = workspace
        .command()
        .args(["analyze", "-i", input.to_str().unwrap(), "--no-store", "--no-journal"])
        .assert()
        .success();

    let report: Value = serde_json::from_slice(&assert.get_output().stdout).expect("json report");
    assert_eq!(report["filename"], "sales.csv");
    let concentration = &report["concentration_analysis"];
    let sale_amount = &concentration["numeric_concentration"]["sale_amount"];
    assert!(sale_amount["concentration"]["top_10_percentage"].is_number());
    let region = &concentration["categorical_concentration"]["region"];
    assert!(region["concentration"]["hhi"].is_number());
    assert_eq!(concentration["summary"]["total_rows"], 20);
    assert_eq!(concentration["summary"]["temporal_columns"], 1);
    assert_eq!(concentration["summary"]["text_columns"], 1);

    let detection = &report["anomaly_detection"];
    let flagged = detection["detected_anomalies"]["knn"]["indices"]
        .as_array()
        .expect("knn indices");
    assert!(flagged.contains(&Value::from(7)));
    assert_eq!(
        detection["summary"]["methods_applied"],
        serde_json::json!(["knn", "isolation_forest"])
    );
    let recommendations = report["insights"]["recommendations"].as_array().unwrap();
    assert!(!recommendations.is_empty() && recommendations.len() <= 3);
}

#[test]
fn analyze_honours_method_and_top_n_overrides() {
    let workspace = TestWorkspace::new();
    let input = workspace.copy_fixture("sales.csv");
    let output = workspace.path().join("report.json");
    workspace
        .command()
        .args([
            "analyze",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--method",
            "isolation-forest",
            "--top-n",
            "3",
            "--no-store",
            "--no-journal",
            "--pretty",
        ])
        .assert()
        .success();

    let report: Value =
        serde_json::from_str(&fs::read_to_string(&output).expect("read report")).expect("json");
    let numeric = &report["concentration_analysis"]["numeric_concentration"]["order_id"];
    assert!(numeric["concentration"]["top_3_percentage"].is_number());
    let scores = report["anomaly_detection"]["anomaly_scores"]
        .as_object()
        .expect("scores");
    assert_eq!(scores.keys().collect::<Vec<_>>(), vec!["isolation_forest"]);
}

#[test]
fn repeated_method_flags_run_the_method_once() {
    let workspace = TestWorkspace::new();
    let input = workspace.copy_fixture("sales.csv");
    let output = workspace.path().join("report.json");
    workspace
        .command()
        .args([
            "analyze",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--method",
            "knn",
            "--method",
            "knn",
            "--no-store",
            "--no-journal",
        ])
        .assert()
        .success();

    let report: Value =
        serde_json::from_str(&fs::read_to_string(&output).expect("read report")).expect("json");
    let detection = &report["anomaly_detection"];
    assert_eq!(detection["summary"]["methods_applied"], serde_json::json!(["knn"]));
    let scores = detection["anomaly_scores"].as_object().expect("scores");
    assert_eq!(scores.len(), 1);
}

#[test]
fn analyze_writes_anomaly_details() {
    let workspace = TestWorkspace::new();
    let input = workspace.copy_fixture("sales.csv");
    let details = workspace.path().join("details.csv");
    workspace
        .command()
        .args([
            "analyze",
            "-i",
            input.to_str().unwrap(),
            "--details",
            details.to_str().unwrap(),
            "--no-store",
            "--no-journal",
        ])
        .assert()
        .success();

    let (headers, rows) = read_csv(&details);
    assert!(headers.contains(&"sale_amount_anomaly_score".to_string()));
    assert_eq!(headers.last().map(String::as_str), Some("is_anomaly"));
    assert_eq!(rows[7].last().map(String::as_str), Some("true"));
    assert_eq!(rows.iter().filter(|row| row.last().unwrap() == "true").count(), 2);
}

#[test]
fn text_only_input_reports_the_skip_condition() {
    let workspace = TestWorkspace::new();
    let input = workspace.copy_fixture("names.csv");
    let assert = workspace
        .command()
        .args(["analyze", "-i", input.to_str().unwrap(), "--no-store", "--no-journal"])
        .assert()
        .success();
    let report: Value = serde_json::from_slice(&assert.get_output().stdout).expect("json report");
    assert_eq!(
        report["anomaly_detection"],
        serde_json::json!({"condition": "no_numeric_columns"})
    );
}

#[test]
fn invalid_top_n_exits_with_parameter_code() {
    let workspace = TestWorkspace::new();
    let input = workspace.copy_fixture("sales.csv");
    workspace
        .command()
        .args(["analyze", "-i", input.to_str().unwrap(), "--top-n", "0", "--no-store"])
        .assert()
        .code(2)
        .stderr(contains("top_n"));
}

#[test]
fn contamination_out_of_range_is_rejected() {
    let workspace = TestWorkspace::new();
    let input = workspace.copy_fixture("sales.csv");
    workspace
        .command()
        .args([
            "analyze",
            "-i",
            input.to_str().unwrap(),
            "--contamination",
            "0.75",
            "--no-store",
        ])
        .assert()
        .code(2)
        .stderr(contains("contamination"));
}

#[test]
fn all_missing_column_exits_with_imputation_code() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("gaps.csv", "id,empty\n1,\n2,\n3,\n");
    workspace
        .command()
        .args(["normalize", "-i", input.to_str().unwrap(), "--no-journal"])
        .assert()
        .code(4)
        .stderr(contains("empty"));
}

#[test]
fn details_for_a_method_that_did_not_run_fail() {
    let workspace = TestWorkspace::new();
    let input = workspace.copy_fixture("sales.csv");
    let details = workspace.path().join("details.csv");
    workspace
        .command()
        .args([
            "analyze",
            "-i",
            input.to_str().unwrap(),
            "--method",
            "knn",
            "--details",
            details.to_str().unwrap(),
            "--details-method",
            "isolation_forest",
            "--no-store",
            "--no-journal",
        ])
        .assert()
        .code(5)
        .stderr(contains("available: knn"));
}

#[test]
fn analyze_stores_tables_for_listing() {
    let workspace = TestWorkspace::new();
    let input = workspace.copy_fixture("sales.csv");
    let store = workspace.path().join("store");
    workspace
        .command()
        .args([
            "analyze",
            "-i",
            input.to_str().unwrap(),
            "--storage-root",
            store.to_str().unwrap(),
            "--no-journal",
        ])
        .assert()
        .success();

    workspace
        .command()
        .args(["list", "--storage-root", store.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("sales.csv").and(contains("20")));
}

#[test]
fn history_shows_journaled_runs() {
    let workspace = TestWorkspace::new();
    let input = workspace.copy_fixture("sales.csv");
    let journal = workspace.path().join("logs");
    workspace
        .command()
        .args([
            "analyze",
            "-i",
            input.to_str().unwrap(),
            "--journal-dir",
            journal.to_str().unwrap(),
            "--no-store",
        ])
        .assert()
        .success();

    let assert = workspace
        .command()
        .args([
            "history",
            "-s",
            "sales.csv",
            "--journal-dir",
            journal.to_str().unwrap(),
            "--json",
        ])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let kinds = stdout
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("journal line")["kind"].clone())
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec![Value::from("transformation"), Value::from("analysis")]);

    workspace
        .command()
        .args([
            "history",
            "-s",
            "sales.csv",
            "--journal-dir",
            journal.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("normalize").and(contains("profile")));
}

#[test]
fn config_file_supplies_defaults() {
    let workspace = TestWorkspace::new();
    let input = workspace.copy_fixture("sales.csv");
    let config = workspace.write(
        "profiler.yml",
        "top_n: 2\n\
         anomaly:\n  methods: [knn]\n\
         storage:\n  enabled: false\n\
         journal:\n  enabled: false\n",
    );
    let assert = workspace
        .command()
        .args([
            "analyze",
            "-i",
            input.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
        ])
        .assert()
        .success();
    let report: Value = serde_json::from_slice(&assert.get_output().stdout).expect("json report");
    assert!(
        report["concentration_analysis"]["numeric_concentration"]["order_id"]["concentration"]
            ["top_2_percentage"]
            .is_number()
    );
    assert!(report["anomaly_detection"]["anomaly_scores"]["isolation_forest"].is_null());
    assert!(!workspace.path().join("data").exists());
}
