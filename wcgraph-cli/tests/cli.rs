use std::io::Write;

use assert_cmd::Command;

fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const VALID_WORKFLOW: &str = r#"
name: demo
data:
  available:
    - grid: {type: file, src: grid.nc}
  generated:
    - forecast: {type: file, src: forecast.nc}
tasks:
  - model: {plugin: shell, command: run-model}
cycles:
  - main:
      start_date: "2025-01-01"
      end_date: "2025-01-01"
      tasks:
        - model:
            inputs: [grid]
            outputs: [forecast]
"#;

const INVALID_WORKFLOW: &str = r#"
tasks:
  - t: {plugin: nonexistent, command: echo hi}
cycles:
  - main:
      start_date: "2025-01-01"
      end_date: "2025-01-01"
      tasks:
        - t: {}
"#;

#[test]
fn run_summary_reports_counts() {
    let fixture = write_fixture(VALID_WORKFLOW);
    Command::cargo_bin("wcgraph")
        .unwrap()
        .arg("run")
        .arg(fixture.path())
        .assert()
        .success()
        .stdout(predicates::str::contains("tasks:  1"))
        .stdout(predicates::str::contains("data:   2"))
        .stdout(predicates::str::contains("cycles: 1"));
}

#[test]
fn run_json_format_emits_parseable_document() {
    let fixture = write_fixture(VALID_WORKFLOW);
    let output = Command::cargo_bin("wcgraph")
        .unwrap()
        .arg("run")
        .arg(fixture.path())
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["name"], "demo");
    assert_eq!(parsed["tasks"].as_array().unwrap().len(), 1);
}

#[test]
fn invalid_plugin_exits_with_code_two() {
    let fixture = write_fixture(INVALID_WORKFLOW);
    Command::cargo_bin("wcgraph")
        .unwrap()
        .arg("run")
        .arg(fixture.path())
        .assert()
        .code(2)
        .stderr(predicates::str::contains("nonexistent"));
}

#[test]
fn missing_file_exits_with_failure_code() {
    Command::cargo_bin("wcgraph")
        .unwrap()
        .arg("run")
        .arg("/no/such/workflow.yml")
        .assert()
        .code(1);
}

#[test]
fn verbose_flag_is_accepted() {
    let fixture = write_fixture(VALID_WORKFLOW);
    Command::cargo_bin("wcgraph")
        .unwrap()
        .arg("-vv")
        .arg("run")
        .arg(fixture.path())
        .assert()
        .success();
}
