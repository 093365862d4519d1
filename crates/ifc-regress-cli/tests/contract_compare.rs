#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const HEADER: &str = "Test, LastTest, FileName, Errors, Warnings, ParseDurationMs, \
GeometryDurationMs, SceneDurationMs, TotalDurationMs, IfcSize, XbimSize, SceneSize, Entities, \
GeometryNodes, Schema, Name, Description, Products, SolidModels, Maps, Booleans, Application";

fn row(test: &str, file: &str) -> String {
    format!("{test},No Test,{file},0,0,1,2,0,3,10,0,0,5,1,IFC2X3,Null,Null,1,1,0,0,Null")
}

fn report(dir: &Path, name: &str, rows: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut text = format!("{HEADER}\n");
    for r in rows {
        text.push_str(r);
        text.push('\n');
    }
    fs::write(&path, text).unwrap();
    path
}

fn fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let baseline = report(
        dir,
        "XbimRegression_20240101-000000.csv",
        &[row("Passed", "a.ifc"), row("Failed", "b.ifc"), row("Passed", "gone.ifc")],
    );
    let current = report(
        dir,
        "XbimRegression_20240102-000000.csv",
        &[row("Failed", "a.ifc"), row("Passed", "b.ifc"), row("Passed", "c.ifc")],
    );
    (baseline, current)
}

#[test]
fn text_output_lists_flips() {
    let dir = tempdir().unwrap();
    let (baseline, current) = fixture(dir.path());

    Command::cargo_bin("ifc-regress")
        .unwrap()
        .arg("compare")
        .arg(&baseline)
        .arg(&current)
        .assert()
        .success()
        .stdout(predicate::str::contains("REGRESSED  a.ifc"))
        .stdout(predicate::str::contains("FIXED      b.ifc"))
        .stdout(predicate::str::contains("  ? gone.ifc"));
}

#[test]
fn json_output_parses() {
    let dir = tempdir().unwrap();
    let (baseline, current) = fixture(dir.path());

    let out = Command::cargo_bin("ifc-regress")
        .unwrap()
        .args(["compare", "--format", "json"])
        .arg(&baseline)
        .arg(&current)
        .output()
        .unwrap();
    assert!(out.status.success());

    let v: Value = serde_json::from_slice(&out.stdout).expect("compare output must be JSON");
    assert_eq!(v["summary"]["total"], 3);
    assert_eq!(v["summary"]["regressed"], serde_json::json!(["a.ifc"]));
    assert_eq!(v["summary"]["fixed"], serde_json::json!(["b.ifc"]));
    assert_eq!(v["summary"]["new"], 1);
    let files = v["files"].as_array().unwrap();
    assert_eq!(files.len(), 3);
    assert_eq!(files[2]["transition"], "new");
}

#[test]
fn missing_report_is_exit_2() {
    let dir = tempdir().unwrap();
    let (baseline, _) = fixture(dir.path());

    Command::cargo_bin("ifc-regress")
        .unwrap()
        .arg("compare")
        .arg(&baseline)
        .arg(dir.path().join("absent.csv"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to load report"));
}
