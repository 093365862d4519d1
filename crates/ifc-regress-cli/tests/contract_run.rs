#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const MODEL: &str = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');
FILE_NAME('wall.ifc','2024-01-01T00:00:00',('a'),('b'),'pre','App','');
FILE_SCHEMA(('IFC2X3'));
ENDSEC;
DATA;
#1=IFCAPPLICATION(#2,'1.0','Test Modeller','TM');
#2=IFCORGANIZATION($,'Acme',$,$,$);
#3=IFCOWNERHISTORY($,#1,$,.ADDED.,$,$,$,0);
#4=IFCWALL('g',#3,'W',$,$,$,#5,$);
#5=IFCPRODUCTDEFINITIONSHAPE($,$,(#6));
#6=IFCSHAPEREPRESENTATION(#9,'Body','SweptSolid',(#7));
#7=IFCEXTRUDEDAREASOLID(#9,$,#9,1.);
#9=IFCGEOMETRICREPRESENTATIONCONTEXT($,'Model',3,1.E-05,$,$);
ENDSEC;
END-ISO-10303-21;
";

fn reports(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("XbimRegression_") && n.ends_with(".csv"))
        .collect()
}

#[test]
fn run_writes_report_and_prints_lines() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("wall.ifc"), MODEL).unwrap();
    fs::write(dir.path().join("broken.ifc"), "not a model").unwrap();

    Command::cargo_bin("ifc-regress")
        .unwrap()
        .arg("run")
        .arg(dir.path())
        .env_remove("IFC_REGRESS_CONFIG")
        .assert()
        .success()
        .stdout(predicate::str::contains("Processed"))
        .stdout(predicate::str::contains("8 IFC Elements & 1 Geometry Nodes."))
        .stdout(predicate::str::contains("Processing failed for"))
        .stdout(predicate::str::contains("2 files processed: 1 passed, 1 failed, 2 new"))
        .stdout(predicate::str::contains("Report written to"));

    let written = reports(dir.path());
    assert_eq!(written.len(), 1, "expected one report, got {written:?}");
    let text = fs::read_to_string(dir.path().join(&written[0])).unwrap();
    assert!(text.starts_with("Test, LastTest, FileName"));
    assert_eq!(text.lines().count(), 3);
    assert!(dir.path().join("broken.ifc.log").exists());
}

#[test]
fn quiet_run_omits_file_lines() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("wall.ifc"), MODEL).unwrap();

    Command::cargo_bin("ifc-regress")
        .unwrap()
        .args(["run", "--quiet", "--prefix", "Nightly"])
        .arg(dir.path())
        .env_remove("IFC_REGRESS_CONFIG")
        .assert()
        .success()
        .stdout(predicate::str::contains("Processed").not())
        .stdout(predicate::str::contains("Nightly_"));
}

#[test]
fn invalid_config_is_exit_2() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("ifc-regress.yaml"), "cachng: true\n").unwrap();

    Command::cargo_bin("ifc-regress")
        .unwrap()
        .arg("run")
        .arg(dir.path())
        .env_remove("IFC_REGRESS_CONFIG")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("fatal:"));
    assert!(reports(dir.path()).is_empty());
}

#[test]
fn missing_root_is_exit_2() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("ifc-regress")
        .unwrap()
        .arg("run")
        .arg(dir.path().join("nowhere"))
        .env_remove("IFC_REGRESS_CONFIG")
        .assert()
        .code(2);
}

#[test]
fn version_prints_package_version() {
    Command::cargo_bin("ifc-regress")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
