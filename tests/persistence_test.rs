#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::tempdir;

mod common;
use common::ops_file;

#[test]
fn test_state_survives_across_runs() {
    let db = tempdir().unwrap();

    let first = ops_file(&[
        "add-customer, , , , , 100.00, Ned, Springfield,",
        "add-stop, 1, , , 2024-06-01, , , ,",
        "record-payment, 1, , , 2024-06-01, 30.00, , ,",
    ]);
    Command::new(cargo_bin!("candyroute"))
        .arg(first.path())
        .arg("--db-path")
        .arg(db.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1,Ned,Springfield,70.00,,active"));

    // A fresh process over the same database sees the stop and the settled
    // balance, and keeps appending after the persisted sequence.
    let second = ops_file(&["add-stop, 1, , , 2024-06-01, , , ,"]);
    Command::new(cargo_bin!("candyroute"))
        .arg(second.path())
        .arg("--db-path")
        .arg(db.path())
        .arg("--route")
        .arg("2024-06-01")
        .assert()
        .success()
        .stdout(predicate::str::contains("1,1,Ned,Springfield,false"))
        .stdout(predicate::str::contains("2,2,Ned,Springfield,false"));
}
