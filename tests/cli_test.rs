use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

mod common;
use common::ops_file;

#[test]
fn test_cli_end_to_end() {
    let file = ops_file(&[
        "add-customer, , , , , 100.00, Ned, Springfield,",
        "add-customer, , , , , 50.00, Gil, Shelbyville,",
        "record-payment, 1, , , 2024-06-01, 30.00, , , june dues",
    ]);

    let mut cmd = Command::new(cargo_bin!("candyroute"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "id,name,city,balance,last_visit,status",
        ))
        .stdout(predicate::str::contains("1,Ned,Springfield,70.00,,active"))
        .stdout(predicate::str::contains("2,Gil,Shelbyville,50.00,,active"));
}

#[test]
fn test_cli_reports_malformed_rows_and_continues() {
    let file = ops_file(&[
        "add-customer, , , , , 10.00, Ned, ,",
        "teleport, 1, , , , , , ,",
        "record-payment, 1, , , , 5.00, , ,",
    ]);

    let mut cmd = Command::new(cargo_bin!("candyroute"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading operation"))
        .stdout(predicate::str::contains("1,Ned,,5.00,,active"));
}

#[test]
fn test_cli_reports_missing_columns() {
    let file = ops_file(&[
        "add-customer, , , , , 10.00, Ned, ,",
        // record-payment with no amount column filled in.
        "record-payment, 1, , , , , , ,",
    ]);

    let mut cmd = Command::new(cargo_bin!("candyroute"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error applying operation"))
        .stdout(predicate::str::contains("1,Ned,,10.00,,active"));
}

#[test]
fn test_cli_lead_lifecycle() {
    let file = ops_file(&[
        "add-lead, , , , , , Gil, Ogdenville,",
        "convert-lead, 1, , , , , , ,",
        "add-customer, , , , , , Ned, ,",
        "archive, 2, , , , , , ,",
    ]);

    let mut cmd = Command::new(cargo_bin!("candyroute"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1,Gil,Ogdenville,0.00,,active"))
        .stdout(predicate::str::contains("2,Ned,,0.00,,inactive"));
}

#[test]
fn test_cli_remove_customer_cascades() {
    let file = ops_file(&[
        "add-customer, , , , , 40.00, Ned, Springfield,",
        "add-stop, 1, , , 2024-06-01, , , ,",
        "record-payment, 1, , , 2024-06-01, 10.00, , ,",
        "remove-customer, 1, , , , , , ,",
    ]);

    let mut cmd = Command::new(cargo_bin!("candyroute"));
    cmd.arg(file.path()).arg("--route").arg("2024-06-01");

    // The route report is empty apart from its header.
    cmd.assert()
        .success()
        .stdout(predicate::eq("sequence,stop,customer,city,completed\n"));
}
