// SPDX-License-Identifier: MIT OR Apache-2.0
//! Black-box smoke tests for the `jmap` binary: subcommands that don't
//! need a live server to produce useful output.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_every_subcommand() {
    Command::cargo_bin("jmap")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("session"))
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("schema"));
}

#[test]
fn schema_prints_a_json_schema_for_settings() {
    Command::cargo_bin("jmap")
        .unwrap()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"listen_addr\""));
}

#[test]
fn call_without_a_reachable_server_fails_cleanly() {
    Command::cargo_bin("jmap")
        .unwrap()
        .args(["--base-url", "http://127.0.0.1:1", "call", "Core/echo"])
        .assert()
        .failure();
}
