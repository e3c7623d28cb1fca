//! Command-line surface: the test modes and startup failures.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("vcspeak-test-{}-{name}", std::process::id()));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn help_mentions_the_modes() {
    Command::cargo_bin("vcspeak")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tts"))
        .stdout(predicate::str::contains("Serial port"));
}

#[test]
fn tc_accepts_a_good_config() {
    let cfg = write_temp(
        "good.cfg",
        "# reading keys\n\
         ^r read\n\
         +F3 <hello\n\
         } right brace spoken\n\
         read reed\n",
    );
    Command::cargo_bin("vcspeak")
        .unwrap()
        .args(["-c", cfg.to_str().unwrap(), "tc"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config ok"));
    let _ = std::fs::remove_file(cfg);
}

#[test]
fn tc_reports_bad_lines_with_numbers() {
    let cfg = write_temp(
        "bad.cfg",
        "^r read\n\
         ^t garbage\n\
         } \n",
    );
    Command::cargo_bin("vcspeak")
        .unwrap()
        .args(["-c", cfg.to_str().unwrap(), "tc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(":2:"))
        .stderr(predicate::str::contains("unknown speech command"));
    let _ = std::fs::remove_file(cfg);
}

#[test]
fn tts_prepares_text() {
    Command::cargo_bin("vcspeak")
        .unwrap()
        .arg("tts")
        .write_stdin("hello -------------------- world\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("dash length 20"));
}

#[test]
fn tts_applies_the_dictionary() {
    let cfg = write_temp("dict.cfg", "hello jello\n");
    Command::cargo_bin("vcspeak")
        .unwrap()
        .args(["-c", cfg.to_str().unwrap(), "tts"])
        .write_stdin("hello there\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("jello there"));
    let _ = std::fs::remove_file(cfg);
}

#[test]
fn ltts_expands_punctuation() {
    Command::cargo_bin("vcspeak")
        .unwrap()
        .arg("ltts")
        .write_stdin("a=b\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("a equals b"));
}

#[test]
fn unknown_synth_fails_cleanly() {
    Command::cargo_bin("vcspeak")
        .unwrap()
        .args(["nosuchsynth", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown synthesizer"));
}

#[test]
fn missing_port_fails_cleanly() {
    Command::cargo_bin("vcspeak")
        .unwrap()
        .arg("dbe")
        .assert()
        .failure()
        .stderr(predicate::str::contains("serial port"));
}
