use assert_cmd::Command;
use predicates::prelude::*;
use rstest::rstest;
use std::path::PathBuf;
use transclaim::claim::Claim;
use transclaim::tree::{Module, NestedToken, TokenKind};

fn transclaim() -> Command {
    Command::cargo_bin("transclaim").unwrap()
}

fn tlv_of(args: &[&str]) -> Vec<u8> {
    let mut full = args.to_vec();
    full.extend(["--out-format", "tlv"]);
    let output = transclaim().args(&full).output().unwrap();
    assert!(output.status.success());
    output.stdout
}

fn nested_module(depth: usize) -> Module {
    let mut module = Module::with_claims(vec![Claim::int(1, 1)]);
    for _ in 0..depth {
        let mut outer = Module::new();
        outer.push_submodule("n", module);
        module = outer;
    }
    module
}

#[rstest(args, expected,
    case(&["--claim", "1:5", "--claim", "2:alice"], "{\"1\":5,\"2\":\"alice\"}\n"),
    case(&["-c", "3:true", "-c", "4:null"], "{\"3\":true,\"4\":null}\n"),
    case(&["-c", "6:h'dead'"], "{\"6\":\"3q0\"}\n"),
    case(&["-c", "2:'42'"], "{\"2\":\"42\"}\n"),
)]
fn test_claims_to_json(args: &[&str], expected: &str) {
    transclaim()
        .args(args)
        .assert()
        .success()
        .stdout(expected.to_string());
}

#[test]
fn test_claims_to_tlv_and_back() {
    let bytes = tlv_of(&["-c", "1:5", "-c", "2:alice"]);
    assert_eq!(0x30, bytes[0]);

    transclaim()
        .args(["--in", "-"])
        .write_stdin(bytes)
        .assert()
        .success()
        .stdout("{\"1\":5,\"2\":\"alice\"}\n");
}

#[test]
fn test_tlv_submodules_to_json() {
    let mut module = Module::with_claims(vec![Claim::int(1, 5)]);
    module.push_submodule("dev1", Module::with_claims(vec![Claim::bool(3, false)]));
    module.push_token(NestedToken::new(TokenKind::ClaimSet, "inner", vec![0x30, 0x00]));
    let bytes = tlv::to_bytes(&module).unwrap();

    transclaim()
        .args(["--in", "-"])
        .write_stdin(bytes)
        .assert()
        .success()
        .stdout("{\"1\":5,\"submods\":{\"dev1\":{\"3\":false},\"inner\":{\"kind\":1,\"token\":\"MAA\"}}}\n");
}

#[test]
fn test_pretty() {
    transclaim()
        .args(["-c", "1:5", "--pretty"])
        .assert()
        .success()
        .stdout("{\n  \"1\": 5\n}\n");
}

#[test]
fn test_output_file() {
    let path: PathBuf = std::env::temp_dir().join(format!("transclaim-{}.json", std::process::id()));
    let path_str = path.to_string_lossy().to_string();

    transclaim()
        .args(["-c", "1:5", "--out", &path_str])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!("{\"1\":5}\n", written);
}

#[test]
fn test_depth_limit() {
    let bytes = tlv::to_bytes(&nested_module(3)).unwrap();

    transclaim()
        .args(["--in", "-", "--max-depth", "2"])
        .write_stdin(bytes.clone())
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("limit of 2"));

    transclaim()
        .args(["--in", "-", "--max-depth", "3"])
        .write_stdin(bytes)
        .assert()
        .success();
}

#[rstest(input,
    case(vec![]),
    case(vec![0x30, 0x05, 0xa0]),
    case(vec![0x30, 0x00, 0x00]),
)]
fn test_malformed_input(input: Vec<u8>) {
    transclaim()
        .args(["--in", "-", "--out-format", "tlv"])
        .write_stdin(input)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_invalid_claim_argument() {
    transclaim()
        .args(["-c", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("LABEL:VALUE"));
}

#[test]
fn test_input_and_claims_conflict() {
    transclaim()
        .args(["--in", "-", "-c", "1:5"])
        .assert()
        .failure();
}

#[test]
fn test_missing_source() {
    transclaim().assert().failure();
}
