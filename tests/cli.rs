// SUBPROCESS-LEVEL CLI TESTS
// DRIVES THE BUILT BINARIES THE WAY A SHELL PIPELINE WOULD, VIA assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn bytecount_copies_stdin_to_stdout_unchanged() {
    let payload = vec![0xABu8; 100 * 1024];

    let mut cmd = Command::cargo_bin("bytecount").unwrap();
    let assert = cmd
        .write_stdin(payload.clone())
        .timeout(std::time::Duration::from_secs(10))
        .assert();

    assert.success().stdout(predicate::eq(payload));
}

#[test]
fn bytecount_reports_rate_to_stderr() {
    let payload = vec![0x11u8; 1024];

    let mut cmd = Command::cargo_bin("bytecount").unwrap();
    let assert = cmd
        .write_stdin(payload)
        .timeout(std::time::Duration::from_secs(10))
        .assert();

    assert
        .success()
        .stderr(predicate::str::contains("Total").and(predicate::str::contains("bytes read")));
}

#[test]
fn bytecount_accepts_warn_band_without_tripping_on_a_short_stream() {
    // A stream that finishes before the first 2-second report window closes
    // never gets rate-checked against the band at all; it should just pass
    // the bytes through and exit cleanly, band or no band.
    let payload = vec![0x22u8; 4096];

    let mut cmd = Command::cargo_bin("bytecount").unwrap();
    let assert = cmd
        .args(["-w", "1:1000000"])
        .write_stdin(payload.clone())
        .timeout(std::time::Duration::from_secs(10))
        .assert();

    assert
        .success()
        .stdout(predicate::eq(payload))
        .stderr(predicate::str::contains("out of range").not());
}

#[test]
fn bytesmooth_preserves_byte_content_regardless_of_priming_outcome() {
    // Whether or not the 700ms priming window closes before stdin hits EOF,
    // every byte pushed into the queue must eventually reach stdout in
    // order -- either via the paced consumer or the direct flush-at-EOF
    // fallback for short streams.
    let payload: Vec<u8> = (0..600_000u32).map(|i| (i % 256) as u8).collect();

    let mut cmd = Command::cargo_bin("bytesmooth").unwrap();
    let assert = cmd
        .write_stdin(payload.clone())
        .timeout(std::time::Duration::from_secs(30))
        .assert();

    assert.success().stdout(predicate::eq(payload));
}

#[test]
fn bytegen_and_bytereplay_round_trip_through_a_log() {
    let tmp = tempfile::tempdir().unwrap();
    let log_path = tmp.path().join("generator.log");

    // bytegen in legacy mode self-terminates after --run-secs, giving the
    // test a bounded runtime.
    let mut gen = Command::cargo_bin("bytegen").unwrap();
    let gen_assert = gen
        .args(["--legacy", "--run-secs", "1", "--log"])
        .arg(&log_path)
        .timeout(std::time::Duration::from_secs(15))
        .assert();
    let generated_stdout = gen_assert.success().get_output().stdout.clone();

    assert!(log_path.exists());
    let log_contents = std::fs::read_to_string(&log_path).unwrap();
    assert!(!log_contents.trim().is_empty());

    let mut replay = Command::cargo_bin("bytereplay").unwrap();
    let replay_assert = replay
        .arg(&log_path)
        .timeout(std::time::Duration::from_secs(15))
        .assert();

    replay_assert
        .success()
        .stdout(predicate::eq(generated_stdout));
}

#[test]
fn bytelog2_rejects_corrupted_payload_counter() {
    let tmp = tempfile::tempdir().unwrap();
    let log_path = tmp.path().join("samples.log");

    let mut buf = vec![0u8; 256];
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = i as u8;
    }
    buf[100] = buf[100].wrapping_add(5); // corrupt the sequence

    let mut cmd = Command::cargo_bin("bytelog2").unwrap();
    let assert = cmd
        .args(["-s"])
        .arg(&log_path)
        .write_stdin(buf)
        .timeout(std::time::Duration::from_secs(10))
        .assert();

    assert.failure();
}

#[test]
fn bytelog2_no_verify_tolerates_arbitrary_bytes() {
    let tmp = tempfile::tempdir().unwrap();
    let log_path = tmp.path().join("samples.log");

    let mut cmd = Command::cargo_bin("bytelog2").unwrap();
    let assert = cmd
        .args(["-s"])
        .arg(&log_path)
        .args(["-g", "200", "--no-verify", "-t", "1"])
        .write_stdin(vec![0u8, 7, 3, 9, 1, 1, 1])
        .timeout(std::time::Duration::from_secs(10))
        .assert();

    assert.success();
    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert!(contents.starts_with("time-in-ms bytes"));
}
