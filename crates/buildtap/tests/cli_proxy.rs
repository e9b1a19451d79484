#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;

use buildtap_frame::encode_frame;
use bytes::BytesMut;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/buildtap-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn proxy_command(service: &str, log: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_buildtap"));
    cmd.env_remove("BUILDTAP_DIAGNOSTICS")
        .env_remove("BUILDTAP_TAP_STDIN")
        .arg("--service")
        .arg(service)
        .arg("--log-file")
        .arg(log)
        .arg("--no-fsync");
    cmd
}

/// Feed `input` to the proxy's stdin, close it, and collect everything.
fn run_with_input(mut cmd: Command, input: Vec<u8>) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("proxy should start");

    let mut stdin = child.stdin.take().expect("stdin should be piped");
    let writer = thread::spawn(move || {
        let _ = stdin.write_all(&input);
    });
    let output = child.wait_with_output().expect("proxy should finish");
    writer.join().expect("writer thread should finish");
    output
}

fn framed(messages: &[(u64, &[u8])]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for (channel, payload) in messages {
        encode_frame(*channel, payload, &mut buf);
    }
    buf.to_vec()
}

fn read_records(path: &Path) -> Vec<serde_json::Value> {
    let mut contents = String::new();
    std::fs::File::open(path)
        .expect("record log should exist")
        .read_to_string(&mut contents)
        .expect("record log should be readable");
    contents
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect()
}

#[test]
fn passthrough_is_byte_exact_and_frames_are_logged() {
    let dir = unique_temp_dir("cat");
    let log = dir.join("records.log");

    let mut input = framed(&[(1, &[0x2a]), (2, &[0x91, 0xa2, b'h', b'i'])]);
    input.extend_from_slice(&[0x05, 0x00, 0x00]);

    let output = run_with_input(proxy_command("/bin/cat", &log), input.clone());

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(output.stdout, input);
    assert!(output.stderr.is_empty());

    let records = read_records(&log);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["stream"], "child-stdout");
    assert_eq!(records[0]["channel_id"], 1);
    assert_eq!(records[0]["values"], serde_json::json!([42]));
    assert_eq!(records[1]["channel_id"], 2);
    assert_eq!(records[1]["values"], serde_json::json!([["hi"]]));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn stdin_is_logged_when_requested() {
    let dir = unique_temp_dir("tap-stdin");
    let log = dir.join("records.log");

    let mut cmd = proxy_command("/bin/cat", &log);
    cmd.arg("--tap-stdin").arg("--no-tap-stdout");
    let input = framed(&[(7, &[0xc3])]);
    let output = run_with_input(cmd, input.clone());

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(output.stdout, input);
    let records = read_records(&log);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["stream"], "child-stdin");
    assert_eq!(records[0]["values"], serde_json::json!([true]));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn stderr_is_relayed_and_logged() {
    let dir = unique_temp_dir("stderr");
    let log = dir.join("records.log");

    let mut cmd = proxy_command("/bin/sh", &log);
    cmd.args(["proxy", "--", "-c", "cat >&2"]);
    let input = framed(&[(3, &[0xc1])]);
    let output = run_with_input(cmd, input.clone());

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
    assert_eq!(output.stderr, input);

    let records = read_records(&log);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["stream"], "child-stderr");
    assert_eq!(records[0]["status"], "undecodable");
    assert_eq!(records[0]["raw"], "wQ==");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn service_exit_code_is_propagated_without_records() {
    let dir = unique_temp_dir("exit");
    let log = dir.join("records.log");

    let mut cmd = proxy_command("/bin/sh", &log);
    cmd.args(["proxy", "--", "-c", "exit 2"]);
    let output = run_with_input(cmd, Vec::new());

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    assert!(!log.exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn signal_death_maps_to_128_plus_signal() {
    let dir = unique_temp_dir("signal");
    let log = dir.join("records.log");

    let mut cmd = proxy_command("/bin/sh", &log);
    cmd.args(["proxy", "--", "-c", "kill -TERM $$"]);
    let output = run_with_input(cmd, Vec::new());

    assert_eq!(output.status.code(), Some(143));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn sigterm_is_forwarded_to_the_service() {
    let dir = unique_temp_dir("sigterm");
    let log = dir.join("records.log");

    let mut cmd = proxy_command("/bin/sh", &log);
    cmd.args([
        "--no-tap-stdout",
        "proxy",
        "--",
        "-c",
        "trap 'exit 7' TERM; echo ready; while :; do sleep 1; done",
    ]);
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("proxy should start");

    let stdout = child.stdout.take().expect("stdout should be piped");
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .expect("service should report readiness");
    assert_eq!(line, "ready\n");

    let kill = Command::new("kill")
        .arg("-TERM")
        .arg(child.id().to_string())
        .status()
        .expect("kill should run");
    assert!(kill.success());

    let status = child.wait().expect("proxy should exit");
    assert_eq!(status.code(), Some(7));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn service_sees_self_reference_variable() {
    let dir = unique_temp_dir("self-ref");
    let log = dir.join("records.log");

    let mut cmd = proxy_command("/bin/sh", &log);
    cmd.env_remove("XCBBUILDSERVICE_PATH")
        .args(["proxy", "--", "-c", "printf %s \"$XCBBUILDSERVICE_PATH\""]);
    let output = run_with_input(cmd, Vec::new());

    assert_eq!(output.status.code(), Some(0));
    let expected = std::fs::canonicalize(env!("CARGO_BIN_EXE_buildtap"))
        .expect("binary path should resolve");
    assert_eq!(
        String::from_utf8(output.stdout).expect("path should be UTF-8"),
        expected.display().to_string()
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_service_exits_127() {
    let dir = unique_temp_dir("missing");
    let log = dir.join("records.log");

    let output = run_with_input(
        proxy_command("/definitely/not/here/XCBBuildService", &log),
        Vec::new(),
    );

    assert_eq!(output.status.code(), Some(127));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("launch failed"), "stderr: {stderr}");
    assert!(!log.exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn diagnostics_go_to_the_requested_file() {
    let dir = unique_temp_dir("diagnostics");
    let log = dir.join("records.log");
    let diagnostics = dir.join("diagnostics.log");

    let mut cmd = proxy_command("/bin/cat", &log);
    cmd.arg("--diagnostics").arg(&diagnostics);
    let output = run_with_input(cmd, b"plain".to_vec());

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(output.stdout, b"plain");
    assert!(output.stderr.is_empty());
    let text = std::fs::read_to_string(&diagnostics).expect("diagnostics should be written");
    assert!(text.contains("starting build service"), "diagnostics: {text}");

    let _ = std::fs::remove_dir_all(&dir);
}
