#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::Command;

fn unique_capture(tag: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "ofcore-{tag}-{}-{}.bin",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::write(&path, bytes).expect("capture should be writable");
    path
}

#[test]
fn slice_lists_frames_and_skips_garbage() {
    let mut capture = Vec::new();
    // OpenFlow 1.3 hello, xid 1
    capture.extend_from_slice(&[0x04, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01]);
    // four bytes of noise
    capture.extend_from_slice(&[0xff, 0xee, 0x00, 0x10]);
    // echo request with 2 data bytes, xid 5
    capture.extend_from_slice(&[0x04, 0x02, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x05, b'h', b'i']);
    // start of a truncated frame
    capture.extend_from_slice(&[0x04, 0x00, 0x00]);
    let path = unique_capture("slice", &capture);

    let output = Command::new(env!("CARGO_BIN_EXE_ofcore"))
        .args(["--log-level", "error", "--format", "json", "slice"])
        .arg(&path)
        .output()
        .expect("slice should run");
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success());
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let frames = parsed["frames"].as_array().expect("frames array");
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["type"], "ofpt_hello");
    assert_eq!(frames[1]["type"], "ofpt_echo_request");
    assert_eq!(frames[1]["xid"], 5);
    assert_eq!(frames[1]["length"], 10);
    assert_eq!(frames[1]["version"], "v0x04");
    assert_eq!(parsed["leftover"], 3);
}

#[test]
fn slice_missing_file_exits_not_found() {
    let output = Command::new(env!("CARGO_BIN_EXE_ofcore"))
        .args(["--log-level", "error", "slice", "/nonexistent/ofcore-capture.bin"])
        .output()
        .expect("slice should run");

    assert_eq!(output.status.code(), Some(66));
    assert!(String::from_utf8_lossy(&output.stderr).contains("reading"));
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_ofcore"))
        .args(["version", "--extended"])
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    assert!(stdout.contains("openflow: v0x01, v0x04"));
}

#[test]
fn serve_rejects_unsupported_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_ofcore"))
        .args([
            "--log-level",
            "error",
            "serve",
            "--listen",
            "127.0.0.1:0",
            "--versions",
            "2",
        ])
        .output()
        .expect("serve should run");

    assert_eq!(output.status.code(), Some(40));
}
