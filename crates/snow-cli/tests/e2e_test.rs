//! End-to-end launches of the `snow` binary.
//!
//! Tests that touch the kernel need root and a real image, so they are
//! ignored by default. Run them with
//! `SNOW_TEST_IMAGE=/path/to/rootfs.squashfs cargo test -- --ignored`
//! as root.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;
use std::process::Command;

fn snow() -> Command {
    Command::new(env!("CARGO_BIN_EXE_snow"))
}

fn test_image() -> String {
    std::env::var("SNOW_TEST_IMAGE").expect("SNOW_TEST_IMAGE must name a squashfs image")
}

#[test]
fn missing_image_exits_with_artifact_code() {
    let mut config = tempfile::NamedTempFile::new().expect("tempfile");
    config.write_all(b"{}").expect("write config");
    let status = snow()
        .arg("--config")
        .arg(config.path())
        .args(["--image", "/nonexistent/rootfs.squashfs"])
        .args(["--", "-c", "true"])
        .status()
        .expect("run snow");
    assert_eq!(status.code(), Some(71));
}

#[test]
fn print_plan_needs_no_privileges() {
    let mut image = tempfile::NamedTempFile::new().expect("tempfile");
    let mut sb = vec![0u8; 4096];
    sb[0..4].copy_from_slice(b"hsqs");
    sb[12..16].copy_from_slice(&131_072u32.to_le_bytes());
    sb[20..22].copy_from_slice(&4u16.to_le_bytes());
    sb[22..24].copy_from_slice(&17u16.to_le_bytes());
    sb[28..30].copy_from_slice(&4u16.to_le_bytes());
    sb[40..48].copy_from_slice(&4096u64.to_le_bytes());
    image.write_all(&sb).expect("write image");

    let output = snow()
        .arg("--image")
        .arg(image.path())
        .args(["--print-plan", "--bind", "/etc/hosts:/etc/hosts:ro"])
        .output()
        .expect("run snow");
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("remount none on /proc/self/fd/etc/hosts (ro)"), "{stdout}");
}

#[test]
fn conflicting_image_flags_are_usage_errors() {
    let status = snow()
        .args(["--image", "/a", "--embedded-section", ".squashfs"])
        .status()
        .expect("run snow");
    assert_eq!(status.code(), Some(2));
}

#[test]
#[ignore = "needs root and SNOW_TEST_IMAGE"]
fn target_exit_code_is_propagated() {
    let image = test_image();
    let status = snow()
        .args(["--image", image.as_str(), "--", "-c", "exit 7"])
        .status()
        .expect("run snow");
    assert_eq!(status.code(), Some(7));
}

#[test]
#[ignore = "needs root and SNOW_TEST_IMAGE"]
fn forwarded_arguments_reach_the_target() {
    let image = test_image();
    let output = snow()
        .args(["--image", image.as_str(), "--", "-c", "echo \"$0|$1\"", "a", "b c"])
        .output()
        .expect("run snow");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "a|b c");
}

#[test]
#[ignore = "needs root and SNOW_TEST_IMAGE"]
fn missing_target_fails_with_exec_code() {
    let image = test_image();
    let status = snow()
        .args(["--image", image.as_str(), "--target", "/no/such/binary"])
        .status()
        .expect("run snow");
    assert_eq!(status.code(), Some(77));
}
