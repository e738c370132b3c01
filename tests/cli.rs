//! The binary's exit status and diagnostics.

use std::net::TcpListener;
use std::process::Command;

#[test]
fn failed_handshake_is_reported_once_and_exits_non_zero() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let output = Command::new(env!("CARGO_BIN_EXE_btc-handshake"))
        .env("NODE_ADDRESS", &address)
        .env("HANDSHAKE_TIMEOUT_SECS", "1")
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let all = format!("{stdout}{stderr}");

    assert!(!output.status.success());
    assert_eq!(all.matches("Handshake with").count(), 1, "{all}");
    assert!(stderr.contains("failed while connecting"), "{stderr}");
}

#[test]
fn invalid_configuration_exits_non_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_btc-handshake"))
        .env("NODE_NETWORK", "signet")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read configuration"));
}
