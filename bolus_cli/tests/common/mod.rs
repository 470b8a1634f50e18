//! Shared fixtures for the CLI integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use chrono::{Duration, Utc};
use serde_json::json;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;
use tempfile::TempDir;

/// Nothing is expected to listen on the discard port
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9/api/v1/treatments";

pub fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// CLI isolated from the user's config and environment
pub fn cli(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("autobolus"));
    cmd.env("XDG_CONFIG_HOME", temp_dir.path().join("config"))
        .env_remove("AUTOBOLUS_LIVER_ISF")
        .env_remove("AUTOBOLUS_LIVER_CR")
        .env_remove("AUTOBOLUS_DOSING_ISF")
        .env_remove("AUTOBOLUS_DOSING_CR")
        .env_remove("AUTOBOLUS_API_URL")
        .env_remove("AUTOBOLUS_API_KEY")
        .env("RUST_LOG", "warn");
    cmd
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn minutes_ago(minutes: i64) -> i64 {
    (Utc::now() - Duration::minutes(minutes)).timestamp_millis()
}

pub fn write_json(dir: &Path, name: &str, value: serde_json::Value) {
    fs::write(dir.join(name), serde_json::to_string_pretty(&value).unwrap())
        .expect("Failed to write fixture");
}

pub fn write_sgv(dir: &Path, mgdl: f64, direction: &str) {
    write_json(
        dir,
        "sgv.json",
        json!([{ "sgv": mgdl, "direction": direction, "date": now_millis() }]),
    );
}

/// Active mmol/L profile: ISF 2.0, CR 10, target_high 9.0
pub fn write_profile(dir: &Path) {
    write_json(
        dir,
        "profile.json",
        json!([{
            "mills": minutes_ago(120),
            "store": {
                "OpenAPS Autosync": {
                    "units": "mmol",
                    "sens": [{ "time": "00:00", "value": 2.0 }],
                    "carbratio": [{ "time": "00:00", "value": 10 }],
                    "target_high": [{ "time": "00:00", "value": 9.0 }]
                }
            }
        }]),
    );
}

pub fn write_iob(dir: &Path, entries: &[(i64, f64)]) {
    let entries: Vec<_> = entries
        .iter()
        .map(|&(ago, insulin)| json!({ "time": minutes_ago(ago), "insulin": insulin }))
        .collect();
    write_json(dir, "iobHistory.json", json!(entries));
}

pub fn write_flat_curve(dir: &Path) {
    write_json(dir, "sinuscurves.json", json!({ "sinus": vec![1.0; 24] }));
}

/// Treatments endpoint that accepts exactly one POST with 200 and hands back
/// the JSON body it received
pub fn accept_one_treatment() -> (String, thread::JoinHandle<serde_json::Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let url = format!("http://{}/api/v1/treatments", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("No submission arrived");
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        assert!(headers.starts_with("post /api/v1/treatments"));
        let length: usize = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .map(|v| v.trim().parse().unwrap())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed before body");
            buf.extend_from_slice(&chunk[..n]);
        }

        stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .unwrap();
        serde_json::from_slice(&buf[header_end..header_end + length]).unwrap()
    });

    (url, handle)
}
