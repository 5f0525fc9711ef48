//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use reload_backend::config::BackendConfig;
use reload_backend::lifecycle::{Collaborators, Orchestrator, Running};

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// A config that binds ephemeral ports and keeps every file inside `dir`.
pub fn test_config(dir: &Path) -> BackendConfig {
    let mut config = BackendConfig::default();
    config.port = 0;
    config.website.port = 0;
    config.tokens_path = dir.join("tokenManager").join("tokens.json");
    config.client_settings_dir = dir.join("ClientSettings");
    config.update_check.enabled = false;
    config
}

pub fn orchestrator(config: BackendConfig, collaborators: Collaborators) -> Orchestrator {
    Orchestrator::new(config, collaborators).with_host(LOCALHOST)
}

pub async fn start(config: BackendConfig) -> Running {
    orchestrator(config, Collaborators::builtin())
        .start()
        .await
        .expect("backend failed to start")
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

pub fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn token_entry(value: &str, created_hours_ago: i64, hours_expire: u32) -> Value {
    json!({
        "token": value,
        "creation_date": rfc3339(Utc::now() - ChronoDuration::hours(created_hours_ago)),
        "hours_expire": hours_expire,
    })
}

pub fn write_json(path: &Path, document: &Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, serde_json::to_string_pretty(document).unwrap()).unwrap();
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

/// Send `request_line` verbatim and return the raw response. Used where an
/// HTTP client would normalise the path first.
pub async fn raw_request(addr: SocketAddr, request_line: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("{}\r\nHost: localhost\r\nConnection: close\r\n\r\n", request_line);
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

pub fn local_url(addr: SocketAddr, path: &str) -> String {
    format!("http://127.0.0.1:{}{}", addr.port(), path)
}
