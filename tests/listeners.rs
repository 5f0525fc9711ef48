//! Listener behaviour: transports, port conflicts, protocol upgrade, restart.

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;

use reload_backend::http::KeepAliveSessions;
use reload_backend::lifecycle::{Collaborators, Outcome, ShutdownReason, StartupError};
use reload_backend::net::{ListenerError, BIND_CONFLICT_GRACE};

mod common;

fn occupied_port() -> (StdTcpListener, u16) {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[tokio::test]
async fn primary_port_conflict_exits_zero_after_grace() {
    let dir = tempfile::tempdir().unwrap();
    let (_holder, port) = occupied_port();
    let mut config = common::test_config(dir.path());
    config.port = port;

    let started = Instant::now();
    let outcome = common::orchestrator(config, Collaborators::builtin())
        .run_until(std::future::pending())
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Exit(0));
    assert!(started.elapsed() >= BIND_CONFLICT_GRACE);
}

#[tokio::test]
async fn website_port_conflict_exits_one_after_grace() {
    let dir = tempfile::tempdir().unwrap();
    let (_holder, port) = occupied_port();
    let mut config = common::test_config(dir.path());
    config.website.enabled = true;
    config.website.port = port;

    let started = Instant::now();
    let outcome = common::orchestrator(config, Collaborators::builtin())
        .run_until(std::future::pending())
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Exit(1));
    assert!(started.elapsed() >= BIND_CONFLICT_GRACE);
}

#[tokio::test]
async fn port_conflict_surfaces_from_start() {
    let dir = tempfile::tempdir().unwrap();
    let (_holder, port) = occupied_port();
    let mut config = common::test_config(dir.path());
    config.port = port;

    let result = common::orchestrator(config, Collaborators::builtin()).start().await;
    assert!(matches!(
        result,
        Err(StartupError::Listener(ListenerError::PortInUse { port: p, .. })) if p == port
    ));
}

#[tokio::test]
async fn missing_tls_material_is_fatal_without_delay() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.enable_https = true;
    config.ssl.cert = dir.path().join("missing-cert.pem").display().to_string();
    config.ssl.key = dir.path().join("missing-key.pem").display().to_string();

    let started = Instant::now();
    let result = common::orchestrator(config, Collaborators::builtin())
        .run_until(std::future::pending())
        .await;

    assert!(matches!(result, Err(StartupError::Listener(ListenerError::Tls(_)))));
    assert!(started.elapsed() < BIND_CONFLICT_GRACE);
}

#[tokio::test]
async fn https_mode_serves_only_tls_on_the_primary_port() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.enable_https = true;
    config.ssl.cert = common::fixture("cert.pem").display().to_string();
    config.ssl.key = common::fixture("key.pem").display().to_string();
    config.ssl.ca = Some(dir.path().join("no-ca.pem").display().to_string());

    let running = common::start(config).await;
    assert!(running.is_secured());
    let port = running.primary_addr().port();

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap();
    let response = client
        .get(format!("https://localhost:{}/unknown", port))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let plain = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
        .get(format!("http://127.0.0.1:{}/unknown", port))
        .send()
        .await;
    assert!(plain.is_err() || !plain.unwrap().status().is_success());

    running.stop().await;
}

#[tokio::test]
async fn upgrade_requests_reach_the_push_protocol_on_any_path() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = KeepAliveSessions::new();
    let mut collaborators = Collaborators::builtin();
    collaborators.push = Arc::new(sessions.clone());

    let running = common::orchestrator(common::test_config(dir.path()), collaborators)
        .start()
        .await
        .unwrap();
    let addr = running.primary_addr();

    let (mut socket, _response) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{}/", addr.port()))
        .await
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while sessions.active() != 1 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(sessions.active(), 1);

    socket.send(Message::Close(None)).await.unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while sessions.active() != 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(sessions.active(), 0);

    // Plain HTTP on the same socket is unaffected.
    let status = reqwest::get(common::local_url(addr, "/unknown")).await.unwrap().status();
    assert_eq!(status, StatusCode::OK);

    let (_other, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{}/some/other/path", addr.port()))
        .await
        .unwrap();

    running.stop().await;
}

#[tokio::test]
async fn scheduled_restart_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.enable_auto_restart = true;
    config.restart_time = "1s".into();

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        common::orchestrator(config, Collaborators::builtin()).run_until(std::future::pending()),
    )
    .await
    .expect("restart did not fire")
    .unwrap();

    assert_eq!(outcome, Outcome::Exit(0));
}

#[tokio::test]
async fn external_shutdown_stops_the_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.use_auto_rotate = true;
    config.discord.enabled = true;

    let orchestrator = common::orchestrator(config, Collaborators::builtin());
    let shutdown = orchestrator.shutdown_handle();
    let run = tokio::spawn(orchestrator.run_until(std::future::pending()));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(shutdown.trigger(ShutdownReason::Requested));

    let outcome = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("backend did not stop")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, Outcome::Shutdown);
    assert_eq!(shutdown.reason(), Some(ShutdownReason::Requested));
}

#[tokio::test]
async fn shutdown_before_waiting_is_not_missed() {
    let dir = tempfile::tempdir().unwrap();
    let running = common::start(common::test_config(dir.path())).await;
    let shutdown = running.shutdown_handle();
    shutdown.trigger(ShutdownReason::Requested);

    let outcome = tokio::time::timeout(Duration::from_secs(10), running.wait(std::future::pending()))
        .await
        .expect("backend did not stop");
    assert_eq!(outcome, Outcome::Shutdown);
}

#[tokio::test]
async fn website_bind_failure_records_the_aborted_start() {
    let dir = tempfile::tempdir().unwrap();
    let (_holder, port) = occupied_port();
    let mut config = common::test_config(dir.path());
    config.website.enabled = true;
    config.website.port = port;

    let orchestrator = common::orchestrator(config, Collaborators::builtin());
    let shutdown = orchestrator.shutdown_handle();
    assert!(orchestrator.start().await.is_err());
    assert_eq!(shutdown.reason(), Some(ShutdownReason::StartupAborted));
}
