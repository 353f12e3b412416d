//! HTTP checks against a local stub router.
//!
//! The stub serves the same shapes the platform router exposes: a health
//! endpoint, an endpoint that is never ready, and a basic-auth-guarded
//! delimited stats report.

use std::net::SocketAddr;

use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::get;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use converge::http::{HttpCheck, HttpError};
use converge::probe::{Outcome, Probe};
use converge::stats::{BalanceBand, parse_stats};

const STATS_REPORT: &str = "\
# pxname,svname,scur,smax,slim,stot,bin,bout\n\
stats,FRONTEND,0,1,2000,5,100,200\n\
be_weightedroute,BACKEND,0,2,200,40,400,800\n\
be_weightedroute,endpoint-1,0,1,100,30,300,600\n\
be_weightedroute,endpoint-2,0,1,100,10,100,200\n";

async fn stats_handler(headers: HeaderMap) -> (StatusCode, String) {
    let expected = format!("Basic {}", BASE64.encode("admin:password"));
    let supplied = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if supplied == Some(expected.as_str()) {
        (StatusCode::OK, STATS_REPORT.to_string())
    } else {
        (StatusCode::UNAUTHORIZED, "auth required".to_string())
    }
}

async fn spawn_stub() -> SocketAddr {
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/unready",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "starting") }),
        )
        .route("/stats", get(stats_handler));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_response_probe_satisfied_on_expected_status_and_body() {
    let addr = spawn_stub().await;
    let check = HttpCheck::new().unwrap();

    let probe = check.response_probe(
        format!("http://{addr}/healthz"),
        Some("weighted.example.com"),
        StatusCode::OK,
        Some("ok"),
    );
    assert!(probe.evaluate().await.is_satisfied());
}

#[tokio::test]
async fn test_response_probe_pending_on_unexpected_status() {
    let addr = spawn_stub().await;
    let check = HttpCheck::new().unwrap();

    let probe = check.response_probe(
        format!("http://{addr}/unready"),
        None,
        StatusCode::OK,
        None,
    );
    let outcome = probe.evaluate().await;
    assert!(matches!(outcome, Outcome::Pending(_)), "got {outcome:?}");
}

#[tokio::test]
async fn test_response_probe_pending_on_connection_refused() {
    // Bind then drop to get a port nothing is listening on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let check = HttpCheck::new().unwrap();
    let probe = check.response_probe(format!("http://{addr}/healthz"), None, StatusCode::OK, None);

    let outcome = probe.evaluate().await;
    assert!(matches!(outcome, Outcome::Pending(_)), "got {outcome:?}");
}

#[tokio::test]
async fn test_stats_fetch_parse_and_balance_check() {
    let addr = spawn_stub().await;
    let check = HttpCheck::new().unwrap();

    let report = check
        .fetch_stats(
            &format!("http://{addr}/stats"),
            Some("weighted.example.com"),
            "admin",
            "password",
        )
        .await
        .unwrap();

    let values = parse_stats(&report, "weightedroute", "BACKEND", 5).unwrap();
    assert_eq!(values, vec!["30".to_string(), "10".to_string()]);

    let first: u64 = values[0].parse().unwrap();
    let second: u64 = values[1].parse().unwrap();
    assert!(BalanceBand::default().accepts(first, second));
}

#[tokio::test]
async fn test_stats_fetch_rejected_credentials_are_hard_errors() {
    let addr = spawn_stub().await;
    let check = HttpCheck::new().unwrap();

    let error = check
        .fetch_stats(&format!("http://{addr}/stats"), None, "admin", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(error, HttpError::Denied { .. }), "got {error:?}");
}

#[tokio::test]
async fn test_expect_status_repeated_holds_across_requests() {
    let addr = spawn_stub().await;
    let check = HttpCheck::new().unwrap();

    check
        .expect_status_repeated(&format!("http://{addr}/healthz"), None, StatusCode::OK, 20)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_expect_status_repeated_reports_failing_attempt() {
    let addr = spawn_stub().await;
    let check = HttpCheck::new().unwrap();

    let error = check
        .expect_status_repeated(
            &format!("http://{addr}/unready"),
            None,
            StatusCode::OK,
            5,
        )
        .await
        .unwrap_err();

    match error {
        HttpError::UnexpectedStatus {
            status, attempt, ..
        } => {
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(attempt, 1);
        }
        other => panic!("expected UnexpectedStatus, got {other:?}"),
    }
}
