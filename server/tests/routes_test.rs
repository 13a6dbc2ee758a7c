use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use sendgate::dispatch::RetryPolicy;
use sendgate::mail::{EmailBody, MemoryMailer};
use sendgate_server::{app, AppState, RouteLimits};
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN: &str = "admin@example.com";

fn limits() -> RouteLimits {
    RouteLimits {
        request_timeout: Duration::from_secs(60),
        requests_per_minute: NonZeroU32::new(1000).unwrap(),
    }
}

fn router_with(mailer: &MemoryMailer, ceiling: usize, limits: RouteLimits) -> Router {
    let state = AppState::new(
        Arc::new(mailer.clone()),
        ADMIN,
        ceiling,
        RetryPolicy::new(2, Duration::from_millis(500)),
    );
    app(state, limits)
}

fn router(mailer: &MemoryMailer, ceiling: usize) -> Router {
    router_with(mailer, ceiling, limits())
}

fn from_peer(ip: [u8; 4]) -> Request<Body> {
    let mut request = Request::get("/health").body(Body::empty()).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
    request
}

async fn post(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_reports_ok() {
    let mailer = MemoryMailer::new();
    let request = Request::get("/health").body(Body::empty()).unwrap();

    let (status, body) = send(router(&mailer, 2), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let time = body["time"].as_str().unwrap();
    assert!(time.contains('T'));
    assert!(time.ends_with('Z'));
}

#[tokio::test]
async fn unknown_route_is_404() {
    let mailer = MemoryMailer::new();
    let request = Request::get("/nope").body(Body::empty()).unwrap();

    let (status, body) = send(router(&mailer, 2), request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test(start_paused = true)]
async fn bulk_sends_to_every_recipient() {
    let mailer = MemoryMailer::with_latency(Duration::from_millis(20));
    let emails: Vec<String> = (1..=5).map(|i| format!("user{i}@example.com")).collect();

    let (status, body) = post(
        router(&mailer, 2),
        "/send-bulk-email",
        json!({ "emails": emails, "message": "Hello all" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "sent": 5, "failed": [] }));
    assert!(mailer.peak_in_flight() <= 2);

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 5);
    assert!(sent.iter().all(|e| e.subject == "🔔 Notification from Admin"));
    assert!(sent
        .iter()
        .all(|e| matches!(&e.body, EmailBody::Html(html) if html.contains("Hello all"))));
}

#[tokio::test(start_paused = true)]
async fn bulk_reports_partial_failure_with_200() {
    let mailer = MemoryMailer::new();
    mailer.fail_always("b@example.com").await;

    let (status, body) = post(
        router(&mailer, 2),
        "/send-bulk-email",
        json!({
            "emails": ["a@example.com", "b@example.com", "c@example.com"],
            "subject": "Quarterly update",
            "fileUrl": "https://cdn.example.com/report.pdf"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["sent"], 2);
    assert_eq!(body["failed"].as_array().unwrap().len(), 1);
    assert_eq!(body["failed"][0]["email"], "b@example.com");
    assert!(body["failed"][0]["error"].as_str().unwrap().contains("550"));
    assert_eq!(mailer.attempts("b@example.com").await, 3);

    let sent = mailer.sent().await;
    assert!(sent.iter().all(|e| e.subject == "Quarterly update"));
}

#[tokio::test(start_paused = true)]
async fn bulk_all_failed_still_200() {
    let mailer = MemoryMailer::new();
    mailer.fail_always("a@example.com").await;

    let (status, body) = post(
        router(&mailer, 1),
        "/send-bulk-email",
        json!({ "emails": ["a@example.com"] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["sent"], 0);
}

#[tokio::test]
async fn bulk_rejects_empty_recipient_list() {
    let mailer = MemoryMailer::new();

    let (status, body) = post(
        router(&mailer, 2),
        "/send-bulk-email",
        json!({ "emails": [] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"][0]["field"], "emails");
    assert!(mailer.sent().await.is_empty());
}

#[tokio::test]
async fn bulk_rejects_invalid_addresses() {
    let mailer = MemoryMailer::new();

    let (status, body) = post(
        router(&mailer, 2),
        "/send-bulk-email",
        json!({ "emails": ["ok@example.com", "not-an-address"] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "emails[1]");
    assert_eq!(mailer.attempts("ok@example.com").await, 0);
}

#[tokio::test]
async fn malformed_json_is_400() {
    let mailer = MemoryMailer::new();
    let request = Request::post("/send-login-email")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();

    let (status, body) = send(router(&mailer, 2), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "body");
}

#[tokio::test]
async fn login_email_returns_message_id() {
    let mailer = MemoryMailer::new();

    let (status, body) = post(
        router(&mailer, 2),
        "/send-login-email",
        json!({ "name": "Ada", "email": "ada@example.org" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["messageId"].as_str().unwrap().starts_with('<'));

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["ada@example.org"]);
    assert_eq!(sent[0].subject, "Welcome back, Ada!");
}

#[tokio::test]
async fn login_email_requires_name_and_valid_address() {
    let mailer = MemoryMailer::new();

    let (status, body) = post(
        router(&mailer, 2),
        "/send-login-email",
        json!({ "name": " ", "email": "ada" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "email"]);
}

#[tokio::test(start_paused = true)]
async fn login_email_failure_is_500_after_retries() {
    let mailer = MemoryMailer::new();
    mailer.fail_always("ada@example.org").await;

    let (status, body) = post(
        router(&mailer, 2),
        "/send-login-email",
        json!({ "name": "Ada", "email": "ada@example.org" }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "success": false, "error": "Failed to send email." }));
    assert_eq!(mailer.attempts("ada@example.org").await, 3);
}

#[tokio::test]
async fn contact_message_goes_to_admin_with_reply_to() {
    let mailer = MemoryMailer::new();

    let (status, body) = post(
        router(&mailer, 2),
        "/send-contact-message",
        json!({ "name": "Grace", "email": "grace@example.org", "message": "Love the site" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec![ADMIN]);
    assert_eq!(sent[0].reply_to.as_deref(), Some("grace@example.org"));
    assert!(matches!(&sent[0].body, EmailBody::Html(html) if html.contains("Love the site")));
}

#[tokio::test]
async fn contact_message_requires_message() {
    let mailer = MemoryMailer::new();

    let (status, body) = post(
        router(&mailer, 2),
        "/send-contact-message",
        json!({ "name": "Grace", "email": "grace@example.org", "message": "" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "message");
}

#[tokio::test(start_paused = true)]
async fn concurrent_bulk_requests_do_not_share_a_ceiling() {
    let mailer = MemoryMailer::with_latency(Duration::from_millis(100));
    let router = router(&mailer, 2);
    let batch = |tag: &str| {
        let emails: Vec<String> = (1..=4).map(|i| format!("{tag}{i}@example.com")).collect();
        json!({ "emails": emails })
    };
    let start = tokio::time::Instant::now();

    let ((status_a, body_a), (status_b, body_b)) = tokio::join!(
        post(router.clone(), "/send-bulk-email", batch("a")),
        post(router.clone(), "/send-bulk-email", batch("b")),
    );

    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(status_b, StatusCode::OK);
    assert_eq!(body_a["sent"], 4);
    assert_eq!(body_b["sent"], 4);
    assert_eq!(mailer.peak_in_flight(), 4);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let mailer = MemoryMailer::new();

    for uri in ["/health", "/nope"] {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let response = router(&mailer, 2).oneshot(request).await.unwrap();
        let headers = response.headers();

        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["referrer-policy"], "no-referrer");
    }
}

#[tokio::test]
async fn clients_over_their_budget_get_429() {
    let mailer = MemoryMailer::new();
    let router = router_with(
        &mailer,
        2,
        RouteLimits {
            requests_per_minute: NonZeroU32::new(2).unwrap(),
            ..limits()
        },
    );

    for _ in 0..2 {
        let (status, _) = send(router.clone(), from_peer([10, 0, 0, 1])).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(router.clone(), from_peer([10, 0, 0, 1])).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!({ "success": false, "error": "too many requests" }));

    let (status, _) = send(router, from_peer([10, 0, 0, 2])).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn slow_requests_time_out_with_json_body() {
    let mailer = MemoryMailer::with_latency(Duration::from_secs(5));
    let router = router_with(
        &mailer,
        2,
        RouteLimits {
            request_timeout: Duration::from_millis(50),
            ..limits()
        },
    );

    let (status, body) = post(
        router,
        "/send-login-email",
        json!({ "name": "Ada", "email": "ada@example.org" }),
    )
    .await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body, json!({ "success": false, "error": "request timed out" }));
}
