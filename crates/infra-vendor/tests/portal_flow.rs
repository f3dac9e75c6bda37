//! Drives the secure mail session against an in-process fake portal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Router};
use tokio::net::TcpListener;

use secmail_domain::{OriginalFetcher, SecureMailReference};
use secmail_error::SecMailError;
use secmail_vendor::{
    SecureMailDownloader, SecureMailSession, SessionStage, VendorClient, VendorConfig,
    VendorCredentials,
};

const USERNAME: &str = "clerk@example.com";
const PASSWORD: &str = "hunter2";
const ORIGINAL: &str = "From: sender@bank.example\r\nSubject: Statement\r\n\r\nhello\r\n";

const NOTIFICATION: &str = r#"<html><body>
<p>You have received a secure mail.</p>
<form action="https://portal.example/web.app" method="post">
  <input type="hidden" name="step" value="open">
  <input type="hidden" name="mail" value="m-1">
  <input type="submit" value="Open">
</form>
</body></html>"#;

const LOGIN_PAGE: &str = r#"<html><body><div id="content">
<form method="post">
  <input type="hidden" name="step" value="login">
  <input type="hidden" name="sid" value="s-1">
  <input type="hidden" name="email" value="prefilled@example.com">
  <input type="password" name="password">
</form>
</div></body></html>"#;

const MAIL_PAGE: &str = r#"<html><body><div id="content">
<ul class="nav nav-pills">
  <li><form><input type="hidden" name="step" value="reply"></form></li>
</ul>
<ul class="nav nav-pills">
  <li><form><input type="hidden" name="step" value="print"></form></li>
  <li><form><input type="hidden" name="step" value="download"><input type="hidden" name="sid" value="s-1"></form></li>
</ul>
</div></body></html>"#;

#[derive(Default)]
struct Portal {
    requests: Mutex<Vec<HashMap<String, String>>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Portal {
    fn requests(&self) -> Vec<HashMap<String, String>> {
        self.requests.lock().unwrap().clone()
    }
}

fn field<'a>(form: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    form.get(name).map(String::as_str)
}

async fn web_app(
    State(portal): State<Arc<Portal>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let now = portal.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    portal.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    portal.requests.lock().unwrap().push(form.clone());
    tokio::time::sleep(Duration::from_millis(20)).await;

    let response = match field(&form, "step") {
        Some("open") if field(&form, "mail") == Some("m-1") => {
            Html(LOGIN_PAGE).into_response()
        }
        Some("login")
            if field(&form, "email") == Some(USERNAME)
                && field(&form, "password") == Some(PASSWORD) =>
        {
            Html(MAIL_PAGE).into_response()
        }
        Some("login") => (StatusCode::UNAUTHORIZED, Html("<p>denied</p>")).into_response(),
        Some("download")
            if field(&form, "access") == Some("raw") && field(&form, "sid") == Some("s-1") =>
        {
            ORIGINAL.as_bytes().to_vec().into_response()
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    };

    portal.in_flight.fetch_sub(1, Ordering::SeqCst);
    response
}

async fn start_portal() -> (String, Arc<Portal>) {
    let portal = Arc::new(Portal::default());
    let app = Router::new()
        .route("/web.app", post(web_app))
        .with_state(Arc::clone(&portal));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://127.0.0.1:{port}/web.app"), portal)
}

fn client(endpoint: &str, max_connections: usize) -> VendorClient {
    VendorClient::new(VendorConfig {
        endpoint: endpoint.to_string(),
        max_connections,
    })
    .unwrap()
}

fn credentials(password: &str) -> VendorCredentials {
    VendorCredentials {
        username: USERNAME.to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn downloads_original_through_three_steps() {
    let (endpoint, portal) = start_portal().await;
    let downloader = SecureMailDownloader::new(client(&endpoint, 2), credentials(PASSWORD));

    let mut sink = Vec::new();
    let written = downloader
        .fetch_original(SecureMailReference::new(NOTIFICATION), &mut sink)
        .await
        .unwrap();

    assert_eq!(written, ORIGINAL.len() as u64);
    assert_eq!(sink, ORIGINAL.as_bytes());

    let requests = portal.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].get("mail").map(String::as_str), Some("m-1"));
    assert_eq!(requests[1].get("email").map(String::as_str), Some(USERNAME));
    assert_eq!(requests[1].get("sid").map(String::as_str), Some("s-1"));
    assert_eq!(requests[2].get("access").map(String::as_str), Some("raw"));
    assert!(!requests[2].contains_key("password"));
}

#[tokio::test]
async fn session_walks_through_each_stage() {
    let (endpoint, _portal) = start_portal().await;
    let mut session = SecureMailSession::new(client(&endpoint, 1));
    assert_eq!(session.stage(), SessionStage::Unopened);

    session
        .open(SecureMailReference::new(NOTIFICATION))
        .await
        .unwrap();
    assert_eq!(session.stage(), SessionStage::Opened);

    session.login(USERNAME, PASSWORD).await.unwrap();
    assert_eq!(session.stage(), SessionStage::Authenticated);

    let mut sink = Vec::new();
    session.download(&mut sink).await.unwrap();
    assert_eq!(session.stage(), SessionStage::Terminal);

    let err = session.download(&mut sink).await.unwrap_err();
    assert!(matches!(err, SecMailError::StateMismatch { .. }));
}

#[tokio::test]
async fn rejected_credentials_surface_as_auth_error() {
    let (endpoint, portal) = start_portal().await;
    let downloader = SecureMailDownloader::new(client(&endpoint, 1), credentials("wrong"));

    let mut sink = Vec::new();
    let err = downloader
        .fetch_original(SecureMailReference::new(NOTIFICATION), &mut sink)
        .await
        .unwrap_err();

    match err {
        SecMailError::Auth(cause) => assert!(matches!(*cause, SecMailError::Http(_))),
        other => panic!("expected auth error, got {other:?}"),
    }
    assert!(sink.is_empty());
    assert_eq!(portal.requests().len(), 2);
}

#[tokio::test]
async fn connection_limit_bounds_requests_in_flight() {
    let (endpoint, portal) = start_portal().await;
    let downloader = Arc::new(SecureMailDownloader::new(
        client(&endpoint, 1),
        credentials(PASSWORD),
    ));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let downloader = Arc::clone(&downloader);
        handles.push(tokio::spawn(async move {
            let mut sink = Vec::new();
            downloader
                .fetch_original(SecureMailReference::new(NOTIFICATION), &mut sink)
                .await
                .map(|_| sink)
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), ORIGINAL.as_bytes());
    }

    assert_eq!(portal.requests().len(), 12);
    assert_eq!(portal.peak_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn out_of_order_steps_never_reach_the_portal() {
    let (endpoint, portal) = start_portal().await;
    let mut session = SecureMailSession::new(client(&endpoint, 1));
    session
        .open(SecureMailReference::new(NOTIFICATION))
        .await
        .unwrap();

    let mut sink = Vec::new();
    let err = session.download(&mut sink).await.unwrap_err();
    assert!(matches!(
        err,
        SecMailError::StateMismatch {
            expected: "authenticated",
            actual: "opened"
        }
    ));
    assert!(sink.is_empty());
    assert_eq!(session.stage(), SessionStage::Opened);
    assert_eq!(portal.requests().len(), 1);

    session.login(USERNAME, PASSWORD).await.unwrap();
    let err = session.login(USERNAME, PASSWORD).await.unwrap_err();
    assert!(matches!(
        err,
        SecMailError::StateMismatch {
            expected: "opened",
            actual: "authenticated"
        }
    ));
    assert_eq!(portal.requests().len(), 2);

    session.download(&mut sink).await.unwrap();
    assert_eq!(sink, ORIGINAL.as_bytes());
    assert_eq!(portal.requests().len(), 3);
}
