//! Shared test utilities for integration tests.
//!
//! `TestClient` builds the full application over a fresh SQLite file and
//! behaves like a browser: it keeps the session cookie between requests and
//! adds the matching XSRF token to every form it posts.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use bpcash::auth::SESSION_COOKIE;
use bpcash::config::{Config, MailConfig};
use bpcash::server::build_app_with_mailer;
use bpcash::services::mailer::{MemoryMailer, OutgoingMail};
use bpcash::state::AppState;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

pub const PASSWORD: &str = "senha-segura-123";

pub fn test_config(dir: &TempDir) -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        database_path: dir.path().join("bpcash.db"),
        migrations_path: PathBuf::from("migrations"),
        static_path: PathBuf::from("static"),
        site_url: "http://bpcash.test".into(),
        admin_email: None,
        fetch_timeout: Duration::from_secs(2),
        mail: MailConfig::default(),
    }
}

/// A test client that simulates a browser session, allowing sequential requests
/// against the application.
pub struct TestClient {
    pub state: AppState,
    pub mailer: Arc<MemoryMailer>,
    router: Router,
    session: Mutex<Option<String>>,
    _dir: TempDir,
}

/// Status, `Location` header and body of a response.
pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: String,
}

impl TestClient {
    /// Create a new test client with a fresh database and no session.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mailer = Arc::new(MemoryMailer::new());
        let (state, router) = build_app_with_mailer(test_config(&dir), mailer.clone())
            .expect("Failed to build app");

        Self {
            state,
            mailer,
            router,
            session: Mutex::new(None),
            _dir: dir,
        }
    }

    /// A client sharing this one's application but with its own cookies.
    pub fn other_browser(&self) -> BrowserClient<'_> {
        BrowserClient {
            client: self,
            session: Mutex::new(None),
        }
    }

    pub fn session(&self) -> Option<String> {
        self.session.lock().unwrap().clone()
    }

    /// The XSRF token a page rendered for this browser would carry.
    pub fn xsrf_token(&self) -> String {
        token_for(&self.state, self.session().as_deref())
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        send(&self.router, &self.session, Request::get(uri), Body::empty()).await
    }

    /// POST a urlencoded form, adding the XSRF token.
    pub async fn post_form(&self, uri: &str, form: &[(&str, &str)]) -> TestResponse {
        let body = encode_form(form, Some(&self.xsrf_token()));
        self.post_raw(uri, body).await
    }

    /// POST a urlencoded form exactly as given.
    pub async fn post_raw(&self, uri: &str, body: String) -> TestResponse {
        let builder = Request::post(uri).header(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        );
        send(&self.router, &self.session, builder, Body::from(body)).await
    }

    /// POST one file as `multipart/form-data`, with the XSRF token in the
    /// query string.
    pub async fn post_file(
        &self,
        uri: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> TestResponse {
        let uri = format!(
            "{}?_xsrf_token={}",
            uri,
            urlencoding::encode(&self.xsrf_token())
        );
        self.post_file_unchecked(&uri, file_name, content_type, bytes)
            .await
    }

    /// POST one file as `multipart/form-data` to `uri` as given.
    pub async fn post_file_unchecked(
        &self,
        uri: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> TestResponse {
        let boundary = "bpcash-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let builder = Request::post(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        );
        send(&self.router, &self.session, builder, Body::from(body)).await
    }

    /// Sign up and finish onboarding with the given fixed income.
    pub async fn signup(&self, email: &str, fixed_income: &str) -> TestResponse {
        let response = self
            .post_form(
                "/signup",
                &[("name", "Maria"), ("email", email), ("password", PASSWORD)],
            )
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "signup failed: {}", response.body);

        let response = self
            .post_form("/onboarding/income", &[("fixed_income", fixed_income)])
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        response
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.post_form("/login", &[("email", email), ("password", password)])
            .await
    }

    pub async fn logout(&self) -> TestResponse {
        self.post_form("/logout", &[]).await
    }

    /// Current user id, looked up through the session store.
    pub fn user_id(&self) -> i64 {
        let token = self.session().expect("not logged in");
        self.state.sessions.get(&token).expect("no session").user_id
    }

    /// Id of the signed-in user's category with this name.
    pub fn category_id(&self, name: &str) -> i64 {
        let conn = self.state.db.get().unwrap();
        conn.query_row(
            "SELECT id FROM categories WHERE user_id = ? AND name = ?",
            rusqlite::params![self.user_id(), name],
            |row| row.get(0),
        )
        .unwrap_or_else(|_| panic!("category {} not found", name))
    }

    /// Create an expense through the form. `extra` overrides defaults.
    pub async fn create_expense(&self, amount: &str, date: &str, extra: &[(&str, &str)]) -> TestResponse {
        let category = self.category_id("Alimentação").to_string();
        let mut form: Vec<(&str, &str)> = vec![
            ("category_id", category.as_str()),
            ("issuer_name", "Mercado Bom Preço"),
            ("amount", amount),
            ("installments", "1"),
            ("payment_method", "DEBITO"),
            ("expense_type", "VARIAVEL"),
            ("date", date),
        ];
        for (key, value) in extra {
            form.retain(|(k, _)| k != key);
            form.push((*key, *value));
        }
        self.post_form("/expenses/create", &form).await
    }

    /// Wait until the mailer holds `count` messages or the timeout passes.
    pub async fn wait_for_mail(&self, count: usize) -> Vec<OutgoingMail> {
        for _ in 0..100 {
            let sent = self.mailer.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.mailer.sent()
    }

    /// Let queued background work run, then return what was sent.
    pub async fn settle_mail(&self) -> Vec<OutgoingMail> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        self.mailer.sent()
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

/// A second browser against the same application.
pub struct BrowserClient<'a> {
    client: &'a TestClient,
    session: Mutex<Option<String>>,
}

impl BrowserClient<'_> {
    pub async fn get(&self, uri: &str) -> TestResponse {
        send(&self.client.router, &self.session, Request::get(uri), Body::empty()).await
    }

    pub async fn post_form(&self, uri: &str, form: &[(&str, &str)]) -> TestResponse {
        let token = token_for(&self.client.state, self.session.lock().unwrap().as_deref());
        let body = encode_form(form, Some(&token));
        let builder = Request::post(uri).header(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        );
        send(&self.client.router, &self.session, builder, Body::from(body)).await
    }

    pub async fn post_raw(&self, uri: &str, body: String) -> TestResponse {
        let builder = Request::post(uri).header(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        );
        send(&self.client.router, &self.session, builder, Body::from(body)).await
    }

    pub async fn signup(&self, email: &str, fixed_income: &str) {
        let response = self
            .post_form(
                "/signup",
                &[("name", "João"), ("email", email), ("password", PASSWORD)],
            )
            .await;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "signup failed: {}", response.body);
        self.post_form("/onboarding/income", &[("fixed_income", fixed_income)])
            .await;
    }
}

fn token_for(state: &AppState, session: Option<&str>) -> String {
    session
        .and_then(|token| state.sessions.get(token))
        .map(|s| s.xsrf_token)
        .unwrap_or_else(|| state.anon_xsrf.value().to_string())
}

pub fn encode_form(form: &[(&str, &str)], xsrf: Option<&str>) -> String {
    let mut pairs = form.to_vec();
    if let Some(token) = xsrf {
        pairs.push(("_xsrf_token", token));
    }
    serde_urlencoded::to_string(&pairs).expect("form encoding")
}

async fn send(
    router: &Router,
    session: &Mutex<Option<String>>,
    mut builder: axum::http::request::Builder,
    body: Body,
) -> TestResponse {
    if let Some(token) = session.lock().unwrap().as_deref() {
        builder = builder.header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token));
    }
    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    remember_session(session, &response);

    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();

    TestResponse {
        status,
        location,
        body: String::from_utf8_lossy(&bytes).to_string(),
    }
}

fn remember_session(session: &Mutex<Option<String>>, response: &Response<Body>) {
    let prefix = format!("{}=", SESSION_COOKIE);
    for value in response.headers().get_all(header::SET_COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        let Some(rest) = value.strip_prefix(&prefix) else { continue };
        let token = rest.split(';').next().unwrap_or("").trim();
        *session.lock().unwrap() = (!token.is_empty()).then(|| token.to_string());
    }
}
