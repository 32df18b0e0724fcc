#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use quickledger::config::Config;
use quickledger::middleware::auth_redirect::ChannelNavigator;
use quickledger::models::{Credentials, User};
use quickledger::state::App;
use quickledger::storage::{MemoryStore, StorageKey};

pub const EMAIL: &str = "owner@books.test";
pub const PASSWORD: &str = "correct-horse";

/// In-process stand-in for the accounting backend.
#[derive(Default)]
pub struct Backend {
    access_tokens: Mutex<HashSet<String>>,
    refresh_tokens: Mutex<HashSet<String>>,
    companies: Mutex<Vec<Value>>,
    next_token: AtomicU64,
    next_company: AtomicU64,
    pub locked: AtomicBool,
    pub fail_companies: AtomicBool,
    pub reject_refreshed: AtomicBool,
    pub rotate_refresh: AtomicBool,
    pub paginate: AtomicBool,
    pub company_delay_ms: AtomicU64,
    pub refresh_calls: AtomicUsize,
    pub company_list_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub last_login: Mutex<Option<Value>>,
}

impl Backend {
    pub fn revoke_access_tokens(&self) {
        self.access_tokens.lock().unwrap().clear();
    }

    pub fn revoke_refresh_tokens(&self) {
        self.refresh_tokens.lock().unwrap().clear();
    }

    pub fn seed_companies(&self, companies: Vec<Value>) {
        *self.companies.lock().unwrap() = companies;
        self.next_company.store(1000, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn company_list_calls(&self) -> usize {
        self.company_list_calls.load(Ordering::SeqCst)
    }

    fn issue_token(&self, prefix: &str) -> String {
        let n = self.next_token.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-{n}")
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| self.access_tokens.lock().unwrap().contains(token))
    }
}

fn user_json(first_name: &str) -> Value {
    json!({
        "id": 17,
        "email": EMAIL,
        "first_name": first_name,
        "last_name": "Owner",
        "role": "owner",
    })
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn unauthorized() -> Response {
    reply(
        StatusCode::UNAUTHORIZED,
        json!({ "detail": "Given token not valid for any token type" }),
    )
}

type Shared = Arc<Backend>;

async fn login(State(b): State<Shared>, Json(body): Json<Value>) -> Response {
    *b.last_login.lock().unwrap() = Some(body.clone());

    if b.locked.load(Ordering::SeqCst) {
        return reply(StatusCode::LOCKED, json!({ "detail": "Account locked" }));
    }
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    if email.is_empty() {
        return reply(StatusCode::BAD_REQUEST, json!({ "detail": "Email is required" }));
    }
    if email != EMAIL || password != PASSWORD {
        return reply(
            StatusCode::UNAUTHORIZED,
            json!({ "detail": "No active account found with the given credentials" }),
        );
    }

    let access = b.issue_token("access");
    let refresh = b.issue_token("refresh");
    b.access_tokens.lock().unwrap().insert(access.clone());
    b.refresh_tokens.lock().unwrap().insert(refresh.clone());

    reply(
        StatusCode::OK,
        json!({ "user": user_json("Olive"), "access": access, "refresh": refresh }),
    )
}

async fn logout(State(b): State<Shared>) -> Response {
    b.logout_calls.fetch_add(1, Ordering::SeqCst);
    reply(StatusCode::OK, json!({ "message": "Logged out" }))
}

async fn register(Json(body): Json<Value>) -> Response {
    let password = body["password"].as_str().unwrap_or_default();
    if password.len() < 8 {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "detail": "Password must be at least 8 characters" }),
        );
    }
    reply(
        StatusCode::CREATED,
        json!({ "id": 99, "email": body["email"].clone() }),
    )
}

async fn change_password(
    State(b): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    if body["old_password"].as_str() != Some(PASSWORD) {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "detail": "Old password is incorrect" }),
        );
    }
    reply(StatusCode::OK, json!({ "message": "Password changed" }))
}

async fn forgot_password() -> Response {
    reply(StatusCode::OK, json!({ "message": "If the account exists, an email was sent" }))
}

async fn reset_password(Json(body): Json<Value>) -> Response {
    if body["token"].as_str() == Some("valid-reset") {
        reply(StatusCode::OK, json!({ "message": "Password reset" }))
    } else {
        reply(StatusCode::BAD_REQUEST, json!({ "detail": "Reset link has expired" }))
    }
}

async fn me(State(b): State<Shared>, headers: HeaderMap) -> Response {
    b.me_calls.fetch_add(1, Ordering::SeqCst);
    if !b.authorized(&headers) {
        return unauthorized();
    }
    reply(StatusCode::OK, user_json("Olivia"))
}

async fn refresh_token(State(b): State<Shared>, Json(body): Json<Value>) -> Response {
    b.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let presented = body["refresh_token"].as_str().unwrap_or_default().to_string();
    if !b.refresh_tokens.lock().unwrap().contains(&presented) {
        return reply(
            StatusCode::UNAUTHORIZED,
            json!({ "detail": "Token is invalid or expired" }),
        );
    }

    let access = b.issue_token("access");
    if !b.reject_refreshed.load(Ordering::SeqCst) {
        b.access_tokens.lock().unwrap().insert(access.clone());
    }

    if b.rotate_refresh.load(Ordering::SeqCst) {
        let rotated = b.issue_token("refresh");
        let mut refresh_tokens = b.refresh_tokens.lock().unwrap();
        refresh_tokens.remove(&presented);
        refresh_tokens.insert(rotated.clone());
        return reply(StatusCode::OK, json!({ "access": access, "refresh": rotated }));
    }
    reply(StatusCode::OK, json!({ "access": access }))
}

async fn list_companies(State(b): State<Shared>, headers: HeaderMap) -> Response {
    b.company_list_calls.fetch_add(1, Ordering::SeqCst);
    if !b.authorized(&headers) {
        return unauthorized();
    }

    // Answer with the list as it was when the request arrived.
    let companies = b.companies.lock().unwrap().clone();
    let delay = b.company_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if b.fail_companies.load(Ordering::SeqCst) {
        return reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "detail": "database unavailable" }),
        );
    }
    if b.paginate.load(Ordering::SeqCst) {
        return reply(
            StatusCode::OK,
            json!({ "count": companies.len(), "next": null, "results": companies }),
        );
    }
    reply(StatusCode::OK, Value::Array(companies))
}

async fn create_company(
    State(b): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    let Some(name) = body["name"].as_str().filter(|n| !n.is_empty()) else {
        return reply(StatusCode::BAD_REQUEST, json!({ "detail": "Company name is required" }));
    };

    let id = b.next_company.fetch_add(1, Ordering::SeqCst);
    let company = json!({
        "company_id": id,
        "company_name": name,
        "industry": body["industry"].clone(),
        "status": "active",
    });
    b.companies.lock().unwrap().push(company.clone());
    reply(StatusCode::CREATED, company)
}

fn matches_id(company: &Value, id: &str) -> bool {
    ["company_id", "id"].iter().any(|key| match &company[*key] {
        Value::Number(n) => n.to_string() == id,
        Value::String(s) => s == id,
        _ => false,
    })
}

async fn update_company(
    State(b): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    let mut companies = b.companies.lock().unwrap();
    let Some(company) = companies.iter_mut().find(|c| matches_id(c, &id)) else {
        return reply(StatusCode::NOT_FOUND, json!({ "detail": "Not found." }));
    };
    if let Some(name) = body["name"].as_str() {
        company["company_name"] = json!(name);
    }
    let name = company["company_name"].clone();
    reply(StatusCode::OK, json!({ "id": id, "name": name, "status": "active" }))
}

async fn delete_company(
    State(b): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    let mut companies = b.companies.lock().unwrap();
    let before = companies.len();
    companies.retain(|c| !matches_id(c, &id));
    if companies.len() == before {
        return reply(StatusCode::NOT_FOUND, json!({ "detail": "Not found." }));
    }
    StatusCode::NO_CONTENT.into_response()
}

pub fn routes(backend: Shared) -> Router {
    Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/change-password", put(change_password))
        .route("/api/v1/auth/forgot-password", post(forgot_password))
        .route("/api/v1/auth/reset-password", post(reset_password))
        .route("/api/v1/auth/me", get(me))
        .route("/api/v1/auth/refresh-token", post(refresh_token))
        .route("/api/v1/companies", get(list_companies).post(create_company))
        .route(
            "/api/v1/companies/{id}",
            put(update_company).delete(delete_company),
        )
        .with_state(backend)
}

/// Spawn the mock backend on a random port.
pub async fn spawn_backend() -> (Arc<Backend>, SocketAddr) {
    let backend = Arc::new(Backend::default());
    let app = routes(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Mock backend failed");
    });

    (backend, addr)
}

/// A base URL nothing listens on.
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/api/v1")
}

/// A client instance wired to the mock backend.
pub struct TestApp {
    pub app: App,
    pub backend: Arc<Backend>,
    pub addr: SocketAddr,
    pub storage: Arc<MemoryStore>,
    pub redirects: mpsc::UnboundedReceiver<String>,
}

impl TestApp {
    pub async fn login(&self) -> User {
        self.app
            .auth
            .login(&Credentials::new(EMAIL, PASSWORD))
            .await
            .expect("login failed")
    }

    pub fn stored(&self, key: StorageKey) -> Option<Value> {
        self.storage.snapshot(key)
    }

    pub fn stored_str(&self, key: StorageKey) -> Option<String> {
        self.stored(key).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn redirects(&mut self) -> Vec<String> {
        let mut seen = Vec::new();
        while let Ok(path) = self.redirects.try_recv() {
            seen.push(path);
        }
        seen
    }
}

pub fn build_client(api_url: String, storage: Arc<MemoryStore>) -> (App, mpsc::UnboundedReceiver<String>) {
    let (navigator, redirects) = ChannelNavigator::new();
    let app = quickledger::build_app(Config::for_api(api_url), storage, Arc::new(navigator))
        .expect("Failed to build app");
    (app, redirects)
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(Arc::new(MemoryStore::new())).await
}

/// Spawn a fresh backend and a client over `storage` (simulates a restart
/// when `storage` already holds a session).
pub async fn spawn_app_with(storage: Arc<MemoryStore>) -> TestApp {
    let (backend, addr) = spawn_backend().await;
    attach(backend, addr, storage)
}

/// A second client against an existing backend.
pub fn attach(backend: Arc<Backend>, addr: SocketAddr, storage: Arc<MemoryStore>) -> TestApp {
    let (app, redirects) = build_client(format!("http://{addr}/api/v1"), storage.clone());
    TestApp {
        app,
        backend,
        addr,
        storage,
        redirects,
    }
}

pub fn legacy_companies() -> Vec<Value> {
    vec![
        json!({ "company_id": 1, "company_name": "Acme Books", "industry": "Retail" }),
        json!({ "id": "2", "name": "Beta Consulting", "status": "active" }),
        json!({ "company_id": 3, "id": 300, "company_name": "Gamma Farms", "name": "old name" }),
    ]
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
