#![allow(dead_code)]

use axum::Router;
use axum_test::{TestResponse, TestServer};
use serde_json::{json, Value};

use tripnest::app::{router, AppState};
use tripnest::config::{AuthSettings, ServerSettings};
use tripnest::db::stores::Stores;

/// Address that always registers as an admin.
pub const ADMIN_EMAIL: &str = "admin@tripnest.test";

/// Password used by every test account.
pub const PASSWORD: &str = "correct-horse-battery";

/// An application wired to in-memory stores.
///
/// Servers built from the same environment share the stores, while each keeps
/// its own cookie jar, so one server per signed-in user.
pub struct TestEnv {
    pub stores: Stores,
    pub router: Router,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_stores(Stores::memory())
    }

    pub fn with_stores(stores: Stores) -> Self {
        let auth = AuthSettings {
            session_secret: Some("integration-test-secret".to_string()),
            admin_emails: vec![ADMIN_EMAIL.to_string()],
            ..Default::default()
        };
        let state = AppState::new(stores.clone(), auth);
        let router = router(state, &ServerSettings::default());
        Self { stores, router }
    }

    /// Build an `axum_test::TestServer` from this environment's router.
    pub fn server(&self) -> TestServer {
        TestServer::builder()
            .save_cookies()
            .expect_success_by_default()
            .build(self.router.clone())
    }

    /// Build a `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> TestServer {
        TestServer::builder()
            .save_cookies()
            .build(self.router.clone())
    }

    /// Register `email` (if needed) and log `server` in as that user.
    pub async fn sign_in(&self, server: &TestServer, name: &str, email: &str) -> Value {
        server
            .post("/api/auth/register")
            .json(&json!({ "name": name, "email": email, "password": PASSWORD }))
            .expect_success()
            .await;

        let response = server
            .post("/api/auth/login")
            .json(&json!({ "email": email, "password": PASSWORD }))
            .expect_success()
            .await;
        response.json::<Value>()["data"].clone()
    }

    /// A server signed in as the admin account.
    pub async fn admin_server(&self) -> TestServer {
        let server = self.server();
        self.sign_in(&server, "Admin", ADMIN_EMAIL).await;
        server
    }

    /// A permissive server signed in as a regular user.
    pub async fn user_server(&self, name: &str, email: &str) -> TestServer {
        let server = self.server_permissive();
        self.sign_in(&server, name, email).await;
        server
    }
}

/// The `data` member of a success envelope.
pub fn data(response: &TestResponse) -> Value {
    let body = response.json::<Value>();
    assert_eq!(body["success"], true, "unexpected envelope: {body}");
    body["data"].clone()
}

/// The `error` member of a failure envelope.
pub fn error(response: &TestResponse) -> String {
    let body = response.json::<Value>();
    assert_eq!(body["success"], false, "unexpected envelope: {body}");
    body["error"].as_str().unwrap_or_default().to_string()
}
