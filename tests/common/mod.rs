//! Shared harness for driving the full router in-process

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use registrar_server::clock::ManualClock;
use registrar_server::config::Config;
use registrar_server::routes::create_router;
use registrar_server::state::AppState;
use registrar_server::store::InMemoryCredentialStore;

pub const PASSWORD: &str = "Str0ng!Pass";

pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryCredentialStore>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn test_config() -> Config {
    Config {
        jwt_secret: "integration-test-secret-with-enough-bytes".to_string(),
        jwt_issuer: "registrar-test".to_string(),
        bcrypt_cost: 4,
        ..Config::default()
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config())
}

pub fn spawn_app_with(config: Config) -> TestApp {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(InMemoryCredentialStore::new());
    let state = AppState::from_config(&config, store.clone(), clock.clone())
        .expect("test config should build app state");

    TestApp {
        router: create_router(state),
        clock,
        store,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> TestResponse {
        self.request_from(method, uri, body, bearer, "203.0.113.7:40000")
            .await
    }

    pub async fn request_from(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
        peer: &str,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let mut request = builder.body(body).unwrap();
        let peer: SocketAddr = peer.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn register(&self, full_name: &str, email: &str, password: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/auth/register",
            Some(serde_json::json!({
                "fullName": full_name,
                "email": email,
                "password": password,
            })),
            None,
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/auth/login",
            Some(serde_json::json!({ "email": email, "password": password })),
            None,
        )
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/auth/refresh",
            Some(serde_json::json!({ "refreshToken": refresh_token })),
            None,
        )
        .await
    }
}

pub fn token(body: &Value, field: &str) -> String {
    body[field]
        .as_str()
        .unwrap_or_else(|| panic!("missing {} in {}", field, body))
        .to_string()
}
