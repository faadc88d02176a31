use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use claimgate::authz::gate::Gate;
use claimgate::authz::loader;
use claimgate::settings::Settings;
use claimgate::web;
use tower::ServiceExt;

use super::builders::{test_sessions, TEST_SECRET};

/// The service router wired to the built-in policy and the test secret.
pub struct TestApp {
    pub settings: Settings,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(Self::default_settings())
    }

    pub fn default_settings() -> Settings {
        let mut settings = Settings::default();
        settings.authz.session.secret = Some(TEST_SECRET.to_string());
        settings
    }

    pub fn with_settings(settings: Settings) -> Self {
        let authorizer = loader::load_authorizer(
            settings.authz.policies_dir.as_deref(),
            &settings.authz.public_paths,
        )
        .expect("Failed to load policy");
        let gate = Gate::new(Arc::new(authorizer), Arc::new(test_sessions()))
            .with_enforcement(settings.authz.enforce);
        let router = web::app(&settings, gate);
        Self { settings, router }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub async fn read_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}
