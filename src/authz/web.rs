use std::sync::Arc;

use axum::body::Body;
use axum::extract::{MatchedPath, Query, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::authz::gate::{Decision, Denial, Gate};
use crate::authz::messages::{ErrorBody, Locale};
use crate::authz::routes::{RequestPath, RouteKey};
use crate::authz::types::{
    AuthorizeRequest, CheckRequest, CheckResponse, ResolveRequest, ResolveResponse, RouteScope,
};
use crate::session::token_from_headers;
use crate::settings;

/// Header set by reverse proxies doing forward-auth (Traefik, Caddy, nginx).
const FORWARDED_URI: &str = "x-forwarded-uri";

pub struct GateState {
    pub gate: Gate,
    pub locale: Locale,
    pub cookie_name: String,
    pub login_path: String,
    pub error_path: String,
}

impl GateState {
    pub fn new(gate: Gate, authz: &settings::Authz) -> Self {
        Self {
            gate,
            locale: Locale::parse(&authz.locale),
            cookie_name: authz.session.cookie_name.clone(),
            login_path: authz.login_path.clone(),
            error_path: authz.error_path.clone(),
        }
    }

    /// API paths get a JSON 401/403. Pages are redirected to the login page
    /// (with a `next` back to `path`) or to the error page. The redirect
    /// never names the missing permission.
    pub fn denial_response(&self, denial: Denial, path: &str) -> Response {
        let scope = RequestPath::parse(path)
            .map(|p| p.scope())
            .unwrap_or_else(|_| RouteScope::of_path(path));
        match scope {
            RouteScope::Api => (
                denial.status(),
                Json(ErrorBody::new(self.locale, denial.code())),
            )
                .into_response(),
            RouteScope::Page => match denial {
                Denial::Unauthenticated => Redirect::to(&format!(
                    "{}?next={}",
                    self.login_path,
                    urlencoding::encode(path)
                ))
                .into_response(),
                Denial::Forbidden => Redirect::to(&self.error_path).into_response(),
            },
        }
    }

    fn token(&self, headers: &HeaderMap) -> Option<String> {
        token_from_headers(headers, &self.cookie_name)
    }
}

pub fn router(state: Arc<GateState>) -> Router {
    Router::new()
        .route("/v1/check", post(handle_check))
        .route("/v1/resolve", post(handle_resolve))
        .route("/v1/authorize", post(handle_authorize))
        .route("/v1/gate", get(handle_gate))
        .route("/healthz", get(health))
        .with_state(state)
}

async fn handle_check(
    State(state): State<Arc<GateState>>,
    Json(req): Json<CheckRequest>,
) -> impl IntoResponse {
    let allowed = state
        .gate
        .authorizer()
        .has_claim(&req.role, &req.action, req.data.as_ref());
    Json(CheckResponse { allowed })
}

async fn handle_resolve(
    State(state): State<Arc<GateState>>,
    Json(req): Json<ResolveRequest>,
) -> impl IntoResponse {
    let route = match RouteKey::parse(&req.route) {
        Ok(route) => route,
        Err(e) => return e.into_response(),
    };
    let action = state
        .gate
        .authorizer()
        .resolve_action(&route, req.api)
        .map(|a| a.as_str().to_string());
    Json(ResolveResponse { action }).into_response()
}

async fn handle_authorize(
    State(state): State<Arc<GateState>>,
    Json(req): Json<AuthorizeRequest>,
) -> impl IntoResponse {
    match state.gate.authorize(req.token.as_deref(), &req.path) {
        Decision::Allowed => Json(json!({ "decision": "allowed" })),
        Decision::Denied(denial) => {
            let body = ErrorBody::new(state.locale, denial.code());
            Json(json!({
                "decision": "denied",
                "reason": denial.as_str(),
                "code": body.code,
                "message": body.message,
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
struct GateQuery {
    path: Option<String>,
}

/// Forward-auth endpoint: 204 to let the proxied request through, otherwise
/// the denial the client should see.
async fn handle_gate(
    State(state): State<Arc<GateState>>,
    Query(query): Query<GateQuery>,
    headers: HeaderMap,
) -> Response {
    let path = headers
        .get(FORWARDED_URI)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(query.path);
    let Some(path) = path.filter(|p| p.starts_with('/')) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing request path (X-Forwarded-Uri or ?path=)" })),
        )
            .into_response();
    };

    let token = state.token(&headers);
    match state.gate.authorize(token.as_deref(), &path) {
        Decision::Allowed => StatusCode::NO_CONTENT.into_response(),
        Decision::Denied(denial) => state.denial_response(denial, &path),
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Middleware gating an application's own routes. Install it with
/// `route_layer(middleware::from_fn_with_state(state, enforce))` so the
/// matched route template is available; without one the raw path is
/// resolved against the route maps instead.
pub async fn enforce(
    State(state): State<Arc<GateState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let token = state.token(request.headers());
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .and_then(|m| RouteKey::parse(m.as_str()).ok());

    let decision = match &route {
        Some(route) => state.gate.authorize_route(token.as_deref(), route, &path),
        None => state.gate.authorize(token.as_deref(), &path),
    };
    match decision {
        Decision::Allowed => next.run(request).await,
        Decision::Denied(denial) => state.denial_response(denial, &target),
    }
}
