//! Service bootstrap: builds the gate from settings and serves the
//! authorization endpoints. Handlers live in `authz::web`.
use crate::authz::gate::Gate;
use crate::authz::loader;
use crate::authz::web::{router, GateState};
use crate::errors::ServiceError;
use crate::session::JwtSessions;
use crate::settings::Settings;
use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    // X-Frame-Options: Prevent clickjacking
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );

    // X-Content-Type-Options: Prevent MIME sniffing
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );

    // Nothing here renders HTML
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );

    // Decisions depend on the session; never let a proxy cache them
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );

    response
}

/// Load the policy and session verifier described by `settings`.
pub fn build_gate(settings: &Settings) -> Result<Gate, ServiceError> {
    let authz = &settings.authz;
    let authorizer = loader::load_authorizer(authz.policies_dir.as_deref(), &authz.public_paths)?;
    let sessions = JwtSessions::from_settings(&authz.session)?;

    if !authz.enforce {
        tracing::warn!(
            "Authorization enforcement is DISABLED (authz.enforce = false): role checks are logged, not applied"
        );
    }

    Ok(Gate::new(Arc::new(authorizer), Arc::new(sessions)).with_enforcement(authz.enforce))
}

/// The full service router, middleware included.
pub fn app(settings: &Settings, gate: Gate) -> Router {
    let state = Arc::new(GateState::new(gate, &settings.authz));
    router(state)
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(settings: Settings, gate: Gate) -> Result<(), ServiceError> {
    let addr: SocketAddr = settings.listen_addr().parse().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("bad listen address {}: {e}", settings.listen_addr()),
        )
    })?;
    let app = app(&settings, gate);

    tracing::info!(%addr, "Authorization gate listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
