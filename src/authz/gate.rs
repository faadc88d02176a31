//! The request gate: public allow-list, session, route resolution, claim.
//!
//! Every step fails closed. A request is only let through when it hits the
//! allow-list, or carries a live session whose role holds the action the
//! route is mapped to.

use std::sync::Arc;
use std::time::SystemTime;

use axum::http::StatusCode;
use serde_json::{Map, Value};

use crate::authz::engine;
use crate::authz::messages::MessageCode;
use crate::authz::routes::{RequestPath, RouteKey};
use crate::authz::types::RouteAction;
use crate::authz::Authorizer;
use crate::session::{Session, SessionError, SessionVerifier};

/// Keys the gate adds to the evaluator data next to the path parameters.
pub const AUTH_USER_ID: &str = "authUserId";
pub const AUTH_ROLE: &str = "authRole";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    Forbidden,
}

impl Denial {
    pub fn code(&self) -> MessageCode {
        match self {
            Denial::Unauthenticated => MessageCode::ApiAuthenticationFailed,
            Denial::Forbidden => MessageCode::FirebaseRoleForbidden,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Denial::Unauthenticated => StatusCode::UNAUTHORIZED,
            Denial::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Denial::Unauthenticated => "unauthenticated",
            Denial::Forbidden => "forbidden",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

#[derive(Clone)]
pub struct Gate {
    authorizer: Arc<Authorizer>,
    sessions: Arc<dyn SessionVerifier>,
    enforce: bool,
}

impl Gate {
    pub fn new(authorizer: Arc<Authorizer>, sessions: Arc<dyn SessionVerifier>) -> Self {
        Self {
            authorizer,
            sessions,
            enforce: true,
        }
    }

    /// With `enforce == false` role denials are logged and let through.
    /// Authentication is checked either way.
    pub fn with_enforcement(mut self, enforce: bool) -> Self {
        self.enforce = enforce;
        self
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    pub fn is_enforcing(&self) -> bool {
        self.enforce
    }

    /// Gate a concrete request path such as `/api/users/u-17/update`.
    pub fn authorize(&self, token: Option<&str>, path: &str) -> Decision {
        self.authorize_at(token, path, SystemTime::now())
    }

    pub fn authorize_at(&self, token: Option<&str>, path: &str, now: SystemTime) -> Decision {
        let request = match canonicalize(path) {
            Ok(request) => request,
            Err(decision) => return decision,
        };
        let canonical = request.to_string();
        let path = canonical.as_str();
        if self.authorizer.is_public(path) {
            tracing::debug!(path, "public path");
            return Decision::Allowed;
        }
        let session = match self.authenticate(token, path, now) {
            Ok(session) => session,
            Err(decision) => return decision,
        };

        match self.authorizer.routes.match_request(&request) {
            Some(matched) => {
                self.check_route(&session, path, matched.key, matched.action, matched.params)
            }
            None => self.unmapped(&session, path),
        }
    }

    /// Gate a request whose route template is already known, e.g. from the
    /// router's matched path. Parameters are captured from `path`.
    pub fn authorize_route(&self, token: Option<&str>, route: &RouteKey, path: &str) -> Decision {
        self.authorize_route_at(token, route, path, SystemTime::now())
    }

    pub fn authorize_route_at(
        &self,
        token: Option<&str>,
        route: &RouteKey,
        path: &str,
        now: SystemTime,
    ) -> Decision {
        let request = match canonicalize(path) {
            Ok(request) => request,
            Err(decision) => return decision,
        };
        let canonical = request.to_string();
        let path = canonical.as_str();
        if self.authorizer.is_public(path) {
            tracing::debug!(path, "public path");
            return Decision::Allowed;
        }
        let session = match self.authenticate(token, path, now) {
            Ok(session) => session,
            Err(decision) => return decision,
        };

        let Some(action) = self.authorizer.routes.resolve_action(route, request.scope()) else {
            return self.unmapped(&session, path);
        };
        let Some(params) = route.captures_request(&request) else {
            tracing::warn!(path, route = %route, "request path does not fit its matched route");
            return Decision::Denied(Denial::Forbidden);
        };
        self.check_route(&session, path, route, action, params)
    }

    fn authenticate(
        &self,
        token: Option<&str>,
        path: &str,
        now: SystemTime,
    ) -> Result<Session, Decision> {
        let verified = token
            .ok_or(SessionError::Missing)
            .and_then(|t| self.sessions.verify(t))
            .and_then(|s| {
                if s.is_expired_at(now) {
                    Err(SessionError::Expired)
                } else {
                    Ok(s)
                }
            });
        verified.map_err(|e| {
            tracing::info!(path, reason = %e, "request denied: unauthenticated");
            Decision::Denied(Denial::Unauthenticated)
        })
    }

    fn check_route(
        &self,
        session: &Session,
        path: &str,
        route: &RouteKey,
        action: &RouteAction,
        params: Map<String, Value>,
    ) -> Decision {
        let action = match action {
            RouteAction::AnyRole => {
                tracing::debug!(
                    path,
                    route = %route,
                    role = %session.role,
                    uid = %session.uid,
                    "request allowed: any role"
                );
                return Decision::Allowed;
            }
            RouteAction::Claim(action) => action.as_str(),
        };

        // Session fields go in last so a path parameter cannot shadow them.
        let mut data = params;
        data.insert(AUTH_USER_ID.into(), Value::String(session.uid.clone()));
        data.insert(AUTH_ROLE.into(), Value::String(session.role.clone()));
        let data = Value::Object(data);

        match engine::try_has_claim(&self.authorizer.table, &session.role, action, Some(&data)) {
            Ok(true) => {
                tracing::debug!(
                    path,
                    route = %route,
                    action,
                    role = %session.role,
                    uid = %session.uid,
                    "request allowed"
                );
                Decision::Allowed
            }
            Ok(false) => self.forbid(session, path, Some(action), "role lacks claim"),
            Err(e) => {
                tracing::warn!(path, action, role = %session.role, error = %e, "claim predicate failed");
                self.forbid(session, path, Some(action), "claim predicate failed")
            }
        }
    }

    fn unmapped(&self, session: &Session, path: &str) -> Decision {
        tracing::error!(path, "no route permission mapping for request path");
        self.forbid(session, path, None, "route not mapped")
    }

    fn forbid(
        &self,
        session: &Session,
        path: &str,
        action: Option<&str>,
        reason: &'static str,
    ) -> Decision {
        if !self.enforce {
            tracing::warn!(
                path,
                action,
                role = %session.role,
                uid = %session.uid,
                reason,
                "authorization not enforced, allowing"
            );
            return Decision::Allowed;
        }
        tracing::info!(
            path,
            action,
            role = %session.role,
            uid = %session.uid,
            reason,
            "request denied: forbidden"
        );
        Decision::Denied(Denial::Forbidden)
    }
}

/// Anything the gate cannot put in canonical form is refused outright,
/// before the allow-list and regardless of enforcement.
fn canonicalize(path: &str) -> Result<RequestPath, Decision> {
    RequestPath::parse(path).map_err(|e| {
        tracing::warn!(path, error = %e, "request denied: non-canonical path");
        Decision::Denied(Denial::Forbidden)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::loader::builtin;
    use crate::session::JwtSessions;
    use std::time::Duration;

    const SECRET: &str = "gate-test-secret-that-is-long-enough!!";

    fn sessions() -> Arc<JwtSessions> {
        Arc::new(JwtSessions::new(SECRET, Duration::from_secs(600)).unwrap())
    }

    fn gate() -> (Gate, Arc<JwtSessions>) {
        let sessions = sessions();
        let gate = Gate::new(Arc::new(builtin().unwrap()), sessions.clone());
        (gate, sessions)
    }

    #[test]
    fn test_public_paths_bypass_everything() {
        let (gate, _) = gate();
        assert_eq!(gate.authorize(None, "/login"), Decision::Allowed);
        assert_eq!(gate.authorize(None, "/login?next=%2Fusers"), Decision::Allowed);
        assert_eq!(gate.authorize(None, "/invites/abc/accept"), Decision::Allowed);
        assert_eq!(gate.authorize(Some("garbage"), "/api/auth/callback"), Decision::Allowed);
    }

    #[test]
    fn test_missing_or_bad_token_is_unauthenticated() {
        let (gate, _) = gate();
        let unauthenticated = Decision::Denied(Denial::Unauthenticated);
        assert_eq!(gate.authorize(None, "/api/projects"), unauthenticated);
        assert_eq!(gate.authorize(Some("not-a-token"), "/api/projects"), unauthenticated);
        // unmapped paths still authenticate first
        assert_eq!(gate.authorize(None, "/api/nowhere"), unauthenticated);
    }

    #[test]
    fn test_expired_administrator_is_unauthenticated() {
        let (gate, sessions) = gate();
        let expires = SystemTime::now() + Duration::from_secs(30);
        let token = sessions.issue_until("admin-1", "administrator", expires).unwrap();

        assert_eq!(
            gate.authorize_at(Some(&token), "/api/users", SystemTime::now()),
            Decision::Allowed
        );
        assert_eq!(
            gate.authorize_at(Some(&token), "/api/users", expires + Duration::from_secs(1)),
            Decision::Denied(Denial::Unauthenticated)
        );
    }

    #[test]
    fn test_assessment_lead_scenario() {
        let (gate, sessions) = gate();
        let token = sessions.issue("lead-1", "assessment_lead").unwrap();
        assert_eq!(
            gate.authorize(Some(&token), "/api/users/export"),
            Decision::Denied(Denial::Forbidden)
        );
        assert_eq!(
            gate.authorize(Some(&token), "/api/projects/p1/update"),
            Decision::Allowed
        );
    }

    #[test]
    fn test_any_role_routes_admit_unknown_roles() {
        let (gate, sessions) = gate();
        let token = sessions.issue("u1", "visitor").unwrap();
        assert_eq!(gate.authorize(Some(&token), "/account"), Decision::Allowed);
        assert_eq!(
            gate.authorize(Some(&token), "/projects"),
            Decision::Denied(Denial::Forbidden)
        );
    }

    #[test]
    fn test_enumerator_edits_only_self() {
        let (gate, sessions) = gate();
        let token = sessions.issue("u1", "enumerator").unwrap();
        assert_eq!(gate.authorize(Some(&token), "/users/u1/edit"), Decision::Allowed);
        assert_eq!(
            gate.authorize(Some(&token), "/api/users/u1/update"),
            Decision::Allowed
        );
        assert_eq!(
            gate.authorize(Some(&token), "/users/u2/edit"),
            Decision::Denied(Denial::Forbidden)
        );
    }

    #[test]
    fn test_unmapped_route_is_forbidden() {
        let (gate, sessions) = gate();
        let token = sessions.issue("admin-1", "administrator").unwrap();
        assert_eq!(
            gate.authorize(Some(&token), "/api/not-in-the-map"),
            Decision::Denied(Denial::Forbidden)
        );
        assert_eq!(
            gate.authorize(Some(&token), "/reports/weekly"),
            Decision::Denied(Denial::Forbidden)
        );
    }

    #[test]
    fn test_enforcement_off_relaxes_roles_not_authentication() {
        let (gate, sessions) = gate();
        let gate = gate.with_enforcement(false);
        assert!(!gate.is_enforcing());

        let token = sessions.issue("lead-1", "assessment_lead").unwrap();
        assert_eq!(gate.authorize(Some(&token), "/api/users/export"), Decision::Allowed);
        assert_eq!(
            gate.authorize(None, "/api/users/export"),
            Decision::Denied(Denial::Unauthenticated)
        );
    }

    #[test]
    fn test_authorize_route_with_router_template() {
        let (gate, sessions) = gate();
        let token = sessions.issue("u1", "enumerator").unwrap();
        let route = RouteKey::parse("/api/users/{userId}/update").unwrap();

        assert_eq!(
            gate.authorize_route(Some(&token), &route, "/api/users/u1/update"),
            Decision::Allowed
        );
        assert_eq!(
            gate.authorize_route(Some(&token), &route, "/api/users/u2/update"),
            Decision::Denied(Denial::Forbidden)
        );

        let unmapped = RouteKey::parse("/api/reports/{id}").unwrap();
        assert_eq!(
            gate.authorize_route(Some(&token), &unmapped, "/api/reports/1"),
            Decision::Denied(Denial::Forbidden)
        );
    }

    #[test]
    fn test_path_param_cannot_spoof_session_uid() {
        use crate::authz::loader::compile_policies;
        use crate::authz::policy::parse_kdl_document;

        let parsed = parse_kdl_document(
            r#"
role "enumerator" {
    when "users:update" "userId == authUserId"
}
routes "api" {
    route "/api/users/[userId]/as/[authUserId]" action="users:update"
}
"#,
        )
        .unwrap();
        let sessions = sessions();
        let gate = Gate::new(Arc::new(compile_policies(vec![parsed]).unwrap()), sessions.clone());
        let token = sessions.issue("me", "enumerator").unwrap();

        assert_eq!(
            gate.authorize(Some(&token), "/api/users/victim/as/victim"),
            Decision::Denied(Denial::Forbidden)
        );
        assert_eq!(
            gate.authorize(Some(&token), "/api/users/me/as/victim"),
            Decision::Allowed
        );
    }

    #[test]
    fn test_encoded_segments_resolve_to_their_decoded_route() {
        let (gate, sessions) = gate();
        let lead = sessions.issue("lead-1", "assessment_lead").unwrap();
        let forbidden = Decision::Denied(Denial::Forbidden);

        assert_eq!(gate.authorize(Some(&lead), "/api/users/%65xport"), forbidden);
        assert_eq!(gate.authorize(Some(&lead), "/api/users/%65%78%70%6f%72%74"), forbidden);
        assert_eq!(gate.authorize(Some(&lead), "/api/users/u9/%64elete"), forbidden);
        assert_eq!(gate.authorize(Some(&lead), "/api//users//export"), forbidden);
        assert_eq!(gate.authorize(Some(&lead), "/%61pi/users/export"), forbidden);

        let admin = sessions.issue("admin-1", "administrator").unwrap();
        assert_eq!(gate.authorize(Some(&admin), "/api/users/%65xport"), Decision::Allowed);
    }

    #[test]
    fn test_non_canonical_paths_are_refused() {
        let (gate, sessions) = gate();
        let admin = sessions.issue("admin-1", "administrator").unwrap();
        let forbidden = Decision::Denied(Denial::Forbidden);

        for path in [
            "/api/users/%2e%2e/export",
            "/api/users/export%2f..",
            "/api/users/%2565xport",
            "/api/users/u1/..",
            "/api/users/%ff",
        ] {
            assert_eq!(gate.authorize(Some(&admin), path), forbidden, "{path}");
        }

        // refused even with enforcement off
        let relaxed = gate.clone().with_enforcement(false);
        assert_eq!(relaxed.authorize(Some(&admin), "/api/users/%2e%2e/x"), forbidden);
    }

    #[test]
    fn test_dot_segments_cannot_ride_the_allow_list() {
        let (gate, _) = gate();
        for path in [
            "/static/../api/users/export",
            "/static/%2e%2e/api/users/export",
            "/invites/a/../../api/users/x/accept",
            "/api/auth/../users",
            "/login/..",
        ] {
            assert!(!gate.authorize(None, path).is_allowed(), "{path}");
        }
        // canonical spellings of public paths stay public
        assert_eq!(gate.authorize(None, "/static//app.css"), Decision::Allowed);
        assert_eq!(gate.authorize(None, "/%6cogin"), Decision::Allowed);
    }

    #[test]
    fn test_route_path_mismatch_is_forbidden() {
        let (gate, sessions) = gate();
        let admin = sessions.issue("admin-1", "administrator").unwrap();
        let route = RouteKey::parse("/api/users/{userId}/update").unwrap();
        assert_eq!(
            gate.authorize_route(Some(&admin), &route, "/api/users/update"),
            Decision::Denied(Denial::Forbidden)
        );
        assert_eq!(
            gate.authorize_route(Some(&admin), &route, "/api/users/../update"),
            Decision::Denied(Denial::Forbidden)
        );
    }

    #[test]
    fn test_denial_codes() {
        assert_eq!(Denial::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Denial::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            Denial::Unauthenticated.code().as_str(),
            "api_authentication_failed"
        );
        assert_eq!(Denial::Forbidden.code().as_str(), "firebase_role_forbidden");
    }
}
