use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(claimgate::authz::policy_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy: {0}")]
    #[diagnostic(
        code(claimgate::authz::invalid_policy),
        help("Each policy file must contain valid `role`, `routes` or `public` KDL nodes")
    )]
    InvalidPolicy(String),

    #[error("Invalid action `{0}`")]
    #[diagnostic(
        code(claimgate::authz::invalid_action),
        help("Actions have the form \"<resource>:<verb>\", e.g. \"users:update\" (lower-case letters, digits and `_`)")
    )]
    InvalidAction(String),

    #[error("Invalid route template `{0}`")]
    #[diagnostic(
        code(claimgate::authz::invalid_route),
        help("Route templates start with `/` and name path parameters as `[name]`, e.g. \"/api/users/[userId]/update\"")
    )]
    InvalidRoute(String),

    #[error("Route `{0}` is declared more than once")]
    #[diagnostic(
        code(claimgate::authz::duplicate_route),
        help("Each route template may appear once per `routes` scope")
    )]
    DuplicateRoute(String),

    #[error("Route `{route}` requires `{action}`, which no role is granted")]
    #[diagnostic(
        code(claimgate::authz::unreachable_action),
        help("Grant the action to at least one role with `allow` or `when`, or fix the route's action name")
    )]
    UnreachableAction { route: String, action: String },

    #[error("Invalid condition expression: {0}")]
    #[diagnostic(
        code(claimgate::authz::invalid_condition),
        help("Supported operators: ==, !=, >, <, >=, <=, &&, ||, !, in. Paths use dot notation (e.g. authUserId)")
    )]
    InvalidCondition(String),

    #[error("Undefined role `{0}`")]
    #[diagnostic(
        code(claimgate::authz::undefined_role),
        help("Known roles are `administrator`, `assessment_lead` and `enumerator`")
    )]
    UndefinedRole(String),

    #[error("Cyclic role inclusion detected: {0}")]
    #[diagnostic(
        code(claimgate::authz::cyclic_roles),
        help("Check the `includes` lists in your role definitions for circular references")
    )]
    CyclicRoleInheritance(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(claimgate::authz::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev for the specification")
    )]
    KdlParse(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(claimgate::authz::io))]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthzError::InvalidPolicy(_)
            | AuthzError::InvalidAction(_)
            | AuthzError::InvalidRoute(_)
            | AuthzError::InvalidCondition(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
