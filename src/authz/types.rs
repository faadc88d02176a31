use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::authz::condition::{self, Expr};
use crate::authz::errors::AuthzError;

/// Identity class carried by a session. The set is closed; role strings that do
/// not parse are simply never granted anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    AssessmentLead,
    Enumerator,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Administrator, Role::AssessmentLead, Role::Enumerator];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::AssessmentLead => "assessment_lead",
            Role::Enumerator => "enumerator",
        }
    }
}

impl FromStr for Role {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| AuthzError::UndefinedRole(s.to_string()))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `<resource>:<verb>` action name, e.g. "users:update".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Action(String);

impl Action {
    pub fn parse(s: &str) -> Result<Self, AuthzError> {
        let (resource, verb) = s
            .split_once(':')
            .ok_or_else(|| AuthzError::InvalidAction(s.to_string()))?;
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        };
        if !valid(resource) || !valid(verb) {
            return Err(AuthzError::InvalidAction(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resource(&self) -> &str {
        self.0.split_once(':').map(|(r, _)| r).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A compiled predicate over the contextual data of a claim check.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub source: String,
    pub expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, AuthzError> {
        Ok(Self {
            source: source.to_string(),
            expr: condition::parse_condition(source)?,
        })
    }

    /// Evaluate against `data`; absent data behaves like JSON `null`.
    pub fn evaluate(&self, data: Option<&Value>) -> Result<bool, AuthzError> {
        condition::evaluate(&self.expr, data.unwrap_or(&Value::Null))
    }
}

/// The permission-table value for a (role, action) pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Grant {
    #[default]
    Denied,
    Allowed,
    Conditional(Condition),
}

/// Whether a route belongs to the JSON API or to the page UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteScope {
    Api,
    Page,
}

impl RouteScope {
    pub fn of_path(path: &str) -> Self {
        if path == "/api" || path.starts_with("/api/") {
            RouteScope::Api
        } else {
            RouteScope::Page
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteScope::Api => "api",
            RouteScope::Page => "page",
        }
    }
}

impl FromStr for RouteScope {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(RouteScope::Api),
            "page" => Ok(RouteScope::Page),
            other => Err(AuthzError::InvalidPolicy(format!(
                "unknown route scope `{other}` (expected \"api\" or \"page\")"
            ))),
        }
    }
}

/// What a mapped route demands of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    /// Explicit empty action: any authenticated role may pass.
    AnyRole,
    Claim(Action),
}

impl RouteAction {
    /// The wire form: `""` for [`RouteAction::AnyRole`].
    pub fn as_str(&self) -> &str {
        match self {
            RouteAction::AnyRole => "",
            RouteAction::Claim(action) => action.as_str(),
        }
    }
}

// ---------- API request/response types ----------

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// e.g. "enumerator"
    pub role: String,
    /// e.g. "users:update"
    pub action: String,
    /// Optional context for conditional grants, e.g. {"userId": "u1", "authUserId": "u1"}
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    /// e.g. "/api/users/[userId]/update"
    pub route: String,
    #[serde(default)]
    pub api: bool,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    /// `None` when the route is unmapped, `""` when any role may pass.
    pub action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    #[serde(default)]
    pub token: Option<String>,
    pub path: String,
}

// ---------- Policy document types ----------

#[derive(Debug, Clone, PartialEq)]
pub enum GrantEntry {
    Allow(String),
    Deny(String),
    When { action: String, condition: String },
}

#[derive(Debug, Clone)]
pub struct RoleDef {
    pub name: String,
    pub grants: Vec<GrantEntry>,
    /// Other role names this role includes (inherits from)
    pub includes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RouteDef {
    pub scope: RouteScope,
    pub template: String,
    /// Empty string means "any authenticated role"
    pub action: String,
}

/// Intermediate result from parsing a single KDL file.
#[derive(Debug, Clone, Default)]
pub struct ParsedPolicy {
    pub roles: Vec<RoleDef>,
    pub routes: Vec<RouteDef>,
    pub public_paths: Vec<String>,
}
