pub mod actions;
pub mod condition;
pub mod engine;
pub mod errors;
pub mod gate;
pub mod loader;
pub mod messages;
pub mod policy;
pub mod routes;
pub mod table;
pub mod types;
pub mod web;

use routes::{wildcard_match, RequestPath, RouteKey, RouteMaps};
use serde_json::Value;
use table::PermissionTable;
use types::{RouteAction, RouteScope};

/// Fully compiled authorization state: permission table, route maps and the
/// public allow-list. Immutable after construction; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Authorizer {
    pub table: PermissionTable,
    pub routes: RouteMaps,
    /// Wildcard patterns that bypass the gate entirely
    pub public_paths: Vec<String>,
}

impl Authorizer {
    /// See [`engine::has_claim`].
    pub fn has_claim(&self, role: &str, action: &str, data: Option<&Value>) -> bool {
        engine::has_claim(&self.table, role, action, data)
    }

    /// Resolve a route template for the API (`is_api`) or page map.
    pub fn resolve_action(&self, route: &RouteKey, is_api: bool) -> Option<&RouteAction> {
        let scope = if is_api {
            RouteScope::Api
        } else {
            RouteScope::Page
        };
        self.routes.resolve_action(route, scope)
    }

    /// Matches the canonical form of `path`; a path that has none is never
    /// public.
    pub fn is_public(&self, path: &str) -> bool {
        let Ok(request) = RequestPath::parse(path) else {
            return false;
        };
        let path = request.to_string();
        self.public_paths.iter().any(|p| wildcard_match(p, &path))
    }
}
