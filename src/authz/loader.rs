use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::authz::errors::AuthzError;
use crate::authz::policy::parse_kdl_document;
use crate::authz::routes::{RouteKey, RouteMaps};
use crate::authz::table::PermissionTable;
use crate::authz::types::*;
use crate::authz::Authorizer;

/// The reference policy compiled into the binary.
pub const BUILTIN_POLICY: &str = include_str!("../../policies/default.kdl");

/// Compile the reference policy.
pub fn builtin() -> Result<Authorizer, AuthzError> {
    compile_policies(vec![parse_kdl_document(BUILTIN_POLICY)?])
}

/// Build the authorizer from `dir` when given, else from the reference policy.
/// `extra_public` paths are appended to the allow-list.
pub fn load_authorizer(
    dir: Option<&Path>,
    extra_public: &[String],
) -> Result<Authorizer, AuthzError> {
    let mut parsed = match dir {
        Some(dir) => read_policy_dir(dir)?,
        None => {
            tracing::info!("Using built-in authorization policy");
            vec![parse_kdl_document(BUILTIN_POLICY)?]
        }
    };
    parsed.push(ParsedPolicy {
        public_paths: extra_public.to_vec(),
        ..Default::default()
    });

    let authorizer = compile_policies(parsed)?;

    tracing::info!(
        roles = Role::ALL.len(),
        actions = authorizer.table.actions().len(),
        api_routes = authorizer.routes.api.len(),
        page_routes = authorizer.routes.page.len(),
        public_paths = authorizer.public_paths.len(),
        "Loaded authorization policy"
    );

    Ok(authorizer)
}

/// Load all `.kdl` policy files from the given directory, in file-name order.
pub fn load_policies(dir: &Path) -> Result<Authorizer, AuthzError> {
    compile_policies(read_policy_dir(dir)?)
}

fn read_policy_dir(dir: &Path) -> Result<Vec<ParsedPolicy>, AuthzError> {
    if !dir.is_dir() {
        return Err(AuthzError::InvalidPolicy(format!(
            "policies directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "kdl"))
        .collect();
    entries.sort();

    if entries.is_empty() {
        return Err(AuthzError::InvalidPolicy(format!(
            "policies directory `{}` contains no .kdl files",
            dir.display()
        )));
    }

    let mut parsed = Vec::with_capacity(entries.len());
    for path in entries {
        let contents =
            std::fs::read_to_string(&path).map_err(|source| AuthzError::PolicyLoadError {
                path: path.display().to_string(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "Parsing policy file");
        parsed.push(parse_kdl_document(&contents)?);
    }
    Ok(parsed)
}

/// Merge and compile parsed policies into a single `Authorizer`.
///
/// A role defined in several documents keeps the last definition. Route
/// templates must be unique per scope, and every route action must be granted
/// to at least one role.
pub fn compile_policies(parsed: Vec<ParsedPolicy>) -> Result<Authorizer, AuthzError> {
    let mut roles: HashMap<Role, RoleDef> = HashMap::new();
    let mut route_defs: Vec<RouteDef> = Vec::new();
    let mut public_paths: Vec<String> = Vec::new();

    for p in parsed {
        for role in p.roles {
            roles.insert(role.name.parse()?, role);
        }
        route_defs.extend(p.routes);
        for path in p.public_paths {
            if !path.starts_with('/') && path != "*" {
                return Err(AuthzError::InvalidPolicy(format!(
                    "public path `{path}` must start with `/`"
                )));
            }
            if !public_paths.contains(&path) {
                public_paths.push(path);
            }
        }
    }

    for role in roles.values() {
        for included in &role.includes {
            included.parse::<Role>()?;
        }
    }
    check_role_cycles(&roles)?;

    let mut grants = HashMap::new();
    for role in roles.keys() {
        grants.insert(*role, flatten_role(*role, &roles)?);
    }
    let table = PermissionTable::new(grants);

    let mut routes = RouteMaps::default();
    for def in route_defs {
        let key = RouteKey::parse(&def.template)?;
        let action = if def.action.is_empty() {
            RouteAction::AnyRole
        } else {
            let action = Action::parse(&def.action)?;
            if !table.is_granted_to_any(&action) {
                return Err(AuthzError::UnreachableAction {
                    route: def.template,
                    action: def.action,
                });
            }
            RouteAction::Claim(action)
        };
        if !routes.scope_mut(def.scope).insert(key, action) {
            return Err(AuthzError::DuplicateRoute(format!(
                "{} ({})",
                def.template,
                def.scope.as_str()
            )));
        }
    }

    Ok(Authorizer {
        table,
        routes,
        public_paths,
    })
}

/// Resolve a role's grants: included roles first, in order, then the role's
/// own entries on top. Later entries replace earlier ones for the same action.
fn flatten_role(
    role: Role,
    roles: &HashMap<Role, RoleDef>,
) -> Result<BTreeMap<Action, Grant>, AuthzError> {
    let Some(def) = roles.get(&role) else {
        return Ok(BTreeMap::new());
    };

    let mut grants = BTreeMap::new();
    for included in &def.includes {
        grants.extend(flatten_role(included.parse()?, roles)?);
    }
    for entry in &def.grants {
        let (action, grant) = match entry {
            GrantEntry::Allow(a) => (a, Grant::Allowed),
            GrantEntry::Deny(a) => (a, Grant::Denied),
            GrantEntry::When { action, condition } => {
                (action, Grant::Conditional(Condition::parse(condition)?))
            }
        };
        grants.insert(Action::parse(action)?, grant);
    }
    Ok(grants)
}

/// Check for cycles in role inclusion using DFS.
fn check_role_cycles(roles: &HashMap<Role, RoleDef>) -> Result<(), AuthzError> {
    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();

    for role in roles.keys() {
        if !visited.contains(role) {
            dfs_cycle_check(*role, roles, &mut visited, &mut in_stack)?;
        }
    }
    Ok(())
}

fn dfs_cycle_check(
    role: Role,
    roles: &HashMap<Role, RoleDef>,
    visited: &mut HashSet<Role>,
    in_stack: &mut HashSet<Role>,
) -> Result<(), AuthzError> {
    visited.insert(role);
    in_stack.insert(role);

    if let Some(def) = roles.get(&role) {
        for included in &def.includes {
            let included: Role = included.parse()?;
            if in_stack.contains(&included) {
                return Err(AuthzError::CyclicRoleInheritance(format!(
                    "{role} -> {included}"
                )));
            }
            if !visited.contains(&included) {
                dfs_cycle_check(included, roles, visited, in_stack)?;
            }
        }
    }

    in_stack.remove(&role);
    Ok(())
}
