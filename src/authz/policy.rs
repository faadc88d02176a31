use crate::authz::errors::AuthzError;
use crate::authz::types::*;
use kdl::{KdlDocument, KdlNode};

/// Parse a KDL policy document into typed policy structs.
///
/// Recognised top-level nodes: `role`, `routes` and `public`.
pub fn parse_kdl_document(source: &str) -> Result<ParsedPolicy, AuthzError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AuthzError::KdlParse(e.to_string()))?;

    let mut policy = ParsedPolicy::default();

    for node in doc.nodes() {
        match node.name().value() {
            "role" => policy.roles.push(parse_role(node)?),
            "routes" => {
                let scope: RouteScope = first_string_arg(node)
                    .ok_or_else(|| {
                        AuthzError::InvalidPolicy(
                            "routes node requires a scope argument (routes \"api\" or routes \"page\")"
                                .into(),
                        )
                    })?
                    .parse()?;
                for child in node.children().map(|c| c.nodes()).unwrap_or_default() {
                    if child.name().value() != "route" {
                        return Err(AuthzError::InvalidPolicy(format!(
                            "unexpected child `{}` in routes `{}` (expected `route`)",
                            child.name().value(),
                            scope.as_str()
                        )));
                    }
                    policy.routes.push(parse_route(child, scope)?);
                }
            }
            "public" => policy.public_paths.extend(dash_list(node)),
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(policy)
}

fn parse_role(node: &KdlNode) -> Result<RoleDef, AuthzError> {
    let name = first_string_arg(node).ok_or_else(|| {
        AuthzError::InvalidPolicy(
            "role node requires a string argument (e.g. role \"enumerator\")".into(),
        )
    })?;

    let mut grants = Vec::new();
    let mut includes = Vec::new();

    for child in node.children().map(|c| c.nodes()).unwrap_or_default() {
        match child.name().value() {
            "allow" => grants.extend(dash_list(child).into_iter().map(GrantEntry::Allow)),
            "deny" => grants.extend(dash_list(child).into_iter().map(GrantEntry::Deny)),
            "when" => {
                let args = string_args(child);
                let [action, condition] = args.as_slice() else {
                    return Err(AuthzError::InvalidPolicy(format!(
                        "`when` in role `{name}` takes an action and a condition (e.g. when \"users:update\" \"userId == authUserId\")"
                    )));
                };
                grants.push(GrantEntry::When {
                    action: action.clone(),
                    condition: condition.clone(),
                });
            }
            "includes" => includes.extend(dash_list(child)),
            other => {
                return Err(AuthzError::InvalidPolicy(format!(
                    "unexpected child `{other}` in role `{name}` (expected `allow`, `deny`, `when` or `includes`)"
                )));
            }
        }
    }

    Ok(RoleDef {
        name,
        grants,
        includes,
    })
}

fn parse_route(node: &KdlNode, scope: RouteScope) -> Result<RouteDef, AuthzError> {
    let template = first_string_arg(node).ok_or_else(|| {
        AuthzError::InvalidPolicy(
            "route node requires a template argument (e.g. route \"/api/users\" action=\"users:get\")"
                .into(),
        )
    })?;
    let action = node
        .get("action")
        .and_then(|v| v.as_string())
        .ok_or_else(|| {
            AuthzError::InvalidPolicy(format!(
                "route `{template}` missing `action` property (use action=\"\" for any signed-in role)"
            ))
        })?
        .to_string();

    Ok(RouteDef {
        scope,
        template,
        action,
    })
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &KdlNode) -> Option<String> {
    string_args(node).into_iter().next()
}

/// All positional string arguments of a node, in order.
fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

/// Extract dash-list children: nodes named "-" whose first argument is a string.
/// Example KDL:
/// ```kdl
/// allow {
///     - "projects:get"
///     - "projects:update"
/// }
/// ```
fn dash_list(node: &KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_grants() {
        let kdl = r#"
role "enumerator" {
    allow {
        - "interviews:get"
        - "interviews:create"
    }
    deny {
        - "users:get"
    }
    when "users:update" "userId == authUserId"
}
"#;
        let policy = parse_kdl_document(kdl).unwrap();
        assert_eq!(policy.roles.len(), 1);
        let role = &policy.roles[0];
        assert_eq!(role.name, "enumerator");
        assert_eq!(
            role.grants,
            vec![
                GrantEntry::Allow("interviews:get".into()),
                GrantEntry::Allow("interviews:create".into()),
                GrantEntry::Deny("users:get".into()),
                GrantEntry::When {
                    action: "users:update".into(),
                    condition: "userId == authUserId".into(),
                },
            ]
        );
        assert!(role.includes.is_empty());
    }

    #[test]
    fn test_parse_role_with_includes() {
        let kdl = r#"
role "assessment_lead" {
    includes {
        - "enumerator"
    }
    allow {
        - "projects:update"
    }
}
"#;
        let policy = parse_kdl_document(kdl).unwrap();
        let lead = &policy.roles[0];
        assert_eq!(lead.includes, vec!["enumerator"]);
        assert_eq!(
            lead.grants,
            vec![GrantEntry::Allow("projects:update".into())]
        );
    }

    #[test]
    fn test_parse_routes_and_public() {
        let kdl = r#"
routes "api" {
    route "/api/users/[userId]/update" action="users:update"
    route "/api/session" action=""
}

routes "page" {
    route "/projects" action="projects:get"
}

public {
    - "/login"
    - "/static/*"
}
"#;
        let policy = parse_kdl_document(kdl).unwrap();
        assert_eq!(policy.routes.len(), 3);
        assert_eq!(policy.routes[0].scope, RouteScope::Api);
        assert_eq!(policy.routes[0].template, "/api/users/[userId]/update");
        assert_eq!(policy.routes[0].action, "users:update");
        assert_eq!(policy.routes[1].action, "");
        assert_eq!(policy.routes[2].scope, RouteScope::Page);
        assert_eq!(policy.public_paths, vec!["/login", "/static/*"]);
    }

    #[test]
    fn test_parse_route_missing_action() {
        let kdl = r#"
routes "api" {
    route "/api/users"
}
"#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPolicy(_)));
    }

    #[test]
    fn test_parse_unknown_scope() {
        let kdl = r#"routes "admin" { }"#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPolicy(_)));
    }

    #[test]
    fn test_parse_when_requires_two_arguments() {
        let kdl = r#"
role "enumerator" {
    when "users:update"
}
"#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPolicy(_)));
    }

    #[test]
    fn test_parse_unexpected_role_child() {
        let kdl = r#"
role "enumerator" {
    permissions {
        - "users:get"
    }
}
"#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPolicy(_)));
    }

    #[test]
    fn test_parse_invalid_kdl() {
        let err = parse_kdl_document("role \"x\" {").unwrap_err();
        assert!(matches!(err, AuthzError::KdlParse(_)));
    }
}
