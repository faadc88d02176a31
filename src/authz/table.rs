use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::authz::types::{Action, Grant, Role};

/// Role -> action -> grant. Every role has an entry once built through
/// [`PermissionTable::new`]; an action missing from a role's entry is denied.
#[derive(Debug, Clone)]
pub struct PermissionTable {
    grants: HashMap<Role, BTreeMap<Action, Grant>>,
}

impl PermissionTable {
    pub fn new(mut grants: HashMap<Role, BTreeMap<Action, Grant>>) -> Self {
        for role in Role::ALL {
            grants.entry(role).or_default();
        }
        Self { grants }
    }

    /// Grant for a role string and action string. Never fails: anything
    /// unrecognised is [`Grant::Denied`].
    pub fn lookup(&self, role: &str, action: &str) -> &Grant {
        const DENIED: &Grant = &Grant::Denied;
        let Ok(role) = role.parse::<Role>() else {
            return DENIED;
        };
        let Ok(action) = Action::parse(action) else {
            return DENIED;
        };
        self.grants
            .get(&role)
            .and_then(|g| g.get(&action))
            .unwrap_or(DENIED)
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(|r| self.grants.contains_key(r))
    }

    /// All grants held by a role, sorted by action.
    pub fn grants(&self, role: Role) -> impl Iterator<Item = (&Action, &Grant)> {
        self.grants.get(&role).into_iter().flatten()
    }

    /// Every action mentioned anywhere in the table.
    pub fn actions(&self) -> BTreeSet<&Action> {
        self.grants.values().flat_map(|g| g.keys()).collect()
    }

    /// True when at least one role holds `action` as allowed or conditional.
    pub fn is_granted_to_any(&self, action: &Action) -> bool {
        self.grants
            .values()
            .any(|g| matches!(g.get(action), Some(Grant::Allowed | Grant::Conditional(_))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::types::Condition;

    fn action(s: &str) -> Action {
        Action::parse(s).unwrap()
    }

    fn small_table() -> PermissionTable {
        let mut grants = HashMap::new();
        grants.insert(
            Role::Enumerator,
            BTreeMap::from([
                (action("interviews:get"), Grant::Allowed),
                (action("users:get"), Grant::Denied),
                (
                    action("users:update"),
                    Grant::Conditional(Condition::parse("userId == authUserId").unwrap()),
                ),
            ]),
        );
        PermissionTable::new(grants)
    }

    #[test]
    fn test_every_role_has_entry() {
        let table = small_table();
        for role in Role::ALL {
            assert!(table.grants.contains_key(&role));
        }
        assert_eq!(table.roles().count(), Role::ALL.len());
        assert_eq!(table.grants(Role::Administrator).count(), 0);
        assert_eq!(table.grants(Role::Enumerator).count(), 3);
    }

    #[test]
    fn test_lookup_fail_closed() {
        let table = small_table();
        assert_eq!(table.lookup("enumerator", "interviews:get"), &Grant::Allowed);
        assert_eq!(table.lookup("enumerator", "users:get"), &Grant::Denied);
        assert_eq!(table.lookup("enumerator", "projects:get"), &Grant::Denied);
        assert_eq!(table.lookup("administrator", "interviews:get"), &Grant::Denied);
        assert_eq!(table.lookup("nonexistent_role", "interviews:get"), &Grant::Denied);
        assert_eq!(table.lookup("enumerator", "not an action"), &Grant::Denied);
        assert!(matches!(
            table.lookup("enumerator", "users:update"),
            Grant::Conditional(_)
        ));
    }

    #[test]
    fn test_is_granted_to_any() {
        let table = small_table();
        assert!(table.is_granted_to_any(&action("interviews:get")));
        assert!(table.is_granted_to_any(&action("users:update")));
        assert!(!table.is_granted_to_any(&action("users:get")));
        assert!(!table.is_granted_to_any(&action("projects:get")));
        assert_eq!(table.actions().len(), 3);
    }
}
