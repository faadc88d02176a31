use serde_json::Value;

use crate::authz::errors::AuthzError;
use crate::authz::table::PermissionTable;
use crate::authz::types::Grant;

/// Does `role` hold `action`, given optional contextual `data`?
///
/// Unknown roles and actions are denied. A conditional grant whose predicate
/// cannot be evaluated is denied as well; the failure is logged.
pub fn has_claim(table: &PermissionTable, role: &str, action: &str, data: Option<&Value>) -> bool {
    match try_has_claim(table, role, action, data) {
        Ok(allowed) => allowed,
        Err(e) => {
            tracing::warn!(role, action, error = %e, "claim predicate failed, denying");
            false
        }
    }
}

/// Like [`has_claim`] but surfaces predicate evaluation failures to the caller.
pub fn try_has_claim(
    table: &PermissionTable,
    role: &str,
    action: &str,
    data: Option<&Value>,
) -> Result<bool, AuthzError> {
    match table.lookup(role, action) {
        Grant::Denied => Ok(false),
        Grant::Allowed => Ok(true),
        Grant::Conditional(condition) => condition.evaluate(data),
    }
}
