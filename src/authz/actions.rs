//! The action vocabulary shared by the permission table and the route maps.
//!
//! Code that checks a claim directly (rather than through a route) should use
//! these constants instead of string literals.

// =============================================================================
// Projects
// =============================================================================

pub const PROJECTS_GET: &str = "projects:get";
pub const PROJECTS_CREATE: &str = "projects:create";
pub const PROJECTS_UPDATE: &str = "projects:update";
pub const PROJECTS_ARCHIVE: &str = "projects:archive";
pub const PROJECTS_DELETE: &str = "projects:delete";
pub const PROJECTS_EXPORT: &str = "projects:export";

// =============================================================================
// Interviews
// =============================================================================

pub const INTERVIEWS_GET: &str = "interviews:get";
pub const INTERVIEWS_CREATE: &str = "interviews:create";
pub const INTERVIEWS_UPDATE: &str = "interviews:update";
pub const INTERVIEWS_DELETE: &str = "interviews:delete";
pub const INTERVIEWS_EXPORT: &str = "interviews:export";
pub const INTERVIEWS_IMPORT: &str = "interviews:import";

// =============================================================================
// Questions and templates
// =============================================================================

pub const QUESTIONS_GET: &str = "questions:get";
pub const QUESTIONS_CREATE: &str = "questions:create";
pub const QUESTIONS_UPDATE: &str = "questions:update";
pub const QUESTIONS_DELETE: &str = "questions:delete";

pub const TEMPLATES_GET: &str = "templates:get";
pub const TEMPLATES_CREATE: &str = "templates:create";
pub const TEMPLATES_UPDATE: &str = "templates:update";
pub const TEMPLATES_DELETE: &str = "templates:delete";

// =============================================================================
// Users and invites
// =============================================================================

pub const USERS_GET: &str = "users:get";
pub const USERS_CREATE: &str = "users:create";
/// Conditional for non-administrators: only their own account.
pub const USERS_UPDATE: &str = "users:update";
pub const USERS_DELETE: &str = "users:delete";
pub const USERS_EXPORT: &str = "users:export";

pub const INVITES_GET: &str = "invites:get";
pub const INVITES_CREATE: &str = "invites:create";
pub const INVITES_DELETE: &str = "invites:delete";
pub const INVITES_RESEND: &str = "invites:resend";

pub const ALL: &[&str] = &[
    PROJECTS_GET,
    PROJECTS_CREATE,
    PROJECTS_UPDATE,
    PROJECTS_ARCHIVE,
    PROJECTS_DELETE,
    PROJECTS_EXPORT,
    INTERVIEWS_GET,
    INTERVIEWS_CREATE,
    INTERVIEWS_UPDATE,
    INTERVIEWS_DELETE,
    INTERVIEWS_EXPORT,
    INTERVIEWS_IMPORT,
    QUESTIONS_GET,
    QUESTIONS_CREATE,
    QUESTIONS_UPDATE,
    QUESTIONS_DELETE,
    TEMPLATES_GET,
    TEMPLATES_CREATE,
    TEMPLATES_UPDATE,
    TEMPLATES_DELETE,
    USERS_GET,
    USERS_CREATE,
    USERS_UPDATE,
    USERS_DELETE,
    USERS_EXPORT,
    INVITES_GET,
    INVITES_CREATE,
    INVITES_DELETE,
    INVITES_RESEND,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::types::Action;
    use std::collections::HashSet;

    #[test]
    fn test_vocabulary_is_well_formed_and_unique() {
        let mut seen = HashSet::new();
        for action in ALL {
            assert!(Action::parse(action).is_ok(), "{action}");
            assert!(seen.insert(*action), "duplicate {action}");
        }
    }
}
