//! Permission Engine (C3)
//!
//! A pure, total function: no storage access, no exceptions. `check` either
//! matches `required` against the user's permission set or it doesn't.

use crate::entities::User;

const ADMIN_WILDCARD: &str = "*";

/// Evaluate whether `user` may perform `required` (`action:resource`),
/// per spec §4.3's wildcard rules:
/// - `is_admin == true` always succeeds (orthogonal to the pattern match).
/// - `*` in the permission set matches anything.
/// - `prefix:*` matches any permission with action `prefix`.
/// - `action:prefix*` matches any resource starting with `prefix` for that action.
/// - otherwise an exact `action:resource` match is required.
pub fn check(user: &User, required: &str) -> bool {
    if user.is_admin {
        return true;
    }
    user.permissions.iter().any(|granted| matches(granted, required))
}

fn matches(granted: &str, required: &str) -> bool {
    if granted == ADMIN_WILDCARD {
        return true;
    }

    let Some((granted_action, granted_resource)) = granted.split_once(':') else {
        return granted == required;
    };
    let Some((required_action, required_resource)) = required.split_once(':') else {
        return false;
    };

    if granted_resource == ADMIN_WILDCARD {
        return granted_action == required_action;
    }

    if let Some(prefix) = granted_resource.strip_suffix('*') {
        return granted_action == required_action && required_resource.starts_with(prefix);
    }

    granted_action == required_action && granted_resource == required_resource
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(permissions: &[&str], is_admin: bool) -> User {
        User {
            id: "alice".into(),
            email: "alice@acme.org".into(),
            groups: vec![],
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
            is_admin,
        }
    }

    #[test]
    fn exact_match_succeeds() {
        let u = user(&["view:own"], false);
        assert!(check(&u, "view:own"));
        assert!(!check(&u, "view:other"));
    }

    #[test]
    fn global_wildcard_matches_anything() {
        let u = user(&["*"], false);
        assert!(check(&u, "submit:SOP42"));
        assert!(check(&u, "delete:anything"));
    }

    #[test]
    fn admin_bypasses_permission_set_entirely() {
        let u = user(&[], true);
        assert!(check(&u, "submit:SOP42"));
    }

    #[test]
    fn action_wildcard_matches_any_resource_for_that_action() {
        let u = user(&["draft:*"], false);
        assert!(check(&u, "draft:d_abc"));
        assert!(check(&u, "draft:anything"));
        assert!(!check(&u, "submit:d_abc"));
    }

    #[test]
    fn resource_prefix_wildcard_matches_prefixed_resources_for_same_action() {
        let u = user(&["submit:SOP*"], false);
        assert!(check(&u, "submit:SOP42"));
        assert!(check(&u, "submit:SOP7"));
        assert!(!check(&u, "submit:OTHER1"));
        assert!(!check(&u, "view:SOP42"));
    }

    #[test]
    fn scenario_permission_set_from_spec_eight() {
        // spec §8 scenario: {submit:SOP*, view:own, draft:*}
        let u = user(&["submit:SOP*", "view:own", "draft:*"], false);
        assert!(check(&u, "submit:SOP42"));
        assert!(check(&u, "view:own"));
        assert!(check(&u, "draft:d_abc"));
        assert!(!check(&u, "view:other"));
    }
}
