use std::collections::HashMap;

use tracing::{debug, warn};

use shared::types::Scope;

/// A named bundle of scopes assigned to accounts via their `roles` list.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub name: String,
    pub scopes: Vec<Scope>,
}

impl Role {
    pub fn new(name: impl Into<String>, scopes: Vec<Scope>) -> Self {
        Self {
            name: name.into(),
            scopes,
        }
    }
}

/// Static registry of roles, injected at construction instead of living in
/// process-global state, so several catalogs can coexist in tests.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    roles: HashMap<String, Role>,
}

impl PermissionCatalog {
    /// Build a catalog from a role list.  Role names are globally unique;
    /// a duplicate name replaces the earlier entry with a warning.
    pub fn new(roles: Vec<Role>) -> Self {
        let mut table = HashMap::with_capacity(roles.len());
        for role in roles {
            if table.insert(role.name.clone(), role).is_some() {
                warn!("Duplicate role name in catalog; later entry wins");
            }
        }
        Self { roles: table }
    }

    /// The deployment's default role table.
    pub fn builtin() -> Self {
        Self::new(vec![
            Role::new(
                "admin",
                vec![
                    Scope::new("accounts", "*"),
                    Scope::new("sessions", "*"),
                    Scope::new("beenames", "*"),
                    Scope::new("petpictures", "*"),
                    Scope::new("datastore", "*"),
                    Scope::new("devices", "*"),
                ],
            ),
            Role::new(
                "keeper",
                vec![
                    Scope::new("beenames", "*"),
                    Scope::new("petpictures", "*"),
                    Scope::new("devices", "poll"),
                ],
            ),
            Role::new(
                "member",
                vec![
                    Scope::new("beenames", "generate"),
                    Scope::new("petpictures", "view"),
                ],
            ),
        ])
    }

    /// Exact-match role lookup; no partial matches.
    pub fn resolve_role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    /// Flatten a role-name list into `name|value` permission strings.
    ///
    /// Unknown role names are skipped with a log note, not an error — an
    /// account may carry roles from a newer deployment.  Order and
    /// duplicates are passed through un-normalized; callers must not rely
    /// on sortedness or uniqueness.
    pub fn expand_roles(&self, role_names: &[String]) -> Vec<String> {
        let mut permissions = Vec::new();
        for name in role_names {
            match self.resolve_role(name) {
                Some(role) => {
                    permissions.extend(role.scopes.iter().map(Scope::permission_string));
                }
                None => {
                    debug!("Skipping unknown role: {}", name);
                }
            }
        }
        permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PermissionCatalog {
        PermissionCatalog::new(vec![
            Role::new(
                "owner",
                vec![Scope::new("ScopeA", "*"), Scope::new("ScopeB", "5")],
            ),
            Role::new("viewer", vec![Scope::new("ScopeA", "read")]),
        ])
    }

    #[test]
    fn resolve_is_exact_match_only() {
        let c = catalog();
        assert!(c.resolve_role("owner").is_some());
        assert!(c.resolve_role("own").is_none());
        assert!(c.resolve_role("Owner").is_none());
    }

    #[test]
    fn expand_flattens_scopes_to_permission_strings() {
        let c = catalog();
        let mut perms = c.expand_roles(&["owner".to_string()]);
        perms.sort();
        assert_eq!(perms, vec!["ScopeA|*".to_string(), "ScopeB|5".to_string()]);
    }

    #[test]
    fn unknown_roles_are_skipped_not_errors() {
        let c = catalog();
        let perms = c.expand_roles(&[
            "owner".to_string(),
            "from-the-future".to_string(),
            "viewer".to_string(),
        ]);
        assert_eq!(perms.len(), 3);
        assert!(perms.contains(&"ScopeA|read".to_string()));
    }

    #[test]
    fn expand_does_not_deduplicate() {
        let c = catalog();
        let perms = c.expand_roles(&["viewer".to_string(), "viewer".to_string()]);
        assert_eq!(perms, vec!["ScopeA|read".to_string(), "ScopeA|read".to_string()]);
    }

    #[test]
    fn builtin_catalog_has_the_default_role() {
        let c = PermissionCatalog::builtin();
        assert!(c.resolve_role("member").is_some());
        assert!(!c.expand_roles(&["member".to_string()]).is_empty());
    }
}
