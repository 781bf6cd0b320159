//! Authorities the repository manages internally and that are never audited

/// Pseudo-group every user belongs to
pub const GROUP_EVERYONE: &str = "GROUP_EVERYONE";

pub const ROLE_OWNER: &str = "ROLE_OWNER";
pub const ROLE_LOCK_OWNER: &str = "ROLE_LOCK_OWNER";
pub const ROLE_VIRTUAL: &str = "ROLE_VIRTUAL";

const ROLE_PREFIX: &str = "ROLE_";

/// True for ACL entries that are implementation detail rather than a grant
///
/// The decision only depends on the authority; the permission is accepted so
/// callers can pass whole entries.
pub fn is_system_permission(authority: &str, _permission: &str) -> bool {
    matches!(authority, GROUP_EVERYONE | ROLE_OWNER | ROLE_LOCK_OWNER | ROLE_VIRTUAL)
        || authority.starts_with(ROLE_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_authorities() {
        assert!(is_system_permission("GROUP_EVERYONE", "Consumer"));
        assert!(is_system_permission("ROLE_OWNER", "All"));
        assert!(is_system_permission("ROLE_LOCK_OWNER", "Write"));
        assert!(is_system_permission("ROLE_VIRTUAL", "Read"));
        assert!(is_system_permission("ROLE_ADMINISTRATOR", "Read"));
    }

    #[test]
    fn test_regular_authorities_pass() {
        assert!(!is_system_permission("alice", "Consumer"));
        assert!(!is_system_permission("GROUP_site_members", "SiteCollaborator"));
        assert!(!is_system_permission("GROUP_ROLE_X", "Read"));
        // Case matters
        assert!(!is_system_permission("role_owner", "All"));
    }
}
