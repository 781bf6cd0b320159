//! Common types used across permwatch

use crate::error::PermwatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix the hosting repository uses for group authorities.
pub const GROUP_PREFIX: &str = "GROUP_";

/// Returns true when the authority names a group rather than a user.
pub fn is_group_authority(authority: &str) -> bool {
    authority.starts_with(GROUP_PREFIX)
}

/// An ACL entry currently set on a node, as reported by the repository.
///
/// Access grants are never stored; they are re-read on every reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessGrant {
    pub authority: String,
    pub permission: String,
}

impl AccessGrant {
    pub fn new(authority: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            permission: permission.into(),
        }
    }

    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(self.authority.clone(), self.permission.clone())
    }
}

/// An `authority:permission` pair, the unit a node snapshot is made of.
///
/// Authorities never contain `:`, permissions may, so parsing splits on the
/// first separator only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionKey {
    pub authority: String,
    pub permission: String,
}

impl PermissionKey {
    pub fn new(authority: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            permission: permission.into(),
        }
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority, self.permission)
    }
}

impl FromStr for PermissionKey {
    type Err = PermwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((authority, permission)) if !authority.is_empty() && !permission.is_empty() => {
                Ok(Self::new(authority, permission))
            },
            _ => Err(PermwatchError::InvalidPermissionKey(s.to_string())),
        }
    }
}

/// Kind of an audit row in the permission history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Grant,
    Revoke,
}

impl ActionType {
    /// Value stored in the `action_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Grant => "GRANT",
            ActionType::Revoke => "REVOKE",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = PermwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GRANT" => Ok(ActionType::Grant),
            "REVOKE" => Ok(ActionType::Revoke),
            other => Err(PermwatchError::InvalidActionType(other.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_permission_key_display() {
        let key = PermissionKey::new("bob", "SiteConsumer");
        assert_eq!(key.to_string(), "bob:SiteConsumer");
    }

    #[test]
    fn test_permission_key_splits_on_first_colon() {
        let key: PermissionKey = "GROUP_X:Custom:Read".parse().unwrap();
        assert_eq!(key.authority, "GROUP_X");
        assert_eq!(key.permission, "Custom:Read");
    }

    #[test]
    fn test_permission_key_rejects_malformed() {
        assert!("no-separator".parse::<PermissionKey>().is_err());
        assert!(":Read".parse::<PermissionKey>().is_err());
        assert!("bob:".parse::<PermissionKey>().is_err());
    }

    #[test]
    fn test_action_type_parse() {
        assert_eq!("GRANT".parse::<ActionType>().unwrap(), ActionType::Grant);
        assert_eq!("revoke".parse::<ActionType>().unwrap(), ActionType::Revoke);
        assert!("DELETE".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_group_authority_detection() {
        assert!(is_group_authority("GROUP_site_hr_SiteConsumer"));
        assert!(!is_group_authority("alice"));
    }

    proptest! {
        #[test]
        fn prop_permission_key_survives_display(
            authority in "[A-Za-z_][A-Za-z0-9_.@-]{0,20}",
            permission in "[A-Za-z][A-Za-z0-9:]{0,20}",
        ) {
            let key = PermissionKey::new(authority.clone(), permission.clone());
            let parsed: PermissionKey = key.to_string().parse().unwrap();
            prop_assert_eq!(parsed.authority, authority);
            prop_assert_eq!(parsed.permission, permission);
        }
    }
}
