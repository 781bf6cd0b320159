//! Group expansion into end users
//!
//! Groups nest, and nothing stops an administrator from building a loop.
//! Expansion walks direct memberships recursively and keeps the groups on the
//! current path, so a cycle is cut where it closes instead of recursing
//! forever. Groups already expanded elsewhere in the same call are skipped.

use futures::future::BoxFuture;
use permwatch_common::types::is_group_authority;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

use crate::error::Result;
use crate::providers::AuthorityProvider;

/// Resolves an authority into the set of users it stands for
pub struct GroupExpander<'a> {
    authorities: &'a dyn AuthorityProvider,
}

#[derive(Default)]
struct Expansion {
    on_path: HashSet<String>,
    expanded: HashSet<String>,
    users: BTreeSet<String>,
}

impl<'a> GroupExpander<'a> {
    pub fn new(authorities: &'a dyn AuthorityProvider) -> Self {
        Self { authorities }
    }

    /// Flat set of users behind `authority`
    ///
    /// A user comes back as itself. For a group, a failed lookup of the group
    /// itself is an error; failures further down only empty that branch.
    pub async fn expand(&self, authority: &str) -> Result<BTreeSet<String>> {
        if !is_group_authority(authority) {
            return Ok(BTreeSet::from([authority.to_string()]));
        }

        let mut expansion = Expansion::default();
        self.expand_group(authority, &mut expansion, true).await?;

        debug!(
            group = %authority,
            users = expansion.users.len(),
            groups = expansion.expanded.len(),
            "Expanded group"
        );
        Ok(expansion.users)
    }

    fn expand_group<'s>(
        &'s self,
        group: &'s str,
        expansion: &'s mut Expansion,
        top_level: bool,
    ) -> BoxFuture<'s, Result<()>> {
        Box::pin(async move {
            if expansion.on_path.contains(group) {
                warn!(group = %group, "Circular group reference detected");
                return Ok(());
            }
            if expansion.expanded.contains(group) {
                return Ok(());
            }

            let members = match self.authorities.members_of(group, false).await {
                Ok(members) => members,
                Err(e) if top_level => return Err(e),
                Err(e) => {
                    warn!(group = %group, error = %e, "Failed to list group members, skipping");
                    expansion.expanded.insert(group.to_string());
                    return Ok(());
                },
            };

            expansion.on_path.insert(group.to_string());
            for member in &members {
                if is_group_authority(member) {
                    self.expand_group(member, expansion, false).await?;
                } else {
                    expansion.users.insert(member.clone());
                }
            }
            expansion.on_path.remove(group);
            expansion.expanded.insert(group.to_string());

            Ok(())
        })
    }
}
