//! Group management
//!
//! Only the owner administers a group. The owner is not stored as a member
//! but counts as one when an expense is split.

use crate::error::{Error, Result};
use crate::storage::GroupStore;
use crate::types::{Group, GroupId, GroupInfo, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Minimum group name length
pub const MIN_NAME_LEN: usize = 3;

/// Maximum group name length
pub const MAX_NAME_LEN: usize = 64;

/// Resolve every member identity of a group, owner first
///
/// Fails with [`Error::NotFound`] when the group does not exist.
pub async fn resolve_members(store: &dyn GroupStore, group: GroupId) -> Result<Vec<UserId>> {
    let owner = store
        .group_by_id(group)
        .await?
        .ok_or_else(|| Error::NotFound(format!("group {} not found", group)))?
        .owner_id;

    let mut seen = HashSet::new();
    seen.insert(owner);

    let mut members = vec![owner];
    for member in store.members(group).await? {
        if seen.insert(member) {
            members.push(member);
        }
    }

    Ok(members)
}

/// Group administration service
pub struct GroupService {
    store: Arc<dyn GroupStore>,
}

impl std::fmt::Debug for GroupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupService").finish_non_exhaustive()
    }
}

impl GroupService {
    /// Create a group service over a store
    pub fn new(store: Arc<dyn GroupStore>) -> Self {
        Self { store }
    }

    /// Create a new group owned by `owner`
    pub async fn create_group(&self, name: &str, owner: UserId) -> Result<Group> {
        let name = name.trim();
        let len = name.chars().count();
        if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
            return Err(Error::BadRequest(format!(
                "group name must be between {} and {} characters",
                MIN_NAME_LEN, MAX_NAME_LEN
            )));
        }

        let group = self.store.create_group(name, owner).await?;
        info!(group_id = %group.id, owner_id = %owner, "Created group");
        Ok(group)
    }

    /// Group with its members
    pub async fn group_info(&self, group: GroupId) -> Result<GroupInfo> {
        let found = self.find_group(group).await?;
        let members = self.store.members(group).await?;
        Ok(GroupInfo {
            group: found,
            members,
        })
    }

    /// Members of a group, owner excluded
    pub async fn members(&self, group: GroupId) -> Result<Vec<UserId>> {
        self.find_group(group).await?;
        self.store.members(group).await
    }

    /// Add members to a group
    pub async fn add_members(&self, actor: UserId, group: GroupId, members: &[UserId]) -> Result<()> {
        if members.is_empty() {
            return Err(Error::BadRequest("group member list is empty".to_string()));
        }

        self.check_owner(actor, group).await?;

        if members.contains(&actor) {
            return Err(Error::BadRequest(
                "group owner is already in the group".to_string(),
            ));
        }

        self.store.add_members(group, members).await?;
        debug!(group_id = %group, count = members.len(), "Added group members");
        Ok(())
    }

    /// Remove a member from a group
    pub async fn remove_member(&self, actor: UserId, group: GroupId, member: UserId) -> Result<()> {
        self.check_owner(actor, group).await?;

        if actor == member {
            return Err(Error::BadRequest(
                "group owner cannot be removed from the group".to_string(),
            ));
        }

        if !self.store.remove_member(group, member).await? {
            return Err(Error::NotFound(format!(
                "user {} is not a member of group {}",
                member, group
            )));
        }

        debug!(group_id = %group, member_id = %member, "Removed group member");
        Ok(())
    }

    /// Delete a group
    ///
    /// Loans created through the group stay in the ledger.
    pub async fn delete_group(&self, actor: UserId, group: GroupId) -> Result<()> {
        self.check_owner(actor, group).await?;

        if !self.store.delete_group(group).await? {
            return Err(Error::NotFound(format!("group {} not found", group)));
        }

        info!(group_id = %group, "Deleted group");
        Ok(())
    }

    /// Groups where the user is owner or member
    pub async fn groups_by_user(&self, user: UserId) -> Result<Vec<Group>> {
        self.store.groups_by_user(user).await
    }

    /// Every member identity of a group, owner included
    pub async fn resolve_members(&self, group: GroupId) -> Result<Vec<UserId>> {
        resolve_members(self.store.as_ref(), group).await
    }

    async fn find_group(&self, group: GroupId) -> Result<Group> {
        self.store
            .group_by_id(group)
            .await?
            .ok_or_else(|| Error::NotFound(format!("group {} not found", group)))
    }

    async fn check_owner(&self, actor: UserId, group: GroupId) -> Result<()> {
        let found = self.find_group(group).await?;
        if found.owner_id != actor {
            return Err(Error::Forbidden(
                "only the group owner can manage this group".to_string(),
            ));
        }
        Ok(())
    }
}
