//! Repositories over the permission store
//!
//! `PermissionsRepository` is the only way into the store. Every call reads
//! or writes the current state; nothing is cached between calls, so an
//! administrator's edit is visible to the next permission check.

use async_trait::async_trait;

use crate::error::PermissionsResult;
use crate::models::{
    Function, FunctionId, PermissionGrant, Role, RoleId, RolePermission, SectionWithFunctions,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryPermissionsRepository;
pub use postgres::PostgresPermissionsRepository;

/// Typed operations over sections, functions, roles, grants and memberships.
#[async_trait]
pub trait PermissionsRepository: Send + Sync {
    /// Create a role, failing with `DuplicateRoleName` when the name is taken.
    async fn add_role(&self, name: &str) -> PermissionsResult<RoleId>;

    async fn get_role(&self, role_id: RoleId) -> PermissionsResult<Role>;

    async fn get_role_by_name(&self, name: &str) -> PermissionsResult<Role>;

    /// All roles ordered by name; `NoRoles` when none exist.
    async fn get_roles(&self) -> PermissionsResult<Vec<Role>>;

    /// Remove a role together with its grants and memberships.
    async fn delete_role(&self, role_id: RoleId) -> PermissionsResult<()>;

    /// Every section/function pair with the role's grant flag.
    ///
    /// Pairs the role was never granted come back with `has_access = false`.
    async fn get_role_permissions(&self, role_id: RoleId)
    -> PermissionsResult<Vec<RolePermission>>;

    /// Replace the role's whole grant set in one atomic write.
    ///
    /// Pairs missing from `grants` end up denied. Nothing is written when any
    /// grant names a function that does not belong to the given section.
    async fn update_role_permissions(
        &self,
        role_id: RoleId,
        grants: &[PermissionGrant],
    ) -> PermissionsResult<()>;

    async fn add_user_to_role(&self, role_id: RoleId, user_name: &str) -> PermissionsResult<()>;

    async fn remove_user_from_role(&self, role_id: RoleId, user_name: &str)
    -> PermissionsResult<()>;

    /// Members of the role ordered by user name.
    async fn get_role_users(&self, role_id: RoleId) -> PermissionsResult<Vec<String>>;

    /// Roles held by a user; empty when the user holds none.
    async fn get_user_roles(&self, user_name: &str) -> PermissionsResult<Vec<Role>>;

    async fn list_sections(&self) -> PermissionsResult<Vec<SectionWithFunctions>>;

    /// Resolve a function by section and function name.
    async fn find_function(
        &self,
        section_name: &str,
        function_name: &str,
    ) -> PermissionsResult<Option<Function>>;

    /// Whether the role holds an explicit allow for the function.
    async fn role_grants(&self, role_id: RoleId, function_id: FunctionId)
    -> PermissionsResult<bool>;

    async fn health_check(&self) -> PermissionsResult<bool>;
}

/// Collapse a submitted grant set to one entry per pair, last write wins.
pub(crate) fn dedup_grants(grants: &[PermissionGrant]) -> Vec<PermissionGrant> {
    let mut by_pair = std::collections::BTreeMap::new();
    for grant in grants {
        by_pair.insert((grant.section_id, grant.function_id), *grant);
    }
    by_pair.into_values().collect()
}
