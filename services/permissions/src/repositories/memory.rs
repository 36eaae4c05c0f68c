//! In-memory permission repository.
//!
//! Holds the whole store behind a single `tokio::sync::RwLock`, seeded with the
//! same reference sections and functions as the PostgreSQL migrations. Every
//! mutation runs under the write lock, so readers observe either the state
//! before or after a grant replacement, never a mix. Nothing survives a
//! restart; it backs local development and the test suite.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use super::{PermissionsRepository, dedup_grants};
use crate::error::{PermissionsError, PermissionsResult};
use crate::models::{
    Function, FunctionId, PermissionGrant, Role, RoleId, RolePermission, SectionWithFunctions,
    UserRole, reference_data,
};
use crate::validation;

#[derive(Debug)]
struct MemoryState {
    sections: Vec<SectionWithFunctions>,
    roles: BTreeMap<RoleId, Role>,
    grants: HashMap<(RoleId, FunctionId), bool>,
    memberships: Vec<UserRole>,
    next_role_id: RoleId,
    next_membership_id: i32,
}

impl MemoryState {
    fn role(&self, role_id: RoleId) -> PermissionsResult<&Role> {
        self.roles
            .get(&role_id)
            .ok_or_else(|| PermissionsError::RoleNotFound(role_id.to_string()))
    }

    fn function_section(&self, function_id: FunctionId) -> Option<i32> {
        self.sections
            .iter()
            .flat_map(|s| s.functions.iter())
            .find(|f| f.id == function_id)
            .map(|f| f.application_section_id)
    }
}

/// Permission repository kept entirely in process memory
#[derive(Debug, Clone)]
pub struct InMemoryPermissionsRepository {
    state: Arc<RwLock<MemoryState>>,
}

impl Default for InMemoryPermissionsRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPermissionsRepository {
    /// Create a store holding only the reference data
    pub fn new() -> Self {
        Self::with_sections(reference_data())
    }

    pub fn with_sections(sections: Vec<SectionWithFunctions>) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                sections,
                roles: BTreeMap::new(),
                grants: HashMap::new(),
                memberships: Vec::new(),
                next_role_id: 1,
                next_membership_id: 1,
            })),
        }
    }
}

#[async_trait]
impl PermissionsRepository for InMemoryPermissionsRepository {
    async fn add_role(&self, name: &str) -> PermissionsResult<RoleId> {
        let name = validation::role_name(name)?;
        let mut state = self.state.write().await;

        if state.roles.values().any(|r| r.name == name) {
            return Err(PermissionsError::DuplicateRoleName(name.to_string()));
        }

        let id = state.next_role_id;
        state.next_role_id += 1;
        state.roles.insert(
            id,
            Role {
                id,
                name: name.to_string(),
                created_at: Utc::now(),
            },
        );

        info!("Created role {} ({})", name, id);
        Ok(id)
    }

    async fn get_role(&self, role_id: RoleId) -> PermissionsResult<Role> {
        let state = self.state.read().await;
        state.role(role_id).cloned()
    }

    async fn get_role_by_name(&self, name: &str) -> PermissionsResult<Role> {
        let name = name.trim();
        let state = self.state.read().await;
        state
            .roles
            .values()
            .find(|r| r.name == name)
            .cloned()
            .ok_or_else(|| PermissionsError::RoleNotFound(name.to_string()))
    }

    async fn get_roles(&self) -> PermissionsResult<Vec<Role>> {
        let state = self.state.read().await;
        let mut roles: Vec<Role> = state.roles.values().cloned().collect();
        if roles.is_empty() {
            return Err(PermissionsError::NoRoles);
        }
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn delete_role(&self, role_id: RoleId) -> PermissionsResult<()> {
        let mut state = self.state.write().await;
        if state.roles.remove(&role_id).is_none() {
            return Err(PermissionsError::RoleNotFound(role_id.to_string()));
        }
        state.grants.retain(|(r, _), _| *r != role_id);
        state.memberships.retain(|m| m.role_id != role_id);

        info!("Deleted role {}", role_id);
        Ok(())
    }

    async fn get_role_permissions(
        &self,
        role_id: RoleId,
    ) -> PermissionsResult<Vec<RolePermission>> {
        let state = self.state.read().await;
        state.role(role_id)?;
        let grants = &state.grants;

        Ok(state
            .sections
            .iter()
            .flat_map(|s| {
                s.functions.iter().map(move |function| RolePermission {
                    section: s.section.clone(),
                    function: function.clone(),
                    has_access: grants
                        .get(&(role_id, function.id))
                        .copied()
                        .unwrap_or(false),
                })
            })
            .collect())
    }

    async fn update_role_permissions(
        &self,
        role_id: RoleId,
        grants: &[PermissionGrant],
    ) -> PermissionsResult<()> {
        let grants = dedup_grants(grants);
        let mut state = self.state.write().await;
        state.role(role_id)?;

        if let Some(invalid) = grants
            .iter()
            .find(|g| state.function_section(g.function_id) != Some(g.section_id))
        {
            return Err(PermissionsError::InvalidGrant {
                section_id: invalid.section_id,
                function_id: invalid.function_id,
            });
        }

        state.grants.retain(|(r, _), _| *r != role_id);
        for grant in &grants {
            state
                .grants
                .insert((role_id, grant.function_id), grant.has_access);
        }

        info!(
            "Replaced permissions of role {} with {} grants",
            role_id,
            grants.len()
        );
        Ok(())
    }

    async fn add_user_to_role(&self, role_id: RoleId, user_name: &str) -> PermissionsResult<()> {
        let user_name = validation::user_name(user_name)?;
        let mut state = self.state.write().await;
        state.role(role_id)?;

        if state
            .memberships
            .iter()
            .any(|m| m.role_id == role_id && m.user_name == user_name)
        {
            return Err(PermissionsError::DuplicateMembership {
                role_id,
                user_name: user_name.to_string(),
            });
        }

        let id = state.next_membership_id;
        state.next_membership_id += 1;
        state.memberships.push(UserRole {
            id,
            role_id,
            user_name: user_name.to_string(),
            created_at: Utc::now(),
        });

        info!("Added user {} to role {}", user_name, role_id);
        Ok(())
    }

    async fn remove_user_from_role(
        &self,
        role_id: RoleId,
        user_name: &str,
    ) -> PermissionsResult<()> {
        let user_name = user_name.trim();
        let mut state = self.state.write().await;
        let before = state.memberships.len();
        state
            .memberships
            .retain(|m| !(m.role_id == role_id && m.user_name == user_name));

        if state.memberships.len() == before {
            return Err(PermissionsError::MembershipNotFound {
                role_id,
                user_name: user_name.to_string(),
            });
        }

        info!("Removed user {} from role {}", user_name, role_id);
        Ok(())
    }

    async fn get_role_users(&self, role_id: RoleId) -> PermissionsResult<Vec<String>> {
        let state = self.state.read().await;
        state.role(role_id)?;

        let mut users: Vec<String> = state
            .memberships
            .iter()
            .filter(|m| m.role_id == role_id)
            .map(|m| m.user_name.clone())
            .collect();
        users.sort();
        Ok(users)
    }

    async fn get_user_roles(&self, user_name: &str) -> PermissionsResult<Vec<Role>> {
        let user_name = user_name.trim();
        let state = self.state.read().await;

        let mut roles: Vec<Role> = state
            .memberships
            .iter()
            .filter(|m| m.user_name == user_name)
            .filter_map(|m| state.roles.get(&m.role_id).cloned())
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn list_sections(&self) -> PermissionsResult<Vec<SectionWithFunctions>> {
        Ok(self.state.read().await.sections.clone())
    }

    async fn find_function(
        &self,
        section_name: &str,
        function_name: &str,
    ) -> PermissionsResult<Option<Function>> {
        let state = self.state.read().await;
        Ok(state
            .sections
            .iter()
            .find(|s| s.section.name == section_name)
            .and_then(|s| s.function(function_name))
            .cloned())
    }

    async fn role_grants(
        &self,
        role_id: RoleId,
        function_id: FunctionId,
    ) -> PermissionsResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .grants
            .get(&(role_id, function_id))
            .copied()
            .unwrap_or(false))
    }

    async fn health_check(&self) -> PermissionsResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn grant(section_id: i32, function_id: i32, has_access: bool) -> PermissionGrant {
        PermissionGrant {
            section_id,
            function_id,
            has_access,
        }
    }

    #[tokio::test]
    async fn test_add_role_twice_fails_and_keeps_one_row() {
        let repo = InMemoryPermissionsRepository::new();

        let id = repo.add_role("Ops").await.unwrap();
        let second = repo.add_role("Ops").await;
        assert!(matches!(second, Err(PermissionsError::DuplicateRoleName(_))));

        let roles = repo.get_roles().await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].id, id);
        assert_eq!(roles[0].name, "Ops");
    }

    #[tokio::test]
    async fn test_get_roles_distinguishes_empty_store() {
        let repo = InMemoryPermissionsRepository::new();
        assert!(matches!(
            repo.get_roles().await,
            Err(PermissionsError::NoRoles)
        ));
    }

    #[tokio::test]
    async fn test_get_role_by_id_and_name() {
        let repo = InMemoryPermissionsRepository::new();
        let id = repo.add_role("Viewer").await.unwrap();

        assert_eq!(repo.get_role(id).await.unwrap().name, "Viewer");
        assert_eq!(repo.get_role_by_name(" Viewer ").await.unwrap().id, id);
        assert!(matches!(
            repo.get_role(id + 1).await,
            Err(PermissionsError::RoleNotFound(_))
        ));
        assert!(matches!(
            repo.get_role_by_name("viewer").await,
            Err(PermissionsError::RoleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_role_permissions_default_to_denied() {
        let repo = InMemoryPermissionsRepository::new();
        let id = repo.add_role("Viewer").await.unwrap();

        let permissions = repo.get_role_permissions(id).await.unwrap();
        assert_eq!(permissions.len(), 21);
        assert!(permissions.iter().all(|p| !p.has_access));
    }

    #[tokio::test]
    async fn test_update_replaces_instead_of_merging() {
        let repo = InMemoryPermissionsRepository::new();
        let id = repo.add_role("Viewer").await.unwrap();

        repo.update_role_permissions(id, &[grant(1, 1, true), grant(1, 2, true)])
            .await
            .unwrap();
        repo.update_role_permissions(id, &[grant(2, 3, true)])
            .await
            .unwrap();

        let allowed: Vec<i32> = repo
            .get_role_permissions(id)
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.has_access)
            .map(|p| p.function.id)
            .collect();
        assert_eq!(allowed, vec![3]);
    }

    #[tokio::test]
    async fn test_update_with_full_matrix_reads_back_exactly() {
        let repo = InMemoryPermissionsRepository::new();
        let id = repo.add_role("Viewer").await.unwrap();

        let new_grants: Vec<PermissionGrant> = repo
            .get_role_permissions(id)
            .await
            .unwrap()
            .iter()
            .map(|p| PermissionGrant {
                has_access: p.function.id % 2 == 0,
                ..p.grant()
            })
            .collect();

        repo.update_role_permissions(id, &new_grants).await.unwrap();

        let read_back: Vec<PermissionGrant> = repo
            .get_role_permissions(id)
            .await
            .unwrap()
            .iter()
            .map(RolePermission::grant)
            .collect();
        assert_eq!(read_back, new_grants);
    }

    #[tokio::test]
    async fn test_invalid_grant_writes_nothing() {
        let repo = InMemoryPermissionsRepository::new();
        let id = repo.add_role("Viewer").await.unwrap();
        repo.update_role_permissions(id, &[grant(1, 1, true)])
            .await
            .unwrap();

        // function 9 belongs to section 3
        let result = repo
            .update_role_permissions(id, &[grant(2, 3, true), grant(1, 9, true)])
            .await;
        assert!(matches!(
            result,
            Err(PermissionsError::InvalidGrant {
                section_id: 1,
                function_id: 9
            })
        ));

        assert!(repo.role_grants(id, 1).await.unwrap());
        assert!(!repo.role_grants(id, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_membership_add_remove() {
        let repo = InMemoryPermissionsRepository::new();
        let id = repo.add_role("Viewer").await.unwrap();

        repo.add_user_to_role(id, "alice").await.unwrap();
        assert!(matches!(
            repo.add_user_to_role(id, "alice").await,
            Err(PermissionsError::DuplicateMembership { .. })
        ));
        assert_eq!(repo.get_role_users(id).await.unwrap(), vec!["alice"]);

        repo.remove_user_from_role(id, "alice").await.unwrap();
        assert!(repo.get_role_users(id).await.unwrap().is_empty());
        assert!(matches!(
            repo.remove_user_from_role(id, "alice").await,
            Err(PermissionsError::MembershipNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_user_to_missing_role() {
        let repo = InMemoryPermissionsRepository::new();
        assert!(matches!(
            repo.add_user_to_role(42, "alice").await,
            Err(PermissionsError::RoleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_role_cascades() {
        let repo = InMemoryPermissionsRepository::new();
        let id = repo.add_role("Viewer").await.unwrap();
        repo.add_user_to_role(id, "bob").await.unwrap();
        repo.update_role_permissions(id, &[grant(1, 1, true)])
            .await
            .unwrap();

        repo.delete_role(id).await.unwrap();

        assert!(repo.get_user_roles("bob").await.unwrap().is_empty());
        assert!(!repo.role_grants(id, 1).await.unwrap());
        assert!(matches!(
            repo.delete_role(id).await,
            Err(PermissionsError::RoleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_find_function_by_names() {
        let repo = InMemoryPermissionsRepository::new();
        let function = repo
            .find_function("Operator", "Add Operator")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(function.id, 9);
        assert_eq!(function.application_section_id, 3);

        assert!(
            repo.find_function("Estate", "Add Operator")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_free_text_role_names() {
        let repo = InMemoryPermissionsRepository::new();
        let id = repo.add_role(" Estate Manager (Read) ").await.unwrap();
        assert_eq!(
            repo.get_role(id).await.unwrap().name,
            "Estate Manager (Read)"
        );
        assert!(repo.add_role("Opérateur").await.is_ok());
    }

    /// Two complete grant sets allowing the even and the odd functions
    fn alternating_sets() -> (Vec<PermissionGrant>, Vec<PermissionGrant>) {
        let pairs: Vec<(i32, i32)> = reference_data()
            .iter()
            .flat_map(|s| s.functions.iter().map(|f| (s.section.id, f.id)))
            .collect();
        let even = pairs
            .iter()
            .map(|&(section, function)| grant(section, function, function % 2 == 0))
            .collect();
        let odd = pairs
            .iter()
            .map(|&(section, function)| grant(section, function, function % 2 == 1))
            .collect();
        (even, odd)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_see_whole_grant_sets_during_replacement() {
        let repo = InMemoryPermissionsRepository::new();
        let id = repo.add_role("Viewer").await.unwrap();
        let (even, odd) = alternating_sets();
        repo.update_role_permissions(id, &even).await.unwrap();

        let writer = {
            let repo = repo.clone();
            let (even, odd) = (even.clone(), odd.clone());
            tokio::spawn(async move {
                for i in 0..200 {
                    let grants = if i % 2 == 0 { &odd } else { &even };
                    repo.update_role_permissions(id, grants).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let repo = repo.clone();
                let (even, odd) = (even.clone(), odd.clone());
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let snapshot: Vec<PermissionGrant> = repo
                            .get_role_permissions(id)
                            .await
                            .unwrap()
                            .iter()
                            .map(RolePermission::grant)
                            .collect();
                        assert!(snapshot == even || snapshot == odd);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_dropped_update_leaves_previous_grants() {
        let repo = InMemoryPermissionsRepository::new();
        let id = repo.add_role("Viewer").await.unwrap();
        repo.update_role_permissions(id, &[grant(1, 1, true)])
            .await
            .unwrap();

        let replacement = [grant(3, 9, true)];
        let reader = repo.state.read().await;
        let pending = repo.update_role_permissions(id, &replacement);
        let outcome = tokio::time::timeout(Duration::from_millis(20), pending).await;
        assert!(outcome.is_err());
        drop(reader);

        assert!(repo.role_grants(id, 1).await.unwrap());
        assert!(!repo.role_grants(id, 9).await.unwrap());
    }
}
