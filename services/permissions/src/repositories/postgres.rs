//! PostgreSQL permission repository

use std::collections::HashMap;

use async_trait::async_trait;
use common::error::DatabaseError;
use sqlx::{PgPool, Row, migrate::Migrator};
use tracing::info;

use super::{PermissionsRepository, dedup_grants};
use crate::error::{PermissionsError, PermissionsResult};
use crate::models::{
    ApplicationSection, Function, FunctionId, PermissionGrant, Role, RoleId, RolePermission,
    SectionId, SectionWithFunctions,
};
use crate::validation;

/// Schema and reference data of the permission store
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Permission repository backed by PostgreSQL
#[derive(Clone)]
pub struct PostgresPermissionsRepository {
    pool: PgPool,
}

impl PostgresPermissionsRepository {
    /// Create a new permission repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_role(&self, role_id: RoleId) -> PermissionsResult<()> {
        let exists: Option<i32> = sqlx::query_scalar("SELECT id FROM roles WHERE id = $1")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?;

        exists
            .map(|_| ())
            .ok_or_else(|| PermissionsError::RoleNotFound(role_id.to_string()))
    }
}

#[async_trait]
impl PermissionsRepository for PostgresPermissionsRepository {
    async fn add_role(&self, name: &str) -> PermissionsResult<RoleId> {
        let name = validation::role_name(name)?;
        info!("Creating role: {}", name);

        let result = sqlx::query_scalar::<_, RoleId>(
            r#"
            INSERT INTO roles (name)
            VALUES ($1)
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(id) => Ok(id),
            Err(e) => {
                let err = DatabaseError::from(e);
                if err.is_unique_violation() {
                    Err(PermissionsError::DuplicateRoleName(name.to_string()))
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn get_role(&self, role_id: RoleId) -> PermissionsResult<Role> {
        sqlx::query_as::<_, Role>("SELECT id, name, created_at FROM roles WHERE id = $1")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PermissionsError::RoleNotFound(role_id.to_string()))
    }

    async fn get_role_by_name(&self, name: &str) -> PermissionsResult<Role> {
        let name = name.trim();
        sqlx::query_as::<_, Role>("SELECT id, name, created_at FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PermissionsError::RoleNotFound(name.to_string()))
    }

    async fn get_roles(&self) -> PermissionsResult<Vec<Role>> {
        let roles =
            sqlx::query_as::<_, Role>("SELECT id, name, created_at FROM roles ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        if roles.is_empty() {
            return Err(PermissionsError::NoRoles);
        }
        Ok(roles)
    }

    async fn delete_role(&self, role_id: RoleId) -> PermissionsResult<()> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i32> =
            sqlx::query_scalar("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
                .bind(role_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(PermissionsError::RoleNotFound(role_id.to_string()));
        }

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM user_roles WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Deleted role {}", role_id);
        Ok(())
    }

    async fn get_role_permissions(
        &self,
        role_id: RoleId,
    ) -> PermissionsResult<Vec<RolePermission>> {
        self.ensure_role(role_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT s.id AS section_id, s.name AS section_name,
                   f.id AS function_id, f.name AS function_name,
                   COALESCE(rp.has_access, FALSE) AS has_access
            FROM functions f
            JOIN application_sections s ON s.id = f.application_section_id
            LEFT JOIN role_permissions rp ON rp.function_id = f.id AND rp.role_id = $1
            ORDER BY s.id, f.id
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;

        let permissions = rows
            .into_iter()
            .map(|row| {
                let section_id: SectionId = row.get("section_id");
                RolePermission {
                    section: ApplicationSection {
                        id: section_id,
                        name: row.get("section_name"),
                    },
                    function: Function {
                        id: row.get("function_id"),
                        application_section_id: section_id,
                        name: row.get("function_name"),
                    },
                    has_access: row.get("has_access"),
                }
            })
            .collect();

        Ok(permissions)
    }

    async fn update_role_permissions(
        &self,
        role_id: RoleId,
        grants: &[PermissionGrant],
    ) -> PermissionsResult<()> {
        let grants = dedup_grants(grants);

        // Dropping the transaction before commit rolls it back, so an early
        // return or a cancelled request leaves the previous grant set intact.
        let mut tx = self.pool.begin().await?;

        let locked: Option<i32> =
            sqlx::query_scalar("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
                .bind(role_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(PermissionsError::RoleNotFound(role_id.to_string()));
        }

        let known: HashMap<FunctionId, SectionId> =
            sqlx::query_as::<_, (FunctionId, SectionId)>(
                "SELECT id, application_section_id FROM functions",
            )
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();

        if let Some(invalid) = grants
            .iter()
            .find(|g| known.get(&g.function_id) != Some(&g.section_id))
        {
            return Err(PermissionsError::InvalidGrant {
                section_id: invalid.section_id,
                function_id: invalid.function_id,
            });
        }

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        let function_ids: Vec<FunctionId> = grants.iter().map(|g| g.function_id).collect();
        let flags: Vec<bool> = grants.iter().map(|g| g.has_access).collect();

        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, function_id, has_access)
            SELECT $1, grant_row.function_id, grant_row.has_access
            FROM UNNEST($2::INTEGER[], $3::BOOLEAN[]) AS grant_row (function_id, has_access)
            "#,
        )
        .bind(role_id)
        .bind(&function_ids)
        .bind(&flags)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Replaced permissions of role {} with {} grants ({} allowed)",
            role_id,
            grants.len(),
            flags.iter().filter(|f| **f).count()
        );
        Ok(())
    }

    async fn add_user_to_role(&self, role_id: RoleId, user_name: &str) -> PermissionsResult<()> {
        let user_name = validation::user_name(user_name)?;

        // The share lock holds off a concurrent delete_role until the
        // membership is committed, so the delete cascade sees it.
        let mut tx = self.pool.begin().await?;

        let locked: Option<i32> =
            sqlx::query_scalar("SELECT id FROM roles WHERE id = $1 FOR SHARE")
                .bind(role_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(PermissionsError::RoleNotFound(role_id.to_string()));
        }

        let result = sqlx::query("INSERT INTO user_roles (role_id, user_name) VALUES ($1, $2)")
            .bind(role_id)
            .bind(user_name)
            .execute(&mut *tx)
            .await;

        match result {
            Ok(_) => {
                tx.commit().await?;
                info!("Added user {} to role {}", user_name, role_id);
                Ok(())
            }
            Err(e) => {
                let err = DatabaseError::from(e);
                if err.is_unique_violation() {
                    Err(PermissionsError::DuplicateMembership {
                        role_id,
                        user_name: user_name.to_string(),
                    })
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn remove_user_from_role(
        &self,
        role_id: RoleId,
        user_name: &str,
    ) -> PermissionsResult<()> {
        let user_name = user_name.trim();
        let deleted = sqlx::query("DELETE FROM user_roles WHERE role_id = $1 AND user_name = $2")
            .bind(role_id)
            .bind(user_name)
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(PermissionsError::MembershipNotFound {
                role_id,
                user_name: user_name.to_string(),
            });
        }

        info!("Removed user {} from role {}", user_name, role_id);
        Ok(())
    }

    async fn get_role_users(&self, role_id: RoleId) -> PermissionsResult<Vec<String>> {
        self.ensure_role(role_id).await?;

        let users = sqlx::query_scalar(
            "SELECT user_name FROM user_roles WHERE role_id = $1 ORDER BY user_name",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn get_user_roles(&self, user_name: &str) -> PermissionsResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.name, r.created_at
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_name = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_name.trim())
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    async fn list_sections(&self) -> PermissionsResult<Vec<SectionWithFunctions>> {
        let sections = sqlx::query_as::<_, ApplicationSection>(
            "SELECT id, name FROM application_sections ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut functions = sqlx::query_as::<_, Function>(
            "SELECT id, application_section_id, name FROM functions ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(sections
            .into_iter()
            .map(|section| {
                let (own, rest): (Vec<Function>, Vec<Function>) = functions
                    .drain(..)
                    .partition(|f| f.application_section_id == section.id);
                functions = rest;
                SectionWithFunctions {
                    section,
                    functions: own,
                }
            })
            .collect())
    }

    async fn find_function(
        &self,
        section_name: &str,
        function_name: &str,
    ) -> PermissionsResult<Option<Function>> {
        let function = sqlx::query_as::<_, Function>(
            r#"
            SELECT f.id, f.application_section_id, f.name
            FROM functions f
            JOIN application_sections s ON s.id = f.application_section_id
            WHERE s.name = $1 AND f.name = $2
            "#,
        )
        .bind(section_name)
        .bind(function_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(function)
    }

    async fn role_grants(
        &self,
        role_id: RoleId,
        function_id: FunctionId,
    ) -> PermissionsResult<bool> {
        let has_access: Option<bool> = sqlx::query_scalar(
            "SELECT has_access FROM role_permissions WHERE role_id = $1 AND function_id = $2",
        )
        .bind(role_id)
        .bind(function_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(has_access.unwrap_or(false))
    }

    async fn health_check(&self) -> PermissionsResult<bool> {
        Ok(common::database::health_check(&self.pool).await?)
    }
}
