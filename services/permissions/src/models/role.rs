//! Role model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::section::{ApplicationSection, Function, FunctionId, SectionId};

pub type RoleId = i32;

/// Role entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// User role association
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserRole {
    pub id: i32,
    pub role_id: RoleId,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
}

/// One grant decision submitted for a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub section_id: SectionId,
    pub function_id: FunctionId,
    pub has_access: bool,
}

/// Current grant flag of a role for one section/function pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermission {
    pub section: ApplicationSection,
    pub function: Function,
    pub has_access: bool,
}

impl RolePermission {
    pub fn grant(&self) -> PermissionGrant {
        PermissionGrant {
            section_id: self.section.id,
            function_id: self.function.id,
            has_access: self.has_access,
        }
    }
}
