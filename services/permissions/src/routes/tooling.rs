//! Bulk provisioning endpoints consumed by external scripts
//!
//! Each batch entry is processed on its own: a duplicate or unknown role is
//! reported for that entry and the rest of the batch proceeds. Store failures
//! abort the request.

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::admin::role_permissions_response;
use crate::{
    error::{ApiResult, PermissionsError},
    models::{PermissionGrant, RoleId},
    state::AppState,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRole {
    pub role_id: RoleId,
    pub role_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUserRequest {
    pub role_name: String,
    pub user_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUserResult {
    pub role_name: String,
    pub user_name: String,
    pub added: bool,
    pub error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissionsRequest {
    pub role_name: String,
    pub permissions: Vec<PermissionGrant>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissionsResult {
    pub role_name: String,
    pub updated: bool,
    pub error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleNameQuery {
    pub role_name: String,
}

/// Keep per-entry failures as a message; store failures end the request.
fn entry_error(err: PermissionsError) -> ApiResult<String> {
    match err {
        PermissionsError::Store(_) => Err(err.into()),
        other => Ok(other.to_string()),
    }
}

/// Create roles by name, silently skipping names already taken
pub async fn create_roles(
    State(state): State<AppState>,
    Json(names): Json<Vec<String>>,
) -> ApiResult<impl IntoResponse> {
    let mut created = Vec::with_capacity(names.len());

    for name in &names {
        match state.repository.add_role(name).await {
            Ok(role_id) => created.push(CreatedRole {
                role_id,
                role_name: name.trim().to_string(),
            }),
            Err(PermissionsError::DuplicateRoleName(existing)) => {
                info!("Skipping existing role {}", existing);
            }
            Err(err) => {
                let message = entry_error(err)?;
                warn!("Skipping role {:?}: {}", name, message);
            }
        }
    }

    Ok(Json(created))
}

/// Add memberships given as role name / user name pairs
pub async fn add_users_to_roles(
    State(state): State<AppState>,
    Json(pairs): Json<Vec<RoleUserRequest>>,
) -> ApiResult<impl IntoResponse> {
    let mut results = Vec::with_capacity(pairs.len());

    for pair in pairs {
        let outcome = match state.repository.get_role_by_name(&pair.role_name).await {
            Ok(role) => state
                .repository
                .add_user_to_role(role.id, &pair.user_name)
                .await,
            Err(err) => Err(err),
        };

        let error = match outcome {
            Ok(()) => None,
            Err(err) => Some(entry_error(err)?),
        };

        results.push(RoleUserResult {
            added: error.is_none(),
            role_name: pair.role_name,
            user_name: pair.user_name,
            error,
        });
    }

    Ok(Json(results))
}

/// Replace the permission matrix of each named role
pub async fn add_role_permissions(
    State(state): State<AppState>,
    Json(requests): Json<Vec<RolePermissionsRequest>>,
) -> ApiResult<impl IntoResponse> {
    let mut results = Vec::with_capacity(requests.len());

    for request in requests {
        let outcome = match state.repository.get_role_by_name(&request.role_name).await {
            Ok(role) => {
                state
                    .repository
                    .update_role_permissions(role.id, &request.permissions)
                    .await
            }
            Err(err) => Err(err),
        };

        let error = match outcome {
            Ok(()) => None,
            Err(err) => Some(entry_error(err)?),
        };

        results.push(RolePermissionsResult {
            updated: error.is_none(),
            role_name: request.role_name,
            error,
        });
    }

    Ok(Json(results))
}

/// Full grant matrix of a role looked up by name, with its distinct sections
pub async fn get_role_permissions(
    State(state): State<AppState>,
    Query(query): Query<RoleNameQuery>,
) -> ApiResult<impl IntoResponse> {
    let role = state.repository.get_role_by_name(&query.role_name).await?;
    let response = role_permissions_response(&state, role.id).await?;
    Ok(Json(response))
}
