//! Role administration endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::{ApiError, ApiResult, PermissionsError},
    models::{
        ApplicationSection, FunctionId, PermissionGrant, PermissionMatrix, RoleId,
        RolePermission, SectionId,
    },
    state::AppState,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRoleUserRequest {
    pub user_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacePermissionsRequest {
    pub permissions: Vec<PermissionGrant>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TogglePermissionRequest {
    pub section_id: SectionId,
    pub function_id: FunctionId,
}

/// Permission matrix of a role with its distinct sections, for edit screens
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissionsResponse {
    pub role_id: RoleId,
    pub role_name: String,
    pub permissions: Vec<RolePermission>,
    pub sections: Vec<ApplicationSection>,
}

impl RolePermissionsResponse {
    pub fn new(role_id: RoleId, role_name: String, matrix: PermissionMatrix) -> Self {
        let sections = matrix.sections();
        Self {
            role_id,
            role_name,
            permissions: matrix.into_entries(),
            sections,
        }
    }
}

/// All roles; an empty store yields an empty list
pub async fn list_roles(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    match state.repository.get_roles().await {
        Ok(roles) => Ok(Json(roles)),
        Err(PermissionsError::NoRoles) => Ok(Json(Vec::new())),
        Err(e) => Err(e.into()),
    }
}

pub async fn create_role(
    State(state): State<AppState>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = state.repository.add_role(&payload.name).await?;
    let role = state.repository.get_role(id).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.repository.get_role(id).await?))
}

pub async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
) -> ApiResult<impl IntoResponse> {
    state.repository.delete_role(id).await?;
    Ok(Json(json!({"message": "Role deleted successfully"})))
}

pub async fn list_role_users(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.repository.get_role_users(id).await?))
}

pub async fn add_role_user(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
    Json(payload): Json<AddRoleUserRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .repository
        .add_user_to_role(id, &payload.user_name)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "User added to role"})),
    ))
}

pub async fn remove_role_user(
    State(state): State<AppState>,
    Path((id, user_name)): Path<(RoleId, String)>,
) -> ApiResult<impl IntoResponse> {
    state
        .repository
        .remove_user_from_role(id, &user_name)
        .await?;
    Ok(Json(json!({"message": "User removed from role"})))
}

pub(crate) async fn role_permissions_response(
    state: &AppState,
    role_id: RoleId,
) -> ApiResult<RolePermissionsResponse> {
    let role = state.repository.get_role(role_id).await?;
    let matrix = PermissionMatrix::new(state.repository.get_role_permissions(role.id).await?);
    Ok(RolePermissionsResponse::new(role.id, role.name, matrix))
}

pub async fn get_role_permissions(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(role_permissions_response(&state, id).await?))
}

/// Replace the whole grant set of a role
pub async fn replace_role_permissions(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
    Json(payload): Json<ReplacePermissionsRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .repository
        .update_role_permissions(id, &payload.permissions)
        .await?;
    Ok(Json(role_permissions_response(&state, id).await?))
}

/// Flip one grant and submit the complete matrix back
pub async fn toggle_role_permission(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
    Json(payload): Json<TogglePermissionRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut matrix = PermissionMatrix::new(state.repository.get_role_permissions(id).await?);

    matrix
        .toggle(payload.section_id, payload.function_id)
        .ok_or_else(|| {
            ApiError::BadRequest(
                PermissionsError::InvalidGrant {
                    section_id: payload.section_id,
                    function_id: payload.function_id,
                }
                .to_string(),
            )
        })?;

    state
        .repository
        .update_role_permissions(id, &matrix.grants())
        .await?;
    Ok(Json(role_permissions_response(&state, id).await?))
}

pub async fn list_sections(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.repository.list_sections().await?))
}
