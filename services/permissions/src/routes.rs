//! Permission service routes

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    access_code::require_access_code,
    error::{ApiError, ApiResult},
    gate::CurrentUser,
    state::AppState,
};

mod admin;
mod tooling;

/// Request for the management access cookie
#[derive(Deserialize)]
pub struct AccessRequest {
    pub code: String,
}

/// Section/function pair named by a gate query
#[derive(Debug, Deserialize)]
pub struct GateQuery {
    pub section: String,
    pub function: String,
}

#[derive(Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
}

/// Create the router for the permission service
pub fn create_router(state: AppState) -> Router {
    let management_routes = Router::new()
        .route("/createRoles", post(tooling::create_roles))
        .route("/addUserToRole", post(tooling::add_users_to_roles))
        .route("/addRolePermissions", post(tooling::add_role_permissions))
        .route("/getRolePermissions", get(tooling::get_role_permissions))
        .route("/roles", get(admin::list_roles).post(admin::create_role))
        .route("/roles/:id", get(admin::get_role).delete(admin::delete_role))
        .route(
            "/roles/:id/users",
            get(admin::list_role_users).post(admin::add_role_user),
        )
        .route("/roles/:id/users/:user_name", delete(admin::remove_role_user))
        .route(
            "/roles/:id/permissions",
            get(admin::get_role_permissions).put(admin::replace_role_permissions),
        )
        .route(
            "/roles/:id/permissions/toggle",
            post(admin::toggle_role_permission),
        )
        .route("/sections", get(admin::list_sections))
        .route_layer(middleware::from_fn_with_state(
            state.access_code.clone(),
            require_access_code,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/access", post(grant_access))
        .route("/access-denied", get(access_denied))
        .route("/check", get(check))
        .route("/authorize", get(authorize))
        .merge(management_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = state.repository.health_check().await.unwrap_or(false);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "service": "permissions-service"
        })),
    )
}

/// Exchange the access code for a time-limited management cookie
pub async fn grant_access(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<AccessRequest>,
) -> ApiResult<impl IntoResponse> {
    if !state.access_code.verify_code(&payload.code) {
        warn!("Rejected permission management access code");
        return Err(ApiError::Unauthorized);
    }

    let cookie = state
        .access_code
        .cookie(Utc::now())
        .ok_or(ApiError::Unauthorized)?;
    info!("Granted permission management access");

    Ok((
        jar.add(cookie),
        Json(json!({"message": "Access granted"})),
    ))
}

/// Destination of denied page requests
pub async fn access_denied() -> impl IntoResponse {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"error": "You do not have access to this page"})),
    )
}

/// Whether the caller may perform a function, without blocking
pub async fn check(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
    Query(query): Query<GateQuery>,
) -> impl IntoResponse {
    let user_name = user.map(|u| u.0).unwrap_or_default();
    let allowed = state
        .gate
        .can_perform(&user_name, &query.section, &query.function)
        .await;

    Json(CheckResponse { allowed })
}

/// Blocking check: 204 when allowed, redirect to the denial page otherwise
pub async fn authorize(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
    Query(query): Query<GateQuery>,
) -> impl IntoResponse {
    let user_name = user.map(|u| u.0).unwrap_or_default();
    state
        .gate
        .authorize(&user_name, &query.section, &query.function)
        .await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::access_code::hash_access_code;
    use crate::config::{AccessCodeSettings, Settings, StoreKind};
    use crate::gate::USER_HEADER;
    use crate::repositories::{InMemoryPermissionsRepository, PermissionsRepository};
    use axum::body::Body;
    use axum::http::{Request, header};
    use std::sync::Arc;
    use tower::ServiceExt;

    pub(crate) const SECRET: &str = "route-test-secret";
    pub(crate) const CODE: &str = "let-me-in";

    pub(crate) fn settings(bypass: bool) -> Settings {
        Settings {
            listen_addr: "127.0.0.1:0".to_string(),
            store: StoreKind::Memory,
            bypass_permissions: bypass,
            access_denied_path: "/access-denied".to_string(),
            access_code: AccessCodeSettings {
                secret: SECRET.to_string(),
                code_hash: hash_access_code(SECRET, CODE).unwrap(),
                cookie_name: "permissions_access".to_string(),
                cookie_lifetime_minutes: 30,
                secure_cookie: true,
            },
        }
    }

    pub(crate) fn app_with(repo: Arc<InMemoryPermissionsRepository>, bypass: bool) -> Router {
        let state = AppState::new(repo, &settings(bypass)).unwrap();
        create_router(state)
    }

    pub(crate) async fn read_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Obtain the management cookie as `name=value`
    pub(crate) async fn access_cookie(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(
                Request::post("/access")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({"code": CODE}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    fn gate_request(path: &str, user: &str) -> Request<Body> {
        Request::get(path)
            .header(USER_HEADER, user)
            .body(Body::empty())
            .unwrap()
    }

    async fn bob_viewer() -> Arc<InMemoryPermissionsRepository> {
        let repo = Arc::new(InMemoryPermissionsRepository::new());
        let viewer = repo.add_role("Viewer").await.unwrap();
        repo.update_role_permissions(
            viewer,
            &[crate::models::PermissionGrant {
                section_id: 1,
                function_id: 1,
                has_access: true,
            }],
        )
        .await
        .unwrap();
        repo.add_user_to_role(viewer, "bob").await.unwrap();
        repo
    }

    #[tokio::test]
    async fn test_health() {
        let app = app_with(Arc::new(InMemoryPermissionsRepository::new()), false);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_check_reports_affordances() {
        let app = app_with(bob_viewer().await, false);

        let response = app
            .clone()
            .oneshot(gate_request(
                "/check?section=Estate&function=View%20Estate",
                "bob",
            ))
            .await
            .unwrap();
        assert_eq!(read_json(response).await["allowed"], true);

        let response = app
            .oneshot(gate_request(
                "/check?section=Operator&function=Add%20Operator",
                "bob",
            ))
            .await
            .unwrap();
        assert_eq!(read_json(response).await["allowed"], false);
    }

    #[tokio::test]
    async fn test_authorize_redirects_on_deny() {
        let app = app_with(bob_viewer().await, false);

        let allowed = app
            .clone()
            .oneshot(gate_request(
                "/authorize?section=Estate&function=View%20Estate",
                "bob",
            ))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::NO_CONTENT);

        let denied = app
            .clone()
            .oneshot(gate_request(
                "/authorize?section=Estate&function=Edit%20Estate",
                "bob",
            ))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            denied.headers().get(header::LOCATION).unwrap(),
            "/access-denied"
        );

        let misconfigured = app
            .oneshot(gate_request(
                "/authorize?section=Estate&function=Sell%20Estate",
                "bob",
            ))
            .await
            .unwrap();
        assert_eq!(misconfigured.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_bypass_allows_unknown_users() {
        let app = app_with(Arc::new(InMemoryPermissionsRepository::new()), true);
        let response = app
            .oneshot(gate_request(
                "/authorize?section=Estate&function=Edit%20Estate",
                "nobody",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_wrong_access_code_is_rejected() {
        let app = app_with(Arc::new(InMemoryPermissionsRepository::new()), false);
        let response = app
            .oneshot(
                Request::post("/access")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({"code": "guess"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_management_requires_access_cookie() {
        let app = app_with(Arc::new(InMemoryPermissionsRepository::new()), false);

        let response = app
            .clone()
            .oneshot(Request::get("/roles").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let cookie = access_cookie(&app).await;
        let response = app
            .oneshot(
                Request::get("/roles")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!([]));
    }
}
