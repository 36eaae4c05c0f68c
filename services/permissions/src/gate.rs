//! Authorization gate run before a page renders or an action executes
//!
//! The gate is the only place a denial turns into control flow. The caller
//! passes the user identity explicitly; the HTTP layer reads it from the
//! header set by the upstream login proxy.

use std::sync::Arc;

use axum::{
    Json, async_trait,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use tracing::{error, warn};

use crate::error::ApiError;
use crate::evaluator::{Decision, EvaluationError, PermissionEvaluator};

/// Header carrying the authenticated account name
pub const USER_HEADER: &str = "x-user-name";

/// Account name of the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

impl CurrentUser {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(USER_HEADER)
            .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| CurrentUser(value.to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        CurrentUser::from_headers(&parts.headers).ok_or(ApiError::Unauthorized)
    }
}

/// Result of running the gate for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Allowed,
    Denied { redirect_to: String },
    /// The page declared a function the reference data does not know
    Misconfigured,
}

impl GateOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateOutcome::Allowed)
    }
}

impl IntoResponse for GateOutcome {
    fn into_response(self) -> Response {
        match self {
            GateOutcome::Allowed => StatusCode::NO_CONTENT.into_response(),
            GateOutcome::Denied { redirect_to } => Redirect::to(&redirect_to).into_response(),
            GateOutcome::Misconfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response(),
        }
    }
}

/// Enforcement point shared by every page and action
#[derive(Clone)]
pub struct AuthorizationGate {
    evaluator: Arc<PermissionEvaluator>,
    access_denied_path: Arc<str>,
}

impl AuthorizationGate {
    pub fn new(evaluator: Arc<PermissionEvaluator>, access_denied_path: &str) -> Self {
        Self {
            evaluator,
            access_denied_path: Arc::from(access_denied_path),
        }
    }

    /// Evaluate a check and fail closed on anything but an explicit allow.
    pub async fn authorize(&self, user_name: &str, section: &str, function: &str) -> GateOutcome {
        match self.evaluator.evaluate(user_name, section, function).await {
            Ok(Decision::Allow) => GateOutcome::Allowed,
            Ok(Decision::Deny { reason }) => {
                warn!(user = user_name, section, function, %reason, "access denied");
                self.denied()
            }
            Err(e @ EvaluationError::UnknownFunction { .. }) => {
                error!(
                    user = user_name,
                    section,
                    function,
                    error = %e,
                    "permission configuration error"
                );
                GateOutcome::Misconfigured
            }
            Err(e) => {
                error!(
                    user = user_name,
                    section,
                    function,
                    error = %e,
                    "permission evaluation failed, denying"
                );
                self.denied()
            }
        }
    }

    /// Non-blocking form for showing or hiding UI affordances
    pub async fn can_perform(&self, user_name: &str, section: &str, function: &str) -> bool {
        self.authorize(user_name, section, function)
            .await
            .is_allowed()
    }

    /// Bind the gate to the function a page represents
    pub fn for_function(&self, section: &str, function: &str) -> FunctionGate {
        FunctionGate {
            gate: self.clone(),
            section: Arc::from(section),
            function: Arc::from(function),
        }
    }

    fn denied(&self) -> GateOutcome {
        GateOutcome::Denied {
            redirect_to: self.access_denied_path.to_string(),
        }
    }
}

/// Gate bound at construction to one section/function pair
#[derive(Clone)]
pub struct FunctionGate {
    gate: AuthorizationGate,
    section: Arc<str>,
    function: Arc<str>,
}

impl FunctionGate {
    pub async fn authorize(&self, user_name: &str) -> GateOutcome {
        self.gate
            .authorize(user_name, &self.section, &self.function)
            .await
    }
}

/// Route layer aborting the request unless the caller may perform the bound function
///
/// ```rust,ignore
/// let estates = Router::new()
///     .route("/estate", get(view_estate))
///     .route_layer(middleware::from_fn_with_state(
///         gate.for_function("Estate", "View Estate"),
///         require_function,
///     ));
/// ```
pub async fn require_function(
    State(gate): State<FunctionGate>,
    request: Request,
    next: Next,
) -> Response {
    let user = CurrentUser::from_headers(request.headers());
    let user_name = user.as_ref().map(|u| u.0.as_str()).unwrap_or_default();

    match gate.authorize(user_name).await {
        GateOutcome::Allowed => next.run(request).await,
        outcome => outcome.into_response(),
    }
}
