//! Permission evaluation: may a user perform a function within a section?

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::error::PermissionsError;
use crate::repositories::PermissionsRepository;

/// Outcome of a permission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// The reason is meant for logs, not for the end user.
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// A check that could not be answered; callers must treat it as a denial.
#[derive(Error, Debug)]
pub enum EvaluationError {
    /// The page asked for a section/function pair missing from the reference data
    #[error("unknown function '{function}' in section '{section}'")]
    UnknownFunction { section: String, function: String },

    #[error("a user name is required")]
    InvalidUser,

    #[error("permission store unavailable: {0}")]
    Store(#[from] PermissionsError),
}

/// Resolves a user's roles and unions their grants.
pub struct PermissionEvaluator {
    repository: Arc<dyn PermissionsRepository>,
    bypass: bool,
}

impl PermissionEvaluator {
    pub fn new(repository: Arc<dyn PermissionsRepository>, bypass: bool) -> Self {
        Self { repository, bypass }
    }

    /// Decide whether `user_name` may perform `function` in `section`.
    ///
    /// One granting role is enough. A user holding no role is denied. With the
    /// bypass switch on every check is allowed without reading the store.
    pub async fn evaluate(
        &self,
        user_name: &str,
        section: &str,
        function: &str,
    ) -> Result<Decision, EvaluationError> {
        if self.bypass {
            debug!(user = user_name, section, function, "permission bypass active");
            return Ok(Decision::Allow);
        }

        let user_name = user_name.trim();
        if user_name.is_empty() {
            return Err(EvaluationError::InvalidUser);
        }

        let target = self
            .repository
            .find_function(section, function)
            .await?
            .ok_or_else(|| EvaluationError::UnknownFunction {
                section: section.to_string(),
                function: function.to_string(),
            })?;

        let roles = self.repository.get_user_roles(user_name).await?;
        if roles.is_empty() {
            return Ok(Decision::Deny {
                reason: format!("user '{}' holds no roles", user_name),
            });
        }

        for role in &roles {
            if self.repository.role_grants(role.id, target.id).await? {
                debug!(
                    user = user_name,
                    section,
                    function,
                    role = %role.name,
                    "permission granted"
                );
                return Ok(Decision::Allow);
            }
        }

        let held: Vec<&str> = roles.iter().map(|r| r.name.as_str()).collect();
        Ok(Decision::Deny {
            reason: format!(
                "none of the roles [{}] held by '{}' grant '{}/{}'",
                held.join(", "),
                user_name,
                section,
                function
            ),
        })
    }
}
