//! Application state shared across handlers

use std::sync::Arc;

use crate::access_code::{AccessCodeError, AccessCodeGuard};
use crate::config::Settings;
use crate::evaluator::PermissionEvaluator;
use crate::gate::AuthorizationGate;
use crate::repositories::PermissionsRepository;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn PermissionsRepository>,
    pub gate: AuthorizationGate,
    pub access_code: AccessCodeGuard,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn PermissionsRepository>,
        settings: &Settings,
    ) -> Result<Self, AccessCodeError> {
        let evaluator = PermissionEvaluator::new(repository.clone(), settings.bypass_permissions);
        let gate = AuthorizationGate::new(Arc::new(evaluator), &settings.access_denied_path);
        let access_code = AccessCodeGuard::new(&settings.access_code)?;

        Ok(Self {
            repository,
            gate,
            access_code,
        })
    }
}
