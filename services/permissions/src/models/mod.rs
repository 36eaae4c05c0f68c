//! Permission store models

pub mod matrix;
pub mod role;
pub mod section;

// Re-export for convenience
pub use matrix::PermissionMatrix;
pub use role::{PermissionGrant, Role, RoleId, RolePermission, UserRole};
pub use section::{
    ApplicationSection, Function, FunctionId, SectionId, SectionWithFunctions, reference_data,
};
