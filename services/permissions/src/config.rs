//! Service settings
//!
//! Settings come from built-in defaults overridden by environment variables
//! prefixed with `PERMISSIONS_`; nested keys use `__`, for example
//! `PERMISSIONS_ACCESS_CODE__SECRET`. Store connection settings are read by
//! `common::database::DatabaseConfig`.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Backing store of the permission repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Postgres,
    /// Not durable, for local development
    Memory,
}

/// Pre-shared access code protecting the management routes
#[derive(Debug, Clone, Deserialize)]
pub struct AccessCodeSettings {
    pub secret: String,
    /// Hex HMAC-SHA256 of the access code keyed by `secret`
    pub code_hash: String,
    pub cookie_name: String,
    pub cookie_lifetime_minutes: i64,
    /// Mark the cookie `Secure`; turn off only for plain-HTTP development
    pub secure_cookie: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub listen_addr: String,
    pub store: StoreKind,
    /// Allow every permission check; local development only
    pub bypass_permissions: bool,
    pub access_denied_path: String,
    pub access_code: AccessCodeSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("listen_addr", "0.0.0.0:3000")?
            .set_default("store", "postgres")?
            .set_default("bypass_permissions", false)?
            .set_default("access_denied_path", "/access-denied")?
            .set_default("access_code.secret", "")?
            .set_default("access_code.code_hash", "")?
            .set_default("access_code.cookie_name", "permissions_access")?
            .set_default("access_code.cookie_lifetime_minutes", 30)?
            .set_default("access_code.secure_cookie", true)?
            .add_source(
                Environment::with_prefix("PERMISSIONS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "PERMISSIONS_LISTEN_ADDR",
        "PERMISSIONS_STORE",
        "PERMISSIONS_BYPASS_PERMISSIONS",
        "PERMISSIONS_ACCESS_CODE__SECRET",
        "PERMISSIONS_ACCESS_CODE__COOKIE_LIFETIME_MINUTES",
    ];

    fn clear() {
        for var in VARS {
            unsafe {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.listen_addr, "0.0.0.0:3000");
        assert_eq!(settings.store, StoreKind::Postgres);
        assert!(!settings.bypass_permissions);
        assert_eq!(settings.access_denied_path, "/access-denied");
        assert_eq!(settings.access_code.cookie_name, "permissions_access");
        assert_eq!(settings.access_code.cookie_lifetime_minutes, 30);
        assert!(settings.access_code.secure_cookie);
        assert!(settings.access_code.secret.is_empty());
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        clear();
        unsafe {
            std::env::set_var("PERMISSIONS_STORE", "memory");
            std::env::set_var("PERMISSIONS_BYPASS_PERMISSIONS", "true");
            std::env::set_var("PERMISSIONS_ACCESS_CODE__SECRET", "s3cret");
            std::env::set_var("PERMISSIONS_ACCESS_CODE__COOKIE_LIFETIME_MINUTES", "5");
        }

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.store, StoreKind::Memory);
        assert!(settings.bypass_permissions);
        assert_eq!(settings.access_code.secret, "s3cret");
        assert_eq!(settings.access_code.cookie_lifetime_minutes, 5);

        clear();
    }
}
