//! Pre-shared access code guarding the permission-management routes
//!
//! An operator submits the access code once. It is checked against the
//! configured HMAC-SHA256 hash and exchanged for a cookie of the form
//! `{expires_unix}.{hex_hmac}` that stays valid for the configured lifetime.
//! This guard is independent from the role-based checks.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

use crate::config::AccessCodeSettings;
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the data signed into cookie tokens, keeping them apart from the code hash
const TOKEN_CONTEXT: &str = "access-cookie:";

#[derive(Error, Debug)]
pub enum AccessCodeError {
    #[error("access code hash is not valid hex: {0}")]
    InvalidHash(#[from] hex::FromHexError),

    #[error("access code secret cannot be used as an HMAC key")]
    InvalidSecret,

    #[error("cookie lifetime must be positive")]
    InvalidLifetime,
}

/// Compute the hex hash to configure for a given secret and access code
pub fn hash_access_code(secret: &str, code: &str) -> Result<String, AccessCodeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AccessCodeError::InvalidSecret)?;
    mac.update(code.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies access codes and the cookies issued for them
#[derive(Clone)]
pub struct AccessCodeGuard {
    /// `None` when no secret or hash is configured: every attempt is refused
    mac: Option<HmacSha256>,
    code_hash: Vec<u8>,
    cookie_name: String,
    lifetime: Duration,
    secure_cookie: bool,
}

impl AccessCodeGuard {
    pub fn new(settings: &AccessCodeSettings) -> Result<Self, AccessCodeError> {
        if settings.cookie_lifetime_minutes <= 0 {
            return Err(AccessCodeError::InvalidLifetime);
        }

        let configured = !settings.secret.is_empty() && !settings.code_hash.is_empty();
        let mac = if configured {
            Some(
                HmacSha256::new_from_slice(settings.secret.as_bytes())
                    .map_err(|_| AccessCodeError::InvalidSecret)?,
            )
        } else {
            warn!("No access code configured; permission management is locked");
            None
        };

        let code_hash = if configured {
            hex::decode(settings.code_hash.trim())?
        } else {
            Vec::new()
        };

        Ok(Self {
            mac,
            code_hash,
            cookie_name: settings.cookie_name.clone(),
            lifetime: Duration::minutes(settings.cookie_lifetime_minutes),
            secure_cookie: settings.secure_cookie,
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn sign(&self, data: &str) -> Option<Vec<u8>> {
        let mut mac = self.mac.clone()?;
        mac.update(data.as_bytes());
        Some(mac.finalize().into_bytes().to_vec())
    }

    /// Constant-time comparison of a submitted code with the configured hash
    pub fn verify_code(&self, code: &str) -> bool {
        match self.sign(code) {
            Some(digest) => digest.ct_eq(&self.code_hash).into(),
            None => false,
        }
    }

    /// Token valid until `now + lifetime`
    pub fn issue_token(&self, now: DateTime<Utc>) -> Option<String> {
        let expires = (now + self.lifetime).timestamp().to_string();
        let signature = self.sign(&format!("{}{}", TOKEN_CONTEXT, expires))?;
        Some(format!("{}.{}", expires, hex::encode(signature)))
    }

    pub fn validate_token(&self, token: &str, now: DateTime<Utc>) -> bool {
        let Some((expires, signature)) = token.split_once('.') else {
            return false;
        };
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };
        let Some(expected) = self.sign(&format!("{}{}", TOKEN_CONTEXT, expires)) else {
            return false;
        };
        if !bool::from(expected.ct_eq(&signature)) {
            return false;
        }

        expires
            .parse::<i64>()
            .map(|expires| now.timestamp() < expires)
            .unwrap_or(false)
    }

    /// HttpOnly cookie carrying a fresh token, expiring with it
    pub fn cookie(&self, now: DateTime<Utc>) -> Option<Cookie<'static>> {
        let token = self.issue_token(now)?;
        let secure_flag = if self.secure_cookie { "; Secure" } else { "" };
        let header = format!(
            "{}={}; HttpOnly{}; SameSite=Strict; Path=/; Max-Age={}",
            self.cookie_name,
            token,
            secure_flag,
            self.lifetime.num_seconds()
        );
        Cookie::parse(header).ok()
    }
}

/// Route layer requiring a valid access cookie
pub async fn require_access_code(
    State(guard): State<AccessCodeGuard>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let valid = jar
        .get(guard.cookie_name())
        .map(|cookie| guard.validate_token(cookie.value(), Utc::now()))
        .unwrap_or(false);

    if !valid {
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
