use std::time::{Duration, SystemTime};

use axum::http::{header, HeaderMap};
use josekit::jws::{JwsHeader, HS256};
use josekit::jwt::{self, JwtPayload};
use rand::RngCore;
use serde_json::Value;
use thiserror::Error;

use crate::errors::ServiceError;
use crate::settings::SessionSettings;

const MIN_SECRET_LEN: usize = 32;
const ROLE_CLAIM: &str = "role";

/// An authenticated principal as carried by the session token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub uid: String,
    /// Role name as issued. Not validated here: unknown roles are simply
    /// denied by the permission table.
    pub role: String,
    pub expires: SystemTime,
}

impl Session {
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no session token presented")]
    Missing,
    #[error("session token rejected: {0}")]
    Invalid(String),
    #[error("session token lacks claim `{0}`")]
    MissingClaim(&'static str),
    #[error("session expired")]
    Expired,
}

/// Turns a presented token into a [`Session`]. Implementations must not
/// check expiry against a clock; the gate does that with its own `now`.
pub trait SessionVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Session, SessionError>;
}

/// HS256-signed JWT sessions: `sub` is the uid, `role` the role name.
pub struct JwtSessions {
    secret: Vec<u8>,
    ttl: Duration,
}

impl JwtSessions {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Result<Self, ServiceError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(ServiceError::Session(format!(
                "secret must be at least {MIN_SECRET_LEN} bytes, got {}",
                secret.len()
            )));
        }
        Ok(Self { secret, ttl })
    }

    /// Build from settings, generating a throwaway secret when none is set.
    /// Tokens signed with a generated secret do not survive a restart.
    pub fn from_settings(settings: &SessionSettings) -> Result<Self, ServiceError> {
        let ttl = Duration::from_secs(settings.ttl_secs);
        match &settings.secret {
            Some(secret) => Self::new(secret.as_bytes().to_vec(), ttl),
            None => {
                tracing::warn!(
                    "No session secret configured; generated an ephemeral one. Set CLAIMGATE__AUTHZ__SESSION__SECRET to share sessions with the issuer"
                );
                Self::new(random_secret(), ttl)
            }
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `uid` with `role`, valid for the configured ttl.
    pub fn issue(&self, uid: &str, role: &str) -> Result<String, ServiceError> {
        self.issue_until(uid, role, SystemTime::now() + self.ttl)
    }

    pub fn issue_until(
        &self,
        uid: &str,
        role: &str,
        expires: SystemTime,
    ) -> Result<String, ServiceError> {
        let mut payload = JwtPayload::new();
        payload.set_subject(uid);
        payload.set_issued_at(&SystemTime::now());
        payload.set_expires_at(&expires);
        payload.set_claim(ROLE_CLAIM, Some(Value::String(role.to_string())))?;

        let mut header = JwsHeader::new();
        header.set_token_type("JWT");

        let signer = HS256.signer_from_bytes(&self.secret)?;
        let token = jwt::encode_with_signer(&payload, &header, &signer)?;
        Ok(token)
    }
}

impl SessionVerifier for JwtSessions {
    fn verify(&self, token: &str) -> Result<Session, SessionError> {
        let verifier = HS256
            .verifier_from_bytes(&self.secret)
            .map_err(|e| SessionError::Invalid(e.to_string()))?;
        let (payload, _header) = jwt::decode_with_verifier(token, &verifier)
            .map_err(|e| SessionError::Invalid(e.to_string()))?;

        let uid = payload
            .subject()
            .filter(|s| !s.is_empty())
            .ok_or(SessionError::MissingClaim("sub"))?
            .to_string();
        let role = payload
            .claim(ROLE_CLAIM)
            .and_then(Value::as_str)
            .ok_or(SessionError::MissingClaim(ROLE_CLAIM))?
            .to_string();
        let expires = payload
            .expires_at()
            .ok_or(SessionError::MissingClaim("exp"))?;

        Ok(Session { uid, role, expires })
    }
}

fn random_secret() -> Vec<u8> {
    let mut bytes = vec![0u8; 48];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Session token from the named cookie, falling back to a bearer token.
pub fn token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    cookie_token(headers, cookie_name).or_else(|| bearer_token(headers))
}

fn cookie_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            (name == cookie_name && !value.is_empty()).then(|| value.to_string())
        })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}
