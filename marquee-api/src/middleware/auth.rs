use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use marquee_domain::{Principal, Role, ViewerId};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    fn principal(self) -> Result<Principal, AuthError> {
        let role = match self.role.as_str() {
            "viewer" => Role::Viewer,
            "admin" => Role::Admin,
            other => return Err(AuthError::UnknownRole(other.to_string())),
        };
        if self.sub.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(Principal {
            viewer_id: ViewerId::from(self.sub),
            role,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

// ============================================================================
// Principal resolution
// ============================================================================

/// Turns a bearer credential into a verified principal.
pub trait PrincipalResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Result<Principal, AuthError>;
}

pub struct JwtPrincipalResolver {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiration_seconds: u64,
}

impl JwtPrincipalResolver {
    pub fn new(secret: &str, expiration_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiration_seconds,
        }
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, AuthError> {
        let role = match principal.role {
            Role::Viewer => "viewer",
            Role::Admin => "admin",
        };
        let claims = Claims {
            sub: principal.viewer_id.to_string(),
            role: role.to_owned(),
            exp: (Utc::now() + Duration::seconds(self.expiration_seconds as i64)).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| AuthError::Encoding(e.to_string()))
    }
}

impl PrincipalResolver for JwtPrincipalResolver {
    fn resolve(&self, token: &str) -> Result<Principal, AuthError> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AuthError::InvalidToken)?;
        token_data.claims.principal()
    }
}

fn bearer_principal(state: &AppState, req: &Request) -> Result<Principal, AuthError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)?;
    state.principals.resolve(token)
}

// ============================================================================
// Middleware
// ============================================================================

/// Any authenticated caller. Injects the `Principal` into request extensions.
pub async fn viewer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = bearer_principal(&state, &req)?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = bearer_principal(&state, &req)?;
    if !principal.is_admin() {
        return Err(AppError::Authorization("Admin role required".to_string()));
    }
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
