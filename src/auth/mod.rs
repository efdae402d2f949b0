/*!
 * # Authentication and Authorization Module
 *
 * Requests carry an HS256 bearer token whose claims name the user and the
 * role they act under. Tokens are minted by the identity provider in front
 * of this service; [`AuthService::issue_token`] exists for tooling and
 * tests.
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;

mod rbac;

pub use rbac::*;

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,           // Subject (profile id)
    pub email: Option<String>, // User's email
    pub role: Role,            // Role the user acts under
    pub iat: i64,              // Issued at time
    pub exp: i64,              // Expiration time
    pub iss: String,           // Issuer
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: Role,
}

impl AuthUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.role.has_permission(permission)
    }

    /// Fails with `Forbidden` unless the role grants `permission`
    pub fn require(&self, permission: &str) -> Result<(), ServiceError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "role {} lacks permission {}",
                self.role, permission
            )))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, jwt_issuer: String, access_token_expiration: Duration) -> Self {
        Self {
            jwt_secret,
            jwt_issuer,
            access_token_expiration,
        }
    }

    pub fn from_app_config(cfg: &crate::config::AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            cfg.jwt_issuer.clone(),
            Duration::from_secs(cfg.jwt_expiration_secs),
        )
    }
}

/// Token validation and issuance
#[derive(Debug, Clone)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn issue_token(
        &self,
        user_id: Uuid,
        email: Option<String>,
        role: Role,
    ) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            email,
            role,
            iat: now,
            exp: now + self.config.access_token_expiration.as_secs() as i64,
            iss: self.config.jwt_issuer.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::JwtError(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<AuthUser, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            debug!(error = %e, "rejected bearer token");
            ServiceError::JwtError(e.to_string())
        })?;

        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| ServiceError::Unauthorized("token subject is not a valid id".into()))?;

        Ok(AuthUser {
            user_id,
            email: data.claims.email,
            role: data.claims.role,
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // already validated by the route's auth layer
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }
        let auth = Arc::<AuthService>::from_ref(state);
        authenticate(&parts.headers, &auth)
    }
}

fn authenticate(headers: &HeaderMap, auth: &AuthService) -> Result<AuthUser, ServiceError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ServiceError::Unauthorized("Authentication required".into()))?;
    auth.validate_token(token)
}

/// Authentication middleware. Expects an `Arc<AuthService>` request
/// extension and stores the resolved [`AuthUser`] for later extractors.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(auth) = request.extensions().get::<Arc<AuthService>>().cloned() else {
        return ServiceError::InternalError("Authentication service not available".into())
            .into_response();
    };

    match authenticate(request.headers(), &auth) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Rejects the request unless the authenticated role grants the permission
pub async fn permission_middleware(
    State(required_permission): State<&'static str>,
    request: Request,
    next: Next,
) -> Response {
    let Some(user) = request.extensions().get::<AuthUser>() else {
        return ServiceError::Unauthorized("Authentication required".into()).into_response();
    };

    if let Err(e) = user.require(required_permission) {
        debug!(user_id = %user.user_id, permission = required_permission, "permission denied");
        return e.into_response();
    }

    next.run(request).await
}

/// Type alias used by handlers
pub type AuthenticatedUser = AuthUser;

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &'static str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.route_layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_permission(self, permission: &'static str) -> Self {
        self.route_layer(axum::middleware::from_fn_with_state(
            permission,
            permission_middleware,
        ))
        .with_auth()
    }
}
