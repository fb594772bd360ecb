//! Authentication Module
//!
//! Two authentication surfaces share a single post-condition: producing a
//! principal that carries tenant context.
//!
//! 1. **Data plane** - `Authorization: Bearer loom_sk_*` API keys on the
//!    chat endpoint; the key hash is the lookup index and the resulting
//!    [`RequestPrincipal`] carries the resolved effective configuration.
//! 2. **Portal plane** - HS256 bearer tokens signed with the portal secret
//!    carrying `{sub, tenant_id, role}` claims, expiry defaulting to 24 h.

use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use crate::resolver;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use loom_core::{Agent, EffectiveConfig, Tenant, TenantId, TenantRole, TenantStatus, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

// ============================================================================
// JWT SECRET (TYPE-SAFE)
// ============================================================================

const INSECURE_DEFAULT: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

/// Type-safe JWT secret that prevents accidental logging.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        let secret: String = secret.into();
        let normalized = if secret.trim().is_empty() {
            INSECURE_DEFAULT.to_string()
        } else {
            secret
        };
        Self(SecretString::new(normalized.into()))
    }

    /// Expose the secret value (only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Get the length of the secret without exposing it.
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    /// Check if the secret is the insecure default.
    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration for both planes.
#[derive(Clone)]
pub struct AuthConfig {
    /// Signing secret for portal bearer tokens.
    pub portal_secret: JwtSecret,

    /// Signing secret for admin-plane tokens; the admin surface itself
    /// lives outside this service.
    pub admin_secret: Option<JwtSecret>,

    /// Portal token expiry in seconds (default: 24 h).
    pub token_expiry_secs: i64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("portal_secret", &self.portal_secret)
            .field(
                "admin_secret",
                &self.admin_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_expiry_secs", &self.token_expiry_secs)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            portal_secret: JwtSecret::new(INSECURE_DEFAULT),
            admin_secret: None,
            token_expiry_secs: 86_400,
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `PORTAL_JWT_SECRET`: portal bearer-token signing secret
    /// - `ADMIN_JWT_SECRET`: admin-plane signing secret
    /// - `LOOM_TOKEN_EXPIRY_SECS`: portal token lifetime (default: 86400)
    pub fn from_env() -> Self {
        Self {
            portal_secret: JwtSecret::new(
                std::env::var("PORTAL_JWT_SECRET").unwrap_or_default(),
            ),
            admin_secret: std::env::var("ADMIN_JWT_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(JwtSecret::new),
            token_expiry_secs: std::env::var("LOOM_TOKEN_EXPIRY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(86_400),
        }
    }

    /// Log startup warnings for weak or missing secrets.
    pub fn warn_on_weak_secrets(&self) {
        if self.portal_secret.is_insecure_default() {
            tracing::warn!(
                "PORTAL_JWT_SECRET is unset; using an insecure default. \
                 Set it to a random value of at least 32 characters before deploying."
            );
        } else if self.portal_secret.len() < 32 {
            tracing::warn!(
                length = self.portal_secret.len(),
                "PORTAL_JWT_SECRET is short; use at least 32 characters"
            );
        }
        if self.admin_secret.is_none() {
            tracing::warn!("ADMIN_JWT_SECRET is unset; admin-plane tokens cannot be verified");
        }
    }
}

// ============================================================================
// PORTAL CLAIMS
// ============================================================================

/// Claims carried by portal bearer tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Tenant the token was issued for
    pub tenant_id: String,

    /// Role of the user within that tenant
    pub role: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl PortalClaims {
    pub fn new(user_id: UserId, tenant_id: TenantId, role: TenantRole, expiry_secs: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            role: role.as_db_str().to_string(),
            iat: now,
            exp: now + expiry_secs,
        }
    }
}

/// Authenticated portal context, injected into request extensions.
#[derive(Debug, Clone)]
pub struct PortalContext {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub role: TenantRole,
}

impl PortalContext {
    fn from_claims(claims: &PortalClaims) -> ApiResult<Self> {
        let user_id = claims
            .sub
            .parse()
            .map_err(|_| ApiError::unauthorized("Token subject is not a valid user id"))?;
        let tenant_id = claims
            .tenant_id
            .parse()
            .map_err(|_| ApiError::unauthorized("Token tenant is not a valid tenant id"))?;
        Ok(Self {
            user_id,
            tenant_id,
            // Unknown roles fold into member
            role: TenantRole::from_claim(&claims.role),
        })
    }

    /// Guard used by mutating portal handlers.
    pub fn require_owner(&self) -> ApiResult<()> {
        if self.role.is_owner() {
            Ok(())
        } else {
            Err(ApiError::forbidden("This operation requires the owner role"))
        }
    }
}

// ============================================================================
// TOKEN GENERATION / VALIDATION
// ============================================================================

/// Generate a signed portal bearer token.
pub fn generate_portal_token(
    config: &AuthConfig,
    user_id: UserId,
    tenant_id: TenantId,
    role: TenantRole,
) -> ApiResult<String> {
    let claims = PortalClaims::new(user_id, tenant_id, role, config.token_expiry_secs);
    sign_claims(&config.portal_secret, &claims)
}

fn sign_claims(secret: &JwtSecret, claims: &PortalClaims) -> ApiResult<String> {
    let encoding_key = EncodingKey::from_secret(secret.expose().as_bytes());
    encode(&Header::new(Algorithm::HS256), claims, &encoding_key)
        .map_err(|e| ApiError::internal(format!("Failed to generate token: {}", e)))
}

/// Validate a portal bearer token and produce the request context.
///
/// Fails `Unauthorized` on bad signature, malformed claims or expiry.
pub fn validate_portal_token(config: &AuthConfig, token: &str) -> ApiResult<PortalContext> {
    let claims = decode_claims(&config.portal_secret, token)?;
    PortalContext::from_claims(&claims)
}

/// Validate an admin-plane token. The admin surface is external to this
/// service; verification is exposed for it through the portal boundary.
pub fn validate_admin_token(config: &AuthConfig, token: &str) -> ApiResult<PortalClaims> {
    let secret = config
        .admin_secret
        .as_ref()
        .ok_or_else(|| ApiError::unauthorized("Admin plane is not configured"))?;
    decode_claims(secret, token)
}

fn decode_claims(secret: &JwtSecret, token: &str) -> ApiResult<PortalClaims> {
    let decoding_key = DecodingKey::from_secret(secret.expose().as_bytes());
    let validation = Validation::new(Algorithm::HS256);

    decode::<PortalClaims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                ApiError::unauthorized("Token has expired")
            }
            _ => ApiError::unauthorized("Invalid bearer token"),
        })
}

/// Extract the raw token from an `Authorization: Bearer ...` header value.
pub fn bearer_token(header_value: &str) -> ApiResult<&str> {
    header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Authorization header must use Bearer scheme"))
}

// ============================================================================
// DATA-PLANE PRINCIPAL
// ============================================================================

/// The authenticated principal of one data-plane request: the owning tenant
/// and agent plus the resolved effective configuration.
#[derive(Debug, Clone)]
pub struct RequestPrincipal {
    pub tenant: Tenant,
    pub agent: Agent,
    pub api_key_id: loom_core::ApiKeyId,
    pub effective: EffectiveConfig,
}

/// Authenticate a raw `loom_sk_*` key and resolve its effective config.
///
/// Steps: hash the key, look it up with status = active, load the owning
/// agent and tenant, reject suspended tenants, then walk the inheritance
/// chain.
pub async fn authenticate_api_key(
    db: &DbClient,
    openai_fallback: Option<&str>,
    raw_key: &str,
) -> ApiResult<RequestPrincipal> {
    let hash = loom_crypto::key_hash(raw_key);
    let api_key = db
        .api_key_find_active_by_hash(&hash)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid API key"))?;

    let agent = db
        .agent_get(api_key.agent_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("API key has no owning agent"))?;
    let tenant = db
        .tenant_get(agent.tenant_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("API key has no owning tenant"))?;

    if tenant.status != TenantStatus::Active {
        return Err(ApiError::tenant_suspended());
    }

    let effective = resolver::resolve_agent_config(db, &agent, &tenant, openai_fallback).await?;

    Ok(RequestPrincipal {
        tenant,
        agent,
        api_key_id: api_key.api_key_id,
        effective,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig {
            portal_secret: JwtSecret::new("portal-test-secret"),
            admin_secret: Some(JwtSecret::new("admin-test-secret")),
            token_expiry_secs: 3600,
        }
    }

    #[test]
    fn test_portal_token_roundtrip() -> ApiResult<()> {
        let config = test_config();
        let user_id = UserId::generate();
        let tenant_id = TenantId::generate();

        let token = generate_portal_token(&config, user_id, tenant_id, TenantRole::Owner)?;
        let context = validate_portal_token(&config, &token)?;

        assert_eq!(context.user_id, user_id);
        assert_eq!(context.tenant_id, tenant_id);
        assert_eq!(context.role, TenantRole::Owner);
        Ok(())
    }

    #[test]
    fn test_expired_token_rejected() -> ApiResult<()> {
        let mut config = test_config();
        config.token_expiry_secs = -120; // beyond default leeway

        let token = generate_portal_token(
            &config,
            UserId::generate(),
            TenantId::generate(),
            TenantRole::Member,
        )?;

        let err = validate_portal_token(&config, &token).expect_err("must be expired");
        assert_eq!(err.code, crate::error::ErrorCode::Unauthorized);
        assert!(err.message.contains("expired"));
        Ok(())
    }

    #[test]
    fn test_wrong_secret_rejected() -> ApiResult<()> {
        let config = test_config();
        let token = generate_portal_token(
            &config,
            UserId::generate(),
            TenantId::generate(),
            TenantRole::Member,
        )?;

        let other = AuthConfig {
            portal_secret: JwtSecret::new("a-different-secret"),
            ..test_config()
        };
        assert!(validate_portal_token(&other, &token).is_err());
        Ok(())
    }

    #[test]
    fn test_admin_token_uses_admin_secret() -> ApiResult<()> {
        let config = test_config();
        let claims = PortalClaims::new(
            UserId::generate(),
            TenantId::generate(),
            TenantRole::Owner,
            3600,
        );
        let admin_secret = config.admin_secret.clone().expect("admin secret set");
        let token = sign_claims(&admin_secret, &claims)?;

        assert!(validate_admin_token(&config, &token).is_ok());
        // Admin tokens are not portal tokens
        assert!(validate_portal_token(&config, &token).is_err());
        Ok(())
    }

    #[test]
    fn test_admin_plane_unconfigured() {
        let config = AuthConfig {
            admin_secret: None,
            ..test_config()
        };
        let err = validate_admin_token(&config, "whatever").expect_err("must fail");
        assert!(err.message.contains("not configured"));
    }

    #[test]
    fn test_unknown_role_folds_to_member() -> ApiResult<()> {
        let config = test_config();
        let mut claims = PortalClaims::new(
            UserId::generate(),
            TenantId::generate(),
            TenantRole::Owner,
            3600,
        );
        claims.role = "superadmin".to_string();
        let token = sign_claims(&config.portal_secret, &claims)?;

        let context = validate_portal_token(&config, &token)?;
        assert_eq!(context.role, TenantRole::Member);
        assert!(context.require_owner().is_err());
        Ok(())
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token("Bearer abc").expect("ok"), "abc");
        assert!(bearer_token("Basic abc").is_err());
        assert!(bearer_token("bearer abc").is_err());
    }

    #[test]
    fn test_jwt_secret_redacted_debug() {
        let secret = JwtSecret::new("super-secret-value");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("REDACTED"));
    }
}
