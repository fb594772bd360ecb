//! Database Connection Pool Module
//!
//! PostgreSQL access for every gateway entity, built on deadpool-postgres.
//! All queries are parameterised SQL against the schema in
//! `migrations/schema.sql`; row mapping happens in this module so the rest
//! of the crate only sees `loom_core` types.

use crate::error::{ApiError, ApiResult};
use chrono::Utc;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use loom_core::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL connection string.
    pub url: String,
    /// Maximum pool size.
    pub max_size: usize,
    /// Bound on waiting for a pooled connection.
    pub timeout: std::time::Duration,
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `DATABASE_URL`: connection string (default: local `loom` database)
    /// - `LOOM_DB_POOL_SIZE`: maximum pool size (default: 16)
    /// - `LOOM_DB_TIMEOUT_SECS`: connection wait bound (default: 5)
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://postgres@localhost:5432/loom".to_string()),
            max_size: std::env::var("LOOM_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: std::time::Duration::from_secs(
                std::env::var("LOOM_DB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let pg_config: tokio_postgres::Config = self
            .url
            .parse()
            .map_err(|e| ApiError::internal(format!("Invalid DATABASE_URL: {}", e)))?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        Pool::builder(manager)
            .max_size(self.max_size)
            .wait_timeout(Some(self.timeout))
            .create_timeout(Some(self.timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| ApiError::internal(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Database client wrapping a connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

const TENANT_COLS: &str = "tenant_id, name, parent_tenant_id, status, provider_config, \
     system_prompt, skills, mcp_endpoints, available_models, created_at, updated_at";

const AGENT_COLS: &str = "agent_id, tenant_id, name, provider_config, system_prompt, skills, \
     mcp_endpoints, available_models, prompt_policy, skills_policy, mcp_policy, \
     conversations_enabled, conversation_token_limit, conversation_summary_model, \
     created_at, updated_at";

const USER_COLS: &str = "user_id, email, password_hash, created_at, updated_at";

const MEMBERSHIP_COLS: &str = "membership_id, user_id, tenant_id, role, joined_at";

const INVITE_COLS: &str =
    "invite_id, tenant_id, token, max_uses, use_count, expires_at, revoked_at, created_by, created_at";

const API_KEY_COLS: &str =
    "api_key_id, agent_id, tenant_id, name, key_hash, key_prefix, status, revoked_at, created_at";

const PARTITION_COLS: &str =
    "partition_id, tenant_id, external_id, parent_partition_id, title, created_at";

const CONVERSATION_COLS: &str =
    "conversation_id, tenant_id, agent_id, partition_id, external_id, created_at, last_active_at";

const MESSAGE_COLS: &str = "message_id, conversation_id, role, content_ciphertext, content_iv, \
     token_estimate, snapshot_id, created_at";

const SNAPSHOT_COLS: &str =
    "snapshot_id, conversation_id, summary_ciphertext, summary_iv, messages_archived, created_at";

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get a connection from the pool.
    pub async fn get_conn(&self) -> ApiResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(ApiError::from)
    }

    /// Lightweight connectivity probe for the health endpoint.
    pub async fn ping(&self) -> ApiResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    // ========================================================================
    // TENANT OPERATIONS
    // ========================================================================

    /// Create a tenant. Configuration fields start null (inherit).
    pub async fn tenant_create(
        &self,
        name: &str,
        parent_tenant_id: Option<TenantId>,
    ) -> ApiResult<Tenant> {
        let conn = self.get_conn().await?;
        let tenant_id = TenantId::generate();
        let row = conn
            .query_one(
                format!(
                    "INSERT INTO tenants (tenant_id, name, parent_tenant_id) \
                     VALUES ($1, $2, $3) RETURNING {TENANT_COLS}"
                ).as_str(),
                &[
                    &tenant_id.as_uuid(),
                    &name,
                    &parent_tenant_id.map(|id| id.as_uuid()),
                ],
            )
            .await?;
        row_to_tenant(&row)
    }

    pub async fn tenant_get(&self, tenant_id: TenantId) -> ApiResult<Option<Tenant>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                format!("SELECT {TENANT_COLS} FROM tenants WHERE tenant_id = $1").as_str(),
                &[&tenant_id.as_uuid()],
            )
            .await?;
        row.as_ref().map(row_to_tenant).transpose()
    }

    /// Overwrite a tenant's overrideable configuration fields.
    pub async fn tenant_update_overrides(
        &self,
        tenant_id: TenantId,
        overrides: &ConfigOverrides,
    ) -> ApiResult<Option<Tenant>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                format!(
                    "UPDATE tenants SET provider_config = $2, system_prompt = $3, skills = $4, \
                     mcp_endpoints = $5, available_models = $6, updated_at = now() \
                     WHERE tenant_id = $1 RETURNING {TENANT_COLS}"
                ).as_str(),
                &[
                    &tenant_id.as_uuid(),
                    &to_json_opt(&overrides.provider_config)?,
                    &overrides.system_prompt,
                    &to_json_opt(&overrides.skills)?,
                    &to_json_opt(&overrides.mcp_endpoints)?,
                    &to_json_opt(&overrides.available_models)?,
                ],
            )
            .await?;
        row.as_ref().map(row_to_tenant).transpose()
    }

    pub async fn tenant_set_status(
        &self,
        tenant_id: TenantId,
        status: TenantStatus,
    ) -> ApiResult<bool> {
        let conn = self.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE tenants SET status = $2, updated_at = now() WHERE tenant_id = $1",
                &[&tenant_id.as_uuid(), &status.as_db_str()],
            )
            .await?;
        Ok(updated == 1)
    }

    // ========================================================================
    // USER OPERATIONS
    // ========================================================================

    /// Create a user. Emails are stored lowercased; duplicates conflict.
    pub async fn user_create(&self, email: &str, password_hash: &str) -> ApiResult<User> {
        let conn = self.get_conn().await?;
        let user_id = UserId::generate();
        let email = email.to_lowercase();
        let row = conn
            .query_one(
                format!(
                    "INSERT INTO users (user_id, email, password_hash) \
                     VALUES ($1, $2, $3) RETURNING {USER_COLS}"
                ).as_str(),
                &[&user_id.as_uuid(), &email, &password_hash],
            )
            .await
            .map_err(|e| map_unique(e, "A user with this email already exists"))?;
        row_to_user(&row)
    }

    pub async fn user_get(&self, user_id: UserId) -> ApiResult<Option<User>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                format!("SELECT {USER_COLS} FROM users WHERE user_id = $1").as_str(),
                &[&user_id.as_uuid()],
            )
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn user_find_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                format!("SELECT {USER_COLS} FROM users WHERE email = $1").as_str(),
                &[&email.to_lowercase()],
            )
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    // ========================================================================
    // MEMBERSHIP OPERATIONS
    // ========================================================================

    pub async fn membership_create(
        &self,
        user_id: UserId,
        tenant_id: TenantId,
        role: TenantRole,
    ) -> ApiResult<TenantMembership> {
        let conn = self.get_conn().await?;
        let membership_id = MembershipId::generate();
        let row = conn
            .query_one(
                format!(
                    "INSERT INTO tenant_memberships (membership_id, user_id, tenant_id, role) \
                     VALUES ($1, $2, $3, $4) RETURNING {MEMBERSHIP_COLS}"
                ).as_str(),
                &[
                    &membership_id.as_uuid(),
                    &user_id.as_uuid(),
                    &tenant_id.as_uuid(),
                    &role.as_db_str(),
                ],
            )
            .await
            .map_err(|e| map_unique(e, "User is already a member of this tenant"))?;
        row_to_membership(&row)
    }

    /// All memberships of one user, with the tenant's display name.
    pub async fn memberships_for_user(
        &self,
        user_id: UserId,
    ) -> ApiResult<Vec<MembershipWithTenant>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT m.membership_id, m.user_id, m.tenant_id, m.role, m.joined_at, \
                        t.name AS tenant_name, t.status AS tenant_status \
                 FROM tenant_memberships m \
                 JOIN tenants t ON t.tenant_id = m.tenant_id \
                 WHERE m.user_id = $1 ORDER BY m.joined_at",
                &[&user_id.as_uuid()],
            )
            .await?;
        rows.iter()
            .map(|row| {
                Ok(MembershipWithTenant {
                    membership: row_to_membership(row)?,
                    tenant_name: row.get("tenant_name"),
                    tenant_status: TenantStatus::from_db_str(row.get("tenant_status"))
                        .map_err(internal_parse)?,
                })
            })
            .collect()
    }

    /// All members of one tenant, with user emails.
    pub async fn members_of_tenant(&self, tenant_id: TenantId) -> ApiResult<Vec<MemberRecord>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT m.membership_id, m.user_id, m.tenant_id, m.role, m.joined_at, \
                        u.email FROM tenant_memberships m \
                 JOIN users u ON u.user_id = m.user_id \
                 WHERE m.tenant_id = $1 ORDER BY m.joined_at",
                &[&tenant_id.as_uuid()],
            )
            .await?;
        rows.iter()
            .map(|row| {
                Ok(MemberRecord {
                    membership: row_to_membership(row)?,
                    email: row.get("email"),
                })
            })
            .collect()
    }

    /// Change a member's role, transactionally preserving the invariant
    /// that every tenant keeps at least one owner.
    ///
    /// The tenant's membership rows are locked `FOR UPDATE` before the
    /// owner count is checked, so two concurrent demotions of different
    /// owners serialise: the second sees the first's result and conflicts
    /// instead of racing past the check. Returns `None` when the user is
    /// not a member.
    pub async fn membership_update_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role: TenantRole,
    ) -> ApiResult<Option<TenantMembership>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        let Some(current) = lock_memberships(&tx, tenant_id, user_id).await? else {
            return Ok(None);
        };
        if current.target_is_owner && !role.is_owner() && current.owner_count <= 1 {
            return Err(ApiError::conflict(
                "Cannot demote the last owner of a tenant",
            ));
        }

        let row = tx
            .query_opt(
                format!(
                    "UPDATE tenant_memberships SET role = $3 \
                     WHERE tenant_id = $1 AND user_id = $2 RETURNING {MEMBERSHIP_COLS}"
                )
                .as_str(),
                &[&tenant_id.as_uuid(), &user_id.as_uuid(), &role.as_db_str()],
            )
            .await?;
        tx.commit().await?;
        row.as_ref().map(row_to_membership).transpose()
    }

    /// Remove a member under the same lock-then-check discipline as
    /// [`Self::membership_update_role`]: the last owner can never be
    /// removed, even by concurrent requests. Returns `false` when the
    /// user is not a member.
    pub async fn membership_delete(&self, tenant_id: TenantId, user_id: UserId) -> ApiResult<bool> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        let Some(current) = lock_memberships(&tx, tenant_id, user_id).await? else {
            return Ok(false);
        };
        if current.target_is_owner && current.owner_count <= 1 {
            return Err(ApiError::conflict(
                "Cannot remove the last owner of a tenant",
            ));
        }

        let deleted = tx
            .execute(
                "DELETE FROM tenant_memberships WHERE tenant_id = $1 AND user_id = $2",
                &[&tenant_id.as_uuid(), &user_id.as_uuid()],
            )
            .await?;
        tx.commit().await?;
        Ok(deleted == 1)
    }

    // ========================================================================
    // INVITE OPERATIONS
    // ========================================================================

    pub async fn invite_create(
        &self,
        tenant_id: TenantId,
        token: &str,
        max_uses: Option<i32>,
        expires_at: Timestamp,
        created_by: UserId,
    ) -> ApiResult<Invite> {
        let conn = self.get_conn().await?;
        let invite_id = InviteId::generate();
        let row = conn
            .query_one(
                format!(
                    "INSERT INTO invites (invite_id, tenant_id, token, max_uses, expires_at, created_by) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING {INVITE_COLS}"
                ).as_str(),
                &[
                    &invite_id.as_uuid(),
                    &tenant_id.as_uuid(),
                    &token,
                    &max_uses,
                    &expires_at,
                    &created_by.as_uuid(),
                ],
            )
            .await?;
        row_to_invite(&row)
    }

    pub async fn invite_list(&self, tenant_id: TenantId) -> ApiResult<Vec<Invite>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                format!(
                    "SELECT {INVITE_COLS} FROM invites WHERE tenant_id = $1 ORDER BY created_at DESC"
                ).as_str(),
                &[&tenant_id.as_uuid()],
            )
            .await?;
        rows.iter().map(row_to_invite).collect()
    }

    pub async fn invite_revoke(&self, tenant_id: TenantId, invite_id: InviteId) -> ApiResult<bool> {
        let conn = self.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE invites SET revoked_at = now() \
                 WHERE invite_id = $1 AND tenant_id = $2 AND revoked_at IS NULL",
                &[&invite_id.as_uuid(), &tenant_id.as_uuid()],
            )
            .await?;
        Ok(updated == 1)
    }

    /// Accept an invite transactionally: validity is re-checked under a row
    /// lock before any membership is created, and the use counter only
    /// moves when a membership lands.
    pub async fn invite_accept(
        &self,
        token: &str,
        user_id: UserId,
    ) -> ApiResult<TenantMembership> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        let row = tx
            .query_opt(
                format!("SELECT {INVITE_COLS} FROM invites WHERE token = $1 FOR UPDATE").as_str(),
                &[&token],
            )
            .await?;
        let invite = row
            .as_ref()
            .map(row_to_invite)
            .transpose()?
            .ok_or_else(|| ApiError::new(crate::error::ErrorCode::NotFound, "Invite not found"))?;

        if !invite.is_valid(Utc::now()) {
            return Err(ApiError::invalid_request("Invite is no longer valid"));
        }

        let existing = tx
            .query_opt(
                "SELECT membership_id FROM tenant_memberships WHERE user_id = $1 AND tenant_id = $2",
                &[&user_id.as_uuid(), &invite.tenant_id.as_uuid()],
            )
            .await?;
        if existing.is_some() {
            return Err(ApiError::conflict("User is already a member of this tenant"));
        }

        let membership_id = MembershipId::generate();
        let row = tx
            .query_one(
                format!(
                    "INSERT INTO tenant_memberships (membership_id, user_id, tenant_id, role) \
                     VALUES ($1, $2, $3, 'member') RETURNING {MEMBERSHIP_COLS}"
                ).as_str(),
                &[
                    &membership_id.as_uuid(),
                    &user_id.as_uuid(),
                    &invite.tenant_id.as_uuid(),
                ],
            )
            .await?;
        tx.execute(
            "UPDATE invites SET use_count = use_count + 1 WHERE invite_id = $1",
            &[&invite.invite_id.as_uuid()],
        )
        .await?;
        tx.commit().await?;

        row_to_membership(&row)
    }

    // ========================================================================
    // AGENT OPERATIONS
    // ========================================================================

    /// Create an agent with default policies. Names are unique per tenant.
    pub async fn agent_create(&self, tenant_id: TenantId, name: &str) -> ApiResult<Agent> {
        let conn = self.get_conn().await?;
        let agent_id = AgentId::generate();
        let row = conn
            .query_one(
                format!(
                    "INSERT INTO agents (agent_id, tenant_id, name) \
                     VALUES ($1, $2, $3) RETURNING {AGENT_COLS}"
                ).as_str(),
                &[&agent_id.as_uuid(), &tenant_id.as_uuid(), &name],
            )
            .await
            .map_err(|e| map_unique(e, "An agent with this name already exists in the tenant"))?;
        row_to_agent(&row)
    }

    pub async fn agent_get(&self, agent_id: AgentId) -> ApiResult<Option<Agent>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                format!("SELECT {AGENT_COLS} FROM agents WHERE agent_id = $1").as_str(),
                &[&agent_id.as_uuid()],
            )
            .await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    pub async fn agent_get_in_tenant(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
    ) -> ApiResult<Option<Agent>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                format!("SELECT {AGENT_COLS} FROM agents WHERE agent_id = $1 AND tenant_id = $2").as_str(),
                &[&agent_id.as_uuid(), &tenant_id.as_uuid()],
            )
            .await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    pub async fn agent_list(&self, tenant_id: TenantId) -> ApiResult<Vec<Agent>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                format!("SELECT {AGENT_COLS} FROM agents WHERE tenant_id = $1 ORDER BY created_at").as_str(),
                &[&tenant_id.as_uuid()],
            )
            .await?;
        rows.iter().map(row_to_agent).collect()
    }

    /// Persist an agent's mutable fields (read-modify-write update).
    pub async fn agent_update(&self, agent: &Agent) -> ApiResult<Agent> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                format!(
                    "UPDATE agents SET name = $2, provider_config = $3, system_prompt = $4, \
                     skills = $5, mcp_endpoints = $6, available_models = $7, prompt_policy = $8, \
                     skills_policy = $9, mcp_policy = $10, conversations_enabled = $11, \
                     conversation_token_limit = $12, conversation_summary_model = $13, \
                     updated_at = now() WHERE agent_id = $1 RETURNING {AGENT_COLS}"
                ).as_str(),
                &[
                    &agent.agent_id.as_uuid(),
                    &agent.name,
                    &to_json_opt(&agent.overrides.provider_config)?,
                    &agent.overrides.system_prompt,
                    &to_json_opt(&agent.overrides.skills)?,
                    &to_json_opt(&agent.overrides.mcp_endpoints)?,
                    &to_json_opt(&agent.overrides.available_models)?,
                    &agent.merge_policies.system_prompt.as_db_str(),
                    &agent.merge_policies.skills.as_db_str(),
                    &agent.merge_policies.mcp_endpoints.as_db_str(),
                    &agent.conversations_enabled,
                    &agent.conversation_token_limit,
                    &agent.conversation_summary_model,
                ],
            )
            .await
            .map_err(|e| map_unique(e, "An agent with this name already exists in the tenant"))?;
        row_to_agent(&row)
    }

    pub async fn agent_delete(&self, tenant_id: TenantId, agent_id: AgentId) -> ApiResult<bool> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM agents WHERE agent_id = $1 AND tenant_id = $2",
                &[&agent_id.as_uuid(), &tenant_id.as_uuid()],
            )
            .await?;
        Ok(deleted == 1)
    }

    // ========================================================================
    // API KEY OPERATIONS
    // ========================================================================

    pub async fn api_key_create(
        &self,
        agent_id: AgentId,
        tenant_id: TenantId,
        name: &str,
        key_hash: &str,
        key_prefix: &str,
    ) -> ApiResult<ApiKey> {
        let conn = self.get_conn().await?;
        let api_key_id = ApiKeyId::generate();
        let row = conn
            .query_one(
                format!(
                    "INSERT INTO api_keys (api_key_id, agent_id, tenant_id, name, key_hash, key_prefix) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING {API_KEY_COLS}"
                ).as_str(),
                &[
                    &api_key_id.as_uuid(),
                    &agent_id.as_uuid(),
                    &tenant_id.as_uuid(),
                    &name,
                    &key_hash,
                    &key_prefix,
                ],
            )
            .await?;
        row_to_api_key(&row)
    }

    /// Exact-match lookup by key hash, restricted to active keys. Revoked
    /// keys never authenticate.
    pub async fn api_key_find_active_by_hash(&self, key_hash: &str) -> ApiResult<Option<ApiKey>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                format!(
                    "SELECT {API_KEY_COLS} FROM api_keys WHERE key_hash = $1 AND status = 'active'"
                ).as_str(),
                &[&key_hash],
            )
            .await?;
        row.as_ref().map(row_to_api_key).transpose()
    }

    pub async fn api_key_list(&self, tenant_id: TenantId) -> ApiResult<Vec<ApiKey>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                format!(
                    "SELECT {API_KEY_COLS} FROM api_keys WHERE tenant_id = $1 ORDER BY created_at DESC"
                ).as_str(),
                &[&tenant_id.as_uuid()],
            )
            .await?;
        rows.iter().map(row_to_api_key).collect()
    }

    pub async fn api_key_revoke(
        &self,
        tenant_id: TenantId,
        api_key_id: ApiKeyId,
    ) -> ApiResult<bool> {
        let conn = self.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE api_keys SET status = 'revoked', revoked_at = now() \
                 WHERE api_key_id = $1 AND tenant_id = $2 AND status = 'active'",
                &[&api_key_id.as_uuid(), &tenant_id.as_uuid()],
            )
            .await?;
        Ok(updated == 1)
    }

    // ========================================================================
    // PARTITION OPERATIONS
    // ========================================================================

    /// Idempotent partition materialisation on (tenant, external_id).
    pub async fn partition_get_or_create(
        &self,
        tenant_id: TenantId,
        external_id: &str,
        parent_partition_id: Option<PartitionId>,
        title: Option<&str>,
    ) -> ApiResult<Partition> {
        let conn = self.get_conn().await?;
        let partition_id = PartitionId::generate();
        // DO UPDATE on the conflict target makes RETURNING yield the
        // existing row, so two concurrent callers get the same entity.
        let row = conn
            .query_one(
                format!(
                    "INSERT INTO partitions (partition_id, tenant_id, external_id, parent_partition_id, title) \
                     VALUES ($1, $2, $3, $4, $5) \
                     ON CONFLICT (tenant_id, external_id) DO UPDATE SET external_id = EXCLUDED.external_id \
                     RETURNING {PARTITION_COLS}"
                ).as_str(),
                &[
                    &partition_id.as_uuid(),
                    &tenant_id.as_uuid(),
                    &external_id,
                    &parent_partition_id.map(|id| id.as_uuid()),
                    &title,
                ],
            )
            .await?;
        row_to_partition(&row)
    }

    pub async fn partition_list(&self, tenant_id: TenantId) -> ApiResult<Vec<Partition>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                format!(
                    "SELECT {PARTITION_COLS} FROM partitions WHERE tenant_id = $1 ORDER BY created_at"
                ).as_str(),
                &[&tenant_id.as_uuid()],
            )
            .await?;
        rows.iter().map(row_to_partition).collect()
    }

    // ========================================================================
    // CONVERSATION OPERATIONS
    // ========================================================================

    /// Idempotent conversation materialisation on (tenant, external_id).
    pub async fn conversation_get_or_create(
        &self,
        tenant_id: TenantId,
        external_id: &str,
        agent_id: Option<AgentId>,
        partition_id: Option<PartitionId>,
    ) -> ApiResult<Conversation> {
        let conn = self.get_conn().await?;
        let conversation_id = ConversationId::generate();
        let row = conn
            .query_one(
                format!(
                    "INSERT INTO conversations (conversation_id, tenant_id, agent_id, partition_id, external_id) \
                     VALUES ($1, $2, $3, $4, $5) \
                     ON CONFLICT (tenant_id, external_id) DO UPDATE SET last_active_at = now() \
                     RETURNING {CONVERSATION_COLS}"
                ).as_str(),
                &[
                    &conversation_id.as_uuid(),
                    &tenant_id.as_uuid(),
                    &agent_id.map(|id| id.as_uuid()),
                    &partition_id.map(|id| id.as_uuid()),
                    &external_id,
                ],
            )
            .await?;
        row_to_conversation(&row)
    }

    pub async fn conversation_find(
        &self,
        tenant_id: TenantId,
        external_id: &str,
    ) -> ApiResult<Option<Conversation>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                format!(
                    "SELECT {CONVERSATION_COLS} FROM conversations \
                     WHERE tenant_id = $1 AND external_id = $2"
                ).as_str(),
                &[&tenant_id.as_uuid(), &external_id],
            )
            .await?;
        row.as_ref().map(row_to_conversation).transpose()
    }

    pub async fn conversation_list(&self, tenant_id: TenantId) -> ApiResult<Vec<Conversation>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                format!(
                    "SELECT {CONVERSATION_COLS} FROM conversations \
                     WHERE tenant_id = $1 ORDER BY last_active_at DESC"
                ).as_str(),
                &[&tenant_id.as_uuid()],
            )
            .await?;
        rows.iter().map(row_to_conversation).collect()
    }

    pub async fn conversation_touch(&self, conversation_id: ConversationId) -> ApiResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE conversations SET last_active_at = now() WHERE conversation_id = $1",
            &[&conversation_id.as_uuid()],
        )
        .await?;
        Ok(())
    }

    /// Append one encrypted message row.
    pub async fn message_append(
        &self,
        conversation_id: ConversationId,
        role: MessageRole,
        content: &EncryptedBlob,
        token_estimate: i32,
    ) -> ApiResult<MessageId> {
        let conn = self.get_conn().await?;
        let message_id = MessageId::generate();
        conn.execute(
            "INSERT INTO conversation_messages \
             (message_id, conversation_id, role, content_ciphertext, content_iv, token_estimate) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &message_id.as_uuid(),
                &conversation_id.as_uuid(),
                &role.as_db_str(),
                &content.ciphertext,
                &content.iv,
                &token_estimate,
            ],
        )
        .await?;
        Ok(message_id)
    }

    /// Messages appended strictly after the given instant (or all of them),
    /// ascending by insertion order.
    pub async fn messages_after(
        &self,
        conversation_id: ConversationId,
        after: Option<Timestamp>,
    ) -> ApiResult<Vec<ConversationMessage>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                format!(
                    "SELECT {MESSAGE_COLS} FROM conversation_messages \
                     WHERE conversation_id = $1 AND ($2::timestamptz IS NULL OR created_at > $2) \
                     ORDER BY created_at, message_id"
                ).as_str(),
                &[&conversation_id.as_uuid(), &after],
            )
            .await?;
        rows.iter().map(row_to_message).collect()
    }

    /// The newest snapshot of a conversation, if any.
    pub async fn snapshot_latest(
        &self,
        conversation_id: ConversationId,
    ) -> ApiResult<Option<ConversationSnapshot>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                format!(
                    "SELECT {SNAPSHOT_COLS} FROM conversation_snapshots \
                     WHERE conversation_id = $1 ORDER BY created_at DESC, snapshot_id DESC LIMIT 1"
                ).as_str(),
                &[&conversation_id.as_uuid()],
            )
            .await?;
        row.as_ref().map(row_to_snapshot).transpose()
    }

    /// Create a snapshot under a per-conversation advisory lock.
    ///
    /// `based_on` is the snapshot the caller's context was built from.
    /// When another request snapshotted in the meantime the insert is
    /// skipped and `None` is returned, collapsing concurrent attempts to
    /// one row. Archived messages get linked to the new snapshot; nothing
    /// is deleted.
    pub async fn snapshot_create_guarded(
        &self,
        conversation_id: ConversationId,
        based_on: Option<SnapshotId>,
        summary: &EncryptedBlob,
        messages_archived: i32,
    ) -> ApiResult<Option<ConversationSnapshot>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        tx.query(
            "SELECT pg_advisory_xact_lock($1)",
            &[&advisory_key(conversation_id)],
        )
        .await?;

        let latest = tx
            .query_opt(
                "SELECT snapshot_id FROM conversation_snapshots \
                 WHERE conversation_id = $1 ORDER BY created_at DESC, snapshot_id DESC LIMIT 1",
                &[&conversation_id.as_uuid()],
            )
            .await?
            .map(|row| SnapshotId::from(row.get::<usize, Uuid>(0)));
        if latest != based_on {
            return Ok(None);
        }

        let snapshot_id = SnapshotId::generate();
        let row = tx
            .query_one(
                format!(
                    "INSERT INTO conversation_snapshots \
                     (snapshot_id, conversation_id, summary_ciphertext, summary_iv, messages_archived) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING {SNAPSHOT_COLS}"
                ).as_str(),
                &[
                    &snapshot_id.as_uuid(),
                    &conversation_id.as_uuid(),
                    &summary.ciphertext,
                    &summary.iv,
                    &messages_archived,
                ],
            )
            .await?;
        tx.execute(
            "UPDATE conversation_messages SET snapshot_id = $1 \
             WHERE conversation_id = $2 AND snapshot_id IS NULL AND created_at <= \
               (SELECT created_at FROM conversation_snapshots WHERE snapshot_id = $1)",
            &[&snapshot_id.as_uuid(), &conversation_id.as_uuid()],
        )
        .await?;
        tx.commit().await?;

        row_to_snapshot(&row).map(Some)
    }

    // ========================================================================
    // TRACE OPERATIONS
    // ========================================================================

    /// Flush a batch of encrypted trace rows. Rows carry their own ids and
    /// timestamps, so retried batches skip what already landed.
    pub async fn trace_insert_batch(&self, rows: &[NewTrace]) -> ApiResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let conn = self.get_conn().await?;
        let statement = conn
            .prepare_cached(
                "INSERT INTO traces (trace_id, tenant_id, agent_id, model, provider, \
                 request_ciphertext, request_iv, response_ciphertext, response_iv, status_code, \
                 latency_ms, prompt_tokens, completion_tokens, total_tokens, ttfb_ms, \
                 gateway_overhead_ms, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
                 ON CONFLICT (trace_id, created_at) DO NOTHING",
            )
            .await?;
        for row in rows {
            conn.execute(
                &statement,
                &[
                    &row.trace_id.as_uuid(),
                    &row.tenant_id.as_uuid(),
                    &row.agent_id.map(|id| id.as_uuid()),
                    &row.model,
                    &row.provider,
                    &row.request.ciphertext,
                    &row.request.iv,
                    &row.response.ciphertext,
                    &row.response.iv,
                    &row.status_code,
                    &row.latency_ms,
                    &row.prompt_tokens,
                    &row.completion_tokens,
                    &row.total_tokens,
                    &row.ttfb_ms,
                    &row.gateway_overhead_ms,
                    &row.created_at,
                ],
            )
            .await?;
        }
        Ok(())
    }

    /// Cursor-paginated trace metadata, newest first. Trace ids are
    /// timestamp-sortable, so the id doubles as the cursor.
    pub async fn trace_list(
        &self,
        tenant_id: TenantId,
        cursor: Option<TraceId>,
        limit: i64,
    ) -> ApiResult<Vec<TraceSummary>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT trace_id, agent_id, model, provider, status_code, latency_ms, \
                        prompt_tokens, completion_tokens, total_tokens, ttfb_ms, \
                        gateway_overhead_ms, created_at \
                 FROM traces WHERE tenant_id = $1 AND ($2::uuid IS NULL OR trace_id < $2) \
                 ORDER BY trace_id DESC LIMIT $3",
                &[
                    &tenant_id.as_uuid(),
                    &cursor.map(|id| id.as_uuid()),
                    &limit,
                ],
            )
            .await?;
        rows.iter().map(row_to_trace_summary).collect()
    }

    /// Windowed aggregates grouped by day, newest first.
    pub async fn trace_aggregates(
        &self,
        tenant_id: TenantId,
        since: Timestamp,
    ) -> ApiResult<Vec<TraceWindowAggregate>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT date_trunc('day', created_at) AS day, count(*) AS requests, \
                        COALESCE(sum(prompt_tokens), 0)::bigint AS prompt_tokens, \
                        COALESCE(sum(completion_tokens), 0)::bigint AS completion_tokens, \
                        COALESCE(sum(total_tokens), 0)::bigint AS total_tokens, \
                        COALESCE(avg(latency_ms), 0)::float8 AS avg_latency_ms \
                 FROM traces WHERE tenant_id = $1 AND created_at >= $2 \
                 GROUP BY 1 ORDER BY 1 DESC",
                &[&tenant_id.as_uuid(), &since],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| TraceWindowAggregate {
                day: row.get("day"),
                requests: row.get("requests"),
                prompt_tokens: row.get("prompt_tokens"),
                completion_tokens: row.get("completion_tokens"),
                total_tokens: row.get("total_tokens"),
                avg_latency_ms: row.get("avg_latency_ms"),
            })
            .collect())
    }
}

// ============================================================================
// AUXILIARY ROW TYPES
// ============================================================================

/// A membership joined with its tenant's name and status.
#[derive(Debug, Clone)]
pub struct MembershipWithTenant {
    pub membership: TenantMembership,
    pub tenant_name: String,
    pub tenant_status: TenantStatus,
}

/// A membership joined with the member's email.
#[derive(Debug, Clone)]
pub struct MemberRecord {
    pub membership: TenantMembership,
    pub email: String,
}

/// One encrypted trace row ready for insertion.
#[derive(Debug, Clone)]
pub struct NewTrace {
    pub trace_id: TraceId,
    pub tenant_id: TenantId,
    pub agent_id: Option<AgentId>,
    pub model: String,
    pub provider: String,
    pub request: EncryptedBlob,
    pub response: EncryptedBlob,
    pub status_code: i32,
    pub latency_ms: i64,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
    pub ttfb_ms: Option<i64>,
    pub gateway_overhead_ms: Option<i64>,
    pub created_at: Timestamp,
}

/// Trace metadata without ciphertexts, as exposed on the portal plane.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TraceSummary {
    pub trace_id: TraceId,
    pub agent_id: Option<AgentId>,
    pub model: String,
    pub provider: String,
    pub status_code: i32,
    pub latency_ms: i64,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
    pub ttfb_ms: Option<i64>,
    pub gateway_overhead_ms: Option<i64>,
    pub created_at: Timestamp,
}

/// One day of windowed trace aggregates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TraceWindowAggregate {
    pub day: Timestamp,
    pub requests: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub avg_latency_ms: f64,
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn internal_parse(err: impl std::fmt::Display) -> ApiError {
    ApiError::internal(format!("Corrupt row: {}", err))
}

fn json_opt<T: DeserializeOwned>(row: &Row, column: &str) -> ApiResult<Option<T>> {
    let value: Option<serde_json::Value> = row.get(column);
    value
        .map(|v| serde_json::from_value(v).map_err(internal_parse))
        .transpose()
}

fn to_json_opt<T: Serialize>(value: &Option<T>) -> ApiResult<Option<serde_json::Value>> {
    value
        .as_ref()
        .map(|v| serde_json::to_value(v).map_err(internal_parse))
        .transpose()
}

fn overrides_from_row(row: &Row) -> ApiResult<ConfigOverrides> {
    Ok(ConfigOverrides {
        provider_config: json_opt(row, "provider_config")?,
        system_prompt: row.get("system_prompt"),
        skills: json_opt(row, "skills")?,
        mcp_endpoints: json_opt(row, "mcp_endpoints")?,
        available_models: json_opt(row, "available_models")?,
    })
}

fn row_to_tenant(row: &Row) -> ApiResult<Tenant> {
    Ok(Tenant {
        tenant_id: TenantId::from(row.get::<&str, Uuid>("tenant_id")),
        name: row.get("name"),
        parent_tenant_id: row
            .get::<_, Option<Uuid>>("parent_tenant_id")
            .map(TenantId::from),
        status: TenantStatus::from_db_str(row.get("status")).map_err(internal_parse)?,
        overrides: overrides_from_row(row)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_agent(row: &Row) -> ApiResult<Agent> {
    Ok(Agent {
        agent_id: AgentId::from(row.get::<&str, Uuid>("agent_id")),
        tenant_id: TenantId::from(row.get::<&str, Uuid>("tenant_id")),
        name: row.get("name"),
        overrides: overrides_from_row(row)?,
        merge_policies: MergePolicies {
            system_prompt: PromptPolicy::from_db_str(row.get("prompt_policy"))
                .map_err(internal_parse)?,
            skills: ListMergePolicy::from_db_str(row.get("skills_policy"))
                .map_err(internal_parse)?,
            mcp_endpoints: ListMergePolicy::from_db_str(row.get("mcp_policy"))
                .map_err(internal_parse)?,
        },
        conversations_enabled: row.get("conversations_enabled"),
        conversation_token_limit: row.get("conversation_token_limit"),
        conversation_summary_model: row.get("conversation_summary_model"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_user(row: &Row) -> ApiResult<User> {
    Ok(User {
        user_id: UserId::from(row.get::<&str, Uuid>("user_id")),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_membership(row: &Row) -> ApiResult<TenantMembership> {
    Ok(TenantMembership {
        membership_id: MembershipId::from(row.get::<&str, Uuid>("membership_id")),
        user_id: UserId::from(row.get::<&str, Uuid>("user_id")),
        tenant_id: TenantId::from(row.get::<&str, Uuid>("tenant_id")),
        role: TenantRole::from_claim(row.get("role")),
        joined_at: row.get("joined_at"),
    })
}

fn row_to_invite(row: &Row) -> ApiResult<Invite> {
    Ok(Invite {
        invite_id: InviteId::from(row.get::<&str, Uuid>("invite_id")),
        tenant_id: TenantId::from(row.get::<&str, Uuid>("tenant_id")),
        token: row.get("token"),
        max_uses: row.get("max_uses"),
        use_count: row.get("use_count"),
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
        created_by: UserId::from(row.get::<&str, Uuid>("created_by")),
        created_at: row.get("created_at"),
    })
}

fn row_to_api_key(row: &Row) -> ApiResult<ApiKey> {
    Ok(ApiKey {
        api_key_id: ApiKeyId::from(row.get::<&str, Uuid>("api_key_id")),
        agent_id: AgentId::from(row.get::<&str, Uuid>("agent_id")),
        tenant_id: TenantId::from(row.get::<&str, Uuid>("tenant_id")),
        name: row.get("name"),
        key_hash: row.get("key_hash"),
        key_prefix: row.get("key_prefix"),
        status: ApiKeyStatus::from_db_str(row.get("status")).map_err(internal_parse)?,
        revoked_at: row.get("revoked_at"),
        created_at: row.get("created_at"),
    })
}

fn row_to_partition(row: &Row) -> ApiResult<Partition> {
    Ok(Partition {
        partition_id: PartitionId::from(row.get::<&str, Uuid>("partition_id")),
        tenant_id: TenantId::from(row.get::<&str, Uuid>("tenant_id")),
        external_id: row.get("external_id"),
        parent_partition_id: row
            .get::<_, Option<Uuid>>("parent_partition_id")
            .map(PartitionId::from),
        title: row.get("title"),
        created_at: row.get("created_at"),
    })
}

fn row_to_conversation(row: &Row) -> ApiResult<Conversation> {
    Ok(Conversation {
        conversation_id: ConversationId::from(row.get::<&str, Uuid>("conversation_id")),
        tenant_id: TenantId::from(row.get::<&str, Uuid>("tenant_id")),
        agent_id: row.get::<_, Option<Uuid>>("agent_id").map(AgentId::from),
        partition_id: row
            .get::<_, Option<Uuid>>("partition_id")
            .map(PartitionId::from),
        external_id: row.get("external_id"),
        created_at: row.get("created_at"),
        last_active_at: row.get("last_active_at"),
    })
}

fn row_to_message(row: &Row) -> ApiResult<ConversationMessage> {
    Ok(ConversationMessage {
        message_id: MessageId::from(row.get::<&str, Uuid>("message_id")),
        conversation_id: ConversationId::from(row.get::<&str, Uuid>("conversation_id")),
        role: MessageRole::from_db_str(row.get("role")).map_err(internal_parse)?,
        content: EncryptedBlob {
            ciphertext: row.get("content_ciphertext"),
            iv: row.get("content_iv"),
        },
        token_estimate: row.get("token_estimate"),
        snapshot_id: row.get::<_, Option<Uuid>>("snapshot_id").map(SnapshotId::from),
        created_at: row.get("created_at"),
    })
}

fn row_to_snapshot(row: &Row) -> ApiResult<ConversationSnapshot> {
    Ok(ConversationSnapshot {
        snapshot_id: SnapshotId::from(row.get::<&str, Uuid>("snapshot_id")),
        conversation_id: ConversationId::from(row.get::<&str, Uuid>("conversation_id")),
        summary: EncryptedBlob {
            ciphertext: row.get("summary_ciphertext"),
            iv: row.get("summary_iv"),
        },
        messages_archived: row.get("messages_archived"),
        created_at: row.get("created_at"),
    })
}

fn row_to_trace_summary(row: &Row) -> ApiResult<TraceSummary> {
    Ok(TraceSummary {
        trace_id: TraceId::from(row.get::<&str, Uuid>("trace_id")),
        agent_id: row.get::<_, Option<Uuid>>("agent_id").map(AgentId::from),
        model: row.get("model"),
        provider: row.get("provider"),
        status_code: row.get("status_code"),
        latency_ms: row.get("latency_ms"),
        prompt_tokens: row.get("prompt_tokens"),
        completion_tokens: row.get("completion_tokens"),
        total_tokens: row.get("total_tokens"),
        ttfb_ms: row.get("ttfb_ms"),
        gateway_overhead_ms: row.get("gateway_overhead_ms"),
        created_at: row.get("created_at"),
    })
}

/// What the last-owner guard needs to know about a tenant's memberships,
/// observed under lock.
struct LockedMembership {
    target_is_owner: bool,
    owner_count: i64,
}

/// Lock a tenant's membership rows `FOR UPDATE` and report the owner
/// count plus the target user's current role. Returns `None` when the
/// user has no membership in the tenant. Callers mutate within the same
/// transaction, so the count cannot go stale under them.
async fn lock_memberships(
    tx: &deadpool_postgres::Transaction<'_>,
    tenant_id: TenantId,
    user_id: UserId,
) -> ApiResult<Option<LockedMembership>> {
    let rows = tx
        .query(
            "SELECT user_id, role FROM tenant_memberships WHERE tenant_id = $1 FOR UPDATE",
            &[&tenant_id.as_uuid()],
        )
        .await?;

    let mut owner_count = 0i64;
    let mut target_role: Option<TenantRole> = None;
    for row in &rows {
        let role = TenantRole::from_claim(row.get("role"));
        if role.is_owner() {
            owner_count += 1;
        }
        if UserId::from(row.get::<_, Uuid>("user_id")) == user_id {
            target_role = Some(role);
        }
    }

    Ok(target_role.map(|role| LockedMembership {
        target_is_owner: role.is_owner(),
        owner_count,
    }))
}

fn map_unique(err: tokio_postgres::Error, conflict_message: &str) -> ApiError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        ApiError::conflict(conflict_message)
    } else {
        err.into()
    }
}

/// Advisory-lock key for per-conversation serialisation: the first eight
/// bytes of the conversation UUID, interpreted as a big-endian i64.
fn advisory_key(conversation_id: ConversationId) -> i64 {
    let bytes = conversation_id.as_uuid().into_bytes();
    i64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}
