/// Storage contract for the authentication core
///
/// Persistence is a collaborator, not part of the core: each entity gets a
/// narrow async trait exposing create/find/update/delete plus the family and
/// generation lookups the token lifecycle needs. Backends report uniqueness
/// violations at write time through `StoreError::Duplicate`; the services map
/// those onto the public error taxonomy. `MemoryStore` is the in-process
/// implementation used by the test suite.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by storage backends
#[derive(Error, Debug)]
pub enum StoreError {
    /// Unique-key violation detected at insert time
    #[error("duplicate value for {field}")]
    Duplicate { field: &'static str },

    /// Update or delete targeted a missing record
    #[error("record not found")]
    NotFound,

    /// Backend-specific failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Identity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Canonical lowercase form, unique
    pub email: String,
    /// Optional, unique when present
    pub username: Option<String>,
    pub password_hash: String,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Named role, many-to-many with accounts and permissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

/// Protectable capability identified by resource + action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub resource: String,
    pub action: String,
}

/// Account-role assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRole {
    pub account_id: Uuid,
    pub role_id: Uuid,
}

/// Role-permission assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
}

/// Effect of a direct account-permission entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionEffect {
    Grant,
    /// A deny always overrides any grant for the same permission
    Deny,
}

/// Direct grant or deny on an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPermission {
    pub account_id: Uuid,
    pub permission_id: Uuid,
    pub effect: PermissionEffect,
}

/// Persisted refresh-token row
///
/// The `token` field is the opaque secret presented inside the refresh JWT
/// wrapper and looked up by exact match. Tokens rotated from the same login
/// share a `family_id` with strictly increasing `generation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub token: String,
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub family_id: String,
    pub generation: i32,
    pub device_id: Option<String>,
    pub mobile: bool,
    pub created_at: DateTime<Utc>,
}

/// Single-use password reset token; consumption deletes the row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub token: String,
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Sliding-window counter keyed by normalized email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub identity_key: String,
    pub window_start: DateTime<Utc>,
    pub attempt_count: u32,
}

/// Single-use invitation carrying a target role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    /// Canonical lowercase form
    pub email: String,
    pub token: String,
    pub role_id: Uuid,
    pub created_by: Uuid,
    pub expires_at: DateTime<Utc>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Set when accepted or revoked; both are terminal
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

/// Account records
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account; duplicate email or username is reported as
    /// `StoreError::Duplicate` naming the offending field
    async fn create(&self, account: &Account) -> StoreResult<()>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Account>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>>;
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Account>>;
    async fn update(&self, account: &Account) -> StoreResult<()>;
}

/// Role records
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn create(&self, role: &Role) -> StoreResult<()>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Role>>;
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    /// Returns whether a record was removed; deleting an absent role is not
    /// an error
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
    async fn list(&self) -> StoreResult<Vec<Role>>;
}

/// Permission records
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn create(&self, permission: &Permission) -> StoreResult<()>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Permission>>;
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Permission>>;
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
    async fn list(&self) -> StoreResult<Vec<Permission>>;
}

/// Account-role links, set semantics
#[async_trait]
pub trait AccountRoleStore: Send + Sync {
    /// Idempotent: inserting an existing link is a no-op
    async fn insert(&self, link: &AccountRole) -> StoreResult<()>;
    async fn remove(&self, account_id: Uuid, role_id: Uuid) -> StoreResult<bool>;
    async fn role_ids_for_account(&self, account_id: Uuid) -> StoreResult<Vec<Uuid>>;
    async fn remove_all_for_role(&self, role_id: Uuid) -> StoreResult<u64>;
}

/// Role-permission links, set semantics
#[async_trait]
pub trait RolePermissionStore: Send + Sync {
    /// Idempotent: inserting an existing link is a no-op
    async fn insert(&self, link: &RolePermission) -> StoreResult<()>;
    async fn remove(&self, role_id: Uuid, permission_id: Uuid) -> StoreResult<bool>;
    async fn permission_ids_for_role(&self, role_id: Uuid) -> StoreResult<Vec<Uuid>>;
    async fn remove_all_for_role(&self, role_id: Uuid) -> StoreResult<u64>;
    async fn remove_all_for_permission(&self, permission_id: Uuid) -> StoreResult<u64>;
}

/// Direct account-permission entries
#[async_trait]
pub trait AccountPermissionStore: Send + Sync {
    /// Insert or replace the entry for (account, permission); a grant
    /// followed by a deny leaves a single deny row
    async fn upsert(&self, entry: &AccountPermission) -> StoreResult<()>;
    async fn remove(&self, account_id: Uuid, permission_id: Uuid) -> StoreResult<bool>;
    async fn list_for_account(&self, account_id: Uuid) -> StoreResult<Vec<AccountPermission>>;
    async fn remove_all_for_permission(&self, permission_id: Uuid) -> StoreResult<u64>;
}

/// Refresh-token rows with family/generation lookups
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create(&self, token: &RefreshTokenRecord) -> StoreResult<()>;
    async fn find_by_token(&self, token: &str) -> StoreResult<Option<RefreshTokenRecord>>;
    async fn delete_by_token(&self, token: &str) -> StoreResult<bool>;
    /// Remove every token in a family; the blast radius of theft detection
    async fn delete_family(&self, family_id: &str) -> StoreResult<u64>;
    async fn delete_for_account(&self, account_id: Uuid) -> StoreResult<u64>;
    async fn list_for_account(&self, account_id: Uuid) -> StoreResult<Vec<RefreshTokenRecord>>;
    /// Highest generation currently persisted for a family, if any token
    /// survives
    async fn latest_generation(&self, family_id: &str) -> StoreResult<Option<i32>>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Password-reset token rows
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn create(&self, token: &PasswordResetToken) -> StoreResult<()>;
    async fn find_by_token(&self, token: &str) -> StoreResult<Option<PasswordResetToken>>;
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Rate-limit windows keyed by identity
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn find(&self, identity_key: &str) -> StoreResult<Option<RateLimitWindow>>;
    /// Insert or replace the window for its identity key
    async fn put(&self, window: &RateLimitWindow) -> StoreResult<()>;
    async fn delete(&self, identity_key: &str) -> StoreResult<bool>;
    async fn delete_started_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Invitation records
#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn create(&self, invitation: &Invitation) -> StoreResult<()>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Invitation>>;
    async fn find_by_token(&self, token: &str) -> StoreResult<Option<Invitation>>;
    async fn update(&self, invitation: &Invitation) -> StoreResult<()>;
}
