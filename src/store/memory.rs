/// In-memory store implementation
///
/// Backs the test suite and small single-process deployments. All entity
/// tables live behind one `tokio::sync::RwLock`, so each store call is
/// atomic with respect to every other call.
use super::{
    Account, AccountPermission, AccountRole, AccountRoleStore, AccountPermissionStore,
    AccountStore, Invitation, InvitationStore, PasswordResetToken, Permission, PermissionStore,
    RateLimitStore, RateLimitWindow, RefreshTokenRecord, ResetTokenStore, Role, RolePermission,
    RolePermissionStore, RoleStore, StoreError, StoreResult, TokenStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    account_roles: HashSet<(Uuid, Uuid)>,
    role_permissions: HashSet<(Uuid, Uuid)>,
    account_permissions: HashMap<(Uuid, Uuid), AccountPermission>,
    // Keyed by the opaque token value, the lookup key for every operation
    tokens: HashMap<String, RefreshTokenRecord>,
    reset_tokens: HashMap<String, PasswordResetToken>,
    rate_limits: HashMap<String, RateLimitWindow>,
    invitations: HashMap<Uuid, Invitation>,
}

/// In-memory implementation of every store trait
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create(&self, account: &Account) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        if tables.accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::Duplicate { field: "email" });
        }

        if let Some(ref username) = account.username {
            if tables
                .accounts
                .values()
                .any(|a| a.username.as_deref() == Some(username.as_str()))
            {
                return Err(StoreError::Duplicate { field: "username" });
            }
        }

        tables.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|a| a.username.as_deref() == Some(username))
            .cloned())
    }

    async fn update(&self, account: &Account) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.accounts.contains_key(&account.id) {
            return Err(StoreError::NotFound);
        }
        tables.accounts.insert(account.id, account.clone());
        Ok(())
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn create(&self, role: &Role) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.roles.values().any(|r| r.name == role.name) {
            return Err(StoreError::Duplicate { field: "name" });
        }
        tables.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Role>> {
        let tables = self.tables.read().await;
        Ok(tables.roles.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let tables = self.tables.read().await;
        Ok(tables.roles.values().find(|r| r.name == name).cloned())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.roles.remove(&id).is_some())
    }

    async fn list(&self) -> StoreResult<Vec<Role>> {
        let tables = self.tables.read().await;
        let mut roles: Vec<Role> = tables.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn create(&self, permission: &Permission) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.permissions.values().any(|p| p.name == permission.name) {
            return Err(StoreError::Duplicate { field: "name" });
        }
        tables.permissions.insert(permission.id, permission.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Permission>> {
        let tables = self.tables.read().await;
        Ok(tables.permissions.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Permission>> {
        let tables = self.tables.read().await;
        Ok(tables.permissions.values().find(|p| p.name == name).cloned())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.permissions.remove(&id).is_some())
    }

    async fn list(&self) -> StoreResult<Vec<Permission>> {
        let tables = self.tables.read().await;
        let mut permissions: Vec<Permission> = tables.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }
}

#[async_trait]
impl AccountRoleStore for MemoryStore {
    async fn insert(&self, link: &AccountRole) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.account_roles.insert((link.account_id, link.role_id));
        Ok(())
    }

    async fn remove(&self, account_id: Uuid, role_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.account_roles.remove(&(account_id, role_id)))
    }

    async fn role_ids_for_account(&self, account_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let tables = self.tables.read().await;
        Ok(tables
            .account_roles
            .iter()
            .filter(|(a, _)| *a == account_id)
            .map(|(_, r)| *r)
            .collect())
    }

    async fn remove_all_for_role(&self, role_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.account_roles.len();
        tables.account_roles.retain(|(_, r)| *r != role_id);
        Ok((before - tables.account_roles.len()) as u64)
    }
}

#[async_trait]
impl RolePermissionStore for MemoryStore {
    async fn insert(&self, link: &RolePermission) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .role_permissions
            .insert((link.role_id, link.permission_id));
        Ok(())
    }

    async fn remove(&self, role_id: Uuid, permission_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.role_permissions.remove(&(role_id, permission_id)))
    }

    async fn permission_ids_for_role(&self, role_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let tables = self.tables.read().await;
        Ok(tables
            .role_permissions
            .iter()
            .filter(|(r, _)| *r == role_id)
            .map(|(_, p)| *p)
            .collect())
    }

    async fn remove_all_for_role(&self, role_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.role_permissions.len();
        tables.role_permissions.retain(|(r, _)| *r != role_id);
        Ok((before - tables.role_permissions.len()) as u64)
    }

    async fn remove_all_for_permission(&self, permission_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.role_permissions.len();
        tables.role_permissions.retain(|(_, p)| *p != permission_id);
        Ok((before - tables.role_permissions.len()) as u64)
    }
}

#[async_trait]
impl AccountPermissionStore for MemoryStore {
    async fn upsert(&self, entry: &AccountPermission) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .account_permissions
            .insert((entry.account_id, entry.permission_id), *entry);
        Ok(())
    }

    async fn remove(&self, account_id: Uuid, permission_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .account_permissions
            .remove(&(account_id, permission_id))
            .is_some())
    }

    async fn list_for_account(&self, account_id: Uuid) -> StoreResult<Vec<AccountPermission>> {
        let tables = self.tables.read().await;
        Ok(tables
            .account_permissions
            .values()
            .filter(|entry| entry.account_id == account_id)
            .copied()
            .collect())
    }

    async fn remove_all_for_permission(&self, permission_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.account_permissions.len();
        tables
            .account_permissions
            .retain(|(_, p), _| *p != permission_id);
        Ok((before - tables.account_permissions.len()) as u64)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn create(&self, token: &RefreshTokenRecord) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.tokens.contains_key(&token.token) {
            return Err(StoreError::Duplicate { field: "token" });
        }
        tables.tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> StoreResult<Option<RefreshTokenRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.tokens.get(token).cloned())
    }

    async fn delete_by_token(&self, token: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.tokens.remove(token).is_some())
    }

    async fn delete_family(&self, family_id: &str) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.tokens.len();
        tables.tokens.retain(|_, t| t.family_id != family_id);
        Ok((before - tables.tokens.len()) as u64)
    }

    async fn delete_for_account(&self, account_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.tokens.len();
        tables.tokens.retain(|_, t| t.account_id != account_id);
        Ok((before - tables.tokens.len()) as u64)
    }

    async fn list_for_account(&self, account_id: Uuid) -> StoreResult<Vec<RefreshTokenRecord>> {
        let tables = self.tables.read().await;
        let mut tokens: Vec<RefreshTokenRecord> = tables
            .tokens
            .values()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| t.created_at);
        Ok(tokens)
    }

    async fn latest_generation(&self, family_id: &str) -> StoreResult<Option<i32>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .values()
            .filter(|t| t.family_id == family_id)
            .map(|t| t.generation)
            .max())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.tokens.len();
        tables.tokens.retain(|_, t| t.expires_at > now);
        Ok((before - tables.tokens.len()) as u64)
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn create(&self, token: &PasswordResetToken) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.reset_tokens.contains_key(&token.token) {
            return Err(StoreError::Duplicate { field: "token" });
        }
        tables.reset_tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> StoreResult<Option<PasswordResetToken>> {
        let tables = self.tables.read().await;
        Ok(tables.reset_tokens.get(token).cloned())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.reset_tokens.len();
        tables.reset_tokens.retain(|_, t| t.id != id);
        Ok(before != tables.reset_tokens.len())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.reset_tokens.len();
        tables.reset_tokens.retain(|_, t| t.expires_at > now);
        Ok((before - tables.reset_tokens.len()) as u64)
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn find(&self, identity_key: &str) -> StoreResult<Option<RateLimitWindow>> {
        let tables = self.tables.read().await;
        Ok(tables.rate_limits.get(identity_key).cloned())
    }

    async fn put(&self, window: &RateLimitWindow) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .rate_limits
            .insert(window.identity_key.clone(), window.clone());
        Ok(())
    }

    async fn delete(&self, identity_key: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.rate_limits.remove(identity_key).is_some())
    }

    async fn delete_started_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.rate_limits.len();
        tables.rate_limits.retain(|_, w| w.window_start >= cutoff);
        Ok((before - tables.rate_limits.len()) as u64)
    }
}

#[async_trait]
impl InvitationStore for MemoryStore {
    async fn create(&self, invitation: &Invitation) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .invitations
            .values()
            .any(|i| i.token == invitation.token)
        {
            return Err(StoreError::Duplicate { field: "token" });
        }
        tables.invitations.insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Invitation>> {
        let tables = self.tables.read().await;
        Ok(tables.invitations.get(&id).cloned())
    }

    async fn find_by_token(&self, token: &str) -> StoreResult<Option<Invitation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invitations
            .values()
            .find(|i| i.token == token)
            .cloned())
    }

    async fn update(&self, invitation: &Invitation) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.invitations.contains_key(&invitation.id) {
            return Err(StoreError::NotFound);
        }
        tables.invitations.insert(invitation.id, invitation.clone());
        Ok(())
    }
}
