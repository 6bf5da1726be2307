/// Role and permission resolution
///
/// The effective permission set for an account is the union of its role
/// permissions and direct grants, minus its direct denies. A deny always
/// wins, no matter how the permission was otherwise obtained.
use crate::error::{AuthError, AuthResult};
use crate::store::{
    AccountPermission, AccountPermissionStore, AccountRole, AccountRoleStore, AccountStore,
    Permission, PermissionEffect, PermissionStore, Role, RolePermission, RolePermissionStore,
    RoleStore,
};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Permission resolver service
pub struct PermissionResolver {
    accounts: Arc<dyn AccountStore>,
    roles: Arc<dyn RoleStore>,
    permissions: Arc<dyn PermissionStore>,
    account_roles: Arc<dyn AccountRoleStore>,
    role_permissions: Arc<dyn RolePermissionStore>,
    account_permissions: Arc<dyn AccountPermissionStore>,
}

impl PermissionResolver {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        roles: Arc<dyn RoleStore>,
        permissions: Arc<dyn PermissionStore>,
        account_roles: Arc<dyn AccountRoleStore>,
        role_permissions: Arc<dyn RolePermissionStore>,
        account_permissions: Arc<dyn AccountPermissionStore>,
    ) -> Self {
        Self {
            accounts,
            roles,
            permissions,
            account_roles,
            role_permissions,
            account_permissions,
        }
    }

    /// Create a role; the name is unique at write time
    pub async fn create_role(&self, name: &str, description: &str) -> AuthResult<Role> {
        let role = Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
        };
        self.roles.create(&role).await?;
        Ok(role)
    }

    /// Create a permission; the name is unique at write time
    pub async fn create_permission(
        &self,
        name: &str,
        description: &str,
        resource: &str,
        action: &str,
    ) -> AuthResult<Permission> {
        let permission = Permission {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
        };
        self.permissions.create(&permission).await?;
        Ok(permission)
    }

    /// Delete a role, cascading its associations first
    ///
    /// A cascade failure aborts before the role itself is touched. Deleting
    /// an absent role is a no-op.
    pub async fn delete_role(&self, role_id: Uuid) -> AuthResult<()> {
        self.account_roles.remove_all_for_role(role_id).await?;
        self.role_permissions.remove_all_for_role(role_id).await?;
        self.roles.delete(role_id).await?;
        Ok(())
    }

    /// Delete a permission, cascading its associations first
    pub async fn delete_permission(&self, permission_id: Uuid) -> AuthResult<()> {
        self.account_permissions
            .remove_all_for_permission(permission_id)
            .await?;
        self.role_permissions
            .remove_all_for_permission(permission_id)
            .await?;
        self.permissions.delete(permission_id).await?;
        Ok(())
    }

    /// Assign a role to an account; idempotent
    pub async fn assign_role(&self, account_id: Uuid, role_id: Uuid) -> AuthResult<()> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;
        self.roles
            .find_by_id(role_id)
            .await?
            .ok_or(AuthError::RoleNotFound)?;

        self.account_roles
            .insert(&AccountRole {
                account_id,
                role_id,
            })
            .await?;
        Ok(())
    }

    /// Remove a role from an account; idempotent
    pub async fn remove_role(&self, account_id: Uuid, role_id: Uuid) -> AuthResult<()> {
        self.account_roles.remove(account_id, role_id).await?;
        Ok(())
    }

    /// Attach a permission to a role; idempotent
    pub async fn add_role_permission(&self, role_id: Uuid, permission_id: Uuid) -> AuthResult<()> {
        self.roles
            .find_by_id(role_id)
            .await?
            .ok_or(AuthError::RoleNotFound)?;
        self.permissions
            .find_by_id(permission_id)
            .await?
            .ok_or(AuthError::PermissionNotFound)?;

        self.role_permissions
            .insert(&RolePermission {
                role_id,
                permission_id,
            })
            .await?;
        Ok(())
    }

    /// Detach a permission from a role; idempotent
    pub async fn remove_role_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> AuthResult<()> {
        self.role_permissions.remove(role_id, permission_id).await?;
        Ok(())
    }

    /// Grant a permission directly to an account; idempotent
    pub async fn grant_permission(&self, account_id: Uuid, permission_id: Uuid) -> AuthResult<()> {
        self.upsert_direct(account_id, permission_id, PermissionEffect::Grant)
            .await
    }

    /// Deny a permission directly on an account; overrides any grant
    pub async fn deny_permission(&self, account_id: Uuid, permission_id: Uuid) -> AuthResult<()> {
        self.upsert_direct(account_id, permission_id, PermissionEffect::Deny)
            .await
    }

    /// Remove a direct grant or deny entry; idempotent
    pub async fn remove_permission(&self, account_id: Uuid, permission_id: Uuid) -> AuthResult<()> {
        self.account_permissions
            .remove(account_id, permission_id)
            .await?;
        Ok(())
    }

    async fn upsert_direct(
        &self,
        account_id: Uuid,
        permission_id: Uuid,
        effect: PermissionEffect,
    ) -> AuthResult<()> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;
        self.permissions
            .find_by_id(permission_id)
            .await?
            .ok_or(AuthError::PermissionNotFound)?;

        self.account_permissions
            .upsert(&AccountPermission {
                account_id,
                permission_id,
                effect,
            })
            .await?;
        Ok(())
    }

    /// Roles assigned to an account, sorted by name
    pub async fn roles_for_account(&self, account_id: Uuid) -> AuthResult<Vec<Role>> {
        let mut roles = Vec::new();
        for role_id in self.account_roles.role_ids_for_account(account_id).await? {
            // A dangling link can survive a concurrent role delete; skip it
            if let Some(role) = self.roles.find_by_id(role_id).await? {
                roles.push(role);
            }
        }
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    /// Effective permission set: role-derived ∪ direct grants − denies
    pub async fn permissions_for_account(&self, account_id: Uuid) -> AuthResult<Vec<Permission>> {
        let mut allowed: HashSet<Uuid> = HashSet::new();

        for role_id in self.account_roles.role_ids_for_account(account_id).await? {
            allowed.extend(
                self.role_permissions
                    .permission_ids_for_role(role_id)
                    .await?,
            );
        }

        let mut denied: HashSet<Uuid> = HashSet::new();
        for entry in self
            .account_permissions
            .list_for_account(account_id)
            .await?
        {
            match entry.effect {
                PermissionEffect::Grant => {
                    allowed.insert(entry.permission_id);
                }
                PermissionEffect::Deny => {
                    denied.insert(entry.permission_id);
                }
            }
        }

        // Deny has absolute precedence over role-derived and direct grants
        self.collect_permissions(allowed.difference(&denied).copied())
            .await
    }

    /// Direct grants only, without role expansion; used for inspection
    pub async fn direct_permissions_for_account(
        &self,
        account_id: Uuid,
    ) -> AuthResult<Vec<Permission>> {
        let grants = self
            .account_permissions
            .list_for_account(account_id)
            .await?
            .into_iter()
            .filter(|entry| entry.effect == PermissionEffect::Grant)
            .map(|entry| entry.permission_id);
        self.collect_permissions(grants).await
    }

    async fn collect_permissions(
        &self,
        ids: impl Iterator<Item = Uuid>,
    ) -> AuthResult<Vec<Permission>> {
        let mut permissions = Vec::new();
        for id in ids {
            if let Some(permission) = self.permissions.find_by_id(id).await? {
                permissions.push(permission);
            }
        }
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }
}
