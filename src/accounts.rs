/// Account primitives shared by the token, password-reset, and invitation
/// managers: registration, credential verification, password changes, and
/// activation toggles.
use crate::config::PasswordPolicy;
use crate::error::{AuthError, AuthResult};
use crate::password::PasswordHasher;
use crate::store::{Account, AccountStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Canonical form for emails: trimmed and lowercased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Registration request
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub username: Option<String>,
    pub password: String,
}

/// Account service
pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    hasher: Arc<dyn PasswordHasher>,
    policy: PasswordPolicy,
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        hasher: Arc<dyn PasswordHasher>,
        policy: PasswordPolicy,
    ) -> Self {
        Self {
            accounts,
            hasher,
            policy,
        }
    }

    /// Check a candidate password against the strength policy
    pub fn validate_password(&self, password: &str) -> AuthResult<()> {
        self.policy
            .validate(password)
            .map_err(AuthError::PasswordTooWeak)
    }

    /// Create a new active account
    ///
    /// Uniqueness of email and username is enforced by the store at write
    /// time; a duplicate insert surfaces as `EmailAlreadyExists` or
    /// `UsernameAlreadyExists`.
    pub async fn register(&self, request: NewAccount) -> AuthResult<Account> {
        let email = normalize_email(&request.email);
        self.validate_password(&request.password)?;

        let account = Account {
            id: Uuid::new_v4(),
            email,
            username: request.username,
            password_hash: self.hasher.hash(&request.password)?,
            active: true,
            last_login: None,
            created_at: Utc::now(),
        };

        self.accounts.create(&account).await.map_err(|e| match e {
            StoreError::Duplicate { field: "email" } => AuthError::EmailAlreadyExists,
            StoreError::Duplicate { field: "username" } => AuthError::UsernameAlreadyExists,
            other => AuthError::Store(other),
        })?;

        tracing::info!(account_id = %account.id, "registered new account");
        Ok(account)
    }

    /// Find an account by email, normalizing first
    pub async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        Ok(self.accounts.find_by_email(&normalize_email(email)).await?)
    }

    /// Fetch an account by id
    pub async fn get(&self, id: Uuid) -> AuthResult<Account> {
        self.accounts
            .find_by_id(id)
            .await?
            .ok_or(AuthError::AccountNotFound)
    }

    /// Verify a plaintext password against the stored hash
    pub fn verify_password(&self, account: &Account, password: &str) -> AuthResult<bool> {
        self.hasher.verify(&account.password_hash, password)
    }

    /// Set a new password, enforcing the strength policy
    pub async fn set_password(&self, account_id: Uuid, new_password: &str) -> AuthResult<()> {
        self.validate_password(new_password)?;

        let mut account = self.get(account_id).await?;
        account.password_hash = self.hasher.hash(new_password)?;
        self.accounts.update(&account).await?;

        tracing::info!(%account_id, "password updated");
        Ok(())
    }

    /// Toggle the active flag
    pub async fn set_active(&self, account_id: Uuid, active: bool) -> AuthResult<Account> {
        let mut account = self.get(account_id).await?;
        account.active = active;
        self.accounts.update(&account).await?;
        Ok(account)
    }

    /// Record a successful authentication
    pub async fn touch_last_login(&self, account_id: Uuid, at: DateTime<Utc>) -> AuthResult<()> {
        let mut account = self.get(account_id).await?;
        account.last_login = Some(at);
        self.accounts.update(&account).await?;
        Ok(())
    }
}
