/// Refresh-token lifecycle: issuance, rotation, theft detection, revocation
///
/// Every refresh token belongs to a family started at login. Rotation
/// deletes the presented row and inserts its successor with the generation
/// bumped, so at most one current token exists per family. Presenting a
/// token whose generation has already been superseded is the theft signal;
/// the response is family-wide invalidation, forcing re-login on every
/// device that shared the lineage.
use crate::accounts::{normalize_email, AccountService};
use crate::audit::{AuditEvent, AuditKind, AuditLogger};
use crate::config::TokenConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwt::{AccessClaims, RefreshClaims, TokenSigner};
use crate::permissions::PermissionResolver;
use crate::store::{Account, RefreshTokenRecord, TokenStore};
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const OPAQUE_TOKEN_LEN: usize = 48;

/// Generate the opaque secret stored in the token row
fn generate_opaque_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(OPAQUE_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Request metadata attached to token operations for auditing and device
/// tracking
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
    pub mobile: bool,
}

/// A freshly issued access/refresh token pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Token lifecycle manager
pub struct TokenManager {
    accounts: Arc<AccountService>,
    tokens: Arc<dyn TokenStore>,
    resolver: Arc<PermissionResolver>,
    signer: Arc<dyn TokenSigner>,
    audit: AuditLogger,
    config: TokenConfig,
    // Serializes concurrent rotations of the same opaque token; the
    // in-process equivalent of a row-level select-for-update, required so
    // racing rotations cannot slip past theft detection
    rotation_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(
        accounts: Arc<AccountService>,
        tokens: Arc<dyn TokenStore>,
        resolver: Arc<PermissionResolver>,
        signer: Arc<dyn TokenSigner>,
        audit: AuditLogger,
        config: TokenConfig,
    ) -> Self {
        Self {
            accounts,
            tokens,
            resolver,
            signer,
            audit,
            config,
            rotation_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Authenticate with email and password, starting a new token family
    ///
    /// Unknown email and wrong password produce the same error so the login
    /// surface cannot be used to probe for registered addresses.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> AuthResult<TokenPair> {
        let email = normalize_email(email);

        let account = match self.accounts.find_by_email(&email).await? {
            Some(account) => account,
            None => {
                self.audit.record(AuditEvent {
                    email: Some(email),
                    ip: client.ip.clone(),
                    user_agent: client.user_agent.clone(),
                    detail: Some("unknown email".to_string()),
                    ..AuditEvent::new(AuditKind::Login, false)
                });
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.accounts.verify_password(&account, password)? {
            self.audit.record(AuditEvent {
                account_id: Some(account.id),
                email: Some(account.email.clone()),
                ip: client.ip.clone(),
                user_agent: client.user_agent.clone(),
                detail: Some("password mismatch".to_string()),
                ..AuditEvent::new(AuditKind::Login, false)
            });
            return Err(AuthError::InvalidCredentials);
        }

        // Only after the password verified, so the inactive error cannot be
        // used to probe for accounts
        if !account.active {
            self.audit.record(AuditEvent {
                account_id: Some(account.id),
                email: Some(account.email.clone()),
                ip: client.ip.clone(),
                user_agent: client.user_agent.clone(),
                detail: Some("account deactivated".to_string()),
                ..AuditEvent::new(AuditKind::Login, false)
            });
            return Err(AuthError::AccountInactive);
        }

        let now = Utc::now();
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            token: generate_opaque_token(),
            account_id: account.id,
            expires_at: now + self.config.refresh_ttl(),
            family_id: Uuid::new_v4().to_string(),
            generation: 0,
            device_id: client.device_id.clone(),
            mobile: client.mobile,
            created_at: now,
        };
        self.tokens.create(&record).await?;
        self.accounts.touch_last_login(account.id, now).await?;

        let pair = self.issue_pair(&account, &record, now).await?;

        tracing::info!(account_id = %account.id, family_id = %record.family_id, "login succeeded");
        self.audit.record(AuditEvent {
            account_id: Some(account.id),
            email: Some(account.email.clone()),
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            ..AuditEvent::new(AuditKind::Login, true)
        });

        Ok(pair)
    }

    /// Rotate a refresh token, returning a new access/refresh pair
    pub async fn refresh(&self, refresh_jwt: &str, client: &ClientInfo) -> AuthResult<TokenPair> {
        let claims = self.signer.decode_refresh(refresh_jwt)?;

        let guard = self.rotation_guard(&claims.token).await;
        let _held = guard.lock().await;
        let result = self.rotate(&claims, client).await;
        drop(_held);
        self.release_rotation_guard(&claims.token, &guard).await;

        result
    }

    async fn rotate(&self, claims: &RefreshClaims, client: &ClientInfo) -> AuthResult<TokenPair> {
        let now = Utc::now();

        let record = match self.tokens.find_by_token(&claims.token).await? {
            Some(record) => record,
            None => {
                // The row is gone. If the family has rotated past the
                // presented generation, this is a replay of a stale value:
                // invalidate the entire family.
                if !claims.family_id.is_empty() {
                    if let Some(latest) =
                        self.tokens.latest_generation(&claims.family_id).await?
                    {
                        if latest > claims.generation {
                            return self.react_to_theft(claims, client).await;
                        }
                    }
                }
                return Err(AuthError::TokenNotFound);
            }
        };

        if now > record.expires_at {
            self.tokens.delete_by_token(&record.token).await?;
            self.audit.record(AuditEvent {
                account_id: Some(record.account_id),
                ip: client.ip.clone(),
                user_agent: client.user_agent.clone(),
                detail: Some("refresh token expired".to_string()),
                ..AuditEvent::new(AuditKind::TokenRefresh, false)
            });
            return Err(AuthError::TokenExpired);
        }

        // A sibling with a higher generation means this row was already
        // superseded
        if !record.family_id.is_empty() {
            if let Some(latest) = self.tokens.latest_generation(&record.family_id).await? {
                if latest > record.generation {
                    return self.react_to_theft(claims, client).await;
                }
            }
        }

        let account = match self.accounts.get(record.account_id).await {
            Ok(account) => account,
            Err(err) => {
                self.audit.record(AuditEvent {
                    account_id: Some(record.account_id),
                    ip: client.ip.clone(),
                    user_agent: client.user_agent.clone(),
                    detail: Some("account missing".to_string()),
                    ..AuditEvent::new(AuditKind::TokenRefresh, false)
                });
                return Err(err);
            }
        };

        if !account.active {
            self.audit.record(AuditEvent {
                account_id: Some(account.id),
                email: Some(account.email.clone()),
                ip: client.ip.clone(),
                user_agent: client.user_agent.clone(),
                detail: Some("account deactivated".to_string()),
                ..AuditEvent::new(AuditKind::TokenRefresh, false)
            });
            return Err(AuthError::AccountInactive);
        }

        // Rotation proper: the old row dies, its successor inherits the
        // family and device metadata
        self.tokens.delete_by_token(&record.token).await?;
        let next = RefreshTokenRecord {
            id: Uuid::new_v4(),
            token: generate_opaque_token(),
            account_id: record.account_id,
            expires_at: now + self.config.refresh_ttl(),
            family_id: record.family_id.clone(),
            generation: record.generation + 1,
            device_id: record.device_id.clone(),
            mobile: record.mobile,
            created_at: now,
        };
        self.tokens.create(&next).await?;
        self.accounts.touch_last_login(account.id, now).await?;

        let pair = self.issue_pair(&account, &next, now).await?;

        tracing::debug!(
            account_id = %account.id,
            family_id = %next.family_id,
            generation = next.generation,
            "refresh token rotated"
        );
        self.audit.record(AuditEvent {
            account_id: Some(account.id),
            email: Some(account.email.clone()),
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            ..AuditEvent::new(AuditKind::TokenRefresh, true)
        });

        Ok(pair)
    }

    /// Family-wide invalidation in response to a replayed token
    async fn react_to_theft(
        &self,
        claims: &RefreshClaims,
        client: &ClientInfo,
    ) -> AuthResult<TokenPair> {
        let removed = self.tokens.delete_family(&claims.family_id).await?;
        tracing::warn!(
            family_id = %claims.family_id,
            presented_generation = claims.generation,
            removed,
            "refresh token replay detected, family revoked"
        );
        self.audit.record(AuditEvent {
            account_id: Uuid::parse_str(&claims.sub).ok(),
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            detail: Some("superseded token replayed".to_string()),
            ..AuditEvent::new(AuditKind::TokenTheft, false)
        });
        Err(AuthError::InvalidToken)
    }

    /// Invalidate every session for the token's owner
    ///
    /// Deliberately wide blast radius: logout acts as a full session reset
    /// across devices. Already-absent tokens make this a no-op.
    pub async fn logout(&self, refresh_jwt: &str, client: &ClientInfo) -> AuthResult<()> {
        let claims = self.signer.decode_refresh(refresh_jwt)?;
        let account_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        let removed = self.tokens.delete_for_account(account_id).await?;
        tracing::debug!(%account_id, removed, "logout cleared refresh tokens");
        self.audit.record(AuditEvent {
            account_id: Some(account_id),
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            ..AuditEvent::new(AuditKind::Logout, true)
        });
        Ok(())
    }

    /// Administrative revocation of every token an account holds
    pub async fn revoke_all_tokens(&self, account_id: Uuid) -> AuthResult<u64> {
        let removed = self.tokens.delete_for_account(account_id).await?;
        tracing::info!(%account_id, removed, "revoked all refresh tokens");
        self.audit.record(AuditEvent {
            account_id: Some(account_id),
            ..AuditEvent::new(AuditKind::TokenRevocation, true)
        });
        Ok(removed)
    }

    /// Non-expired tokens currently held by an account
    pub async fn active_tokens(&self, account_id: Uuid) -> AuthResult<Vec<RefreshTokenRecord>> {
        let now = Utc::now();
        Ok(self
            .tokens
            .list_for_account(account_id)
            .await?
            .into_iter()
            .filter(|token| token.expires_at > now)
            .collect())
    }

    /// Remove expired token rows; safe to run repeatedly
    pub async fn cleanup_expired_tokens(&self) -> AuthResult<u64> {
        let removed = self.tokens.delete_expired(Utc::now()).await?;
        if removed > 0 {
            tracing::info!(removed, "cleaned up expired refresh tokens");
        } else {
            tracing::debug!("token cleanup: nothing expired");
        }
        Ok(removed)
    }

    /// Verify an access token and return its live account
    ///
    /// Validity is cryptographic plus a live-account check; access tokens
    /// are never looked up in storage. Deactivation therefore only takes
    /// effect the next time the token is presented here.
    pub async fn validate_access_token(&self, access_jwt: &str) -> AuthResult<Account> {
        let claims = self.signer.decode_access(access_jwt)?;
        let account_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        let account = match self.accounts.get(account_id).await {
            Ok(account) => account,
            Err(AuthError::AccountNotFound) => return Err(AuthError::InvalidToken),
            Err(err) => return Err(err),
        };

        if !account.active {
            return Err(AuthError::AccountInactive);
        }

        Ok(account)
    }

    async fn issue_pair(
        &self,
        account: &Account,
        record: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> AuthResult<TokenPair> {
        let roles = self.resolver.roles_for_account(account.id).await?;
        let permissions = self.resolver.permissions_for_account(account.id).await?;

        let access_expires_at = now + self.config.access_ttl();
        let access_token = self.signer.encode_access(&AccessClaims {
            sub: account.id.to_string(),
            email: account.email.clone(),
            roles: roles.into_iter().map(|role| role.name).collect(),
            permissions: permissions
                .into_iter()
                .map(|permission| permission.name)
                .collect(),
            iat: now.timestamp(),
            exp: access_expires_at.timestamp(),
        })?;

        let refresh_token = self.signer.encode_refresh(&RefreshClaims {
            sub: account.id.to_string(),
            token: record.token.clone(),
            family_id: record.family_id.clone(),
            generation: record.generation,
            iat: now.timestamp(),
            exp: record.expires_at.timestamp(),
        })?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at: record.expires_at,
        })
    }

    async fn rotation_guard(&self, token: &str) -> Arc<Mutex<()>> {
        let mut locks = self.rotation_locks.lock().await;
        locks.entry(token.to_string()).or_default().clone()
    }

    async fn release_rotation_guard(&self, token: &str, guard: &Arc<Mutex<()>>) {
        let mut locks = self.rotation_locks.lock().await;
        // Last holder cleans up the map entry
        if Arc::strong_count(guard) <= 2 {
            locks.remove(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_token_shape() {
        let token = generate_opaque_token();
        assert_eq!(token.len(), OPAQUE_TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_opaque_tokens_are_unique() {
        use std::collections::HashSet;
        let tokens: HashSet<String> = (0..100).map(|_| generate_opaque_token()).collect();
        assert_eq!(tokens.len(), 100);
    }
}
