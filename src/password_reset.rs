/// Password recovery: single-use reset tokens under a per-identity
/// sliding-window rate limit
use crate::accounts::{normalize_email, AccountService};
use crate::audit::{AuditEvent, AuditKind, AuditLogger};
use crate::config::PasswordResetConfig;
use crate::error::{AuthError, AuthResult};
use crate::rate_limit::SlidingWindowLimiter;
use crate::store::{PasswordResetToken, RateLimitStore, ResetTokenStore};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Password reset manager
pub struct PasswordResetManager {
    accounts: Arc<AccountService>,
    reset_tokens: Arc<dyn ResetTokenStore>,
    limiter: SlidingWindowLimiter,
    audit: AuditLogger,
    config: PasswordResetConfig,
}

impl PasswordResetManager {
    pub fn new(
        accounts: Arc<AccountService>,
        reset_tokens: Arc<dyn ResetTokenStore>,
        rate_limits: Arc<dyn RateLimitStore>,
        audit: AuditLogger,
        config: PasswordResetConfig,
    ) -> Self {
        let limiter = SlidingWindowLimiter::new(
            rate_limits,
            config.rate_limit_window_secs,
            config.rate_limit_max_attempts,
        );
        Self {
            accounts,
            reset_tokens,
            limiter,
            audit,
            config,
        }
    }

    /// Start a reset flow for an email address
    ///
    /// Unknown addresses return `Ok(None)` rather than an error, so the
    /// caller cannot distinguish "no such account" from "reset email sent".
    /// Known addresses are rate limited per identity. Multiple live tokens
    /// for the same account may coexist; each is independently single-use.
    pub async fn initiate(&self, email: &str) -> AuthResult<Option<PasswordResetToken>> {
        let email = normalize_email(email);

        let account = match self.accounts.find_by_email(&email).await? {
            Some(account) => account,
            None => {
                self.audit.record(AuditEvent {
                    email: Some(email),
                    detail: Some("unknown email".to_string()),
                    ..AuditEvent::new(AuditKind::PasswordResetRequest, false)
                });
                return Ok(None);
            }
        };

        let now = Utc::now();
        self.limiter.check(&email, now).await?;

        let token = PasswordResetToken {
            id: Uuid::new_v4(),
            token: Uuid::new_v4().to_string(),
            account_id: account.id,
            expires_at: now + self.config.token_ttl(),
            created_at: now,
        };
        self.reset_tokens.create(&token).await?;

        tracing::info!(account_id = %account.id, "password reset token issued");
        self.audit.record(AuditEvent {
            account_id: Some(account.id),
            email: Some(email),
            ..AuditEvent::new(AuditKind::PasswordResetRequest, true)
        });

        Ok(Some(token))
    }

    /// Consume a reset token and set the new password
    ///
    /// The strength check runs first so a rejected password does not burn
    /// the token. Absent, expired, and already-consumed tokens are all
    /// `InvalidToken`.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        self.accounts.validate_password(new_password)?;

        let record = self
            .reset_tokens
            .find_by_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if Utc::now() > record.expires_at {
            self.reset_tokens.delete(record.id).await?;
            return Err(AuthError::InvalidToken);
        }

        // Deleting the row is the consumption point; a racing call that
        // also found the record loses here
        if !self.reset_tokens.delete(record.id).await? {
            return Err(AuthError::InvalidToken);
        }

        self.accounts
            .set_password(record.account_id, new_password)
            .await?;

        tracing::info!(account_id = %record.account_id, "password reset completed");
        self.audit.record(AuditEvent {
            account_id: Some(record.account_id),
            ..AuditEvent::new(AuditKind::PasswordReset, true)
        });

        Ok(())
    }

    /// Remove expired reset tokens; returns the count removed
    pub async fn cleanup_expired_tokens(&self) -> AuthResult<u64> {
        let removed = self.reset_tokens.delete_expired(Utc::now()).await?;
        if removed > 0 {
            tracing::info!(removed, "cleaned up expired password reset tokens");
        }
        Ok(removed)
    }

    /// Remove aged-out rate-limit windows; returns the count removed
    pub async fn cleanup_expired_rate_limits(&self) -> AuthResult<u64> {
        self.limiter.cleanup(Utc::now()).await
    }
}
