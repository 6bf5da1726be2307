/// Configuration for the authentication core
///
/// Every manager receives its slice of this configuration at construction.
/// Nothing reads ambient global state; callers build an `AuthConfig` from
/// whatever source they use (environment, file, flags) and hand the pieces
/// down.
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Top-level configuration consumed by the managers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub tokens: TokenConfig,
    pub password_reset: PasswordResetConfig,
    pub invitations: InvitationConfig,
    pub password_policy: PasswordPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            tokens: TokenConfig::default(),
            password_reset: PasswordResetConfig::default(),
            invitations: InvitationConfig::default(),
            password_policy: PasswordPolicy::default(),
        }
    }
}

/// Token lifetimes and signing material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// HMAC secret for JWT signing
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub access_ttl_secs: i64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: i64,
}

impl TokenConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::seconds(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_ttl_secs)
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "insecure-dev-secret".to_string(),
            access_ttl_secs: 15 * 60,         // 15 minutes
            refresh_ttl_secs: 7 * 24 * 3600,  // 7 days
        }
    }
}

/// Password-reset token lifetime and per-identity rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetConfig {
    /// Reset token lifetime in seconds
    pub token_ttl_secs: i64,
    /// Width of the sliding rate-limit window in seconds
    pub rate_limit_window_secs: i64,
    /// Reset requests permitted per identity per window
    pub rate_limit_max_attempts: u32,
}

impl PasswordResetConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::seconds(self.token_ttl_secs)
    }
}

impl Default for PasswordResetConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 3600,
            rate_limit_window_secs: 3600,
            rate_limit_max_attempts: 3,
        }
    }
}

/// Invitation token lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationConfig {
    /// Invitation lifetime in seconds
    pub ttl_secs: i64,
}

impl InvitationConfig {
    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_secs)
    }
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 7 * 24 * 3600, // 7 days
        }
    }
}

/// Password strength policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
}

impl PasswordPolicy {
    /// Check a candidate password against the policy
    ///
    /// Returns the first failed requirement as a human-readable reason.
    pub fn validate(&self, password: &str) -> Result<(), String> {
        if password.chars().count() < self.min_length {
            return Err(format!(
                "must be at least {} characters long",
                self.min_length
            ));
        }

        if self.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            return Err("must contain an uppercase letter".to_string());
        }

        if self.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            return Err("must contain a lowercase letter".to_string());
        }

        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err("must contain a digit".to_string());
        }

        Ok(())
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
        }
    }
}
