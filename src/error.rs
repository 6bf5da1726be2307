/// Unified error types for the authentication core
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for authentication and authorization operations
///
/// Security-sensitive paths deliberately collapse distinct causes into one
/// variant: `InvalidCredentials` covers both "unknown email" and "wrong
/// password" so the login surface cannot be used to enumerate accounts, and
/// `InvalidToken` covers malformed, replayed, and already-consumed tokens.
/// The underlying cause is still recorded through the audit pipeline.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Login failed: unknown identity or password mismatch
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Account lookup by id failed
    #[error("account not found")]
    AccountNotFound,

    /// Account exists but has been deactivated
    #[error("account is deactivated")]
    AccountInactive,

    /// Registration attempted with an email that is already registered
    #[error("email is already registered")]
    EmailAlreadyExists,

    /// Registration attempted with a username that is already taken
    #[error("username is already taken")]
    UsernameAlreadyExists,

    /// New password rejected by the strength policy
    #[error("password too weak: {0}")]
    PasswordTooWeak(String),

    /// Refresh token has no persisted row
    #[error("refresh token not found")]
    TokenNotFound,

    /// Refresh token row exists but is past its expiry
    #[error("token has expired")]
    TokenExpired,

    /// Malformed, replayed, or already-consumed token
    #[error("invalid token")]
    InvalidToken,

    /// Role lookup failed
    #[error("role not found")]
    RoleNotFound,

    /// Permission lookup failed
    #[error("permission not found")]
    PermissionNotFound,

    /// Invitation is past its expiry
    #[error("invitation has expired")]
    InvitationExpired,

    /// Invitation was already accepted or revoked
    #[error("invitation has already been used")]
    InvitationUsed,

    /// Too many attempts inside the current rate-limit window
    #[error("rate limit exceeded, retry after {retry_after}")]
    RateLimitExceeded {
        attempts: u32,
        retry_after: DateTime<Utc>,
    },

    /// Storage collaborator errors
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Internal errors (hashing, signing)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
