//! Gatehouse: authentication and authorization core for a multi-tenant
//! account service.
//!
//! Four tightly coupled mechanisms make up the core:
//!
//! - [`tokens::TokenManager`] issues and rotates access/refresh token pairs,
//!   tracks token families and generations, and turns refresh-token replay
//!   into family-wide invalidation (theft detection).
//! - [`permissions::PermissionResolver`] combines role-derived permissions,
//!   direct grants, and explicit denies into an effective permission set;
//!   deny always wins.
//! - [`password_reset::PasswordResetManager`] runs the single-use,
//!   time-limited reset flow under a per-identity sliding-window rate limit.
//! - [`invitations::InvitationManager`] issues single-use, role-carrying
//!   invitation tokens and creates accounts on acceptance.
//!
//! Persistence, password hashing, token signing, and audit logging are
//! collaborators behind traits ([`store`], [`password`], [`jwt`], [`audit`]);
//! the crate ships default implementations for each, including the in-memory
//! store the test suite runs against.

pub mod accounts;
pub mod audit;
pub mod config;
pub mod error;
pub mod invitations;
pub mod jwt;
pub mod password;
pub mod password_reset;
pub mod permissions;
pub mod rate_limit;
pub mod store;
pub mod tokens;

pub use accounts::{normalize_email, AccountService, NewAccount};
pub use audit::{AuditEvent, AuditKind, AuditLogger, AuditSink, TracingAuditSink};
pub use config::{
    AuthConfig, InvitationConfig, PasswordPolicy, PasswordResetConfig, TokenConfig,
};
pub use error::{AuthError, AuthResult};
pub use invitations::{AcceptInvitation, InvitationManager, NewInvitation};
pub use jwt::{AccessClaims, JwtSigner, RefreshClaims, TokenSigner};
pub use password::{Argon2PasswordHasher, PasswordHasher};
pub use password_reset::PasswordResetManager;
pub use permissions::PermissionResolver;
pub use rate_limit::SlidingWindowLimiter;
pub use store::MemoryStore;
pub use tokens::{ClientInfo, TokenManager, TokenPair};
