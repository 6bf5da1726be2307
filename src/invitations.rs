/// Invitation lifecycle: single-use, role-carrying onboarding tokens
///
/// An invitation is issued for an email address with a target role and an
/// expiry. Validation is read-only and repeatable; acceptance creates the
/// account and consumes the token; revocation consumes it without creating
/// anything. All three terminal states leave the token permanently unusable.
use crate::accounts::{normalize_email, AccountService, NewAccount};
use crate::audit::{AuditEvent, AuditKind, AuditLogger};
use crate::config::InvitationConfig;
use crate::error::{AuthError, AuthResult};
use crate::permissions::PermissionResolver;
use crate::store::{Account, Invitation, InvitationStore, RoleStore};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use uuid::Uuid;

const INVITATION_TOKEN_LEN: usize = 32;

/// Generate a unique invitation token
fn generate_invitation_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INVITATION_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Invitation creation request
#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub email: String,
    pub role_id: Uuid,
    pub created_by: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Registration data supplied when accepting an invitation
#[derive(Debug, Clone)]
pub struct AcceptInvitation {
    pub username: Option<String>,
    pub password: String,
}

/// Invitation manager
pub struct InvitationManager {
    accounts: Arc<AccountService>,
    roles: Arc<dyn RoleStore>,
    resolver: Arc<PermissionResolver>,
    invitations: Arc<dyn InvitationStore>,
    audit: AuditLogger,
    config: InvitationConfig,
}

impl InvitationManager {
    pub fn new(
        accounts: Arc<AccountService>,
        roles: Arc<dyn RoleStore>,
        resolver: Arc<PermissionResolver>,
        invitations: Arc<dyn InvitationStore>,
        audit: AuditLogger,
        config: InvitationConfig,
    ) -> Self {
        Self {
            accounts,
            roles,
            resolver,
            invitations,
            audit,
            config,
        }
    }

    /// Issue an invitation for an email address carrying a target role
    pub async fn create(&self, request: NewInvitation) -> AuthResult<Invitation> {
        let email = normalize_email(&request.email);

        self.roles
            .find_by_id(request.role_id)
            .await?
            .ok_or(AuthError::RoleNotFound)?;

        let now = Utc::now();
        let invitation = Invitation {
            id: Uuid::new_v4(),
            email: email.clone(),
            token: generate_invitation_token(),
            role_id: request.role_id,
            created_by: request.created_by,
            expires_at: now + self.config.ttl(),
            first_name: request.first_name,
            last_name: request.last_name,
            used: false,
            created_at: now,
        };
        self.invitations.create(&invitation).await?;

        tracing::info!(invitation_id = %invitation.id, "invitation created");
        self.audit.record(AuditEvent {
            account_id: Some(request.created_by),
            email: Some(email),
            ..AuditEvent::new(AuditKind::InvitationCreated, true)
        });

        Ok(invitation)
    }

    /// Check an invitation token without mutating state
    ///
    /// Repeatable until the invitation is consumed or expires.
    pub async fn validate(&self, token: &str) -> AuthResult<Invitation> {
        let invitation = self
            .invitations
            .find_by_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if Utc::now() > invitation.expires_at {
            return Err(AuthError::InvitationExpired);
        }

        if invitation.used {
            return Err(AuthError::InvitationUsed);
        }

        Ok(invitation)
    }

    /// Accept an invitation, creating an active account with its role
    ///
    /// A weak password or duplicate email fails before the invitation is
    /// marked used, so the token stays valid for another attempt.
    pub async fn accept(&self, token: &str, request: AcceptInvitation) -> AuthResult<Account> {
        let mut invitation = self.validate(token).await?;

        self.accounts.validate_password(&request.password)?;
        // The role could have been deleted since the invitation was issued
        self.roles
            .find_by_id(invitation.role_id)
            .await?
            .ok_or(AuthError::RoleNotFound)?;

        let account = self
            .accounts
            .register(NewAccount {
                email: invitation.email.clone(),
                username: request.username,
                password: request.password,
            })
            .await?;
        self.resolver
            .assign_role(account.id, invitation.role_id)
            .await?;

        invitation.used = true;
        self.invitations.update(&invitation).await?;

        tracing::info!(
            invitation_id = %invitation.id,
            account_id = %account.id,
            "invitation accepted"
        );
        self.audit.record(AuditEvent {
            account_id: Some(account.id),
            email: Some(account.email.clone()),
            ..AuditEvent::new(AuditKind::InvitationAccepted, true)
        });

        Ok(account)
    }

    /// Revoke an invitation, making its token permanently unusable
    pub async fn revoke(&self, id: Uuid, revoked_by: Uuid) -> AuthResult<()> {
        let mut invitation = self
            .invitations
            .find_by_id(id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if invitation.used {
            return Err(AuthError::InvitationUsed);
        }

        invitation.used = true;
        self.invitations.update(&invitation).await?;

        tracing::info!(invitation_id = %invitation.id, "invitation revoked");
        self.audit.record(AuditEvent {
            account_id: Some(revoked_by),
            email: Some(invitation.email.clone()),
            ..AuditEvent::new(AuditKind::InvitationRevoked, true)
        });

        Ok(())
    }
}
