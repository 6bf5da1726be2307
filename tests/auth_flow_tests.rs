/// End-to-end tests for the token lifecycle: login, rotation, theft
/// detection, logout, and access-token validation.
mod common;

use chrono::{Duration, Utc};
use common::{client, env, env_with_config, register};
use gatehouse::store::{RefreshTokenRecord, TokenStore};
use gatehouse::{AuthConfig, AuthError, TokenSigner};
use uuid::Uuid;

const PASSWORD: &str = "Str0ngPassw0rd";

#[tokio::test]
async fn test_register_then_login_returns_distinct_tokens() {
    let env = env();
    register(&env, "ada@example.com", PASSWORD).await;

    let pair = env
        .tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();

    assert!(!pair.access_token.is_empty());
    assert!(!pair.refresh_token.is_empty());
    assert_ne!(pair.access_token, pair.refresh_token);
    assert!(pair.refresh_expires_at > pair.access_expires_at);
}

#[tokio::test]
async fn test_login_is_case_insensitive_on_email() {
    let env = env();
    register(&env, "User@X.com", PASSWORD).await;

    env.tokens
        .login("user@x.com", PASSWORD, &client())
        .await
        .unwrap();
    env.tokens
        .login("  USER@X.COM ", PASSWORD, &client())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_login_failures_do_not_distinguish_cause() {
    let env = env();
    register(&env, "ada@example.com", PASSWORD).await;

    let unknown = env
        .tokens
        .login("nobody@example.com", PASSWORD, &client())
        .await
        .unwrap_err();
    let mismatch = env
        .tokens
        .login("ada@example.com", "WrongPassw0rd", &client())
        .await
        .unwrap_err();

    assert!(matches!(unknown, AuthError::InvalidCredentials));
    assert!(matches!(mismatch, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_login_updates_last_login() {
    let env = env();
    let account = register(&env, "ada@example.com", PASSWORD).await;
    assert!(account.last_login.is_none());

    env.tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();

    let refreshed = env.accounts.get(account.id).await.unwrap();
    assert!(refreshed.last_login.is_some());
}

#[tokio::test]
async fn test_rotation_is_single_use_and_replay_kills_the_family() {
    let env = env();
    register(&env, "ada@example.com", PASSWORD).await;

    let first = env
        .tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();
    let second = env
        .tokens
        .refresh(&first.refresh_token, &client())
        .await
        .unwrap();
    assert_ne!(first.refresh_token, second.refresh_token);

    // Replaying the rotated-away token is the theft signal
    let replay = env
        .tokens
        .refresh(&first.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(replay, AuthError::InvalidToken));

    // Family-wide invalidation took the legitimate successor with it
    let successor = env
        .tokens
        .refresh(&second.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(successor, AuthError::TokenNotFound));
}

#[tokio::test]
async fn test_rotation_chain_survives_normal_use() {
    let env = env();
    register(&env, "ada@example.com", PASSWORD).await;

    let mut pair = env
        .tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();
    for _ in 0..4 {
        pair = env.tokens.refresh(&pair.refresh_token, &client()).await.unwrap();
    }

    let account = env
        .tokens
        .validate_access_token(&pair.access_token)
        .await
        .unwrap();
    assert_eq!(account.email, "ada@example.com");
}

#[tokio::test]
async fn test_concurrent_rotation_of_one_token_serializes() {
    let env = env();
    register(&env, "ada@example.com", PASSWORD).await;
    let pair = env
        .tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();

    let client_a = client();
    let client_b = client();
    let (a, b) = tokio::join!(
        env.tokens.refresh(&pair.refresh_token, &client_a),
        env.tokens.refresh(&pair.refresh_token, &client_b),
    );

    // Exactly one rotation may win; the loser must not produce a second pair
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
}

#[tokio::test]
async fn test_expired_refresh_token_is_deleted_on_presentation() {
    let mut config = AuthConfig::default();
    // Already expired at issuance, but still within the verifier's leeway
    config.tokens.refresh_ttl_secs = -60;
    let env = env_with_config(config);
    register(&env, "ada@example.com", PASSWORD).await;

    let pair = env
        .tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();

    let err = env
        .tokens
        .refresh(&pair.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenExpired));

    // The row was swept on presentation, so a second attempt cannot find it
    let err = env
        .tokens
        .refresh(&pair.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenNotFound));
}

#[tokio::test]
async fn test_deactivation_blocks_login_and_refresh_but_not_issued_access() {
    let env = env();
    let account = register(&env, "ada@example.com", PASSWORD).await;
    let pair = env
        .tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();

    // Access token valid while the account is live
    env.tokens
        .validate_access_token(&pair.access_token)
        .await
        .unwrap();

    env.accounts.set_active(account.id, false).await.unwrap();

    let refresh = env
        .tokens
        .refresh(&pair.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(refresh, AuthError::AccountInactive));

    let login = env
        .tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap_err();
    assert!(matches!(login, AuthError::AccountInactive));

    // The already-issued access token is only caught at re-validation
    let validate = env
        .tokens
        .validate_access_token(&pair.access_token)
        .await
        .unwrap_err();
    assert!(matches!(validate, AuthError::AccountInactive));

    // Reactivation restores login
    env.accounts.set_active(account.id, true).await.unwrap();
    env.tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_logout_clears_every_device_and_is_idempotent() {
    let env = env();
    let account = register(&env, "ada@example.com", PASSWORD).await;

    let laptop = env
        .tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();
    let phone = env
        .tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();
    assert_eq!(env.tokens.active_tokens(account.id).await.unwrap().len(), 2);

    env.tokens.logout(&laptop.refresh_token, &client()).await.unwrap();

    assert!(env.tokens.active_tokens(account.id).await.unwrap().is_empty());
    let err = env
        .tokens
        .refresh(&phone.refresh_token, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenNotFound));

    // Token rows are already gone; logout stays successful
    env.tokens.logout(&laptop.refresh_token, &client()).await.unwrap();
}

#[tokio::test]
async fn test_revoke_all_and_cleanup_report_counts() {
    let env = env();
    let account = register(&env, "ada@example.com", PASSWORD).await;
    env.tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();
    env.tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();

    assert_eq!(env.tokens.revoke_all_tokens(account.id).await.unwrap(), 2);
    assert_eq!(env.tokens.revoke_all_tokens(account.id).await.unwrap(), 0);
    assert_eq!(env.tokens.cleanup_expired_tokens().await.unwrap(), 0);
}

#[tokio::test]
async fn test_active_tokens_exclude_expired_rows() {
    let env = env();
    let account = register(&env, "ada@example.com", PASSWORD).await;
    env.tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();

    let stale = RefreshTokenRecord {
        id: Uuid::new_v4(),
        token: "stale-opaque-secret".to_string(),
        account_id: account.id,
        expires_at: Utc::now() - Duration::minutes(5),
        family_id: Uuid::new_v4().to_string(),
        generation: 0,
        device_id: None,
        mobile: false,
        created_at: Utc::now() - Duration::days(8),
    };
    TokenStore::create(env.store.as_ref(), &stale).await.unwrap();

    // The expired row is invisible to the listing but still persisted
    assert_eq!(env.tokens.active_tokens(account.id).await.unwrap().len(), 1);
    assert_eq!(
        TokenStore::list_for_account(env.store.as_ref(), account.id)
            .await
            .unwrap()
            .len(),
        2
    );

    assert_eq!(env.tokens.cleanup_expired_tokens().await.unwrap(), 1);
    assert_eq!(env.tokens.active_tokens(account.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cleanup_sweeps_expired_rows() {
    let mut config = AuthConfig::default();
    config.tokens.refresh_ttl_secs = -60;
    let env = env_with_config(config);
    register(&env, "ada@example.com", PASSWORD).await;
    env.tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();
    env.tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();

    assert_eq!(env.tokens.cleanup_expired_tokens().await.unwrap(), 2);
    assert_eq!(env.tokens.cleanup_expired_tokens().await.unwrap(), 0);
}

#[tokio::test]
async fn test_access_claims_embed_roles_and_permissions() {
    let env = env();
    let account = register(&env, "ada@example.com", PASSWORD).await;

    let role = env.resolver.create_role("editor", "content editor").await.unwrap();
    let read = env
        .resolver
        .create_permission("posts:read", "", "posts", "read")
        .await
        .unwrap();
    let write = env
        .resolver
        .create_permission("posts:write", "", "posts", "write")
        .await
        .unwrap();
    env.resolver.add_role_permission(role.id, read.id).await.unwrap();
    env.resolver.assign_role(account.id, role.id).await.unwrap();
    env.resolver.grant_permission(account.id, write.id).await.unwrap();
    env.resolver.deny_permission(account.id, read.id).await.unwrap();

    let pair = env
        .tokens
        .login("ada@example.com", PASSWORD, &client())
        .await
        .unwrap();
    let claims = env.signer.decode_access(&pair.access_token).unwrap();

    assert_eq!(claims.sub, account.id.to_string());
    assert_eq!(claims.roles, vec!["editor".to_string()]);
    // The deny stripped posts:read even though the role grants it
    assert_eq!(claims.permissions, vec!["posts:write".to_string()]);
}

#[tokio::test]
async fn test_garbage_tokens_are_rejected() {
    let env = env();

    assert!(matches!(
        env.tokens.validate_access_token("garbage").await.unwrap_err(),
        AuthError::InvalidToken
    ));
    assert!(matches!(
        env.tokens.refresh("garbage", &client()).await.unwrap_err(),
        AuthError::InvalidToken
    ));
    assert!(matches!(
        env.tokens.logout("garbage", &client()).await.unwrap_err(),
        AuthError::InvalidToken
    ));
}
