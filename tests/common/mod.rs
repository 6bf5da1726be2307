/// Shared wiring for integration tests: every manager assembled over one
/// in-memory store, the default Argon2 hasher, and a tracing audit sink.
use gatehouse::{
    AccountService, Argon2PasswordHasher, AuditLogger, AuthConfig, ClientInfo, InvitationManager,
    JwtSigner, MemoryStore, NewAccount, PasswordHasher, PasswordResetManager, PermissionResolver,
    TokenManager, TokenSigner, TracingAuditSink,
};
use std::sync::Arc;

pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub accounts: Arc<AccountService>,
    pub resolver: Arc<PermissionResolver>,
    pub tokens: TokenManager,
    pub resets: PasswordResetManager,
    pub invitations: InvitationManager,
    pub signer: Arc<JwtSigner>,
}

pub fn env() -> TestEnv {
    env_with_config(AuthConfig::default())
}

pub fn env_with_config(config: AuthConfig) -> TestEnv {
    let store = Arc::new(MemoryStore::new());
    let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2PasswordHasher);
    let signer = Arc::new(JwtSigner::new(&config.tokens.jwt_secret));

    let accounts = Arc::new(AccountService::new(
        store.clone(),
        hasher,
        config.password_policy.clone(),
    ));
    let resolver = Arc::new(PermissionResolver::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
    ));

    let (audit, _audit_worker) = AuditLogger::spawn(Arc::new(TracingAuditSink), 256);

    let tokens = TokenManager::new(
        accounts.clone(),
        store.clone(),
        resolver.clone(),
        signer.clone() as Arc<dyn TokenSigner>,
        audit.clone(),
        config.tokens.clone(),
    );
    let resets = PasswordResetManager::new(
        accounts.clone(),
        store.clone(),
        store.clone(),
        audit.clone(),
        config.password_reset.clone(),
    );
    let invitations = InvitationManager::new(
        accounts.clone(),
        store.clone(),
        resolver.clone(),
        store.clone(),
        audit,
        config.invitations.clone(),
    );

    TestEnv {
        store,
        accounts,
        resolver,
        tokens,
        resets,
        invitations,
        signer,
    }
}

pub fn client() -> ClientInfo {
    ClientInfo {
        ip: Some("203.0.113.7".to_string()),
        user_agent: Some("gatehouse-tests".to_string()),
        device_id: None,
        mobile: false,
    }
}

pub async fn register(env: &TestEnv, email: &str, password: &str) -> gatehouse::store::Account {
    env.accounts
        .register(NewAccount {
            email: email.to_string(),
            username: None,
            password: password.to_string(),
        })
        .await
        .unwrap()
}
