//! Service wiring for the auth core.
//!
//! Dev/test runs fully in memory; set `USE_PERSISTENT_STORES=true` (with the
//! `redis` feature) for Postgres + Redis backends.

use std::sync::Arc;

use fleetgate_auth::{
    AuditSink, AuthUser, EmergencyMonitor, GovernanceService, IdentityStore, LoginService,
    PermissionResolver, ProofVerifier, Role, RoleScope, RuleSet, TokenConfig, TokenLifecycle,
};
use fleetgate_core::{RoleId, SystemClock, UserId};
use fleetgate_infra::{
    Argon2PasswordVerifier, InMemoryEphemeralStore, InMemoryIdentityStore,
    InMemoryRefreshTokenStore, TracingAuditSink, hash_password,
};

#[cfg(feature = "redis")]
use fleetgate_infra::{
    PostgresAuditSink, PostgresIdentityStore, PostgresRefreshTokenStore, RedisEphemeralStore,
};
#[cfg(feature = "redis")]
use sqlx::PgPool;

/// Role ids of the default catalogue (see `migrations/0001_auth_schema.sql`).
pub const PRIME_ROLE: RoleId = RoleId::new(1);
pub const STEWARD_ROLE: RoleId = RoleId::new(2);
pub const ORG_ADMIN_ROLE: RoleId = RoleId::new(3);
pub const ORG_MEMBER_ROLE: RoleId = RoleId::new(4);

/// Everything the routes and middleware need.
pub struct AuthServices {
    pub verifier: ProofVerifier,
    pub tokens: Arc<TokenLifecycle>,
    pub login: LoginService,
    pub resolver: PermissionResolver,
    pub governance: GovernanceService,
    pub emergency: Arc<EmergencyMonitor>,
    pub identity: Arc<dyn IdentityStore>,
    pub audit: Arc<dyn AuditSink>,
}

pub async fn build_services(jwt_secret: String) -> AuthServices {
    #[cfg(feature = "redis")]
    {
        let persistent = std::env::var("USE_PERSISTENT_STORES")
            .map(|value| value == "true")
            .unwrap_or(false);
        if persistent {
            return build_persistent_services(jwt_secret).await;
        }
    }
    build_in_memory_services(jwt_secret)
}

/// In-memory wiring (dev/test): seeded role catalogue plus a bootstrap
/// prime admin so the instance is immediately usable.
pub fn build_in_memory_services(jwt_secret: String) -> AuthServices {
    let clock = Arc::new(SystemClock);
    let identity = Arc::new(InMemoryIdentityStore::new());
    seed_catalogue(&identity);
    seed_bootstrap_admin(&identity);

    let ephemeral = Arc::new(InMemoryEphemeralStore::new(clock.clone()));
    let refresh = Arc::new(InMemoryRefreshTokenStore::new());
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

    assemble(identity, ephemeral, refresh, audit, clock, jwt_secret)
}

#[cfg(feature = "redis")]
async fn build_persistent_services(jwt_secret: String) -> AuthServices {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    let pool = PgPool::connect(&database_url)
        .await
        .expect("failed to connect to Postgres");
    let ephemeral = Arc::new(
        RedisEphemeralStore::connect(&redis_url)
            .await
            .expect("failed to connect to Redis"),
    );

    let identity = Arc::new(PostgresIdentityStore::new(pool.clone()));
    let refresh = Arc::new(PostgresRefreshTokenStore::new(pool.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(PostgresAuditSink::new(pool));

    assemble(
        identity,
        ephemeral,
        refresh,
        audit,
        Arc::new(SystemClock),
        jwt_secret,
    )
}

fn assemble(
    identity: Arc<dyn IdentityStore>,
    ephemeral: Arc<dyn fleetgate_auth::EphemeralStore>,
    refresh: Arc<dyn fleetgate_auth::RefreshTokenStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn fleetgate_core::Clock>,
    jwt_secret: String,
) -> AuthServices {
    let tokens = Arc::new(TokenLifecycle::new(
        refresh,
        clock.clone(),
        TokenConfig::new(jwt_secret),
    ));
    let emergency = Arc::new(EmergencyMonitor::new(
        identity.clone(),
        ephemeral.clone(),
        audit.clone(),
    ));

    AuthServices {
        verifier: ProofVerifier::new(ephemeral, clock),
        login: LoginService::new(
            identity.clone(),
            Arc::new(Argon2PasswordVerifier),
            tokens.clone(),
            audit.clone(),
        ),
        resolver: PermissionResolver::new(identity.clone(), emergency.clone()),
        governance: GovernanceService::new(
            identity.clone(),
            RuleSet::builtin(PRIME_ROLE, STEWARD_ROLE, ORG_ADMIN_ROLE),
            emergency.clone(),
            audit.clone(),
        ),
        tokens,
        emergency,
        identity,
        audit,
    }
}

fn seed_catalogue(identity: &InMemoryIdentityStore) {
    identity.insert_role(
        Role {
            id: PRIME_ROLE,
            name: "prime_admin".into(),
            scope: RoleScope::System,
            tier: 0,
            max_headcount: 3,
        },
        [
            "system:all".to_string(),
            "system:context_switch".to_string(),
            "roles:manage".to_string(),
        ],
    );
    identity.insert_role(
        Role {
            id: STEWARD_ROLE,
            name: "system_admin".into(),
            scope: RoleScope::System,
            tier: 1,
            max_headcount: -1,
        },
        ["system:operate".to_string(), "roles:manage".to_string()],
    );
    identity.insert_role(
        Role {
            id: ORG_ADMIN_ROLE,
            name: "org_admin".into(),
            scope: RoleScope::Organization,
            tier: 2,
            max_headcount: -1,
        },
        ["org:manage".to_string(), "org:read".to_string()],
    );
    identity.insert_role(
        Role {
            id: ORG_MEMBER_ROLE,
            name: "org_member".into(),
            scope: RoleScope::Organization,
            tier: 3,
            max_headcount: -1,
        },
        ["org:read".to_string()],
    );
}

fn seed_bootstrap_admin(identity: &InMemoryIdentityStore) {
    let password =
        std::env::var("FLEETGATE_DEV_PASSWORD").unwrap_or_else(|_| "fleetgate-dev".to_string());
    let password_hash = hash_password(&password).expect("failed to hash bootstrap password");

    identity.insert_user(AuthUser {
        id: UserId::new(1),
        email: "admin@fleetgate.dev".to_string(),
        password_hash,
        is_active: true,
    });
    identity.insert_assignment(UserId::new(1), PRIME_ROLE, None);

    let steward_hash = hash_password(&password).expect("failed to hash bootstrap password");
    identity.insert_user(AuthUser {
        id: UserId::new(2),
        email: "operator@fleetgate.dev".to_string(),
        password_hash: steward_hash,
        is_active: true,
    });
    identity.insert_assignment(UserId::new(2), STEWARD_ROLE, None);
}
