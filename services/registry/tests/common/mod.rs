use axum::Router;
use chrono::Utc;
use registry::app::{AppState, build_router};
use registry::auth::api_keys::{ApiKeyManager, ManualClock};
use registry::auth::cli_token::CliTokenIssuer;
use registry::auth::rbac::backend::CasbinRuleBackend;
use registry::auth::rbac::enforcer::RoleEnforcer;
use registry::auth::rbac::policy_store::{GroupingRule, PolicyRule};
use registry::auth::session::{InMemorySessionStore, Sessions};
use registry::store::memory::InMemoryStore;
use registry_authz::Subject;
use std::sync::Arc;
use std::time::Duration;

pub const SECRET: &str = "test-secret";
pub const ADMIN_EMAIL: &str = "root@example.com";

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn bearer(&self, subject: &Subject) -> String {
        let token = self.state.tokens.mint(subject).expect("mint");
        format!("Bearer {token}")
    }
}

/// App whose only rule makes `root@example.com` an admin, plus `extra` rules.
pub async fn test_app(extra: Vec<PolicyRule>) -> TestApp {
    test_app_with(extra, vec![GroupingRule::new(ADMIN_EMAIL, "role:admin")]).await
}

pub async fn test_app_with(policies: Vec<PolicyRule>, groupings: Vec<GroupingRule>) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let backend = CasbinRuleBackend::from_rules(&policies, &groupings)
        .await
        .expect("rules");
    let enforcer = RoleEnforcer::new(Arc::new(backend), "readonly");
    let tokens = CliTokenIssuer::new(SECRET, Duration::from_secs(300)).expect("tokens");
    let sessions = Sessions::new(Arc::new(InMemorySessionStore::new()), "registry_session");
    let api_keys = ApiKeyManager::with_clock(store.clone(), clock.clone());
    let state = AppState::with_api_keys(store.clone(), enforcer, tokens, sessions, api_keys);
    TestApp {
        state,
        store,
        clock,
    }
}

pub fn admin() -> Subject {
    Subject::user("root", ADMIN_EMAIL)
}

pub fn reader() -> Subject {
    Subject::user("reader", "reader@example.com")
}
