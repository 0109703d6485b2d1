//! Request authorization.
//!
//! # Purpose
//! Decides whether a subject may perform an action on an object and wires
//! that decision into routes as a guard.
//!
//! # Decision order
//! 1. Isolation: a caller holding an API key may only touch modules and
//!    providers whose namespace is its own authority, public or not.
//! 2. Per-key policies: an explicit `Deny` or `Allow` on the key decides.
//! 3. Public read: `get` on a module or provider of a public authority.
//! 4. The role enforcer.
//!
//! # Notes
//! The public-read lookup fails open to "not public" and falls through to the
//! role enforcer. Every other failure denies.
use crate::api::error::{ApiError, api_forbidden};
use crate::auth::context::RequestContext;
use crate::auth::rbac::enforcer::RoleEnforcer;
use crate::observability::record_authz_decision;
use crate::store::{RegistryStore, StoreError};
use axum::extract::{FromRequestParts, Path, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use registry_authz::{
    Action, Permission, RbacAction, RbacError, RbacResource, Subject, compose_resource,
    evaluate_all, namespace_of,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Path parameters of the matched route.
pub type PathParams = HashMap<String, String>;

pub type ObjectFuture = BoxFuture<'static, Result<String, ApiError>>;

/// Derives the authorization object from the request path.
pub type ObjectFn = Arc<dyn Fn(&PathParams) -> ObjectFuture + Send + Sync>;

#[derive(Clone)]
pub struct Authorizer {
    store: Arc<dyn RegistryStore>,
    enforcer: RoleEnforcer,
}

impl Authorizer {
    pub fn new(store: Arc<dyn RegistryStore>, enforcer: RoleEnforcer) -> Self {
        Self { store, enforcer }
    }

    pub async fn can_perform(
        &self,
        subject: &Subject,
        resource: &str,
        action: &str,
        object: &str,
    ) -> bool {
        let allowed = self.decide(subject, resource, action, object).await;
        tracing::debug!(
            subject = %subject.name,
            email = %subject.email,
            authority = %subject.authority,
            resource,
            action,
            object,
            allowed,
            "authorization decision"
        );
        record_authz_decision(resource, action, allowed);
        allowed
    }

    /// [`Authorizer::can_perform`] for handlers whose object is only known
    /// after reading the body.
    pub async fn authorize(
        &self,
        context: &RequestContext,
        resource: RbacResource,
        action: RbacAction,
        object: &str,
    ) -> Result<(), ApiError> {
        let subject = context.subject_or_anonymous();
        if self
            .can_perform(&subject, resource.as_str(), action.as_str(), object)
            .await
        {
            Ok(())
        } else {
            Err(api_forbidden(&forbidden_message(resource, action)))
        }
    }

    /// Guard factory for one resource.
    pub fn require_authorization(&self, resource: RbacResource) -> GuardFactory {
        GuardFactory {
            authorizer: self.clone(),
            resource,
        }
    }

    async fn decide(&self, subject: &Subject, resource: &str, action: &str, object: &str) -> bool {
        let tenant_scoped = resource
            .parse::<RbacResource>()
            .is_ok_and(RbacResource::is_tenant_scoped);
        let namespace = namespace_of(object);

        if subject.is_api_key()
            && tenant_scoped
            && !namespace.eq_ignore_ascii_case(&subject.authority)
        {
            tracing::debug!(
                authority = %subject.authority,
                namespace,
                "object outside the key's authority"
            );
            return false;
        }

        match key_policy_permission(subject, resource, action, object) {
            Permission::Granted => return true,
            Permission::Denied => return false,
            Permission::Uncertain => {}
        }

        if tenant_scoped && action == RbacAction::Get.as_str() && self.is_public(namespace).await {
            return true;
        }

        match self.enforcer.protect(subject, resource, action, object) {
            Ok(()) => true,
            Err(RbacError::Unsupported(element)) => {
                tracing::warn!(element = %element, "unsupported authorization request");
                false
            }
            Err(_) => false,
        }
    }

    async fn is_public(&self, namespace: &str) -> bool {
        if namespace.is_empty() {
            return false;
        }
        match self.store.find_authority_by_name(namespace).await {
            Ok(authority) => authority.public,
            Err(StoreError::NotFound(_)) => false,
            Err(err) => {
                tracing::warn!(namespace, error = %err, "authority lookup failed");
                false
            }
        }
    }
}

/// Evaluate the policies attached to the caller's API key.
fn key_policy_permission(
    subject: &Subject,
    resource: &str,
    action: &str,
    object: &str,
) -> Permission {
    if subject.policies.is_empty() {
        return Permission::Uncertain;
    }
    let (Ok(resource), Ok(action)) = (resource.parse::<RbacResource>(), action.parse::<RbacAction>())
    else {
        return Permission::Uncertain;
    };
    let action = Action::new(resource.target(), action.operation());
    let resource = compose_resource(resource.resource_type(), object);
    evaluate_all(&subject.policies, &action, &resource)
}

fn forbidden_message(resource: RbacResource, action: RbacAction) -> String {
    format!("not allowed to {action} {resource}")
}

#[derive(Clone)]
pub struct GuardFactory {
    authorizer: Authorizer,
    resource: RbacResource,
}

impl GuardFactory {
    pub fn guard(&self, action: RbacAction, object: ObjectFn) -> AuthorizationGuard {
        AuthorizationGuard {
            authorizer: self.authorizer.clone(),
            resource: self.resource,
            action,
            object,
        }
    }
}

/// Route middleware that rejects with 403 unless the caller may perform the
/// action on the object derived from the path.
#[derive(Clone)]
pub struct AuthorizationGuard {
    authorizer: Authorizer,
    resource: RbacResource,
    action: RbacAction,
    object: ObjectFn,
}

impl AuthorizationGuard {
    pub async fn run(self, request: Request, next: Next) -> Response {
        let (mut parts, body) = request.into_parts();
        let params = match Path::<PathParams>::from_request_parts(&mut parts, &()).await {
            Ok(Path(params)) => params,
            Err(_) => PathParams::new(),
        };
        let subject = parts
            .extensions
            .get::<RequestContext>()
            .map(RequestContext::subject_or_anonymous)
            .unwrap_or_else(Subject::anonymous);

        let object = match (self.object)(&params).await {
            Ok(object) => object,
            Err(err) => return err.into_response(),
        };
        if !self
            .authorizer
            .can_perform(&subject, self.resource.as_str(), self.action.as_str(), &object)
            .await
        {
            return api_forbidden(&forbidden_message(self.resource, self.action)).into_response();
        }
        next.run(Request::from_parts(parts, body)).await
    }
}

/// Records every request that made it past authorization. Layer it inside
/// the guard so denied requests never reach it.
pub async fn audit_logging(request: Request, next: Next) -> Response {
    let subject = request
        .extensions()
        .get::<RequestContext>()
        .map(RequestContext::subject_or_anonymous)
        .unwrap_or_else(Subject::anonymous);
    tracing::info!(
        target: "registry::audit",
        name = %subject.name,
        email = %subject.email,
        authority = %subject.authority,
        method = %request.method(),
        uri = %request.uri(),
        "request allowed"
    );
    next.run(request).await
}

/// Object taken verbatim from a path parameter; an absent parameter yields
/// an empty object.
pub fn object_from_param(name: &'static str) -> ObjectFn {
    Arc::new(move |params: &PathParams| -> ObjectFuture {
        let object = params.get(name).cloned().unwrap_or_default();
        Box::pin(async move { Ok(object) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::rbac::backend::CasbinRuleBackend;
    use crate::auth::rbac::policy_store::{GroupingRule, PolicyRule};
    use crate::model::Authority;
    use crate::store::memory::InMemoryStore;
    use registry_authz::{Effect, Policy};
    use registry_common::AuthorityId;

    async fn authorizer_with(
        policies: Vec<PolicyRule>,
        groupings: Vec<GroupingRule>,
    ) -> (Arc<InMemoryStore>, Authorizer) {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_authority(Authority::new("acme", "owner@acme.io", false))
            .await
            .unwrap();
        store
            .create_authority(Authority::new("opensrc", "owner@opensrc.io", true))
            .await
            .unwrap();
        let backend = CasbinRuleBackend::from_rules(&policies, &groupings)
            .await
            .unwrap();
        let enforcer = RoleEnforcer::new(Arc::new(backend), "");
        (store.clone(), Authorizer::new(store, enforcer))
    }

    async fn authorizer() -> Authorizer {
        authorizer_with(vec![], vec![]).await.1
    }

    fn key_subject(authority: &str) -> Subject {
        Subject {
            email: format!("owner@{authority}.io"),
            authority: authority.to_string(),
            authority_id: Some(AuthorityId::new()),
            ..Subject::default()
        }
    }

    #[tokio::test]
    async fn api_key_reads_own_namespace() {
        let authz = authorizer().await;
        assert!(
            authz
                .can_perform(&key_subject("acme"), "modules", "get", "acme/mod/aws")
                .await
        );
    }

    #[tokio::test]
    async fn isolation_is_case_insensitive() {
        let authz = authorizer().await;
        assert!(
            authz
                .can_perform(&key_subject("ACME"), "modules", "get", "acme/mod/aws")
                .await
        );
    }

    #[tokio::test]
    async fn isolation_precedes_public_read() {
        let authz = authorizer().await;
        assert!(
            !authz
                .can_perform(&key_subject("acme"), "modules", "get", "opensrc/mod/aws")
                .await
        );
        assert!(
            !authz
                .can_perform(&key_subject("acme"), "providers", "get", "opensrc/aws")
                .await
        );
    }

    #[tokio::test]
    async fn isolation_ignores_non_tenant_resources() {
        let authz = authorizer().await;
        assert!(
            authz
                .can_perform(&key_subject("acme"), "authorities", "get", "opensrc")
                .await
        );
    }

    #[tokio::test]
    async fn anonymous_reads_public_only() {
        let authz = authorizer().await;
        let anonymous = Subject::anonymous();
        assert!(
            authz
                .can_perform(&anonymous, "modules", "get", "opensrc/mod/aws")
                .await
        );
        assert!(
            !authz
                .can_perform(&anonymous, "modules", "get", "acme/mod/aws")
                .await
        );
        assert!(
            !authz
                .can_perform(&anonymous, "modules", "create", "opensrc/mod/aws")
                .await
        );
        assert!(
            !authz
                .can_perform(&anonymous, "providers", "get", "missing/aws")
                .await
        );
    }

    #[tokio::test]
    async fn users_fall_back_to_role_enforcer() {
        let (_, authz) = authorizer_with(
            vec![PolicyRule::new("role:publisher", "modules", "*", "acme/*")],
            vec![GroupingRule::new("pub@example.com", "role:publisher")],
        )
        .await;
        let reader = Subject::user("reader", "reader@example.com");
        assert!(authz.can_perform(&reader, "modules", "get", "acme/mod/aws").await);
        assert!(!authz.can_perform(&reader, "modules", "create", "acme/mod/aws").await);

        let publisher = Subject::user("pub", "pub@example.com");
        assert!(authz.can_perform(&publisher, "modules", "create", "acme/mod/aws").await);
        assert!(!authz.can_perform(&publisher, "modules", "create", "globex/mod/aws").await);
    }

    #[tokio::test]
    async fn unsupported_vocabulary_denies() {
        let (_, authz) = authorizer_with(vec![], vec![GroupingRule::new("root", "role:admin")]).await;
        let root = Subject::user("root", "");
        assert!(authz.can_perform(&root, "modules", "delete", "acme/x/y").await);
        assert!(!authz.can_perform(&root, "widgets", "delete", "acme/x/y").await);
        assert!(!authz.can_perform(&root, "modules", "purge", "acme/x/y").await);
    }

    #[tokio::test]
    async fn key_policies_decide_before_roles() {
        let authz = authorizer().await;
        let mut subject = key_subject("acme");
        subject.policies = vec![
            Policy::new(
                "publish",
                Effect::Allow,
                ["modules:create", "modules:update"],
                ["module:acme/*"],
            ),
            Policy::new(
                "no-vpc-reads",
                Effect::Deny,
                ["modules:get"],
                ["module:acme/vpc/*"],
            ),
        ];

        assert!(authz.can_perform(&subject, "modules", "create", "acme/mod/aws").await);
        assert!(!authz.can_perform(&subject, "modules", "get", "acme/vpc/aws").await);
        // uncertain policies fall through to the readonly default
        assert!(authz.can_perform(&subject, "modules", "get", "acme/mod/aws").await);
        assert!(!authz.can_perform(&subject, "modules", "delete", "acme/mod/aws").await);
        // policies never widen past isolation
        assert!(!authz.can_perform(&subject, "modules", "create", "globex/mod/aws").await);
    }

    #[tokio::test]
    async fn authorize_maps_denial_to_forbidden() {
        let authz = authorizer().await;
        let err = authz
            .authorize(
                &RequestContext::default(),
                RbacResource::Authorities,
                RbacAction::Create,
                "acme",
            )
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::FORBIDDEN);
        assert_eq!(err.body.message, "not allowed to create authorities");
    }

    #[tokio::test]
    async fn guard_uses_anonymous_subject_and_path_object() {
        use axum::Router;
        use axum::body::Body;
        use axum::http::StatusCode;
        use axum::routing::get;
        use tower::ServiceExt;

        let authz = authorizer().await;
        let guard = authz
            .require_authorization(RbacResource::Modules)
            .guard(RbacAction::Get, object_from_param("namespace"));
        let app: Router = Router::new().route(
            "/modules/:namespace",
            get(|| async { "ok" }).route_layer(axum::middleware::from_fn(
                move |request: Request, next: Next| guard.clone().run(request, next),
            )),
        );

        let public = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/modules/opensrc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(public.status(), StatusCode::OK);

        let private = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/modules/acme")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(private.status(), StatusCode::FORBIDDEN);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn audit_logs_only_allowed_requests() {
        use axum::Router;
        use axum::body::Body;
        use axum::http::StatusCode;
        use axum::routing::get;
        use tower::ServiceExt;

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let authz = authorizer().await;
        let guard = authz
            .require_authorization(RbacResource::Modules)
            .guard(RbacAction::Get, object_from_param("namespace"));
        let app: Router = Router::new().route(
            "/modules/:namespace",
            get(|| async { "ok" })
                .route_layer(axum::middleware::from_fn(audit_logging))
                .route_layer(axum::middleware::from_fn(
                    move |request: Request, next: Next| guard.clone().run(request, next),
                )),
        );
        let request = |subject: Option<Subject>| {
            let mut request = axum::http::Request::builder()
                .uri("/modules/acme")
                .body(Body::empty())
                .unwrap();
            if let Some(subject) = subject {
                request
                    .extensions_mut()
                    .insert(RequestContext::authenticated(subject));
            }
            request
        };

        let denied = app.clone().oneshot(request(None)).await.unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
        assert!(!logs.text().contains("request allowed"));

        let reader = Subject::user("reader", "reader@example.com");
        let allowed = app.oneshot(request(Some(reader))).await.unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        let text = logs.text();
        assert!(text.contains("request allowed"), "{text}");
        assert!(text.contains("reader@example.com"), "{text}");
        assert!(text.contains("/modules/acme"), "{text}");
    }

    #[tokio::test]
    async fn object_from_missing_param_is_empty() {
        let mut params = PathParams::new();
        params.insert("namespace".to_string(), "acme".to_string());
        assert_eq!((object_from_param("namespace"))(&params).await.unwrap(), "acme");
        assert_eq!((object_from_param("missing"))(&params).await.unwrap(), "");
    }
}
