//! Request gatekeeper: route classification, session resolution and the
//! allow/redirect decision that runs in front of every route.

pub mod classifier;
pub mod decision;
pub mod session;

pub use classifier::{PatternError, RouteClass, RouteClassifier, RoutePattern};
pub use decision::{Decision, DecisionEngine};
pub use session::{SessionResolver, SessionState, WalletStatusSource};

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

use crate::{
    config::{AppConfig, Env},
    identity::{IdentityState, RequestCredentials},
    models::ErrorEnvelope,
};

/// Verdict
///
/// Everything the gatekeeper learned about one request. `session` is `None` for
/// Static routes, which never reach the Session Resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub route: RouteClass,
    pub session: Option<SessionState>,
    pub decision: Decision,
}

/// Gatekeeper
///
/// Combines the Route Classifier, Session Resolver and Decision Engine, plus the
/// redirect targets needed to turn a `Decision` into a response.
pub struct Gatekeeper {
    classifier: RouteClassifier,
    resolver: SessionResolver,
    engine: DecisionEngine,
    sign_in_url: String,
    onboarding_path: String,
    home_path: String,
    session_cookie: String,
    allow_dev_bypass: bool,
}

/// GatekeeperState
///
/// The concrete type used to share the gatekeeper across the application state.
pub type GatekeeperState = Arc<Gatekeeper>;

impl Gatekeeper {
    /// from_config
    ///
    /// Builds the gatekeeper around an injected identity provider. Fails if the
    /// route configuration is ambiguous (duplicates, catch-all patterns).
    pub fn from_config(config: &AppConfig, provider: IdentityState) -> Result<Self, PatternError> {
        let routes = &config.routes;

        let classifier = RouteClassifier::new(
            routes.static_prefixes.clone(),
            routes.static_extensions.clone(),
            routes.public.clone(),
            &routes.api_prefix,
        )?;
        classifier::ensure_unique(&routes.onboarding_exempt)?;

        let resolver = SessionResolver::new(provider, config.wallet_source, config.lookup_timeout);
        let engine = DecisionEngine::new(&routes.onboarding_path, routes.onboarding_exempt.clone());

        Ok(Self {
            classifier,
            resolver,
            engine,
            sign_in_url: routes.sign_in_url.clone(),
            onboarding_path: routes.onboarding_path.clone(),
            home_path: routes.home_path.clone(),
            session_cookie: config.session_cookie.clone(),
            allow_dev_bypass: config.env == Env::Local,
        })
    }

    /// evaluate
    ///
    /// Classifier first (no I/O), resolver only for non-Static routes, then the
    /// pure decision.
    pub async fn evaluate(&self, headers: &HeaderMap, uri: &Uri) -> Verdict {
        let current_url = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());

        let route = self.classifier.classify(uri.path());
        if route == RouteClass::Static {
            return Verdict {
                route,
                session: None,
                decision: Decision::Allow,
            };
        }

        let credentials =
            RequestCredentials::from_headers(headers, &self.session_cookie, self.allow_dev_bypass);
        let session = self.resolver.resolve(&credentials).await;
        let decision = self.engine.decide(route, &session, current_url);

        match &decision {
            Decision::AllowDespiteError => tracing::warn!(
                path = %uri.path(),
                user_id = session.user_id.as_deref().unwrap_or_default(),
                "wallet status unknown; allowing request (fail-open)"
            ),
            other => tracing::debug!(
                path = %uri.path(),
                route = ?route,
                authenticated = session.authenticated,
                decision = ?other,
                "gatekeeper decision"
            ),
        }

        Verdict {
            route,
            session: Some(session),
            decision,
        }
    }

    /// reject
    ///
    /// Renders a blocking decision. Browser paths get a temporary redirect; API
    /// paths get a JSON envelope, since a redirect to an HTML page is useless to a
    /// fetch call. Returns `None` for allowing decisions.
    pub fn reject(&self, decision: &Decision, path: &str) -> Option<Response> {
        let is_api = self.classifier.is_api(path);

        let response = match decision {
            Decision::Allow | Decision::AllowDespiteError => return None,
            Decision::RedirectToSignIn { .. } if is_api => envelope(
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
                "a signed-in session is required",
            ),
            Decision::RedirectToSignIn { return_url } => {
                let separator = if self.sign_in_url.contains('?') { '&' } else { '?' };
                let location = format!(
                    "{}{}redirect_url={}",
                    self.sign_in_url,
                    separator,
                    urlencoding::encode(return_url)
                );
                Redirect::temporary(&location).into_response()
            }
            Decision::RedirectToOnboarding if is_api => envelope(
                StatusCode::FORBIDDEN,
                "Forbidden",
                "wallet onboarding must be completed first",
            ),
            Decision::RedirectToOnboarding => Redirect::temporary(&self.onboarding_path).into_response(),
            Decision::RedirectToHome => Redirect::temporary(&self.home_path).into_response(),
        };

        Some(response)
    }
}

fn envelope(status: StatusCode, message: &str, error: &str) -> Response {
    (status, Json(ErrorEnvelope::new(message, error))).into_response()
}

/// gatekeeper_middleware
///
/// Runs in front of every route, including the fallback. Allowed requests carry the
/// resolved `SessionState` in their extensions so handlers can read it.
pub async fn gatekeeper_middleware(
    State(gatekeeper): State<GatekeeperState>,
    mut request: Request,
    next: Next,
) -> Response {
    let verdict = gatekeeper.evaluate(request.headers(), request.uri()).await;

    if let Some(response) = gatekeeper.reject(&verdict.decision, request.uri().path()) {
        return response;
    }

    if let Some(session) = verdict.session {
        request.extensions_mut().insert(session);
    }

    next.run(request).await
}
