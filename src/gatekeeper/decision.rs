use super::{
    classifier::{RouteClass, RoutePattern, normalize_path},
    session::SessionState,
};

/// Decision
///
/// The single outcome the gatekeeper produces for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// `return_url` is the original request path and query.
    RedirectToSignIn { return_url: String },
    RedirectToOnboarding,
    RedirectToHome,
    /// Fail-open: the wallet status could not be determined, the request goes through.
    AllowDespiteError,
}

impl Decision {
    pub fn allows(&self) -> bool {
        matches!(self, Self::Allow | Self::AllowDespiteError)
    }
}

/// DecisionEngine
///
/// Pure state machine over `(RouteClass, SessionState, path)`. Holds only immutable
/// configuration, so applying it twice to the same input yields the same `Decision`.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    onboarding_path: String,
    onboarding_exempt: Vec<RoutePattern>,
}

impl DecisionEngine {
    pub fn new(onboarding_path: &str, onboarding_exempt: Vec<RoutePattern>) -> Self {
        Self {
            onboarding_path: normalize_path(onboarding_path).to_string(),
            onboarding_exempt,
        }
    }

    /// decide
    ///
    /// Order of evaluation:
    /// 1. Static routes are always allowed.
    /// 2. Unauthenticated callers: Protected → sign-in redirect, Public → allow.
    /// 3. Authenticated but wallet status unknown → fail-open.
    /// 4. Onboarding checks, which outrank the public/protected distinction.
    pub fn decide(&self, route: RouteClass, session: &SessionState, current_url: &str) -> Decision {
        if route == RouteClass::Static {
            return Decision::Allow;
        }

        if !session.authenticated {
            return match route {
                RouteClass::Protected => Decision::RedirectToSignIn {
                    return_url: current_url.to_string(),
                },
                _ => Decision::Allow,
            };
        }

        if session.metadata_fetch_failed {
            return Decision::AllowDespiteError;
        }

        let path = normalize_path(current_url);
        let on_onboarding = path == self.onboarding_path;

        match (session.has_wallet(), on_onboarding) {
            (true, true) => Decision::RedirectToHome,
            (false, false) if !self.is_exempt(path) => Decision::RedirectToOnboarding,
            _ => Decision::Allow,
        }
    }

    /// is_exempt
    ///
    /// Transitional pages (e.g. a wallet-transfer continuation) that must stay
    /// reachable mid-onboarding.
    pub fn is_exempt(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.onboarding_exempt.iter().any(|pattern| pattern.matches(path))
    }
}
