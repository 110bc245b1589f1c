use std::{env, time::Duration};

use crate::gatekeeper::{RoutePattern, WalletStatusSource};

// --- Canonical route configuration ---

const DEFAULT_PUBLIC_ROUTES: &str = "/,/onboarding,/asset/*,/news/*,/sign-in/*,/sign-up/*,/health";
const DEFAULT_STATIC_PREFIXES: &str = "/_next,/static,/swagger-ui,/api-docs";
// `js` but never `json`: API payloads must stay gated.
const DEFAULT_STATIC_EXTENSIONS: &str =
    "html,htm,css,js,jpg,jpeg,webp,png,gif,svg,ttf,woff,woff2,ico,csv,doc,docx,xls,xlsx,zip,webmanifest";
const DEFAULT_ONBOARDING_EXEMPT: &str = "/transfer/*";

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";

/// AppConfig
///
/// Holds the service's entire configuration. Immutable once loaded and pulled into
/// handlers and middleware through `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the local `x-user-id` bypass and log format.
    pub env: Env,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Shared secret used to verify session tokens (HS256).
    pub jwt_secret: String,
    // Name of the cookie holding the session token.
    pub session_cookie: String,
    // Base URL of the identity provider's user API.
    pub identity_api_url: String,
    // Secret key for the identity provider's user API.
    pub identity_api_key: String,
    // Base URL of the backend REST API behind the reverse proxy.
    pub backend_api_url: String,
    pub wallet_source: WalletStatusSource,
    // Upper bound on the live user-metadata lookup.
    pub lookup_timeout: Duration,
    // Upper bound on each proxied upstream call.
    pub proxy_timeout: Duration,
    pub routes: RouteConfig,
}

/// RouteConfig
///
/// The route matcher configuration surface, independent of the decision logic.
#[derive(Clone, Debug)]
pub struct RouteConfig {
    /// Ordered public patterns; first match wins.
    pub public: Vec<RoutePattern>,
    pub static_prefixes: Vec<String>,
    pub static_extensions: Vec<String>,
    /// Pages that stay reachable for authenticated users who have not finished onboarding.
    pub onboarding_exempt: Vec<RoutePattern>,
    pub onboarding_path: String,
    pub home_path: String,
    pub sign_in_url: String,
    /// Paths under this prefix get JSON rejections instead of browser redirects.
    pub api_prefix: String,
}

/// Env
///
/// Defines the runtime context.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            public: parse_patterns("GATEKEEPER_PUBLIC_ROUTES", DEFAULT_PUBLIC_ROUTES),
            static_prefixes: split_list(DEFAULT_STATIC_PREFIXES),
            static_extensions: split_list(DEFAULT_STATIC_EXTENSIONS),
            onboarding_exempt: parse_patterns("GATEKEEPER_ONBOARDING_EXEMPT", DEFAULT_ONBOARDING_EXEMPT),
            onboarding_path: "/onboarding".to_string(),
            home_path: "/".to_string(),
            sign_in_url: "/sign-in".to_string(),
            api_prefix: "/api".to_string(),
        }
    }
}

impl Default for AppConfig {
    /// default
    ///
    /// Non-panicking configuration for tests and local scaffolding; no environment
    /// variables are read.
    fn default() -> Self {
        Self {
            env: Env::Local,
            bind_addr: "127.0.0.1:3000".to_string(),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            session_cookie: "__session".to_string(),
            identity_api_url: "http://localhost:4010".to_string(),
            identity_api_key: "local-identity-key".to_string(),
            backend_api_url: "http://localhost:8080".to_string(),
            wallet_source: WalletStatusSource::default(),
            lookup_timeout: Duration::from_millis(1500),
            proxy_timeout: Duration::from_secs(10),
            routes: RouteConfig::default(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads all parameters from environment variables and fails fast.
    ///
    /// # Panics
    /// Panics if a variable required in Production is missing, or if any route
    /// pattern, duration or wallet source is malformed. The gatekeeper must never
    /// start with a half-understood policy.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").unwrap_or_default().as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let defaults = AppConfig::default();
        let required = |key: &str, local_default: &str| match env {
            Env::Production => {
                env::var(key).unwrap_or_else(|_| panic!("FATAL: {key} must be set in production."))
            }
            Env::Local => env::var(key).unwrap_or_else(|_| local_default.to_string()),
        };

        let wallet_source = match env::var("WALLET_STATUS_SOURCE") {
            Ok(raw) => raw
                .parse()
                .unwrap_or_else(|e| panic!("FATAL: WALLET_STATUS_SOURCE: {e}")),
            Err(_) => WalletStatusSource::default(),
        };

        let routes = RouteConfig {
            public: parse_patterns(
                "GATEKEEPER_PUBLIC_ROUTES",
                &env_or("GATEKEEPER_PUBLIC_ROUTES", DEFAULT_PUBLIC_ROUTES),
            ),
            static_prefixes: split_list(&env_or("GATEKEEPER_STATIC_PREFIXES", DEFAULT_STATIC_PREFIXES)),
            static_extensions: split_list(&env_or(
                "GATEKEEPER_STATIC_EXTENSIONS",
                DEFAULT_STATIC_EXTENSIONS,
            )),
            onboarding_exempt: parse_patterns(
                "GATEKEEPER_ONBOARDING_EXEMPT",
                &env_or("GATEKEEPER_ONBOARDING_EXEMPT", DEFAULT_ONBOARDING_EXEMPT),
            ),
            onboarding_path: env_or("ONBOARDING_PATH", &defaults.routes.onboarding_path),
            home_path: env_or("HOME_PATH", &defaults.routes.home_path),
            sign_in_url: env_or("SIGN_IN_URL", &defaults.routes.sign_in_url),
            api_prefix: env_or("API_PREFIX", &defaults.routes.api_prefix),
        };

        Self {
            env,
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000"),
            jwt_secret: required("SESSION_JWT_SECRET", LOCAL_JWT_SECRET),
            session_cookie: env_or("SESSION_COOKIE_NAME", &defaults.session_cookie),
            identity_api_url: required("IDENTITY_API_URL", &defaults.identity_api_url),
            identity_api_key: required("IDENTITY_API_KEY", &defaults.identity_api_key),
            backend_api_url: required("BACKEND_API_URL", &defaults.backend_api_url),
            wallet_source,
            lookup_timeout: env_millis("IDENTITY_LOOKUP_TIMEOUT_MS", defaults.lookup_timeout),
            proxy_timeout: env_millis("PROXY_TIMEOUT_MS", defaults.proxy_timeout),
            routes,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_millis(key: &str, default: Duration) -> Duration {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .unwrap_or_else(|_| panic!("FATAL: {key} must be a number of milliseconds, got `{raw}`")),
        Err(_) => default,
    }
}

/// split_list
///
/// Comma-separated list; blanks are dropped, so an empty string is an empty list.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_patterns(key: &str, raw: &str) -> Vec<RoutePattern> {
    split_list(raw)
        .iter()
        .map(|item| {
            RoutePattern::parse(item).unwrap_or_else(|e| panic!("FATAL: {key}: {e}"))
        })
        .collect()
}
