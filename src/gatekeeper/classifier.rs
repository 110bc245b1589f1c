use std::{fmt, str::FromStr};

use thiserror::Error;

/// RouteClass
///
/// The three buckets every inbound path falls into. Static paths never reach the
/// Session Resolver; Public paths are reachable without a session; everything else
/// is Protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Static,
    Public,
    Protected,
}

/// PatternError
///
/// Rejections raised while parsing or assembling the route matcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("route pattern must not be empty")]
    Empty,
    #[error("route pattern `{0}` must start with '/'")]
    NotAbsolute(String),
    #[error("route pattern `{0}` matches every path; list explicit prefixes instead")]
    CatchAll(String),
    #[error("route pattern `{0}` is listed more than once")]
    Duplicate(String),
    #[error("route pattern `{0}` overlaps `{1}`; keep only the broader one")]
    Overlap(String, String),
}

/// RoutePattern
///
/// A single public or exempt path rule.
///
/// Textual form:
/// - `/onboarding` is an exact match (trailing slashes on the request are ignored).
/// - `/asset/*` is a prefix match on a segment boundary: it matches `/asset` and
///   `/asset/42`, but never `/assets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePattern {
    Exact(String),
    Prefix(String),
}

impl RoutePattern {
    /// parse
    ///
    /// Parses the textual form described on the type. The bare catch-all `/*` is
    /// rejected because it would overlap every other rule, including the exact root.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }
        if !raw.starts_with('/') {
            return Err(PatternError::NotAbsolute(raw.to_string()));
        }

        match raw.strip_suffix("/*") {
            Some("") => Err(PatternError::CatchAll(raw.to_string())),
            Some(base) => Ok(Self::Prefix(normalize_path(base).to_string())),
            None => Ok(Self::Exact(normalize_path(raw).to_string())),
        }
    }

    /// matches
    ///
    /// Tests an already normalized path (see `normalize_path`) against this rule.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => path == exact,
            Self::Prefix(base) => has_segment_prefix(path, base),
        }
    }

    /// covers
    ///
    /// True when every path matched by `other` is also matched by `self`.
    pub fn covers(&self, other: &RoutePattern) -> bool {
        match (self, other) {
            (Self::Prefix(base), Self::Exact(path) | Self::Prefix(path)) => {
                has_segment_prefix(path, base)
            }
            (Self::Exact(exact), Self::Exact(path)) => exact == path,
            (Self::Exact(_), Self::Prefix(_)) => false,
        }
    }
}

impl FromStr for RoutePattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(exact) => f.write_str(exact),
            Self::Prefix(base) => write!(f, "{base}/*"),
        }
    }
}

/// normalize_path
///
/// Drops the query string and any trailing slashes, keeping the root as `/`.
pub fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

fn has_segment_prefix(path: &str, base: &str) -> bool {
    match path.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// RouteClassifier
///
/// Categorizes request paths using ordered pattern matching:
/// 1. Static exclusions (file extensions, framework-internal prefixes) short-circuit
///    first. Paths under the API prefix are never static.
/// 2. Public patterns are tested in order; the first match wins.
/// 3. Whatever remains is Protected.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    static_prefixes: Vec<String>,
    static_extensions: Vec<String>,
    public: Vec<RoutePattern>,
    api_prefix: RoutePattern,
}

impl RouteClassifier {
    /// new
    ///
    /// Assembles the classifier, refusing duplicate or overlapping public rules so
    /// that rule order can never hide an ambiguity. `api_prefix` (e.g. `/api`) is
    /// matched on a segment boundary.
    pub fn new(
        static_prefixes: Vec<String>,
        static_extensions: Vec<String>,
        public: Vec<RoutePattern>,
        api_prefix: &str,
    ) -> Result<Self, PatternError> {
        ensure_unique(&public)?;
        let api_prefix = RoutePattern::parse(&format!("{}/*", api_prefix.trim_end_matches('/')))?;

        let static_prefixes = static_prefixes
            .iter()
            .map(|prefix| normalize_path(prefix).to_string())
            .filter(|prefix| prefix != "/")
            .collect();
        let static_extensions = static_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Ok(Self {
            static_prefixes,
            static_extensions,
            public,
            api_prefix,
        })
    }

    /// classify
    ///
    /// Pure function of the path; the query string is ignored.
    pub fn classify(&self, path: &str) -> RouteClass {
        let path = normalize_path(path);

        if self.is_static(path) {
            return RouteClass::Static;
        }

        if self.public.iter().any(|pattern| pattern.matches(path)) {
            RouteClass::Public
        } else {
            RouteClass::Protected
        }
    }

    /// is_api
    ///
    /// Whether `path` falls under the API prefix. API paths always go through the
    /// session check, whatever their last segment looks like.
    pub fn is_api(&self, path: &str) -> bool {
        self.api_prefix.matches(normalize_path(path))
    }

    fn is_static(&self, path: &str) -> bool {
        if self.api_prefix.matches(path) {
            return false;
        }

        if self
            .static_prefixes
            .iter()
            .any(|prefix| has_segment_prefix(path, prefix))
        {
            return true;
        }

        // Only the last segment carries an extension; `/v1.2/assets` is not a file.
        let last_segment = path.rsplit('/').next().unwrap_or_default();
        match last_segment.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.static_extensions.iter().any(|allowed| *allowed == ext)
            }
            _ => false,
        }
    }
}

/// ensure_unique
///
/// Shared by the public list and the onboarding exemption list. Rejects exact
/// duplicates and any rule already covered by another (`/asset/*` next to
/// `/asset` or `/asset/x/*`).
pub fn ensure_unique(patterns: &[RoutePattern]) -> Result<(), PatternError> {
    for (index, pattern) in patterns.iter().enumerate() {
        for earlier in &patterns[..index] {
            if earlier == pattern {
                return Err(PatternError::Duplicate(pattern.to_string()));
            }
            if earlier.covers(pattern) || pattern.covers(earlier) {
                return Err(PatternError::Overlap(pattern.to_string(), earlier.to_string()));
            }
        }
    }
    Ok(())
}
