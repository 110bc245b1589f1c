use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode, header};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;

/// RequestCredentials
///
/// The raw, unverified credential material carried by a request. Only the identity
/// provider decides what (if anything) these credentials prove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCredentials {
    /// Token from `Authorization: Bearer <token>`.
    pub bearer_token: Option<String>,
    /// Token from the session cookie set by the identity provider's front-end SDK.
    pub session_cookie: Option<String>,
    /// Development-only identity from the `x-user-id` header. Never populated
    /// unless the caller explicitly enables the local bypass.
    pub dev_user_id: Option<String>,
}

impl RequestCredentials {
    /// from_headers
    ///
    /// Collects credentials from the request headers. The `x-user-id` bypass is
    /// honoured only when `allow_dev_bypass` is set (i.e. `Env::Local`).
    pub fn from_headers(headers: &HeaderMap, cookie_name: &str, allow_dev_bypass: bool) -> Self {
        let bearer_token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        let session_cookie = CookieJar::from_headers(headers)
            .get(cookie_name)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty());

        let dev_user_id = if allow_dev_bypass {
            headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        } else {
            None
        };

        Self {
            bearer_token,
            session_cookie,
            dev_user_id,
        }
    }

    /// token
    ///
    /// The session token to verify. An explicit bearer token wins over the cookie.
    pub fn token(&self) -> Option<&str> {
        self.bearer_token
            .as_deref()
            .or(self.session_cookie.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.token().is_none() && self.dev_user_id.is_none()
    }
}

/// UserMetadata
///
/// Metadata attached to a user by the identity provider. Only `walletCreated` is
/// interpreted here; every other key is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(rename = "walletCreated", default, skip_serializing_if = "Option::is_none")]
    pub wallet_created: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserMetadata {
    pub fn with_wallet(wallet_created: bool) -> Self {
        Self {
            wallet_created: Some(wallet_created),
            ..Self::default()
        }
    }
}

/// SessionClaims
///
/// The payload of a signed session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (sub): the identity provider's opaque user id.
    pub sub: String,
    /// Expiration Time (exp).
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
    /// Custom session claims. Deployments that embed wallet status in the token
    /// put it here as `metadata.walletCreated`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<UserMetadata>,
}

impl SessionClaims {
    /// wallet_created
    ///
    /// The embedded wallet claim, if the token carries one.
    pub fn wallet_created(&self) -> Option<bool> {
        self.metadata.as_ref().and_then(|meta| meta.wallet_created)
    }
}

/// SessionIdentity
///
/// Answer to "who, if anyone, is this?" for an authenticated request.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionIdentity {
    pub user_id: String,
    /// `None` when the identity did not come from a token (development bypass).
    pub claims: Option<SessionClaims>,
}

impl SessionIdentity {
    pub fn wallet_claim(&self) -> Option<bool> {
        self.claims.as_ref().and_then(SessionClaims::wallet_created)
    }
}

/// UserRecord
///
/// The identity provider's stored user record, as returned by the user lookup API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub public_metadata: UserMetadata,
}

/// IdentityError
///
/// Failure modes of the identity provider. None of these ever reach the caller
/// directly: the Session Resolver degrades them to "unknown" or "unauthenticated".
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
    #[error("identity provider returned status {0}")]
    Status(StatusCode),
    #[error("user `{0}` not found")]
    UserNotFound(String),
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// IdentityProvider Contract
///
/// The external identity/session provider, modelled as an injected capability so
/// the gatekeeper can run against the real provider in production and a fake in tests.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves the caller's identity from the request credentials.
    /// `Ok(None)` means "no valid session"; `Err` means the provider itself failed.
    async fn authenticate(
        &self,
        credentials: &RequestCredentials,
    ) -> Result<Option<SessionIdentity>, IdentityError>;

    /// Live lookup of the user record. This is the only call that performs network I/O.
    async fn fetch_user(&self, user_id: &str) -> Result<UserRecord, IdentityError>;
}

/// IdentityState
///
/// The concrete type used to share the identity provider across the application state.
pub type IdentityState = Arc<dyn IdentityProvider>;

/// RemoteIdentityProvider
///
/// Production provider. Session tokens are HS256 JWTs verified locally with the
/// shared signing secret; user records come from the provider's REST API.
#[derive(Clone)]
pub struct RemoteIdentityProvider {
    client: reqwest::Client,
    decoding_key: DecodingKey,
    api_url: String,
    api_key: String,
}

impl RemoteIdentityProvider {
    pub fn new(client: reqwest::Client, jwt_secret: &str, api_url: &str, api_key: &str) -> Self {
        Self {
            client,
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn verify(&self, token: &str) -> Option<SessionClaims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                match e.kind() {
                    ErrorKind::ExpiredSignature => tracing::debug!("session token expired"),
                    kind => tracing::debug!(?kind, "session token rejected"),
                }
                None
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    async fn authenticate(
        &self,
        credentials: &RequestCredentials,
    ) -> Result<Option<SessionIdentity>, IdentityError> {
        if let Some(claims) = credentials.token().and_then(|token| self.verify(token)) {
            return Ok(Some(SessionIdentity {
                user_id: claims.sub.clone(),
                claims: Some(claims),
            }));
        }

        // Falls through to the local bypass only when no valid token was presented.
        Ok(credentials.dev_user_id.clone().map(|user_id| SessionIdentity {
            user_id,
            claims: None,
        }))
    }

    async fn fetch_user(&self, user_id: &str) -> Result<UserRecord, IdentityError> {
        let url = format!("{}/users/{}", self.api_url, urlencoding::encode(user_id));

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json::<UserRecord>().await?)
        } else if status == StatusCode::NOT_FOUND {
            Err(IdentityError::UserNotFound(user_id.to_string()))
        } else {
            Err(IdentityError::Status(status))
        }
    }
}

/// MockIdentityProvider
///
/// In-memory provider for tests and local demos. Sessions are keyed by the raw
/// token string, users by id. Failures and slow lookups can be switched on to
/// exercise the resolver's fail-open and timeout paths.
#[derive(Clone, Default)]
pub struct MockIdentityProvider {
    pub sessions: HashMap<String, SessionIdentity>,
    pub users: HashMap<String, UserRecord>,
    /// When true, `authenticate` errors as if the provider were unreachable.
    pub fail_authentication: bool,
    /// When true, `fetch_user` errors as if the provider were unreachable.
    pub fail_lookup: bool,
    /// Artificial latency added to every `fetch_user` call.
    pub lookup_delay: Option<Duration>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// with_session
    ///
    /// Registers `token` as a valid session for `user_id`, optionally embedding a
    /// `walletCreated` claim.
    pub fn with_session(mut self, token: &str, user_id: &str, wallet_claim: Option<bool>) -> Self {
        let claims = SessionClaims {
            sub: user_id.to_string(),
            exp: usize::MAX,
            iat: 0,
            metadata: wallet_claim.map(UserMetadata::with_wallet),
        };
        self.sessions.insert(
            token.to_string(),
            SessionIdentity {
                user_id: user_id.to_string(),
                claims: Some(claims),
            },
        );
        self
    }

    /// with_user
    ///
    /// Registers the stored user record returned by the live lookup.
    pub fn with_user(mut self, user_id: &str, wallet_created: Option<bool>) -> Self {
        let public_metadata = wallet_created.map(UserMetadata::with_wallet).unwrap_or_default();
        self.users.insert(
            user_id.to_string(),
            UserRecord {
                id: user_id.to_string(),
                public_metadata,
            },
        );
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.fail_authentication = true;
        self.fail_lookup = true;
        self
    }

    pub fn failing_lookup(mut self) -> Self {
        self.fail_lookup = true;
        self
    }

    pub fn slow_lookup(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn authenticate(
        &self,
        credentials: &RequestCredentials,
    ) -> Result<Option<SessionIdentity>, IdentityError> {
        if self.fail_authentication {
            return Err(IdentityError::Unavailable(
                "Mock Identity Error: Simulation requested".to_string(),
            ));
        }

        if let Some(identity) = credentials.token().and_then(|token| self.sessions.get(token)) {
            return Ok(Some(identity.clone()));
        }

        Ok(credentials.dev_user_id.clone().map(|user_id| SessionIdentity {
            user_id,
            claims: None,
        }))
    }

    async fn fetch_user(&self, user_id: &str) -> Result<UserRecord, IdentityError> {
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_lookup {
            return Err(IdentityError::Unavailable(
                "Mock Identity Error: Simulation requested".to_string(),
            ));
        }

        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| IdentityError::UserNotFound(user_id.to_string()))
    }
}
