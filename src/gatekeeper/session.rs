use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::identity::{IdentityState, RequestCredentials, SessionIdentity};

/// SessionState
///
/// The caller's trust state for a single request. Created by the Session Resolver,
/// consumed by the Decision Engine, then exposed to handlers via request extensions.
///
/// Invariants:
/// - `user_id` is present iff `authenticated`.
/// - `wallet_provisioned` is only meaningful when `authenticated`; it is `None`
///   when the status could not be determined (`metadata_fetch_failed = true`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SessionState {
    pub authenticated: bool,
    pub user_id: Option<String>,
    pub wallet_provisioned: Option<bool>,
    pub metadata_fetch_failed: bool,
}

impl SessionState {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user_id: impl Into<String>, wallet_provisioned: bool) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id.into()),
            wallet_provisioned: Some(wallet_provisioned),
            metadata_fetch_failed: false,
        }
    }

    /// lookup_failed
    ///
    /// Authenticated, but the wallet status is unknown because the live lookup
    /// errored or timed out.
    pub fn lookup_failed(user_id: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id.into()),
            wallet_provisioned: None,
            metadata_fetch_failed: true,
        }
    }

    /// has_wallet
    ///
    /// Unauthenticated and unknown states are never treated as provisioned.
    pub fn has_wallet(&self) -> bool {
        self.authenticated && self.wallet_provisioned.unwrap_or(false)
    }
}

/// WalletStatusSource
///
/// Where the resolver reads wallet-provisioning status from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalletStatusSource {
    /// The `metadata.walletCreated` claim embedded in the session token. No I/O.
    Claims,
    /// A live user-record lookup against the identity provider. Authoritative.
    Lookup,
    /// Trust a `true` claim; otherwise confirm with a live lookup. Tokens minted
    /// before onboarding finished still carry `false` until they are refreshed.
    #[default]
    Hybrid,
}

impl FromStr for WalletStatusSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claims" => Ok(Self::Claims),
            "lookup" => Ok(Self::Lookup),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!(
                "unknown wallet status source `{other}` (expected claims, lookup or hybrid)"
            )),
        }
    }
}

impl fmt::Display for WalletStatusSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Claims => "claims",
            Self::Lookup => "lookup",
            Self::Hybrid => "hybrid",
        })
    }
}

/// SessionResolver
///
/// Turns request credentials into a `SessionState` by consulting the injected
/// identity provider. It never fails: provider errors degrade to "unauthenticated"
/// (identity extraction) or "unknown wallet status" (live lookup).
#[derive(Clone)]
pub struct SessionResolver {
    provider: IdentityState,
    source: WalletStatusSource,
    lookup_timeout: Duration,
}

impl SessionResolver {
    pub fn new(provider: IdentityState, source: WalletStatusSource, lookup_timeout: Duration) -> Self {
        Self {
            provider,
            source,
            lookup_timeout,
        }
    }

    /// resolve
    ///
    /// The live lookup is the only suspension point and is bounded by `lookup_timeout`.
    /// No retries are attempted. If the request future is dropped (client abort),
    /// the in-flight lookup is dropped with it.
    pub async fn resolve(&self, credentials: &RequestCredentials) -> SessionState {
        if credentials.is_empty() {
            return SessionState::anonymous();
        }

        let identity = match self.provider.authenticate(credentials).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return SessionState::anonymous(),
            Err(e) => {
                // No identity means no access to protected routes, even when the
                // provider is the one at fault.
                tracing::warn!(error = %e, "identity provider failed to authenticate request");
                return SessionState::anonymous();
            }
        };

        match (self.source, identity.wallet_claim()) {
            (WalletStatusSource::Claims, claim) => {
                SessionState::authenticated(identity.user_id, claim.unwrap_or(false))
            }
            (WalletStatusSource::Hybrid, Some(true)) => {
                SessionState::authenticated(identity.user_id, true)
            }
            (WalletStatusSource::Lookup | WalletStatusSource::Hybrid, _) => {
                self.lookup_wallet(identity).await
            }
        }
    }

    async fn lookup_wallet(&self, identity: SessionIdentity) -> SessionState {
        let outcome =
            tokio::time::timeout(self.lookup_timeout, self.provider.fetch_user(&identity.user_id))
                .await;

        match outcome {
            Ok(Ok(record)) => SessionState::authenticated(
                identity.user_id,
                record.public_metadata.wallet_created.unwrap_or(false),
            ),
            Ok(Err(e)) => {
                tracing::warn!(user_id = %identity.user_id, error = %e, "user metadata lookup failed");
                SessionState::lookup_failed(identity.user_id)
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %identity.user_id,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "user metadata lookup timed out"
                );
                SessionState::lookup_failed(identity.user_id)
            }
        }
    }
}
