//! Bearer credential value object.
//!
//! A [`Credential`] is immutable. Refreshing or re-authenticating always
//! produces a new one; the most recently issued credential is the live one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token set returned by an OAuth token endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Token type, usually `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Granted scope.
    #[serde(default)]
    pub scope: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    /// OpenID token, when issued.
    #[serde(default)]
    pub id_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// How a credential came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOrigin {
    /// Interactive authorization (code exchange).
    Authorization,
    /// Refresh-token exchange.
    Refresh,
}

impl CredentialOrigin {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::Refresh => "refresh",
        }
    }
}

/// A time-limited bearer credential plus its refresh token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    refresh_token: String,
    token_type: String,
    scope: String,
    id_token: Option<String>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    authenticated_at: DateTime<Utc>,
}

impl Credential {
    /// Credential produced by an interactive authorization at `issued_at`.
    #[must_use]
    pub fn authorized(grant: TokenGrant, issued_at: DateTime<Utc>) -> Self {
        Self::from_grant(grant, issued_at, issued_at)
    }

    /// Credential produced by refreshing `previous` at `issued_at`.
    ///
    /// The authentication time carries over so the weekly re-authentication
    /// rule keeps counting from the interactive login.
    #[must_use]
    pub fn refreshed(grant: TokenGrant, previous: &Self, issued_at: DateTime<Utc>) -> Self {
        Self::from_grant(grant, issued_at, previous.authenticated_at)
    }

    fn from_grant(
        grant: TokenGrant,
        issued_at: DateTime<Utc>,
        authenticated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            expires_at: issued_at + Duration::seconds(grant.expires_in.max(0)),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_type: grant.token_type,
            scope: grant.scope,
            id_token: grant.id_token,
            issued_at,
            authenticated_at,
        }
    }

    /// Rebuild a credential from persisted columns.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub const fn restore(
        access_token: String,
        refresh_token: String,
        token_type: String,
        scope: String,
        id_token: Option<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        authenticated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type,
            scope,
            id_token,
            issued_at,
            expires_at,
            authenticated_at,
        }
    }

    /// Access token for the `Authorization` header.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Token type.
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Granted scope.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// OpenID token.
    #[must_use]
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    /// Issuance time.
    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Expiry time of the access token.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Time of the interactive authorization that started this refresh chain.
    #[must_use]
    pub const fn authenticated_at(&self) -> DateTime<Utc> {
        self.authenticated_at
    }

    /// Whether the access token is still usable at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("authenticated_at", &self.authenticated_at)
            .finish_non_exhaustive()
    }
}
