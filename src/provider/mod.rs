//! Boundary to the identity provider.
//!
//! Everything the service needs from the provider goes through
//! [`IdentityProvider`]: building the authorization redirect, exchanging a
//! code for a user profile and reading IdP-initiated login tokens.

mod scalekit;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::entity::User;

pub use scalekit::ScalekitClient;

/// Extra parameters of an authorization request. Empty values are not sent.
///
/// Mirrors the provider's full option set; the HTTP endpoints only fill the
/// connection, organization, login hint and state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuthorizationUrlOptions {
    pub connection_id: Option<String>,
    pub organization_id: Option<String>,
    pub login_hint: Option<String>,
    pub domain_hint: Option<String>,
    pub provider: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    /// Requested scopes, `openid profile email` when empty.
    pub scopes: Vec<String>,
}

/// Options of a code exchange, for PKCE clients.
#[derive(Debug, Default, Clone)]
pub struct AuthenticationOptions {
    pub code_verifier: Option<String>,
}

/// Result of a successful code exchange.
///
/// The tokens are returned as issued; the session store keeps only `user`.
#[derive(Debug, Clone)]
pub struct AuthenticationResponse {
    pub user: User,
    pub id_token: String,
    pub access_token: String,
    pub expires_in: u64,
}

/// Claims carried by an IdP-initiated login token.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct IdpInitiatedLoginClaims {
    pub connection_id: Option<String>,
    pub organization_id: Option<String>,
    pub login_hint: Option<String>,
    pub relay_state: Option<String>,
}

impl From<IdpInitiatedLoginClaims> for AuthorizationUrlOptions {
    fn from(claims: IdpInitiatedLoginClaims) -> Self {
        Self {
            connection_id: claims.connection_id,
            organization_id: claims.organization_id,
            login_hint: claims.login_hint,
            state: claims.relay_state,
            ..Default::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request to identity provider failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identity provider responded with {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("no signing key found for kid {0:?}")]
    MissingKey(Option<String>),
    #[error("invalid url: {0}")]
    Url(String),
    #[error("identity provider response carried no {0}")]
    MissingField(&'static str),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Builds the URL the browser is sent to in order to log in.
    fn authorization_url(
        &self,
        redirect_uri: &str,
        options: &AuthorizationUrlOptions,
    ) -> Result<Url, ProviderError>;

    /// Exchanges an authorization code for the authenticated user.
    async fn authenticate_with_code(
        &self,
        code: &str,
        redirect_uri: &str,
        options: &AuthenticationOptions,
    ) -> Result<AuthenticationResponse, ProviderError>;

    /// Verifies an IdP-initiated login token and returns its claims.
    async fn idp_initiated_login_claims(
        &self,
        token: &str,
    ) -> Result<IdpInitiatedLoginClaims, ProviderError>;
}
