use std::{str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use jsonwebtoken::{
    decode, decode_header,
    jwk::{Jwk, JwkSet},
    Algorithm, DecodingKey, Validation,
};
use log::{debug, info};
use reqwest::Url;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{sync::Mutex, time::Instant};

use crate::{
    entity::User,
    provider::{
        AuthenticationOptions, AuthenticationResponse, AuthorizationUrlOptions,
        IdentityProvider, IdpInitiatedLoginClaims, ProviderError,
    },
};

const AUTHORIZE_PATH: &str = "/oauth/authorize";
const TOKEN_PATH: &str = "/oauth/token";
const KEYS_PATH: &str = "/keys";
const DEFAULT_SCOPES: &str = "openid profile email";
const KEYS_TTL: Duration = Duration::from_secs(300);
/// Used when a published key does not name its algorithm.
const DEFAULT_ALGORITHM: Algorithm = Algorithm::RS256;

struct CachedKeys {
    set: Arc<JwkSet>,
    fetched_at: Instant,
}

/// Client for a Scalekit environment.
pub struct ScalekitClient {
    environment_url: Url,
    issuer: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    keys: Mutex<Option<CachedKeys>>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code_verifier: Option<&'a str>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    id_token: Option<String>,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    preferred_username: Option<String>,
    picture: Option<String>,
    locale: Option<String>,
}

impl From<IdTokenClaims> for User {
    fn from(claims: IdTokenClaims) -> Self {
        User {
            id: claims.sub,
            email: claims.email,
            email_verified: claims.email_verified,
            name: claims.name,
            given_name: claims.given_name,
            family_name: claims.family_name,
            username: claims.preferred_username,
            picture: claims.picture,
            locale: claims.locale,
        }
    }
}

impl ScalekitClient {
    pub fn new(
        environment_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let issuer = environment_url.trim_end_matches('/').to_string();
        let environment_url =
            Url::parse(&issuer).map_err(|err| ProviderError::Url(err.to_string()))?;
        Ok(Self {
            environment_url,
            issuer,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http: reqwest::Client::new(),
            keys: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.environment_url
            .join(path)
            .map_err(|err| ProviderError::Url(err.to_string()))
    }

    async fn signing_keys(&self, refresh: bool) -> Result<Arc<JwkSet>, ProviderError> {
        if !refresh {
            if let Some(cached) = self.keys.lock().await.as_ref() {
                if cached.fetched_at.elapsed() < KEYS_TTL {
                    return Ok(cached.set.clone());
                }
            }
        }

        let url = self.endpoint(KEYS_PATH)?;
        debug!("fetching signing keys from {}", url);
        let set: Arc<JwkSet> = Arc::new(read_json(self.http.get(url).send().await?).await?);

        *self.keys.lock().await = Some(CachedKeys {
            set: set.clone(),
            fetched_at: Instant::now(),
        });
        Ok(set)
    }

    /// Verifies `token` against the environment's key set, refetching the set
    /// once when the token names a key it does not contain.
    async fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        validation: impl Fn(&mut Validation),
    ) -> Result<T, ProviderError> {
        let header = decode_header(token)?;
        let mut keys = self.signing_keys(false).await?;
        if find_key(&keys, header.kid.as_deref()).is_none() {
            keys = self.signing_keys(true).await?;
        }
        decode_with_keys(token, &keys, &validation)
    }

    fn id_token_validation(&self) -> impl Fn(&mut Validation) + '_ {
        move |rules: &mut Validation| {
            rules.set_issuer(&[&self.issuer]);
            rules.set_audience(&[&self.client_id]);
        }
    }
}

fn find_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        None if keys.keys.len() == 1 => keys.keys.first(),
        None => None,
    }
}

/// Algorithm accepted for tokens signed with `jwk`. The token header only
/// selects the key, never the algorithm.
fn key_algorithm(jwk: &Jwk) -> Result<Algorithm, ProviderError> {
    match jwk.common.key_algorithm {
        Some(algorithm) => Ok(Algorithm::from_str(&algorithm.to_string())?),
        None => Ok(DEFAULT_ALGORITHM),
    }
}

fn decode_with_keys<T: DeserializeOwned>(
    token: &str,
    keys: &JwkSet,
    configure: &dyn Fn(&mut Validation),
) -> Result<T, ProviderError> {
    let kid = decode_header(token)?.kid;
    let jwk = find_key(keys, kid.as_deref()).ok_or(ProviderError::MissingKey(kid))?;
    let key = DecodingKey::from_jwk(jwk)?;
    let mut validation = Validation::new(key_algorithm(jwk)?);
    configure(&mut validation);
    Ok(decode::<T>(token, &key, &validation)?.claims)
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status { status, body });
    }
    Ok(response.json().await?)
}

fn append_authorization_params(
    url: &mut Url,
    client_id: &str,
    redirect_uri: &str,
    options: &AuthorizationUrlOptions,
) {
    let scope = if options.scopes.is_empty() {
        DEFAULT_SCOPES.to_string()
    } else {
        options.scopes.join(" ")
    };

    let mut query = url.query_pairs_mut();
    query
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &scope);

    let optional = [
        ("state", &options.state),
        ("nonce", &options.nonce),
        ("login_hint", &options.login_hint),
        ("domain_hint", &options.domain_hint),
        ("connection_id", &options.connection_id),
        ("organization_id", &options.organization_id),
        ("provider", &options.provider),
    ];
    for (name, value) in optional {
        if let Some(value) = value.as_deref().filter(|value| !value.is_empty()) {
            query.append_pair(name, value);
        }
    }
}

#[async_trait]
impl IdentityProvider for ScalekitClient {
    fn authorization_url(
        &self,
        redirect_uri: &str,
        options: &AuthorizationUrlOptions,
    ) -> Result<Url, ProviderError> {
        let mut url = self.endpoint(AUTHORIZE_PATH)?;
        append_authorization_params(&mut url, &self.client_id, redirect_uri, options);
        Ok(url)
    }

    async fn authenticate_with_code(
        &self,
        code: &str,
        redirect_uri: &str,
        options: &AuthenticationOptions,
    ) -> Result<AuthenticationResponse, ProviderError> {
        let request = TokenRequest {
            grant_type: "authorization_code",
            code,
            redirect_uri,
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            code_verifier: options.code_verifier.as_deref(),
        };
        let response = self
            .http
            .post(self.endpoint(TOKEN_PATH)?)
            .form(&request)
            .send()
            .await?;
        let token: TokenResponse = read_json(response).await?;

        let id_token = token.id_token.ok_or(ProviderError::MissingField("id_token"))?;
        let claims: IdTokenClaims = self.verify(&id_token, self.id_token_validation()).await?;
        info!("authenticated {}", claims.sub);

        Ok(AuthenticationResponse {
            user: claims.into(),
            id_token,
            access_token: token.access_token,
            expires_in: token.expires_in,
        })
    }

    async fn idp_initiated_login_claims(
        &self,
        token: &str,
    ) -> Result<IdpInitiatedLoginClaims, ProviderError> {
        self.verify(token, |rules: &mut Validation| rules.validate_aud = false)
            .await
    }
}
