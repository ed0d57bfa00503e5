//! Login, callback, current-user and logout endpoints.

use std::{convert::Infallible, sync::Arc};

use log::{error, info, warn};
use serde_json::json;
use warp::{
    http::{
        header::{LOCATION, SET_COOKIE},
        StatusCode,
    },
    hyper::body::Bytes,
    reject,
    reply::Response,
    Filter, Rejection, Reply,
};

use crate::{
    entity::{CallbackQuery, LoginBody, Sessions, User},
    provider::{
        AuthenticationOptions, AuthorizationUrlOptions, IdentityProvider, ProviderError,
    },
    session_cookie::{self, SESSION_COOKIE},
};

/// Largest accepted `POST /auth/login` body.
pub const LOGIN_BODY_LIMIT: u64 = 16 * 1024;

/// Glue between the HTTP endpoints, the identity provider and the session store.
pub struct Auth {
    provider: Arc<dyn IdentityProvider>,
    host: String,
    redirect_uri: String,
    sessions: Sessions,
}

impl Auth {
    /// `host` is the public base URL of the application, `redirect_uri` the
    /// callback address registered with the provider.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        host: impl Into<String>,
        redirect_uri: impl Into<String>,
        sessions: Sessions,
    ) -> Self {
        Self {
            provider,
            host: host.into(),
            redirect_uri: redirect_uri.into(),
            sessions,
        }
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    fn host(&self, path: &str) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), path)
    }

    fn authorization_url(&self, options: &AuthorizationUrlOptions) -> Result<String, ProviderError> {
        let url = self.provider.authorization_url(&self.redirect_uri, options)?;
        Ok(url.into())
    }

    /// Turns an IdP-initiated login token into a regular authorization request.
    async fn idp_initiated_login(&self, token: &str) -> Result<String, ProviderError> {
        let claims = self.provider.idp_initiated_login_claims(token).await?;
        info!(
            "idp initiated login for connection {:?}, organization {:?}",
            claims.connection_id, claims.organization_id
        );
        self.authorization_url(&claims.into())
    }

    async fn authenticate(&self, code: &str) -> Result<User, ProviderError> {
        let response = self
            .provider
            .authenticate_with_code(code, &self.redirect_uri, &AuthenticationOptions::default())
            .await?;
        Ok(response.user)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn text(status: StatusCode, message: impl Into<String>) -> Response {
    warp::reply::with_status(message.into(), status).into_response()
}

fn redirect(location: &str) -> Response {
    warp::reply::with_header(StatusCode::FOUND, LOCATION, location).into_response()
}

fn provider_failure(context: &str, err: ProviderError) -> Response {
    error!("{} error in call: {:?}", context, err);
    text(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

async fn reply_login(auth: Arc<Auth>, body: Bytes) -> Result<Response, Infallible> {
    if body.len() as u64 > LOGIN_BODY_LIMIT {
        return Ok(text(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"));
    }

    let body = match LoginBody::from_slice(&body) {
        Ok(body) => body,
        Err(err) => {
            warn!("login body rejected: {}", err);
            return Ok(text(StatusCode::BAD_REQUEST, err.to_string()));
        }
    };

    let options = AuthorizationUrlOptions {
        connection_id: non_empty(body.connection_id),
        organization_id: non_empty(body.organization_id),
        login_hint: non_empty(body.email),
        ..Default::default()
    };

    let reply = match auth.authorization_url(&options) {
        Ok(url) => {
            info!("authorize: {}", url);
            warp::reply::with_status(warp::reply::json(&json!({ "url": url })), StatusCode::OK)
        }
        Err(err) => {
            error!("login error in call: {:?}", err);
            warp::reply::with_status(
                warp::reply::json(&json!({ "error": err.to_string() })),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    };
    Ok(reply.into_response())
}

async fn reply_callback(auth: Arc<Auth>, query: CallbackQuery) -> Result<Response, Infallible> {
    if let Some(description) = non_empty(query.error_description) {
        warn!("callback carried error: {}", description);
        return Ok(text(StatusCode::BAD_REQUEST, description));
    }

    if let Some(token) = non_empty(query.idp_initiated_login) {
        return Ok(match auth.idp_initiated_login(&token).await {
            Ok(url) => redirect(&url),
            Err(err) => provider_failure("idp initiated login", err),
        });
    }

    let Some(code) = non_empty(query.code) else {
        return Ok(text(StatusCode::BAD_REQUEST, "code not found"));
    };

    let user = match auth.authenticate(&code).await {
        Ok(user) => user,
        Err(err) => return Ok(provider_failure("callback", err)),
    };

    let Some(uid) = user.session_id().map(str::to_string) else {
        error!("callback error: no session id in {:?}", user.id);
        return Ok(text(StatusCode::INTERNAL_SERVER_ERROR, "user id not found"));
    };

    info!("login: {}", uid);
    auth.sessions.set(uid.as_str(), user).await;

    Ok(warp::reply::with_header(
        warp::reply::with_header(StatusCode::FOUND, LOCATION, auth.host("/profile")),
        SET_COOKIE,
        session_cookie::issue(&uid),
    )
    .into_response())
}

async fn reply_me(auth: Arc<Auth>, uid: Option<String>) -> Result<Response, Infallible> {
    let user = match session_cookie::session_id(uid) {
        Some(uid) => auth.sessions.get(&uid).await,
        None => None,
    };
    Ok(match user {
        Some(user) => warp::reply::json(&user).into_response(),
        None => text(StatusCode::NOT_FOUND, "user not found"),
    })
}

async fn reply_logout(auth: Arc<Auth>) -> Result<Response, Infallible> {
    Ok(warp::reply::with_header(
        warp::reply::with_header(StatusCode::FOUND, LOCATION, auth.host("/")),
        SET_COOKIE,
        session_cookie::clear(),
    )
    .into_response())
}

#[derive(Debug)]
struct BodyTooLarge;

impl reject::Reject for BodyTooLarge {}

/// Login body, refused early when its declared length is over the limit.
/// Requests without `Content-Length` are read and checked by the handler.
fn login_body() -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and_then(|length: Option<u64>| async move {
            match length {
                Some(length) if length > LOGIN_BODY_LIMIT => Err(reject::custom(BodyTooLarge)),
                _ => Ok(()),
            }
        })
        .untuple_one()
        .and(warp::body::bytes())
}

fn with_auth(auth: Arc<Auth>) -> impl Filter<Extract = (Arc<Auth>,), Error = Infallible> + Clone {
    warp::any().map(move || auth.clone())
}

/// `/auth/*` endpoints. Malformed requests to them are answered here instead
/// of falling through to the frontend bundle.
pub fn routes(auth: Arc<Auth>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(with_auth(auth.clone()))
        .and(login_body())
        .and_then(reply_login);

    let callback = warp::path!("auth" / "callback")
        .and(warp::get())
        .and(with_auth(auth.clone()))
        .and(warp::query::<Vec<(String, String)>>().map(CallbackQuery::from_pairs))
        .and_then(reply_callback);

    let me = warp::path!("auth" / "me")
        .and(warp::get())
        .and(with_auth(auth.clone()))
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .and_then(reply_me);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and(with_auth(auth))
        .and_then(reply_logout);

    login
        .or(callback)
        .unify()
        .or(me)
        .unify()
        .or(logout)
        .unify()
        .recover(reject_malformed)
        .unify()
}

/// Answers rejections raised by a matched `/auth` route; routing misses are
/// passed on.
async fn reject_malformed(err: Rejection) -> Result<Response, Rejection> {
    let code = if err.find::<BodyTooLarge>().is_some() {
        StatusCode::PAYLOAD_TOO_LARGE
    } else if err.find::<reject::InvalidHeader>().is_some() {
        StatusCode::BAD_REQUEST
    } else {
        return Err(err);
    };

    warn!("auth request rejected: {:?}", err);
    Ok(warp::reply::with_status(warp::reply(), code).into_response())
}

/// Maps rejections left after routing to bare status replies.
pub async fn handle_rejections(err: Rejection) -> Result<impl Reply, Infallible> {
    let code = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        StatusCode::METHOD_NOT_ALLOWED
    } else {
        error!("unhandled rejection: {:?}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    };

    Ok(warp::reply::with_status(warp::reply(), code))
}
